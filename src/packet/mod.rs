mod parsing;
pub use parsing::{
    LENGTH_PREFIX_SIZE, MAX_PACKET_SIZE, PacketState, ReadWritePacket, decode_body, decode_packet,
    encode_packet, frame_size,
};

mod encryption;
pub use encryption::{BLOWFISH_KEY_SIZE, PacketCipher, generate_blowfish_key};

mod scramble;
#[cfg(test)]
pub(crate) use scramble::test_key_pair;
pub use scramble::{
    Credentials, KeyPairPool, MODULUS_SIZE, SCRAMBLED_MODULUS_FIELD_SIZE, ScrambledKeyPair,
    encrypt_block, scramble_modulus, unscramble_modulus,
};

mod transport;
pub use transport::{WRITE_TIMEOUT, read_packet, send_packet};
