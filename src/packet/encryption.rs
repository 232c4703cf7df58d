use std::fmt;

use blowfish::BlowfishLE;
use blowfish::cipher::{Block, BlockDecrypt, BlockEncrypt, KeyInit};
use rand::RngCore;

use crate::error::PacketError;

/// Size of the per-connection key handed out in `Init`/`KeyPacket`.
pub const BLOWFISH_KEY_SIZE: usize = 16;

const BLOCK_SIZE: usize = 8;
const CHECKSUM_SIZE: usize = 4;

type BlowfishBlock = Block<BlowfishLE>;

/// Generates a fresh key for one connection.
pub fn generate_blowfish_key() -> [u8; BLOWFISH_KEY_SIZE] {
    let mut key = [0u8; BLOWFISH_KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut key);
    key
}

/// Blowfish over packet bodies. Every body gets a trailing XOR checksum and
/// is zero padded to the block size before it's encrypted.
#[derive(Clone)]
pub struct PacketCipher {
    blowfish: BlowfishLE,
}

impl fmt::Debug for PacketCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketCipher").finish_non_exhaustive()
    }
}

impl PacketCipher {
    pub fn new(key: &[u8]) -> Result<Self, PacketError> {
        let blowfish = BlowfishLE::new_from_slice(key).map_err(|_| {
            PacketError::Cipher(format!("{} is an invalid blowfish key length", key.len()))
        })?;

        Ok(Self { blowfish })
    }

    pub fn encrypt(&self, body: &mut Vec<u8>) {
        let size = (body.len() + CHECKSUM_SIZE).next_multiple_of(BLOCK_SIZE);
        body.resize(size, 0);
        append_checksum(body);

        for chunk in body.chunks_exact_mut(BLOCK_SIZE) {
            self.blowfish.encrypt_block(BlowfishBlock::from_mut_slice(chunk));
        }
    }

    /// Decrypts in place. A failure here means both sides are out of sync,
    /// which the connection can't recover from.
    pub fn decrypt(&self, body: &mut [u8]) -> Result<(), PacketError> {
        if body.is_empty() || body.len() % BLOCK_SIZE != 0 {
            return Err(PacketError::Cipher(format!(
                "{} is an invalid block length",
                body.len()
            )));
        }

        for chunk in body.chunks_exact_mut(BLOCK_SIZE) {
            self.blowfish.decrypt_block(BlowfishBlock::from_mut_slice(chunk));
        }

        if !verify_checksum(body) {
            return Err(PacketError::Cipher("checksum mismatch".to_string()));
        }

        Ok(())
    }
}

fn words(data: &[u8]) -> impl Iterator<Item = u32> + '_ {
    data.chunks_exact(4)
        .map(|word| u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
}

/// XORs every word but the last one, and stores the result in the last one.
/// `data` must be a multiple of 4 bytes long.
pub(crate) fn append_checksum(data: &mut [u8]) {
    let split = data.len() - CHECKSUM_SIZE;
    let checksum = words(&data[..split]).fold(0, |acc, word| acc ^ word);
    data[split..].copy_from_slice(&checksum.to_le_bytes());
}

pub(crate) fn verify_checksum(data: &[u8]) -> bool {
    if data.len() < CHECKSUM_SIZE || data.len() % 4 != 0 {
        return false;
    }

    let split = data.len() - CHECKSUM_SIZE;
    let checksum = words(&data[..split]).fold(0, |acc, word| acc ^ word);
    words(&data[split..]).next() == Some(checksum)
}
