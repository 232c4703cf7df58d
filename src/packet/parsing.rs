use std::io::Cursor;

use binrw::{BinRead, BinWrite};

use crate::error::PacketError;

use super::encryption::PacketCipher;

/// Every packet starts with its total size, which counts these two bytes too.
pub const LENGTH_PREFIX_SIZE: usize = 2;

pub const MAX_PACKET_SIZE: usize = u16::MAX as usize;

/// A packet set for one direction of one link. The import argument is the
/// size of the body (opcode included), needed by packets whose last blob has
/// an implied length.
pub trait ReadWritePacket:
    for<'a> BinRead<Args<'a> = (u32,)> + for<'a> BinWrite<Args<'a> = ()> + std::fmt::Debug
{
    /// Name of the packet, used for logging.
    fn get_name(&self) -> &'static str;
}

/// State needed for each connection, right now that is only the cipher. It
/// stays empty until the unencrypted handshake packet went through.
#[derive(Clone, Debug, Default)]
pub struct PacketState {
    pub cipher: Option<PacketCipher>,
}

impl PacketState {
    pub fn encrypted(cipher: PacketCipher) -> Self {
        Self {
            cipher: Some(cipher),
        }
    }
}

/// Serializes `packet`, encrypts it if the connection is keyed, and puts the
/// length prefix in front.
pub fn encode_packet<T: ReadWritePacket>(
    packet: &T,
    state: &PacketState,
) -> Result<Vec<u8>, PacketError> {
    let mut cursor = Cursor::new(Vec::new());
    packet.write_le(&mut cursor)?;

    let mut body = cursor.into_inner();
    if let Some(cipher) = &state.cipher {
        cipher.encrypt(&mut body);
    }

    // the size can only be known once the body is final
    let size = body.len() + LENGTH_PREFIX_SIZE;
    if size > MAX_PACKET_SIZE {
        return Err(PacketError::Framing(format!(
            "{} is too large to send ({size} bytes)",
            packet.get_name()
        )));
    }

    let mut data = Vec::with_capacity(size);
    data.extend_from_slice(&(size as u16).to_le_bytes());
    data.extend_from_slice(&body);

    Ok(data)
}

/// Reads the total size out of a length prefix.
pub fn frame_size(prefix: [u8; LENGTH_PREFIX_SIZE]) -> Result<usize, PacketError> {
    let size = u16::from_le_bytes(prefix) as usize;
    // there has to be at least an opcode
    if size <= LENGTH_PREFIX_SIZE {
        return Err(PacketError::Framing(format!(
            "length prefix {size} leaves no room for a body"
        )));
    }

    Ok(size)
}

/// Decodes the packet at the front of `data`. Returns it together with the
/// number of bytes it took up, anything after that belongs to the next one.
pub fn decode_packet<T: ReadWritePacket>(
    data: &[u8],
    state: &PacketState,
) -> Result<(T, usize), PacketError> {
    let Some(prefix) = data.first_chunk::<LENGTH_PREFIX_SIZE>() else {
        return Err(PacketError::Framing("missing length prefix".to_string()));
    };

    let size = frame_size(*prefix)?;
    if data.len() < size {
        return Err(PacketError::Framing(format!(
            "length prefix claims {size} bytes but only {} arrived",
            data.len()
        )));
    }

    let packet = decode_body(data[LENGTH_PREFIX_SIZE..size].to_vec(), state)?;

    Ok((packet, size))
}

/// Decrypts (if keyed) and parses a body that was already cut out of its frame.
pub fn decode_body<T: ReadWritePacket>(
    mut body: Vec<u8>,
    state: &PacketState,
) -> Result<T, PacketError> {
    if let Some(cipher) = &state.cipher {
        cipher.decrypt(&mut body)?;
    }

    let size = body.len() as u32;
    let mut cursor = Cursor::new(&body);
    let packet = T::read_le_args(&mut cursor, (size,))?;

    Ok(packet)
}

#[cfg(test)]
mod tests {
    use binrw::binrw;

    use crate::common::{read_utf16z, write_utf16z};

    use super::*;

    #[binrw]
    #[brw(little)]
    #[br(import(_size: u32))]
    #[derive(Debug, Clone, PartialEq)]
    enum TestPacket {
        #[brw(magic = 0x01u8)]
        Ping { id: u32, flag: u8 },
        #[brw(magic = 0x02u8)]
        Echo {
            #[br(parse_with = read_utf16z)]
            #[bw(write_with = write_utf16z)]
            text: String,
            stamp: u64,
            short: u16,
        },
    }

    impl ReadWritePacket for TestPacket {
        fn get_name(&self) -> &'static str {
            match self {
                TestPacket::Ping { .. } => "Ping",
                TestPacket::Echo { .. } => "Echo",
            }
        }
    }

    fn test_cipher() -> PacketCipher {
        PacketCipher::new(b"0123456789abcdef").unwrap()
    }

    #[test]
    fn length_prefix_counts_itself() {
        let data = encode_packet(
            &TestPacket::Ping { id: 7, flag: 1 },
            &PacketState::default(),
        )
        .unwrap();

        // opcode + u32 + u8
        assert_eq!(data.len(), 2 + 6);
        assert_eq!(u16::from_le_bytes([data[0], data[1]]), 8);
        assert_eq!(&data[2..], &[0x01, 7, 0, 0, 0, 1]);
    }

    #[test]
    fn plain_and_encrypted_round_trip() {
        let packets = [
            TestPacket::Ping { id: 0xdeadbeef, flag: 0 },
            TestPacket::Echo {
                text: "hello".to_string(),
                stamp: u64::MAX,
                short: 0x1234,
            },
            TestPacket::Echo {
                text: String::new(),
                stamp: 0,
                short: 0,
            },
        ];

        for state in [PacketState::default(), PacketState::encrypted(test_cipher())] {
            for packet in &packets {
                let data = encode_packet(packet, &state).unwrap();
                let (decoded, consumed) = decode_packet::<TestPacket>(&data, &state).unwrap();
                assert_eq!(&decoded, packet);
                assert_eq!(consumed, data.len());
            }
        }
    }

    #[test]
    fn encrypted_bodies_are_block_aligned() {
        let state = PacketState::encrypted(test_cipher());
        let data = encode_packet(&TestPacket::Ping { id: 1, flag: 2 }, &state).unwrap();
        assert_eq!((data.len() - LENGTH_PREFIX_SIZE) % 8, 0);
    }

    #[test]
    fn truncated_frame_is_a_framing_error() {
        let state = PacketState::default();
        let data = encode_packet(&TestPacket::Ping { id: 7, flag: 1 }, &state).unwrap();

        for cut in 0..data.len() {
            let result = decode_packet::<TestPacket>(&data[..cut], &state);
            assert!(matches!(result, Err(PacketError::Framing(_))), "cut at {cut}");
        }
    }

    #[test]
    fn body_shorter_than_its_fields_is_a_framing_error() {
        // the prefix is honest, but a Ping needs 5 more bytes than this
        let data = [0x04, 0x00, 0x01, 0x07];
        let result = decode_packet::<TestPacket>(&data, &PacketState::default());
        assert!(matches!(result, Err(PacketError::Framing(_))));
    }

    #[test]
    fn unknown_opcode_is_a_framing_error() {
        let data = [0x03, 0x00, 0x7f];
        let result = decode_packet::<TestPacket>(&data, &PacketState::default());
        assert!(matches!(result, Err(PacketError::Framing(_))));
    }

    #[test]
    fn empty_frames_are_rejected() {
        assert!(frame_size([0x02, 0x00]).is_err());
        assert!(frame_size([0x00, 0x00]).is_err());
        assert_eq!(frame_size([0x03, 0x00]).unwrap(), 3);
    }

    #[test]
    fn decode_leaves_the_next_packet_alone() {
        let state = PacketState::default();
        let mut data = encode_packet(&TestPacket::Ping { id: 1, flag: 1 }, &state).unwrap();
        let second = encode_packet(&TestPacket::Ping { id: 2, flag: 0 }, &state).unwrap();
        data.extend_from_slice(&second);

        let (first, consumed) = decode_packet::<TestPacket>(&data, &state).unwrap();
        assert_eq!(first, TestPacket::Ping { id: 1, flag: 1 });

        let (next, _) = decode_packet::<TestPacket>(&data[consumed..], &state).unwrap();
        assert_eq!(next, TestPacket::Ping { id: 2, flag: 0 });
    }

    #[test]
    fn plaintext_is_rejected_on_a_keyed_connection() {
        let data = encode_packet(&TestPacket::Ping { id: 1, flag: 1 }, &PacketState::default())
            .unwrap();
        let result = decode_packet::<TestPacket>(&data, &PacketState::encrypted(test_cipher()));
        assert!(matches!(result, Err(PacketError::Cipher(_))));
    }
}
