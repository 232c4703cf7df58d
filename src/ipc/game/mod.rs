//! Packets between the client and a game server, up to character selection.

use binrw::binrw;

use crate::common::{read_bool_from, read_utf16z, write_bool_as, write_utf16z};
use crate::ipc::login::PlayFailReason;
use crate::packet::{BLOWFISH_KEY_SIZE, ReadWritePacket};

#[binrw]
#[brw(little)]
#[br(import(_size: u32))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientGamePacket {
    /// The only packet the client sends unencrypted.
    #[brw(magic = 0x0eu8)]
    ProtocolVersion { revision: u32 },
    #[brw(magic = 0x2bu8)]
    AuthLogin {
        #[br(parse_with = read_utf16z)]
        #[bw(write_with = write_utf16z)]
        account: String,
        // the play pair comes first, and swapped
        play2: u32,
        play1: u32,
        login1: u32,
        login2: u32,
        server_id: u8,
    },
    #[brw(magic = 0x09u8)]
    Logout,
}

impl ReadWritePacket for ClientGamePacket {
    fn get_name(&self) -> &'static str {
        match self {
            ClientGamePacket::ProtocolVersion { .. } => "ProtocolVersion",
            ClientGamePacket::AuthLogin { .. } => "AuthLogin",
            ClientGamePacket::Logout => "Logout",
        }
    }
}

#[binrw]
#[brw(little)]
#[br(import(_size: u32))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerGamePacket {
    /// Unencrypted. When the revision isn't supported the key is all zeroes.
    #[brw(magic = 0x2eu8)]
    KeyPacket {
        #[br(map = read_bool_from::<u8>)]
        #[bw(map = write_bool_as::<u8>)]
        protocol_ok: bool,
        blowfish_key: [u8; BLOWFISH_KEY_SIZE],
        server_id: u8,
    },
    #[brw(magic = 0x13u8)]
    CharSelectionInfo {
        #[br(parse_with = read_utf16z)]
        #[bw(write_with = write_utf16z)]
        account: String,
        character_count: u32,
    },
    #[brw(magic = 0x14u8)]
    AuthLoginFail { reason: PlayFailReason },
    #[brw(magic = 0x7eu8)]
    LeaveWorld,
}

impl ReadWritePacket for ServerGamePacket {
    fn get_name(&self) -> &'static str {
        match self {
            ServerGamePacket::KeyPacket { .. } => "KeyPacket",
            ServerGamePacket::CharSelectionInfo { .. } => "CharSelectionInfo",
            ServerGamePacket::AuthLoginFail { .. } => "AuthLoginFail",
            ServerGamePacket::LeaveWorld => "LeaveWorld",
        }
    }
}
