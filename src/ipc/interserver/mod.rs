//! Packets on the channel between the login server and its game servers.
//! None of these are ever accepted from a client socket.

use binrw::binrw;

use crate::common::{
    SessionKey, read_bool_from, read_utf16z, read_utf16z_list, write_bool_as, write_utf16z,
    write_utf16z_list,
};
use crate::packet::ReadWritePacket;

/// Most entries a counted list (`PlayerInGame`, `SendMail` args) can carry.
pub const MAX_LIST_LEN: usize = u8::MAX as usize;

#[binrw]
#[brw(repr = u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginServerFailReason {
    WrongSecret = 0x03,
    IdReserved = 0x04,
    NoFreeId = 0x05,
    NotAuthed = 0x06,
    AlreadyLoggedIn = 0x07,
}

/// What a game server reports about itself in `ServerStatus`.
#[binrw]
#[brw(repr = u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerState {
    #[default]
    Auto = 0x00,
    Good = 0x01,
    Normal = 0x02,
    Full = 0x03,
    Down = 0x04,
    GmOnly = 0x05,
}

impl ServerState {
    /// Whether regular players can log in.
    pub fn is_open(&self) -> bool {
        !matches!(self, ServerState::Down | ServerState::GmOnly)
    }
}

/// Game server to login server.
#[binrw]
#[brw(little)]
#[br(import(_size: u32))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameServerPacket {
    #[brw(magic = 0x01u8)]
    GameServerAuth {
        server_id: u8,
        #[br(parse_with = read_utf16z)]
        #[bw(write_with = write_utf16z)]
        secret: String,
        max_players: u16,
        host: [u8; 4],
        port: u16,
        server_type: u32,
        #[br(map = read_bool_from::<u8>)]
        #[bw(map = write_bool_as::<u8>)]
        age_limit: bool,
        #[br(map = read_bool_from::<u8>)]
        #[bw(map = write_bool_as::<u8>)]
        pvp: bool,
        #[br(map = read_bool_from::<u8>)]
        #[bw(map = write_bool_as::<u8>)]
        brackets: bool,
    },
    /// Sent when a player joins, and for everyone online after a reconnect.
    #[brw(magic = 0x02u8)]
    PlayerInGame {
        #[bw(calc = accounts.len() as u8)]
        count: u8,
        #[br(parse_with = read_utf16z_list, args(count))]
        #[bw(write_with = write_utf16z_list)]
        accounts: Vec<String>,
    },
    #[brw(magic = 0x03u8)]
    PlayerLogout {
        #[br(parse_with = read_utf16z)]
        #[bw(write_with = write_utf16z)]
        account: String,
    },
    #[brw(magic = 0x05u8)]
    PlayerAuthRequest {
        #[br(parse_with = read_utf16z)]
        #[bw(write_with = write_utf16z)]
        account: String,
        key: SessionKey,
    },
    #[brw(magic = 0x06u8)]
    ServerStatus {
        online_players: u16,
        max_players: u16,
        state: ServerState,
    },
    #[brw(magic = 0x08u8)]
    ReplyCharacters {
        #[br(parse_with = read_utf16z)]
        #[bw(write_with = write_utf16z)]
        account: String,
        characters: u8,
        #[bw(calc = delete_timestamps.len() as u8)]
        pending_deletes: u8,
        #[br(count = pending_deletes)]
        delete_timestamps: Vec<u64>,
    },
    #[brw(magic = 0x09u8)]
    SendMail {
        #[br(parse_with = read_utf16z)]
        #[bw(write_with = write_utf16z)]
        account: String,
        #[br(parse_with = read_utf16z)]
        #[bw(write_with = write_utf16z)]
        mail_id: String,
        #[bw(calc = args.len() as u8)]
        arg_count: u8,
        #[br(parse_with = read_utf16z_list, args(arg_count))]
        #[bw(write_with = write_utf16z_list)]
        args: Vec<String>,
    },
    #[brw(magic = 0x0au8)]
    RequestTempBan {
        #[br(parse_with = read_utf16z)]
        #[bw(write_with = write_utf16z)]
        account: String,
        /// Milliseconds since the UNIX epoch.
        ban_until: u64,
    },
    #[brw(magic = 0x0bu8)]
    LiftBan {
        #[br(parse_with = read_utf16z)]
        #[bw(write_with = write_utf16z)]
        account: String,
    },
}

impl ReadWritePacket for GameServerPacket {
    fn get_name(&self) -> &'static str {
        match self {
            GameServerPacket::GameServerAuth { .. } => "GameServerAuth",
            GameServerPacket::PlayerInGame { .. } => "PlayerInGame",
            GameServerPacket::PlayerLogout { .. } => "PlayerLogout",
            GameServerPacket::PlayerAuthRequest { .. } => "PlayerAuthRequest",
            GameServerPacket::ServerStatus { .. } => "ServerStatus",
            GameServerPacket::ReplyCharacters { .. } => "ReplyCharacters",
            GameServerPacket::SendMail { .. } => "SendMail",
            GameServerPacket::RequestTempBan { .. } => "RequestTempBan",
            GameServerPacket::LiftBan { .. } => "LiftBan",
        }
    }
}

/// Login server to game server.
#[binrw]
#[brw(little)]
#[br(import(_size: u32))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginServerPacket {
    /// Unencrypted, everything after it uses the shared key.
    #[brw(magic = 0x00u8)]
    InitLs { revision: u32 },
    #[brw(magic = 0x01u8)]
    LoginServerFail { reason: LoginServerFailReason },
    #[brw(magic = 0x02u8)]
    AuthResponse {
        server_id: u8,
        #[br(parse_with = read_utf16z)]
        #[bw(write_with = write_utf16z)]
        server_name: String,
    },
    #[brw(magic = 0x03u8)]
    PlayerAuthResponse {
        #[br(parse_with = read_utf16z)]
        #[bw(write_with = write_utf16z)]
        account: String,
        #[br(map = read_bool_from::<u8>)]
        #[bw(map = write_bool_as::<u8>)]
        authorized: bool,
    },
    #[brw(magic = 0x04u8)]
    KickPlayer {
        #[br(parse_with = read_utf16z)]
        #[bw(write_with = write_utf16z)]
        account: String,
    },
    #[brw(magic = 0x05u8)]
    RequestCharacters {
        #[br(parse_with = read_utf16z)]
        #[bw(write_with = write_utf16z)]
        account: String,
    },
}

impl ReadWritePacket for LoginServerPacket {
    fn get_name(&self) -> &'static str {
        match self {
            LoginServerPacket::InitLs { .. } => "InitLs",
            LoginServerPacket::LoginServerFail { .. } => "LoginServerFail",
            LoginServerPacket::AuthResponse { .. } => "AuthResponse",
            LoginServerPacket::PlayerAuthResponse { .. } => "PlayerAuthResponse",
            LoginServerPacket::KickPlayer { .. } => "KickPlayer",
            LoginServerPacket::RequestCharacters { .. } => "RequestCharacters",
        }
    }
}
