//! Packets between the client and the login server.

use binrw::binrw;

use crate::packet::{ReadWritePacket, SCRAMBLED_MODULUS_FIELD_SIZE};

mod server_list;
pub use server_list::{ServerInfo, ServerList, ServerType};

/// Magic numbers the client checks in `Init`.
pub const INIT_MARKERS: [u32; 4] = [0x29dd954e, 0x77c39cfc, 0x97adb620, 0x07bde0f7];

/// Everything in `Init` but the blowfish key, opcode included.
const INIT_FIXED_SIZE: u32 = 1 + 4 + 4 + SCRAMBLED_MODULUS_FIELD_SIZE as u32 + 16 + 1;

#[binrw]
#[brw(repr = u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginFailReason {
    SystemError = 0x01,
    PasswordWrong = 0x02,
    UserOrPassWrong = 0x03,
    AccessFailed = 0x04,
    AccountInUse = 0x07,
    ServerOverloaded = 0x0f,
    ServerMaintenance = 0x10,
}

#[binrw]
#[brw(repr = u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayFailReason {
    SystemError = 0x01,
    UserOrPassWrong = 0x02,
    AccessFailed = 0x04,
    AccountInUse = 0x07,
    TooManyPlayers = 0x0f,
    ServerMaintenance = 0x10,
    AccountSuspended = 0x11,
}

#[binrw]
#[brw(repr = u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountKickedReason {
    DataStealer = 0x01,
    GenericViolation = 0x08,
    SevenDaysSuspended = 0x10,
    PermanentlyBanned = 0x20,
}

#[binrw]
#[brw(little)]
#[br(import(_size: u32))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientLoginPacket {
    /// Credentials, RSA encrypted with the key from `Init`.
    #[brw(magic = 0x00u8)]
    RequestAuthLogin { block: [u8; 128], session_id: u32 },
    #[brw(magic = 0x02u8)]
    RequestServerLogin {
        login1: u32,
        login2: u32,
        server_id: u8,
    },
    #[brw(magic = 0x05u8)]
    RequestServerList { login1: u32, login2: u32 },
}

impl ReadWritePacket for ClientLoginPacket {
    fn get_name(&self) -> &'static str {
        match self {
            ClientLoginPacket::RequestAuthLogin { .. } => "RequestAuthLogin",
            ClientLoginPacket::RequestServerLogin { .. } => "RequestServerLogin",
            ClientLoginPacket::RequestServerList { .. } => "RequestServerList",
        }
    }
}

#[binrw]
#[brw(little)]
#[br(import(size: u32))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerLoginPacket {
    /// The only packet that's sent unencrypted.
    #[brw(magic = 0x00u8)]
    Init {
        session_id: u32,
        protocol_revision: u32,
        scrambled_modulus: [u8; SCRAMBLED_MODULUS_FIELD_SIZE],
        #[bw(calc = INIT_MARKERS)]
        #[br(assert(markers == INIT_MARKERS))]
        markers: [u32; 4],
        #[br(count = size.saturating_sub(INIT_FIXED_SIZE))]
        blowfish_key: Vec<u8>,
        #[bw(calc = 0u8)]
        #[br(assert(terminator == 0))]
        terminator: u8,
    },
    #[brw(magic = 0x01u8)]
    LoginFail { reason: LoginFailReason },
    #[brw(magic = 0x02u8)]
    AccountKicked { reason: AccountKickedReason },
    #[brw(magic = 0x03u8)]
    LoginOk { login1: u32, login2: u32 },
    #[brw(magic = 0x04u8)]
    ServerList(ServerList),
    #[brw(magic = 0x06u8)]
    PlayFail { reason: PlayFailReason },
    #[brw(magic = 0x07u8)]
    PlayOk { play1: u32, play2: u32 },
}

impl ReadWritePacket for ServerLoginPacket {
    fn get_name(&self) -> &'static str {
        match self {
            ServerLoginPacket::Init { .. } => "Init",
            ServerLoginPacket::LoginFail { .. } => "LoginFail",
            ServerLoginPacket::AccountKicked { .. } => "AccountKicked",
            ServerLoginPacket::LoginOk { .. } => "LoginOk",
            ServerLoginPacket::ServerList(..) => "ServerList",
            ServerLoginPacket::PlayFail { .. } => "PlayFail",
            ServerLoginPacket::PlayOk { .. } => "PlayOk",
        }
    }
}
