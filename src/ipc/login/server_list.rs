use binrw::binrw;
use bitflags::bitflags;

use crate::common::{read_bool_from, write_bool_as};

#[binrw]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerType(u32);

bitflags! {
    impl ServerType : u32 {
        const NORMAL = 1;
        const RELAX = 2;
        const TEST = 4;
        /// Shown without any label next to the name.
        const NO_LABEL = 8;
        /// "This server has restrictions on character creation."
        const RESTRICTED = 16;
        const EVENT = 32;
        const FREE = 64;
    }
}

impl Default for ServerType {
    fn default() -> Self {
        Self::NORMAL
    }
}

#[binrw]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerInfo {
    pub id: u8,
    pub address: [u8; 4],
    pub port: u32,
    #[br(map = read_bool_from::<u8>)]
    #[bw(map = write_bool_as::<u8>)]
    pub age_limit: bool,
    #[br(map = read_bool_from::<u8>)]
    #[bw(map = write_bool_as::<u8>)]
    pub pvp: bool,
    pub current_players: u16,
    pub max_players: u16,
    /// Offline servers are greyed out in the list.
    #[br(map = read_bool_from::<u8>)]
    #[bw(map = write_bool_as::<u8>)]
    pub online: bool,
    pub server_type: ServerType,
    #[br(map = read_bool_from::<u8>)]
    #[bw(map = write_bool_as::<u8>)]
    pub brackets: bool,
}

impl ServerInfo {
    pub const SIZE: usize = 21;
}

#[binrw]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerList {
    #[bw(calc = servers.len() as u8)]
    pub count: u8,
    /// The server the account last played on, the client preselects it.
    pub last_server: u8,
    #[br(count = count)]
    pub servers: Vec<ServerInfo>,
}
