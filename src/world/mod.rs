mod bans;
pub use bans::BanList;

mod common;
pub use common::{ClientHandle, ClientId, FromServer, ServerHandle, ToServer};

mod connection;
pub use connection::{AdmissionState, GameConnection};

mod login_link;
pub use login_link::{LoginLink, run_login_link};

mod server;
pub use server::{server_main_loop, spawn_main_loop};

use crate::config::{Config, GameConfig, InterServerConfig};

/// Everything a game server shares between its connections.
#[derive(Debug)]
pub struct GameServerState {
    pub config: GameConfig,
    pub interserver: InterServerConfig,
    pub login_link: LoginLink,
    pub handle: ServerHandle,
    pub bans: BanList,
}

impl GameServerState {
    /// Also spawns the main loop, so this has to be called from within a runtime.
    pub fn new(config: &Config) -> Self {
        let login_link = LoginLink::new();
        let (handle, _) = spawn_main_loop(login_link.clone(), config.game.max_players as usize);

        Self {
            config: config.game.clone(),
            interserver: config.interserver.clone(),
            login_link,
            handle,
            bans: BanList::new(),
        }
    }
}
