use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::{Config, InterServerConfig, LoginConfig};
use crate::events::EventRegistry;
use crate::packet::KeyPairPool;

mod accounts;
pub use accounts::{AccountStore, AuthOutcome, ConfigAccountStore};

mod connection;
pub use connection::{LoginConnection, LoginState};

mod gameserver_link;
pub use gameserver_link::serve_game_server;

mod registry;
pub use registry::{RegistryUpdate, ServerAttach, ServerRegistration, ServerRegistry};

mod session;
pub use session::{ConnectionId, SessionKeyManager, SessionRecord};

/// Everything the login server shares between its connections. Built once at
/// startup and handed to every task behind an `Arc`.
pub struct LoginServerState {
    pub config: LoginConfig,
    pub interserver: InterServerConfig,
    pub sessions: SessionKeyManager,
    pub registry: ServerRegistry,
    pub accounts: Box<dyn AccountStore>,
    pub key_pairs: KeyPairPool,
    pub events: EventRegistry,
    next_connection_id: AtomicU64,
}

impl LoginServerState {
    pub fn new(config: &Config, accounts: Box<dyn AccountStore>, key_pairs: KeyPairPool) -> Self {
        Self {
            config: config.login.clone(),
            interserver: config.interserver.clone(),
            sessions: SessionKeyManager::new(config.login.session_ttl()),
            registry: ServerRegistry::new(&config.login.game_servers),
            accounts,
            key_pairs,
            events: EventRegistry::new(),
            next_connection_id: AtomicU64::new(1),
        }
    }

    pub fn next_connection_id(&self) -> ConnectionId {
        ConnectionId(self.next_connection_id.fetch_add(1, Ordering::Relaxed))
    }
}
