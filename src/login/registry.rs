use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc::Sender;

use crate::common::timestamp_msecs;
use crate::config::GameServerEntry;
use crate::ipc::interserver::{LoginServerFailReason, LoginServerPacket, ServerState};
use crate::ipc::login::{PlayFailReason, ServerInfo, ServerType};

/// What a game server tells us about itself when it registers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAttach {
    pub address: [u8; 4],
    pub port: u16,
    pub max_players: u16,
    pub server_type: ServerType,
    pub age_limit: bool,
    pub pvp: bool,
    pub brackets: bool,
}

/// A change reported over a game server's channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryUpdate {
    PlayersInGame(Vec<String>),
    PlayerLogout(String),
    Status {
        max_players: u16,
        state: ServerState,
    },
    Characters {
        account: String,
        count: u8,
    },
    TempBan {
        account: String,
        until: u64,
    },
    LiftBan(String),
}

#[derive(Debug, Clone)]
pub struct ServerRegistration {
    pub id: u8,
    pub name: String,
    pub address: [u8; 4],
    pub port: u16,
    pub max_players: u16,
    pub online_accounts: HashSet<String>,
    pub state: ServerState,
    pub server_type: ServerType,
    pub age_limit: bool,
    pub pvp: bool,
    pub brackets: bool,
    /// Account name to the end of its ban, in milliseconds since the epoch.
    pub banned: Arc<HashMap<String, u64>>,
    /// Characters each account has on this server, as last reported.
    pub characters: HashMap<String, u8>,
    /// Present while the server's channel is connected.
    link: Option<Sender<LoginServerPacket>>,
}

impl ServerRegistration {
    fn new(entry: &GameServerEntry) -> Self {
        Self {
            id: entry.id,
            name: entry.name.clone(),
            address: [0; 4],
            port: 0,
            max_players: 0,
            online_accounts: HashSet::new(),
            state: ServerState::Down,
            server_type: ServerType::default(),
            age_limit: false,
            pvp: false,
            brackets: false,
            banned: Arc::default(),
            characters: HashMap::new(),
            link: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    pub fn is_up(&self) -> bool {
        self.is_connected() && self.state.is_open()
    }

    pub fn is_full(&self) -> bool {
        self.online_accounts.len() >= self.max_players as usize
    }

    pub fn is_banned(&self, account: &str) -> bool {
        self.banned
            .get(account)
            .is_some_and(|until| *until > timestamp_msecs())
    }

    fn to_server_info(&self) -> ServerInfo {
        ServerInfo {
            id: self.id,
            address: self.address,
            port: self.port as u32,
            age_limit: self.age_limit,
            pvp: self.pvp,
            current_players: self.online_accounts.len() as u16,
            max_players: self.max_players,
            online: self.is_up(),
            server_type: self.server_type,
            brackets: self.brackets,
        }
    }
}

/// Every game server the login server knows about. Registrations are only
/// changed by their own channel, each change under a single write lock.
#[derive(Debug, Default)]
pub struct ServerRegistry {
    servers: RwLock<BTreeMap<u8, ServerRegistration>>,
}

impl ServerRegistry {
    pub fn new(entries: &[GameServerEntry]) -> Self {
        let servers = entries
            .iter()
            .map(|entry| (entry.id, ServerRegistration::new(entry)))
            .collect();

        Self {
            servers: RwLock::new(servers),
        }
    }

    /// Marks a server as connected. Returns its configured name.
    pub fn attach(
        &self,
        id: u8,
        attach: ServerAttach,
        link: Sender<LoginServerPacket>,
    ) -> Result<String, LoginServerFailReason> {
        let mut servers = self.servers.write();
        let Some(server) = servers.get_mut(&id) else {
            return Err(LoginServerFailReason::NoFreeId);
        };

        if server.is_connected() {
            return Err(LoginServerFailReason::AlreadyLoggedIn);
        }

        server.address = attach.address;
        server.port = attach.port;
        server.max_players = attach.max_players;
        server.server_type = attach.server_type;
        server.age_limit = attach.age_limit;
        server.pvp = attach.pvp;
        server.brackets = attach.brackets;
        server.state = ServerState::Auto;
        server.online_accounts.clear();
        server.link = Some(link);

        Ok(server.name.clone())
    }

    /// The channel dropped: the server goes down and forgets who was online.
    pub fn detach(&self, id: u8) {
        let mut servers = self.servers.write();
        if let Some(server) = servers.get_mut(&id) {
            server.link = None;
            server.state = ServerState::Down;
            server.online_accounts.clear();
        }
    }

    /// Returns false if the server isn't registered.
    pub fn apply(&self, id: u8, update: RegistryUpdate) -> bool {
        let mut servers = self.servers.write();
        let Some(server) = servers.get_mut(&id) else {
            return false;
        };

        match update {
            RegistryUpdate::PlayersInGame(accounts) => {
                server.online_accounts.extend(accounts);
            }
            RegistryUpdate::PlayerLogout(account) => {
                server.online_accounts.remove(&account);
            }
            RegistryUpdate::Status { max_players, state } => {
                server.max_players = max_players;
                server.state = state;
            }
            RegistryUpdate::Characters { account, count } => {
                server.characters.insert(account, count);
            }
            RegistryUpdate::TempBan { account, until } => {
                Arc::make_mut(&mut server.banned).insert(account, until);
            }
            RegistryUpdate::LiftBan(account) => {
                Arc::make_mut(&mut server.banned).remove(&account);
            }
        }

        true
    }

    /// Whether `account` may pick server `id` right now.
    pub fn is_login_possible(&self, id: u8, account: &str) -> Result<(), PlayFailReason> {
        let servers = self.servers.read();
        let Some(server) = servers.get(&id) else {
            return Err(PlayFailReason::SystemError);
        };

        if !server.is_up() {
            return Err(PlayFailReason::SystemError);
        }

        if server.is_full() {
            return Err(PlayFailReason::TooManyPlayers);
        }

        if server.is_banned(account) {
            return Err(PlayFailReason::AccountSuspended);
        }

        Ok(())
    }

    pub fn server_list(&self) -> Vec<ServerInfo> {
        self.servers
            .read()
            .values()
            .map(ServerRegistration::to_server_info)
            .collect()
    }

    /// The server `account` is currently playing on, if any.
    pub fn find_online(&self, account: &str) -> Option<u8> {
        self.servers
            .read()
            .values()
            .find(|server| server.online_accounts.contains(account))
            .map(|server| server.id)
    }

    /// Queues a packet for server `id`'s channel. Fails if the server isn't
    /// connected or its channel can't keep up.
    pub fn send_to(&self, id: u8, packet: LoginServerPacket) -> bool {
        let servers = self.servers.read();
        let Some(link) = servers.get(&id).and_then(|server| server.link.as_ref()) else {
            return false;
        };

        link.try_send(packet).is_ok()
    }

    /// Asks every connected server how many characters `account` has there.
    pub fn request_characters(&self, account: &str) {
        let servers = self.servers.read();
        for link in servers.values().filter_map(|server| server.link.as_ref()) {
            let _ = link.try_send(LoginServerPacket::RequestCharacters {
                account: account.to_string(),
            });
        }
    }

    pub fn character_count(&self, id: u8, account: &str) -> Option<u8> {
        self.servers
            .read()
            .get(&id)
            .and_then(|server| server.characters.get(account).copied())
    }

    /// A snapshot of one registration.
    pub fn get(&self, id: u8) -> Option<ServerRegistration> {
        self.servers.read().get(&id).cloned()
    }
}
