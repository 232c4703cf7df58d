use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Where `get_config` looks for the config file.
pub const CONFIG_PATH: &str = "config.yaml";

/// A game server the login server is willing to register.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct GameServerEntry {
    pub id: u8,
    pub name: String,
    /// Shared secret the game server presents in `GameServerAuth`.
    pub secret: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct LoginConfig {
    pub listen_address: IpAddr,
    pub port: u16,
    /// When disabled the client never went through the license screen, so
    /// server selection doesn't check the login pair.
    pub show_license: bool,
    pub handshake_timeout_secs: u64,
    /// How long an issued session key stays usable.
    pub session_ttl_secs: u64,
    /// Size of the RSA key pair pool generated at startup.
    pub rsa_key_pairs: usize,
    pub game_servers: Vec<GameServerEntry>,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            listen_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 2106,
            show_license: true,
            handshake_timeout_secs: 60,
            session_ttl_secs: 300,
            rsa_key_pairs: 4,
            game_servers: vec![GameServerEntry {
                id: 1,
                name: "Bartz".to_string(),
                secret: "change-me".to_string(),
            }],
        }
    }
}

impl LoginConfig {
    /// Returns the configured IP address & port as a `SocketAddr`.
    pub fn get_socketaddr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_address, self.port)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct GameConfig {
    pub listen_address: IpAddr,
    pub port: u16,
    pub server_id: u8,
    /// Presented to the login server when registering.
    pub secret: String,
    pub max_players: u16,
    /// Address advertised in the login server's server list.
    pub advertised_host: Ipv4Addr,
    pub server_type: u32,
    pub age_limit: bool,
    pub pvp: bool,
    pub brackets: bool,
    pub handshake_timeout_secs: u64,
    /// How long to wait for the login server to answer a `PlayerAuthRequest`.
    pub auth_timeout_secs: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            listen_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 7777,
            server_id: 1,
            secret: "change-me".to_string(),
            max_players: 100,
            advertised_host: Ipv4Addr::LOCALHOST,
            server_type: 1,
            age_limit: false,
            pvp: true,
            brackets: false,
            handshake_timeout_secs: 60,
            auth_timeout_secs: 10,
        }
    }
}

impl GameConfig {
    /// Returns the configured IP address & port as a `SocketAddr`.
    pub fn get_socketaddr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_address, self.port)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct InterServerConfig {
    /// The login server listens here for game servers, and game servers
    /// connect here.
    pub address: IpAddr,
    pub port: u16,
    /// Blowfish key for the channel, shared by both sides.
    pub blowfish_key: String,
    pub reconnect_delay_secs: u64,
}

impl Default for InterServerConfig {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 9014,
            blowfish_key: "_;v.]05-31!|+-%xT!^[$".to_string(),
            reconnect_delay_secs: 5,
        }
    }
}

impl InterServerConfig {
    /// Returns the configured IP address & port as a `SocketAddr`.
    pub fn get_socketaddr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

/// An account known to the built-in account store.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AccountConfig {
    pub name: String,
    pub password: String,
    #[serde(default)]
    pub banned: bool,
}

/// Global and all per-server configuration options.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Config {
    /// Passed to the tracing `EnvFilter` when `RUST_LOG` isn't set.
    pub log_filter: String,
    pub login: LoginConfig,
    pub game: GameConfig,
    pub interserver: InterServerConfig,
    pub accounts: Vec<AccountConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            login: LoginConfig::default(),
            game: GameConfig::default(),
            interserver: InterServerConfig::default(),
            accounts: Vec::new(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml_ng::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        // blowfish only accepts keys of 4..=56 bytes
        let key_len = self.interserver.blowfish_key.len();
        if !(4..=56).contains(&key_len) {
            return Err(ConfigError::Invalid(format!(
                "interserver blowfish key must be 4 to 56 bytes, got {key_len}"
            )));
        }

        if self.login.rsa_key_pairs == 0 {
            return Err(ConfigError::Invalid(
                "at least one RSA key pair is required".to_string(),
            ));
        }

        Ok(())
    }
}

/// Reads `config.yaml`, falling back to the defaults if it doesn't exist.
pub fn get_config() -> Result<Config, ConfigError> {
    if Path::new(CONFIG_PATH).exists() {
        Config::load(CONFIG_PATH)
    } else {
        tracing::warn!("{CONFIG_PATH} not found, using the default config");
        Ok(Config::default())
    }
}
