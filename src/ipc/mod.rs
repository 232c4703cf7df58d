/// Client <-> login server.
pub mod login;

/// Client <-> game server.
pub mod game;

/// Login server <-> game server.
pub mod interserver;
