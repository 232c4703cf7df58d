//! Login and game server handshake for a certain MMO.
//!
//! A client authenticates against the login server, receives a session key,
//! picks a game server and reconnects to it. The game server then asks the
//! login server (over the inter-server channel) whether the presented key is
//! valid before admitting the player.

#![allow(clippy::large_enum_variant)]

/// Common functions, structures used between all servers.
pub mod common;

/// Config management.
pub mod config;

/// Error types for every protocol layer.
pub mod error;

/// Publish/subscribe registry for server events.
pub mod events;

/// Everything packet parsing related.
pub mod packet;

/// Packet definitions, grouped by which link they travel over.
pub mod ipc;

/// Login server-specific code.
pub mod login;

/// Game server-specific code.
pub mod world;

/// Protocol revision announced in the `Init` packet.
pub const PROTOCOL_REVISION: u32 = 0x0000c621;

/// Protocol revision a game client must announce in `ProtocolVersion`.
pub const GAME_PROTOCOL_REVISION: u32 = 746;

/// Revision of the inter-server channel.
pub const INTERSERVER_REVISION: u32 = 0x0106;
