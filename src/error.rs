use thiserror::Error;

use crate::ipc::{
    interserver::LoginServerFailReason,
    login::{AccountKickedReason, LoginFailReason, PlayFailReason},
};

/// Anything that goes wrong while moving a packet on or off the wire. These
/// always drop the connection without a reply.
#[derive(Error, Debug)]
pub enum PacketError {
    /// Malformed or truncated packet, or a length prefix that doesn't match.
    #[error("framing error: {0}")]
    Framing(String),
    /// The body did not survive decryption (bad block length or checksum).
    #[error("cipher error: {0}")]
    Cipher(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("timed out waiting for the peer")]
    Timeout,
    /// The peer closed the connection between two packets.
    #[error("connection closed")]
    Closed,
}

impl From<binrw::Error> for PacketError {
    fn from(err: binrw::Error) -> Self {
        Self::Framing(err.to_string())
    }
}

/// How a login connection ended, when it didn't end cleanly.
#[derive(Error, Debug)]
pub enum LoginError {
    #[error(transparent)]
    Packet(#[from] PacketError),
    /// Bad credentials or banned account. The reply was already sent.
    #[error("authentication failed: {0:?}")]
    AuthenticationFailure(LoginFailReason),
    /// The account is banned. The reply was already sent.
    #[error("account kicked: {0:?}")]
    AccountKicked(AccountKickedReason),
    /// The presented login pair doesn't match the stored one.
    #[error("session key mismatch")]
    SessionMismatch,
    /// The selected game server can't take this player.
    #[error("admission rejected: {0:?}")]
    AdmissionRejected(PlayFailReason),
    /// A packet that isn't valid in the current state.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),
}

/// How a game server admission ended, when it didn't admit the player.
#[derive(Error, Debug)]
pub enum AdmissionError {
    #[error(transparent)]
    Packet(#[from] PacketError),
    #[error("admission rejected: {0:?}")]
    Rejected(PlayFailReason),
    /// The login server link is down, so no session key can be verified.
    #[error("login server channel unavailable")]
    ChannelUnavailable,
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),
}

impl AdmissionError {
    /// The reason sent back to the client before closing.
    pub fn reply_reason(&self) -> Option<PlayFailReason> {
        match self {
            Self::Rejected(reason) => Some(*reason),
            Self::ChannelUnavailable => Some(PlayFailReason::SystemError),
            Self::Packet(_) | Self::ProtocolViolation(_) => None,
        }
    }
}

/// Errors on the inter-server channel.
#[derive(Error, Debug)]
pub enum LinkError {
    #[error(transparent)]
    Packet(#[from] PacketError),
    #[error("login server refused registration: {0:?}")]
    Refused(LoginServerFailReason),
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml_ng::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
