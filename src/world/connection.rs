use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::{Receiver, channel};

use crate::GAME_PROTOCOL_REVISION;
use crate::common::SessionKey;
use crate::error::{AdmissionError, PacketError};
use crate::ipc::game::{ClientGamePacket, ServerGamePacket};
use crate::ipc::login::PlayFailReason;
use crate::packet::{
    BLOWFISH_KEY_SIZE, PacketCipher, PacketState, ReadWritePacket, generate_blowfish_key,
    read_packet, send_packet,
};

use super::{ClientHandle, ClientId, FromServer, GameServerState, ToServer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionState {
    /// Waiting for `ProtocolVersion`.
    Connected,
    /// Keys were exchanged, waiting for `AuthLogin`.
    Keyed,
    Joined,
    Closed,
}

/// What woke up a joined connection.
enum Wakeup {
    Server(Option<FromServer>),
    Client(Result<ClientGamePacket, PacketError>),
}

/// Represents a single connection between an instance of the client and the game server.
pub struct GameConnection<S> {
    socket: S,
    state: PacketState,
    server: Arc<GameServerState>,
    blowfish_key: [u8; BLOWFISH_KEY_SIZE],

    pub id: ClientId,
    pub admission_state: AdmissionState,
    pub account: Option<String>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> GameConnection<S> {
    pub fn new(socket: S, server: Arc<GameServerState>) -> Self {
        Self {
            socket,
            state: PacketState::default(),
            blowfish_key: generate_blowfish_key(),
            id: server.handle.next_id(),
            admission_state: AdmissionState::Connected,
            account: None,
            server,
        }
    }

    /// Drives the connection until the player leaves, gets kicked or is refused.
    pub async fn run(mut self) -> Result<(), AdmissionError> {
        let result = self.handle_packets().await;
        self.close().await;

        match result {
            Err(AdmissionError::Packet(PacketError::Closed)) => Ok(()),
            result => result,
        }
    }

    async fn handle_packets(&mut self) -> Result<(), AdmissionError> {
        self.exchange_keys().await?;

        let mut messages = match self.admit().await {
            Ok(messages) => messages,
            Err(err) => {
                self.reject(&err).await;
                return Err(err);
            }
        };

        self.serve(&mut messages).await
    }

    async fn send(&mut self, packet: ServerGamePacket) -> Result<(), PacketError> {
        send_packet(&mut self.socket, &self.state, &packet).await
    }

    async fn exchange_keys(&mut self) -> Result<(), AdmissionError> {
        let packet: ClientGamePacket = read_packet(
            &mut self.socket,
            &self.state,
            self.server.config.handshake_timeout(),
        )
        .await?;

        let ClientGamePacket::ProtocolVersion { revision } = packet else {
            return Err(AdmissionError::ProtocolViolation(
                "expected ProtocolVersion",
            ));
        };

        let server_id = self.server.config.server_id;
        if revision != GAME_PROTOCOL_REVISION {
            tracing::warn!("Client {:?} speaks protocol {revision}", self.id);
            self.send(ServerGamePacket::KeyPacket {
                protocol_ok: false,
                blowfish_key: [0; BLOWFISH_KEY_SIZE],
                server_id,
            })
            .await?;
            return Err(AdmissionError::ProtocolViolation(
                "unsupported protocol revision",
            ));
        }

        self.send(ServerGamePacket::KeyPacket {
            protocol_ok: true,
            blowfish_key: self.blowfish_key,
            server_id,
        })
        .await?;

        self.state = PacketState::encrypted(PacketCipher::new(&self.blowfish_key)?);
        self.admission_state = AdmissionState::Keyed;

        Ok(())
    }

    /// The checks that don't need the login server, cheapest first.
    fn check_admission(&self, account: &str, server_id: u8) -> Result<(), AdmissionError> {
        let server = &self.server;

        if server_id != server.config.server_id {
            return Err(AdmissionError::Rejected(PlayFailReason::AccessFailed));
        }

        if !server.login_link.is_available() {
            return Err(AdmissionError::ChannelUnavailable);
        }

        if server.handle.joined() >= server.config.max_players as usize {
            return Err(AdmissionError::Rejected(PlayFailReason::TooManyPlayers));
        }

        if server.bans.is_banned(account) {
            return Err(AdmissionError::Rejected(PlayFailReason::AccountSuspended));
        }

        Ok(())
    }

    /// Returns the receiving end of this player's channel from the main loop.
    async fn admit(&mut self) -> Result<Receiver<FromServer>, AdmissionError> {
        let packet: ClientGamePacket = read_packet(
            &mut self.socket,
            &self.state,
            self.server.config.handshake_timeout(),
        )
        .await?;

        let ClientGamePacket::AuthLogin {
            account,
            play2,
            play1,
            login1,
            login2,
            server_id,
        } = packet
        else {
            return Err(AdmissionError::ProtocolViolation("expected AuthLogin"));
        };

        let account = account.to_lowercase();
        self.check_admission(&account, server_id)?;

        let key = SessionKey::new(login1, login2, play1, play2);
        let authorized = self
            .server
            .login_link
            .request_player_auth(&account, key, self.server.config.auth_timeout())
            .await?;
        if !authorized {
            tracing::warn!("Login server doesn't know the session {account} presented");
            return Err(AdmissionError::Rejected(PlayFailReason::AccessFailed));
        }

        let (send, recv) = channel(8);
        let handle = ClientHandle {
            id: self.id,
            account: account.clone(),
            channel: send,
        };
        self.server
            .handle
            .register(handle)
            .await
            .map_err(AdmissionError::Rejected)?;

        self.account = Some(account.clone());
        self.admission_state = AdmissionState::Joined;

        tracing::info!("{account} joined as {:?}", self.id);

        // characters aren't stored here
        self.send(ServerGamePacket::CharSelectionInfo {
            account,
            character_count: 0,
        })
        .await?;

        Ok(recv)
    }

    async fn reject(&mut self, err: &AdmissionError) {
        let Some(reason) = err.reply_reason() else {
            return;
        };

        tracing::warn!("Refused client {:?}: {err}", self.id);
        if let Err(err) = self.send(ServerGamePacket::AuthLoginFail { reason }).await {
            tracing::debug!("Couldn't tell client {:?} why: {err}", self.id);
        }
    }

    async fn serve(&mut self, messages: &mut Receiver<FromServer>) -> Result<(), AdmissionError> {
        loop {
            let wakeup = tokio::select! {
                msg = messages.recv() => Wakeup::Server(msg),
                packet = read_packet(&mut self.socket, &self.state, Duration::MAX) => {
                    Wakeup::Client(packet)
                }
            };

            match wakeup {
                Wakeup::Server(Some(FromServer::Kick)) | Wakeup::Server(None) => {
                    tracing::info!("Kicking client {:?}", self.id);
                    self.send(ServerGamePacket::LeaveWorld).await?;
                    return Ok(());
                }
                Wakeup::Client(packet) => match packet? {
                    ClientGamePacket::Logout => {
                        self.send(ServerGamePacket::LeaveWorld).await?;
                        return Ok(());
                    }
                    packet => {
                        tracing::warn!(
                            "Client {:?} sent {} after joining",
                            self.id,
                            packet.get_name()
                        );
                        return Err(AdmissionError::ProtocolViolation(
                            "handshake packet after joining",
                        ));
                    }
                },
            }
        }
    }

    async fn close(&mut self) {
        if self.admission_state == AdmissionState::Joined {
            self.server.handle.send(ToServer::Disconnected(self.id)).await;
        }
        self.admission_state = AdmissionState::Closed;
    }
}
