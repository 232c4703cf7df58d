use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::PROTOCOL_REVISION;
use crate::common::SessionKey;
use crate::error::{LoginError, PacketError};
use crate::events::Event;
use crate::ipc::interserver::LoginServerPacket;
use crate::ipc::login::{
    AccountKickedReason, ClientLoginPacket, LoginFailReason, ServerList, ServerLoginPacket,
};
use crate::packet::{
    BLOWFISH_KEY_SIZE, MODULUS_SIZE, PacketCipher, PacketState, ReadWritePacket,
    ScrambledKeyPair, generate_blowfish_key, read_packet, send_packet,
};

use super::{AuthOutcome, ConnectionId, LoginServerState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    /// `Init` was sent, waiting for credentials.
    Connected,
    Authenticating,
    /// Holds a login pair.
    Authenticated,
    /// Holds a play pair, the client is expected to go to the game server.
    ServerSelected,
    Closed,
}

/// Represents a single connection between an instance of the client and the login server.
pub struct LoginConnection<S> {
    socket: S,
    state: PacketState,
    server: Arc<LoginServerState>,

    pub id: ConnectionId,
    session_id: u32,
    key_pair: Arc<ScrambledKeyPair>,
    blowfish_key: [u8; BLOWFISH_KEY_SIZE],

    pub login_state: LoginState,
    pub account: Option<String>,
    pub session_key: Option<SessionKey>,
    pub selected_server: Option<u8>,
    /// Set once a play pair was handed out. The session then outlives this
    /// connection, since the client drops it to reconnect to the game server.
    pub joined_game_server: bool,
}

impl<S: AsyncRead + AsyncWrite + Unpin> LoginConnection<S> {
    pub fn new(socket: S, server: Arc<LoginServerState>) -> Self {
        let id = server.next_connection_id();
        let key_pair = server.key_pairs.pick();

        Self {
            socket,
            state: PacketState::default(),
            id,
            session_id: fastrand::u32(..),
            key_pair,
            blowfish_key: generate_blowfish_key(),
            login_state: LoginState::Connected,
            account: None,
            session_key: None,
            selected_server: None,
            joined_game_server: false,
            server,
        }
    }

    /// Whether server selection has to present the login pair. Clients that
    /// skip the license screen never send it back.
    pub fn login_pair_required(&self) -> bool {
        self.server.config.show_license
    }

    /// Drives the connection until the client leaves or gets rejected.
    pub async fn run(mut self) -> Result<(), LoginError> {
        let result = self.handle_packets().await;
        self.close();

        match result {
            // the client hung up between two packets
            Err(LoginError::Packet(PacketError::Closed)) => Ok(()),
            result => result,
        }
    }

    async fn handle_packets(&mut self) -> Result<(), LoginError> {
        self.send_init().await?;

        loop {
            let packet: ClientLoginPacket = read_packet(
                &mut self.socket,
                &self.state,
                self.server.config.handshake_timeout(),
            )
            .await?;

            match (self.login_state, packet) {
                (
                    LoginState::Connected,
                    ClientLoginPacket::RequestAuthLogin { block, session_id },
                ) => self.authenticate(&block, session_id).await?,
                (
                    LoginState::Authenticated,
                    ClientLoginPacket::RequestServerList { login1, login2 },
                ) => self.send_server_list(login1, login2).await?,
                (
                    LoginState::Authenticated,
                    ClientLoginPacket::RequestServerLogin {
                        login1,
                        login2,
                        server_id,
                    },
                ) => self.select_server(login1, login2, server_id).await?,
                (state, packet) => {
                    tracing::warn!(
                        "Connection {:?} sent {} while {state:?}",
                        self.id,
                        packet.get_name()
                    );
                    return Err(LoginError::ProtocolViolation(
                        "packet is not valid in this state",
                    ));
                }
            }
        }
    }

    async fn send(&mut self, packet: ServerLoginPacket) -> Result<(), PacketError> {
        send_packet(&mut self.socket, &self.state, &packet).await
    }

    /// Sends `Init` in the clear, everything after it is encrypted.
    async fn send_init(&mut self) -> Result<(), LoginError> {
        let init = ServerLoginPacket::Init {
            session_id: self.session_id,
            protocol_revision: PROTOCOL_REVISION,
            scrambled_modulus: self.key_pair.modulus_field(),
            blowfish_key: self.blowfish_key.to_vec(),
        };
        self.send(init).await?;

        self.state = PacketState::encrypted(PacketCipher::new(&self.blowfish_key)?);

        Ok(())
    }

    async fn authenticate(
        &mut self,
        block: &[u8; MODULUS_SIZE],
        session_id: u32,
    ) -> Result<(), LoginError> {
        self.login_state = LoginState::Authenticating;

        if session_id != self.session_id {
            return Err(LoginError::ProtocolViolation(
                "RequestAuthLogin echoed the wrong session id",
            ));
        }

        let credentials = self.key_pair.decrypt_credentials(block)?;
        let account = credentials.account;

        match self
            .server
            .accounts
            .authenticate(&account, &credentials.password)
        {
            AuthOutcome::Ok => {}
            AuthOutcome::WrongPassword | AuthOutcome::UnknownAccount => {
                tracing::warn!("Rejected credentials for {account}");
                return self.reject_login(LoginFailReason::UserOrPassWrong).await;
            }
            AuthOutcome::Banned => {
                tracing::warn!("{account} is banned");
                let reason = AccountKickedReason::PermanentlyBanned;
                self.send(ServerLoginPacket::AccountKicked { reason }).await?;
                return Err(LoginError::AccountKicked(reason));
            }
        }

        if let Some(server_id) = self.server.registry.find_online(&account) {
            tracing::info!("{account} is still on server {server_id}, kicking them");
            self.server.registry.send_to(
                server_id,
                LoginServerPacket::KickPlayer {
                    account: account.clone(),
                },
            );
            return self.reject_login(LoginFailReason::AccountInUse).await;
        }

        let key = self.server.sessions.issue_login_session(&account, self.id);
        self.account = Some(account.clone());
        self.session_key = Some(key);

        self.send(ServerLoginPacket::LoginOk {
            login1: key.login1,
            login2: key.login2,
        })
        .await?;
        self.login_state = LoginState::Authenticated;

        tracing::info!("{account} logged in");

        self.server.registry.request_characters(&account);
        self.server
            .events
            .publish(Event::AccountAuthenticated { account });

        Ok(())
    }

    async fn reject_login(&mut self, reason: LoginFailReason) -> Result<(), LoginError> {
        self.send(ServerLoginPacket::LoginFail { reason }).await?;
        Err(LoginError::AuthenticationFailure(reason))
    }

    async fn reject_session(&mut self) -> Result<(), LoginError> {
        tracing::warn!("Connection {:?} presented a stale login pair", self.id);
        self.send(ServerLoginPacket::LoginFail {
            reason: LoginFailReason::AccessFailed,
        })
        .await?;
        Err(LoginError::SessionMismatch)
    }

    /// Checks against both our copy of the key and the manager's, the latter
    /// changes when another login for the same account comes in.
    fn login_pair_matches(&self, login1: u32, login2: u32) -> bool {
        let (Some(account), Some(key)) = (&self.account, &self.session_key) else {
            return false;
        };

        key.check_login_pair(login1, login2)
            && self.server.sessions.check_login_pair(account, login1, login2)
    }

    async fn send_server_list(&mut self, login1: u32, login2: u32) -> Result<(), LoginError> {
        if !self.login_pair_matches(login1, login2) {
            return self.reject_session().await;
        }

        let servers = self.server.registry.server_list();
        self.send(ServerLoginPacket::ServerList(ServerList {
            last_server: 0,
            servers,
        }))
        .await?;

        Ok(())
    }

    async fn select_server(
        &mut self,
        login1: u32,
        login2: u32,
        server_id: u8,
    ) -> Result<(), LoginError> {
        let (Some(account), Some(key)) = (self.account.clone(), self.session_key) else {
            return Err(LoginError::ProtocolViolation("no session to select with"));
        };

        if self.login_pair_required() && !self.login_pair_matches(login1, login2) {
            return self.reject_session().await;
        }

        if let Err(reason) = self.server.registry.is_login_possible(server_id, &account) {
            tracing::warn!("{account} can't join server {server_id}: {reason:?}");
            self.send(ServerLoginPacket::PlayFail { reason }).await?;
            return Err(LoginError::AdmissionRejected(reason));
        }

        // our own login pair, the presented one might not have been checked
        let Some(key) =
            self.server
                .sessions
                .issue_play_pair(&account, key.login1, key.login2, server_id)
        else {
            return self.reject_session().await;
        };

        self.session_key = Some(key);
        self.selected_server = Some(server_id);
        self.joined_game_server = true;

        self.send(ServerLoginPacket::PlayOk {
            play1: key.play1,
            play2: key.play2,
        })
        .await?;
        self.login_state = LoginState::ServerSelected;

        tracing::info!("{account} is heading to server {server_id}");
        self.server
            .events
            .publish(Event::ServerSelected { account, server_id });

        Ok(())
    }

    /// Drops the session unless the client is on its way to a game server.
    fn close(&mut self) {
        self.login_state = LoginState::Closed;

        if self.joined_game_server {
            return;
        }

        if let Some(account) = &self.account {
            if self.server.sessions.invalidate_if_owner(account, self.id) {
                tracing::debug!("Dropped the session of {account}");
            }
        }
    }
}
