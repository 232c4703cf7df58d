use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::{Sender, channel};
use tokio::sync::oneshot;

use crate::INTERSERVER_REVISION;
use crate::common::SessionKey;
use crate::error::{AdmissionError, LinkError, PacketError};
use crate::ipc::interserver::{GameServerPacket, LoginServerPacket, ServerState};
use crate::ipc::login::PlayFailReason;
use crate::packet::{PacketCipher, PacketState, ReadWritePacket, read_packet, send_packet};

use super::{GameServerState, ToServer};

const LINK_QUEUE_SIZE: usize = 64;

/// The login server may stay quiet for as long as it likes.
const IDLE_TIMEOUT: Duration = Duration::MAX;

/// An admission waiting on a `PlayerAuthResponse`. The reply is taken once
/// the admission gives up, so a late answer is still matched and dropped.
#[derive(Debug)]
struct PendingAuth {
    id: u64,
    reply: Option<oneshot::Sender<bool>>,
}

#[derive(Debug, Default)]
struct LinkShared {
    available: AtomicBool,
    sender: Mutex<Option<Sender<GameServerPacket>>>,
    /// Outstanding requests per account, oldest first. The login server
    /// answers in the order it was asked, and responses only name the account.
    pending: DashMap<String, VecDeque<PendingAuth>>,
    next_request: AtomicU64,
}

/// The game server's end of the channel to the login server. Cheap to clone,
/// every clone talks over the same connection.
#[derive(Debug, Clone, Default)]
pub struct LoginLink {
    shared: Arc<LinkShared>,
}

impl LoginLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the channel is registered and usable.
    pub fn is_available(&self) -> bool {
        self.shared.available.load(Ordering::Acquire)
    }

    /// Queues a packet for the login server. Returns false if the link is down
    /// or can't keep up.
    pub fn send(&self, packet: GameServerPacket) -> bool {
        let sender = self.shared.sender.lock();
        match sender.as_ref() {
            Some(sender) => sender.try_send(packet).is_ok(),
            None => false,
        }
    }

    /// Asks the login server whether `key` admits `account`. Overlapping
    /// requests for one account each get the answer to their own key.
    pub async fn request_player_auth(
        &self,
        account: &str,
        key: SessionKey,
        timeout: Duration,
    ) -> Result<bool, AdmissionError> {
        if !self.is_available() {
            return Err(AdmissionError::ChannelUnavailable);
        }

        let id = self.shared.next_request.fetch_add(1, Ordering::Relaxed);
        let (reply, response) = oneshot::channel();
        {
            // queue and send under the entry lock, so the queue order is the wire order
            let mut queue = self.shared.pending.entry(account.to_string()).or_default();
            queue.push_back(PendingAuth {
                id,
                reply: Some(reply),
            });

            let request = GameServerPacket::PlayerAuthRequest {
                account: account.to_string(),
                key,
            };
            if !self.send(request) {
                queue.pop_back();
                return Err(AdmissionError::ChannelUnavailable);
            }
        }

        match tokio::time::timeout(timeout, response).await {
            Ok(Ok(authorized)) => Ok(authorized),
            // the link dropped
            Ok(Err(_)) => Err(AdmissionError::ChannelUnavailable),
            Err(_) => {
                tracing::warn!("Login server didn't answer for {account} in time");
                self.abandon(account, id);
                Err(AdmissionError::Rejected(PlayFailReason::SystemError))
            }
        }
    }

    /// Keeps the request's place in the queue, but nobody waits on it anymore.
    fn abandon(&self, account: &str, id: u64) {
        if let Some(mut queue) = self.shared.pending.get_mut(account) {
            if let Some(pending) = queue.iter_mut().find(|pending| pending.id == id) {
                pending.reply = None;
            }
        }
    }

    pub(crate) fn resolve(&self, account: &str, authorized: bool) {
        let oldest = self
            .shared
            .pending
            .get_mut(account)
            .and_then(|mut queue| queue.pop_front());
        self.shared
            .pending
            .remove_if(account, |_, queue| queue.is_empty());

        match oldest {
            Some(PendingAuth {
                reply: Some(reply), ..
            }) => {
                let _ = reply.send(authorized);
            }
            Some(PendingAuth { reply: None, .. }) => {
                tracing::debug!("Dropped a late auth response for {account}");
            }
            None => tracing::warn!("Got an auth response for {account}, but nobody asked"),
        }
    }

    pub(crate) fn attach(&self, sender: Sender<GameServerPacket>) {
        *self.shared.sender.lock() = Some(sender);
        self.shared.available.store(true, Ordering::Release);
    }

    /// Marks the link unavailable and fails every pending request.
    fn detach(&self) {
        self.shared.available.store(false, Ordering::Release);
        *self.shared.sender.lock() = None;
        self.shared.pending.clear();
    }
}

/// Registers with the login server over `socket` and serves the channel until
/// it drops. Joined players are not affected by the link going away.
pub async fn run_login_link<S>(socket: S, server: Arc<GameServerState>) -> Result<(), LinkError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(socket);
    let timeout = server.config.handshake_timeout();

    let init: LoginServerPacket =
        read_packet(&mut reader, &PacketState::default(), timeout).await?;
    match init {
        LoginServerPacket::InitLs { revision } if revision == INTERSERVER_REVISION => {}
        LoginServerPacket::InitLs { revision } => {
            tracing::error!(
                "Login server speaks revision {revision:#x}, we need {INTERSERVER_REVISION:#x}"
            );
            return Err(LinkError::ProtocolViolation("unsupported channel revision"));
        }
        _ => return Err(LinkError::ProtocolViolation("expected InitLs")),
    }

    let state = PacketState::encrypted(PacketCipher::new(
        server.interserver.blowfish_key.as_bytes(),
    )?);

    let config = &server.config;
    send_packet(
        &mut writer,
        &state,
        &GameServerPacket::GameServerAuth {
            server_id: config.server_id,
            secret: config.secret.clone(),
            max_players: config.max_players,
            host: config.advertised_host.octets(),
            port: config.port,
            server_type: config.server_type,
            age_limit: config.age_limit,
            pvp: config.pvp,
            brackets: config.brackets,
        },
    )
    .await?;

    match read_packet(&mut reader, &state, timeout).await? {
        LoginServerPacket::AuthResponse {
            server_id,
            server_name,
        } if server_id == config.server_id => {
            tracing::info!("Registered with the login server as {server_name}");
        }
        LoginServerPacket::LoginServerFail { reason } => {
            tracing::error!("Login server refused us: {reason:?}");
            return Err(LinkError::Refused(reason));
        }
        _ => return Err(LinkError::ProtocolViolation("expected AuthResponse")),
    }

    let (sender, mut receiver) = channel::<GameServerPacket>(LINK_QUEUE_SIZE);
    let writer_state = state.clone();
    let writer_task = tokio::spawn(async move {
        while let Some(packet) = receiver.recv().await {
            if let Err(err) = send_packet(&mut writer, &writer_state, &packet).await {
                tracing::warn!(
                    "Failed to send {} to the login server: {err}",
                    packet.get_name()
                );
                break;
            }
        }
    });

    let link = &server.login_link;
    link.attach(sender);
    link.send(GameServerPacket::ServerStatus {
        online_players: server.handle.joined() as u16,
        max_players: config.max_players,
        state: ServerState::Auto,
    });
    server.handle.send(ToServer::Resync).await;

    let result = handle_packets(&mut reader, &state, &server).await;

    link.detach();
    writer_task.abort();

    tracing::warn!("Lost the login server link, new players can't join until it's back");

    match result {
        Err(LinkError::Packet(PacketError::Closed)) => Ok(()),
        result => result,
    }
}

async fn handle_packets<R>(
    reader: &mut R,
    state: &PacketState,
    server: &GameServerState,
) -> Result<(), LinkError>
where
    R: AsyncRead + Unpin,
{
    loop {
        let packet: LoginServerPacket = read_packet(reader, state, IDLE_TIMEOUT).await?;

        match packet {
            LoginServerPacket::PlayerAuthResponse {
                account,
                authorized,
            } => server.login_link.resolve(&account, authorized),
            LoginServerPacket::KickPlayer { account } => {
                tracing::info!("Login server wants {account} kicked");
                server.handle.send(ToServer::Kick(account)).await;
            }
            LoginServerPacket::RequestCharacters { account } => {
                // characters live outside of this crate, so there's nothing to count
                server.login_link.send(GameServerPacket::ReplyCharacters {
                    account,
                    characters: 0,
                    delete_timestamps: Vec::new(),
                });
            }
            packet => {
                tracing::warn!("Unexpected {} from the login server", packet.get_name());
                return Err(LinkError::ProtocolViolation(
                    "handshake packet after registration",
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unavailable_until_attached() {
        let link = LoginLink::new();
        assert!(!link.is_available());
        assert!(!link.send(GameServerPacket::LiftBan {
            account: "alice".to_string()
        }));
        assert!(matches!(
            link.request_player_auth("alice", SessionKey::default(), Duration::from_secs(1))
                .await,
            Err(AdmissionError::ChannelUnavailable)
        ));
    }

    #[tokio::test]
    async fn responses_reach_the_waiting_request() {
        let link = LoginLink::new();
        let (sender, mut receiver) = channel(8);
        link.attach(sender);

        let waiter = link.clone();
        let request = tokio::spawn(async move {
            waiter
                .request_player_auth(
                    "alice",
                    SessionKey::new(1, 2, 3, 4),
                    Duration::from_secs(10),
                )
                .await
        });

        let Some(GameServerPacket::PlayerAuthRequest { account, key }) = receiver.recv().await
        else {
            panic!("expected a PlayerAuthRequest");
        };
        assert_eq!(account, "alice");
        assert_eq!(key, SessionKey::new(1, 2, 3, 4));

        link.resolve("alice", true);
        assert!(request.await.unwrap().unwrap());
    }

    /// Answers every queued request the way the login server would.
    async fn answer_in_order(
        link: &LoginLink,
        receiver: &mut tokio::sync::mpsc::Receiver<GameServerPacket>,
        valid: SessionKey,
        count: usize,
    ) {
        for _ in 0..count {
            let Some(GameServerPacket::PlayerAuthRequest { account, key }) = receiver.recv().await
            else {
                panic!("expected a PlayerAuthRequest");
            };
            link.resolve(&account, key == valid);
        }
    }

    #[tokio::test]
    async fn overlapping_requests_get_their_own_answer() {
        let link = LoginLink::new();
        let (sender, mut receiver) = channel(8);
        link.attach(sender);

        let valid = SessionKey::new(1, 2, 3, 4);
        let forged = SessionKey::new(1, 2, 3, 5);

        let waiter = link.clone();
        let legit = tokio::spawn(async move {
            waiter
                .request_player_auth("alice", valid, Duration::from_secs(10))
                .await
        });
        // make sure the legit request is on the wire first
        let Some(first) = receiver.recv().await else {
            panic!("expected a PlayerAuthRequest");
        };

        let waiter = link.clone();
        let impostor = tokio::spawn(async move {
            waiter
                .request_player_auth("alice", forged, Duration::from_secs(10))
                .await
        });

        let GameServerPacket::PlayerAuthRequest { account, key } = first else {
            panic!("expected a PlayerAuthRequest");
        };
        link.resolve(&account, key == valid);
        answer_in_order(&link, &mut receiver, valid, 1).await;

        assert!(legit.await.unwrap().unwrap());
        assert!(!impostor.await.unwrap().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn late_answer_is_not_given_to_the_next_request() {
        let link = LoginLink::new();
        let (sender, mut receiver) = channel(8);
        link.attach(sender);

        let valid = SessionKey::new(1, 2, 3, 4);

        // nobody answers this one in time
        let result = link
            .request_player_auth("alice", valid, Duration::from_secs(10))
            .await;
        assert!(matches!(
            result,
            Err(AdmissionError::Rejected(PlayFailReason::SystemError))
        ));

        let waiter = link.clone();
        let impostor = tokio::spawn(async move {
            waiter
                .request_player_auth("alice", SessionKey::default(), Duration::from_secs(10))
                .await
        });

        // the late answer for the valid key, then the answer for the forged one
        answer_in_order(&link, &mut receiver, valid, 2).await;
        assert!(!impostor.await.unwrap().unwrap());
    }

    #[tokio::test]
    async fn detach_fails_pending_requests() {
        let link = LoginLink::new();
        let (sender, mut receiver) = channel(8);
        link.attach(sender);

        let waiter = link.clone();
        let request = tokio::spawn(async move {
            waiter
                .request_player_auth("alice", SessionKey::default(), Duration::from_secs(10))
                .await
        });

        receiver.recv().await.unwrap();
        link.detach();

        assert!(matches!(
            request.await.unwrap(),
            Err(AdmissionError::ChannelUnavailable)
        ));
        assert!(!link.is_available());
    }

    #[tokio::test(start_paused = true)]
    async fn silence_is_a_system_error() {
        let link = LoginLink::new();
        let (sender, _receiver) = channel(8);
        link.attach(sender);

        let result = link
            .request_player_auth("alice", SessionKey::default(), Duration::from_secs(10))
            .await;
        assert!(matches!(
            result,
            Err(AdmissionError::Rejected(PlayFailReason::SystemError))
        ));
    }
}
