use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use tokio::sync::{mpsc::Sender, oneshot};

use crate::ipc::login::PlayFailReason;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ClientId(usize);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FromServer {
    /// Kicked by the login server, or replaced by a newer connection for the same account.
    Kick,
}

#[derive(Debug, Clone)]
pub struct ClientHandle {
    pub id: ClientId,
    pub account: String,
    pub channel: Sender<FromServer>,
}

impl ClientHandle {
    /// Send a message to this client actor. Will emit an error if sending does
    /// not succeed immediately, as this means the connection is gone or stuck.
    pub fn send(&self, msg: FromServer) -> Result<(), std::io::Error> {
        if self.channel.try_send(msg).is_err() {
            Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "Can't keep up or dead",
            ))
        } else {
            Ok(())
        }
    }
}

pub enum ToServer {
    /// An admitted connection wants to join. Answered once the player is
    /// registered, or with the reason it can't be.
    Register(ClientHandle, oneshot::Sender<Result<(), PlayFailReason>>),
    /// The connection disconnected.
    Disconnected(ClientId),
    /// The login server wants this account gone.
    Kick(String),
    /// The login server link came (back) up, tell it who is online.
    Resync,
}

#[derive(Clone, Debug)]
pub struct ServerHandle {
    pub chan: Sender<ToServer>,
    pub next_id: Arc<AtomicUsize>,
    /// Number of registered players, kept up to date by the main loop.
    pub joined: Arc<AtomicUsize>,
}

impl ServerHandle {
    /// Returns false if the main loop has shut down.
    pub async fn send(&self, msg: ToServer) -> bool {
        if self.chan.send(msg).await.is_err() {
            tracing::error!("Main loop has shut down.");
            return false;
        }
        true
    }

    pub fn next_id(&self) -> ClientId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        ClientId(id)
    }

    pub fn joined(&self) -> usize {
        self.joined.load(Ordering::Relaxed)
    }

    pub async fn register(&self, handle: ClientHandle) -> Result<(), PlayFailReason> {
        let (reply, response) = oneshot::channel();
        if !self.send(ToServer::Register(handle, reply)).await {
            return Err(PlayFailReason::SystemError);
        }

        response.await.unwrap_or(Err(PlayFailReason::SystemError))
    }
}
