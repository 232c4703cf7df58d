use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::mpsc::{Receiver, channel};
use tokio::task::JoinHandle;

use crate::ipc::interserver::{GameServerPacket, MAX_LIST_LEN};
use crate::ipc::login::PlayFailReason;

use super::{ClientHandle, ClientId, FromServer, LoginLink, ServerHandle, ToServer};

#[derive(Debug)]
struct GameServer {
    clients: HashMap<ClientId, ClientHandle>,
    max_players: usize,
}

impl GameServer {
    fn find_account(&self, account: &str) -> Option<ClientId> {
        self.clients
            .values()
            .find(|client| client.account == account)
            .map(|client| client.id)
    }

    fn register(&mut self, handle: ClientHandle, link: &LoginLink) -> Result<(), PlayFailReason> {
        // a newer connection for the same account replaces the old one
        if let Some(old_id) = self.find_account(&handle.account) {
            if let Some(old) = self.clients.remove(&old_id) {
                tracing::info!("{} connected again, kicking the old connection", old.account);
                let _ = old.send(FromServer::Kick);
            }
        } else if self.clients.len() >= self.max_players {
            return Err(PlayFailReason::TooManyPlayers);
        }

        link.send(GameServerPacket::PlayerInGame {
            accounts: vec![handle.account.clone()],
        });
        self.clients.insert(handle.id, handle);

        Ok(())
    }
}

pub async fn server_main_loop(
    mut recv: Receiver<ToServer>,
    link: LoginLink,
    max_players: usize,
    joined: Arc<AtomicUsize>,
) {
    let mut data = GameServer {
        clients: HashMap::new(),
        max_players,
    };

    while let Some(msg) = recv.recv().await {
        match msg {
            ToServer::Register(handle, reply) => {
                let result = data.register(handle, &link);
                let _ = reply.send(result);
            }
            ToServer::Disconnected(from_id) => {
                if let Some(client) = data.clients.remove(&from_id) {
                    link.send(GameServerPacket::PlayerLogout {
                        account: client.account,
                    });
                }
            }
            ToServer::Kick(account) => {
                let Some(id) = data.find_account(&account) else {
                    tracing::debug!("Asked to kick {account}, but they aren't here");
                    continue;
                };
                if let Some(client) = data.clients.get(&id) {
                    // the connection removes itself once it's closed
                    let _ = client.send(FromServer::Kick);
                }
            }
            ToServer::Resync => {
                let accounts: Vec<String> = data
                    .clients
                    .values()
                    .map(|client| client.account.clone())
                    .collect();
                for chunk in accounts.chunks(MAX_LIST_LEN) {
                    link.send(GameServerPacket::PlayerInGame {
                        accounts: chunk.to_vec(),
                    });
                }
            }
        }

        joined.store(data.clients.len(), Ordering::Relaxed);
    }
}

pub fn spawn_main_loop(link: LoginLink, max_players: usize) -> (ServerHandle, JoinHandle<()>) {
    let (send, recv) = channel(64);

    let handle = ServerHandle {
        chan: send,
        next_id: Default::default(),
        joined: Default::default(),
    };

    let joined = handle.joined.clone();
    let join = tokio::spawn(server_main_loop(recv, link, max_players, joined));

    (handle, join)
}
