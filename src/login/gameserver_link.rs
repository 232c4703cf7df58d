use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadHalf};
use tokio::sync::mpsc::{Sender, channel};

use crate::INTERSERVER_REVISION;
use crate::error::{LinkError, PacketError};
use crate::events::Event;
use crate::ipc::interserver::{
    GameServerPacket, LoginServerFailReason, LoginServerPacket, ServerState,
};
use crate::ipc::login::ServerType;
use crate::packet::{PacketCipher, PacketState, ReadWritePacket, read_packet, send_packet};

use super::{LoginServerState, RegistryUpdate, ServerAttach};

/// How many packets may queue up for a game server before senders start failing.
const LINK_QUEUE_SIZE: usize = 64;

/// Game servers can stay quiet for as long as they like once registered.
const IDLE_TIMEOUT: Duration = Duration::MAX;

/// Serves one game server's channel, from the handshake until it disconnects.
pub async fn serve_game_server<S>(socket: S, server: Arc<LoginServerState>) -> Result<(), LinkError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(socket);

    send_packet(
        &mut writer,
        &PacketState::default(),
        &LoginServerPacket::InitLs {
            revision: INTERSERVER_REVISION,
        },
    )
    .await?;

    let state = PacketState::encrypted(PacketCipher::new(
        server.interserver.blowfish_key.as_bytes(),
    )?);

    let packet: GameServerPacket =
        read_packet(&mut reader, &state, server.config.handshake_timeout()).await?;
    let GameServerPacket::GameServerAuth {
        server_id,
        secret,
        max_players,
        host,
        port,
        server_type,
        age_limit,
        pvp,
        brackets,
    } = packet
    else {
        return Err(LinkError::ProtocolViolation(
            "the first packet has to be GameServerAuth",
        ));
    };

    let expected_secret = server
        .config
        .game_servers
        .iter()
        .find(|entry| entry.id == server_id)
        .map(|entry| entry.secret.as_str());

    let (sender, mut receiver) = channel(LINK_QUEUE_SIZE);
    let registered = match expected_secret {
        None => Err(LoginServerFailReason::NoFreeId),
        Some(expected) if expected != secret => Err(LoginServerFailReason::WrongSecret),
        Some(_) => server.registry.attach(
            server_id,
            ServerAttach {
                address: host,
                port,
                max_players,
                server_type: ServerType::from_bits_truncate(server_type),
                age_limit,
                pvp,
                brackets,
            },
            sender.clone(),
        ),
    };

    let server_name = match registered {
        Ok(name) => name,
        Err(reason) => {
            tracing::warn!("Refused game server {server_id}: {reason:?}");
            send_packet(
                &mut writer,
                &state,
                &LoginServerPacket::LoginServerFail { reason },
            )
            .await?;
            return Err(LinkError::Refused(reason));
        }
    };

    if let Err(err) = send_packet(
        &mut writer,
        &state,
        &LoginServerPacket::AuthResponse {
            server_id,
            server_name: server_name.clone(),
        },
    )
    .await
    {
        server.registry.detach(server_id);
        return Err(err.into());
    }

    tracing::info!("Game server {server_id} ({server_name}) registered");
    server
        .events
        .publish(Event::GameServerRegistered { server_id });

    // everything else we send goes through the registry's queue
    let writer_state = state.clone();
    let writer_task = tokio::spawn(async move {
        while let Some(packet) = receiver.recv().await {
            if let Err(err) = send_packet(&mut writer, &writer_state, &packet).await {
                tracing::warn!("Failed to send {} to game server: {err}", packet.get_name());
                break;
            }
        }
    });

    let result = handle_packets(&mut reader, &state, &server, server_id, &sender).await;

    server.registry.detach(server_id);
    writer_task.abort();

    tracing::info!("Game server {server_id} disconnected");
    server.events.publish(Event::GameServerLost { server_id });

    match result {
        Err(LinkError::Packet(PacketError::Closed)) => Ok(()),
        result => result,
    }
}

async fn handle_packets<S: AsyncRead>(
    reader: &mut ReadHalf<S>,
    state: &PacketState,
    server: &LoginServerState,
    server_id: u8,
    link: &Sender<LoginServerPacket>,
) -> Result<(), LinkError> {
    loop {
        let packet: GameServerPacket = read_packet(reader, state, IDLE_TIMEOUT).await?;

        match packet {
            GameServerPacket::PlayerInGame { accounts } => {
                server
                    .registry
                    .apply(server_id, RegistryUpdate::PlayersInGame(accounts.clone()));
                for account in accounts {
                    server
                        .events
                        .publish(Event::PlayerJoined { account, server_id });
                }
            }
            GameServerPacket::PlayerLogout { account } => {
                server
                    .registry
                    .apply(server_id, RegistryUpdate::PlayerLogout(account.clone()));
                server
                    .events
                    .publish(Event::PlayerLeft { account, server_id });
            }
            GameServerPacket::PlayerAuthRequest { account, key } => {
                let authorized = server.sessions.consume_play_session(
                    &account,
                    &key,
                    server.config.show_license,
                    server_id,
                );
                if authorized {
                    tracing::info!("{account} may enter server {server_id}");
                } else {
                    tracing::warn!("{account} presented an invalid key to server {server_id}");
                }

                if link
                    .send(LoginServerPacket::PlayerAuthResponse {
                        account,
                        authorized,
                    })
                    .await
                    .is_err()
                {
                    return Err(LinkError::Packet(PacketError::Closed));
                }
            }
            GameServerPacket::ServerStatus {
                max_players, state, ..
            } => {
                server
                    .registry
                    .apply(server_id, RegistryUpdate::Status { max_players, state });
                if state == ServerState::Down {
                    tracing::info!("Game server {server_id} reports it's down");
                }
            }
            GameServerPacket::ReplyCharacters {
                account,
                characters,
                ..
            } => {
                server.registry.apply(
                    server_id,
                    RegistryUpdate::Characters {
                        account,
                        count: characters,
                    },
                );
            }
            GameServerPacket::SendMail {
                account,
                mail_id,
                args,
            } => {
                let delivered = server.events.publish(Event::MailRequested {
                    account,
                    mail_id,
                    args,
                });
                if delivered == 0 {
                    tracing::warn!("Server {server_id} requested mail, but nothing delivers it");
                }
            }
            GameServerPacket::RequestTempBan { account, ban_until } => {
                tracing::info!("Server {server_id} banned {account} until {ban_until}");
                server.registry.apply(
                    server_id,
                    RegistryUpdate::TempBan {
                        account,
                        until: ban_until,
                    },
                );
            }
            GameServerPacket::LiftBan { account } => {
                server
                    .registry
                    .apply(server_id, RegistryUpdate::LiftBan(account));
            }
            GameServerPacket::GameServerAuth { .. } => {
                return Err(LinkError::ProtocolViolation(
                    "game server tried to register twice",
                ));
            }
        }
    }
}
