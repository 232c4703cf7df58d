use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use gatehouse::config::get_config;
use gatehouse::events::{Event, EventKind};
use gatehouse::login::{ConfigAccountStore, LoginConnection, LoginServerState, serve_game_server};
use gatehouse::packet::KeyPairPool;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = get_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .init();

    tracing::info!("Generating {} RSA key pairs...", config.login.rsa_key_pairs);
    let key_pairs = KeyPairPool::generate(config.login.rsa_key_pairs)?;

    let accounts = ConfigAccountStore::new(&config.accounts);
    let state = Arc::new(LoginServerState::new(
        &config,
        Box::new(accounts),
        key_pairs,
    ));

    state.events.subscribe(EventKind::MailRequested, |event| {
        if let Event::MailRequested {
            account, mail_id, ..
        } = event
        {
            tracing::info!(
                "Game server wants mail {mail_id} sent to {account}, but there's no mailer"
            );
        }
    });

    let addr = config.login.get_socketaddr();
    let client_listener = TcpListener::bind(addr).await?;
    tracing::info!("Server started on {addr}");

    let interserver_addr = config.interserver.get_socketaddr();
    let interserver_listener = TcpListener::bind(interserver_addr).await?;
    tracing::info!("Waiting for game servers on {interserver_addr}");

    {
        let state = state.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(PURGE_INTERVAL);
            loop {
                interval.tick().await;
                let purged = state.sessions.purge_expired();
                if purged > 0 {
                    tracing::debug!("Purged {purged} expired sessions");
                }
            }
        });
    }

    loop {
        tokio::select! {
            accepted = client_listener.accept() => {
                let (socket, ip) = match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        tracing::warn!("Failed to accept a client: {err}");
                        continue;
                    }
                };

                let connection = LoginConnection::new(socket, state.clone());
                tokio::spawn(async move {
                    if let Err(err) = connection.run().await {
                        tracing::warn!("Client {ip} was dropped: {err}");
                    }
                });
            }
            accepted = interserver_listener.accept() => {
                let (socket, ip) = match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        tracing::warn!("Failed to accept a game server: {err}");
                        continue;
                    }
                };

                tracing::info!("Game server connecting from {ip}");
                let state = state.clone();
                tokio::spawn(async move {
                    if let Err(err) = serve_game_server(socket, state).await {
                        tracing::warn!("Game server link from {ip} ended: {err}");
                    }
                });
            }
        }
    }
}
