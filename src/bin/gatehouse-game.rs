use std::error::Error;
use std::sync::Arc;

use gatehouse::config::get_config;
use gatehouse::error::LinkError;
use gatehouse::world::{GameConnection, GameServerState, run_login_link};
use tokio::net::{TcpListener, TcpStream};
use tracing_subscriber::EnvFilter;

/// Keeps the link to the login server up, reconnecting after every drop.
async fn maintain_login_link(state: Arc<GameServerState>) {
    let addr = state.interserver.get_socketaddr();

    loop {
        match TcpStream::connect(addr).await {
            Ok(socket) => match run_login_link(socket, state.clone()).await {
                Ok(()) => tracing::warn!("Login server closed the link"),
                Err(LinkError::Refused(reason)) => {
                    tracing::error!("Login server refused to register us: {reason:?}")
                }
                Err(err) => tracing::warn!("Login server link failed: {err}"),
            },
            Err(err) => tracing::warn!("Couldn't reach the login server at {addr}: {err}"),
        }

        tokio::time::sleep(state.interserver.reconnect_delay()).await;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = get_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .init();

    let state = Arc::new(GameServerState::new(&config));

    let addr = config.game.get_socketaddr();
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Server started on {addr}");

    tokio::spawn(maintain_login_link(state.clone()));

    loop {
        let (socket, ip) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                tracing::warn!("Failed to accept a client: {err}");
                continue;
            }
        };

        let connection = GameConnection::new(socket, state.clone());
        tokio::spawn(async move {
            if let Err(err) = connection.run().await {
                tracing::warn!("Client {ip} was dropped: {err}");
            }
        });
    }
}
