//! The live session relay.
//!
//! [`serve`] is the whole server: it creates the identity, binds the
//! configured address and runs the websocket endpoint until the
//! cancellation token fires. [`start`] does the same on an already bound
//! listener, which is what tests use.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::{
    config::Config, error::Error, identity::ServerIdentity, relay::Relay,
    websocket::ws_handler,
};

pub mod config;
pub mod connection;
pub mod connection_handler;
pub mod error;
pub mod identity;
pub mod registry;
pub mod relay;
pub mod websocket;

/// Shared by every request handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    pub origins: Arc<[String]>,
    pub idle_timeout: Option<Duration>,
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: &Config, identity: ServerIdentity, shutdown: CancellationToken) -> Self {
        Self {
            relay: Arc::new(Relay::new(Arc::new(identity), config.report_errors)),
            origins: config.origins.clone().into(),
            idle_timeout: config.idle_timeout(),
            shutdown,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new().route("/", get(ws_handler)).with_state(state)
}

/// Runs the websocket endpoint on `listener` until `state.shutdown` is
/// cancelled.
pub async fn start(listener: TcpListener, state: AppState) -> Result<(), Error> {
    let shutdown = state.shutdown.clone();
    let relay = state.relay.clone();

    // new joins fail as soon as shutdown starts, not once the listener is gone
    tokio::spawn({
        let shutdown = shutdown.clone();
        let relay = relay.clone();
        async move {
            shutdown.cancelled().await;
            relay.registry().close();
        }
    });

    tracing::info!(addr = %listener.local_addr()?, "Listening for websocket connections");

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown.cancelled_owned())
    .await?;

    relay.registry().close();
    tracing::info!("Relay stopped");

    Ok(())
}

/// Creates a fresh server identity, binds `config.bind` and serves until
/// `shutdown` is cancelled.
pub async fn serve(config: &Config, shutdown: CancellationToken) -> Result<(), Error> {
    let identity = ServerIdentity::generate_and_persist(&config.key_path)?;
    let listener = TcpListener::bind(config.bind.as_str()).await?;

    start(listener, AppState::new(config, identity, shutdown)).await
}
