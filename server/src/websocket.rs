use std::{
    net::SocketAddr,
    sync::atomic::{AtomicU64, Ordering},
};

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::{header::ORIGIN, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use tracing::{field, span, Instrument, Level};

use crate::{
    connection::OutgoingFrame,
    connection_handler::{handle_connection_socket, Frame},
    AppState,
};

pub static ACTIVE_WS_CONNECTIONS_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Whether an upgrade carrying `origin` may proceed. No patterns accepts
/// everything, requests without an `Origin` header come from non-browser
/// clients and are accepted too.
///
/// A pattern matches the whole header (`https://stage.example`), its host
/// (`stage.example`), or a host suffix (`*.example`).
pub fn origin_allowed(patterns: &[String], origin: Option<&str>) -> bool {
    let Some(origin) = origin else {
        return true;
    };

    if patterns.is_empty() {
        return true;
    }

    let host = origin
        .split_once("://")
        .map_or(origin, |(_, rest)| rest)
        .trim_end_matches('/');

    patterns.iter().any(|pattern| {
        let pattern = pattern.trim_end_matches('/');

        if pattern.eq_ignore_ascii_case(origin.trim_end_matches('/'))
            || pattern.eq_ignore_ascii_case(host)
        {
            return true;
        }

        pattern.strip_prefix("*.").is_some_and(|suffix| {
            host.to_ascii_lowercase()
                .strip_suffix(&suffix.to_ascii_lowercase())
                .is_some_and(|subdomain| subdomain.len() > 1 && subdomain.ends_with('.'))
        })
    })
}

/// HTTP request that we will upgrade into a `WebSocket` connection
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let origin = headers.get(ORIGIN).and_then(|value| value.to_str().ok());

    if !origin_allowed(&state.origins, origin) {
        tracing::warn!(%addr, ?origin, "Rejected websocket upgrade from foreign origin");
        return StatusCode::FORBIDDEN.into_response();
    }

    if state.shutdown.is_cancelled() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    // Internally this spawns a tokio task, so we're not
    // doing it ourselves
    ws.on_upgrade(move |socket| async move {
        ACTIVE_WS_CONNECTIONS_COUNTER.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            %addr,
            "Opened WS connection (Active: {})",
            ACTIVE_WS_CONNECTIONS_COUNTER.load(Ordering::Acquire)
        );

        // Convert Sink<WsMessage> into a Sink<OutgoingFrame>.
        let socket = socket.with::<OutgoingFrame, _, _, _>(|frame: OutgoingFrame| async move {
            Ok::<_, axum::Error>(WsMessage::Text(frame.into()))
        });

        // Convert Stream<Item = Result<WsMessage, _>> into Stream<Item = Result<Frame, ()>>
        let socket = socket.map(|ws_m: Result<WsMessage, axum::Error>| match ws_m {
            Ok(WsMessage::Text(text)) => Ok(Frame::Text(text.as_str().to_owned())),
            Ok(WsMessage::Binary(bytes)) => Ok(Frame::Binary(bytes.len())),
            Ok(WsMessage::Ping(_) | WsMessage::Pong(_)) => Ok(Frame::Heartbeat),
            Ok(WsMessage::Close(_)) => Ok(Frame::Close),
            Err(_) => Err(()),
        });

        let ws_span = span!(Level::INFO, "WS", %addr, connection = field::Empty);

        handle_connection_socket(
            socket,
            state.relay.clone(),
            state.shutdown.clone(),
            state.idle_timeout,
        )
        .instrument(ws_span)
        .await;

        // WS connection ended
        ACTIVE_WS_CONNECTIONS_COUNTER.fetch_sub(1, Ordering::Relaxed);
        tracing::info!(
            %addr,
            "Closed WS connection (Active: {})",
            ACTIVE_WS_CONNECTIONS_COUNTER.load(Ordering::Acquire)
        );
    })
}
