//! Webhook mode implementation.
//!
//! An axum server receiving one update per inbound POST. Before an
//! envelope reaches the dispatcher the request must pass the source-IP
//! restriction, the secret-token check and JSON decoding; every outcome
//! answers with a JSON body and the matching status code.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use futures::FutureExt;
use serde_json::{Value, json};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::api::ApiClient;
use crate::bot::dispatcher::Dispatcher;
use crate::error::{Error, Result};
use crate::types::Update;

/// Header the service echoes the configured webhook secret in.
const SECRET_TOKEN_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Published source ranges for Bot API webhook traffic.
const TELEGRAM_SUBNETS: [(Ipv4Addr, u8); 2] = [
    (Ipv4Addr::new(149, 154, 160, 0), 20),
    (Ipv4Addr::new(91, 108, 4, 0), 22),
];

/// Shared state of the webhook app.
pub(crate) struct WebhookState {
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) client: Arc<ApiClient>,
    pub(crate) secret: Option<String>,
    pub(crate) restrict_ips: bool,
}

/// Whether an address falls inside the known upstream ranges.
///
/// Only IPv4 ranges are published for webhook sources; anything else is
/// untrusted when the restriction is on.
fn is_trusted_source(address: IpAddr) -> bool {
    let IpAddr::V4(v4) = address else {
        return false;
    };
    TELEGRAM_SUBNETS.iter().any(|&(network, bits)| {
        let mask = u32::MAX << (32 - bits);
        (u32::from(v4) & mask) == (u32::from(network) & mask)
    })
}

/// Build the webhook router. The single route accepts POST only; axum
/// answers 405 for other methods on its own.
pub(crate) fn router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/", post(receive_update))
        .with_state(state)
}

/// Handle one inbound webhook request.
async fn receive_update(
    State(state): State<Arc<WebhookState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, Json<Value>) {
    if state.restrict_ips && !is_trusted_source(peer.ip()) {
        warn!(peer = %peer, "rejecting webhook request from untrusted source");
        return reject(StatusCode::FORBIDDEN, "source address not allowed");
    }

    if let Some(expected) = state.secret.as_deref() {
        let provided = headers
            .get(SECRET_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok());
        if provided != Some(expected) {
            warn!(peer = %peer, "rejecting webhook request with bad secret token");
            return reject(StatusCode::FORBIDDEN, "secret token mismatch");
        }
    }

    let update: Update = match serde_json::from_str(&body) {
        Ok(update) => update,
        Err(parse_error) => {
            warn!(peer = %peer, error = %parse_error, "rejecting malformed webhook body");
            return reject(StatusCode::BAD_REQUEST, "body is not a valid update");
        }
    };

    let update_id = update.update_id;
    let dispatched = AssertUnwindSafe(
        state
            .dispatcher
            .dispatch(update, Arc::clone(&state.client)),
    )
    .catch_unwind()
    .await;

    match dispatched {
        Ok(_) => (StatusCode::OK, Json(json!({"ok": true}))),
        Err(_) => {
            error!(update_id, "webhook processing panicked");
            reject(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error while processing update",
            )
        }
    }
}

fn reject(status: StatusCode, description: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({"ok": false, "description": description})))
}

/// Bind and serve the webhook app until the stop signal fires.
pub(crate) async fn serve(
    state: Arc<WebhookState>,
    port: u16,
    mut stop: watch::Receiver<bool>,
) -> Result<()> {
    let address = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|e| Error::Validation(format!("failed to bind webhook listener on {address}: {e}")))?;

    info!(%address, "webhook server listening");

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = stop.changed().await;
    })
    .await
    .map_err(|e| Error::Validation(format!("webhook server failed: {e}")))
}
