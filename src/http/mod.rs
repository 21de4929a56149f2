//! HTTP boundary: `POST /api/mcp/check` and `GET /health`.
//!
//! The check endpoint accepts `{"mcpServers": {...}}` and answers with
//! `{"serverStatus", "serverErrors", "serverTools"}`. A body that cannot be
//! interpreted at all is rejected with `400`; every per-server problem is
//! reported inside a `200` response.

mod error;
mod response;

pub use error::{ApiError, ServeError};
pub use response::{CheckResponse, HealthResponse};

use crate::config::ScoutConfig;
use crate::discovery::{
    adapters::{ClientInfo, TransportRouter},
    domain::config::parse_request_body,
    ports::TransportFactory,
    services::ConnectionManager,
};
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    routing::{get, post},
};
use mockable::{Clock, DefaultClock};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Path of the check endpoint.
pub const CHECK_PATH: &str = "/api/mcp/check";

/// Path of the health endpoint.
pub const HEALTH_PATH: &str = "/health";

/// Builds the HTTP router around a connection manager.
pub fn router<F, C>(manager: Arc<ConnectionManager<F, C>>) -> Router
where
    F: TransportFactory + 'static,
    C: Clock + Send + Sync + 'static,
{
    Router::new()
        .route(CHECK_PATH, post(check_servers::<F, C>))
        .route(HEALTH_PATH, get(health))
        .with_state(manager)
}

async fn check_servers<F, C>(
    State(manager): State<Arc<ConnectionManager<F, C>>>,
    body: Bytes,
) -> Result<Json<CheckResponse>, ApiError>
where
    F: TransportFactory + 'static,
    C: Clock + Send + Sync + 'static,
{
    let specs = parse_request_body(&body)?;
    let result = tokio::spawn(async move { manager.check_all(specs).await })
        .await
        .map_err(|err| ApiError::Internal(format!("check cycle failed: {err}")))?;
    Ok(Json(CheckResponse::from(&result)))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

/// Serves the check endpoint until interrupted.
///
/// # Errors
///
/// Returns [`ServeError`] when the address cannot be bound, the outbound
/// HTTP client cannot be built, or the server loop fails.
pub async fn serve(config: ScoutConfig) -> Result<(), ServeError> {
    let http = reqwest::Client::builder().build()?;
    let transports = TransportRouter::new(&ClientInfo::new(config.client_name()), http);
    let manager = ConnectionManager::new(Arc::new(transports), Arc::new(DefaultClock))
        .with_options(config.check_options());

    let address = config.bind_address();
    let listener = TcpListener::bind(address)
        .await
        .map_err(|source| ServeError::Bind { address, source })?;
    tracing::info!(%address, "toolscout listening");

    axum::serve(listener, router(Arc::new(manager)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ServeError::Serve)
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown requested"),
        Err(err) => {
            tracing::warn!(error = %err, "cannot listen for ctrl-c; running until killed");
            std::future::pending::<()>().await;
        }
    }
}
