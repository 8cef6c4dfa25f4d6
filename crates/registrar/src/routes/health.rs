//! Health check endpoints.

use axum::extract::State;
use serde::Serialize;

use super::envelope::Envelope;
use crate::config::StoreBackend;
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Basic health check (is the server running?)
pub async fn health_check() -> Envelope<HealthResponse> {
    Envelope::ok(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
pub struct ReadyResponse {
    status: &'static str,
    store: &'static str,
}

/// Readiness check (is the store reachable?)
pub async fn ready_check(State(state): State<AppState>) -> Envelope<ReadyResponse> {
    let store = match state.config.store {
        StoreBackend::Memory => "memory",
        StoreBackend::Redis => "redis",
    };

    match state.store.ping().await {
        Ok(()) => Envelope::ok(ReadyResponse {
            status: "ready",
            store,
        }),
        Err(e) => {
            tracing::warn!(error = %e, store, "Store not reachable");
            Envelope::with_code(
                503,
                "store unreachable",
                Some(ReadyResponse {
                    status: "unavailable",
                    store,
                }),
            )
        }
    }
}
