//! HTTP route handlers for Registrar.

use axum::{
    Router,
    body::Body,
    http::{Method, Request},
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{Span, debug_span};

use crate::state::AppState;

mod academic;
mod captcha;
mod envelope;
mod health;
mod login;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    // Mini-program front ends call from arbitrary origins
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
        .allow_origin(Any);

    Router::new()
        // Health & Status
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))

        // Login handshake
        .route("/api/captcha", get(captcha::get_challenge))
        .route("/api/login", post(login::login))
        .route("/api/logout", post(login::logout))

        // Portal data
        .route("/api/grades", post(academic::grades))
        .route("/api/timetable", post(academic::timetable))
        .route("/api/rankings", post(academic::rankings))

        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors),
        )
        .with_state(state)
}

// Bodies and headers carry credentials and cookies; only the route is recorded
fn make_span(request: &Request<Body>) -> Span {
    debug_span!(
        "http-request",
        method = %request.method(),
        path = request.uri().path()
    )
}
