use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

use crate::handlers::*;

pub const BEGIN_PATH: &str = "/checkout/begin";
pub const QRCODE_PATH: &str = "/checkout/qrcode";
pub const POLL_PATH: &str = "/checkout/poll";
pub const RETURN_PATH: &str = "/checkout/return";
pub const NOTIFY_PATH: &str = "/checkout/notify";

pub fn create_router(state: AppState, health: HealthState) -> Router {
    Router::new()
        // Shopper-facing, session bound
        .route(BEGIN_PATH, post(begin_checkout))
        .route(QRCODE_PATH, get(qrcode_page))
        .route(POLL_PATH, get(poll_payment))
        // Gateway-facing, no session
        .route(RETURN_PATH, get(payment_return).post(payment_return))
        .route(NOTIFY_PATH, post(payment_notify))
        .with_state(state)
        .route("/health", get(health_check))
        .with_state(health)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
}
