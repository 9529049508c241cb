use std::sync::Arc;

use axum::{Router, http::StatusCode, routing::get};
use stock::Aggregator;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod api;
pub mod config;

/// Shared state handed to every request.
pub struct AppState {
    pub aggregator: Aggregator,
    pub trust_proxy: bool,
    pub version: String,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/stock-prices", get(api::stock_prices))
        .route("/health", get(api::health))
        .fallback(|| async { (StatusCode::NOT_FOUND, "Not Found") })
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}
