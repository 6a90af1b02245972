//! HTTP surface for the display renderer
//!
//! - `GET /health`
//! - `GET /api/v1/scene`: what is on screen
//! - `GET /api/v1/events`: SSE stream of every [`KioskEvent`](kiosk_common::events::KioskEvent)
//! - `POST /api/v1/refresh`: probe the watched asset now

pub mod handlers;
pub mod sse;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::renderer::RendererHandle;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub renderer: RendererHandle,
    pub port: u16,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .nest(
            "/api/v1",
            Router::new()
                .route("/scene", get(handlers::get_scene))
                .route("/refresh", post(handlers::refresh))
                .route("/events", get(sse::event_stream)),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
