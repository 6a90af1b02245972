//! HTTP request handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use tracing::warn;

use super::AppState;
use crate::freshness::TickOutcome;
use crate::renderer::SceneSnapshot;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    screen: String,
    port: u16,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    outcome: TickOutcome,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    error: String,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let scene = state.renderer.scene().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "kiosk-display".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        screen: scene.screen.to_string(),
        port: state.port,
    })
}

/// GET /api/v1/scene
pub async fn get_scene(State(state): State<AppState>) -> Json<SceneSnapshot> {
    Json(state.renderer.scene().await)
}

/// POST /api/v1/refresh
///
/// 200 with the tick outcome (`skipped` when a probe was already in flight), 409 when
/// nothing is being watched.
pub async fn refresh(
    State(state): State<AppState>,
) -> Result<Json<RefreshResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state.renderer.refresh().await {
        Ok(outcome) => Ok(Json(RefreshResponse { outcome })),
        Err(e) => {
            warn!(error = %e, "Manual refresh rejected");
            Err((
                StatusCode::CONFLICT,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            ))
        }
    }
}
