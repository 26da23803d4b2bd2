//! Dashboard HTTP API
//!
//! REST endpoints over the snapshot the engine publishes every tick.

use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::engine::SnapshotSink;
use crate::report::VariantSnapshot;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct VariantsQuery {
    active: Option<bool>,
    symbol: Option<String>,
}

/// Create the API router with all endpoints
pub fn create_router(snapshot: SnapshotSink) -> Router {
    Router::new()
        .route("/api/snapshot", get(get_snapshot))
        .route("/api/variants", get(get_variants))
        .route("/api/variants/:id", get(get_variant))
        .with_state(snapshot)
        // CORS for frontend
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// Bind and serve until the task is dropped
pub async fn serve(bind_addr: &str, snapshot: SnapshotSink) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind dashboard on {}", bind_addr))?;
    info!(addr = %bind_addr, "📊 Dashboard API listening");
    axum::serve(listener, create_router(snapshot))
        .await
        .context("Dashboard server failed")?;
    Ok(())
}

/// GET /api/snapshot - Full fleet snapshot
async fn get_snapshot(State(snapshot): State<SnapshotSink>) -> impl IntoResponse {
    match snapshot.read().await.clone() {
        Some(s) => (StatusCode::OK, Json(ApiResponse::success(s))),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::error("no snapshot yet")),
        ),
    }
}

/// GET /api/variants?active=true&symbol=SOXL
async fn get_variants(
    State(snapshot): State<SnapshotSink>,
    Query(query): Query<VariantsQuery>,
) -> impl IntoResponse {
    let guard = snapshot.read().await;
    let Some(s) = guard.as_ref() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::<Vec<VariantSnapshot>>::error("no snapshot yet")),
        );
    };
    let variants: Vec<VariantSnapshot> = s
        .variants
        .iter()
        .filter(|v| query.active.map_or(true, |a| v.active == a))
        .filter(|v| {
            query
                .symbol
                .as_deref()
                .map_or(true, |sym| v.symbol.eq_ignore_ascii_case(sym))
        })
        .cloned()
        .collect();
    (StatusCode::OK, Json(ApiResponse::success(variants)))
}

/// GET /api/variants/:id
async fn get_variant(
    State(snapshot): State<SnapshotSink>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let guard = snapshot.read().await;
    match guard.as_ref().and_then(|s| s.variant(&id)) {
        Some(v) => (StatusCode::OK, Json(ApiResponse::success(v.clone()))),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("unknown variant {}", id))),
        ),
    }
}
