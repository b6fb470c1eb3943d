/**
 * Health Routes
 * Liveness and readiness for the showcase server
 */
use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::state::AppState;
use crate::store::models::StoreStats;

// Track server start time for uptime calculation
lazy_static::lazy_static! {
    static ref SERVER_START: Instant = Instant::now();
}

/// Initialize the server start time
pub fn init_start_time() {
    lazy_static::initialize(&SERVER_START);
}

/// Simple health response
#[derive(Debug, Serialize, Deserialize)]
pub struct SimpleHealthResponse {
    pub status: String,
}

/// What the running server holds
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyChecks {
    pub store: StoreStats,
    pub component_source: String,
    pub cached_components: usize,
    pub registered_components: usize,
}

/// Ready check response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub uptime: u64,
    pub checks: ReadyChecks,
}

/// GET /health - Simple health ping
pub async fn health_ping() -> Json<SimpleHealthResponse> {
    Json(SimpleHealthResponse {
        status: "ok".to_string(),
    })
}

/// GET /health/ready - Readiness with catalog and cache counts
pub async fn health_ready(State(state): State<AppState>) -> Json<ReadyResponse> {
    let checks = ReadyChecks {
        store: state.store().stats().await,
        component_source: state.materializer.source().describe(),
        cached_components: state.materializer.cached_count().await,
        registered_components: state.resolver().len(),
    };

    Json(ReadyResponse {
        status: "ready".to_string(),
        timestamp: Utc::now(),
        uptime: SERVER_START.elapsed().as_secs(),
        checks,
    })
}
