//! HTTP handlers for the Detection Gateway API

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};
use espcam_core::{DeviceId, HealthStatus, ReadinessStatus};

use crate::metrics::StatsResponse;
use crate::store::Summary;
use crate::upload::{process_upload, UploadResponse};
use crate::{AppState, Result};

/// Header carrying the device identifier
pub const DEVICE_HEADER: &str = "x-esp-id";

pub async fn root() -> &'static str {
    "ESP detection server running"
}

pub async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(state.health())
}

pub async fn ready(State(state): State<AppState>) -> Json<ReadinessStatus> {
    Json(state.readiness())
}

pub async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<UploadResponse>> {
    let device = DeviceId::from_header(headers.get(DEVICE_HEADER).and_then(|v| v.to_str().ok()));
    let response = process_upload(&state, device, body).await?;
    Ok(Json(response))
}

pub async fn summary(State(state): State<AppState>) -> Json<Summary> {
    Json(state.store.summarize(&state.pools))
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(state.metrics.stats(state.start_time.elapsed().as_secs()))
}
