use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tracker::TrackingError;
use crate::web::api::error::{ApiError, ApiResult};
use crate::web::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct RegenerateRequest {
    /// Defaults to now.
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    /// Defaults to the configured generation window.
    #[serde(default)]
    pub duration_days: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct RegenerateResponse {
    pub passes: usize,
    pub queued: usize,
}

#[derive(Debug, Serialize)]
pub struct ClearCacheResponse {
    pub dropped: usize,
}

/// Stop tracking, replace every pass and queue the new schedule.
pub async fn regenerate(
    State(state): State<AppState>,
    Json(request): Json<RegenerateRequest>,
) -> ApiResult<Json<RegenerateResponse>> {
    let days = request
        .duration_days
        .unwrap_or(state.config.generation.duration_days);
    if days == 0 {
        return Err(ApiError::Validation("duration_days must be at least 1".into()));
    }
    let start = request.start.unwrap_or_else(Utc::now);

    state.control.stop().await?;
    let requests = state.config.schedule_requests(&state.tles, start, days);
    let ids = state.generator.regenerate(requests).await;
    state.control.clear_cache().await?;

    let queued = if ids.is_empty() {
        0
    } else {
        match state.control.load_queue(ids.clone()).await {
            Ok(n) => n,
            Err(TrackingError::EmptyQueue) => 0,
            Err(e) => return Err(e.into()),
        }
    };
    log::info!("Schedule regenerated: {} passes, {} queued", ids.len(), queued);

    Ok(Json(RegenerateResponse {
        passes: ids.len(),
        queued,
    }))
}

pub async fn clear_cache(State(state): State<AppState>) -> ApiResult<Json<ClearCacheResponse>> {
    let dropped = state.control.clear_cache().await?;
    Ok(Json(ClearCacheResponse { dropped }))
}
