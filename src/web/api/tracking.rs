use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::{DataBurst, MAX_BURST_SAMPLES};
use crate::scheduler::ControlStatus;
use crate::tracker::TrackingState;
use crate::web::api::error::{ApiError, ApiResult};
use crate::web::api::passes::hex;
use crate::web::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub pass_id: u64,
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub pass_id: u64,
    pub state: TrackingState,
}

#[derive(Debug, Deserialize)]
pub struct QueueRequest {
    /// Every upcoming pass in the store when empty.
    #[serde(default)]
    pub pass_ids: Vec<u64>,
}

#[derive(Debug, Serialize)]
pub struct QueueResponse {
    pub accepted: usize,
}

#[derive(Debug, Deserialize)]
pub struct OffsetRequest {
    pub offset_ms: i64,
}

#[derive(Debug, Serialize)]
pub struct ClockSyncResponse {
    pub reference_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct AdditionalDataRequest {
    pub start_index_ms: u64,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct BurstResponse {
    pub burst: DataBurst,
    pub bytes: String,
}

pub async fn start(
    State(state): State<AppState>,
    Json(request): Json<StartRequest>,
) -> ApiResult<Json<StartResponse>> {
    let tracking = state.control.start_pass(request.pass_id).await?;
    Ok(Json(StartResponse {
        pass_id: request.pass_id,
        state: tracking,
    }))
}

pub async fn stop(State(state): State<AppState>) -> ApiResult<StatusCode> {
    state.control.stop().await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn status(State(state): State<AppState>) -> Json<ControlStatus> {
    Json(state.control.status())
}

pub async fn load_queue(
    State(state): State<AppState>,
    Json(request): Json<QueueRequest>,
) -> ApiResult<Json<QueueResponse>> {
    let pass_ids = if request.pass_ids.is_empty() {
        state.selector.store().pass_ids()
    } else {
        request.pass_ids
    };
    let accepted = state.control.load_queue(pass_ids).await?;
    Ok(Json(QueueResponse { accepted }))
}

pub async fn set_clock_offset(
    State(state): State<AppState>,
    Json(request): Json<OffsetRequest>,
) -> ApiResult<Json<ControlStatus>> {
    let offset = chrono::Duration::try_milliseconds(request.offset_ms)
        .ok_or_else(|| ApiError::Validation("offset_ms out of range".into()))?;
    let status = state.control.set_time_offset(offset).await?;
    Ok(Json(status))
}

pub async fn sync_clock(State(state): State<AppState>) -> ApiResult<Json<ClockSyncResponse>> {
    let reference_time = state.control.sync_clock().await?;
    Ok(Json(ClockSyncResponse { reference_time }))
}

pub async fn additional_data(
    State(state): State<AppState>,
    Json(request): Json<AdditionalDataRequest>,
) -> ApiResult<Json<BurstResponse>> {
    if request.count == 0 || request.count > MAX_BURST_SAMPLES {
        return Err(ApiError::Validation(format!(
            "count must be between 1 and {MAX_BURST_SAMPLES}"
        )));
    }
    let burst = state
        .control
        .additional_data(request.start_index_ms, request.count)
        .await?;
    let bytes = hex(&burst.encode());
    Ok(Json(BurstResponse { burst, bytes }))
}
