use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::protocol::HeaderFrame;
use crate::trajectory::{PassMaster, VariantKind};
use crate::web::api::error::{ApiError, ApiResult};
use crate::web::state::AppState;

/// One pass as the operator sees it: the operational variant only.
#[derive(Debug, Serialize)]
pub struct PassSummary {
    pub pass_id: u64,
    pub satellite: String,
    pub norad_id: u32,
    pub variant: VariantKind,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub point_count: usize,
    pub max_elevation_deg: f64,
    pub max_az_rate: f64,
    pub is_keyhole: bool,
    pub train_angle_deg: f64,
}

impl PassSummary {
    fn new(variant: VariantKind, master: &PassMaster) -> Self {
        Self {
            pass_id: master.pass_id,
            satellite: master.satellite.clone(),
            norad_id: master.norad_id,
            variant,
            start: master.start,
            end: master.end,
            point_count: master.point_count,
            max_elevation_deg: master.metrics.max_elevation_deg,
            max_az_rate: master.metrics.max_az_rate,
            is_keyhole: master.is_keyhole,
            train_angle_deg: master.train_angle_deg,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PassDetail {
    pub operational: VariantKind,
    pub variants: Vec<PassMaster>,
}

#[derive(Debug, Serialize)]
pub struct HeaderResponse {
    pub frame: HeaderFrame,
    /// Wire encoding as lowercase hex.
    pub bytes: String,
}

pub async fn list_passes(State(state): State<AppState>) -> Json<Vec<PassSummary>> {
    let mut passes: Vec<PassSummary> = state
        .selector
        .store()
        .pass_ids()
        .into_iter()
        .filter_map(|id| state.selector.select_operational(id))
        .map(|(variant, master)| PassSummary::new(variant, &master))
        .collect();
    passes.sort_by_key(|p| (p.start, p.pass_id));
    Json(passes)
}

pub async fn get_pass(
    State(state): State<AppState>,
    Path(pass_id): Path<u64>,
) -> ApiResult<Json<PassDetail>> {
    let (operational, _) = state
        .selector
        .select_operational(pass_id)
        .ok_or(ApiError::NotFound("pass_not_found"))?;
    let record = state
        .selector
        .store()
        .record(pass_id)
        .ok_or(ApiError::NotFound("pass_not_found"))?;

    Ok(Json(PassDetail {
        operational,
        variants: record
            .variants
            .values()
            .map(|track| track.master.clone())
            .collect(),
    }))
}

pub async fn get_header(
    State(state): State<AppState>,
    Path(pass_id): Path<u64>,
) -> ApiResult<Json<HeaderResponse>> {
    let frame = state.framer.build_header(pass_id)?;
    let bytes = hex(&frame.encode());
    Ok(Json(HeaderResponse { frame, bytes }))
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::state::test_state;

    #[tokio::test]
    async fn lists_operational_variants_in_start_order() {
        let (state, _rig) = test_state();
        let Json(passes) = list_passes(State(state)).await;
        assert_eq!(passes.len(), 2);
        assert_eq!(passes[0].pass_id, 1);
        assert!(passes[0].start < passes[1].start);
        assert_eq!(passes[0].variant, VariantKind::FinalTransformed);
        assert!(!passes[0].is_keyhole);
    }

    #[tokio::test]
    async fn pass_detail_lists_every_variant() {
        let (state, _rig) = test_state();
        let Json(detail) = get_pass(State(state.clone()), Path(1)).await.unwrap();
        assert_eq!(detail.operational, VariantKind::FinalTransformed);
        assert!(detail.variants.len() >= 5);
        assert!(detail.variants.iter().all(|m| m.pass_id == 1));

        assert!(matches!(
            get_pass(State(state), Path(77)).await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn header_is_returned_with_its_encoding() {
        let (state, _rig) = test_state();
        let Json(header) = get_header(State(state.clone()), Path(2)).await.unwrap();
        assert_eq!(header.frame.pass_id, 2);
        assert_eq!(header.bytes.len(), 31 * 2);
        assert!(header.bytes.starts_with("01"));

        let Json(again) = get_header(State(state), Path(2)).await.unwrap();
        assert_eq!(header.bytes, again.bytes);
    }
}
