use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::cache::{CachedSample, TrackingDataCache};
use super::error::ProtocolError;
use super::frames::{BurstKind, BurstSample, DataBurst, HeaderFrame, MAX_BURST_SAMPLES};
use crate::predict::SAMPLE_INTERVAL_MS;
use crate::trajectory::{TrackingPoint, VariantSelector};

/// Samples carried by the burst sent when tracking begins.
pub const INITIAL_BURST_LEN: usize = 50;

/// Builds outbound frames from the operational variant of a pass.
#[derive(Debug, Clone)]
pub struct ProtocolFramer {
    selector: VariantSelector,
    cache: Arc<TrackingDataCache>,
}

impl ProtocolFramer {
    pub fn new(selector: VariantSelector, cache: Arc<TrackingDataCache>) -> Self {
        Self { selector, cache }
    }

    pub fn selector(&self) -> &VariantSelector {
        &self.selector
    }

    pub fn cache(&self) -> &Arc<TrackingDataCache> {
        &self.cache
    }

    pub fn build_header(&self, pass_id: u64) -> Result<HeaderFrame, ProtocolError> {
        let (_, master) = self
            .selector
            .select_operational(pass_id)
            .ok_or(ProtocolError::PassNotFound(pass_id))?;

        Ok(HeaderFrame {
            pass_id,
            aos: master.start.into(),
            los: master.end.into(),
            total_samples: master.point_count as u32,
        })
    }

    /// Up to [`INITIAL_BURST_LEN`] samples from the position `now` falls on.
    pub fn build_initial_burst(
        &self,
        pass_id: u64,
        now: DateTime<Utc>,
    ) -> Result<DataBurst, ProtocolError> {
        let track = self
            .selector
            .select_track(pass_id)
            .ok_or(ProtocolError::PassNotFound(pass_id))?;
        if track.points.is_empty() {
            return Err(ProtocolError::EmptyPass(pass_id));
        }

        let start = sample_index_at(track.master.start, now, track.points.len());
        let samples = track.points[start..]
            .iter()
            .take(INITIAL_BURST_LEN)
            .map(burst_sample)
            .collect();

        Ok(DataBurst {
            kind: BurstKind::Initial,
            pass_id,
            start_index: start as u32,
            samples,
        })
    }

    /// Serve a firmware request for `count` samples from `start_index_ms`.
    ///
    /// Requests past the end of the pass yield an empty burst. `count` is
    /// capped at [`MAX_BURST_SAMPLES`].
    pub fn build_additional_burst(
        &self,
        pass_id: u64,
        start_index_ms: u64,
        count: usize,
    ) -> Result<DataBurst, ProtocolError> {
        let start = (start_index_ms / SAMPLE_INTERVAL_MS as u64) as usize;
        let count = count.min(MAX_BURST_SAMPLES);

        let samples = match self.cache.get(pass_id) {
            Some(cached) => slice_cached(&cached, start, count),
            None => {
                let track = self
                    .selector
                    .select_track(pass_id)
                    .ok_or(ProtocolError::PassNotFound(pass_id))?;
                log::debug!(
                    "Tracking data cache miss for pass {}, scanning {} rows",
                    pass_id,
                    track.points.len()
                );
                self.cache.schedule_rebuild(self.selector.clone(), pass_id);
                track
                    .points
                    .iter()
                    .filter(|p| p.index as usize >= start)
                    .take(count)
                    .map(burst_sample)
                    .collect()
            }
        };

        Ok(DataBurst {
            kind: BurstKind::Additional,
            pass_id,
            start_index: start as u32,
            samples,
        })
    }
}

/// Index of the sample `now` falls on, clamped to the pass.
pub fn sample_index_at(start: DateTime<Utc>, now: DateTime<Utc>, len: usize) -> usize {
    if len == 0 || now <= start {
        return 0;
    }
    let elapsed_ms = (now - start).num_milliseconds();
    ((elapsed_ms / SAMPLE_INTERVAL_MS) as usize).min(len - 1)
}

fn burst_sample(point: &TrackingPoint) -> BurstSample {
    BurstSample {
        offset_ms: point.index * SAMPLE_INTERVAL_MS as u32,
        elevation_deg: point.elevation_deg,
        azimuth_deg: point.azimuth_deg,
    }
}

fn slice_cached(samples: &[CachedSample], start: usize, count: usize) -> Vec<BurstSample> {
    if start >= samples.len() {
        return Vec::new();
    }
    let end = start.saturating_add(count).min(samples.len());
    samples[start..end]
        .iter()
        .enumerate()
        .map(|(i, s)| BurstSample {
            offset_ms: ((start + i) as i64 * SAMPLE_INTERVAL_MS) as u32,
            elevation_deg: s.elevation_deg,
            azimuth_deg: s.azimuth_deg,
        })
        .collect()
}
