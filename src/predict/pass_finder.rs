use chrono::{DateTime, Duration, Utc};
use sgp4::{Constants, Elements};

use super::error::PredictError;
use super::propagation::propagate_sample;
use super::types::{sample_interval, PassWindow, RawPass, RawSample, ScheduleRequest};
use super::{parse_tle_lines, GroundStation, Propagator};

const COARSE_STEP_SECONDS: i64 = 60; // 1 minute for initial scan
const FINE_STEP_MILLIS: i64 = 100;

/// Find all windows where the satellite is at or above `min_elevation`.
pub fn predict_passes(
    station: &GroundStation,
    elements: &Elements,
    constants: &Constants,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    min_elevation: f64,
) -> Result<Vec<PassWindow>, PredictError> {
    let mut passes = Vec::new();
    let mut cursor = start;
    let coarse_step = Duration::seconds(COARSE_STEP_SECONDS);

    let mut prev_visible = false;
    let mut pass_start: Option<DateTime<Utc>> = None;
    let mut max_el = f64::MIN;
    let mut max_el_time = cursor;

    while cursor <= end {
        let sample = propagate_sample(station, elements, constants, cursor)?;
        let visible = sample.elevation_deg >= min_elevation;

        if visible && !prev_visible {
            let aos = if cursor == start {
                start
            } else {
                refine_crossing(
                    station,
                    elements,
                    constants,
                    cursor - coarse_step,
                    cursor,
                    true,
                    min_elevation,
                )?
            };
            pass_start = Some(aos);
            max_el = sample.elevation_deg;
            max_el_time = cursor;
        } else if visible {
            if sample.elevation_deg > max_el {
                max_el = sample.elevation_deg;
                max_el_time = cursor;
            }
        } else if prev_visible {
            if let Some(aos) = pass_start.take() {
                let los = refine_crossing(
                    station,
                    elements,
                    constants,
                    cursor - coarse_step,
                    cursor,
                    false,
                    min_elevation,
                )?;
                passes.push(PassWindow {
                    aos,
                    los,
                    tca: max_el_time,
                    max_elevation_deg: max_el,
                });
            }
        }

        prev_visible = visible;
        cursor += coarse_step;
    }

    // Pass still in progress at end of window
    if let Some(aos) = pass_start {
        passes.push(PassWindow {
            aos,
            los: end,
            tca: max_el_time,
            max_elevation_deg: max_el,
        });
    }

    Ok(passes)
}

/// Binary search for the threshold crossing between `before` and `after`.
fn refine_crossing(
    station: &GroundStation,
    elements: &Elements,
    constants: &Constants,
    before: DateTime<Utc>,
    after: DateTime<Utc>,
    is_aos: bool,
    min_elevation: f64,
) -> Result<DateTime<Utc>, PredictError> {
    let mut low = before;
    let mut high = after;

    while (high - low).num_milliseconds() > FINE_STEP_MILLIS {
        let mid = low + (high - low) / 2;
        let sample = propagate_sample(station, elements, constants, mid)?;
        let above = sample.elevation_deg >= min_elevation;

        if above == is_aos {
            high = mid;
        } else {
            low = mid;
        }
    }

    // AOS lands on the first visible instant, LOS on the last one.
    Ok(if is_aos { high } else { low })
}

/// Resample a window at the fixed 100 ms cadence.
pub fn sample_window(
    station: &GroundStation,
    elements: &Elements,
    constants: &Constants,
    window: &PassWindow,
) -> Result<Vec<RawSample>, PredictError> {
    let step = sample_interval();
    let aos = truncate_to_interval(window.aos);
    let mut cursor = aos;
    let mut samples = Vec::new();

    while cursor <= window.los {
        samples.push(propagate_sample(station, elements, constants, cursor)?);
        cursor += step;
    }

    Ok(samples)
}

fn truncate_to_interval(t: DateTime<Utc>) -> DateTime<Utc> {
    let ms = t.timestamp_millis();
    let aligned = ms - ms.rem_euclid(super::types::SAMPLE_INTERVAL_MS);
    DateTime::from_timestamp_millis(aligned).unwrap_or(t)
}

/// SGP4-backed propagator.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sgp4Propagator;

impl Propagator for Sgp4Propagator {
    fn generate_schedule(&self, request: &ScheduleRequest) -> Result<Vec<RawPass>, PredictError> {
        if request.duration_days == 0 {
            return Err(PredictError::InvalidWindow("duration must be at least one day".into()));
        }

        let tle = parse_tle_lines(&request.tle)?;
        let elements = tle.elements()?;
        let constants = Constants::from_elements(&elements)?;
        let end = request.start + Duration::days(i64::from(request.duration_days));

        let windows = predict_passes(
            &request.station,
            &elements,
            &constants,
            request.start,
            end,
            request.min_elevation_deg,
        )?;

        let satellite = elements
            .object_name
            .clone()
            .unwrap_or_else(|| format!("NORAD {}", elements.norad_id));

        let mut passes = Vec::with_capacity(windows.len());
        // detail indices restart at 0 on each UTC day
        let mut day = None;
        let mut detail_index = 0u32;
        for window in &windows {
            let samples = sample_window(&request.station, &elements, &constants, window)?;
            let Some(first) = samples.first() else {
                continue;
            };
            let pass_day = first.timestamp.date_naive();
            if day != Some(pass_day) {
                day = Some(pass_day);
                detail_index = 0;
            }
            log::debug!(
                "{} pass {}: AOS {} LOS {} max el {:.1}",
                satellite,
                detail_index,
                window.aos,
                window.los,
                window.max_elevation_deg
            );
            passes.push(RawPass {
                satellite: satellite.clone(),
                norad_id: elements.norad_id as u32,
                detail_index,
                samples,
            });
            detail_index += 1;
        }

        Ok(passes)
    }
}
