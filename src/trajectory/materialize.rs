use std::collections::BTreeMap;

use super::error::TrajectoryError;
use super::keyhole::{rate_profile, KeyholeAnalyzer, KeyholeAssessment};
use super::types::{
    OptimizationSummary, PassMaster, PassMetrics, PassRecord, TrackingPoint, VariantKind,
    VariantTrack,
};
use crate::predict::{RawPass, RawSample};

/// Render every variant of a raw pass and run the keyhole analysis on it.
pub fn materialize(
    pass_id: u64,
    raw: &RawPass,
    analyzer: &KeyholeAnalyzer,
) -> Result<PassRecord, TrajectoryError> {
    let samples = raw.samples.as_slice();
    if samples.is_empty() {
        return Err(TrajectoryError::EmptyPass {
            satellite: raw.satellite.clone(),
            detail_index: raw.detail_index,
        });
    }

    let geometry = analyzer.geometry();
    let original: (Vec<f64>, Vec<f64>) = samples
        .iter()
        .map(|s| (s.azimuth_deg, s.elevation_deg))
        .unzip();
    let axis = geometry.axis_series(samples, 0.0);
    let final_series = geometry.final_series(samples, 0.0);

    let assessment = analyzer.analyze(samples, &final_series.0, &final_series.1);
    let recommended = assessment.recommended_train_angle_deg;

    let mut renderings = vec![
        (VariantKind::Original, 0.0, original),
        (VariantKind::AxisTransformed, 0.0, axis),
        (VariantKind::FinalTransformed, 0.0, final_series),
        (
            VariantKind::KeyholeAxisTransformed,
            recommended,
            geometry.axis_series(samples, recommended),
        ),
        (
            VariantKind::KeyholeFinalTransformed,
            recommended,
            geometry.final_series(samples, recommended),
        ),
    ];

    let optimization = assessment.optimized.map(|optimized| {
        OptimizationSummary::new(
            optimized.train_angle_deg,
            assessment.max_az_rate,
            optimized.max_az_rate,
        )
    });
    if let Some(optimized) = assessment.optimized {
        renderings.push((
            VariantKind::KeyholeOptimizedFinalTransformed,
            optimized.train_angle_deg,
            geometry.final_series(samples, optimized.train_angle_deg),
        ));
    }

    let variants = renderings
        .into_iter()
        .map(|(kind, train, (az, el))| {
            let track = build_track(
                pass_id,
                raw,
                kind,
                train,
                &az,
                &el,
                &assessment,
                optimization.clone(),
            );
            (kind, track)
        })
        .collect::<BTreeMap<_, _>>();

    Ok(PassRecord {
        pass_id,
        detail_index: raw.detail_index,
        variants,
    })
}

#[allow(clippy::too_many_arguments)]
fn build_track(
    pass_id: u64,
    raw: &RawPass,
    variant: VariantKind,
    train_deg: f64,
    azimuths: &[f64],
    elevations: &[f64],
    assessment: &KeyholeAssessment,
    optimization: Option<OptimizationSummary>,
) -> VariantTrack {
    let samples = &raw.samples;
    let rates = rate_profile(azimuths, elevations);

    let points: Vec<TrackingPoint> = samples
        .iter()
        .enumerate()
        .map(|(i, s)| TrackingPoint {
            index: i as u32,
            timestamp: s.timestamp,
            azimuth_deg: azimuths[i],
            elevation_deg: elevations[i],
            range_km: s.range_km,
            altitude_km: s.altitude_km,
            train_deg,
            az_rate: rates.az_rates[i],
            el_rate: rates.el_rates[i],
            az_accel: rates.az_accels[i],
            el_accel: rates.el_accels[i],
        })
        .collect();

    let metrics = metrics(samples, azimuths, elevations, &rates);
    let first = &samples[0];
    let last = &samples[samples.len() - 1];

    VariantTrack {
        master: PassMaster {
            pass_id,
            satellite: raw.satellite.clone(),
            norad_id: raw.norad_id,
            detail_index: raw.detail_index,
            variant,
            start: first.timestamp,
            end: last.timestamp,
            point_count: points.len(),
            train_angle_deg: train_deg,
            metrics,
            is_keyhole: assessment.is_keyhole,
            recommended_train_angle_deg: assessment.recommended_train_angle_deg,
            optimization,
        },
        points: points.into(),
    }
}

fn metrics(
    samples: &[RawSample],
    azimuths: &[f64],
    elevations: &[f64],
    rates: &super::keyhole::RateProfile,
) -> PassMetrics {
    let last = samples.len() - 1;
    let (peak_index, peak_el) = elevations
        .iter()
        .copied()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, el)| {
            if el > best.1 {
                (i, el)
            } else {
                best
            }
        });

    PassMetrics {
        start_azimuth_deg: azimuths[0],
        start_elevation_deg: elevations[0],
        end_azimuth_deg: azimuths[last],
        end_elevation_deg: elevations[last],
        max_elevation_deg: peak_el,
        max_elevation_time: samples[peak_index].timestamp,
        max_az_rate: rates.max_az_rate,
        max_el_rate: rates.max_el_rate,
        max_az_accel: rates.max_az_accel,
        max_el_accel: rates.max_el_accel,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::fixtures::{overhead_pass, raw_pass, samples_with_rate};
    use crate::trajectory::test_analyzer;

    #[test]
    fn empty_pass_is_rejected() {
        let result = materialize(1, &raw_pass(Vec::new()), &test_analyzer(5.0));
        assert!(matches!(result, Err(TrajectoryError::EmptyPass { .. })));
    }

    #[test]
    fn slow_pass_has_five_variants_and_no_optimization() {
        let record = materialize(1, &raw_pass(samples_with_rate(300, 2.0)), &test_analyzer(5.0)).unwrap();
        assert_eq!(record.variants.len(), 5);
        assert!(record.variant(VariantKind::KeyholeOptimizedFinalTransformed).is_none());

        let final_master = &record.variant(VariantKind::FinalTransformed).unwrap().master;
        assert!(!final_master.is_keyhole);
        assert_eq!(final_master.recommended_train_angle_deg, 0.0);
        assert!(final_master.optimization.is_none());
    }

    #[test]
    fn all_variants_share_count_and_timestamps() {
        let record = materialize(9, &raw_pass(overhead_pass(0.02, 300)), &test_analyzer(5.0)).unwrap();
        assert_eq!(record.variants.len(), 6);

        let reference = record.variant(VariantKind::Original).unwrap();
        for track in record.variants.values() {
            assert_eq!(track.points.len(), reference.points.len());
            assert_eq!(track.master.point_count, reference.points.len());
            assert!(track
                .points
                .iter()
                .zip(reference.points.iter())
                .all(|(a, b)| a.timestamp == b.timestamp));
        }
    }

    #[test]
    fn keyhole_rows_carry_train_angles_and_improvement() {
        let record = materialize(9, &raw_pass(overhead_pass(0.02, 300)), &test_analyzer(5.0)).unwrap();
        let final_track = record.variant(VariantKind::FinalTransformed).unwrap();
        let optimized = record
            .variant(VariantKind::KeyholeOptimizedFinalTransformed)
            .unwrap();
        let recommended = record.variant(VariantKind::KeyholeFinalTransformed).unwrap();

        assert!(final_track.master.is_keyhole);
        assert!(optimized.master.metrics.max_az_rate <= final_track.master.metrics.max_az_rate);

        let summary = optimized.master.optimization.clone().unwrap();
        assert!(summary.improvement >= 0.0);
        assert_eq!(optimized.master.train_angle_deg, summary.optimized_train_angle_deg);
        assert_eq!(
            recommended.master.train_angle_deg,
            final_track.master.recommended_train_angle_deg
        );
        assert!(optimized.points.iter().all(|p| p.train_deg == summary.optimized_train_angle_deg));
    }

    #[test]
    fn final_variant_stays_inside_cable_wrap() {
        let record = materialize(9, &raw_pass(overhead_pass(0.02, 300)), &test_analyzer(5.0)).unwrap();
        for kind in [
            VariantKind::FinalTransformed,
            VariantKind::KeyholeFinalTransformed,
            VariantKind::KeyholeOptimizedFinalTransformed,
        ] {
            let track = record.variant(kind).unwrap();
            assert!(track.points.iter().all(|p| p.azimuth_deg.abs() <= 270.0));
        }
        let axis = record.variant(VariantKind::AxisTransformed).unwrap();
        assert!(axis.points.iter().all(|p| (0.0..=360.0).contains(&p.azimuth_deg)));
    }
}
