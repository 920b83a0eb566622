use serde::Serialize;

use super::transform::{fold_train, tilt_transform, unwrap_into_band, wrapped_delta};
use crate::config::{AntennaConfig, Config, KeyholeConfig};
use crate::predict::RawSample;

/// Samples per rate window: one second at the 100 ms cadence.
pub const RATE_WINDOW: usize = 10;

/// Minimum series length for a rate to exist.
pub const MIN_RATE_SAMPLES: usize = RATE_WINDOW + 1;

/// Per-sample "sum method" rates and their maxima.
///
/// A rate is the sum of absolute per-step deltas over the last second; it is
/// not divided by elapsed time. Accelerations are the change of that rate
/// over the following second.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateProfile {
    pub az_rates: Vec<Option<f64>>,
    pub el_rates: Vec<Option<f64>>,
    pub az_accels: Vec<Option<f64>>,
    pub el_accels: Vec<Option<f64>>,
    pub max_az_rate: f64,
    pub max_el_rate: f64,
    pub max_az_accel: f64,
    pub max_el_accel: f64,
}

pub fn rate_profile(azimuths: &[f64], elevations: &[f64]) -> RateProfile {
    let n = azimuths.len().min(elevations.len());
    let mut profile = RateProfile {
        az_rates: vec![None; n],
        el_rates: vec![None; n],
        az_accels: vec![None; n],
        el_accels: vec![None; n],
        ..RateProfile::default()
    };
    if n < MIN_RATE_SAMPLES {
        return profile;
    }

    for i in RATE_WINDOW..n {
        let mut az_sum = 0.0;
        let mut el_sum = 0.0;
        for j in (i + 1 - RATE_WINDOW)..=i {
            az_sum += wrapped_delta(azimuths[j - 1], azimuths[j]).abs();
            el_sum += (elevations[j] - elevations[j - 1]).abs();
        }
        profile.az_rates[i] = Some(az_sum);
        profile.el_rates[i] = Some(el_sum);
        profile.max_az_rate = profile.max_az_rate.max(az_sum);
        profile.max_el_rate = profile.max_el_rate.max(el_sum);
    }

    for i in (2 * RATE_WINDOW)..n {
        if let (Some(now), Some(before)) = (profile.az_rates[i], profile.az_rates[i - RATE_WINDOW]) {
            let accel = (now - before).abs();
            profile.az_accels[i] = Some(accel);
            profile.max_az_accel = profile.max_az_accel.max(accel);
        }
        if let (Some(now), Some(before)) = (profile.el_rates[i], profile.el_rates[i - RATE_WINDOW]) {
            let accel = (now - before).abs();
            profile.el_accels[i] = Some(accel);
            profile.max_el_accel = profile.max_el_accel.max(accel);
        }
    }

    profile
}

/// Train angle chosen by the search together with the peak rate it achieves.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OptimizedTrain {
    pub train_angle_deg: f64,
    pub max_az_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyholeAssessment {
    pub max_az_rate: f64,
    pub max_el_rate: f64,
    pub is_keyhole: bool,
    pub recommended_train_angle_deg: f64,
    pub optimized: Option<OptimizedTrain>,
}

impl KeyholeAssessment {
    fn clear() -> Self {
        Self {
            max_az_rate: 0.0,
            max_el_rate: 0.0,
            is_keyhole: false,
            recommended_train_angle_deg: 0.0,
            optimized: None,
        }
    }
}

/// Mount geometry a series is rendered through.
#[derive(Debug, Clone, Copy)]
pub struct MountGeometry {
    pub tilt_deg: f64,
    pub wrap_limit_deg: f64,
}

impl From<&AntennaConfig> for MountGeometry {
    fn from(antenna: &AntennaConfig) -> Self {
        Self {
            tilt_deg: antenna.tilt_angle_deg,
            wrap_limit_deg: antenna.wrap_limit_deg,
        }
    }
}

impl MountGeometry {
    /// Tilt-corrected azimuth in [0, 360) and elevation for every sample.
    pub fn axis_series(&self, samples: &[RawSample], train_deg: f64) -> (Vec<f64>, Vec<f64>) {
        samples
            .iter()
            .map(|s| {
                let m = tilt_transform(s.azimuth_deg, s.elevation_deg, train_deg, self.tilt_deg);
                (m.azimuth_deg, m.elevation_deg)
            })
            .unzip()
    }

    /// As [`axis_series`](Self::axis_series) with azimuth fitted into the cable wrap.
    pub fn final_series(&self, samples: &[RawSample], train_deg: f64) -> (Vec<f64>, Vec<f64>) {
        let (az, el) = self.axis_series(samples, train_deg);
        (unwrap_into_band(&az, self.wrap_limit_deg), el)
    }
}

/// Decides whether a pass hits the keyhole and searches a train angle that avoids it.
#[derive(Debug, Clone)]
pub struct KeyholeAnalyzer {
    config: KeyholeConfig,
    geometry: MountGeometry,
}

impl KeyholeAnalyzer {
    pub fn new(config: KeyholeConfig, geometry: MountGeometry) -> Self {
        Self { config, geometry }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.keyhole.clone(), MountGeometry::from(&config.antenna))
    }

    pub fn geometry(&self) -> MountGeometry {
        self.geometry
    }

    pub fn threshold(&self) -> f64 {
        self.config.azimuth_velocity_threshold_deg_s
    }

    /// Assess a pass from its raw geometry and its `final_transformed` series.
    pub fn analyze(
        &self,
        samples: &[RawSample],
        final_azimuths: &[f64],
        final_elevations: &[f64],
    ) -> KeyholeAssessment {
        if final_azimuths.len() < MIN_RATE_SAMPLES || samples.len() < MIN_RATE_SAMPLES {
            log::warn!(
                "Keyhole analysis skipped: {} samples, need at least {}",
                final_azimuths.len(),
                MIN_RATE_SAMPLES
            );
            return KeyholeAssessment::clear();
        }

        let rates = rate_profile(final_azimuths, final_elevations);
        let is_keyhole = rates.max_az_rate >= self.threshold();

        if !is_keyhole {
            return KeyholeAssessment {
                max_az_rate: rates.max_az_rate,
                max_el_rate: rates.max_el_rate,
                is_keyhole,
                recommended_train_angle_deg: 0.0,
                optimized: None,
            };
        }

        let recommended = recommended_train_angle(samples);
        let optimized = self.optimize(samples, rates.max_az_rate);

        log::info!(
            "Keyhole: peak az rate {:.2} >= {:.2}; recommended train {:.1}, optimized train {:.1} ({:.2})",
            rates.max_az_rate,
            self.threshold(),
            recommended,
            optimized.train_angle_deg,
            optimized.max_az_rate
        );

        KeyholeAssessment {
            max_az_rate: rates.max_az_rate,
            max_el_rate: rates.max_el_rate,
            is_keyhole,
            recommended_train_angle_deg: recommended,
            optimized: Some(optimized),
        }
    }

    /// Peak wrapped azimuth rate with the train axis at `train_deg`.
    pub fn peak_azimuth_rate(&self, samples: &[RawSample], train_deg: f64) -> f64 {
        let (az, el) = self.geometry.final_series(samples, train_deg);
        rate_profile(&az, &el).max_az_rate
    }

    /// Coarse grid over the search range, then a fine grid around the best coarse point.
    fn optimize(&self, samples: &[RawSample], untrained_rate: f64) -> OptimizedTrain {
        let min = self.config.train_search_min_deg;
        let max = self.config.train_search_max_deg;

        // train 0 reproduces final_transformed, so the search never does worse
        let mut best = OptimizedTrain {
            train_angle_deg: 0.0,
            max_az_rate: untrained_rate,
        };
        if !(min..=max).contains(&0.0) {
            best = OptimizedTrain {
                train_angle_deg: min,
                max_az_rate: self.peak_azimuth_rate(samples, min),
            };
        }

        let consider = |angle: f64, best: &mut OptimizedTrain| {
            let rate = self.peak_azimuth_rate(samples, angle);
            if rate < best.max_az_rate {
                *best = OptimizedTrain {
                    train_angle_deg: angle,
                    max_az_rate: rate,
                };
            }
        };

        for angle in grid(min, max, self.config.coarse_step_deg) {
            consider(angle, &mut best);
        }

        let center = best.train_angle_deg;
        let lo = (center - self.config.coarse_step_deg).max(min);
        let hi = (center + self.config.coarse_step_deg).min(max);
        for angle in grid(lo, hi, self.config.fine_step_deg) {
            consider(angle, &mut best);
        }

        best
    }
}

fn grid(min: f64, max: f64, step: f64) -> impl Iterator<Item = f64> {
    let count = ((max - min) / step).floor() as usize;
    (0..=count).map(move |i| min + step * i as f64)
}

/// Lean the mount zenith away from the culmination point.
///
/// The zenith leans toward `train + 90`, so pointing it opposite the
/// culmination azimuth needs `train = culmination + 90`, folded into the
/// train range.
pub fn recommended_train_angle(samples: &[RawSample]) -> f64 {
    let culmination = samples
        .iter()
        .max_by(|a, b| a.elevation_deg.total_cmp(&b.elevation_deg));
    match culmination {
        Some(s) => fold_train(s.azimuth_deg + 90.0),
        None => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::fixtures::{overhead_pass, samples_with_rate};

    fn analyzer(threshold: f64) -> KeyholeAnalyzer {
        KeyholeAnalyzer::new(
            KeyholeConfig {
                azimuth_velocity_threshold_deg_s: threshold,
                ..KeyholeConfig::default()
            },
            MountGeometry {
                tilt_deg: 7.0,
                wrap_limit_deg: 270.0,
            },
        )
    }

    #[test]
    fn constant_slew_rate_sums_one_second_of_steps() {
        // 0.2 deg per 100 ms step
        let az: Vec<f64> = (0..30).map(|i| f64::from(i) * 0.2).collect();
        let el = vec![45.0; 30];
        let profile = rate_profile(&az, &el);
        assert!(profile.az_rates[..RATE_WINDOW].iter().all(Option::is_none));
        assert!((profile.az_rates[RATE_WINDOW].unwrap() - 2.0).abs() < 1e-9);
        assert!((profile.max_az_rate - 2.0).abs() < 1e-9);
        assert_eq!(profile.max_el_rate, 0.0);
        assert!(profile.max_az_accel < 1e-9);
    }

    #[test]
    fn rate_window_corrects_north_wrap() {
        let az = [358.0, 358.5, 359.0, 359.5, 0.0, 0.5, 1.0, 1.5, 2.0, 2.5, 3.0];
        let profile = rate_profile(&az, &[10.0; 11]);
        assert!((profile.max_az_rate - 5.0).abs() < 1e-9);
    }

    #[test]
    fn short_series_yields_clear_assessment() {
        let samples = samples_with_rate(10, 8.0);
        let az: Vec<f64> = samples.iter().map(|s| s.azimuth_deg).collect();
        let el: Vec<f64> = samples.iter().map(|s| s.elevation_deg).collect();
        let assessment = analyzer(5.0).analyze(&samples, &az, &el);
        assert!(!assessment.is_keyhole);
        assert_eq!(assessment.max_az_rate, 0.0);
        assert!(assessment.optimized.is_none());
    }

    #[test]
    fn slow_pass_is_not_keyhole() {
        // peak azimuth rate 2 deg/s against a 5 deg/s limit
        let samples = samples_with_rate(200, 2.0);
        let az: Vec<f64> = samples.iter().map(|s| s.azimuth_deg).collect();
        let el: Vec<f64> = samples.iter().map(|s| s.elevation_deg).collect();
        let assessment = analyzer(5.0).analyze(&samples, &az, &el);
        assert!((assessment.max_az_rate - 2.0).abs() < 1e-6);
        assert!(!assessment.is_keyhole);
        assert_eq!(assessment.recommended_train_angle_deg, 0.0);
    }

    #[test]
    fn overhead_pass_is_keyhole_and_optimizer_improves_it() {
        let samples = overhead_pass(0.02, 600);
        let analyzer = analyzer(5.0);
        let (az, el) = analyzer.geometry().final_series(&samples, 0.0);
        let assessment = analyzer.analyze(&samples, &az, &el);

        assert!(assessment.is_keyhole, "peak {}", assessment.max_az_rate);
        let optimized = assessment.optimized.unwrap();
        assert!(optimized.max_az_rate <= assessment.max_az_rate);
        assert!(optimized.max_az_rate < analyzer.threshold());
        assert!((-90.0..=90.0).contains(&optimized.train_angle_deg));
        let recommended = assessment.recommended_train_angle_deg;
        assert!(recommended > -90.0 && recommended <= 90.0);
        // culmination is due north, so the zenith should lean south
        assert!((recommended - 90.0).abs() < 1e-6);
    }

    #[test]
    fn analysis_is_deterministic() {
        let samples = overhead_pass(0.02, 600);
        let analyzer = analyzer(5.0);
        let (az, el) = analyzer.geometry().final_series(&samples, 0.0);
        let first = analyzer.analyze(&samples, &az, &el);
        let second = analyzer.analyze(&samples, &az, &el);
        assert_eq!(first, second);
    }
}
