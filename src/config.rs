use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::predict::{GroundStation, ScheduleRequest, TleSet};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid station coordinates: {0}")]
    Coordinates(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    pub station: StationConfig,
    #[serde(default)]
    pub antenna: AntennaConfig,
    #[serde(default)]
    pub keyhole: KeyholeConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub web: WebConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StationConfig {
    pub name: Option<String>,
    pub coordinates: String,
    #[serde(default)]
    pub altitude_m: f64,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            name: None,
            coordinates: "0.0, 0.0".to_string(),
            altitude_m: 0.0,
        }
    }
}

/// Mechanical description of the three-axis mount.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AntennaConfig {
    /// Fixed tilt of the az/el platform relative to the train plane.
    pub tilt_angle_deg: f64,
    /// Cable-wrap half range of the azimuth axis.
    pub wrap_limit_deg: f64,
    pub slew_speed_deg_s: f64,
    pub train_speed_deg_s: f64,
}

impl Default for AntennaConfig {
    fn default() -> Self {
        Self {
            tilt_angle_deg: 7.0,
            wrap_limit_deg: 270.0,
            slew_speed_deg_s: 5.0,
            train_speed_deg_s: 2.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KeyholeConfig {
    pub azimuth_velocity_threshold_deg_s: f64,
    pub train_search_min_deg: f64,
    pub train_search_max_deg: f64,
    pub coarse_step_deg: f64,
    pub fine_step_deg: f64,
}

impl Default for KeyholeConfig {
    fn default() -> Self {
        Self {
            azimuth_velocity_threshold_deg_s: 5.0,
            train_search_min_deg: -90.0,
            train_search_max_deg: 90.0,
            coarse_step_deg: 10.0,
            fine_step_deg: 1.0,
        }
    }
}

/// Timing and tolerance bounds for the control loop.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    #[serde(deserialize_with = "deserialize_duration")]
    pub tick: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub preparation_window: Duration,
    pub train_tolerance_deg: f64,
    pub az_el_tolerance_deg: f64,
    #[serde(deserialize_with = "deserialize_duration")]
    pub command_precheck: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub train_stabilization: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub arrival_settle: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub forced_arrival: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub move_timeout: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub min_transition_interval: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub error_recovery_dwell: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub error_recovery_cap: Duration,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(100),
            preparation_window: Duration::from_secs(120),
            train_tolerance_deg: 0.1,
            az_el_tolerance_deg: 0.05,
            command_precheck: Duration::from_millis(500),
            train_stabilization: Duration::from_secs(3),
            arrival_settle: Duration::from_secs(3),
            forced_arrival: Duration::from_secs(10),
            move_timeout: Duration::from_secs(120),
            min_transition_interval: Duration::from_millis(500),
            error_recovery_dwell: Duration::from_secs(5),
            error_recovery_cap: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    #[serde(deserialize_with = "deserialize_duration")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub workers: usize,
    pub min_elevation_deg: f64,
    pub duration_days: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            min_elevation_deg: 10.0,
            duration_days: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    pub fn from_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn ground_station(&self) -> Result<GroundStation, ConfigError> {
        GroundStation::from_coordinates(&self.station.coordinates, Some(self.station.altitude_m))
            .ok_or_else(|| ConfigError::Coordinates(self.station.coordinates.clone()))
    }

    /// One generation request per satellite over `duration_days` from `start`.
    pub fn schedule_requests(
        &self,
        tles: &[TleSet],
        start: DateTime<Utc>,
        duration_days: u32,
    ) -> Vec<ScheduleRequest> {
        // validated on load
        let station = self.ground_station().unwrap_or_default();
        tles.iter()
            .map(|tle| ScheduleRequest {
                tle: tle.text(),
                start,
                duration_days,
                min_elevation_deg: self.generation.min_elevation_deg,
                station,
            })
            .collect()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.keyhole.azimuth_velocity_threshold_deg_s <= 0.0 {
            return invalid("keyhole.azimuth_velocity_threshold_deg_s must be positive");
        }
        if self.keyhole.train_search_min_deg > self.keyhole.train_search_max_deg {
            return invalid("keyhole train search range is inverted");
        }
        if self.keyhole.coarse_step_deg <= 0.0 || self.keyhole.fine_step_deg <= 0.0 {
            return invalid("keyhole search steps must be positive");
        }
        if self.antenna.wrap_limit_deg < 180.0 {
            return invalid("antenna.wrap_limit_deg must cover at least 180 degrees");
        }
        if self.antenna.slew_speed_deg_s <= 0.0 || self.antenna.train_speed_deg_s <= 0.0 {
            return invalid("axis speeds must be positive");
        }
        if self.tracking.tick.is_zero() {
            return invalid("tracking.tick must be non-zero");
        }
        if self.generation.workers == 0 {
            return invalid("generation.workers must be at least 1");
        }
        self.ground_station()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
station:
  name: Rooftop
  coordinates: "48.15, 11.57"
  altitude_m: 520
"#;

    #[test]
    fn defaults_match_control_constants() {
        let config = Config::from_str(MINIMAL).unwrap();
        assert_eq!(config.tracking.tick, Duration::from_millis(100));
        assert_eq!(config.tracking.preparation_window, Duration::from_secs(120));
        assert_eq!(config.tracking.move_timeout, Duration::from_secs(120));
        assert_eq!(config.cache.ttl, Duration::from_secs(3600));
        assert_eq!(config.keyhole.azimuth_velocity_threshold_deg_s, 5.0);
        assert_eq!(config.web.bind, "0.0.0.0:8080");
    }

    #[test]
    fn parses_humantime_durations() {
        let yaml = format!(
            "{MINIMAL}\ntracking:\n  train_stabilization: 1500ms\n  preparation_window: 5m\ncache:\n  ttl: 2h\n"
        );
        let config = Config::from_str(&yaml).unwrap();
        assert_eq!(config.tracking.train_stabilization, Duration::from_millis(1500));
        assert_eq!(config.tracking.preparation_window, Duration::from_secs(300));
        assert_eq!(config.cache.ttl, Duration::from_secs(7200));
        // untouched fields keep defaults
        assert_eq!(config.tracking.forced_arrival, Duration::from_secs(10));
    }

    #[test]
    fn rejects_inverted_search_range() {
        let yaml = format!(
            "{MINIMAL}\nkeyhole:\n  train_search_min_deg: 45\n  train_search_max_deg: -45\n"
        );
        assert!(matches!(
            Config::from_str(&yaml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_bad_coordinates() {
        let yaml = "station:\n  coordinates: \"north\"\n";
        assert!(matches!(
            Config::from_str(yaml),
            Err(ConfigError::Coordinates(_))
        ));
    }

    #[test]
    fn one_request_per_satellite() {
        let config = Config::from_str(MINIMAL).unwrap();
        let tle = TleSet {
            name: Some("TESTSAT".into()),
            line1: "1 99999U".into(),
            line2: "2 99999".into(),
        };
        let start = Utc::now();
        let requests = config.schedule_requests(&[tle.clone(), tle], start, 2);
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].tle, "TESTSAT\n1 99999U\n2 99999");
        assert_eq!(requests[0].start, start);
        assert_eq!(requests[0].duration_days, 2);
        assert_eq!(requests[0].min_elevation_deg, config.generation.min_elevation_deg);
        assert!((requests[1].station.longitude_deg - 11.57).abs() < 1e-9);
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let config = Config::from_file(file.path()).unwrap();
        let station = config.ground_station().unwrap();
        assert!((station.latitude_deg - 48.15).abs() < 1e-9);
        assert_eq!(station.altitude_m, 520.0);
    }
}
