use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::app_dirs::AppDirs;
use crate::location::LocationFilter;
use crate::session::SessionConfig;
use crate::util::KM_PER_MILE;

/// Display unit for distance and pace. Internally everything is kilometers.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum, strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DistanceUnit {
    #[default]
    Km,
    Mi,
}

impl DistanceUnit {
    pub fn convert(&self, km: f64) -> f64 {
        match self {
            DistanceUnit::Km => km,
            DistanceUnit::Mi => km / KM_PER_MILE,
        }
    }

    pub fn abbreviation(&self) -> &'static str {
        match self {
            DistanceUnit::Km => "km",
            DistanceUnit::Mi => "mi",
        }
    }
}

/// How positions reach the session.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum, strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeliveryMode {
    /// Provider pushes fixes as they happen
    #[default]
    Watch,
    /// Position is polled on a fixed interval
    Poll,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub units: DistanceUnit,
    pub delivery: DeliveryMode,
    pub min_distance_m: f64,
    pub min_interval_ms: u64,
    pub poll_interval_ms: u64,
    pub timer_period_ms: u64,
    pub replay_speed: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            units: DistanceUnit::Km,
            delivery: DeliveryMode::Watch,
            min_distance_m: 2.0,
            min_interval_ms: 1000,
            poll_interval_ms: 1000,
            timer_period_ms: 1000,
            replay_speed: 1.0,
        }
    }
}

impl From<&Config> for SessionConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            filter: LocationFilter {
                min_distance_m: cfg.min_distance_m.max(0.0),
                min_interval: Duration::from_millis(cfg.min_interval_ms),
            },
            timer_period: Duration::from_millis(cfg.timer_period_ms.max(1)),
        }
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = AppDirs::config_path().unwrap_or_else(|| PathBuf::from("stride_config.json"));
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        if let Ok(bytes) = fs::read(&self.path) {
            match serde_json::from_slice::<Config>(&bytes) {
                Ok(cfg) => return cfg,
                Err(e) => log::warn!("ignoring unreadable config {}: {e}", self.path.display()),
            }
        }
        Config::default()
    }

    fn save(&self, cfg: &Config) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg).unwrap_or_default();
        fs::write(&self.path, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = FileConfigStore::with_path(&path);
        let cfg = Config::default();
        store.save(&cfg).unwrap();
        let loaded = store.load();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn save_and_load_custom_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let store = FileConfigStore::with_path(&path);
        let cfg = Config {
            units: DistanceUnit::Mi,
            delivery: DeliveryMode::Poll,
            min_distance_m: 0.5,
            min_interval_ms: 250,
            poll_interval_ms: 2000,
            timer_period_ms: 500,
            replay_speed: 4.0,
        };
        store.save(&cfg).unwrap();
        assert_eq!(cfg, store.load());
    }

    #[test]
    fn corrupt_or_missing_config_falls_back_to_default() {
        let dir = tempdir().unwrap();
        let missing = FileConfigStore::with_path(dir.path().join("nope.json"));
        assert_eq!(missing.load(), Config::default());

        let path = dir.path().join("config.json");
        fs::write(&path, b"{ not json").unwrap();
        assert_eq!(FileConfigStore::with_path(&path).load(), Config::default());
    }

    #[test]
    fn partial_config_fills_in_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, br#"{ "units": "mi" }"#).unwrap();
        let cfg = FileConfigStore::with_path(&path).load();
        assert_eq!(cfg.units, DistanceUnit::Mi);
        assert_eq!(cfg.timer_period_ms, 1000);
    }

    #[test]
    fn session_config_from_config() {
        let cfg = Config {
            min_distance_m: -3.0,
            timer_period_ms: 0,
            ..Config::default()
        };
        let sc = SessionConfig::from(&cfg);
        assert_eq!(sc.filter.min_distance_m, 0.0);
        assert_eq!(sc.filter.min_interval, Duration::from_millis(1000));
        assert_eq!(sc.timer_period, Duration::from_millis(1));
    }

    #[test]
    fn unit_conversion() {
        assert_eq!(DistanceUnit::Km.convert(5.0), 5.0);
        assert!((DistanceUnit::Mi.convert(KM_PER_MILE) - 1.0).abs() < 1e-12);
        assert_eq!(DistanceUnit::Mi.to_string(), "mi");
    }
}
