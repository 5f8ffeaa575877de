use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};
use crate::kpi::TrendConfig;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EngineConfig {
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub fetch: FetchSection,
    #[serde(default)]
    pub trend: TrendSection,
}

impl EngineConfig {
    /// Resolves a relative path against the directory holding the config file.
    pub fn resolve_path<P: AsRef<Path>>(&self, config_dir: &Path, candidate: P) -> PathBuf {
        let path = candidate.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            config_dir.join(path)
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch.timeout_ms)
    }

    pub fn trend_config(&self) -> TrendConfig {
        TrendConfig {
            epsilon_ratio: self.trend.epsilon_ratio,
            window: self.trend.window,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    #[serde(default = "StoreSection::default_database")]
    pub database: String,
}

impl StoreSection {
    fn default_database() -> String {
        "data/kpi.sqlite".to_string()
    }
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            database: Self::default_database(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchSection {
    #[serde(default = "FetchSection::default_timeout_ms")]
    pub timeout_ms: u64,
}

impl FetchSection {
    const fn default_timeout_ms() -> u64 {
        5_000
    }
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            timeout_ms: Self::default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrendSection {
    /// Fraction of the observed value range below which a delta counts as flat.
    #[serde(default = "TrendSection::default_epsilon_ratio")]
    pub epsilon_ratio: f64,
    /// Number of trailing points considered; all points when unset.
    #[serde(default)]
    pub window: Option<usize>,
}

impl TrendSection {
    const fn default_epsilon_ratio() -> f64 {
        0.01
    }
}

impl Default for TrendSection {
    fn default() -> Self {
        Self {
            epsilon_ratio: Self::default_epsilon_ratio(),
            window: None,
        }
    }
}

pub fn load_engine_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig> {
    let path = path.as_ref();
    let config: EngineConfig = load_toml(path)?;
    if !(0.0..1.0).contains(&config.trend.epsilon_ratio) {
        return Err(ConfigError::Invalid {
            path: path.to_path_buf(),
            reason: "trend.epsilon_ratio must be within [0, 1)".into(),
        });
    }
    if config.fetch.timeout_ms == 0 {
        return Err(ConfigError::Invalid {
            path: path.to_path_buf(),
            reason: "fetch.timeout_ms must be greater than zero".into(),
        });
    }
    Ok(config)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_fixture_config() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/kpi.toml");
        let config = load_engine_config(path).expect("config should parse");
        assert_eq!(config.store.database, "data/kpi.sqlite");
        assert_eq!(config.fetch_timeout(), Duration::from_secs(5));
        assert_eq!(config.trend.window, None);
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config: EngineConfig = toml::from_str("[trend]\nwindow = 7\n").unwrap();
        assert_eq!(config.trend.window, Some(7));
        assert_eq!(config.trend.epsilon_ratio, 0.01);
        assert_eq!(config.fetch.timeout_ms, 5_000);
        assert_eq!(config.store.database, "data/kpi.sqlite");
    }

    #[test]
    fn rejects_out_of_range_epsilon() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kpi.toml");
        std::fs::write(&path, "[trend]\nepsilon_ratio = 1.5\n").unwrap();
        let err = load_engine_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let config = EngineConfig::default();
        let resolved = config.resolve_path(Path::new("/etc/kpi"), "data/kpi.sqlite");
        assert_eq!(resolved, PathBuf::from("/etc/kpi/data/kpi.sqlite"));
        let absolute = config.resolve_path(Path::new("/etc/kpi"), "/var/kpi.sqlite");
        assert_eq!(absolute, PathBuf::from("/var/kpi.sqlite"));
    }
}
