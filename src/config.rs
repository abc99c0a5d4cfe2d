use crate::errors::{AppError, AppResult};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_DAYS_TO_KEEP: u32 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsConfig {
    /// Record one sample per job execution when enabled.
    pub track_jobs_metrics: bool,
    /// Log failures to persist a sample.
    pub log_errors: bool,
    pub days_to_keep: u32,
    pub database_path: PathBuf,
    pub export_dir: PathBuf,
    pub log_dir: Option<PathBuf>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            track_jobs_metrics: true,
            log_errors: true,
            days_to_keep: DEFAULT_DAYS_TO_KEEP,
            database_path: PathBuf::from("data/jobs-metrics.sqlite"),
            export_dir: PathBuf::from("data/jobs-metrics-export"),
            log_dir: None,
        }
    }
}

// Every field optional so a file can override a subset.
#[derive(Deserialize, Default, Debug)]
#[serde(deny_unknown_fields)]
struct PartialMetricsConfig {
    track_jobs_metrics: Option<bool>,
    log_errors: Option<bool>,
    days_to_keep: Option<u32>,
    database_path: Option<PathBuf>,
    export_dir: Option<PathBuf>,
    log_dir: Option<PathBuf>,
}

impl MetricsConfig {
    /// Defaults, then the TOML file (if present), then environment overrides.
    pub fn load(config_path: Option<&Path>) -> AppResult<Self> {
        let file_config = match config_path {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path).map_err(|error| {
                    AppError::Config(format!("failed to read config file at {path:?}: {error}"))
                })?;
                Self::parse_partial(&contents)?
            }
            _ => PartialMetricsConfig::default(),
        };

        let mut config = Self::default();
        config.apply(file_config);
        config.apply(Self::partial_from_env(|key| std::env::var(key).ok())?);
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> AppResult<Self> {
        let mut config = Self::default();
        config.apply(Self::parse_partial(contents)?);
        Ok(config)
    }

    fn parse_partial(contents: &str) -> AppResult<PartialMetricsConfig> {
        toml::from_str(contents).map_err(AppError::from)
    }

    fn apply(&mut self, partial: PartialMetricsConfig) {
        if let Some(value) = partial.track_jobs_metrics {
            self.track_jobs_metrics = value;
        }
        if let Some(value) = partial.log_errors {
            self.log_errors = value;
        }
        if let Some(value) = partial.days_to_keep {
            self.days_to_keep = value;
        }
        if let Some(value) = partial.database_path {
            self.database_path = value;
        }
        if let Some(value) = partial.export_dir {
            self.export_dir = value;
        }
        if partial.log_dir.is_some() {
            self.log_dir = partial.log_dir;
        }
    }

    fn partial_from_env(lookup: impl Fn(&str) -> Option<String>) -> AppResult<PartialMetricsConfig> {
        let flag = |key: &str| -> AppResult<Option<bool>> {
            lookup(key).map(|raw| parse_flag(key, &raw)).transpose()
        };

        let days_to_keep = lookup("JOBS_METRICS_DAYS_TO_KEEP")
            .map(|raw| {
                raw.trim().parse::<u32>().map_err(|_| {
                    AppError::Config(format!("JOBS_METRICS_DAYS_TO_KEEP must be a whole number, got '{raw}'"))
                })
            })
            .transpose()?;

        Ok(PartialMetricsConfig {
            track_jobs_metrics: flag("TRACK_JOBS_METRICS")?,
            log_errors: flag("JOBS_METRICS_LOG_ERRORS")?,
            days_to_keep,
            database_path: lookup("JOBS_METRICS_DATABASE").map(PathBuf::from),
            export_dir: lookup("JOBS_METRICS_EXPORT_DIR").map(PathBuf::from),
            log_dir: lookup("JOBS_METRICS_LOG_DIR").map(PathBuf::from),
        })
    }
}

fn parse_flag(key: &str, raw: &str) -> AppResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(AppError::Config(format!("{key} expects a boolean, got '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_flag, MetricsConfig, DEFAULT_DAYS_TO_KEEP};
    use std::collections::HashMap;
    use std::path::PathBuf;

    #[test]
    fn defaults_enable_tracking() {
        let config = MetricsConfig::default();
        assert!(config.track_jobs_metrics);
        assert!(config.log_errors);
        assert_eq!(config.days_to_keep, DEFAULT_DAYS_TO_KEEP);
    }

    #[test]
    fn toml_overrides_subset_of_fields() {
        let config = MetricsConfig::from_toml_str(
            "track_jobs_metrics = false\ndays_to_keep = 14\nexport_dir = \"/tmp/out\"\n",
        )
        .expect("parse config");
        assert!(!config.track_jobs_metrics);
        assert!(config.log_errors);
        assert_eq!(config.days_to_keep, 14);
        assert_eq!(config.export_dir, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = MetricsConfig::from_toml_str("track_jobs = true").expect_err("unknown key");
        assert!(err.to_string().starts_with("CONFIG_INVALID"));
    }

    #[test]
    fn env_overrides_are_parsed() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("TRACK_JOBS_METRICS", "off"),
            ("JOBS_METRICS_DAYS_TO_KEEP", "60"),
        ]);
        let partial = MetricsConfig::partial_from_env(|key| env.get(key).map(|value| value.to_string()))
            .expect("env config");

        let mut config = MetricsConfig::default();
        config.apply(partial);
        assert!(!config.track_jobs_metrics);
        assert_eq!(config.days_to_keep, 60);
    }

    #[test]
    fn non_numeric_days_from_env_is_an_error() {
        let err = MetricsConfig::partial_from_env(|key| {
            (key == "JOBS_METRICS_DAYS_TO_KEEP").then(|| "thirty".to_string())
        })
        .expect_err("invalid days");
        assert!(err.to_string().contains("JOBS_METRICS_DAYS_TO_KEEP"));
    }

    #[test]
    fn flags_accept_common_spellings() {
        assert!(parse_flag("X", "Yes").expect("yes"));
        assert!(!parse_flag("X", "0").expect("zero"));
        assert!(parse_flag("X", "maybe").is_err());
    }
}
