use std::path::PathBuf;

use directories::ProjectDirs;
use serde::Deserialize;

use crate::analysis::{DEFAULT_AGGREGATE_MIN_PERFORMANCES, DEFAULT_RANKING_MIN_PERFORMANCES};
use crate::import::PHISH_ARTIST_ID;
use crate::stats::TTestKind;
use crate::tours::DEFAULT_BREAK_THRESHOLD_DAYS;

/// Application configuration loaded from TOML config file.
/// All fields have defaults; the config file is optional.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Custom database path (overrides XDG default).
    pub db_path: Option<PathBuf>,
    /// Number of parallel workers. 0 = auto-detect (cores / 2, min 1).
    pub workers: usize,
    pub analysis: AnalysisConfig,
    pub import: ImportConfig,
}

/// Tour-break analysis settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Day gap above which consecutive shows belong to different tours.
    pub break_threshold_days: i64,
    /// Minimum plays for a song to enter the pooled aggregate.
    pub aggregate_min_performances: usize,
    /// Minimum plays for a song to enter the per-song ranking.
    pub ranking_min_performances: usize,
    /// Look-ahead windows for the repeat-pattern analysis.
    pub repeat_windows: Vec<usize>,
    pub t_test: TTestKind,
    pub significance_level: f64,
    /// Songs shown in detail by `report`.
    pub deep_dive_songs: Vec<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            break_threshold_days: DEFAULT_BREAK_THRESHOLD_DAYS,
            aggregate_min_performances: DEFAULT_AGGREGATE_MIN_PERFORMANCES,
            ranking_min_performances: DEFAULT_RANKING_MIN_PERFORMANCES,
            repeat_windows: vec![3, 5, 10],
            t_test: TTestKind::Student,
            significance_level: 0.05,
            deep_dive_songs: ["Tweezer", "Down with Disease", "Ghost", "Light", "Ruby Waves"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Phish.net artist id to keep on import.
    pub artist_id: i64,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            artist_id: PHISH_ARTIST_ID,
        }
    }
}

impl AppConfig {
    /// Load config from `~/.config/tourbreak/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) if path.exists() => match std::fs::read_to_string(&path) {
                Ok(contents) => match Self::parse(&contents) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", path.display());
                        config
                    }
                    Err(e) => {
                        log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                        Self::default()
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        let config: Self = toml::from_str(contents)?;
        if config.analysis.repeat_windows.contains(&0) {
            log::warn!("repeat_windows contains 0; that window will be rejected");
        }
        Ok(config)
    }

    /// Resolve worker count: 0 → auto-detect (cores / 2, min 1).
    pub fn resolve_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            let cores = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2);
            (cores / 2).max(1)
        }
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// Resolve the default database path using XDG data directory.
pub fn default_db_path() -> PathBuf {
    if let Some(dirs) = ProjectDirs::from("", "", crate::APP_NAME) {
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir).ok();
        data_dir.join("tourbreak.db")
    } else {
        // Fallback: current directory
        PathBuf::from("tourbreak.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = AppConfig::parse("").unwrap();
        assert!(config.db_path.is_none());
        assert_eq!(config.analysis.break_threshold_days, 14);
        assert_eq!(config.analysis.aggregate_min_performances, 30);
        assert_eq!(config.analysis.ranking_min_performances, 50);
        assert_eq!(config.analysis.repeat_windows, vec![3, 5, 10]);
        assert_eq!(config.analysis.t_test, TTestKind::Student);
        assert_eq!(config.analysis.deep_dive_songs.len(), 5);
        assert_eq!(config.import.artist_id, 1);
    }

    #[test]
    fn test_partial_override() {
        let config = AppConfig::parse(
            r#"
            workers = 3

            [analysis]
            break_threshold_days = 21
            t_test = "welch"
            deep_dive_songs = ["Harry Hood"]
            "#,
        )
        .unwrap();
        assert_eq!(config.resolve_workers(), 3);
        assert_eq!(config.analysis.break_threshold_days, 21);
        assert_eq!(config.analysis.t_test, TTestKind::Welch);
        assert_eq!(config.analysis.deep_dive_songs, vec!["Harry Hood"]);
        assert_eq!(config.analysis.aggregate_min_performances, 30);
    }

    #[test]
    fn test_bad_value_is_an_error() {
        assert!(AppConfig::parse("[analysis]\nt_test = \"paired\"").is_err());
    }

    #[test]
    fn test_auto_workers() {
        assert!(AppConfig::default().resolve_workers() >= 1);
    }
}
