//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::errors::{DteError, Result};

/// Full engine configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    pub paths: PathsConfig,
    pub scheduler: SchedulerConfig,
    pub render: RenderConfig,
}

/// Filesystem paths used by the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    /// Date-keyed entry source (JSON array of verses).
    pub entries_file: PathBuf,
    /// Optional bible-reading schedule source (JSON map keyed by `MM-DD`).
    pub reading_schedule_file: PathBuf,
    /// Durable per-surface cursor map.
    pub cursor_file: PathBuf,
    pub jsonl_log: PathBuf,
}

/// Midnight rollover scheduling knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Fall back to a best-effort timer when the host denies exact scheduling.
    pub allow_imprecise: bool,
    /// Daemon loop wake interval for signal polling.
    pub poll_interval_ms: u64,
}

/// Render-model construction knobs (markup color, link bases).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RenderConfig {
    /// Hex color applied to parenthesized scripture references in the body.
    pub highlight_color: String,
    /// Per-day source page: `{base}/{year}/{month}/{day}`.
    pub library_base_url: String,
    /// Search endpoint for reading-range lookups: `{base}?q={range}`.
    pub library_search_url: String,
    /// Spreadsheet behind the reading-day label.
    pub schedule_sheet_url: String,
    /// Title shown when the resolved key has no payload.
    pub placeholder_title: String,
    /// Body shown when the resolved key has no payload.
    pub placeholder_body: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!(
                    "[DTE-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths"
                );
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        let cfg = home_dir.join(".config").join("daily-text").join("config.toml");
        let data = home_dir.join(".local").join("share").join("daily-text");
        Self {
            config_file: cfg,
            entries_file: data.join("daily_verses.json"),
            reading_schedule_file: data.join("bible_reading_schedule.json"),
            cursor_file: data.join("cursors.json"),
            jsonl_log: data.join("activity.jsonl"),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            allow_imprecise: true,
            poll_interval_ms: 500,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            highlight_color: "#FFB300".to_string(),
            library_base_url: "https://wol.jw.org/ko/wol/h/r8/lp-ko".to_string(),
            library_search_url: "https://wol.jw.org/ko/wol/l/r8/lp-ko".to_string(),
            schedule_sheet_url:
                "https://docs.google.com/spreadsheets/d/1kCUN3Jsh9b1Y1_rGfFsT7vVjj08atzdwfPuQxs08SnI"
                    .to_string(),
            placeholder_title: "Daily text unavailable".to_string(),
            placeholder_body: "The entry source could not be loaded. Refresh to retry."
                .to_string(),
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf)
                .map_err(|source| DteError::io(&path_buf, source))?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(DteError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides()?;
        cfg.normalize();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config for logging.
    ///
    /// FNV-1a over the canonical JSON form, stable across processes and
    /// Rust releases.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        set_env_path("DTE_PATHS_ENTRIES_FILE", &mut self.paths.entries_file);
        set_env_path(
            "DTE_PATHS_READING_SCHEDULE_FILE",
            &mut self.paths.reading_schedule_file,
        );
        set_env_path("DTE_PATHS_CURSOR_FILE", &mut self.paths.cursor_file);
        set_env_path("DTE_PATHS_JSONL_LOG", &mut self.paths.jsonl_log);

        set_env_bool(
            "DTE_SCHEDULER_ALLOW_IMPRECISE",
            &mut self.scheduler.allow_imprecise,
        )?;
        set_env_u64(
            "DTE_SCHEDULER_POLL_INTERVAL_MS",
            &mut self.scheduler.poll_interval_ms,
        )?;

        set_env_string(
            "DTE_RENDER_HIGHLIGHT_COLOR",
            &mut self.render.highlight_color,
        );

        Ok(())
    }

    /// Strip trailing slashes from link bases so URL joins stay canonical.
    fn normalize(&mut self) {
        for base in [
            &mut self.render.library_base_url,
            &mut self.render.library_search_url,
            &mut self.render.schedule_sheet_url,
        ] {
            while base.ends_with('/') {
                base.pop();
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.scheduler.poll_interval_ms == 0 {
            return Err(DteError::InvalidConfig {
                details: "scheduler.poll_interval_ms must be >= 1".to_string(),
            });
        }

        let hex_color = Regex::new(r"^#[0-9a-fA-F]{6}$")
            .map_err(|err| DteError::Runtime {
                details: format!("color pattern failed to compile: {err}"),
            })?;
        if !hex_color.is_match(&self.render.highlight_color) {
            return Err(DteError::InvalidConfig {
                details: format!(
                    "render.highlight_color must be #RRGGBB, got {:?}",
                    self.render.highlight_color
                ),
            });
        }

        for (name, url) in [
            ("library_base_url", &self.render.library_base_url),
            ("library_search_url", &self.render.library_search_url),
            ("schedule_sheet_url", &self.render.schedule_sheet_url),
        ] {
            if url.is_empty() {
                return Err(DteError::InvalidConfig {
                    details: format!("render.{name} must not be empty"),
                });
            }
        }

        Ok(())
    }
}

fn set_env_path(key: &str, target: &mut PathBuf) {
    if let Some(raw) = env::var_os(key) {
        *target = PathBuf::from(raw);
    }
}

fn set_env_string(key: &str, target: &mut String) {
    if let Ok(raw) = env::var(key) {
        *target = raw;
    }
}

fn set_env_bool(key: &str, target: &mut bool) -> Result<()> {
    if let Ok(raw) = env::var(key) {
        *target = match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            other => {
                return Err(DteError::InvalidConfig {
                    details: format!("{key} must be a boolean, got {other:?}"),
                });
            }
        };
    }
    Ok(())
}

fn set_env_u64(key: &str, target: &mut u64) -> Result<()> {
    if let Ok(raw) = env::var(key) {
        *target = raw.parse().map_err(|_| DteError::InvalidConfig {
            details: format!("{key} must be an unsigned integer, got {raw:?}"),
        })?;
    }
    Ok(())
}
