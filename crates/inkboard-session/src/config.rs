//! Configuration: optional JSON file overlaid by `INKBOARD_*` variables.
//!
//! Lookup order for every setting: environment, then the config file, then
//! the built-in default. The user id is the one required credential.

use std::path::{Path, PathBuf};
use std::time::Duration;

use inkboard_core::{BrushSettings, Tool};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::PipelineOptions;

pub const DEFAULT_THROTTLE_MS: u64 = 50;
pub const DEFAULT_AUTOSAVE_SECS: u64 = 5;
pub const DEFAULT_UNDO_LIMIT: usize = 100;

/// Fatal start-up configuration problems
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting `{0}` (set it in the config file or via INKBOARD_USER_ID)")]
    Missing(&'static str),

    #[error("invalid value `{value}` for {key}")]
    Invalid { key: &'static str, value: String },

    #[error("failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// On-disk shape of the config file; every field is optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct FileConfig {
    pub user_id: Option<String>,
    pub display_name: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub throttle_ms: Option<u64>,
    pub autosave_secs: Option<u64>,
    pub undo_limit: Option<usize>,
    pub default_tool: Option<Tool>,
    pub undo_eraser_strokes: Option<bool>,
    pub brushes: Option<BrushSettings>,
}

/// Resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub user_id: String,
    pub display_name: Option<String>,
    /// Where boards are stored
    pub data_dir: PathBuf,
    /// Window for throttled transform writes and presence publishes
    pub throttle_interval: Duration,
    pub autosave_interval: Duration,
    pub undo_limit: usize,
    pub default_tool: Tool,
    pub undo_eraser_strokes: bool,
    pub brushes: BrushSettings,
}

impl Config {
    /// Load from the process environment and the default config file
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load with a custom environment lookup
    pub fn from_lookup(env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let path = env("INKBOARD_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| config_path(&env));
        let file = read_file(&path)?;
        Self::resolve(file, env)
    }

    /// Merge a parsed file with the environment
    pub fn resolve(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let user_id = env("INKBOARD_USER_ID")
            .or(file.user_id)
            .filter(|id| !id.trim().is_empty())
            .ok_or(ConfigError::Missing("user_id"))?;

        let throttle_ms = parsed(&env, "INKBOARD_THROTTLE_MS")?
            .or(file.throttle_ms)
            .unwrap_or(DEFAULT_THROTTLE_MS);
        let autosave_secs = parsed(&env, "INKBOARD_AUTOSAVE_SECS")?
            .or(file.autosave_secs)
            .unwrap_or(DEFAULT_AUTOSAVE_SECS);
        let undo_limit = parsed(&env, "INKBOARD_UNDO_LIMIT")?
            .or(file.undo_limit)
            .unwrap_or(DEFAULT_UNDO_LIMIT);
        let default_tool: Tool = match env("INKBOARD_DEFAULT_TOOL") {
            Some(name) => name.parse().map_err(|_| ConfigError::Invalid {
                key: "INKBOARD_DEFAULT_TOOL",
                value: name,
            })?,
            None => file.default_tool.unwrap_or_default(),
        };
        let undo_eraser_strokes = parsed(&env, "INKBOARD_UNDO_ERASER")?
            .or(file.undo_eraser_strokes)
            .unwrap_or(false);

        Ok(Self {
            user_id,
            display_name: env("INKBOARD_DISPLAY_NAME").or(file.display_name),
            data_dir: env("INKBOARD_DATA_DIR")
                .map(PathBuf::from)
                .or(file.data_dir)
                .unwrap_or_else(|| default_data_dir(&env)),
            throttle_interval: Duration::from_millis(throttle_ms),
            autosave_interval: Duration::from_secs(autosave_secs),
            undo_limit,
            default_tool,
            undo_eraser_strokes,
            brushes: file.brushes.unwrap_or_default(),
        })
    }

    /// Directory holding one JSON file per board
    pub fn boards_dir(&self) -> PathBuf {
        self.data_dir.join("boards")
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            throttle_interval: self.throttle_interval,
            undo_limit: self.undo_limit,
            undo_eraser_strokes: self.undo_eraser_strokes,
            initial_tool: self.default_tool,
            brushes: self.brushes.clone(),
        }
    }
}

fn parsed<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match env(key) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(None),
    }
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// `$XDG_CONFIG_HOME/inkboard/config.json`, falling back to ~/.config
pub fn config_path(env: &impl Fn(&str) -> Option<String>) -> PathBuf {
    let config_dir = env("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config")
        });
    config_dir.join("inkboard").join("config.json")
}

/// `$XDG_DATA_HOME/inkboard`, falling back to ~/.local/share
pub fn default_data_dir(env: &impl Fn(&str) -> Option<String>) -> PathBuf {
    let data_dir = env("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".local/share")
        });
    data_dir.join("inkboard")
}
