//! Configuration for the decider.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (SWF_DECIDER_COMPLETION_RESULT,
//!    SWF_DECIDER_ASYNC_TIMEOUT, SWF_DECIDER_PIPELINES)
//! 2. Config file (.swf-decider/config.yaml)
//! 3. Defaults
//!
//! Config file discovery:
//! - Searches current directory and parents for .swf-decider/config.yaml,
//!   then falls back to ~/.swf-decider/config.yaml
//! - Paths in config file are relative to the project root (the parent of
//!   .swf-decider/)

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::async_pipeline::DEFAULT_TIMEOUT_SECS;

/// Directory holding the config file
pub const CONFIG_DIR: &str = ".swf-decider";

/// Result sent with CompleteWorkflowExecution unless configured otherwise
pub const DEFAULT_COMPLETION_RESULT: &str = "All tasks completed successfully.";

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<DeciderConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub decider: DeciderSection,
    #[serde(default)]
    pub async_defaults: Option<AsyncDefaultsSection>,
    #[serde(default)]
    pub paths: PathsSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeciderSection {
    pub completion_result: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AsyncDefaultsSection {
    pub lambda_start_to_close: Option<u64>,
    pub schedule_to_start: Option<u64>,
    pub start_to_close: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsSection {
    /// Pipeline definitions directory (relative to the project root)
    pub pipelines: Option<String>,
}

/// Timeouts applied to async pipelines that leave them unset, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AsyncDefaults {
    pub lambda_start_to_close: u64,
    pub schedule_to_start: u64,
    pub start_to_close: u64,
}

impl Default for AsyncDefaults {
    fn default() -> Self {
        Self {
            lambda_start_to_close: DEFAULT_TIMEOUT_SECS,
            schedule_to_start: DEFAULT_TIMEOUT_SECS,
            start_to_close: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Resolved configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeciderConfig {
    /// Result attached to CompleteWorkflowExecution
    pub completion_result: String,
    /// Defaults for async pipeline timeouts
    pub async_defaults: AsyncDefaults,
    /// Absolute path to pipeline definitions (if configured)
    pub pipelines_dir: Option<PathBuf>,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

impl Default for DeciderConfig {
    fn default() -> Self {
        Self {
            completion_result: DEFAULT_COMPLETION_RESULT.to_string(),
            async_defaults: AsyncDefaults::default(),
            pipelines_dir: None,
            config_file: None,
        }
    }
}

impl DeciderConfig {
    /// Resolve a pipeline argument: an existing path, or a name looked up
    /// as `<pipelines_dir>/<name>.yaml`
    pub fn pipeline_path(&self, pipeline: &str) -> PathBuf {
        let direct = PathBuf::from(pipeline);
        if direct.exists() {
            return direct;
        }
        match self.pipelines_dir {
            Some(ref dir) => dir.join(format!("{}.yaml", pipeline)),
            None => direct,
        }
    }
}

/// Find config file by searching `start` and its parents
fn find_config_file_from(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_DIR).join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Find config file from the current directory, then the home directory
fn find_config_file() -> Option<PathBuf> {
    std::env::current_dir()
        .ok()
        .and_then(|cwd| find_config_file_from(&cwd))
        .or_else(|| {
            dirs::home_dir()
                .map(|home| home.join(CONFIG_DIR).join("config.yaml"))
                .filter(|path| path.exists())
        })
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the project root
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Merge a config file (if any) over defaults
fn resolve(config_file: Option<PathBuf>) -> Result<DeciderConfig> {
    let mut config = DeciderConfig::default();

    if let Some(ref config_path) = config_file {
        let file = load_config_file(config_path)?;

        // Base directory is the parent of .swf-decider/
        let base_dir = config_path
            .parent()
            .and_then(|p| p.parent())
            .unwrap_or(Path::new("."));

        if let Some(result) = file.decider.completion_result {
            config.completion_result = result;
        }
        if let Some(defaults) = file.async_defaults {
            let fallback = AsyncDefaults::default();
            config.async_defaults = AsyncDefaults {
                lambda_start_to_close: defaults
                    .lambda_start_to_close
                    .unwrap_or(fallback.lambda_start_to_close),
                schedule_to_start: defaults.schedule_to_start.unwrap_or(fallback.schedule_to_start),
                start_to_close: defaults.start_to_close.unwrap_or(fallback.start_to_close),
            };
        }
        config.pipelines_dir = file
            .paths
            .pipelines
            .as_deref()
            .map(|dir| resolve_path(base_dir, dir));
    }
    config.config_file = config_file;

    apply_env(config, |key| std::env::var(key).ok())
}

/// Apply environment overrides. `lookup` stands in for `std::env::var`.
fn apply_env(mut config: DeciderConfig, lookup: impl Fn(&str) -> Option<String>) -> Result<DeciderConfig> {
    if let Some(result) = lookup("SWF_DECIDER_COMPLETION_RESULT") {
        config.completion_result = result;
    }
    if let Some(timeout) = lookup("SWF_DECIDER_ASYNC_TIMEOUT") {
        let seconds: u64 = timeout
            .trim()
            .parse()
            .with_context(|| format!("Invalid SWF_DECIDER_ASYNC_TIMEOUT: {}", timeout))?;
        config.async_defaults = AsyncDefaults {
            lambda_start_to_close: seconds,
            schedule_to_start: seconds,
            start_to_close: seconds,
        };
    }
    if let Some(dir) = lookup("SWF_DECIDER_PIPELINES") {
        config.pipelines_dir = Some(PathBuf::from(dir));
    }
    Ok(config)
}

/// Load configuration from all sources
fn load_config() -> Result<DeciderConfig> {
    resolve(find_config_file())
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static DeciderConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<DeciderConfig> {
    load_config()
}
