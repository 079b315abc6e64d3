/// Configuration management for agentedit
///
/// agentedit stores configuration in ~/.agentedit/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// agentedit configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Editing and output settings
    #[serde(default)]
    pub editor: EditorSettings,

    /// Undo history settings
    #[serde(default)]
    pub history: HistoryConfig,

    /// Linter settings
    #[serde(default)]
    pub lint: LintConfig,

    /// Directory listing subprocess settings
    #[serde(default)]
    pub shell: ShellConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditorSettings {
    /// Lines of context shown around an edit
    #[serde(default = "default_snippet_context_window")]
    pub snippet_context_window: usize,

    /// Maximum characters of file content in one response
    #[serde(default = "default_max_response_len")]
    pub max_response_len: usize,

    /// Tab stop width used when expanding tabs
    #[serde(default = "default_tab_size")]
    pub tab_size: usize,

    /// Files below this size (KB) are processed in memory
    #[serde(default = "default_in_memory_threshold_kb")]
    pub in_memory_threshold_kb: u64,

    /// Read buffer size (KB) for streaming
    #[serde(default = "default_chunk_size_kb")]
    pub chunk_size_kb: usize,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            snippet_context_window: default_snippet_context_window(),
            max_response_len: default_max_response_len(),
            tab_size: default_tab_size(),
            in_memory_threshold_kb: default_in_memory_threshold_kb(),
            chunk_size_kb: default_chunk_size_kb(),
        }
    }
}

impl EditorSettings {
    pub fn chunk_size_bytes(&self) -> usize {
        self.chunk_size_kb.saturating_mul(1024)
    }

    pub fn in_memory_threshold_bytes(&self) -> u64 {
        self.in_memory_threshold_kb.saturating_mul(1024)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Custom history directory (optional, default is a per-process temp dir)
    #[serde(default)]
    pub dir: Option<String>,

    /// Maximum percentage of free space one snapshot may use
    #[serde(default = "default_max_disk_usage_percent")]
    pub max_disk_usage_percent: f64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            dir: None,
            max_disk_usage_percent: default_max_disk_usage_percent(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LintConfig {
    /// Linter executable, looked up in PATH
    #[serde(default)]
    pub command: Option<String>,

    /// Arguments passed before the file path
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellConfig {
    /// Timeout for the directory listing subprocess
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Write debug logs to ~/.agentedit/agentedit.log
    #[serde(default)]
    pub debug: bool,
}

// Default functions for serde
fn default_snippet_context_window() -> usize { 4 }
fn default_max_response_len() -> usize { 16000 }
fn default_tab_size() -> usize { 8 }
fn default_in_memory_threshold_kb() -> u64 { 1024 }
fn default_chunk_size_kb() -> usize { 1024 }
fn default_max_disk_usage_percent() -> f64 { 60.0 }
fn default_timeout_secs() -> u64 { 120 }

const MAX_CHUNK_SIZE_KB: usize = 64 * 1024;
const MAX_IN_MEMORY_THRESHOLD_KB: u64 = 1024 * 1024;

/// Get the configuration file path
pub fn config_file_path() -> Result<PathBuf> {
    let home_dir = dirs::home_dir()
        .ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;

    let config_dir = home_dir.join(".agentedit");
    fs::create_dir_all(&config_dir)
        .with_context(|| format!("Failed to create config directory: {}", config_dir.display()))?;

    Ok(config_dir.join("config.toml"))
}

/// Resolve a leading `~/` against the home directory
pub fn expand_home(dir: &str) -> PathBuf {
    match (dir.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(dir),
    }
}

/// Get the default configuration file content with comments
fn get_default_config_content() -> &'static str {
    r#"# agentedit Configuration File
#
# This file controls default behavior for agentedit.
# For more information, run: agentedit config --help

[editor]
# Lines of unchanged context shown around an edit (default: 4)
snippet_context_window = 4

# Maximum characters of file content returned in one response (default: 16000)
max_response_len = 16000

# Tab stop width used when expanding tabs (default: 8)
tab_size = 8

# Files smaller than this (KB) are edited in memory, larger ones are streamed (default: 1024)
in_memory_threshold_kb = 1024

# Read buffer size in KB used when streaming (default: 1024)
chunk_size_kb = 1024

[history]
# Custom directory for undo snapshots (optional)
# By default snapshots live in a temp directory removed when agentedit exits.
#dir = "/var/tmp/agentedit-history"

# Refuse a snapshot that would use more than this % of free space (default: 60)
max_disk_usage_percent = 60

[lint]
# Linter run on edits when enable_linting is set (optional)
# It must print diagnostics as `file:line:column: message`.
#command = "flake8"
#args = []

[shell]
# Timeout in seconds for listing directories (default: 120)
timeout_secs = 120

[logging]
# Write debug logs to ~/.agentedit/agentedit.log (default: false)
debug = false
"#
}

/// Save the default commented configuration file
pub fn save_default_config(config_path: &Path) -> Result<()> {
    fs::write(config_path, get_default_config_content())
        .with_context(|| format!("Failed to write default config file: {}", config_path.display()))?;

    Ok(())
}

/// Load configuration from file, creating default if needed
///
/// If the config file doesn't exist, creates it with defaults and returns them.
/// If the config file is malformed, recreates it with defaults.
pub fn load_config_from(config_path: &Path) -> Result<Config> {
    // Create default config file if it doesn't exist
    if !config_path.exists() {
        save_default_config(config_path)?;
    }

    let config_str = fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

    let config: Config = match toml::from_str(&config_str) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(path = %config_path.display(), error = %e, "malformed config, recreating defaults");
            save_default_config(config_path)?;
            return Ok(Config::default());
        }
    };

    validate_config(&config)?;
    Ok(config)
}

pub fn load_config() -> Result<Config> {
    load_config_from(&config_file_path()?)
}

/// Validate configuration values
pub fn validate_config(config: &Config) -> Result<()> {
    if config.editor.snippet_context_window > 100 {
        anyhow::bail!(
            "Invalid snippet_context_window: {} (max 100)",
            config.editor.snippet_context_window
        );
    }

    if config.editor.max_response_len < 100 {
        anyhow::bail!(
            "Invalid max_response_len: {} (min 100)",
            config.editor.max_response_len
        );
    }

    if config.editor.tab_size == 0 || config.editor.tab_size > 16 {
        anyhow::bail!("Invalid tab_size: {} (must be 1-16)", config.editor.tab_size);
    }

    if config.editor.chunk_size_kb == 0 || config.editor.chunk_size_kb > MAX_CHUNK_SIZE_KB {
        anyhow::bail!(
            "Invalid chunk_size_kb: {} (must be 1-{})",
            config.editor.chunk_size_kb,
            MAX_CHUNK_SIZE_KB
        );
    }

    if config.editor.in_memory_threshold_kb > MAX_IN_MEMORY_THRESHOLD_KB {
        anyhow::bail!(
            "Invalid in_memory_threshold_kb: {} (max {})",
            config.editor.in_memory_threshold_kb,
            MAX_IN_MEMORY_THRESHOLD_KB
        );
    }

    let percent = config.history.max_disk_usage_percent;
    if !(0.0..=100.0).contains(&percent) {
        anyhow::bail!("Invalid max_disk_usage_percent: {} (must be 0-100)", percent);
    }

    if config.shell.timeout_secs == 0 {
        anyhow::bail!("Invalid timeout_secs: 0 (must be positive)");
    }

    Ok(())
}
