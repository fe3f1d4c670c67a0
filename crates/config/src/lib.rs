//! Configuration loading, validation, and management for Wannabe.
//!
//! Loads configuration from `~/.wannabe/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use wannabe_core::{BlockOrder, Rating};

/// The root configuration structure.
///
/// Maps directly to `~/.wannabe/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Inference server connection
    #[serde(default)]
    pub server: ServerConfig,

    /// Sampler and length settings
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Prompt assembly preferences
    #[serde(default)]
    pub prompt: PromptConfig,

    /// What to do when the prompt exceeds the context window
    #[serde(default)]
    pub compression: CompressionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// KoboldCpp base URL (without `/api`)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Timeout for token-count and context-length queries
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://127.0.0.1:5001".into()
}
fn default_timeout_secs() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_max_length_generate")]
    pub max_length_generate: u32,

    #[serde(default = "default_max_length_idea")]
    pub max_length_idea: u32,

    #[serde(default = "default_max_length_autocomplete")]
    pub max_length_autocomplete: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_min_p")]
    pub min_p: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_top_k")]
    pub top_k: u32,

    #[serde(default = "default_rep_pen")]
    pub rep_pen: f32,

    #[serde(default = "default_stop_sequences")]
    pub stop_sequences: Vec<String>,

    #[serde(default)]
    pub banned_tokens: Vec<String>,
}

fn default_max_length_generate() -> u32 {
    250
}
fn default_max_length_idea() -> u32 {
    1000
}
fn default_max_length_autocomplete() -> u32 {
    60
}
fn default_temperature() -> f32 {
    0.15
}
fn default_min_p() -> f32 {
    0.1
}
fn default_top_p() -> f32 {
    0.95
}
fn default_top_k() -> u32 {
    40
}
fn default_rep_pen() -> f32 {
    1.0
}
fn default_stop_sequences() -> Vec<String> {
    vec!["[INST]".into(), "[/INST]".into()]
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_length_generate: default_max_length_generate(),
            max_length_idea: default_max_length_idea(),
            max_length_autocomplete: default_max_length_autocomplete(),
            temperature: default_temperature(),
            min_p: default_min_p(),
            top_p: default_top_p(),
            top_k: default_top_k(),
            rep_pen: default_rep_pen(),
            stop_sequences: default_stop_sequences(),
            banned_tokens: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Rating used when the document does not set one
    #[serde(default)]
    pub default_rating: Rating,

    /// Order of the reference and body blocks in continuation prompts
    #[serde(default)]
    pub cont_prompt_order: BlockOrder,

    /// Character cap on the body block of continuation prompts
    #[serde(default = "default_max_main_chars")]
    pub max_main_chars: usize,
}

fn default_max_main_chars() -> usize {
    8192
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            default_rating: Rating::default(),
            cont_prompt_order: BlockOrder::default(),
            max_main_chars: default_max_main_chars(),
        }
    }
}

/// Strategy applied when the assembled prompt is over budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionModeKind {
    /// Trim the body step by step against live token counts
    #[default]
    TokenDynamic,
    /// Trim the body to a fixed character count
    CharTrim,
    /// Leave the body alone
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    #[serde(default)]
    pub mode: CompressionModeKind,

    /// Characters removed per step in `token_dynamic` mode
    #[serde(default = "default_step_chars")]
    pub step_chars: usize,

    /// Body character cap in `char_trim` mode
    #[serde(default = "default_max_body_chars")]
    pub max_body_chars: usize,

    /// Context size assumed when the server cannot report one
    #[serde(default = "default_fallback_context_length")]
    pub fallback_context_length: u32,

    /// Below this kept/original ratio the compression counts as degraded
    #[serde(default = "default_min_ratio")]
    pub min_ratio: f32,

    /// Below this many kept characters the compression counts as degraded
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
}

fn default_step_chars() -> usize {
    100
}
fn default_max_body_chars() -> usize {
    8000
}
fn default_fallback_context_length() -> u32 {
    8192
}
fn default_min_ratio() -> f32 {
    0.5
}
fn default_min_chars() -> usize {
    400
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            mode: CompressionModeKind::default(),
            step_chars: default_step_chars(),
            max_body_chars: default_max_body_chars(),
            fallback_context_length: default_fallback_context_length(),
            min_ratio: default_min_ratio(),
            min_chars: default_min_chars(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.wannabe/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `WANNABE_KOBOLD_URL`
    /// - `WANNABE_DEFAULT_RATING`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(url) = std::env::var("WANNABE_KOBOLD_URL") {
            self.server.base_url = url;
        }

        if let Ok(rating) = std::env::var("WANNABE_DEFAULT_RATING") {
            self.prompt.default_rating = rating
                .parse()
                .map_err(ConfigError::ValidationError)?;
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".wannabe")
    }

    /// Get the default project save directory.
    pub fn projects_dir() -> PathBuf {
        Self::config_dir().join("projects")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.generation.temperature < 0.0 || self.generation.temperature > 5.0 {
            return Err(ConfigError::ValidationError(
                "generation.temperature must be between 0.0 and 5.0".into(),
            ));
        }

        if self.compression.step_chars == 0 {
            return Err(ConfigError::ValidationError(
                "compression.step_chars must be at least 1".into(),
            ));
        }

        if self.compression.max_body_chars == 0 {
            return Err(ConfigError::ValidationError(
                "compression.max_body_chars must be at least 1".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.compression.min_ratio) {
            return Err(ConfigError::ValidationError(
                "compression.min_ratio must be between 0.0 and 1.0".into(),
            ));
        }

        if self.server.base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "server.base_url must not be empty".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
