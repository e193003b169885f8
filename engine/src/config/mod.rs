//! Configuration management
//!
//! This module handles loading, validation, and management of the Switchboard
//! configuration. Configuration is stored in TOML format at
//! ~/.switchboard/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Bind address, log level
//! - **realtime**: Realtime backend endpoints, model, voice, audio formats
//! - **memory**: Conversation memory TTL and sweep interval
//! - **search**: Search provider selection and result limits
//! - **domain**: Registrar and WHOIS endpoints
//!
//! # Credentials
//!
//! API keys never live in the config file. They are resolved once at startup
//! from environment variables into a [`Credentials`] struct; a missing
//! adapter credential is legal (the adapter degrades to its fallback), a
//! missing realtime key is a startup error.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Invalid(String),

    #[error("Failed to read config file: {0}")]
    Read(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Failed to write config file: {0}")]
    Write(String),

    #[error("Missing required environment variable: {0}")]
    MissingCredential(String),
}

/// Main configuration structure
///
/// Represents the complete Switchboard configuration loaded from
/// ~/.switchboard/config.toml. Every field carries a serde default so a
/// partial file is always accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core service settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Realtime backend configuration
    #[serde(default)]
    pub realtime: RealtimeConfig,

    /// Conversation memory configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Search adapter configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Domain adapter configuration
    #[serde(default)]
    pub domain: DomainConfig,
}

/// Core service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Bind host for the HTTP listener
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port for the HTTP listener
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Realtime backend configuration
///
/// Covers both the control plane (accept/hangup REST calls) and the session
/// socket, plus the audio/session parameters sent on accept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Base URL for the realtime control API
    #[serde(default = "default_realtime_base_url")]
    pub base_url: String,

    /// WebSocket URL for realtime sessions
    #[serde(default = "default_realtime_ws_url")]
    pub ws_url: String,

    /// Model requested when accepting a call
    #[serde(default = "default_realtime_model")]
    pub model: String,

    /// Output voice
    #[serde(default = "default_voice")]
    pub voice: String,

    /// Output speech speed multiplier
    #[serde(default = "default_speed")]
    pub speed: f64,

    /// Caller audio format
    #[serde(default = "default_input_format")]
    pub input_format: String,

    /// Backend audio format
    #[serde(default = "default_output_format")]
    pub output_format: String,

    /// Turn detection strategy
    #[serde(default = "default_turn_detection")]
    pub turn_detection: String,

    /// Request timeout for control calls, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Base instructions sent to the backend on accept
    #[serde(default = "default_instructions")]
    pub instructions: String,
}

/// Conversation memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Idle time before a conversation is evicted, in seconds
    #[serde(default = "default_memory_ttl")]
    pub ttl_secs: u64,

    /// Interval between eviction sweeps, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

/// Search adapter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Search provider ("google" or "serpapi")
    #[serde(default = "default_search_provider")]
    pub provider: String,

    /// Default number of results per query
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Base URL for Google Custom Search
    #[serde(default = "default_google_base_url")]
    pub google_base_url: String,

    /// Base URL for SerpAPI
    #[serde(default = "default_serpapi_base_url")]
    pub serpapi_base_url: String,
}

/// Domain adapter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    /// Base URL for the registrar availability API
    #[serde(default = "default_registrar_base_url")]
    pub registrar_base_url: String,

    /// Base URL for the WHOIS fallback API
    #[serde(default = "default_whois_base_url")]
    pub whois_base_url: String,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_realtime_base_url() -> String {
    "https://api.openai.com/v1/realtime".to_string()
}

fn default_realtime_ws_url() -> String {
    "wss://api.openai.com/v1/realtime".to_string()
}

fn default_realtime_model() -> String {
    "gpt-realtime".to_string()
}

fn default_voice() -> String {
    "coral".to_string()
}

fn default_speed() -> f64 {
    1.0
}

fn default_input_format() -> String {
    "pcm16".to_string()
}

fn default_output_format() -> String {
    "g711_ulaw".to_string()
}

fn default_turn_detection() -> String {
    "semantic_vad".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_instructions() -> String {
    "You are a helpful phone assistant. Speak clearly and briefly. \
     Confirm understanding before taking actions. Your default language is \
     English, unless the caller uses a different language."
        .to_string()
}

fn default_memory_ttl() -> u64 {
    3600
}

fn default_sweep_interval() -> u64 {
    1800
}

fn default_search_provider() -> String {
    "google".to_string()
}

fn default_max_results() -> usize {
    5
}

fn default_google_base_url() -> String {
    "https://www.googleapis.com/customsearch/v1".to_string()
}

fn default_serpapi_base_url() -> String {
    "https://serpapi.com/search".to_string()
}

fn default_registrar_base_url() -> String {
    "https://api.godaddy.com".to_string()
}

fn default_whois_base_url() -> String {
    "https://www.whoisapi.com/api/v1".to_string()
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
        }
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            base_url: default_realtime_base_url(),
            ws_url: default_realtime_ws_url(),
            model: default_realtime_model(),
            voice: default_voice(),
            speed: default_speed(),
            input_format: default_input_format(),
            output_format: default_output_format(),
            turn_detection: default_turn_detection(),
            request_timeout_secs: default_request_timeout(),
            instructions: default_instructions(),
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_memory_ttl(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: default_search_provider(),
            max_results: default_max_results(),
            google_base_url: default_google_base_url(),
            serpapi_base_url: default_serpapi_base_url(),
        }
    }
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            registrar_base_url: default_registrar_base_url(),
            whois_base_url: default_whois_base_url(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            core: CoreConfig::default(),
            realtime: RealtimeConfig::default(),
            memory: MemoryConfig::default(),
            search: SearchConfig::default(),
            domain: DomainConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.switchboard/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    /// Validates the configuration after loading and returns descriptive errors
    /// if validation fails.
    pub fn load_or_create() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;

        let mut config: Config =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    ///
    /// Creates the configuration directory if it doesn't exist, generates
    /// a default configuration, and saves it to the specified path.
    fn create_default(path: &Path) -> Result<Self, ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Write(e.to_string()))?;
        }

        let mut config = Self::default();
        config.validate()?;

        let toml_string =
            toml::to_string_pretty(&config).map_err(|e| ConfigError::Write(e.to_string()))?;

        fs::write(path, toml_string).map_err(|e| ConfigError::Write(e.to_string()))?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.switchboard/config.toml)
    fn default_config_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir()
            .ok_or_else(|| ConfigError::Invalid("Could not determine home directory".to_string()))?;

        Ok(home.join(".switchboard").join("config.toml"))
    }

    /// Validate configuration values
    ///
    /// Returns descriptive errors for out-of-range or unknown values so a
    /// misconfigured deployment fails at startup, not mid-call.
    fn validate(&mut self) -> Result<(), ConfigError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.core.port == 0 {
            return Err(ConfigError::Invalid("port must be non-zero".to_string()));
        }

        let valid_providers = ["google", "serpapi"];
        if !valid_providers.contains(&self.search.provider.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid search provider '{}'. Must be one of: {}",
                self.search.provider,
                valid_providers.join(", ")
            )));
        }

        if !(0.25..=4.0).contains(&self.realtime.speed) {
            return Err(ConfigError::Invalid(
                "realtime.speed must be between 0.25 and 4.0".to_string(),
            ));
        }

        if self.realtime.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "realtime.request_timeout_secs must be non-zero".to_string(),
            ));
        }

        if self.memory.ttl_secs == 0 || self.memory.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "memory.ttl_secs and memory.sweep_interval_secs must be non-zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Bind address string for the HTTP listener
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.core.host, self.core.port)
    }
}

/// Credentials resolved from the process environment at startup
///
/// Only the realtime key is mandatory. Adapter credentials are optional; an
/// absent one switches the corresponding adapter into its degraded fallback.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Bearer credential for the realtime backend (control plane + socket)
    pub realtime_api_key: String,

    /// Shared secret expected on inbound webhook requests
    pub webhook_secret: Option<String>,

    /// Search provider API key
    pub search_api_key: Option<String>,

    /// Google custom search engine id
    pub search_engine_id: Option<String>,

    /// Registrar API key
    pub registrar_api_key: Option<String>,

    /// Registrar API secret
    pub registrar_api_secret: Option<String>,

    /// WHOIS API key
    pub whois_api_key: Option<String>,
}

impl Credentials {
    /// Resolve credentials from environment variables.
    ///
    /// `SWITCHBOARD_API_KEY` is required; everything else is optional.
    pub fn from_env() -> Result<Self, ConfigError> {
        let realtime_api_key = optional_env("SWITCHBOARD_API_KEY")
            .ok_or_else(|| ConfigError::MissingCredential("SWITCHBOARD_API_KEY".to_string()))?;

        Ok(Self {
            realtime_api_key,
            webhook_secret: optional_env("SWITCHBOARD_WEBHOOK_SECRET"),
            search_api_key: optional_env("SEARCH_API_KEY"),
            search_engine_id: optional_env("SEARCH_ENGINE_ID"),
            registrar_api_key: optional_env("REGISTRAR_API_KEY"),
            registrar_api_secret: optional_env("REGISTRAR_API_SECRET"),
            whois_api_key: optional_env("WHOIS_API_KEY"),
        })
    }
}

/// Read an environment variable, treating unset and empty as absent
fn optional_env(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.core.port, 8080);
        assert_eq!(config.realtime.model, "gpt-realtime");
        assert_eq!(config.realtime.voice, "coral");
        assert_eq!(config.memory.ttl_secs, 3600);
        assert_eq!(config.memory.sweep_interval_secs, 1800);
        assert_eq!(config.search.provider, "google");
    }

    #[test]
    fn test_default_config_validates() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_gets_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[core]\nport = 9191\n").expect("write config");

        let config = Config::load_from_path(&path).expect("load config");

        assert_eq!(config.core.port, 9191);
        // Everything else falls back to defaults
        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.realtime.turn_detection, "semantic_vad");
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[core]\nlog_level = \"loud\"\n").expect("write config");

        let result = Config::load_from_path(&path);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_invalid_search_provider_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[search]\nprovider = \"askjeeves\"\n").expect("write config");

        let result = Config::load_from_path(&path);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[memory]\nttl_secs = 0\n").expect("write config");

        let result = Config::load_from_path(&path);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_bind_addr() {
        let config = Config::default();
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_config_round_trip() {
        let config = Config::default();
        let serialized = toml::to_string_pretty(&config).expect("serialize");
        let parsed: Config = toml::from_str(&serialized).expect("parse");
        assert_eq!(parsed.realtime.base_url, config.realtime.base_url);
        assert_eq!(parsed.memory.ttl_secs, config.memory.ttl_secs);
    }

    #[test]
    fn test_optional_env_empty_is_absent() {
        std::env::set_var("SWITCHBOARD_TEST_EMPTY_VAR", "   ");
        assert!(optional_env("SWITCHBOARD_TEST_EMPTY_VAR").is_none());
        std::env::remove_var("SWITCHBOARD_TEST_EMPTY_VAR");

        assert!(optional_env("SWITCHBOARD_TEST_UNSET_VAR").is_none());
    }
}
