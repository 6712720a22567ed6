//! Configuration for the narrator pipeline.
//!
//! Values come from several sources. Priority: CLI flags > YAML > ENV vars >
//! .env values > defaults. The `.env` file is loaded by `main.rs` before any
//! of this runs, so from here it is indistinguishable from the real
//! environment. CLI flags are applied by the binary on top of the loaded
//! [`NarratorConfig`].
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `pricing`: USD price per 1K characters for each model
//! - `budgets`: chunk sizes and per-request limits for each model
//!
//! # Example
//! ```rust,no_run
//! use narrator::config::NarratorConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = NarratorConfig::from_env()?;
//!
//! // Load from YAML file with environment variables as the base
//! let config = NarratorConfig::from_file(&PathBuf::from("narrator.yaml"))?;
//! println!("Synthesizing with {}", config.model);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub mod budgets;
mod env;
pub mod pricing;
mod yaml;

pub use budgets::{CharacterBudget, DEFAULT_BUDGET, get_character_budget};
pub use pricing::{DEFAULT_PRICE_PER_1K, PriceBook};
pub use yaml::YamlConfig;

use crate::core::tts::elevenlabs::{resolve_model_id, resolve_voice_id};
use crate::core::tts::{AudioFormat, VoiceConfig, VoiceSettings};

/// Default ElevenLabs API endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io";
/// Default request timeout. Long chunks can take minutes to render.
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 300;
/// Default number of retries after a timed-out attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default backoff step; retry `n` waits `n * backoff`
pub const DEFAULT_BACKOFF_SECONDS: u64 = 10;
/// Pacing between chunks for flash models
pub const FLASH_PACING_SECONDS: u64 = 2;
/// Pacing between chunks for every other model
pub const DEFAULT_PACING_SECONDS: u64 = 5;

/// Pause between chunks when none is configured. Flash models tolerate a
/// faster request rate.
pub fn default_pacing(model_id: &str) -> Duration {
    if model_id.contains("flash") {
        Duration::from_secs(FLASH_PACING_SECONDS)
    } else {
        Duration::from_secs(DEFAULT_PACING_SECONDS)
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid value for {name}: '{value}'")]
    InvalidEnv { name: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("ELEVENLABS_API_KEY is not set (environment, .env or providers.api_key in YAML)")]
    MissingApiKey,
}

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Narrator configuration
///
/// Holds everything needed to build a synthesis client and run a job:
/// provider credentials and endpoint, voice and model selection, retry
/// policy, pacing and optional overrides for chunk size and prices.
#[derive(Debug, Clone)]
pub struct NarratorConfig {
    // Provider settings
    /// Provider name (only "elevenlabs" is supported)
    pub provider: String,
    pub api_key: Option<String>,
    pub base_url: String,
    pub request_timeout_seconds: u64,

    // Voice settings
    /// Model alias ("flash", "turbo", "v3", ...) or a raw model id
    pub model: String,
    /// Voice alias ("rachel", "ana", ...) or a raw voice id
    pub voice: String,
    pub voice_settings: VoiceSettings,
    pub output_format: AudioFormat,
    /// Extra voice aliases, merged over the built-in ones
    pub voice_aliases: HashMap<String, String>,

    // Job settings
    pub max_retries: u32,
    pub backoff_seconds: u64,
    /// Pause after each successful chunk. `None` picks a model default.
    pub pacing_seconds: Option<u64>,
    /// Chunk size override. `None` uses the model's budget.
    pub max_chars: Option<usize>,
    /// USD per 1000 credits, keyed by model id
    pub price_overrides: HashMap<String, f64>,
}

impl Default for NarratorConfig {
    fn default() -> Self {
        Self {
            provider: "elevenlabs".to_string(),
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
            model: "flash".to_string(),
            voice: "rachel".to_string(),
            voice_settings: VoiceSettings::default(),
            output_format: AudioFormat::default(),
            voice_aliases: HashMap::new(),
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_seconds: DEFAULT_BACKOFF_SECONDS,
            pacing_seconds: None,
            max_chars: None,
            price_overrides: HashMap::new(),
        }
    }
}

impl Drop for NarratorConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.api_key {
            key.zeroize();
        }
    }
}

impl NarratorConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> ConfigResult<Self> {
        let config = env::load_from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file, using environment variables as the base.
    ///
    /// YAML values override environment values field by field; anything the
    /// file leaves out keeps its environment (or default) value.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Validation fails
    pub fn from_file(path: &PathBuf) -> ConfigResult<Self> {
        let yaml_config = YamlConfig::from_file(path)?;

        let mut config = env::load_from_env()?;
        yaml_config.apply_to(&mut config)?;
        config.validate()?;

        Ok(config)
    }

    /// Check value ranges and the shape of the endpoint URL.
    ///
    /// The API key is not checked here, since planning and reporting never
    /// reach the provider. Use [`NarratorConfig::require_api_key`] before
    /// synthesizing.
    pub fn validate(&self) -> ConfigResult<()> {
        if !self.provider.eq_ignore_ascii_case("elevenlabs") {
            return Err(ConfigError::Invalid(format!(
                "Unsupported provider: {}. Supported providers: elevenlabs",
                self.provider
            )));
        }

        self.voice_settings.validate().map_err(ConfigError::Invalid)?;

        let url = url::Url::parse(&self.base_url)
            .map_err(|e| ConfigError::Invalid(format!("base_url '{}': {e}", self.base_url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "base_url must use http or https, got '{}'",
                url.scheme()
            )));
        }

        if self.request_timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.max_chars == Some(0) {
            return Err(ConfigError::Invalid(
                "max_chars must be greater than 0".to_string(),
            ));
        }

        for (model, price) in &self.price_overrides {
            if !price.is_finite() || *price < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "price for {model} must be a non-negative number, got {price}"
                )));
            }
        }

        Ok(())
    }

    /// The API key, or [`ConfigError::MissingApiKey`] if none is configured.
    pub fn require_api_key(&self) -> ConfigResult<&str> {
        match self.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(ConfigError::MissingApiKey),
        }
    }

    /// Provider model id after alias resolution.
    pub fn model_id(&self) -> String {
        resolve_model_id(&self.model)
    }

    /// Voice, model and encoding for a new job.
    pub fn voice_config(&self) -> VoiceConfig {
        VoiceConfig {
            model_id: self.model_id(),
            voice_id: resolve_voice_id(&self.voice, &self.voice_aliases),
            settings: self.voice_settings,
            output_format: self.output_format,
        }
    }

    /// Chunk size for `model_id`, honoring the `max_chars` override.
    pub fn chunk_budget(&self, model_id: &str) -> CharacterBudget {
        let budget = get_character_budget(&self.provider, model_id);
        match self.max_chars {
            Some(chunk_chars) => CharacterBudget::new(chunk_chars, budget.request_limit),
            None => budget,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn price_book(&self) -> PriceBook {
        PriceBook::new(self.price_overrides.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::fs;
    use tempfile::TempDir;

    const ENV_VARS: &[&str] = &[
        "ELEVENLABS_API_KEY",
        "ELEVENLABS_VOICE_ID",
        "ELEVENLABS_BASE_URL",
        "NARRATOR_MODEL",
        "NARRATOR_OUTPUT_FORMAT",
        "NARRATOR_REQUEST_TIMEOUT_SECONDS",
        "NARRATOR_MAX_RETRIES",
        "NARRATOR_BACKOFF_SECONDS",
        "NARRATOR_PACING_SECONDS",
        "NARRATOR_MAX_CHARS",
    ];

    // Helper to clean up environment variables
    fn cleanup_env_vars() {
        unsafe {
            for name in ENV_VARS {
                env::remove_var(name);
            }
        }
    }

    #[test]
    fn test_defaults() {
        let config = NarratorConfig::default();
        assert_eq!(config.provider, "elevenlabs");
        assert_eq!(config.model, "flash");
        assert_eq!(config.voice, "rachel");
        assert_eq!(config.request_timeout_seconds, 300);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.backoff_seconds, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_require_api_key() {
        let mut config = NarratorConfig::default();
        assert!(matches!(
            config.require_api_key(),
            Err(ConfigError::MissingApiKey)
        ));

        config.api_key = Some("   ".to_string());
        assert!(config.require_api_key().is_err());

        config.api_key = Some("sk-test".to_string());
        assert_eq!(config.require_api_key().unwrap(), "sk-test");
    }

    #[test]
    fn test_validate_rejects_bad_base_url() {
        let mut config = NarratorConfig::default();
        config.base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        config.base_url = "ftp://api.elevenlabs.io".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("http or https"));
    }

    #[test]
    fn test_validate_rejects_out_of_range_voice_settings() {
        let mut config = NarratorConfig::default();
        config.voice_settings.similarity_boost = 1.2;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("similarity_boost"));
    }

    #[test]
    fn test_validate_rejects_zero_max_chars() {
        let mut config = NarratorConfig::default();
        config.max_chars = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_provider() {
        let mut config = NarratorConfig::default();
        config.provider = "acme".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Unsupported provider"));
    }

    #[test]
    fn test_voice_config_resolves_aliases() {
        let mut config = NarratorConfig::default();
        config.model = "turbo".to_string();
        config.voice = "ana".to_string();

        let voice = config.voice_config();
        assert_eq!(voice.model_id, "eleven_turbo_v2_5");
        assert_eq!(voice.voice_id, "m7yTemJqdIqrcNleANfX");
    }

    #[test]
    fn test_custom_voice_alias() {
        let mut config = NarratorConfig::default();
        config.voice = "narrator".to_string();
        config
            .voice_aliases
            .insert("narrator".to_string(), "custom-voice-id".to_string());

        assert_eq!(config.voice_config().voice_id, "custom-voice-id");
    }

    #[test]
    fn test_chunk_budget_override() {
        let mut config = NarratorConfig::default();
        assert_eq!(config.chunk_budget("eleven_flash_v2_5").chunk_chars, 18_000);

        config.max_chars = Some(5_000);
        let budget = config.chunk_budget("eleven_flash_v2_5");
        assert_eq!(budget.chunk_chars, 5_000);
        assert_eq!(budget.request_limit, 40_000);
    }

    #[test]
    fn test_pacing_defaults_by_model() {
        assert_eq!(default_pacing("eleven_flash_v2_5"), Duration::from_secs(2));
        assert_eq!(default_pacing("eleven_multilingual_v2"), Duration::from_secs(5));
        assert_eq!(default_pacing("eleven_v3"), Duration::from_secs(5));
    }

    #[test]
    #[serial]
    fn test_from_env() {
        cleanup_env_vars();
        unsafe {
            env::set_var("ELEVENLABS_API_KEY", "env-key");
            env::set_var("NARRATOR_MODEL", "multilingual");
            env::set_var("NARRATOR_OUTPUT_FORMAT", "pcm_24000");
            env::set_var("NARRATOR_MAX_RETRIES", "5");
            env::set_var("NARRATOR_PACING_SECONDS", "1");
        }

        let config = NarratorConfig::from_env().unwrap();
        assert_eq!(config.api_key.as_deref(), Some("env-key"));
        assert_eq!(config.model_id(), "eleven_multilingual_v2");
        assert_eq!(config.output_format, AudioFormat::Pcm24000);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.pacing_seconds, Some(1));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_unknown_output_format() {
        cleanup_env_vars();
        unsafe {
            env::set_var("NARRATOR_OUTPUT_FORMAT", "pcm_48000");
        }

        let err = NarratorConfig::from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv {
                name: "NARRATOR_OUTPUT_FORMAT",
                ..
            }
        ));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_number() {
        cleanup_env_vars();
        unsafe {
            env::set_var("NARRATOR_MAX_RETRIES", "many");
        }

        let err = NarratorConfig::from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv {
                name: "NARRATOR_MAX_RETRIES",
                ..
            }
        ));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_yaml_overrides_env() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("narrator.yaml");

        let yaml_content = r#"
providers:
  api_key: "yaml-key"

voice:
  model: "v3"
  stability: 0.3

job:
  max_chars: 2000
"#;
        fs::write(&config_path, yaml_content).unwrap();

        unsafe {
            env::set_var("ELEVENLABS_API_KEY", "env-key");
            env::set_var("NARRATOR_MODEL", "flash");
            env::set_var("NARRATOR_BACKOFF_SECONDS", "1");
        }

        let config = NarratorConfig::from_file(&config_path).unwrap();

        // YAML overrides ENV
        assert_eq!(config.api_key.as_deref(), Some("yaml-key"));
        assert_eq!(config.model_id(), "eleven_v3");
        assert!((config.voice_settings.stability - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.max_chars, Some(2000));
        // ENV value survives where YAML is silent
        assert_eq!(config.backoff_seconds, 1);
        // Default survives where both are silent
        assert!((config.voice_settings.similarity_boost - 0.8).abs() < f32::EPSILON);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_missing_file() {
        cleanup_env_vars();

        let config_path = PathBuf::from("/nonexistent/narrator.yaml");
        let result = NarratorConfig::from_file(&config_path);

        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );
    }

    #[test]
    #[serial]
    fn test_from_file_invalid_yaml() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("invalid.yaml");
        fs::write(&config_path, "invalid: yaml: [content").unwrap();

        let result = NarratorConfig::from_file(&config_path);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to parse YAML config")
        );
    }

    #[test]
    #[serial]
    fn test_from_file_validation_failure() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("narrator.yaml");
        fs::write(&config_path, "voice:\n  style: 2.0\n").unwrap();

        let err = NarratorConfig::from_file(&config_path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
