use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

use super::{ConfigError, ConfigResult, NarratorConfig};
use crate::core::tts::AudioFormat;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present in
/// the file override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// providers:
///   name: "elevenlabs"
///   api_key: "your-elevenlabs-key"
///   base_url: "https://api.elevenlabs.io"
///   request_timeout_seconds: 300
///
/// voice:
///   name: "rachel"
///   model: "flash"
///   output_format: "mp3_44100_128"
///   stability: 0.5
///   similarity_boost: 0.8
///   style: 0.0
///   use_speaker_boost: true
///   aliases:
///     narrator: "sDh3eviBhiuHKi0MjTNq"
///
/// job:
///   max_retries: 3
///   backoff_seconds: 10
///   pacing_seconds: 2
///   max_chars: 18000
///
/// pricing:
///   eleven_flash_v2_5: 0.08
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub providers: Option<ProvidersYaml>,
    pub voice: Option<VoiceYaml>,
    pub job: Option<JobYaml>,
    /// USD per 1000 credits, keyed by model id
    pub pricing: HashMap<String, f64>,
}

/// Provider configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersYaml {
    pub name: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub request_timeout_seconds: Option<u64>,
}

/// Voice configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct VoiceYaml {
    /// Voice alias or raw voice id
    pub name: Option<String>,
    /// Model alias or raw model id
    pub model: Option<String>,
    pub output_format: Option<String>,
    pub stability: Option<f32>,
    pub similarity_boost: Option<f32>,
    pub style: Option<f32>,
    pub use_speaker_boost: Option<bool>,
    pub aliases: HashMap<String, String>,
}

/// Job execution settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct JobYaml {
    pub max_retries: Option<u32>,
    pub backoff_seconds: Option<u64>,
    pub pacing_seconds: Option<u64>,
    pub max_chars: Option<usize>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the YAML is malformed.
    pub fn from_file(path: &PathBuf) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let config: YamlConfig = serde_yaml::from_str(&contents)?;

        Ok(config)
    }

    /// Overlay every value present in the file onto `config`.
    ///
    /// Fails on values that cannot be interpreted, such as an unknown
    /// output format.
    pub fn apply_to(self, config: &mut NarratorConfig) -> ConfigResult<()> {
        if let Some(providers) = self.providers {
            if let Some(name) = providers.name {
                config.provider = name;
            }
            if let Some(key) = providers.api_key {
                config.api_key = Some(key);
            }
            if let Some(base_url) = providers.base_url {
                config.base_url = base_url;
            }
            if let Some(timeout) = providers.request_timeout_seconds {
                config.request_timeout_seconds = timeout;
            }
        }

        if let Some(voice) = self.voice {
            if let Some(name) = voice.name {
                config.voice = name;
            }
            if let Some(model) = voice.model {
                config.model = model;
            }
            if let Some(format) = voice.output_format {
                config.output_format = format
                    .parse::<AudioFormat>()
                    .map_err(|e| ConfigError::Invalid(format!("voice.output_format: {e}")))?;
            }
            if let Some(stability) = voice.stability {
                config.voice_settings.stability = stability;
            }
            if let Some(similarity_boost) = voice.similarity_boost {
                config.voice_settings.similarity_boost = similarity_boost;
            }
            if let Some(style) = voice.style {
                config.voice_settings.style = style;
            }
            if let Some(boost) = voice.use_speaker_boost {
                config.voice_settings.use_speaker_boost = boost;
            }
            config.voice_aliases.extend(voice.aliases);
        }

        if let Some(job) = self.job {
            if let Some(retries) = job.max_retries {
                config.max_retries = retries;
            }
            if let Some(backoff) = job.backoff_seconds {
                config.backoff_seconds = backoff;
            }
            if let Some(pacing) = job.pacing_seconds {
                config.pacing_seconds = Some(pacing);
            }
            if let Some(max_chars) = job.max_chars {
                config.max_chars = Some(max_chars);
            }
        }

        config.price_overrides.extend(self.pricing);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_config_full() {
        let yaml = r#"
providers:
  name: "elevenlabs"
  api_key: "el-key"
  base_url: "http://localhost:9000"
  request_timeout_seconds: 60

voice:
  name: "hectorip"
  model: "turbo"
  output_format: "pcm_22050"
  stability: 0.4
  similarity_boost: 0.9
  style: 0.1
  use_speaker_boost: false
  aliases:
    host: "host-voice-id"

job:
  max_retries: 2
  backoff_seconds: 1
  pacing_seconds: 0
  max_chars: 4000

pricing:
  eleven_turbo_v2_5: 0.1
"#;

        let yaml_config: YamlConfig = serde_yaml::from_str(yaml).unwrap();
        let mut config = NarratorConfig::default();
        yaml_config.apply_to(&mut config).unwrap();

        assert_eq!(config.api_key.as_deref(), Some("el-key"));
        assert_eq!(config.base_url, "http://localhost:9000");
        assert_eq!(config.request_timeout_seconds, 60);
        assert_eq!(config.voice, "hectorip");
        assert_eq!(config.model, "turbo");
        assert_eq!(config.output_format, AudioFormat::Pcm22050);
        assert!(!config.voice_settings.use_speaker_boost);
        assert_eq!(
            config.voice_aliases.get("host").map(String::as_str),
            Some("host-voice-id")
        );
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.backoff_seconds, 1);
        assert_eq!(config.pacing_seconds, Some(0));
        assert_eq!(config.max_chars, Some(4000));
        assert_eq!(config.price_overrides.get("eleven_turbo_v2_5"), Some(&0.1));
    }

    #[test]
    fn test_yaml_config_empty() {
        let yaml_config: YamlConfig = serde_yaml::from_str("{}").unwrap();
        assert!(yaml_config.providers.is_none());
        assert!(yaml_config.pricing.is_empty());

        let mut config = NarratorConfig::default();
        yaml_config.apply_to(&mut config).unwrap();
        assert_eq!(config.model, "flash");
    }

    #[test]
    fn test_yaml_partial_section_keeps_other_fields() {
        let yaml_config: YamlConfig = serde_yaml::from_str("voice:\n  style: 0.25\n").unwrap();
        let mut config = NarratorConfig::default();
        config.voice = "ana".to_string();
        yaml_config.apply_to(&mut config).unwrap();

        assert_eq!(config.voice, "ana");
        assert!((config.voice_settings.style - 0.25).abs() < f32::EPSILON);
        assert!((config.voice_settings.stability - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_unknown_output_format_is_rejected() {
        let yaml_config: YamlConfig =
            serde_yaml::from_str("voice:\n  output_format: pcm_48000\n").unwrap();
        let mut config = NarratorConfig::default();

        let err = yaml_config.apply_to(&mut config).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("pcm_48000"));
        assert_eq!(config.output_format, AudioFormat::Mp3_44100_128);
    }

    #[test]
    fn test_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("narrator.yaml");
        fs::write(&path, "job:\n  max_retries: 7\n").unwrap();

        let config = YamlConfig::from_file(&path).unwrap();
        assert_eq!(config.job.unwrap().max_retries, Some(7));
    }

    #[test]
    fn test_from_file_wrong_type() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("narrator.yaml");
        fs::write(&path, "job:\n  max_retries: \"lots\"\n").unwrap();

        assert!(matches!(
            YamlConfig::from_file(&path),
            Err(ConfigError::Parse(_))
        ));
    }
}
