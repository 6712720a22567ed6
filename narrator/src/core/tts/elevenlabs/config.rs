//! Configuration types for the ElevenLabs text-to-speech API.
//!
//! - Model selection and the short aliases accepted on the command line
//! - Built-in voice aliases
//! - Client settings (credentials, endpoint, timeout)

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default API endpoint
pub const ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io";

// =============================================================================
// Models
// =============================================================================

/// ElevenLabs TTS models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ElevenLabsModel {
    /// Lowest latency and price, 40K character limit
    #[default]
    #[serde(rename = "eleven_flash_v2_5")]
    FlashV2_5,
    #[serde(rename = "eleven_flash_v2")]
    FlashV2,
    #[serde(rename = "eleven_turbo_v2_5")]
    TurboV2_5,
    #[serde(rename = "eleven_turbo_v2")]
    TurboV2,
    /// Highest quality multilingual model
    #[serde(rename = "eleven_multilingual_v2")]
    MultilingualV2,
    #[serde(rename = "eleven_multilingual_v1")]
    MultilingualV1,
    /// Legacy English-only model
    #[serde(rename = "eleven_monolingual_v1")]
    MonolingualV1,
    /// Expressive model; does not accept previous request ids
    #[serde(rename = "eleven_v3")]
    V3,
}

impl ElevenLabsModel {
    /// Convert to the API parameter value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FlashV2_5 => "eleven_flash_v2_5",
            Self::FlashV2 => "eleven_flash_v2",
            Self::TurboV2_5 => "eleven_turbo_v2_5",
            Self::TurboV2 => "eleven_turbo_v2",
            Self::MultilingualV2 => "eleven_multilingual_v2",
            Self::MultilingualV1 => "eleven_multilingual_v1",
            Self::MonolingualV1 => "eleven_monolingual_v1",
            Self::V3 => "eleven_v3",
        }
    }

    /// Parse a model id or one of the short aliases.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "flash" | "eleven_flash_v2_5" => Some(Self::FlashV2_5),
            "eleven_flash_v2" => Some(Self::FlashV2),
            "turbo" | "eleven_turbo_v2_5" => Some(Self::TurboV2_5),
            "eleven_turbo_v2" => Some(Self::TurboV2),
            "multilingual" | "eleven_multilingual_v2" => Some(Self::MultilingualV2),
            "eleven_multilingual_v1" => Some(Self::MultilingualV1),
            "english" | "monolingual" | "eleven_monolingual_v1" => Some(Self::MonolingualV1),
            "v3" | "eleven_v3" => Some(Self::V3),
            _ => None,
        }
    }

    /// Whether requests may carry `previous_request_ids`.
    #[inline]
    pub fn supports_request_stitching(&self) -> bool {
        !matches!(self, Self::V3)
    }
}

impl std::fmt::Display for ElevenLabsModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Resolve a model alias to a model id. Unknown names pass through unchanged.
pub fn resolve_model_id(name: &str) -> String {
    match ElevenLabsModel::parse(name) {
        Some(model) => model.as_str().to_string(),
        None => name.trim().to_string(),
    }
}

/// Whether `model_id` accepts previous request ids. Unknown models are assumed to.
pub fn supports_request_stitching(model_id: &str) -> bool {
    ElevenLabsModel::parse(model_id).is_none_or(|m| m.supports_request_stitching())
}

// =============================================================================
// Voices
// =============================================================================

/// Voice used when nothing else is configured.
pub const DEFAULT_VOICE: &str = "rachel";

/// Built-in voice aliases.
pub const VOICE_ALIASES: &[(&str, &str)] = &[
    ("rachel", "sDh3eviBhiuHKi0MjTNq"),
    ("ana", "m7yTemJqdIqrcNleANfX"),
    ("hectorip", "aCSsHgeLIBCZsdlBEwpH"),
];

/// Resolve a voice alias to a voice id.
///
/// `extra` aliases win over the built-in ones. Names that match no alias
/// are taken to be raw voice ids.
pub fn resolve_voice_id(name: &str, extra: &HashMap<String, String>) -> String {
    let key = name.trim().to_lowercase();

    if let Some(id) = extra.get(name).or_else(|| extra.get(&key)) {
        return id.clone();
    }

    VOICE_ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map(|(_, id)| (*id).to_string())
        .unwrap_or_else(|| name.trim().to_string())
}

// =============================================================================
// Client settings
// =============================================================================

/// Settings for [`super::ElevenLabsClient`].
#[derive(Debug, Clone)]
pub struct ElevenLabsConfig {
    pub api_key: String,
    pub base_url: String,
    pub request_timeout: Duration,
}

impl ElevenLabsConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: ELEVENLABS_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(300),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Full speech endpoint for `voice_id`.
    pub fn speech_url(&self, voice_id: &str) -> String {
        format!(
            "{}/v1/text-to-speech/{}",
            self.base_url.trim_end_matches('/'),
            voice_id
        )
    }
}

impl Drop for ElevenLabsConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.api_key.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_aliases() {
        assert_eq!(resolve_model_id("flash"), "eleven_flash_v2_5");
        assert_eq!(resolve_model_id("turbo"), "eleven_turbo_v2_5");
        assert_eq!(resolve_model_id("v3"), "eleven_v3");
        assert_eq!(resolve_model_id("multilingual"), "eleven_multilingual_v2");
        assert_eq!(resolve_model_id("english"), "eleven_monolingual_v1");
        assert_eq!(resolve_model_id("FLASH"), "eleven_flash_v2_5");
    }

    #[test]
    fn test_unknown_model_passes_through() {
        assert_eq!(resolve_model_id("eleven_future_v9"), "eleven_future_v9");
    }

    #[test]
    fn test_request_stitching_support() {
        assert!(supports_request_stitching("eleven_flash_v2_5"));
        assert!(supports_request_stitching("eleven_multilingual_v2"));
        assert!(!supports_request_stitching("eleven_v3"));
        assert!(supports_request_stitching("eleven_future_v9"));
    }

    #[test]
    fn test_model_serde_matches_as_str() {
        let json = serde_json::to_string(&ElevenLabsModel::TurboV2).unwrap();
        assert_eq!(json, format!("\"{}\"", ElevenLabsModel::TurboV2.as_str()));
    }

    #[test]
    fn test_voice_aliases() {
        let extra = HashMap::new();
        assert_eq!(resolve_voice_id("rachel", &extra), "sDh3eviBhiuHKi0MjTNq");
        assert_eq!(resolve_voice_id("Ana", &extra), "m7yTemJqdIqrcNleANfX");
        assert_eq!(resolve_voice_id("hectorip", &extra), "aCSsHgeLIBCZsdlBEwpH");
    }

    #[test]
    fn test_raw_voice_id_passes_through() {
        let extra = HashMap::new();
        assert_eq!(resolve_voice_id("AbC123xyz", &extra), "AbC123xyz");
    }

    #[test]
    fn test_extra_aliases_override_builtin() {
        let mut extra = HashMap::new();
        extra.insert("rachel".to_string(), "my-rachel".to_string());
        assert_eq!(resolve_voice_id("rachel", &extra), "my-rachel");
    }

    #[test]
    fn test_speech_url() {
        let config = ElevenLabsConfig::new("key").with_base_url("http://localhost:8080/");
        assert_eq!(
            config.speech_url("voice123"),
            "http://localhost:8080/v1/text-to-speech/voice123"
        );
    }
}
