//! Provider-agnostic synthesis types.
//!
//! A [`SynthesisClient`] turns one chunk of text into audio bytes plus the
//! metadata the pipeline needs for billing and request linking. Clients are
//! plain values handed to the orchestrator; nothing here is global.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of prior request ids a provider accepts for continuity.
pub const MAX_PREVIOUS_REQUEST_IDS: usize = 3;

/// Errors returned by a single synthesis attempt.
///
/// Only [`SynthesisError::Timeout`] is transient. Everything else usually
/// means bad input, bad credentials or an exhausted quota, which another
/// attempt will not fix.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Provider error ({status}): {message}")]
    Provider { status: u16, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl SynthesisError {
    /// Whether the attempt may succeed if repeated after a backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Short machine-readable kind, stored on failed chunk records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Network(_) => "network",
            Self::Authentication(_) => "authentication",
            Self::QuotaExceeded(_) => "quota_exceeded",
            Self::RateLimited(_) => "rate_limited",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Provider { .. } => "provider",
            Self::InvalidConfiguration(_) => "invalid_configuration",
            Self::Io(_) => "io",
        }
    }
}

/// Result type for synthesis operations
pub type SynthesisResult<T> = Result<T, SynthesisError>;

// =============================================================================
// Voice configuration
// =============================================================================

/// Voice tuning parameters sent with every request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    /// Voice stability (0.0 to 1.0)
    pub stability: f32,
    /// Similarity boost (0.0 to 1.0)
    pub similarity_boost: f32,
    /// Style exaggeration (0.0 to 1.0)
    pub style: f32,
    /// Boost similarity to the original speaker
    pub use_speaker_boost: bool,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.8,
            style: 0.0,
            use_speaker_boost: true,
        }
    }
}

impl VoiceSettings {
    /// Check that every ratio lies in `[0, 1]`.
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("stability", self.stability),
            ("similarity_boost", self.similarity_boost),
            ("style", self.style),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{name} must be between 0.0 and 1.0, got {value}"));
            }
        }
        Ok(())
    }
}

/// Audio encoding requested from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AudioFormat {
    /// MP3, 44.1kHz, 128kbps (default)
    #[default]
    #[serde(rename = "mp3_44100_128")]
    Mp3_44100_128,
    /// MP3, 22.05kHz, 32kbps
    #[serde(rename = "mp3_22050_32")]
    Mp3_22050_32,
    /// Raw 16-bit mono PCM at 16kHz
    #[serde(rename = "pcm_16000")]
    Pcm16000,
    /// Raw 16-bit mono PCM at 22.05kHz
    #[serde(rename = "pcm_22050")]
    Pcm22050,
    /// Raw 16-bit mono PCM at 24kHz
    #[serde(rename = "pcm_24000")]
    Pcm24000,
    /// Raw 16-bit mono PCM at 44.1kHz
    #[serde(rename = "pcm_44100")]
    Pcm44100,
}

impl AudioFormat {
    /// Convert to the API parameter value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mp3_44100_128 => "mp3_44100_128",
            Self::Mp3_22050_32 => "mp3_22050_32",
            Self::Pcm16000 => "pcm_16000",
            Self::Pcm22050 => "pcm_22050",
            Self::Pcm24000 => "pcm_24000",
            Self::Pcm44100 => "pcm_44100",
        }
    }

    /// Whether the provider returns headerless PCM samples.
    #[inline]
    pub fn is_pcm(&self) -> bool {
        self.sample_rate_if_pcm().is_some()
    }

    /// Sample rate of PCM formats.
    pub fn sample_rate_if_pcm(&self) -> Option<u32> {
        match self {
            Self::Pcm16000 => Some(16_000),
            Self::Pcm22050 => Some(22_050),
            Self::Pcm24000 => Some(24_000),
            Self::Pcm44100 => Some(44_100),
            Self::Mp3_44100_128 | Self::Mp3_22050_32 => None,
        }
    }

    /// Extension of the files written for this format. PCM is stored as WAV.
    #[inline]
    pub fn file_extension(&self) -> &'static str {
        if self.is_pcm() { "wav" } else { "mp3" }
    }

    /// Value for the `Accept` header.
    #[inline]
    pub fn accept_header(&self) -> &'static str {
        if self.is_pcm() {
            "audio/pcm"
        } else {
            "audio/mpeg"
        }
    }
}

impl std::str::FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mp3" | "mp3_44100_128" => Ok(Self::Mp3_44100_128),
            "mp3_22050_32" => Ok(Self::Mp3_22050_32),
            "pcm_16000" => Ok(Self::Pcm16000),
            "pcm_22050" => Ok(Self::Pcm22050),
            "pcm" | "wav" | "linear16" | "pcm_24000" => Ok(Self::Pcm24000),
            "pcm_44100" => Ok(Self::Pcm44100),
            other => Err(format!(
                "unknown output format '{other}' (expected mp3_44100_128, mp3_22050_32, \
                 pcm_16000, pcm_22050, pcm_24000 or pcm_44100)"
            )),
        }
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Voice, model and encoding used for every chunk of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceConfig {
    /// Provider model id (e.g. "eleven_flash_v2_5")
    pub model_id: String,
    /// Provider voice id
    pub voice_id: String,
    /// Voice tuning
    pub settings: VoiceSettings,
    /// Requested audio encoding
    #[serde(default)]
    pub output_format: AudioFormat,
}

// =============================================================================
// Requests and responses
// =============================================================================

/// One synthesis request.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisRequest<'a> {
    /// Chunk text
    pub text: &'a str,
    /// Voice configuration
    pub voice: &'a VoiceConfig,
    /// Request ids of the preceding chunks, oldest first
    pub previous_request_ids: &'a [String],
}

impl<'a> SynthesisRequest<'a> {
    pub fn new(text: &'a str, voice: &'a VoiceConfig) -> Self {
        Self {
            text,
            voice,
            previous_request_ids: &[],
        }
    }

    pub fn with_previous_request_ids(mut self, ids: &'a [String]) -> Self {
        self.previous_request_ids = ids;
        self
    }

    /// The most recent prior ids, bounded by [`MAX_PREVIOUS_REQUEST_IDS`].
    pub fn bounded_previous_request_ids(&self) -> &'a [String] {
        let ids = self.previous_request_ids;
        &ids[ids.len().saturating_sub(MAX_PREVIOUS_REQUEST_IDS)..]
    }
}

/// Audio and metadata returned by a successful attempt.
#[derive(Debug, Clone, Default)]
pub struct SynthesisOutput {
    /// Encoded audio, ready to be written to the chunk file
    pub audio: Bytes,
    /// Provider correlation id
    pub request_id: Option<String>,
    /// Credits actually charged, when the provider reports them
    pub credits_used: Option<u64>,
    /// Provider history entry, useful for support requests
    pub history_item_id: Option<String>,
    /// Server-side synthesis latency
    pub latency_ms: Option<u64>,
}

/// External TTS capability.
#[async_trait]
pub trait SynthesisClient: Send + Sync {
    /// Synthesize one chunk.
    async fn synthesize(&self, request: SynthesisRequest<'_>) -> SynthesisResult<SynthesisOutput>;

    /// Provider name, used to look up pricing and character budgets.
    fn provider_name(&self) -> &'static str;
}
