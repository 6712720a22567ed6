//! ElevenLabs TTS provider.
//!
//! # Models
//!
//! - `eleven_flash_v2_5` (alias `flash`, default)
//! - `eleven_turbo_v2_5` (alias `turbo`)
//! - `eleven_multilingual_v2` (alias `multilingual`)
//! - `eleven_monolingual_v1` (alias `english`)
//! - `eleven_v3` (alias `v3`, no request stitching)
//!
//! # Example
//!
//! ```rust,ignore
//! use narrator::core::tts::elevenlabs::{ElevenLabsClient, ElevenLabsConfig};
//!
//! let client = ElevenLabsClient::new(ElevenLabsConfig::new("sk-..."))?;
//! ```

mod config;
mod provider;

pub use config::{
    DEFAULT_VOICE, ELEVENLABS_BASE_URL, ElevenLabsConfig, ElevenLabsModel, VOICE_ALIASES,
    resolve_model_id, resolve_voice_id, supports_request_stitching,
};
pub use provider::ElevenLabsClient;
