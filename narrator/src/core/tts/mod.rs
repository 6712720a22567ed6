mod base;
pub mod elevenlabs;

pub use base::{
    AudioFormat, MAX_PREVIOUS_REQUEST_IDS, SynthesisClient, SynthesisError, SynthesisOutput,
    SynthesisRequest, SynthesisResult, VoiceConfig, VoiceSettings,
};
pub use elevenlabs::{ElevenLabsClient, ElevenLabsConfig, ElevenLabsModel};

use std::sync::Arc;

use crate::config::NarratorConfig;

/// Factory function to create a synthesis client from configuration.
///
/// # Supported Providers
///
/// - `"elevenlabs"` - ElevenLabs TTS API
///
/// # Example
///
/// ```rust,ignore
/// use narrator::config::NarratorConfig;
/// use narrator::core::tts::create_synthesis_client;
///
/// let config = NarratorConfig::from_env()?;
/// let client = create_synthesis_client(&config)?;
/// ```
pub fn create_synthesis_client(config: &NarratorConfig) -> SynthesisResult<Arc<dyn SynthesisClient>> {
    match config.provider.to_lowercase().as_str() {
        "elevenlabs" | "eleven-labs" | "eleven_labs" => {
            let api_key = config
                .require_api_key()
                .map_err(|e| SynthesisError::InvalidConfiguration(e.to_string()))?;
            let client_config = ElevenLabsConfig::new(api_key)
                .with_base_url(config.base_url.clone())
                .with_request_timeout(config.request_timeout());
            Ok(Arc::new(ElevenLabsClient::new(client_config)?))
        }
        _ => Err(SynthesisError::InvalidConfiguration(format!(
            "Unsupported TTS provider: {}. Supported providers: elevenlabs",
            config.provider
        ))),
    }
}
