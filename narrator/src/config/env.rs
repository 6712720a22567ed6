use std::env;
use std::str::FromStr;

use super::{ConfigError, ConfigResult, NarratorConfig};
use crate::core::tts::AudioFormat;

/// Read a variable, treating empty values as unset.
fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

/// Read and parse a variable, reporting the variable name on failure.
fn parse_env<T: FromStr>(name: &'static str) -> ConfigResult<Option<T>> {
    match env_var(name) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { name, value }),
        None => Ok(None),
    }
}

/// Build a configuration from defaults overlaid with environment variables.
pub(crate) fn load_from_env() -> ConfigResult<NarratorConfig> {
    let mut config = NarratorConfig::default();

    if let Some(key) = env_var("ELEVENLABS_API_KEY") {
        config.api_key = Some(key);
    }
    if let Some(voice) = env_var("ELEVENLABS_VOICE_ID") {
        config.voice = voice;
    }
    if let Some(base_url) = env_var("ELEVENLABS_BASE_URL") {
        config.base_url = base_url;
    }
    if let Some(model) = env_var("NARRATOR_MODEL") {
        config.model = model;
    }
    if let Some(format) = parse_env::<AudioFormat>("NARRATOR_OUTPUT_FORMAT")? {
        config.output_format = format;
    }
    if let Some(timeout) = parse_env("NARRATOR_REQUEST_TIMEOUT_SECONDS")? {
        config.request_timeout_seconds = timeout;
    }
    if let Some(retries) = parse_env("NARRATOR_MAX_RETRIES")? {
        config.max_retries = retries;
    }
    if let Some(backoff) = parse_env("NARRATOR_BACKOFF_SECONDS")? {
        config.backoff_seconds = backoff;
    }
    if let Some(pacing) = parse_env("NARRATOR_PACING_SECONDS")? {
        config.pacing_seconds = Some(pacing);
    }
    if let Some(max_chars) = parse_env("NARRATOR_MAX_CHARS")? {
        config.max_chars = Some(max_chars);
    }

    Ok(config)
}
