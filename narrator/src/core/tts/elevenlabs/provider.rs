//! ElevenLabs HTTP client.
//!
//! One POST per chunk against `/v1/text-to-speech/{voice_id}`. The response
//! body is the audio; billing and correlation data arrive in headers:
//!
//! | Header | Meaning |
//! |---|---|
//! | `request-id` | id to pass as `previous_request_ids` on later chunks |
//! | `character-cost` | credits charged for this request |
//! | `history-item-id` | entry in the account's generation history |
//! | `tts-latency-ms` | server-side render time |

use std::io::Cursor;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use reqwest::header::HeaderMap;
use serde::Serialize;
use tracing::{debug, error, info};

use super::config::{ElevenLabsConfig, supports_request_stitching};
use crate::core::tts::base::{
    SynthesisClient, SynthesisError, SynthesisOutput, SynthesisRequest, SynthesisResult,
    VoiceSettings,
};

const HEADER_REQUEST_ID: &str = "request-id";
const HEADER_CHARACTER_COST: &str = "character-cost";
const HEADER_HISTORY_ITEM_ID: &str = "history-item-id";
const HEADER_LATENCY_MS: &str = "tts-latency-ms";

/// Request body for the speech endpoint.
#[derive(Debug, Serialize)]
pub(crate) struct SpeechRequestBody<'a> {
    pub text: &'a str,
    pub model_id: &'a str,
    pub voice_settings: &'a VoiceSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_request_ids: Option<&'a [String]>,
}

impl<'a> SpeechRequestBody<'a> {
    pub(crate) fn from_request(request: &SynthesisRequest<'a>) -> Self {
        let previous_request_ids = request.bounded_previous_request_ids();
        let previous_request_ids = (!previous_request_ids.is_empty()
            && supports_request_stitching(&request.voice.model_id))
        .then_some(previous_request_ids);

        Self {
            text: request.text,
            model_id: &request.voice.model_id,
            voice_settings: &request.voice.settings,
            previous_request_ids,
        }
    }
}

/// Map a non-success status and its body to a [`SynthesisError`].
pub(crate) fn classify_status(status: u16, body: String) -> SynthesisError {
    match status {
        408 | 504 => SynthesisError::Timeout(format!("Provider timed out ({status}): {body}")),
        401 if body.contains("quota_exceeded") => SynthesisError::QuotaExceeded(body),
        401 | 403 => SynthesisError::Authentication(body),
        402 => SynthesisError::QuotaExceeded(body),
        400 | 404 | 422 => SynthesisError::InvalidRequest(format!("({status}) {body}")),
        429 => SynthesisError::RateLimited(body),
        _ => SynthesisError::Provider {
            status,
            message: body,
        },
    }
}

fn map_transport_error(e: reqwest::Error) -> SynthesisError {
    if e.is_timeout() {
        SynthesisError::Timeout(format!("Request timed out: {e}"))
    } else {
        SynthesisError::Network(format!("Request failed: {e}"))
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    header_str(headers, name).and_then(|v| v.parse::<u64>().ok())
}

/// Wrap headerless 16-bit little-endian mono PCM in a WAV container.
pub(crate) fn wrap_pcm_as_wav(pcm: &[u8], sample_rate: u32) -> SynthesisResult<Bytes> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut buffer = Cursor::new(Vec::with_capacity(pcm.len() + 44));
    {
        let mut writer = hound::WavWriter::new(&mut buffer, spec)
            .map_err(|e| SynthesisError::Io(format!("Failed to start WAV container: {e}")))?;
        for sample in pcm.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([sample[0], sample[1]]))
                .map_err(|e| SynthesisError::Io(format!("Failed to write WAV sample: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| SynthesisError::Io(format!("Failed to finalize WAV: {e}")))?;
    }

    Ok(Bytes::from(buffer.into_inner()))
}

/// ElevenLabs implementation of [`SynthesisClient`].
#[derive(Debug, Clone)]
pub struct ElevenLabsClient {
    client: Client,
    config: ElevenLabsConfig,
}

impl ElevenLabsClient {
    pub fn new(config: ElevenLabsConfig) -> SynthesisResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(SynthesisError::InvalidConfiguration(
                "ElevenLabs API key is required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                SynthesisError::InvalidConfiguration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl SynthesisClient for ElevenLabsClient {
    async fn synthesize(&self, request: SynthesisRequest<'_>) -> SynthesisResult<SynthesisOutput> {
        let voice = request.voice;
        let format = voice.output_format;

        let url = reqwest::Url::parse_with_params(
            &self.config.speech_url(&voice.voice_id),
            &[("output_format", format.as_str())],
        )
        .map_err(|e| SynthesisError::InvalidConfiguration(format!("Invalid URL: {e}")))?;

        let body = SpeechRequestBody::from_request(&request);

        debug!(
            model = %voice.model_id,
            voice = %voice.voice_id,
            characters = request.text.chars().count(),
            previous_requests = body.previous_request_ids.map_or(0, |ids| ids.len()),
            "Sending ElevenLabs TTS request"
        );

        let started = Instant::now();
        let response = self
            .client
            .post(url)
            .header("xi-api-key", &self.config.api_key)
            .header("Content-Type", "application/json")
            .header("Accept", format.accept_header())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "ElevenLabs TTS request failed");
                map_transport_error(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "ElevenLabs TTS API returned error");
            return Err(classify_status(status.as_u16(), body));
        }

        let headers = response.headers().clone();
        let request_id = header_str(&headers, HEADER_REQUEST_ID);
        let credits_used = header_u64(&headers, HEADER_CHARACTER_COST);
        let history_item_id = header_str(&headers, HEADER_HISTORY_ITEM_ID);
        let latency_ms = header_u64(&headers, HEADER_LATENCY_MS);

        let audio = response.bytes().await.map_err(|e| {
            error!(error = %e, "Failed to read ElevenLabs audio response");
            map_transport_error(e)
        })?;

        if audio.is_empty() {
            return Err(SynthesisError::Provider {
                status: status.as_u16(),
                message: "Empty audio response".to_string(),
            });
        }

        let audio = match format.sample_rate_if_pcm() {
            Some(sample_rate) => wrap_pcm_as_wav(&audio, sample_rate)?,
            None => audio,
        };

        info!(
            request_id = request_id.as_deref().unwrap_or("-"),
            credits = credits_used,
            latency_ms = latency_ms,
            audio_bytes = audio.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "ElevenLabs synthesis complete"
        );

        Ok(SynthesisOutput {
            audio,
            request_id,
            credits_used,
            history_item_id,
            latency_ms,
        })
    }

    fn provider_name(&self) -> &'static str {
        "elevenlabs"
    }
}
