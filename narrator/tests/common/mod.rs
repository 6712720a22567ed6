//! Shared helpers for the integration tests.
//!
//! [`ScriptedClient`] stands in for the provider: each call consumes the next
//! [`Step`] of its script and every request is recorded for later assertions.

// Not every test binary uses every helper
#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use narrator::{
    AudioFormat, SynthesisClient, SynthesisError, SynthesisOutput, SynthesisRequest,
    SynthesisResult, VoiceConfig, VoiceSettings,
};

/// What the scripted provider does on one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Succeed,
    Timeout,
    Quota,
    BadRequest,
}

/// A request as the provider saw it.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub text: String,
    pub model_id: String,
    pub previous_request_ids: Vec<String>,
}

pub struct ScriptedClient {
    script: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<RecordedCall>>,
    counter: AtomicUsize,
    cancel_on_call: Option<(usize, CancellationToken)>,
    wav_sample_rate: Option<u32>,
}

impl ScriptedClient {
    /// Client that plays `steps` in order, then succeeds on every later call.
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            script: Mutex::new(steps.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
            counter: AtomicUsize::new(0),
            cancel_on_call: None,
            wav_sample_rate: None,
        }
    }

    pub fn succeeding() -> Self {
        Self::new([])
    }

    /// Cancel `token` while serving call number `call` (0-based).
    pub fn cancel_on_call(mut self, call: usize, token: CancellationToken) -> Self {
        self.cancel_on_call = Some((call, token));
        self
    }

    /// Answer with a mono 16-bit WAV file instead of the raw chunk text.
    pub fn with_wav_audio(mut self, sample_rate: u32) -> Self {
        self.wav_sample_rate = Some(sample_rate);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.counter.load(Ordering::SeqCst)
    }

    fn audio_for(&self, text: &str) -> Bytes {
        match self.wav_sample_rate {
            Some(rate) => wav_bytes(rate, &vec![text.len() as i16; 4]),
            None => Bytes::copy_from_slice(text.as_bytes()),
        }
    }
}

#[async_trait]
impl SynthesisClient for ScriptedClient {
    async fn synthesize(&self, request: SynthesisRequest<'_>) -> SynthesisResult<SynthesisOutput> {
        let call = self.counter.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().push(RecordedCall {
            text: request.text.to_string(),
            model_id: request.voice.model_id.clone(),
            previous_request_ids: request.previous_request_ids.to_vec(),
        });

        if let Some((at, token)) = &self.cancel_on_call {
            if *at == call {
                token.cancel();
            }
        }

        let step = self.script.lock().pop_front().unwrap_or(Step::Succeed);
        match step {
            Step::Succeed => Ok(SynthesisOutput {
                audio: self.audio_for(request.text),
                request_id: Some(format!("req-{call}")),
                credits_used: Some(request.text.chars().count() as u64),
                history_item_id: Some(format!("hist-{call}")),
                latency_ms: Some(120),
            }),
            Step::Timeout => Err(SynthesisError::Timeout("request timed out".to_string())),
            Step::Quota => Err(SynthesisError::QuotaExceeded("quota_exceeded".to_string())),
            Step::BadRequest => Err(SynthesisError::InvalidRequest("text too long".to_string())),
        }
    }

    fn provider_name(&self) -> &'static str {
        "elevenlabs"
    }
}

/// Mono 16-bit WAV file holding `samples`.
pub fn wav_bytes(sample_rate: u32, samples: &[i16]) -> Bytes {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &sample in samples {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
    }
    Bytes::from(cursor.into_inner())
}

pub fn voice(model_id: &str, output_format: AudioFormat) -> VoiceConfig {
    VoiceConfig {
        model_id: model_id.to_string(),
        voice_id: "sDh3eviBhiuHKi0MjTNq".to_string(),
        settings: VoiceSettings::default(),
        output_format,
    }
}

pub fn flash_voice() -> VoiceConfig {
    voice("eleven_flash_v2_5", AudioFormat::Mp3_44100_128)
}

fn paragraph(len: usize, fill: char) -> String {
    std::iter::repeat_n(fill, len).collect()
}

/// 50,000 characters: 49 paragraphs of 1000 plus one of 902, blank-line separated.
pub fn fifty_thousand_char_script() -> String {
    let mut paragraphs: Vec<String> = (0..49)
        .map(|i| paragraph(1000, char::from(b'a' + (i % 26) as u8)))
        .collect();
    paragraphs.push(paragraph(902, 'z'));
    paragraphs.join("\n\n")
}

/// Script of `count` short paragraphs, each one chunk at `max_chars = 40`.
pub fn short_script(count: usize) -> String {
    (0..count)
        .map(|i| format!("Paragraph number {i:02} of the script."))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn read(path: &Path) -> Vec<u8> {
    std::fs::read(path).unwrap()
}
