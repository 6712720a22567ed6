//! Durable job state.
//!
//! A [`SynthesisJob`] is the single source of truth for a synthesis run: it
//! records which chunks exist, which have been paid for, and where their
//! audio lives. It is persisted after every chunk transition, so a crash
//! loses at most the request that was in flight.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use xxhash_rust::xxh3::xxh3_64;

use crate::core::tts::{AudioFormat, SynthesisOutput, VoiceConfig, VoiceSettings};

mod store;

pub use store::{FilesystemJobStore, JobStore, MemoryJobStore, StoreError, StoreResult, write_atomic};

/// Number of leading characters of the script that feed the job id.
pub const FINGERPRINT_PREFIX_CHARS: usize = 100;

/// Derive the job id for a script and output path.
///
/// The same script written to the same path always resolves to the same job,
/// which is what makes a plain re-run resume instead of starting over.
pub fn job_fingerprint(text: &str, output_path: &Path) -> String {
    let mut key: String = text.chars().take(FINGERPRINT_PREFIX_CHARS).collect();
    key.push_str(&output_path.to_string_lossy());
    format!("{:016x}", xxh3_64(key.as_bytes()))
}

/// State directory for an output file: `.{stem}_state` next to it.
pub fn state_dir_for(output_path: &Path) -> PathBuf {
    let stem = output_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let parent = output_path.parent().unwrap_or_else(|| Path::new(""));
    parent.join(format!(".{stem}_state"))
}

/// Zero-padded chunk id, stable across resumes.
pub fn chunk_id(index: usize) -> String {
    format!("chunk_{index:03}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Created,
    Running,
    Completed,
    FailedChunks,
    FailedStitching,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::FailedChunks => "failed_chunks",
            Self::FailedStitching => "failed_stitching",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ChunkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ChunkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One chunk of a job. The chunk text itself is never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    pub index: usize,
    pub character_count: usize,
    pub status: ChunkStatus,
    pub audio_path: Option<PathBuf>,
    pub provider_request_id: Option<String>,
    pub cost_usd: Option<f64>,
    pub credits_used: Option<u64>,
    /// Credits expected from the character count alone
    pub estimated_credits: u64,
    /// Retries used by the latest processing pass
    pub retry_count: u32,
    /// Attempts across every run
    pub attempts: u32,
    pub history_item_id: Option<String>,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
}

impl ChunkRecord {
    pub fn new(index: usize, character_count: usize) -> Self {
        Self {
            id: chunk_id(index),
            index,
            character_count,
            status: ChunkStatus::Pending,
            audio_path: None,
            provider_request_id: None,
            cost_usd: None,
            credits_used: None,
            estimated_credits: character_count as u64,
            retry_count: 0,
            attempts: 0,
            history_item_id: None,
            latency_ms: None,
            error: None,
        }
    }

    #[inline]
    pub fn is_completed(&self) -> bool {
        self.status == ChunkStatus::Completed
    }
}

/// Persisted state of one synthesis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisJob {
    pub job_id: String,
    pub status: JobStatus,
    pub output_path: PathBuf,

    // Captured at creation, never changed afterwards
    pub provider: String,
    pub model: String,
    pub voice_id: String,
    pub voice_settings: VoiceSettings,
    pub output_format: AudioFormat,
    pub max_chars: usize,

    pub total_characters: usize,
    pub total_chunks: usize,
    pub chunks: Vec<ChunkRecord>,

    pub aggregate_cost_usd: f64,
    pub aggregate_credits_used: u64,
    /// Request ids of completed chunks, in index order
    #[serde(default)]
    pub request_ids: Vec<String>,

    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub last_error: Option<String>,
}

/// Provider result for a chunk, ready to be folded into the job.
#[derive(Debug, Clone)]
pub struct ChunkCompletion {
    pub audio_path: PathBuf,
    pub credits_used: u64,
    pub cost_usd: f64,
    pub request_id: Option<String>,
    pub history_item_id: Option<String>,
    pub latency_ms: Option<u64>,
}

impl ChunkCompletion {
    /// Build from provider output. Missing credit data falls back to the
    /// character count, which is what the provider bills by default.
    pub fn from_output(
        output: &SynthesisOutput,
        audio_path: PathBuf,
        character_count: usize,
        price_per_1k: f64,
    ) -> Self {
        let credits_used = output.credits_used.unwrap_or(character_count as u64);
        Self {
            audio_path,
            credits_used,
            cost_usd: credits_used as f64 / 1000.0 * price_per_1k,
            request_id: output.request_id.clone(),
            history_item_id: output.history_item_id.clone(),
            latency_ms: output.latency_ms,
        }
    }
}

impl SynthesisJob {
    /// Fresh job with one pending record per chunk size.
    pub fn new(
        job_id: impl Into<String>,
        output_path: impl Into<PathBuf>,
        provider: impl Into<String>,
        voice: &VoiceConfig,
        max_chars: usize,
        chunk_sizes: &[usize],
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        let chunks: Vec<ChunkRecord> = chunk_sizes
            .iter()
            .enumerate()
            .map(|(index, &size)| ChunkRecord::new(index, size))
            .collect();

        Self {
            job_id: job_id.into(),
            status: JobStatus::Created,
            output_path: output_path.into(),
            provider: provider.into(),
            model: voice.model_id.clone(),
            voice_id: voice.voice_id.clone(),
            voice_settings: voice.settings,
            output_format: voice.output_format,
            max_chars,
            total_characters: chunk_sizes.iter().sum(),
            total_chunks: chunks.len(),
            chunks,
            aggregate_cost_usd: 0.0,
            aggregate_credits_used: 0,
            request_ids: Vec::new(),
            started_at: now,
            updated_at: now,
            completed_at: None,
            last_error: None,
        }
    }

    /// Voice configuration the job was created with.
    pub fn voice_config(&self) -> VoiceConfig {
        VoiceConfig {
            model_id: self.model.clone(),
            voice_id: self.voice_id.clone(),
            settings: self.voice_settings,
            output_format: self.output_format,
        }
    }

    /// Whether a fresh split matches the persisted records.
    pub fn matches_plan(&self, chunk_sizes: &[usize]) -> bool {
        self.chunks.len() == chunk_sizes.len()
            && self
                .chunks
                .iter()
                .zip(chunk_sizes)
                .all(|(record, &size)| record.character_count == size)
    }

    pub fn touch(&mut self) {
        self.updated_at = OffsetDateTime::now_utc();
    }

    pub fn mark_processing(&mut self, index: usize) {
        let chunk = &mut self.chunks[index];
        chunk.status = ChunkStatus::Processing;
        chunk.retry_count = 0;
        chunk.error = None;
    }

    /// Count one attempt on chunk `index`.
    pub fn record_attempt(&mut self, index: usize, attempt: u32) {
        let chunk = &mut self.chunks[index];
        chunk.attempts += 1;
        chunk.retry_count = attempt.saturating_sub(1);
    }

    /// Mark chunk `index` completed and add its charge to the aggregates.
    pub fn complete_chunk(&mut self, index: usize, completion: ChunkCompletion) {
        let chunk = &mut self.chunks[index];
        if chunk.is_completed() {
            return;
        }

        chunk.status = ChunkStatus::Completed;
        chunk.audio_path = Some(completion.audio_path);
        chunk.credits_used = Some(completion.credits_used);
        chunk.cost_usd = Some(completion.cost_usd);
        chunk.provider_request_id = completion.request_id;
        chunk.history_item_id = completion.history_item_id;
        chunk.latency_ms = completion.latency_ms;
        chunk.error = None;

        self.aggregate_credits_used += completion.credits_used;
        self.aggregate_cost_usd += completion.cost_usd;
        self.refresh_request_ids();
    }

    pub fn fail_chunk(&mut self, index: usize, error: impl Into<String>) {
        let chunk = &mut self.chunks[index];
        chunk.status = ChunkStatus::Failed;
        chunk.error = Some(error.into());
    }

    fn refresh_request_ids(&mut self) {
        self.request_ids = self
            .chunks
            .iter()
            .filter(|c| c.is_completed())
            .filter_map(|c| c.provider_request_id.clone())
            .collect();
    }

    /// Request ids of completed chunks that precede `index`, oldest first.
    pub fn request_ids_before(&self, index: usize) -> Vec<String> {
        self.chunks[..index.min(self.chunks.len())]
            .iter()
            .filter(|c| c.is_completed())
            .filter_map(|c| c.provider_request_id.clone())
            .collect()
    }

    pub fn completed_count(&self) -> usize {
        self.chunks.iter().filter(|c| c.is_completed()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.chunks
            .iter()
            .filter(|c| c.status == ChunkStatus::Failed)
            .count()
    }

    /// Chunks that still need a provider call.
    pub fn remaining_count(&self) -> usize {
        self.chunks.len() - self.completed_count()
    }

    pub fn all_completed(&self) -> bool {
        !self.chunks.is_empty() && self.chunks.iter().all(|c| c.is_completed())
    }

    /// Audio paths of completed chunks in playback order.
    pub fn completed_audio_paths(&self) -> Vec<PathBuf> {
        self.chunks
            .iter()
            .filter(|c| c.is_completed())
            .filter_map(|c| c.audio_path.clone())
            .collect()
    }

    /// Sum of credits over completed chunks.
    pub fn completed_credits(&self) -> u64 {
        self.chunks
            .iter()
            .filter(|c| c.is_completed())
            .filter_map(|c| c.credits_used)
            .sum()
    }

    /// Whether the aggregate credit total equals the per-chunk sum.
    pub fn credits_consistent(&self) -> bool {
        self.completed_credits() == self.aggregate_credits_used
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn voice() -> VoiceConfig {
        VoiceConfig {
            model_id: "eleven_flash_v2_5".to_string(),
            voice_id: "voice".to_string(),
            settings: VoiceSettings::default(),
            output_format: AudioFormat::default(),
        }
    }

    fn job(sizes: &[usize]) -> SynthesisJob {
        SynthesisJob::new("job", "/tmp/out.mp3", "elevenlabs", &voice(), 18_000, sizes)
    }

    fn completion(credits: u64, request_id: &str) -> ChunkCompletion {
        ChunkCompletion {
            audio_path: PathBuf::from("/tmp/chunk.mp3"),
            credits_used: credits,
            cost_usd: credits as f64 / 1000.0 * 0.08,
            request_id: Some(request_id.to_string()),
            history_item_id: None,
            latency_ms: None,
        }
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = job_fingerprint("Hello world", Path::new("out/a.mp3"));
        let b = job_fingerprint("Hello world", Path::new("out/a.mp3"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_depends_on_path_and_prefix() {
        let base = job_fingerprint("Hello world", Path::new("a.mp3"));
        assert_ne!(base, job_fingerprint("Hello world", Path::new("b.mp3")));
        assert_ne!(base, job_fingerprint("Goodbye world", Path::new("a.mp3")));
    }

    #[test]
    fn test_fingerprint_ignores_text_after_prefix() {
        let prefix: String = std::iter::repeat_n('x', FINGERPRINT_PREFIX_CHARS).collect();
        let a = job_fingerprint(&format!("{prefix} ending one"), Path::new("a.mp3"));
        let b = job_fingerprint(&format!("{prefix} ending two"), Path::new("a.mp3"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_state_dir_for() {
        assert_eq!(
            state_dir_for(Path::new("/data/podcast.mp3")),
            PathBuf::from("/data/.podcast_state")
        );
        assert_eq!(
            state_dir_for(Path::new("episode.wav")),
            PathBuf::from(".episode_state")
        );
    }

    #[test]
    fn test_chunk_ids_are_zero_padded() {
        assert_eq!(chunk_id(0), "chunk_000");
        assert_eq!(chunk_id(42), "chunk_042");
        assert_eq!(chunk_id(1234), "chunk_1234");
    }

    #[test]
    fn test_new_job() {
        let job = job(&[100, 200, 50]);
        assert_eq!(job.status, JobStatus::Created);
        assert_eq!(job.total_chunks, 3);
        assert_eq!(job.total_characters, 350);
        assert_eq!(job.chunks[1].id, "chunk_001");
        assert_eq!(job.chunks[1].estimated_credits, 200);
        assert!(job.chunks.iter().all(|c| c.status == ChunkStatus::Pending));
        assert!(job.credits_consistent());
    }

    #[test]
    fn test_complete_chunk_updates_aggregates() {
        let mut job = job(&[100, 200]);
        job.mark_processing(0);
        job.record_attempt(0, 1);
        job.complete_chunk(0, completion(90, "req-0"));

        assert_eq!(job.chunks[0].status, ChunkStatus::Completed);
        assert_eq!(job.chunks[0].credits_used, Some(90));
        assert_eq!(job.aggregate_credits_used, 90);
        assert_eq!(job.request_ids, vec!["req-0"]);
        assert!(job.credits_consistent());
    }

    #[test]
    fn test_complete_chunk_twice_does_not_double_count() {
        let mut job = job(&[100]);
        job.complete_chunk(0, completion(100, "req-0"));
        job.complete_chunk(0, completion(100, "req-0"));
        assert_eq!(job.aggregate_credits_used, 100);
        assert!(job.credits_consistent());
    }

    #[test]
    fn test_retry_count_tracks_latest_pass() {
        let mut job = job(&[100]);
        job.mark_processing(0);
        for attempt in 1..=3 {
            job.record_attempt(0, attempt);
        }
        assert_eq!(job.chunks[0].retry_count, 2);
        assert_eq!(job.chunks[0].attempts, 3);

        job.fail_chunk(0, "timeout");
        job.mark_processing(0);
        job.record_attempt(0, 1);
        assert_eq!(job.chunks[0].retry_count, 0);
        assert_eq!(job.chunks[0].attempts, 4);
        assert!(job.chunks[0].error.is_none());
    }

    #[test]
    fn test_request_ids_before_skips_incomplete() {
        let mut job = job(&[10, 10, 10, 10]);
        job.complete_chunk(0, completion(10, "req-0"));
        job.fail_chunk(1, "boom");
        job.complete_chunk(2, completion(10, "req-2"));

        assert_eq!(job.request_ids_before(3), vec!["req-0", "req-2"]);
        assert_eq!(job.request_ids_before(1), vec!["req-0"]);
        assert!(job.request_ids_before(0).is_empty());
    }

    #[test]
    fn test_matches_plan() {
        let job = job(&[100, 200]);
        assert!(job.matches_plan(&[100, 200]));
        assert!(!job.matches_plan(&[100, 201]));
        assert!(!job.matches_plan(&[100]));
    }

    #[test]
    fn test_completion_falls_back_to_character_count() {
        let output = SynthesisOutput {
            audio: Bytes::from_static(b"audio"),
            ..Default::default()
        };
        let completion =
            ChunkCompletion::from_output(&output, PathBuf::from("a.mp3"), 1_500, 0.08);
        assert_eq!(completion.credits_used, 1_500);
        assert!((completion.cost_usd - 0.12).abs() < 1e-9);
    }

    #[test]
    fn test_completion_uses_reported_credits() {
        let output = SynthesisOutput {
            audio: Bytes::from_static(b"audio"),
            credits_used: Some(750),
            request_id: Some("req".to_string()),
            ..Default::default()
        };
        let completion =
            ChunkCompletion::from_output(&output, PathBuf::from("a.mp3"), 1_500, 0.08);
        assert_eq!(completion.credits_used, 750);
        assert_eq!(completion.request_id.as_deref(), Some("req"));
    }

    #[test]
    fn test_job_json_is_human_readable() {
        let job = job(&[10]);
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["status"], "created");
        assert_eq!(json["chunks"][0]["status"], "pending");
        assert_eq!(json["output_format"], "mp3_44100_128");
        assert!(json["started_at"].as_str().unwrap().contains('T'));

        let back: SynthesisJob = serde_json::from_value(json).unwrap();
        assert_eq!(back.job_id, job.job_id);
    }
}
