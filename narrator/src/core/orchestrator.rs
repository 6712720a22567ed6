//! Drives a synthesis job from script to stitched audio.
//!
//! The orchestrator owns every mutation of a [`SynthesisJob`]. Chunks are
//! processed strictly in order, one request at a time, and the job is saved
//! after each transition:
//!
//! ```text
//! pending ──► processing ──► completed
//!                  │
//!                  └──► failed ──► (next run) processing ...
//! ```
//!
//! A crash at any point leaves a state file whose completed chunks are never
//! requested again. Re-running the same script against the same output path
//! picks up from the first chunk that is not completed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{
    CharacterBudget, NarratorConfig, PriceBook, default_pacing, get_character_budget,
};
use crate::core::chunker::TextChunker;
use crate::core::job::{
    ChunkCompletion, JobStatus, JobStore, SynthesisJob, job_fingerprint, state_dir_for,
    write_atomic,
};
use crate::core::report::CostReport;
use crate::core::stitcher::{AudioStitcher, StitchError, stitcher_for};
use crate::core::tts::{
    SynthesisClient, SynthesisError, SynthesisOutput, SynthesisRequest, VoiceConfig,
};
use crate::errors::{JobError, JobResult};

/// Directory under the state dir that holds per-chunk audio, one subdirectory per job.
pub const CHUNKS_DIR: &str = "chunks";

/// Retry policy for transient provider failures.
///
/// Retry `n` (1-based) waits `backoff_base * n` before the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_base: Duration) -> Self {
        Self {
            max_retries,
            backoff_base,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.backoff_base * retry
    }

    /// Total attempts allowed per chunk and run.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// One request to synthesize a script.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub text: String,
    pub output_path: PathBuf,
    /// Voice for a new job. A resumed job keeps the voice it was created with.
    pub voice: VoiceConfig,
    /// Chunk size override for a new job
    pub max_chars: Option<usize>,
    /// `false` discards any saved state and starts over
    pub resume: bool,
}

impl JobRequest {
    pub fn new(text: impl Into<String>, output_path: impl Into<PathBuf>, voice: VoiceConfig) -> Self {
        Self {
            text: text.into(),
            output_path: output_path.into(),
            voice,
            max_chars: None,
            resume: true,
        }
    }

    pub fn with_max_chars(mut self, max_chars: Option<usize>) -> Self {
        self.max_chars = max_chars;
        self
    }

    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub fn job_id(&self) -> String {
        job_fingerprint(&self.text, &self.output_path)
    }
}

/// How a single chunk ended within one run.
enum ChunkOutcome {
    Success(SynthesisOutput),
    Failed(SynthesisError),
    Cancelled,
}

pub struct SynthesisOrchestrator {
    client: Arc<dyn SynthesisClient>,
    store: Arc<dyn JobStore>,
    retry: RetryPolicy,
    /// `None` picks a default from the model
    pacing: Option<Duration>,
    prices: PriceBook,
    stitcher: Option<Arc<dyn AudioStitcher>>,
    cancel: CancellationToken,
}

impl SynthesisOrchestrator {
    pub fn new(client: Arc<dyn SynthesisClient>, store: Arc<dyn JobStore>) -> Self {
        Self {
            client,
            store,
            retry: RetryPolicy::default(),
            pacing: None,
            prices: PriceBook::default(),
            stitcher: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Orchestrator with retry, pacing and prices taken from `config`.
    pub fn from_config(
        client: Arc<dyn SynthesisClient>,
        store: Arc<dyn JobStore>,
        config: &NarratorConfig,
    ) -> Self {
        let mut orchestrator = Self::new(client, store)
            .with_retry_policy(RetryPolicy::new(
                config.max_retries,
                Duration::from_secs(config.backoff_seconds),
            ))
            .with_price_book(config.price_book());
        orchestrator.pacing = config.pacing_seconds.map(Duration::from_secs);
        orchestrator
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = Some(pacing);
        self
    }

    pub fn with_price_book(mut self, prices: PriceBook) -> Self {
        self.prices = prices;
        self
    }

    /// Use `stitcher` instead of picking one from the output format.
    pub fn with_stitcher(mut self, stitcher: Arc<dyn AudioStitcher>) -> Self {
        self.stitcher = Some(stitcher);
        self
    }

    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run (or resume) the job for `request`.
    ///
    /// Returns the completed job, or a [`JobError`] carrying the job state
    /// when some chunks failed, stitching failed or the run was cancelled.
    pub async fn run(&self, request: JobRequest) -> JobResult<SynthesisJob> {
        let job_id = request.job_id();
        let provider = self.client.provider_name();

        if !request.resume {
            info!(job_id = %job_id, "Discarding saved state, starting a fresh job");
            self.store.delete(&job_id).await?;
        }

        let existing = self.store.load(&job_id).await?;

        let (model_id, max_chars) = match &existing {
            Some(job) => (job.model.clone(), job.max_chars),
            None => {
                let model_id = request.voice.model_id.clone();
                let max_chars = request
                    .max_chars
                    .unwrap_or_else(|| get_character_budget(provider, &model_id).chunk_chars);
                (model_id, max_chars)
            }
        };

        let request_limit = get_character_budget(provider, &model_id).request_limit;
        let chunker = TextChunker::new(CharacterBudget::new(max_chars, request_limit));
        let chunks = chunker.split(&request.text)?;
        let sizes: Vec<usize> = chunks.iter().map(|c| c.chars().count()).collect();

        let mut job = match existing {
            Some(job) => {
                if !job.matches_plan(&sizes) {
                    let reason = if job.chunks.len() != sizes.len() {
                        format!(
                            "saved state has {} chunks, the script splits into {}",
                            job.chunks.len(),
                            sizes.len()
                        )
                    } else {
                        "chunk sizes differ from the saved state".to_string()
                    };
                    return Err(JobError::StateMismatch {
                        job: Box::new(job),
                        reason,
                    });
                }
                if job.voice_config() != request.voice {
                    warn!(
                        job_id = %job.job_id,
                        model = %job.model,
                        voice = %job.voice_id,
                        "Resuming with the voice settings the job was created with"
                    );
                }
                info!(
                    job_id = %job.job_id,
                    completed = job.completed_count(),
                    total = job.total_chunks,
                    "Resuming job"
                );
                job
            }
            None => {
                let job = SynthesisJob::new(
                    job_id,
                    request.output_path.clone(),
                    provider,
                    &request.voice,
                    max_chars,
                    &sizes,
                );
                info!(
                    job_id = %job.job_id,
                    chunks = job.total_chunks,
                    characters = job.total_characters,
                    max_chars = max_chars,
                    "Created job"
                );
                job
            }
        };

        job.status = JobStatus::Running;
        job.last_error = None;
        self.save(&mut job).await?;

        let state_dir = state_dir_for(&request.output_path);
        let chunks_dir = state_dir.join(CHUNKS_DIR).join(&job.job_id);
        let voice = job.voice_config();
        let pacing = self.pacing.unwrap_or_else(|| default_pacing(&job.model));
        let price_per_1k = self.prices.price_per_1k(&job.provider, &job.model);

        for index in 0..job.chunks.len() {
            if job.chunks[index].is_completed() {
                debug!(job_id = %job.job_id, chunk_id = %job.chunks[index].id, "Skipping completed chunk");
                continue;
            }

            if self.cancel.is_cancelled() {
                return Err(self.finish_cancelled(job, &state_dir).await);
            }

            job.mark_processing(index);
            self.save(&mut job).await?;

            let outcome = self
                .synthesize_chunk(&mut job, index, &chunks[index], &voice)
                .await;

            match outcome {
                ChunkOutcome::Success(output) => {
                    let chunk = &job.chunks[index];
                    let audio_path = chunks_dir.join(format!(
                        "{}.{}",
                        chunk.id,
                        voice.output_format.file_extension()
                    ));
                    write_atomic(&audio_path, &output.audio).await?;

                    let completion = ChunkCompletion::from_output(
                        &output,
                        audio_path,
                        chunk.character_count,
                        price_per_1k,
                    );
                    info!(
                        job_id = %job.job_id,
                        chunk_id = %chunk.id,
                        credits = completion.credits_used,
                        cost_usd = completion.cost_usd,
                        request_id = completion.request_id.as_deref().unwrap_or("-"),
                        "Chunk completed"
                    );
                    job.complete_chunk(index, completion);
                    self.save(&mut job).await?;

                    let more_to_do = job.chunks[index + 1..].iter().any(|c| !c.is_completed());
                    if more_to_do && !pacing.is_zero() {
                        debug!(job_id = %job.job_id, pacing_ms = pacing.as_millis() as u64, "Pacing before next chunk");
                        self.sleep_or_cancel(pacing).await;
                    }
                }
                ChunkOutcome::Failed(e) => {
                    error!(
                        job_id = %job.job_id,
                        chunk_id = %job.chunks[index].id,
                        kind = e.kind(),
                        error = %e,
                        "Chunk failed"
                    );
                    job.fail_chunk(index, e.to_string());
                    job.last_error = Some(format!("{}: {e}", job.chunks[index].id));
                    self.save(&mut job).await?;
                }
                ChunkOutcome::Cancelled => {
                    job.fail_chunk(index, "Cancelled before retry");
                    self.save(&mut job).await?;
                    return Err(self.finish_cancelled(job, &state_dir).await);
                }
            }
        }

        self.finish(job, &request.output_path, &state_dir).await
    }

    /// Call the provider for one chunk, retrying timeouts.
    async fn synthesize_chunk(
        &self,
        job: &mut SynthesisJob,
        index: usize,
        text: &str,
        voice: &VoiceConfig,
    ) -> ChunkOutcome {
        let previous_request_ids = job.request_ids_before(index);
        let mut attempt = 0;

        loop {
            attempt += 1;
            job.record_attempt(index, attempt);
            debug!(
                job_id = %job.job_id,
                chunk_id = %job.chunks[index].id,
                attempt = attempt,
                characters = job.chunks[index].character_count,
                "Synthesizing chunk"
            );

            let request =
                SynthesisRequest::new(text, voice).with_previous_request_ids(&previous_request_ids);

            match self.client.synthesize(request).await {
                Ok(output) => return ChunkOutcome::Success(output),
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts() => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        job_id = %job.job_id,
                        chunk_id = %job.chunks[index].id,
                        attempt = attempt,
                        retry_in_secs = delay.as_secs_f64(),
                        error = %e,
                        "Transient failure, retrying"
                    );
                    if !self.sleep_or_cancel(delay).await {
                        return ChunkOutcome::Cancelled;
                    }
                }
                Err(e) => return ChunkOutcome::Failed(e),
            }
        }
    }

    /// Sleep for `duration`. Returns `false` if cancelled first.
    async fn sleep_or_cancel(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return !self.cancel.is_cancelled();
        }
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    async fn save(&self, job: &mut SynthesisJob) -> JobResult<()> {
        job.touch();
        self.store.save(job).await?;
        Ok(())
    }

    /// Stitch whatever completed, settle the final status and write the report.
    async fn finish(
        &self,
        mut job: SynthesisJob,
        output_path: &Path,
        state_dir: &Path,
    ) -> JobResult<SynthesisJob> {
        let audio_paths = job.completed_audio_paths();

        let stitch_result = if audio_paths.is_empty() {
            None
        } else {
            Some(self.stitch(&job, audio_paths, output_path).await)
        };

        let all_completed = job.all_completed();
        let outcome = match stitch_result {
            Some(Ok(path)) if all_completed => {
                job.status = JobStatus::Completed;
                job.completed_at = Some(OffsetDateTime::now_utc());
                info!(
                    job_id = %job.job_id,
                    output = %path.display(),
                    credits = job.aggregate_credits_used,
                    cost_usd = job.aggregate_cost_usd,
                    "Job completed"
                );
                Ok(())
            }
            Some(Err(e)) if all_completed => {
                error!(job_id = %job.job_id, error = %e, "Stitching failed, chunk audio kept");
                job.status = JobStatus::FailedStitching;
                job.last_error = Some(e.to_string());
                Err(e)
            }
            partial => {
                match partial {
                    Some(Ok(path)) => warn!(
                        job_id = %job.job_id,
                        output = %path.display(),
                        completed = job.completed_count(),
                        total = job.total_chunks,
                        "Wrote partial audio; re-run to retry failed chunks"
                    ),
                    Some(Err(e)) => {
                        warn!(job_id = %job.job_id, error = %e, "Could not stitch partial audio")
                    }
                    None => warn!(job_id = %job.job_id, "No chunk completed"),
                }
                job.status = JobStatus::FailedChunks;
                Ok(())
            }
        };

        self.save(&mut job).await?;
        self.write_report(&job, state_dir).await;

        match outcome {
            Ok(()) if job.status == JobStatus::Completed => Ok(job),
            Ok(()) => Err(JobError::ChunkFailures { job: Box::new(job) }),
            Err(source) => Err(JobError::Stitching {
                job: Box::new(job),
                source,
            }),
        }
    }

    async fn finish_cancelled(&self, mut job: SynthesisJob, state_dir: &Path) -> JobError {
        warn!(
            job_id = %job.job_id,
            completed = job.completed_count(),
            total = job.total_chunks,
            "Job cancelled"
        );
        job.status = JobStatus::Cancelled;
        if let Err(e) = self.save(&mut job).await {
            return e;
        }
        self.write_report(&job, state_dir).await;
        JobError::Cancelled { job: Box::new(job) }
    }

    async fn stitch(
        &self,
        job: &SynthesisJob,
        audio_paths: Vec<PathBuf>,
        output_path: &Path,
    ) -> Result<PathBuf, StitchError> {
        let stitcher = self
            .stitcher
            .clone()
            .unwrap_or_else(|| stitcher_for(job.output_format));
        let output = output_path.to_path_buf();

        debug!(
            job_id = %job.job_id,
            stitcher = stitcher.name(),
            chunks = audio_paths.len(),
            "Stitching audio"
        );

        tokio::task::spawn_blocking(move || stitcher.combine(&audio_paths, &output))
            .await
            .map_err(|e| StitchError::Io {
                path: output_path.to_path_buf(),
                source: std::io::Error::other(e),
            })?
    }

    /// Reports are derived data; failing to write one never fails the job.
    async fn write_report(&self, job: &SynthesisJob, state_dir: &Path) {
        let price_per_1k = self.prices.price_per_1k(&job.provider, &job.model);
        let report = CostReport::from_job(job, price_per_1k);
        match report.write_to(state_dir).await {
            Ok((text_path, _)) => {
                info!(job_id = %job.job_id, report = %text_path.display(), "Cost report saved")
            }
            Err(e) => warn!(job_id = %job.job_id, error = %e, "Could not write cost report"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_backoff_is_linear() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(10));
        assert_eq!(policy.delay_for(2), Duration::from_secs(20));
        assert_eq!(policy.delay_for(3), Duration::from_secs(30));
        assert_eq!(policy.max_attempts(), 4);
    }

    #[test]
    fn test_retry_policy_from_config() {
        let mut config = NarratorConfig::default();
        config.max_retries = 1;
        config.backoff_seconds = 0;

        let policy = RetryPolicy::new(config.max_retries, Duration::from_secs(config.backoff_seconds));
        assert_eq!(policy.max_attempts(), 2);
        assert_eq!(policy.delay_for(1), Duration::ZERO);
    }

    #[test]
    fn test_job_request_defaults_to_resume() {
        let voice = VoiceConfig {
            model_id: "eleven_flash_v2_5".to_string(),
            voice_id: "voice".to_string(),
            settings: Default::default(),
            output_format: Default::default(),
        };
        let request = JobRequest::new("text", "out.mp3", voice);
        assert!(request.resume);
        assert_eq!(request.job_id(), job_fingerprint("text", Path::new("out.mp3")));
        assert!(!request.with_resume(false).resume);
    }
}
