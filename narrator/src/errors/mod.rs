//! Job-level error types.
//!
//! Errors that end a run are returned as [`JobError`]. Variants raised after
//! the job state exists carry that state, so the caller can report progress
//! and cost even when the run failed.

use thiserror::Error;

use crate::config::ConfigError;
use crate::core::chunker::ChunkingError;
use crate::core::job::{StoreError, SynthesisJob};
use crate::core::stitcher::StitchError;

/// Result type for job operations
pub type JobResult<T> = Result<T, JobError>;

#[derive(Error, Debug)]
pub enum JobError {
    // ─────────────────────────────────────────────────────────────────────────────
    // Raised before any provider call
    // ─────────────────────────────────────────────────────────────────────────────
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Chunking failed: {0}")]
    Chunking(#[from] ChunkingError),

    /// The persisted records do not line up with a fresh split of the script
    #[error("Job {} does not match its saved state: {reason}. Run with --fresh to start over", .job.job_id)]
    StateMismatch {
        job: Box<SynthesisJob>,
        reason: String,
    },

    // ─────────────────────────────────────────────────────────────────────────────
    // Raised during or after the chunk loop
    // ─────────────────────────────────────────────────────────────────────────────
    #[error("Failed to persist job state: {0}")]
    Persistence(#[from] StoreError),

    #[error(
        "Job {} finished with {} of {} chunks failed",
        .job.job_id,
        .job.remaining_count(),
        .job.total_chunks
    )]
    ChunkFailures { job: Box<SynthesisJob> },

    #[error("Job {} could not stitch its audio: {source}", .job.job_id)]
    Stitching {
        job: Box<SynthesisJob>,
        #[source]
        source: StitchError,
    },

    #[error("Job {} was cancelled with {} chunks remaining", .job.job_id, .job.remaining_count())]
    Cancelled { job: Box<SynthesisJob> },
}

impl JobError {
    /// Job state at the time of failure, if the job got that far.
    pub fn job(&self) -> Option<&SynthesisJob> {
        match self {
            Self::StateMismatch { job, .. }
            | Self::ChunkFailures { job }
            | Self::Stitching { job, .. }
            | Self::Cancelled { job } => Some(&**job),
            Self::Configuration(_) | Self::Chunking(_) | Self::Persistence(_) => None,
        }
    }

    /// Whether re-running the same command can make progress.
    pub fn is_resumable(&self) -> bool {
        matches!(
            self,
            Self::ChunkFailures { .. } | Self::Stitching { .. } | Self::Cancelled { .. }
        )
    }
}
