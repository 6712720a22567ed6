//! Cost accounting for a finished (or interrupted) job.
//!
//! [`CostReport::from_job`] is a pure read of the job state. The report is
//! rendered twice, as plain text for people and JSON for scripts, and both
//! files land in the job's state directory.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::Serialize;
use time::format_description::well_known::Rfc3339;

use crate::core::chunker::MINUTES_PER_FULL_CHUNK;
use crate::core::job::{ChunkStatus, JobStatus, StoreResult, SynthesisJob, write_atomic};

pub const REPORT_TEXT_FILE: &str = "cost_report.txt";
pub const REPORT_JSON_FILE: &str = "cost_report.json";

/// Below this many credits per character the account is clearly discounted.
pub const DISCOUNT_HINT_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkCostLine {
    pub id: String,
    pub status: ChunkStatus,
    pub character_count: usize,
    pub estimated_credits: u64,
    pub credits_used: Option<u64>,
    pub cost_usd: Option<f64>,
    /// Estimated minus actual credits, for completed chunks
    pub credits_saved: Option<i64>,
    pub retry_count: u32,
    pub attempts: u32,
    pub provider_request_id: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostReport {
    pub job_id: String,
    pub status: JobStatus,
    pub model: String,
    pub voice_id: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,

    pub total_characters: usize,
    pub total_chunks: usize,
    pub completed_chunks: usize,
    pub failed_chunks: usize,
    pub pending_chunks: usize,

    pub price_per_1k_usd: f64,
    pub aggregate_cost_usd: f64,
    pub aggregate_credits_used: u64,
    /// Character-count estimate for the completed chunks
    pub estimated_credits: u64,
    pub credits_saved: i64,
    pub savings_usd: f64,
    /// Credits per character over completed chunks
    pub credits_per_character: Option<f64>,
    pub discount_detected: bool,

    pub estimated_minutes_low: f64,
    pub estimated_minutes_high: f64,
    pub credits_per_audio_minute: Option<f64>,

    pub chunks: Vec<ChunkCostLine>,
}

fn rfc3339(ts: time::OffsetDateTime) -> Option<String> {
    ts.format(&Rfc3339).ok()
}

impl CostReport {
    /// Summarize `job`. `price_per_1k_usd` is only used to price the savings.
    pub fn from_job(job: &SynthesisJob, price_per_1k_usd: f64) -> Self {
        let chunks: Vec<ChunkCostLine> = job
            .chunks
            .iter()
            .map(|c| ChunkCostLine {
                id: c.id.clone(),
                status: c.status,
                character_count: c.character_count,
                estimated_credits: c.estimated_credits,
                credits_used: c.credits_used,
                cost_usd: c.cost_usd,
                credits_saved: c
                    .is_completed()
                    .then(|| c.estimated_credits as i64 - c.credits_used.unwrap_or(0) as i64),
                retry_count: c.retry_count,
                attempts: c.attempts,
                provider_request_id: c.provider_request_id.clone(),
                error: c.error.clone(),
            })
            .collect();

        let completed = job.chunks.iter().filter(|c| c.is_completed());
        let completed_chunks = completed.clone().count();
        let completed_characters: usize = completed.clone().map(|c| c.character_count).sum();
        let estimated_credits: u64 = completed.map(|c| c.estimated_credits).sum();

        let credits = job.aggregate_credits_used;
        let credits_saved = estimated_credits as i64 - credits as i64;
        let credits_per_character =
            (completed_characters > 0).then(|| credits as f64 / completed_characters as f64);

        let mid_minutes = (MINUTES_PER_FULL_CHUNK.0 + MINUTES_PER_FULL_CHUNK.1) / 2.0;
        let credits_per_audio_minute =
            (completed_chunks > 0).then(|| credits as f64 / (completed_chunks as f64 * mid_minutes));

        Self {
            job_id: job.job_id.clone(),
            status: job.status,
            model: job.model.clone(),
            voice_id: job.voice_id.clone(),
            started_at: rfc3339(job.started_at),
            completed_at: job.completed_at.and_then(rfc3339),
            total_characters: job.total_characters,
            total_chunks: job.total_chunks,
            completed_chunks,
            failed_chunks: job.failed_count(),
            pending_chunks: job.total_chunks - completed_chunks - job.failed_count(),
            price_per_1k_usd,
            aggregate_cost_usd: job.aggregate_cost_usd,
            aggregate_credits_used: credits,
            estimated_credits,
            credits_saved,
            savings_usd: credits_saved.max(0) as f64 / 1000.0 * price_per_1k_usd,
            credits_per_character,
            discount_detected: credits_per_character.is_some_and(|c| c < DISCOUNT_HINT_THRESHOLD),
            estimated_minutes_low: completed_chunks as f64 * MINUTES_PER_FULL_CHUNK.0,
            estimated_minutes_high: completed_chunks as f64 * MINUTES_PER_FULL_CHUNK.1,
            credits_per_audio_minute,
            chunks,
        }
    }

    /// Render the human-readable report.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        // Writing to a String cannot fail
        let _ = self.write_text(&mut out);
        out
    }

    fn write_text(&self, f: &mut String) -> std::fmt::Result {
        writeln!(f, "Synthesis Cost Report")?;
        writeln!(f, "{}", "=".repeat(50))?;
        writeln!(f)?;
        writeln!(f, "Job ID: {}", self.job_id)?;
        writeln!(f, "Started: {}", self.started_at.as_deref().unwrap_or("N/A"))?;
        writeln!(f, "Completed: {}", self.completed_at.as_deref().unwrap_or("N/A"))?;
        writeln!(f, "Status: {}", self.status)?;
        writeln!(f)?;

        writeln!(f, "Summary:")?;
        writeln!(f, "- Total characters: {}", self.total_characters)?;
        writeln!(f, "- Total chunks: {}", self.total_chunks)?;
        writeln!(f, "- Completed chunks: {}", self.completed_chunks)?;
        writeln!(f, "- Failed chunks: {}", self.failed_chunks)?;
        writeln!(f, "- Pending chunks: {}", self.pending_chunks)?;
        writeln!(f, "- Model used: {}", self.model)?;
        writeln!(f, "- Voice used: {}", self.voice_id)?;
        writeln!(f)?;

        writeln!(f, "Cost Breakdown:")?;
        writeln!(f, "- Total cost: ${:.4}", self.aggregate_cost_usd)?;
        writeln!(
            f,
            "- Total credits used: {} (actual API charge)",
            self.aggregate_credits_used
        )?;
        writeln!(f, "- Cost per 1K chars: ${:.4}", self.price_per_1k_usd)?;
        if let Some(cpc) = self.credits_per_character {
            writeln!(f, "- Average credits per character: {cpc:.2}")?;
            if self.discount_detected {
                writeln!(
                    f,
                    "  Discounted rate detected: ~{cpc:.2} credits per character"
                )?;
            }
        }
        writeln!(f)?;

        writeln!(f, "Chunk Details:")?;
        for chunk in &self.chunks {
            write!(f, "- {}: {} chars", chunk.id, chunk.character_count)?;
            if let (Some(cost), Some(credits)) = (chunk.cost_usd, chunk.credits_used) {
                write!(f, ", ${cost:.4}, {credits} credits")?;
            }
            if let Some(saved) = chunk.credits_saved.filter(|s| *s != 0) {
                write!(f, " (saved {saved} credits)")?;
            }
            if chunk.retry_count > 0 {
                write!(f, ", {} retries", chunk.retry_count)?;
            }
            write!(f, ", status: {}", chunk.status)?;
            if let Some(error) = &chunk.error {
                write!(f, ", error: {error}")?;
            }
            writeln!(f)?;
        }
        writeln!(f)?;

        writeln!(
            f,
            "Estimated Audio Duration: {:.0}-{:.0} minutes",
            self.estimated_minutes_low, self.estimated_minutes_high
        )?;
        writeln!(f)?;

        writeln!(f, "Credit Usage Summary:")?;
        if let Some(per_minute) = self.credits_per_audio_minute {
            writeln!(f, "- Average credits per minute of audio: {per_minute:.0}")?;
        }
        if self.credits_saved > 0 && self.estimated_credits > 0 {
            let percent = self.credits_saved as f64 / self.estimated_credits as f64 * 100.0;
            writeln!(
                f,
                "- Total credits saved: {} ({percent:.1}% discount)",
                self.credits_saved
            )?;
            writeln!(f, "- Cost savings: ${:.4}", self.savings_usd)?;
        }

        Ok(())
    }

    /// Write `cost_report.txt` and `cost_report.json` into `dir`.
    pub async fn write_to(&self, dir: &Path) -> StoreResult<(PathBuf, PathBuf)> {
        let text_path = dir.join(REPORT_TEXT_FILE);
        let json_path = dir.join(REPORT_JSON_FILE);

        write_atomic(&text_path, self.to_text().as_bytes()).await?;
        let json = serde_json::to_vec_pretty(self)?;
        write_atomic(&json_path, &json).await?;

        Ok((text_path, json_path))
    }
}
