pub mod chunker;
pub mod job;
pub mod orchestrator;
pub mod report;
pub mod stitcher;
pub mod tts;

// Re-export commonly used types for convenience
pub use chunker::{ChunkPlan, ChunkingError, ChunkingResult, TextChunker};

pub use job::{
    ChunkCompletion, ChunkRecord, ChunkStatus, FilesystemJobStore, JobStatus, JobStore,
    MemoryJobStore, StoreError, StoreResult, SynthesisJob, chunk_id, job_fingerprint,
    state_dir_for,
};

pub use orchestrator::{JobRequest, RetryPolicy, SynthesisOrchestrator};

pub use report::CostReport;

pub use stitcher::{AudioStitcher, ConcatStitcher, StitchError, WavStitcher, stitcher_for};

pub use tts::{
    AudioFormat, ElevenLabsClient, ElevenLabsConfig, SynthesisClient, SynthesisError,
    SynthesisOutput, SynthesisRequest, SynthesisResult, VoiceConfig, VoiceSettings,
    create_synthesis_client,
};
