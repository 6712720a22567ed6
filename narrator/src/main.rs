use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, anyhow};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use narrator::{
    AudioFormat, CostReport, FilesystemJobStore, JobRequest, JobStore, NarratorConfig,
    SynthesisJob, SynthesisOrchestrator, TextChunker, create_synthesis_client, job_fingerprint,
    state_dir_for,
};

/// Narrator - resumable long-form text-to-speech
#[derive(Parser, Debug)]
#[command(name = "narrator")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Synthesize a script, resuming any saved progress
    Synthesize {
        #[command(flatten)]
        job: JobArgs,

        #[command(flatten)]
        voice: VoiceArgs,

        /// Retries after a timed-out request
        #[arg(long)]
        max_retries: Option<u32>,

        /// Seconds to wait after each successful chunk
        #[arg(long)]
        pacing_seconds: Option<u64>,

        /// Discard saved progress and start over
        #[arg(long)]
        fresh: bool,
    },

    /// Show how a script would be chunked, without calling the provider
    Plan {
        /// Script to read ("-" for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Model alias or id
        #[arg(short, long)]
        model: Option<String>,

        /// Characters per chunk
        #[arg(long)]
        max_chars: Option<usize>,
    },

    /// Show saved progress for a job
    Status {
        #[command(flatten)]
        job: JobArgs,
    },

    /// Print the cost report for a job and rewrite the report files
    Report {
        #[command(flatten)]
        job: JobArgs,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Identifies a job: the script and the audio file it produces.
#[derive(Args, Debug)]
struct JobArgs {
    /// Script to read ("-" for stdin)
    #[arg(short, long)]
    input: PathBuf,

    /// Output audio file
    #[arg(short, long)]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct VoiceArgs {
    /// Model alias (flash, turbo, multilingual, english, v3) or id
    #[arg(short, long)]
    model: Option<String>,

    /// Voice alias (rachel, ana, hectorip) or voice id
    #[arg(short, long)]
    voice: Option<String>,

    /// Output format (mp3_44100_128, mp3_22050_32, pcm_16000, pcm_22050, pcm_24000, pcm_44100)
    #[arg(short, long)]
    format: Option<AudioFormat>,

    #[arg(long)]
    stability: Option<f32>,

    #[arg(long)]
    similarity_boost: Option<f32>,

    #[arg(long)]
    style: Option<f32>,

    /// Disable speaker boost
    #[arg(long)]
    no_speaker_boost: bool,

    /// Characters per chunk
    #[arg(long)]
    max_chars: Option<usize>,
}

impl VoiceArgs {
    fn apply_to(self, config: &mut NarratorConfig) {
        if let Some(model) = self.model {
            config.model = model;
        }
        if let Some(voice) = self.voice {
            config.voice = voice;
        }
        if let Some(format) = self.format {
            config.output_format = format;
        }
        if let Some(stability) = self.stability {
            config.voice_settings.stability = stability;
        }
        if let Some(similarity_boost) = self.similarity_boost {
            config.voice_settings.similarity_boost = similarity_boost;
        }
        if let Some(style) = self.style {
            config.voice_settings.style = style;
        }
        if self.no_speaker_boost {
            config.voice_settings.use_speaker_boost = false;
        }
        if let Some(max_chars) = self.max_chars {
            config.max_chars = Some(max_chars);
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<NarratorConfig> {
    let config = match path {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            NarratorConfig::from_file(path)?
        }
        None => NarratorConfig::from_env()?,
    };
    Ok(config)
}

fn read_script(input: &Path) -> anyhow::Result<String> {
    if input.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read script from stdin")?;
        Ok(text)
    } else {
        std::fs::read_to_string(input)
            .with_context(|| format!("Failed to read script {}", input.display()))
    }
}

async fn load_job(job: &JobArgs) -> anyhow::Result<SynthesisJob> {
    let text = read_script(&job.input)?;
    let job_id = job_fingerprint(&text, &job.output);
    let store = FilesystemJobStore::new(state_dir_for(&job.output));

    store.load(&job_id).await?.ok_or_else(|| {
        anyhow!(
            "No saved job {job_id} for {} (looked in {})",
            job.output.display(),
            store.state_dir().display()
        )
    })
}

fn print_status(job: &SynthesisJob) {
    println!("Job {} [{}]", job.job_id, job.status);
    println!("  Output:   {}", job.output_path.display());
    println!("  Model:    {} / voice {}", job.model, job.voice_id);
    println!(
        "  Progress: {}/{} chunks completed, {} failed",
        job.completed_count(),
        job.total_chunks,
        job.failed_count()
    );
    println!(
        "  Cost:     {} credits, ${:.4}",
        job.aggregate_credits_used, job.aggregate_cost_usd
    );
    for chunk in &job.chunks {
        print!(
            "  - {} {:>6} chars  {:<10}",
            chunk.id, chunk.character_count, chunk.status
        );
        if let Some(credits) = chunk.credits_used {
            print!("  {credits} credits");
        }
        if let Some(error) = &chunk.error {
            print!("  ({error})");
        }
        println!();
    }
    if let Some(error) = &job.last_error {
        println!("  Last error: {error}");
    }
}

async fn synthesize(
    mut config: NarratorConfig,
    job: JobArgs,
    voice: VoiceArgs,
    max_retries: Option<u32>,
    pacing_seconds: Option<u64>,
    fresh: bool,
) -> anyhow::Result<()> {
    voice.apply_to(&mut config);
    if let Some(retries) = max_retries {
        config.max_retries = retries;
    }
    if let Some(pacing) = pacing_seconds {
        config.pacing_seconds = Some(pacing);
    }
    config.validate()?;

    let text = read_script(&job.input)?;
    let client = create_synthesis_client(&config)?;
    let store: Arc<dyn JobStore> = Arc::new(FilesystemJobStore::new(state_dir_for(&job.output)));

    let orchestrator = SynthesisOrchestrator::from_config(client, store, &config);
    let cancel = orchestrator.cancellation_token();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current chunk");
            cancel.cancel();
        }
    });

    let request = JobRequest::new(text, &job.output, config.voice_config())
        .with_max_chars(config.max_chars)
        .with_resume(!fresh);

    match orchestrator.run(request).await {
        Ok(job) => {
            print_status(&job);
            println!("Audio written to {}", job.output_path.display());
            Ok(())
        }
        Err(e) => {
            if let Some(job) = e.job() {
                print_status(job);
            }
            if e.is_resumable() {
                eprintln!("Re-run the same command to resume.");
            }
            Err(e.into())
        }
    }
}

fn plan(
    config: &NarratorConfig,
    input: &Path,
    model: Option<String>,
    max_chars: Option<usize>,
) -> anyhow::Result<()> {
    let text = read_script(input)?;

    let mut config = config.clone();
    if let Some(model) = model {
        config.model = model;
    }
    if max_chars.is_some() {
        config.max_chars = max_chars;
    }

    let model_id = config.model_id();
    let plan = TextChunker::new(config.chunk_budget(&model_id)).plan(&text)?;
    let (low, high) = plan.estimated_minutes();

    println!("Model:       {model_id}");
    println!("Characters:  {}", plan.total_characters);
    println!("Chunk size:  {}", plan.max_chars);
    println!("Chunks:      {}", plan.len());
    for (index, size) in plan.sizes().iter().enumerate() {
        println!("  - chunk_{index:03}: {size} chars");
    }
    println!("Estimated audio: {low:.0}-{high:.0} minutes");

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Synthesize {
            job,
            voice,
            max_retries,
            pacing_seconds,
            fresh,
        } => synthesize(config, job, voice, max_retries, pacing_seconds, fresh).await,
        Commands::Plan {
            input,
            model,
            max_chars,
        } => plan(&config, &input, model, max_chars),
        Commands::Status { job } => {
            let job = load_job(&job).await?;
            print_status(&job);
            Ok(())
        }
        Commands::Report { job: args, json } => {
            let job = load_job(&args).await?;
            let price = config.price_book().price_per_1k(&job.provider, &job.model);
            let report = CostReport::from_job(&job, price);
            report.write_to(&state_dir_for(&args.output)).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report.to_text());
            }
            Ok(())
        }
    }
}
