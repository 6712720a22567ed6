//! Joining chunk audio into the final output file.
//!
//! Two strategies, picked from the job's output format:
//! - [`WavStitcher`] decodes each WAV chunk and re-frames all samples into a
//!   single file. Every chunk must share the same `WavSpec`; nothing is
//!   resampled.
//! - [`ConcatStitcher`] appends the raw bytes of each chunk. MP3 is a stream
//!   of self-contained frames, so the result plays back in order.
//!
//! Stitching is blocking file I/O and is run on the blocking pool by the
//! orchestrator.

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::core::tts::AudioFormat;

#[derive(Debug, Error)]
pub enum StitchError {
    #[error("No audio chunks to stitch")]
    EmptyInput,

    #[error("Chunk audio is missing: {0}")]
    MissingChunk(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid WAV data in {path}: {source}")]
    Wav {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("WAV format of {path} ({found}) differs from the first chunk ({expected})")]
    SpecMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },
}

pub type StitchResult<T> = Result<T, StitchError>;

/// Combines ordered chunk files into one output file.
pub trait AudioStitcher: Send + Sync {
    /// Write the concatenation of `inputs` to `output` and return its path.
    fn combine(&self, inputs: &[PathBuf], output: &Path) -> StitchResult<PathBuf>;

    /// Strategy name for logs
    fn name(&self) -> &'static str;
}

/// Pick the stitcher for chunks encoded as `format`.
pub fn stitcher_for(format: AudioFormat) -> Arc<dyn AudioStitcher> {
    if format.is_pcm() {
        Arc::new(WavStitcher)
    } else {
        Arc::new(ConcatStitcher)
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> StitchError + '_ {
    move |source| StitchError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn check_inputs(inputs: &[PathBuf]) -> StitchResult<()> {
    if inputs.is_empty() {
        return Err(StitchError::EmptyInput);
    }
    if let Some(missing) = inputs.iter().find(|p| !p.is_file()) {
        return Err(StitchError::MissingChunk(missing.clone()));
    }
    Ok(())
}

fn temp_path_for(output: &Path) -> PathBuf {
    let mut name = output.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    output.with_file_name(name)
}

/// Run `write` against a temp file, then sync it and move it over `output`.
///
/// The temp file is removed if `write` fails, so a failed stitch leaves any
/// previous output untouched.
fn write_via_temp(
    output: &Path,
    write: impl FnOnce(&Path) -> StitchResult<()>,
) -> StitchResult<PathBuf> {
    let temp = temp_path_for(output);

    if let Err(e) = write(&temp) {
        let _ = fs::remove_file(&temp);
        return Err(e);
    }

    File::open(&temp)
        .and_then(|f| f.sync_all())
        .map_err(io_error(&temp))?;
    fs::rename(&temp, output).map_err(io_error(output))?;
    Ok(output.to_path_buf())
}

fn describe(spec: &hound::WavSpec) -> String {
    format!(
        "{} Hz, {} ch, {} bit {:?}",
        spec.sample_rate, spec.channels, spec.bits_per_sample, spec.sample_format
    )
}

/// Re-frames PCM samples from WAV chunks into one WAV file.
#[derive(Debug, Clone, Copy, Default)]
pub struct WavStitcher;

impl WavStitcher {
    fn open(path: &Path) -> StitchResult<hound::WavReader<BufReader<File>>> {
        hound::WavReader::open(path).map_err(|source| StitchError::Wav {
            path: path.to_path_buf(),
            source,
        })
    }

    fn append<W: io::Write + io::Seek>(
        reader: hound::WavReader<BufReader<File>>,
        writer: &mut hound::WavWriter<W>,
        path: &Path,
    ) -> StitchResult<()> {
        let wav_error = |source| StitchError::Wav {
            path: path.to_path_buf(),
            source,
        };

        match reader.spec().sample_format {
            hound::SampleFormat::Int => {
                for sample in reader.into_samples::<i32>() {
                    writer.write_sample(sample.map_err(wav_error)?).map_err(wav_error)?;
                }
            }
            hound::SampleFormat::Float => {
                for sample in reader.into_samples::<f32>() {
                    writer.write_sample(sample.map_err(wav_error)?).map_err(wav_error)?;
                }
            }
        }
        Ok(())
    }
}

impl AudioStitcher for WavStitcher {
    fn combine(&self, inputs: &[PathBuf], output: &Path) -> StitchResult<PathBuf> {
        check_inputs(inputs)?;

        let spec = Self::open(&inputs[0])?.spec();

        let output = write_via_temp(output, |temp| {
            let mut writer =
                hound::WavWriter::create(temp, spec).map_err(|source| StitchError::Wav {
                    path: temp.to_path_buf(),
                    source,
                })?;

            for path in inputs {
                let reader = Self::open(path)?;
                if reader.spec() != spec {
                    return Err(StitchError::SpecMismatch {
                        path: path.clone(),
                        expected: describe(&spec),
                        found: describe(&reader.spec()),
                    });
                }
                debug!(chunk = %path.display(), samples = reader.len(), "Appending WAV chunk");
                Self::append(reader, &mut writer, path)?;
            }

            writer.finalize().map_err(|source| StitchError::Wav {
                path: temp.to_path_buf(),
                source,
            })
        })?;

        info!(output = %output.display(), chunks = inputs.len(), "Stitched WAV output");
        Ok(output)
    }

    fn name(&self) -> &'static str {
        "wav"
    }
}

/// Appends chunk bytes verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConcatStitcher;

impl AudioStitcher for ConcatStitcher {
    fn combine(&self, inputs: &[PathBuf], output: &Path) -> StitchResult<PathBuf> {
        check_inputs(inputs)?;

        let output = write_via_temp(output, |temp| {
            let mut out = File::create(temp).map_err(io_error(temp))?;
            for path in inputs {
                let mut input = File::open(path).map_err(io_error(path))?;
                let copied = io::copy(&mut input, &mut out).map_err(io_error(path))?;
                debug!(chunk = %path.display(), bytes = copied, "Appended chunk");
            }
            Ok(())
        })?;

        info!(output = %output.display(), chunks = inputs.len(), "Concatenated output");
        Ok(output)
    }

    fn name(&self) -> &'static str {
        "concat"
    }
}
