// Mixing per-part mono stems into one mixture per score.
//
// A mixture is the sample-wise sum of its sources with no gain and no
// normalization, so that `mix - sum(sources)` is exactly zero and source
// separation targets stay trustworthy. Two mixers implement this:
//
// - `SoxMixer` runs `sox -m -v 1 a.wav -v 1 b.wav ... out.wav`. The explicit
//   unit volume stops SoX from scaling each input by 1/n and from dithering.
// - `WavSumMixer` sums in-process with `hound` and writes 32-bit float, which
//   cannot clip. Used by tests and available where SoX is not.
//
// `verify_mixture` re-reads everything and reports the largest deviation.

use crate::error::{PipelineError, PipelineResult};
use crate::render::{find_tool, run_tool};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Sums mono sources into one mono mixture.
pub trait Mixer: Send + Sync {
    fn mix(&self, sources: &[PathBuf], output: &Path) -> PipelineResult<()>;
}

#[derive(Debug, Clone)]
pub struct SoxMixer {
    sox: PathBuf,
}

impl SoxMixer {
    pub fn new(sox: &str) -> PipelineResult<Self> {
        Ok(SoxMixer {
            sox: find_tool(sox)?,
        })
    }
}

impl Mixer for SoxMixer {
    fn mix(&self, sources: &[PathBuf], output: &Path) -> PipelineResult<()> {
        let mut cmd = Command::new(&self.sox);
        cmd.arg("-m");
        for source in sources {
            cmd.arg("-v").arg("1").arg(source);
        }
        cmd.arg(output);
        run_tool(&mut cmd)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WavSumMixer;

impl Mixer for WavSumMixer {
    fn mix(&self, sources: &[PathBuf], output: &Path) -> PipelineResult<()> {
        let (spec, sum) = sum_sources(sources, output)?;
        let out_spec = WavSpec {
            channels: 1,
            sample_rate: spec.sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer =
            WavWriter::create(output, out_spec).map_err(|e| PipelineError::wav(output, e))?;
        for s in sum {
            writer
                .write_sample(s)
                .map_err(|e| PipelineError::wav(output, e))?;
        }
        writer.finalize().map_err(|e| PipelineError::wav(output, e))
    }
}

/// Result of comparing a mixture with the sum of its sources.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixtureCheck {
    pub frames: usize,
    /// Largest `|mix - sum(sources)|`, in full-scale units.
    pub max_abs_error: f32,
}

impl MixtureCheck {
    pub fn is_exact(&self) -> bool {
        self.max_abs_error == 0.0
    }
}

/// Compare the mixture at `mix` against the sum of `sources`.
pub fn verify_mixture(sources: &[PathBuf], mix: &Path) -> PipelineResult<MixtureCheck> {
    let (_, expected) = sum_sources(sources, mix)?;
    let (_, actual) = read_samples(mix)?;
    if actual.len() != expected.len() {
        return Err(PipelineError::MismatchedSources {
            path: mix.to_path_buf(),
            reason: format!(
                "mixture has {} frames, sources have {}",
                actual.len(),
                expected.len()
            ),
        });
    }
    let max_abs_error = actual
        .iter()
        .zip(&expected)
        .map(|(a, e)| (a - e).abs())
        .fold(0.0f32, f32::max);
    Ok(MixtureCheck {
        frames: actual.len(),
        max_abs_error,
    })
}

/// Read a mono WAV as samples normalized to full scale (-1.0..1.0).
pub fn read_samples(path: &Path) -> PipelineResult<(WavSpec, Vec<f32>)> {
    let mut reader = WavReader::open(path).map_err(|e| PipelineError::wav(path, e))?;
    let spec = reader.spec();
    if spec.channels != 1 {
        return Err(PipelineError::MismatchedSources {
            path: path.to_path_buf(),
            reason: format!("expected mono, found {} channels", spec.channels),
        });
    }
    let samples = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| PipelineError::wav(path, e))?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| PipelineError::wav(path, e))?
        }
    };
    Ok((spec, samples))
}

/// Read every source and sum them. All sources must share sample rate and
/// length; `target` only names the mixture in error messages.
fn sum_sources(sources: &[PathBuf], target: &Path) -> PipelineResult<(WavSpec, Vec<f32>)> {
    let mismatch = |reason: String| PipelineError::MismatchedSources {
        path: target.to_path_buf(),
        reason,
    };
    let Some((first, rest)) = sources.split_first() else {
        return Err(mismatch("no sources".into()));
    };

    let (spec, mut sum) = read_samples(first)?;
    for source in rest {
        let (other_spec, samples) = read_samples(source)?;
        if other_spec.sample_rate != spec.sample_rate {
            return Err(mismatch(format!(
                "{} is {} Hz, {} is {} Hz",
                source.display(),
                other_spec.sample_rate,
                first.display(),
                spec.sample_rate
            )));
        }
        if samples.len() != sum.len() {
            return Err(mismatch(format!(
                "{} has {} frames, {} has {}",
                source.display(),
                samples.len(),
                first.display(),
                sum.len()
            )));
        }
        for (acc, s) in sum.iter_mut().zip(samples) {
            *acc += s;
        }
    }
    Ok((spec, sum))
}
