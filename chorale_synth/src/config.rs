// Data-driven pipeline configuration.
//
// Every tunable lives in `SynthConfig`, which can be loaded from a JSON file
// and then overridden from the command line. All fields have defaults that
// reproduce the reference dataset: seed 1337, tempi 70-100 BPM in steps of 5,
// every 8th beat silenced starting at beat 7, a tenth of the notes dropped,
// FluidSynth at 22050 Hz with reverb off, and the vocalist timbre.
//
// Determinism: two runs with identical configs and the same corpus produce
// identical datasets. The seed and the mutation parameters are the only
// inputs to the random decisions.

use crate::error::{PipelineError, PipelineResult};
use crate::score::Part;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Parameters of the two mutation stages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationConfig {
    /// First beat (zero-indexed, from the start of the voice) turned into a
    /// breath.
    pub breath_first_beat: u32,
    /// Beats between consecutive breaths.
    pub breath_stride: u32,
    /// Trailing whole beats that no breath window may start in or cover.
    pub protected_tail_beats: u32,
    /// One note in `dropout_divisor` is replaced by a rest.
    pub dropout_divisor: usize,
    /// The last notes of the voice, by count, that dropout never selects.
    pub protected_tail_notes: usize,
}

impl Default for MutationConfig {
    fn default() -> Self {
        MutationConfig {
            breath_first_beat: 7,
            breath_stride: 8,
            protected_tail_beats: 2,
            dropout_divisor: 10,
            protected_tail_notes: 2,
        }
    }
}

/// Tempo drawn per score: `min + step * k` for `k` uniform in `0..=steps`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoConfig {
    pub min: u16,
    pub step: u16,
    pub steps: u16,
}

impl Default for TempoConfig {
    fn default() -> Self {
        TempoConfig {
            min: 70,
            step: 5,
            steps: 6,
        }
    }
}

impl TempoConfig {
    pub fn max(&self) -> u32 {
        u32::from(self.min) + u32::from(self.step) * u32::from(self.steps)
    }
}

/// External synthesizer settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// FluidSynth executable, by name (looked up in PATH) or path.
    pub fluidsynth: String,
    /// SoX executable, by name or path. Used for down-mixing and mixing.
    pub sox: String,
    pub soundfont: PathBuf,
    pub sample_rate: u32,
    /// General MIDI program number (0-based). 53 is "Voice Oohs".
    pub program: u8,
    pub velocity: u8,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            fluidsynth: "fluidsynth".to_string(),
            sox: "sox".to_string(),
            soundfont: PathBuf::from("MuseScore_General.sf3"),
            sample_rate: 22050,
            program: 53,
            velocity: 80,
        }
    }
}

/// Top-level configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    /// Base seed; each score derives its own generator from it.
    pub seed: u64,
    pub corpus_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Worker threads for processing scores in parallel.
    pub jobs: usize,
    pub parts_to_synthesize: Vec<Part>,
    pub parts_to_mix: Vec<Part>,
    pub tempo: TempoConfig,
    pub mutation: MutationConfig,
    pub render: RenderConfig,
}

impl Default for SynthConfig {
    fn default() -> Self {
        SynthConfig {
            seed: 1337,
            corpus_dir: PathBuf::from("corpus"),
            output_dir: PathBuf::from("chorales_synth"),
            jobs: 1,
            parts_to_synthesize: Part::ALL.to_vec(),
            parts_to_mix: Part::ALL.to_vec(),
            tempo: TempoConfig::default(),
            mutation: MutationConfig::default(),
            render: RenderConfig::default(),
        }
    }
}

impl SynthConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> PipelineResult<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        serde_json::from_str(&data).map_err(|source| PipelineError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> PipelineResult<()> {
        let invalid = |msg: String| -> PipelineResult<()> { Err(PipelineError::InvalidConfig(msg)) };
        if self.mutation.breath_stride == 0 {
            return invalid("mutation.breath_stride must be positive".into());
        }
        if self.mutation.dropout_divisor == 0 {
            return invalid("mutation.dropout_divisor must be positive".into());
        }
        if self.jobs == 0 {
            return invalid("jobs must be at least 1".into());
        }
        if self.tempo.min == 0 {
            return invalid("tempo.min must be positive".into());
        }
        if self.tempo.max() > u32::from(u16::MAX) {
            return invalid(format!(
                "tempo range tops out at {} BPM, above {}",
                self.tempo.max(),
                u16::MAX
            ));
        }
        if self.parts_to_synthesize.is_empty() {
            return invalid("parts_to_synthesize is empty".into());
        }
        if self.parts_to_mix.is_empty() {
            return invalid("parts_to_mix is empty".into());
        }
        if let Some(p) = self
            .parts_to_mix
            .iter()
            .find(|p| !self.parts_to_synthesize.contains(p))
        {
            return invalid(format!("part {p} is mixed but never synthesized"));
        }
        Ok(())
    }
}
