// On-disk layout of the generated dataset.
//
//   <root>/midi/chorale_007_soprano.mid
//   <root>/audio_stereo/chorale_007_soprano.wav
//   <root>/audio_mono/chorale_007_soprano.wav
//   <root>/mix/chorale_007_mix.wav
//
// Stems are zero-padded to three digits so directory listings sort by
// catalogue number.

use crate::error::{PipelineError, PipelineResult};
use crate::score::Part;
use std::path::PathBuf;

/// Stem shared by every file of one score: `chorale_007`.
pub fn score_stem(number: u32) -> String {
    format!("chorale_{number:03}")
}

/// Stem of one part's files: `chorale_007_soprano`.
pub fn part_stem(number: u32, part: Part) -> String {
    format!("{}_{}", score_stem(number), part.stem())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        OutputLayout { root: root.into() }
    }

    pub fn midi_dir(&self) -> PathBuf {
        self.root.join("midi")
    }

    pub fn stereo_dir(&self) -> PathBuf {
        self.root.join("audio_stereo")
    }

    pub fn mono_dir(&self) -> PathBuf {
        self.root.join("audio_mono")
    }

    pub fn mix_dir(&self) -> PathBuf {
        self.root.join("mix")
    }

    /// Create every output directory. Existing directories are fine.
    pub fn create_dirs(&self) -> PipelineResult<()> {
        for dir in [
            self.midi_dir(),
            self.stereo_dir(),
            self.mono_dir(),
            self.mix_dir(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| PipelineError::io(&dir, e))?;
        }
        Ok(())
    }

    pub fn midi_path(&self, stem: &str) -> PathBuf {
        self.midi_dir().join(format!("{stem}.mid"))
    }

    pub fn stereo_path(&self, stem: &str) -> PathBuf {
        self.stereo_dir().join(format!("{stem}.wav"))
    }

    pub fn mono_path(&self, stem: &str) -> PathBuf {
        self.mono_dir().join(format!("{stem}.wav"))
    }

    pub fn mix_path(&self, number: u32) -> PathBuf {
        self.mix_dir()
            .join(format!("{}_mix.wav", score_stem(number)))
    }
}
