// Audio rendering of one mutated voice through external tools.
//
// `FluidSynthRenderer` writes the voice as MIDI and runs two subprocesses:
//
//   fluidsynth --sample-rate=<sr> --reverb=no -ni -F <stereo.wav> <sf> <voice.mid>
//   sox <stereo.wav> -c 1 <mono.wav>
//
// Both executables are resolved once, at construction, through `which`; a
// missing tool or soundfont is reported before any score is touched. Each
// invocation is synchronous. stdout is discarded and stderr captured, so a
// failing tool surfaces as `ExternalToolFailure` with its own diagnostics.
//
// The `VoiceRenderer` trait is the seam for tests, which substitute a
// renderer that writes WAV files directly.

use crate::config::RenderConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::layout::OutputLayout;
use crate::midi::{MidiOptions, write_midi};
use crate::score::Voice;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

/// Renders a voice at a tempo to a mono WAV named after `stem`, returning
/// the path of that WAV.
pub trait VoiceRenderer: Send + Sync {
    fn render(&self, voice: &Voice, tempo_bpm: u16, stem: &str) -> PipelineResult<PathBuf>;
}

#[derive(Debug, Clone)]
pub struct FluidSynthRenderer {
    fluidsynth: PathBuf,
    sox: PathBuf,
    soundfont: PathBuf,
    sample_rate: u32,
    program: u8,
    velocity: u8,
    layout: OutputLayout,
}

impl FluidSynthRenderer {
    /// Resolve the tools and check the soundfont.
    pub fn new(config: &RenderConfig, layout: OutputLayout) -> PipelineResult<Self> {
        if !config.soundfont.is_file() {
            return Err(PipelineError::MissingSoundfont {
                path: config.soundfont.clone(),
            });
        }
        Ok(FluidSynthRenderer {
            fluidsynth: find_tool(&config.fluidsynth)?,
            sox: find_tool(&config.sox)?,
            soundfont: config.soundfont.clone(),
            sample_rate: config.sample_rate,
            program: config.program,
            velocity: config.velocity,
            layout,
        })
    }
}

impl VoiceRenderer for FluidSynthRenderer {
    fn render(&self, voice: &Voice, tempo_bpm: u16, stem: &str) -> PipelineResult<PathBuf> {
        let midi = self.layout.midi_path(stem);
        let stereo = self.layout.stereo_path(stem);
        let mono = self.layout.mono_path(stem);

        let options = MidiOptions {
            tempo_bpm,
            program: self.program,
            velocity: self.velocity,
            track_name: stem.to_string(),
        };
        write_midi(voice, &options, &midi)?;

        let mut synth = Command::new(&self.fluidsynth);
        synth
            .arg(format!("--sample-rate={}", self.sample_rate))
            .arg("--reverb=no")
            .arg("-ni")
            .arg("-F")
            .arg(&stereo)
            .arg(&self.soundfont)
            .arg(&midi);
        run_tool(&mut synth)?;

        let mut downmix = Command::new(&self.sox);
        downmix.arg(&stereo).arg("-c").arg("1").arg(&mono);
        run_tool(&mut downmix)?;
        Ok(mono)
    }
}

/// Resolve an executable by name through PATH, or accept it as a path.
pub fn find_tool(name: &str) -> PipelineResult<PathBuf> {
    which::which(name).map_err(|_| PipelineError::ToolNotFound {
        tool: name.to_string(),
    })
}

/// Run a command to completion, turning a non-zero exit into an error that
/// carries the tool's stderr.
pub fn run_tool(cmd: &mut Command) -> PipelineResult<()> {
    let tool = Path::new(cmd.get_program())
        .file_name()
        .map_or_else(|| cmd.get_program().to_string_lossy(), |n| n.to_string_lossy())
        .into_owned();
    debug!(tool = %tool, args = ?cmd.get_args().collect::<Vec<_>>(), "running");

    let output = cmd
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|source| PipelineError::Spawn {
            tool: tool.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(PipelineError::ExternalToolFailure {
            tool,
            // Killed by a signal: no code.
            exit_code: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_soundfont_reported_first() {
        let config = RenderConfig {
            soundfont: PathBuf::from("/nonexistent/voices.sf2"),
            fluidsynth: "definitely-not-a-real-synth".into(),
            ..Default::default()
        };
        let err = FluidSynthRenderer::new(&config, OutputLayout::new("out")).unwrap_err();
        assert!(matches!(err, PipelineError::MissingSoundfont { .. }), "{err}");
    }

    #[test]
    fn test_missing_tool() {
        let sf = tempfile::NamedTempFile::new().unwrap();
        let config = RenderConfig {
            soundfont: sf.path().to_path_buf(),
            fluidsynth: "definitely-not-a-real-synth".into(),
            ..Default::default()
        };
        let err = FluidSynthRenderer::new(&config, OutputLayout::new("out")).unwrap_err();
        match err {
            PipelineError::ToolNotFound { tool } => assert_eq!(tool, "definitely-not-a-real-synth"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_run_tool_success() {
        run_tool(&mut Command::new("true")).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_run_tool_failure_captures_stderr() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo broken soundfont >&2; exit 3");
        match run_tool(&mut cmd) {
            Err(PipelineError::ExternalToolFailure {
                tool,
                exit_code,
                stderr,
            }) => {
                assert_eq!(tool, "sh");
                assert_eq!(exit_code, 3);
                assert_eq!(stderr, "broken soundfont");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_spawn_failure() {
        let mut cmd = Command::new("/nonexistent/bin/fluidsynth");
        assert!(matches!(
            run_tool(&mut cmd),
            Err(PipelineError::Spawn { .. })
        ));
    }
}
