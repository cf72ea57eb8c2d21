// Error types for the mutation engine and the dataset pipeline.
//
// `EngineError` covers precondition violations inside the score mutation
// engine: overlapping inserts, coverage gaps, dangling ties. These are
// programmer errors or corrupt input; the voice being mutated is abandoned
// and never handed to the renderer.
//
// `PipelineError` wraps everything around the engine: corpus loading,
// external tool invocation, WAV I/O. Exactly one variant,
// `SkippableInputMismatch`, is a soft failure that the batch driver logs and
// skips; everything else aborts the score it occurred in.

use crate::score::{Part, Ticks};
use std::path::PathBuf;
use thiserror::Error;

/// Precondition violations of the score mutation engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error(
        "event at tick {start} (duration {duration}) overlaps existing event at {existing_start}..{existing_end}"
    )]
    Overlap {
        start: Ticks,
        duration: Ticks,
        existing_start: Ticks,
        existing_end: Ticks,
    },

    #[error("events leave a gap between tick {from} and tick {to}")]
    CoverageGap { from: Ticks, to: Ticks },

    #[error("tick {offset} is outside the voice (total duration {total})")]
    OffsetOutOfRange { offset: Ticks, total: Ticks },

    #[error("measure index {index} out of range ({count} measures)")]
    MeasureOutOfRange { index: usize, count: usize },

    #[error("beat offset {beat_offset} lies outside measure {number} (duration {duration})")]
    BeatOutsideMeasure {
        number: u32,
        beat_offset: Ticks,
        duration: Ticks,
    },

    #[error("event index {index} out of range ({len} events)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("event at tick {start} has zero duration")]
    ZeroDuration { start: Ticks },

    #[error("measures do not partition the voice: {reason}")]
    InvalidMeasures { reason: String },

    #[error(
        "replacement {start}+{duration} does not match the span {expected_start}+{expected_duration} of event {index}"
    )]
    SpanMismatch {
        index: usize,
        start: Ticks,
        duration: Ticks,
        expected_start: Ticks,
        expected_duration: Ticks,
    },

    #[error("event {index} is not a note")]
    NotANote { index: usize },

    #[error("dangling tie on note {index} at tick {start}: {reason}")]
    DanglingTie {
        index: usize,
        start: Ticks,
        reason: &'static str,
    },

    #[error("total duration changed from {before} to {after} ticks")]
    DurationChanged { before: Ticks, after: Ticks },
}

/// Result alias for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors raised while loading, mutating, rendering, or mixing a score.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The score's voice set differs from the expected four parts.
    #[error("score {number} skipped: expected parts Soprano, Alto, Tenor, Bass, found {found:?}")]
    SkippableInputMismatch { number: u32, found: Vec<String> },

    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The parts of a score do not all last equally long, so their stems
    /// could not be mixed sample for sample.
    #[error("score {number} has parts of unequal length (ticks): {durations:?}")]
    UnequalPartDurations {
        number: u32,
        durations: Vec<(Part, Ticks)>,
    },

    #[error("{tool} not found in PATH; install it or set its path in the config")]
    ToolNotFound { tool: String },

    #[error("soundfont not found at {}", path.display())]
    MissingSoundfont { path: PathBuf },

    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with status {exit_code}: {stderr}")]
    ExternalToolFailure {
        tool: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to scan corpus: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("failed to encode MIDI for {}: {source}", path.display())]
    Midi {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("WAV error on {}: {source}", path.display())]
    Wav {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("cannot mix {}: {reason}", path.display())]
    MismatchedSources { path: PathBuf, reason: String },

    #[error("no score numbered {number} in the corpus")]
    ScoreNotFound { number: u32 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn wav(path: impl Into<PathBuf>, source: hound::Error) -> Self {
        PipelineError::Wav {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unequal_durations_message_lists_parts() {
        let err = PipelineError::UnequalPartDurations {
            number: 3,
            durations: vec![(Part::Soprano, 960), (Part::Bass, 480)],
        };
        assert_eq!(
            err.to_string(),
            "score 3 has parts of unequal length (ticks): [(Soprano, 960), (Bass, 480)]"
        );
    }

    #[test]
    fn test_tool_failure_message_carries_stderr() {
        let err = PipelineError::ExternalToolFailure {
            tool: "fluidsynth".into(),
            exit_code: 1,
            stderr: "cannot load soundfont".into(),
        };
        assert_eq!(
            err.to_string(),
            "fluidsynth exited with status 1: cannot load soundfont"
        );
    }
}
