// Dataset driver: corpus in, per-part stems and mixtures out.
//
// For each score:
//   1. Check the part set (mismatch -> skipped, not failed) and that every
//      part lasts equally long (mismatch -> failed, before any rendering).
//   2. Derive the score's generator from (seed, score number) and draw a
//      tempo from it.
//   3. For each part to synthesize: clone the voice, cut breaths, drop
//      notes, re-check every invariant and the total duration, render.
//   4. Mix the parts to mix into one mixture.
//
// Scores run in parallel on a rayon pool of `jobs` threads. Because every
// score owns its generator, the output is the same for any job count and any
// scheduling order. Within a score the generator is consumed in a fixed
// order: tempo, then parts in `parts_to_synthesize` order.
//
// A mutation engine error abandons the score before anything of that voice
// is rendered; no partially mutated voice ever reaches the renderer.

use crate::breaths::{BreathReport, add_breaths};
use crate::config::{MutationConfig, SynthConfig, TempoConfig};
use crate::corpus::{find_score, load_score, score_paths, validate_parts};
use crate::dropout::{DropoutReport, drop_notes};
use crate::error::{EngineError, PipelineError, PipelineResult};
use crate::layout::{OutputLayout, part_stem};
use crate::mix::{Mixer, MixtureCheck, SoxMixer, verify_mixture};
use crate::render::{FluidSynthRenderer, VoiceRenderer};
use crate::score::{Part, Score, Ticks, Voice};
use chorale_prng::ChoraleRng;
use rayon::prelude::*;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// A voice after both mutation stages, with what each stage did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutatedVoice {
    pub voice: Voice,
    pub breaths: BreathReport,
    pub dropout: DropoutReport,
}

/// Run the mutation engine on a copy of `voice`: breaths, then dropout.
///
/// The input is left untouched. Every invariant is re-checked after each
/// stage, and a change in total duration is an error.
pub fn mutate_voice(
    voice: &Voice,
    config: &MutationConfig,
    rng: &mut ChoraleRng,
) -> Result<MutatedVoice, EngineError> {
    let before = voice.total_duration();
    let mut voice = voice.clone();

    let breaths = add_breaths(&mut voice, config)?;
    check_stage(&voice, before)?;

    let dropout = drop_notes(&mut voice, config, rng)?;
    check_stage(&voice, before)?;

    Ok(MutatedVoice {
        voice,
        breaths,
        dropout,
    })
}

fn check_stage(voice: &Voice, before: Ticks) -> Result<(), EngineError> {
    voice.check_invariants()?;
    let after = voice.covered_duration();
    if after != before || voice.total_duration() != before {
        return Err(EngineError::DurationChanged { before, after });
    }
    Ok(())
}

/// Draw a tempo uniformly from `min, min + step, ..., min + step * steps`.
pub fn draw_tempo(config: &TempoConfig, rng: &mut ChoraleRng) -> u16 {
    let k = rng.range_usize_inclusive(0, usize::from(config.steps)) as u16;
    config.min + config.step * k
}

/// One rendered part of a score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartOutcome {
    pub part: Part,
    pub mono: PathBuf,
    pub breaths: usize,
    pub dropped: usize,
}

/// Everything produced for one score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreOutcome {
    pub number: u32,
    pub tempo_bpm: u16,
    pub parts: Vec<PartOutcome>,
    pub mixture: PathBuf,
}

/// Tally of a batch run, in corpus order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub rendered: Vec<u32>,
    pub skipped: Vec<u32>,
    /// Score file and the error that stopped it.
    pub failed: Vec<(PathBuf, String)>,
}

impl BatchSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Pipeline {
    config: SynthConfig,
    layout: OutputLayout,
    renderer: Box<dyn VoiceRenderer>,
    mixer: Box<dyn Mixer>,
}

impl Pipeline {
    /// Validate the config and create the output directories.
    pub fn new(
        config: SynthConfig,
        renderer: Box<dyn VoiceRenderer>,
        mixer: Box<dyn Mixer>,
    ) -> PipelineResult<Self> {
        config.validate()?;
        let layout = OutputLayout::new(&config.output_dir);
        layout.create_dirs()?;
        Ok(Pipeline {
            config,
            layout,
            renderer,
            mixer,
        })
    }

    /// A pipeline rendering with FluidSynth and mixing with SoX.
    pub fn with_external_tools(config: SynthConfig) -> PipelineResult<Self> {
        let layout = OutputLayout::new(&config.output_dir);
        let renderer = FluidSynthRenderer::new(&config.render, layout)?;
        let mixer = SoxMixer::new(&config.render.sox)?;
        Pipeline::new(config, Box::new(renderer), Box::new(mixer))
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Mutate, render and mix one score.
    pub fn synthesize_score(&self, score: &Score) -> PipelineResult<ScoreOutcome> {
        validate_parts(score)?;
        check_equal_durations(score, &self.config.parts_to_synthesize)?;
        let number = score.number;
        let mut rng = ChoraleRng::for_stream(self.config.seed, u64::from(number));
        let tempo_bpm = draw_tempo(&self.config.tempo, &mut rng);
        info!(score = number, tempo_bpm, "synthesizing");

        let mut parts = Vec::with_capacity(self.config.parts_to_synthesize.len());
        for &part in &self.config.parts_to_synthesize {
            let voice = score
                .voice(part)
                .ok_or_else(|| PipelineError::SkippableInputMismatch {
                    number,
                    found: score.parts.iter().map(|p| p.id.clone()).collect(),
                })?;
            let mutated = mutate_voice(voice, &self.config.mutation, &mut rng)?;
            debug!(
                score = number,
                part = %part,
                windows = mutated.breaths.windows.len(),
                split = mutated.breaths.split_notes,
                silenced = mutated.breaths.removed_notes,
                notes = mutated.dropout.note_count,
                dropped = ?mutated.dropout.dropped,
                "mutated"
            );

            let mono = self
                .renderer
                .render(&mutated.voice, tempo_bpm, &part_stem(number, part))?;
            info!(score = number, part = %part, path = %mono.display(), "synthesized");
            parts.push(PartOutcome {
                part,
                mono,
                breaths: mutated.breaths.windows.len(),
                dropped: mutated.dropout.dropped.len(),
            });
        }

        let sources: Vec<PathBuf> = self
            .config
            .parts_to_mix
            .iter()
            .filter_map(|p| parts.iter().find(|o| o.part == *p))
            .map(|o| o.mono.clone())
            .collect();
        let mixture = self.layout.mix_path(number);
        self.mixer.mix(&sources, &mixture)?;
        info!(score = number, path = %mixture.display(), "mixed");

        Ok(ScoreOutcome {
            number,
            tempo_bpm,
            parts,
            mixture,
        })
    }

    /// Look up one score by catalogue number and synthesize it.
    pub fn synthesize_single(&self, number: u32) -> PipelineResult<ScoreOutcome> {
        let score = find_score(&self.config.corpus_dir, number)?;
        self.synthesize_score(&score)
    }

    /// Synthesize every score in the corpus on a pool of `jobs` threads.
    ///
    /// Per-score failures are logged and collected; only a corpus that cannot
    /// be listed or a pool that cannot be built fails the whole call.
    pub fn synthesize_all(&self) -> PipelineResult<BatchSummary> {
        let paths = score_paths(&self.config.corpus_dir)?;
        info!(
            scores = paths.len(),
            jobs = self.config.jobs,
            corpus = %self.config.corpus_dir.display(),
            "starting batch"
        );
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.jobs)
            .build()?;
        let results: Vec<PipelineResult<ScoreOutcome>> = pool.install(|| {
            paths
                .par_iter()
                .map(|path| load_score(path).and_then(|score| self.synthesize_score(&score)))
                .collect()
        });

        let mut summary = BatchSummary::default();
        for (path, result) in paths.into_iter().zip(results) {
            match result {
                Ok(outcome) => summary.rendered.push(outcome.number),
                Err(PipelineError::SkippableInputMismatch { number, found }) => {
                    warn!(score = number, ?found, "skipping score with unexpected parts");
                    summary.skipped.push(number);
                }
                Err(e) => {
                    error!(path = %path.display(), error = %e, "score failed");
                    summary.failed.push((path, e.to_string()));
                }
            }
        }
        info!(
            rendered = summary.rendered.len(),
            skipped = summary.skipped.len(),
            failed = summary.failed.len(),
            "batch finished"
        );
        Ok(summary)
    }

    /// Compare a rendered score's mixture with the sum of its mixed parts.
    pub fn verify_score(&self, number: u32) -> PipelineResult<MixtureCheck> {
        verify_rendered(&self.layout, &self.config.parts_to_mix, number)
    }
}

/// Check a score already on disk under `layout`: its mixture against the
/// sum of the mono stems of `parts`. Needs no external tools.
pub fn verify_rendered(
    layout: &OutputLayout,
    parts: &[Part],
    number: u32,
) -> PipelineResult<MixtureCheck> {
    let sources: Vec<PathBuf> = parts
        .iter()
        .map(|&p| layout.mono_path(&part_stem(number, p)))
        .collect();
    verify_mixture(&sources, &layout.mix_path(number))
}

/// Every part to be rendered must last exactly as long as the others, or
/// the stems cannot be summed into a mixture.
fn check_equal_durations(score: &Score, parts: &[Part]) -> PipelineResult<()> {
    let durations: Vec<(Part, Ticks)> = parts
        .iter()
        .filter_map(|&p| score.voice(p).map(|v| (p, v.total_duration())))
        .collect();
    if durations.windows(2).any(|w| w[0].1 != w[1].1) {
        return Err(PipelineError::UnequalPartDurations {
            number: score.number,
            durations,
        });
    }
    Ok(())
}
