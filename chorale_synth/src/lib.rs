// Chorale Synth
//
// Builds a dataset of synthetic multi-track chorale recordings for training
// source-separation models. Each four-part score is split into its voices;
// each voice is perturbed (periodic one-beat breaths, a seeded tenth of its
// notes dropped), rendered to mono audio with a vocal timbre, and the parts
// are summed unscaled into a mixture, so the stems add up exactly to the mix.
//
// Architecture:
// - score.rs: Event model (voices as tick-timed note/rest lists over measures,
//   ties, insertion by measure and beat, invariant checks) and score files
// - ties.rs: Tie repair around a note about to be removed or replaced
// - breaths.rs: Beat silencer (periodic rest windows, note splitting)
// - dropout.rs: Seeded random note dropout with tail protection
// - midi.rs: SMF encoding of a mutated voice
// - render.rs: Rendering adapter (FluidSynth + SoX down-mix) behind a trait
// - mix.rs: Unscaled mixing (SoX or in-process) and mixture verification
// - corpus.rs: Score discovery and loading, part-set validation
// - layout.rs: Output directory layout and file naming
// - pipeline.rs: Per-score driver and the parallel batch runner
// - config.rs: Data-driven configuration with defaults
// - error.rs: Engine and pipeline error types
//
// Mutation is deterministic given a seed: every score derives its own
// generator from (seed, score number), so results do not depend on the order
// or the parallelism in which scores are processed.

pub mod breaths;
pub mod config;
pub mod corpus;
pub mod dropout;
pub mod error;
pub mod layout;
pub mod midi;
pub mod mix;
pub mod pipeline;
pub mod render;
pub mod score;
pub mod ties;
