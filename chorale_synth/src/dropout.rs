// Random note dropout: a seeded sample of notes becomes silence.
//
// `n / dropout_divisor` notes (a tenth by default) are replaced by rests of
// the same span. Candidates are the notes in temporal order minus the last
// `protected_tail_notes`; the count is taken over all notes. The sample comes
// from the caller's `ChoraleRng`, so the same seed and the same voice always
// drop the same notes.
//
// Tail protection here counts notes, not beats. A voice ending in several
// short notes can still lose a note inside its final two beats. That is a
// known looseness, kept as is: dropout never changes total duration anyway.

use crate::config::MutationConfig;
use crate::error::EngineError;
use crate::score::{Event, Voice};
use crate::ties::repair_ties_around;
use chorale_prng::ChoraleRng;

/// What dropout did to one voice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DropoutReport {
    /// Notes in the voice before dropout.
    pub note_count: usize,
    /// Ordinals (position among notes, not among events) of the dropped
    /// notes, in the order they were drawn.
    pub dropped: Vec<usize>,
}

/// Replace a seeded random sample of notes with rests.
pub fn drop_notes(
    voice: &mut Voice,
    config: &MutationConfig,
    rng: &mut ChoraleRng,
) -> Result<DropoutReport, EngineError> {
    let notes = voice.note_indices();
    let note_count = notes.len();
    let eligible = note_count.saturating_sub(config.protected_tail_notes);
    let k = (note_count / config.dropout_divisor.max(1)).min(eligible);

    let dropped = rng.sample_indices(eligible, k);
    for &ordinal in &dropped {
        drop_note(voice, notes[ordinal])?;
    }

    Ok(DropoutReport {
        note_count,
        dropped,
    })
}

/// Replace the note at `index` with a rest of identical span, repairing the
/// ties of its neighbors first.
pub fn drop_note(voice: &mut Voice, index: usize) -> Result<(), EngineError> {
    repair_ties_around(voice, index)?;
    let note = *voice.event(index)?;
    voice.replace(index, Event::rest(note.start(), note.duration()))?;
    Ok(())
}
