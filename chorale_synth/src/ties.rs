// Tie repair around a note that is about to be removed or replaced.
//
// When a tied note disappears (split out of a silenced beat, or dropped and
// replaced by a rest), its tie partners would point at nothing. Before the
// note goes, its neighbors are rewritten so every surviving tied group is
// still a contiguous `Start, Continue*, End` run:
//
//   predecessor (if the note ties back):   Start -> None,  Continue -> End
//   follower    (if the note ties forward): End   -> None,  Continue -> Start
//
// A `Continue` note repairs both sides. Neighbors are the nearest notes in
// time; in a valid voice the tie partner is always directly adjacent.

use crate::error::EngineError;
use crate::score::{Event, Tie, Voice};

/// Fix the tie state of the notes around `index` so that removing or
/// replacing the note at `index` leaves no dangling tie.
///
/// A note with `Tie::None` needs nothing. A missing neighbor at the edge of
/// the voice is left alone. A neighbor that exists but does not tie back to
/// this note is a corrupt voice and is reported as `DanglingTie`.
pub fn repair_ties_around(voice: &mut Voice, index: usize) -> Result<(), EngineError> {
    let event = *voice.event(index)?;
    let Event::Note { tie, .. } = event else {
        return Err(EngineError::NotANote { index });
    };
    if tie == Tie::None {
        return Ok(());
    }

    if tie.ties_back() {
        if let Some(prev) = voice.previous_note(index) {
            let repaired = match voice.events()[prev].tie() {
                Tie::Start => Tie::None,
                Tie::Continue => Tie::End,
                Tie::None | Tie::End => {
                    return Err(EngineError::DanglingTie {
                        index,
                        start: event.start(),
                        reason: "predecessor is not tied forward",
                    });
                }
            };
            voice.set_tie(prev, repaired)?;
        }
    }

    if tie.ties_forward() {
        if let Some(next) = voice.next_note(index) {
            let repaired = match voice.events()[next].tie() {
                Tie::End => Tie::None,
                Tie::Continue => Tie::Start,
                Tie::None | Tie::Start => {
                    return Err(EngineError::DanglingTie {
                        index,
                        start: event.start(),
                        reason: "follower is not tied back",
                    });
                }
            };
            voice.set_tie(next, repaired)?;
        }
    }

    Ok(())
}
