// Beat silencer: periodic one-beat "breaths" cut into a voice.
//
// Every `breath_stride`-th beat, starting at `breath_first_beat`, becomes a
// rest. With the defaults that is beats 7, 15, 23, ... counted in quarter
// notes from the start of the voice. Windows never start in the final
// `protected_tail_beats` whole beats, so the end of every voice is left
// exactly as written and all parts of a score keep the same rendered length.
//
// Per window `[ws, we)`:
// 1. Every event intersecting the window (half-open: events that only touch
//    an edge stay put) is taken out. Tied notes get their neighbors repaired
//    first, in temporal order, so a tie into the silenced beat cannot dangle.
// 2. Whatever stuck out before `ws` or after `we` goes back in as an untied
//    fragment of the same pitch (or a shorter rest).
// 3. A one-beat rest fills the window.
// Removing before inserting keeps the event list overlap-free at every step;
// the net effect equals inserting the rest first and then splitting.

use crate::config::MutationConfig;
use crate::error::EngineError;
use crate::score::{Event, TICKS_PER_BEAT, Ticks, Voice};
use crate::ties::repair_ties_around;
use std::ops::Range;

/// What the silencer did to one voice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BreathReport {
    /// The silenced windows, in ticks.
    pub windows: Vec<Range<Ticks>>,
    /// Notes that stuck out of a window and survive as fragments.
    pub split_notes: usize,
    /// Notes removed from windows, including the split ones.
    pub removed_notes: usize,
}

/// The breath windows for a voice of the given total duration.
pub fn breath_windows(total: Ticks, config: &MutationConfig) -> Vec<Range<Ticks>> {
    let last = (total / TICKS_PER_BEAT).saturating_sub(config.protected_tail_beats);
    (config.breath_first_beat..last)
        .step_by(config.breath_stride.max(1) as usize)
        .map(|beat| beat * TICKS_PER_BEAT..(beat + 1) * TICKS_PER_BEAT)
        .collect()
}

/// Silence every breath window of `voice`.
pub fn add_breaths(voice: &mut Voice, config: &MutationConfig) -> Result<BreathReport, EngineError> {
    let mut report = BreathReport::default();
    for window in breath_windows(voice.total_duration(), config) {
        let (split, removed) = silence_window(voice, window.clone())?;
        report.split_notes += split;
        report.removed_notes += removed;
        report.windows.push(window);
    }
    Ok(report)
}

/// Turn `window` into a single rest, splitting any note that crosses its
/// edges. Returns `(split_notes, removed_notes)`.
pub fn silence_window(voice: &mut Voice, window: Range<Ticks>) -> Result<(usize, usize), EngineError> {
    let hits = voice.overlapping(window.start, window.end);

    for index in hits.clone() {
        if voice.event(index)?.is_note() {
            repair_ties_around(voice, index)?;
        }
    }

    let mut cleared = Vec::with_capacity(hits.len());
    for _ in hits.clone() {
        cleared.push(voice.remove(hits.start)?);
    }

    let mut fills = Vec::with_capacity(3);
    let mut split_notes = 0;
    if let Some(first) = cleared.first() {
        if first.start() < window.start {
            fills.push(first.fragment(first.start(), window.start));
            split_notes += usize::from(first.is_note());
        }
    }
    fills.push(Event::rest(window.start, window.end - window.start));
    if let Some(last) = cleared.last() {
        if last.end() > window.end {
            fills.push(last.fragment(window.end, last.end()));
            // A single note spanning the whole window counts once.
            let same_as_first = cleared.len() == 1 && last.start() < window.start;
            if last.is_note() && !same_as_first {
                split_notes += 1;
            }
        }
    }

    for event in fills {
        let (measure, beat_offset) = voice.measure_and_beat_at(event.start())?;
        voice.insert_at(measure, beat_offset, event)?;
    }

    let removed_notes = cleared.iter().filter(|e| e.is_note()).count();
    Ok((split_notes, removed_notes))
}
