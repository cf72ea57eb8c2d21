// The event model: one voice of a score as an ordered list of notes and rests.
//
// A `Voice` holds two parallel structures over the same time span:
// - `events`: notes and rests, sorted by start, pairwise non-overlapping, and
//   together covering `[0, total_duration)` with no gaps.
// - `measures`: a contiguous partition of the same span, used to address
//   insertions as (measure, offset within measure), the way notation does.
//
// Time is measured in MIDI ticks at `TICKS_PER_BEAT` per quarter-note beat.
// Integer ticks keep duration bookkeeping exact: every mutation must leave the
// total duration of a voice unchanged, and with integers that is an equality
// test rather than a tolerance.
//
// Everything here is addressed by index into the event list. Tie repair and
// note splitting (ties.rs, breaths.rs, dropout.rs) work on positions, and the
// primitives below (`insert_at`, `remove`, `replace`) are the only ways to
// change the list. `check_invariants` re-verifies coverage and tie structure
// after a mutation stage.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::fmt::Write;
use std::ops::Range;
use std::str::FromStr;

/// Time in MIDI ticks.
pub type Ticks = u32;

/// Ticks per quarter-note beat. 480 = 2^5 * 3 * 5, so dotted values,
/// triplets and quintuplets all land on whole ticks.
pub const TICKS_PER_BEAT: Ticks = 480;

/// Convert a whole number of beats to ticks.
pub const fn beats(n: u32) -> Ticks {
    n * TICKS_PER_BEAT
}

/// The four voice parts of a chorale, in score order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Part {
    Soprano,
    Alto,
    Tenor,
    Bass,
}

impl Part {
    pub const ALL: [Part; 4] = [Part::Soprano, Part::Alto, Part::Tenor, Part::Bass];

    /// Part id as it appears in score files.
    pub fn name(self) -> &'static str {
        match self {
            Part::Soprano => "Soprano",
            Part::Alto => "Alto",
            Part::Tenor => "Tenor",
            Part::Bass => "Bass",
        }
    }

    /// Lowercase form used in output file names.
    pub fn stem(self) -> &'static str {
        match self {
            Part::Soprano => "soprano",
            Part::Alto => "alto",
            Part::Tenor => "tenor",
            Part::Bass => "bass",
        }
    }

    /// Case-insensitive lookup by name.
    pub fn from_name(name: &str) -> Option<Part> {
        Part::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Part {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Part::from_name(s).ok_or_else(|| format!("unknown part '{s}'"))
    }
}

/// Tie state of a note.
///
/// A tied group is a contiguous run `Start, Continue*, End` of notes with the
/// same pitch. `None` is a standalone note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tie {
    #[default]
    None,
    Start,
    Continue,
    End,
}

impl Tie {
    /// Tied to the following note.
    pub fn ties_forward(self) -> bool {
        matches!(self, Tie::Start | Tie::Continue)
    }

    /// Tied to the preceding note.
    pub fn ties_back(self) -> bool {
        matches!(self, Tie::Continue | Tie::End)
    }
}

/// A note or a rest with its span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Note {
        /// MIDI pitch number.
        pitch: u8,
        start: Ticks,
        duration: Ticks,
        #[serde(default)]
        tie: Tie,
    },
    Rest {
        start: Ticks,
        duration: Ticks,
    },
}

impl Event {
    pub fn note(pitch: u8, start: Ticks, duration: Ticks) -> Self {
        Event::Note {
            pitch,
            start,
            duration,
            tie: Tie::None,
        }
    }

    pub fn tied_note(pitch: u8, start: Ticks, duration: Ticks, tie: Tie) -> Self {
        Event::Note {
            pitch,
            start,
            duration,
            tie,
        }
    }

    pub fn rest(start: Ticks, duration: Ticks) -> Self {
        Event::Rest { start, duration }
    }

    pub fn start(&self) -> Ticks {
        match *self {
            Event::Note { start, .. } | Event::Rest { start, .. } => start,
        }
    }

    pub fn duration(&self) -> Ticks {
        match *self {
            Event::Note { duration, .. } | Event::Rest { duration, .. } => duration,
        }
    }

    pub fn end(&self) -> Ticks {
        self.start() + self.duration()
    }

    pub fn is_note(&self) -> bool {
        matches!(self, Event::Note { .. })
    }

    pub fn pitch(&self) -> Option<u8> {
        match *self {
            Event::Note { pitch, .. } => Some(pitch),
            Event::Rest { .. } => None,
        }
    }

    /// Tie state; rests are never tied.
    pub fn tie(&self) -> Tie {
        match *self {
            Event::Note { tie, .. } => tie,
            Event::Rest { .. } => Tie::None,
        }
    }

    /// A copy of this event cut to `[start, end)`, with any tie cleared.
    pub fn fragment(&self, start: Ticks, end: Ticks) -> Event {
        debug_assert!(start < end);
        match *self {
            Event::Note { pitch, .. } => Event::note(pitch, start, end - start),
            Event::Rest { .. } => Event::rest(start, end - start),
        }
    }

    fn moved_to(self, start: Ticks) -> Event {
        match self {
            Event::Note {
                pitch,
                duration,
                tie,
                ..
            } => Event::Note {
                pitch,
                start,
                duration,
                tie,
            },
            Event::Rest { duration, .. } => Event::Rest { start, duration },
        }
    }
}

/// A measure: a contiguous window of the voice used for insertion addressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measure {
    /// Measure number as printed (0 for a pickup measure).
    pub number: u32,
    pub start: Ticks,
    pub duration: Ticks,
}

impl Measure {
    pub fn end(&self) -> Ticks {
        self.start + self.duration
    }
}

/// One voice part: measures plus a gap-free, non-overlapping event list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "VoiceData", into = "VoiceData")]
pub struct Voice {
    measures: Vec<Measure>,
    events: Vec<Event>,
}

/// Unvalidated serialized form of a `Voice`.
#[derive(Serialize, Deserialize)]
struct VoiceData {
    measures: Vec<Measure>,
    events: Vec<Event>,
}

impl TryFrom<VoiceData> for Voice {
    type Error = EngineError;

    fn try_from(data: VoiceData) -> Result<Self, Self::Error> {
        Voice::new(data.measures, data.events)
    }
}

impl From<Voice> for VoiceData {
    fn from(voice: Voice) -> Self {
        VoiceData {
            measures: voice.measures,
            events: voice.events,
        }
    }
}

impl Voice {
    /// Build a voice, sorting events by start and validating every invariant.
    pub fn new(measures: Vec<Measure>, mut events: Vec<Event>) -> Result<Self, EngineError> {
        events.sort_by_key(|e| e.start());
        let voice = Voice { measures, events };
        voice.check_invariants()?;
        Ok(voice)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn measures(&self) -> &[Measure] {
        &self.measures
    }

    /// Total duration, as spanned by the measures.
    pub fn total_duration(&self) -> Ticks {
        self.measures.last().map_or(0, |m| m.end())
    }

    /// Sum of all event durations. Equals `total_duration` whenever the
    /// coverage invariant holds.
    pub fn covered_duration(&self) -> Ticks {
        self.events.iter().map(|e| e.duration()).sum()
    }

    /// Number of whole beats, truncating any trailing fraction.
    pub fn whole_beats(&self) -> u32 {
        self.total_duration() / TICKS_PER_BEAT
    }

    pub fn event(&self, index: usize) -> Result<&Event, EngineError> {
        self.events.get(index).ok_or(EngineError::IndexOutOfRange {
            index,
            len: self.events.len(),
        })
    }

    /// Indices of all notes, in temporal order.
    pub fn note_indices(&self) -> Vec<usize> {
        self.events
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_note())
            .map(|(i, _)| i)
            .collect()
    }

    /// Nearest note before `index`, skipping rests.
    pub fn previous_note(&self, index: usize) -> Option<usize> {
        self.events[..index.min(self.events.len())]
            .iter()
            .rposition(Event::is_note)
    }

    /// Nearest note after `index`, skipping rests.
    pub fn next_note(&self, index: usize) -> Option<usize> {
        let from = index + 1;
        if from >= self.events.len() {
            return None;
        }
        self.events[from..]
            .iter()
            .position(Event::is_note)
            .map(|i| from + i)
    }

    /// Index range of events intersecting the half-open window `[start, end)`.
    ///
    /// Events that end exactly at `start` or begin exactly at `end` only
    /// touch the window and are not included.
    pub fn overlapping(&self, start: Ticks, end: Ticks) -> Range<usize> {
        let lo = self.events.partition_point(|e| e.end() <= start);
        let hi = self.events.partition_point(|e| e.start() < end);
        lo..hi.max(lo)
    }

    /// Map an absolute offset to `(measure index, offset within that measure)`.
    pub fn measure_and_beat_at(&self, offset: Ticks) -> Result<(usize, Ticks), EngineError> {
        if offset >= self.total_duration() {
            return Err(EngineError::OffsetOutOfRange {
                offset,
                total: self.total_duration(),
            });
        }
        let index = self.measures.partition_point(|m| m.end() <= offset);
        Ok((index, offset - self.measures[index].start))
    }

    /// Insert `event` at `beat_offset` ticks into measure `measure`.
    ///
    /// The event's own start is replaced by the addressed position; it may
    /// extend past the end of the measure. Inserting over an existing event
    /// is a precondition violation. Returns the new event's index.
    pub fn insert_at(
        &mut self,
        measure: usize,
        beat_offset: Ticks,
        event: Event,
    ) -> Result<usize, EngineError> {
        let m = *self
            .measures
            .get(measure)
            .ok_or(EngineError::MeasureOutOfRange {
                index: measure,
                count: self.measures.len(),
            })?;
        if beat_offset >= m.duration {
            return Err(EngineError::BeatOutsideMeasure {
                number: m.number,
                beat_offset,
                duration: m.duration,
            });
        }

        let event = event.moved_to(m.start + beat_offset);
        if event.duration() == 0 {
            return Err(EngineError::ZeroDuration {
                start: event.start(),
            });
        }
        if event.end() > self.total_duration() {
            return Err(EngineError::OffsetOutOfRange {
                offset: event.end(),
                total: self.total_duration(),
            });
        }

        let pos = self.events.partition_point(|e| e.start() < event.start());
        let clash = pos
            .checked_sub(1)
            .map(|i| self.events[i])
            .filter(|prev| prev.end() > event.start())
            .or_else(|| {
                self.events
                    .get(pos)
                    .copied()
                    .filter(|next| next.start() < event.end())
            });
        if let Some(existing) = clash {
            return Err(EngineError::Overlap {
                start: event.start(),
                duration: event.duration(),
                existing_start: existing.start(),
                existing_end: existing.end(),
            });
        }

        self.events.insert(pos, event);
        Ok(pos)
    }

    /// Remove and return the event at `index`.
    ///
    /// This leaves a hole in the timeline; the caller must fill it before the
    /// voice is checked or handed on.
    pub fn remove(&mut self, index: usize) -> Result<Event, EngineError> {
        if index >= self.events.len() {
            return Err(EngineError::IndexOutOfRange {
                index,
                len: self.events.len(),
            });
        }
        Ok(self.events.remove(index))
    }

    /// Swap the event at `index` for one with exactly the same span.
    /// Returns the old event.
    pub fn replace(&mut self, index: usize, event: Event) -> Result<Event, EngineError> {
        let old = *self.event(index)?;
        if old.start() != event.start() || old.duration() != event.duration() {
            return Err(EngineError::SpanMismatch {
                index,
                start: event.start(),
                duration: event.duration(),
                expected_start: old.start(),
                expected_duration: old.duration(),
            });
        }
        self.events[index] = event;
        Ok(old)
    }

    /// Overwrite the tie state of the note at `index`.
    pub fn set_tie(&mut self, index: usize, new_tie: Tie) -> Result<(), EngineError> {
        let len = self.events.len();
        match self.events.get_mut(index) {
            Some(Event::Note { tie, .. }) => {
                *tie = new_tie;
                Ok(())
            }
            Some(Event::Rest { .. }) => Err(EngineError::NotANote { index }),
            None => Err(EngineError::IndexOutOfRange { index, len }),
        }
    }

    /// Verify measures, coverage and tie structure.
    pub fn check_invariants(&self) -> Result<(), EngineError> {
        self.check_measures()?;
        self.check_coverage()?;
        self.check_ties()
    }

    fn check_measures(&self) -> Result<(), EngineError> {
        let mut expected = 0;
        for m in &self.measures {
            if m.duration == 0 {
                return Err(EngineError::InvalidMeasures {
                    reason: format!("measure {} is empty", m.number),
                });
            }
            if m.start != expected {
                return Err(EngineError::InvalidMeasures {
                    reason: format!(
                        "measure {} starts at tick {} but the previous one ends at {}",
                        m.number, m.start, expected
                    ),
                });
            }
            expected = m.start.checked_add(m.duration).ok_or_else(|| {
                EngineError::InvalidMeasures {
                    reason: format!("measure {} ends past the last representable tick", m.number),
                }
            })?;
        }
        Ok(())
    }

    fn check_coverage(&self) -> Result<(), EngineError> {
        let total = self.total_duration();
        let mut expected = 0;
        for (i, e) in self.events.iter().enumerate() {
            if e.duration() == 0 {
                return Err(EngineError::ZeroDuration { start: e.start() });
            }
            if e.start() > expected {
                return Err(EngineError::CoverageGap {
                    from: expected,
                    to: e.start(),
                });
            }
            if e.start() < expected {
                let prev = self.events[i - 1];
                return Err(EngineError::Overlap {
                    start: e.start(),
                    duration: e.duration(),
                    existing_start: prev.start(),
                    existing_end: prev.end(),
                });
            }
            expected = e
                .start()
                .checked_add(e.duration())
                .ok_or(EngineError::OffsetOutOfRange {
                    offset: Ticks::MAX,
                    total,
                })?;
        }
        if expected < total {
            return Err(EngineError::CoverageGap {
                from: expected,
                to: total,
            });
        }
        if expected > total {
            return Err(EngineError::OffsetOutOfRange {
                offset: expected,
                total,
            });
        }
        Ok(())
    }

    fn check_ties(&self) -> Result<(), EngineError> {
        for (i, e) in self.events.iter().enumerate() {
            let tie = e.tie();
            if tie.ties_forward() {
                let follows = self.events.get(i + 1).is_some_and(|next| {
                    next.tie().ties_back() && next.pitch() == e.pitch()
                });
                if !follows {
                    return Err(EngineError::DanglingTie {
                        index: i,
                        start: e.start(),
                        reason: "no tied follower",
                    });
                }
            }
            if tie.ties_back() {
                let preceded = i.checked_sub(1).is_some_and(|p| {
                    let prev = &self.events[p];
                    prev.tie().ties_forward() && prev.pitch() == e.pitch()
                });
                if !preceded {
                    return Err(EngineError::DanglingTie {
                        index: i,
                        start: e.start(),
                        reason: "no tied predecessor",
                    });
                }
            }
        }
        Ok(())
    }

    /// Compact one-line rendering for debugging: `G4:1~ G4:1/2 r:1 | ...`.
    ///
    /// Durations are in beats, `~` marks a note tied to its follower, and `|`
    /// marks a barline.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let mut next_bar = 1;
        for e in &self.events {
            while next_bar < self.measures.len() && self.measures[next_bar].start <= e.start() {
                out.push_str("| ");
                next_bar += 1;
            }
            match *e {
                Event::Note {
                    pitch,
                    duration,
                    tie,
                    ..
                } => {
                    let _ = write!(out, "{}:{}", pitch_name(pitch), format_beats(duration));
                    if tie.ties_forward() {
                        out.push('~');
                    }
                }
                Event::Rest { duration, .. } => {
                    let _ = write!(out, "r:{}", format_beats(duration));
                }
            }
            out.push(' ');
        }
        out.trim_end().to_string()
    }
}

/// Builds voices in a fixed meter from a sequence of durations.
///
/// Events are laid end to end; measures are generated to cover them, with an
/// optional pickup measure first and a shortened final measure if the music
/// does not fill it.
#[derive(Debug, Clone)]
pub struct VoiceBuilder {
    measure_duration: Ticks,
    pickup: Option<Ticks>,
    events: Vec<Event>,
    cursor: Ticks,
}

impl VoiceBuilder {
    pub fn new(measure_duration: Ticks) -> Self {
        VoiceBuilder {
            measure_duration,
            pickup: None,
            events: Vec::new(),
            cursor: 0,
        }
    }

    /// Start with an anacrusis of the given length.
    pub fn pickup(mut self, duration: Ticks) -> Self {
        self.pickup = Some(duration);
        self
    }

    pub fn note(self, pitch: u8, duration: Ticks) -> Self {
        self.tied(pitch, duration, Tie::None)
    }

    pub fn tied(mut self, pitch: u8, duration: Ticks, tie: Tie) -> Self {
        self.events
            .push(Event::tied_note(pitch, self.cursor, duration, tie));
        self.cursor += duration;
        self
    }

    pub fn rest(mut self, duration: Ticks) -> Self {
        self.events.push(Event::rest(self.cursor, duration));
        self.cursor += duration;
        self
    }

    pub fn build(self) -> Result<Voice, EngineError> {
        let mut measures = Vec::new();
        let mut start = 0;
        let mut number = 1;
        if let Some(pickup) = self.pickup.filter(|&p| p > 0 && self.cursor > 0) {
            let duration = pickup.min(self.cursor);
            measures.push(Measure {
                number: 0,
                start: 0,
                duration,
            });
            start = duration;
        }
        while start < self.cursor {
            let duration = self.measure_duration.min(self.cursor - start);
            measures.push(Measure {
                number,
                start,
                duration,
            });
            start += duration;
            number += 1;
        }
        Voice::new(measures, self.events)
    }
}

/// One named part of a score, as found in the input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorePart {
    pub id: String,
    pub voice: Voice,
}

/// A multi-voice score with its catalogue number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Score {
    pub number: u32,
    #[serde(default)]
    pub title: Option<String>,
    pub parts: Vec<ScorePart>,
}

impl Score {
    /// The set of part ids present in the score.
    pub fn part_ids(&self) -> BTreeSet<&str> {
        self.parts.iter().map(|p| p.id.as_str()).collect()
    }

    /// The voice for a part, matched by exact id.
    pub fn voice(&self, part: Part) -> Option<&Voice> {
        self.parts
            .iter()
            .find(|p| p.id == part.name())
            .map(|p| &p.voice)
    }
}

/// Note name with octave, e.g. 60 -> "C4".
pub fn pitch_name(pitch: u8) -> String {
    const NAMES: [&str; 12] = [
        "C", "C#", "D", "Eb", "E", "F", "F#", "G", "Ab", "A", "Bb", "B",
    ];
    let octave = i32::from(pitch) / 12 - 1;
    format!("{}{}", NAMES[usize::from(pitch % 12)], octave)
}

/// Render a tick count as beats: "2", "1/2", "5/3".
pub fn format_beats(ticks: Ticks) -> String {
    let g = gcd(ticks, TICKS_PER_BEAT);
    let (num, den) = (ticks / g, TICKS_PER_BEAT / g);
    if den == 1 {
        num.to_string()
    } else {
        format!("{num}/{den}")
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a.max(1)
}
