// MIDI encoding of a mutated voice.
//
// The synthesizer consumes Standard MIDI Files, so each voice is written as
// SMF format 1: track 0 carries the tempo, track 1 the notes. Ticks map
// one-to-one onto the voice's own tick grid (`TICKS_PER_BEAT` per quarter).
//
// A tied group sounds as one note: note-on at the `Start`, note-off at the
// `End`. The end-of-track event sits at the voice's total duration, so the
// file is as long as the voice even when it ends in a rest.
//
// Uses the `midly` crate for writing.

use crate::error::{PipelineError, PipelineResult};
use crate::score::{Event, TICKS_PER_BEAT, Ticks, Voice};
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};
use std::path::Path;

/// Per-file encoding parameters.
#[derive(Debug, Clone)]
pub struct MidiOptions {
    pub tempo_bpm: u16,
    /// General MIDI program number (0-based).
    pub program: u8,
    pub velocity: u8,
    pub track_name: String,
}

const CHANNEL: u8 = 0;

/// Encode a voice and write it to `path`.
pub fn write_midi(voice: &Voice, options: &MidiOptions, path: &Path) -> PipelineResult<()> {
    let smf = voice_to_smf(voice, options);
    let mut buf = Vec::new();
    smf.write_std(&mut buf).map_err(|source| PipelineError::Midi {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, &buf).map_err(|e| PipelineError::io(path, e))
}

/// Encode a voice as an in-memory SMF.
pub fn voice_to_smf<'a>(voice: &Voice, options: &'a MidiOptions) -> Smf<'a> {
    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(TICKS_PER_BEAT as u16)),
    ));

    let tempo_microseconds = 60_000_000 / u32::from(options.tempo_bpm.max(1));
    let tempo_track: Track<'a> = vec![
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(tempo_microseconds))),
        },
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        },
    ];
    smf.tracks.push(tempo_track);

    let channel = u4::new(CHANNEL);
    let mut track: Track<'a> = vec![
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::TrackName(options.track_name.as_bytes())),
        },
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::ProgramChange {
                    program: u7::new(options.program & 0x7f),
                },
            },
        },
    ];

    let mut last_tick: Ticks = 0;
    let mut push = |track: &mut Track<'a>, tick: Ticks, message: MidiMessage| {
        track.push(TrackEvent {
            delta: u28::new(tick - last_tick),
            kind: TrackEventKind::Midi { channel, message },
        });
        last_tick = tick;
    };

    for event in voice.events() {
        let Event::Note {
            pitch,
            start,
            duration,
            tie,
        } = *event
        else {
            continue;
        };
        let key = u7::new(pitch & 0x7f);
        if !tie.ties_back() {
            push(
                &mut track,
                start,
                MidiMessage::NoteOn {
                    key,
                    vel: u7::new(options.velocity & 0x7f),
                },
            );
        }
        if !tie.ties_forward() {
            push(
                &mut track,
                start + duration,
                MidiMessage::NoteOff {
                    key,
                    vel: u7::new(0),
                },
            );
        }
    }

    let end_delta = voice.total_duration().saturating_sub(last_tick);
    track.push(TrackEvent {
        delta: u28::new(end_delta),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    smf.tracks.push(track);

    smf
}
