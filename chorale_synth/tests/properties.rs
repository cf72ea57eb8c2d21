// Property tests of the mutation engine over arbitrary well-formed voices.
//
// Voices are generated as runs of rests, single notes and tied groups on a
// grid of thirds of a beat, with an optional pickup and a 2-4 beat meter, so
// notes regularly straddle breath windows and barlines.

use chorale_prng::ChoraleRng;
use chorale_synth::breaths::{add_breaths, breath_windows};
use chorale_synth::config::MutationConfig;
use chorale_synth::dropout::drop_notes;
use chorale_synth::pipeline::mutate_voice;
use chorale_synth::score::{Event, Tie, Ticks, Voice, VoiceBuilder, beats};
use proptest::prelude::*;

const UNIT: Ticks = 160;

#[derive(Debug, Clone)]
enum Segment {
    Rest(u32),
    Note(u8, u32),
    Tied(u8, Vec<u32>),
}

fn segment() -> impl Strategy<Value = Segment> {
    prop_oneof![
        1 => (1u32..=6).prop_map(Segment::Rest),
        2 => (48u8..80, 1u32..=9).prop_map(|(p, d)| Segment::Note(p, d)),
        1 => (48u8..80, prop::collection::vec(1u32..=6, 2..=4))
            .prop_map(|(p, ds)| Segment::Tied(p, ds)),
    ]
}

fn arbitrary_voice() -> impl Strategy<Value = Voice> {
    (
        prop::collection::vec(segment(), 1..80),
        prop::option::of(1u32..=3),
        2u32..=4,
    )
        .prop_map(|(segments, pickup, meter)| {
            let mut b = VoiceBuilder::new(beats(meter));
            if let Some(p) = pickup {
                b = b.pickup(beats(p));
            }
            for segment in segments {
                b = match segment {
                    Segment::Rest(d) => b.rest(d * UNIT),
                    Segment::Note(p, d) => b.note(p, d * UNIT),
                    Segment::Tied(p, ds) => {
                        let last = ds.len() - 1;
                        ds.iter().enumerate().fold(b, |b, (i, &d)| {
                            let tie = match i {
                                0 => Tie::Start,
                                i if i == last => Tie::End,
                                _ => Tie::Continue,
                            };
                            b.tied(p, d * UNIT, tie)
                        })
                    }
                };
            }
            b.build().expect("generated voice is well formed")
        })
}

/// Events lying entirely in the final two beats, without their tie state.
fn tail(voice: &Voice) -> Vec<(Ticks, Ticks, Option<u8>)> {
    let from = voice.total_duration().saturating_sub(beats(2));
    voice
        .events()
        .iter()
        .filter(|e| e.start() >= from)
        .map(|e| (e.start(), e.duration(), e.pitch()))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Both stages keep the total duration and every structural invariant.
    #[test]
    fn mutation_preserves_duration_and_structure(voice in arbitrary_voice(), seed in any::<u64>()) {
        let mutated = mutate_voice(&voice, &MutationConfig::default(), &mut ChoraleRng::new(seed))
            .expect("mutation succeeds on a valid voice");
        prop_assert_eq!(mutated.voice.total_duration(), voice.total_duration());
        prop_assert_eq!(mutated.voice.covered_duration(), voice.total_duration());
        prop_assert_eq!(mutated.voice.measures(), voice.measures());
        prop_assert!(mutated.voice.check_invariants().is_ok());
    }

    /// Every breath window ends up as exactly one rest of one beat.
    #[test]
    fn breath_windows_are_single_rests(voice in arbitrary_voice()) {
        let config = MutationConfig::default();
        let mut mutated = voice.clone();
        let report = add_breaths(&mut mutated, &config).expect("breaths succeed");
        prop_assert_eq!(&report.windows, &breath_windows(voice.total_duration(), &config));
        for window in &report.windows {
            let hits = mutated.overlapping(window.start, window.end);
            prop_assert_eq!(hits.len(), 1);
            prop_assert_eq!(
                mutated.events()[hits.start],
                Event::rest(window.start, window.end - window.start)
            );
        }
    }

    /// Events within the final two beats keep their span and pitch.
    #[test]
    fn breaths_leave_the_tail_alone(voice in arbitrary_voice()) {
        let mut mutated = voice.clone();
        add_breaths(&mut mutated, &MutationConfig::default()).expect("breaths succeed");
        // A fragment cut off at the last window may begin exactly where the
        // tail begins, so compare one way only.
        let after = tail(&mutated);
        for event in tail(&voice) {
            prop_assert!(after.contains(&event), "{:?} missing from {:?}", event, after);
        }
    }

    /// Dropout replaces exactly n / 10 notes, never one of the last two.
    #[test]
    fn dropout_count_and_protection(voice in arbitrary_voice(), seed in any::<u64>()) {
        let mut mutated = voice.clone();
        let report = drop_notes(&mut mutated, &MutationConfig::default(), &mut ChoraleRng::new(seed))
            .expect("dropout succeeds");
        let n = voice.note_indices().len();
        prop_assert_eq!(report.note_count, n);
        prop_assert_eq!(report.dropped.len(), n / 10);
        prop_assert_eq!(mutated.note_indices().len(), n - n / 10);
        prop_assert!(report.dropped.iter().all(|&i| i + 2 < n));

        let notes = voice.note_indices();
        for &index in notes.iter().rev().take(2) {
            let (before, after) = (voice.events()[index], mutated.events()[index]);
            prop_assert!(after.is_note());
            prop_assert_eq!(
                (after.start(), after.duration(), after.pitch()),
                (before.start(), before.duration(), before.pitch())
            );
        }
        prop_assert!(mutated.check_invariants().is_ok());
    }

    /// The same seed always yields the same voice and the same dropped notes.
    #[test]
    fn mutation_is_deterministic(voice in arbitrary_voice(), seed in any::<u64>()) {
        let config = MutationConfig::default();
        let a = mutate_voice(&voice, &config, &mut ChoraleRng::new(seed)).expect("first run");
        let b = mutate_voice(&voice, &config, &mut ChoraleRng::new(seed)).expect("second run");
        prop_assert_eq!(a, b);
    }
}
