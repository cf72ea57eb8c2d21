// End-to-end tests of the batch pipeline without external tools.
//
// `SineRenderer` stands in for FluidSynth: it writes a 16-bit mono WAV whose
// length follows the voice's total duration at the drawn tempo and whose
// samples depend on which notes sound, so mutations show up in the audio.
// Mixing uses the in-process `WavSumMixer`.

use chorale_synth::config::SynthConfig;
use chorale_synth::error::PipelineResult;
use chorale_synth::layout::{OutputLayout, part_stem};
use chorale_synth::mix::{WavSumMixer, read_samples};
use chorale_synth::pipeline::{Pipeline, verify_rendered};
use chorale_synth::render::VoiceRenderer;
use chorale_synth::score::{Event, Part, Score, ScorePart, TICKS_PER_BEAT, Tie, Voice, VoiceBuilder, beats};
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};

const SAMPLE_RATE: u32 = 8000;

struct SineRenderer {
    layout: OutputLayout,
}

impl VoiceRenderer for SineRenderer {
    fn render(&self, voice: &Voice, tempo_bpm: u16, stem: &str) -> PipelineResult<PathBuf> {
        let path = self.layout.mono_path(stem);
        let ticks_per_second = u64::from(TICKS_PER_BEAT) * u64::from(tempo_bpm) / 60;
        let frames = u64::from(voice.total_duration()) * u64::from(SAMPLE_RATE) / ticks_per_second;
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        let mut events = voice.events().iter().peekable();
        for frame in 0..frames {
            let tick = (frame * ticks_per_second / u64::from(SAMPLE_RATE)) as u32;
            while events.peek().is_some_and(|e| e.end() <= tick) {
                events.next();
            }
            let sample = match events.peek() {
                Some(Event::Note { pitch, .. }) => {
                    let phase = (frame % 64) as f32 / 64.0 * std::f32::consts::TAU;
                    (phase.sin() * f32::from(*pitch) * 50.0) as i16
                }
                _ => 0,
            };
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
        Ok(path)
    }
}

fn voice(base: u8, total_beats: u32) -> Voice {
    let mut b = VoiceBuilder::new(beats(4));
    let mut cursor = 0;
    let mut i = 0u8;
    while cursor + 4 <= total_beats {
        b = b
            .note(base + i % 5, beats(1))
            .tied(base + 2, beats(1), Tie::Start)
            .tied(base + 2, beats(1), Tie::End)
            .note(base + 4, beats(1));
        cursor += 4;
        i += 1;
    }
    if cursor < total_beats {
        b = b.rest(beats(total_beats - cursor));
    }
    b.build().unwrap()
}

fn score(number: u32, parts: &[(&str, u32)]) -> Score {
    Score {
        number,
        title: Some(format!("Chorale {number}")),
        parts: parts
            .iter()
            .enumerate()
            .map(|(i, (id, len))| ScorePart {
                id: id.to_string(),
                voice: voice(48 + 7 * i as u8, *len),
            })
            .collect(),
    }
}

/// Four scores: 1 and 4 are good, 2 lacks a part, 3 has a short bass.
fn write_corpus(dir: &Path) {
    let satb = |len| {
        [
            ("Soprano", len),
            ("Alto", len),
            ("Tenor", len),
            ("Bass", len),
        ]
    };
    let scores = [
        score(1, &satb(34)),
        score(2, &[("Soprano", 34), ("Alto", 34), ("Tenor", 34)]),
        score(3, &[("Soprano", 34), ("Alto", 34), ("Tenor", 34), ("Bass", 30)]),
        score(4, &satb(48)),
    ];
    for s in &scores {
        let path = dir.join(format!("{:03}.json", s.number));
        std::fs::write(path, serde_json::to_string_pretty(s).unwrap()).unwrap();
    }
}

fn pipeline(root: &Path, jobs: usize) -> Pipeline {
    let corpus = root.join("corpus");
    std::fs::create_dir_all(&corpus).unwrap();
    write_corpus(&corpus);
    let config = SynthConfig {
        corpus_dir: corpus,
        output_dir: root.join("out"),
        jobs,
        ..Default::default()
    };
    let renderer = SineRenderer {
        layout: OutputLayout::new(&config.output_dir),
    };
    Pipeline::new(config, Box::new(renderer), Box::new(WavSumMixer)).unwrap()
}

#[test]
fn test_batch_renders_skips_and_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let pipeline = pipeline(tmp.path(), 2);
    let summary = pipeline.synthesize_all().unwrap();

    assert_eq!(summary.rendered, vec![1, 4]);
    assert_eq!(summary.skipped, vec![2]);
    assert_eq!(summary.failed.len(), 1);
    assert!(summary.failed[0].0.ends_with("003.json"));
    assert!(summary.failed[0].1.contains("unequal length"), "{}", summary.failed[0].1);
    assert!(!summary.is_success());

    let layout = pipeline.layout();
    for number in [1, 4] {
        assert!(layout.mix_path(number).is_file());
        for part in Part::ALL {
            assert!(layout.mono_path(&part_stem(number, part)).is_file());
        }
    }
    for number in [2, 3] {
        assert!(!layout.mix_path(number).exists());
        for part in Part::ALL {
            assert!(!layout.mono_path(&part_stem(number, part)).exists());
        }
    }
}

#[test]
fn test_mixture_is_exact_sum() {
    let tmp = tempfile::tempdir().unwrap();
    let pipeline = pipeline(tmp.path(), 1);
    pipeline.synthesize_single(1).unwrap();
    let check = pipeline.verify_score(1).unwrap();
    assert!(check.frames > 0);
    assert!(check.is_exact(), "max error {}", check.max_abs_error);
}

#[test]
fn test_verify_needs_only_the_output_tree() {
    let tmp = tempfile::tempdir().unwrap();
    pipeline(tmp.path(), 1).synthesize_single(4).unwrap();
    let layout = OutputLayout::new(tmp.path().join("out"));
    let check = verify_rendered(&layout, &Part::ALL, 4).unwrap();
    assert!(check.frames > 0);
    assert!(check.is_exact());
    assert!(verify_rendered(&layout, &Part::ALL, 1).is_err());
}

#[test]
fn test_stems_share_length_of_tempo() {
    let tmp = tempfile::tempdir().unwrap();
    let pipeline = pipeline(tmp.path(), 1);
    let outcome = pipeline.synthesize_single(4).unwrap();
    assert!((70..=100).contains(&outcome.tempo_bpm));

    let expected = 48 * 60 * SAMPLE_RATE as usize / outcome.tempo_bpm as usize;
    for part in &outcome.parts {
        let (_, samples) = read_samples(&part.mono).unwrap();
        assert_eq!(samples.len(), expected, "{}", part.part);
        // 48 beats: windows at 7, 15, 23, 31, 39.
        assert_eq!(part.breaths, 5);
    }
}

#[test]
fn test_same_output_for_any_job_count() {
    let serial = tempfile::tempdir().unwrap();
    let parallel = tempfile::tempdir().unwrap();
    let a = pipeline(serial.path(), 1);
    let b = pipeline(parallel.path(), 4);
    assert_eq!(a.synthesize_all().unwrap().rendered, vec![1, 4]);
    assert_eq!(b.synthesize_all().unwrap().rendered, vec![1, 4]);

    for number in [1, 4] {
        let mut files = vec![(a.layout().mix_path(number), b.layout().mix_path(number))];
        for part in Part::ALL {
            let stem = part_stem(number, part);
            files.push((a.layout().mono_path(&stem), b.layout().mono_path(&stem)));
        }
        for (x, y) in files {
            assert!(
                std::fs::read(&x).unwrap() == std::fs::read(&y).unwrap(),
                "{} differs between runs",
                x.display()
            );
        }
    }
}

#[test]
fn test_different_seed_changes_output() {
    let tmp = tempfile::tempdir().unwrap();
    let corpus = tmp.path().join("corpus");
    std::fs::create_dir_all(&corpus).unwrap();
    write_corpus(&corpus);

    let run = |seed: u64, out: &str| {
        let config = SynthConfig {
            seed,
            corpus_dir: corpus.clone(),
            output_dir: tmp.path().join(out),
            ..Default::default()
        };
        let renderer = SineRenderer {
            layout: OutputLayout::new(&config.output_dir),
        };
        let p = Pipeline::new(config, Box::new(renderer), Box::new(WavSumMixer)).unwrap();
        let outcome = p.synthesize_single(4).unwrap();
        let dropped: Vec<usize> = outcome.parts.iter().map(|o| o.dropped).collect();
        (outcome.tempo_bpm, dropped, std::fs::read(outcome.mixture).unwrap())
    };
    let (_, dropped, mix_a) = run(1, "a");
    let (_, _, mix_b) = run(2, "b");
    // 48 beats of material: 48 notes less those silenced, so 4 dropped per part.
    assert!(dropped.iter().all(|&d| d == 4), "{dropped:?}");
    assert!(mix_a != mix_b);
}

#[test]
fn test_partial_mix() {
    let tmp = tempfile::tempdir().unwrap();
    let corpus = tmp.path().join("corpus");
    std::fs::create_dir_all(&corpus).unwrap();
    write_corpus(&corpus);
    let config = SynthConfig {
        corpus_dir: corpus,
        output_dir: tmp.path().join("out"),
        parts_to_mix: vec![Part::Soprano, Part::Bass],
        ..Default::default()
    };
    let renderer = SineRenderer {
        layout: OutputLayout::new(&config.output_dir),
    };
    let p = Pipeline::new(config, Box::new(renderer), Box::new(WavSumMixer)).unwrap();
    let outcome = p.synthesize_single(1).unwrap();
    assert_eq!(outcome.parts.len(), 4);
    assert!(p.verify_score(1).unwrap().is_exact());
}
