// Chorale Synth: command-line entry point.
//
// Usage:
//   synthesize [--config FILE] [--corpus DIR] [--output DIR] [--seed N]
//              [--soundfont FILE] [--jobs N] <COMMAND>
//
// Commands:
//   all                          synthesize every score in the corpus
//   single <NUMBER>              synthesize one score by catalogue number
//   preview <SCORE_FILE> [--part PART]
//                                run only the mutation engine and print voices
//   verify <NUMBER>              check a rendered mixture against its stems
//
// Log verbosity follows RUST_LOG (default: info).

use anyhow::{Context, Result, bail};
use chorale_prng::ChoraleRng;
use chorale_synth::config::SynthConfig;
use chorale_synth::corpus::{load_score, validate_parts};
use chorale_synth::layout::OutputLayout;
use chorale_synth::pipeline::{Pipeline, draw_tempo, mutate_voice, verify_rendered};
use chorale_synth::score::Part;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

#[derive(Parser)]
#[command(name = "synthesize")]
#[command(about = "Build a synthetic multi-track chorale dataset")]
#[command(version)]
struct Cli {
    /// JSON config file; flags below override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory of JSON score files
    #[arg(long, global = true)]
    corpus: Option<PathBuf>,

    /// Dataset output directory
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    /// Base random seed
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// SoundFont used by FluidSynth
    #[arg(long, global = true)]
    soundfont: Option<PathBuf>,

    /// Scores processed in parallel
    #[arg(short, long, global = true)]
    jobs: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synthesize every score in the corpus
    All,

    /// Synthesize one score by catalogue number
    Single { number: u32 },

    /// Mutate a score file's voices and print them, without rendering
    Preview {
        score_file: PathBuf,

        /// Only this part (Soprano, Alto, Tenor or Bass)
        #[arg(long)]
        part: Option<Part>,
    },

    /// Check that a rendered mixture equals the sum of its parts
    Verify { number: u32 },
}

impl Cli {
    fn load_config(&self) -> Result<SynthConfig> {
        let mut config = match &self.config {
            Some(path) => SynthConfig::load(path)?,
            None => SynthConfig::default(),
        };
        if let Some(dir) = &self.corpus {
            config.corpus_dir = dir.clone();
        }
        if let Some(dir) = &self.output {
            config.output_dir = dir.clone();
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(sf) = &self.soundfont {
            config.render.soundfont = sf.clone();
        }
        if let Some(jobs) = self.jobs {
            config.jobs = jobs;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match run(Cli::parse()) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = cli.load_config().context("loading configuration")?;

    match cli.command {
        Commands::All => {
            let pipeline = Pipeline::with_external_tools(config)?;
            let summary = pipeline.synthesize_all()?;
            for (path, error) in &summary.failed {
                eprintln!("failed: {}: {error}", path.display());
            }
            println!(
                "rendered {}, skipped {}, failed {}",
                summary.rendered.len(),
                summary.skipped.len(),
                summary.failed.len()
            );
            Ok(if summary.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Single { number } => {
            let pipeline = Pipeline::with_external_tools(config)?;
            let outcome = pipeline
                .synthesize_single(number)
                .with_context(|| format!("synthesizing score {number}"))?;
            println!("{}", outcome.mixture.display());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Preview { score_file, part } => {
            preview(&config, &score_file, part)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Verify { number } => {
            let layout = OutputLayout::new(&config.output_dir);
            let check = verify_rendered(&layout, &config.parts_to_mix, number)?;
            println!(
                "score {number}: {} frames, max deviation {:e}",
                check.frames, check.max_abs_error
            );
            if !check.is_exact() {
                bail!("mixture of score {number} is not the exact sum of its parts");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Mutate the voices of one score file exactly as the pipeline would and
/// print each one before and after.
fn preview(config: &SynthConfig, path: &std::path::Path, only: Option<Part>) -> Result<()> {
    let score = load_score(path)?;
    validate_parts(&score)?;
    let mut rng = ChoraleRng::for_stream(config.seed, u64::from(score.number));
    let tempo = draw_tempo(&config.tempo, &mut rng);
    println!(
        "score {}{} at {tempo} BPM",
        score.number,
        score
            .title
            .as_deref()
            .map(|t| format!(" ({t})"))
            .unwrap_or_default()
    );

    // Mutate every configured part so the generator advances as in a real run.
    for &part in &config.parts_to_synthesize {
        let Some(voice) = score.voice(part) else {
            continue;
        };
        let mutated = mutate_voice(voice, &config.mutation, &mut rng)
            .with_context(|| format!("mutating {part}"))?;
        if only.is_some_and(|p| p != part) {
            continue;
        }
        info!(part = %part, dropped = ?mutated.dropout.dropped, "previewed");
        println!("\n{part}:");
        println!("  before: {}", voice.summary());
        println!("  after:  {}", mutated.voice.summary());
        println!(
            "  breaths: {} windows, {} notes split, {} silenced; dropout: {} of {} notes",
            mutated.breaths.windows.len(),
            mutated.breaths.split_notes,
            mutated.breaths.removed_notes,
            mutated.dropout.dropped.len(),
            mutated.dropout.note_count
        );
    }
    Ok(())
}
