//! Command-line front end of the label pipeline.
//!
//! ```bash
//! svs-label run --config voice/pipeline.json --score song.full --out out/
//! svs-label mono song.full song.lab
//! svs-label segment --policy middle --frequency 4 song_timing.lab segments/
//! svs-label repair --min-duration 50000 song_timing.full
//! svs-label json song.full song.json
//! ```

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use svs_label::label::{FullLabel, Label, LabelLine, MonoLabel};
use svs_label::pipeline::{PipelineConfig, RunContext, StageDriver};
use svs_label::segment::{segment, write_segments, SegmentPolicy};
use svs_label::timing::TimingRepairConfig;

#[derive(Parser, Debug)]
#[clap(name = "svs-label")]
#[clap(about = "Singing voice synthesis label pipeline and label tools")]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the stage pipeline for one song
    Run {
        /// Pipeline configuration (JSON)
        #[clap(long, value_name = "FILE")]
        config: PathBuf,
        /// Full score label
        #[clap(long, value_name = "FILE")]
        score: Option<PathBuf>,
        /// Source score handed to an external ust_converter
        #[clap(long, value_name = "FILE")]
        ust: Option<PathBuf>,
        /// Phoneme table passed through to extensions
        #[clap(long, value_name = "FILE")]
        table: Option<PathBuf>,
        /// Song name; defaults to the score file stem
        #[clap(long)]
        song: Option<String>,
        /// Output directory; defaults to the current directory
        #[clap(long, value_name = "DIR", default_value = ".")]
        out: PathBuf,
    },
    /// Derive the mono label of a full label
    Mono { full: PathBuf, mono: PathBuf },
    /// Split a label at rests
    Segment {
        #[clap(long, value_enum)]
        policy: PolicyName,
        /// Rests per segment for the middle policy
        #[clap(long, default_value = "10")]
        frequency: usize,
        label: PathBuf,
        out_dir: PathBuf,
    },
    /// Repair phoneme timings in place
    Repair {
        /// Minimum phoneme duration in 100 ns units
        #[clap(long, default_value = "50000")]
        min_duration: i64,
        /// Minimum distance between consecutive phoneme starts
        #[clap(long)]
        monotonize_unit: Option<i64>,
        label: PathBuf,
    },
    /// Dump a full label as JSON
    Json { full: PathBuf, json: PathBuf },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PolicyName {
    Short,
    Middle,
    Long,
}

impl PolicyName {
    fn with_frequency(self, frequency: usize) -> SegmentPolicy {
        match self {
            PolicyName::Short => SegmentPolicy::Short,
            PolicyName::Middle => SegmentPolicy::Middle { frequency },
            PolicyName::Long => SegmentPolicy::Long,
        }
    }
}

/// Whether the label file at `path` carries full contexts.
fn is_full_label(text: &str) -> bool {
    text.lines()
        .find(|line| !line.trim().is_empty())
        .is_some_and(|line| line.contains("/A:"))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "label".to_string())
}

fn segment_file<T: LabelLine>(
    label: &Label<T>,
    policy: SegmentPolicy,
    out_dir: &Path,
    stem: &str,
    extension: &str,
) -> Result<Vec<PathBuf>, Box<dyn Error>> {
    fs::create_dir_all(out_dir)?;
    let segments = segment(label, policy)?;
    Ok(write_segments(&segments, out_dir, stem, extension)?)
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Args::parse().command {
        Command::Run {
            config,
            score,
            ust,
            table,
            song,
            out,
        } => {
            let config = PipelineConfig::load(&config)?;
            let song = song
                .or_else(|| score.as_deref().or(ust.as_deref()).map(file_stem))
                .unwrap_or_else(|| "song".to_string());
            let mut context = RunContext::new(song);
            context.score = score;
            context.ust = ust;
            context.table = table;
            context.out_dir = Some(out);

            let report = StageDriver::new(config)?.run(&context)?;
            for (key, path) in report.artifacts.iter() {
                println!("{key}\t{}", path.display());
            }
            for (full, mono) in &report.segments {
                println!("segment\t{}\t{}", full.display(), mono.display());
            }
            for warning in &report.warnings {
                log::warn!("{warning}");
            }
        }
        Command::Mono { full, mono } => {
            let label = FullLabel::load(&full)?;
            svs_label::label::to_mono(&label).write(&mono)?;
        }
        Command::Segment {
            policy,
            frequency,
            label,
            out_dir,
        } => {
            let policy = policy.with_frequency(frequency);
            let text = fs::read_to_string(&label)?;
            let stem = file_stem(&label);
            let paths = if is_full_label(&text) {
                segment_file(&text.parse::<FullLabel>()?, policy, &out_dir, &stem, "full")?
            } else {
                segment_file(&text.parse::<MonoLabel>()?, policy, &out_dir, &stem, "lab")?
            };
            for path in paths {
                println!("{}", path.display());
            }
        }
        Command::Repair {
            min_duration,
            monotonize_unit,
            label,
        } => {
            let repair = TimingRepairConfig {
                min_duration,
                monotonize_unit,
            };
            let text = fs::read_to_string(&label)?;
            if is_full_label(&text) {
                let mut full: FullLabel = text.parse()?;
                repair.apply(&mut full)?;
                full.write(&label)?;
            } else {
                let mut mono: MonoLabel = text.parse()?;
                repair.apply(&mut mono)?;
                mono.write(&label)?;
            }
        }
        Command::Json { full, json } => {
            let label = FullLabel::load(&full)?;
            fs::write(&json, label.to_json()?)?;
        }
    }
    Ok(())
}
