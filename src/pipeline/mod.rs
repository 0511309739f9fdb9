//! Stage driver for the score → timing label pipeline.
//!
//! Every stage is either skipped, computed by a [`StageCalculator`] or
//! delegated to an external process, and may be followed by editor
//! extensions whose edits are merged back by [`crate::sync::merge`].
//!
//! [`StageCalculator`]: crate::StageCalculator

pub mod config;
pub mod driver;
pub mod extension;
pub mod workdir;

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

pub use config::{Disposition, ExtensionConfig, PipelineConfig};
pub use driver::{RunContext, RunReport, ScoreTimingCalculator, StageDriver};
pub use extension::{Extension, ExtensionAliases, ExtensionAliasesBuilder};
pub use workdir::WorkDir;

use crate::sync::MergeGranularity;

/// One step of the pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Score,
    Timelag,
    Duration,
    Timing,
    Acoustic,
    Wav,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Score,
        Stage::Timelag,
        Stage::Duration,
        Stage::Timing,
        Stage::Acoustic,
        Stage::Wav,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Score => "score",
            Stage::Timelag => "timelag",
            Stage::Duration => "duration",
            Stage::Timing => "timing",
            Stage::Acoustic => "acoustic",
            Stage::Wav => "wav",
        }
    }

    /// Configuration key selecting how the stage itself runs.
    pub fn calculator_key(self) -> &'static str {
        match self {
            Stage::Score => "ust_converter",
            Stage::Timelag => "timelag_calculator",
            Stage::Duration => "duration_calculator",
            Stage::Timing => "timing_calculator",
            Stage::Acoustic => "acoustic_calculator",
            Stage::Wav => "wav_synthesizer",
        }
    }

    /// Configuration key listing the editors run after the stage.
    pub fn editor_key(self) -> &'static str {
        match self {
            Stage::Score => "score_editor",
            Stage::Timelag => "timelag_editor",
            Stage::Duration => "duration_editor",
            Stage::Timing => "timing_editor",
            Stage::Acoustic => "acoustic_editor",
            Stage::Wav => "wav_editor",
        }
    }

    /// The full/mono pair a label stage produces; `None` for acoustic and wav.
    pub fn label_keys(self) -> Option<(ArtifactKey, ArtifactKey)> {
        match self {
            Stage::Score => Some((ArtifactKey::FullScore, ArtifactKey::MonoScore)),
            Stage::Timelag => Some((ArtifactKey::FullTimelag, ArtifactKey::MonoTimelag)),
            Stage::Duration => Some((ArtifactKey::FullDuration, ArtifactKey::MonoDuration)),
            Stage::Timing => Some((ArtifactKey::FullTiming, ArtifactKey::MonoTiming)),
            Stage::Acoustic | Stage::Wav => None,
        }
    }

    /// Every artifact the stage is expected to write.
    pub fn outputs(self) -> &'static [ArtifactKey] {
        match self {
            Stage::Score => &[ArtifactKey::FullScore, ArtifactKey::MonoScore],
            Stage::Timelag => &[ArtifactKey::FullTimelag, ArtifactKey::MonoTimelag],
            Stage::Duration => &[ArtifactKey::FullDuration, ArtifactKey::MonoDuration],
            Stage::Timing => &[ArtifactKey::FullTiming, ArtifactKey::MonoTiming],
            Stage::Acoustic => &[
                ArtifactKey::Acoustic,
                ArtifactKey::F0,
                ArtifactKey::Spectrogram,
                ArtifactKey::Aperiodicity,
            ],
            Stage::Wav => &[ArtifactKey::Wav],
        }
    }

    /// How editor changes are merged back for this stage.
    ///
    /// Score editors may fix lyrics; later stages may only move boundaries.
    pub fn merge_granularity(self) -> MergeGranularity {
        match self {
            Stage::Score => MergeGranularity::TimeAndContexts,
            _ => MergeGranularity::TimeOnly,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Named artifact passed to extensions as `--<key> <path>`.
///
/// Declaration order is the canonical argument order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArtifactKey {
    Ust,
    Table,
    FullScore,
    MonoScore,
    FullTimelag,
    MonoTimelag,
    FullDuration,
    MonoDuration,
    FullTiming,
    MonoTiming,
    Acoustic,
    F0,
    Spectrogram,
    Aperiodicity,
    Wav,
}

impl ArtifactKey {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKey::Ust => "ust",
            ArtifactKey::Table => "table",
            ArtifactKey::FullScore => "full_score",
            ArtifactKey::MonoScore => "mono_score",
            ArtifactKey::FullTimelag => "full_timelag",
            ArtifactKey::MonoTimelag => "mono_timelag",
            ArtifactKey::FullDuration => "full_duration",
            ArtifactKey::MonoDuration => "mono_duration",
            ArtifactKey::FullTiming => "full_timing",
            ArtifactKey::MonoTiming => "mono_timing",
            ArtifactKey::Acoustic => "acoustic",
            ArtifactKey::F0 => "f0",
            ArtifactKey::Spectrogram => "spectrogram",
            ArtifactKey::Aperiodicity => "aperiodicity",
            ArtifactKey::Wav => "wav",
        }
    }

    /// The stage that produces the artifact; run inputs belong to `score`.
    pub fn stage(self) -> Stage {
        match self {
            ArtifactKey::Ust | ArtifactKey::Table | ArtifactKey::FullScore | ArtifactKey::MonoScore => {
                Stage::Score
            }
            ArtifactKey::FullTimelag | ArtifactKey::MonoTimelag => Stage::Timelag,
            ArtifactKey::FullDuration | ArtifactKey::MonoDuration => Stage::Duration,
            ArtifactKey::FullTiming | ArtifactKey::MonoTiming => Stage::Timing,
            ArtifactKey::Acoustic
            | ArtifactKey::F0
            | ArtifactKey::Spectrogram
            | ArtifactKey::Aperiodicity => Stage::Acoustic,
            ArtifactKey::Wav => Stage::Wav,
        }
    }

    /// File name of the artifact inside a run's working directory.
    pub fn file_name(self, song: &str) -> String {
        match self {
            ArtifactKey::Ust => format!("{song}_temp.ust"),
            ArtifactKey::Table => format!("{song}_temp.table"),
            ArtifactKey::FullScore => format!("{song}_score.full"),
            ArtifactKey::MonoScore => format!("{song}_score.lab"),
            ArtifactKey::FullTimelag => format!("{song}_timelag.full"),
            ArtifactKey::MonoTimelag => format!("{song}_timelag.lab"),
            ArtifactKey::FullDuration => format!("{song}_duration.full"),
            ArtifactKey::MonoDuration => format!("{song}_duration.lab"),
            ArtifactKey::FullTiming => format!("{song}_timing.full"),
            ArtifactKey::MonoTiming => format!("{song}_timing.lab"),
            ArtifactKey::Acoustic => format!("{song}_acoustic.csv"),
            ArtifactKey::F0 => format!("{song}_acoustic_f0.csv"),
            ArtifactKey::Spectrogram => format!("{song}_acoustic_sp.csv"),
            ArtifactKey::Aperiodicity => format!("{song}_acoustic_ap.csv"),
            ArtifactKey::Wav => format!("{song}.wav"),
        }
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Paths of the artifacts available at some point of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Artifacts {
    paths: BTreeMap<ArtifactKey, PathBuf>,
}

impl Artifacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: ArtifactKey) -> Option<&Path> {
        self.paths.get(&key).map(PathBuf::as_path)
    }

    pub fn contains(&self, key: ArtifactKey) -> bool {
        self.paths.contains_key(&key)
    }

    pub fn insert(&mut self, key: ArtifactKey, path: impl Into<PathBuf>) {
        self.paths.insert(key, path.into());
    }

    pub fn remove(&mut self, key: ArtifactKey) -> Option<PathBuf> {
        self.paths.remove(&key)
    }

    /// Entries in canonical key order.
    pub fn iter(&self) -> impl Iterator<Item = (ArtifactKey, &Path)> {
        self.paths.iter().map(|(key, path)| (*key, path.as_path()))
    }

    /// Union of `self` and `other`; entries of `other` win.
    pub fn merged(&self, other: &Artifacts) -> Artifacts {
        let mut paths = self.paths.clone();
        paths.extend(other.paths.iter().map(|(k, v)| (*k, v.clone())));
        Artifacts { paths }
    }

    /// `--<key> <path>` pairs in canonical order.
    pub fn to_args(&self) -> Vec<OsString> {
        let mut args = Vec::with_capacity(self.paths.len() * 2);
        for (key, path) in &self.paths {
            args.push(OsString::from(format!("--{key}")));
            args.push(path.as_os_str().to_os_string());
        }
        args
    }
}
