//! Splitting a song into shorter labels at rests.
//!
//! Cut points are computed from the phoneme symbols only, so the same
//! boundaries apply to a full label and its mono projection. The first and
//! last phonemes are never cut before, and a trailing segment made only of
//! rests is folded into the segment before it.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::error::PipelineError;
use crate::label::{is_rest, FullLabel, Label, LabelLine, MonoLabel, PAUSE, SILENCE};
use crate::sync::{validate, LabelPair};

/// Where a label may be cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase", tag = "policy")]
pub enum SegmentPolicy {
    /// Before every `pau`.
    Short,
    /// Before every `frequency`-th `pau`.
    Middle { frequency: usize },
    /// Only between two consecutive rests (`pau sil` or `pau pau`).
    Long,
}

impl SegmentPolicy {
    pub fn validate(&self) -> Result<(), PipelineError> {
        match self {
            SegmentPolicy::Middle { frequency: 0 } => Err(PipelineError::Config(
                "segmentation frequency must be a positive integer".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

impl FromStr for SegmentPolicy {
    type Err = PipelineError;

    /// Accepts `short`, `long`, `middle` (every 10th rest) and `middle:N`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let policy = match s.split_once(':') {
            None if s == "short" => SegmentPolicy::Short,
            None if s == "long" => SegmentPolicy::Long,
            None if s == "middle" => SegmentPolicy::Middle { frequency: 10 },
            Some(("middle", n)) => SegmentPolicy::Middle {
                frequency: n.parse().map_err(|e| {
                    PipelineError::Config(format!("invalid segmentation frequency {n:?}: {e}"))
                })?,
            },
            _ => {
                return Err(PipelineError::Config(format!(
                    "unknown segmentation policy {s:?} (expected short, middle[:N] or long)"
                )))
            }
        };
        policy.validate()?;
        Ok(policy)
    }
}

/// Indices before which a new segment starts.
pub fn cut_points<'a>(
    symbols: impl IntoIterator<Item = &'a str>,
    policy: SegmentPolicy,
) -> Result<Vec<usize>, PipelineError> {
    policy.validate()?;
    let symbols: Vec<&str> = symbols.into_iter().collect();
    let candidates = 1..symbols.len().saturating_sub(1);

    let mut cuts = Vec::new();
    match policy {
        SegmentPolicy::Short => {
            cuts.extend(candidates.filter(|&i| symbols[i] == PAUSE));
        }
        SegmentPolicy::Long => {
            cuts.extend(candidates.filter(|&i| {
                symbols[i - 1] == PAUSE && (symbols[i] == SILENCE || symbols[i] == PAUSE)
            }));
        }
        SegmentPolicy::Middle { frequency } => {
            let mut counter = 0;
            for i in candidates {
                if symbols[i] != PAUSE {
                    continue;
                }
                counter += 1;
                if counter == frequency {
                    cuts.push(i);
                    counter = 0;
                }
            }
        }
    }

    // Fold a rest-only tail into the previous segment.
    if let Some(&last_cut) = cuts.last() {
        if symbols[last_cut..].iter().all(|s| is_rest(s)) {
            cuts.pop();
        }
    }
    Ok(cuts)
}

/// Split `lines` before every index in `cuts`.
fn split_at<T: LabelLine>(lines: &[T], cuts: &[usize]) -> Vec<Label<T>> {
    let mut segments = Vec::with_capacity(cuts.len() + 1);
    let mut start = 0;
    for &cut in cuts.iter().chain(std::iter::once(&lines.len())) {
        if let Ok(segment) = Label::new(lines[start..cut].to_vec()) {
            segments.push(segment);
        }
        start = cut;
    }
    segments
}

/// Split one label. Always returns at least one segment.
pub fn segment<T: LabelLine>(
    label: &Label<T>,
    policy: SegmentPolicy,
) -> Result<Vec<Label<T>>, PipelineError> {
    let cuts = cut_points(label.symbols(), policy)?;
    Ok(split_at(label, &cuts))
}

/// Split a full/mono pair with identical boundaries in both views.
pub fn segment_pair(
    full: &FullLabel,
    mono: &MonoLabel,
    policy: SegmentPolicy,
) -> Result<Vec<LabelPair>, PipelineError> {
    validate(full, mono)?;
    let cuts = cut_points(full.symbols(), policy)?;
    split_at(full, &cuts)
        .into_iter()
        .zip(split_at(mono, &cuts))
        .map(|(f, m)| LabelPair::new(f, m))
        .collect()
}

/// Write segments as `<stem>_seg<i>.<extension>` under `out_dir`.
pub fn write_segments<T: LabelLine>(
    segments: &[Label<T>],
    out_dir: &Path,
    stem: &str,
    extension: &str,
) -> Result<Vec<PathBuf>, PipelineError> {
    let mut paths = Vec::with_capacity(segments.len());
    for (index, segment) in segments.iter().enumerate() {
        let path = out_dir.join(format!("{stem}_seg{index}.{extension}"));
        segment.write(&path)?;
        paths.push(path);
    }
    Ok(paths)
}
