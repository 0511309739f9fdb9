//! Timing repair for predicted or externally edited labels.

use serde::Deserialize;

use crate::error::PipelineError;
use crate::label::{Label, LabelLine};

/// 5 ms in 100 ns units.
pub const DEFAULT_MIN_DURATION: i64 = 50_000;

/// Timing post-processing applied after the timing stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimingRepairConfig {
    #[serde(default = "default_min_duration")]
    pub min_duration: i64,
    /// Minimum distance between consecutive phoneme starts; `None` skips
    /// the monotonize pass.
    #[serde(default)]
    pub monotonize_unit: Option<i64>,
}

fn default_min_duration() -> i64 {
    DEFAULT_MIN_DURATION
}

impl Default for TimingRepairConfig {
    fn default() -> Self {
        Self {
            min_duration: DEFAULT_MIN_DURATION,
            monotonize_unit: None,
        }
    }
}

impl TimingRepairConfig {
    /// Run `repair` and then, if configured, `monotonize`.
    pub fn apply<T: LabelLine>(&self, label: &mut Label<T>) -> Result<(), PipelineError> {
        repair(label, self.min_duration)?;
        if let Some(unit) = self.monotonize_unit {
            monotonize(label, unit);
        }
        Ok(())
    }
}

/// Stretch phonemes shorter than `min_duration` backwards, taking the time
/// from the preceding phoneme.
///
/// Scans from the end so that a run of short phonemes is fixed in one pass:
/// a phoneme shrunk by its successor is visited right after. The first
/// phoneme has nothing to borrow from, so the label is rejected when it is
/// too short on entry, or when the borrowing chain would invert it. On
/// error the label is left untouched. Returns the number of phonemes
/// stretched.
pub fn repair<T: LabelLine>(label: &mut Label<T>, min_duration: i64) -> Result<usize, PipelineError> {
    let first = &label[0];
    if first.duration() < min_duration {
        return Err(PipelineError::UnrepairableTiming {
            start: first.start(),
            end: first.end(),
            min_duration,
        });
    }

    let mut repaired_label = label.clone();
    let mut repaired = 0;
    for index in (1..repaired_label.len()).rev() {
        let duration = repaired_label[index].duration();
        if duration >= min_duration {
            continue;
        }
        let delta = min_duration - duration;
        log::debug!(
            "Stretching `{}` ({}..{}) by {delta}",
            repaired_label[index].symbol(),
            repaired_label[index].start(),
            repaired_label[index].end()
        );
        let start = repaired_label[index].start() - delta;
        repaired_label[index].set_start(start);
        let previous_end = repaired_label[index - 1].end() - delta;
        repaired_label[index - 1].set_end(previous_end);
        repaired += 1;
    }

    let first = &repaired_label[0];
    if first.duration() < 0 {
        return Err(PipelineError::UnrepairableTiming {
            start: first.start(),
            end: first.end(),
            min_duration,
        });
    }
    if first.duration() < min_duration {
        log::warn!(
            "First phoneme `{}` is now {} long, below the minimum {min_duration}",
            first.symbol(),
            first.duration()
        );
    }
    if repaired > 0 {
        log::info!("Repaired {repaired} phonemes shorter than {min_duration}");
    }

    *label = repaired_label;
    Ok(repaired)
}

/// Push phoneme starts forward so that each start is at least `time_unit`
/// after the previous one.
///
/// Scans forward, comparing against the already corrected previous start.
/// Only `start` moves; `end` follows when it would otherwise precede the
/// new start. Returns the number of phonemes moved.
pub fn monotonize<T: LabelLine>(label: &mut Label<T>, time_unit: i64) -> usize {
    let mut moved = 0;
    for index in 1..label.len() {
        let floor = label[index - 1].start() + time_unit;
        if label[index].start() >= floor {
            continue;
        }
        label[index].set_start(floor);
        if label[index].end() < floor {
            label[index].set_end(floor);
        }
        moved += 1;
    }
    if moved > 0 {
        log::info!("Moved {moved} phoneme starts to keep them {time_unit} apart");
    }
    moved
}
