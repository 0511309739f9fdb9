//! Change detection and merge after an extension has run.
//!
//! Extensions usually edit only the mono label because full labels are
//! slow to parse and rewrite. After an extension exits, the texts captured
//! before and after are compared and the side that changed is copied onto
//! the other one, phoneme by phoneme, by position.
//!
//! | mono changed | full changed | action |
//! |---|---|---|
//! | no | no | nothing; warn that the extension had no effect |
//! | yes | no | copy mono onto full |
//! | no | yes | copy full onto mono |
//! | yes | yes | leave both files unmerged, report an ambiguous edit |

use std::fs;
use std::path::Path;

use super::{check_lengths, validate};
use crate::error::PipelineError;
use crate::label::{parse_full, parse_mono, serialize, FullLabel, LabelLine, MonoLabel};

/// Raw contents of a full/mono label pair at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSnapshot {
    pub full: String,
    pub mono: String,
}

impl LabelSnapshot {
    pub fn new(full: impl Into<String>, mono: impl Into<String>) -> Self {
        Self {
            full: full.into(),
            mono: mono.into(),
        }
    }

    pub fn capture(full_path: &Path, mono_path: &Path) -> Result<Self, PipelineError> {
        Ok(Self {
            full: fs::read_to_string(full_path)?,
            mono: fs::read_to_string(mono_path)?,
        })
    }
}

/// Whether a label file's content changed. Surrounding whitespace is ignored.
pub fn changed(before: &str, after: &str) -> bool {
    before.trim() != after.trim()
}

/// What gets copied from one label onto the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeGranularity {
    /// Only `start`/`end`. Symbols must already agree.
    TimeOnly,
    /// `start`/`end` and the phoneme symbol.
    TimeAndContexts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeAction {
    NoOp,
    MonoToFull,
    FullToMono,
    Unmerged,
}

pub fn decide(mono_changed: bool, full_changed: bool) -> MergeAction {
    match (mono_changed, full_changed) {
        (false, false) => MergeAction::NoOp,
        (true, false) => MergeAction::MonoToFull,
        (false, true) => MergeAction::FullToMono,
        (true, true) => MergeAction::Unmerged,
    }
}

/// Outcome of [`reconcile`]: the action taken and the texts to write back.
///
/// `None` means the corresponding file keeps its current content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub action: MergeAction,
    pub full: Option<String>,
    pub mono: Option<String>,
}

/// Decide and compute the merge for one extension run, without touching files.
pub fn reconcile(
    before: &LabelSnapshot,
    after: &LabelSnapshot,
    granularity: MergeGranularity,
) -> Result<Reconciled, PipelineError> {
    let action = decide(
        changed(&before.mono, &after.mono),
        changed(&before.full, &after.full),
    );

    let mut outcome = Reconciled {
        action,
        full: None,
        mono: None,
    };
    match action {
        MergeAction::NoOp | MergeAction::Unmerged => {}
        MergeAction::MonoToFull => {
            let mono = parse_mono(&after.mono)?;
            let mut full = parse_full(&after.full)?;
            copy_mono_onto_full(&mono, &mut full, granularity)?;
            outcome.full = Some(serialize(&full));
        }
        MergeAction::FullToMono => {
            let full = parse_full(&after.full)?;
            let mut mono = parse_mono(&after.mono)?;
            copy_full_onto_mono(&full, &mut mono, granularity)?;
            outcome.mono = Some(serialize(&mono));
        }
    }
    Ok(outcome)
}

/// Re-read a label pair after an extension ran and write back the merge.
///
/// An ambiguous edit is returned as [`PipelineError::AmbiguousEdit`] with
/// both files left as the extension wrote them.
pub fn reconcile_files(
    full_path: &Path,
    mono_path: &Path,
    before: &LabelSnapshot,
    granularity: MergeGranularity,
) -> Result<MergeAction, PipelineError> {
    let after = LabelSnapshot::capture(full_path, mono_path)?;
    let outcome = reconcile(before, &after, granularity)?;

    match outcome.action {
        MergeAction::NoOp => log::warn!(
            "Neither {} nor {} was changed; check that the extension works",
            full_path.display(),
            mono_path.display()
        ),
        MergeAction::MonoToFull => log::info!(
            "{} was edited; applying the edit to {}",
            mono_path.display(),
            full_path.display()
        ),
        MergeAction::FullToMono => log::info!(
            "{} was edited; applying the edit to {}",
            full_path.display(),
            mono_path.display()
        ),
        MergeAction::Unmerged => {
            return Err(PipelineError::AmbiguousEdit {
                mono: mono_path.to_path_buf(),
                full: full_path.to_path_buf(),
            })
        }
    }

    if let Some(text) = &outcome.full {
        fs::write(full_path, text)?;
    }
    if let Some(text) = &outcome.mono {
        fs::write(mono_path, text)?;
    }
    Ok(outcome.action)
}

/// Copy mono timings (and symbols) onto the full label by position.
pub fn copy_mono_onto_full(
    mono: &MonoLabel,
    full: &mut FullLabel,
    granularity: MergeGranularity,
) -> Result<(), PipelineError> {
    match granularity {
        MergeGranularity::TimeOnly => validate(full, mono)?,
        MergeGranularity::TimeAndContexts => check_lengths(full, mono)?,
    }
    for (f, m) in full.iter_mut().zip(mono.iter()) {
        f.start = m.start;
        f.end = m.end;
        if granularity == MergeGranularity::TimeAndContexts && f.symbol() != m.symbol {
            f.contexts.set_identity(&m.symbol);
        }
    }
    Ok(())
}

/// Copy full-label timings (and symbols) onto the mono label by position.
pub fn copy_full_onto_mono(
    full: &FullLabel,
    mono: &mut MonoLabel,
    granularity: MergeGranularity,
) -> Result<(), PipelineError> {
    match granularity {
        MergeGranularity::TimeOnly => validate(full, mono)?,
        MergeGranularity::TimeAndContexts => check_lengths(full, mono)?,
    }
    for (m, f) in mono.iter_mut().zip(full.iter()) {
        m.start = f.start;
        m.end = f.end;
        if granularity == MergeGranularity::TimeAndContexts {
            m.symbol = f.symbol().to_string();
        }
    }
    Ok(())
}
