//! Full/mono label pairs and their correspondence.
//!
//! A full label and its mono projection must agree on phoneme count, order
//! and symbols. [`LabelPair`] keeps both views together and re-derives the
//! mono view after every full-label mutation; [`validate`] is the check the
//! merge engine runs before copying data between the two.

pub mod merge;

use std::path::Path;

pub use merge::{
    changed, decide, reconcile, reconcile_files, LabelSnapshot, MergeAction, MergeGranularity,
    Reconciled,
};

use crate::error::PipelineError;
use crate::label::{to_mono, FullLabel, LabelLine, MonoLabel};

/// Derive the mono view of `full`.
pub fn derive_mono(full: &FullLabel) -> MonoLabel {
    to_mono(full)
}

/// Check that `full` and `mono` describe the same phoneme sequence.
///
/// Fails at the first index where the symbols differ, or at the length of
/// the shorter label when the counts differ and the common prefix agrees.
pub fn validate(full: &FullLabel, mono: &MonoLabel) -> Result<(), PipelineError> {
    for (index, (f, m)) in full.iter().zip(mono.iter()).enumerate() {
        if f.symbol() != m.symbol() {
            return Err(PipelineError::correspondence(
                index,
                format!("full label has `{}`, mono label has `{}`", f.symbol(), m.symbol()),
            ));
        }
    }
    check_lengths(full, mono)
}

/// Check only the phoneme counts.
pub fn check_lengths(full: &FullLabel, mono: &MonoLabel) -> Result<(), PipelineError> {
    if full.len() != mono.len() {
        return Err(PipelineError::correspondence(
            full.len().min(mono.len()),
            format!(
                "full label has {} phonemes, mono label has {}",
                full.len(),
                mono.len()
            ),
        ));
    }
    Ok(())
}

/// A full label together with its mono projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelPair {
    full: FullLabel,
    mono: MonoLabel,
}

impl LabelPair {
    pub fn from_full(full: FullLabel) -> Self {
        let mono = derive_mono(&full);
        Self { full, mono }
    }

    /// Pair two independently obtained labels, checking correspondence.
    pub fn new(full: FullLabel, mono: MonoLabel) -> Result<Self, PipelineError> {
        validate(&full, &mono)?;
        Ok(Self { full, mono })
    }

    /// Load the full label at `full_path`; the mono view is derived from it.
    pub fn load_full(full_path: &Path) -> Result<Self, PipelineError> {
        Ok(Self::from_full(FullLabel::load(full_path)?))
    }

    pub fn full(&self) -> &FullLabel {
        &self.full
    }

    pub fn mono(&self) -> &MonoLabel {
        &self.mono
    }

    /// Edit the full label; the mono view is re-derived afterwards.
    pub fn update_full<R>(&mut self, edit: impl FnOnce(&mut FullLabel) -> R) -> R {
        let result = edit(&mut self.full);
        self.mono = derive_mono(&self.full);
        result
    }

    pub fn into_parts(self) -> (FullLabel, MonoLabel) {
        (self.full, self.mono)
    }

    /// Write both views.
    pub fn write(&self, full_path: &Path, mono_path: &Path) -> Result<(), PipelineError> {
        self.full.write(full_path)?;
        self.mono.write(mono_path)?;
        Ok(())
    }
}
