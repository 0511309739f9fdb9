//! Label data model and text codec.
//!
//! Two label flavours share one container type:
//!
//! - [`MonoLabel`]: symbol and timing per phoneme (`0 500 pau`).
//! - [`FullLabel`]: timing plus the full context string per phoneme
//!   (`0 500 xx@xx^xx-pau+k=.../A:.../J:...`).
//!
//! Times are integers in 100 ns units (1 second = 10,000,000).
//!
//! # Examples
//!
//! ```rust
//! use svs_label::label::MonoLabel;
//!
//! let mono: MonoLabel = "0 500 pau\n500 1200 k\n1200 1800 a\n".parse()?;
//! assert_eq!(mono.len(), 3);
//! assert_eq!(mono[1].symbol, "k");
//! assert_eq!(mono.to_string(), "0 500 pau\n500 1200 k\n1200 1800 a\n");
//! # Ok::<(), svs_label::PipelineError>(())
//! ```

pub mod codec;
pub mod context;
pub mod json;
pub mod song;

use std::ops::{Deref, DerefMut};

pub use codec::{parse_full, parse_mono, serialize, to_mono};
pub use context::{ContextGroup, Contexts, Slot};
pub use song::Note;

use crate::error::PipelineError;

/// Symbol of a rest inside a phrase.
pub const PAUSE: &str = "pau";

/// Symbol of leading/trailing silence.
pub const SILENCE: &str = "sil";

/// Whether `symbol` denotes silence of any kind.
pub fn is_rest(symbol: &str) -> bool {
    symbol == PAUSE || symbol == SILENCE
}

/// A phoneme of a mono label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Phoneme {
    pub symbol: String,
    pub start: i64,
    pub end: i64,
}

impl Phoneme {
    pub fn new(symbol: impl Into<String>, start: i64, end: i64) -> Self {
        Self {
            symbol: symbol.into(),
            start,
            end,
        }
    }
}

/// One line of a full label: timing plus full context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Oneline {
    pub start: i64,
    pub end: i64,
    pub contexts: Contexts,
}

/// Common view over the lines of either label flavour.
pub trait LabelLine: Clone {
    fn symbol(&self) -> &str;
    fn start(&self) -> i64;
    fn end(&self) -> i64;
    fn set_start(&mut self, start: i64);
    fn set_end(&mut self, end: i64);

    /// `end - start`; negative for an inverted phoneme.
    fn duration(&self) -> i64 {
        self.end() - self.start()
    }

    /// Build a line from the three fields of a label file line.
    fn from_fields(start: i64, end: i64, context: &str, line: usize)
        -> Result<Self, PipelineError>;

    /// The third field of the label file line.
    fn context_string(&self) -> String;
}

impl LabelLine for Phoneme {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn start(&self) -> i64 {
        self.start
    }

    fn end(&self) -> i64 {
        self.end
    }

    fn set_start(&mut self, start: i64) {
        self.start = start;
    }

    fn set_end(&mut self, end: i64) {
        self.end = end;
    }

    fn from_fields(
        start: i64,
        end: i64,
        context: &str,
        _line: usize,
    ) -> Result<Self, PipelineError> {
        Ok(Phoneme::new(context, start, end))
    }

    fn context_string(&self) -> String {
        self.symbol.clone()
    }
}

impl LabelLine for Oneline {
    fn symbol(&self) -> &str {
        self.contexts.identity()
    }

    fn start(&self) -> i64 {
        self.start
    }

    fn end(&self) -> i64 {
        self.end
    }

    fn set_start(&mut self, start: i64) {
        self.start = start;
    }

    fn set_end(&mut self, end: i64) {
        self.end = end;
    }

    fn from_fields(start: i64, end: i64, context: &str, line: usize) -> Result<Self, PipelineError> {
        Ok(Oneline {
            start,
            end,
            contexts: Contexts::parse(context, line)?,
        })
    }

    fn context_string(&self) -> String {
        self.contexts.to_string()
    }
}

/// A non-empty, ordered sequence of label lines.
///
/// The container dereferences to a slice, so lines can be edited in place
/// but never added or removed; phoneme count is fixed after construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Label<T> {
    lines: Vec<T>,
}

pub type MonoLabel = Label<Phoneme>;
pub type FullLabel = Label<Oneline>;

impl<T: LabelLine> Label<T> {
    /// Wrap `lines`, rejecting an empty sequence.
    pub fn new(lines: Vec<T>) -> Result<Self, PipelineError> {
        if lines.is_empty() {
            return Err(PipelineError::format(0, "label contains no phonemes"));
        }
        Ok(Self { lines })
    }

    pub fn into_lines(self) -> Vec<T> {
        self.lines
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(|line| line.symbol())
    }

    /// `end` of the last phoneme.
    pub fn end_time(&self) -> i64 {
        self.lines.last().map(|line| line.end()).unwrap_or_default()
    }
}

impl<T> Deref for Label<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.lines
    }
}

impl<T> DerefMut for Label<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.lines
    }
}

impl<'a, T> IntoIterator for &'a Label<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.lines.iter()
    }
}
