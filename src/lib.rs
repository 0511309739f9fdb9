//! # svs-label
//!
//! Label pipeline for singing voice synthesis: turns a full-context score
//! label into timed phoneme labels, keeping the full label and its mono
//! projection consistent while external tools edit them.
//!
//! ## Features
//!
//! - **Label codec**: HTS-style full-context and mono labels, parsed and
//!   written back byte for byte
//! - **Extension hooks**: any stage can be replaced or post-edited by an
//!   external program; edits to either label are merged into the other
//! - **Segmentation**: split a song at rests with short, middle or long
//!   boundary rules
//! - **Timing repair**: minimum phoneme duration and monotonic starts
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! svs-label = "2026.10"
//! ```
//!
//! ```no_run
//! use std::path::{Path, PathBuf};
//! use svs_label::pipeline::{PipelineConfig, RunContext, StageDriver};
//!
//! let config = PipelineConfig::load(Path::new("voice/pipeline.json"))?;
//! let mut driver = StageDriver::new(config)?;
//!
//! let mut context = RunContext::new("song");
//! context.score = Some(PathBuf::from("song_score.full"));
//! context.out_dir = Some(PathBuf::from("out"));
//! let report = driver.run(&context)?;
//! println!("{:?}", report.artifacts);
//! # Ok::<(), svs_label::PipelineError>(())
//! ```

pub mod error;
pub mod label;
pub mod pipeline;
pub mod segment;
pub mod sync;
pub mod timing;

use std::path::Path;

pub use error::PipelineError;

use pipeline::{Artifacts, Stage};

/// What a calculator gets to work with for one stage.
#[derive(Debug, Clone, Copy)]
pub struct StageRequest<'a> {
    pub stage: Stage,
    pub song: &'a str,
    /// Full score label supplied by the caller, if any.
    pub score: Option<&'a Path>,
    /// Artifacts produced by earlier stages.
    pub inputs: &'a Artifacts,
    /// Where this stage must write its artifacts.
    pub outputs: &'a Artifacts,
}

/// Common interface for the in-process implementation of pipeline stages.
///
/// A calculator writes the stage's artifacts to the paths in
/// [`StageRequest::outputs`], exactly like an extension process would. For
/// label stages only the full label is required; the driver derives the mono
/// label and runs the editors afterwards. Writing nothing is allowed and
/// leaves the stage without output.
pub trait StageCalculator {
    fn calculate(&mut self, request: &StageRequest<'_>) -> Result<(), PipelineError>;
}
