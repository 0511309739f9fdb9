use std::path::PathBuf;

use crate::pipeline::Stage;

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("Malformed label at line {line}: {reason}")]
    Format { line: usize, reason: String },
    #[error("Mono/full labels disagree at phoneme {index}: {reason}")]
    Correspondence { index: usize, reason: String },
    #[error(
        "First phoneme ({start}..{end}) is shorter than the minimum duration {min_duration}; \
         there is no earlier phoneme to borrow from"
    )]
    UnrepairableTiming {
        start: i64,
        end: i64,
        min_duration: i64,
    },
    #[error("Extension failed: {reason} (command: `{command}`, working directory: {})", cwd.display())]
    ExtensionInvocation {
        command: String,
        cwd: PathBuf,
        reason: String,
    },
    #[error(
        "Both {} and {} were edited; they were left unmerged",
        mono.display(),
        full.display()
    )]
    AmbiguousEdit { mono: PathBuf, full: PathBuf },
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("[{stage}] {} : {source}", path.display())]
    Stage {
        stage: Stage,
        path: PathBuf,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Shorthand for a [`PipelineError::Format`] error.
    pub fn format(line: usize, reason: impl Into<String>) -> Self {
        Self::Format {
            line,
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`PipelineError::Correspondence`] error.
    pub fn correspondence(index: usize, reason: impl Into<String>) -> Self {
        Self::Correspondence {
            index,
            reason: reason.into(),
        }
    }

    /// Whether this error must abort the current run.
    ///
    /// Only an ambiguous edit is a warning: the labels are still internally
    /// consistent, the extension just misbehaved.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::AmbiguousEdit { .. } => false,
            Self::Stage { source, .. } => source.is_fatal(),
            _ => true,
        }
    }

    /// Attach the stage and the file that triggered the error.
    ///
    /// Errors that already carry a stage are returned unchanged.
    pub fn at(self, stage: Stage, path: impl Into<PathBuf>) -> Self {
        match self {
            Self::Stage { .. } => self,
            other => Self::Stage {
                stage,
                path: path.into(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, with any stage wrapper removed.
    pub fn root(&self) -> &PipelineError {
        match self {
            Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }
}
