//! Error types for pipeline jobs.

use std::fmt;
use std::path::PathBuf;
use std::process::ExitStatus;

/// Which half of the two-stage pipeline a process belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessSide {
    /// The frame generator (`vspipe`).
    Generator,
    /// The encoder/muxer (`ffmpeg`).
    Encoder,
}

impl fmt::Display for ProcessSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessSide::Generator => f.write_str("generator"),
            ProcessSide::Encoder => f.write_str("encoder"),
        }
    }
}

/// Errors that end a job in the `FAILED` state, plus the logged-only
/// cleanup failure.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The input file disappeared before the job started.
    #[error("input not found: {}", .0.display())]
    InputMissing(PathBuf),

    /// A required external tool could not be resolved.
    #[error(transparent)]
    Tool(#[from] autovhs_av::Error),

    /// The VapourSynth script could not be written.
    #[error("failed to write script {}: {source}", path.display())]
    Script {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// One of the two processes could not be started.
    #[error("failed to launch {side} {}: {source}", program.display())]
    LaunchFailure {
        side: ProcessSide,
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The encoder exited unsuccessfully; `tail` holds its last diagnostic
    /// lines.
    #[error("encoder exited with {status}")]
    EncoderFailure { status: ExitStatus, tail: Vec<String> },

    /// The finished temporary output could not be moved into place.
    #[error("failed to commit {} to {}: {source}", from.display(), to.display())]
    CommitFailure {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A temporary artifact could not be removed.
    #[error("failed to remove {}: {source}", path.display())]
    CleanupFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
