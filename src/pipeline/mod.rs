//! The two-stage restoration pipeline: vspipe frames piped into ffmpeg.

pub mod cleanup;
pub mod drift;
pub mod encoder;
pub mod error;
pub mod job;
pub mod launcher;
pub mod process;
pub mod progress;

pub use drift::{compute_drift, DriftDecision, DriftReason};
pub use encoder::{build_encoder_args, StreamGeometry};
pub use error::{PipelineError, ProcessSide, Result};
pub use job::{BatchSummary, Collaborators, Job, JobController, JobOutcome, JobState, RunPlan};
pub use launcher::{launch, CommandSpec, RunOutcome, RunningPipeline};
pub use process::{ProcessManager, Registration, ShutdownReport};
pub use progress::{
    FfmpegProgressMonitor, NoProgress, ProgressMonitor, ProgressSample, ProgressSink,
    ProgressUpdate, TerminalProgress, TracingProgress,
};
