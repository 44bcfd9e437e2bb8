//! Media metadata probing.
//!
//! Probing is advisory: the pipeline asks for durations, frame rates and
//! start times, and a failed query must never abort a job. The fallible
//! `try_*` methods of [`MediaProbe`] report why a value is unavailable; the
//! plain methods substitute a safe default and log the reason at debug level.

mod ffprobe;

pub use self::ffprobe::{parse_frame_rate, parse_scalar, FfprobeProbe};

use std::fmt;
use std::path::Path;

use async_trait::async_trait;

use crate::Result;

/// Duration reported when a probe fails.
pub const DEFAULT_DURATION: f64 = 0.0;
/// Frame rate reported when a probe fails (NTSC).
pub const DEFAULT_FPS: f64 = 29.97;
/// Start time reported when a probe fails.
pub const DEFAULT_START_TIME: f64 = 0.0;

/// Which stream of a file a probe query targets (always the first one of the
/// given kind).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamSelector {
    Video,
    Audio,
}

impl StreamSelector {
    /// The ffprobe `-select_streams` specifier.
    pub fn specifier(self) -> &'static str {
        match self {
            StreamSelector::Video => "v:0",
            StreamSelector::Audio => "a:0",
        }
    }
}

impl fmt::Display for StreamSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamSelector::Video => f.write_str("video"),
            StreamSelector::Audio => f.write_str("audio"),
        }
    }
}

/// Source of stream timing metadata.
#[async_trait]
pub trait MediaProbe: Send + Sync {
    /// Duration in seconds of the selected stream, falling back to the
    /// container duration when the stream does not carry one.
    async fn try_duration(&self, path: &Path, stream: StreamSelector) -> Result<f64>;

    /// Average frame rate of the first video stream.
    async fn try_fps(&self, path: &Path) -> Result<f64>;

    /// Start time in seconds of the selected stream.
    async fn try_start_time(&self, path: &Path, stream: StreamSelector) -> Result<f64>;

    /// Like [`MediaProbe::try_duration`], returning [`DEFAULT_DURATION`] on failure.
    async fn duration(&self, path: &Path, stream: StreamSelector) -> f64 {
        match self.try_duration(path, stream).await {
            Ok(d) => d,
            Err(e) => {
                tracing::debug!("{} duration unavailable: {}", stream, e);
                DEFAULT_DURATION
            }
        }
    }

    /// Like [`MediaProbe::try_fps`], returning [`DEFAULT_FPS`] on failure.
    async fn fps(&self, path: &Path) -> f64 {
        match self.try_fps(path).await {
            Ok(fps) => fps,
            Err(e) => {
                tracing::debug!("frame rate unavailable: {}", e);
                DEFAULT_FPS
            }
        }
    }

    /// Like [`MediaProbe::try_start_time`], returning [`DEFAULT_START_TIME`] on failure.
    async fn start_time(&self, path: &Path, stream: StreamSelector) -> f64 {
        match self.try_start_time(path, stream).await {
            Ok(t) => t,
            Err(e) => {
                tracing::debug!("{} start time unavailable: {}", stream, e);
                DEFAULT_START_TIME
            }
        }
    }
}
