//! Audio/video drift measurement.
//!
//! Captures often carry audio that runs slightly longer than the video. When
//! the difference is small enough to be genuine drift, the audio is
//! time-stretched by `audio / video`; anything else is left alone.

use std::fmt;

use crate::config::SyncConfig;

/// Outcome of a drift check: the `atempo` factor to apply and why.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftDecision {
    pub factor: f64,
    pub reason: DriftReason,
}

impl DriftDecision {
    fn unchanged(reason: DriftReason) -> Self {
        Self {
            factor: 1.0,
            reason,
        }
    }

    /// Whether the audio will be time-stretched.
    pub fn is_corrected(&self) -> bool {
        matches!(self.reason, DriftReason::Corrected { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DriftReason {
    Disabled,
    /// Video duration was zero or unknown.
    NoVideoDuration,
    Negligible { drift: f64 },
    AudioShorter { drift: f64 },
    /// Drift beyond the configured percentage, assumed to be a misdetection.
    Excessive { drift: f64, percent: f64 },
    Corrected { drift: f64, percent: f64 },
}

impl fmt::Display for DriftReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriftReason::Disabled => write!(f, "Auto-drift correction disabled by config"),
            DriftReason::NoVideoDuration => {
                write!(f, "Video duration unknown, skipping drift correction")
            }
            DriftReason::Negligible { drift } => {
                write!(f, "In sync (drift {:.3}s), no correction needed", drift)
            }
            DriftReason::AudioShorter { drift } => {
                write!(f, "Audio is shorter than video by {:.3}s, ignoring", drift)
            }
            DriftReason::Excessive { drift, percent } => write!(
                f,
                "Drift too large ({:.2}% / {:.3}s), ignoring",
                percent, drift
            ),
            DriftReason::Corrected { drift, percent } => write!(
                f,
                "Correcting {:.3}s drift ({:.2}%)",
                drift, percent
            ),
        }
    }
}

/// Decide the audio correction factor for a pair of durations in seconds.
pub fn compute_drift(video_duration: f64, audio_duration: f64, config: &SyncConfig) -> DriftDecision {
    if !config.auto_drift_correction {
        return DriftDecision::unchanged(DriftReason::Disabled);
    }

    if !(video_duration.is_finite() && video_duration > 0.0) || !audio_duration.is_finite() {
        return DriftDecision::unchanged(DriftReason::NoVideoDuration);
    }

    let diff = audio_duration - video_duration;
    let drift = diff.abs();

    if drift <= config.min_drift_seconds {
        return DriftDecision::unchanged(DriftReason::Negligible { drift });
    }

    if diff < 0.0 {
        return DriftDecision::unchanged(DriftReason::AudioShorter { drift });
    }

    let percent = drift / video_duration * 100.0;
    if percent > config.max_drift_percent {
        return DriftDecision::unchanged(DriftReason::Excessive { drift, percent });
    }

    DriftDecision {
        factor: audio_duration / video_duration,
        reason: DriftReason::Corrected { drift, percent },
    }
}
