//! Encoder progress extraction and reporting.
//!
//! ffmpeg prints periodic status lines such as
//! `frame=  100 fps= 25 q=-0.0 size= 1024kB time=00:00:04.00 bitrate=... speed=1.5x`
//! on stderr. A [`ProgressMonitor`] turns those lines into
//! [`ProgressSample`]s; [`estimate`] derives percentage and ETA from a sample
//! and the expected total duration; a [`ProgressSink`] displays the result.

use std::io::{self, Write};
use std::sync::LazyLock;

use regex::Regex;

static TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"time=(\d{2}:\d{2}:\d{2}(?:\.\d+)?)").expect("time pattern is valid")
});

static SPEED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"speed=\s*(\d+\.?\d*)x").expect("speed pattern is valid"));

/// Shown instead of an ETA when the encode speed is unknown.
pub const UNKNOWN_ETA: &str = "--:--:--";

/// Progress extracted from one encoder diagnostic line.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSample {
    /// Encoded media time in seconds, millisecond precision. `None` when
    /// the timestamp could not be converted.
    pub elapsed_seconds: Option<f64>,
    /// `HH:MM:SS,mmm`, or the raw timestamp when conversion failed.
    pub timestamp: String,
    /// Encode speed normalized to two decimals, e.g. `1.50x`.
    pub speed: Option<String>,
}

impl ProgressSample {
    /// Numeric encode speed, if reported.
    pub fn speed_factor(&self) -> Option<f64> {
        self.speed
            .as_deref()
            .and_then(|s| s.trim_end_matches('x').parse().ok())
    }
}

/// Strategy for recognizing progress in encoder diagnostics.
pub trait ProgressMonitor: Send + Sync {
    /// Extract a sample from one line, or `None` if the line carries no
    /// progress.
    fn parse_line(&self, line: &str) -> Option<ProgressSample>;
}

/// Matches ffmpeg's classic `time=... speed=...x` status lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegProgressMonitor;

impl ProgressMonitor for FfmpegProgressMonitor {
    fn parse_line(&self, line: &str) -> Option<ProgressSample> {
        parse_line(line)
    }
}

/// Parse an ffmpeg status line.
pub fn parse_line(line: &str) -> Option<ProgressSample> {
    let raw = TIME_RE.captures(line)?.get(1)?.as_str();

    let (elapsed_seconds, timestamp) = match timestamp_millis(raw) {
        Some(ms) => (Some(ms as f64 / 1000.0), format_millis(ms)),
        None => (None, raw.to_string()),
    };

    let speed = SPEED_RE
        .captures(line)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(|v| format!("{:.2}x", v));

    Some(ProgressSample {
        elapsed_seconds,
        timestamp,
        speed,
    })
}

/// Convert `HH:MM:SS[.fraction]` to whole milliseconds.
///
/// Components are summed as given, so `00:75:99` is 4599 seconds.
fn timestamp_millis(raw: &str) -> Option<u64> {
    let mut parts = raw.split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || !seconds.is_finite() || seconds < 0.0 {
        return None;
    }

    let ms = (seconds * 1000.0).round() as u64;
    Some(hours * 3_600_000 + minutes * 60_000 + ms)
}

fn format_millis(total_ms: u64) -> String {
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms / 60_000) % 60;
    let seconds = (total_ms / 1000) % 60;
    let millis = total_ms % 1000;
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
}

/// Format a duration in seconds as `HH:MM:SS,mmm`.
pub fn format_timestamp(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return format_millis(0);
    }
    format_millis((seconds * 1000.0).round() as u64)
}

/// Format a duration in seconds as `HH:MM:SS`, truncating fractions.
pub fn format_eta(seconds: f64) -> String {
    let secs = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

/// Completion estimate derived from a sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressEstimate {
    /// 0.0..=100.0
    pub percent: f64,
    /// Remaining wall-clock seconds, when the encode speed is known.
    pub eta_seconds: Option<f64>,
}

impl ProgressEstimate {
    pub fn eta_display(&self) -> String {
        self.eta_seconds
            .map(format_eta)
            .unwrap_or_else(|| UNKNOWN_ETA.to_string())
    }
}

/// Estimate completion for `sample` against a `total` duration in seconds.
///
/// Returns `None` unless both the elapsed time and a positive total are
/// known.
pub fn estimate(sample: &ProgressSample, total: f64) -> Option<ProgressEstimate> {
    let elapsed = sample.elapsed_seconds?;
    if !(total.is_finite() && total > 0.0) {
        return None;
    }

    let percent = (elapsed / total * 100.0).clamp(0.0, 100.0);
    let eta_seconds = sample
        .speed_factor()
        .filter(|speed| *speed > 0.0)
        .map(|speed| (total - elapsed).max(0.0) / speed);

    Some(ProgressEstimate {
        percent,
        eta_seconds,
    })
}

/// One progress report handed to a [`ProgressSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub percent: f64,
    pub stage: String,
    /// `elapsed / total`, both as `HH:MM:SS,mmm`.
    pub elapsed: String,
    pub speed: Option<String>,
    pub eta: Option<String>,
    /// Name of the reporting process, e.g. `FFmpeg`.
    pub source: String,
}

impl ProgressUpdate {
    /// Build the update for a sample with a known estimate.
    pub fn new(
        sample: &ProgressSample,
        estimate: &ProgressEstimate,
        total: f64,
        stage: &str,
        source: &str,
    ) -> Self {
        Self {
            percent: estimate.percent,
            stage: stage.to_string(),
            elapsed: format!("{} / {}", sample.timestamp, format_timestamp(total)),
            speed: sample.speed.clone(),
            eta: Some(estimate.eta_display()),
            source: source.to_string(),
        }
    }
}

/// Destination for progress updates.
///
/// Callers log and ignore errors; a sink must never stall the caller.
pub trait ProgressSink: Send + Sync {
    fn report(&mut self, update: &ProgressUpdate) -> io::Result<()>;

    /// Called once after the last update of a run.
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

const BAR_WIDTH: usize = 20;

/// Render the single-line terminal bar:
/// `[FFmpeg] Encoding[████░░░░░░░░░░░░░░░░]  20.0% | 00:01:00,000 / 00:05:00,000 | ETA 00:03:45 | 1.50x`
pub fn render_bar(update: &ProgressUpdate) -> String {
    let percent = update.percent.clamp(0.0, 100.0);
    let filled = ((BAR_WIDTH as f64 * percent) / 100.0).floor() as usize;
    let filled = filled.min(BAR_WIDTH);
    let bar = format!("{}{}", "█".repeat(filled), "░".repeat(BAR_WIDTH - filled));

    let mut out = format!(
        "[{}] {}[{}] {:5.1}%",
        update.source, update.stage, bar, percent
    );
    if !update.elapsed.is_empty() {
        out.push_str(" | ");
        out.push_str(&update.elapsed);
    }
    if let Some(eta) = &update.eta {
        out.push_str(" | ETA ");
        out.push_str(eta);
    }
    if let Some(speed) = &update.speed {
        out.push_str(" | ");
        out.push_str(speed);
    }
    out
}

/// Redraws a progress bar in place on a terminal stream.
pub struct TerminalProgress<W: Write + Send + Sync = io::Stderr> {
    out: W,
    drawn: bool,
}

impl TerminalProgress {
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write + Send + Sync> TerminalProgress<W> {
    pub fn new(out: W) -> Self {
        Self { out, drawn: false }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send + Sync> ProgressSink for TerminalProgress<W> {
    fn report(&mut self, update: &ProgressUpdate) -> io::Result<()> {
        write!(self.out, "\r\x1b[K{}", render_bar(update))?;
        self.drawn = true;
        self.out.flush()
    }

    fn finish(&mut self) -> io::Result<()> {
        if std::mem::take(&mut self.drawn) {
            writeln!(self.out)?;
        }
        self.out.flush()
    }
}

/// Emits each update as an `info` event, for non-interactive runs.
#[derive(Debug, Default)]
pub struct TracingProgress {
    last_percent: Option<u32>,
}

impl ProgressSink for TracingProgress {
    fn report(&mut self, update: &ProgressUpdate) -> io::Result<()> {
        // One event per whole percent.
        let whole = update.percent.floor() as u32;
        if self.last_percent == Some(whole) {
            return Ok(());
        }
        self.last_percent = Some(whole);

        tracing::info!(
            source = %update.source,
            stage = %update.stage,
            elapsed = %update.elapsed,
            eta = update.eta.as_deref().unwrap_or(UNKNOWN_ETA),
            speed = update.speed.as_deref().unwrap_or("-"),
            "{:.1}%",
            update.percent
        );
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        self.last_percent = None;
        Ok(())
    }
}

/// Discards all updates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _update: &ProgressUpdate) -> io::Result<()> {
        Ok(())
    }
}
