//! FFprobe-backed [`MediaProbe`] implementation.
//!
//! Every query asks ffprobe for a single entry printed without keys or
//! wrappers, so the output is one scalar per line.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use super::{MediaProbe, StreamSelector};
use crate::command::ToolCommand;
use crate::{Error, Result};

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// A prober backed by the `ffprobe` CLI.
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    ffprobe_path: PathBuf,
}

impl FfprobeProbe {
    /// Create a new prober using the given ffprobe path.
    pub fn new(ffprobe_path: PathBuf) -> Self {
        Self { ffprobe_path }
    }

    /// Run one `-show_entries` query and return raw stdout.
    async fn query(
        &self,
        path: &Path,
        stream: Option<StreamSelector>,
        entry: &str,
    ) -> Result<String> {
        let mut cmd = ToolCommand::new(self.ffprobe_path.clone());
        cmd.timeout(PROBE_TIMEOUT);
        cmd.args(["-v", "error"]);
        if let Some(stream) = stream {
            cmd.args(["-select_streams", stream.specifier()]);
        }
        cmd.args([
            "-show_entries",
            entry,
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ]);
        cmd.path_arg(path);

        Ok(cmd.execute().await?.stdout)
    }
}

#[async_trait]
impl MediaProbe for FfprobeProbe {
    async fn try_duration(&self, path: &Path, stream: StreamSelector) -> Result<f64> {
        let out = self.query(path, Some(stream), "stream=duration").await?;
        if let Some(d) = parse_scalar(&out) {
            return Ok(d);
        }

        tracing::debug!(
            "No {} stream duration for {:?}, trying container duration",
            stream,
            path
        );
        let out = self.query(path, None, "format=duration").await?;
        parse_scalar(&out).ok_or_else(|| {
            Error::probe_unavailable(path, format!("no duration in output {:?}", out.trim()))
        })
    }

    async fn try_fps(&self, path: &Path) -> Result<f64> {
        let out = self
            .query(path, Some(StreamSelector::Video), "stream=r_frame_rate")
            .await?;
        first_value(&out)
            .and_then(parse_frame_rate)
            .ok_or_else(|| {
                Error::probe_unavailable(path, format!("no frame rate in output {:?}", out.trim()))
            })
    }

    async fn try_start_time(&self, path: &Path, stream: StreamSelector) -> Result<f64> {
        let out = self.query(path, Some(stream), "stream=start_time").await?;
        parse_scalar(&out).ok_or_else(|| {
            Error::probe_unavailable(path, format!("no start time in output {:?}", out.trim()))
        })
    }
}

fn first_value(output: &str) -> Option<&str> {
    output.lines().map(str::trim).find(|l| !l.is_empty())
}

/// Parse the first line of a scalar ffprobe answer.
///
/// Returns `None` for empty output, the `N/A` sentinel and anything that is
/// not a finite number.
pub fn parse_scalar(output: &str) -> Option<f64> {
    let value = first_value(output)?;
    if value.eq_ignore_ascii_case("N/A") {
        return None;
    }
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a frame rate given as `num/den` or as a decimal.
pub fn parse_frame_rate(rate_str: &str) -> Option<f64> {
    let rate_str = rate_str.trim();
    if let Some((num, den)) = rate_str.split_once('/') {
        let num: f64 = num.trim().parse().ok()?;
        let den: f64 = den.trim().parse().ok()?;
        if den != 0.0 && num > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    rate_str.parse().ok().filter(|v: &f64| v.is_finite() && *v > 0.0)
}
