//! VapourSynth `vspipe` helpers.
//!
//! `vspipe --info` reports the geometry of the clip a script outputs; the
//! pipeline needs it to describe the raw frames it pipes into the encoder.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::command::ToolCommand;
use crate::Result;

/// Pixel format handed to the encoder when the script format is unknown.
pub const DEFAULT_PIX_FMT: &str = "yuv420p16le";

/// Substrings that mark a vspipe diagnostic line as an error.
const FAILURE_MARKERS: &[&str] = &["Script execution failed", "Error", "Failed"];

/// Clip properties reported by `vspipe --info`.
///
/// Every field is optional: lines that are missing or malformed leave the
/// corresponding value unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptInfo {
    pub frames: Option<u64>,
    pub fps: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub format_name: Option<String>,
}

impl ScriptInfo {
    /// Encoder pixel format for the reported clip format.
    pub fn pix_fmt(&self) -> &'static str {
        self.format_name
            .as_deref()
            .and_then(ffmpeg_pix_fmt)
            .unwrap_or(DEFAULT_PIX_FMT)
    }
}

/// Parse the text printed by `vspipe --info`.
pub fn parse_info_output(output: &str) -> ScriptInfo {
    let mut info = ScriptInfo::default();

    for line in output.lines().map(str::trim) {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();

        match key.trim() {
            "Frames" => info.frames = value.parse().ok(),
            "Width" => info.width = value.parse().ok(),
            "Height" => info.height = value.parse().ok(),
            "Format Name" if !value.is_empty() => info.format_name = Some(value.to_string()),
            // "FPS: 30000/1001 (29.970 fps)"
            "FPS" => {
                let rate = value.split('(').next().unwrap_or_default();
                info.fps = crate::probe::parse_frame_rate(rate);
            }
            _ => {}
        }
    }

    info
}

/// Map a VapourSynth format name (case-insensitive) to the matching ffmpeg
/// `-pix_fmt`.
pub fn ffmpeg_pix_fmt(vs_format: &str) -> Option<&'static str> {
    let fmt = match vs_format.trim().to_ascii_uppercase().as_str() {
        "YUV420P8" => "yuv420p",
        "YUV420P10" => "yuv420p10le",
        "YUV420P12" => "yuv420p12le",
        "YUV420P14" => "yuv420p14le",
        "YUV420P16" => "yuv420p16le",
        "YUV422P8" => "yuv422p",
        "YUV422P10" => "yuv422p10le",
        "YUV422P16" => "yuv422p16le",
        "YUV444P8" => "yuv444p",
        "YUV444P10" => "yuv444p10le",
        "YUV444P16" => "yuv444p16le",
        "GRAY8" => "gray",
        "GRAY16" => "gray16le",
        _ => return None,
    };
    Some(fmt)
}

/// Whether a vspipe diagnostic line reports a failure.
pub fn is_failure_line(line: &str) -> bool {
    FAILURE_MARKERS.iter().any(|m| line.contains(m))
}

/// Source of clip geometry for a generated script.
#[async_trait]
pub trait GeometryQuery: Send + Sync {
    /// Query the clip produced by `script`.
    ///
    /// Failures are logged and produce an empty [`ScriptInfo`].
    async fn info(&self, script: &Path) -> ScriptInfo;
}

/// [`GeometryQuery`] backed by `vspipe --info`.
#[derive(Debug, Clone)]
pub struct VspipeInfoQuery {
    vspipe_path: PathBuf,
    timeout: Duration,
    env: BTreeMap<String, String>,
}

impl VspipeInfoQuery {
    pub fn new(vspipe_path: PathBuf) -> Self {
        Self {
            vspipe_path,
            timeout: Duration::from_secs(30),
            env: BTreeMap::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Extra environment for vspipe (plugin and Python search paths).
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Run `vspipe --info` and parse stdout and stderr together.
    pub async fn try_info(&self, script: &Path) -> Result<ScriptInfo> {
        let out = ToolCommand::new(self.vspipe_path.clone())
            .arg("--info")
            .path_arg(script)
            .envs(self.env.clone())
            .timeout(self.timeout)
            .execute()
            .await?;

        let mut combined = out.stdout;
        combined.push('\n');
        combined.push_str(&out.stderr);
        Ok(parse_info_output(&combined))
    }
}

#[async_trait]
impl GeometryQuery for VspipeInfoQuery {
    async fn info(&self, script: &Path) -> ScriptInfo {
        match self.try_info(script).await {
            Ok(info) => info,
            Err(e) => {
                tracing::error!("vspipe info check failed for {:?}: {}", script, e);
                ScriptInfo::default()
            }
        }
    }
}
