//! Encoder command-line construction.

use std::path::Path;

use autovhs_av::probe::DEFAULT_FPS;
use autovhs_av::vspipe::DEFAULT_PIX_FMT;
use autovhs_av::ScriptInfo;

use crate::config::{Encoder, EncodingConfig};

/// Frame width assumed when the generator does not report one.
pub const DEFAULT_WIDTH: u32 = 720;
/// Frame height assumed when the generator does not report one.
pub const DEFAULT_HEIGHT: u32 = 576;

/// Description of the raw frames flowing from generator to encoder.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamGeometry {
    pub width: u32,
    pub height: u32,
    pub pix_fmt: String,
    pub fps: f64,
}

impl Default for StreamGeometry {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            pix_fmt: DEFAULT_PIX_FMT.to_string(),
            fps: DEFAULT_FPS,
        }
    }
}

impl StreamGeometry {
    /// Geometry from a `vspipe --info` report, filling gaps with defaults.
    pub fn from_info(info: &ScriptInfo) -> Self {
        Self {
            width: info.width.filter(|w| *w > 0).unwrap_or(DEFAULT_WIDTH),
            height: info.height.filter(|h| *h > 0).unwrap_or(DEFAULT_HEIGHT),
            pix_fmt: info.pix_fmt().to_string(),
            fps: info.fps.filter(|f| *f > 0.0).unwrap_or(DEFAULT_FPS),
        }
    }
}

/// Audio filters for a drift correction factor and constant delay.
pub fn audio_filters(correction_factor: f64, audio_offset: f64) -> Option<String> {
    let mut filters = Vec::new();

    if (correction_factor - 1.0).abs() > f64::EPSILON {
        filters.push(format!("atempo={:.6}", correction_factor));
    }
    if audio_offset != 0.0 {
        let delay_ms = (audio_offset * 1000.0) as i64;
        filters.push(format!("adelay={delay_ms}|{delay_ms}"));
    }

    if filters.is_empty() {
        None
    } else {
        Some(filters.join(","))
    }
}

/// Build ffmpeg arguments (without the program) that read raw frames from
/// stdin, take audio from `source`, and write `output`.
pub fn build_encoder_args(
    source: &Path,
    output: &Path,
    geometry: &StreamGeometry,
    correction_factor: f64,
    encoding: &EncodingConfig,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-y".into(),
        "-f".into(),
        "rawvideo".into(),
        "-vcodec".into(),
        "rawvideo".into(),
        "-s".into(),
        format!("{}x{}", geometry.width, geometry.height),
        "-r".into(),
        geometry.fps.to_string(),
        "-pix_fmt".into(),
        geometry.pix_fmt.clone(),
        "-i".into(),
        "-".into(),
        "-i".into(),
        source.to_string_lossy().into_owned(),
        "-map".into(),
        "0:v:0".into(),
        "-map".into(),
        "1:a:0".into(),
    ];

    let video: &[&str] = match encoding.encoder {
        Encoder::Prores => &[
            "-c:v",
            "prores_ks",
            "-profile:v",
            "3",
            "-vendor",
            "apl0",
            "-bits_per_mb",
            "8000",
            "-pix_fmt",
            "yuv422p10le",
        ],
        Encoder::Av1 => &[
            "-c:v",
            "libsvtav1",
            "-preset",
            "6",
            "-crf",
            "22",
            "-pix_fmt",
            "yuv420p10le",
        ],
    };
    args.extend(video.iter().map(|s| s.to_string()));

    if let Some(filters) = audio_filters(correction_factor, encoding.audio_sync_offset) {
        args.push("-af".into());
        args.push(filters);
    }

    args.extend([
        "-c:a".to_string(),
        encoding.audio_codec.clone(),
        "-b:a".to_string(),
        encoding.audio_bitrate.clone(),
        output.to_string_lossy().into_owned(),
    ]);

    args
}
