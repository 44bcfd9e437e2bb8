use autovhs_av::ToolPaths;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub encoding: EncodingConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub deinterlace: DeinterlaceConfig,

    #[serde(default)]
    pub performance: PerformanceConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Output encoder profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Encoder {
    /// ProRes 422 HQ in a QuickTime container
    #[default]
    Prores,
    /// SVT-AV1 in a Matroska container
    Av1,
}

impl Encoder {
    /// Container extension of the final output, including the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Encoder::Prores => ".mov",
            Encoder::Av1 => ".mkv",
        }
    }
}

impl fmt::Display for Encoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Encoder::Prores => f.write_str("prores"),
            Encoder::Av1 => f.write_str("av1"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EncodingConfig {
    #[serde(default)]
    pub encoder: Encoder,

    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,

    /// Constant audio delay in seconds applied with `adelay`.
    #[serde(default)]
    pub audio_sync_offset: f64,

    #[serde(default = "default_output_suffix")]
    pub output_suffix: String,

    #[serde(default = "default_output_suffix_av1")]
    pub output_suffix_av1: String,
}

impl EncodingConfig {
    /// File name suffix for the active encoder.
    pub fn suffix(&self) -> &str {
        match self.encoder {
            Encoder::Prores => &self.output_suffix,
            Encoder::Av1 => &self.output_suffix_av1,
        }
    }
}

fn default_audio_codec() -> String {
    "aac".to_string()
}

fn default_audio_bitrate() -> String {
    "320k".to_string()
}

fn default_output_suffix() -> String {
    "_deinterlaced_prores".to_string()
}

fn default_output_suffix_av1() -> String {
    "_deinterlaced_av1".to_string()
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            encoder: Encoder::default(),
            audio_codec: default_audio_codec(),
            audio_bitrate: default_audio_bitrate(),
            audio_sync_offset: 0.0,
            output_suffix: default_output_suffix(),
            output_suffix_av1: default_output_suffix_av1(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    /// Time-stretch audio that runs longer than the video (default: true)
    #[serde(default = "default_true")]
    pub auto_drift_correction: bool,

    /// Drift at or below this many seconds is ignored
    #[serde(default = "default_min_drift_seconds")]
    pub min_drift_seconds: f64,

    /// Drift above this percentage of the video duration is treated as a
    /// misdetection and ignored
    #[serde(default = "default_max_drift_percent")]
    pub max_drift_percent: f64,
}

fn default_true() -> bool {
    true
}

fn default_min_drift_seconds() -> f64 {
    0.05
}

fn default_max_drift_percent() -> f64 {
    0.5
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_drift_correction: true,
            min_drift_seconds: default_min_drift_seconds(),
            max_drift_percent: default_max_drift_percent(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum DeinterlaceMode {
    #[default]
    #[serde(rename = "QTGMC", alias = "qtgmc")]
    Qtgmc,
}

impl fmt::Display for DeinterlaceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeinterlaceMode::Qtgmc => f.write_str("QTGMC"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldOrder {
    /// Top field first
    #[default]
    Tff,
    /// Bottom field first
    Bff,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TvStandard {
    #[default]
    Ntsc,
    Pal,
    /// Decide per file from the probed frame rate
    Auto,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DeinterlaceConfig {
    #[serde(default)]
    pub mode: DeinterlaceMode,

    #[serde(default)]
    pub field_order: FieldOrder,

    #[serde(default)]
    pub tv_standard: TvStandard,

    /// Extra Python module search paths written into generated scripts
    #[serde(default)]
    pub python_paths: Vec<PathBuf>,

    /// VapourSynth plugin libraries loaded explicitly by generated scripts
    #[serde(default)]
    pub plugins: Vec<PathBuf>,

    #[serde(default)]
    pub qtgmc: QtgmcConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QtgmcConfig {
    #[serde(default = "default_qtgmc_preset")]
    pub preset: String,

    #[serde(default = "default_source_match")]
    pub source_match: u8,

    #[serde(default = "default_lossless")]
    pub lossless: u8,

    #[serde(default)]
    pub ez_denoise: f64,

    #[serde(default)]
    pub noise_process: u8,

    #[serde(default)]
    pub sharpness: f64,
}

fn default_qtgmc_preset() -> String {
    "Very Slow".to_string()
}

fn default_source_match() -> u8 {
    3
}

fn default_lossless() -> u8 {
    2
}

impl Default for QtgmcConfig {
    fn default() -> Self {
        Self {
            preset: default_qtgmc_preset(),
            source_match: default_source_match(),
            lossless: default_lossless(),
            ez_denoise: 0.0,
            noise_process: 0,
            sharpness: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PerfProfile {
    /// Detect threads and GPU at startup
    #[default]
    Auto,
    /// Use the configured values as-is
    Manual,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PerformanceConfig {
    #[serde(default)]
    pub profile: PerfProfile,

    #[serde(default = "default_cpu_threads")]
    pub cpu_threads: usize,

    #[serde(default = "default_ram_cache_mb")]
    pub ram_cache_mb: u64,

    #[serde(default)]
    pub use_gpu_opencl: bool,
}

fn default_cpu_threads() -> usize {
    16
}

fn default_ram_cache_mb() -> u64 {
    4000
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            profile: PerfProfile::default(),
            cpu_threads: default_cpu_threads(),
            ram_cache_mb: default_ram_cache_mb(),
            use_gpu_opencl: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(flatten)]
    pub paths: ToolPaths,

    /// Extra environment variables for vspipe
    #[serde(default)]
    pub generator_env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStyle {
    /// Redrawn single-line terminal bar
    #[default]
    Bar,
    /// One log event per progress update
    Log,
    /// No progress output
    None,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Encoder diagnostic lines kept for failure reports
    #[serde(default = "default_tail_lines")]
    pub diagnostic_tail_lines: usize,

    /// Time between SIGTERM and SIGKILL during shutdown
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    /// Timeout for `vspipe --info`
    #[serde(default = "default_info_timeout_secs")]
    pub info_timeout_secs: u64,

    #[serde(default)]
    pub progress: ProgressStyle,

    #[serde(default)]
    pub debug_logging: bool,

    /// Debug log file; empty disables it
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
}

impl PipelineConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn info_timeout(&self) -> Duration {
        Duration::from_secs(self.info_timeout_secs)
    }
}

fn default_tail_lines() -> usize {
    20
}

fn default_shutdown_grace_ms() -> u64 {
    500
}

fn default_info_timeout_secs() -> u64 {
    30
}

fn default_log_file() -> PathBuf {
    PathBuf::from("autovhs_debug.log")
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            diagnostic_tail_lines: default_tail_lines(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            info_timeout_secs: default_info_timeout_secs(),
            progress: ProgressStyle::default(),
            debug_logging: false,
            log_file: default_log_file(),
        }
    }
}
