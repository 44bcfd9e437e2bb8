//! # autovhs-av
//!
//! External media tool management and probing for the autovhs restoration
//! pipeline.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg,
//!   ffprobe and vspipe, honoring configured overrides.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout
//!   support for short-lived tool queries.
//! - **Probing** ([`MediaProbe`], [`FfprobeProbe`]) -- stream duration, frame
//!   rate and start time with safe defaults.
//! - **vspipe helpers** ([`vspipe`]) -- `--info` parsing, clip geometry
//!   queries and VapourSynth to ffmpeg pixel format mapping.

pub mod command;
pub mod error;
pub mod probe;
pub mod tools;
pub mod vspipe;

// ---- Re-exports for convenience ----

pub use command::{ToolCommand, ToolOutput};
pub use error::{Error, Result};
pub use probe::{FfprobeProbe, MediaProbe, StreamSelector};
pub use tools::{ToolInfo, ToolPaths, ToolRegistry, KNOWN_TOOLS};
pub use vspipe::{GeometryQuery, ScriptInfo, VspipeInfoQuery};
