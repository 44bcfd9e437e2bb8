//! autovhs - Deinterlacing and restoration pipeline for captured tapes
//!
//! This library crate exposes the core functionality for integration testing.

pub mod config;
pub mod inputs;
pub mod pipeline;
pub mod script;
pub mod signal;
