mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./autovhs.toml",
        "./config.toml",
        "~/.config/autovhs/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    let sync = &config.sync;
    if !sync.min_drift_seconds.is_finite() || sync.min_drift_seconds < 0.0 {
        anyhow::bail!(
            "sync.min_drift_seconds must be a non-negative number, got {}",
            sync.min_drift_seconds
        );
    }
    if !sync.max_drift_percent.is_finite() || sync.max_drift_percent < 0.0 {
        anyhow::bail!(
            "sync.max_drift_percent must be a non-negative number, got {}",
            sync.max_drift_percent
        );
    }

    if config.encoding.audio_bitrate.trim().is_empty() {
        anyhow::bail!("encoding.audio_bitrate cannot be empty");
    }
    if config.encoding.audio_codec.trim().is_empty() {
        anyhow::bail!("encoding.audio_codec cannot be empty");
    }
    if !config.encoding.audio_sync_offset.is_finite() {
        anyhow::bail!("encoding.audio_sync_offset must be a finite number");
    }

    if config.pipeline.shutdown_grace_ms == 0 {
        anyhow::bail!("pipeline.shutdown_grace_ms must be greater than 0");
    }
    if config.pipeline.diagnostic_tail_lines == 0 {
        anyhow::bail!("pipeline.diagnostic_tail_lines must be greater than 0");
    }

    for path in &config.deinterlace.python_paths {
        if !path.exists() {
            tracing::warn!("Python path does not exist: {:?}", path);
        }
    }

    Ok(())
}
