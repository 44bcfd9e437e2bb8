//! Integration tests for configuration loading.

use std::fs;
use std::path::PathBuf;

use autovhs::config::{
    load_config, load_config_or_default, Encoder, FieldOrder, PerfProfile, ProgressStyle,
    TvStandard,
};

fn example_config() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("autovhs.example.toml")
}

#[test]
fn example_config_matches_defaults() {
    let config = load_config(&example_config()).unwrap();

    assert_eq!(config.encoding.encoder, Encoder::Prores);
    assert_eq!(config.encoding.audio_bitrate, "320k");
    assert_eq!(config.sync.min_drift_seconds, 0.05);
    assert_eq!(config.deinterlace.field_order, FieldOrder::Tff);
    assert_eq!(config.deinterlace.tv_standard, TvStandard::Ntsc);
    assert_eq!(config.deinterlace.qtgmc.source_match, 3);
    assert_eq!(config.performance.profile, PerfProfile::Auto);
    assert!(config.tools.paths.ffmpeg_path.is_none());
    assert!(config.tools.generator_env.is_empty());
    assert_eq!(config.pipeline.progress, ProgressStyle::Bar);
    assert_eq!(config.pipeline.shutdown_grace_ms, 500);
}

#[test]
fn tool_paths_and_generator_env() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("autovhs.toml");
    fs::write(
        &path,
        r#"
[tools]
vspipe_path = "/opt/vs/bin/vspipe"

[tools.generator_env]
PYTHONPATH = "/opt/vs/site-packages"

[performance]
profile = "manual"
cpu_threads = 4
"#,
    )
    .unwrap();

    let config = load_config_or_default(Some(&path)).unwrap();
    assert_eq!(
        config.tools.paths.vspipe_path,
        Some(PathBuf::from("/opt/vs/bin/vspipe"))
    );
    assert_eq!(
        config.tools.generator_env.get("PYTHONPATH").map(String::as_str),
        Some("/opt/vs/site-packages")
    );
    assert_eq!(config.performance.profile, PerfProfile::Manual);
    assert_eq!(config.performance.cpu_threads, 4);
    assert_eq!(config.performance.ram_cache_mb, 4000);
}

#[test]
fn unknown_enum_value_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("autovhs.toml");
    fs::write(&path, "[deinterlace]\ntv_standard = \"secam\"\n").unwrap();

    let err = load_config(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to parse config file"));
}

#[test]
fn missing_explicit_config_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(load_config_or_default(Some(&dir.path().join("absent.toml"))).is_err());
}
