mod cli;

use autovhs::config::{self, Config, ProgressStyle};
use autovhs::inputs;
use autovhs::pipeline::{
    Collaborators, FfmpegProgressMonitor, JobController, NoProgress, ProcessManager,
    ProgressSink, TerminalProgress, TracingProgress,
};
use autovhs::script::{HardwareSettings, VapourSynthScript};
use autovhs::signal::shutdown_signal;
use autovhs_av::{FfprobeProbe, MediaProbe, StreamSelector, ToolRegistry, VspipeInfoQuery};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Exit code after an interrupt (128 + SIGINT).
const EXIT_INTERRUPTED: i32 = 130;

/// How long an interrupted batch may take to clean up after the sweep.
const INTERRUPT_CLEANUP: Duration = Duration::from_secs(5);

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            inputs,
            encoder,
            progress,
        } => {
            let mut config = config::load_config_or_default(cli.config.as_deref())?;
            if let Some(encoder) = encoder {
                config.encoding.encoder = encoder;
            }
            if let Some(progress) = progress {
                config.pipeline.progress = progress;
            }

            let verbose = cli.verbose || config.pipeline.debug_logging;
            let log_file = Some(config.pipeline.log_file.as_path())
                .filter(|p| !p.as_os_str().is_empty());
            init_logging(verbose, log_file);

            let rt = tokio::runtime::Runtime::new()?;
            let code = rt.block_on(run(config, inputs))?;
            drop(rt);
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
        Commands::Probe { file, json } => {
            init_logging(cli.verbose, None);
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe_file(&config, &file, json))
        }
        Commands::CheckTools => {
            init_logging(cli.verbose, None);
            let config = config::load_config_or_default(cli.config.as_deref())?;
            check_tools(&config)
        }
        Commands::Validate {
            config: config_path,
        } => {
            init_logging(cli.verbose, None);
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
    }
}

/// Console logging on stderr plus an optional debug log file.
///
/// `RUST_LOG` overrides the console level.
fn init_logging(verbose: bool, log_file: Option<&Path>) {
    let console_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("autovhs=debug,autovhs_av=debug")
        } else {
            EnvFilter::new("autovhs=info,autovhs_av=info")
        }
    });
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .with_filter(console_filter);

    let file_layer = log_file.and_then(|path| match std::fs::File::create(path) {
        Ok(file) => Some(
            fmt::layer()
                .with_writer(Arc::new(file))
                .with_ansi(false)
                .with_filter(EnvFilter::new("autovhs=debug,autovhs_av=debug")),
        ),
        Err(e) => {
            eprintln!("Cannot open debug log {}: {}", path.display(), e);
            None
        }
    });

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .init();
}

/// Process the batch; returns the process exit code.
async fn run(config: Config, inputs: Vec<PathBuf>) -> Result<i32> {
    let registry = ToolRegistry::discover(&config.tools.paths);
    let missing = registry.missing();
    if !missing.is_empty() {
        anyhow::bail!(
            "Missing required tools: {}. Install them or set their paths in [tools].",
            missing.join(", ")
        );
    }
    let ffmpeg = registry.require("ffmpeg")?.to_path_buf();
    let ffprobe = registry.require("ffprobe")?.to_path_buf();
    let vspipe = registry.require("vspipe")?.to_path_buf();

    let files = inputs::collect_inputs(&inputs);
    if files.is_empty() {
        tracing::info!("No valid video files found");
        return Ok(0);
    }
    tracing::info!(
        "Queue: {} video(s), encoder {}, mode {}",
        files.len(),
        config.encoding.encoder,
        config.deinterlace.mode
    );

    let hardware = HardwareSettings::detect(&config.performance);
    let probe: Arc<dyn MediaProbe> = Arc::new(FfprobeProbe::new(ffprobe));
    let sink: Box<dyn ProgressSink> = match config.pipeline.progress {
        ProgressStyle::Bar => Box::new(TerminalProgress::stderr()),
        ProgressStyle::Log => Box::new(TracingProgress::default()),
        ProgressStyle::None => Box::new(NoProgress),
    };
    let collaborators = Collaborators {
        scripts: Arc::new(VapourSynthScript::new(
            config.deinterlace.clone(),
            hardware,
            Arc::clone(&probe),
        )),
        geometry: Arc::new(
            VspipeInfoQuery::new(vspipe.clone())
                .with_timeout(config.pipeline.info_timeout())
                .with_env(config.tools.generator_env.clone()),
        ),
        monitor: Arc::new(FfmpegProgressMonitor),
        probe,
        sink,
    };

    let grace = config.pipeline.shutdown_grace();
    let processes = Arc::new(ProcessManager::new());
    let mut controller =
        JobController::new(config, vspipe, ffmpeg, collaborators, Arc::clone(&processes));

    let batch = controller.run_batch(&files);
    tokio::pin!(batch);

    tokio::select! {
        summary = &mut batch => {
            processes.shutdown(grace).await;
            tracing::info!("All tasks finished: {}", summary);
            Ok(0)
        }
        _ = shutdown_signal() => {
            tracing::warn!("Interrupted, stopping running processes");
            let (report, finished) = tokio::join!(
                processes.shutdown(grace),
                tokio::time::timeout(grace + INTERRUPT_CLEANUP, &mut batch),
            );
            tracing::info!(
                "Shutdown: {} terminated, {} killed",
                report.terminated,
                report.killed
            );
            match finished {
                Ok(summary) => tracing::info!("Stopped early: {}", summary),
                Err(_) => tracing::warn!("Current job did not stop in time"),
            }
            Ok(EXIT_INTERRUPTED)
        }
    }
}

#[derive(Debug, Serialize)]
struct ProbeReport {
    file: PathBuf,
    video_duration: f64,
    audio_duration: f64,
    fps: f64,
    video_start_time: f64,
    audio_start_time: f64,
}

async fn probe_file(config: &Config, file: &Path, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let registry = ToolRegistry::discover(&config.tools.paths);
    let probe = FfprobeProbe::new(registry.require("ffprobe")?.to_path_buf());

    let report = ProbeReport {
        file: file.to_path_buf(),
        video_duration: probe.duration(file, StreamSelector::Video).await,
        audio_duration: probe.duration(file, StreamSelector::Audio).await,
        fps: probe.fps(file).await,
        video_start_time: probe.start_time(file, StreamSelector::Video).await,
        audio_start_time: probe.start_time(file, StreamSelector::Audio).await,
    };

    if json {
        let json_str = serde_json::to_string_pretty(&report)?;
        println!("{}", json_str);
    } else {
        println!("File: {}", report.file.display());
        println!("Video duration: {:.3}s", report.video_duration);
        println!("Audio duration: {:.3}s", report.audio_duration);
        println!("Frame rate: {:.3} fps", report.fps);
        println!("Video start: {:.3}s", report.video_start_time);
        println!("Audio start: {:.3}s", report.audio_start_time);
        println!(
            "A/V difference: {:+.3}s",
            report.audio_duration - report.video_duration
        );
    }

    Ok(())
}

fn check_tools(config: &Config) -> Result<()> {
    println!("Checking external tools...\n");

    let tools = ToolRegistry::discover(&config.tools.paths).check_all();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install them before running the pipeline.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            config::load_config(p).with_context(|| format!("Invalid config {:?}", p))?
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    println!("✓ Configuration is valid");
    println!(
        "  Encoder: {} (suffix {}{})",
        config.encoding.encoder,
        config.encoding.suffix(),
        config.encoding.encoder.extension()
    );
    println!(
        "  Audio: {} @ {}, offset {:+.3}s",
        config.encoding.audio_codec, config.encoding.audio_bitrate, config.encoding.audio_sync_offset
    );
    println!(
        "  Drift correction: {} (min {:.3}s, max {:.2}%)",
        if config.sync.auto_drift_correction { "on" } else { "off" },
        config.sync.min_drift_seconds,
        config.sync.max_drift_percent
    );
    println!(
        "  Deinterlace: {} ({:?}, {:?})",
        config.deinterlace.mode, config.deinterlace.field_order, config.deinterlace.tv_standard
    );
    println!("  Performance profile: {:?}", config.performance.profile);

    Ok(())
}
