//! Shared test harness for pipeline integration tests.
//!
//! Provides in-process stand-ins for the probe, script generator and
//! geometry query, plus [`Workspace`] which writes small `sh` scripts that
//! play the parts of vspipe and ffmpeg.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use autovhs::config::{Config, DeinterlaceMode};
use autovhs::pipeline::{
    Collaborators, FfmpegProgressMonitor, JobController, PipelineError, ProcessManager,
    ProgressSink, ProgressUpdate,
};
use autovhs::script::ScriptGenerator;
use autovhs_av::{GeometryQuery, MediaProbe, ScriptInfo, StreamSelector};

/// Durations handed out by [`FakeProbe`].
#[derive(Debug, Clone, Copy)]
pub struct Durations {
    pub video: f64,
    pub audio: f64,
    /// Reported for any finished output (`*_deinterlaced*`).
    pub output: f64,
}

impl Default for Durations {
    fn default() -> Self {
        Self {
            video: 10.0,
            audio: 10.0,
            output: 10.0,
        }
    }
}

pub struct FakeProbe {
    pub durations: Durations,
}

#[async_trait]
impl MediaProbe for FakeProbe {
    async fn try_duration(&self, path: &Path, stream: StreamSelector) -> autovhs_av::Result<f64> {
        let name = path.file_name().unwrap().to_string_lossy();
        if name.contains("_deinterlaced") {
            return Ok(self.durations.output);
        }
        Ok(match stream {
            StreamSelector::Video => self.durations.video,
            StreamSelector::Audio => self.durations.audio,
        })
    }

    async fn try_fps(&self, _path: &Path) -> autovhs_av::Result<f64> {
        Ok(25.0)
    }

    async fn try_start_time(&self, _path: &Path, _stream: StreamSelector) -> autovhs_av::Result<f64> {
        Ok(0.0)
    }
}

/// Writes a placeholder script and counts calls.
///
/// After [`FakeScripts::fail`] it leaves a half-written script behind and
/// returns an error.
#[derive(Default)]
pub struct FakeScripts {
    pub calls: AtomicUsize,
    failing: AtomicBool,
}

impl FakeScripts {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ScriptGenerator for FakeScripts {
    async fn generate(
        &self,
        input: &Path,
        script_path: &Path,
        _mode: DeinterlaceMode,
    ) -> Result<(), PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let written = fs::write(script_path, format!("# {}\n", input.display()));
        let result = if self.failing.load(Ordering::SeqCst) {
            written.and(Err(std::io::Error::other("disk full")))
        } else {
            written
        };
        result.map_err(|source| PipelineError::Script {
            path: script_path.to_path_buf(),
            source,
        })
    }
}

/// Reports a fixed 10 second PAL clip.
pub struct FakeGeometry;

#[async_trait]
impl GeometryQuery for FakeGeometry {
    async fn info(&self, _script: &Path) -> ScriptInfo {
        ScriptInfo {
            frames: Some(250),
            fps: Some(25.0),
            width: Some(720),
            height: Some(576),
            format_name: Some("YUV420P16".to_string()),
        }
    }
}

/// Collects every progress update.
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub updates: Arc<Mutex<Vec<ProgressUpdate>>>,
}

impl ProgressSink for RecordingSink {
    fn report(&mut self, update: &ProgressUpdate) -> std::io::Result<()> {
        self.updates.lock().push(update.clone());
        Ok(())
    }
}

/// Generator that emits a few bytes of "frames".
pub const VSPIPE_OK: &str = "printf 'frames'";

/// Encoder that copies stdin to its last argument and reports progress.
pub const FFMPEG_OK: &str = r#"for last; do :; done
cat > "$last"
printf 'frame=  125 fps=25 time=00:00:05.00 speed=2.0x\r' >&2
printf 'frame=  250 fps=25 time=00:00:10.00 speed=2.0x\n' >&2"#;

/// Encoder that reports success without writing its output file.
pub const FFMPEG_NO_OUTPUT: &str = r#"cat > /dev/null
printf 'frame=  250 fps=25 time=00:00:10.00 speed=2.0x\n' >&2"#;

/// Generator that blocks until it is signalled.
pub const VSPIPE_HANG: &str = "exec sleep 30";

/// Encoder that waits for frames until it is signalled.
pub const FFMPEG_HANG: &str = "exec cat > /dev/null";

/// Encoder that drains stdin and fails.
pub const FFMPEG_FAIL: &str = r#"cat > /dev/null
echo "Input #0, rawvideo, from 'pipe:'" >&2
echo "Error while opening encoder" >&2
exit 1"#;

/// Temporary directory holding inputs and fake tools.
pub struct Workspace {
    pub dir: tempfile::TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Create an input file.
    pub fn input(&self, name: &str) -> PathBuf {
        let path = self.path().join(name);
        fs::write(&path, b"source").unwrap();
        path
    }

    /// Write an executable `sh` script named `name`.
    pub fn tool(&self, name: &str, body: &str) -> PathBuf {
        let bin = self.path().join("bin");
        fs::create_dir_all(&bin).unwrap();
        let path = bin.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }
}

/// A controller wired to fakes, with handles to inspect them.
pub struct Harness {
    pub controller: JobController,
    pub scripts: Arc<FakeScripts>,
    pub updates: Arc<Mutex<Vec<ProgressUpdate>>>,
    pub processes: Arc<ProcessManager>,
}

impl Harness {
    pub fn new(vspipe: PathBuf, ffmpeg: PathBuf, durations: Durations) -> Self {
        Self::with_config(Config::default(), vspipe, ffmpeg, durations)
    }

    pub fn with_config(config: Config, vspipe: PathBuf, ffmpeg: PathBuf, durations: Durations) -> Self {
        let scripts = Arc::new(FakeScripts::default());
        let sink = RecordingSink::default();
        let updates = Arc::clone(&sink.updates);
        let processes = Arc::new(ProcessManager::new());

        let collaborators = Collaborators {
            probe: Arc::new(FakeProbe { durations }),
            scripts: Arc::clone(&scripts) as Arc<dyn ScriptGenerator>,
            geometry: Arc::new(FakeGeometry),
            monitor: Arc::new(FfmpegProgressMonitor),
            sink: Box::new(sink),
        };

        Self {
            controller: JobController::new(
                config,
                vspipe,
                ffmpeg,
                collaborators,
                Arc::clone(&processes),
            ),
            scripts,
            updates,
            processes,
        }
    }
}

/// Wait until `count` processes are registered.
pub async fn wait_for_processes(processes: &ProcessManager, count: usize) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while processes.len() < count {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("pipeline processes were never registered");
}
