//! Per-file job state machine.
//!
//! ```text
//! START -> RESUME_CHECK -> SKIPPED ------------------------------+
//!                       \-> ARTIFACT_CHECK -> RUNNING -> COMMIT --+-> CLEANUP -> DONE
//!                                                   \-> FAILED --+
//! ```
//!
//! The final output is only ever produced by renaming the finished temporary
//! output, so an interrupted run leaves either nothing or a `_part` file that
//! the next run overwrites.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use autovhs_av::{GeometryQuery, MediaProbe, ScriptInfo, StreamSelector};

use crate::config::{Config, EncodingConfig};
use crate::script::ScriptGenerator;

use super::cleanup::{remove_file_logged, remove_stale_artifacts, SCRIPT_SUFFIX};
use super::drift::{compute_drift, DriftDecision};
use super::encoder::{build_encoder_args, StreamGeometry};
use super::error::{PipelineError, Result};
use super::launcher::{launch, CommandSpec};
use super::process::ProcessManager;
use super::progress::{estimate, ProgressMonitor, ProgressSink, ProgressUpdate};

const PROGRESS_STAGE: &str = "Encoding";
const PROGRESS_SOURCE: &str = "FFmpeg";

/// Paths involved in restoring one input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub input: PathBuf,
    /// `<stem><suffix><ext>` next to the input.
    pub output: PathBuf,
    /// `<output stem>_part<ext>`; keeps the container extension so the
    /// encoder picks the right muxer.
    pub temp_output: PathBuf,
    /// `<stem>_temp_script.vpy` next to the input.
    pub script: PathBuf,
}

impl Job {
    pub fn new(input: impl Into<PathBuf>, encoding: &EncodingConfig) -> Self {
        let input = input.into();
        let dir = input.parent().map(Path::to_path_buf).unwrap_or_default();
        let stem = file_stem(&input);
        let ext = encoding.encoder.extension();

        let output_stem = format!("{}{}", stem, encoding.suffix());
        Self {
            output: dir.join(format!("{}{}", output_stem, ext)),
            temp_output: dir.join(format!("{}_part{}", output_stem, ext)),
            script: dir.join(format!("{}{}", stem, SCRIPT_SUFFIX)),
            input,
        }
    }

    /// Directory holding the input and every artifact of the job.
    pub fn work_dir(&self) -> &Path {
        match self.input.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }

    pub fn stem(&self) -> String {
        file_stem(&self.input)
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// States of [`JobController::process`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Start,
    ResumeCheck,
    Skipped,
    ArtifactCheck,
    Running,
    Commit,
    Failed,
    Cleanup,
    Done,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Start => "START",
            JobState::ResumeCheck => "RESUME_CHECK",
            JobState::Skipped => "SKIPPED",
            JobState::ArtifactCheck => "ARTIFACT_CHECK",
            JobState::Running => "RUNNING",
            JobState::Commit => "COMMIT",
            JobState::Failed => "FAILED",
            JobState::Cleanup => "CLEANUP",
            JobState::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// How a job ended.
#[derive(Debug)]
pub enum JobOutcome {
    /// A valid output already existed.
    Skipped,
    /// The output was written to the contained path.
    Completed(PathBuf),
    Failed(PipelineError),
}

/// Counts of a finished batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub done: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.done + self.skipped + self.failed
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} done, {} skipped, {} failed",
            self.done, self.skipped, self.failed
        )
    }
}

/// Everything resolved before the processes start.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    pub geometry: StreamGeometry,
    pub drift: DriftDecision,
    /// Expected output duration in seconds, used for progress.
    pub total_duration: f64,
}

/// External services a controller depends on.
pub struct Collaborators {
    pub probe: Arc<dyn MediaProbe>,
    pub scripts: Arc<dyn ScriptGenerator>,
    pub geometry: Arc<dyn GeometryQuery>,
    pub monitor: Arc<dyn ProgressMonitor>,
    pub sink: Box<dyn ProgressSink>,
}

/// Runs jobs one at a time.
pub struct JobController {
    config: Config,
    vspipe: PathBuf,
    ffmpeg: PathBuf,
    collaborators: Collaborators,
    processes: Arc<ProcessManager>,
}

impl JobController {
    pub fn new(
        config: Config,
        vspipe: impl Into<PathBuf>,
        ffmpeg: impl Into<PathBuf>,
        collaborators: Collaborators,
        processes: Arc<ProcessManager>,
    ) -> Self {
        Self {
            config,
            vspipe: vspipe.into(),
            ffmpeg: ffmpeg.into(),
            collaborators,
            processes,
        }
    }

    pub fn processes(&self) -> &Arc<ProcessManager> {
        &self.processes
    }

    /// Process every input in order. Failures are counted, never fatal.
    pub async fn run_batch(&mut self, inputs: &[PathBuf]) -> BatchSummary {
        let mut summary = BatchSummary::default();
        let count = inputs.len();

        for (i, input) in inputs.iter().enumerate() {
            tracing::info!("Processing {}/{}: {}", i + 1, count, input.display());

            match self.process(input).await {
                JobOutcome::Skipped => summary.skipped += 1,
                JobOutcome::Completed(_) => summary.done += 1,
                JobOutcome::Failed(_) => summary.failed += 1,
            }

            if self.processes.is_shutting_down() {
                tracing::warn!("Shutdown requested, stopping the queue");
                break;
            }
        }

        summary
    }

    /// Run one job through the state machine.
    pub async fn process(&mut self, input: &Path) -> JobOutcome {
        if !input.exists() {
            let err = PipelineError::InputMissing(input.to_path_buf());
            tracing::error!("{}", err);
            return JobOutcome::Failed(err);
        }

        let job = Job::new(input, &self.config.encoding);
        let name = job
            .input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        tracing::info!("Job start: {}", name);

        let mut state = JobState::Start;
        transition(&mut state, JobState::ResumeCheck, &name);

        let outcome = if self.output_is_valid(&job).await {
            transition(&mut state, JobState::Skipped, &name);
            tracing::info!("Output exists and is valid, skipping: {}", job.output.display());
            JobOutcome::Skipped
        } else {
            transition(&mut state, JobState::ArtifactCheck, &name);
            let removed = remove_stale_artifacts(job.work_dir(), &job.stem());
            if removed > 0 {
                tracing::info!("Removed {} stale artifact(s)", removed);
            }

            transition(&mut state, JobState::Running, &name);
            match self.run(&job, &mut state, &name).await {
                Ok(path) => {
                    tracing::info!("Finished: {}", path.display());
                    JobOutcome::Completed(path)
                }
                Err(err) => {
                    transition(&mut state, JobState::Failed, &name);
                    report_failure(&err);
                    JobOutcome::Failed(err)
                }
            }
        };

        transition(&mut state, JobState::Cleanup, &name);
        remove_file_logged(&job.script);
        remove_stale_artifacts(job.work_dir(), &job.stem());

        transition(&mut state, JobState::Done, &name);
        outcome
    }

    /// Whether a previous run already produced a usable output.
    async fn output_is_valid(&self, job: &Job) -> bool {
        if !job.output.exists() {
            return false;
        }

        let duration = self
            .collaborators
            .probe
            .duration(&job.output, StreamSelector::Video)
            .await;
        if duration > 0.0 {
            return true;
        }

        tracing::warn!(
            "Output exists but looks corrupt (zero duration), overwriting: {}",
            job.output.display()
        );
        false
    }

    /// Generate the script and resolve geometry, duration and drift.
    pub async fn plan(&self, job: &Job) -> Result<RunPlan> {
        tracing::info!("Generating {} script", self.config.deinterlace.mode);
        self.collaborators
            .scripts
            .generate(&job.input, &job.script, self.config.deinterlace.mode)
            .await?;

        let info = self.collaborators.geometry.info(&job.script).await;
        let geometry = StreamGeometry::from_info(&info);
        tracing::info!(
            "Stream format: {} -> {} ({}x{} @ {:.3} fps)",
            info.format_name.as_deref().unwrap_or("unknown"),
            geometry.pix_fmt,
            geometry.width,
            geometry.height,
            geometry.fps
        );

        let total_duration = match script_duration(&info) {
            Some(duration) => duration,
            None => {
                self.collaborators
                    .probe
                    .duration(&job.input, StreamSelector::Video)
                    .await
            }
        };
        tracing::info!("Source duration: ~{:.2} min", total_duration / 60.0);

        let audio_duration = self
            .collaborators
            .probe
            .duration(&job.input, StreamSelector::Audio)
            .await;
        let drift = compute_drift(total_duration, audio_duration, &self.config.sync);
        tracing::info!("Sync: {}", drift.reason);

        Ok(RunPlan {
            geometry,
            drift,
            total_duration,
        })
    }

    /// The generator and encoder command lines for `job`.
    pub fn commands(&self, job: &Job, plan: &RunPlan) -> (CommandSpec, CommandSpec) {
        let generator = CommandSpec::new(&self.vspipe)
            .arg(job.script.to_string_lossy())
            .arg("-")
            .envs(&self.config.tools.generator_env);

        let encoder = CommandSpec::new(&self.ffmpeg).args(build_encoder_args(
            &job.input,
            &job.temp_output,
            &plan.geometry,
            plan.drift.factor,
            &self.config.encoding,
        ));

        (generator, encoder)
    }

    async fn run(&mut self, job: &Job, state: &mut JobState, name: &str) -> Result<PathBuf> {
        let plan = self.plan(job).await?;
        let (generator, encoder) = self.commands(job, &plan);
        tracing::debug!("Generator: {}", generator);
        tracing::debug!("Encoder: {}", encoder);

        tracing::info!("Encoding to: {}", job.output.display());
        let mut running = launch(&self.processes, &generator, &encoder)?;

        let total = plan.total_duration;
        let Collaborators { monitor, sink, .. } = &mut self.collaborators;
        let result = running
            .wait(self.config.pipeline.diagnostic_tail_lines, |line| {
                let Some(sample) = monitor.parse_line(line) else {
                    return;
                };
                let Some(est) = estimate(&sample, total) else {
                    return;
                };
                let update = ProgressUpdate::new(&sample, &est, total, PROGRESS_STAGE, PROGRESS_SOURCE);
                if let Err(e) = sink.report(&update) {
                    tracing::debug!("Progress report failed: {}", e);
                }
            })
            .await;
        drop(running);

        if let Err(e) = sink.finish() {
            tracing::debug!("Progress finish failed: {}", e);
        }

        let outcome = result?;
        if !outcome.encoder_status.success() {
            return Err(PipelineError::EncoderFailure {
                status: outcome.encoder_status,
                tail: outcome.tail,
            });
        }
        if !outcome.generator_status.success() {
            tracing::warn!("vspipe exited with {}", outcome.generator_status);
        }

        transition(state, JobState::Commit, name);
        commit(&job.temp_output, &job.output).await?;
        Ok(job.output.clone())
    }
}

/// Duration implied by the script's frame count and rate.
fn script_duration(info: &ScriptInfo) -> Option<f64> {
    let frames = info.frames.filter(|f| *f > 0)?;
    let fps = info
        .fps
        .filter(|f| *f > 0.0)
        .unwrap_or(autovhs_av::probe::DEFAULT_FPS);
    Some(frames as f64 / fps)
}

/// Atomically move the finished temporary output into place.
async fn commit(temp: &Path, output: &Path) -> Result<()> {
    tokio::fs::rename(temp, output)
        .await
        .map_err(|source| PipelineError::CommitFailure {
            from: temp.to_path_buf(),
            to: output.to_path_buf(),
            source,
        })
}

fn transition(state: &mut JobState, next: JobState, name: &str) {
    tracing::debug!("{}: {} -> {}", name, state, next);
    *state = next;
}

fn report_failure(err: &PipelineError) {
    tracing::error!("Job failed: {}", err);
    if let PipelineError::EncoderFailure { tail, .. } = err {
        tracing::error!("Last {} lines of encoder output:", tail.len());
        for line in tail {
            tracing::error!("   {}", line);
        }
    }
}
