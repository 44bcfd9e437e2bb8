//! Generator → encoder process pair.
//!
//! The generator's stdout is handed to the encoder as its stdin, so frames
//! travel through a single kernel pipe with no copying in this process.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio::process::{Child, ChildStderr, Command};
use tokio::task::JoinHandle;
use tokio_util::codec::{AnyDelimiterCodec, FramedRead};

use super::error::{PipelineError, ProcessSide, Result};
use super::process::{ProcessManager, Registration};

/// Longest diagnostic line kept; longer chunks end line reading.
const MAX_DIAGNOSTIC_LINE: usize = 64 * 1024;

/// Program, arguments and extra environment for one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn envs(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env
            .extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).envs(&self.env).kill_on_drop(true);
        cmd
    }

    fn label(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.to_string_lossy().into_owned())
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            if arg.contains(char::is_whitespace) {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Exit statuses and trailing diagnostics of a finished pipeline.
#[derive(Debug)]
pub struct RunOutcome {
    pub encoder_status: ExitStatus,
    pub generator_status: ExitStatus,
    /// Last encoder diagnostic lines, oldest first.
    pub tail: Vec<String>,
}

/// Both processes of a running pipeline.
///
/// Dropping it kills any process still running and deregisters both.
#[derive(Debug)]
pub struct RunningPipeline {
    generator: Child,
    encoder: Child,
    diagnostics: Option<ChildStderr>,
    drain: Option<JoinHandle<()>>,
    _registrations: Vec<Registration>,
}

/// Start the generator and the encoder connected by an OS pipe and register
/// both with `processes`.
///
/// If the encoder cannot be started the generator is killed.
pub fn launch(
    processes: &Arc<ProcessManager>,
    generator: &CommandSpec,
    encoder: &CommandSpec,
) -> Result<RunningPipeline> {
    let launch_failure = |side: ProcessSide, spec: &CommandSpec, source: std::io::Error| {
        PipelineError::LaunchFailure {
            side,
            program: spec.program.clone(),
            source,
        }
    };

    let mut gen_cmd = generator.command();
    gen_cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut gen_child = gen_cmd
        .spawn()
        .map_err(|e| launch_failure(ProcessSide::Generator, generator, e))?;
    let mut registrations = Vec::with_capacity(2);
    registrations.extend(register(processes, &gen_child, generator));

    let frames = gen_child
        .stdout
        .take()
        .map(|stdout| -> std::io::Result<Stdio> { stdout.try_into() });
    let frames = match frames {
        Some(Ok(stdio)) => stdio,
        Some(Err(e)) => {
            kill_quietly(&mut gen_child);
            return Err(launch_failure(ProcessSide::Generator, generator, e));
        }
        None => {
            kill_quietly(&mut gen_child);
            return Err(launch_failure(
                ProcessSide::Generator,
                generator,
                std::io::Error::other("generator stdout was not captured"),
            ));
        }
    };

    let mut enc_cmd = encoder.command();
    enc_cmd
        .stdin(frames)
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    let spawned = enc_cmd.spawn();
    // Close our copy of the pipe so the generator sees EPIPE if the encoder
    // goes away.
    drop(enc_cmd);

    let mut enc_child = match spawned {
        Ok(child) => child,
        Err(e) => {
            kill_quietly(&mut gen_child);
            return Err(launch_failure(ProcessSide::Encoder, encoder, e));
        }
    };
    registrations.extend(register(processes, &enc_child, encoder));

    tracing::debug!(
        "Pipeline started: generator pid {:?}, encoder pid {:?}",
        gen_child.id(),
        enc_child.id()
    );

    let drain = gen_child
        .stderr
        .take()
        .map(|stderr| tokio::spawn(drain_generator_stderr(stderr)));

    Ok(RunningPipeline {
        diagnostics: enc_child.stderr.take(),
        generator: gen_child,
        encoder: enc_child,
        drain,
        _registrations: registrations,
    })
}

/// A child without a pid has already been reaped and is not tracked.
fn register(
    processes: &Arc<ProcessManager>,
    child: &Child,
    spec: &CommandSpec,
) -> Option<Registration> {
    match child.id() {
        Some(pid) => Some(processes.register(pid, spec.label())),
        None => {
            tracing::debug!("{} exited before it could be registered", spec.label());
            None
        }
    }
}

fn kill_quietly(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        tracing::debug!("Failed to kill child: {}", e);
    }
}

/// Split diagnostics on `\r` as well as `\n`; progress redraws use
/// carriage returns.
fn diagnostic_lines<R: AsyncRead>(reader: R) -> FramedRead<R, AnyDelimiterCodec> {
    let codec =
        AnyDelimiterCodec::new_with_max_length(b"\r\n".to_vec(), b"\n".to_vec(), MAX_DIAGNOSTIC_LINE);
    FramedRead::new(reader, codec)
}

/// Read `reader` to the end, discarding everything.
async fn discard<R: AsyncRead + Unpin>(mut reader: R, side: ProcessSide) {
    if let Err(e) = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await {
        tracing::debug!("Failed to drain {} output: {}", side, e);
    }
}

/// Log every generator diagnostic line; failure lines at error level.
///
/// The pipe stays open until the generator closes it, even when the output
/// is not valid UTF-8 or cannot be split into lines.
async fn drain_generator_stderr(stderr: ChildStderr) {
    let mut lines = diagnostic_lines(stderr);
    let mut broken = false;

    while let Some(chunk) = lines.next().await {
        match chunk {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                let line = text.trim();
                if line.is_empty() {
                    continue;
                }
                if autovhs_av::vspipe::is_failure_line(line) {
                    tracing::error!("[vspipe] {}", line);
                } else {
                    tracing::debug!("[vspipe] {}", line);
                }
            }
            Err(e) => {
                tracing::debug!("Stopped parsing vspipe output: {}", e);
                broken = true;
                break;
            }
        }
    }

    if broken {
        discard(lines.into_inner(), ProcessSide::Generator).await;
    }
}

impl RunningPipeline {
    /// Feed each encoder diagnostic line to `on_line` until the encoder
    /// closes stderr, then wait for the encoder and the generator, in that
    /// order.
    pub async fn wait(
        &mut self,
        tail_lines: usize,
        mut on_line: impl FnMut(&str),
    ) -> Result<RunOutcome> {
        let mut tail = VecDeque::with_capacity(tail_lines);

        if let Some(stderr) = self.diagnostics.take() {
            let mut frames = diagnostic_lines(stderr);
            let mut broken = false;

            while let Some(chunk) = frames.next().await {
                match chunk {
                    Ok(bytes) => {
                        let text = String::from_utf8_lossy(&bytes);
                        let line = text.trim();
                        if line.is_empty() {
                            continue;
                        }
                        if tail_lines > 0 {
                            if tail.len() == tail_lines {
                                tail.pop_front();
                            }
                            tail.push_back(line.to_string());
                        }
                        on_line(line);
                    }
                    Err(e) => {
                        tracing::warn!("Stopped parsing encoder output: {}", e);
                        broken = true;
                        break;
                    }
                }
            }

            // Keep the pipe drained so the encoder never blocks on stderr.
            if broken {
                discard(frames.into_inner(), ProcessSide::Encoder).await;
            }
        }

        let encoder_status = self.encoder.wait().await?;
        let generator_status = self.generator.wait().await?;

        if let Some(drain) = self.drain.take() {
            drain.abort();
        }

        Ok(RunOutcome {
            encoder_status,
            generator_status,
            tail: tail.into(),
        })
    }
}

impl Drop for RunningPipeline {
    fn drop(&mut self) {
        if let Some(drain) = self.drain.take() {
            drain.abort();
        }
    }
}
