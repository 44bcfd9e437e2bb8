//! Registry of live child processes and the shutdown sweep.
//!
//! Every process the pipeline starts is registered here for as long as it
//! may be running. On interrupt, [`ProcessManager::shutdown`] asks each one
//! to terminate, waits a grace period, then kills whatever is still
//! registered and alive. The sweep runs at most once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

/// Counts from a shutdown sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Processes that received a graceful termination request.
    pub terminated: usize,
    /// Processes force-killed after the grace period.
    pub killed: usize,
}

/// Mutex-guarded set of live process ids.
#[derive(Debug, Default)]
pub struct ProcessManager {
    procs: Mutex<HashMap<u32, String>>,
    shutting_down: AtomicBool,
}

impl ProcessManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `pid` until the returned guard is dropped.
    ///
    /// A process registered after shutdown has begun is killed immediately.
    pub fn register(self: &Arc<Self>, pid: u32, label: impl Into<String>) -> Registration {
        let label = label.into();

        if self.shutting_down.load(Ordering::SeqCst) {
            tracing::warn!("{} (pid {}) started during shutdown, killing", label, pid);
            if let Err(e) = signal(pid, Stop::Kill) {
                tracing::warn!("Failed to kill {} (pid {}): {}", label, pid, e);
            }
        }

        tracing::debug!("Registered {} (pid {})", label, pid);
        self.procs.lock().insert(pid, label);

        Registration {
            manager: Arc::clone(self),
            pid,
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Currently registered process ids.
    pub fn pids(&self) -> Vec<u32> {
        self.procs.lock().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.procs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.procs.lock().is_empty()
    }

    fn deregister(&self, pid: u32) {
        if let Some(label) = self.procs.lock().remove(&pid) {
            tracing::debug!("Deregistered {} (pid {})", label, pid);
        }
    }

    /// Terminate every registered process, then kill the ones that outlive
    /// `grace`.
    ///
    /// Only the first call does any work. Processes that have already
    /// exited are skipped.
    pub async fn shutdown(&self, grace: Duration) -> ShutdownReport {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            tracing::debug!("Shutdown already in progress");
            return ShutdownReport::default();
        }

        let targets: Vec<(u32, String)> = self
            .procs
            .lock()
            .iter()
            .map(|(pid, label)| (*pid, label.clone()))
            .collect();

        let mut report = ShutdownReport::default();
        for (pid, label) in &targets {
            match signal(*pid, Stop::Terminate) {
                Ok(true) => {
                    tracing::debug!("Terminating {} (pid {})", label, pid);
                    report.terminated += 1;
                }
                Ok(false) => tracing::debug!("{} (pid {}) already exited", label, pid),
                Err(e) => tracing::warn!("Failed to terminate {} (pid {}): {}", label, pid, e),
            }
        }

        if report.terminated == 0 {
            return report;
        }

        tokio::time::sleep(grace).await;

        let survivors: Vec<(u32, String)> = {
            let procs = self.procs.lock();
            targets
                .into_iter()
                .filter(|(pid, _)| procs.contains_key(pid))
                .collect()
        };

        for (pid, label) in survivors {
            if !is_alive(pid) {
                continue;
            }
            match signal(pid, Stop::Kill) {
                Ok(true) => {
                    tracing::warn!(
                        "{} (pid {}) did not exit within {:?}, killed",
                        label,
                        pid,
                        grace
                    );
                    report.killed += 1;
                }
                Ok(false) => {}
                Err(e) => tracing::warn!("Failed to kill {} (pid {}): {}", label, pid, e),
            }
        }

        report
    }
}

/// Keeps a process registered; deregisters on drop.
#[derive(Debug)]
pub struct Registration {
    manager: Arc<ProcessManager>,
    pid: u32,
}

impl Registration {
    pub fn pid(&self) -> u32 {
        self.pid
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.manager.deregister(self.pid);
    }
}

#[derive(Debug, Clone, Copy)]
enum Stop {
    Terminate,
    Kill,
}

/// Send a stop request. `Ok(false)` means the process no longer exists.
#[cfg(unix)]
fn signal(pid: u32, stop: Stop) -> std::io::Result<bool> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    // Pid 0 would address our own process group.
    let raw = match i32::try_from(pid) {
        Ok(raw) if raw > 0 => raw,
        _ => return Ok(false),
    };
    let sig = match stop {
        Stop::Terminate => Signal::SIGTERM,
        Stop::Kill => Signal::SIGKILL,
    };

    match kill(Pid::from_raw(raw), sig) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(unix)]
fn is_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let raw = match i32::try_from(pid) {
        Ok(raw) if raw > 0 => raw,
        _ => return false,
    };
    matches!(kill(Pid::from_raw(raw), None), Ok(()) | Err(Errno::EPERM))
}

#[cfg(not(unix))]
fn signal(pid: u32, stop: Stop) -> std::io::Result<bool> {
    use std::process::{Command, Stdio};

    let pid = pid.to_string();
    let mut cmd = Command::new("taskkill");
    cmd.args(["/PID", pid.as_str(), "/T"]);
    if matches!(stop, Stop::Kill) {
        cmd.arg("/F");
    }
    let status = cmd.stdout(Stdio::null()).stderr(Stdio::null()).status()?;
    Ok(status.success())
}

#[cfg(not(unix))]
fn is_alive(_pid: u32) -> bool {
    true
}
