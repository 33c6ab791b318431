//! Asynchronous external process invocation.
//!
//! `run` launches the command produced by the active strategy, captures
//! stdout/stderr incrementally on their own tasks, and waits for exit under a
//! wall-clock limit. The child is placed in its own process group so that on
//! timeout the whole group, descendants included, can be killed. After a
//! normal exit the group is only signalled when a descendant keeps the output
//! pipes open past the drain timeout.

use crate::config::types::{OutputIntegrity, PipelineError, Result};
use crate::exec::strategy::{InvocationStrategy, ToolInvocation};
use crate::utils::output::{collect_stream, CollectedStream, OutputLimits};
use log::{debug, warn};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};
use tokio::task::{JoinError, JoinHandle};

/// Captured result of a successful (exit code zero) invocation
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub stdout_integrity: OutputIntegrity,
    pub stderr_integrity: OutputIntegrity,
    pub wall_time: Duration,
}

#[derive(Debug, Clone)]
pub struct ProcessInvoker {
    strategy: Arc<dyn InvocationStrategy>,
    limits: OutputLimits,
    drain_timeout: Duration,
}

impl ProcessInvoker {
    pub fn new(
        strategy: Arc<dyn InvocationStrategy>,
        limits: OutputLimits,
        drain_timeout: Duration,
    ) -> Self {
        Self {
            strategy,
            limits,
            drain_timeout,
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Run an invocation to completion.
    ///
    /// Resolves only on exit code zero. Non-zero exits become
    /// [`PipelineError::ToolFailure`] carrying stderr, launch problems become
    /// [`PipelineError::Launch`], and expiry of `timeout` kills the process
    /// group and yields [`PipelineError::Timeout`].
    pub async fn run(&self, invocation: &ToolInvocation, timeout: Duration) -> Result<ProcessOutput> {
        let line = self.strategy.command_line(invocation)?;
        debug!(
            "{} via {}: {} {:?} (cwd: {:?})",
            invocation.label,
            self.strategy.name(),
            line.program,
            line.args,
            line.working_dir
        );

        let mut std_command = std::process::Command::new(&line.program);
        std_command
            .args(&line.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &line.working_dir {
            std_command.current_dir(dir);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            std_command.process_group(0);
        }
        let mut command = Command::from(std_command);
        command.kill_on_drop(true);

        let start = Instant::now();
        let mut child = command.spawn().map_err(|source| PipelineError::Launch {
            program: line.program.clone(),
            source,
        })?;
        let mut group = GroupGuard { pid: child.id() };

        let mut stdout_task = spawn_collector(child.stdout.take(), self.limits.stdout_limit);
        let mut stderr_task = spawn_collector(child.stderr.take(), self.limits.stderr_limit);

        let status = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                terminate(&mut child, &mut group).await;
                stdout_task.abort();
                stderr_task.abort();
                return Err(PipelineError::Io(e));
            }
            Err(_) => {
                warn!(
                    "{} exceeded {}ms, killing process group",
                    invocation.label,
                    timeout.as_millis()
                );
                terminate(&mut child, &mut group).await;
                stdout_task.abort();
                stderr_task.abort();
                return Err(PipelineError::Timeout {
                    program: invocation.label.clone(),
                    limit: timeout,
                });
            }
        };

        // The leader is reaped, so its group id may be recycled once the group empties
        let mut stragglers = group.disarm();
        let stdout = self.drain(&mut stdout_task, &mut stragglers).await;
        let stderr = self.drain(&mut stderr_task, &mut stragglers).await;
        let wall_time = start.elapsed();

        debug!(
            "{} finished with {:?} in {}ms (stdout {}B {}, stderr {}B {})",
            invocation.label,
            status.code(),
            wall_time.as_millis(),
            stdout.total_bytes,
            stdout.integrity,
            stderr.total_bytes,
            stderr.integrity
        );

        if !status.success() {
            return Err(PipelineError::ToolFailure {
                program: invocation.label.clone(),
                exit_code: status.code(),
                message: failure_message(&invocation.label, status, &stderr.text()),
            });
        }

        Ok(ProcessOutput {
            stdout: stdout.text(),
            stderr: stderr.text(),
            exit_code: status.code(),
            stdout_integrity: stdout.integrity,
            stderr_integrity: stderr.integrity,
            wall_time,
        })
    }

    /// Wait for a collector task after the child exited.
    ///
    /// When the pipe is still open after `drain_timeout`, a descendant of the
    /// child holds it, which keeps the group id populated. The group is
    /// killed once and the collector gets one more `drain_timeout` to pick up
    /// the end of the stream.
    async fn drain(
        &self,
        task: &mut JoinHandle<CollectedStream>,
        stragglers: &mut Option<u32>,
    ) -> CollectedStream {
        match tokio::time::timeout(self.drain_timeout, &mut *task).await {
            Ok(joined) => joined_stream(joined),
            Err(_) => {
                if let Some(pid) = stragglers.take() {
                    debug!("output still open after exit, killing process group {}", pid);
                    kill_group(pid);
                }
                match tokio::time::timeout(self.drain_timeout, &mut *task).await {
                    Ok(joined) => CollectedStream {
                        integrity: OutputIntegrity::DrainTimeout,
                        ..joined_stream(joined)
                    },
                    Err(_) => {
                        task.abort();
                        CollectedStream {
                            integrity: OutputIntegrity::DrainTimeout,
                            ..CollectedStream::default()
                        }
                    }
                }
            }
        }
    }
}

fn joined_stream(joined: std::result::Result<CollectedStream, JoinError>) -> CollectedStream {
    match joined {
        Ok(collected) => collected,
        Err(e) => {
            warn!("output collector failed: {}", e);
            CollectedStream {
                integrity: OutputIntegrity::ReadError,
                ..CollectedStream::default()
            }
        }
    }
}

fn spawn_collector<R>(stream: Option<R>, limit: usize) -> JoinHandle<CollectedStream>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        match stream {
            Some(stream) => collect_stream(stream, limit).await,
            None => CollectedStream::default(),
        }
    })
}

/// Diagnostic text for a failed run: stderr verbatim when there is any.
fn failure_message(label: &str, status: ExitStatus, stderr: &str) -> String {
    if !stderr.trim().is_empty() {
        return stderr.to_string();
    }
    match status.code() {
        Some(code) => format!("{label} exited with code {code}"),
        None => match signal_of(status) {
            Some(sig) => format!("{label} terminated by signal {sig}"),
            None => format!("{label} terminated abnormally"),
        },
    }
}

#[cfg(unix)]
fn signal_of(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn signal_of(_status: ExitStatus) -> Option<i32> {
    None
}

/// Kills the child's process group at most once, on drop at the latest, so a
/// cancelled `run` future does not leave descendants behind. Disarmed once the
/// leader has been reaped.
struct GroupGuard {
    pid: Option<u32>,
}

impl GroupGuard {
    fn kill(&mut self) {
        if let Some(pid) = self.pid.take() {
            kill_group(pid);
        }
    }

    fn disarm(&mut self) -> Option<u32> {
        self.pid.take()
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}

async fn terminate(child: &mut Child, group: &mut GroupGuard) {
    group.kill();
    if let Err(e) = child.kill().await {
        debug!("kill after group termination: {}", e);
    }
}

#[cfg(unix)]
fn kill_group(pid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!("Failed to kill process group {}: {}", pid, e),
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) {}
