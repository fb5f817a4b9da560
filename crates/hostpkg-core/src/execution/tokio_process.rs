use std::sync::Mutex;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;

use crate::execution::{
    ExecutionResult, ProcessExecutor, ProcessExitStatus, ProcessOutput, ProcessSpawnRequest,
    ProcessWaitFuture, RunningProcess,
};
use crate::models::{CoreError, CoreErrorKind};

/// How long output streams may stay open after the process itself exited.
const OUTPUT_DRAIN_WINDOW: Duration = Duration::from_secs(1);

pub struct TokioProcessExecutor;

impl ProcessExecutor for TokioProcessExecutor {
    fn spawn(&self, request: ProcessSpawnRequest) -> ExecutionResult<Box<dyn RunningProcess>> {
        let mut cmd = tokio::process::Command::new(&request.command.program);
        cmd.args(&request.command.args);

        cmd.stdin(std::process::Stdio::null());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        cmd.process_group(0);
        cmd.kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|error| transport_failure(format!("failed to spawn process: {error}")))?;

        let pid = child.id();

        tracing::trace!(
            program = %request.command.program.display(),
            pid = ?pid,
            "spawned process"
        );

        Ok(Box::new(TokioRunningProcess {
            child: Mutex::new(Some(child)),
            pid,
            timeout: request.timeout,
        }))
    }
}

struct TokioRunningProcess {
    child: Mutex<Option<tokio::process::Child>>,
    pid: Option<u32>,
    timeout: Option<Duration>,
}

impl RunningProcess for TokioRunningProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn wait(self: Box<Self>) -> ProcessWaitFuture {
        let child = self.child.into_inner().ok().flatten();
        let timeout = self.timeout;
        let pid = self.pid;

        Box::pin(async move {
            let mut child = child
                .ok_or_else(|| transport_failure("child process already consumed".to_string()))?;

            // Kills the whole group if this future is dropped before exit.
            let mut group_guard = ProcessGroupGuard { pid, armed: true };

            let stdout_reader = tokio::spawn(read_stream(child.stdout.take()));
            let stderr_reader = tokio::spawn(read_stream(child.stderr.take()));

            let wait_err = |error: std::io::Error| {
                transport_failure(format!("failed to wait for process: {error}"))
            };

            let status = if let Some(timeout_duration) = timeout {
                match tokio::time::timeout(timeout_duration, child.wait()).await {
                    Ok(result) => result.map_err(wait_err)?,
                    Err(_) => {
                        if let Some(pid) = pid {
                            let _ = signal_process_group(pid, libc::SIGKILL);
                        }
                        let _ = tokio::time::timeout(Duration::from_secs(1), child.wait()).await;
                        group_guard.armed = false;
                        stdout_reader.abort();
                        stderr_reader.abort();
                        return Err(CoreError::new(
                            CoreErrorKind::Timeout,
                            format!("process timed out after {}ms", timeout_duration.as_millis()),
                        ));
                    }
                }
            } else {
                child.wait().await.map_err(wait_err)?
            };

            // Descendants that inherited the pipes stay in the group until the
            // streams are drained; the guard reaps them if draining fails.
            let stdout = collect_stream("stdout", stdout_reader).await?;
            let stderr = collect_stream("stderr", stderr_reader).await?;
            group_guard.armed = false;

            let status = match status.code() {
                Some(code) => ProcessExitStatus::ExitCode(code),
                None => ProcessExitStatus::Terminated,
            };

            Ok(ProcessOutput {
                status,
                stdout,
                stderr,
            })
        })
    }
}

async fn read_stream<R: AsyncRead + Unpin>(stream: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    if let Some(mut handle) = stream {
        handle.read_to_end(&mut buffer).await?;
    }
    Ok(buffer)
}

async fn collect_stream(
    name: &str,
    reader: JoinHandle<std::io::Result<Vec<u8>>>,
) -> ExecutionResult<Vec<u8>> {
    let abort = reader.abort_handle();
    match tokio::time::timeout(OUTPUT_DRAIN_WINDOW, reader).await {
        Ok(Ok(Ok(buffer))) => Ok(buffer),
        Ok(Ok(Err(error))) => Err(transport_failure(format!("failed to read {name}: {error}"))),
        Ok(Err(join_error)) => Err(transport_failure(format!(
            "{name} reader failed: {join_error}"
        ))),
        Err(_) => {
            abort.abort();
            Err(transport_failure(format!(
                "{name} still held open by a descendant process {}ms after exit",
                OUTPUT_DRAIN_WINDOW.as_millis()
            )))
        }
    }
}

struct ProcessGroupGuard {
    pid: Option<u32>,
    armed: bool,
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(pid) = self.pid {
            tracing::debug!(pid, "killing abandoned process group");
            let _ = signal_process_group(pid, libc::SIGKILL);
        }
    }
}

fn signal_process_group(pid: u32, signal: libc::c_int) -> ExecutionResult<()> {
    let pgid = -(pid as libc::pid_t);
    let result = unsafe { libc::kill(pgid, signal) };

    if result != 0 {
        let os_error = std::io::Error::last_os_error();
        if os_error.raw_os_error() != Some(libc::ESRCH) {
            return Err(transport_failure(format!(
                "failed to send signal {signal} to process group {pid}: {os_error}"
            )));
        }
    }

    Ok(())
}

fn transport_failure(message: String) -> CoreError {
    CoreError::new(CoreErrorKind::Transport, message)
}
