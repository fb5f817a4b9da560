use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::execution::{
    CommandResult, CommandSpec, ExecuteFuture, ExecutionContext, ExecutionResult,
    ProcessExecutor, ProcessExitStatus, ProcessOutput, ProcessSpawnRequest, RemoteCommand,
    RemoteExecutor, spawn_validated,
};
use crate::models::{CoreError, CoreErrorKind};

const SSH_FAILURE_EXIT_CODE: i32 = 255;
const CONTAINER_RUNTIME_FAILURE_EXIT_CODE: i32 = 125;

/// Where snippets run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ShellTarget {
    Local {
        shell: String,
    },
    Ssh {
        destination: String,
        port: Option<u16>,
        identity_file: Option<PathBuf>,
        options: Vec<String>,
    },
    Container {
        runtime: String,
        container: String,
    },
}

impl ShellTarget {
    pub fn local() -> Self {
        Self::Local {
            shell: "/bin/sh".to_string(),
        }
    }

    pub fn ssh(destination: impl Into<String>) -> Self {
        Self::Ssh {
            destination: destination.into(),
            port: None,
            identity_file: None,
            options: Vec::new(),
        }
    }

    pub fn container(runtime: impl Into<String>, container: impl Into<String>) -> Self {
        Self::Container {
            runtime: runtime.into(),
            container: container.into(),
        }
    }

    pub fn command_spec(&self, command: &RemoteCommand) -> CommandSpec {
        match self {
            Self::Local { shell } => CommandSpec::new(shell).args(["-c", command.snippet()]),
            Self::Ssh {
                destination,
                port,
                identity_file,
                options,
            } => {
                let mut spec = CommandSpec::new("ssh").args(["-o", "BatchMode=yes"]);
                for option in options {
                    spec = spec.args(["-o", option.as_str()]);
                }
                if let Some(port) = port {
                    spec = spec.args(["-p".to_string(), port.to_string()]);
                }
                if let Some(identity_file) = identity_file {
                    spec = spec.args([
                        "-i".to_string(),
                        identity_file.to_string_lossy().into_owned(),
                    ]);
                }
                // ssh joins its trailing arguments into one string for the remote shell.
                spec.args([
                    destination.clone(),
                    "--".to_string(),
                    format!("sh -c {}", shell_quote(command.snippet())),
                ])
            }
            Self::Container { runtime, container } => CommandSpec::new(runtime).args([
                "exec",
                container.as_str(),
                "sh",
                "-c",
                command.snippet(),
            ]),
        }
    }

    /// Exit codes owned by the transport itself rather than the snippet.
    fn transport_exit_code(&self) -> Option<i32> {
        match self {
            Self::Local { .. } => None,
            Self::Ssh { .. } => Some(SSH_FAILURE_EXIT_CODE),
            Self::Container { .. } => Some(CONTAINER_RUNTIME_FAILURE_EXIT_CODE),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Local { shell } => format!("local shell {shell}"),
            Self::Ssh { destination, .. } => format!("ssh {destination}"),
            Self::Container { runtime, container } => format!("{runtime} container {container}"),
        }
    }
}

/// `RemoteExecutor` that runs snippets through a `ShellTarget` using a
/// process executor.
pub struct ShellExecutor {
    executor: Arc<dyn ProcessExecutor>,
    target: ShellTarget,
    command_timeout: Option<Duration>,
}

impl ShellExecutor {
    pub fn new(executor: Arc<dyn ProcessExecutor>, target: ShellTarget) -> Self {
        Self {
            executor,
            target,
            command_timeout: None,
        }
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    pub fn target(&self) -> &ShellTarget {
        &self.target
    }

    async fn run(
        &self,
        ctx: &ExecutionContext,
        command: &RemoteCommand,
    ) -> ExecutionResult<CommandResult> {
        command.validate()?;

        if ctx.is_cancelled() {
            return Err(cancelled());
        }
        if ctx.is_expired() {
            return Err(deadline_exceeded());
        }

        let mut request = ProcessSpawnRequest::new(self.target.command_spec(command));
        if let Some(timeout) = self.command_timeout {
            request = request.timeout(timeout);
        }

        tracing::debug!(
            target_host = %self.target.describe(),
            snippet = command.snippet(),
            "executing remote command"
        );

        let process = spawn_validated(self.executor.as_ref(), request)?;
        let wait = process.wait();

        // Losing branches drop `wait`, which stops the process.
        let output = tokio::select! {
            biased;
            _ = ctx.cancellation().cancelled() => return Err(cancelled()),
            _ = ctx.deadline_elapsed() => return Err(deadline_exceeded()),
            output = wait => output?,
        };

        self.command_result(output)
    }

    fn command_result(&self, output: ProcessOutput) -> ExecutionResult<CommandResult> {
        let exit_code = match output.status {
            ProcessExitStatus::ExitCode(code) => code,
            ProcessExitStatus::Terminated => {
                return Err(CoreError::new(
                    CoreErrorKind::Transport,
                    format!("{} was terminated by signal", self.target.describe()),
                ));
            }
        };

        if self.target.transport_exit_code() == Some(exit_code) {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CoreError::new(
                CoreErrorKind::Transport,
                format!(
                    "{} failed with exit code {exit_code}: {}",
                    self.target.describe(),
                    stderr.trim()
                ),
            ));
        }

        tracing::trace!(
            exit_code,
            stdout = %String::from_utf8_lossy(&output.stdout),
            stderr = %String::from_utf8_lossy(&output.stderr),
            "remote command finished"
        );

        Ok(CommandResult {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code,
        })
    }
}

impl RemoteExecutor for ShellExecutor {
    fn execute<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
        command: &'a RemoteCommand,
    ) -> ExecuteFuture<'a> {
        Box::pin(self.run(ctx, command))
    }
}

/// Quotes a value for POSIX `sh` using single quotes.
pub fn shell_quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for ch in value.chars() {
        if ch == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(ch);
        }
    }
    quoted.push('\'');
    quoted
}

fn cancelled() -> CoreError {
    CoreError::new(CoreErrorKind::Cancelled, "command execution was cancelled")
}

fn deadline_exceeded() -> CoreError {
    CoreError::new(CoreErrorKind::Timeout, "command execution deadline exceeded")
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{ShellTarget, shell_quote};
    use crate::execution::RemoteCommand;

    #[test]
    fn quotes_plain_and_embedded_single_quotes() {
        assert_eq!(shell_quote("hello"), "'hello'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn local_target_runs_snippet_through_shell() {
        let spec = ShellTarget::local().command_spec(&RemoteCommand::new("snap list"));
        assert_eq!(spec.program, PathBuf::from("/bin/sh"));
        assert_eq!(spec.args, vec!["-c", "snap list"]);
    }

    #[test]
    fn ssh_target_quotes_snippet_as_single_remote_argument() {
        let target = ShellTarget::Ssh {
            destination: "admin@build-01".to_string(),
            port: Some(2222),
            identity_file: Some(PathBuf::from("/keys/id_ed25519")),
            options: vec!["StrictHostKeyChecking=no".to_string()],
        };

        let spec = target.command_spec(&RemoteCommand::new("echo 'hi'"));

        assert_eq!(spec.program, PathBuf::from("ssh"));
        assert_eq!(
            spec.args,
            vec![
                "-o",
                "BatchMode=yes",
                "-o",
                "StrictHostKeyChecking=no",
                "-p",
                "2222",
                "-i",
                "/keys/id_ed25519",
                "admin@build-01",
                "--",
                "sh -c 'echo '\\''hi'\\'''",
            ]
        );
    }

    #[test]
    fn container_target_uses_runtime_exec() {
        let spec =
            ShellTarget::container("docker", "web-1").command_spec(&RemoteCommand::new("true"));
        assert_eq!(spec.program, PathBuf::from("docker"));
        assert_eq!(spec.args, vec!["exec", "web-1", "sh", "-c", "true"]);
    }
}
