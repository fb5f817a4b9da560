use std::borrow::Cow;
use std::future::Future;
use std::pin::Pin;

use crate::execution::{ExecutionContext, ExecutionResult};
use crate::models::{CoreError, CoreErrorKind};

pub type ExecuteFuture<'a> =
    Pin<Box<dyn Future<Output = ExecutionResult<CommandResult>> + Send + 'a>>;

/// A shell snippet executed verbatim on the target. Quoting of interpolated
/// values is the caller's job.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct RemoteCommand {
    snippet: String,
}

impl RemoteCommand {
    pub fn new(snippet: impl Into<String>) -> Self {
        Self {
            snippet: snippet.into(),
        }
    }

    pub fn snippet(&self) -> &str {
        &self.snippet
    }

    pub fn validate(&self) -> ExecutionResult<()> {
        if self.snippet.trim().is_empty() {
            return Err(CoreError::new(
                CoreErrorKind::InvalidInput,
                "command snippet must not be empty",
            ));
        }
        if self.snippet.contains('\0') {
            return Err(CoreError::new(
                CoreErrorKind::InvalidInput,
                "command snippet must not contain NUL bytes",
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandResult {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
}

impl CommandResult {
    pub fn new(stdout: impl Into<Vec<u8>>, stderr: impl Into<Vec<u8>>, exit_code: i32) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    pub fn stdout_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs shell snippets on a target.
///
/// Only transport-level failures are errors. A non-zero exit code is a
/// successful execution whose result carries the diagnostics. No retries
/// happen at this layer.
pub trait RemoteExecutor: Send + Sync {
    fn execute<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
        command: &'a RemoteCommand,
    ) -> ExecuteFuture<'a>;
}
