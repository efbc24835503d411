//! External command execution with captured output and a hard timeout.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::traits::{CommandError, CommandOutput, CommandRunner};

/// Runs programs on the host via `tokio::process`.
pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<CommandOutput, CommandError> {
        run_command(program, args, timeout).await
    }

    fn name(&self) -> &str {
        "system"
    }
}

/// Run `program` with `args`, capturing stdout and stderr.
///
/// A non-zero exit is reported through `CommandOutput::success`, not as an error.
/// The child is killed if the timeout elapses.
pub async fn run_command(
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<CommandOutput, CommandError> {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CommandError::NotInstalled(program.to_string()),
            _ => CommandError::Io(e),
        })?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result?,
        Err(_) => {
            tracing::warn!(program, ?timeout, "Command timed out");
            return Err(CommandError::TimedOut {
                program: program.to_string(),
                timeout,
            });
        }
    };

    let result = CommandOutput {
        status: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        success: output.status.success(),
    };
    tracing::debug!(program, status = ?result.status, "Command finished");
    Ok(result)
}
