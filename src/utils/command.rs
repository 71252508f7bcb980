//! External command execution with a hard deadline

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{AppError, Result};

/// Captured output of a finished command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// stdout and stderr joined for diagnostics
    pub fn combined(&self) -> String {
        match (self.stdout.trim(), self.stderr.trim()) {
            ("", "") => String::new(),
            (out, "") => out.to_string(),
            ("", err) => err.to_string(),
            (out, err) => format!("{} {}", out, err),
        }
    }
}

/// Run `program args...` and wait at most `timeout` for it to exit
///
/// A non-zero exit status is an error carrying the captured output. The
/// child is killed when the deadline passes.
pub async fn run_command(
    program: &str,
    args: &[&str],
    cwd: Option<&Path>,
    timeout: Duration,
) -> Result<CommandOutput> {
    let command_line = if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    };
    debug!("Running `{}`", command_line);

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    let child = command
        .spawn()
        .map_err(|e| AppError::Internal(format!("Failed to start `{}`: {}", command_line, e)))?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result?,
        Err(_) => {
            warn!("`{}` did not finish within {:?}", command_line, timeout);
            return Err(AppError::Command {
                command: command_line,
                status: -1,
                output: format!("timed out after {} ms", timeout.as_millis()),
            });
        }
    };

    let captured = CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };

    if !output.status.success() {
        let status = output.status.code().unwrap_or(-1);
        warn!(
            "`{}` failed with status {}: {}",
            command_line,
            status,
            captured.combined()
        );
        return Err(AppError::Command {
            command: command_line,
            status,
            output: captured.combined(),
        });
    }

    Ok(captured)
}
