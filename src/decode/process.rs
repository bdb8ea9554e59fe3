//! Running external extraction programs under a hard deadline.

use std::ffi::OsString;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::DecodeError;

/// Output of a finished child process, decoded lossily as UTF-8.
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Runs `program args..` with stdin closed and both output streams captured.
///
/// If the child is still running after `limit`, it is killed and
/// [`DecodeError::TimedOut`] is returned.
///
/// # Errors
///
/// Returns [`DecodeError::Spawn`] if the program cannot be started,
/// [`DecodeError::TimedOut`] on deadline, or [`DecodeError::Io`] if waiting fails.
pub async fn run_captured(
    program: &str,
    args: &[OsString],
    working_dir: Option<&Path>,
    limit: Duration,
) -> Result<CapturedOutput, DecodeError> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = working_dir {
        command.current_dir(dir);
    }

    let mut child = command
        .spawn()
        .map_err(|source| DecodeError::spawn(program, source))?;
    let mut stdout_task = tokio::spawn(read_all(child.stdout.take()));
    let mut stderr_task = tokio::spawn(read_all(child.stderr.take()));

    let finished = timeout(limit, async {
        let status = child.wait().await;
        let stdout = (&mut stdout_task).await.unwrap_or_default();
        let stderr = (&mut stderr_task).await.unwrap_or_default();
        (status, stdout, stderr)
    })
    .await;

    match finished {
        Ok((Ok(status), stdout, stderr)) => {
            debug!(program, %status, stdout_bytes = stdout.len(), "child finished");
            Ok(CapturedOutput {
                status,
                stdout: String::from_utf8_lossy(&stdout).into_owned(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
            })
        }
        Ok((Err(source), _, _)) => Err(DecodeError::io(program, source)),
        Err(_) => {
            warn!(program, secs = limit.as_secs(), "killing child after timeout");
            if let Err(error) = child.kill().await {
                debug!(program, error = %error, "kill after timeout failed");
            }
            stdout_task.abort();
            stderr_task.abort();
            Err(DecodeError::TimedOut {
                program: program.to_string(),
                secs: limit.as_secs(),
            })
        }
    }
}

async fn read_all<R: AsyncRead + Unpin>(reader: Option<R>) -> Vec<u8> {
    let mut buffer = Vec::new();
    if let Some(mut reader) = reader
        && let Err(error) = reader.read_to_end(&mut buffer).await
    {
        debug!(error = %error, "child output stream ended with error");
    }
    buffer
}
