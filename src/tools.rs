//! Running the external audio tools (`edge-tts`, `ffmpeg`, `ffprobe`).

use crate::utils::truncate_for_log;
use std::process::{Output, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Why an external tool invocation failed.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} timed out after {after:?}")]
    TimedOut { program: String, after: Duration },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// Run `cmd` to completion, killing it if it outlives `limit`.
///
/// Stdin is closed and both output streams are captured.
///
/// # Arguments
///
/// * `cmd` - The prepared command; its program name is used in errors
/// * `limit` - Wall-clock limit for the whole invocation
///
/// # Returns
///
/// The captured output on a zero exit. A non-zero exit is
/// [`ToolError::Failed`] carrying the trimmed stderr; running past `limit` is
/// [`ToolError::TimedOut`].
///
/// # Example
///
/// ```ignore
/// let mut cmd = Command::new("ffprobe");
/// cmd.arg("-version");
/// let out = run(cmd, Duration::from_secs(10)).await?;
/// ```
pub async fn run(mut cmd: Command, limit: Duration) -> Result<Output, ToolError> {
    let program = cmd.as_std().get_program().to_string_lossy().into_owned();
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    debug!(%program, args = ?cmd.as_std().get_args().collect::<Vec<_>>(), "Running tool");

    let child = cmd.spawn().map_err(|source| ToolError::Spawn {
        program: program.clone(),
        source,
    })?;
    let output = match timeout(limit, child.wait_with_output()).await {
        Ok(result) => result.map_err(|source| ToolError::Spawn {
            program: program.clone(),
            source,
        })?,
        Err(_) => {
            return Err(ToolError::TimedOut {
                program,
                after: limit,
            });
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ToolError::Failed {
            program,
            status: output.status,
            stderr: truncate_for_log(stderr.trim(), 500),
        });
    }
    Ok(output)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_success_captures_stdout() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "printf hello"]);
        let out = run(cmd, Duration::from_secs(5)).await.unwrap();
        assert_eq!(out.stdout, b"hello");
    }

    #[tokio::test]
    async fn test_run_failure_reports_stderr() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo broken >&2; exit 3"]);
        let err = run(cmd, Duration::from_secs(5)).await.unwrap_err();
        match err {
            ToolError::Failed { stderr, status, .. } => {
                assert_eq!(stderr, "broken");
                assert_eq!(status.code(), Some(3));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_run_times_out() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "sleep 5"]);
        let err = run(cmd, Duration::from_millis(100)).await.unwrap_err();
        assert!(matches!(err, ToolError::TimedOut { .. }));
    }

    #[tokio::test]
    async fn test_run_missing_program() {
        let cmd = Command::new("definitely-not-a-real-binary-4821");
        let err = run(cmd, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }));
    }
}
