//! Running the export script as a subprocess.
//!
//! Stdout carries JSON progress lines and is parsed; anything else the
//! exporter prints goes to debug logs. Stderr is drained concurrently so a
//! chatty exporter cannot block on a full pipe.

use std::collections::VecDeque;
use std::process::Stdio;

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::{ConvkitError, Result};

/// Stderr lines kept for the error message of a failed run.
const STDERR_TAIL_LINES: usize = 5;

/// JSON progress line emitted by the export script on stdout.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScriptLine {
    pub stage: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub save_dir: Option<String>,
}

impl ScriptLine {
    fn is_terminal(&self) -> bool {
        self.stage == "complete" || self.stage == "error"
    }
}

/// Run `command` to completion and return its terminal `complete` line.
///
/// Fails on spawn errors, an `error` line, a non-zero exit status, or when
/// the script exits without a terminal line.
pub async fn run_script(label: &str, mut command: Command) -> Result<ScriptLine> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ConvkitError::ExportFailed {
            message: format!("Failed to spawn {label}: {e}"),
        })?;

    let stdout = child.stdout.take().ok_or_else(|| ConvkitError::ExportFailed {
        message: format!("{label} stdout was not captured"),
    })?;
    let stderr = child.stderr.take().ok_or_else(|| ConvkitError::ExportFailed {
        message: format!("{label} stderr was not captured"),
    })?;

    let (terminal, stderr_tail) = tokio::join!(
        read_progress(label, stdout),
        drain_stderr(label, stderr)
    );

    let status = child.wait().await.map_err(|e| ConvkitError::ExportFailed {
        message: format!("{label} process error: {e}"),
    })?;

    match terminal {
        Some(line) if line.stage == "error" => Err(ConvkitError::ExportFailed {
            message: line
                .message
                .unwrap_or_else(|| format!("{label} reported an error")),
        }),
        _ if !status.success() => Err(ConvkitError::ExportFailed {
            message: format!(
                "{label} exited with status {}{}",
                status.code().unwrap_or(-1),
                format_tail(&stderr_tail)
            ),
        }),
        Some(line) => Ok(line),
        None => Err(ConvkitError::ExportFailed {
            message: format!("{label} exited without reporting a result"),
        }),
    }
}

async fn read_progress<R: AsyncRead + Unpin>(label: &str, stdout: R) -> Option<ScriptLine> {
    let mut reader = BufReader::new(stdout).lines();
    let mut terminal = None;

    loop {
        match reader.next_line().await {
            Ok(Some(line)) => match serde_json::from_str::<ScriptLine>(&line) {
                Ok(parsed) if parsed.is_terminal() => terminal = Some(parsed),
                Ok(parsed) => {
                    if let Some(message) = &parsed.message {
                        info!("[{}] {}: {}", label, parsed.stage, message);
                    }
                }
                Err(_) => debug!("[{}] {}", label, line),
            },
            Ok(None) => break,
            Err(e) => {
                warn!("Error reading {} stdout: {}", label, e);
                break;
            }
        }
    }
    terminal
}

async fn drain_stderr<R: AsyncRead + Unpin>(label: &str, stderr: R) -> VecDeque<String> {
    let mut reader = BufReader::new(stderr).lines();
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);

    loop {
        match reader.next_line().await {
            Ok(Some(line)) => {
                debug!("[{}] stderr: {}", label, line);
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Error reading {} stderr: {}", label, e);
                break;
            }
        }
    }
    tail
}

fn format_tail(tail: &VecDeque<String>) -> String {
    if tail.is_empty() {
        String::new()
    } else {
        let joined: Vec<&str> = tail.iter().map(String::as_str).collect();
        format!(": {}", joined.join(" | "))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut command = Command::new("sh");
        command.arg("-c").arg(script);
        command
    }

    #[tokio::test]
    async fn test_complete_line_is_returned() {
        let line = run_script(
            "exporter",
            sh(r#"echo 'Ultralytics 8.3.0'; echo '{"stage":"exporting","message":"tfjs"}'; echo '{"stage":"complete","save_dir":"/tmp/out"}'"#),
        )
        .await
        .unwrap();
        assert_eq!(line.stage, "complete");
        assert_eq!(line.save_dir.as_deref(), Some("/tmp/out"));
    }

    #[tokio::test]
    async fn test_error_line_becomes_export_error() {
        let err = run_script(
            "exporter",
            sh(r#"echo '{"stage":"error","message":"tfjs unsupported"}'; exit 1"#),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("tfjs unsupported"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_includes_stderr_tail() {
        let err = run_script("exporter", sh("echo boom >&2; exit 3"))
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("status 3"));
        assert!(message.contains("boom"));
    }

    #[tokio::test]
    async fn test_missing_terminal_line_is_error() {
        let err = run_script("exporter", sh("echo done")).await.unwrap_err();
        assert!(err.to_string().contains("without reporting a result"));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let err = run_script("exporter", Command::new("/nonexistent/python"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConvkitError::ExportFailed { .. }));
    }
}
