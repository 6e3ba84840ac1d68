//! Bounded subprocess execution.

use std::io;
use std::process::{Output, Stdio};
use std::time::Duration;

use r3l_core::ProvenanceError;
use thiserror::Error;
use tokio::process::Command;
use tracing::warn;

use crate::tracing::prefix;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} timed out after {seconds}s")]
    Timeout { program: String, seconds: u64 },

    #[error("{program} i/o error: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
}

impl From<ProcessError> for ProvenanceError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::Timeout { program, seconds } => ProvenanceError::timeout(program, seconds),
            other => ProvenanceError::Internal(other.to_string()),
        }
    }
}

/// Run `command` to completion, capturing stdout and stderr.
///
/// The child is killed if it outlives `timeout`. `label` names the process
/// in errors and logs.
pub async fn run_bounded(
    mut command: Command,
    label: &str,
    timeout: Duration,
) -> Result<Output, ProcessError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command.spawn().map_err(|source| ProcessError::Spawn {
        program: label.to_string(),
        source,
    })?;

    // Dropping the wait future on timeout drops the child, which kills it.
    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(source)) => Err(ProcessError::Io {
            program: label.to_string(),
            source,
        }),
        Err(_) => {
            warn!("{} {label} killed after {}s", prefix::VERIFY, timeout.as_secs());
            Err(ProcessError::Timeout {
                program: label.to_string(),
                seconds: timeout.as_secs(),
            })
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_stdout() {
        let mut command = Command::new("sh");
        command.args(["-c", "printf hello"]);
        let output = run_bounded(command, "sh", Duration::from_secs(5)).await.unwrap();
        assert!(output.status.success());
        assert_eq!(output.stdout, b"hello");
    }

    #[tokio::test]
    async fn test_slow_process_times_out() {
        let mut command = Command::new("sleep");
        command.arg("5");
        let err = run_bounded(command, "sleep", Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Timeout { .. }));
        assert!(ProvenanceError::from(err).is_retryable());
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let command = Command::new("/nonexistent/r3l-test-binary");
        let err = run_bounded(command, "missing", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }
}
