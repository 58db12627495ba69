//! Child-process helper shared by the engine and the provisioner.

use std::ffi::OsStr;
use std::io;
use std::process::{ExitStatus, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Captured result of a finished child process.
#[derive(Debug)]
pub(crate) struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// stderr followed by stdout, trimmed; what callers surface as diagnostics.
    pub fn combined(&self) -> String {
        let stderr = self.stderr.trim();
        let stdout = self.stdout.trim();
        match (stderr.is_empty(), stdout.is_empty()) {
            (false, false) => format!("{}\n{}", stderr, stdout),
            (false, true) => stderr.to_string(),
            (true, _) => stdout.to_string(),
        }
    }
}

/// Run `program` to completion, optionally feeding `stdin`, and capture its output.
///
/// The child is not killed when the returned future is dropped.
pub(crate) async fn run<I, S>(program: &str, args: I, stdin: Option<&[u8]>) -> io::Result<CommandOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut child = Command::new(program)
        .args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    if let (Some(data), Some(mut pipe)) = (stdin, child.stdin.take()) {
        // A child that exits before reading its stdin still has output worth reporting.
        match pipe.write_all(data).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {}
            Err(e) => return Err(e),
        }
        drop(pipe);
    }

    let output = child.wait_with_output().await?;
    Ok(CommandOutput {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_captures_stdout_and_stdin() {
        let output = run("cat", Vec::<&str>::new(), Some(b"hello")).await.unwrap();
        assert!(output.status.success());
        assert_eq!(output.stdout, "hello");
    }

    #[tokio::test]
    async fn test_combined_prefers_stderr_first() {
        let output = run("sh", ["-c", "echo out; echo err >&2; exit 3"], None)
            .await
            .unwrap();
        assert_eq!(output.status.code(), Some(3));
        assert_eq!(output.combined(), "err\nout");
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let err = run("definitely-not-a-real-binary-cutout", ["x"], None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
