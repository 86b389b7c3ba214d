use async_trait::async_trait;
use std::io::ErrorKind;
use std::process::Stdio;
use tokio::process::Command;

use super::LmsError;

/// Runs `lms` with already-validated arguments and returns its output.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, args: &[String]) -> Result<String, LmsError>;
}

/// Spawns the real `lms` binary from `PATH`.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    program: String,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            program: "lms".to_string(),
        }
    }
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, args: &[String]) -> Result<String, LmsError> {
        tracing::debug!(program = %self.program, ?args, "running lms");
        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| match err.kind() {
                ErrorKind::NotFound => LmsError::NotFound,
                _ => LmsError::Spawn(err.to_string()),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            return Err(LmsError::Failed {
                status: output.status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        // Some lms subcommands report on stderr only.
        let text = if stdout.trim().is_empty() && !stderr.trim().is_empty() {
            stderr
        } else {
            stdout
        };
        Ok(text.trim().to_string())
    }
}
