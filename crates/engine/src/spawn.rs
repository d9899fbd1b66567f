//! The narrow process-spawning seam between the engine and the OS.
//!
//! Steps never touch `tokio::process` directly; they hand a [`SpawnRequest`]
//! to a [`ProcessSpawner`]. The production implementation runs actions under
//! `deno run` with permission flags derived from the sandbox grant. Tests
//! substitute scripted spawners.

use std::process::Stdio;
use std::path::PathBuf;

use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{info, warn};

use runlet_util::strip_ansi_codes;

use crate::error::EngineError;
use crate::permissions::SandboxGrant;

/// Everything needed to launch one action subprocess.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    /// Addressing form accepted by the spawner: a filesystem path or URL.
    pub target: String,
    /// Extra argv entries placed before the target.
    pub args: Vec<String>,
    /// Complete invocation environment.
    pub env: IndexMap<String, String>,
    /// Working directory (the step's context directory).
    pub cwd: PathBuf,
    /// Computed sandbox grant.
    pub permissions: SandboxGrant,
    /// Numeric uid the subprocess runs as.
    pub uid: u32,
    /// Numeric gid the subprocess runs as.
    pub gid: u32,
}

/// Result of a completed subprocess.
#[derive(Debug, Clone, Default)]
pub struct SpawnOutcome {
    /// Subprocess exit code; -1 when terminated by a signal.
    pub code: i32,
    /// Captured stdout lines, ANSI-stripped and trimmed.
    pub stdout: Vec<String>,
    /// Captured stderr lines, ANSI-stripped and trimmed.
    pub stderr: Vec<String>,
}

/// Spawns and supervises one action subprocess.
///
/// Both output streams are piped and consumed continuously; ordering is
/// guaranteed per stream only.
#[async_trait]
pub trait ProcessSpawner: Send + Sync {
    /// Runs the subprocess to completion, streaming and buffering its output.
    async fn spawn(&self, request: SpawnRequest) -> Result<SpawnOutcome, EngineError>;
}

/// Production spawner: executes the action under `deno run` with permission
/// flags rendered from the sandbox grant.
#[derive(Debug, Clone)]
pub struct DenoSpawner {
    deno_path: String,
}

impl Default for DenoSpawner {
    fn default() -> Self {
        Self {
            deno_path: "deno".to_string(),
        }
    }
}

impl DenoSpawner {
    /// Uses an explicit interpreter binary instead of `deno` from `PATH`.
    pub fn with_deno_path(deno_path: impl Into<String>) -> Self {
        Self {
            deno_path: deno_path.into(),
        }
    }
}

#[async_trait]
impl ProcessSpawner for DenoSpawner {
    async fn spawn(&self, request: SpawnRequest) -> Result<SpawnOutcome, EngineError> {
        let mut command = Command::new(&self.deno_path);
        command
            .arg("run")
            .args(request.permissions.to_deno_flags())
            .args(&request.args)
            .arg(&request.target)
            .envs(&request.env)
            .current_dir(&request.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            command.uid(request.uid);
            command.gid(request.gid);
        }

        let mut child = command.spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Io(std::io::Error::other("child stdout was not captured")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::Io(std::io::Error::other("child stderr was not captured")))?;

        // Drain both pipes while the child runs so neither can fill and block.
        let stdout_task = tokio::spawn(forward_lines(stdout, StreamLabel::Stdout));
        let stderr_task = tokio::spawn(forward_lines(stderr, StreamLabel::Stderr));

        let status = child.wait().await?;
        let stdout_lines = stdout_task
            .await
            .map_err(|error| EngineError::Io(std::io::Error::other(error)))?;
        let stderr_lines = stderr_task
            .await
            .map_err(|error| EngineError::Io(std::io::Error::other(error)))?;

        Ok(SpawnOutcome {
            code: status.code().unwrap_or(-1),
            stdout: stdout_lines,
            stderr: stderr_lines,
        })
    }
}

#[derive(Clone, Copy)]
enum StreamLabel {
    Stdout,
    Stderr,
}

async fn forward_lines<R>(reader: R, label: StreamLabel) -> Vec<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(reader).lines();
    let mut captured = Vec::new();
    while let Ok(Some(line)) = lines.next_line().await {
        let text = strip_ansi_codes(&line).trim().to_string();
        match label {
            StreamLabel::Stdout => info!("  > [stdout] {text}"),
            StreamLabel::Stderr => warn!("  > [stderr] {text}"),
        }
        captured.push(text);
    }
    captured
}
