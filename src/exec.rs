//! External script invocation.
//!
//! Jobs and cleanup both run through a shell process with piped output,
//! captured in full after exit. A non-zero exit status is reported in the
//! output, not raised as an error; only a failure of the invocation
//! mechanism itself (spawn failure, or the optional timeout) surfaces as
//! `RunnerError`.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::RunnerError;

/// Captured output of a finished script.
#[derive(Debug, Clone)]
pub struct ScriptOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ScriptOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Execution collaborator: runs the job script against a base name, or the
/// cleanup script with no arguments. Synchronous to the runner, blocking
/// nothing else.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    async fn run(&self, job_base_name: &str) -> Result<ScriptOutput, RunnerError>;

    async fn run_cleanup(&self) -> Result<ScriptOutput, RunnerError>;
}

/// Shell-backed script runner.
///
/// Invokes `sh <script> [arg]` in the base directory, the way the recipes
/// and scripts are laid out on disk.
pub struct ShellScriptRunner {
    base_dir: PathBuf,
    run_script: String,
    cleanup_script: String,
    /// Maximum job runtime. `None` leaves jobs unbounded; a hung job then
    /// blocks the entire queue.
    job_timeout: Option<Duration>,
}

impl ShellScriptRunner {
    pub fn new(base_dir: PathBuf, run_script: String, cleanup_script: String) -> Self {
        Self {
            base_dir,
            run_script,
            cleanup_script,
            job_timeout: None,
        }
    }

    /// Kill jobs that exceed `timeout`. Cleanup is never subject to it.
    pub fn with_job_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.job_timeout = timeout;
        self
    }

    async fn invoke(
        &self,
        script: &str,
        arg: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<ScriptOutput, RunnerError> {
        let mut command = Command::new("sh");
        command.arg(format!("./{script}"));
        if let Some(arg) = arg {
            command.arg(arg);
        }
        command
            .current_dir(&self.base_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match timeout {
            Some(limit) => tokio::time::timeout(limit, command.output())
                .await
                .map_err(|_| RunnerError::Timeout {
                    script: script.to_string(),
                    limit,
                })?,
            None => command.output().await,
        }
        .map_err(|e| RunnerError::Spawn {
            script: script.to_string(),
            source: e,
        })?;

        Ok(ScriptOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

#[async_trait]
impl ScriptRunner for ShellScriptRunner {
    async fn run(&self, job_base_name: &str) -> Result<ScriptOutput, RunnerError> {
        self.invoke(&self.run_script, Some(job_base_name), self.job_timeout)
            .await
    }

    async fn run_cleanup(&self) -> Result<ScriptOutput, RunnerError> {
        self.invoke(&self.cleanup_script, None, None).await
    }
}
