//! Disk-pressure maintenance.
//!
//! The reclaimer only runs from `Idle` — it competes for the same
//! transition the job runner uses, so cleanup and job execution are
//! mutually exclusive. After the cleanup script exits it holds the
//! `Cleaning` state for a fixed cool-down while filesystem metadata catches
//! up, which also keeps the executor from thrashing between cleaning and
//! running.

use std::ffi::CString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::error::RunnerError;
use crate::exec::ScriptRunner;
use crate::state::Scheduler;

/// Reports how full the disk holding the artifacts is.
#[async_trait]
pub trait DiskGauge: Send + Sync {
    /// Current used/total ratio in `[0, 1]`.
    async fn usage_ratio(&self) -> Result<f64, RunnerError>;
}

/// `statvfs`-backed gauge over the filesystem containing `path`.
pub struct StatvfsGauge {
    path: PathBuf,
}

impl StatvfsGauge {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl DiskGauge for StatvfsGauge {
    async fn usage_ratio(&self) -> Result<f64, RunnerError> {
        let raw = self.path.as_os_str().as_encoded_bytes().to_vec();
        let cpath = CString::new(raw)
            .map_err(|_| RunnerError::Io(std::io::Error::other("path contains a NUL byte")))?;

        let mut stats: libc::statvfs = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::statvfs(cpath.as_ptr(), &mut stats) };
        if rc != 0 {
            return Err(RunnerError::Io(std::io::Error::last_os_error()));
        }
        if stats.f_blocks == 0 {
            return Err(RunnerError::Io(std::io::Error::other(
                "filesystem reports zero blocks",
            )));
        }

        let total = stats.f_blocks as f64;
        let used = (stats.f_blocks - stats.f_bfree) as f64;
        Ok(used / total)
    }
}

/// Runs the cleanup script when disk usage crosses the threshold.
pub struct SpaceReclaimer {
    scheduler: Arc<Scheduler>,
    exec: Arc<dyn ScriptRunner>,
    cooldown: Duration,
}

impl SpaceReclaimer {
    pub fn new(scheduler: Arc<Scheduler>, exec: Arc<dyn ScriptRunner>, cooldown: Duration) -> Self {
        Self {
            scheduler,
            exec,
            cooldown,
        }
    }

    /// One cleanup cycle. A no-op unless the executor is idle; the caller
    /// races fairly against the job runner for that transition.
    pub async fn run(&self) {
        if !self.scheduler.begin_cleaning().await {
            debug!("executor busy, skipping cleanup");
            return;
        }

        info!("cleanup started");
        match self.exec.run_cleanup().await {
            Ok(output) => {
                info!(
                    exit_code = output.exit_code,
                    stdout = %output.stdout.trim_end(),
                    stderr = %output.stderr.trim_end(),
                    "cleanup script finished"
                );
            }
            Err(e) => {
                // Operational failure; the cool-down still applies so a
                // broken cleanup script cannot spin the executor.
                error!(error = %e, "failed to run cleanup script");
            }
        }

        tokio::time::sleep(self.cooldown).await;
        self.scheduler.finish_cleaning().await;
        info!("cleanup finished, executor idle");
    }
}
