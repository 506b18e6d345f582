//! Single-concurrency job runner.
//!
//! Polls the scheduler on a fixed interval. Each cycle dequeues at most one
//! task, runs its script to completion, writes the combined output to the
//! well-known log artifact, notifies the submitter, and only then considers
//! disk pressure. The loop itself never terminates because of a job: script
//! failures are delivered as results, and even a failure to spawn the
//! script only costs that one cycle.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::exec::ScriptRunner;
use crate::notify::Notifier;
use crate::queue::QueuedTask;
use crate::reclaim::{DiskGauge, SpaceReclaimer};
use crate::state::Scheduler;
use crate::store::RecipeStore;

/// Collaborators handed to the runner.
pub struct RunnerDeps {
    pub scheduler: Arc<Scheduler>,
    pub store: Arc<RecipeStore>,
    pub exec: Arc<dyn ScriptRunner>,
    pub notifier: Arc<dyn Notifier>,
    pub gauge: Arc<dyn DiskGauge>,
    pub reclaimer: Arc<SpaceReclaimer>,
}

/// The single worker.
pub struct JobRunner {
    scheduler: Arc<Scheduler>,
    store: Arc<RecipeStore>,
    exec: Arc<dyn ScriptRunner>,
    notifier: Arc<dyn Notifier>,
    gauge: Arc<dyn DiskGauge>,
    reclaimer: Arc<SpaceReclaimer>,
    notify_channel: String,
    cleanup_threshold: f64,
}

impl JobRunner {
    pub fn new(deps: RunnerDeps, notify_channel: String, cleanup_threshold: f64) -> Self {
        Self {
            scheduler: deps.scheduler,
            store: deps.store,
            exec: deps.exec,
            notifier: deps.notifier,
            gauge: deps.gauge,
            reclaimer: deps.reclaimer,
            notify_channel,
            cleanup_threshold,
        }
    }

    /// One polling cycle. A no-op unless the executor is idle and a task is
    /// queued; the dequeue and the `Idle → Running` transition happen as a
    /// single step inside the scheduler.
    pub async fn poll_once(&self) {
        let Some(task) = self.scheduler.begin_next_job().await else {
            return;
        };
        self.run_task(task).await;
    }

    async fn run_task(&self, task: QueuedTask) {
        let base = task.base_name().to_string();
        info!(job = base, submitter_id = task.submitter_id, "job started");

        match self.exec.run(&base).await {
            Ok(output) => {
                // Non-zero exit is the job writer's problem, not ours: the
                // output is delivered either way, with no retry.
                info!(job = base, exit_code = output.exit_code, "job finished");
                let record = format!("STDOUT: {}, STDERR: {}", output.stdout, output.stderr);
                debug!(job = base, "{record}");

                let attachment = match self.store.write_log(&record).await {
                    Ok(path) => Some(path),
                    Err(e) => {
                        error!(error = %e, job = base, "failed to write log artifact");
                        None
                    }
                };
                self.deliver(
                    &task.submitter_id,
                    &format!("{base} has finished"),
                    attachment.as_deref(),
                )
                .await;
            }
            Err(e) => {
                // The invocation mechanism itself failed. Operator-visible,
                // fatal to this cycle only.
                error!(error = %e, job = base, "job could not be executed");
                self.deliver(
                    &task.submitter_id,
                    &format!("{base} could not be executed: {e}"),
                    None,
                )
                .await;
            }
        }

        self.scheduler.complete_job(&task.submitter_id).await;
        info!(job = base, "job cycle complete, executor idle");

        self.check_disk().await;
    }

    async fn deliver(&self, submitter_id: &str, text: &str, attachment: Option<&std::path::Path>) {
        if let Err(e) = self
            .notifier
            .notify(&self.notify_channel, submitter_id, text, attachment)
            .await
        {
            // Fire-and-forget: log, never retry.
            warn!(error = %e, submitter_id, "failed to deliver completion notice");
        }
    }

    /// Post-completion disk check. Triggers the reclaimer in the background
    /// so the next polling cycle is not blocked; the reclaimer re-checks the
    /// `Idle` precondition itself and loses gracefully if a new job got
    /// there first.
    async fn check_disk(&self) {
        match self.gauge.usage_ratio().await {
            Ok(ratio) if ratio > self.cleanup_threshold => {
                info!(
                    ratio,
                    threshold = self.cleanup_threshold,
                    "disk usage over threshold, triggering cleanup"
                );
                let reclaimer = Arc::clone(&self.reclaimer);
                tokio::spawn(async move { reclaimer.run().await });
            }
            Ok(ratio) => debug!(ratio, "disk usage under threshold"),
            Err(e) => warn!(error = %e, "disk usage check failed"),
        }
    }
}

/// Run the polling loop forever on a fixed interval.
pub fn spawn_poll_loop(runner: Arc<JobRunner>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            runner.poll_once().await;
        }
    })
}
