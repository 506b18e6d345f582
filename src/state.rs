//! Executor state machine and the shared scheduler.
//!
//! The two priority queues and the executor state are the only shared
//! mutable state in the service. Both live inside `Scheduler` behind a
//! single lock, so "check Idle, then transition" is one indivisible step —
//! the polling loop and the post-completion disk trigger can race for it
//! safely.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::warn;

use crate::error::SubmitError;
use crate::queue::{QueuedTask, TaskQueue, Tier};

/// What the single worker is doing right now.
///
/// Transitions into `Running` or `Cleaning` are only permitted from `Idle`;
/// the runner and the space reclaimer can therefore never be active at the
/// same time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ExecutorState {
    /// Nothing in flight.
    Idle,
    /// A job script is executing.
    Running {
        label: String,
        started_at: DateTime<Utc>,
    },
    /// The cleanup script is executing (or cooling down afterwards).
    Cleaning { started_at: DateTime<Utc> },
}

impl ExecutorState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

impl std::fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running { label, started_at } => {
                write!(f, "{label}, started at {}", started_at.format("%m-%d %H:%M:%S"))
            }
            Self::Cleaning { started_at } => {
                write!(f, "cleaning, started at {}", started_at.format("%m-%d %H:%M:%S"))
            }
        }
    }
}

/// Owned scheduler: the two ordered queues plus the executor state, guarded
/// together. All mutation goes through these methods; nothing else in the
/// crate touches the queues or the state directly.
pub struct Scheduler {
    inner: RwLock<SchedulerInner>,
}

struct SchedulerInner {
    tasks: TaskQueue,
    executor: ExecutorState,
}

impl Scheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: RwLock::new(SchedulerInner {
                tasks: TaskQueue::new(),
                executor: ExecutorState::Idle,
            }),
        })
    }

    /// Queue a task for a submitter. Fails with `DuplicateSubmitter` if the
    /// submitter already has one pending in either tier.
    pub async fn submit(
        &self,
        submitter_id: &str,
        recipe: &str,
        tier: Tier,
    ) -> Result<(), SubmitError> {
        self.inner.write().await.tasks.submit(submitter_id, recipe, tier)
    }

    /// Whether the submitter has a pending task in either tier.
    pub async fn has_pending(&self, submitter_id: &str) -> bool {
        self.inner.read().await.tasks.has_pending(submitter_id)
    }

    /// The recipe name of a submitter's pending task, if any.
    pub async fn pending_recipe(&self, submitter_id: &str) -> Option<String> {
        self.inner
            .read()
            .await
            .tasks
            .pending_recipe(submitter_id)
            .map(String::from)
    }

    /// Dequeue the next eligible task and transition `Idle → Running` as one
    /// critical section. Returns `None` (and changes nothing) if the
    /// executor is busy or both queues are empty.
    pub async fn begin_next_job(&self) -> Option<QueuedTask> {
        let mut inner = self.inner.write().await;
        if !inner.executor.is_idle() {
            return None;
        }
        let task = inner.tasks.dequeue_next()?;
        inner.executor = ExecutorState::Running {
            label: format!("running: {}", task.base_name()),
            started_at: Utc::now(),
        };
        Some(task)
    }

    /// Transition `Idle → Cleaning` if the executor is idle. Returns false
    /// (and changes nothing) otherwise.
    pub async fn begin_cleaning(&self) -> bool {
        let mut inner = self.inner.write().await;
        if !inner.executor.is_idle() {
            return false;
        }
        inner.executor = ExecutorState::Cleaning {
            started_at: Utc::now(),
        };
        true
    }

    /// End a job cycle: drop the submitter's entry from both tiers (only one
    /// should ever hold it) and return the executor to `Idle`.
    pub async fn complete_job(&self, submitter_id: &str) {
        let mut inner = self.inner.write().await;
        inner.tasks.remove(submitter_id);
        if !matches!(inner.executor, ExecutorState::Running { .. }) {
            warn!(state = %inner.executor, "completing a job while executor was not running");
        }
        inner.executor = ExecutorState::Idle;
    }

    /// End a cleaning cycle and return the executor to `Idle`.
    pub async fn finish_cleaning(&self) {
        let mut inner = self.inner.write().await;
        if !matches!(inner.executor, ExecutorState::Cleaning { .. }) {
            warn!(state = %inner.executor, "finishing cleanup while executor was not cleaning");
        }
        inner.executor = ExecutorState::Idle;
    }

    /// Consistent snapshot of the executor state.
    pub async fn status(&self) -> ExecutorState {
        self.inner.read().await.executor.clone()
    }

    /// Pending task counts as `(normal, low)`.
    pub async fn depths(&self) -> (usize, usize) {
        self.inner.read().await.tasks.depths()
    }
}

/// Read-only view over the scheduler for external callers.
#[derive(Clone)]
pub struct StatusReporter {
    scheduler: Arc<Scheduler>,
}

impl StatusReporter {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self { scheduler }
    }

    /// Snapshot of the current executor state. No mutation, no side effects.
    pub async fn current_status(&self) -> ExecutorState {
        self.scheduler.status().await
    }
}
