//! Two-tier task queue keyed by submitter.
//!
//! A submitter holds at most one pending task across both tiers; within a
//! tier, order is strict FIFO. Dequeue always drains the normal tier before
//! the low tier.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::error::SubmitError;

/// Priority class of a queued task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Clean submissions.
    Normal,
    /// Gated submissions from privileged submitters.
    Low,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Low => write!(f, "low"),
        }
    }
}

/// A queued task: one submitter, one recipe, one tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedTask {
    pub submitter_id: String,
    pub recipe: String,
    pub tier: Tier,
}

impl QueuedTask {
    /// The job identifier: the recipe name with its last extension stripped.
    pub fn base_name(&self) -> &str {
        self.recipe
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(&self.recipe)
    }
}

/// The two insertion-ordered queues.
///
/// Purely a collection; the caller is responsible for the duplicate-artifact
/// check against the recipe store before submitting.
#[derive(Debug, Default)]
pub struct TaskQueue {
    normal: VecDeque<QueuedTask>,
    low: VecDeque<QueuedTask>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task to the tail of its tier's queue.
    ///
    /// Fails with `DuplicateSubmitter` if the submitter already has a
    /// pending task in either tier.
    pub fn submit(
        &mut self,
        submitter_id: impl Into<String>,
        recipe: impl Into<String>,
        tier: Tier,
    ) -> Result<(), SubmitError> {
        let submitter_id = submitter_id.into();
        if let Some(pending) = self.pending_recipe(&submitter_id) {
            return Err(SubmitError::DuplicateSubmitter {
                submitter_id,
                recipe: pending.to_string(),
            });
        }
        let task = QueuedTask {
            submitter_id,
            recipe: recipe.into(),
            tier,
        };
        match tier {
            Tier::Normal => self.normal.push_back(task),
            Tier::Low => self.low.push_back(task),
        }
        Ok(())
    }

    /// Pop the next eligible task.
    ///
    /// The normal tier is strictly preferred; the low tier only yields when
    /// the normal tier is empty. Low-tier tasks therefore avoid starvation
    /// only as long as normal traffic is bursty rather than continuous.
    pub fn dequeue_next(&mut self) -> Option<QueuedTask> {
        self.normal.pop_front().or_else(|| self.low.pop_front())
    }

    /// Remove a submitter's task from whichever tier holds it. Idempotent;
    /// sweeps both tiers since only one should ever hold an entry.
    pub fn remove(&mut self, submitter_id: &str) {
        self.normal.retain(|t| t.submitter_id != submitter_id);
        self.low.retain(|t| t.submitter_id != submitter_id);
    }

    /// Whether the submitter has a pending task in either tier.
    pub fn has_pending(&self, submitter_id: &str) -> bool {
        self.pending_recipe(submitter_id).is_some()
    }

    /// The recipe name of the submitter's pending task, if any.
    pub fn pending_recipe(&self, submitter_id: &str) -> Option<&str> {
        self.normal
            .iter()
            .chain(self.low.iter())
            .find(|t| t.submitter_id == submitter_id)
            .map(|t| t.recipe.as_str())
    }

    /// Pending task counts as `(normal, low)`.
    pub fn depths(&self) -> (usize, usize) {
        (self.normal.len(), self.low.len())
    }

    pub fn is_empty(&self) -> bool {
        self.normal.is_empty() && self.low.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_within_tier() {
        let mut q = TaskQueue::new();
        q.submit("alice", "a.yaml", Tier::Normal).unwrap();
        q.submit("bob", "b.yaml", Tier::Normal).unwrap();

        assert_eq!(q.dequeue_next().unwrap().recipe, "a.yaml");
        assert_eq!(q.dequeue_next().unwrap().recipe, "b.yaml");
        assert!(q.dequeue_next().is_none());
    }

    #[test]
    fn normal_tier_strictly_preferred() {
        let mut q = TaskQueue::new();
        q.submit("carol", "c.yaml", Tier::Low).unwrap();
        q.submit("alice", "a.yaml", Tier::Normal).unwrap();
        q.submit("bob", "b.yaml", Tier::Normal).unwrap();

        // Normal = [A, B], Low = [C]: yields A, B, then C — never C first.
        assert_eq!(q.dequeue_next().unwrap().recipe, "a.yaml");
        assert_eq!(q.dequeue_next().unwrap().recipe, "b.yaml");
        assert_eq!(q.dequeue_next().unwrap().recipe, "c.yaml");
    }

    #[test]
    fn one_pending_task_per_submitter() {
        let mut q = TaskQueue::new();
        q.submit("alice", "a.yaml", Tier::Normal).unwrap();

        // Same tier.
        assert!(matches!(
            q.submit("alice", "b.yaml", Tier::Normal),
            Err(SubmitError::DuplicateSubmitter { recipe, .. }) if recipe == "a.yaml"
        ));
        // Other tier — the invariant spans both queues.
        assert!(matches!(
            q.submit("alice", "b.yaml", Tier::Low),
            Err(SubmitError::DuplicateSubmitter { .. })
        ));

        assert_eq!(q.depths(), (1, 0));
    }

    #[test]
    fn remove_is_idempotent() {
        let mut q = TaskQueue::new();
        q.submit("alice", "a.yaml", Tier::Low).unwrap();

        q.remove("alice");
        assert!(!q.has_pending("alice"));
        q.remove("alice");
        q.remove("nobody");
        assert!(q.is_empty());
    }

    #[test]
    fn submitter_free_after_dequeue_and_remove() {
        let mut q = TaskQueue::new();
        q.submit("alice", "a.yaml", Tier::Normal).unwrap();
        let task = q.dequeue_next().unwrap();
        q.remove(&task.submitter_id);

        q.submit("alice", "again.yaml", Tier::Normal).unwrap();
        assert!(q.has_pending("alice"));
    }

    #[test]
    fn base_name_strips_last_extension() {
        let task = QueuedTask {
            submitter_id: "a".into(),
            recipe: "my.merge.yaml".into(),
            tier: Tier::Normal,
        };
        assert_eq!(task.base_name(), "my.merge");

        let bare = QueuedTask {
            submitter_id: "a".into(),
            recipe: "noext".into(),
            tier: Tier::Normal,
        };
        assert_eq!(bare.base_name(), "noext");
    }

    #[test]
    fn pending_recipe_finds_either_tier() {
        let mut q = TaskQueue::new();
        q.submit("alice", "a.yaml", Tier::Low).unwrap();
        assert_eq!(q.pending_recipe("alice"), Some("a.yaml"));
        assert_eq!(q.pending_recipe("bob"), None);
    }
}
