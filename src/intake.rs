//! Submission intake.
//!
//! Runs the admission path in order: pending-task check, name validation,
//! duplicate-artifact check, content screening, artifact persistence,
//! history append, enqueue. Every rejection happens here, before a task
//! exists; nothing past this point can refuse a job.

use std::sync::Arc;

use tracing::{info, warn};

use crate::admission::WordFilter;
use crate::error::{Error, SubmitError};
use crate::queue::Tier;
use crate::state::Scheduler;
use crate::store::{HistoryStore, RecipeStore};

/// One inbound submission, as handed over by the transport layer. The
/// transport has already resolved the submitter's gate privilege into a
/// capability flag.
#[derive(Debug, Clone)]
pub struct Submission {
    pub submitter_id: String,
    pub recipe_name: String,
    pub content: Vec<u8>,
    pub has_gate_role: bool,
}

/// The admission path: filter, store, queue.
pub struct Intake {
    scheduler: Arc<Scheduler>,
    store: Arc<RecipeStore>,
    filter: WordFilter,
    history: Option<Arc<dyn HistoryStore>>,
}

impl Intake {
    pub fn new(
        scheduler: Arc<Scheduler>,
        store: Arc<RecipeStore>,
        filter: WordFilter,
        history: Option<Arc<dyn HistoryStore>>,
    ) -> Self {
        Self {
            scheduler,
            store,
            filter,
            history,
        }
    }

    /// Admit a new submission. On success the recipe is stored, the task is
    /// queued, and the tier it landed in is returned.
    pub async fn submit(&self, submission: Submission) -> Result<Tier, Error> {
        let Submission {
            submitter_id,
            recipe_name,
            content,
            has_gate_role,
        } = submission;

        if let Some(pending) = self.scheduler.pending_recipe(&submitter_id).await {
            return Err(SubmitError::DuplicateSubmitter {
                submitter_id,
                recipe: pending,
            }
            .into());
        }

        validate_recipe_name(&recipe_name)?;

        if self.store.contains(&recipe_name).await {
            return Err(SubmitError::DuplicateArtifact { name: recipe_name }.into());
        }

        let text = std::str::from_utf8(&content).map_err(|_| SubmitError::ContentNotUtf8 {
            name: recipe_name.clone(),
        })?;
        let tier = self.filter.screen(&recipe_name, text, has_gate_role)?;

        self.store.save(&recipe_name, &content).await.map_err(Error::Store)?;
        self.record_history(&submitter_id, base_of(&recipe_name)).await;

        self.scheduler.submit(&submitter_id, &recipe_name, tier).await?;
        info!(submitter_id, recipe = recipe_name, %tier, "task submitted");
        Ok(tier)
    }

    /// Re-queue a previously stored recipe (no new content). Admission is
    /// re-run against the stored bytes, since the word lists may have
    /// changed since the first run.
    pub async fn resubmit(
        &self,
        submitter_id: &str,
        recipe_name: &str,
        has_gate_role: bool,
    ) -> Result<Tier, Error> {
        if let Some(pending) = self.scheduler.pending_recipe(submitter_id).await {
            return Err(SubmitError::DuplicateSubmitter {
                submitter_id: submitter_id.to_string(),
                recipe: pending,
            }
            .into());
        }

        if !self.store.contains(recipe_name).await {
            return Err(SubmitError::UnknownRecipe {
                name: recipe_name.to_string(),
            }
            .into());
        }

        let content = self.store.load(recipe_name).await.map_err(Error::Store)?;
        let text = std::str::from_utf8(&content).map_err(|_| SubmitError::ContentNotUtf8 {
            name: recipe_name.to_string(),
        })?;
        let tier = self.filter.screen(recipe_name, text, has_gate_role)?;

        self.scheduler.submit(submitter_id, recipe_name, tier).await?;
        info!(submitter_id, recipe = recipe_name, %tier, "task resubmitted");
        Ok(tier)
    }

    async fn record_history(&self, submitter_id: &str, job_name: &str) {
        if let Some(ref history) = self.history {
            if let Err(e) = history.record_job(submitter_id, job_name).await {
                warn!(error = %e, submitter_id, job_name, "failed to record job history");
            }
        }
    }
}

/// Recipes must be plain `.yaml` file names — no directories, no other
/// extensions.
fn validate_recipe_name(name: &str) -> Result<(), SubmitError> {
    let invalid = |reason: &str| SubmitError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err(invalid("must be a bare file name"));
    }
    let lower = name.to_lowercase();
    if !lower.ends_with(".yaml") {
        return Err(invalid("must end in .yaml"));
    }
    if lower == ".yaml" {
        return Err(invalid("missing a name before the extension"));
    }
    Ok(())
}

fn base_of(name: &str) -> &str {
    name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::admission::WordFilter;

    fn intake_with(dir: &std::path::Path, filter: WordFilter) -> (Intake, Arc<Scheduler>) {
        let scheduler = Scheduler::new();
        let store = Arc::new(RecipeStore::new(dir.to_path_buf(), "log.txt".into()));
        let intake = Intake::new(Arc::clone(&scheduler), store, filter, None);
        (intake, scheduler)
    }

    fn submission(name: &str, content: &str) -> Submission {
        Submission {
            submitter_id: "alice".into(),
            recipe_name: name.into(),
            content: content.as_bytes().to_vec(),
            has_gate_role: false,
        }
    }

    fn filter() -> WordFilter {
        WordFilter::new(vec!["experimental".into()], vec!["nsfw".into()])
    }

    #[tokio::test]
    async fn clean_submission_lands_in_normal_queue() {
        let dir = tempfile::tempdir().unwrap();
        let (intake, scheduler) = intake_with(dir.path(), filter());

        let tier = intake
            .submit(submission("foo.yaml", "hello world"))
            .await
            .unwrap();
        assert_eq!(tier, Tier::Normal);
        assert_eq!(
            scheduler.pending_recipe("alice").await.as_deref(),
            Some("foo.yaml")
        );
        assert_eq!(scheduler.depths().await, (1, 0));
    }

    #[tokio::test]
    async fn forbidden_submission_is_refused_and_nothing_changes() {
        let dir = tempfile::tempdir().unwrap();
        let (intake, scheduler) = intake_with(dir.path(), filter());

        let result = intake.submit(submission("bar.yaml", "very nsfw merge")).await;
        assert!(matches!(
            result,
            Err(Error::Submit(SubmitError::ContentForbidden { .. }))
        ));
        assert_eq!(scheduler.depths().await, (0, 0));
        // The artifact was not stored either.
        let (intake2, _) = intake_with(dir.path(), filter());
        assert!(intake2
            .submit(submission("bar.yaml", "clean now"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn gated_needs_the_role_and_lands_low() {
        let dir = tempfile::tempdir().unwrap();
        let (intake, scheduler) = intake_with(dir.path(), filter());

        let refused = intake
            .submit(submission("gated.yaml", "an experimental merge"))
            .await;
        assert!(matches!(
            refused,
            Err(Error::Submit(SubmitError::ContentGatedNoPrivilege { .. }))
        ));

        let mut s = submission("gated.yaml", "an experimental merge");
        s.has_gate_role = true;
        let tier = intake.submit(s).await.unwrap();
        assert_eq!(tier, Tier::Low);
        assert_eq!(scheduler.depths().await, (0, 1));
    }

    #[tokio::test]
    async fn duplicate_artifact_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let (intake, scheduler) = intake_with(dir.path(), filter());

        intake
            .submit(submission("foo.yaml", "hello"))
            .await
            .unwrap();

        // Another submitter reuses the name after alice's task completes.
        scheduler.complete_job("alice").await;
        let mut s = submission("foo.yaml", "different content");
        s.submitter_id = "bob".into();
        assert!(matches!(
            intake.submit(s).await,
            Err(Error::Submit(SubmitError::DuplicateArtifact { .. }))
        ));
    }

    #[tokio::test]
    async fn second_pending_submission_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let (intake, _) = intake_with(dir.path(), filter());

        intake.submit(submission("a.yaml", "one")).await.unwrap();
        let result = intake.submit(submission("b.yaml", "two")).await;
        assert!(matches!(
            result,
            Err(Error::Submit(SubmitError::DuplicateSubmitter { recipe, .. })) if recipe == "a.yaml"
        ));
    }

    #[tokio::test]
    async fn resubmit_requires_a_stored_recipe() {
        let dir = tempfile::tempdir().unwrap();
        let (intake, scheduler) = intake_with(dir.path(), filter());

        assert!(matches!(
            intake.resubmit("alice", "ghost.yaml", false).await,
            Err(Error::Submit(SubmitError::UnknownRecipe { .. }))
        ));

        intake.submit(submission("foo.yaml", "hello")).await.unwrap();
        scheduler.complete_job("alice").await;

        let tier = intake.resubmit("alice", "foo.yaml", false).await.unwrap();
        assert_eq!(tier, Tier::Normal);
    }

    #[tokio::test]
    async fn resubmit_rescreens_stored_content() {
        let dir = tempfile::tempdir().unwrap();
        let (intake, scheduler) = intake_with(dir.path(), WordFilter::default());

        // Stored while the lists were empty.
        intake
            .submit(submission("edgy.yaml", "an experimental merge"))
            .await
            .unwrap();
        scheduler.complete_job("alice").await;

        // Lists changed since: the same recipe is now gated.
        let strict = Intake::new(
            Arc::clone(&scheduler),
            Arc::new(RecipeStore::new(dir.path().to_path_buf(), "log.txt".into())),
            filter(),
            None,
        );
        assert!(matches!(
            strict.resubmit("alice", "edgy.yaml", false).await,
            Err(Error::Submit(SubmitError::ContentGatedNoPrivilege { .. }))
        ));
        assert_eq!(
            strict.resubmit("alice", "edgy.yaml", true).await.unwrap(),
            Tier::Low
        );
    }

    #[test]
    fn recipe_name_validation() {
        assert!(validate_recipe_name("foo.yaml").is_ok());
        assert!(validate_recipe_name("Foo.YAML").is_ok());
        assert!(validate_recipe_name("foo.yml").is_err());
        assert!(validate_recipe_name("../etc/passwd.yaml").is_err());
        assert!(validate_recipe_name("dir/foo.yaml").is_err());
        assert!(validate_recipe_name(".yaml").is_err());
    }

    #[tokio::test]
    async fn non_utf8_content_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let (intake, _) = intake_with(dir.path(), filter());

        let mut s = submission("bin.yaml", "");
        s.content = vec![0xff, 0xfe, 0x00];
        assert!(matches!(
            intake.submit(s).await,
            Err(Error::Submit(SubmitError::ContentNotUtf8 { .. }))
        ));
    }
}
