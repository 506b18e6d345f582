//! Persistence traits — job history and upload credentials.
//!
//! Both are optional collaborators: the core runs fine without either when
//! no database is configured. Encryption of stored tokens is the backend's
//! concern; the core only ever sees `SecretString`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use uuid::Uuid;

use crate::error::StoreError;

/// One admitted job, recorded at submission time.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: Uuid,
    pub submitter_id: String,
    /// Job base name (recipe name without its extension).
    pub job_name: String,
    pub recorded_at: DateTime<Utc>,
}

/// A submitter's model-hub upload credential.
#[derive(Debug, Clone)]
pub struct UploadCredential {
    pub submitter_id: String,
    pub account: String,
    pub token: SecretString,
}

impl UploadCredential {
    /// Validate the token shape before it is ever stored. Hub tokens start
    /// with `hf_`.
    pub fn validate_token(token: &str) -> Result<(), StoreError> {
        if !token.starts_with("hf_") {
            return Err(StoreError::InvalidToken {
                reason: "token should begin with 'hf_'".to_string(),
            });
        }
        Ok(())
    }
}

/// Append-only record of admitted jobs per submitter.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Record an admitted job for a submitter.
    async fn record_job(&self, submitter_id: &str, job_name: &str) -> Result<(), StoreError>;

    /// Most recent jobs for a submitter, newest first.
    async fn jobs_for(
        &self,
        submitter_id: &str,
        limit: usize,
    ) -> Result<Vec<JobRecord>, StoreError>;
}

/// Keyed store of upload credentials, one per submitter, overwritten on
/// re-login.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn set_credential(&self, credential: &UploadCredential) -> Result<(), StoreError>;

    async fn credential_for(
        &self,
        submitter_id: &str,
    ) -> Result<Option<UploadCredential>, StoreError>;
}
