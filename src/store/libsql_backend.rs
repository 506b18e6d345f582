//! libSQL backend for job history and upload credentials.
//!
//! Supports local file and in-memory databases. A single connection is
//! reused for all operations; `libsql::Connection` is safe for concurrent
//! async use.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use secrecy::{ExposeSecret, SecretString};
use tracing::info;
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::traits::{CredentialStore, HistoryStore, JobRecord, UploadCredential};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS job_history (
        id TEXT PRIMARY KEY,
        submitter_id TEXT NOT NULL,
        job_name TEXT NOT NULL,
        recorded_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_job_history_submitter ON job_history(submitter_id);

    CREATE TABLE IF NOT EXISTS upload_credentials (
        submitter_id TEXT PRIMARY KEY,
        account TEXT NOT NULL,
        token TEXT NOT NULL
    );
"#;

/// libSQL database backend implementing both persistence traits.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and initialize the schema.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Database(format!("failed to create db directory: {e}")))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Database(format!("failed to open database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Database(format!("failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Database(format!("failed to create in-memory db: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Database(format!("failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        self.conn
            .execute_batch(SCHEMA)
            .await
            .map_err(|e| StoreError::Database(format!("schema init failed: {e}")))?;
        Ok(())
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[async_trait]
impl HistoryStore for LibSqlBackend {
    async fn record_job(&self, submitter_id: &str, job_name: &str) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO job_history (id, submitter_id, job_name, recorded_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    Uuid::new_v4().to_string(),
                    submitter_id,
                    job_name,
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StoreError::Database(format!("record_job failed: {e}")))?;
        Ok(())
    }

    async fn jobs_for(
        &self,
        submitter_id: &str,
        limit: usize,
    ) -> Result<Vec<JobRecord>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, submitter_id, job_name, recorded_at FROM job_history
                 WHERE submitter_id = ?1 ORDER BY recorded_at DESC LIMIT ?2",
                params![submitter_id, limit as i64],
            )
            .await
            .map_err(|e| StoreError::Database(format!("jobs_for failed: {e}")))?;

        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Database(format!("row read failed: {e}")))?
        {
            let id_str: String = row
                .get(0)
                .map_err(|e| StoreError::Database(e.to_string()))?;
            let recorded_str: String = row
                .get(3)
                .map_err(|e| StoreError::Database(e.to_string()))?;
            records.push(JobRecord {
                id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
                submitter_id: row.get(1).map_err(|e| StoreError::Database(e.to_string()))?,
                job_name: row.get(2).map_err(|e| StoreError::Database(e.to_string()))?,
                recorded_at: parse_datetime(&recorded_str),
            });
        }
        Ok(records)
    }
}

#[async_trait]
impl CredentialStore for LibSqlBackend {
    async fn set_credential(&self, credential: &UploadCredential) -> Result<(), StoreError> {
        UploadCredential::validate_token(credential.token.expose_secret())?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO upload_credentials (submitter_id, account, token)
                 VALUES (?1, ?2, ?3)",
                params![
                    credential.submitter_id.as_str(),
                    credential.account.as_str(),
                    credential.token.expose_secret(),
                ],
            )
            .await
            .map_err(|e| StoreError::Database(format!("set_credential failed: {e}")))?;
        Ok(())
    }

    async fn credential_for(
        &self,
        submitter_id: &str,
    ) -> Result<Option<UploadCredential>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT submitter_id, account, token FROM upload_credentials
                 WHERE submitter_id = ?1",
                params![submitter_id],
            )
            .await
            .map_err(|e| StoreError::Database(format!("credential_for failed: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| StoreError::Database(format!("row read failed: {e}")))?
        {
            Some(row) => {
                let token: String = row
                    .get(2)
                    .map_err(|e| StoreError::Database(e.to_string()))?;
                Ok(Some(UploadCredential {
                    submitter_id: row.get(0).map_err(|e| StoreError::Database(e.to_string()))?,
                    account: row.get(1).map_err(|e| StoreError::Database(e.to_string()))?,
                    token: SecretString::from(token),
                }))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn history_roundtrip() {
        let db = LibSqlBackend::new_memory().await.unwrap();

        db.record_job("alice", "foo").await.unwrap();
        db.record_job("alice", "bar").await.unwrap();
        db.record_job("bob", "baz").await.unwrap();

        let jobs = db.jobs_for("alice", 10).await.unwrap();
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|j| j.submitter_id == "alice"));

        let jobs = db.jobs_for("nobody", 10).await.unwrap();
        assert!(jobs.is_empty());
    }

    #[tokio::test]
    async fn credential_overwrites_on_relogin() {
        let db = LibSqlBackend::new_memory().await.unwrap();

        let first = UploadCredential {
            submitter_id: "alice".into(),
            account: "alice-hub".into(),
            token: SecretString::from("hf_first"),
        };
        db.set_credential(&first).await.unwrap();

        let second = UploadCredential {
            account: "alice-new".into(),
            token: SecretString::from("hf_second"),
            ..first
        };
        db.set_credential(&second).await.unwrap();

        let stored = db.credential_for("alice").await.unwrap().unwrap();
        assert_eq!(stored.account, "alice-new");
        assert_eq!(stored.token.expose_secret(), "hf_second");
    }

    #[tokio::test]
    async fn invalid_token_is_refused() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let bad = UploadCredential {
            submitter_id: "alice".into(),
            account: "alice-hub".into(),
            token: SecretString::from("not-a-token"),
        };
        assert!(matches!(
            db.set_credential(&bad).await,
            Err(StoreError::InvalidToken { .. })
        ));
    }

    #[tokio::test]
    async fn missing_credential_is_none() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        assert!(db.credential_for("ghost").await.unwrap().is_none());
    }
}
