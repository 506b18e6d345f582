//! Persistence layer — recipe artifacts on disk, optional libSQL-backed
//! job history and upload credentials.

pub mod libsql_backend;
pub mod recipes;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use recipes::RecipeStore;
pub use traits::{CredentialStore, HistoryStore, JobRecord, UploadCredential};
