//! Error types for mergebox.

use std::time::Duration;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Submission rejected: {0}")]
    Submit(#[from] SubmitError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Runner error: {0}")]
    Runner(#[from] RunnerError),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Admission-time rejections. All of these are resolved before a task is
/// created; none of them ever reaches the runner.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("{submitter_id} already has a pending task: {recipe}")]
    DuplicateSubmitter { submitter_id: String, recipe: String },

    #[error("a recipe named {name} has already been run")]
    DuplicateArtifact { name: String },

    #[error("recipe {name} contains forbidden words and cannot be run")]
    ContentForbidden { name: String },

    #[error("recipe {name} contains gated words and the submitter lacks the gate role")]
    ContentGatedNoPrivilege { name: String },

    #[error("invalid recipe name {name}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("recipe {name} is not valid UTF-8")]
    ContentNotUtf8 { name: String },

    #[error("no stored recipe named {name}")]
    UnknownRecipe { name: String },
}

/// Artifact and persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid upload token: {reason}")]
    InvalidToken { reason: String },
}

/// Execution-side errors. A job script exiting non-zero is *not* represented
/// here — output is captured and delivered regardless of exit status. These
/// variants cover the invocation mechanism itself failing.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("failed to launch {script}: {source}")]
    Spawn {
        script: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{script} exceeded the maximum runtime of {limit:?} and was killed")]
    Timeout { script: String, limit: Duration },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Notification delivery errors. Delivery is fire-and-forget from the
/// runner's perspective; these are logged, never retried.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
