//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Service configuration.
///
/// Every field has a default; `from_env()` overrides from `MERGEBOX_*`
/// environment variables.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Directory holding recipes, the run/cleanup scripts, and the log file.
    pub base_dir: PathBuf,
    /// Script invoked for each job, with the job base name as its argument.
    pub run_script: String,
    /// Script invoked to reclaim disk space, no arguments.
    pub cleanup_script: String,
    /// Name of the well-known log artifact, overwritten each run.
    pub log_file: String,
    /// Words that demote a recipe to the low-priority tier (gate role required).
    pub gated_words: Vec<String>,
    /// Words that make a recipe unrunnable for anyone.
    pub forbidden_words: Vec<String>,
    /// Message sent to submitters refused for gated content.
    pub gated_words_error: String,
    /// Disk usage ratio above which cleanup is triggered.
    pub cleanup_threshold: f64,
    /// How often the runner polls the queues.
    pub poll_interval: Duration,
    /// How long the executor stays in the cleaning state after the cleanup
    /// script exits, letting filesystem metadata catch up.
    pub cleanup_cooldown: Duration,
    /// Maximum job runtime. `None` means jobs run unbounded, which blocks
    /// the whole queue behind a hung job.
    pub job_timeout: Option<Duration>,
    /// Port for the HTTP status endpoint.
    pub status_port: u16,
    /// Webhook URL for completion notifications, if any.
    pub webhook_url: Option<String>,
    /// Database path for job history and upload credentials, if enabled.
    pub db_path: Option<PathBuf>,
    /// Opaque channel identifier passed through to the notifier.
    pub notify_channel: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            run_script: "run.sh".to_string(),
            cleanup_script: "cleanup.sh".to_string(),
            log_file: "log.txt".to_string(),
            gated_words: Vec::new(),
            forbidden_words: Vec::new(),
            gated_words_error: "This recipe contains gated words and cannot be run.".to_string(),
            cleanup_threshold: 0.95,
            poll_interval: Duration::from_secs(10),
            cleanup_cooldown: Duration::from_secs(30),
            job_timeout: None,
            status_port: 8080,
            webhook_url: None,
            db_path: None,
            notify_channel: "default".to_string(),
        }
    }
}

impl BotConfig {
    /// Build a config from `MERGEBOX_*` environment variables, falling back
    /// to defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("MERGEBOX_BASE_DIR") {
            config.base_dir = PathBuf::from(dir);
        }
        if let Ok(script) = std::env::var("MERGEBOX_RUN_SCRIPT") {
            config.run_script = script;
        }
        if let Ok(script) = std::env::var("MERGEBOX_CLEANUP_SCRIPT") {
            config.cleanup_script = script;
        }
        if let Ok(file) = std::env::var("MERGEBOX_LOG_FILE") {
            config.log_file = file;
        }
        if let Ok(words) = std::env::var("MERGEBOX_GATED_WORDS") {
            config.gated_words = parse_word_list(&words);
        }
        if let Ok(words) = std::env::var("MERGEBOX_FORBIDDEN_WORDS") {
            config.forbidden_words = parse_word_list(&words);
        }
        if let Ok(message) = std::env::var("MERGEBOX_GATED_WORDS_ERROR") {
            config.gated_words_error = message;
        }
        if let Ok(threshold) = std::env::var("MERGEBOX_CLEANUP_THRESHOLD") {
            config.cleanup_threshold = parse_ratio("MERGEBOX_CLEANUP_THRESHOLD", &threshold)?;
        }
        if let Ok(secs) = std::env::var("MERGEBOX_POLL_INTERVAL_SECS") {
            config.poll_interval = parse_secs("MERGEBOX_POLL_INTERVAL_SECS", &secs)?;
        }
        if let Ok(secs) = std::env::var("MERGEBOX_CLEANUP_COOLDOWN_SECS") {
            config.cleanup_cooldown = parse_secs("MERGEBOX_CLEANUP_COOLDOWN_SECS", &secs)?;
        }
        if let Ok(secs) = std::env::var("MERGEBOX_JOB_TIMEOUT_SECS") {
            config.job_timeout = Some(parse_secs("MERGEBOX_JOB_TIMEOUT_SECS", &secs)?);
        }
        if let Ok(port) = std::env::var("MERGEBOX_STATUS_PORT") {
            config.status_port =
                port.parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: "MERGEBOX_STATUS_PORT".to_string(),
                        message: format!("not a port number: {port}"),
                    })?;
        }
        if let Ok(url) = std::env::var("MERGEBOX_WEBHOOK_URL") {
            config.webhook_url = Some(url);
        }
        if let Ok(path) = std::env::var("MERGEBOX_DB_PATH") {
            config.db_path = Some(PathBuf::from(path));
        }
        if let Ok(channel) = std::env::var("MERGEBOX_NOTIFY_CHANNEL") {
            config.notify_channel = channel;
        }

        Ok(config)
    }
}

/// Split a comma-separated word list, dropping empty entries so that a
/// trailing comma never produces a match-everything word.
fn parse_word_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|w| w.trim().to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

fn parse_secs(key: &str, raw: &str) -> Result<Duration, ConfigError> {
    raw.parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("not a number of seconds: {raw}"),
        })
}

fn parse_ratio(key: &str, raw: &str) -> Result<f64, ConfigError> {
    let value: f64 = raw.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("not a number: {raw}"),
    })?;
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("ratio must be between 0 and 1, got {value}"),
        });
    }
    Ok(value)
}
