use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};

use mergebox::admission::WordFilter;
use mergebox::config::BotConfig;
use mergebox::exec::{ScriptRunner, ShellScriptRunner};
use mergebox::http::status_routes;
use mergebox::intake::{Intake, Submission};
use mergebox::notify::{ConsoleNotifier, Notifier, WebhookNotifier};
use mergebox::reclaim::{SpaceReclaimer, StatvfsGauge};
use mergebox::runner::{self, JobRunner, RunnerDeps};
use mergebox::state::{Scheduler, StatusReporter};
use mergebox::store::{
    CredentialStore, HistoryStore, LibSqlBackend, RecipeStore, UploadCredential,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Tracing to stderr, plus a non-blocking daily file when a log dir is set.
    let _guard = match std::env::var("MERGEBOX_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "mergebox.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
                )
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        Err(_) => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
                )
                .with_target(false)
                .init();
            None
        }
    };

    let config = BotConfig::from_env().context("invalid configuration")?;

    eprintln!("📦 mergebox v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Base dir: {}", config.base_dir.display());
    eprintln!("   Status API: http://0.0.0.0:{}/api/status", config.status_port);
    eprintln!(
        "   Poll every {:?}, cleanup over {:.0}% disk use",
        config.poll_interval,
        config.cleanup_threshold * 100.0
    );
    eprintln!(
        "   Commands: submit <who> <file.yaml> [--gated-role] | regen <who> <name.yaml> [--gated-role] | login <who> <account> <hf_token> | status | quit\n"
    );

    // ── Stores ───────────────────────────────────────────────────────────
    let store = Arc::new(RecipeStore::new(
        config.base_dir.clone(),
        config.log_file.clone(),
    ));
    store.ensure_dirs().await.context("creating base dir")?;

    let db: Option<Arc<LibSqlBackend>> = match config.db_path {
        Some(ref path) => {
            let backend = LibSqlBackend::new_local(path)
                .await
                .with_context(|| format!("opening database at {}", path.display()))?;
            eprintln!("   History: enabled ({})", path.display());
            Some(Arc::new(backend))
        }
        None => {
            eprintln!("   History: disabled");
            None
        }
    };
    let history: Option<Arc<dyn HistoryStore>> =
        db.clone().map(|d| d as Arc<dyn HistoryStore>);
    let credentials: Option<Arc<dyn CredentialStore>> =
        db.map(|d| d as Arc<dyn CredentialStore>);

    // ── Core ─────────────────────────────────────────────────────────────
    let scheduler = Scheduler::new();
    let filter = WordFilter::new(config.gated_words.clone(), config.forbidden_words.clone());
    let intake = Arc::new(Intake::new(
        Arc::clone(&scheduler),
        Arc::clone(&store),
        filter,
        history,
    ));

    let exec: Arc<dyn ScriptRunner> = Arc::new(
        ShellScriptRunner::new(
            config.base_dir.clone(),
            config.run_script.clone(),
            config.cleanup_script.clone(),
        )
        .with_job_timeout(config.job_timeout),
    );

    let notifier: Arc<dyn Notifier> = match config.webhook_url {
        Some(ref url) => {
            eprintln!("   Notifier: webhook ({url})");
            Arc::new(WebhookNotifier::new(url.clone()))
        }
        None => {
            eprintln!("   Notifier: console");
            Arc::new(ConsoleNotifier)
        }
    };

    let reclaimer = Arc::new(SpaceReclaimer::new(
        Arc::clone(&scheduler),
        Arc::clone(&exec),
        config.cleanup_cooldown,
    ));

    let runner = Arc::new(JobRunner::new(
        RunnerDeps {
            scheduler: Arc::clone(&scheduler),
            store: Arc::clone(&store),
            exec,
            notifier,
            gauge: Arc::new(StatvfsGauge::new(&config.base_dir)),
            reclaimer,
        },
        config.notify_channel.clone(),
        config.cleanup_threshold,
    ));

    // ── Status server ────────────────────────────────────────────────────
    let reporter = StatusReporter::new(Arc::clone(&scheduler));
    let app = status_routes(reporter.clone());
    let status_port = config.status_port;
    tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{status_port}"))
            .await
            .expect("Failed to bind status port");
        tracing::info!(port = status_port, "Status server started");
        axum::serve(listener, app).await.ok();
    });

    // ── Worker loop ──────────────────────────────────────────────────────
    let _poll_handle = runner::spawn_poll_loop(Arc::clone(&runner), config.poll_interval);

    // ── Local command loop (stand-in for the chat transport) ─────────────
    let gated_words_error = config.gated_words_error.clone();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match handle_command(&line, &intake, &reporter, credentials.as_deref()).await {
            CommandResult::Quit => break,
            CommandResult::Reply(text) => println!("{text}"),
            CommandResult::GatedRefusal => println!("{gated_words_error}"),
            CommandResult::Silent => {}
        }
    }

    eprintln!("Shutting down.");
    Ok(())
}

enum CommandResult {
    Reply(String),
    GatedRefusal,
    Silent,
    Quit,
}

async fn handle_command(
    line: &str,
    intake: &Intake,
    reporter: &StatusReporter,
    credentials: Option<&dyn CredentialStore>,
) -> CommandResult {
    use mergebox::error::{Error, SubmitError};

    let parts: Vec<&str> = line.split_whitespace().collect();
    let gated = parts.contains(&"--gated-role");

    let result = match parts.as_slice() {
        [] => return CommandResult::Silent,
        ["quit"] | ["exit"] => return CommandResult::Quit,
        ["status"] => {
            let state = reporter.current_status().await;
            return CommandResult::Reply(match state {
                mergebox::state::ExecutorState::Idle => "Currently idle...".to_string(),
                other => format!("Currently {other}"),
            });
        }
        ["submit", submitter, path, ..] => {
            let name = Path::new(path)
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(path)
                .to_string();
            match tokio::fs::read(path).await {
                Ok(content) => {
                    intake
                        .submit(Submission {
                            submitter_id: submitter.to_string(),
                            recipe_name: name.clone(),
                            content,
                            has_gate_role: gated,
                        })
                        .await
                        .map(|tier| format!("Task submitted for {submitter}: {name} ({tier} tier)"))
                }
                Err(e) => return CommandResult::Reply(format!("Cannot read {path}: {e}")),
            }
        }
        ["regen", submitter, name, ..] => intake
            .resubmit(submitter, name, gated)
            .await
            .map(|tier| format!("Rerunning {name} submitted from {submitter} ({tier} tier)")),
        ["login", submitter, account, token] => {
            let Some(store) = credentials else {
                return CommandResult::Reply("Credential storage is disabled.".to_string());
            };
            let credential = UploadCredential {
                submitter_id: submitter.to_string(),
                account: account.to_string(),
                token: secrecy::SecretString::from(token.to_string()),
            };
            return match store.set_credential(&credential).await {
                Ok(()) => CommandResult::Reply(format!(
                    "Upload settings for {submitter} updated to {account}: <censored>"
                )),
                Err(e) => CommandResult::Reply(format!("Rejected: {e}")),
            };
        }
        _ => {
            return CommandResult::Reply(
                "Unknown command. Try: submit | regen | status | quit".to_string(),
            );
        }
    };

    match result {
        Ok(reply) => CommandResult::Reply(reply),
        Err(Error::Submit(SubmitError::ContentGatedNoPrivilege { .. })) => {
            CommandResult::GatedRefusal
        }
        Err(e) => CommandResult::Reply(format!("Rejected: {e}")),
    }
}
