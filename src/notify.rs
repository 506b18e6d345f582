//! Completion notification delivery.
//!
//! The core treats delivery as fire-and-forget: failures are logged and
//! never retried. The `Notifier` trait is the boundary to whatever chat
//! platform actually carries the message.

use std::path::Path;

use async_trait::async_trait;
use tracing::info;

use crate::error::NotifyError;

/// Delivery collaborator. `channel` and `submitter_id` are opaque to the
/// core; the attachment, when present, is the run's log artifact.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        channel: &str,
        submitter_id: &str,
        text: &str,
        attachment: Option<&Path>,
    ) -> Result<(), NotifyError>;
}

/// Logs notifications instead of delivering them. Used for local runs and
/// tests.
pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn notify(
        &self,
        channel: &str,
        submitter_id: &str,
        text: &str,
        attachment: Option<&Path>,
    ) -> Result<(), NotifyError> {
        info!(
            channel,
            submitter_id,
            attachment = attachment.map(|p| p.display().to_string()),
            "{text}"
        );
        Ok(())
    }
}

/// Posts notifications to a webhook. Plain JSON without an attachment,
/// multipart with the log file when one is attached.
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(
        &self,
        channel: &str,
        submitter_id: &str,
        text: &str,
        attachment: Option<&Path>,
    ) -> Result<(), NotifyError> {
        let response = match attachment {
            Some(path) => {
                let bytes = tokio::fs::read(path).await?;
                let file_name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("log.txt")
                    .to_string();
                let form = reqwest::multipart::Form::new()
                    .text("channel", channel.to_string())
                    .text("submitter_id", submitter_id.to_string())
                    .text("text", text.to_string())
                    .part(
                        "attachment",
                        reqwest::multipart::Part::bytes(bytes).file_name(file_name),
                    );
                self.client.post(&self.url).multipart(form).send().await
            }
            None => {
                self.client
                    .post(&self.url)
                    .json(&serde_json::json!({
                        "channel": channel,
                        "submitter_id": submitter_id,
                        "text": text,
                    }))
                    .send()
                    .await
            }
        }
        .map_err(|e| NotifyError::Http(e.to_string()))?;

        response
            .error_for_status()
            .map_err(|e| NotifyError::Http(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn console_notifier_always_succeeds() {
        let notifier = ConsoleNotifier;
        notifier
            .notify("chan", "alice", "foo has finished", None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn webhook_with_missing_attachment_is_an_io_error() {
        let notifier = WebhookNotifier::new("http://localhost:1/hook".into());
        let result = notifier
            .notify(
                "chan",
                "alice",
                "text",
                Some(Path::new("/nonexistent/log.txt")),
            )
            .await;
        assert!(matches!(result, Err(NotifyError::Io(_))));
    }
}
