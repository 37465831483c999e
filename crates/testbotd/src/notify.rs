//! Chat notifications for run outcomes and rejected pushes.
//!
//! Payloads follow the Slack incoming-webhook attachment format:
//! one summary attachment with `Commit` and `Author` fields, and on failure
//! a second attachment carrying the escaped command log.

use crate::push::PushEvent;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use testbot_ci::{RunOutcome, StepFailure};
use tracing::{info, warn};

const PROFILE_URL_BASE: &str = "https://github.com/";

/// Errors from delivering a notification. Logged, never retried.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("sending request: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("webhook responded with status {0}")]
    Status(u16),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub title: String,
    pub value: String,
    pub short: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    pub text: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<Field>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mrkdwn_in: Vec<String>,
}

/// Body posted to the chat webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl NotificationPayload {
    /// Plain-text message, used for rejected pushes.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            attachments: Vec::new(),
        }
    }

    /// Summary and optional log attachment for a finished run.
    pub fn for_outcome(outcome: &RunOutcome, push: &PushEvent) -> Self {
        let attachments = match outcome {
            RunOutcome::Success => vec![summary_attachment("good", "passed :thumbsup:", push)],
            RunOutcome::Failure(failure) => vec![
                summary_attachment("danger", "failed :thumbsdown:", push),
                log_attachment(&failure_log(failure)),
            ],
        };
        Self {
            text: None,
            attachments,
        }
    }

    /// Failure report for a run that died inside the runner itself.
    pub fn for_internal_error(message: &str, push: &PushEvent) -> Self {
        Self {
            text: None,
            attachments: vec![
                summary_attachment("danger", "failed :thumbsdown:", push),
                log_attachment(&format!("*Internal error: *{message}")),
            ],
        }
    }
}

fn summary_attachment(color: &str, result: &str, push: &PushEvent) -> Attachment {
    let commit = push.head_commit().cloned().unwrap_or_default();
    let username = &commit.author.username;

    Attachment {
        color: Some(color.to_string()),
        text: format!("Integration tests {result}"),
        fields: vec![
            Field {
                title: "Commit".to_string(),
                value: format!("<{}|{}>", commit.url, commit.message),
                short: false,
            },
            Field {
                title: "Author".to_string(),
                value: format!("<{PROFILE_URL_BASE}{username}|{username}>"),
                short: false,
            },
        ],
        mrkdwn_in: Vec::new(),
    }
}

fn log_attachment(log: &str) -> Attachment {
    Attachment {
        color: None,
        text: escape_log(log),
        fields: Vec::new(),
        mrkdwn_in: vec!["text".to_string()],
    }
}

/// The log block reported for a failed step.
pub fn failure_log(failure: &StepFailure) -> String {
    format!(
        "*Command run: *`{}`\n{}",
        failure.invocation,
        failure.error_text()
    )
}

/// Escape `"`, `&`, `<` and `>` (in that order) for the chat markup.
///
/// Must be applied exactly once; a second pass double-escapes.
pub fn escape_log(text: &str) -> String {
    text.replace('"', "\\\"")
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Delivery backend for notification payloads.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, payload: &NotificationPayload) -> Result<(), NotifyError>;
}

/// Posts payloads as JSON to an incoming-webhook URL.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn deliver(&self, payload: &NotificationPayload) -> Result<(), NotifyError> {
        let resp = self.client.post(&self.url).json(payload).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }
        Ok(())
    }
}

/// Turns outcomes and rejections into payloads and delivers them.
///
/// Delivery failures are logged and swallowed; they never change a run's outcome.
#[derive(Clone)]
pub struct Reporter {
    notifier: Option<Arc<dyn Notifier>>,
}

impl Reporter {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier: Some(notifier),
        }
    }

    /// A reporter with no webhook configured: payloads are logged and dropped.
    pub fn disabled() -> Self {
        Self { notifier: None }
    }

    /// Report a finished run.
    pub async fn report(&self, outcome: &RunOutcome, push: &PushEvent) {
        self.send(&NotificationPayload::for_outcome(outcome, push))
            .await;
    }

    /// Report a run that ended in an internal error rather than a step failure.
    pub async fn internal_error(&self, message: &str, push: &PushEvent) {
        self.send(&NotificationPayload::for_internal_error(message, push))
            .await;
    }

    /// Report a push that was rejected before running.
    pub async fn reject(&self, reason: &str) {
        self.send(&NotificationPayload::plain(reason)).await;
    }

    async fn send(&self, payload: &NotificationPayload) {
        let Some(notifier) = &self.notifier else {
            warn!(
                payload = %serde_json::to_string(payload).unwrap_or_default(),
                "no webhook configured; dropping notification"
            );
            return;
        };

        info!("sending results to chat");
        if let Err(e) = notifier.deliver(payload).await {
            warn!(error = %e, "notification delivery failed");
        }
    }
}
