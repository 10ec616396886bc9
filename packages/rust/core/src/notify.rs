//! Notification building and dispatch.
//!
//! The pipeline hands `{subject, body_markdown, body_html}` payloads to an
//! email-dispatch collaborator behind the [`Notifier`] capability. Dispatch
//! is a boolean outcome: a sync must succeed even if every send fails.

use pulldown_cmark::{Parser, html};
use tracing::warn;
use url::Url;

use threadsync_shared::{Notification, Result, ThreadSyncError};

/// Build a notification payload from a markdown body.
pub fn build_notification(subject: impl Into<String>, body_markdown: impl Into<String>) -> Notification {
    let body_markdown = body_markdown.into();
    let body_html = markdown_to_html(&body_markdown);
    Notification {
        subject: subject.into(),
        body_markdown,
        body_html,
    }
}

/// Render markdown to HTML for the rich email body.
pub fn markdown_to_html(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len() * 2);
    html::push_html(&mut out, Parser::new(markdown));
    out
}

/// Outbound notification capability.
#[allow(async_fn_in_trait)]
pub trait Notifier {
    /// Dispatch a notification. Returns whether delivery was accepted;
    /// failures are logged by the implementation, never propagated.
    async fn send(&self, notification: &Notification) -> bool;
}

/// Discards notifications; used in tests and dry runs.
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    async fn send(&self, _notification: &Notification) -> bool {
        true
    }
}

/// Posts notifications as JSON to a mail gateway endpoint.
pub struct MailGatewayNotifier {
    client: reqwest::Client,
    endpoint: Url,
    recipient: String,
}

impl MailGatewayNotifier {
    pub fn new(endpoint: &str, recipient: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| ThreadSyncError::config(format!("invalid notify gateway_url: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .map_err(|e| ThreadSyncError::Notify(e.to_string()))?;
        Ok(Self {
            client,
            endpoint,
            recipient: recipient.to_string(),
        })
    }
}

impl Notifier for MailGatewayNotifier {
    async fn send(&self, notification: &Notification) -> bool {
        let payload = serde_json::json!({
            "to": self.recipient,
            "subject": notification.subject,
            "body_markdown": notification.body_markdown,
            "body_html": notification.body_html,
        });

        let result = self
            .client
            .post(self.endpoint.clone())
            .json(&payload)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(status = %response.status(), subject = %notification.subject, "notification rejected");
                false
            }
            Err(e) => {
                warn!(error = %e, subject = %notification.subject, "notification dispatch failed");
                false
            }
        }
    }
}
