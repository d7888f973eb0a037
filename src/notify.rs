use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use reqwest::Url;
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Serialize)]
struct Message<'a> {
    text: &'a str,
}

struct Webhook {
    client: reqwest::Client,
    url: Url,
}

/// Posts plain-text messages to a Slack-style incoming webhook.
#[derive(Clone)]
pub struct Notifier {
    webhook: Option<Arc<Webhook>>,
}

impl Notifier {
    pub fn new(client: reqwest::Client, url: Option<Url>) -> Self {
        Self {
            webhook: url.map(|url| Arc::new(Webhook { client, url })),
        }
    }

    pub fn disabled() -> Self {
        Self { webhook: None }
    }

    /// Sends a message in the background.
    ///
    /// Returns immediately. Delivery failures are only logged.
    pub fn notify(&self, text: impl Into<String>) {
        let Some(webhook) = self.webhook.clone() else {
            return;
        };
        let text = text.into();

        tokio::spawn(async move {
            if let Err(e) = webhook.send(&text).await {
                warn!("Could not deliver a notification: {e:#}");
            }
        });
    }
}

impl Webhook {
    async fn send(&self, text: &str) -> Result<()> {
        debug!(%text, "Sending a notification");

        self.client
            .post(self.url.clone())
            .json(&Message { text })
            .send()
            .await
            .map_err(Into::into)
            .and_then(|r| r.error_for_status().context("webhook returned an error"))
            .with_context(|| anyhow!("could not post to `{}`", self.url))?;

        Ok(())
    }
}
