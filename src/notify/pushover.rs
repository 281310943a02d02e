use super::traits::{Notification, Notifier};
use crate::config::PushConfig;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

const MAX_TITLE_CHARS: usize = 250;
const MAX_MESSAGE_CHARS: usize = 1024;
/// Pushover rejects attachments above this size.
const MAX_ATTACHMENT_BYTES: usize = 2_621_440;
const REQUEST_TIMEOUT_SECS: u64 = 30;

pub struct PushoverNotifier {
    client: Client,
    api_url: String,
    user: String,
    token: String,
}

impl PushoverNotifier {
    /// `None` unless both user key and app token are configured.
    pub fn from_config(config: &PushConfig) -> Option<Self> {
        if !config.is_configured() {
            return None;
        }
        Some(Self {
            client: Client::new(),
            api_url: config.api_url.clone(),
            user: config.user.clone().unwrap_or_default(),
            token: config.token.clone().unwrap_or_default(),
        })
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

async fn image_part(path: &Path) -> Option<Part> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(file = %path.display(), "Screenshot not attached to push: {e}");
            return None;
        }
    };
    if bytes.len() > MAX_ATTACHMENT_BYTES {
        warn!(
            file = %path.display(),
            size = bytes.len(),
            "Screenshot too large for push attachment"
        );
        return None;
    }
    let file_name = path
        .file_name()
        .map_or_else(|| "screenshot.png".to_string(), |n| n.to_string_lossy().to_string());
    Part::bytes(bytes)
        .file_name(file_name)
        .mime_str("image/png")
        .ok()
}

#[async_trait]
impl Notifier for PushoverNotifier {
    fn name(&self) -> &str {
        "pushover"
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        let mut form = Form::new()
            .text("token", self.token.clone())
            .text("user", self.user.clone())
            .text("title", truncate_chars(&notification.subject, MAX_TITLE_CHARS))
            .text("message", truncate_chars(&notification.body, MAX_MESSAGE_CHARS));

        if let Some(path) = notification.artifact() {
            if let Some(part) = image_part(path).await {
                form = form.part("attachment", part);
            }
        }

        let response = self
            .client
            .post(&self.api_url)
            .multipart(form)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .send()
            .await
            .context("Pushover request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Pushover API returned status {status}: {body}");
        }

        info!(title = %notification.subject, "Push notification sent");
        Ok(())
    }
}
