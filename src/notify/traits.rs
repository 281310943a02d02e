use crate::checkpoint::StatusValue;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Update,
    NoUpdate,
    Error,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Update => "update",
            Self::NoUpdate => "no_update",
            Self::Error => "error",
        })
    }
}

/// One outbound message, rendered once and handed to every notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub subject: String,
    pub body: String,
    /// Screenshot to attach, when one was captured
    pub artifact: Option<PathBuf>,
}

impl Notification {
    pub fn update(prefix: &str, current: &StatusValue) -> Self {
        Self {
            kind: NotificationKind::Update,
            subject: format!("{prefix} Update"),
            body: format!("The portal was updated on {current}."),
            artifact: None,
        }
    }

    pub fn no_update(prefix: &str, current: &StatusValue, today: NaiveDate) -> Self {
        Self {
            kind: NotificationKind::NoUpdate,
            subject: format!("{prefix} Status"),
            body: format!(
                "No update on the portal as of {}.\nLast update was on {current}.",
                today.format("%B %d, %Y")
            ),
            artifact: None,
        }
    }

    /// `phase` names what failed, e.g. "SIGN IN" or "UPDATE CHECK".
    pub fn error(prefix: &str, phase: &str, detail: &str) -> Self {
        Self {
            kind: NotificationKind::Error,
            subject: format!("{prefix} Script Error"),
            body: format!("{phase} FAILED -- {detail}"),
            artifact: None,
        }
    }

    pub fn with_artifact(mut self, artifact: Option<PathBuf>) -> Self {
        self.artifact = artifact;
        self
    }

    pub fn artifact(&self) -> Option<&Path> {
        self.artifact.as_deref()
    }
}

/// Delivery backend for operator notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, notification: &Notification) -> anyhow::Result<()>;
}
