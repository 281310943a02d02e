use crate::checkpoint::StatusValue;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("timed out after {}s waiting for {step}", timeout.as_secs())]
    Timeout {
        step: &'static str,
        timeout: Duration,
    },
    #[error("{step} failed: {message}")]
    Failure { step: &'static str, message: String },
    #[error("sign-in did not reach the dashboard; landed on {current_url}")]
    Rejected { current_url: String },
}

impl SessionError {
    pub fn failure(step: &'static str, err: impl ToString) -> Self {
        Self::Failure {
            step,
            message: err.to_string(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// A live browsing session against the portal.
#[async_trait]
pub trait PortalSession: Send {
    /// Sign in. Succeeds only when the browser lands on the dashboard.
    async fn authenticate(&mut self) -> Result<(), SessionError>;

    /// Read the status field from the current page.
    async fn read_status(&mut self) -> Result<StatusValue, SessionError>;

    /// PNG screenshot of the current page.
    async fn screenshot(&mut self) -> Result<Vec<u8>, SessionError>;

    /// Tear down the underlying browser session. Called once, by the owner.
    async fn close(&mut self) -> Result<(), SessionError>;
}

/// Factory for fresh sessions; the monitor recycles them periodically.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn acquire(&self) -> Result<Box<dyn PortalSession>, SessionError>;
}
