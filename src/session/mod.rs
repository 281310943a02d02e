pub mod traits;
pub mod webdriver;

pub use traits::{PortalSession, SessionError, SessionProvider};
pub use webdriver::WebDriverProvider;

use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Owned handle around a provider-issued session.
///
/// Acquired at loop start or at a reinitialization point and released
/// explicitly when superseded or when the process aborts. Dropping an
/// unreleased handle leaks the remote browser session and logs a warning.
pub struct ManagedSession {
    inner: Box<dyn PortalSession>,
    id: u64,
    acquired_at: Instant,
    released: bool,
}

impl ManagedSession {
    pub async fn acquire(
        provider: &dyn SessionProvider,
        id: u64,
        now: Instant,
    ) -> Result<Self, SessionError> {
        info!(session = id, provider = provider.name(), "Starting browser session");
        let inner = provider.acquire().await?;
        info!(session = id, "Browser session ready");
        Ok(Self {
            inner,
            id,
            acquired_at: now,
            released: false,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.acquired_at)
    }

    /// True once the session has outlived `max_age`.
    pub fn is_expired(&self, now: Instant, max_age: Duration) -> bool {
        self.age(now) > max_age
    }

    pub fn session(&mut self) -> &mut dyn PortalSession {
        self.inner.as_mut()
    }

    /// Close the browser session. Close errors are logged, not returned.
    pub async fn release(mut self) {
        info!(session = self.id, "Closing browser session");
        if let Err(e) = self.inner.close().await {
            warn!(session = self.id, "Browser session did not close cleanly: {e}");
        }
        self.released = true;
    }
}

impl Drop for ManagedSession {
    fn drop(&mut self) {
        if !self.released {
            warn!(session = self.id, "Browser session dropped without release");
        }
    }
}
