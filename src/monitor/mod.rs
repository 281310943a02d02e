//! The poll loop: sign in, read the status date, compare it with the
//! checkpoint, report, and sleep until the next cycle.
//!
//! Browser sessions are recycled once they outlive the reinit interval; the
//! old session is always released before its replacement is acquired. A
//! failure to start a session, sign in, or read the status is not retried.
//! It ends the loop after one error notification.

use crate::artifacts::{self, ArtifactTag};
use crate::checkpoint::{CheckpointError, CheckpointStore, StatusValue};
use crate::clock::Clock;
use crate::config::Config;
use crate::notify::{Notification, NotifierSet};
use crate::retention;
use crate::session::{ManagedSession, SessionError, SessionProvider};
use chrono::Local;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    SessionActive,
    Reinitializing,
    Sleeping,
    Aborted,
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SessionActive => "session_active",
            Self::Reinitializing => "reinitializing",
            Self::Sleeping => "sleeping",
            Self::Aborted => "aborted",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The status differs from the checkpoint, or no checkpoint existed.
    Updated {
        previous: Option<StatusValue>,
        current: StatusValue,
    },
    Unchanged(StatusValue),
}

#[derive(Debug, Error)]
pub enum FatalError {
    #[error("browser session could not be started: {0}")]
    SessionStart(SessionError),
    #[error("sign-in failed: {0}")]
    Authentication(SessionError),
    #[error("status read failed: {0}")]
    StatusRead(SessionError),
}

impl FatalError {
    /// Upper-case phase label used in the error notification body.
    pub fn phase(&self) -> &'static str {
        match self {
            Self::SessionStart(_) => "SESSION START",
            Self::Authentication(_) => "SIGN IN",
            Self::StatusRead(_) => "UPDATE CHECK",
        }
    }

    pub fn session_error(&self) -> &SessionError {
        match self {
            Self::SessionStart(e) | Self::Authentication(e) | Self::StatusRead(e) => e,
        }
    }
}

/// Loop parameters resolved from [`Config`].
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub check_interval: Duration,
    pub reinit_interval: Duration,
    pub subject_prefix: String,
    pub artifacts_dir: PathBuf,
    pub purge: bool,
    pub keep: usize,
}

impl MonitorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            check_interval: config.monitor.check_interval(),
            reinit_interval: config.monitor.reinit_interval(),
            subject_prefix: config.monitor.subject_prefix.clone(),
            artifacts_dir: config.artifacts_dir(),
            purge: config.artifacts.purge,
            keep: config.artifacts.keep,
        }
    }
}

pub struct Monitor {
    provider: Arc<dyn SessionProvider>,
    notifiers: NotifierSet,
    checkpoint: CheckpointStore,
    clock: Arc<dyn Clock>,
    settings: MonitorSettings,
    session: Option<ManagedSession>,
    state: MonitorState,
    cycles: u64,
    sessions_started: u64,
}

impl Monitor {
    pub fn new(
        provider: Arc<dyn SessionProvider>,
        notifiers: NotifierSet,
        checkpoint: CheckpointStore,
        clock: Arc<dyn Clock>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            provider,
            notifiers,
            checkpoint,
            clock,
            settings,
            session: None,
            state: MonitorState::Reinitializing,
            cycles: 0,
            sessions_started: 0,
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn sessions_started(&self) -> u64 {
        self.sessions_started
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    fn set_state(&mut self, next: MonitorState) {
        if self.state != next {
            info!(from = %self.state, to = %next, cycle = self.cycles, "Monitor state change");
            self.state = next;
        }
    }

    /// Run cycles until a fatal error, or until `max_cycles` have completed.
    ///
    /// Sleeps `check_interval` between cycles, never after the last bounded one.
    pub async fn run(&mut self, max_cycles: Option<u64>) -> Result<(), FatalError> {
        let mut completed: u64 = 0;
        loop {
            self.run_cycle().await?;
            completed += 1;
            if max_cycles.is_some_and(|max| completed >= max) {
                return Ok(());
            }

            self.set_state(MonitorState::Sleeping);
            info!(
                cycle = self.cycles,
                next_check_secs = self.settings.check_interval.as_secs(),
                "Waiting for next check"
            );
            self.clock.sleep(self.settings.check_interval).await;
        }
    }

    /// One check cycle without the trailing sleep.
    ///
    /// On a fatal error the session has already been released and the error
    /// notification sent by the time this returns.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, FatalError> {
        self.cycles += 1;
        match self.check_portal().await {
            Ok(outcome) => {
                self.apply_retention();
                Ok(outcome)
            }
            Err(fatal) => {
                self.abort(&fatal).await;
                Err(fatal)
            }
        }
    }

    /// Release the held session, if any.
    pub async fn shutdown(&mut self) {
        if let Some(session) = self.session.take() {
            session.release().await;
        }
    }

    async fn ensure_session(&mut self) -> Result<(), FatalError> {
        let now = self.clock.now();
        let stale = self
            .session
            .as_ref()
            .is_none_or(|s| s.is_expired(now, self.settings.reinit_interval));
        if !stale {
            self.set_state(MonitorState::SessionActive);
            return Ok(());
        }

        self.set_state(MonitorState::Reinitializing);
        if let Some(old) = self.session.take() {
            info!(
                session = old.id(),
                age_secs = old.age(now).as_secs(),
                "Recycling browser session"
            );
            old.release().await;
        }

        self.sessions_started += 1;
        let session = ManagedSession::acquire(
            self.provider.as_ref(),
            self.sessions_started,
            self.clock.now(),
        )
        .await
        .map_err(FatalError::SessionStart)?;
        self.session = Some(session);
        self.set_state(MonitorState::SessionActive);
        Ok(())
    }

    async fn check_portal(&mut self) -> Result<CycleOutcome, FatalError> {
        self.ensure_session().await?;
        let cycle = self.cycles;
        let Some(managed) = self.session.as_mut() else {
            return Err(FatalError::SessionStart(SessionError::failure(
                "session start",
                "no session held after acquisition",
            )));
        };
        let session_id = managed.id();

        managed
            .session()
            .authenticate()
            .await
            .map_err(FatalError::Authentication)?;

        let current = managed
            .session()
            .read_status()
            .await
            .map_err(FatalError::StatusRead)?;
        info!(cycle, session = session_id, status = %current, "Portal status read");

        let previous = match self.checkpoint.read() {
            Ok(value) => Some(value),
            Err(CheckpointError::NotFound(_)) => {
                info!(cycle, "No checkpoint yet, treating status as new");
                None
            }
            Err(e) => {
                warn!(cycle, "Checkpoint unreadable, treating as absent: {e}");
                None
            }
        };

        let prefix = &self.settings.subject_prefix;
        if previous.as_ref() == Some(&current) {
            info!(cycle, status = %current, "No update");
            let artifact = artifacts::capture(
                managed.session(),
                &self.settings.artifacts_dir,
                ArtifactTag::NoUpdate,
            )
            .await;
            let notification = Notification::no_update(prefix, &current, Local::now().date_naive())
                .with_artifact(artifact);
            self.notifiers.notify(&notification).await;
            return Ok(CycleOutcome::Unchanged(current));
        }

        info!(
            cycle,
            previous = previous.as_ref().map_or("<none>", |p| p.as_str()),
            current = %current,
            "Portal updated"
        );
        let artifact = artifacts::capture(
            managed.session(),
            &self.settings.artifacts_dir,
            ArtifactTag::Update,
        )
        .await;
        let notification = Notification::update(prefix, &current).with_artifact(artifact);
        self.notifiers.notify(&notification).await;

        if let Err(e) = self.checkpoint.write(&current) {
            warn!(cycle, "Checkpoint not saved: {e}");
        }

        Ok(CycleOutcome::Updated { previous, current })
    }

    async fn abort(&mut self, fatal: &FatalError) {
        self.set_state(MonitorState::Aborted);
        error!(
            cycle = self.cycles,
            phase = fatal.phase(),
            timed_out = fatal.session_error().is_timeout(),
            "{fatal}"
        );

        let artifact = match self.session.as_mut() {
            Some(managed) => {
                artifacts::capture(
                    managed.session(),
                    &self.settings.artifacts_dir,
                    ArtifactTag::NoUpdate,
                )
                .await
            }
            None => None,
        };

        let notification = Notification::error(
            &self.settings.subject_prefix,
            fatal.phase(),
            &fatal.session_error().to_string(),
        )
        .with_artifact(artifact);
        self.notifiers.notify(&notification).await;

        self.apply_retention();
        self.shutdown().await;
    }

    fn apply_retention(&self) {
        if !self.settings.purge {
            return;
        }
        if let Err(e) = retention::purge(&self.settings.artifacts_dir, self.settings.keep) {
            warn!(dir = %self.settings.artifacts_dir.display(), "Screenshot purge failed: {e:#}");
        }
    }
}
