use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_DIR_NAME: &str = ".portal-watch";
const CONFIG_FILE_NAME: &str = "config.toml";

// ── Top-level config ──────────────────────────────────────────────

/// Immutable runtime configuration, built once at startup and passed by
/// reference into the monitor, notifiers and checkpoint store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to config.toml - computed at load time, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub portal: PortalConfig,

    #[serde(default)]
    pub browser: BrowserConfig,

    #[serde(default)]
    pub email: EmailConfig,

    #[serde(default)]
    pub push: PushConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub artifacts: ArtifactsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

// ── Portal ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    /// Portal account identifier typed into the username field
    #[serde(default)]
    pub username: String,
    /// Portal account password
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_login_url")]
    pub login_url: String,
    /// A successful sign-in must land exactly on this URL
    #[serde(default = "default_dashboard_url")]
    pub dashboard_url: String,
    /// Element id of the username input
    #[serde(default = "default_username_field")]
    pub username_field: String,
    /// Element id of the password input
    #[serde(default = "default_password_field")]
    pub password_field: String,
    /// CSS selector of the element holding the status date
    #[serde(default = "default_status_selector")]
    pub status_selector: String,
    /// Pause after submitting credentials before checking the landing URL
    #[serde(default = "default_post_login_delay_secs")]
    pub post_login_delay_secs: u64,
}

fn default_login_url() -> String {
    "https://tracker-suivi.apps.cic.gc.ca/en/login".into()
}

fn default_dashboard_url() -> String {
    "https://tracker-suivi.apps.cic.gc.ca/en/dashboard".into()
}

fn default_username_field() -> String {
    "uci".into()
}

fn default_password_field() -> String {
    "password".into()
}

fn default_status_selector() -> String {
    ".date-text".into()
}

fn default_post_login_delay_secs() -> u64 {
    2
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            login_url: default_login_url(),
            dashboard_url: default_dashboard_url(),
            username_field: default_username_field(),
            password_field: default_password_field(),
            status_selector: default_status_selector(),
            post_login_delay_secs: default_post_login_delay_secs(),
        }
    }
}

// ── Browser ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// WebDriver endpoint URL (e.g. chromedriver on http://127.0.0.1:9515)
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,
    #[serde(default = "default_true")]
    pub headless: bool,
    /// CSS zoom applied to the page body before interacting and capturing
    #[serde(default = "default_zoom_percent")]
    pub zoom_percent: u32,
    /// Upper bound for every element wait, in seconds
    #[serde(default = "default_wait_timeout_secs")]
    pub wait_timeout_secs: u64,
    /// Upper bound for navigation and other browser commands, in seconds
    #[serde(default = "default_page_load_timeout_secs")]
    pub page_load_timeout_secs: u64,
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    #[serde(default = "default_window_height")]
    pub window_height: u32,
}

fn default_webdriver_url() -> String {
    "http://127.0.0.1:9515".into()
}

fn default_true() -> bool {
    true
}

fn default_zoom_percent() -> u32 {
    30
}

fn default_wait_timeout_secs() -> u64 {
    10
}

fn default_page_load_timeout_secs() -> u64 {
    60
}

fn default_window_width() -> u32 {
    1920
}

fn default_window_height() -> u32 {
    1080
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: default_webdriver_url(),
            headless: default_true(),
            zoom_percent: default_zoom_percent(),
            wait_timeout_secs: default_wait_timeout_secs(),
            page_load_timeout_secs: default_page_load_timeout_secs(),
            window_width: default_window_width(),
            window_height: default_window_height(),
        }
    }
}

impl BrowserConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs.max(1))
    }

    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.page_load_timeout_secs.max(1))
    }
}

// ── Email ────────────────────────────────────────────────────────

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SmtpSecurity {
    /// TLS from the first byte (SMTPS, usually port 465)
    #[default]
    Implicit,
    /// Plain connection upgraded with STARTTLS (usually port 587)
    Starttls,
    /// No TLS at all; only for local relays
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub security: SmtpSecurity,
    /// Account used both as sender and recipient
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub password: String,
}

fn default_smtp_port() -> u16 {
    465
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            security: SmtpSecurity::default(),
            address: String::new(),
            password: String::new(),
        }
    }
}

// ── Push ─────────────────────────────────────────────────────────

/// Optional Pushover delivery. Enabled only when both `user` and `token` are set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_push_api_url")]
    pub api_url: String,
}

fn default_push_api_url() -> String {
    "https://api.pushover.net/1/messages.json".into()
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            user: None,
            token: None,
            api_url: default_push_api_url(),
        }
    }
}

impl PushConfig {
    pub fn is_configured(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        present(&self.user) && present(&self.token)
    }
}

// ── Monitor loop ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Pause between two check cycles
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    /// Maximum lifetime of a browser session before it is recycled
    #[serde(default = "default_reinit_interval_secs")]
    pub reinit_interval_secs: u64,
    /// File holding the last observed status value
    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: PathBuf,
    /// Leading word of every notification subject
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
}

fn default_check_interval_secs() -> u64 {
    60 * 60
}

fn default_reinit_interval_secs() -> u64 {
    default_check_interval_secs() / 2
}

fn default_checkpoint_path() -> PathBuf {
    PathBuf::from("last_updated.txt")
}

fn default_subject_prefix() -> String {
    "Portal".into()
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval_secs(),
            reinit_interval_secs: default_reinit_interval_secs(),
            checkpoint_path: default_checkpoint_path(),
            subject_prefix: default_subject_prefix(),
        }
    }
}

impl MonitorConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn reinit_interval(&self) -> Duration {
        Duration::from_secs(self.reinit_interval_secs)
    }
}

// ── Artifacts ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    /// Directory receiving per-cycle screenshots
    #[serde(default = "default_artifacts_dir")]
    pub dir: PathBuf,
    /// Delete old screenshots after each cycle
    #[serde(default = "default_true")]
    pub purge: bool,
    /// Number of screenshots kept when purging
    #[serde(default = "default_keep")]
    pub keep: usize,
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("screenshots")
}

fn default_keep() -> usize {
    1
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            dir: default_artifacts_dir(),
            purge: default_true(),
            keep: default_keep(),
        }
    }
}

// ── Logging ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Plain-text log file written alongside console output; unset disables it
    #[serde(default = "default_log_file")]
    pub file: Option<PathBuf>,
}

#[allow(clippy::unnecessary_wraps)]
fn default_log_file() -> Option<PathBuf> {
    Some(PathBuf::from("portal_watch.log"))
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: default_log_file(),
        }
    }
}

// ── Config impl ──────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: default_config_path(),
            portal: PortalConfig::default(),
            browser: BrowserConfig::default(),
            email: EmailConfig::default(),
            push: PushConfig::default(),
            monitor: MonitorConfig::default(),
            artifacts: ArtifactsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_config_path() -> PathBuf {
    let home = UserDirs::new().map_or_else(|| PathBuf::from("."), |u| u.home_dir().to_path_buf());
    home.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME)
}

impl Config {
    /// Load the config at `path` (or `~/.portal-watch/config.toml`), writing a
    /// default file first if none exists. Environment overrides are applied.
    pub fn load_or_init(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let home = UserDirs::new()
                    .map(|u| u.home_dir().to_path_buf())
                    .context("Could not find home directory")?;
                home.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME)
            }
        };

        let mut config = if config_path.exists() {
            let contents = fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;
            let mut config: Config = toml::from_str(&contents).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?;
            config.config_path = config_path;
            config
        } else {
            let config = Config {
                config_path,
                ..Config::default()
            };
            config.save()?;
            tracing::info!(
                path = %config.config_path.display(),
                "Wrote default config; fill in portal and email credentials"
            );
            config
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup; empty values are ignored.
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("PORTAL_WATCH_USERNAME") {
            self.portal.username = v;
        }
        if let Some(v) = get("PORTAL_WATCH_PASSWORD") {
            self.portal.password = v;
        }
        if let Some(v) = get("PORTAL_WATCH_EMAIL_ADDRESS") {
            self.email.address = v;
        }
        if let Some(v) = get("PORTAL_WATCH_EMAIL_PASSWORD") {
            self.email.password = v;
        }
        if let Some(v) = get("PORTAL_WATCH_PUSH_USER") {
            self.push.user = Some(v);
        }
        if let Some(v) = get("PORTAL_WATCH_PUSH_TOKEN") {
            self.push.token = Some(v);
        }
        if let Some(v) = get("PORTAL_WATCH_WEBDRIVER_URL") {
            self.browser.webdriver_url = v;
        }
    }

    /// Check everything a monitoring run needs. All problems are reported at once.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.portal.username.trim().is_empty() {
            problems.push("portal.username is empty".to_string());
        }
        if self.portal.password.is_empty() {
            problems.push("portal.password is empty".to_string());
        }
        for (name, url) in [
            ("portal.login_url", &self.portal.login_url),
            ("portal.dashboard_url", &self.portal.dashboard_url),
            ("browser.webdriver_url", &self.browser.webdriver_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                problems.push(format!("{name} must be an http(s) URL, got '{url}'"));
            }
        }
        if self.email.smtp_host.trim().is_empty() {
            problems.push("email.smtp_host is empty".to_string());
        }
        if !self.email.address.contains('@') {
            problems.push("email.address must be an email address".to_string());
        }
        if self.push.user.is_some() != self.push.token.is_some() {
            problems.push("push.user and push.token must be set together".to_string());
        }
        if self.monitor.check_interval_secs == 0 {
            problems.push("monitor.check_interval_secs must be greater than zero".to_string());
        }
        if self.monitor.reinit_interval_secs == 0 {
            problems.push("monitor.reinit_interval_secs must be greater than zero".to_string());
        }

        if self.artifacts.purge {
            problems.extend(self.purge_conflicts());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Invalid configuration in {}:\n  - {}",
                self.config_path.display(),
                problems.join("\n  - ")
            )
        }
    }

    /// Files that purging the screenshot directory would delete.
    fn purge_conflicts(&self) -> Vec<String> {
        let dir = self.artifacts_dir();
        [
            ("config file", Some(self.config_path.clone())),
            ("checkpoint", Some(self.checkpoint_path())),
            ("log file", self.log_file()),
        ]
        .into_iter()
        .filter_map(|(name, path)| {
            let path = path?;
            (path.parent() == Some(dir.as_path())).then(|| {
                format!(
                    "artifacts.dir {} also holds the {name} ({}); purging would delete it",
                    dir.display(),
                    path.display()
                )
            })
        })
        .collect()
    }

    /// Refuse to purge a directory holding the config, checkpoint or log file.
    pub fn check_purge_target(&self) -> Result<()> {
        let conflicts = self.purge_conflicts();
        if conflicts.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("{}", conflicts.join("\n"))
        }
    }

    /// Directory containing config.toml; relative paths are resolved against it.
    pub fn base_dir(&self) -> PathBuf {
        self.config_path
            .parent()
            .map_or_else(|| PathBuf::from("."), PathBuf::from)
    }

    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir().join(path)
        }
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.resolve_path(&self.monitor.checkpoint_path)
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.resolve_path(&self.artifacts.dir)
    }

    pub fn log_file(&self) -> Option<PathBuf> {
        self.logging.file.as_deref().map(|p| self.resolve_path(p))
    }

    pub fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;

        let parent_dir = self
            .config_path
            .parent()
            .context("Config path must have a parent directory")?;
        fs::create_dir_all(parent_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                parent_dir.display()
            )
        })?;

        let file_name = self
            .config_path
            .file_name()
            .and_then(|v| v.to_str())
            .unwrap_or(CONFIG_FILE_NAME);
        let temp_path = parent_dir.join(format!(".{file_name}.tmp-{}", uuid::Uuid::new_v4()));

        let mut temp_file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .with_context(|| {
                format!(
                    "Failed to create temporary config file: {}",
                    temp_path.display()
                )
            })?;
        temp_file
            .write_all(toml_str.as_bytes())
            .context("Failed to write temporary config contents")?;
        temp_file
            .sync_all()
            .context("Failed to fsync temporary config file")?;
        drop(temp_file);

        if let Err(e) = fs::rename(&temp_path, &self.config_path) {
            let _ = fs::remove_file(&temp_path);
            anyhow::bail!("Failed to atomically replace config file: {e}");
        }

        sync_directory(parent_dir)?;
        Ok(())
    }
}

#[cfg(unix)]
pub(crate) fn sync_directory(path: &Path) -> Result<()> {
    let dir = File::open(path)
        .with_context(|| format!("Failed to open directory for fsync: {}", path.display()))?;
    dir.sync_all()
        .with_context(|| format!("Failed to fsync directory metadata: {}", path.display()))?;
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn sync_directory(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn valid_config(dir: &Path) -> Config {
        let mut config = Config {
            config_path: dir.join("config.toml"),
            ..Config::default()
        };
        config.portal.username = "12345678".into();
        config.portal.password = "hunter2".into();
        config.email.smtp_host = "smtp.example.com".into();
        config.email.address = "me@example.com".into();
        config.email.password = "app-password".into();
        config
    }

    // ── Defaults ─────────────────────────────────────────────

    #[test]
    fn config_default_has_sane_values() {
        let c = Config::default();
        assert_eq!(c.monitor.check_interval_secs, 3600);
        assert_eq!(c.monitor.reinit_interval_secs, 1800);
        assert_eq!(c.monitor.checkpoint_path, PathBuf::from("last_updated.txt"));
        assert_eq!(c.artifacts.dir, PathBuf::from("screenshots"));
        assert!(c.artifacts.purge);
        assert_eq!(c.artifacts.keep, 1);
        assert_eq!(c.browser.wait_timeout(), Duration::from_secs(10));
        assert_eq!(c.email.smtp_port, 465);
        assert_eq!(c.email.security, SmtpSecurity::Implicit);
        assert!(!c.push.is_configured());
        assert!(c.config_path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn config_minimal_toml_uses_defaults() {
        let minimal = r#"
[portal]
username = "abc"
password = "secret"
"#;
        let parsed: Config = toml::from_str(minimal).unwrap();
        assert_eq!(parsed.portal.username, "abc");
        assert_eq!(parsed.portal.username_field, "uci");
        assert_eq!(parsed.portal.status_selector, ".date-text");
        assert_eq!(parsed.browser.zoom_percent, 30);
        assert!(parsed.browser.headless);
        assert_eq!(parsed.logging.file, Some(PathBuf::from("portal_watch.log")));
    }

    #[test]
    fn smtp_security_parses_lowercase() {
        let raw = r#"
[email]
smtp_host = "smtp.example.com"
smtp_port = 587
security = "starttls"
"#;
        let parsed: Config = toml::from_str(raw).unwrap();
        assert_eq!(parsed.email.security, SmtpSecurity::Starttls);
        assert_eq!(parsed.email.smtp_port, 587);
    }

    // ── Env overrides ────────────────────────────────────────

    #[test]
    fn env_overrides_replace_secrets() {
        let vars: HashMap<&str, &str> = [
            ("PORTAL_WATCH_USERNAME", "env-user"),
            ("PORTAL_WATCH_PASSWORD", "env-pass"),
            ("PORTAL_WATCH_PUSH_USER", "u-key"),
            ("PORTAL_WATCH_PUSH_TOKEN", "t-key"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env_overrides_from(|k| vars.get(k).map(|v| (*v).to_string()));

        assert_eq!(config.portal.username, "env-user");
        assert_eq!(config.portal.password, "env-pass");
        assert!(config.push.is_configured());
    }

    #[test]
    fn env_overrides_ignore_empty_values() {
        let mut config = Config::default();
        config.portal.username = "from-file".into();
        config.apply_env_overrides_from(|k| (k == "PORTAL_WATCH_USERNAME").then(|| "  ".into()));
        assert_eq!(config.portal.username, "from-file");
    }

    // ── Validation ───────────────────────────────────────────

    #[test]
    fn validate_accepts_complete_config() {
        let tmp = TempDir::new().unwrap();
        valid_config(tmp.path()).validate().unwrap();
    }

    #[test]
    fn validate_reports_every_problem() {
        let err = Config::default().validate().unwrap_err().to_string();
        assert!(err.contains("portal.username"));
        assert!(err.contains("portal.password"));
        assert!(err.contains("email.smtp_host"));
        assert!(err.contains("email.address"));
    }

    #[test]
    fn validate_rejects_half_configured_push() {
        let tmp = TempDir::new().unwrap();
        let mut config = valid_config(tmp.path());
        config.push.user = Some("u".into());
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("push.user and push.token"));
    }

    // ── Paths ────────────────────────────────────────────────

    #[test]
    fn validate_rejects_artifacts_dir_holding_state_files() {
        let tmp = TempDir::new().unwrap();
        let mut config = valid_config(tmp.path());
        config.artifacts.dir = PathBuf::from(".");

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("config file"));
        assert!(err.contains("checkpoint"));
        assert!(err.contains("log file"));
        assert!(config.check_purge_target().is_err());

        config.artifacts.purge = false;
        config.validate().unwrap();
    }

    #[test]
    fn purge_target_only_checks_files_inside_it() {
        let tmp = TempDir::new().unwrap();
        let mut config = valid_config(tmp.path());
        config.check_purge_target().unwrap();

        config.monitor.checkpoint_path = PathBuf::from("screenshots/last_updated.txt");
        let err = config.check_purge_target().unwrap_err().to_string();
        assert!(err.contains("checkpoint"));
        assert!(!err.contains("config file"));
    }

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let tmp = TempDir::new().unwrap();
        let config = valid_config(tmp.path());
        assert_eq!(config.checkpoint_path(), tmp.path().join("last_updated.txt"));
        assert_eq!(config.artifacts_dir(), tmp.path().join("screenshots"));
    }

    #[test]
    fn absolute_paths_are_kept() {
        let tmp = TempDir::new().unwrap();
        let mut config = valid_config(tmp.path());
        let abs = tmp.path().join("elsewhere").join("state.txt");
        config.monitor.checkpoint_path = abs.clone();
        config.logging.file = None;
        assert_eq!(config.checkpoint_path(), abs);
        assert!(config.log_file().is_none());
    }

    // ── Persistence ──────────────────────────────────────────

    #[test]
    fn load_or_init_writes_default_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("config.toml");

        let config = Config::load_or_init(Some(&path)).unwrap();
        assert!(path.exists());
        assert_eq!(config.config_path, path);
        assert_eq!(config.monitor.check_interval_secs, 3600);
    }

    #[test]
    fn config_save_and_load_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let mut config = valid_config(tmp.path());
        config.monitor.check_interval_secs = 600;
        config.push.user = Some("user-key".into());
        config.push.token = Some("app-token".into());
        config.save().unwrap();

        let loaded = Config::load_or_init(Some(&config.config_path)).unwrap();
        assert_eq!(loaded.monitor.check_interval_secs, 600);
        assert_eq!(loaded.portal.username, "12345678");
        assert!(loaded.push.is_configured());

        let names: Vec<String> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert!(!names.iter().any(|name| name.contains(".tmp-")));
    }
}
