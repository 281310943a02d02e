pub mod schema;

pub use schema::{
    ArtifactsConfig, BrowserConfig, Config, EmailConfig, LoggingConfig, MonitorConfig,
    PortalConfig, PushConfig, SmtpSecurity,
};
