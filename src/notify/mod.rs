pub mod email;
pub mod multi;
pub mod pushover;
pub mod traits;

pub use email::EmailNotifier;
pub use multi::NotifierSet;
pub use pushover::PushoverNotifier;
pub use traits::{Notification, NotificationKind, Notifier};

use crate::config::Config;
use anyhow::Result;
use tracing::info;

/// Build the notifier set described by `config`: email always, Pushover
/// only when both its credentials are present.
pub fn create_notifiers(config: &Config) -> Result<NotifierSet> {
    let mut notifiers: Vec<Box<dyn Notifier>> = vec![Box::new(EmailNotifier::new(&config.email)?)];
    if let Some(push) = PushoverNotifier::from_config(&config.push) {
        notifiers.push(Box::new(push));
    }

    let set = NotifierSet::new(notifiers);
    info!(notifiers = ?set.names(), "Notifiers configured");
    Ok(set)
}
