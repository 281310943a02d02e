//! Screenshot artifacts written next to each notification.

use crate::session::PortalSession;
use chrono::{DateTime, Local};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// Same-second captures get `-1`, `-2`, ... appended; give up after this many.
const MAX_NAME_ATTEMPTS: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactTag {
    Update,
    /// Also used for captures taken on the error path.
    NoUpdate,
}

impl ArtifactTag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::NoUpdate => "no_update",
        }
    }
}

impl fmt::Display for ArtifactTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{YYYYmmddHHMMSS}-{tag}.png`
pub fn artifact_file_name(at: DateTime<Local>, tag: ArtifactTag) -> String {
    format!("{}-{}.png", at.format("%Y%m%d%H%M%S"), tag)
}

/// Write `png` under a name no other capture holds. Existing files are never
/// overwritten.
async fn write_unique(
    dir: &Path,
    at: DateTime<Local>,
    tag: ArtifactTag,
    png: &[u8],
) -> io::Result<PathBuf> {
    let base = artifact_file_name(at, tag);
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let name = if attempt == 0 {
            base.clone()
        } else {
            format!("{}-{attempt}.png", base.trim_end_matches(".png"))
        };
        let path = dir.join(name);
        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        };
        file.write_all(png).await?;
        file.flush().await?;
        return Ok(path);
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free file name for {base}"),
    ))
}

/// Screenshot the session into `dir`. Best-effort: any failure is logged and
/// yields `None`.
pub async fn capture(
    session: &mut dyn PortalSession,
    dir: &Path,
    tag: ArtifactTag,
) -> Option<PathBuf> {
    if let Err(e) = tokio::fs::create_dir_all(dir).await {
        warn!(dir = %dir.display(), "Cannot create screenshot directory: {e}");
        return None;
    }

    let png = match session.screenshot().await {
        Ok(png) => png,
        Err(e) => {
            warn!(tag = %tag, "Screenshot failed: {e}");
            return None;
        }
    };

    match write_unique(dir, Local::now(), tag, &png).await {
        Ok(path) => {
            info!(file = %path.display(), "Screenshot saved");
            Some(path)
        }
        Err(e) => {
            warn!(dir = %dir.display(), "Screenshot not written: {e}");
            None
        }
    }
}
