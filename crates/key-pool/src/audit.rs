//! Append-only audit log for pool resets
//!
//! One line per event: `<RFC 3339 timestamp> - <message>`. The log is
//! advisory: nothing reads it back, and a failed append never fails the pool
//! operation that triggered it.

use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use tokio::io::AsyncWriteExt;
use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    path: Option<PathBuf>,
}

impl AuditLog {
    /// Log appending to `path`, created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Log that drops every event.
    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append one event line.
    pub async fn record(&self, message: &str) {
        let Some(path) = &self.path else {
            return;
        };
        let line = format!(
            "{} - {message}\n",
            Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
        );
        if let Err(e) = append_line(path, &line).await {
            warn!(path = %path.display(), error = %e, "failed to append audit log");
        }
    }
}

async fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await
}
