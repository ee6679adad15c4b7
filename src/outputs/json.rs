//! JSON report output.
//!
//! A run ends with exactly one JSON document: a [`crate::models::BatchReport`]
//! of openers, or a [`crate::models::ProfileReport`] when acquisition is all
//! that was asked for. With no output path the document goes to stdout so the
//! tool composes with `jq` and friends; logs go to stderr.

use serde::Serialize;
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, instrument};

/// Write `report` as pretty JSON to `path`, creating parent directories, or
/// to stdout when `path` is `None`.
#[instrument(level = "info", skip_all, fields(path = ?path))]
pub async fn write_report<T: Serialize>(report: &T, path: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let mut json = serde_json::to_string_pretty(report)?;
    json.push('\n');

    let Some(path) = path else {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(json.as_bytes()).await?;
        stdout.flush().await?;
        return Ok(());
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = fs::create_dir_all(parent).await {
            error!(dir = %parent.display(), error = %e, "Failed to create output dir");
            return Err(e.into());
        }
    }

    fs::write(path, json).await?;
    info!(path = %path.display(), "Wrote JSON report");
    Ok(())
}
