use crate::library::LibraryPaths;
use chrono::{DateTime, Utc};
use eyre::{Context, Result, eyre};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Configuration required to run a backup.
/// This decouples the logic from how the arguments were parsed (CLI/Config file).
#[derive(Debug, Clone)]
pub struct BackupConfig {
    pub target_dir: PathBuf,
    pub paths: LibraryPaths,
    pub force: bool,
    pub verbose: bool,
    pub dry_run: bool,
    pub remove: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessResult {
    Written,
    Skipped,
    Failed,
}

/// Modification time of `path`, or `None` if it does not exist or is unreadable.
pub fn file_modified(path: &Path) -> Option<DateTime<Utc>> {
    let mtime = fs::metadata(path).ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(mtime))
}

/// Expands a leading `~` to the home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

/// Shows a macOS notification centre banner. Elsewhere this only logs.
pub fn send_notification(title: &str, text: &str) -> Result<()> {
    if !cfg!(target_os = "macos") {
        log::warn!("Notifications are only supported on macOS; skipping");
        return Ok(());
    }

    let script = format!(
        "display notification {} with title {}",
        applescript_string(text),
        applescript_string(title)
    );
    let status = Command::new("osascript")
        .arg("-e")
        .arg(&script)
        .status()
        .wrap_err("Failed to run osascript")?;
    if !status.success() {
        return Err(eyre!("osascript exited with {}", status));
    }
    Ok(())
}

fn applescript_string(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}
