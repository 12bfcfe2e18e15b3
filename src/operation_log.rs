//! Append-only text record of every distribution sent from this machine.

use crate::user_settings::settings_dir;
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const LOG_FILE: &str = "operation_log.txt";

fn log_path() -> PathBuf {
    settings_dir().unwrap_or_else(|| PathBuf::from(".")).join(LOG_FILE)
}

pub fn log_file_path() -> String {
    log_path().display().to_string()
}

fn render(at: DateTime<Utc>, operation: &str, chain_id: u64, details: &str) -> String {
    let mut out = format!(
        "[{}] chain_id={} operation={}\n",
        at.to_rfc3339_opts(SecondsFormat::Secs, true),
        chain_id,
        operation
    );
    let body: Vec<&str> = details.lines().filter(|l| !l.trim().is_empty()).collect();
    if body.is_empty() {
        out.push_str("  (no additional details)\n");
    }
    for line in body {
        out.push_str("  ");
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');
    out
}

fn append_to(path: &Path, entry: &str) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    file.write_all(entry.as_bytes())?;
    Ok(())
}

/// One entry: a timestamped header and the details indented beneath it
pub fn append_log(operation: &str, chain_id: u64, details: impl AsRef<str>) -> Result<()> {
    append_to(&log_path(), &render(Utc::now(), operation, chain_id, details.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_entry_indents_details_and_drops_blank_lines() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let entry = render(at, "Multisend", 1, "mode=Native\n\nresult=confirmed");
        assert_eq!(
            entry,
            "[2024-01-01T00:00:00Z] chain_id=1 operation=Multisend\n  mode=Native\n  result=confirmed\n\n"
        );
    }

    #[test]
    fn test_entry_without_details() {
        let entry = render(Utc::now(), "Multisend", 5, "  ");
        assert!(entry.contains("(no additional details)"));
    }

    #[test]
    fn test_entries_accumulate() {
        let path = std::env::temp_dir().join(format!("multisend-log-{}.txt", std::process::id()));
        let _ = fs::remove_file(&path);
        append_to(&path, "first\n").unwrap();
        append_to(&path, "second\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");
        let _ = fs::remove_file(&path);
    }
}
