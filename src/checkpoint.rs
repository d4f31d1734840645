//! Per-user checkpoint store
//!
//! Flat `user=timestamp` text file marking the latest received date known to
//! be archived for each user. The file is fully rewritten on every save;
//! concurrent runs against the same file are not supported.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::Result;

/// Fixed offset-aware timestamp format, e.g. `2012-03-05T00:00:00+0000`
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

/// Render a checkpoint timestamp in the file format
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a checkpoint timestamp from the file format
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Load per-user checkpoints
///
/// Every failure mode here is data-integrity-non-fatal: an absent or
/// unreadable file, a malformed line or an unparsable timestamp is logged
/// and skipped. Entries for users no longer configured are dropped. Users
/// without an entry get `default_date`.
pub async fn load(
    path: &Path,
    known_users: &[String],
    default_date: DateTime<Utc>,
) -> HashMap<String, DateTime<Utc>> {
    let mut result = HashMap::new();

    match tokio::fs::read_to_string(path).await {
        Ok(content) => {
            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let fields: Vec<&str> = line.split('=').collect();
                if fields.len() != 2 {
                    warn!("don't understand checkpoint line [{}]", line);
                    continue;
                }
                let user = fields[0];
                if !known_users.iter().any(|u| u == user) {
                    info!("ignoring checkpoint for unconfigured user {}", user);
                    continue;
                }
                match parse_timestamp(fields[1]) {
                    Some(ts) => {
                        result.insert(user.to_string(), ts);
                    }
                    None => warn!("unable to parse checkpoint timestamp [{}]", fields[1]),
                }
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("no checkpoint file at {:?}, starting from defaults", path);
        }
        Err(e) => {
            warn!("error loading checkpoints from {:?}: {}", path, e);
        }
    }

    for user in known_users {
        result
            .entry(user.clone())
            .or_insert(default_date);
    }

    for (user, ts) in &result {
        debug!("checkpoint {}={}", user, format_timestamp(*ts));
    }

    result
}

/// Persist checkpoints, one `user=timestamp` line, sorted ascending by
/// timestamp (then user, for a deterministic file)
///
/// The file is rewritten whole. Callers treat failures as non-fatal and log
/// them; a failed save costs at most re-archiving already-present files.
pub async fn save(data: &HashMap<String, DateTime<Utc>>, path: &Path) -> Result<()> {
    let mut entries: Vec<(&DateTime<Utc>, &String)> =
        data.iter().map(|(user, ts)| (ts, user)).collect();
    entries.sort();

    let mut content = String::new();
    for (ts, user) in entries {
        content.push_str(user);
        content.push('=');
        content.push_str(&format_timestamp(*ts));
        content.push('\n');
    }

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await?;
    debug!("saved {} checkpoints to {:?}", data.len(), path);
    Ok(())
}
