//! Common test utilities and fixtures

use chrono::{DateTime, TimeZone, Utc};
use mail_archiver::config::Config;
use mail_archiver::store::memory::{InMemoryMailStore, StoredMessage};
use tempfile::TempDir;

pub const FOLDER: &str = "All Mail";
pub const DRAFTS: &str = "Drafts";

pub fn ts(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

/// Configuration rooted in a temp dir, with defaults suited to small fixtures
pub fn test_config(dir: &TempDir, users: &[&str]) -> Config {
    let mut config = Config::example();
    config.users = users.iter().map(|s| s.to_string()).collect();
    config.domain = "example.com".to_string();
    config.ignore_from.clear();
    config.data_dir = dir.path().join("archive");
    config.timestamp_file = dir.path().join("timestamps.txt");
    config.store.folder = FOLDER.to_string();
    config.store.drafts_folder = DRAFTS.to_string();
    config
}

/// A dated message whose sent and received dates coincide at midnight UTC
pub fn message(uid: &str, from: &str, subject: &str, y: i32, m: u32, d: u32) -> StoredMessage {
    StoredMessage {
        message_id: Some(format!("<{}@example.com>", uid)),
        from: vec![from.to_string()],
        subject: Some(subject.to_string()),
        received_date: Some(ts(y, m, d)),
        sent_date: Some(ts(y, m, d)),
        raw: format!("From: {}\r\nSubject: {}\r\n\r\nbody of {}\r\n", from, subject, uid)
            .into_bytes(),
        ..StoredMessage::new(uid)
    }
}

/// Store holding `count` archivable messages received on consecutive days
pub fn populated_store(count: usize, from: &str) -> InMemoryMailStore {
    let store = InMemoryMailStore::new();
    for i in 0..count {
        let uid = format!("m{}", i + 1);
        store.add_message(
            FOLDER,
            message(&uid, from, &format!("subject {}", i + 1), 2012, 3, (i + 1) as u32),
        );
    }
    store
}

/// Hash suffix the archive writer derives for a sender/subject pair
pub fn hash5(from: &str, subject: &str) -> String {
    format!("{:x}", md5::compute(format!("{}{}", from, subject)))[..5].to_string()
}
