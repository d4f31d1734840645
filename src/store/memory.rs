//! Deterministic in-memory mail store
//!
//! Backs the test suite and doubles as a reference implementation of the
//! store contract: window date bounds on search, unordered results, and the
//! two failure conditions (`MessageGone`, `FolderUnusable`) flipped on
//! demand from the outside while a sync is in flight.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{ArchiveError, Result};
use crate::models::{MessageCandidate, MessageRef};
use crate::store::{MailFolder, MailStore, StoreProvider};

/// One message held by the fake store
#[derive(Debug, Clone, Default)]
pub struct StoredMessage {
    pub uid: String,
    pub message_id: Option<String>,
    pub from: Vec<String>,
    pub subject: Option<String>,
    pub received_date: Option<DateTime<Utc>>,
    pub sent_date: Option<DateTime<Utc>>,
    pub raw: Vec<u8>,
    /// Simulates a message expunged on the server after search
    pub removed: bool,
}

impl StoredMessage {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            ..Default::default()
        }
    }
}

#[derive(Default)]
struct FolderState {
    messages: Vec<StoredMessage>,
    unusable: bool,
    /// When set, content fetches beyond this count fail with `FolderUnusable`
    content_fetch_budget: Option<usize>,
    content_fetches: usize,
}

#[derive(Default)]
struct Inner {
    folders: HashMap<String, FolderState>,
}

/// In-memory store; clones share state so tests can mutate it mid-run
#[derive(Default, Clone)]
pub struct InMemoryMailStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryMailStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_message(&self, folder: &str, message: StoredMessage) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .folders
            .entry(folder.to_string())
            .or_default()
            .messages
            .push(message);
    }

    /// Make subsequent content fetches for this uid fail with `MessageGone`
    pub fn mark_removed(&self, folder: &str, uid: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(state) = inner.folders.get_mut(folder) {
            for m in &mut state.messages {
                if m.uid == uid {
                    m.removed = true;
                }
            }
        }
    }

    /// Make every subsequent operation on this folder fail with `FolderUnusable`
    pub fn mark_unusable(&self, folder: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.folders.entry(folder.to_string()).or_default().unusable = true;
    }

    /// Drop the folder mid-iteration: after `fetches` successful content
    /// fetches, further ones fail with `FolderUnusable` while searches and
    /// envelope fetches keep working
    pub fn drop_connection_after(&self, folder: &str, fetches: usize) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .folders
            .entry(folder.to_string())
            .or_default()
            .content_fetch_budget = Some(fetches);
    }
}

#[async_trait]
impl MailStore for InMemoryMailStore {
    async fn open_folder(&self, name: &str, _read_only: bool) -> Result<Box<dyn MailFolder>> {
        // an unknown folder behaves as empty, which keeps drafts-less
        // fixtures small
        Ok(Box::new(InMemoryFolder {
            inner: Arc::clone(&self.inner),
            name: name.to_string(),
        }))
    }
}

struct InMemoryFolder {
    inner: Arc<Mutex<Inner>>,
    name: String,
}

impl InMemoryFolder {
    fn with_folder<T>(&self, f: impl FnOnce(&FolderState) -> T) -> Result<T> {
        let inner = self.inner.lock().unwrap();
        let state = inner.folders.get(&self.name);
        match state {
            Some(state) if state.unusable => {
                Err(ArchiveError::FolderUnusable(self.name.clone()))
            }
            Some(state) => Ok(f(state)),
            None => Ok(f(&FolderState::default())),
        }
    }

    fn find_message<T>(
        &self,
        message_ref: &MessageRef,
        f: impl FnOnce(&StoredMessage) -> T,
    ) -> Result<T> {
        self.with_folder(|state| {
            state
                .messages
                .iter()
                .find(|m| m.uid == message_ref.as_str())
                .cloned()
        })?
        .ok_or_else(|| ArchiveError::MessageGone(message_ref.to_string()))
        .map(|m| f(&m))
    }
}

fn to_candidate(m: &StoredMessage) -> MessageCandidate {
    MessageCandidate {
        message_ref: MessageRef::new(m.uid.clone()),
        message_ids: m.message_id.iter().cloned().collect(),
        from: m.from.clone(),
        subject: m.subject.clone(),
        received_date: m.received_date,
        sent_date: m.sent_date,
    }
}

#[async_trait]
impl MailFolder for InMemoryFolder {
    async fn search(
        &self,
        received_after: DateTime<Utc>,
        received_before: Option<DateTime<Utc>>,
    ) -> Result<Vec<MessageRef>> {
        self.with_folder(|state| {
            state
                .messages
                .iter()
                .filter(|m| match m.received_date {
                    // a message the server cannot date still shows up; the
                    // filter pipeline deals with it
                    None => true,
                    // inclusive lower, exclusive upper: a message sitting
                    // exactly on a window edge belongs to the later window,
                    // so the planner's forward retries never lose it
                    Some(received) => {
                        received >= received_after
                            && received_before.map_or(true, |before| received < before)
                    }
                })
                .map(|m| MessageRef::new(m.uid.clone()))
                .collect()
        })
    }

    async fn fetch_envelopes(&self, refs: &[MessageRef]) -> Result<Vec<MessageCandidate>> {
        self.with_folder(|state| {
            refs.iter()
                .filter_map(|r| {
                    state
                        .messages
                        .iter()
                        .find(|m| m.uid == r.as_str())
                        .map(to_candidate)
                })
                .collect()
        })
    }

    async fn list_all(&self) -> Result<Vec<MessageRef>> {
        self.with_folder(|state| {
            state
                .messages
                .iter()
                .map(|m| MessageRef::new(m.uid.clone()))
                .collect()
        })
    }

    async fn header_values(&self, message_ref: &MessageRef, name: &str) -> Result<Vec<String>> {
        self.find_message(message_ref, |m| {
            if name.eq_ignore_ascii_case("Message-ID") {
                m.message_id.iter().cloned().collect()
            } else {
                Vec::new()
            }
        })
    }

    async fn raw_content(&self, message_ref: &MessageRef) -> Result<Vec<u8>> {
        let mut inner = self.inner.lock().unwrap();
        let state = inner
            .folders
            .get_mut(&self.name)
            .ok_or_else(|| ArchiveError::MessageGone(message_ref.to_string()))?;
        if state.unusable {
            return Err(ArchiveError::FolderUnusable(self.name.clone()));
        }
        if state
            .content_fetch_budget
            .map_or(false, |budget| state.content_fetches >= budget)
        {
            return Err(ArchiveError::FolderUnusable(self.name.clone()));
        }

        let message = state
            .messages
            .iter()
            .find(|m| m.uid == message_ref.as_str())
            .ok_or_else(|| ArchiveError::MessageGone(message_ref.to_string()))?;
        if message.removed {
            return Err(ArchiveError::MessageGone(message_ref.to_string()));
        }
        let raw = message.raw.clone();
        state.content_fetches += 1;
        Ok(raw)
    }
}

enum ProviderEntry {
    Store(InMemoryMailStore),
    Unavailable,
    Failing,
}

/// Provider over a fixed set of in-memory mailboxes
#[derive(Default, Clone)]
pub struct InMemoryStoreProvider {
    inner: Arc<Mutex<HashMap<String, ProviderEntry>>>,
}

impl InMemoryStoreProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_store(&self, mailbox: &str, store: InMemoryMailStore) {
        self.inner
            .lock()
            .unwrap()
            .insert(mailbox.to_string(), ProviderEntry::Store(store));
    }

    /// Connecting to this mailbox yields `Ok(None)` (store unavailable, skip)
    pub fn add_unavailable(&self, mailbox: &str) {
        self.inner
            .lock()
            .unwrap()
            .insert(mailbox.to_string(), ProviderEntry::Unavailable);
    }

    /// Connecting to this mailbox fails outright
    pub fn add_failing(&self, mailbox: &str) {
        self.inner
            .lock()
            .unwrap()
            .insert(mailbox.to_string(), ProviderEntry::Failing);
    }
}

#[async_trait]
impl StoreProvider for InMemoryStoreProvider {
    async fn connect(&self, mailbox: &str) -> Result<Option<Box<dyn MailStore>>> {
        let inner = self.inner.lock().unwrap();
        match inner.get(mailbox) {
            Some(ProviderEntry::Store(store)) => Ok(Some(Box::new(store.clone()))),
            Some(ProviderEntry::Unavailable) | None => Ok(None),
            Some(ProviderEntry::Failing) => Err(ArchiveError::ConnectionFailed(format!(
                "no route to store for {}",
                mailbox
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn dated(uid: &str, y: i32, m: u32, d: u32) -> StoredMessage {
        StoredMessage {
            received_date: Some(Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()),
            ..StoredMessage::new(uid)
        }
    }

    #[tokio::test]
    async fn test_search_bounds_inclusive_lower_exclusive_upper() {
        let store = InMemoryMailStore::new();
        store.add_message("All", dated("1", 2012, 1, 1));
        store.add_message("All", dated("2", 2012, 2, 1));
        store.add_message("All", dated("3", 2012, 3, 1));

        let folder = store.open_folder("All", true).await.unwrap();
        let lb = Utc.with_ymd_and_hms(2012, 1, 1, 0, 0, 0).unwrap();
        let ub = Utc.with_ymd_and_hms(2012, 3, 1, 0, 0, 0).unwrap();

        let refs = folder.search(lb, Some(ub)).await.unwrap();
        assert_eq!(refs, vec![MessageRef::new("1"), MessageRef::new("2")]);

        let refs = folder.search(lb, None).await.unwrap();
        assert_eq!(refs.len(), 3);
    }

    #[tokio::test]
    async fn test_unusable_folder_errors() {
        let store = InMemoryMailStore::new();
        store.add_message("All", dated("1", 2012, 1, 2));
        let folder = store.open_folder("All", true).await.unwrap();

        store.mark_unusable("All");
        let err = folder
            .search(Utc.with_ymd_and_hms(2012, 1, 1, 0, 0, 0).unwrap(), None)
            .await
            .unwrap_err();
        assert!(err.is_user_fatal());
    }

    #[tokio::test]
    async fn test_removed_message_content_is_gone() {
        let store = InMemoryMailStore::new();
        let mut msg = dated("1", 2012, 1, 2);
        msg.raw = b"hello".to_vec();
        store.add_message("All", msg);

        let folder = store.open_folder("All", true).await.unwrap();
        let r = MessageRef::new("1");
        assert_eq!(folder.raw_content(&r).await.unwrap(), b"hello");

        store.mark_removed("All", "1");
        let err = folder.raw_content(&r).await.unwrap_err();
        assert!(err.is_item_transient());
    }

    #[tokio::test]
    async fn test_content_fetch_budget_drops_connection() {
        let store = InMemoryMailStore::new();
        let mut first = dated("1", 2012, 1, 2);
        first.raw = b"one".to_vec();
        let mut second = dated("2", 2012, 1, 3);
        second.raw = b"two".to_vec();
        store.add_message("All", first);
        store.add_message("All", second);
        store.drop_connection_after("All", 1);

        let folder = store.open_folder("All", true).await.unwrap();
        assert_eq!(
            folder.raw_content(&MessageRef::new("1")).await.unwrap(),
            b"one"
        );

        let err = folder.raw_content(&MessageRef::new("2")).await.unwrap_err();
        assert!(matches!(err, ArchiveError::FolderUnusable(_)));

        // metadata operations survive the dropped content channel
        let lb = Utc.with_ymd_and_hms(2012, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(folder.search(lb, None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_message_is_gone() {
        let store = InMemoryMailStore::new();
        let folder = store.open_folder("All", true).await.unwrap();
        let err = folder
            .raw_content(&MessageRef::new("nope"))
            .await
            .unwrap_err();
        assert!(err.is_item_transient());
    }

    #[tokio::test]
    async fn test_header_values() {
        let store = InMemoryMailStore::new();
        let mut msg = StoredMessage::new("1");
        msg.message_id = Some("<id1@example.com>".to_string());
        store.add_message("Drafts", msg);

        let folder = store.open_folder("Drafts", true).await.unwrap();
        let values = folder
            .header_values(&MessageRef::new("1"), "Message-ID")
            .await
            .unwrap();
        assert_eq!(values, vec!["<id1@example.com>".to_string()]);

        let other = folder
            .header_values(&MessageRef::new("1"), "Subject")
            .await
            .unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn test_provider_modes() {
        let provider = InMemoryStoreProvider::new();
        provider.add_store("alice@example.com", InMemoryMailStore::new());
        provider.add_unavailable("bob@example.com");
        provider.add_failing("carol@example.com");

        assert!(provider
            .connect("alice@example.com")
            .await
            .unwrap()
            .is_some());
        assert!(provider.connect("bob@example.com").await.unwrap().is_none());
        assert!(provider
            .connect("dave@example.com")
            .await
            .unwrap()
            .is_none());
        assert!(provider.connect("carol@example.com").await.is_err());
    }
}
