//! Mail store capability interface
//!
//! The archiver core only ever talks to these traits. The production
//! network store lives behind the `imap` feature; [`memory`] holds a
//! deterministic in-memory implementation used by the tests.
//!
//! Any operation may fail with `MessageGone` (the caller skips that one
//! candidate) or `FolderUnusable` (the caller aborts the current user).
//! Folder handles release their server-side state on drop.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{MessageCandidate, MessageRef};

pub mod memory;

#[cfg(feature = "imap")]
pub mod imap;

/// Resolves a mailbox address to a connected store
///
/// `Ok(None)` means the store is unavailable for this mailbox in a way that
/// is expected and quiet (e.g. no credentials issued yet); the driver logs
/// and moves on to the next user.
#[async_trait]
pub trait StoreProvider: Send + Sync {
    async fn connect(&self, mailbox: &str) -> Result<Option<Box<dyn MailStore>>>;
}

/// A connected mail store for a single mailbox
#[async_trait]
pub trait MailStore: Send + Sync {
    async fn open_folder(&self, name: &str, read_only: bool) -> Result<Box<dyn MailFolder>>;
}

/// An open folder handle
#[async_trait]
pub trait MailFolder: Send + Sync {
    /// Messages with received date at or after `received_after` and, when
    /// given, before `received_before`. Bounds may be coarse (day-granular
    /// on IMAP); the filter pipeline enforces the exact checkpoint cut.
    /// Result order is unspecified.
    async fn search(
        &self,
        received_after: DateTime<Utc>,
        received_before: Option<DateTime<Utc>>,
    ) -> Result<Vec<MessageRef>>;

    /// Populate envelope metadata for a batch of references in one round trip
    async fn fetch_envelopes(&self, refs: &[MessageRef]) -> Result<Vec<MessageCandidate>>;

    /// Every message reference in the folder; used only for the drafts folder
    async fn list_all(&self) -> Result<Vec<MessageRef>>;

    /// All values of a header on one message
    async fn header_values(&self, message_ref: &MessageRef, name: &str) -> Result<Vec<String>>;

    /// Full raw message content; the expensive call, made only at write time
    async fn raw_content(&self, message_ref: &MessageRef) -> Result<Vec<u8>>;
}
