use chrono::{DateTime, Utc};

/// Opaque reference to a message inside an open folder
///
/// The store hands these out from `search`/`list_all`; they are only
/// meaningful against the folder that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageRef(pub String);

impl MessageRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Envelope metadata for one fetched message
///
/// Populated in one batched `fetch_envelopes` call. The raw content is not
/// materialized here; the driver pulls it through the folder only when the
/// message actually needs to be written.
#[derive(Debug, Clone)]
pub struct MessageCandidate {
    pub message_ref: MessageRef,
    /// Message-ID header values, used for the drafts check
    pub message_ids: Vec<String>,
    /// Sender addresses; the first one is the primary sender
    pub from: Vec<String>,
    pub subject: Option<String>,
    pub received_date: Option<DateTime<Utc>>,
    pub sent_date: Option<DateTime<Utc>>,
}

impl MessageCandidate {
    /// Primary sender address, empty string when the list is empty
    pub fn primary_from(&self) -> &str {
        self.from.first().map(String::as_str).unwrap_or("")
    }
}

/// Output encoding for archived files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Raw message bytes
    Identity,
    /// Single-entry zip archive named after the file itself
    Zip,
    /// Gzip stream
    Gzip,
}

impl Encoding {
    /// Filename extension including the base `.mail` part
    pub fn extension(&self) -> &'static str {
        match self {
            Encoding::Identity => ".mail",
            Encoding::Zip => ".mail.zip",
            Encoding::Gzip => ".mail.gz",
        }
    }
}
