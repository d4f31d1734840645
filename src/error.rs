use thiserror::Error;

/// Type alias for Result with ArchiveError
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Error types for the mailbox archiver
///
/// The driver's continue/abort decision is a pure function of the variant:
/// `MessageGone` skips one candidate, `FolderUnusable`/`ConnectionFailed`/
/// `StoreError` abort the current user, `ConfigError` aborts the whole run
/// before any user is processed.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Message disappeared from the remote store mid-iteration
    #[error("message no longer present: {0}")]
    MessageGone(String),

    /// Folder or connection became unusable for the current user
    #[error("folder unusable: {0}")]
    FolderUnusable(String),

    /// Store connection could not be established
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Any other error raised by the mail store
    #[error("store error: {0}")]
    StoreError(String),

    /// Invalid or conflicting configuration
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// IO error (directory creation, archive writes, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ArchiveError {
    /// True for errors that only affect a single candidate: log, skip, continue
    pub fn is_item_transient(&self) -> bool {
        matches!(self, ArchiveError::MessageGone(_))
    }

    /// True for errors that end processing for the current user while the
    /// run proceeds to the next one
    pub fn is_user_fatal(&self) -> bool {
        matches!(
            self,
            ArchiveError::FolderUnusable(_)
                | ArchiveError::ConnectionFailed(_)
                | ArchiveError::StoreError(_)
        )
    }

    /// Short classification tag used when logging a user's failure
    pub fn classification(&self) -> &'static str {
        match self {
            ArchiveError::MessageGone(_) => "message-gone",
            ArchiveError::FolderUnusable(_) => "folder-unusable",
            ArchiveError::ConnectionFailed(_) => "connection-failed",
            ArchiveError::StoreError(_) => "store-error",
            ArchiveError::ConfigError(_) => "config-error",
            ArchiveError::IoError(_) => "io-error",
        }
    }
}
