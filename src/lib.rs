//! Incremental Mailbox Archiver
//!
//! Archives each configured user's mailbox to a local directory tree,
//! resuming from a per-user checkpoint so repeated runs only pull new mail.
//!
//! # Overview
//!
//! A run walks the configured users in order. For each user it:
//! - connects to the user's mail store (an unavailable store skips the user)
//! - searches a bounded date window forward from the user's checkpoint,
//!   widening past empty stretches until it finds mail or reaches the present
//! - filters out drafts, undated mail, already-archived mail and ignored
//!   senders
//! - writes each surviving message to a content-addressed path, skipping
//!   files that already exist, and advances the checkpoint as it goes
//!
//! One user's failure never aborts the run, and checkpoints are persisted
//! periodically so an interrupted run loses little progress.
//!
//! # Example Usage
//!
//! ```no_run
//! use mail_archiver::checkpoint;
//! use mail_archiver::config::Config;
//! use mail_archiver::store::memory::InMemoryStoreProvider;
//! use mail_archiver::sync::SyncEngine;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!     let provider = InMemoryStoreProvider::new();
//!
//!     let mut checkpoints = checkpoint::load(
//!         &config.timestamp_file,
//!         &config.users,
//!         config.oldest_date_utc(),
//!     )
//!     .await;
//!
//!     let report = SyncEngine::new(&config, &provider)
//!         .run(&mut checkpoints)
//!         .await;
//!     println!("wrote {} files", report.files_written);
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`archive`] - archive path derivation and idempotent file writes
//! - [`checkpoint`] - per-user checkpoint persistence
//! - [`cli`] - command-line interface and run orchestration
//! - [`config`] - configuration management
//! - [`cursor`] - forward-only iteration over a user's candidates
//! - [`error`] - error types and result alias
//! - [`filter`] - candidate filter pipeline
//! - [`models`] - core data structures
//! - [`planner`] - windowed fetch planning
//! - [`store`] - mail store traits and backends
//! - [`sync`] - per-user sync driver

pub mod archive;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod cursor;
pub mod error;
pub mod filter;
pub mod models;
pub mod planner;
pub mod store;
pub mod sync;

// Re-export commonly used types for convenience
pub use error::{ArchiveError, Result};

pub use models::{Encoding, MessageCandidate, MessageRef};

pub use config::{Config, StoreConfig};

pub use archive::ArchiveWriter;
pub use cursor::MessageCursor;
pub use filter::filter_candidates;
pub use planner::fetch_candidates;

pub use store::{MailFolder, MailStore, StoreProvider};
pub use sync::{ProgressCallback, SyncEngine, SyncReport};

pub use cli::{Cli, Commands, ProgressReporter};
