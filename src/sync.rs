//! Per-user sync orchestration
//!
//! Users are processed strictly sequentially; nothing is shared between
//! them except the checkpoint map, which belongs to the driver. One user's
//! failure is logged with its classification and never aborts the run.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::archive::ArchiveWriter;
use crate::checkpoint;
use crate::config::Config;
use crate::cursor::MessageCursor;
use crate::error::{ArchiveError, Result};
use crate::filter::filter_candidates;
use crate::models::MessageCandidate;
use crate::planner;
use crate::store::{MailFolder, MailStore, StoreProvider};

/// Checkpoints are flushed to disk every this many processed messages, so a
/// crash mid-user costs at most this much re-scanning
const CHECKPOINT_INTERVAL: usize = 100;

/// Progress callback invoked after each processed message with (index, total)
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Outcome of a whole run
#[derive(Debug, Default, Clone)]
pub struct SyncReport {
    pub users_synced: usize,
    pub users_failed: usize,
    pub messages_processed: usize,
    pub files_written: usize,
    pub duplicates_skipped: usize,
}

#[derive(Debug, Default)]
struct UserStats {
    processed: usize,
    written: usize,
    duplicates: usize,
}

enum WriteOutcome {
    Written,
    AlreadyExists,
}

pub struct SyncEngine<'a> {
    config: &'a Config,
    provider: &'a dyn StoreProvider,
    writer: ArchiveWriter,
    ignore_from: HashSet<String>,
    dry_run: bool,
    progress: Option<ProgressCallback>,
}

impl<'a> SyncEngine<'a> {
    pub fn new(config: &'a Config, provider: &'a dyn StoreProvider) -> Self {
        Self {
            config,
            provider,
            writer: ArchiveWriter::new(
                config.data_dir.clone(),
                config.domain.clone(),
                config.encoding(),
            ),
            ignore_from: config.ignore_from.iter().cloned().collect(),
            dry_run: false,
            progress: None,
        }
    }

    /// Plan, filter and report without writing files or persisting checkpoints
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Process every configured user in order
    ///
    /// `checkpoints` is advanced in memory per processed message and
    /// persisted on the checkpoint cadence; on return it reflects all
    /// progress made, including that of users that later failed.
    pub async fn run(&self, checkpoints: &mut HashMap<String, DateTime<Utc>>) -> SyncReport {
        let mut report = SyncReport::default();

        for user in &self.config.users {
            info!("### backing up [{}]", user);
            match self.sync_user(user, checkpoints).await {
                Ok(stats) => {
                    report.users_synced += 1;
                    report.messages_processed += stats.processed;
                    report.files_written += stats.written;
                    report.duplicates_skipped += stats.duplicates;
                }
                Err(e) => {
                    error!(
                        "error getting mail for user [{}] ({}): {}",
                        user,
                        e.classification(),
                        e
                    );
                    report.users_failed += 1;
                }
            }
        }

        info!("done");
        report
    }

    async fn sync_user(
        &self,
        user: &str,
        checkpoints: &mut HashMap<String, DateTime<Utc>>,
    ) -> Result<UserStats> {
        let mailbox = format!("{}@{}", user, self.config.domain);
        let store = match self.provider.connect(&mailbox).await? {
            Some(store) => store,
            None => {
                info!("store unavailable for {}, skipping", mailbox);
                return Ok(UserStats::default());
            }
        };

        let drafts = self.draft_message_ids(store.as_ref()).await?;

        let fetch_from = checkpoints
            .get(user)
            .copied()
            .unwrap_or_else(|| self.config.oldest_date_utc());
        debug!("fetching for {} from {}", user, fetch_from);

        let folder = store.open_folder(&self.config.store.folder, true).await?;
        let candidates =
            planner::fetch_candidates(folder.as_ref(), fetch_from, self.config.fetch_window_days)
                .await?;
        let admitted = filter_candidates(candidates, &drafts, fetch_from, &self.ignore_from);
        let mut cursor = MessageCursor::new(admitted);

        // index 0 tells the reporter a new user's sequence is starting
        if let Some(progress) = &self.progress {
            let (index, total) = cursor.progress();
            progress(index, total);
        }

        let mut stats = UserStats::default();
        while cursor.has_next() && stats.processed < self.config.max_per_run {
            let candidate = match cursor.next() {
                Some(candidate) => candidate,
                None => break,
            };
            // the filter admits only dated candidates
            let received = match candidate.received_date {
                Some(received) => received,
                None => continue,
            };

            let path = self.writer.derive_path(user, received, &candidate);
            let outcome = match self.archive_candidate(folder.as_ref(), &path, &candidate).await {
                Ok(outcome) => outcome,
                Err(e) if e.is_item_transient() => {
                    warn!("{}", e);
                    continue;
                }
                Err(ArchiveError::FolderUnusable(msg)) => {
                    // keep whatever checkpoint progress this user already made
                    warn!("folder unusable, aborting user [{}]: {}", user, msg);
                    break;
                }
                Err(e) => return Err(e),
            };

            // processing order is by sent date, so received dates may arrive
            // out of order; the checkpoint itself never moves backward
            checkpoints
                .entry(user.to_string())
                .and_modify(|ts| *ts = (*ts).max(received))
                .or_insert(received);
            let exists = matches!(outcome, WriteOutcome::AlreadyExists);
            if exists {
                stats.duplicates += 1;
            } else {
                stats.written += 1;
            }
            stats.processed += 1;

            let (index, total) = cursor.progress();
            info!(
                "{}/{} {}{}",
                index,
                total,
                path.display(),
                if exists { ": EXISTS" } else { "" }
            );
            if let Some(progress) = &self.progress {
                progress(index, total);
            }

            if stats.processed % CHECKPOINT_INTERVAL == 0 {
                self.persist_checkpoints(checkpoints).await;
            }
        }

        if stats.processed > 0 {
            self.persist_checkpoints(checkpoints).await;
        }
        Ok(stats)
    }

    async fn archive_candidate(
        &self,
        folder: &dyn MailFolder,
        path: &std::path::Path,
        candidate: &MessageCandidate,
    ) -> Result<WriteOutcome> {
        if tokio::fs::try_exists(path).await? {
            return Ok(WriteOutcome::AlreadyExists);
        }
        if self.dry_run {
            debug!("dry run, would write {}", path.display());
            return Ok(WriteOutcome::Written);
        }

        // content is only pulled over the wire when we actually need to write
        let raw = folder.raw_content(&candidate.message_ref).await?;
        self.writer.write(path, &raw).await?;
        Ok(WriteOutcome::Written)
    }

    /// Compute the draft-id set once per user, before filtering begins
    async fn draft_message_ids(&self, store: &dyn MailStore) -> Result<HashSet<String>> {
        let folder = store
            .open_folder(&self.config.store.drafts_folder, true)
            .await?;
        let refs = folder.list_all().await?;
        debug!("drafts folder holds {} messages", refs.len());

        let mut ids = HashSet::new();
        for message_ref in &refs {
            match folder.header_values(message_ref, "Message-ID").await {
                Ok(values) => ids.extend(values),
                Err(e) if e.is_item_transient() => {
                    warn!("draft {} vanished while listing: {}", message_ref, e);
                }
                Err(e) => return Err(e),
            }
        }
        info!("draft ids: {}", ids.len());
        Ok(ids)
    }

    async fn persist_checkpoints(&self, checkpoints: &HashMap<String, DateTime<Utc>>) {
        if self.dry_run {
            return;
        }
        if let Err(e) = checkpoint::save(checkpoints, &self.config.timestamp_file).await {
            warn!(
                "error saving checkpoints to {:?}: {}",
                self.config.timestamp_file, e
            );
        }
    }
}
