//! Window fetch planner
//!
//! Scopes each search to a bounded date window so a mailbox with years of
//! history is fetched in slices, walking the window forward over long gaps
//! until something is found or the window reaches the present.

use chrono::{DateTime, Duration, TimeZone, Utc};
use tracing::{debug, info};

use crate::error::Result;
use crate::models::{MessageCandidate, MessageRef};
use crate::store::MailFolder;

/// Sort key for candidates without a sent date
///
/// A fixed minimal sentinel keeps the order total and deterministic; undated
/// messages simply process first.
pub fn sent_date_sentinel() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap()
}

/// Sort candidates ascending by sent date, sentinel for missing ones
///
/// The store returns search results in no particular order; since a run may
/// not process all of them (max_per_run), processing must happen oldest
/// first or the checkpoint would skip over unprocessed mail.
pub fn sort_by_sent_date(candidates: &mut [MessageCandidate]) {
    candidates.sort_by_key(|c| c.sent_date.unwrap_or_else(sent_date_sentinel));
}

/// Fetch and order the candidates for one user
///
/// Search with a window, batch-fetch envelopes for whatever matched, then
/// sort. The returned list is unfiltered.
pub async fn fetch_candidates(
    folder: &dyn MailFolder,
    fetch_from: DateTime<Utc>,
    window_days: u32,
) -> Result<Vec<MessageCandidate>> {
    let refs = search_window(folder, fetch_from, window_days).await?;
    info!("search returned {} candidates", refs.len());

    let mut candidates = folder.fetch_envelopes(&refs).await?;
    sort_by_sent_date(&mut candidates);
    Ok(candidates)
}

/// Bounded window search with forward retry
///
/// While the window end is still in the past the search is bounded above;
/// an empty bounded window advances the start to its end and tries again.
/// Once the window end reaches the present the search runs unbounded and
/// its result is final whatever the count, which is the loop's termination
/// guarantee.
async fn search_window(
    folder: &dyn MailFolder,
    fetch_from: DateTime<Utc>,
    window_days: u32,
) -> Result<Vec<MessageRef>> {
    let mut fetch_from = fetch_from;
    loop {
        let window_end = fetch_from + Duration::days(window_days as i64);
        if window_end >= Utc::now() {
            debug!("searching unbounded from {}", fetch_from);
            return folder.search(fetch_from, None).await;
        }

        debug!("searching window {} .. {}", fetch_from, window_end);
        let refs = folder.search(fetch_from, Some(window_end)).await?;
        if !refs.is_empty() {
            return Ok(refs);
        }

        info!("empty search window, retrying from {}", window_end);
        fetch_from = window_end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MailFolder;
    use async_trait::async_trait;
    use mockall::mock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    mock! {
        Folder {}

        #[async_trait]
        impl MailFolder for Folder {
            async fn search(
                &self,
                received_after: DateTime<Utc>,
                received_before: Option<DateTime<Utc>>,
            ) -> Result<Vec<MessageRef>>;
            async fn fetch_envelopes(&self, refs: &[MessageRef]) -> Result<Vec<MessageCandidate>>;
            async fn list_all(&self) -> Result<Vec<MessageRef>>;
            async fn header_values(&self, message_ref: &MessageRef, name: &str) -> Result<Vec<String>>;
            async fn raw_content(&self, message_ref: &MessageRef) -> Result<Vec<u8>>;
        }
    }

    fn candidate(uid: &str, sent: Option<DateTime<Utc>>) -> MessageCandidate {
        MessageCandidate {
            message_ref: MessageRef::new(uid),
            message_ids: vec![],
            from: vec!["a@b.com".to_string()],
            subject: None,
            received_date: sent,
            sent_date: sent,
        }
    }

    fn ts(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_sort_by_sent_date() {
        let mut candidates = vec![
            candidate("c", Some(ts(2014, 1, 1))),
            candidate("a", Some(ts(2012, 1, 1))),
            candidate("b", Some(ts(2013, 1, 1))),
        ];
        sort_by_sent_date(&mut candidates);
        let uids: Vec<&str> = candidates.iter().map(|c| c.message_ref.as_str()).collect();
        assert_eq!(uids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_sort_missing_sent_date_first() {
        let mut candidates = vec![
            candidate("dated", Some(ts(2012, 1, 1))),
            candidate("undated", None),
        ];
        sort_by_sent_date(&mut candidates);
        assert_eq!(candidates[0].message_ref.as_str(), "undated");
    }

    #[tokio::test]
    async fn test_recent_fetch_from_searches_unbounded_once() {
        let mut folder = MockFolder::new();
        // fetch_from close to now: the window end is in the future, so one
        // unbounded search and no retry even though it comes back empty
        folder
            .expect_search()
            .withf(|_, before| before.is_none())
            .times(1)
            .returning(|_, _| Ok(vec![]));
        folder
            .expect_fetch_envelopes()
            .times(1)
            .returning(|_| Ok(vec![]));

        let fetch_from = Utc::now() - Duration::days(1);
        let candidates = fetch_candidates(&folder, fetch_from, 30).await.unwrap();
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn test_empty_bounded_window_retries_from_window_end() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        let mut folder = MockFolder::new();
        folder.expect_search().times(2).returning(move |after, before| {
            let n = calls_clone.fetch_add(1, Ordering::SeqCst);
            assert!(before.is_some());
            match n {
                0 => {
                    assert_eq!(after, ts(2012, 1, 1));
                    assert_eq!(before, Some(ts(2012, 1, 31)));
                    Ok(vec![])
                }
                _ => {
                    // second attempt starts where the empty window ended
                    assert_eq!(after, ts(2012, 1, 31));
                    Ok(vec![MessageRef::new("1")])
                }
            }
        });
        folder
            .expect_fetch_envelopes()
            .times(1)
            .returning(|refs| {
                assert_eq!(refs.len(), 1);
                Ok(vec![candidate("1", Some(ts(2012, 2, 5)))])
            });

        let candidates = fetch_candidates(&folder, ts(2012, 1, 1), 30).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_nonempty_bounded_window_stops_retrying() {
        let mut folder = MockFolder::new();
        folder
            .expect_search()
            .times(1)
            .returning(|_, _| Ok(vec![MessageRef::new("1"), MessageRef::new("2")]));
        folder.expect_fetch_envelopes().times(1).returning(|_| {
            Ok(vec![
                candidate("1", Some(ts(2012, 1, 10))),
                candidate("2", Some(ts(2012, 1, 5))),
            ])
        });

        let candidates = fetch_candidates(&folder, ts(2012, 1, 1), 30).await.unwrap();
        let uids: Vec<&str> = candidates.iter().map(|c| c.message_ref.as_str()).collect();
        assert_eq!(uids, vec!["2", "1"]);
    }

    #[tokio::test]
    async fn test_all_empty_windows_terminate_at_present() {
        let bounded_calls = Arc::new(AtomicUsize::new(0));
        let bounded_clone = Arc::clone(&bounded_calls);

        let mut folder = MockFolder::new();
        // every window up to now is empty; the planner must fall through to
        // a single unbounded search instead of looping forever
        folder.expect_search().returning(move |_, before| {
            if before.is_some() {
                bounded_clone.fetch_add(1, Ordering::SeqCst);
            }
            Ok(vec![])
        });
        folder
            .expect_fetch_envelopes()
            .times(1)
            .returning(|_| Ok(vec![]));

        let candidates = fetch_candidates(&folder, ts(2012, 1, 1), 30).await.unwrap();
        assert!(candidates.is_empty());
        assert!(bounded_calls.load(Ordering::SeqCst) > 0);
    }

    #[tokio::test]
    async fn test_search_error_propagates() {
        let mut folder = MockFolder::new();
        folder
            .expect_search()
            .returning(|_, _| Err(crate::error::ArchiveError::FolderUnusable("All".into())));

        let result = fetch_candidates(&folder, ts(2012, 1, 1), 30).await;
        assert!(result.unwrap_err().is_user_fatal());
    }
}
