//! IMAP-backed mail store
//!
//! One TLS connection and one session per user; a run only ever touches one
//! folder at a time, so every folder handle shares the session and
//! re-selects it before use. Search granularity on the wire is a calendar
//! day (`SINCE`/`BEFORE`); the filter pipeline enforces the exact bounds.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::error::{ArchiveError, Result};
use crate::models::{MessageCandidate, MessageRef};
use crate::store::{MailFolder, MailStore, StoreProvider};

type ImapSession = async_imap::Session<async_native_tls::TlsStream<TcpStream>>;

/// Messages per UID FETCH batch
const FETCH_CHUNK: usize = 500;

struct Xoauth2 {
    user: String,
    token: String,
}

impl async_imap::Authenticator for Xoauth2 {
    type Response = String;

    fn process(&mut self, _challenge: &[u8]) -> Self::Response {
        format!("user={}\x01auth=Bearer {}\x01\x01", self.user, self.token)
    }
}

pub struct ImapStoreProvider {
    config: StoreConfig,
}

impl ImapStoreProvider {
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl StoreProvider for ImapStoreProvider {
    async fn connect(&self, mailbox: &str) -> Result<Option<Box<dyn MailStore>>> {
        let host = self.config.host.as_str();
        let port = self.config.port;

        let tcp = TcpStream::connect((host, port)).await.map_err(|e| {
            ArchiveError::ConnectionFailed(format!("{}:{}: {}", host, port, e))
        })?;
        let tls = async_native_tls::TlsConnector::new();
        let tls_stream = tls
            .connect(host, tcp)
            .await
            .map_err(|e| ArchiveError::ConnectionFailed(format!("tls to {}: {}", host, e)))?;
        let client = async_imap::Client::new(tls_stream);

        let session = match (&self.config.xoauth2_token, &self.config.password) {
            (Some(token), _) => {
                let auth = Xoauth2 {
                    user: mailbox.to_string(),
                    token: token.clone(),
                };
                client.authenticate("XOAUTH2", auth).await
            }
            (None, Some(password)) => client.login(mailbox, password).await,
            (None, None) => {
                return Err(ArchiveError::ConfigError(
                    "store needs either password or xoauth2_token".to_string(),
                ))
            }
        };

        match session {
            Ok(session) => {
                debug!("authenticated to {} as {}", host, mailbox);
                Ok(Some(Box::new(ImapMailStore {
                    state: Arc::new(Mutex::new(SessionState {
                        session,
                        selected: None,
                    })),
                })))
            }
            Err((e, _client)) => {
                // a rejected login means this mailbox cannot be archived
                // right now; the caller skips the user
                warn!("login refused for {}: {}", mailbox, e);
                Ok(None)
            }
        }
    }
}

struct SessionState {
    session: ImapSession,
    selected: Option<String>,
}

pub struct ImapMailStore {
    state: Arc<Mutex<SessionState>>,
}

#[async_trait]
impl MailStore for ImapMailStore {
    async fn open_folder(&self, name: &str, read_only: bool) -> Result<Box<dyn MailFolder>> {
        Ok(Box::new(ImapFolder {
            state: Arc::clone(&self.state),
            name: name.to_string(),
            read_only,
        }))
    }
}

struct ImapFolder {
    state: Arc<Mutex<SessionState>>,
    name: String,
    read_only: bool,
}

impl ImapFolder {
    async fn ensure_selected<'a>(
        &self,
        state: &'a mut SessionState,
    ) -> Result<&'a mut ImapSession> {
        if state.selected.as_deref() != Some(self.name.as_str()) {
            let result = if self.read_only {
                state.session.examine(&self.name).await
            } else {
                state.session.select(&self.name).await
            };
            if let Err(e) = result {
                state.selected = None;
                return Err(ArchiveError::FolderUnusable(format!(
                    "{}: {}",
                    self.name, e
                )));
            }
            state.selected = Some(self.name.clone());
        }
        Ok(&mut state.session)
    }

    async fn fetch_one(&self, message_ref: &MessageRef, query: &str) -> Result<async_imap::types::Fetch> {
        let mut state = self.state.lock().await;
        let session = self.ensure_selected(&mut state).await?;

        let mut fetches = Vec::new();
        {
            let mut stream = session
                .uid_fetch(message_ref.as_str(), query)
                .await
                .map_err(|e| store_err(&self.name, e))?;
            while let Some(item) = stream.next().await {
                fetches.push(item.map_err(|e| store_err(&self.name, e))?);
            }
        }

        fetches
            .into_iter()
            .next()
            .ok_or_else(|| ArchiveError::MessageGone(message_ref.to_string()))
    }
}

#[async_trait]
impl MailFolder for ImapFolder {
    async fn search(
        &self,
        received_after: DateTime<Utc>,
        received_before: Option<DateTime<Utc>>,
    ) -> Result<Vec<MessageRef>> {
        let query = search_query(received_after, received_before);
        debug!("uid search [{}] in {}", query, self.name);

        let mut state = self.state.lock().await;
        let session = self.ensure_selected(&mut state).await?;
        let uids = session
            .uid_search(&query)
            .await
            .map_err(|e| store_err(&self.name, e))?;
        Ok(uids.into_iter().map(|uid| MessageRef::new(uid.to_string())).collect())
    }

    async fn fetch_envelopes(&self, refs: &[MessageRef]) -> Result<Vec<MessageCandidate>> {
        let mut state = self.state.lock().await;
        let session = self.ensure_selected(&mut state).await?;

        let mut candidates = Vec::with_capacity(refs.len());
        for chunk in refs.chunks(FETCH_CHUNK) {
            let set = chunk
                .iter()
                .map(|r| r.as_str())
                .collect::<Vec<_>>()
                .join(",");

            let mut stream = session
                .uid_fetch(&set, "(UID ENVELOPE INTERNALDATE)")
                .await
                .map_err(|e| store_err(&self.name, e))?;
            while let Some(item) = stream.next().await {
                let fetch = item.map_err(|e| store_err(&self.name, e))?;
                if let Some(candidate) = to_candidate(&fetch) {
                    candidates.push(candidate);
                }
            }
        }
        Ok(candidates)
    }

    async fn list_all(&self) -> Result<Vec<MessageRef>> {
        let mut state = self.state.lock().await;
        let session = self.ensure_selected(&mut state).await?;
        let uids = session
            .uid_search("ALL")
            .await
            .map_err(|e| store_err(&self.name, e))?;
        Ok(uids.into_iter().map(|uid| MessageRef::new(uid.to_string())).collect())
    }

    async fn header_values(&self, message_ref: &MessageRef, name: &str) -> Result<Vec<String>> {
        // the only header a sync asks for is Message-ID, which the envelope
        // already carries
        if !name.eq_ignore_ascii_case("Message-ID") {
            return Ok(Vec::new());
        }

        let fetch = self.fetch_one(message_ref, "(UID ENVELOPE)").await?;
        Ok(fetch
            .envelope()
            .and_then(|env| env.message_id.as_ref())
            .map(|id| decode(id))
            .into_iter()
            .collect())
    }

    async fn raw_content(&self, message_ref: &MessageRef) -> Result<Vec<u8>> {
        let fetch = self.fetch_one(message_ref, "(UID BODY.PEEK[])").await?;
        fetch
            .body()
            .map(|b| b.to_vec())
            .ok_or_else(|| ArchiveError::MessageGone(message_ref.to_string()))
    }
}

fn store_err(folder: &str, e: async_imap::error::Error) -> ArchiveError {
    match e {
        async_imap::error::Error::ConnectionLost | async_imap::error::Error::Io(_) => {
            ArchiveError::FolderUnusable(format!("{}: {}", folder, e))
        }
        other => ArchiveError::StoreError(other.to_string()),
    }
}

fn to_candidate(fetch: &async_imap::types::Fetch) -> Option<MessageCandidate> {
    let uid = fetch.uid?;
    let envelope = fetch.envelope();

    let message_ids = envelope
        .and_then(|env| env.message_id.as_ref())
        .map(|id| decode(id))
        .into_iter()
        .collect();
    let from = envelope
        .and_then(|env| env.from.as_ref())
        .map(|addrs| addrs.iter().filter_map(render_address).collect())
        .unwrap_or_default();
    let subject = envelope
        .and_then(|env| env.subject.as_ref())
        .map(|s| decode(s));
    let sent_date = envelope
        .and_then(|env| env.date.as_ref())
        .and_then(|d| parse_sent_date(&decode(d)));

    Some(MessageCandidate {
        message_ref: MessageRef::new(uid.to_string()),
        message_ids,
        from,
        subject,
        received_date: fetch.internal_date().map(|d| d.with_timezone(&Utc)),
        sent_date,
    })
}

fn render_address(addr: &async_imap::imap_proto::types::Address) -> Option<String> {
    let mailbox = addr.mailbox.as_ref()?;
    let host = addr.host.as_ref()?;
    Some(format!("{}@{}", decode(mailbox), decode(host)))
}

fn decode(bytes: impl AsRef<[u8]>) -> String {
    String::from_utf8_lossy(bytes.as_ref()).into_owned()
}

fn parse_sent_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw.trim())
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Day-granular IMAP search term; `BEFORE` is exclusive on the server side
fn search_query(after: DateTime<Utc>, before: Option<DateTime<Utc>>) -> String {
    match before {
        Some(before) => format!("SINCE {} BEFORE {}", imap_date(after), imap_date(before)),
        None => format!("SINCE {}", imap_date(after)),
    }
}

fn imap_date(ts: DateTime<Utc>) -> String {
    ts.format("%d-%b-%Y").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_imap_date_format() {
        let ts = Utc.with_ymd_and_hms(2012, 3, 5, 14, 30, 0).unwrap();
        assert_eq!(imap_date(ts), "05-Mar-2012");
    }

    #[test]
    fn test_search_query_bounded_and_unbounded() {
        let after = Utc.with_ymd_and_hms(2012, 1, 1, 0, 0, 0).unwrap();
        let before = Utc.with_ymd_and_hms(2012, 1, 31, 0, 0, 0).unwrap();

        assert_eq!(
            search_query(after, Some(before)),
            "SINCE 01-Jan-2012 BEFORE 31-Jan-2012"
        );
        assert_eq!(search_query(after, None), "SINCE 01-Jan-2012");
    }

    #[test]
    fn test_parse_sent_date() {
        let parsed = parse_sent_date("Mon, 5 Mar 2012 10:30:00 +0200").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2012, 3, 5, 8, 30, 0).unwrap());
        assert!(parse_sent_date("nonsense").is_none());
    }

    #[test]
    fn test_xoauth2_response_shape() {
        let mut auth = Xoauth2 {
            user: "alice@example.com".to_string(),
            token: "tok".to_string(),
        };
        use async_imap::Authenticator;
        assert_eq!(
            auth.process(b""),
            "user=alice@example.com\x01auth=Bearer tok\x01\x01"
        );
    }
}
