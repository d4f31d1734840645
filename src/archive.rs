//! Archive path derivation and idempotent writes
//!
//! Layout: `<data_dir>/<domain>/<YYYY>/<MM>/<DD>/<user>_<YYYYMMDD'T'HHMMSS>_<hash5>.mail[.zip|.gz]`
//!
//! Existence of the file at its derived path is the sole deduplication
//! signal; there is no separate index. The hash suffix only separates two
//! distinct messages from the same sender with the same subject in the same
//! second, so 5 hex chars are enough; the date-time component is the
//! primary disambiguator.

use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{ArchiveError, Result};
use crate::models::{Encoding, MessageCandidate};

pub struct ArchiveWriter {
    data_dir: PathBuf,
    domain: String,
    encoding: Encoding,
}

impl ArchiveWriter {
    pub fn new(data_dir: impl Into<PathBuf>, domain: impl Into<String>, encoding: Encoding) -> Self {
        Self {
            data_dir: data_dir.into(),
            domain: domain.into(),
            encoding,
        }
    }

    /// Full archive path for one message
    ///
    /// Directory and filename both derive from the received date; the sent
    /// date plays no part here.
    pub fn derive_path(
        &self,
        user: &str,
        received: DateTime<Utc>,
        candidate: &MessageCandidate,
    ) -> PathBuf {
        let mut path = self.data_dir.join(&self.domain);
        path.push(received.format("%Y").to_string());
        path.push(received.format("%m").to_string());
        path.push(received.format("%d").to_string());
        path.push(self.file_name(user, received, candidate));
        path
    }

    fn file_name(&self, user: &str, received: DateTime<Utc>, candidate: &MessageCandidate) -> String {
        format!(
            "{}_{}_{}{}",
            user,
            received.format("%Y%m%dT%H%M%S"),
            content_hash(candidate),
            self.encoding.extension()
        )
    }

    /// Write raw message content through the configured encoding
    ///
    /// Returns `Ok(false)` without touching anything when the file already
    /// exists; re-running a sync never overwrites or duplicates.
    pub async fn write(&self, path: &Path, raw: &[u8]) -> Result<bool> {
        if tokio::fs::try_exists(path).await? {
            debug!("{:?} exists, skipping", path);
            return Ok(false);
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let encoded = self.encode(path, raw)?;
        tokio::fs::write(path, encoded).await?;
        Ok(true)
    }

    fn encode(&self, path: &Path, raw: &[u8]) -> Result<Vec<u8>> {
        match self.encoding {
            Encoding::Identity => Ok(raw.to_vec()),
            Encoding::Gzip => {
                let mut encoder =
                    flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
                encoder.write_all(raw)?;
                Ok(encoder.finish()?)
            }
            Encoding::Zip => {
                let entry_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "message.mail".to_string());
                let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
                writer
                    .start_file(entry_name, zip::write::FileOptions::default())
                    .map_err(zip_io)?;
                writer.write_all(raw)?;
                let cursor = writer.finish().map_err(zip_io)?;
                Ok(cursor.into_inner())
            }
        }
    }
}

fn zip_io(err: zip::result::ZipError) -> ArchiveError {
    ArchiveError::IoError(std::io::Error::new(std::io::ErrorKind::Other, err))
}

/// First 5 hex chars of md5 over primary sender + subject, absent parts
/// contributing an empty string
fn content_hash(candidate: &MessageCandidate) -> String {
    let from = candidate.primary_from();
    let subject = candidate.subject.as_deref().unwrap_or("");
    let digest = md5::compute(format!("{}{}", from, subject));
    format!("{:x}", digest)[..5].to_string()
}
