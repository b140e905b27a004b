//! Timestamped JSON artifact store.
//!
//! Every write targets a fresh filename with an embedded sortable UTC
//! timestamp; the directory listing is the only index. Email dumps keep the
//! `{emails, metadata}` envelope the aggregation tooling reads, and record
//! dumps keep the exact camelCase field names of the domain types.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::StoreError;
use crate::domain::{EmailRecord, ExtractedRecord};

/// The artifact families this tool persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoredFileKind {
    /// Raw listing results.
    RawEmails,
    /// Full-format fetch results with bodies and attachment metadata.
    EnhancedFetch,
    /// Model-normalized transaction/statement batches.
    GeminiTransactions,
    /// Aggregates combined across runs.
    TransactionsHub,
}

impl StoredFileKind {
    /// Filename prefix for this kind.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::RawEmails => "raw_emails",
            Self::EnhancedFetch => "enhanced_fetch",
            Self::GeminiTransactions => "gemini_transactions",
            Self::TransactionsHub => "transactions_hub",
        }
    }

    /// Recovers the kind from a stored filename, if it carries a known
    /// prefix.
    pub fn from_filename(filename: &str) -> Option<Self> {
        [
            Self::RawEmails,
            Self::EnhancedFetch,
            Self::GeminiTransactions,
            Self::TransactionsHub,
        ]
        .into_iter()
        .find(|kind| filename.starts_with(kind.prefix()))
    }
}

/// Metadata recorded alongside a dump.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DumpMetadata {
    /// Search expression that produced the content.
    pub query: String,
    /// Number of elements in the dump.
    pub count: usize,
    /// When the dump was produced, RFC 3339.
    pub fetched_at: String,
}

/// Envelope for persisted email batches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailDump {
    pub emails: Vec<EmailRecord>,
    pub metadata: DumpMetadata,
}

/// Envelope for persisted record batches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordDump {
    pub records: Vec<ExtractedRecord>,
    pub metadata: DumpMetadata,
}

/// One entry from the store's directory listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFileEntry {
    pub filename: String,
    pub kind: Option<StoredFileKind>,
    pub size_bytes: u64,
}

/// JSON artifact store over one directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Creates a store rooted at `dir`. The directory is created on first
    /// write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The store's root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persists a payload under a fresh timestamped filename for `kind`.
    ///
    /// Returns the path written. Writes never reuse a filename, so
    /// concurrent runs cannot corrupt an existing file.
    pub async fn write<T: Serialize>(
        &self,
        kind: StoredFileKind,
        payload: &T,
    ) -> Result<PathBuf, StoreError> {
        self.write_at(kind, Utc::now(), payload).await
    }

    /// Persists a payload under the filename for an explicit timestamp.
    pub async fn write_at<T: Serialize>(
        &self,
        kind: StoredFileKind,
        timestamp: DateTime<Utc>,
        payload: &T,
    ) -> Result<PathBuf, StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let filename = format!(
            "{}_{}.json",
            kind.prefix(),
            timestamp.format("%Y%m%dT%H%M%S%3fZ")
        );
        let path = self.dir.join(&filename);
        let bytes = serde_json::to_vec_pretty(payload)?;
        tokio::fs::write(&path, bytes).await?;

        tracing::debug!(file = %path.display(), "stored artifact");
        Ok(path)
    }

    /// Lists stored artifacts, oldest first.
    ///
    /// The embedded timestamp makes filenames sort chronologically. With a
    /// `kind` filter, only that family is returned.
    pub async fn list(
        &self,
        kind: Option<StoredFileKind>,
    ) -> Result<Vec<StoredFileEntry>, StoreError> {
        let mut entries = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            // A store that was never written to lists as empty.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = dir.next_entry().await? {
            let filename = entry.file_name().to_string_lossy().into_owned();
            if !filename.ends_with(".json") {
                continue;
            }
            let file_kind = StoredFileKind::from_filename(&filename);
            if kind.is_some() && file_kind != kind {
                continue;
            }
            let size_bytes = entry.metadata().await.map(|m| m.len()).unwrap_or(0);
            entries.push(StoredFileEntry {
                filename,
                kind: file_kind,
                size_bytes,
            });
        }

        entries.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(entries)
    }

    /// Reads one stored artifact back by filename.
    pub async fn read<T: DeserializeOwned>(&self, filename: &str) -> Result<T, StoreError> {
        let bytes = tokio::fs::read(self.dir.join(filename)).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EmailId;
    use chrono::TimeZone;

    fn email(id: &str) -> EmailRecord {
        EmailRecord {
            id: EmailId::from(id),
            from_address: "alerts@bank.com".to_string(),
            subject: "Alert".to_string(),
            date_header: "Fri, 5 Jan 2024 10:00:00 +0530".to_string(),
            snippet: Some("Rs. 100 debited".to_string()),
            full_body: None,
            pdf_attachments: vec![],
            account_mapping: None,
        }
    }

    fn dump(count: usize) -> EmailDump {
        EmailDump {
            emails: (0..count).map(|i| email(&format!("m{i}"))).collect(),
            metadata: DumpMetadata {
                query: "subject:statement OR subject:bank".to_string(),
                count,
                fetched_at: "2024-01-05T10:00:00Z".to_string(),
            },
        }
    }

    fn ts(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 5, 10, 0, secs).unwrap()
    }

    #[tokio::test]
    async fn write_and_read_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileStore::new(tmp.path());

        let path = store
            .write_at(StoredFileKind::RawEmails, ts(0), &dump(2))
            .await
            .unwrap();
        let filename = path.file_name().unwrap().to_string_lossy().into_owned();

        let back: EmailDump = store.read(&filename).await.unwrap();
        assert_eq!(back.emails.len(), 2);
        assert_eq!(back.metadata.query, "subject:statement OR subject:bank");
    }

    #[tokio::test]
    async fn filenames_embed_sortable_timestamps() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileStore::new(tmp.path());

        store
            .write_at(StoredFileKind::RawEmails, ts(2), &dump(1))
            .await
            .unwrap();
        store
            .write_at(StoredFileKind::RawEmails, ts(1), &dump(1))
            .await
            .unwrap();

        let entries = store.list(Some(StoredFileKind::RawEmails)).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].filename < entries[1].filename);
        assert!(entries[0].filename.starts_with("raw_emails_"));
    }

    #[tokio::test]
    async fn list_filters_by_kind() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileStore::new(tmp.path());

        store
            .write_at(StoredFileKind::RawEmails, ts(1), &dump(1))
            .await
            .unwrap();
        store
            .write_at(StoredFileKind::GeminiTransactions, ts(2), &dump(1))
            .await
            .unwrap();

        let all = store.list(None).await.unwrap();
        assert_eq!(all.len(), 2);

        let gemini = store
            .list(Some(StoredFileKind::GeminiTransactions))
            .await
            .unwrap();
        assert_eq!(gemini.len(), 1);
        assert_eq!(gemini[0].kind, Some(StoredFileKind::GeminiTransactions));
    }

    #[tokio::test]
    async fn empty_store_lists_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileStore::new(tmp.path().join("never-written"));
        let entries = store.list(None).await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn persisted_emails_keep_exact_field_names() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileStore::new(tmp.path());

        let path = store
            .write_at(StoredFileKind::EnhancedFetch, ts(0), &dump(1))
            .await
            .unwrap();

        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(value["emails"][0].get("fromAddress").is_some());
        assert!(value["emails"][0].get("dateHeader").is_some());
        assert!(value["metadata"].get("fetchedAt").is_some());
    }

    #[test]
    fn kind_recovered_from_filename() {
        assert_eq!(
            StoredFileKind::from_filename("gemini_transactions_20240105T100000000Z.json"),
            Some(StoredFileKind::GeminiTransactions)
        );
        assert_eq!(StoredFileKind::from_filename("notes.json"), None);
    }
}
