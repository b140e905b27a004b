//! Email domain types.
//!
//! Represents one fetched Gmail message as seen by the extraction pipeline.
//! Records are created per listing result and held in memory for the duration
//! of one request; after creation they are only extended with derived fields,
//! never otherwise mutated.

use serde::{Deserialize, Serialize};

use super::EmailId;

/// One fetched message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailRecord {
    /// Opaque message identifier, unique per account.
    pub id: EmailId,
    /// Raw `From` header value.
    pub from_address: String,
    /// Raw `Subject` header value.
    pub subject: String,
    /// Literal `Date` header value. Not guaranteed parseable.
    pub date_header: String,
    /// Short plain-text preview. May be truncated or absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    /// Decoded plain-text body, present only when a full-format fetch was
    /// requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_body: Option<String>,
    /// PDF attachments in payload order; empty if none.
    #[serde(default)]
    pub pdf_attachments: Vec<PdfAttachment>,
    /// Derived field: which profile account this email was matched to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_mapping: Option<String>,
}

impl EmailRecord {
    /// Best available text for extraction: full body when fetched, snippet
    /// otherwise.
    pub fn text(&self) -> Option<&str> {
        self.full_body.as_deref().or(self.snippet.as_deref())
    }

    /// The sender's domain (the part after `@`, with any `>` suffix of an
    /// RFC 5322 `Name <addr>` form stripped), lowercased.
    pub fn sender_domain(&self) -> Option<String> {
        let addr = self.from_address.as_str();
        let addr = match (addr.rfind('<'), addr.rfind('>')) {
            (Some(start), Some(end)) if start < end => &addr[start + 1..end],
            _ => addr,
        };
        addr.rsplit_once('@')
            .map(|(_, domain)| domain.trim().to_ascii_lowercase())
    }

    /// Whether the message carries at least one PDF attachment.
    pub fn has_pdf(&self) -> bool {
        !self.pdf_attachments.is_empty()
    }
}

/// Metadata for one PDF attachment on a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfAttachment {
    /// Attachment filename as reported by the mail service.
    pub filename: String,
    /// Size in bytes.
    pub size_bytes: u64,
    /// Opaque reference used to fetch the attachment bytes.
    pub attachment_ref: String,
}
