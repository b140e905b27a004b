//! Mail provider trait definition.
//!
//! This module defines the [`MailProvider`] trait which abstracts over the
//! mail listing/fetch service. The pipeline only needs three operations:
//! search for message ids, fetch one message, and fetch attachment bytes.

use async_trait::async_trait;

use crate::domain::{EmailId, EmailRecord};

/// Result type alias for mail provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Errors that can occur during mail provider operations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Authentication failed or credentials expired.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Network or connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// Rate limit exceeded.
    #[error("rate limit exceeded, retry after {retry_after_secs:?} seconds")]
    RateLimited {
        /// Seconds to wait before retrying, if known.
        retry_after_secs: Option<u64>,
    },

    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid request or parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Fetch depth for a single message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageFormat {
    /// Headers, snippet, and attachment metadata only.
    Metadata,
    /// Headers plus the decoded plain-text body.
    Full,
}

/// Trait for mail backends.
///
/// Implementations handle authentication and translate backend message
/// payloads into [`EmailRecord`]s. All methods are async and return
/// [`Result`] to surface provider-specific errors.
#[async_trait]
pub trait MailProvider: Send + Sync {
    /// Authenticates with the mail service, refreshing tokens if needed.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Authentication`] if credentials are invalid
    /// or expired beyond refresh.
    async fn authenticate(&mut self) -> Result<()>;

    /// Searches for messages matching a query expression.
    ///
    /// # Arguments
    ///
    /// * `query` - Backend search expression (e.g. a Gmail `q` string)
    /// * `max_results` - Result cap for the listing call
    async fn list_messages(&self, query: &str, max_results: u32) -> Result<Vec<EmailId>>;

    /// Fetches a single message.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NotFound`] if the message does not exist.
    async fn fetch_message(&self, id: &EmailId, format: MessageFormat) -> Result<EmailRecord>;

    /// Fetches raw attachment bytes by opaque reference.
    async fn fetch_attachment(&self, message_id: &EmailId, attachment_ref: &str)
        -> Result<Vec<u8>>;
}
