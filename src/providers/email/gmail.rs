//! Gmail API provider implementation.
//!
//! This module provides a [`MailProvider`] implementation using the Gmail
//! REST API. It handles OAuth 2.0 authentication (authorization-code exchange
//! and token refresh), message search, message fetch, and attachment fetch.
//!
//! # Authentication
//!
//! Gmail uses OAuth 2.0. The client credentials (client id/secret/redirect
//! URI) are stored in the system keychain, referenced by account name. The
//! token bundle returned by Google is treated as opaque: it is held on the
//! provider instance and passed through unchanged, so the caller owns the
//! session lifecycle. There is no process-wide token store.
//!
//! # API Usage
//!
//! This provider uses the Gmail API v1:
//! - `users.messages.list` for searching messages
//! - `users.messages.get` for fetching headers/body/attachment metadata
//! - `users.messages.attachments.get` for raw attachment bytes

use base64::prelude::*;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};

use super::{MailProvider, MessageFormat, ProviderError, Result};
use crate::domain::{EmailId, EmailRecord, PdfAttachment};

const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";
const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GMAIL_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

/// Gmail API message list response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageListResponse {
    messages: Option<Vec<MessageRef>>,
    #[allow(dead_code)]
    next_page_token: Option<String>,
    #[allow(dead_code)]
    result_size_estimate: Option<u32>,
}

/// Gmail API message reference from a list call.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageRef {
    id: String,
    #[allow(dead_code)]
    thread_id: Option<String>,
}

/// Gmail API message.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessage {
    id: String,
    snippet: Option<String>,
    payload: Option<GmailMessagePayload>,
    #[allow(dead_code)]
    internal_date: Option<String>,
}

/// Gmail message payload (headers and body parts).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessagePayload {
    headers: Option<Vec<GmailHeader>>,
    parts: Option<Vec<GmailPart>>,
    body: Option<GmailBody>,
    #[allow(dead_code)]
    mime_type: Option<String>,
}

/// Gmail message header.
#[derive(Debug, Deserialize)]
struct GmailHeader {
    name: String,
    value: String,
}

/// Gmail message part (for multipart messages).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailPart {
    mime_type: Option<String>,
    filename: Option<String>,
    body: Option<GmailBody>,
    parts: Option<Vec<GmailPart>>,
}

/// Gmail message body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailBody {
    data: Option<String>,
    size: Option<u64>,
    attachment_id: Option<String>,
}

/// Gmail attachment response.
#[derive(Debug, Deserialize)]
struct AttachmentResponse {
    data: Option<String>,
}

/// OAuth client credentials stored in the keychain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GmailCredentials {
    /// OAuth client ID.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// Redirect URI registered for the OAuth client.
    pub redirect_uri: String,
}

/// Opaque OAuth token bundle.
///
/// Only `access_token` and `refresh_token` are interpreted; everything else
/// Google returns (expiry, scope, token type) is carried through unchanged so
/// the bundle round-trips exactly as issued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBundle {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Gmail API provider.
///
/// Implements [`MailProvider`] using the Gmail REST API with OAuth 2.0. The
/// provider instance is the authenticated session: it is created, authorized,
/// and dropped by the caller.
///
/// # Example
///
/// ```ignore
/// use finmail::providers::email::{GmailProvider, MailProvider, MessageFormat};
///
/// let mut provider = GmailProvider::with_credentials("personal", credentials);
/// println!("visit: {}", provider.authorize_url()?);
/// provider.exchange_code(code).await?;
///
/// let ids = provider.list_messages("subject:statement OR subject:bank", 5).await?;
/// ```
pub struct GmailProvider {
    /// Account name used for keychain credential lookup.
    account: String,
    /// HTTP client for API requests.
    client: reqwest::Client,
    /// OAuth client credentials.
    credentials: Option<GmailCredentials>,
    /// Current token bundle, opaque apart from the two token fields.
    tokens: Option<TokenBundle>,
    /// Whether the provider holds a live access token.
    authenticated: bool,
}

impl GmailProvider {
    /// Creates a new Gmail provider for the named account.
    ///
    /// Credentials are loaded from the keychain on
    /// [`authenticate`](MailProvider::authenticate).
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            client: reqwest::Client::new(),
            credentials: None,
            tokens: None,
            authenticated: false,
        }
    }

    /// Creates a Gmail provider with explicit credentials (for testing or
    /// direct use).
    pub fn with_credentials(account: impl Into<String>, credentials: GmailCredentials) -> Self {
        Self {
            account: account.into(),
            client: reqwest::Client::new(),
            credentials: Some(credentials),
            tokens: None,
            authenticated: false,
        }
    }

    /// Returns whether the provider currently holds a live access token.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Returns the account name for this provider.
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Returns the current token bundle, if any.
    pub fn tokens(&self) -> Option<&TokenBundle> {
        self.tokens.as_ref()
    }

    /// Installs a previously issued token bundle, unchanged.
    pub fn set_tokens(&mut self, tokens: TokenBundle) {
        self.authenticated = !tokens.access_token.is_empty();
        self.tokens = Some(tokens);
    }

    /// Loads OAuth client credentials from the system keychain.
    fn load_credentials_from_keychain(&self) -> Result<GmailCredentials> {
        let entry = keyring::Entry::new("finmail", &format!("gmail-{}", self.account))
            .map_err(|e| ProviderError::Authentication(format!("keyring error: {}", e)))?;

        let creds_json = entry
            .get_password()
            .map_err(|e| ProviderError::Authentication(format!("no credentials found: {}", e)))?;

        serde_json::from_str(&creds_json)
            .map_err(|e| ProviderError::Authentication(format!("invalid credentials: {}", e)))
    }

    /// Saves OAuth client credentials to the system keychain.
    pub fn save_credentials_to_keychain(&self, credentials: &GmailCredentials) -> Result<()> {
        let entry = keyring::Entry::new("finmail", &format!("gmail-{}", self.account))
            .map_err(|e| ProviderError::Authentication(format!("keyring error: {}", e)))?;

        let creds_json = serde_json::to_string(credentials)
            .map_err(|e| ProviderError::Authentication(format!("serialize error: {}", e)))?;

        entry
            .set_password(&creds_json)
            .map_err(|e| ProviderError::Authentication(format!("keyring error: {}", e)))?;

        Ok(())
    }

    fn require_credentials(&self) -> Result<&GmailCredentials> {
        self.credentials
            .as_ref()
            .ok_or_else(|| ProviderError::Authentication("no credentials available".to_string()))
    }

    /// Builds the Google consent URL for the read-only Gmail scope.
    ///
    /// Offline access with a forced consent prompt, so a refresh token is
    /// issued on every grant.
    pub fn authorize_url(&self) -> Result<String> {
        let credentials = self.require_credentials()?;

        let url = url::Url::parse_with_params(
            GOOGLE_AUTH_URL,
            &[
                ("client_id", credentials.client_id.as_str()),
                ("redirect_uri", credentials.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", GMAIL_READONLY_SCOPE),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|e| ProviderError::Internal(format!("build auth url: {}", e)))?;

        Ok(url.into())
    }

    /// Exchanges an authorization code for a token bundle.
    ///
    /// The bundle is stored on the provider and also returned, so callers can
    /// persist it across restarts.
    pub async fn exchange_code(&mut self, code: &str) -> Result<TokenBundle> {
        let credentials = self.require_credentials()?;

        let params = [
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("redirect_uri", credentials.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
        ];

        let response = self
            .client
            .post(GOOGLE_TOKEN_URL)
            .form(&params)
            .send()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Authentication(format!(
                "code exchange failed ({}): {}",
                status, body
            )));
        }

        let tokens: TokenBundle = response
            .json()
            .await
            .map_err(|e| ProviderError::Internal(format!("parse token response: {}", e)))?;

        self.authenticated = true;
        self.tokens = Some(tokens.clone());

        tracing::info!(account = %self.account, "Gmail authorization code exchanged");
        Ok(tokens)
    }

    /// Refreshes the access token using the stored refresh token.
    async fn refresh_access_token(&mut self) -> Result<()> {
        let credentials = self.require_credentials()?;
        let refresh_token = self
            .tokens
            .as_ref()
            .and_then(|t| t.refresh_token.clone())
            .ok_or_else(|| ProviderError::Authentication("no refresh token held".to_string()))?;

        let params = [
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("refresh_token", refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .client
            .post(GOOGLE_TOKEN_URL)
            .form(&params)
            .send()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Authentication(format!(
                "token refresh failed ({}): {}",
                status, body
            )));
        }

        let refreshed: TokenBundle = response
            .json()
            .await
            .map_err(|e| ProviderError::Internal(format!("parse token response: {}", e)))?;

        // Google omits the refresh token on refresh responses; keep the one
        // already held.
        if let Some(tokens) = &mut self.tokens {
            tokens.access_token = refreshed.access_token;
            tokens.extra = refreshed.extra;
            if refreshed.refresh_token.is_some() {
                tokens.refresh_token = refreshed.refresh_token;
            }
        } else {
            self.tokens = Some(refreshed);
        }

        Ok(())
    }

    /// Builds authorization headers for API requests.
    fn auth_headers(&self) -> Result<HeaderMap> {
        let token = self
            .tokens
            .as_ref()
            .map(|t| t.access_token.as_str())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ProviderError::Authentication("not authenticated".to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| ProviderError::Internal(format!("invalid header: {}", e)))?,
        );
        Ok(headers)
    }

    /// Makes an authenticated GET request to the Gmail API.
    async fn get<T: for<'de> Deserialize<'de>>(&self, endpoint: &str) -> Result<T> {
        let url = format!("{}{}", GMAIL_API_BASE, endpoint);
        let headers = self.auth_headers()?;

        let response = self
            .client
            .get(&url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            return Err(self.handle_error(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::Internal(format!("parse response: {}", e)))
    }

    /// Handles API error responses.
    async fn handle_error(&self, response: reqwest::Response) -> ProviderError {
        let status = response.status();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let body = response.text().await.unwrap_or_default();

        match status.as_u16() {
            401 => ProviderError::Authentication(format!("unauthorized: {}", body)),
            404 => ProviderError::NotFound(body),
            429 => ProviderError::RateLimited {
                retry_after_secs: retry_after,
            },
            _ => ProviderError::Internal(format!("API error ({}): {}", status, body)),
        }
    }

    /// Decodes a base64url body chunk to UTF-8, discarding undecodable data.
    fn decode_body_data(data: &str) -> Option<String> {
        BASE64_URL_SAFE_NO_PAD
            .decode(data)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
    }

    /// Recursively finds the first text/plain part body.
    fn extract_text_from_parts(parts: &[GmailPart]) -> Option<String> {
        for part in parts {
            let mime = part.mime_type.as_deref().unwrap_or("");
            if mime == "text/plain" {
                if let Some(text) = part
                    .body
                    .as_ref()
                    .and_then(|b| b.data.as_deref())
                    .and_then(Self::decode_body_data)
                {
                    return Some(text);
                }
            }
            if let Some(nested) = &part.parts {
                if let Some(text) = Self::extract_text_from_parts(nested) {
                    return Some(text);
                }
            }
        }
        None
    }

    /// Extracts the plain-text body from a message payload.
    fn extract_body(payload: &GmailMessagePayload) -> Option<String> {
        if let Some(text) = payload
            .body
            .as_ref()
            .and_then(|b| b.data.as_deref())
            .and_then(Self::decode_body_data)
        {
            return Some(text);
        }
        payload
            .parts
            .as_deref()
            .and_then(Self::extract_text_from_parts)
    }

    /// Recursively collects PDF attachment metadata from message parts.
    fn collect_pdf_attachments(parts: &[GmailPart], out: &mut Vec<PdfAttachment>) {
        for part in parts {
            let filename = part.filename.as_deref().unwrap_or("");
            let mime = part.mime_type.as_deref().unwrap_or("");
            let is_pdf = mime == "application/pdf"
                || filename.to_ascii_lowercase().ends_with(".pdf");

            if is_pdf && !filename.is_empty() {
                if let Some(attachment_ref) =
                    part.body.as_ref().and_then(|b| b.attachment_id.clone())
                {
                    out.push(PdfAttachment {
                        filename: filename.to_string(),
                        size_bytes: part.body.as_ref().and_then(|b| b.size).unwrap_or(0),
                        attachment_ref,
                    });
                }
            }

            if let Some(nested) = &part.parts {
                Self::collect_pdf_attachments(nested, out);
            }
        }
    }

    /// Converts a Gmail message to the domain [`EmailRecord`].
    ///
    /// Header values are taken verbatim; the `Date` header in particular is
    /// kept as-is because it is not guaranteed parseable.
    fn gmail_message_to_record(msg: &GmailMessage, format: MessageFormat) -> EmailRecord {
        let payload = msg.payload.as_ref();
        let headers = payload.and_then(|p| p.headers.as_ref());

        let get_header = |name: &str| -> Option<String> {
            headers.and_then(|h| {
                h.iter()
                    .find(|hdr| hdr.name.eq_ignore_ascii_case(name))
                    .map(|hdr| hdr.value.clone())
            })
        };

        let full_body = match format {
            MessageFormat::Full => payload.and_then(Self::extract_body),
            MessageFormat::Metadata => None,
        };

        let mut pdf_attachments = Vec::new();
        if let Some(parts) = payload.and_then(|p| p.parts.as_deref()) {
            Self::collect_pdf_attachments(parts, &mut pdf_attachments);
        }

        EmailRecord {
            id: EmailId::from(msg.id.clone()),
            from_address: get_header("From").unwrap_or_default(),
            subject: get_header("Subject").unwrap_or_default(),
            date_header: get_header("Date").unwrap_or_default(),
            snippet: msg.snippet.clone().filter(|s| !s.is_empty()),
            full_body,
            pdf_attachments,
            account_mapping: None,
        }
    }
}

#[async_trait::async_trait]
impl MailProvider for GmailProvider {
    async fn authenticate(&mut self) -> Result<()> {
        if self.credentials.is_none() {
            self.credentials = Some(self.load_credentials_from_keychain()?);
        }

        self.refresh_access_token().await?;
        self.authenticated = true;

        tracing::info!(account = %self.account, "Gmail provider authenticated");
        Ok(())
    }

    async fn list_messages(&self, query: &str, max_results: u32) -> Result<Vec<EmailId>> {
        if !self.authenticated {
            return Err(ProviderError::Authentication(
                "not authenticated".to_string(),
            ));
        }

        let encoded: String =
            url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
        let endpoint = format!("/messages?q={}&maxResults={}", encoded, max_results);
        let response: MessageListResponse = self.get(&endpoint).await?;

        let ids = response
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(|m| EmailId::from(m.id))
            .collect::<Vec<_>>();

        tracing::debug!(query, count = ids.len(), "Gmail message search");
        Ok(ids)
    }

    async fn fetch_message(&self, id: &EmailId, format: MessageFormat) -> Result<EmailRecord> {
        if !self.authenticated {
            return Err(ProviderError::Authentication(
                "not authenticated".to_string(),
            ));
        }

        let format_param = match format {
            MessageFormat::Full => "full",
            MessageFormat::Metadata => "metadata",
        };
        let endpoint = format!("/messages/{}?format={}", id.0, format_param);
        let message: GmailMessage = self.get(&endpoint).await?;

        Ok(Self::gmail_message_to_record(&message, format))
    }

    async fn fetch_attachment(
        &self,
        message_id: &EmailId,
        attachment_ref: &str,
    ) -> Result<Vec<u8>> {
        if !self.authenticated {
            return Err(ProviderError::Authentication(
                "not authenticated".to_string(),
            ));
        }

        let endpoint = format!("/messages/{}/attachments/{}", message_id.0, attachment_ref);
        let response: AttachmentResponse = self.get(&endpoint).await?;

        let data = response
            .data
            .ok_or_else(|| ProviderError::Internal("attachment without data".to_string()))?;

        BASE64_URL_SAFE_NO_PAD
            .decode(data.as_bytes())
            .map_err(|e| ProviderError::Internal(format!("decode attachment: {}", e)))
    }
}
