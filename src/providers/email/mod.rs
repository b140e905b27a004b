//! Mail provider implementations.
//!
//! This module contains the [`MailProvider`] trait and the Gmail REST API
//! implementation:
//!
//! - [`GmailProvider`] - Gmail API with OAuth 2.0
//!
//! # Architecture
//!
//! The mail provider abstraction keeps the extraction pipeline independent of
//! the mail backend. A provider handles:
//!
//! - Authentication (OAuth code exchange and token refresh)
//! - Searching for messages with a backend query expression
//! - Fetching message headers/body/attachment metadata
//! - Fetching raw attachment bytes

mod gmail;
mod traits;

pub use gmail::{GmailCredentials, GmailProvider, TokenBundle};
pub use traits::{MailProvider, MessageFormat, ProviderError, Result};
