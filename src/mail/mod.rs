//! Mail access boundary.
//!
//! The gateway never talks to a mailbox provider directly; everything goes
//! through the [`MailClient`] trait, constructed per call from
//! [`MailCredentials`]. The shipped implementation ([`BridgeMailClient`])
//! delegates to a mail-bridge REST service; [`mock::MockMailClient`] backs
//! the tests.

mod http;
pub mod mock;

pub use http::{BridgeMailClient, BridgeMailFactory};
pub use mock::MockMailClient;

use async_trait::async_trait;
use std::sync::Arc;

use crate::models::{
    EmailSummary, FetchEmailsInput, MailCredentials, MarkEmailsReadInput, SendEmailInput,
};

/// Errors that can occur when talking to a mailbox provider.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    /// A required credential header was missing or malformed
    #[error("missing or invalid credential: {0}")]
    Credentials(String),

    /// Network or HTTP error
    #[error("network error: {0}")]
    Network(String),

    /// The provider answered but reported a failure
    #[error("mail provider error: {0}")]
    Provider(String),

    /// Response body could not be decoded
    #[error("parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for MailError {
    fn from(err: reqwest::Error) -> Self {
        MailError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for MailError {
    fn from(err: serde_json::Error) -> Self {
        MailError::Parse(err.to_string())
    }
}

/// One authenticated mailbox connection.
#[async_trait]
pub trait MailClient: Send + Sync {
    /// Fetch emails matching the given filters.
    async fn fetch(&self, input: &FetchEmailsInput) -> Result<Vec<EmailSummary>, MailError>;

    /// Mark the given emails as read.
    async fn mark_read(&self, input: &MarkEmailsReadInput) -> Result<(), MailError>;

    /// Send an email.
    async fn send(&self, input: &SendEmailInput) -> Result<(), MailError>;
}

/// Builds a [`MailClient`] for the credentials carried by a single call.
pub trait MailClientFactory: Send + Sync {
    fn client_for(&self, credentials: MailCredentials) -> Arc<dyn MailClient>;
}
