//! Mock mail client for testing purposes.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::mail::{MailClient, MailClientFactory, MailError};
use crate::models::{
    EmailSummary, FetchEmailsInput, MailCredentials, MarkEmailsReadInput, SendEmailInput,
};

/// A mock mail client that returns predefined responses and records calls.
#[derive(Debug, Default)]
pub struct MockMailClient {
    emails: Mutex<Vec<EmailSummary>>,
    fail_with: Mutex<Option<String>>,
    fetch_calls: AtomicUsize,
    mark_calls: AtomicUsize,
    send_calls: AtomicUsize,
    last_credentials: Mutex<Option<MailCredentials>>,
}

impl MockMailClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the emails returned by `fetch`.
    pub fn set_emails(&self, emails: Vec<EmailSummary>) {
        *self.emails.lock().unwrap() = emails;
    }

    /// Make every operation fail with the given message.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.fail_with.lock().unwrap() = Some(message.into());
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn mark_calls(&self) -> usize {
        self.mark_calls.load(Ordering::SeqCst)
    }

    pub fn send_calls(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }

    /// Credentials passed to the most recent `client_for` call.
    pub fn last_credentials(&self) -> Option<MailCredentials> {
        self.last_credentials.lock().unwrap().clone()
    }

    fn failure(&self) -> Option<MailError> {
        self.fail_with
            .lock()
            .unwrap()
            .as_ref()
            .map(|m| MailError::Provider(m.clone()))
    }
}

#[async_trait]
impl MailClient for MockMailClient {
    async fn fetch(&self, _input: &FetchEmailsInput) -> Result<Vec<EmailSummary>, MailError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failure() {
            return Err(err);
        }
        Ok(self.emails.lock().unwrap().clone())
    }

    async fn mark_read(&self, _input: &MarkEmailsReadInput) -> Result<(), MailError> {
        self.mark_calls.fetch_add(1, Ordering::SeqCst);
        match self.failure() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn send(&self, _input: &SendEmailInput) -> Result<(), MailError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        match self.failure() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl MailClientFactory for Arc<MockMailClient> {
    fn client_for(&self, credentials: MailCredentials) -> Arc<dyn MailClient> {
        *self.last_credentials.lock().unwrap() = Some(credentials);
        self.clone()
    }
}

/// Helper to build an email summary for tests.
pub fn make_email(id: u32, subject: &str, sender: &str) -> EmailSummary {
    EmailSummary {
        id,
        subject: subject.to_string(),
        sender: sender.to_string(),
        snippet: format!("snippet of {}", subject),
        date: Some("2024-05-01T10:00:00".to_string()),
    }
}
