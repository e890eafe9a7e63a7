//! Typed inputs and outputs for the email tools.
//!
//! Each input type deserializes from the raw `tools/call` arguments and then
//! runs an explicit [`validate`](FetchEmailsInput::validate) pass with a
//! descriptive failure message. The JSON schemas advertised by `tools/list`
//! are static metadata and live next to the tool registrations; the runtime
//! validation path is these types.

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported mailbox providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    Gmail,
    Outlook,
    Yahoo,
}

impl ClientType {
    /// Provider identifier as used in credential headers and bridge URLs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientType::Gmail => "gmail",
            ClientType::Outlook => "outlook",
            ClientType::Yahoo => "yahoo",
        }
    }
}

impl fmt::Display for ClientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClientType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gmail" => Ok(ClientType::Gmail),
            "outlook" => Ok(ClientType::Outlook),
            "yahoo" => Ok(ClientType::Yahoo),
            other => Err(format!(
                "unsupported email client type '{}' (expected gmail, outlook or yahoo)",
                other
            )),
        }
    }
}

/// Per-call mailbox credentials, read from request metadata by the handler
/// layer. The gateway passes these through unvalidated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailCredentials {
    pub username: String,
    pub password: String,
    pub client_type: ClientType,
    /// Provider port override, defaults are provider-side.
    pub port: Option<u16>,
}

/// Inclusive date window for fetching emails, ISO 8601 formatted
/// (`YYYY-MM-DDTHH:mm:ss`, offset optional).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

impl DateRange {
    fn check_bound(label: &str, value: &Option<String>) -> Result<(), String> {
        let Some(raw) = value else {
            return Ok(());
        };
        if parse_iso_datetime(raw).is_none() {
            return Err(format!(
                "dateRange.{} '{}' is not an ISO date time (YYYY-MM-DDTHH:mm:ss)",
                label, raw
            ));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), String> {
        Self::check_bound("start", &self.start)?;
        Self::check_bound("end", &self.end)
    }
}

fn parse_iso_datetime(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").ok()
}

fn default_mailbox() -> String {
    "INBOX".to_string()
}

/// Arguments for the `fetch-emails` tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchEmailsInput {
    /// Mailbox to fetch from, `INBOX` by default.
    #[serde(default = "default_mailbox")]
    pub mailbox: String,

    /// Optional subject filter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// Date window filter. Mandatory on the wire; its bounds are optional.
    pub date_range: DateRange,

    /// Optional sender address filter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub senders: Option<Vec<String>>,
}

impl FetchEmailsInput {
    pub fn validate(&self) -> Result<(), String> {
        if self.mailbox.trim().is_empty() {
            return Err("mailbox must not be empty".to_string());
        }
        self.date_range.validate()
    }
}

/// One email as returned to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailSummary {
    pub id: u32,
    pub subject: String,
    pub sender: String,
    pub snippet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

/// Structured result of the `fetch-emails` tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchEmailsOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emails: Option<Vec<EmailSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Arguments for the `mark-emails-read` tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkEmailsReadInput {
    /// Email ids to mark as read.
    pub ids: Vec<u32>,

    /// Mailbox the ids belong to, `INBOX` by default.
    #[serde(default = "default_mailbox")]
    pub mailbox: String,
}

impl MarkEmailsReadInput {
    pub fn validate(&self) -> Result<(), String> {
        if self.ids.is_empty() {
            return Err("ids must contain at least one email id".to_string());
        }
        if self.mailbox.trim().is_empty() {
            return Err("mailbox must not be empty".to_string());
        }
        Ok(())
    }
}

/// Arguments for the `send-email` tool and prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailInput {
    /// Recipient email address.
    pub to: String,

    /// Subject line, 2 to 100 characters.
    pub subject: String,

    /// Body content, at least 2 characters.
    pub body: String,

    /// Tone of the email (e.g. `professional`).
    pub tone: String,
}

impl SendEmailInput {
    pub fn validate(&self) -> Result<(), String> {
        if !looks_like_email(&self.to) {
            return Err(format!("'{}' is not a valid email address", self.to));
        }
        let subject_len = self.subject.chars().count();
        if !(2..=100).contains(&subject_len) {
            return Err("subject must be between 2 and 100 characters".to_string());
        }
        if self.body.chars().count() < 2 {
            return Err("body must be at least 2 characters".to_string());
        }
        Ok(())
    }
}

/// Minimal shape check, real validation is the provider's job.
fn looks_like_email(addr: &str) -> bool {
    let Some((local, domain)) = addr.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

/// Structured success/error result shared by `mark-emails-read` and
/// `send-email`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusOutput {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusOutput {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_input_defaults_mailbox_to_inbox() {
        let input: FetchEmailsInput = serde_json::from_value(serde_json::json!({
            "dateRange": {}
        }))
        .expect("deserialize");
        assert_eq!(input.mailbox, "INBOX");
        assert!(input.validate().is_ok());
    }

    #[test]
    fn fetch_input_requires_date_range() {
        let result: Result<FetchEmailsInput, _> =
            serde_json::from_value(serde_json::json!({ "mailbox": "INBOX" }));
        assert!(result.is_err());
    }

    #[test]
    fn fetch_input_rejects_malformed_date() {
        let input: FetchEmailsInput = serde_json::from_value(serde_json::json!({
            "dateRange": { "start": "yesterday" }
        }))
        .expect("deserialize");
        let err = input.validate().expect_err("must fail");
        assert!(err.contains("dateRange.start"));
    }

    #[test]
    fn fetch_input_accepts_iso_dates() {
        let input: FetchEmailsInput = serde_json::from_value(serde_json::json!({
            "dateRange": { "start": "2024-05-01T00:00:00", "end": "2024-05-31T23:59:59" }
        }))
        .expect("deserialize");
        assert!(input.validate().is_ok());
    }

    #[test]
    fn send_input_enforces_subject_bounds() {
        let mut input = SendEmailInput {
            to: "user@example.com".to_string(),
            subject: "x".to_string(),
            body: "hello there".to_string(),
            tone: "friendly".to_string(),
        };
        assert!(input.validate().is_err());
        input.subject = "Quarterly report".to_string();
        assert!(input.validate().is_ok());
    }

    #[test]
    fn send_input_rejects_bad_address() {
        let input = SendEmailInput {
            to: "not-an-address".to_string(),
            subject: "Hello".to_string(),
            body: "hi".to_string(),
            tone: "casual".to_string(),
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn client_type_parses_case_insensitively() {
        assert_eq!("GMail".parse::<ClientType>(), Ok(ClientType::Gmail));
        assert!("aol".parse::<ClientType>().is_err());
    }

    #[test]
    fn mark_read_requires_ids() {
        let input = MarkEmailsReadInput {
            ids: vec![],
            mailbox: "INBOX".to_string(),
        };
        assert!(input.validate().is_err());
    }
}
