//! Mail-bridge REST client.
//!
//! Provider-specific mailbox access (IMAP/SMTP details, OAuth flows) lives in
//! a separate bridge service; this client forwards fetch/mark/send calls to it
//! over HTTP with the per-call credentials as basic auth. The bridge base URL
//! comes from [`MailConfig`](crate::config::MailConfig) and is extended with
//! the provider id, e.g. `http://127.0.0.1:8025/gmail`.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::mail::{MailClient, MailClientFactory, MailError};
use crate::models::{
    EmailSummary, FetchEmailsInput, MailCredentials, MarkEmailsReadInput, SendEmailInput,
};

/// Factory producing [`BridgeMailClient`] instances bound to one bridge base
/// URL. The reqwest client is shared across all sessions and calls.
#[derive(Debug, Clone)]
pub struct BridgeMailFactory {
    http: reqwest::Client,
    base_url: String,
}

impl BridgeMailFactory {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self::with_client(http, base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

impl MailClientFactory for BridgeMailFactory {
    fn client_for(&self, credentials: MailCredentials) -> Arc<dyn MailClient> {
        Arc::new(BridgeMailClient {
            http: self.http.clone(),
            base_url: format!(
                "{}/{}",
                self.base_url.trim_end_matches('/'),
                credentials.client_type
            ),
            credentials,
        })
    }
}

/// A [`MailClient`] bound to one provider endpoint and one set of
/// credentials.
#[derive(Debug, Clone)]
pub struct BridgeMailClient {
    http: reqwest::Client,
    base_url: String,
    credentials: MailCredentials,
}

#[derive(Debug, Deserialize)]
struct FetchResponse {
    #[serde(default)]
    emails: Vec<EmailSummary>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

impl BridgeMailClient {
    fn request(&self, path: &str, body: serde_json::Value) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .json(&body);
        if let Some(port) = self.credentials.port {
            builder = builder.query(&[("port", port)]);
        }
        builder
    }

    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response, MailError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let detail = response.text().await.unwrap_or_default();
        Err(MailError::Provider(format!(
            "bridge returned {}: {}",
            status,
            detail.trim()
        )))
    }

    async fn expect_success(&self, response: reqwest::Response) -> Result<(), MailError> {
        let response = self.check(response).await?;
        let status: StatusResponse = response.json().await?;
        if status.success {
            Ok(())
        } else {
            Err(MailError::Provider(
                status.error.unwrap_or_else(|| "unknown failure".to_string()),
            ))
        }
    }
}

#[async_trait]
impl MailClient for BridgeMailClient {
    async fn fetch(&self, input: &FetchEmailsInput) -> Result<Vec<EmailSummary>, MailError> {
        let response = self
            .request("/messages/search", serde_json::to_value(input)?)
            .send()
            .await?;
        let response = self.check(response).await?;
        let fetched: FetchResponse = response.json().await?;
        tracing::debug!(
            mailbox = %input.mailbox,
            count = fetched.emails.len(),
            "fetched emails from bridge"
        );
        Ok(fetched.emails)
    }

    async fn mark_read(&self, input: &MarkEmailsReadInput) -> Result<(), MailError> {
        let response = self
            .request("/messages/mark-read", serde_json::to_value(input)?)
            .send()
            .await?;
        self.expect_success(response).await
    }

    async fn send(&self, input: &SendEmailInput) -> Result<(), MailError> {
        let response = self
            .request("/messages/send", serde_json::to_value(input)?)
            .send()
            .await?;
        self.expect_success(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClientType;

    fn creds() -> MailCredentials {
        MailCredentials {
            username: "user@example.com".to_string(),
            password: "hunter22".to_string(),
            client_type: ClientType::Gmail,
            port: None,
        }
    }

    #[tokio::test]
    async fn fetch_decodes_bridge_response() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/gmail/messages/search")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"emails":[{"id":7,"subject":"Hi","sender":"a@b.co","snippet":"hello","date":"2024-05-01T10:00:00"}]}"#,
            )
            .create_async()
            .await;

        let factory = BridgeMailFactory::with_client(reqwest::Client::new(), server.url());
        let client = factory.client_for(creds());
        let input: FetchEmailsInput =
            serde_json::from_value(serde_json::json!({ "dateRange": {} })).expect("input");

        let emails = client.fetch(&input).await.expect("fetch");
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].id, 7);
        assert_eq!(emails[0].subject, "Hi");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_is_a_provider_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/gmail/messages/search")
            .with_status(502)
            .with_body("upstream imap unreachable")
            .create_async()
            .await;

        let factory = BridgeMailFactory::with_client(reqwest::Client::new(), server.url());
        let client = factory.client_for(creds());
        let input: FetchEmailsInput =
            serde_json::from_value(serde_json::json!({ "dateRange": {} })).expect("input");

        let err = client.fetch(&input).await.expect_err("must fail");
        let msg = err.to_string();
        assert!(msg.contains("502"), "unexpected error: {msg}");
        assert!(msg.contains("upstream imap unreachable"));
    }

    #[tokio::test]
    async fn send_surfaces_reported_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/gmail/messages/send")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success":false,"error":"recipient rejected"}"#)
            .create_async()
            .await;

        let factory = BridgeMailFactory::with_client(reqwest::Client::new(), server.url());
        let client = factory.client_for(creds());
        let input = SendEmailInput {
            to: "user@example.com".to_string(),
            subject: "Hello".to_string(),
            body: "hello world".to_string(),
            tone: "friendly".to_string(),
        };

        let err = client.send(&input).await.expect_err("must fail");
        assert!(err.to_string().contains("recipient rejected"));
    }
}
