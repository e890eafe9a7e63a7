//! Email tool handlers.
//!
//! Every session's engine gets the same three tools. Handlers read per-call
//! mailbox credentials from [`RequestMeta`] and go through the
//! [`MailClientFactory`] boundary; they never talk to a provider directly.
//! Business failures (unreachable provider, rejected send) come back as
//! `isError` results, not JSON-RPC errors.

use std::sync::Arc;

use serde_json::Value;

use crate::mail::{MailClientFactory, MailError};
use crate::mcp::types::CallToolResult;
use crate::models::{
    FetchEmailsInput, FetchEmailsOutput, MailCredentials, MarkEmailsReadInput, SendEmailInput,
    StatusOutput,
};
use crate::tools::{RequestMeta, Tool, ToolError, ToolHandler, ToolRegistry};
use crate::utils::load_resource;

/// Default instructions template applied to fetched emails when neither the
/// `email-instructions` header nor `EMAIL_INSTRUCTIONS` is set.
pub const FETCH_EMAILS_PROMPT: &str = "\
You are an email assistant. The user's emails are listed below as JSON.
Summarize them concisely, grouping related threads, and call out anything
that looks urgent or requires a reply.

Emails:
{{emails}}
";

/// Shared dependencies injected into every email tool handler.
#[derive(Clone)]
pub struct ToolDeps {
    /// Mail access boundary.
    pub mail: Arc<dyn MailClientFactory>,
    /// HTTP client used by the resource loader.
    pub http: reqwest::Client,
    /// Configured fallback instructions template.
    pub default_instructions: Option<String>,
}

fn credentials_from_meta(meta: &RequestMeta) -> Result<MailCredentials, MailError> {
    let require = |name: &str| {
        meta.get(name)
            .map(str::to_string)
            .ok_or_else(|| MailError::Credentials(format!("missing '{}' header", name)))
    };

    let client_type = require("email-client-type")?
        .parse()
        .map_err(MailError::Credentials)?;

    let port = match meta.get("email-port") {
        Some(raw) => Some(raw.parse::<u16>().map_err(|_| {
            MailError::Credentials(format!("'{}' is not a valid port number", raw))
        })?),
        None => None,
    };

    Ok(MailCredentials {
        username: require("email-username")?,
        password: require("email-password")?,
        client_type,
        port,
    })
}

fn parse_input<T: serde::de::DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::InvalidInput(e.to_string()))
}

fn status_failure(text: impl std::fmt::Display) -> CallToolResult {
    let message = text.to_string();
    CallToolResult {
        content: vec![crate::mcp::types::ContentBlock::Text {
            text: message.clone(),
        }],
        structured_content: serde_json::to_value(StatusOutput::failed(message)).ok(),
        is_error: Some(true),
    }
}

/// `fetch-emails` handler.
struct FetchEmailsHandler {
    deps: ToolDeps,
}

impl FetchEmailsHandler {
    async fn instructions_template(&self, meta: &RequestMeta) -> Result<String, String> {
        let source = meta
            .get("email-instructions")
            .map(str::to_string)
            .or_else(|| std::env::var("EMAIL_INSTRUCTIONS").ok())
            .or_else(|| self.deps.default_instructions.clone())
            .unwrap_or_else(|| FETCH_EMAILS_PROMPT.to_string());

        load_resource(&self.deps.http, &source)
            .await
            .map_err(|e| e.to_string())
    }
}

#[async_trait::async_trait]
impl ToolHandler for FetchEmailsHandler {
    async fn execute(&self, args: Value, meta: &RequestMeta) -> Result<CallToolResult, ToolError> {
        let input: FetchEmailsInput = parse_input(args)?;
        input.validate().map_err(ToolError::InvalidInput)?;

        let credentials = match credentials_from_meta(meta) {
            Ok(c) => c,
            Err(e) => return Ok(CallToolResult::error(e.to_string())),
        };

        let emails = match self.deps.mail.client_for(credentials).fetch(&input).await {
            Ok(emails) => emails,
            Err(e) => {
                tracing::warn!(error = %e, "fetch-emails failed");
                return Ok(CallToolResult::error(e.to_string()));
            }
        };

        let template = match self.instructions_template(meta).await {
            Ok(t) => t,
            Err(e) => return Ok(CallToolResult::error(e)),
        };

        let emails_json = if emails.is_empty() {
            "[]".to_string()
        } else {
            serde_json::to_string(&emails).unwrap_or_else(|_| "[]".to_string())
        };
        let rendered = template.replace("{{emails}}", &emails_json);

        let output = FetchEmailsOutput {
            emails: Some(emails),
            error: None,
        };
        Ok(CallToolResult::text(
            rendered,
            serde_json::to_value(output).ok(),
        ))
    }
}

/// `mark-emails-read` handler.
struct MarkEmailsReadHandler {
    deps: ToolDeps,
}

#[async_trait::async_trait]
impl ToolHandler for MarkEmailsReadHandler {
    async fn execute(&self, args: Value, meta: &RequestMeta) -> Result<CallToolResult, ToolError> {
        let input: MarkEmailsReadInput = parse_input(args)?;
        input.validate().map_err(ToolError::InvalidInput)?;

        let credentials = match credentials_from_meta(meta) {
            Ok(c) => c,
            Err(e) => return Ok(status_failure(e)),
        };

        match self.deps.mail.client_for(credentials).mark_read(&input).await {
            Ok(()) => Ok(CallToolResult::text(
                format!(
                    "Marked {} email(s) as read in {}",
                    input.ids.len(),
                    input.mailbox
                ),
                serde_json::to_value(StatusOutput::ok()).ok(),
            )),
            Err(e) => {
                tracing::warn!(error = %e, "mark-emails-read failed");
                Ok(status_failure(e))
            }
        }
    }
}

/// `send-email` handler.
struct SendEmailHandler {
    deps: ToolDeps,
}

#[async_trait::async_trait]
impl ToolHandler for SendEmailHandler {
    async fn execute(&self, args: Value, meta: &RequestMeta) -> Result<CallToolResult, ToolError> {
        let input: SendEmailInput = parse_input(args)?;
        input.validate().map_err(ToolError::InvalidInput)?;

        let credentials = match credentials_from_meta(meta) {
            Ok(c) => c,
            Err(e) => return Ok(status_failure(e)),
        };

        match self.deps.mail.client_for(credentials).send(&input).await {
            Ok(()) => Ok(CallToolResult::text(
                format!("Email sent to {}", input.to),
                serde_json::to_value(StatusOutput::ok()).ok(),
            )),
            Err(e) => {
                tracing::warn!(error = %e, "send-email failed");
                Ok(status_failure(e))
            }
        }
    }
}

fn status_output_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "success": { "type": "boolean" },
            "error": { "type": "string" }
        },
        "required": ["success"]
    })
}

/// Register the email tool set into `registry`.
pub fn register_email_tools(registry: &mut ToolRegistry, deps: ToolDeps) {
    // 1. fetch-emails - filtered inbox fetch with rendered instructions
    registry.register(Tool {
        name: "fetch-emails".to_string(),
        title: "Fetch Emails".to_string(),
        description: "Get emails from the user's inbox. Can specify the mailbox (INBOX by \
                      default), a subject (string), date range (ISO format: \
                      YYYY-MM-DDTHH:mm:ss), and sender emails (list of strings) to filter \
                      emails."
            .to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "mailbox": {
                    "type": "string",
                    "description": "Mailbox to fetch emails from",
                    "default": "INBOX"
                },
                "subject": {
                    "type": "string",
                    "description": "Optional subject to filter emails. Only sent if the user provides a subject to search EXPLICITLY!"
                },
                "dateRange": {
                    "type": "object",
                    "description": "Date range with \"start\" and \"end\" keys, ISO date time string format.",
                    "properties": {
                        "start": { "type": "string", "description": "Start date of the range" },
                        "end": { "type": "string", "description": "End date of the range" }
                    }
                },
                "senders": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Optional array of email addresses to filter emails by sender"
                }
            },
            "required": ["dateRange"]
        }),
        output_schema: Some(serde_json::json!({
            "type": "object",
            "properties": {
                "emails": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "integer" },
                            "subject": { "type": "string" },
                            "sender": { "type": "string" },
                            "snippet": { "type": "string" },
                            "date": { "type": "string" }
                        },
                        "required": ["id", "subject", "sender", "snippet"]
                    }
                },
                "error": { "type": "string" }
            }
        })),
        handler: Arc::new(FetchEmailsHandler { deps: deps.clone() }),
    });

    // 2. mark-emails-read - flag emails as seen
    registry.register(Tool {
        name: "mark-emails-read".to_string(),
        title: "Mark Emails As Read".to_string(),
        description: "Mark a list of emails as read by id.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "ids": {
                    "type": "array",
                    "items": { "type": "integer" },
                    "description": "Array of email IDs to mark as read"
                },
                "mailbox": {
                    "type": "string",
                    "description": "Mailbox to mark emails as read from",
                    "default": "INBOX"
                }
            },
            "required": ["ids"]
        }),
        output_schema: Some(status_output_schema()),
        handler: Arc::new(MarkEmailsReadHandler { deps: deps.clone() }),
    });

    // 3. send-email - compose and send
    registry.register(Tool {
        name: "send-email".to_string(),
        title: "Send Email".to_string(),
        description: "Send an email to a specified recipient with a subject and body content."
            .to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "to": { "type": "string", "description": "Recipient email address" },
                "subject": {
                    "type": "string",
                    "minLength": 2,
                    "maxLength": 100,
                    "description": "Email subject"
                },
                "body": {
                    "type": "string",
                    "minLength": 2,
                    "description": "Email body content"
                },
                "tone": { "type": "string", "description": "Tone of the email" }
            },
            "required": ["to", "subject", "body", "tone"]
        }),
        output_schema: Some(status_output_schema()),
        handler: Arc::new(SendEmailHandler { deps }),
    });

    tracing::info!(tools = registry.len(), "email tools registered");
}
