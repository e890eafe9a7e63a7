//! Email prompt definitions.

use std::collections::HashMap;
use std::sync::Arc;

use crate::mcp::types::{ContentBlock, GetPromptResult, PromptMessage};
use crate::prompts::{Prompt, PromptArgument, PromptError, PromptHandler, PromptRegistry};

/// Completion candidates for the `tone` argument.
pub const SEND_EMAIL_TONES: [&str; 4] = ["informal", "friendly", "professional", "casual"];

const SEND_EMAIL_TEMPLATE: &str = "
You are about to send an email with the following details:

Tone: {{tone}}
To: {{to}}
Subject: {{subject}}
Body: {{body}}
";

struct SendEmailPromptHandler;

#[async_trait::async_trait]
impl PromptHandler for SendEmailPromptHandler {
    async fn render(
        &self,
        args: &HashMap<String, String>,
    ) -> Result<GetPromptResult, PromptError> {
        let get = |name: &str| {
            args.get(name)
                .cloned()
                .ok_or_else(|| PromptError::MissingArgument(name.to_string()))
        };

        let text = SEND_EMAIL_TEMPLATE
            .replace("{{tone}}", &get("tone")?)
            .replace("{{to}}", &get("to")?)
            .replace("{{subject}}", &get("subject")?)
            .replace("{{body}}", &get("body")?);

        Ok(GetPromptResult {
            description: Some("Send email confirmation".to_string()),
            messages: vec![PromptMessage {
                role: "user".to_string(),
                content: ContentBlock::Text { text },
            }],
        })
    }
}

/// Register the email prompt set into `registry`.
pub fn register_email_prompts(registry: &mut PromptRegistry) {
    registry.register(Prompt {
        name: "send-email".to_string(),
        title: "Send email".to_string(),
        description: "Send an email to a specified recipient with a subject and body content."
            .to_string(),
        arguments: vec![
            PromptArgument {
                name: "to".to_string(),
                description: Some("Recipient email address".to_string()),
                required: true,
                completions: None,
            },
            PromptArgument {
                name: "subject".to_string(),
                description: Some("Email subject".to_string()),
                required: true,
                completions: None,
            },
            PromptArgument {
                name: "body".to_string(),
                description: Some("Email body content".to_string()),
                required: true,
                completions: None,
            },
            PromptArgument {
                name: "tone".to_string(),
                description: Some("Tone of the email".to_string()),
                required: true,
                completions: Some(SEND_EMAIL_TONES.iter().map(|t| t.to_string()).collect()),
            },
        ],
        handler: Arc::new(SendEmailPromptHandler),
    });

    tracing::info!("email prompts registered");
}
