//! Prompt registry for MCP prompts.

mod email;

pub use email::{register_email_prompts, SEND_EMAIL_TONES};

use std::collections::HashMap;
use std::sync::Arc;

use crate::mcp::types::{GetPromptResult, PromptArgumentInfo, PromptInfo};

/// Failures from rendering a prompt.
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("unknown prompt: {0}")]
    UnknownPrompt(String),

    #[error("missing required argument: {0}")]
    MissingArgument(String),
}

/// Handler that renders a prompt from its arguments.
#[async_trait::async_trait]
pub trait PromptHandler: Send + Sync {
    async fn render(&self, args: &HashMap<String, String>)
        -> Result<GetPromptResult, PromptError>;
}

/// Declared argument of a prompt: descriptive metadata plus optional
/// completion candidates served through `completion/complete`.
#[derive(Clone)]
pub struct PromptArgument {
    pub name: String,
    pub description: Option<String>,
    pub required: bool,
    pub completions: Option<Vec<String>>,
}

impl PromptArgument {
    fn info(&self) -> PromptArgumentInfo {
        PromptArgumentInfo {
            name: self.name.clone(),
            description: self.description.clone(),
            required: Some(self.required),
        }
    }
}

/// An MCP prompt that can be rendered for the client.
#[derive(Clone)]
pub struct Prompt {
    pub name: String,
    pub title: String,
    pub description: String,
    pub arguments: Vec<PromptArgument>,
    pub handler: Arc<dyn PromptHandler>,
}

impl std::fmt::Debug for Prompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prompt")
            .field("name", &self.name)
            .field("title", &self.title)
            .finish()
    }
}

impl Prompt {
    pub fn info(&self) -> PromptInfo {
        PromptInfo {
            name: self.name.clone(),
            title: Some(self.title.clone()),
            description: Some(self.description.clone()),
            arguments: self.arguments.iter().map(PromptArgument::info).collect(),
        }
    }
}

/// Registry for all MCP prompts; identical for every session.
#[derive(Debug, Clone, Default)]
pub struct PromptRegistry {
    prompts: HashMap<String, Prompt>,
}

impl PromptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the email prompt set.
    pub fn with_email_prompts() -> Self {
        let mut registry = Self::new();
        register_email_prompts(&mut registry);
        registry
    }

    pub fn register(&mut self, prompt: Prompt) {
        self.prompts.insert(prompt.name.clone(), prompt);
    }

    pub fn get(&self, name: &str) -> Option<&Prompt> {
        self.prompts.get(name)
    }

    /// Wire descriptors for all prompts, sorted by name.
    pub fn list(&self) -> Vec<PromptInfo> {
        let mut infos: Vec<PromptInfo> = self.prompts.values().map(Prompt::info).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Render a prompt by name.
    pub async fn render(
        &self,
        name: &str,
        args: &HashMap<String, String>,
    ) -> Result<GetPromptResult, PromptError> {
        let prompt = self
            .get(name)
            .ok_or_else(|| PromptError::UnknownPrompt(name.to_string()))?;

        for arg in &prompt.arguments {
            if arg.required && !args.contains_key(&arg.name) {
                return Err(PromptError::MissingArgument(arg.name.clone()));
            }
        }

        prompt.handler.render(args).await
    }

    /// Completion candidates for `argument` of `prompt`, filtered by prefix.
    /// `None` when the prompt or argument declares no completions.
    pub fn complete(&self, prompt: &str, argument: &str, prefix: &str) -> Option<Vec<String>> {
        let prompt = self.get(prompt)?;
        let arg = prompt.arguments.iter().find(|a| a.name == argument)?;
        let candidates = arg.completions.as_ref()?;
        Some(
            candidates
                .iter()
                .filter(|c| c.starts_with(prefix))
                .cloned()
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_required_argument_is_rejected() {
        let registry = PromptRegistry::with_email_prompts();
        let err = registry
            .render("send-email", &HashMap::new())
            .await
            .expect_err("must fail");
        assert!(matches!(err, PromptError::MissingArgument(_)));
    }

    #[test]
    fn completion_filters_by_prefix() {
        let registry = PromptRegistry::with_email_prompts();
        let values = registry
            .complete("send-email", "tone", "pro")
            .expect("completions declared");
        assert_eq!(values, vec!["professional".to_string()]);

        let all = registry
            .complete("send-email", "tone", "")
            .expect("completions declared");
        assert_eq!(all.len(), 4);

        assert!(registry.complete("send-email", "subject", "x").is_none());
        assert!(registry.complete("nope", "tone", "x").is_none());
    }
}
