//! Tool registry for MCP tools.

mod email;

pub use email::{register_email_tools, ToolDeps, FETCH_EMAILS_PROMPT};

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::mcp::types::{CallToolResult, ToolInfo};

/// Request-scoped metadata carried alongside every tool call: the credential
/// headers on HTTP, environment-derived values on stdio. Header names are
/// matched case-insensitively (stored lowercased).
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    headers: HashMap<String, String>,
}

impl RequestMeta {
    pub fn new(headers: HashMap<String, String>) -> Self {
        let headers = headers
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        Self { headers }
    }

    /// Metadata with no headers at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Stdio transport has no headers; credentials come from the process
    /// environment instead (`EMAIL_USERNAME` maps to `email-username`, etc.).
    pub fn from_env() -> Self {
        let mut headers = HashMap::new();
        for key in [
            "EMAIL_USERNAME",
            "EMAIL_PASSWORD",
            "EMAIL_CLIENT_TYPE",
            "EMAIL_PORT",
            "EMAIL_INSTRUCTIONS",
        ] {
            if let Ok(value) = std::env::var(key) {
                headers.insert(key.to_ascii_lowercase().replace('_', "-"), value);
            }
        }
        Self { headers }
    }

    /// Look up a header by case-insensitive name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Failures the dispatch layer turns into JSON-RPC errors. Business failures
/// never take this path; they surface as [`CallToolResult::error`].
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Arguments failed schema validation; reported before any side effect
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No tool registered under this name
    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

/// Handler for executing a tool
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync {
    /// Execute the tool with the given arguments and request metadata.
    async fn execute(&self, args: Value, meta: &RequestMeta) -> Result<CallToolResult, ToolError>;
}

/// An MCP tool that can be called by the client
#[derive(Clone)]
pub struct Tool {
    /// Tool name (e.g. "fetch-emails")
    pub name: String,

    /// Human-readable title
    pub title: String,

    /// Human-readable description
    pub description: String,

    /// JSON Schema for input parameters (advertisement metadata only)
    pub input_schema: Value,

    /// JSON Schema for the structured output, if any
    pub output_schema: Option<Value>,

    /// Handler function to execute the tool
    pub handler: Arc<dyn ToolHandler>,
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("title", &self.title)
            .field("description", &self.description)
            .finish()
    }
}

impl Tool {
    /// Wire descriptor for `tools/list`.
    pub fn info(&self) -> ToolInfo {
        ToolInfo {
            name: self.name.clone(),
            title: Some(self.title.clone()),
            description: Some(self.description.clone()),
            input_schema: self.input_schema.clone(),
            output_schema: self.output_schema.clone(),
        }
    }
}

/// Registry for all MCP tools. Populated once at startup and shared
/// (immutable) by every session's engine.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Tool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the full email tool set.
    pub fn with_email_tools(deps: ToolDeps) -> Self {
        let mut registry = Self::new();
        register_email_tools(&mut registry, deps);
        registry
    }

    /// Register a tool
    pub fn register(&mut self, tool: Tool) {
        self.tools.insert(tool.name.clone(), tool);
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    /// Wire descriptors for all tools, sorted by name.
    pub fn list(&self) -> Vec<ToolInfo> {
        let mut infos: Vec<ToolInfo> = self.tools.values().map(Tool::info).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool by name
    pub async fn execute(
        &self,
        name: &str,
        args: Value,
        meta: &RequestMeta,
    ) -> Result<CallToolResult, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        tool.handler.execute(args, meta).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_meta_is_case_insensitive() {
        let meta = RequestMeta::new(HashMap::from([(
            "Email-Username".to_string(),
            "user@example.com".to_string(),
        )]));
        assert_eq!(meta.get("email-username"), Some("user@example.com"));
        assert_eq!(meta.get("EMAIL-USERNAME"), Some("user@example.com"));
        assert_eq!(meta.get("email-password"), None);
    }

    #[tokio::test]
    async fn executing_unknown_tool_fails() {
        let registry = ToolRegistry::new();
        let err = registry
            .execute("nope", serde_json::json!({}), &RequestMeta::empty())
            .await
            .expect_err("must fail");
        assert!(matches!(err, ToolError::UnknownTool(_)));
    }
}
