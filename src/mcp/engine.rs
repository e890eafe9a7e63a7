//! Protocol engine: per-session JSON-RPC state machine and method dispatch.
//!
//! One [`Engine`] exists per session and is the unit of isolation: no state
//! is shared between two sessions' engines beyond the immutable tool and
//! prompt registries. The engine is callable through `&self` so pipelined
//! requests on one session do not panic; it does not order them (the protocol
//! is request/response per session, concurrent pipelining is a documented
//! client-side constraint).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::mcp::types::{
    CompleteParams, CompleteResult, CompletionValues, GetPromptParams, InitializeParams,
    InitializeResult, JsonRpcError, JsonRpcId, JsonRpcMessage, JsonRpcNotification,
    JsonRpcRequest, JsonRpcResponse, ListPromptsResult, ListToolsResult, McpServerInfo,
    PROTOCOL_VERSION_2025_03_26, PROTOCOL_VERSION_LATEST,
};
use crate::prompts::{PromptError, PromptRegistry};
use crate::tools::{RequestMeta, ToolError, ToolRegistry};

/// Static engine configuration, identical for every session.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub server_info: McpServerInfo,
    pub instructions: Option<String>,
    pub capabilities: Value,
    pub supported_protocol_versions: Vec<String>,
}

impl EngineConfig {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            server_info: McpServerInfo {
                name: name.to_string(),
                version: version.to_string(),
            },
            instructions: None,
            capabilities: serde_json::json!({
                "tools": { "listChanged": false },
                "prompts": { "listChanged": false },
                "completions": {}
            }),
            supported_protocol_versions: vec![
                PROTOCOL_VERSION_LATEST.to_string(),
                PROTOCOL_VERSION_2025_03_26.to_string(),
            ],
        }
    }

    fn negotiate_protocol(&self, requested: &str) -> String {
        if self
            .supported_protocol_versions
            .iter()
            .any(|v| v == requested)
        {
            requested.to_string()
        } else {
            PROTOCOL_VERSION_LATEST.to_string()
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
    }
}

/// Lifecycle position of one session. Requests are served from
/// `InitResponded` onward; the `initialized` notification is tracked but is
/// not a gate, matching clients that fire their first call right after the
/// initialize response.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum EngineState {
    New,
    InitResponded,
    Ready,
}

/// Builds identically configured engines, one per session.
#[derive(Clone)]
pub struct EngineFactory {
    cfg: EngineConfig,
    tools: Arc<ToolRegistry>,
    prompts: Arc<PromptRegistry>,
}

impl EngineFactory {
    pub fn new(cfg: EngineConfig, tools: Arc<ToolRegistry>, prompts: Arc<PromptRegistry>) -> Self {
        Self {
            cfg,
            tools,
            prompts,
        }
    }

    pub fn build(&self) -> Engine {
        Engine::new(self.cfg.clone(), self.tools.clone(), self.prompts.clone())
    }
}

/// MCP protocol engine for one session: lifecycle enforcement + method
/// routing into the handler registries.
pub struct Engine {
    cfg: EngineConfig,
    tools: Arc<ToolRegistry>,
    prompts: Arc<PromptRegistry>,
    state: Mutex<EngineState>,
}

impl Engine {
    pub fn new(cfg: EngineConfig, tools: Arc<ToolRegistry>, prompts: Arc<PromptRegistry>) -> Self {
        Self {
            cfg,
            tools,
            prompts,
            state: Mutex::new(EngineState::New),
        }
    }

    fn state(&self) -> EngineState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Handle a single JSON-RPC message.
    ///
    /// Returns `Some(response)` for requests, `None` for notifications or
    /// ignored messages.
    pub async fn handle_message(
        &self,
        msg: JsonRpcMessage,
        meta: &RequestMeta,
    ) -> Option<JsonRpcResponse> {
        match msg {
            JsonRpcMessage::Request(req) => Some(self.handle_request(req, meta).await),
            JsonRpcMessage::Notification(n) => {
                self.handle_notification(n);
                None
            }
            JsonRpcMessage::Response(_) => None,
        }
    }

    fn invalid_request(id: JsonRpcId, message: impl Into<String>) -> JsonRpcResponse {
        JsonRpcResponse::err(
            id,
            JsonRpcError {
                code: -32600,
                message: message.into(),
                data: None,
            },
        )
    }

    fn method_not_found(id: JsonRpcId) -> JsonRpcResponse {
        JsonRpcResponse::err(
            id,
            JsonRpcError {
                code: -32601,
                message: "method not found".to_string(),
                data: None,
            },
        )
    }

    fn invalid_params(id: JsonRpcId, detail: String) -> JsonRpcResponse {
        JsonRpcResponse::err(
            id,
            JsonRpcError {
                code: -32602,
                message: "invalid params".to_string(),
                data: Some(serde_json::json!({ "detail": detail })),
            },
        )
    }

    fn internal_error(id: JsonRpcId, detail: String) -> JsonRpcResponse {
        JsonRpcResponse::err(
            id,
            JsonRpcError {
                code: -32603,
                message: "internal error".to_string(),
                data: Some(serde_json::json!({ "detail": detail })),
            },
        )
    }

    fn not_initialized(id: JsonRpcId) -> JsonRpcResponse {
        JsonRpcResponse::err(
            id,
            JsonRpcError {
                code: -32002,
                message: "not initialized".to_string(),
                data: None,
            },
        )
    }

    async fn handle_request(&self, req: JsonRpcRequest, meta: &RequestMeta) -> JsonRpcResponse {
        if req.jsonrpc != "2.0" {
            return Self::invalid_request(req.id, "invalid jsonrpc version");
        }

        match req.method.as_str() {
            "initialize" => self.handle_initialize(req),
            "ping" => JsonRpcResponse::ok(req.id, serde_json::json!({})),
            "tools/list" => {
                if self.state() == EngineState::New {
                    return Self::not_initialized(req.id);
                }
                let result = ListToolsResult {
                    tools: self.tools.list(),
                    next_cursor: None,
                };
                JsonRpcResponse::ok(req.id, serde_json::to_value(result).unwrap_or(Value::Null))
            }
            "tools/call" => self.handle_tools_call(req, meta).await,
            "prompts/list" => {
                if self.state() == EngineState::New {
                    return Self::not_initialized(req.id);
                }
                let result = ListPromptsResult {
                    prompts: self.prompts.list(),
                };
                JsonRpcResponse::ok(req.id, serde_json::to_value(result).unwrap_or(Value::Null))
            }
            "prompts/get" => self.handle_prompts_get(req).await,
            "completion/complete" => self.handle_complete(req),
            _ => Self::method_not_found(req.id),
        }
    }

    fn handle_initialize(&self, req: JsonRpcRequest) -> JsonRpcResponse {
        let Some(params) = req.params else {
            return Self::invalid_params(req.id, "missing params".to_string());
        };

        let init: InitializeParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return Self::invalid_params(req.id, e.to_string()),
        };

        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if *state != EngineState::New {
                return Self::invalid_request(req.id, "already initialized");
            }
            *state = EngineState::InitResponded;
        }

        let negotiated = self.cfg.negotiate_protocol(&init.protocol_version);
        tracing::debug!(
            client = %init.client_info.name,
            protocol = %negotiated,
            "session initialized"
        );

        let result = InitializeResult {
            protocol_version: negotiated,
            capabilities: self.cfg.capabilities.clone(),
            server_info: self.cfg.server_info.clone(),
            instructions: self.cfg.instructions.clone(),
        };

        JsonRpcResponse::ok(req.id, serde_json::to_value(result).unwrap_or(Value::Null))
    }

    async fn handle_tools_call(&self, req: JsonRpcRequest, meta: &RequestMeta) -> JsonRpcResponse {
        if self.state() == EngineState::New {
            return Self::not_initialized(req.id);
        }
        let Some(params) = req.params else {
            return Self::invalid_params(req.id, "missing params".to_string());
        };
        let call: crate::mcp::types::CallToolParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return Self::invalid_params(req.id, e.to_string()),
        };

        let args = call.arguments.unwrap_or_else(|| serde_json::json!({}));
        match self.tools.execute(&call.name, args, meta).await {
            Ok(result) => {
                JsonRpcResponse::ok(req.id, serde_json::to_value(result).unwrap_or(Value::Null))
            }
            Err(e @ ToolError::InvalidInput(_)) => Self::invalid_params(req.id, e.to_string()),
            Err(e @ ToolError::UnknownTool(_)) => Self::invalid_params(req.id, e.to_string()),
        }
    }

    async fn handle_prompts_get(&self, req: JsonRpcRequest) -> JsonRpcResponse {
        if self.state() == EngineState::New {
            return Self::not_initialized(req.id);
        }
        let Some(params) = req.params else {
            return Self::invalid_params(req.id, "missing params".to_string());
        };
        let get: GetPromptParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return Self::invalid_params(req.id, e.to_string()),
        };

        match self.prompts.render(&get.name, &get.arguments).await {
            Ok(result) => {
                JsonRpcResponse::ok(req.id, serde_json::to_value(result).unwrap_or(Value::Null))
            }
            Err(e @ PromptError::UnknownPrompt(_)) => Self::invalid_params(req.id, e.to_string()),
            Err(e @ PromptError::MissingArgument(_)) => {
                Self::invalid_params(req.id, e.to_string())
            }
        }
    }

    fn handle_complete(&self, req: JsonRpcRequest) -> JsonRpcResponse {
        if self.state() == EngineState::New {
            return Self::not_initialized(req.id);
        }
        let Some(params) = req.params else {
            return Self::invalid_params(req.id, "missing params".to_string());
        };
        let complete: CompleteParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return Self::invalid_params(req.id, e.to_string()),
        };

        let values = if complete.reference.ref_type == "ref/prompt" {
            self.prompts
                .complete(
                    &complete.reference.name,
                    &complete.argument.name,
                    &complete.argument.value,
                )
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        let result = CompleteResult {
            completion: CompletionValues {
                total: Some(values.len()),
                has_more: Some(false),
                values,
            },
        };
        JsonRpcResponse::ok(req.id, serde_json::to_value(result).unwrap_or(Value::Null))
    }

    fn handle_notification(&self, n: JsonRpcNotification) {
        if n.jsonrpc != "2.0" {
            return;
        }

        if n.method.as_str() == "notifications/initialized" {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if *state == EngineState::InitResponded {
                *state = EngineState::Ready;
            }
        }
    }
}

/// True when the message is a session-establishing `initialize` request.
pub fn is_initialize_message(msg: &JsonRpcMessage) -> bool {
    matches!(msg, JsonRpcMessage::Request(r) if r.method == "initialize")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::mail::mock::MockMailClient;
    use crate::tools::ToolDeps;

    pub(crate) fn test_engine() -> (Arc<MockMailClient>, Engine) {
        let mock = Arc::new(MockMailClient::new());
        let deps = ToolDeps {
            mail: Arc::new(mock.clone()),
            http: reqwest::Client::new(),
            default_instructions: None,
        };
        let factory = EngineFactory::new(
            EngineConfig::new("test", "0.0.0"),
            Arc::new(ToolRegistry::with_email_tools(deps)),
            Arc::new(PromptRegistry::with_email_prompts()),
        );
        (mock, factory.build())
    }

    pub(crate) fn init_request(id: i64) -> JsonRpcMessage {
        JsonRpcMessage::Request(JsonRpcRequest::new(
            JsonRpcId::Number(id),
            "initialize",
            Some(serde_json::json!({
                "protocolVersion": PROTOCOL_VERSION_LATEST,
                "capabilities": {},
                "clientInfo": { "name": "client", "version": "0.0.0" }
            })),
        ))
    }

    pub(crate) async fn make_ready(engine: &Engine) {
        let meta = RequestMeta::empty();
        let resp = engine
            .handle_message(init_request(1), &meta)
            .await
            .expect("response");
        assert!(resp.error.is_none());
        engine
            .handle_message(
                JsonRpcMessage::Notification(JsonRpcNotification::new(
                    "notifications/initialized",
                    None,
                )),
                &meta,
            )
            .await;
    }

    #[tokio::test]
    async fn lifecycle_requires_initialize_before_requests() {
        let (_, engine) = test_engine();
        let meta = RequestMeta::empty();

        // tools/list before initialize -> not initialized
        let req = JsonRpcMessage::Request(JsonRpcRequest::new(
            JsonRpcId::Number(1),
            "tools/list",
            None,
        ));
        let resp = engine
            .handle_message(req.clone(), &meta)
            .await
            .expect("response");
        assert_eq!(resp.error.as_ref().map(|e| e.code), Some(-32002));

        // ping allowed in any state
        let ping = JsonRpcMessage::Request(JsonRpcRequest::new(JsonRpcId::Number(2), "ping", None));
        let resp = engine.handle_message(ping, &meta).await.expect("response");
        assert!(resp.error.is_none());

        // initialize
        let resp = engine
            .handle_message(init_request(3), &meta)
            .await
            .expect("response");
        assert!(resp.error.is_none());

        // tools/list works right after the initialize response, without
        // waiting for the initialized notification
        let resp = engine
            .handle_message(req.clone(), &meta)
            .await
            .expect("response");
        assert!(resp.error.is_none());
        let result = resp.result.expect("result");
        let names: Vec<&str> = result["tools"]
            .as_array()
            .expect("tools array")
            .iter()
            .filter_map(|t| t["name"].as_str())
            .collect();
        assert_eq!(names, vec!["fetch-emails", "mark-emails-read", "send-email"]);

        // the notification is still accepted and does not disturb anything
        engine
            .handle_message(
                JsonRpcMessage::Notification(JsonRpcNotification::new(
                    "notifications/initialized",
                    None,
                )),
                &meta,
            )
            .await;
        let resp = engine.handle_message(req, &meta).await.expect("response");
        assert!(resp.error.is_none());
    }

    #[tokio::test]
    async fn tool_call_is_served_right_after_initialize() {
        let (mock, engine) = test_engine();
        mock.set_emails(vec![crate::mail::mock::make_email(
            1,
            "Build green",
            "ci@example.com",
        )]);
        let meta = RequestMeta::new(std::collections::HashMap::from([
            ("email-username".to_string(), "user@example.com".to_string()),
            ("email-password".to_string(), "hunter22".to_string()),
            ("email-client-type".to_string(), "gmail".to_string()),
        ]));

        engine
            .handle_message(init_request(1), &RequestMeta::empty())
            .await
            .expect("response");

        // no initialized notification in between
        let req = JsonRpcMessage::Request(JsonRpcRequest::new(
            JsonRpcId::Number(2),
            "tools/call",
            Some(serde_json::json!({
                "name": "fetch-emails",
                "arguments": { "dateRange": {} }
            })),
        ));
        let resp = engine.handle_message(req, &meta).await.expect("response");
        assert!(resp.error.is_none(), "unexpected: {:?}", resp.error);
        let result = resp.result.expect("result");
        let text = result["content"][0]["text"].as_str().expect("text");
        assert!(text.contains("Build green"));
        assert_eq!(mock.fetch_calls(), 1);
    }

    #[tokio::test]
    async fn second_initialize_is_rejected() {
        let (_, engine) = test_engine();
        let meta = RequestMeta::empty();
        engine
            .handle_message(init_request(1), &meta)
            .await
            .expect("response");
        let resp = engine
            .handle_message(init_request(2), &meta)
            .await
            .expect("response");
        assert_eq!(resp.error.as_ref().map(|e| e.code), Some(-32600));
    }

    #[tokio::test]
    async fn unknown_method_is_error() {
        let (_, engine) = test_engine();
        let req =
            JsonRpcMessage::Request(JsonRpcRequest::new(JsonRpcId::Number(1), "nope", None));
        let resp = engine
            .handle_message(req, &RequestMeta::empty())
            .await
            .expect("response");
        assert_eq!(resp.error.as_ref().map(|e| e.code), Some(-32601));
    }

    #[tokio::test]
    async fn unsupported_protocol_falls_back_to_latest() {
        let (_, engine) = test_engine();
        let req = JsonRpcMessage::Request(JsonRpcRequest::new(
            JsonRpcId::Number(1),
            "initialize",
            Some(serde_json::json!({
                "protocolVersion": "1999-01-01",
                "capabilities": {},
                "clientInfo": { "name": "client", "version": "0.0.0" }
            })),
        ));
        let resp = engine
            .handle_message(req, &RequestMeta::empty())
            .await
            .expect("response");
        let result = resp.result.expect("result");
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION_LATEST);
    }

    #[tokio::test]
    async fn tools_call_validation_error_is_invalid_params() {
        let (mock, engine) = test_engine();
        make_ready(&engine).await;

        let req = JsonRpcMessage::Request(JsonRpcRequest::new(
            JsonRpcId::Number(4),
            "tools/call",
            Some(serde_json::json!({
                "name": "send-email",
                "arguments": {
                    "to": "user@example.com",
                    "subject": "x",
                    "body": "hello",
                    "tone": "friendly"
                }
            })),
        ));
        let resp = engine
            .handle_message(req, &RequestMeta::empty())
            .await
            .expect("response");
        assert_eq!(resp.error.as_ref().map(|e| e.code), Some(-32602));
        assert_eq!(mock.send_calls(), 0);
    }

    #[tokio::test]
    async fn prompt_get_and_completion_flow() {
        let (_, engine) = test_engine();
        make_ready(&engine).await;
        let meta = RequestMeta::empty();

        let req = JsonRpcMessage::Request(JsonRpcRequest::new(
            JsonRpcId::Number(5),
            "prompts/get",
            Some(serde_json::json!({
                "name": "send-email",
                "arguments": {
                    "to": "user@example.com",
                    "subject": "Hello",
                    "body": "How are you?",
                    "tone": "casual"
                }
            })),
        ));
        let resp = engine.handle_message(req, &meta).await.expect("response");
        assert!(resp.error.is_none());

        let req = JsonRpcMessage::Request(JsonRpcRequest::new(
            JsonRpcId::Number(6),
            "completion/complete",
            Some(serde_json::json!({
                "ref": { "type": "ref/prompt", "name": "send-email" },
                "argument": { "name": "tone", "value": "c" }
            })),
        ));
        let resp = engine.handle_message(req, &meta).await.expect("response");
        let result = resp.result.expect("result");
        assert_eq!(result["completion"]["values"], serde_json::json!(["casual"]));
    }
}
