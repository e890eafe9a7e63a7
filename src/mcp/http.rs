//! Streamable HTTP transport adapter.
//!
//! Routes:
//! - `POST /mcp`   — call-or-initialize. Classified per session header and
//!   payload; a rejected call gets the fixed `-32000` envelope with a `null`
//!   correlation id and HTTP 400.
//! - `GET /mcp`    — server-push SSE stream, requires a live session.
//! - `DELETE /mcp` — explicit session close, requires a live session.
//!
//! Cross-origin policy: any origin is accepted, but the session header and
//! the mailbox credential headers must be explicitly allowed on requests and
//! the session header exposed on responses.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context as _;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::mcp::engine::EngineFactory;
use crate::mcp::session::{classify, RouteDecision, SessionRegistry};
use crate::mcp::types::{JsonRpcError, JsonRpcId, JsonRpcMessage, JsonRpcResponse};
use crate::tools::RequestMeta;

/// Session identifier header, case-insensitive on requests.
pub const SESSION_ID_HEADER: &str = "mcp-session-id";

/// Credential headers the router passes through to the handler layer. The
/// router never reads them; it only declares them for CORS.
const CREDENTIAL_HEADERS: [&str; 5] = [
    "email-username",
    "email-password",
    "email-port",
    "email-client-type",
    "email-instructions",
];

/// Shared state of the HTTP adapter.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub engines: EngineFactory,
}

/// Build the `/mcp` router.
pub fn router(state: AppState) -> Router {
    let mut allow_headers: Vec<HeaderName> =
        vec![header::CONTENT_TYPE, HeaderName::from_static(SESSION_ID_HEADER)];
    for name in CREDENTIAL_HEADERS {
        allow_headers.push(HeaderName::from_static(name));
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(allow_headers)
        .expose_headers([HeaderName::from_static(SESSION_ID_HEADER)]);

    Router::new()
        .route("/mcp", post(http_post).get(http_get).delete(http_delete))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process ends. A bind failure is fatal.
pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    tracing::info!(addr = %addr, "MCP server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|h| h.to_str().ok())
}

fn request_meta(headers: &HeaderMap) -> RequestMeta {
    let mut map = HashMap::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            map.insert(name.as_str().to_string(), value.to_string());
        }
    }
    RequestMeta::new(map)
}

/// The fixed routing-rejection envelope: correlation id is `null` because no
/// session could be attributed.
fn bad_request_envelope() -> Response {
    let body = JsonRpcResponse::err(
        JsonRpcId::Null,
        JsonRpcError {
            code: -32000,
            message: "Bad Request: No valid session ID provided".to_string(),
            data: None,
        },
    );
    jsonrpc_response(StatusCode::BAD_REQUEST, &body, None)
}

fn protocol_error(code: i64, message: &str, detail: Option<String>) -> Response {
    let body = JsonRpcResponse::err(
        JsonRpcId::Null,
        JsonRpcError {
            code,
            message: message.to_string(),
            data: detail.map(|d| serde_json::json!({ "detail": d })),
        },
    );
    jsonrpc_response(StatusCode::BAD_REQUEST, &body, None)
}

/// 202 for notifications, echoing the session header like the OK path.
fn accepted(session_id: Option<&str>) -> Response {
    let mut builder = Response::builder().status(StatusCode::ACCEPTED);
    if let Some(sid) = session_id {
        if let Ok(value) = HeaderValue::from_str(sid) {
            builder = builder.header(SESSION_ID_HEADER, value);
        }
    }
    builder
        .body(Body::empty())
        .unwrap_or_else(|_| StatusCode::ACCEPTED.into_response())
}

fn jsonrpc_response(
    status: StatusCode,
    response: &JsonRpcResponse,
    session_id: Option<&str>,
) -> Response {
    let body = serde_json::to_string(response).unwrap_or_else(|_| "{}".to_string());
    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json");

    if let Some(sid) = session_id {
        if let Ok(value) = HeaderValue::from_str(sid) {
            builder = builder.header(SESSION_ID_HEADER, value);
        }
    }

    builder
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

async fn http_post(State(st): State<AppState>, headers: HeaderMap, body: String) -> Response {
    let value: serde_json::Value = match serde_json::from_str(&body) {
        Ok(v) => v,
        Err(e) => return protocol_error(-32700, "parse error", Some(e.to_string())),
    };

    if value.is_array() {
        return protocol_error(-32600, "batching not supported", None);
    }

    let message: JsonRpcMessage = match serde_json::from_value(value) {
        Ok(m) => m,
        Err(e) => return protocol_error(-32600, "invalid request", Some(e.to_string())),
    };

    let meta = request_meta(&headers);
    let session_id = header_str(&headers, SESSION_ID_HEADER);

    match classify(session_id, &message, &st.registry) {
        RouteDecision::Reject => bad_request_envelope(),
        RouteDecision::Initialize => {
            // The engine answers the initialize first; a session record and
            // its id only exist once the handshake is accepted, so a
            // malformed initialize never occupies the registry.
            let engine = st.engines.build();
            match engine.handle_message(message, &meta).await {
                Some(r) if r.error.is_none() => {
                    let handle = st.registry.create(engine);
                    jsonrpc_response(StatusCode::OK, &r, Some(handle.id()))
                }
                Some(r) => jsonrpc_response(StatusCode::OK, &r, None),
                None => accepted(None),
            }
        }
        RouteDecision::Continue(id) => {
            // A concurrent DELETE may win the race between classification and
            // dispatch; a lookup miss here is answered like a rejection.
            let Some(handle) = st.registry.lookup(&id) else {
                return bad_request_envelope();
            };
            match handle.engine().handle_message(message, &meta).await {
                Some(r) => jsonrpc_response(StatusCode::OK, &r, Some(handle.id())),
                None => accepted(Some(handle.id())),
            }
        }
    }
}

async fn http_get(State(st): State<AppState>, headers: HeaderMap) -> Response {
    let Some(handle) = header_str(&headers, SESSION_ID_HEADER).and_then(|id| st.registry.lookup(id))
    else {
        return (StatusCode::BAD_REQUEST, "Invalid or missing session ID").into_response();
    };

    let Some(mut push) = handle.take_push_stream() else {
        return (StatusCode::CONFLICT, "Stream already open for this session").into_response();
    };

    // When the client disconnects the body is dropped, which hands the
    // receiver back to the session so a later GET can re-attach.
    let stream = async_stream::stream! {
        while let Some(message) = push.recv().await {
            let data = serde_json::to_string(&message).unwrap_or_else(|_| "{}".to_string());
            yield Ok::<Event, Infallible>(Event::default().event("message").data(data));
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

async fn http_delete(State(st): State<AppState>, headers: HeaderMap) -> Response {
    let Some(id) = header_str(&headers, SESSION_ID_HEADER) else {
        return (StatusCode::BAD_REQUEST, "Invalid or missing session ID").into_response();
    };

    if !st.registry.contains(id) {
        return (StatusCode::BAD_REQUEST, "Invalid or missing session ID").into_response();
    }

    st.registry.remove(id);
    StatusCode::OK.into_response()
}
