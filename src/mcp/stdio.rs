//! Stdio transport adapter.
//!
//! One engine, one implicit session: messages arrive line-delimited on
//! stdin, responses go line-delimited to stdout. Stdout carries protocol
//! traffic only; all diagnostics go through `tracing` (routed to a file in
//! stdio mode). Credentials come from the process environment because there
//! are no per-request headers on this transport.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::mcp::engine::Engine;
use crate::mcp::types::{JsonRpcError, JsonRpcId, JsonRpcMessage, JsonRpcResponse};
use crate::tools::RequestMeta;

fn protocol_error(code: i64, message: &str) -> JsonRpcResponse {
    JsonRpcResponse::err(
        JsonRpcId::Null,
        JsonRpcError {
            code,
            message: message.to_string(),
            data: None,
        },
    )
}

/// Run the line-delimited stdio loop until stdin reaches EOF. EOF is the
/// session-close signal on this transport.
pub async fn run_stdio(engine: Engine) -> anyhow::Result<()> {
    let meta = RequestMeta::from_env();
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut lines = stdin.lines();

    tracing::info!("stdio transport ready");

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<serde_json::Value>(line) {
            Err(_) => Some(protocol_error(-32700, "parse error")),
            Ok(value) if value.is_array() => {
                Some(protocol_error(-32600, "batching not supported"))
            }
            Ok(value) => match serde_json::from_value::<JsonRpcMessage>(value) {
                Ok(message) => engine.handle_message(message, &meta).await,
                Err(_) => Some(protocol_error(-32600, "invalid request")),
            },
        };

        if let Some(response) = response {
            let mut out = serde_json::to_vec(&response)?;
            out.push(b'\n');
            stdout.write_all(&out).await?;
            stdout.flush().await?;
        }
    }

    tracing::info!("stdin closed, shutting down");
    Ok(())
}
