//! MCP protocol core: wire types, the per-session engine, the session
//! registry, and the two transport adapters (stdio and streamable HTTP).

pub mod engine;
pub mod http;
pub mod session;
pub mod stdio;
pub mod types;

pub use engine::{is_initialize_message, Engine, EngineConfig, EngineFactory};
pub use http::{router, serve, AppState, SESSION_ID_HEADER};
pub use session::{classify, PushStream, RouteDecision, SessionHandle, SessionRegistry};
pub use stdio::run_stdio;
