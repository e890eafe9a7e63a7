//! # Mailgate
//!
//! A Model Context Protocol (MCP) gateway that exposes mailbox tools and
//! prompts over two transports: a single-session stdio channel and a
//! multi-session streamable HTTP channel.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`]: Typed tool inputs/outputs and mail credentials
//! - [`mail`]: Mail access boundary (trait + bridge client + mock)
//! - [`mcp`]: JSON-RPC engine, session registry, and transport adapters
//! - [`tools`]: Tool registry and the email tool handlers
//! - [`prompts`]: Prompt registry and the email prompt
//! - [`utils`]: Resource loader and other helpers
//! - [`config`]: Configuration management

pub mod config;
pub mod mail;
pub mod mcp;
pub mod models;
pub mod prompts;
pub mod tools;
pub mod utils;

// Re-export commonly used types
pub use mcp::{Engine, EngineFactory, SessionRegistry};
pub use tools::{RequestMeta, ToolRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
