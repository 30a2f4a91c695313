//! MCP (Model Context Protocol) Server Module
//!
//! Exposes the checkpoint relay to an AI agent over stdio. The agent's MCP
//! client launches `session-helper serve` as a subprocess.
//!
//! ## Architecture
//!
//! ```text
//! session-helper process:
//! +-----------------------------------------------------+
//! |                                                     |
//! |  Agent --MCP stdio-->  mcp/server.rs                |
//! |                             |                       |
//! |                             v                       |
//! |                        Dispatcher ---POST /ask---> IDE peer
//! |                             |                       |    |
//! |                     CorrelationTable                |    |
//! |                             ^                       |    |
//! |  [listener thread]          |                       |    |
//! |  ipc/server.rs  <----POST /response-----------------+----+
//! +-----------------------------------------------------+
//! ```
//!
//! ## Available Tools
//!
//! - `io` - Ask the human and wait for the answer
//! - `pause` - Wait until the human clicks Continue
//! - `join` - Register a named agent identity
//! - `recall` - Look up previously registered identities

pub mod server;
pub mod standalone;
pub mod stdio_transport;

pub use server::SessionHelperMcpServer;
pub use standalone::run_mcp_server;

use crate::error::HistoryError;
use rmcp::ErrorData as McpError;

/// MCP error: history store unavailable or failing
pub fn history_error(err: HistoryError) -> McpError {
    match err {
        HistoryError::Disabled => McpError::invalid_request(
            "History store not enabled. \
            Set \"history_enabled\": true in the session-helper config and restart the server."
                .to_string(),
            None,
        ),
        other => McpError::internal_error(format!("History store error: {}", other), None),
    }
}

/// MCP error: invalid payload
pub fn invalid_payload(err: impl std::fmt::Display) -> McpError {
    McpError::invalid_params(
        format!(
            "Invalid payload: {}. Check the tool's parameter schema for required fields.",
            err
        ),
        None,
    )
}
