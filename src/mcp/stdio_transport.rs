//! MCP stdio Transport Layer
//!
//! JSON-RPC messages are read from stdin and responses written to stdout.
//! Nothing else may write to stdout while the server runs; logging goes to stderr.

use super::SessionHelperMcpServer;
use rmcp::ServiceExt;

/// Start a stdio-based MCP Server.
///
/// Blocks until the MCP client disconnects (EOF on stdin).
///
/// # Returns
/// * `Ok(())` on clean shutdown
/// * `Err(String)` on initialization failure
pub async fn start_stdio_server(server: SessionHelperMcpServer) -> Result<(), String> {
    let (stdin, stdout) = rmcp::transport::io::stdio();

    // Handles the MCP initialization handshake, then tool calls until EOF
    let service = server
        .serve((stdin, stdout))
        .await
        .map_err(|e| format!("Failed to initialize MCP stdio server: {}", e))?;

    service
        .waiting()
        .await
        .map_err(|e| format!("MCP stdio server error: {}", e))?;

    Ok(())
}
