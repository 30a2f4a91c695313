//! Standalone MCP Server Entry Point
//!
//! Provides the `session-helper serve` command. An agent's MCP client is
//! configured to launch it as a subprocess:
//! ```json
//! {
//!   "mcpServers": {
//!     "session-helper": {
//!       "command": "session-helper",
//!       "args": ["serve"]
//!     }
//!   }
//! }
//! ```

use crate::config::Config;
use crate::history::{HistoryRecorder, SqliteHistoryStore};
use crate::ipc::{start_listener, ListenerState};
use crate::mcp::stdio_transport::start_stdio_server;
use crate::mcp::SessionHelperMcpServer;
use crate::relay::{CorrelationTable, Dispatcher};
use std::sync::Arc;

/// Run the MCP server until the client disconnects.
///
/// 1. Opens the history store (a failure only disables history)
/// 2. Starts the callback listener on its own thread
/// 3. Serves MCP over stdio
/// 4. Stops the listener
pub async fn run_mcp_server(config: Config) -> Result<(), String> {
    log::info!("Session helper MCP server starting");

    let history = open_history(&config).await;
    let table = CorrelationTable::new();

    let listener = start_listener(
        ListenerState {
            table: table.clone(),
            history: history.clone(),
        },
        config.callback_port_start,
        config.callback_port_attempts,
    )
    .await?;
    log::info!("Callback port: {}", listener.port());

    let dispatcher = Dispatcher::from_config(&config, table, history, listener.port());
    let result = start_stdio_server(SessionHelperMcpServer::new(dispatcher)).await;

    log::info!("MCP server shutting down...");
    listener.shutdown();
    result
}

/// Open the configured history store, or run without one.
pub async fn open_history(config: &Config) -> HistoryRecorder {
    if !config.history_enabled {
        log::info!("History store disabled by configuration");
        return HistoryRecorder::disabled();
    }

    let path = config.history_db.to_string_lossy();
    match SqliteHistoryStore::open(&path).await {
        Ok(store) => {
            log::info!("History store: {}", path);
            HistoryRecorder::new(Arc::new(store))
        }
        Err(e) => {
            log::warn!("Failed to open history store {}: {}. Running without history.", path, e);
            HistoryRecorder::disabled()
        }
    }
}
