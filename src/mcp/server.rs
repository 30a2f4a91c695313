//! MCP Server Implementation
//!
//! Uses rmcp's macro system for tool definitions. `io` and `pause` go through
//! the [`Dispatcher`]; `join` and `recall` go to the history store.

use crate::error::CheckpointError;
use crate::mcp;
use crate::models::{AgentIdentity, AgentRegistration, Segment};
use crate::relay::{DispatchRequest, Dispatcher};
use crate::utils::time;
use rmcp::{
    handler::server::{router::tool::ToolRouter, tool::Parameters},
    model::{CallToolResult, Content, Implementation, ServerCapabilities, ServerInfo, ToolsCapability},
    tool, tool_handler, tool_router, ErrorData as McpError,
};
use schemars::JsonSchema;
use serde::Deserialize;
use std::future::Future;

/// Reason used when the agent sends an empty one
const DEFAULT_REASON: &str = "Task completed";

/// Session helper MCP server
///
/// One instance per MCP connection; clones share the dispatcher (and with it
/// the correlation table and history store).
#[derive(Clone)]
pub struct SessionHelperMcpServer {
    dispatcher: Dispatcher,
    tool_router: ToolRouter<Self>,
}

// ============================================================================
// Tool Input Structures
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct IoInput {
    /// Summary of the work done and what you need from the user
    pub reason: String,
    /// Quick-reply options shown as buttons
    #[serde(default)]
    pub options: Option<Vec<String>>,
    /// Conversation id grouping related requests
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PauseInput {
    /// Why the session is paused
    pub reason: String,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct JoinInput {
    /// Resume this existing agent id instead of creating a new one
    #[serde(default)]
    pub agent_id: Option<String>,
    /// What this agent is working on
    #[serde(default)]
    pub context: Option<String>,
    /// Model name
    #[serde(default)]
    pub model: Option<String>,
    /// Credits spent so far
    #[serde(default)]
    pub credits_spent: Option<i64>,
    /// Tool calls made so far
    #[serde(default)]
    pub tool_calls: Option<i64>,
    /// Files changed so far
    #[serde(default)]
    pub files_changed: Option<i64>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct RecallInput {
    /// Words from the context of the session to find; omit to list recent agents
    #[serde(default)]
    pub hints: Option<String>,
}

#[tool_router]
impl SessionHelperMcpServer {
    /// Create a new MCP server instance.
    ///
    /// # Arguments
    /// * `dispatcher` - Dispatcher bound to the running callback listener
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            tool_router: Self::tool_router(),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    // ========================================================================
    // Checkpoint Tools
    // ========================================================================

    /// Ask the human and wait for the answer
    #[tool(
        description = "Show a message to the user in the IDE and wait for their reply. Call this when a task is finished or you need a decision. Returns the user's instructions, including any attached images."
    )]
    async fn io(&self, Parameters(input): Parameters<IoInput>) -> Result<CallToolResult, McpError> {
        let reason = non_empty_or_default(&input.reason);
        log::info!("io: {}", reason);

        let request = DispatchRequest::new(reason)
            .with_options(input.options.unwrap_or_default())
            .with_session(input.session_id);

        match self.dispatcher.dispatch(request).await {
            Ok(segments) => Ok(CallToolResult::success(
                segments.into_iter().map(segment_to_content).collect(),
            )),
            Err(e) => Ok(checkpoint_failure(e)),
        }
    }

    /// Wait until the human clicks Continue
    #[tool(
        description = "Pause the session until the user clicks Continue in the IDE. There is no timeout."
    )]
    async fn pause(
        &self,
        Parameters(input): Parameters<PauseInput>,
    ) -> Result<CallToolResult, McpError> {
        let prompt = format!(
            "⏸️ PAUSED: {}\n\nClick Continue when ready to resume.",
            input.reason.trim()
        );
        log::info!("pause: {}", input.reason.trim());

        match self.dispatcher.dispatch_raw(DispatchRequest::pause(prompt)).await {
            Ok(text) => Ok(CallToolResult::success(vec![Content::text(format!(
                "Session resumed. User response: {}\n\nContinue with your task.",
                text
            ))])),
            Err(e) => Ok(checkpoint_failure(e)),
        }
    }

    // ========================================================================
    // Identity Tools
    // ========================================================================

    /// Register (or resume) a named agent identity
    #[tool(
        description = "Create a named identity for this agent session so it can be recalled later. Pass agent_id to resume an existing identity."
    )]
    async fn join(&self, Parameters(input): Parameters<JoinInput>) -> Result<CallToolResult, McpError> {
        let history = self.dispatcher.history();

        if let Some(agent_id) = input.agent_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let resumed = history
                .touch_agent(agent_id, input.context.as_deref())
                .await
                .map_err(mcp::history_error)?;
            return match resumed {
                Some(agent) => Ok(CallToolResult::success(vec![Content::text(format!(
                    "Welcome back!\n\n{}",
                    describe_identity(&agent)
                ))])),
                None => Ok(CallToolResult::error(vec![Content::text(format!(
                    "Agent '{}' not found. Use recall to list known agents.",
                    agent_id
                ))])),
            };
        }

        let counters = [input.credits_spent, input.tool_calls, input.files_changed];
        if counters.iter().flatten().any(|n| *n < 0) {
            return Err(mcp::invalid_payload("usage counters must not be negative"));
        }

        let agent = history
            .record_agent(AgentRegistration {
                context: input.context,
                model: input.model,
                credits_spent: input.credits_spent.unwrap_or_default(),
                tool_calls: input.tool_calls.unwrap_or_default(),
                files_changed: input.files_changed.unwrap_or_default(),
            })
            .await
            .map_err(mcp::history_error)?;

        log::info!("Registered agent {}", agent.agent_id);
        Ok(CallToolResult::success(vec![Content::text(format!(
            "Agent identity created!\n\n{}\n\nUse this ID to recall this session later.",
            describe_identity(&agent)
        ))]))
    }

    /// Look up previously registered identities
    #[tool(
        description = "Find previously registered agent identities whose context matches the hints, most recently active first. Without hints, lists recent agents."
    )]
    async fn recall(
        &self,
        Parameters(input): Parameters<RecallInput>,
    ) -> Result<CallToolResult, McpError> {
        let agents = self
            .dispatcher
            .history()
            .find_agents(input.hints.as_deref())
            .await
            .map_err(mcp::history_error)?;

        if agents.is_empty() {
            return Ok(CallToolResult::success(vec![Content::text(
                "No matching agents found.",
            )]));
        }

        let lines: Vec<String> = agents.iter().map(summarize_identity).collect();
        Ok(CallToolResult::success(vec![Content::text(format!(
            "Found {} agent(s):\n\n{}",
            agents.len(),
            lines.join("\n")
        ))]))
    }
}

#[tool_handler]
impl rmcp::handler::server::ServerHandler for SessionHelperMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "session-helper".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: Some(
                "Session helper for human checkpoints. \
                Call io when a task is done or you need input, and follow the returned instructions. \
                The IDE extension must be running to display prompts."
                    .to_string(),
            ),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability::default()),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

// ============================================================================
// Formatting
// ============================================================================

fn non_empty_or_default(reason: &str) -> &str {
    match reason.trim() {
        "" => DEFAULT_REASON,
        trimmed => trimmed,
    }
}

fn segment_to_content(segment: Segment) -> Content {
    match segment {
        Segment::Text { text } => Content::text(text),
        Segment::Image { subtype, data } => Content::image(data, format!("image/{}", subtype)),
    }
}

/// Cancellation is an answer ("stop here"), everything else is a tool error.
fn checkpoint_failure(err: CheckpointError) -> CallToolResult {
    match err {
        CheckpointError::Cancelled => {
            CallToolResult::success(vec![Content::text(err.user_message())])
        }
        other => {
            log::warn!("Checkpoint failed: {}", other);
            CallToolResult::error(vec![Content::text(other.user_message())])
        }
    }
}

fn describe_identity(agent: &AgentIdentity) -> String {
    format!(
        "**Agent ID**: `{}`\n**Context**: {}\n**Model**: {}",
        agent.agent_id,
        agent.context.as_deref().unwrap_or("N/A"),
        agent.model.as_deref().unwrap_or("unknown"),
    )
}

fn summarize_identity(agent: &AgentIdentity) -> String {
    format!(
        "- `{}`: {} | Model: {} | Credits: {} (Last active: {})",
        agent.agent_id,
        agent.context.as_deref().unwrap_or("N/A"),
        agent.model.as_deref().unwrap_or("unknown"),
        agent.credits_spent,
        time::display_minutes(&agent.last_activity),
    )
}
