//! Session helper - human checkpoints for AI agents
//!
//! `serve` runs the MCP server (push mode); `collect` performs one
//! filesystem-based exchange and prints the answer (pull mode).

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use session_helper_lib::config::{self, Config};
use session_helper_lib::error::CheckpointError;
use session_helper_lib::mcp;
use session_helper_lib::relay::{CollectRequest, FeedbackResult, FsTransport};

const EXAMPLES_HELP: &str = r##"
EXAMPLES:
  session-helper serve
  session-helper collect --summary "Refactored the parser" --options "Continue,Stop"
  echo '{"summary":"done","sessionId":"s-1"}' | session-helper collect --stdin

MCP CLIENT CONFIG:
  {"mcpServers": {"session-helper": {"command": "session-helper", "args": ["serve"]}}}
"##;

#[derive(Parser)]
#[command(name = "session-helper")]
#[command(author, version)]
#[command(about = "Human checkpoints for AI agents")]
#[command(after_help = EXAMPLES_HELP)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (default: ~/.session-helper/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve MCP over stdio (default)
    Serve,

    /// Write one request to the shared directory and wait for the answer
    Collect {
        /// Summary of the work done
        #[arg(short, long)]
        summary: Option<String>,

        /// Project directory (default: current directory)
        #[arg(short, long)]
        project: Option<String>,

        /// Conversation id grouping related requests
        #[arg(long)]
        session_id: Option<String>,

        /// Model name
        #[arg(long)]
        model: Option<String>,

        /// Conversation title
        #[arg(long)]
        title: Option<String>,

        /// Quick-reply options, comma separated
        #[arg(long, value_delimiter = ',')]
        options: Vec<String>,

        /// Seconds to wait (0 = forever)
        #[arg(long)]
        timeout: Option<u64>,

        /// Read the request as JSON from stdin
        #[arg(long)]
        stdin: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries MCP JSON-RPC (serve) or the feedback block (collect)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(config::get_config_path);
    let config = config::load_config_from(&config_path).map_err(anyhow::Error::msg)?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => mcp::run_mcp_server(config)
            .await
            .map_err(anyhow::Error::msg),
        Commands::Collect {
            summary,
            project,
            session_id,
            model,
            title,
            options,
            timeout,
            stdin,
        } => {
            let mut request = if stdin {
                read_stdin_request()?
            } else {
                CollectRequest::default()
            };

            // Flags override stdin fields
            if let Some(summary) = summary {
                request.summary = summary;
            }
            if let Some(project) = project {
                request.project = project;
            }
            request.session_id = session_id.or(request.session_id);
            request.model = model.or(request.model);
            request.title = title.or(request.title);
            let options: Vec<String> = options
                .into_iter()
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
            if !options.is_empty() {
                request.options = options;
            }
            if request.project.is_empty() {
                request.project = std::env::current_dir()
                    .context("Failed to resolve current directory")?
                    .display()
                    .to_string();
            }

            handle_collect(&config, request, timeout).await
        }
    }
}

fn read_stdin_request() -> Result<CollectRequest> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("Failed to read stdin")?;
    serde_json::from_str(&input).context("Invalid request JSON on stdin")
}

async fn handle_collect(config: &Config, request: CollectRequest, timeout: Option<u64>) -> Result<()> {
    let mut transport = FsTransport::from_config(config);
    if let Some(secs) = timeout {
        transport = transport.with_deadline((secs > 0).then(|| Duration::from_secs(secs)));
    }

    let interrupt = async {
        if tokio::signal::ctrl_c().await.is_err() {
            // No signal handler: never interrupt
            std::future::pending::<()>().await;
        }
    };

    match transport.collect_until(&request, interrupt).await {
        Ok(result) => {
            print_feedback(&result)?;
            Ok(())
        }
        Err(CheckpointError::Cancelled) => bail!("Cancelled"),
        Err(e @ CheckpointError::Timeout(_)) => {
            print_feedback(&FeedbackResult::unanswered())?;
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

/// Print the answer followed by a machine-readable block for the agent.
fn print_feedback(result: &FeedbackResult) -> Result<()> {
    let json = serde_json::to_string(result).context("Failed to serialize feedback")?;
    println!("\nFeedback:\n{}", result.content);
    println!("\n--- FEEDBACK_JSON ---");
    println!("{}", json);
    println!("--- END_FEEDBACK ---");
    Ok(())
}
