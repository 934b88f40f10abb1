//! k13d Console - Line-Oriented Agent Chat
//!
//! Talks to the k13d agent service from a terminal. Type a question, watch
//! the answer stream in, and approve or deny the tool calls the agent wants
//! to run.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults
//! k13d-console
//!
//! # Custom endpoint
//! k13d-console --endpoint http://k13d.local:8080/api/chat/agentic
//!
//! # Separate conversation per cluster, forget the previous one
//! k13d-console --instance prod --new
//!
//! # Verbose logging
//! RUST_LOG=debug k13d-console
//! ```
//!
//! # Commands
//!
//! - `/new`: start a new conversation
//! - `/strict`: toggle blocking of critical messages
//! - `/cancel`: stop the answer in progress (also Ctrl-C)
//! - `/quit`: exit
//!
//! While an approval is pending, `y`, `a` or Enter approves; `n`, `d` denies.

mod input;
mod render;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use console_core::{
    default_config_path, load_config_from_path, ApprovalCoordinator, ApprovalShortcut,
    ConfigOverrides, ConsoleConfig, ConversationEngine, FileSessionStore, HttpAgentTransport,
    MemorySessionStore, SessionStore, TurnError,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use input::{prompt, Lines, PromptConfirm};

/// k13d Console - chat with the k13d agent from a terminal
#[derive(Parser, Debug)]
#[command(name = "k13d-console")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "K13D_CONSOLE_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Agent chat endpoint
    #[arg(short = 'e', long, value_name = "URL")]
    endpoint: Option<String>,

    /// Block critical messages instead of asking
    #[arg(long)]
    strict: bool,

    /// Session instance name (one stored session per instance)
    #[arg(short = 'i', long, value_name = "NAME")]
    instance: Option<String>,

    /// Do not persist the session id
    #[arg(long)]
    no_persist: bool,

    /// Forget the stored session and start a new conversation
    #[arg(short = 'n', long)]
    new: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "K13D_CONSOLE_LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(ref endpoint) = self.endpoint {
            overrides = overrides.with_endpoint(endpoint.clone());
        }
        if self.strict {
            overrides = overrides.with_strict(true);
        }
        if let Some(ref instance) = self.instance {
            overrides = overrides.with_instance(instance.clone());
        }
        if self.no_persist {
            overrides = overrides.with_persist(false);
        }
        overrides
    }
}

/// Initialize logging on stderr so it does not mix with the conversation
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("k13d_console={level},console_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load(args: &Args) -> Result<ConsoleConfig> {
    let path = args.config.clone().or_else(default_config_path);
    let mut config = load_config_from_path(path).context("Failed to load configuration")?;
    args.overrides().apply(&mut config);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn session_store(config: &ConsoleConfig) -> Result<Arc<dyn SessionStore>> {
    if !config.session.persist {
        return Ok(Arc::new(MemorySessionStore::new()));
    }
    let store = FileSessionStore::for_instance(&config.session.instance)
        .context("Failed to locate the session directory")?;
    info!(path = %store.path().display(), "Session file");
    Ok(Arc::new(store))
}

/// Answer the pending approval in the background
///
/// Delivery can take up to the request timeout; the turn keeps draining
/// frames and honoring cancellation meanwhile.
fn spawn_resolve(
    approvals: Arc<ApprovalCoordinator>,
    shortcut: ApprovalShortcut,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = shortcut.apply(&approvals).await {
            println!("{e}");
        }
    })
}

/// Run one turn, answering approvals and cancellation while it streams
async fn run_turn(engine: &mut ConversationEngine, text: &str, lines: &Lines) {
    let approvals = engine.approvals();
    let cancel = engine.cancellation();
    let confirm = PromptConfirm::new(lines.clone());

    let turn = engine.send(text, &confirm);
    tokio::pin!(turn);

    let mut stdin_open = true;
    let result = loop {
        tokio::select! {
            biased;
            result = &mut turn => break result,
            _ = tokio::signal::ctrl_c() => cancel.cancel(),
            line = lines.next(), if stdin_open => {
                let Some(line) = line else {
                    stdin_open = false;
                    cancel.cancel();
                    continue;
                };
                if line.trim() == "/cancel" {
                    cancel.cancel();
                } else if approvals.has_pending() {
                    match ApprovalShortcut::from_line(&line) {
                        Some(shortcut) => {
                            spawn_resolve(approvals.clone(), shortcut);
                        }
                        None => prompt("  Approve? [Y/n] "),
                    }
                } else if !line.trim().is_empty() {
                    println!("(answer in progress, /cancel to stop)");
                }
            }
        }
    };

    match result {
        Ok(_) => {}
        Err(TurnError::Blocked(verdict)) => {
            println!(
                "Blocked ({} risk): {}",
                verdict.risk_level,
                verdict.reason.as_deref().unwrap_or("not allowed in strict mode")
            );
            for tip in verdict.risk_level.recommendations() {
                println!("  - {tip}");
            }
        }
        Err(TurnError::Declined(_)) => println!("Not sent."),
        Err(TurnError::Cancelled) => println!("\nCancelled."),
        // Already rendered from TurnFailed
        Err(TurnError::Transport(e)) => tracing::debug!(error = %e, "Turn failed"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    let config = load(&args)?;
    info!(
        endpoint = %config.agent.endpoint,
        source = %config.source(),
        strict = config.guardrail.strict,
        "k13d console starting"
    );

    let transport = Arc::new(HttpAgentTransport::from_config(&config.agent));
    let store = session_store(&config)?;

    let (tx, rx) = mpsc::channel(100);
    let renderer = tokio::spawn(render::run(rx));
    let mut engine = ConversationEngine::new(transport, store, (&config).into(), tx);

    if args.new {
        engine.new_conversation().await;
    } else if let Some(id) = engine.session_id() {
        println!("Resuming conversation {id}. Type /new to start over.");
    }

    let lines = Lines::spawn_stdin();
    loop {
        prompt("> ");
        let line = tokio::select! {
            line = lines.next() => line,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/new" => engine.new_conversation().await,
            "/strict" => {
                let strict = !engine.classifier().is_strict();
                engine.set_strict(strict);
                println!("Strict mode {}", if strict { "on" } else { "off" });
            }
            text => run_turn(&mut engine, text, &lines).await,
        }
    }

    drop(engine);
    let _ = renderer.await;
    info!("k13d console exiting");
    Ok(())
}
