use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use secureorder_agent::GraphEngine;
use secureorder_core::config::AppConfig;
use secureorder_core::error::SecureOrderError;
use secureorder_core::types::{EngineEvent, Entry, RunResult, SessionId, ToolCall};
use secureorder_tools::{Catalog, ToolRegistry};

#[derive(Parser)]
#[command(
    name = "secureorder",
    version,
    about = "Resumable order-research agent with human approval before tool use"
)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "secureorder.toml")]
    config: PathBuf,

    /// Session ID (auto-generated for new runs if not provided)
    #[arg(short, long)]
    session: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a message and run until the session completes or suspends
    Run {
        /// The message to send
        #[arg(trailing_var_arg = true)]
        prompt: Vec<String>,
    },
    /// Approve the pending tool calls of a suspended session
    Resume,
    /// Print a session's stored state as JSON
    State,
    /// List stored sessions, newest first
    Sessions,
    /// Delete a stored session
    Delete,
    /// Show current configuration
    Config,
    /// Start interactive REPL mode
    Repl,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("secureorder=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        AppConfig::load(&cli.config)?
    } else {
        info!(path = %cli.config.display(), "No config file found, using defaults and environment");
        AppConfig::from_env()
    };

    match cli.command {
        Some(Commands::Config) => println!("{}", render_config(&config)?),
        Some(Commands::Run { prompt }) => {
            let text = if prompt.is_empty() {
                io::stdin()
                    .lock()
                    .lines()
                    .map_while(|l| l.ok())
                    .collect::<Vec<_>>()
                    .join("\n")
            } else {
                prompt.join(" ")
            };
            let session_id = cli.session.map(SessionId::from).unwrap_or_default();
            let engine = traced_engine(&config)?;
            let cancel = cancel_on_ctrl_c();
            let result = engine
                .run_with_cancel(&session_id, vec![Entry::user(text)], cancel)
                .await?;
            report(&result);
        }
        Some(Commands::Resume) => {
            let session_id = required_session(cli.session)?;
            let engine = traced_engine(&config)?;
            let cancel = cancel_on_ctrl_c();
            let result = engine.resume_with_cancel(&session_id, cancel).await?;
            report(&result);
        }
        Some(Commands::State) => {
            let session_id = required_session(cli.session)?;
            let session = build_engine(&config)?.get_session_state(&session_id)?;
            println!("{}", serde_json::to_string_pretty(&session)?);
        }
        Some(Commands::Sessions) => print_sessions(&build_engine(&config)?)?,
        Some(Commands::Delete) => {
            let session_id = required_session(cli.session)?;
            build_engine(&config)?.delete_session(&session_id).await?;
            println!("Deleted session {}", session_id);
        }
        Some(Commands::Repl) | None => {
            let session_id = cli.session.map(SessionId::from).unwrap_or_default();
            let engine = traced_engine(&config)?;
            run_repl(&engine, &config, session_id).await?;
        }
    }

    Ok(())
}

/// The effective configuration as TOML. Needs no engine, so it works even
/// when the model or checkpoint store cannot be set up.
fn render_config(config: &AppConfig) -> anyhow::Result<String> {
    Ok(toml::to_string_pretty(config)?)
}

/// Wire catalog, tools, generator and checkpoint store into an engine.
fn build_engine(config: &AppConfig) -> anyhow::Result<GraphEngine> {
    let catalog = match config.catalog_path() {
        Some(path) => {
            info!(path = %path.display(), "Loading catalog");
            Catalog::load(&path)?
        }
        None => Catalog::seeded(),
    };
    info!(
        orders = catalog.order_count(),
        products = catalog.product_count(),
        "Catalog ready"
    );

    let tools = ToolRegistry::with_builtins(Arc::new(catalog), &config.tools);
    let generator = secureorder_llm::create_generator(&config.model)?;
    let store = secureorder_agent::open_store(config)?;

    info!(
        provider = %config.model.provider,
        model = %config.model.model_id,
        tools = tools.len(),
        suspend_before_tools = config.engine.suspend_before_tools,
        "Engine ready"
    );

    Ok(GraphEngine::new(
        config.engine.clone(),
        generator,
        Arc::new(tools),
        store,
    ))
}

/// An engine whose progress is printed on stderr.
fn traced_engine(config: &AppConfig) -> anyhow::Result<GraphEngine> {
    let engine = build_engine(config)?;
    spawn_trace_printer(&engine);
    Ok(engine)
}

fn required_session(session: Option<String>) -> anyhow::Result<SessionId> {
    session
        .map(SessionId::from)
        .ok_or_else(|| anyhow::anyhow!("this command needs --session <ID>"))
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Interrupted, cancelling run");
        trigger.cancel();
    });
    cancel
}

/// Render engine progress as a technical trace on stderr.
fn spawn_trace_printer(engine: &GraphEngine) {
    let mut rx = engine.event_bus().subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event {
                EngineEvent::RunStarted { from, .. } => eprintln!("[run: from {}]", from),
                EngineEvent::StepStarted { step, .. } => eprintln!("[step: {}]", step),
                EngineEvent::StepCompleted {
                    step,
                    appended,
                    elapsed_ms,
                    ..
                } => eprintln!("[{}: +{} entries, {}ms]", step, appended, elapsed_ms),
                EngineEvent::ToolStarted { call, .. } => {
                    eprintln!("[tool: {} {}]", call.name, serde_json::Value::Object(call.arguments));
                }
                EngineEvent::ToolFinished { name, result, .. } => {
                    let body = result.to_value().to_string();
                    if result.ok {
                        eprintln!("[{}: ok] {}", name, truncate(&body, 200));
                    } else {
                        eprintln!("[{}: ERROR] {}", name, truncate(&body, 200));
                    }
                }
                EngineEvent::Suspended { pending_calls, .. } => {
                    eprintln!("[suspended: {} call(s) awaiting approval]", pending_calls.len());
                }
                EngineEvent::RunCompleted { steps, .. } => eprintln!("[done: {} steps]", steps),
                EngineEvent::RunFailed { kind, message, .. } => {
                    eprintln!("[error: {}: {}]", kind, message);
                }
            }
        }
    });
}

fn report(result: &RunResult) {
    match result {
        RunResult::Completed { answer, .. } => println!("{}", answer.text()),
        RunResult::Suspended {
            session_id,
            pending_calls,
        } => {
            print_pending(pending_calls);
            println!(
                "\nSession {} is waiting for approval. Continue with:\n  secureorder --session {} resume",
                session_id, session_id
            );
        }
    }
}

fn print_pending(calls: &[ToolCall]) {
    println!("Pending tool calls:");
    for call in calls {
        println!(
            "  {} {}({})",
            call.id,
            call.name,
            serde_json::Value::Object(call.arguments.clone())
        );
    }
}

fn print_sessions(engine: &GraphEngine) -> anyhow::Result<()> {
    let sessions = engine.list_sessions()?;
    if sessions.is_empty() {
        println!("No sessions.");
        return Ok(());
    }
    for s in sessions {
        println!(
            "{}  {:<9}  {:>3} entries  {}",
            s.session_id,
            s.status.as_str(),
            s.entries,
            s.updated_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

/// Ask on the terminal before executing a suspended batch.
async fn confirm_tools(calls: &[ToolCall]) -> bool {
    print_pending(calls);
    tokio::task::spawn_blocking(|| {
        dialoguer::Confirm::new()
            .with_prompt("Execute these tool calls?")
            .default(true)
            .interact()
            .unwrap_or(false)
    })
    .await
    .unwrap_or(false)
}

/// Drive a result to completion, asking for approval at every suspension.
async fn settle(engine: &GraphEngine, mut result: RunResult) -> Result<(), SecureOrderError> {
    loop {
        match result {
            RunResult::Completed { answer, .. } => {
                println!("\n{}\n", answer.text());
                return Ok(());
            }
            RunResult::Suspended {
                session_id,
                pending_calls,
            } => {
                if !confirm_tools(&pending_calls).await {
                    println!("Left suspended. Type /approve to run them later.");
                    return Ok(());
                }
                result = engine.resume(&session_id).await?;
            }
        }
    }
}

async fn run_repl(
    engine: &GraphEngine,
    config: &AppConfig,
    mut session_id: SessionId,
) -> anyhow::Result<()> {
    println!("SecureOrder v{}", env!("CARGO_PKG_VERSION"));
    println!("Session: {}", session_id);
    println!(
        "Model: {} ({}), approval before tools: {}",
        config.model.model_id, config.model.provider, config.engine.suspend_before_tools
    );
    println!("Type /help for commands, /quit to exit.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break; // EOF
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        let parts: Vec<&str> = input.split_whitespace().collect();
        match parts[0] {
            "/quit" | "/exit" | "/q" => {
                println!("Goodbye!");
                break;
            }
            "/help" => {
                println!("/approve        run the pending tool calls of this session");
                println!("/state          print this session as JSON");
                println!("/sessions       list stored sessions");
                println!("/new            start a fresh session");
                println!("/switch <id>    continue another session");
                println!("/tools          list registered tools");
                println!("/quit           exit");
                continue;
            }
            "/session" => {
                println!("Session ID: {}", session_id);
                continue;
            }
            "/new" => {
                session_id = SessionId::new();
                println!("Session: {}", session_id);
                continue;
            }
            "/switch" => {
                match parts.get(1) {
                    Some(id) => {
                        session_id = SessionId::from(*id);
                        println!("Session: {}", session_id);
                    }
                    None => println!("Usage: /switch <id>"),
                }
                continue;
            }
            "/tools" => {
                println!("Tools: {}", engine.tools().list().join(", "));
                continue;
            }
            "/sessions" => {
                if let Err(e) = print_sessions(engine) {
                    eprintln!("Failed to list sessions: {}", e);
                }
                continue;
            }
            "/state" => {
                match engine.get_session_state(&session_id) {
                    Ok(session) => println!("{}", serde_json::to_string_pretty(&session)?),
                    Err(e) => eprintln!("{}", e),
                }
                continue;
            }
            "/approve" => {
                let outcome = match engine.resume(&session_id).await {
                    Ok(result) => settle(engine, result).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = outcome {
                    error!(error = %e, "Resume failed");
                }
                continue;
            }
            cmd if cmd.starts_with('/') => {
                println!("Unknown command: {}. Type /help.", cmd);
                continue;
            }
            _ => {}
        }

        let outcome = match engine.run(&session_id, vec![Entry::user(input)]).await {
            Ok(result) => settle(engine, result).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(()) => {}
            Err(SecureOrderError::AwaitingApproval { .. }) => {
                println!("This session has tool calls awaiting approval. Type /approve.");
            }
            Err(e) => error!(error = %e, "Run failed"),
        }
    }

    Ok(())
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn config_subcommand_parses() {
        let cli = Cli::try_parse_from(["secureorder", "--config", "x.toml", "config"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Config)));
        assert_eq!(cli.config, PathBuf::from("x.toml"));
    }

    #[test]
    fn config_renders_without_an_engine() {
        let mut config = AppConfig::default();
        config.model.provider = "no-such-provider".into();
        assert!(build_engine(&config).is_err());

        let rendered = render_config(&config).unwrap();
        assert!(rendered.contains("[engine]"));
        assert!(rendered.contains("no-such-provider"));
    }
}
