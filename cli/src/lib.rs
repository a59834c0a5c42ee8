//! The `push` command-line surface (§6): argument parsing, the headless
//! one-shot driver, session listing, and the `approve` subcommand that
//! completes a `prepare_commit` staged review.

use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
use push_core::agent_loop::AgentLoop;
use push_core::agent_loop::TurnOutcome;
use push_core::config::Config;
use push_core::config::ConfigOverrides;
use push_core::provider::HttpChatProvider;
use push_core::session::Session;
use push_core::tools::git::commit_approved_review;
use push_sandbox_client::SandboxClient;
use push_sandbox_client::types::CreateRequest;
use tokio_util::sync::CancellationToken;

/// A sandboxed coding agent.
#[derive(Debug, Parser)]
#[command(name = "push", version, about = "A sandboxed coding agent")]
pub struct Cli {
    /// Resume an existing session by id (interactive mode only).
    #[arg(long)]
    pub session: Option<String>,

    #[arg(long)]
    pub provider: Option<String>,

    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub cwd: Option<PathBuf>,

    #[arg(long = "max-rounds")]
    pub max_rounds: Option<u32>,

    /// Emit a JSON result envelope instead of plain text (headless only).
    #[arg(long)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a single task headlessly and exit.
    Run {
        #[arg(long)]
        task: Option<String>,
        /// Positional form: `push run "fix the failing test"`.
        task_arg: Option<String>,
    },
    /// List persisted sessions, most recently updated first.
    Sessions,
    /// Approve a staged `prepare_commit` review and perform the commit.
    Approve {
        session_id: String,
        #[arg(long)]
        message: String,
    },
}

fn overrides(cli: &Cli) -> ConfigOverrides {
    ConfigOverrides {
        provider: cli.provider.clone(),
        model: cli.model.clone(),
        cwd: cli.cwd.clone(),
        max_rounds: cli.max_rounds,
    }
}

/// Maps a `--provider` id onto the base URL of an OpenAI-compatible chat
/// endpoint. Specific provider registries, auth, and URLs beyond these
/// common defaults are configuration, not part of the agent's core.
fn provider_base_url(provider_id: &str) -> String {
    match provider_id {
        "ollama" => "http://localhost:11434".to_string(),
        "mistral" => "https://api.mistral.ai".to_string(),
        "openrouter" => "https://openrouter.ai/api".to_string(),
        other => other.to_string(),
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<i32> {
    match &cli.command {
        Some(Command::Sessions) => run_sessions(&cli).await,
        Some(Command::Approve { session_id, message }) => run_approve(&cli, session_id, message).await,
        Some(Command::Run { task, task_arg }) => {
            let task_text = task
                .clone()
                .or_else(|| task_arg.clone())
                .ok_or_else(|| anyhow::anyhow!("`push run` requires a task: --task \"...\" or a positional argument"))?;
            run_headless(&cli, &task_text).await
        }
        None => run_interactive(&cli).await,
    }
}

async fn run_sessions(cli: &Cli) -> anyhow::Result<i32> {
    let config = Config::load(overrides(cli))?;
    let sessions = Session::list_all(&config.session_dir).await?;
    if sessions.is_empty() {
        println!("no sessions found under {}", config.session_dir.display());
        return Ok(0);
    }
    for state in sessions {
        println!(
            "{}  updated={}  rounds_seen={}  messages={}  model={}",
            state.id,
            state.updated_at,
            state.round,
            state.messages.len(),
            state.model,
        );
    }
    Ok(0)
}

async fn run_approve(cli: &Cli, session_id: &str, message: &str) -> anyhow::Result<i32> {
    let config = Config::load(overrides(cli))?;
    let mut session = Session::load(&config.session_dir, session_id).await?;

    let sandbox = SandboxClient::new(config.sandbox_base_url.clone());
    sandbox.create(CreateRequest { template: None }).await?;

    let mut ctx = push_core::tool_layer::ToolContext {
        sandbox: &sandbox,
        ledger: &mut session.ledger,
        version_cache: &mut session.version_cache,
        workspace_root: session.state.workspace_root.to_string_lossy().to_string(),
        auditor: None,
        auditor_model: None,
    };
    let result = commit_approved_review(&mut ctx, message).await;
    let _ = sandbox.cleanup().await;

    println!("{}", result.text);
    Ok(if result.ok { 0 } else { 1 })
}

async fn run_headless(cli: &Cli, task: &str) -> anyhow::Result<i32> {
    let config = Config::load(overrides(cli))?;
    let sandbox = SandboxClient::new(config.sandbox_base_url.clone());
    sandbox.create(CreateRequest { template: None }).await?;

    let provider = HttpChatProvider::new(provider_base_url(&config.provider_id), None);
    let auditor_provider = config.auditor_model.is_some().then(|| &provider);

    let mut session = Session::new(
        config.provider_id.clone(),
        config.model.clone(),
        config.workspace_root.clone(),
        &config.session_dir,
    );
    session.start_persistence().await?;

    let cancel = CancellationToken::new();
    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_for_signal.cancel();
        }
    });

    let agent_loop = AgentLoop {
        sandbox: &sandbox,
        provider: &provider,
        model: config.model.clone(),
        auditor: auditor_provider.map(|p| p as &dyn push_core::provider::ModelProvider),
        auditor_model: config.auditor_model.clone(),
        max_rounds: config.max_rounds,
        cancel,
    };

    let outcome = agent_loop.run_turn(&mut session, task).await;
    let _ = sandbox.cleanup().await;

    let exit_code = if outcome.is_success() { 0 } else { 1 };
    print_outcome(cli, &session, &outcome);
    Ok(exit_code)
}

async fn run_interactive(cli: &Cli) -> anyhow::Result<i32> {
    let config = Config::load(overrides(cli))?;
    let sandbox = SandboxClient::new(config.sandbox_base_url.clone());
    sandbox.create(CreateRequest { template: None }).await?;

    let provider = HttpChatProvider::new(provider_base_url(&config.provider_id), None);
    let auditor_provider = config.auditor_model.is_some().then(|| &provider);

    let mut session = match &cli.session {
        Some(id) => Session::load(&config.session_dir, id).await?,
        None => {
            let mut s = Session::new(
                config.provider_id.clone(),
                config.model.clone(),
                config.workspace_root.clone(),
                &config.session_dir,
            );
            s.start_persistence().await?;
            s
        }
    };

    println!("push session {} ({})", session.id(), config.model);
    println!("type a task and press enter; Ctrl-D to exit.");

    let cancel = CancellationToken::new();
    let mut input = String::new();
    loop {
        input.clear();
        print!("> ");
        use std::io::Write;
        std::io::stdout().flush().ok();
        if std::io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let task = input.trim();
        if task.is_empty() {
            continue;
        }

        let agent_loop = AgentLoop {
            sandbox: &sandbox,
            provider: &provider,
            model: config.model.clone(),
            auditor: auditor_provider.map(|p| p as &dyn push_core::provider::ModelProvider),
            auditor_model: config.auditor_model.clone(),
            max_rounds: config.max_rounds,
            cancel: cancel.clone(),
        };
        let outcome = agent_loop.run_turn(&mut session, task).await;
        print_outcome(cli, &session, &outcome);
    }

    let _ = sandbox.cleanup().await;
    Ok(0)
}

fn print_outcome(cli: &Cli, session: &Session, outcome: &TurnOutcome) {
    if cli.json {
        let envelope = match outcome {
            TurnOutcome::Success { text } => {
                serde_json::json!({"outcome": "success", "session_id": session.id(), "text": text})
            }
            TurnOutcome::MaxRounds => serde_json::json!({"outcome": "max_rounds", "session_id": session.id()}),
            TurnOutcome::LoopDetected => {
                serde_json::json!({"outcome": "loop_detected", "session_id": session.id()})
            }
            TurnOutcome::Timeout => serde_json::json!({"outcome": "timeout", "session_id": session.id()}),
            TurnOutcome::Cancelled => serde_json::json!({"outcome": "cancelled", "session_id": session.id()}),
            TurnOutcome::ProviderError { message } => {
                serde_json::json!({"outcome": "error", "session_id": session.id(), "message": message})
            }
        };
        println!("{}", serde_json::to_string_pretty(&envelope).unwrap_or_default());
        return;
    }

    match outcome {
        TurnOutcome::Success { text } => println!("{text}"),
        TurnOutcome::MaxRounds => eprintln!("turn ended: max rounds reached"),
        TurnOutcome::LoopDetected => eprintln!("turn ended: repeated tool call detected"),
        TurnOutcome::Timeout => eprintln!("turn ended: round timed out"),
        TurnOutcome::Cancelled => eprintln!("turn cancelled"),
        TurnOutcome::ProviderError { message } => eprintln!("turn ended with an error: {message}"),
    }
}
