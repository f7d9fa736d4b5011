use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use tether_agent::process::CliAgent;
use tether_core::config::EngineConfig;
use tether_core::content::ContentBlock;
use tether_core::ids::SessionId;
use tether_core::permission::PermissionMode;
use tether_core::updates::Outbound;
use tether_engine::{ContextBudget, SessionEngine};
use tether_store::SnapshotStore;

const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(10 * 60);
const SNAPSHOT_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 60 * 60);
const SNAPSHOT_MAX_COUNT: usize = 1000;

#[derive(Parser, Debug)]
#[command(name = "tether", about = "Session bridge between a control-plane client and an assistant service")]
struct Args {
    /// Base directory for persisted session snapshots
    #[arg(long, default_value = ".tether/sessions")]
    store_dir: PathBuf,

    /// Path to the assistant executable (default: `assistant` on PATH)
    #[arg(long)]
    agent: Option<PathBuf>,

    /// Maximum assistant turns per prompt (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    max_turns: u32,

    /// Default permission mode for new sessions
    #[arg(long, default_value = "default")]
    permission_mode: String,

    /// Optional SQLite database for warn+ logs
    #[arg(long)]
    log_db: Option<PathBuf>,
}

/// Control commands read from stdin, one JSON object per line.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Command {
    Create { working_dir: Option<PathBuf> },
    Load {
        session_id: String,
        working_dir: Option<PathBuf>,
    },
    Prompt {
        session_id: String,
        content: Vec<ContentBlock>,
    },
    Cancel { session_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let _log_sink = tether_telemetry::init("info", args.log_db.as_deref())
        .context("failed to initialize logging")?;

    let default_permission_mode: PermissionMode = args
        .permission_mode
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    let config = EngineConfig {
        max_turns: args.max_turns,
        default_permission_mode,
        agent_executable: args.agent.clone(),
        store_dir: args.store_dir.clone(),
    };

    let store =
        Arc::new(SnapshotStore::open(&config.store_dir).context("failed to open snapshot store")?);
    let agent = Arc::new(CliAgent::new(config.agent_executable.clone()));
    let budget = Arc::new(ContextBudget::new());
    let (update_tx, mut update_rx) = mpsc::channel::<Outbound>(1024);

    let engine = Arc::new(SessionEngine::new(
        agent,
        Arc::clone(&store),
        budget,
        update_tx,
        config,
    ));

    tracing::info!(store = %args.store_dir.display(), "tether ready");

    // Outbound updates go to stdout as JSON lines.
    tokio::spawn(async move {
        while let Some(outbound) = update_rx.recv().await {
            match serde_json::to_string(&outbound) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::error!(error = %e, "update serialization failed"),
            }
        }
    });

    // Periodic retention pass, independent of request traffic.
    {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(HOUSEKEEPING_INTERVAL);
            tick.tick().await; // first tick fires immediately; skip it
            loop {
                tick.tick().await;
                engine.housekeeping(SNAPSHOT_MAX_AGE, SNAPSHOT_MAX_COUNT);
            }
        });
    }

    // Control loop: one JSON command per stdin line.
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => handle_line(&engine, &line),
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(error = %e, "stdin read failed");
                    break;
                }
            },
        }
    }

    tracing::info!("shutting down");
    store.sweep_orphans();
    Ok(())
}

fn handle_line(engine: &Arc<SessionEngine>, line: &str) {
    if line.trim().is_empty() {
        return;
    }
    let command: Command = match serde_json::from_str(line) {
        Ok(c) => c,
        Err(e) => {
            respond(&serde_json::json!({"type": "error", "message": format!("bad command: {e}")}));
            return;
        }
    };

    match command {
        Command::Create { working_dir } => {
            let id = engine.create_session(resolve_dir(working_dir));
            respond(&serde_json::json!({"type": "created", "session_id": id}));
        }
        Command::Load {
            session_id,
            working_dir,
        } => {
            let id = SessionId::from_raw(session_id);
            engine.load_session(&id, resolve_dir(working_dir));
            respond(&serde_json::json!({"type": "loaded", "session_id": id}));
        }
        Command::Prompt {
            session_id,
            content,
        } => {
            // prompts run concurrently so cancel stays reachable mid-turn
            let engine = Arc::clone(engine);
            tokio::spawn(async move {
                let id = SessionId::from_raw(session_id);
                match engine.prompt(&id, &content).await {
                    Ok(outcome) => respond(&serde_json::json!({
                        "type": "stop",
                        "session_id": id,
                        "stop_reason": outcome.stop_reason,
                    })),
                    Err(e) => respond(&serde_json::json!({
                        "type": "error",
                        "session_id": id,
                        "message": e.to_string(),
                    })),
                }
            });
        }
        Command::Cancel { session_id } => {
            engine.cancel(&SessionId::from_raw(session_id));
        }
    }
}

fn respond(value: &serde_json::Value) {
    println!("{value}");
}

fn resolve_dir(dir: Option<PathBuf>) -> PathBuf {
    dir.unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/tmp")))
}
