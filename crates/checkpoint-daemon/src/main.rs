//! checkpoint-daemon: JSON-lines front end for the approval gate.
//!
//! Reads one request per line on stdin and writes one response per line on
//! stdout. Logs go to stderr (`RUST_LOG`, default `info`).

mod protocol;
mod server;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use checkpoint_core::config::GateConfig;
use checkpoint_core::event_bus::EventBus;
use checkpoint_core::tools::ToolRegistry;
use checkpoint_core::{paths, persistence, Gate};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, mpsc};

use protocol::Notification;
use server::Daemon;

#[derive(Parser, Debug)]
#[command(name = "checkpoint-daemon", version, about = "Human-in-the-loop gate for agent tool calls")]
struct Args {
    /// Data directory (defaults to $CHECKPOINT_HOME, then ~/.checkpoint)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Also write session events to stdout as `{"event": ...}` lines
    #[arg(long)]
    events: bool,

    /// Seconds to wait for a decision before declining; overrides config.json
    #[arg(long)]
    approval_timeout: Option<u64>,

    /// How many calls may wait behind a pending one; overrides config.json
    #[arg(long)]
    max_queued: Option<usize>,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run(Args::parse()).await {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let data_dir = paths::data_dir(args.data_dir)?;
    let mut config = GateConfig::load(&data_dir)?;
    if let Some(secs) = args.approval_timeout {
        config.approval_timeout_secs = Some(secs);
    }
    if let Some(max) = args.max_queued {
        config.max_queued = max;
    }
    let policy = persistence::load_policy(&data_dir)?;
    log::info!("Using data directory {}", data_dir.display());

    let gate = Gate::with_config(Arc::new(ToolRegistry::with_builtin_tools()), policy, config);
    let events = Arc::new(EventBus::new());
    let mut daemon = Daemon::new(gate, events.clone(), data_dir);

    // Single writer so responses and event lines never interleave mid-line.
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = out_rx.recv().await {
            stdout.write_all(line.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
        Ok::<_, std::io::Error>(())
    });

    if args.events {
        let mut rx = events.subscribe();
        let tx = out_tx.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => match serde_json::to_string(&Notification { event: &event }) {
                        Ok(line) => {
                            if tx.send(line).is_err() {
                                break;
                            }
                        }
                        Err(e) => log::warn!("Failed to serialize event: {}", e),
                    },
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        log::warn!("Event forwarder lagged, dropped {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
    drop(events);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut sweep = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    log::info!("stdin closed, shutting down");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let response = daemon.handle_line(&line);
                out_tx.send(serde_json::to_string(&response)?)?;
            }
            _ = sweep.tick() => daemon.expire_overdue(),
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted, shutting down");
                break;
            }
        }
    }

    daemon.shutdown();
    // Dropping the daemon closes the bus, which ends the forwarder.
    drop(daemon);
    drop(out_tx);
    writer.await??;
    Ok(())
}
