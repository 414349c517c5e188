use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    transport, SceneCache, SessionInput, StorySession, SyncClient, TokioTicks, TreeError,
    UserAction,
};
use shared::{domain::NodeId, protocol::ServerEvent};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Headless story tree client: connects, applies one action and prints the
/// resulting scene as JSON.
#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "http://127.0.0.1:5000")]
    server_url: String,
    #[arg(long, default_value_t = 1200.0)]
    viewport_width: f64,
    /// How long to wait for the server before giving up.
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
enum Command {
    /// Print the current scene without changing anything.
    Show,
    AddChild {
        parent: String,
    },
    Clone {
        nid: String,
    },
    Delete {
        nid: String,
    },
    Edit {
        nid: String,
        #[arg(long)]
        sender: Option<String>,
        #[arg(long)]
        text: Option<String>,
    },
    /// Ask the server for new text and wait until it arrives.
    Regenerate {
        nid: String,
        /// Continue the existing text instead of replacing it.
        #[arg(long)]
        extend: bool,
    },
}

impl Command {
    fn actions(&self) -> Vec<UserAction> {
        match self.clone() {
            Command::Show => Vec::new(),
            Command::AddChild { parent } => vec![UserAction::AddChild {
                parent: parent.into(),
            }],
            Command::Clone { nid } => vec![UserAction::Clone { nid: nid.into() }],
            Command::Delete { nid } => vec![UserAction::Delete { nid: nid.into() }],
            Command::Edit { nid, sender, text } => {
                let nid = NodeId::from(nid);
                let mut actions = Vec::new();
                if let Some(sender) = sender {
                    actions.push(UserAction::EditSender {
                        nid: nid.clone(),
                        sender,
                    });
                }
                if let Some(text) = text {
                    actions.push(UserAction::EditText { nid, text });
                }
                actions
            }
            Command::Regenerate { nid, extend } => vec![UserAction::Regenerate {
                nid: nid.into(),
                extend,
            }],
        }
    }

    fn awaits_generation(&self) -> Option<NodeId> {
        match self {
            Command::Regenerate { nid, .. } => Some(NodeId::from(nid.as_str())),
            _ => None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    let timeout = Duration::from_secs(cli.timeout_secs);

    let (inbox_tx, mut inbox) = mpsc::unbounded_channel();
    let connection = transport::connect(&cli.server_url, inbox_tx.clone()).await?;
    let mut session = StorySession::new(
        SyncClient::new(Arc::new(connection.sink)),
        SceneCache::default(),
        cli.viewport_width,
    )
    .with_ticks(Arc::new(TokioTicks::new(inbox_tx, SessionInput::Tick)));

    loop {
        let input = next_input(&mut inbox, timeout).await.context("waiting for load")?;
        let is_load = matches!(input, SessionInput::Server(ServerEvent::Load { .. }));
        skip_recoverable(session.dispatch(input))?;
        if is_load {
            break;
        }
    }
    info!(nodes = session.store().len(), "tree loaded");

    for action in cli.command.actions() {
        session.perform(action)?;
    }

    if let Some(nid) = cli.command.awaits_generation() {
        while session.lock().is_pending(&nid) {
            let input = next_input(&mut inbox, timeout)
                .await
                .context("waiting for regenerated text")?;
            if let Err(err) = skip_recoverable(session.dispatch(input)) {
                warn!(%err, "input rejected");
            }
        }
    }

    println!("{}", serde_json::to_string_pretty(session.view().scene())?);

    // Flush queued requests before leaving.
    drop(session);
    connection.writer.await.context("request writer failed")?;
    connection.reader.abort();
    Ok(())
}

/// Stale replies and duplicate requests are dropped; anything else is passed on.
fn skip_recoverable(result: Result<(), TreeError>) -> Result<(), TreeError> {
    match result {
        Err(err) if err.is_recoverable() => {
            debug!(%err, "ignored input");
            Ok(())
        }
        other => other,
    }
}

async fn next_input(
    inbox: &mut mpsc::UnboundedReceiver<SessionInput>,
    timeout: Duration,
) -> Result<SessionInput> {
    tokio::time::timeout(timeout, inbox.recv())
        .await
        .map_err(|_| anyhow!("timed out after {}s", timeout.as_secs()))?
        .ok_or_else(|| anyhow!("connection closed"))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
