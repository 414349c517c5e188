use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use shared::{
    error::{ApiError, ApiException, ErrorCode},
    protocol::{ClientRequest, ServerEvent},
};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;
mod generator;
mod story;

use app_state::AppState;
use config::load_settings;
use generator::{CannedGenerator, Generator};
use story::{Outcome, RegenJob, Story};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = load_settings();
    let story = Story::from_files(&settings.characters_file, &settings.tree_file).map_err(
        |error| {
            error!(
                characters_file = %settings.characters_file.display(),
                tree_file = %settings.tree_file.display(),
                %error,
                "failed to load story files"
            );
            error
        },
    )?;
    info!(
        nodes = story.tree().len(),
        characters = story.characters().len(),
        "story loaded"
    );

    let generator = Arc::new(CannedGenerator::new(settings.generator_reply));
    let app = build_router(Arc::new(AppState::new(story, generator)));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(state, socket))
}

/// Sends the snapshot, then relays broadcasts while applying requests in the
/// order they arrive. Errors go back to this connection only.
async fn ws_connection(state: Arc<AppState>, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let mut events_rx = state.events.subscribe();
    let (direct_tx, mut direct_rx) = mpsc::unbounded_channel::<ServerEvent>();

    // The load frame goes out before the relay starts, so no broadcast can
    // overtake it.
    let snapshot = state.story.lock().await.snapshot();
    if send_event(&mut sender, &snapshot).await.is_err() {
        warn!("client left before the snapshot was sent");
        return;
    }
    info!("client connected");

    let send_task = tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                biased;
                Some(event) = direct_rx.recv() => event,
                received = events_rx.recv() => match received {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "client fell behind the event stream");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };
            if send_event(&mut sender, &event).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        let Message::Text(text) = msg else {
            continue;
        };
        let result = match serde_json::from_str::<ClientRequest>(&text) {
            Ok(request) => handle_request(&state, request, &direct_tx).await,
            Err(err) => Err(ApiException::new(
                ErrorCode::Validation,
                format!("invalid request: {err}"),
            )),
        };
        if let Err(err) = result {
            warn!(%err, "request rejected");
            let _ = direct_tx.send(ServerEvent::Error(ApiError::from(err)));
        }
    }

    info!("client disconnected");
    send_task.abort();
}

/// Encoding failures are logged and skipped; only a closed socket is an error.
async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(event) {
        Ok(v) => v,
        Err(err) => {
            warn!(%err, event = event.name(), "failed to encode event");
            return Ok(());
        }
    };
    sender.send(Message::Text(text)).await
}

async fn handle_request(
    state: &Arc<AppState>,
    request: ClientRequest,
    reply: &mpsc::UnboundedSender<ServerEvent>,
) -> Result<(), ApiException> {
    debug!(request = request.name(), "applying request");
    let outcome = state.story.lock().await.apply(request)?;
    match outcome {
        Outcome::Stored => {}
        Outcome::Broadcast(event) => {
            let _ = state.events.send(event);
        }
        Outcome::Generate(job) => {
            tokio::spawn(run_generation(Arc::clone(state), job, reply.clone()));
        }
    }
    Ok(())
}

/// Runs off the connection task so other requests keep flowing. A failed
/// generation is reported to the requester and still completes for everyone,
/// with the text unchanged.
async fn run_generation(
    state: Arc<AppState>,
    job: RegenJob,
    reply: mpsc::UnboundedSender<ServerEvent>,
) {
    info!(nid = %job.nid, extend = job.extend, "regenerating node");
    let generated = match state.generator.complete(&job.prompt).await {
        Ok(text) => text,
        Err(err) => {
            error!(nid = %job.nid, %err, "generation failed");
            let _ = reply.send(ServerEvent::Error(ApiError::new(
                ErrorCode::Generation,
                format!("generation failed for node {}: {err}", job.nid),
            )));
            String::new()
        }
    };

    let event = state.story.lock().await.finish_regen(&job, &generated);
    if let Some(event) = event {
        let _ = state.events.send(event);
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
