use anyhow::{anyhow, Context, Result};
use futures::{SinkExt, StreamExt};
use shared::protocol::{ClientRequest, ServerEvent};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{info, warn};
use url::Url;

use crate::{session::SessionInput, sync::ChannelSink};

/// Live websocket connection: the outbound sink for a `SyncClient` plus the
/// reader and writer tasks behind it.
pub struct Connection {
    pub sink: ChannelSink,
    pub reader: JoinHandle<()>,
    pub writer: JoinHandle<()>,
}

/// `http(s)://host[:port][/base]` -> `ws(s)://host[:port][/base]/ws`.
pub fn websocket_url(server_url: &str) -> Result<Url> {
    let mut url =
        Url::parse(server_url).with_context(|| format!("invalid server url: {server_url}"))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(anyhow!("unsupported server url scheme: {other}")),
    };
    url.set_scheme(scheme)
        .map_err(|_| anyhow!("cannot switch {server_url} to {scheme}"))?;
    let path = format!("{}/ws", url.path().trim_end_matches('/'));
    url.set_path(&path);
    Ok(url)
}

/// Connects to the remote collaborator. Every inbound event is posted to
/// `inbox` as [`SessionInput::Server`]; requests written to the returned sink
/// are sent as JSON text frames in order.
pub async fn connect(
    server_url: &str,
    inbox: mpsc::UnboundedSender<SessionInput>,
) -> Result<Connection> {
    let ws_url = websocket_url(server_url)?;
    let (ws_stream, _) = connect_async(ws_url.as_str())
        .await
        .with_context(|| format!("failed to connect websocket: {ws_url}"))?;
    info!(url = %ws_url, "connected to story server");
    let (mut ws_writer, mut ws_reader) = ws_stream.split();

    let reader = tokio::spawn(async move {
        while let Some(msg) = ws_reader.next().await {
            match msg {
                Ok(Message::Text(text)) => match serde_json::from_str::<ServerEvent>(&text) {
                    Ok(event) => {
                        if inbox.send(SessionInput::Server(event)).is_err() {
                            break;
                        }
                    }
                    Err(err) => warn!(%err, "invalid server event"),
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(err) => {
                    warn!(%err, "websocket receive failed");
                    break;
                }
            }
        }
        info!("story server connection closed");
    });

    let (tx, mut rx) = mpsc::unbounded_channel::<ClientRequest>();
    let writer = tokio::spawn(async move {
        while let Some(request) = rx.recv().await {
            let text = match serde_json::to_string(&request) {
                Ok(text) => text,
                Err(err) => {
                    warn!(%err, request = request.name(), "failed to encode request");
                    continue;
                }
            };
            if let Err(err) = ws_writer.send(Message::Text(text)).await {
                warn!(%err, "websocket send failed");
                break;
            }
        }
        let _ = ws_writer.close().await;
    });

    Ok(Connection {
        sink: ChannelSink::new(tx),
        reader,
        writer,
    })
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
