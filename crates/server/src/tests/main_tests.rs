use super::*;
use async_trait::async_trait;
use axum::{body, body::Body, http::Request, http::StatusCode};
use futures::Stream;
use crate::generator::Generator;
use shared::domain::{CharacterRegistry, ConversationNode, ConversationTree, NodeId};
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tower::ServiceExt;

struct FailingGenerator;

#[async_trait]
impl Generator for FailingGenerator {
    async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
        Err(anyhow::anyhow!("model offline"))
    }
}

fn two_node_story() -> Story {
    let mut tree = ConversationTree::new();
    let mut root = ConversationNode::new("R".into(), None, "System", "Once.");
    let reply = ConversationNode::new("A".into(), Some("R".into()), "Alice", "Hi.");
    root.children.push("A".into());
    tree.insert(root.nid.clone(), root);
    tree.insert(reply.nid.clone(), reply);
    Story::new(CharacterRegistry::new(), tree)
}

fn test_state(generator: Arc<dyn Generator>) -> Arc<AppState> {
    Arc::new(AppState::new(two_node_story(), generator))
}

async fn spawn_server(state: Arc<AppState>) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, build_router(state))
            .await
            .expect("serve");
    });
    addr
}

async fn next_event<S>(stream: &mut S) -> ServerEvent
where
    S: Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("event in time")
            .expect("stream open")
            .expect("message");
        if let WsMessage::Text(text) = msg {
            return serde_json::from_str(&text).expect("event json");
        }
    }
}

#[tokio::test]
async fn healthz_reports_ok() {
    let app = build_router(test_state(Arc::new(CannedGenerator::new("x"))));
    let request = Request::get("/healthz")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn ws_without_upgrade_is_rejected() {
    let app = build_router(test_state(Arc::new(CannedGenerator::new("x"))));
    let request = Request::get("/ws").body(Body::empty()).expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn connect_loads_then_regenerates_and_broadcasts() {
    let state = test_state(Arc::new(CannedGenerator::new("Good morning.\nBob: hey")));
    let addr = spawn_server(Arc::clone(&state)).await;

    let (mut first, _) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("connect first");
    let (mut second, _) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("connect second");

    for socket in [&mut first, &mut second] {
        match next_event(socket).await {
            ServerEvent::Load { tree, .. } => assert_eq!(tree.len(), 2),
            other => panic!("expected load, got {other:?}"),
        }
    }

    let request = ClientRequest::RegenNode {
        nid: NodeId::from("A"),
        extend: true,
    };
    first
        .send(WsMessage::Text(
            serde_json::to_string(&request).expect("encode"),
        ))
        .await
        .expect("send");

    let expected = ServerEvent::RegenComplete {
        nid: NodeId::from("A"),
        text: "Hi.  Good morning.".into(),
    };
    assert_eq!(next_event(&mut first).await, expected);
    assert_eq!(next_event(&mut second).await, expected);
    assert_eq!(
        state
            .story
            .lock()
            .await
            .tree()
            .get(&NodeId::from("A"))
            .expect("A")
            .text,
        "Hi.  Good morning."
    );
}

#[tokio::test]
async fn load_is_the_first_frame_even_during_broadcasts() {
    let state = test_state(Arc::new(CannedGenerator::new("x")));
    let addr = spawn_server(Arc::clone(&state)).await;

    let events = state.events.clone();
    let flood = tokio::spawn(async move {
        loop {
            let _ = events.send(ServerEvent::RegenComplete {
                nid: NodeId::from("A"),
                text: "Hi.".into(),
            });
            tokio::task::yield_now().await;
        }
    });

    for _ in 0..10 {
        let (mut socket, _) = connect_async(format!("ws://{addr}/ws"))
            .await
            .expect("connect");
        match next_event(&mut socket).await {
            ServerEvent::Load { tree, .. } => assert_eq!(tree.len(), 2),
            other => panic!("expected load first, got {other:?}"),
        }
    }
    flood.abort();
}

#[tokio::test]
async fn edits_and_bad_requests_only_answer_the_sender() {
    let state = test_state(Arc::new(CannedGenerator::new("x")));
    let addr = spawn_server(Arc::clone(&state)).await;
    let (mut socket, _) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("connect");
    next_event(&mut socket).await;

    let created = ConversationNode::new("B".into(), Some("R".into()), "Bob", "");
    for request in [
        ClientRequest::CreateNode(created.clone()),
        ClientRequest::CreateNode(created),
    ] {
        socket
            .send(WsMessage::Text(
                serde_json::to_string(&request).expect("encode"),
            ))
            .await
            .expect("send");
    }
    match next_event(&mut socket).await {
        ServerEvent::Error(err) => assert_eq!(err.code, ErrorCode::Validation),
        other => panic!("expected error, got {other:?}"),
    }

    socket
        .send(WsMessage::Text("{\"type\":\"nope\"}".into()))
        .await
        .expect("send");
    match next_event(&mut socket).await {
        ServerEvent::Error(err) => assert_eq!(err.code, ErrorCode::Validation),
        other => panic!("expected error, got {other:?}"),
    }

    assert!(state
        .story
        .lock()
        .await
        .tree()
        .contains_key(&NodeId::from("B")));
}

#[tokio::test]
async fn failed_generation_reports_error_and_completes_unchanged() {
    let state = test_state(Arc::new(FailingGenerator));
    let job = match state
        .story
        .lock()
        .await
        .apply(ClientRequest::RegenNode {
            nid: NodeId::from("A"),
            extend: false,
        })
        .expect("regen")
    {
        Outcome::Generate(job) => job,
        other => panic!("expected a generation job, got {other:?}"),
    };

    let mut events = state.events.subscribe();
    let (reply_tx, mut reply_rx) = tokio::sync::mpsc::unbounded_channel();
    run_generation(Arc::clone(&state), job, reply_tx).await;

    match reply_rx.recv().await.expect("reply") {
        ServerEvent::Error(err) => assert_eq!(err.code, ErrorCode::Generation),
        other => panic!("expected a generation error, got {other:?}"),
    }
    assert_eq!(
        events.recv().await.expect("event"),
        ServerEvent::RegenComplete {
            nid: NodeId::from("A"),
            text: "Hi.".into(),
        }
    );
}
