//! Local mutations out, remote events in.

use std::sync::Arc;

use shared::{
    domain::{CharacterRegistry, ConversationNode, ConversationTree, NodeId},
    protocol::ClientRequest,
};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{generation::GenerationLock, tree_store::TreeStore};

/// Fire-and-forget outbound channel to the remote collaborator.
pub trait RequestSink: Send + Sync {
    fn send(&self, request: ClientRequest);
}

/// Sink used before a connection exists; everything is dropped.
pub struct DisconnectedSink;

impl RequestSink for DisconnectedSink {
    fn send(&self, request: ClientRequest) {
        debug!(request = request.name(), "no connection; dropping outbound request");
    }
}

/// Hands requests to the transport's writer task.
#[derive(Clone)]
pub struct ChannelSink(mpsc::UnboundedSender<ClientRequest>);

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<ClientRequest>) -> Self {
        Self(tx)
    }
}

impl RequestSink for ChannelSink {
    fn send(&self, request: ClientRequest) {
        let name = request.name();
        if self.0.send(request).is_err() {
            warn!(request = name, "transport writer closed; outbound request lost");
        }
    }
}

#[derive(Clone)]
pub struct SyncClient {
    sink: Arc<dyn RequestSink>,
}

impl SyncClient {
    pub fn new(sink: Arc<dyn RequestSink>) -> Self {
        Self { sink }
    }

    pub fn disconnected() -> Self {
        Self::new(Arc::new(DisconnectedSink))
    }

    pub fn edit_node(&self, node: &ConversationNode) {
        debug!(nid = %node.nid, "sync: edit_node");
        self.sink.send(ClientRequest::EditNode(node.clone()));
    }

    pub fn delete_node(&self, nid: &NodeId) {
        debug!(%nid, "sync: delete_node");
        self.sink.send(ClientRequest::DeleteNode { nid: nid.clone() });
    }

    pub fn create_node(&self, node: &ConversationNode) {
        debug!(nid = %node.nid, parent = ?node.parent, "sync: create_node");
        self.sink.send(ClientRequest::CreateNode(node.clone()));
    }

    pub fn clone_node(&self, node: &ConversationNode) {
        debug!(nid = %node.nid, parent = ?node.parent, "sync: clone_node");
        self.sink.send(ClientRequest::CloneNode(node.clone()));
    }

    pub fn regen_node(&self, nid: &NodeId, extend: bool) {
        debug!(%nid, extend, "sync: regen_node");
        self.sink.send(ClientRequest::RegenNode {
            nid: nid.clone(),
            extend,
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegenOutcome {
    /// Lock released and text replaced.
    Applied,
    /// Node exists but had no outstanding request; nothing changed.
    NotPending,
    /// Node is gone locally; the reply is dropped.
    Stale,
}

/// Full snapshot from the remote side. Locks survive only for nodes that are
/// still present, so their eventual completions are still accepted.
pub fn apply_load(
    store: &mut TreeStore,
    lock: &mut GenerationLock,
    characters: CharacterRegistry,
    tree: ConversationTree,
) {
    store.replace_all(tree, characters);
    lock.retain(|nid| store.contains(nid));
    if let Err(err) = store.check_integrity() {
        warn!(%err, nodes = store.len(), "loaded tree failed integrity check");
    }
}

pub fn apply_regen_complete(
    store: &mut TreeStore,
    lock: &mut GenerationLock,
    nid: &NodeId,
    text: String,
) -> RegenOutcome {
    let Some(node) = store.get_mut(nid) else {
        lock.release(nid);
        debug!(%nid, "regen_complete for unknown node dropped");
        return RegenOutcome::Stale;
    };
    if !lock.release(nid) {
        debug!(%nid, "regen_complete for node without pending request ignored");
        return RegenOutcome::NotPending;
    }
    node.text = text;
    RegenOutcome::Applied
}

#[cfg(test)]
#[path = "tests/sync_tests.rs"]
mod tests;
