use std::sync::{Arc, Mutex};

use shared::{
    domain::{Character, CharacterRegistry, ConversationNode, ConversationTree, NodeId},
    protocol::ClientRequest,
};

use crate::{sync::RequestSink, tree_store::TreeStore};

pub(crate) fn nid(id: &str) -> NodeId {
    NodeId::from(id)
}

/// Builds a tree from `(nid, parent, sender)` triples; children keep the
/// order in which they appear.
pub(crate) fn tree(entries: &[(&str, Option<&str>, &str)]) -> ConversationTree {
    let mut nodes = ConversationTree::new();
    for (id, parent, sender) in entries {
        nodes.insert(
            nid(id),
            ConversationNode::new(nid(id), parent.map(nid), *sender, format!("text of {id}")),
        );
    }
    for (id, parent, _) in entries {
        if let Some(parent) = parent {
            nodes
                .get_mut(&nid(parent))
                .expect("parent listed before use")
                .children
                .push(nid(id));
        }
    }
    nodes
}

pub(crate) fn characters() -> CharacterRegistry {
    let mut registry = CharacterRegistry::new();
    for (name, color) in [("System", "#888888"), ("Alice", "#ff0000"), ("Bob", "#0000ff")] {
        registry.insert(
            name.to_string(),
            Character {
                color: Some(color.to_string()),
                ..Character::default()
            },
        );
    }
    registry
}

/// R -> [A -> [C], B]
pub(crate) fn sample_tree() -> ConversationTree {
    tree(&[
        ("R", None, "System"),
        ("A", Some("R"), "Alice"),
        ("B", Some("R"), "Bob"),
        ("C", Some("A"), "Bob"),
    ])
}

pub(crate) fn sample_store() -> TreeStore {
    TreeStore::from_parts(sample_tree(), characters())
}

#[derive(Default, Clone)]
pub(crate) struct RecordingSink {
    pub sent: Arc<Mutex<Vec<ClientRequest>>>,
}

impl RecordingSink {
    pub(crate) fn take(&self) -> Vec<ClientRequest> {
        std::mem::take(&mut *self.sent.lock().expect("sink lock"))
    }
}

impl RequestSink for RecordingSink {
    fn send(&self, request: ClientRequest) {
        self.sent.lock().expect("sink lock").push(request);
    }
}
