use serde::{Deserialize, Serialize};

use crate::{
    domain::{CharacterRegistry, ConversationNode, ConversationTree, NodeId},
    error::ApiError,
};

/// Outbound intents, one message per local mutation. Fire-and-forget except
/// `RegenNode`, which is eventually answered by `ServerEvent::RegenComplete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientRequest {
    /// Full node record; also sent for parents whose children list changed.
    EditNode(ConversationNode),
    DeleteNode {
        nid: NodeId,
    },
    /// New node with a client-chosen nid.
    CreateNode(ConversationNode),
    /// Copy of an existing node with a fresh client-chosen nid.
    CloneNode(ConversationNode),
    RegenNode {
        nid: NodeId,
        extend: bool,
    },
}

impl ClientRequest {
    pub fn name(&self) -> &'static str {
        match self {
            Self::EditNode(_) => "edit_node",
            Self::DeleteNode { .. } => "delete_node",
            Self::CreateNode(_) => "create_node",
            Self::CloneNode(_) => "clone_node",
            Self::RegenNode { .. } => "regen_node",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    Load {
        characters: CharacterRegistry,
        tree: ConversationTree,
    },
    RegenComplete {
        nid: NodeId,
        text: String,
    },
    Error(ApiError),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Load { .. } => "load",
            Self::RegenComplete { .. } => "regen_complete",
            Self::Error(_) => "error",
        }
    }
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
