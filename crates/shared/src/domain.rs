use std::{collections::BTreeMap, collections::HashMap, fmt};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Speaker used for the root node and for unprefixed chat log lines.
pub const SYSTEM_SPEAKER: &str = "System";

/// Border color used when a node's sender has no registered color.
pub const FALLBACK_COLOR: &str = "#000000";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    /// Client-chosen id for a locally created node. The remote side accepts it as given.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One turn in the conversation tree, exactly as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationNode {
    pub nid: NodeId,
    #[serde(default)]
    pub parent: Option<NodeId>,
    pub sender: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub children: Vec<NodeId>,
}

impl ConversationNode {
    pub fn new(
        nid: NodeId,
        parent: Option<NodeId>,
        sender: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            nid,
            parent,
            sender: sender.into(),
            text: text.into(),
            children: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Character sheet entry. Only `color` is interpreted locally; everything else
/// (traits, model name, context) is kept opaque and round-tripped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Character {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Speaker name -> character. Ordered by name so sender pickers are stable.
pub type CharacterRegistry = BTreeMap<String, Character>;

/// nid -> node, as sent in the `load` snapshot.
pub type ConversationTree = HashMap<NodeId, ConversationNode>;

pub fn character_color<'a>(characters: &'a CharacterRegistry, sender: &str) -> &'a str {
    characters
        .get(sender)
        .and_then(|c| c.color.as_deref())
        .unwrap_or(FALLBACK_COLOR)
}
