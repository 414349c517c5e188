//! Authoritative copy of the conversation tree and the character sheet.
//!
//! Client requests are applied as given. The only derived state the server
//! produces itself is regenerated text.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde_json::Value;
use shared::{
    domain::{CharacterRegistry, ConversationNode, ConversationTree, NodeId, SYSTEM_SPEAKER},
    error::{ApiException, ErrorCode},
    protocol::{ClientRequest, ServerEvent},
};
use tracing::{debug, info, warn};

/// Separator placed between kept text and a continuation.
const EXTEND_SEPARATOR: &str = "  ";

#[derive(Debug, Clone, PartialEq)]
pub struct RegenJob {
    pub nid: NodeId,
    pub prompt: String,
    pub existing: String,
    pub extend: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Stored,
    Broadcast(ServerEvent),
    Generate(RegenJob),
}

#[derive(Debug, Clone, Default)]
pub struct Story {
    characters: CharacterRegistry,
    tree: ConversationTree,
    /// Re-read on every root regenerate when set.
    characters_file: Option<PathBuf>,
}

impl Story {
    /// An empty tree gets a `System` root holding the character prompt.
    pub fn new(characters: CharacterRegistry, mut tree: ConversationTree) -> Self {
        if tree.is_empty() {
            let root = ConversationNode::new(
                NodeId::generate(),
                None,
                SYSTEM_SPEAKER,
                build_prompt(&characters),
            );
            info!(nid = %root.nid, "seeded empty tree with a system root");
            tree.insert(root.nid.clone(), root);
        }
        Self {
            characters,
            tree,
            characters_file: None,
        }
    }

    pub fn from_files(characters_file: &Path, tree_file: &Path) -> anyhow::Result<Self> {
        let characters = read_characters(characters_file)?;
        let tree = match fs::read_to_string(tree_file) {
            Ok(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("invalid tree file '{}'", tree_file.display()))?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => ConversationTree::new(),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to read tree file '{}'", tree_file.display())
                })
            }
        };

        let mut story = Self::new(characters, tree);
        story.characters_file = Some(characters_file.to_path_buf());
        Ok(story)
    }

    pub fn characters(&self) -> &CharacterRegistry {
        &self.characters
    }

    pub fn tree(&self) -> &ConversationTree {
        &self.tree
    }

    pub fn snapshot(&self) -> ServerEvent {
        ServerEvent::Load {
            characters: self.characters.clone(),
            tree: self.tree.clone(),
        }
    }

    pub fn apply(&mut self, request: ClientRequest) -> Result<Outcome, ApiException> {
        match request {
            ClientRequest::EditNode(node) => {
                self.tree.insert(node.nid.clone(), node);
                Ok(Outcome::Stored)
            }
            ClientRequest::DeleteNode { nid } => {
                if self.tree.remove(&nid).is_none() {
                    debug!(%nid, "delete for unknown node ignored");
                }
                Ok(Outcome::Stored)
            }
            ClientRequest::CreateNode(node) | ClientRequest::CloneNode(node) => {
                if self.tree.contains_key(&node.nid) {
                    return Err(ApiException::new(
                        ErrorCode::Validation,
                        format!("node {} already exists", node.nid),
                    ));
                }
                self.tree.insert(node.nid.clone(), node);
                Ok(Outcome::Stored)
            }
            ClientRequest::RegenNode { nid, extend } => self.regenerate(nid, extend),
        }
    }

    fn regenerate(&mut self, nid: NodeId, extend: bool) -> Result<Outcome, ApiException> {
        if self.tree.get(&nid).is_some_and(|n| n.parent.is_none()) {
            self.reload_characters();
        }
        let Some(node) = self.tree.get_mut(&nid) else {
            return Err(ApiException::new(
                ErrorCode::NotFound,
                format!("node {nid} not found for regeneration"),
            ));
        };

        let Some(parent) = node.parent.clone() else {
            node.text = build_prompt(&self.characters);
            return Ok(Outcome::Broadcast(ServerEvent::RegenComplete {
                nid,
                text: node.text.clone(),
            }));
        };

        let existing = node.text.trim().to_string();
        let sender = node.sender.clone();
        let mut prompt = chat_log(&self.tree, &parent);
        prompt.push_str(&sender);
        prompt.push(':');
        if extend {
            prompt.push(' ');
            prompt.push_str(&existing);
        }

        Ok(Outcome::Generate(RegenJob {
            nid,
            prompt,
            existing,
            extend,
        }))
    }

    /// Picks up edits to the character sheet. A sheet that fails to load
    /// leaves the current registry in place.
    fn reload_characters(&mut self) {
        let Some(path) = &self.characters_file else {
            return;
        };
        match read_characters(path) {
            Ok(characters) => {
                debug!(characters = characters.len(), "reloaded character sheet");
                self.characters = characters;
            }
            Err(err) => warn!(%err, "keeping previous character sheet"),
        }
    }

    /// Stores the generated text. Returns the event to broadcast, or `None`
    /// when the node was deleted while generating.
    pub fn finish_regen(&mut self, job: &RegenJob, generated: &str) -> Option<ServerEvent> {
        let Some(node) = self.tree.get_mut(&job.nid) else {
            warn!(nid = %job.nid, "regenerated node no longer exists");
            return None;
        };

        let reply = generated.lines().next().unwrap_or_default().trim();
        if reply.is_empty() {
            info!(nid = %job.nid, "generator produced no text");
        } else if job.extend {
            node.text = format!("{}{EXTEND_SEPARATOR}{reply}", job.existing);
        } else {
            node.text = reply.to_string();
        }

        Some(ServerEvent::RegenComplete {
            nid: job.nid.clone(),
            text: node.text.clone(),
        })
    }
}

fn read_characters(path: &Path) -> anyhow::Result<CharacterRegistry> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read characters file '{}'", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("invalid characters file '{}'", path.display()))
}

/// Character block per character that has traits, then the system context,
/// then the start marker.
pub fn build_prompt(characters: &CharacterRegistry) -> String {
    let mut prompt = String::new();

    for (name, character) in characters {
        let Some(Value::Object(traits)) = character.extra.get("traits") else {
            continue;
        };
        prompt.push_str("[\n");
        prompt.push_str(&format!("  name: \"{name}\"\n"));
        for (trait_name, value) in traits {
            let value = match value {
                Value::Array(items) => items
                    .iter()
                    .map(|item| format!("\"{}\"", plain(item)))
                    .collect::<Vec<_>>()
                    .join(" + "),
                other => format!("\"{}\"", plain(other)),
            };
            prompt.push_str(&format!("  {trait_name}: {value}\n"));
        }
        prompt.push_str("]\n\n");
    }

    if let Some(context) = characters
        .get(SYSTEM_SPEAKER)
        .and_then(|system| system.extra.get("context"))
    {
        prompt.push_str(&format!("***\n{}\n", plain(context)));
    }

    prompt.push_str("***\n<START>");
    prompt
}

/// One line per node from the root down to `nid`. System lines carry no
/// speaker prefix.
pub fn chat_log(tree: &ConversationTree, nid: &NodeId) -> String {
    let mut lines = Vec::new();
    let mut cursor = Some(nid);
    while let Some(id) = cursor {
        let Some(node) = tree.get(id) else {
            warn!(nid = %id, "chat log stopped at a missing node");
            break;
        };
        if node.sender == SYSTEM_SPEAKER {
            lines.push(format!("{}\n", node.text));
        } else {
            lines.push(format!("{}: {}\n", node.sender, node.text));
        }
        if lines.len() > tree.len() {
            warn!(nid = %nid, "chat log found a parent cycle");
            break;
        }
        cursor = node.parent.as_ref();
    }
    lines.reverse();
    lines.concat()
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[path = "tests/story_tests.rs"]
mod tests;
