use std::collections::HashSet;

use shared::domain::{CharacterRegistry, ConversationNode, ConversationTree, NodeId};

use crate::error::{Invariant, TreeError};

/// Locally known copy of the conversation tree and the character registry.
///
/// Nodes live in an id-indexed table; `parent` and `children` are lookups into
/// that table, never owning links.
#[derive(Debug, Default, Clone)]
pub struct TreeStore {
    nodes: ConversationTree,
    characters: CharacterRegistry,
}

impl TreeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(nodes: ConversationTree, characters: CharacterRegistry) -> Self {
        Self { nodes, characters }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, nid: &NodeId) -> Option<&ConversationNode> {
        self.nodes.get(nid)
    }

    pub fn get_mut(&mut self, nid: &NodeId) -> Option<&mut ConversationNode> {
        self.nodes.get_mut(nid)
    }

    pub fn contains(&self, nid: &NodeId) -> bool {
        self.nodes.contains_key(nid)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ConversationNode> {
        self.nodes.values()
    }

    pub fn characters(&self) -> &CharacterRegistry {
        &self.characters
    }

    pub fn node(&self, nid: &NodeId) -> Result<&ConversationNode, TreeError> {
        self.nodes
            .get(nid)
            .ok_or_else(|| TreeError::StaleReference(nid.clone()))
    }

    pub fn node_mut(&mut self, nid: &NodeId) -> Result<&mut ConversationNode, TreeError> {
        self.nodes
            .get_mut(nid)
            .ok_or_else(|| TreeError::StaleReference(nid.clone()))
    }

    pub fn get_root(&self) -> Result<&ConversationNode, TreeError> {
        let mut roots = self.nodes.values().filter(|n| n.parent.is_none());
        let Some(root) = roots.next() else {
            return Err(Invariant::NoRoot {
                node_count: self.nodes.len(),
            }
            .into());
        };
        if roots.next().is_some() {
            let mut roots: Vec<NodeId> = self
                .nodes
                .values()
                .filter(|n| n.parent.is_none())
                .map(|n| n.nid.clone())
                .collect();
            roots.sort();
            return Err(Invariant::MultipleRoots { roots }.into());
        }
        Ok(root)
    }

    /// Appends `node` to the end of `parent_id`'s children.
    pub fn insert_child(
        &mut self,
        parent_id: &NodeId,
        node: ConversationNode,
    ) -> Result<(), TreeError> {
        let index = self.node(parent_id)?.children.len();
        self.insert_child_at(parent_id, node, index)
    }

    /// Inserts `node` at `index` among `parent_id`'s children (clamped to the end).
    pub fn insert_child_at(
        &mut self,
        parent_id: &NodeId,
        node: ConversationNode,
        index: usize,
    ) -> Result<(), TreeError> {
        if node.parent.as_ref() != Some(parent_id) {
            return Err(Invariant::ParentMismatch {
                node: node.nid.clone(),
                claimed: node.parent.clone(),
                listed_under: parent_id.clone(),
            }
            .into());
        }
        if self.nodes.contains_key(&node.nid) {
            return Err(TreeError::DuplicateNode(node.nid));
        }

        let parent = self.node_mut(parent_id)?;
        let index = index.min(parent.children.len());
        parent.children.insert(index, node.nid.clone());
        self.nodes.insert(node.nid.clone(), node);
        Ok(())
    }

    /// Unlinks `nid` from its parent's children and returns a copy of it. The
    /// node and its descendants stay in the table so the caller can delete or
    /// re-parent them. Detaching the root changes nothing.
    pub fn detach_subtree(&mut self, nid: &NodeId) -> Result<ConversationNode, TreeError> {
        let node = self.node(nid)?.clone();
        if let Some(parent) = node.parent.as_ref().and_then(|p| self.nodes.get_mut(p)) {
            parent.children.retain(|c| c != nid);
        }
        Ok(node)
    }

    /// Detaches `nid`, then removes it and every descendant. Returns the
    /// removed ids in post-order (children before parents).
    pub fn delete_subtree(&mut self, nid: &NodeId) -> Result<Vec<NodeId>, TreeError> {
        self.detach_subtree(nid)?;
        let mut removed = Vec::new();

        // (id, children already pushed)
        let mut stack = vec![(nid.clone(), false)];
        while let Some((current, expanded)) = stack.pop() {
            if expanded {
                self.nodes.remove(&current);
                removed.push(current);
                continue;
            }
            let Some(node) = self.nodes.get(&current) else {
                continue;
            };
            let children = node.children.clone();
            stack.push((current, true));
            stack.extend(children.into_iter().rev().map(|c| (c, false)));
        }
        Ok(removed)
    }

    /// Wholesale swap; used only for the full-state `load` snapshot.
    pub fn replace_all(&mut self, nodes: ConversationTree, characters: CharacterRegistry) {
        self.nodes = nodes;
        self.characters = characters;
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.characters.clear();
    }

    /// Checks every tree invariant: one root, parent/children agreement,
    /// unique child ids and no cycles.
    pub fn check_integrity(&self) -> Result<(), TreeError> {
        let root = self.get_root()?;
        let mut listed: HashSet<&NodeId> = HashSet::new();

        for node in self.nodes.values() {
            for child_id in &node.children {
                let Some(child) = self.nodes.get(child_id) else {
                    return Err(Invariant::DanglingChild {
                        parent: node.nid.clone(),
                        child: child_id.clone(),
                    }
                    .into());
                };
                if child.parent.as_ref() != Some(&node.nid) {
                    return Err(Invariant::ParentMismatch {
                        node: child_id.clone(),
                        claimed: child.parent.clone(),
                        listed_under: node.nid.clone(),
                    }
                    .into());
                }
                if !listed.insert(child_id) {
                    return Err(Invariant::DuplicateChild(child_id.clone()).into());
                }
            }
        }

        for node in self.nodes.values() {
            if let Some(parent) = &node.parent {
                if !listed.contains(&node.nid) {
                    return Err(Invariant::Orphan {
                        node: node.nid.clone(),
                        parent: parent.clone(),
                    }
                    .into());
                }
            }
        }

        let reachable = self.pre_order(&root.nid)?;
        if reachable.len() != self.nodes.len() {
            // Every non-root node is listed exactly once, so the unreachable
            // ones must form a loop among themselves.
            let seen: HashSet<NodeId> = reachable.into_iter().collect();
            let stray = self
                .nodes
                .keys()
                .filter(|nid| !seen.contains(*nid))
                .min()
                .cloned()
                .unwrap_or_else(|| root.nid.clone());
            return Err(Invariant::Cycle(stray).into());
        }
        Ok(())
    }

    /// Pre-order walk from `start` (parents before children, siblings in
    /// display order).
    pub fn pre_order(&self, start: &NodeId) -> Result<Vec<NodeId>, TreeError> {
        let mut order = Vec::new();
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut stack = vec![start.clone()];

        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                return Err(Invariant::Cycle(current).into());
            }
            let node = self.nodes.get(&current).ok_or_else(|| {
                let parent = self
                    .nodes
                    .values()
                    .find(|n| n.children.contains(&current))
                    .map(|n| n.nid.clone())
                    .unwrap_or_else(|| start.clone());
                Invariant::DanglingChild {
                    parent,
                    child: current.clone(),
                }
            })?;
            stack.extend(node.children.iter().rev().cloned());
            order.push(current);
        }
        Ok(order)
    }

    /// Number of edges between `nid` and the root.
    pub fn depth(&self, nid: &NodeId) -> Option<usize> {
        let mut depth = 0;
        let mut current = self.nodes.get(nid)?;
        while let Some(parent) = &current.parent {
            current = self.nodes.get(parent)?;
            depth += 1;
            if depth > self.nodes.len() {
                return None;
            }
        }
        Some(depth)
    }
}

#[cfg(test)]
#[path = "tests/tree_store_tests.rs"]
mod tests;
