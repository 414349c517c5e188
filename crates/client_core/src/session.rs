//! The coordinating module: owns the tree, the lock table and the latest
//! layout, and is the only place where they change.
//!
//! Every input (user action, server event, placeholder tick) is handled to
//! completion before the next one. Local mutations are applied optimistically
//! and then announced to the remote side; nothing is rolled back.

use std::sync::Arc;

use shared::{
    domain::{CharacterRegistry, ConversationNode, ConversationTree, NodeId, SYSTEM_SPEAKER},
    protocol::ServerEvent,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{
    error::TreeError,
    generation::{GenerationLock, ManualTicks, TickSource, TICK_INTERVAL},
    layout::{compute_layout, Layout, LayoutConfig},
    markdown,
    sync::{apply_load, apply_regen_complete, RegenOutcome, SyncClient},
    tree_store::TreeStore,
    view::{build_scene, node_view, Scene, ViewBinder},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    EditSender { nid: NodeId, sender: String },
    EditText { nid: NodeId, text: String },
    AddChild { parent: NodeId },
    Clone { nid: NodeId },
    Delete { nid: NodeId },
    Regenerate { nid: NodeId, extend: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionInput {
    Server(ServerEvent),
    Tick(NodeId),
    Action(UserAction),
}

pub struct StorySession<V: ViewBinder> {
    store: TreeStore,
    lock: GenerationLock,
    layout: Option<Layout>,
    config: LayoutConfig,
    viewport_width: f64,
    sync: SyncClient,
    ticks: Arc<dyn TickSource>,
    view: V,
}

impl<V: ViewBinder> StorySession<V> {
    pub fn new(sync: SyncClient, view: V, viewport_width: f64) -> Self {
        Self {
            store: TreeStore::new(),
            lock: GenerationLock::new(),
            layout: None,
            config: LayoutConfig::default(),
            viewport_width,
            sync,
            ticks: Arc::new(ManualTicks),
            view,
        }
    }

    pub fn with_ticks(mut self, ticks: Arc<dyn TickSource>) -> Self {
        self.ticks = ticks;
        self
    }

    pub fn with_layout_config(mut self, config: LayoutConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &TreeStore {
        &self.store
    }

    pub fn lock(&self) -> &GenerationLock {
        &self.lock
    }

    pub fn layout(&self) -> Option<&Layout> {
        self.layout.as_ref()
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn scene(&self) -> Option<Scene> {
        self.layout
            .as_ref()
            .map(|layout| build_scene(&self.store, layout, &self.lock))
    }

    /// Takes effect on the next layout run; resizing alone never re-lays out.
    pub fn set_viewport_width(&mut self, width: f64) {
        self.viewport_width = width;
    }

    pub fn load(
        &mut self,
        characters: CharacterRegistry,
        tree: ConversationTree,
    ) -> Result<(), TreeError> {
        info!(
            nodes = tree.len(),
            characters = characters.len(),
            "loading conversation tree"
        );
        apply_load(&mut self.store, &mut self.lock, characters, tree);
        self.relayout()
    }

    pub fn reset(&mut self) {
        self.store.clear();
        self.lock.clear();
        self.layout = None;
        self.view.rebuild(&Scene::default());
    }

    pub fn dispatch(&mut self, input: SessionInput) -> Result<(), TreeError> {
        match input {
            SessionInput::Server(event) => self.handle_server_event(event),
            SessionInput::Tick(nid) => {
                self.tick(&nid);
                Ok(())
            }
            SessionInput::Action(action) => self.perform(action),
        }
    }

    pub fn perform(&mut self, action: UserAction) -> Result<(), TreeError> {
        match action {
            UserAction::EditSender { nid, sender } => self.edit_sender(&nid, sender),
            UserAction::EditText { nid, text } => self.edit_text(&nid, text),
            UserAction::AddChild { parent } => self.add_child(&parent).map(|_| ()),
            UserAction::Clone { nid } => self.clone_node(&nid).map(|_| ()),
            UserAction::Delete { nid } => self.delete_node(&nid).map(|_| ()),
            UserAction::Regenerate { nid, extend } => self.regenerate(&nid, extend),
        }
    }

    pub fn handle_server_event(&mut self, event: ServerEvent) -> Result<(), TreeError> {
        match event {
            ServerEvent::Load { characters, tree } => self.load(characters, tree),
            ServerEvent::RegenComplete { nid, text } => match self.regen_complete(&nid, text) {
                RegenOutcome::Stale => Err(TreeError::StaleReference(nid)),
                RegenOutcome::Applied | RegenOutcome::NotPending => Ok(()),
            },
            ServerEvent::Error(err) => {
                warn!(code = ?err.code, message = %err.message, "remote reported an error");
                Ok(())
            }
        }
    }

    pub fn edit_sender(&mut self, nid: &NodeId, sender: String) -> Result<(), TreeError> {
        self.ensure_unlocked(nid)?;
        let node = self.store.node_mut(nid)?;
        node.sender = sender;
        self.sync.edit_node(node);
        self.refresh(nid);
        Ok(())
    }

    pub fn edit_text(&mut self, nid: &NodeId, text: String) -> Result<(), TreeError> {
        self.ensure_unlocked(nid)?;
        let node = self.store.node_mut(nid)?;
        node.text = text;
        self.sync.edit_node(node);
        self.refresh(nid);
        Ok(())
    }

    pub fn add_child(&mut self, parent: &NodeId) -> Result<NodeId, TreeError> {
        self.ensure_unlocked(parent)?;
        let parent_node = self.store.node(parent)?;
        let sender = default_child_sender(self.store.characters(), parent_node);
        let child = ConversationNode::new(NodeId::generate(), Some(parent.clone()), sender, "");

        self.store.insert_child(parent, child.clone())?;
        self.relayout()?;

        self.sync.create_node(&child);
        self.sync.edit_node(self.store.node(parent)?);
        Ok(child.nid)
    }

    /// Shallow copy placed right after the source among its siblings. Refused
    /// while the parent is Pending, since its children list would change.
    pub fn clone_node(&mut self, nid: &NodeId) -> Result<NodeId, TreeError> {
        self.ensure_unlocked(nid)?;
        let source = self.store.node(nid)?;
        let Some(parent) = source.parent.clone() else {
            return Err(TreeError::RootProtected(nid.clone()));
        };
        self.ensure_unlocked(&parent)?;
        let copy = ConversationNode::new(
            NodeId::generate(),
            Some(parent.clone()),
            source.sender.clone(),
            source.text.clone(),
        );
        let index = self
            .store
            .node(&parent)?
            .children
            .iter()
            .position(|c| c == nid)
            .map_or(usize::MAX, |i| i + 1);

        self.store.insert_child_at(&parent, copy.clone(), index)?;
        self.relayout()?;

        self.sync.clone_node(&copy);
        self.sync.edit_node(self.store.node(&parent)?);
        Ok(copy.nid)
    }

    /// Removes the node and its whole subtree. Returns the removed ids,
    /// children before parents, in the order they were announced. Refused
    /// while the parent is Pending.
    pub fn delete_node(&mut self, nid: &NodeId) -> Result<Vec<NodeId>, TreeError> {
        self.ensure_unlocked(nid)?;
        let Some(parent) = self.store.node(nid)?.parent.clone() else {
            return Err(TreeError::RootProtected(nid.clone()));
        };
        self.ensure_unlocked(&parent)?;

        let removed = self.store.delete_subtree(nid)?;
        for id in &removed {
            if self.lock.release(id) {
                debug!(nid = %id, "dropped pending regenerate for deleted node");
            }
        }
        self.relayout()?;

        for id in &removed {
            self.sync.delete_node(id);
        }
        self.sync.edit_node(self.store.node(&parent)?);
        Ok(removed)
    }

    /// Free -> Pending and one `regen_node` out. A node that is already
    /// Pending is left as it is and nothing is sent.
    pub fn regenerate(&mut self, nid: &NodeId, extend: bool) -> Result<(), TreeError> {
        self.store.node(nid)?;
        let ticks = Arc::clone(&self.ticks);
        self.lock
            .acquire(nid, extend, || ticks.start(nid, TICK_INTERVAL))?;
        self.refresh(nid);
        self.sync.regen_node(nid, extend);
        Ok(())
    }

    pub fn regen_complete(&mut self, nid: &NodeId, text: String) -> RegenOutcome {
        let outcome = apply_regen_complete(&mut self.store, &mut self.lock, nid, text);
        if outcome == RegenOutcome::Applied {
            self.refresh(nid);
        }
        outcome
    }

    pub fn tick(&mut self, nid: &NodeId) {
        if let Some(frame) = self.lock.advance(nid) {
            self.view.show_placeholder(nid, &markdown::placeholder(frame));
        }
    }

    /// Feeds inputs through [`Self::dispatch`] until every sender is gone.
    pub async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<SessionInput>) -> Self {
        while let Some(input) = inbox.recv().await {
            if let Err(err) = self.dispatch(input) {
                if err.is_recoverable() {
                    debug!(%err, "ignored input");
                } else {
                    warn!(%err, "input rejected");
                }
            }
        }
        self
    }

    fn ensure_unlocked(&self, nid: &NodeId) -> Result<(), TreeError> {
        self.store.node(nid)?;
        if self.lock.is_pending(nid) {
            return Err(TreeError::NodeLocked(nid.clone()));
        }
        Ok(())
    }

    fn relayout(&mut self) -> Result<(), TreeError> {
        match compute_layout(&self.store, self.viewport_width, &self.config) {
            Ok(layout) => {
                let scene = build_scene(&self.store, &layout, &self.lock);
                self.view.rebuild(&scene);
                self.layout = Some(layout);
                Ok(())
            }
            Err(err) => {
                error!(%err, "layout pass aborted");
                self.layout = None;
                Err(err)
            }
        }
    }

    fn refresh(&mut self, nid: &NodeId) {
        let Some(node) = self.store.get(nid) else {
            return;
        };
        let geometry = self.layout.as_ref().and_then(|l| l.get(nid));
        let view = node_view(node, geometry, &self.store, &self.lock);
        self.view.refresh_node(&view);
    }
}

/// First registered speaker that is neither the parent's nor the system,
/// so a new turn answers the one above it.
pub fn default_child_sender(characters: &CharacterRegistry, parent: &ConversationNode) -> String {
    characters
        .keys()
        .find(|name| name.as_str() != parent.sender && name.as_str() != SYSTEM_SPEAKER)
        .cloned()
        .unwrap_or_else(|| parent.sender.clone())
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
