//! What the on-screen side receives and when.
//!
//! [`ViewBinder::rebuild`] after a load or any structural change (the layout
//! has been recomputed first); [`ViewBinder::refresh_node`] after a content
//! edit, a lock transition or a regenerate completion;
//! [`ViewBinder::show_placeholder`] on every placeholder tick.

use serde::Serialize;
use shared::domain::{character_color, ConversationNode, NodeId};

use crate::{
    generation::GenerationLock,
    layout::{Connector, Layout, NodeBox},
    markdown,
    tree_store::TreeStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeAction {
    Clone,
    Delete,
    AddChild,
    Regenerate,
    Continue,
}

impl NodeAction {
    pub fn available(is_root: bool) -> &'static [NodeAction] {
        if is_root {
            &[NodeAction::AddChild, NodeAction::Regenerate]
        } else {
            &[
                NodeAction::Clone,
                NodeAction::Delete,
                NodeAction::AddChild,
                NodeAction::Regenerate,
                NodeAction::Continue,
            ]
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeView {
    pub nid: NodeId,
    pub is_root: bool,
    pub left: f64,
    pub top: f64,
    pub border_color: String,
    pub sender: String,
    pub senders: Vec<String>,
    pub text: String,
    /// Rendered text, or the placeholder while a regenerate is pending. The
    /// root always shows its raw text, so it has no markup.
    pub markup: Option<String>,
    pub editable: bool,
    pub actions: Vec<NodeAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectorView {
    pub parent: NodeId,
    pub child: NodeId,
    pub path: String,
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl From<&Connector> for ConnectorView {
    fn from(connector: &Connector) -> Self {
        let bounds = connector.bounds(crate::layout::CONNECTOR_PADDING);
        Self {
            parent: connector.parent.clone(),
            child: connector.child.clone(),
            path: connector.path_data(),
            left: bounds.left,
            top: bounds.top,
            width: bounds.width,
            height: bounds.height,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Scene {
    pub nodes: Vec<NodeView>,
    pub connectors: Vec<ConnectorView>,
}

impl Scene {
    pub fn node(&self, nid: &NodeId) -> Option<&NodeView> {
        self.nodes.iter().find(|n| &n.nid == nid)
    }
}

pub trait ViewBinder: Send {
    fn rebuild(&mut self, scene: &Scene);
    fn refresh_node(&mut self, view: &NodeView);
    fn show_placeholder(&mut self, nid: &NodeId, markup: &str);
}

/// Binder for headless use: keeps the latest scene up to date and nothing else.
#[derive(Debug, Default)]
pub struct SceneCache {
    scene: Scene,
}

impl SceneCache {
    pub fn scene(&self) -> &Scene {
        &self.scene
    }
}

impl ViewBinder for SceneCache {
    fn rebuild(&mut self, scene: &Scene) {
        self.scene = scene.clone();
    }

    fn refresh_node(&mut self, view: &NodeView) {
        if let Some(existing) = self.scene.nodes.iter_mut().find(|n| n.nid == view.nid) {
            *existing = view.clone();
        }
    }

    fn show_placeholder(&mut self, nid: &NodeId, markup: &str) {
        if let Some(existing) = self.scene.nodes.iter_mut().find(|n| &n.nid == nid) {
            existing.markup = Some(markup.to_string());
        }
    }
}

pub fn node_view(
    node: &ConversationNode,
    geometry: Option<&NodeBox>,
    store: &TreeStore,
    lock: &GenerationLock,
) -> NodeView {
    let is_root = node.is_root();
    let pending = lock.is_pending(&node.nid);
    let markup = match (is_root, pending) {
        (_, true) => Some(markdown::placeholder(crate::generation::PLACEHOLDER_FRAMES[0])),
        (true, false) => None,
        (false, false) => Some(markdown::render(&node.text)),
    };

    NodeView {
        nid: node.nid.clone(),
        is_root,
        left: geometry.map(|g| g.left).unwrap_or_default(),
        top: geometry.map(|g| g.y).unwrap_or_default(),
        border_color: character_color(store.characters(), &node.sender).to_string(),
        sender: node.sender.clone(),
        senders: store.characters().keys().cloned().collect(),
        text: node.text.clone(),
        markup,
        editable: !pending,
        actions: NodeAction::available(is_root).to_vec(),
    }
}

/// Full scene in pre-order from the root, connectors in layout order.
pub fn build_scene(store: &TreeStore, layout: &Layout, lock: &GenerationLock) -> Scene {
    let order = store.pre_order(&layout.root).unwrap_or_default();
    let nodes = order
        .iter()
        .filter_map(|nid| store.get(nid))
        .map(|node| node_view(node, layout.get(&node.nid), store, lock))
        .collect();
    let connectors = layout.connectors.iter().map(ConnectorView::from).collect();
    Scene { nodes, connectors }
}
