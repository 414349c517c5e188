//! Layered tidy-tree layout.
//!
//! Two passes over the tree rooted at [`TreeStore::get_root`]: subtree widths
//! bottom-up, then absolute positions top-down. Every depth level is one flat
//! horizontal band. There is no incremental mode; any structural change means
//! running [`compute_layout`] again over the whole tree.

use std::collections::HashMap;

use serde::Serialize;
use shared::domain::NodeId;

use crate::{error::TreeError, tree_store::TreeStore};

pub const NODE_WIDTH: f64 = 300.0;
pub const NODE_HEIGHT: f64 = 200.0;
pub const NODE_H_MARGIN: f64 = 20.0;
pub const NODE_V_MARGIN: f64 = 75.0;
/// Padding plus border between the box content and its outline, top and bottom.
pub const NODE_PADDING: f64 = 18.0;
pub const ROOT_TOP: f64 = 20.0;
pub const CONNECTOR_PADDING: f64 = 2.0;
/// The root spreads its outgoing connectors over a notional box this many
/// times wider than a regular node.
pub const ROOT_CONNECTOR_SPREAD: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LayoutConfig {
    pub node_width: f64,
    pub node_height: f64,
    pub h_margin: f64,
    pub v_margin: f64,
    pub padding: f64,
    pub root_top: f64,
    pub root_connector_spread: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            node_width: NODE_WIDTH,
            node_height: NODE_HEIGHT,
            h_margin: NODE_H_MARGIN,
            v_margin: NODE_V_MARGIN,
            padding: NODE_PADDING,
            root_top: ROOT_TOP,
            root_connector_spread: ROOT_CONNECTOR_SPREAD,
        }
    }
}

impl LayoutConfig {
    fn layer_step(&self) -> f64 {
        self.node_height + self.v_margin
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Layout-derived geometry of one node. Recomputed, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NodeBox {
    /// Width of the node's whole subtree.
    pub size: f64,
    /// Horizontal center of the subtree span; the box is centered on it.
    pub x: f64,
    /// Top edge of the box.
    pub y: f64,
    /// Left edge of the box.
    pub left: f64,
    pub depth: usize,
}

impl NodeBox {
    pub fn span(&self) -> (f64, f64) {
        (self.x - self.size / 2.0, self.x + self.size / 2.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// Parent -> child edge: from a slot on the parent's bottom edge to the
/// child's top-center.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Connector {
    pub parent: NodeId,
    pub child: NodeId,
    pub from: Point,
    pub to: Point,
}

impl Connector {
    /// Cubic curve leaving the parent vertically and entering the child vertically.
    pub fn path_data(&self) -> String {
        let (a, b) = (self.from, self.to);
        format!(
            "M {} {} C {} {}, {} {}, {} {}",
            a.x, a.y, a.x, b.y, b.x, a.y, b.x, b.y
        )
    }

    /// Box enclosing both endpoints, grown by `padding` on every side.
    pub fn bounds(&self, padding: f64) -> Bounds {
        let left = self.from.x.min(self.to.x) - padding;
        let top = self.from.y.min(self.to.y) - padding;
        Bounds {
            left,
            top,
            width: (self.from.x - self.to.x).abs() + padding * 2.0,
            height: (self.to.y - self.from.y).abs() + padding * 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layout {
    pub root: NodeId,
    pub viewport_width: f64,
    pub boxes: HashMap<NodeId, NodeBox>,
    pub connectors: Vec<Connector>,
}

impl Layout {
    pub fn get(&self, nid: &NodeId) -> Option<&NodeBox> {
        self.boxes.get(nid)
    }

    pub fn connector_to(&self, child: &NodeId) -> Option<&Connector> {
        self.connectors.iter().find(|c| &c.child == child)
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }
}

/// Subtree width of every node reachable from the root (post-order pass).
pub fn subtree_sizes(
    store: &TreeStore,
    config: &LayoutConfig,
) -> Result<HashMap<NodeId, f64>, TreeError> {
    let root = store.get_root()?;
    let order = store.pre_order(&root.nid)?;
    let mut sizes: HashMap<NodeId, f64> = HashMap::with_capacity(order.len());

    // Reversed pre-order visits every child before its parent.
    for nid in order.iter().rev() {
        let node = store.node(nid)?;
        let gaps = node.children.len().saturating_sub(1) as f64 * config.h_margin;
        let children: f64 = node
            .children
            .iter()
            .map(|c| sizes.get(c).copied().unwrap_or(config.node_width))
            .sum();
        sizes.insert(nid.clone(), (children + gaps).max(config.node_width));
    }
    Ok(sizes)
}

pub fn compute_layout(
    store: &TreeStore,
    viewport_width: f64,
    config: &LayoutConfig,
) -> Result<Layout, TreeError> {
    let root = store.get_root()?;
    let sizes = subtree_sizes(store, config)?;
    let order = store.pre_order(&root.nid)?;

    let root_size = sizes[&root.nid];
    let mut root_x = viewport_width / 2.0;
    if root_x - root_size / 2.0 < 0.0 {
        root_x = root_size / 2.0;
    }

    let mut boxes: HashMap<NodeId, NodeBox> = HashMap::with_capacity(order.len());
    boxes.insert(
        root.nid.clone(),
        NodeBox {
            size: root_size,
            x: root_x,
            y: config.root_top,
            left: root_x - config.node_width / 2.0,
            depth: 0,
        },
    );

    let mut connectors = Vec::with_capacity(order.len().saturating_sub(1));

    // Pre-order: a parent is always placed before its children.
    for nid in &order {
        let node = store.node(nid)?;
        let parent_box = boxes[nid];
        let is_root = nid == &root.nid;

        let mut cursor = parent_box.x - parent_box.size / 2.0;
        let child_y = parent_box.y + config.layer_step();

        let spread = if is_root {
            config.node_width * config.root_connector_spread
        } else {
            config.node_width
        };
        let slot_left = parent_box.x - spread / 2.0;
        let slot_step = spread / (node.children.len() + 1) as f64;
        let slot_y = parent_box.y + config.node_height + config.padding;

        for (index, child_id) in node.children.iter().enumerate() {
            let size = sizes[child_id];
            let x = cursor + size / 2.0;
            boxes.insert(
                child_id.clone(),
                NodeBox {
                    size,
                    x,
                    y: child_y,
                    left: x - config.node_width / 2.0,
                    depth: parent_box.depth + 1,
                },
            );
            connectors.push(Connector {
                parent: nid.clone(),
                child: child_id.clone(),
                from: Point {
                    x: slot_left + slot_step * (index + 1) as f64,
                    y: slot_y,
                },
                to: Point { x, y: child_y },
            });
            cursor += size + config.h_margin;
        }
    }

    Ok(Layout {
        root: root.nid.clone(),
        viewport_width,
        boxes,
        connectors,
    })
}

#[cfg(test)]
#[path = "tests/layout_tests.rs"]
mod tests;
