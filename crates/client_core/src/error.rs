use shared::domain::NodeId;
use thiserror::Error;

/// Structural problems that make the tree unusable for a layout pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Invariant {
    #[error("no root node found among {node_count} nodes")]
    NoRoot { node_count: usize },
    #[error("found {} root nodes, expected exactly one", roots.len())]
    MultipleRoots { roots: Vec<NodeId> },
    #[error("node {parent} lists child {child} which does not exist")]
    DanglingChild { parent: NodeId, child: NodeId },
    #[error("node {node} claims parent {claimed:?} but is listed under {listed_under}")]
    ParentMismatch {
        node: NodeId,
        claimed: Option<NodeId>,
        listed_under: NodeId,
    },
    #[error("node {node} claims parent {parent} which does not list it")]
    Orphan { node: NodeId, parent: NodeId },
    #[error("node {0} is listed as a child more than once")]
    DuplicateChild(NodeId),
    #[error("node {0} is part of a cycle")]
    Cycle(NodeId),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("tree invariant violated: {0}")]
    InvariantViolation(#[from] Invariant),
    /// The referenced node is no longer present locally.
    #[error("node {0} is not present in the local tree")]
    StaleReference(NodeId),
    /// A regenerate was requested while one is already outstanding for the node.
    #[error("regenerate already pending for node {0}")]
    RedundantRequest(NodeId),
    #[error("node {0} is locked while a regenerate is pending")]
    NodeLocked(NodeId),
    #[error("the root node {0} cannot be deleted or cloned")]
    RootProtected(NodeId),
    #[error("node {0} already exists")]
    DuplicateNode(NodeId),
}

impl TreeError {
    /// Benign races and duplicate clicks; callers drop these silently.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::StaleReference(_) | Self::RedundantRequest(_))
    }
}
