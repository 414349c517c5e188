use super::*;
use crate::test_support::{characters, nid, sample_store, tree};
use proptest::prelude::*;
use shared::domain::{ConversationNode, ConversationTree};

fn layout_of(store: &TreeStore, viewport: f64) -> Layout {
    compute_layout(store, viewport, &LayoutConfig::default()).expect("layout")
}

#[test]
fn leaf_and_internal_widths() {
    let sizes = subtree_sizes(&sample_store(), &LayoutConfig::default()).expect("sizes");
    assert_eq!(sizes[&nid("C")], NODE_WIDTH);
    assert_eq!(sizes[&nid("A")], NODE_WIDTH);
    assert_eq!(sizes[&nid("B")], NODE_WIDTH);
    assert_eq!(sizes[&nid("R")], 2.0 * NODE_WIDTH + NODE_H_MARGIN);
}

#[test]
fn places_children_side_by_side_one_layer_down() {
    let layout = layout_of(&sample_store(), 1000.0);

    let root = layout.get(&nid("R")).expect("root box");
    assert_eq!((root.x, root.y, root.left), (500.0, ROOT_TOP, 350.0));

    let a = layout.get(&nid("A")).expect("A");
    let b = layout.get(&nid("B")).expect("B");
    let c = layout.get(&nid("C")).expect("C");
    assert_eq!((a.x, a.y), (340.0, 295.0));
    assert_eq!((b.x, b.y), (660.0, 295.0));
    assert_eq!((c.x, c.y), (340.0, 570.0));
    assert_eq!(a.left, 190.0);
    assert_eq!(c.depth, 2);
}

#[test]
fn root_shifts_right_when_subtree_would_leave_the_viewport() {
    let layout = layout_of(&sample_store(), 400.0);
    let root = layout.get(&nid("R")).expect("root box");
    assert_eq!(root.x, 310.0);
    assert_eq!(root.x - root.size / 2.0, 0.0);
    assert_eq!(layout.get(&nid("A")).expect("A").x, 150.0);
}

#[test]
fn root_connectors_spread_over_double_width() {
    let layout = layout_of(&sample_store(), 1000.0);

    let to_a = layout.connector_to(&nid("A")).expect("R->A");
    assert_eq!(to_a.from, Point { x: 400.0, y: 238.0 });
    assert_eq!(to_a.to, Point { x: 340.0, y: 295.0 });

    let to_b = layout.connector_to(&nid("B")).expect("R->B");
    assert_eq!(to_b.from, Point { x: 600.0, y: 238.0 });

    let to_c = layout.connector_to(&nid("C")).expect("A->C");
    assert_eq!(to_c.parent, nid("A"));
    assert_eq!(to_c.from, Point { x: 340.0, y: 513.0 });
    assert_eq!(to_c.to, Point { x: 340.0, y: 570.0 });
    assert_eq!(layout.connectors.len(), 3);
}

#[test]
fn connector_path_and_bounds() {
    let connector = Connector {
        parent: nid("R"),
        child: nid("A"),
        from: Point { x: 400.0, y: 238.0 },
        to: Point { x: 340.0, y: 295.0 },
    };
    assert_eq!(
        connector.path_data(),
        "M 400 238 C 400 295, 340 238, 340 295"
    );
    assert_eq!(
        connector.bounds(CONNECTOR_PADDING),
        Bounds {
            left: 338.0,
            top: 236.0,
            width: 64.0,
            height: 61.0,
        }
    );
}

#[test]
fn single_node_tree_is_centered() {
    let store = TreeStore::from_parts(tree(&[("R", None, "System")]), characters());
    let layout = layout_of(&store, 800.0);
    let root = layout.get(&nid("R")).expect("root");
    assert_eq!((root.x, root.size), (400.0, NODE_WIDTH));
    assert!(layout.connectors.is_empty());
}

#[test]
fn layout_fails_without_a_unique_root() {
    let store = TreeStore::from_parts(
        tree(&[("R", None, "System"), ("S", None, "System")]),
        characters(),
    );
    let err = compute_layout(&store, 800.0, &LayoutConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        TreeError::InvariantViolation(crate::error::Invariant::MultipleRoots { .. })
    ));
}

/// Node i > 0 hangs under node `parents[i - 1] % i`, so every shape is a tree.
fn random_tree(parents: &[usize]) -> ConversationTree {
    let mut nodes = ConversationTree::new();
    nodes.insert(
        nid("n0"),
        ConversationNode::new(nid("n0"), None, "System", ""),
    );
    for (offset, pick) in parents.iter().enumerate() {
        let index = offset + 1;
        let parent = nid(&format!("n{}", pick % index));
        let id = nid(&format!("n{index}"));
        nodes.insert(
            id.clone(),
            ConversationNode::new(id.clone(), Some(parent.clone()), "Alice", ""),
        );
        nodes.get_mut(&parent).expect("parent exists").children.push(id);
    }
    nodes
}

proptest! {
    #[test]
    fn layout_is_deterministic(
        parents in prop::collection::vec(any::<usize>(), 0..40),
        viewport in 200.0f64..3000.0,
    ) {
        let store = TreeStore::from_parts(random_tree(&parents), characters());
        prop_assert_eq!(layout_of(&store, viewport), layout_of(&store, viewport));
    }

    #[test]
    fn widths_cover_children_and_one_box(parents in prop::collection::vec(any::<usize>(), 0..40)) {
        let store = TreeStore::from_parts(random_tree(&parents), characters());
        let layout = layout_of(&store, 1200.0);
        for node in store.nodes() {
            let own = layout.get(&node.nid).expect("placed");
            prop_assert!(own.size >= NODE_WIDTH);
            if !node.children.is_empty() {
                let children: f64 = node
                    .children
                    .iter()
                    .map(|c| layout.get(c).expect("placed").size)
                    .sum();
                let gaps = (node.children.len() - 1) as f64 * NODE_H_MARGIN;
                prop_assert!(own.size >= children + gaps);
            }
        }
    }

    #[test]
    fn sibling_spans_never_overlap(parents in prop::collection::vec(any::<usize>(), 0..40)) {
        let store = TreeStore::from_parts(random_tree(&parents), characters());
        let layout = layout_of(&store, 1200.0);
        for node in store.nodes() {
            for pair in node.children.windows(2) {
                let (_, left_end) = layout.get(&pair[0]).expect("placed").span();
                let (right_start, _) = layout.get(&pair[1]).expect("placed").span();
                prop_assert!(left_end <= right_start);
            }
        }
    }

    #[test]
    fn same_depth_means_same_band(parents in prop::collection::vec(any::<usize>(), 0..40)) {
        let store = TreeStore::from_parts(random_tree(&parents), characters());
        let layout = layout_of(&store, 1200.0);
        prop_assert_eq!(layout.len(), store.len());
        for node in store.nodes() {
            let placed = layout.get(&node.nid).expect("placed");
            let depth = store.depth(&node.nid).expect("depth");
            prop_assert_eq!(placed.depth, depth);
            let expected = ROOT_TOP + depth as f64 * (NODE_HEIGHT + NODE_V_MARGIN);
            prop_assert!((placed.y - expected).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn whole_tree_stays_right_of_the_left_edge(
        parents in prop::collection::vec(any::<usize>(), 0..40),
        viewport in 0.0f64..2000.0,
    ) {
        let store = TreeStore::from_parts(random_tree(&parents), characters());
        let layout = layout_of(&store, viewport);
        for placed in layout.boxes.values() {
            prop_assert!(placed.span().0 >= -1e-9);
        }
    }
}
