use super::*;
use serde_json::json;

#[test]
fn requests_use_event_names_as_tags() {
    let request = ClientRequest::RegenNode {
        nid: NodeId::from("n1"),
        extend: true,
    };
    let value = serde_json::to_value(&request).expect("encode");
    assert_eq!(
        value,
        json!({ "type": "regen_node", "payload": { "nid": "n1", "extend": true } })
    );
    assert_eq!(value["type"], request.name());
}

#[test]
fn node_records_travel_whole() {
    let mut node = ConversationNode::new(NodeId::from("c"), Some(NodeId::from("r")), "Alice", "hi");
    node.children.push(NodeId::from("d"));
    let value = serde_json::to_value(ClientRequest::CloneNode(node)).expect("encode");
    assert_eq!(
        value,
        json!({
            "type": "clone_node",
            "payload": {
                "nid": "c",
                "parent": "r",
                "sender": "Alice",
                "text": "hi",
                "children": ["d"]
            }
        })
    );
}

#[test]
fn load_accepts_a_root_with_null_parent_and_opaque_character_fields() {
    let raw = json!({
        "type": "load",
        "payload": {
            "characters": {
                "System": { "model": "local-7b", "context": "A harbour." },
                "Alice": { "color": "#ff0000", "traits": { "mood": "calm" } }
            },
            "tree": {
                "r": { "nid": "r", "parent": null, "sender": "System", "text": "", "children": [] }
            }
        }
    });

    let event: ServerEvent = serde_json::from_value(raw).expect("decode");
    let ServerEvent::Load { characters, tree } = event else {
        panic!("expected load");
    };
    assert_eq!(characters["Alice"].color.as_deref(), Some("#ff0000"));
    assert_eq!(characters["System"].color, None);
    assert_eq!(characters["System"].extra["model"], "local-7b");
    assert!(tree[&NodeId::from("r")].is_root());
}

#[test]
fn errors_carry_code_and_message() {
    let event = ServerEvent::Error(ApiError::new(
        crate::error::ErrorCode::NotFound,
        "node n1 not found",
    ));
    assert_eq!(
        serde_json::to_value(&event).expect("encode"),
        json!({
            "type": "error",
            "payload": { "code": "not_found", "message": "node n1 not found" }
        })
    );
}
