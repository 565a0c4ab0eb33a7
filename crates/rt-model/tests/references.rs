mod common;

use common::*;
use rt_model::{
    InvalidationReason, ModelError, ModelEvent, ModelOptions, ModelState, ProtocolError, RealtimeModel, ReferenceEvent,
    ReferenceKey, ReferenceValue, ValidationError,
};
use rt_ot::DiscreteOperation;
use serde_json::json;

fn key(name: &str) -> ReferenceKey {
    ReferenceKey::new("alice", name)
}

#[test]
fn removing_an_element_moves_selections_and_drops_markers_inside_it() {
    let transport = RecordingTransport::new();
    let mut model = open_model(
        &json!({"items": ["alpha", "beta", "gamma"]}),
        &transport,
        ModelOptions::default(),
    );
    let items = model.node_id_at("/items").unwrap();
    let beta = model.node_id_at("/items/1").unwrap();
    model
        .set_reference("sel", &items, ReferenceValue::Range { start: 1, end: 3 })
        .unwrap();
    model
        .set_reference("caret", &beta, ReferenceValue::Index { index: 2 })
        .unwrap();
    let (events, listener) = capture::<ReferenceEvent>();
    model.on_reference(listener);

    model
        .handle_message(remote(6, DiscreteOperation::array_remove(&items, 1)))
        .unwrap();
    assert_eq!(
        *events.lock().unwrap(),
        vec![
            ReferenceEvent::Shifted {
                key: key("sel"),
                value: ReferenceValue::Range { start: 1, end: 2 }
            },
            ReferenceEvent::Invalidated {
                key: key("caret"),
                reason: InvalidationReason::NodeDetached
            },
        ]
    );
    assert_eq!(
        model.reference("sel").map(|r| r.value.clone()),
        Some(ReferenceValue::Range { start: 1, end: 2 })
    );
    assert!(model.reference("caret").is_none());

    // The removed node is gone for good.
    let err = model
        .handle_message(remote(7, DiscreteOperation::string_insert(&beta, 0, "x")))
        .unwrap_err();
    assert_eq!(err, ModelError::Protocol(ProtocolError::DetachedNode(beta)));
    assert_eq!(model.state(), ModelState::Closed);
    assert_eq!(
        events.lock().unwrap().last(),
        Some(&ReferenceEvent::Invalidated {
            key: key("sel"),
            reason: InvalidationReason::ModelClosed
        })
    );
}

fn model_with_removed_element(transport: &RecordingTransport) -> (RealtimeModel, String) {
    let mut model = open_model(&json!({"items": ["alpha", "beta"]}), transport, ModelOptions::default());
    let items = model.node_id_at("/items").unwrap();
    let beta = model.node_id_at("/items/1").unwrap();
    model
        .handle_message(remote(6, DiscreteOperation::array_remove(&items, 1)))
        .unwrap();
    (model, beta)
}

#[test]
fn marker_on_a_removed_element_closes_the_model() {
    let transport = RecordingTransport::new();
    let (mut model, beta) = model_with_removed_element(&transport);
    let (events, listener) = capture::<ModelEvent>();
    model.on_model_event(listener);

    let err = model
        .set_reference("c", &beta, ReferenceValue::Index { index: 0 })
        .unwrap_err();
    assert_eq!(err, ModelError::Protocol(ProtocolError::DetachedNode(beta.clone())));
    assert_eq!(model.state(), ModelState::Closed);
    assert!(matches!(events.lock().unwrap().first(), Some(ModelEvent::Error { .. })));
    assert_eq!(model.reference("c"), None);
    assert_eq!(model.set_reference("d", &beta, ReferenceValue::Index { index: 0 }), Err(err));
}

#[test]
fn subscribing_to_a_removed_element_closes_the_model() {
    let transport = RecordingTransport::new();
    let (mut model, beta) = model_with_removed_element(&transport);

    let err = model.on_node(&beta, |_| {}).unwrap_err();
    assert_eq!(err, ModelError::Protocol(ProtocolError::DetachedNode(beta)));
    assert_eq!(model.state(), ModelState::Closed);
    assert_eq!(model.error(), Some(&err));
}

#[test]
fn local_edit_on_a_removed_element_closes_the_model() {
    let transport = RecordingTransport::new();
    let (mut model, beta) = model_with_removed_element(&transport);

    let err = model.insert_text(&beta, 0, "x").unwrap_err();
    assert_eq!(err, ModelError::Protocol(ProtocolError::DetachedNode(beta)));
    assert_eq!(model.state(), ModelState::Closed);
    assert!(model.pending().is_empty());
    assert!(transport.operations().is_empty());
}

#[test]
fn cursor_follows_local_and_remote_inserts() {
    let transport = RecordingTransport::new();
    let mut model = open_model(&json!({"text": "hello"}), &transport, ModelOptions::default());
    let text = model.node_id_at("/text").unwrap();
    model
        .set_reference("cursor", &text, ReferenceValue::Index { index: 5 })
        .unwrap();

    model
        .handle_message(remote(6, DiscreteOperation::string_insert(&text, 0, ">> ")))
        .unwrap();
    assert_eq!(
        model.reference("cursor").unwrap().value,
        ReferenceValue::Index { index: 8 }
    );

    // Typing at the cursor pushes it along.
    model.insert_text(&text, 8, "!").unwrap();
    assert_eq!(
        model.reference("cursor").unwrap().value,
        ReferenceValue::Index { index: 9 }
    );

    model.remove_text(&text, 0, 3).unwrap();
    assert_eq!(
        model.reference("cursor").unwrap().value,
        ReferenceValue::Index { index: 6 }
    );
    assert_eq!(model.to_json(), json!({"text": "hello!"}));
}

#[test]
fn replacing_content_invalidates_positional_markers() {
    let transport = RecordingTransport::new();
    let mut model = open_model(&json!({"text": "hello"}), &transport, ModelOptions::default());
    let text = model.node_id_at("/text").unwrap();
    model
        .set_reference("sel", &text, ReferenceValue::Range { start: 0, end: 2 })
        .unwrap();
    let (events, listener) = capture::<ReferenceEvent>();
    model.on_reference(listener);

    model.set_string(&text, "bye").unwrap();
    assert_eq!(
        *events.lock().unwrap(),
        vec![ReferenceEvent::Invalidated {
            key: key("sel"),
            reason: InvalidationReason::ValueReplaced
        }]
    );
}

#[test]
fn property_markers_follow_their_key() {
    let transport = RecordingTransport::new();
    let mut model = open_model(&json!({"meta": {"k": 1, "j": 2}}), &transport, ModelOptions::default());
    let meta = model.node_id_at("/meta").unwrap();
    model
        .set_reference("prop", &meta, ReferenceValue::Property { key: "k".into() })
        .unwrap();
    let (events, listener) = capture::<ReferenceEvent>();
    model.on_reference(listener);

    model.object_remove(&meta, "j").unwrap();
    assert!(events.lock().unwrap().is_empty());
    model.object_remove(&meta, "k").unwrap();
    assert_eq!(
        *events.lock().unwrap(),
        vec![ReferenceEvent::Invalidated {
            key: key("prop"),
            reason: InvalidationReason::KeyRemoved
        }]
    );
}

#[test]
fn markers_are_validated_when_set() {
    let transport = RecordingTransport::new();
    let mut model = open_model(&json!({"text": "hi", "meta": {}}), &transport, ModelOptions::default());
    let text = model.node_id_at("/text").unwrap();
    let meta = model.node_id_at("/meta").unwrap();

    assert!(matches!(
        model.set_reference("c", &text, ReferenceValue::Index { index: 3 }),
        Err(ModelError::Validation(ValidationError::IndexOutOfBounds { .. }))
    ));
    assert!(matches!(
        model.set_reference("c", &meta, ReferenceValue::Index { index: 0 }),
        Err(ModelError::Validation(ValidationError::WrongKind { .. }))
    ));
    assert!(matches!(
        model.set_reference("c", &meta, ReferenceValue::Property { key: "k".into() }),
        Err(ModelError::Validation(ValidationError::UnknownKey { .. }))
    ));
    assert_eq!(model.references().count(), 0);
    assert_eq!(model.state(), ModelState::Synchronized);
}

#[test]
fn clear_and_close_notify_subscribers() {
    let transport = RecordingTransport::new();
    let mut model = open_model(&json!({"text": "hi"}), &transport, ModelOptions::default());
    let text = model.node_id_at("/text").unwrap();
    let (events, listener) = capture::<ReferenceEvent>();
    model.on_reference(listener);

    model.set_reference("a", &text, ReferenceValue::Index { index: 0 }).unwrap();
    model.set_reference("b", &text, ReferenceValue::Index { index: 1 }).unwrap();
    assert!(model.clear_reference("a"));
    assert!(!model.clear_reference("a"));
    model.close().unwrap();

    assert_eq!(
        *events.lock().unwrap(),
        vec![
            ReferenceEvent::Set {
                key: key("a"),
                node_id: text.clone(),
                value: ReferenceValue::Index { index: 0 }
            },
            ReferenceEvent::Set {
                key: key("b"),
                node_id: text.clone(),
                value: ReferenceValue::Index { index: 1 }
            },
            ReferenceEvent::Cleared { key: key("a") },
            ReferenceEvent::Invalidated {
                key: key("b"),
                reason: InvalidationReason::ModelClosed
            },
        ]
    );
}
