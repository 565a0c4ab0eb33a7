//! Two replicas applying a concurrent pair in opposite orders, each
//! followed by the other side's transformed operation, end up equal.

use indexmap::IndexMap;
use proptest::prelude::*;
use rt_model::ModelTree;
use rt_ot::{DataValue, DiscreteOperation, Operation, Transformer, ValueData};

const DOC: &str = "doc";

fn string_value(id: &str, value: &str) -> DataValue {
    DataValue::new(id, ValueData::String { value: value.into() })
}

fn number_value(id: &str, value: i32) -> DataValue {
    DataValue::new(id, ValueData::Number { value: f64::from(value) })
}

fn assert_converges(root: DataValue, server: DiscreteOperation, client: DiscreteOperation) -> Result<(), TestCaseError> {
    let pair = Transformer::default()
        .transform(&Operation::from(server.clone()), &Operation::from(client.clone()))
        .map_err(|e| TestCaseError::fail(e.to_string()))?;

    let mut via_server = ModelTree::new(root.clone()).map_err(|e| TestCaseError::fail(e.to_string()))?;
    via_server
        .apply(&server)
        .map_err(|e| TestCaseError::fail(format!("server: {e}")))?;
    via_server
        .apply_all(pair.client.members())
        .map_err(|e| TestCaseError::fail(format!("client': {e} ({:?})", pair.client)))?;

    let mut via_client = ModelTree::new(root).map_err(|e| TestCaseError::fail(e.to_string()))?;
    via_client
        .apply(&client)
        .map_err(|e| TestCaseError::fail(format!("client: {e}")))?;
    via_client
        .apply_all(pair.server.members())
        .map_err(|e| TestCaseError::fail(format!("server': {e} ({:?})", pair.server)))?;

    prop_assert_eq!(via_server.to_json(), via_client.to_json());
    Ok(())
}

// ── Strings ───────────────────────────────────────────────────────────────

fn string_op(base: String) -> BoxedStrategy<DiscreteOperation> {
    let len = base.len();
    let insert = (0..=len, "[x-z]{1,3}").prop_map(|(i, t)| DiscreteOperation::string_insert(DOC, i, t));
    let set = "[p-r]{1,4}".prop_map(|t| DiscreteOperation::string_set(DOC, t));
    if len == 0 {
        return prop_oneof![insert, set].boxed();
    }
    let remove = (0..len)
        .prop_flat_map(move |i| (Just(i), 1..=len - i))
        .prop_map(move |(i, n)| DiscreteOperation::string_remove(DOC, i, &base[i..i + n]));
    prop_oneof![3 => insert, 3 => remove, 1 => set].boxed()
}

fn string_case() -> impl Strategy<Value = (String, DiscreteOperation, DiscreteOperation)> {
    "[a-e]{0,8}".prop_flat_map(|base| (Just(base.clone()), string_op(base.clone()), string_op(base)))
}

// ── Arrays ────────────────────────────────────────────────────────────────

const ARRAY_LEN: usize = 5;

fn array_base() -> DataValue {
    let children = (0..ARRAY_LEN)
        .map(|i| number_value(&format!("b{i}"), i as i32))
        .collect();
    DataValue::new(DOC, ValueData::Array { children })
}

fn array_op(side: &'static str) -> BoxedStrategy<DiscreteOperation> {
    prop_oneof![
        (0..=ARRAY_LEN, 100..200i32)
            .prop_map(move |(i, v)| DiscreteOperation::array_insert(DOC, i, number_value(&format!("{side}:ins"), v))),
        (0..ARRAY_LEN).prop_map(|i| DiscreteOperation::array_remove(DOC, i)),
        (0..ARRAY_LEN, 100..200i32)
            .prop_map(move |(i, v)| DiscreteOperation::array_replace(DOC, i, number_value(&format!("{side}:rep"), v))),
        (0..ARRAY_LEN, 0..ARRAY_LEN).prop_map(|(from, to)| DiscreteOperation::array_move(DOC, from, to)),
        prop::collection::vec(100..200i32, 0..3).prop_map(move |values| {
            let children = values
                .into_iter()
                .enumerate()
                .map(|(k, v)| number_value(&format!("{side}:set{k}"), v))
                .collect();
            DiscreteOperation::array_set(DOC, children)
        }),
    ]
    .boxed()
}

// ── Objects ───────────────────────────────────────────────────────────────

const KEYS: [&str; 3] = ["a", "b", "c"];

fn object_base() -> DataValue {
    let children: IndexMap<String, DataValue> = KEYS
        .iter()
        .enumerate()
        .map(|(i, k)| (k.to_string(), number_value(&format!("b{k}"), i as i32)))
        .collect();
    DataValue::new(DOC, ValueData::Object { children })
}

fn object_op(side: &'static str) -> BoxedStrategy<DiscreteOperation> {
    prop_oneof![
        ("[a-d]", 100..200i32)
            .prop_map(move |(k, v)| DiscreteOperation::object_set(DOC, k, number_value(&format!("{side}:set"), v))),
        prop::sample::select(KEYS.to_vec()).prop_map(|k| DiscreteOperation::object_remove(DOC, k)),
        prop::collection::btree_map("[a-d]", 100..200i32, 0..3).prop_map(move |entries| {
            let children: IndexMap<String, DataValue> = entries
                .into_iter()
                .map(|(k, v)| {
                    let id = format!("{side}:all-{k}");
                    (k, number_value(&id, v))
                })
                .collect();
            DiscreteOperation::object_set_value(DOC, children)
        }),
    ]
    .boxed()
}

// ── Scalars ───────────────────────────────────────────────────────────────

fn number_op() -> BoxedStrategy<DiscreteOperation> {
    prop_oneof![
        (-50..50i32).prop_map(|d| DiscreteOperation::number_add(DOC, f64::from(d))),
        (-50..50i32).prop_map(|v| DiscreteOperation::number_set(DOC, f64::from(v))),
    ]
    .boxed()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn concurrent_string_edits_converge((base, server, client) in string_case()) {
        assert_converges(string_value(DOC, &base), server, client)?;
    }

    #[test]
    fn concurrent_array_edits_converge(server in array_op("s"), client in array_op("c")) {
        assert_converges(array_base(), server, client)?;
    }

    #[test]
    fn concurrent_object_edits_converge(server in object_op("s"), client in object_op("c")) {
        assert_converges(object_base(), server, client)?;
    }

    #[test]
    fn concurrent_number_edits_converge(start in -50..50i32, server in number_op(), client in number_op()) {
        assert_converges(number_value(DOC, start), server, client)?;
    }

    #[test]
    fn concurrent_boolean_sets_converge(start: bool, s: bool, c: bool) {
        let root = DataValue::new(DOC, ValueData::Boolean { value: start });
        assert_converges(
            root,
            DiscreteOperation::boolean_set(DOC, s),
            DiscreteOperation::boolean_set(DOC, c),
        )?;
    }
}
