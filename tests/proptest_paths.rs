//! Property-based tests using proptest
//!
//! These tests check that path extraction and column coercion are total:
//! any path over any item yields a value or Missing, never a panic.

use kflat::resource::{coerce, ColumnKind, Node, Path, PathTemplate};
use proptest::prelude::*;
use serde_json::{json, Value};

/// Arbitrary JSON documents, a few levels deep
fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|i| json!(i)),
        (-1.0e9f64..1.0e9).prop_map(|f| json!(f)),
        "[a-z0-9:/ -]{0,12}".prop_map(Value::String),
    ];
    leaf.prop_recursive(4, 64, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("[a-c]{1,2}", inner, 0..6)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

/// Path-like strings, valid and not
fn arb_path() -> impl Strategy<Value = String> {
    let segment = prop_oneof![
        "[a-c]{1,2}",
        "[0-9]",
        Just("*".to_string()),
        Just("$tag".to_string()),
        Just("[0]".to_string()),
        Just("[\"a.b\"]".to_string()),
        Just("[".to_string()),
        Just("".to_string()),
    ];
    prop::collection::vec(segment, 0..5).prop_map(|parts| parts.join("."))
}

fn arb_kind() -> impl Strategy<Value = ColumnKind> {
    prop_oneof![
        Just(ColumnKind::Text),
        Just(ColumnKind::Integer),
        Just(ColumnKind::BigInteger),
        Just(ColumnKind::Boolean),
        Just(ColumnKind::Float),
        Just(ColumnKind::Uuid),
        Just(ColumnKind::TextArray),
        Just(ColumnKind::Json),
    ]
}

proptest! {
    #[test]
    fn test_resolve_never_panics(doc in arb_json(), raw in arb_path()) {
        let item = Node::from(doc);
        if let Ok(path) = Path::parse(&raw) {
            let _ = path.resolve(&item);
        }
    }

    #[test]
    fn test_coerce_never_panics(doc in arb_json(), raw in arb_path(), kind in arb_kind()) {
        let item = Node::from(doc);
        if let Ok(path) = Path::parse(&raw) {
            let found = path.resolve(&item);
            let _ = coerce(kind, found.as_deref());
        }
    }

    #[test]
    fn test_root_path_returns_item(doc in arb_json()) {
        let item = Node::from(doc);
        let found = Path::root().resolve(&item);
        if item.is_missing() {
            prop_assert!(found.map_or(true, |n| n.is_missing()));
        } else {
            prop_assert_eq!(found.as_deref(), Some(&item));
        }
    }

    #[test]
    fn test_null_anywhere_on_the_path_is_missing(depth in 1usize..6, cut in 0usize..6) {
        let cut = cut % depth;
        let keys: Vec<String> = (0..depth).map(|i| format!("k{}", i)).collect();

        let mut doc = json!(5);
        for (i, key) in keys.iter().enumerate().rev() {
            let mut object = serde_json::Map::new();
            object.insert(key.clone(), if i == cut { Value::Null } else { doc });
            doc = Value::Object(object);
        }

        let path = Path::parse(&keys.join(".")).unwrap();
        let node = Node::from(doc);
        let found = path.resolve(&node);
        prop_assert!(found.map_or(true, |n| n.is_missing()));
    }

    #[test]
    fn test_template_render_never_panics(doc in arb_json(), raw in arb_path()) {
        let item = Node::from(doc);
        if let Ok(template) = PathTemplate::parse(&format!("/items/{{{}}}/children", raw)) {
            let _ = template.render(Some(&item));
            let _ = template.render(None);
        }
    }
}

#[test]
fn test_documented_examples() {
    let path = Path::parse("a.b.c").unwrap();
    assert!(path
        .resolve(&Node::from(json!({"a": null})))
        .map_or(true, |n| n.is_missing()));
    assert!(path
        .resolve(&Node::from(json!({"a": {"b": null}})))
        .map_or(true, |n| n.is_missing()));
    assert_eq!(
        path.resolve(&Node::from(json!({"a": {"b": {"c": 5}}})))
            .as_deref()
            .and_then(Node::active),
        Some(&Node::int(5))
    );
}
