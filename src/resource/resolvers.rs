//! Resolvers
//!
//! Named extractor functions for columns that need more than a single path
//! lookup. Catalogue columns reference them by name (`"resolver": "count"`);
//! the resolver receives whatever the column's path resolved to.

use super::extract::{ExtractError, ResolverFn};
use super::value::{Node, Scalar};
use chrono::DateTime;

/// Every resolver name, for validation and help output
pub const RESOLVER_NAMES: &[&str] = &[
    "union_text",
    "json_text",
    "keys",
    "key_values",
    "count",
    "short_name",
    "date",
    "exists",
];

/// Look up a resolver by name
pub fn lookup(name: &str) -> Option<ResolverFn> {
    let func: ResolverFn = match name {
        "union_text" => union_text,
        "json_text" => json_text,
        "keys" => keys,
        "key_values" => key_values,
        "count" => count,
        "short_name" => short_name,
        "date" => date,
        "exists" => exists,
        _ => return None,
    };
    Some(func)
}

fn fail(name: &'static str, message: impl Into<String>) -> ExtractError {
    ExtractError::Resolver {
        name,
        message: message.into(),
    }
}

/// Discriminant and active value, e.g. `int:8080` or `string:http`.
/// Plain scalars are tagged by their own type (int-or-string fields).
fn union_text(node: Option<&Node>) -> Result<Option<Node>, ExtractError> {
    let Some(node) = node.and_then(Node::present) else {
        return Ok(None);
    };
    let (tag, value) = match node {
        Node::Union { tag, value } => (tag.as_str(), value.as_ref()),
        Node::Scalar(Scalar::Text(_)) => ("string", node),
        Node::Scalar(Scalar::Int(_) | Scalar::UInt(_)) => ("int", node),
        Node::Scalar(Scalar::Float(_)) => ("float", node),
        Node::Scalar(Scalar::Bool(_)) => ("bool", node),
        other => return Err(fail("union_text", format!("not a union: {}", other.type_name()))),
    };
    let rendered = match value.active() {
        Some(Node::Scalar(s)) => s.to_string(),
        Some(other) => other.to_json().to_string(),
        None => return Ok(Some(Node::text(tag))),
    };
    Ok(Some(Node::text(format!("{}:{}", tag, rendered))))
}

/// Serialize the whole sub-tree to a JSON string
fn json_text(node: Option<&Node>) -> Result<Option<Node>, ExtractError> {
    Ok(node
        .and_then(Node::present)
        .map(|node| Node::text(node.to_json().to_string())))
}

/// Keys of a record or mapping, in key order
fn keys(node: Option<&Node>) -> Result<Option<Node>, ExtractError> {
    match node.and_then(Node::active) {
        None => Ok(None),
        Some(Node::Record(fields) | Node::Mapping(fields)) => Ok(Some(Node::sequence(
            fields.keys().map(|k| Node::text(k.clone())),
        ))),
        Some(other) => Err(fail("keys", format!("not a mapping: {}", other.type_name()))),
    }
}

/// `key=value` pairs of a mapping (label selectors, env-style data)
fn key_values(node: Option<&Node>) -> Result<Option<Node>, ExtractError> {
    match node.and_then(Node::active) {
        None => Ok(None),
        Some(Node::Record(fields) | Node::Mapping(fields)) => {
            let mut pairs = Vec::with_capacity(fields.len());
            for (key, value) in fields {
                let rendered = match value.active() {
                    Some(Node::Scalar(s)) => s.to_string(),
                    Some(other) => other.to_json().to_string(),
                    None => String::new(),
                };
                pairs.push(Node::text(format!("{}={}", key, rendered)));
            }
            Ok(Some(Node::Sequence(pairs)))
        }
        Some(other) => Err(fail(
            "key_values",
            format!("not a mapping: {}", other.type_name()),
        )),
    }
}

/// Number of elements; a missing collection counts as zero
fn count(node: Option<&Node>) -> Result<Option<Node>, ExtractError> {
    let len = match node.and_then(Node::active) {
        None => 0,
        Some(Node::Sequence(items)) => items.len(),
        Some(Node::Record(fields) | Node::Mapping(fields)) => fields.len(),
        Some(other) => return Err(fail("count", format!("not a collection: {}", other.type_name()))),
    };
    Ok(Some(Node::int(len as i64)))
}

/// Last segment of a slash-separated reference
/// e.g. "apps/v1/namespaces/default/replicasets/web-5d4f" -> "web-5d4f"
fn short_name(node: Option<&Node>) -> Result<Option<Node>, ExtractError> {
    let Some(node) = node.and_then(Node::active) else {
        return Ok(None);
    };
    let Some(text) = node.as_str() else {
        return Err(fail("short_name", format!("not text: {}", node.type_name())));
    };
    let short = text.rsplit('/').next().unwrap_or(text);
    Ok(Some(Node::text(short)))
}

/// Calendar date (UTC) of an RFC 3339 timestamp
fn date(node: Option<&Node>) -> Result<Option<Node>, ExtractError> {
    let Some(node) = node.and_then(Node::active) else {
        return Ok(None);
    };
    let Some(text) = node.as_str() else {
        return Err(fail("date", format!("not text: {}", node.type_name())));
    };
    let parsed = DateTime::parse_from_rfc3339(text)
        .map_err(|e| fail("date", format!("{}: {}", text, e)))?;
    Ok(Some(Node::text(
        parsed.naive_utc().date().format("%Y-%m-%d").to_string(),
    )))
}

/// Whether the path is present at all
fn exists(node: Option<&Node>) -> Result<Option<Node>, ExtractError> {
    Ok(Some(Node::bool(node.and_then(Node::present).is_some())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(name: &str, node: Option<Node>) -> Result<Option<Node>, ExtractError> {
        let func = lookup(name).unwrap();
        func(node.as_ref())
    }

    #[test]
    fn test_all_names_resolve() {
        for name in RESOLVER_NAMES {
            assert!(lookup(name).is_some(), "resolver {} should exist", name);
        }
        assert!(lookup("nope").is_none());
    }

    #[test]
    fn test_union_text() {
        assert_eq!(
            run("union_text", Some(Node::union("int", Node::int(8080)))).unwrap(),
            Some(Node::text("int:8080"))
        );
        assert_eq!(
            run("union_text", Some(Node::text("http"))).unwrap(),
            Some(Node::text("string:http"))
        );
        assert_eq!(run("union_text", None).unwrap(), None);
        assert!(run("union_text", Some(Node::sequence([]))).is_err());
    }

    #[test]
    fn test_json_text() {
        assert_eq!(
            run("json_text", Some(Node::from(json!({"a": [1]})))).unwrap(),
            Some(Node::text(r#"{"a":[1]}"#))
        );
        assert_eq!(run("json_text", Some(Node::null())).unwrap(), None);
    }

    #[test]
    fn test_keys_and_key_values() {
        let labels = Node::mapping([("app", Node::text("web")), ("tier", Node::text("front"))]);
        assert_eq!(
            run("keys", Some(labels.clone())).unwrap(),
            Some(Node::sequence([Node::text("app"), Node::text("tier")]))
        );
        assert_eq!(
            run("key_values", Some(labels)).unwrap(),
            Some(Node::sequence([Node::text("app=web"), Node::text("tier=front")]))
        );
        assert!(run("keys", Some(Node::int(1))).is_err());
    }

    #[test]
    fn test_count() {
        assert_eq!(
            run("count", Some(Node::sequence([Node::int(1), Node::int(2)]))).unwrap(),
            Some(Node::int(2))
        );
        assert_eq!(run("count", None).unwrap(), Some(Node::int(0)));
        assert!(run("count", Some(Node::text("x"))).is_err());
    }

    #[test]
    fn test_short_name() {
        assert_eq!(
            run("short_name", Some(Node::text("apps/v1/replicasets/web-5d4f"))).unwrap(),
            Some(Node::text("web-5d4f"))
        );
        assert_eq!(
            run("short_name", Some(Node::text("plain"))).unwrap(),
            Some(Node::text("plain"))
        );
    }

    #[test]
    fn test_date() {
        assert_eq!(
            run("date", Some(Node::text("2024-03-01T23:30:00-02:00"))).unwrap(),
            Some(Node::text("2024-03-02"))
        );
        assert!(run("date", Some(Node::text("yesterday"))).is_err());
    }

    #[test]
    fn test_exists() {
        assert_eq!(run("exists", None).unwrap(), Some(Node::bool(false)));
        assert_eq!(run("exists", Some(Node::null())).unwrap(), Some(Node::bool(false)));
        assert_eq!(run("exists", Some(Node::int(0))).unwrap(), Some(Node::bool(true)));
    }
}
