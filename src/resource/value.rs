//! Value Model
//!
//! A closed tagged-value model for upstream items. Every upstream object is
//! converted into a [`Node`] before column extraction, so path lookups work
//! on a fixed set of variants instead of on ad-hoc JSON handling.

use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Leaf value
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Text(String),
    Int(i64),
    /// Integer above `i64::MAX`, kept exact
    UInt(u64),
    Float(f64),
    Bool(bool),
}

impl Scalar {
    pub fn type_name(&self) -> &'static str {
        match self {
            Scalar::Text(_) => "text",
            Scalar::Int(_) | Scalar::UInt(_) => "integer",
            Scalar::Float(_) => "float",
            Scalar::Bool(_) => "boolean",
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Scalar::Text(s) => Value::String(s.clone()),
            Scalar::Int(i) => Value::Number((*i).into()),
            Scalar::UInt(u) => Value::Number((*u).into()),
            Scalar::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
            Scalar::Bool(b) => Value::Bool(*b),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Text(s) => f.write_str(s),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::UInt(u) => write!(f, "{}", u),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// Nested upstream value
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Object with a known set of fields
    Record(BTreeMap<String, Node>),
    /// Free-form key-value mapping (labels, annotations, data)
    Mapping(BTreeMap<String, Node>),
    /// Ordered sequence
    Sequence(Vec<Node>),
    /// Nullable field; `Optional(None)` is an absent value
    Optional(Option<Box<Node>>),
    Scalar(Scalar),
    /// Exactly one of several named alternatives
    Union { tag: String, value: Box<Node> },
}

impl Node {
    pub fn null() -> Self {
        Node::Optional(None)
    }

    pub fn some(value: Node) -> Self {
        Node::Optional(Some(Box::new(value)))
    }

    pub fn text(value: impl Into<String>) -> Self {
        Node::Scalar(Scalar::Text(value.into()))
    }

    pub fn int(value: i64) -> Self {
        Node::Scalar(Scalar::Int(value))
    }

    pub fn float(value: f64) -> Self {
        Node::Scalar(Scalar::Float(value))
    }

    pub fn bool(value: bool) -> Self {
        Node::Scalar(Scalar::Bool(value))
    }

    pub fn union(tag: impl Into<String>, value: Node) -> Self {
        Node::Union {
            tag: tag.into(),
            value: Box::new(value),
        }
    }

    pub fn record<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Node)>,
    {
        Node::Record(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn mapping<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Node)>,
    {
        Node::Mapping(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn sequence(items: impl IntoIterator<Item = Node>) -> Self {
        Node::Sequence(items.into_iter().collect())
    }

    /// Strip optional wrappers. Returns `None` for an absent value.
    pub fn present(&self) -> Option<&Node> {
        let mut current = self;
        loop {
            match current {
                Node::Optional(None) => return None,
                Node::Optional(Some(inner)) => current = inner,
                other => return Some(other),
            }
        }
    }

    /// Strip optional wrappers and union tags down to the concrete value
    pub fn active(&self) -> Option<&Node> {
        let mut current = self.present()?;
        while let Node::Union { value, .. } = current {
            current = value.present()?;
        }
        Some(current)
    }

    pub fn is_missing(&self) -> bool {
        self.present().is_none()
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self.active()? {
            Node::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.as_scalar()? {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Human-readable variant name, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Node::Record(_) => "record",
            Node::Mapping(_) => "mapping",
            Node::Sequence(_) => "sequence",
            Node::Optional(None) => "null",
            Node::Optional(Some(inner)) => inner.type_name(),
            Node::Scalar(s) => s.type_name(),
            Node::Union { .. } => "union",
        }
    }

    /// Convert to JSON. Unions serialize as their active alternative.
    pub fn to_json(&self) -> Value {
        match self {
            Node::Record(fields) | Node::Mapping(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<Map<String, Value>>(),
            ),
            Node::Sequence(items) => Value::Array(items.iter().map(Node::to_json).collect()),
            Node::Optional(None) => Value::Null,
            Node::Optional(Some(inner)) => inner.to_json(),
            Node::Scalar(s) => s.to_json(),
            Node::Union { value, .. } => value.to_json(),
        }
    }
}

impl From<Value> for Node {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Node::Optional(None),
            Value::Bool(b) => Node::bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Node::int(i)
                } else if let Some(u) = n.as_u64() {
                    Node::Scalar(Scalar::UInt(u))
                } else {
                    Node::float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => Node::text(s),
            Value::Array(items) => Node::Sequence(items.into_iter().map(Node::from).collect()),
            Value::Object(fields) => {
                Node::Record(fields.into_iter().map(|(k, v)| (k, Node::from(v))).collect())
            }
        }
    }
}

impl From<&Value> for Node {
    fn from(value: &Value) -> Self {
        Node::from(value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_maps_variants() {
        let node = Node::from(json!({
            "name": "pod-a",
            "replicas": 3,
            "ratio": 0.5,
            "ready": true,
            "owner": null,
            "ports": [80, 443]
        }));

        let Node::Record(fields) = &node else {
            panic!("expected record, got {:?}", node);
        };
        assert_eq!(fields["name"], Node::text("pod-a"));
        assert_eq!(fields["replicas"], Node::int(3));
        assert_eq!(fields["ratio"], Node::float(0.5));
        assert_eq!(fields["ready"], Node::bool(true));
        assert!(fields["owner"].is_missing());
        assert_eq!(
            fields["ports"],
            Node::sequence([Node::int(80), Node::int(443)])
        );
    }

    #[test]
    fn test_large_unsigned_integers_stay_exact() {
        let node = Node::from(json!(u64::MAX));
        assert_eq!(node.as_scalar(), Some(&Scalar::UInt(u64::MAX)));
        assert_eq!(node.type_name(), "integer");
        assert_eq!(node.to_json(), json!(u64::MAX));
        assert_eq!(Node::from(json!(-5)), Node::int(-5));
    }

    #[test]
    fn test_present_unwraps_nested_optionals() {
        let node = Node::some(Node::some(Node::int(1)));
        assert_eq!(node.present(), Some(&Node::int(1)));
        assert!(Node::some(Node::null()).is_missing());
    }

    #[test]
    fn test_active_unwraps_unions() {
        let node = Node::union("int", Node::int(8080));
        assert_eq!(node.active(), Some(&Node::int(8080)));
        assert_eq!(node.as_scalar(), Some(&Scalar::Int(8080)));
        assert!(Node::union("string", Node::null()).active().is_none());
    }

    #[test]
    fn test_to_json_keeps_empty_and_null_apart() {
        assert_eq!(Node::null().to_json(), Value::Null);
        assert_eq!(Node::record(Vec::<(String, Node)>::new()).to_json(), json!({}));
        assert_eq!(Node::sequence(Vec::new()).to_json(), json!([]));
    }

    #[test]
    fn test_to_json_union_uses_active_value() {
        let node = Node::record([("port", Node::union("string", Node::text("http")))]);
        assert_eq!(node.to_json(), json!({"port": "http"}));
    }

    #[test]
    fn test_non_finite_float_serializes_as_null() {
        assert_eq!(Node::float(f64::NAN).to_json(), Value::Null);
    }
}
