//! Value Extractor
//!
//! Turns an upstream item into typed column values. An [`Extractor`] finds
//! the node for a column (by path, or by a named resolver function), and
//! [`coerce`] converts that node into a [`Datum`] of the column's declared
//! [`ColumnKind`].

use super::path::Path;
use super::value::{Node, Scalar};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Declared value kind of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Text,
    Integer,
    BigInteger,
    Boolean,
    Float,
    Uuid,
    TextArray,
    Json,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnKind::Text => "text",
            ColumnKind::Integer => "integer",
            ColumnKind::BigInteger => "big_integer",
            ColumnKind::Boolean => "boolean",
            ColumnKind::Float => "float",
            ColumnKind::Uuid => "uuid",
            ColumnKind::TextArray => "text_array",
            ColumnKind::Json => "json",
        };
        f.pad(name)
    }
}

/// Typed storage value.
///
/// `Null` is the storage null for every kind. For JSON columns it is
/// distinct from an empty structure (`Json({})`, `Json([])`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Datum {
    Null,
    Text(String),
    Integer(i32),
    BigInteger(i64),
    Boolean(bool),
    Float(f64),
    Uuid(Uuid),
    TextArray(Vec<String>),
    Json(serde_json::Value),
}

impl Datum {
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Null => f.write_str("-"),
            Datum::Text(s) => f.write_str(s),
            Datum::Integer(i) => write!(f, "{}", i),
            Datum::BigInteger(i) => write!(f, "{}", i),
            Datum::Boolean(b) => write!(f, "{}", b),
            Datum::Float(v) => write!(f, "{}", v),
            Datum::Uuid(u) => write!(f, "{}", u),
            Datum::TextArray(items) => write!(f, "[{}]", items.join(", ")),
            Datum::Json(value) => write!(f, "{}", value),
        }
    }
}

/// Extraction failures (recovered as a warning and a null value)
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractError {
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: ColumnKind,
        found: &'static str,
    },

    #[error("{value} is out of range for {kind}")]
    OutOfRange { kind: ColumnKind, value: String },

    #[error("invalid {kind} value '{value}'")]
    Invalid { kind: ColumnKind, value: String },

    #[error("resolver {name}: {message}")]
    Resolver { name: &'static str, message: String },
}

/// Named extractor function: receives the node at the extractor's path
pub type ResolverFn = fn(Option<&Node>) -> Result<Option<Node>, ExtractError>;

/// How a column finds its value in an item
#[derive(Clone)]
pub enum Extractor {
    Path(Path),
    Resolver {
        name: String,
        path: Path,
        func: ResolverFn,
    },
}

impl Extractor {
    pub fn path(path: Path) -> Self {
        Extractor::Path(path)
    }

    /// Look up a resolver by name from the built-in registry
    pub fn resolver(name: &str, path: Path) -> Option<Self> {
        let func = super::resolvers::lookup(name)?;
        Some(Extractor::Resolver {
            name: name.to_string(),
            path,
            func,
        })
    }

    /// Find the node for this extractor. `Ok(None)` means missing.
    pub fn extract<'a>(&self, item: &'a Node) -> Result<Option<Cow<'a, Node>>, ExtractError> {
        match self {
            Extractor::Path(path) => Ok(path.resolve(item)),
            Extractor::Resolver { path, func, .. } => {
                let input = path.resolve(item);
                Ok(func(input.as_deref())?.map(Cow::Owned))
            }
        }
    }
}

impl fmt::Debug for Extractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Extractor::Path(path) => write!(f, "Path({})", path),
            Extractor::Resolver { name, path, .. } => write!(f, "{}({})", name, path),
        }
    }
}

/// Convert an extracted node into a value of the given kind
pub fn coerce(kind: ColumnKind, node: Option<&Node>) -> Result<Datum, ExtractError> {
    let Some(node) = node.and_then(Node::active) else {
        return Ok(Datum::Null);
    };

    let mismatch = || ExtractError::TypeMismatch {
        expected: kind,
        found: node.type_name(),
    };

    match kind {
        ColumnKind::Text => match node {
            Node::Scalar(s) => Ok(Datum::Text(s.to_string())),
            _ => Err(mismatch()),
        },
        ColumnKind::Integer => match node {
            Node::Scalar(Scalar::Int(i)) => {
                i32::try_from(*i)
                    .map(Datum::Integer)
                    .map_err(|_| ExtractError::OutOfRange {
                        kind,
                        value: i.to_string(),
                    })
            }
            Node::Scalar(Scalar::UInt(u)) => Err(ExtractError::OutOfRange {
                kind,
                value: u.to_string(),
            }),
            Node::Scalar(Scalar::Text(s)) => parse_number::<i32>(kind, s).map(Datum::Integer),
            _ => Err(mismatch()),
        },
        ColumnKind::BigInteger => match node {
            Node::Scalar(Scalar::Int(i)) => Ok(Datum::BigInteger(*i)),
            Node::Scalar(Scalar::UInt(u)) => Err(ExtractError::OutOfRange {
                kind,
                value: u.to_string(),
            }),
            Node::Scalar(Scalar::Text(s)) => parse_number::<i64>(kind, s).map(Datum::BigInteger),
            _ => Err(mismatch()),
        },
        ColumnKind::Boolean => match node {
            Node::Scalar(Scalar::Bool(b)) => Ok(Datum::Boolean(*b)),
            _ => Err(mismatch()),
        },
        ColumnKind::Float => match node {
            Node::Scalar(Scalar::Float(v)) => Ok(Datum::Float(*v)),
            Node::Scalar(Scalar::Int(i)) => Ok(Datum::Float(*i as f64)),
            Node::Scalar(Scalar::UInt(u)) => Ok(Datum::Float(*u as f64)),
            _ => Err(mismatch()),
        },
        ColumnKind::Uuid => match node {
            Node::Scalar(Scalar::Text(s)) => {
                Uuid::parse_str(s)
                    .map(Datum::Uuid)
                    .map_err(|_| ExtractError::Invalid {
                        kind,
                        value: s.clone(),
                    })
            }
            _ => Err(mismatch()),
        },
        ColumnKind::TextArray => match node {
            Node::Sequence(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    let Some(item) = item.active() else {
                        continue;
                    };
                    match item {
                        Node::Scalar(s) => out.push(s.to_string()),
                        other => {
                            return Err(ExtractError::TypeMismatch {
                                expected: kind,
                                found: other.type_name(),
                            })
                        }
                    }
                }
                Ok(Datum::TextArray(out))
            }
            _ => Err(mismatch()),
        },
        ColumnKind::Json => Ok(Datum::Json(node.to_json())),
    }
}

fn parse_number<T: std::str::FromStr>(kind: ColumnKind, raw: &str) -> Result<T, ExtractError> {
    raw.trim().parse::<T>().map_err(|_| ExtractError::Invalid {
        kind,
        value: raw.to_string(),
    })
}
