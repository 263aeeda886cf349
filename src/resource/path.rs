//! Path Expressions
//!
//! Dot-separated accessors over a [`Node`]:
//!
//! - `metadata.name` - record field / mapping key
//! - `spec.containers.0.image` - sequence index
//! - `metadata.labels["app.kubernetes.io/name"]` - quoted key (may contain dots)
//! - `spec.containers.*.name` - wildcard over every element
//! - `targetPort.$tag` - active alternative of a tagged union
//!
//! Paths are parsed once, when the catalogue is built. Resolution is total:
//! absence anywhere along the path yields `None`, never an error.

use super::value::Node;
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Path parse errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("empty segment in path '{0}'")]
    EmptySegment(String),

    #[error("unterminated bracket in path '{0}'")]
    UnterminatedBracket(String),

    #[error("invalid bracket segment '[{segment}]' in path '{path}'")]
    InvalidBracket { path: String, segment: String },

    #[error("unexpected character '{found}' in path '{path}'")]
    Unexpected { path: String, found: char },

    #[error("unterminated placeholder in template '{0}'")]
    UnterminatedPlaceholder(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
    Wildcard,
    Tag,
}

/// A parsed path expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    raw: String,
    segments: Vec<Segment>,
}

impl Path {
    /// The empty path: resolves to the item itself
    pub fn root() -> Self {
        Self {
            raw: String::new(),
            segments: Vec::new(),
        }
    }

    /// A single-key path, without parsing (the key may contain dots)
    pub fn key(name: &str) -> Self {
        Self {
            raw: name.to_string(),
            segments: vec![Segment::Key(name.to_string())],
        }
    }

    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let mut segments = Vec::new();
        if raw.is_empty() {
            return Ok(Self::root());
        }

        let mut rest = raw;
        loop {
            if rest.starts_with('[') {
                let (segment, remaining) = parse_bracket(rest, raw)?;
                segments.push(segment);
                rest = remaining;
            } else {
                let end = rest.find(|c: char| c == '.' || c == '[').unwrap_or(rest.len());
                let name = &rest[..end];
                if name.is_empty() {
                    return Err(PathError::EmptySegment(raw.to_string()));
                }
                segments.push(bare_segment(name));
                rest = &rest[end..];
            }

            while rest.starts_with('[') {
                let (segment, remaining) = parse_bracket(rest, raw)?;
                segments.push(segment);
                rest = remaining;
            }

            if rest.is_empty() {
                break;
            }
            match rest.strip_prefix('.') {
                Some("") => return Err(PathError::EmptySegment(raw.to_string())),
                Some(remaining) => rest = remaining,
                None => {
                    return Err(PathError::Unexpected {
                        path: raw.to_string(),
                        found: rest.chars().next().unwrap_or('?'),
                    })
                }
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Resolve against an item. `None` means the value is missing.
    ///
    /// Plain lookups borrow from the item; wildcards and `$tag` build new nodes.
    pub fn resolve<'a>(&self, item: &'a Node) -> Option<Cow<'a, Node>> {
        walk(item, &self.segments)
    }
}

impl FromStr for Path {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Path::parse(s)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn bare_segment(name: &str) -> Segment {
    match name {
        "*" => Segment::Wildcard,
        "$tag" => Segment::Tag,
        _ => match name.parse::<usize>() {
            Ok(index) if name.bytes().all(|b| b.is_ascii_digit()) => Segment::Index(index),
            _ => Segment::Key(name.to_string()),
        },
    }
}

/// Parse `[...]` at the start of `input`, returning the segment and the rest
fn parse_bracket<'a>(input: &'a str, raw: &str) -> Result<(Segment, &'a str), PathError> {
    let inner = &input[1..];

    if let Some(quoted) = inner.strip_prefix('"') {
        let Some(close) = quoted.find('"') else {
            return Err(PathError::UnterminatedBracket(raw.to_string()));
        };
        let key = &quoted[..close];
        let Some(rest) = quoted[close + 1..].strip_prefix(']') else {
            return Err(PathError::UnterminatedBracket(raw.to_string()));
        };
        return Ok((Segment::Key(key.to_string()), rest));
    }

    let Some(close) = inner.find(']') else {
        return Err(PathError::UnterminatedBracket(raw.to_string()));
    };
    let content = &inner[..close];
    let segment = match content {
        "*" => Segment::Wildcard,
        _ if !content.is_empty() && content.bytes().all(|b| b.is_ascii_digit()) => {
            match content.parse::<usize>() {
                Ok(index) => Segment::Index(index),
                Err(_) => Segment::Key(content.to_string()),
            }
        }
        _ => {
            return Err(PathError::InvalidBracket {
                path: raw.to_string(),
                segment: content.to_string(),
            })
        }
    };
    Ok((segment, &inner[close + 1..]))
}

fn walk<'a>(node: &'a Node, segments: &[Segment]) -> Option<Cow<'a, Node>> {
    let node = node.present()?;
    let Some((head, tail)) = segments.split_first() else {
        return Some(Cow::Borrowed(node));
    };

    match (head, node) {
        (Segment::Tag, Node::Union { tag, .. }) if tail.is_empty() => {
            Some(Cow::Owned(Node::text(tag.clone())))
        }
        (Segment::Tag, _) => None,

        (Segment::Key(key), Node::Union { tag, value }) if key == tag => walk(value, tail),
        (_, Node::Union { value, .. }) => walk(value, segments),

        (Segment::Wildcard, Node::Sequence(items)) => Some(Cow::Owned(collect(items.iter(), tail))),
        (Segment::Wildcard, Node::Record(fields) | Node::Mapping(fields)) => {
            Some(Cow::Owned(collect(fields.values(), tail)))
        }

        (Segment::Key(key), Node::Record(fields) | Node::Mapping(fields)) => {
            walk(fields.get(key)?, tail)
        }
        (Segment::Index(index), Node::Record(fields) | Node::Mapping(fields)) => {
            walk(fields.get(&index.to_string())?, tail)
        }
        (Segment::Index(index), Node::Sequence(items)) => walk(items.get(*index)?, tail),

        _ => None,
    }
}

fn collect<'a>(children: impl Iterator<Item = &'a Node>, tail: &[Segment]) -> Node {
    Node::Sequence(
        children
            .filter_map(|child| walk(child, tail))
            .map(Cow::into_owned)
            .collect(),
    )
}

/// Template part
#[derive(Debug, Clone, PartialEq, Eq)]
enum TemplatePart {
    Literal(String),
    Field(Path),
}

/// A string with `{path}` placeholders filled from an item, e.g.
/// `/api/v1/namespaces/{metadata.name}/events`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    parts: Vec<TemplatePart>,
}

impl PathTemplate {
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let mut parts = Vec::new();
        let mut rest = raw;

        while let Some(open) = rest.find('{') {
            if open > 0 {
                parts.push(TemplatePart::Literal(rest[..open].to_string()));
            }
            let Some(close) = rest[open..].find('}') else {
                return Err(PathError::UnterminatedPlaceholder(raw.to_string()));
            };
            let field = &rest[open + 1..open + close];
            if field.is_empty() {
                return Err(PathError::EmptySegment(raw.to_string()));
            }
            parts.push(TemplatePart::Field(Path::parse(field)?));
            rest = &rest[open + close + 1..];
        }
        if !rest.is_empty() {
            parts.push(TemplatePart::Literal(rest.to_string()));
        }

        Ok(Self {
            raw: raw.to_string(),
            parts,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn has_placeholders(&self) -> bool {
        self.parts
            .iter()
            .any(|part| matches!(part, TemplatePart::Field(_)))
    }

    /// Fill placeholders from `item`. Returns the first placeholder that
    /// did not resolve to a scalar as the error.
    pub fn render(&self, item: Option<&Node>) -> Result<String, String> {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                TemplatePart::Literal(text) => out.push_str(text),
                TemplatePart::Field(path) => {
                    let value = item
                        .and_then(|item| path.resolve(item))
                        .and_then(|node| node.as_scalar().map(|s| s.to_string()));
                    match value {
                        Some(value) => out.push_str(&urlencoding::encode(&value)),
                        None => return Err(path.to_string()),
                    }
                }
            }
        }
        Ok(out)
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
