//! Row model
//!
//! Identifiers and the materialized row written to a sink for one fetched item.

use crate::resource::Datum;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Namespace for content-derived row ids (v5 UUIDs)
const ROW_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6b66_6c61_742d_726f_772d_6964_2d6e_7331);

/// Row identifier (surrogate or content-derived)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(pub Uuid);

impl RowId {
    /// Fresh surrogate key, independent of upstream content
    pub fn surrogate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Stable key for a logical item: the same inputs always give the same id.
    ///
    /// Primary-key values are encoded through their JSON form so that
    /// `Text("1")` and `Integer(1)` never collide.
    pub fn derive(
        table: &str,
        context: &ContextId,
        parent: Option<RowId>,
        key_values: &[&Datum],
    ) -> Self {
        let mut name = String::new();
        name.push_str(table);
        name.push('\u{1f}');
        name.push_str(context.as_str());
        name.push('\u{1f}');
        if let Some(parent) = parent {
            name.push_str(&parent.0.to_string());
        }
        for value in key_values {
            name.push('\u{1f}');
            name.push_str(&serde_json::to_string(value).unwrap_or_default());
        }
        Self(Uuid::new_v5(&ROW_ID_NAMESPACE, name.as_bytes()))
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of a sync pass. Later passes always compare greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PassId(pub u64);

impl fmt::Display for PassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Name of an upstream execution context (e.g. one cluster)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(String);

impl ContextId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Scope of one reconciliation unit within a table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope {
    pub context: ContextId,
    pub parent: Option<RowId>,
}

impl Scope {
    pub fn new(context: ContextId, parent: Option<RowId>) -> Self {
        Self { context, parent }
    }
}

/// A materialized row for one fetched item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub id: RowId,
    pub table: String,
    pub context: ContextId,
    #[serde(default)]
    pub parent_id: Option<RowId>,
    pub pass: PassId,
    pub values: Vec<(String, Datum)>,
}

impl Row {
    /// Get a column value by name
    pub fn get(&self, column: &str) -> Option<&Datum> {
        self.values
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn scope(&self) -> Scope {
        Scope::new(self.context.clone(), self.parent_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_ids_are_stable() {
        let ctx = ContextId::new("prod");
        let key = Datum::Text("1".to_string());
        let a = RowId::derive("widgets", &ctx, None, &[&key]);
        let b = RowId::derive("widgets", &ctx, None, &[&key]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_derived_ids_depend_on_scope() {
        let key = Datum::Text("1".to_string());
        let prod = RowId::derive("widgets", &ContextId::new("prod"), None, &[&key]);
        let dev = RowId::derive("widgets", &ContextId::new("dev"), None, &[&key]);
        assert_ne!(prod, dev);

        let child_a = RowId::derive("tags", &ContextId::new("prod"), Some(prod), &[&key]);
        let child_b = RowId::derive("tags", &ContextId::new("prod"), Some(dev), &[&key]);
        assert_ne!(child_a, child_b);
    }

    #[test]
    fn test_derived_ids_distinguish_types() {
        let ctx = ContextId::new("prod");
        let text = Datum::Text("1".to_string());
        let int = Datum::Integer(1);
        assert_ne!(
            RowId::derive("widgets", &ctx, None, &[&text]),
            RowId::derive("widgets", &ctx, None, &[&int])
        );
    }

    #[test]
    fn test_row_get() {
        let row = Row {
            id: RowId::surrogate(),
            table: "widgets".to_string(),
            context: ContextId::new("prod"),
            parent_id: None,
            pass: PassId(1),
            values: vec![("name".to_string(), Datum::Text("a".to_string()))],
        };
        assert_eq!(row.get("name"), Some(&Datum::Text("a".to_string())));
        assert_eq!(row.get("missing"), None);
    }
}
