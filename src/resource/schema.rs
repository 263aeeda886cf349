//! Column/Table Schema
//!
//! Static description of the tables the engine fills. Relations are owned
//! by their parent table, so the schema is a finite tree.

use super::extract::{coerce, ColumnKind, Datum, ExtractError, Extractor};
use super::path::{Path, PathTemplate};
use super::value::Node;
use std::collections::HashSet;
use thiserror::Error;

/// Column names reserved for row bookkeeping
pub const RESERVED_COLUMNS: &[&str] = &["_kflat_id", "_kflat_parent_id", "_kflat_context", "_kflat_pass"];

/// Catalogue errors (fatal at startup)
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to parse catalogue: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("table {table}, column {column}: {source}")]
    InvalidPath {
        table: String,
        column: String,
        #[source]
        source: super::path::PathError,
    },

    #[error("table {table}: invalid listing: {source}")]
    InvalidListing {
        table: String,
        #[source]
        source: super::path::PathError,
    },

    #[error("table {table}, column {column}: unknown resolver '{resolver}'")]
    UnknownResolver {
        table: String,
        column: String,
        resolver: String,
    },

    #[error("duplicate table name '{0}'")]
    DuplicateTable(String),

    #[error("table {table}: duplicate column '{column}'")]
    DuplicateColumn { table: String, column: String },

    #[error("table {table}: column name '{column}' is reserved")]
    ReservedColumn { table: String, column: String },

    #[error("table {table}: primary key column '{column}' is not a column of the table")]
    UnknownPrimaryKey { table: String, column: String },

    #[error("table {0}: root tables must list through the API")]
    RootWithoutApi(String),

    #[error("table {0}: API listing of a child table must reference parent fields")]
    ChildWithoutParentFields(String),
}

/// A typed column with its extractor
#[derive(Debug, Clone)]
pub struct ColumnSchema {
    pub name: String,
    pub kind: ColumnKind,
    pub extractor: Extractor,
}

impl ColumnSchema {
    /// Column read from the field with the same name
    pub fn new(name: &str, kind: ColumnKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            extractor: Extractor::path(Path::key(name)),
        }
    }

    pub fn with_path(mut self, path: &str) -> Result<Self, super::path::PathError> {
        self.extractor = Extractor::path(Path::parse(path)?);
        Ok(self)
    }

    pub fn with_extractor(mut self, extractor: Extractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// Extract and coerce this column's value from an item
    pub fn value(&self, item: &Node) -> Result<Datum, ExtractError> {
        let node = self.extractor.extract(item)?;
        coerce(self.kind, node.as_deref())
    }
}

/// How a table obtains its items
#[derive(Debug, Clone)]
pub enum Listing {
    /// List through the upstream API. Placeholders are filled from the parent item.
    Api {
        path: PathTemplate,
        response_path: Path,
    },
    /// Items nested inside the parent item
    Parent { path: Path },
}

impl Listing {
    pub fn api(path: &str) -> Result<Self, super::path::PathError> {
        Ok(Listing::Api {
            path: PathTemplate::parse(path)?,
            response_path: Path::key("items"),
        })
    }

    pub fn parent(path: &str) -> Result<Self, super::path::PathError> {
        Ok(Listing::Parent {
            path: Path::parse(path)?,
        })
    }
}

/// Whether a table is synced once per configured context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiplexPolicy {
    PerContext,
}

/// Which rows the reconciler may delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteFilter {
    /// Rows in the scope not rewritten by the current pass
    StalePass,
}

/// Immutable table description
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub name: String,
    pub description: String,
    pub columns: Vec<ColumnSchema>,
    pub relations: Vec<TableSchema>,
    pub primary_key: Vec<String>,
    pub listing: Listing,
    pub multiplex: Option<MultiplexPolicy>,
    pub delete_filter: Option<DeleteFilter>,
}

impl TableSchema {
    pub fn new(name: &str, listing: Listing) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            columns: Vec::new(),
            relations: Vec::new(),
            primary_key: Vec::new(),
            listing,
            multiplex: None,
            delete_filter: None,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_column(mut self, column: ColumnSchema) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_relation(mut self, relation: TableSchema) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn with_primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn per_context(mut self) -> Self {
        self.multiplex = Some(MultiplexPolicy::PerContext);
        self
    }

    pub fn with_delete_filter(mut self, filter: DeleteFilter) -> Self {
        self.delete_filter = Some(filter);
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Positions of the primary-key columns in `columns`
    pub fn primary_key_indices(&self) -> Vec<usize> {
        self.primary_key
            .iter()
            .filter_map(|key| self.columns.iter().position(|c| &c.name == key))
            .collect()
    }

    /// This table and every descendant, depth first (parents before children)
    pub fn walk(&self) -> Vec<&TableSchema> {
        let mut out = vec![self];
        for relation in &self.relations {
            out.extend(relation.walk());
        }
        out
    }

    /// Find this table or a descendant by name
    pub fn find(&self, name: &str) -> Option<&TableSchema> {
        self.walk().into_iter().find(|t| t.name == name)
    }

    /// Validate this table as a root table
    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut names = HashSet::new();
        self.validate_node(true, &mut names)
    }

    pub(crate) fn validate_node<'a>(
        &'a self,
        is_root: bool,
        names: &mut HashSet<&'a str>,
    ) -> Result<(), CatalogError> {
        if !names.insert(self.name.as_str()) {
            return Err(CatalogError::DuplicateTable(self.name.clone()));
        }

        match &self.listing {
            Listing::Parent { .. } if is_root => {
                return Err(CatalogError::RootWithoutApi(self.name.clone()));
            }
            Listing::Api { path, .. } if !is_root && !path.has_placeholders() => {
                return Err(CatalogError::ChildWithoutParentFields(self.name.clone()));
            }
            _ => {}
        }

        let mut columns = HashSet::new();
        for column in &self.columns {
            if RESERVED_COLUMNS.contains(&column.name.as_str()) {
                return Err(CatalogError::ReservedColumn {
                    table: self.name.clone(),
                    column: column.name.clone(),
                });
            }
            if !columns.insert(column.name.as_str()) {
                return Err(CatalogError::DuplicateColumn {
                    table: self.name.clone(),
                    column: column.name.clone(),
                });
            }
        }

        for key in &self.primary_key {
            if !columns.contains(key.as_str()) {
                return Err(CatalogError::UnknownPrimaryKey {
                    table: self.name.clone(),
                    column: key.clone(),
                });
            }
        }

        for relation in &self.relations {
            relation.validate_node(false, names)?;
        }
        Ok(())
    }
}
