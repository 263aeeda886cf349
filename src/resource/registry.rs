//! Table Registry - Load table definitions from JSON
//!
//! This module loads the table catalogue from embedded JSON files, builds
//! validated [`TableSchema`] trees, and provides lookup functions for the
//! rest of the application.

use super::extract::{ColumnKind, Extractor};
use super::path::{Path, PathTemplate};
use super::schema::{
    CatalogError, ColumnSchema, DeleteFilter, Listing, MultiplexPolicy, TableSchema,
};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Embedded catalogue files (compiled into the binary)
const CATALOG_FILES: &[&str] = &[
    include_str!("../resources/core.json"),
    include_str!("../resources/apps.json"),
];

/// Column definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub kind: ColumnKind,
    /// Defaults to the column name
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub resolver: Option<String>,
}

/// Listing definition from JSON
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingDef {
    Api {
        path: String,
        #[serde(default)]
        response_path: Option<String>,
    },
    Parent {
        path: String,
    },
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiplexDef {
    PerContext,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteFilterDef {
    StalePass,
}

/// Table definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct TableDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub listing: ListingDef,
    #[serde(default)]
    pub multiplex: Option<MultiplexDef>,
    #[serde(default)]
    pub delete_filter: Option<DeleteFilterDef>,
    #[serde(default)]
    pub primary_key: Vec<String>,
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub relations: Vec<TableDef>,
}

/// Root structure of resources/*.json
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub tables: Vec<TableDef>,
}

impl TableDef {
    /// Build the schema tree for this definition
    pub fn build(&self) -> Result<TableSchema, CatalogError> {
        let listing = match &self.listing {
            ListingDef::Api {
                path,
                response_path,
            } => Listing::Api {
                path: PathTemplate::parse(path).map_err(|source| CatalogError::InvalidListing {
                    table: self.name.clone(),
                    source,
                })?,
                response_path: Path::parse(response_path.as_deref().unwrap_or("items"))
                    .map_err(|source| CatalogError::InvalidListing {
                        table: self.name.clone(),
                        source,
                    })?,
            },
            ListingDef::Parent { path } => Listing::Parent {
                path: Path::parse(path).map_err(|source| CatalogError::InvalidListing {
                    table: self.name.clone(),
                    source,
                })?,
            },
        };

        let mut table = TableSchema::new(&self.name, listing).with_description(&self.description);
        table.multiplex = self.multiplex.map(|_| MultiplexPolicy::PerContext);
        table.delete_filter = self.delete_filter.map(|_| DeleteFilter::StalePass);
        table.primary_key = self.primary_key.clone();

        for column in &self.columns {
            table.columns.push(self.build_column(column)?);
        }
        for relation in &self.relations {
            table.relations.push(relation.build()?);
        }
        Ok(table)
    }

    fn build_column(&self, def: &ColumnDef) -> Result<ColumnSchema, CatalogError> {
        let path = match def.path.as_deref() {
            Some(raw) => Path::parse(raw).map_err(|source| CatalogError::InvalidPath {
                table: self.name.clone(),
                column: def.name.clone(),
                source,
            })?,
            None if def.resolver.is_some() => Path::root(),
            None => Path::key(&def.name),
        };

        let extractor = match def.resolver.as_deref() {
            Some(name) => {
                Extractor::resolver(name, path).ok_or_else(|| CatalogError::UnknownResolver {
                    table: self.name.clone(),
                    column: def.name.clone(),
                    resolver: name.to_string(),
                })?
            }
            None => Extractor::path(path),
        };

        Ok(ColumnSchema::new(&def.name, def.kind).with_extractor(extractor))
    }
}

/// Validated set of root tables
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: Vec<TableSchema>,
}

impl Catalog {
    /// Parse and validate catalogue files. Table names must be unique
    /// across all files and all levels.
    pub fn from_sources(sources: &[&str]) -> Result<Self, CatalogError> {
        let mut tables = Vec::new();
        for content in sources {
            let file: CatalogFile = serde_json::from_str(content)?;
            for def in &file.tables {
                tables.push(def.build()?);
            }
        }
        Self::from_tables(tables)
    }

    pub fn from_tables(tables: Vec<TableSchema>) -> Result<Self, CatalogError> {
        let mut names = HashSet::new();
        for table in &tables {
            table.validate_node(true, &mut names)?;
        }
        Ok(Self { tables })
    }

    /// Root tables, in declaration order
    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    /// Find a root table by name
    pub fn root(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Find any table (root or relation) by name
    pub fn get(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find_map(|t| t.find(name))
    }

    /// Names of every table, parents before children
    pub fn all_names(&self) -> Vec<&str> {
        self.tables
            .iter()
            .flat_map(|t| t.walk())
            .map(|t| t.name.as_str())
            .collect()
    }
}

/// Global registry loaded from the embedded catalogue
static REGISTRY: OnceLock<Result<Catalog, String>> = OnceLock::new();

/// Get the catalogue (loads from embedded JSON on first access)
pub fn get_catalog() -> anyhow::Result<&'static Catalog> {
    REGISTRY
        .get_or_init(|| Catalog::from_sources(CATALOG_FILES).map_err(|e| e.to_string()))
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Invalid embedded catalogue: {}", e))
}

/// Get any table by name
pub fn get_table(name: &str) -> Option<&'static TableSchema> {
    get_catalog().ok()?.get(name)
}
