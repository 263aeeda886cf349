//! Resource abstraction layer
//!
//! Turns upstream items into typed column values. Table definitions are
//! loaded from JSON files at compile time, so new tables can be added
//! without code changes.
//!
//! # Architecture
//!
//! - [`value`] - Tree-shaped value model of upstream items
//! - [`path`] - Parsed field paths and listing path templates
//! - [`extract`] - Column kinds, extractors and value coercion
//! - [`resolvers`] - Named resolver functions for derived columns
//! - [`schema`] - Table schemas and their validation
//! - [`registry`] - Loads and caches table definitions from embedded JSON
//! - [`fetcher`] - Resolves a table's listing through the upstream client
//!
//! # Table Definitions
//!
//! Tables are defined in JSON files under `src/resources/`:
//! - `core.json` - Namespaces, nodes, pods, services, config maps
//! - `apps.json` - Deployments and replica sets

pub mod extract;
pub mod fetcher;
pub mod path;
pub mod registry;
pub mod resolvers;
pub mod schema;
pub mod value;

pub use extract::{coerce, ColumnKind, Datum, ExtractError, Extractor};
pub use fetcher::{extract_items, list_items, ListRequest, Upstream};
pub use path::{Path, PathError, PathTemplate};
pub use registry::{get_catalog, get_table, Catalog};
pub use schema::{
    CatalogError, ColumnSchema, DeleteFilter, Listing, MultiplexPolicy, TableSchema,
};
pub use value::{Node, Scalar};
