//! kflat
//!
//! Flattens nested upstream resources (objects containing lists of objects)
//! into relational tables, syncs them from several contexts at once, and
//! deletes rows that disappeared upstream.
//!
//! - [`resource`] - Value model, paths, extraction and table catalog
//! - [`sync`] - Orchestrator, reconciler and context multiplexer
//! - [`sink`] - Row storage interface and the in-memory store
//! - [`kube`] - API server client and contexts
//! - [`config`] - Persistent configuration

pub mod config;
pub mod kube;
pub mod resource;
pub mod row;
pub mod sink;
pub mod sync;

/// Version injected at compile time via KFLAT_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("KFLAT_VERSION") {
    Some(v) => v,
    None => "dev",
};
