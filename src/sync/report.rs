//! Pass report
//!
//! A pass is not all-or-nothing: every (root table, context) unit reports its
//! own row counts, extraction warnings and failures.

use crate::row::{ContextId, PassId, RowId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Column value that could not be extracted (stored as null)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Warning {
    pub table: String,
    pub column: String,
    pub context: ContextId,
    pub row: RowId,
    pub message: String,
}

/// Failure of one listing, row, or reconciliation scope
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Failure {
    Listing {
        table: String,
        context: ContextId,
        parent: Option<RowId>,
        message: String,
    },
    Sink {
        table: String,
        context: ContextId,
        row: RowId,
        message: String,
    },
    Reconcile {
        table: String,
        context: ContextId,
        parent: Option<RowId>,
        message: String,
    },
    Cancelled {
        table: String,
        context: ContextId,
        parent: Option<RowId>,
    },
}

impl Failure {
    pub fn table(&self) -> &str {
        match self {
            Failure::Listing { table, .. }
            | Failure::Sink { table, .. }
            | Failure::Reconcile { table, .. }
            | Failure::Cancelled { table, .. } => table,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Listing {
                table,
                context,
                message,
                ..
            } => write!(f, "listing {} in {} failed: {}", table, context, message),
            Failure::Sink {
                table, row, message, ..
            } => write!(f, "writing {} row {} failed: {}", table, row, message),
            Failure::Reconcile {
                table,
                context,
                message,
                ..
            } => write!(f, "reconciling {} in {} failed: {}", table, context, message),
            Failure::Cancelled { table, context, .. } => {
                write!(f, "sync of {} in {} was cancelled", table, context)
            }
        }
    }
}

/// Overall outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassStatus {
    Success,
    Partial,
    Failed,
}

/// Result of syncing one root table in one context
#[derive(Debug, Clone, Serialize)]
pub struct ScopeReport {
    pub table: String,
    pub context: ContextId,
    pub rows_written: BTreeMap<String, usize>,
    pub rows_deleted: BTreeMap<String, usize>,
    pub warnings: Vec<Warning>,
    pub failures: Vec<Failure>,
}

impl ScopeReport {
    pub fn new(table: &str, context: ContextId) -> Self {
        Self {
            table: table.to_string(),
            context,
            rows_written: BTreeMap::new(),
            rows_deleted: BTreeMap::new(),
            warnings: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn total_written(&self) -> usize {
        self.rows_written.values().sum()
    }

    pub fn total_deleted(&self) -> usize {
        self.rows_deleted.values().sum()
    }

    /// `Failed` when something failed and nothing was written or deleted
    pub fn status(&self) -> PassStatus {
        if self.failures.is_empty() && self.warnings.is_empty() {
            PassStatus::Success
        } else if !self.failures.is_empty()
            && self.total_written() == 0
            && self.total_deleted() == 0
        {
            PassStatus::Failed
        } else {
            PassStatus::Partial
        }
    }
}

/// Result of one sync pass
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub pass: PassId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub scopes: Vec<ScopeReport>,
}

impl PassReport {
    pub fn status(&self) -> PassStatus {
        let mut statuses = self.scopes.iter().map(ScopeReport::status);
        let Some(first) = statuses.next() else {
            return PassStatus::Success;
        };
        if statuses.all(|s| s == first) && first != PassStatus::Partial {
            first
        } else {
            PassStatus::Partial
        }
    }

    /// Reports for one context
    pub fn for_context<'a>(&'a self, context: &'a ContextId) -> impl Iterator<Item = &'a ScopeReport> {
        self.scopes.iter().filter(move |s| &s.context == context)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Warning> {
        self.scopes.iter().flat_map(|s| s.warnings.iter())
    }

    pub fn failures(&self) -> impl Iterator<Item = &Failure> {
        self.scopes.iter().flat_map(|s| s.failures.iter())
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}
