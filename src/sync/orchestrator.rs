//! Fetch-and-Flatten Orchestrator
//!
//! Lists a table's items, flattens each item into one row, persists it, and
//! recurses into the table's relations with that row as the parent. Rows of
//! one table are written in upstream order; a child row is only written once
//! its parent row has been persisted.

use super::cancel::CancelToken;
use super::report::{Failure, ScopeReport, Warning};
use super::retry::RetryPolicy;
use crate::kube::contexts::Context;
use crate::resource::fetcher::{self, Upstream};
use crate::resource::{Datum, Node, TableSchema};
use crate::row::{ContextId, PassId, Row, RowId};
use crate::sink::Sink;
use anyhow::{anyhow, Result};
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

/// Rows produced by one successful listing
#[derive(Debug, Clone, Default)]
pub struct ScopeEntry {
    /// Rows persisted this pass, in list order
    pub written: Vec<RowId>,
    /// Rows listed this pass whose write failed; never treated as stale
    pub unwritten: HashSet<RowId>,
}

/// Scopes whose listing completed in this pass, keyed by (table, parent)
#[derive(Debug, Default)]
pub struct ScopeLedger {
    scopes: HashMap<(String, Option<RowId>), ScopeEntry>,
}

impl ScopeLedger {
    pub fn record(&mut self, table: &str, parent: Option<RowId>, entry: ScopeEntry) {
        self.scopes.insert((table.to_string(), parent), entry);
    }

    pub fn get(&self, table: &str, parent: Option<RowId>) -> Option<&ScopeEntry> {
        self.scopes.get(&(table.to_string(), parent))
    }
}

/// Shared state of one (root table, context) run
pub struct RunState {
    pass: PassId,
    ledger: Mutex<ScopeLedger>,
    report: Mutex<ScopeReport>,
}

impl RunState {
    pub fn new(pass: PassId, table: &str, context: ContextId) -> Self {
        Self {
            pass,
            ledger: Mutex::new(ScopeLedger::default()),
            report: Mutex::new(ScopeReport::new(table, context)),
        }
    }

    pub fn pass(&self) -> PassId {
        self.pass
    }

    pub fn into_parts(self) -> (ScopeLedger, ScopeReport) {
        (
            self.ledger.into_inner().unwrap_or_else(PoisonError::into_inner),
            self.report.into_inner().unwrap_or_else(PoisonError::into_inner),
        )
    }

    fn fail(&self, failure: Failure) {
        self.report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .failures
            .push(failure);
    }

    fn warn(&self, warning: Warning) {
        self.report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .warnings
            .push(warning);
    }

    fn count_written(&self, table: &str) {
        *self
            .report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .rows_written
            .entry(table.to_string())
            .or_default() += 1;
    }

    fn record_scope(&self, table: &str, parent: Option<RowId>, entry: ScopeEntry) {
        self.ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(table, parent, entry);
    }
}

/// Parent row and the item it was flattened from
#[derive(Debug, Clone, Copy)]
pub struct ParentRef<'a> {
    pub row: &'a Row,
    pub item: &'a Node,
}

/// Flattens upstream items into sink rows
pub struct Orchestrator {
    upstream: Arc<dyn Upstream>,
    sink: Arc<dyn Sink>,
    retry: RetryPolicy,
    cancel: CancelToken,
}

impl Orchestrator {
    pub fn new(upstream: Arc<dyn Upstream>, sink: Arc<dyn Sink>) -> Self {
        Self {
            upstream,
            sink,
            retry: RetryPolicy::default(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Sync `table` (and its relations) for one context and parent.
    ///
    /// Returns the number of rows written for `table` itself. A listing
    /// failure or cancellation aborts this subtree and is returned as an
    /// error; row-level problems are recorded in `state` and do not.
    pub fn run<'a>(
        &'a self,
        table: &'a TableSchema,
        context: &'a Context,
        parent: Option<ParentRef<'a>>,
        state: &'a RunState,
    ) -> BoxFuture<'a, Result<usize>> {
        async move {
            let parent_id = parent.map(|p| p.row.id);

            if self.cancel.is_cancelled() {
                return Err(self.cancelled(table, context, parent_id, state));
            }

            let listing = fetcher::list_items(
                self.upstream.as_ref(),
                context,
                &table.listing,
                parent.map(|p| p.item),
            );
            let items = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return Err(self.cancelled(table, context, parent_id, state));
                }
                result = listing => match result {
                    Ok(items) => items,
                    Err(err) => {
                        tracing::error!(
                            "Listing {} in {} (parent {:?}) failed: {:#}",
                            table.name,
                            context.id,
                            parent_id,
                            err
                        );
                        state.fail(Failure::Listing {
                            table: table.name.clone(),
                            context: context.id.clone(),
                            parent: parent_id,
                            message: format!("{:#}", err),
                        });
                        return Err(err);
                    }
                },
            };

            tracing::debug!(
                "Listed {} {} items in {} (parent {:?})",
                items.len(),
                table.name,
                context.id,
                parent_id
            );

            let rows: Vec<Row> = items
                .iter()
                .map(|item| self.build_row(table, context, parent_id, item, state))
                .collect();
            let mut last_index = HashMap::with_capacity(rows.len());
            for (index, row) in rows.iter().enumerate() {
                last_index.insert(row.id, index);
            }

            let mut entry = ScopeEntry::default();

            for (index, (item, row)) in items.iter().zip(rows).enumerate() {
                if self.cancel.is_cancelled() {
                    return Err(self.cancelled(table, context, parent_id, state));
                }

                // Only the last item with a given key is written or descended.
                if last_index.get(&row.id) != Some(&index) {
                    tracing::warn!("Duplicate primary key in {} row {}", table.name, row.id);
                    state.warn(Warning {
                        table: table.name.clone(),
                        column: table.primary_key.join(","),
                        context: context.id.clone(),
                        row: row.id,
                        message: "duplicate primary key in listing; later item wins".to_string(),
                    });
                    continue;
                }

                let what = format!("write {} row {}", table.name, row.id);
                if let Err(err) = self.retry.run(&what, || self.sink.upsert_row(&row)).await {
                    tracing::error!("Failed to {}: {}", what, err);
                    state.fail(Failure::Sink {
                        table: table.name.clone(),
                        context: context.id.clone(),
                        row: row.id,
                        message: err.to_string(),
                    });
                    entry.unwritten.insert(row.id);
                    continue;
                }
                entry.written.push(row.id);
                state.count_written(&table.name);

                if !table.relations.is_empty() {
                    let this = ParentRef { row: &row, item };
                    // Failures are recorded per relation; siblings keep going.
                    join_all(
                        table
                            .relations
                            .iter()
                            .map(|relation| self.run(relation, context, Some(this), state)),
                    )
                    .await;
                }
            }

            let written = entry.written.len();
            state.record_scope(&table.name, parent_id, entry);
            Ok(written)
        }
        .boxed()
    }

    fn cancelled(
        &self,
        table: &TableSchema,
        context: &Context,
        parent: Option<RowId>,
        state: &RunState,
    ) -> anyhow::Error {
        tracing::info!("Sync of {} in {} cancelled", table.name, context.id);
        state.fail(Failure::Cancelled {
            table: table.name.clone(),
            context: context.id.clone(),
            parent,
        });
        anyhow!("Sync of {} in {} cancelled", table.name, context.id)
    }

    fn build_row(
        &self,
        table: &TableSchema,
        context: &Context,
        parent_id: Option<RowId>,
        item: &Node,
        state: &RunState,
    ) -> Row {
        let mut values = Vec::with_capacity(table.columns.len());
        let mut problems = Vec::new();

        for column in &table.columns {
            let value = match column.value(item) {
                Ok(value) => value,
                Err(err) => {
                    problems.push((column.name.clone(), err.to_string()));
                    Datum::Null
                }
            };
            values.push((column.name.clone(), value));
        }

        let id = row_id(table, &context.id, parent_id, &values, &mut problems);

        for (column, message) in problems {
            tracing::warn!(
                "Extracting {}.{} for row {} in {}: {}",
                table.name,
                column,
                id,
                context.id,
                message
            );
            state.warn(Warning {
                table: table.name.clone(),
                column,
                context: context.id.clone(),
                row: id,
                message,
            });
        }

        Row {
            id,
            table: table.name.clone(),
            context: context.id.clone(),
            parent_id,
            pass: state.pass,
            values,
        }
    }
}

/// Content-derived id when the table declares a primary key, else a surrogate
fn row_id(
    table: &TableSchema,
    context: &ContextId,
    parent_id: Option<RowId>,
    values: &[(String, Datum)],
    problems: &mut Vec<(String, String)>,
) -> RowId {
    if table.primary_key.is_empty() {
        return RowId::surrogate();
    }

    let keys: Vec<&Datum> = table
        .primary_key_indices()
        .into_iter()
        .map(|index| &values[index].1)
        .collect();

    if keys.iter().all(|value| value.is_null()) {
        problems.push((
            table.primary_key.join(","),
            "primary key is null; using a surrogate key".to_string(),
        ));
        return RowId::surrogate();
    }

    RowId::derive(&table.name, context, parent_id, &keys)
}
