//! Delete Reconciler
//!
//! Removes rows that were not rewritten in the current pass, but only inside
//! scopes whose listing completed (see [`ScopeLedger`]). Deletion runs
//! children first. When a stale row is deleted, the rows of its relations
//! go with it. A row whose children could not all be deleted is kept so the
//! sink never holds a child without its parent. Rows of a table without a
//! delete filter are never removed, so a stale row that still has such
//! children is kept as well.

use super::orchestrator::{ScopeEntry, ScopeLedger};
use super::report::Failure;
use super::retry::RetryPolicy;
use crate::resource::TableSchema;
use crate::row::{ContextId, PassId, RowId, Scope};
use crate::sink::Sink;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Rows deleted per table, and the scopes that could not be reconciled
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileOutcome {
    pub deleted: BTreeMap<String, usize>,
    pub failures: Vec<Failure>,
}

impl ReconcileOutcome {
    pub fn total_deleted(&self) -> usize {
        self.deleted.values().sum()
    }
}

/// How the rows of a scope are judged
#[derive(Clone, Copy)]
enum Mode<'l> {
    /// Listed this pass: stale rows go, except those whose write failed
    Closed(&'l ScopeEntry),
    /// Parent is being deleted: every row not written this pass goes
    Cascade,
}

struct PlannedDelete<'t> {
    depth: usize,
    table: &'t str,
    parent: Option<RowId>,
    ids: Vec<RowId>,
}

#[derive(Default)]
struct Plan<'t> {
    deletes: Vec<PlannedDelete<'t>>,
    failures: Vec<Failure>,
    /// Rows that must outlive this pass because children remain under them
    kept: HashSet<RowId>,
}

impl<'t> Plan<'t> {
    fn merge(&mut self, other: Plan<'t>) {
        self.deletes.extend(other.deletes);
        self.failures.extend(other.failures);
        self.kept.extend(other.kept);
    }

    fn keep_parent(&mut self, parent: Option<RowId>) {
        if let Some(parent) = parent {
            self.kept.insert(parent);
        }
    }
}

/// Deletes stale rows after a write phase
pub struct Reconciler {
    sink: Arc<dyn Sink>,
    retry: RetryPolicy,
}

impl Reconciler {
    pub fn new(sink: Arc<dyn Sink>) -> Self {
        Self {
            sink,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Reconcile `table` and its relations for one context and parent.
    ///
    /// Does nothing unless the (table, parent) listing completed in `pass`.
    pub async fn reconcile(
        &self,
        table: &TableSchema,
        context: &ContextId,
        parent: Option<RowId>,
        pass: PassId,
        ledger: &ScopeLedger,
    ) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();

        let Some(entry) = ledger.get(&table.name, parent) else {
            tracing::debug!(
                "Skipping reconciliation of {} in {}: listing did not complete",
                table.name,
                context
            );
            return outcome;
        };

        let plan = self
            .plan(table, context, parent, pass, ledger, Mode::Closed(entry), 0)
            .await;
        outcome.failures = plan.failures;
        self.execute(context, plan.deletes, &mut outcome).await;

        if outcome.total_deleted() > 0 {
            tracing::info!(
                "Deleted {} stale rows under {} in {}",
                outcome.total_deleted(),
                table.name,
                context
            );
        }
        outcome
    }

    /// Walk the schema top-down collecting stale row ids per scope
    #[allow(clippy::too_many_arguments)]
    fn plan<'a>(
        &'a self,
        table: &'a TableSchema,
        context: &'a ContextId,
        parent: Option<RowId>,
        pass: PassId,
        ledger: &'a ScopeLedger,
        mode: Mode<'a>,
        depth: usize,
    ) -> BoxFuture<'a, Plan<'a>> {
        async move {
            let mut plan = Plan::default();
            let reconciled = table.delete_filter.is_some();
            let scope = Scope::new(context.clone(), parent);

            // Rows of a table without a delete filter are never removed.
            // Their children still have a parent, and their own parent has
            // to stay.
            if matches!(mode, Mode::Cascade) && !reconciled {
                let what = format!("list {} rows under a stale parent", table.name);
                let remaining = self
                    .retry
                    .run(&what, || {
                        self.sink.rows_not_written_since(&table.name, &scope, pass)
                    })
                    .await;
                match remaining {
                    Ok(ids) if ids.is_empty() => {}
                    Ok(ids) => {
                        tracing::debug!(
                            "Keeping parent {:?} of {} {} rows in {}",
                            parent,
                            ids.len(),
                            table.name,
                            context
                        );
                        plan.keep_parent(parent);
                    }
                    Err(err) => {
                        tracing::error!("Failed to {} in {}: {}", what, context, err);
                        plan.failures.push(Failure::Reconcile {
                            table: table.name.clone(),
                            context: context.clone(),
                            parent,
                            message: err.to_string(),
                        });
                        plan.keep_parent(parent);
                    }
                }
                return plan;
            }

            let stale = if reconciled {
                let what = format!("list stale {} rows", table.name);
                match self
                    .retry
                    .run(&what, || {
                        self.sink.rows_not_written_since(&table.name, &scope, pass)
                    })
                    .await
                {
                    Ok(ids) => match mode {
                        Mode::Closed(entry) => ids
                            .into_iter()
                            .filter(|id| !entry.unwritten.contains(id))
                            .collect(),
                        Mode::Cascade => ids,
                    },
                    Err(err) => {
                        tracing::error!("Failed to {} in {}: {}", what, context, err);
                        plan.failures.push(Failure::Reconcile {
                            table: table.name.clone(),
                            context: context.clone(),
                            parent,
                            message: err.to_string(),
                        });
                        plan.keep_parent(parent);
                        Vec::new()
                    }
                }
            } else {
                Vec::new()
            };

            for relation in &table.relations {
                if let Mode::Closed(entry) = mode {
                    for id in &entry.written {
                        if let Some(child) = ledger.get(&relation.name, Some(*id)) {
                            let sub = self
                                .plan(relation, context, Some(*id), pass, ledger, Mode::Closed(child), depth + 1)
                                .await;
                            plan.merge(sub);
                        }
                    }
                }
                for id in &stale {
                    let sub = self
                        .plan(relation, context, Some(*id), pass, ledger, Mode::Cascade, depth + 1)
                        .await;
                    plan.merge(sub);
                }
            }

            let planned = stale.len();
            let stale: Vec<RowId> = stale
                .into_iter()
                .filter(|id| !plan.kept.contains(id))
                .collect();
            if stale.len() < planned {
                tracing::debug!(
                    "Keeping {} stale {} rows that still have children",
                    planned - stale.len(),
                    table.name
                );
                plan.keep_parent(parent);
            }

            if !stale.is_empty() {
                plan.deletes.push(PlannedDelete {
                    depth,
                    table: &table.name,
                    parent,
                    ids: stale,
                });
            }
            plan
        }
        .boxed()
    }

    /// Delete deepest batches first, withholding parents of failed batches
    async fn execute(
        &self,
        context: &ContextId,
        mut deletes: Vec<PlannedDelete<'_>>,
        outcome: &mut ReconcileOutcome,
    ) {
        deletes.sort_by(|a, b| b.depth.cmp(&a.depth));
        let mut withheld: HashSet<RowId> = HashSet::new();

        for batch in deletes {
            let planned = batch.ids.len();
            let ids: Vec<RowId> = batch
                .ids
                .into_iter()
                .filter(|id| !withheld.contains(id))
                .collect();

            if ids.len() < planned {
                tracing::debug!(
                    "Keeping {} {} rows whose children could not be deleted",
                    planned - ids.len(),
                    batch.table
                );
                if let Some(parent) = batch.parent {
                    withheld.insert(parent);
                }
            }
            if ids.is_empty() {
                continue;
            }

            let what = format!("delete {} stale {} rows", ids.len(), batch.table);
            match self
                .retry
                .run(&what, || self.sink.delete_rows(batch.table, &ids))
                .await
            {
                Ok(count) => {
                    *outcome.deleted.entry(batch.table.to_string()).or_default() += count;
                }
                Err(err) => {
                    tracing::error!("Failed to {} in {}: {}", what, context, err);
                    outcome.failures.push(Failure::Reconcile {
                        table: batch.table.to_string(),
                        context: context.clone(),
                        parent: batch.parent,
                        message: err.to_string(),
                    });
                    if let Some(parent) = batch.parent {
                        withheld.insert(parent);
                    }
                }
            }
        }
    }
}
