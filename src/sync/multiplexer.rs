//! Context Multiplexer
//!
//! Runs one sync pass: every root table in every context it applies to, with
//! bounded concurrency. Each (root table, context) unit is written and then
//! reconciled on its own, so a failing context never blocks the others.

use super::cancel::CancelToken;
use super::orchestrator::{Orchestrator, RunState};
use super::reconciler::Reconciler;
use super::report::{PassReport, ScopeReport};
use super::retry::RetryPolicy;
use crate::kube::contexts::Context;
use crate::resource::fetcher::Upstream;
use crate::resource::{MultiplexPolicy, TableSchema};
use crate::row::{ContextId, PassId};
use crate::sink::Sink;
use anyhow::{anyhow, Result};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;

/// Default number of (table, context) units synced at once
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Fans a pass out over contexts
pub struct Multiplexer {
    upstream: Arc<dyn Upstream>,
    sink: Arc<dyn Sink>,
    contexts: Vec<Context>,
    default_context: Option<ContextId>,
    max_concurrency: usize,
    retry: RetryPolicy,
    cancel: CancelToken,
}

impl Multiplexer {
    pub fn new(upstream: Arc<dyn Upstream>, sink: Arc<dyn Sink>, contexts: Vec<Context>) -> Self {
        Self {
            upstream,
            sink,
            contexts,
            default_context: None,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            retry: RetryPolicy::default(),
            cancel: CancelToken::new(),
        }
    }

    /// Context used for tables that are not synced per context
    pub fn with_default_context(mut self, context: Option<ContextId>) -> Self {
        self.default_context = context;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn contexts(&self) -> &[Context] {
        &self.contexts
    }

    /// Contexts a root table is synced in
    pub fn contexts_for(&self, table: &TableSchema) -> Vec<&Context> {
        match table.multiplex {
            Some(MultiplexPolicy::PerContext) => self.contexts.iter().collect(),
            None => self.ambient_context().into_iter().collect(),
        }
    }

    /// The configured default context, else the first one
    fn ambient_context(&self) -> Option<&Context> {
        if let Some(id) = &self.default_context {
            if let Some(context) = self.contexts.iter().find(|c| &c.id == id) {
                return Some(context);
            }
            tracing::warn!("Default context {} is not configured; using the first one", id);
        }
        self.contexts.first()
    }

    /// Run one pass over `tables`.
    ///
    /// Errors only when the pass cannot start; everything after that is
    /// reported per unit in the returned [`PassReport`], in table order then
    /// context order.
    pub async fn run_all(&self, tables: &[&TableSchema]) -> Result<PassReport> {
        if self.contexts.is_empty() {
            return Err(anyhow!("No contexts configured"));
        }

        let started_at = Utc::now();
        let pass = self
            .retry
            .run("begin pass", || self.sink.begin_pass())
            .await
            .map_err(|e| anyhow!("Failed to start sync pass: {}", e))?;

        let units: Vec<(&TableSchema, &Context)> = tables
            .iter()
            .flat_map(|table| {
                self.contexts_for(table)
                    .into_iter()
                    .map(move |context| (*table, context))
            })
            .collect();

        tracing::info!(
            "Starting pass {}: {} tables, {} units, concurrency {}",
            pass,
            tables.len(),
            units.len(),
            self.max_concurrency
        );

        let orchestrator = Orchestrator::new(self.upstream.clone(), self.sink.clone())
            .with_retry(self.retry)
            .with_cancel(self.cancel.clone());
        let reconciler = Reconciler::new(self.sink.clone()).with_retry(self.retry);

        let mut results: Vec<(usize, ScopeReport)> = stream::iter(units.into_iter().enumerate())
            .map(|(index, (table, context))| {
                let orchestrator = &orchestrator;
                let reconciler = &reconciler;
                async move {
                    let report =
                        self.run_unit(orchestrator, reconciler, table, context, pass).await;
                    (index, report)
                }
            })
            .buffer_unordered(self.max_concurrency.max(1))
            .collect()
            .await;
        results.sort_by_key(|(index, _)| *index);

        let report = PassReport {
            pass,
            started_at,
            finished_at: Utc::now(),
            scopes: results.into_iter().map(|(_, report)| report).collect(),
        };

        tracing::info!(
            "Finished pass {} in {}ms: {:?}",
            pass,
            report.duration().num_milliseconds(),
            report.status()
        );
        Ok(report)
    }

    /// Write phase then delete phase for one root table in one context
    async fn run_unit(
        &self,
        orchestrator: &Orchestrator,
        reconciler: &Reconciler,
        table: &TableSchema,
        context: &Context,
        pass: PassId,
    ) -> ScopeReport {
        let state = RunState::new(pass, &table.name, context.id.clone());
        let result = orchestrator.run(table, context, None, &state).await;
        let (ledger, mut report) = state.into_parts();

        match result {
            Ok(count) => tracing::info!(
                "Wrote {} {} rows ({} in total) in {}",
                count,
                table.name,
                report.total_written(),
                context.id
            ),
            Err(err) => tracing::warn!("Sync of {} in {} failed: {:#}", table.name, context.id, err),
        }

        // Rows of an aborted pass are left for the next complete one.
        if self.cancel.is_cancelled() {
            return report;
        }

        let outcome = reconciler
            .reconcile(table, &context.id, None, pass, &ledger)
            .await;
        report.rows_deleted = outcome.deleted;
        report.failures.extend(outcome.failures);
        report
    }
}
