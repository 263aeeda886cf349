//! Shared fixtures for the sync integration tests
#![allow(dead_code)]

use futures::future::BoxFuture;
use futures::FutureExt;
use kflat::kube::Context;
use kflat::resource::{
    ColumnKind, ColumnSchema, DeleteFilter, ListRequest, Listing, Node, TableSchema, Upstream,
};
use kflat::row::{PassId, Row, RowId, Scope};
use kflat::sink::{MemorySink, Sink, SinkError};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use url::Url;

pub fn context(name: &str) -> Context {
    Context::new(name, Url::parse(&format!("https://{}.example.com", name)).unwrap())
}

/// widgets (pk id) -> widget_tags (pk name, nested under `tags`)
pub fn widgets() -> TableSchema {
    TableSchema::new("widgets", Listing::api("/widgets").unwrap())
        .with_column(ColumnSchema::new("id", ColumnKind::Integer))
        .with_column(ColumnSchema::new("name", ColumnKind::Text))
        .with_primary_key(&["id"])
        .per_context()
        .with_delete_filter(DeleteFilter::StalePass)
        .with_relation(
            TableSchema::new("widget_tags", Listing::parent("tags").unwrap())
                .with_column(ColumnSchema::new("name", ColumnKind::Text))
                .with_primary_key(&["name"])
                .with_delete_filter(DeleteFilter::StalePass),
        )
}

/// Upstream answering from fixtures keyed by (context, path)
#[derive(Default)]
pub struct StaticUpstream {
    responses: Mutex<HashMap<(String, String), Result<Vec<Value>, String>>>,
    hanging: Mutex<HashSet<(String, String)>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl StaticUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, context: &str, path: &str, items: Vec<Value>) {
        self.responses
            .lock()
            .unwrap()
            .insert((context.into(), path.into()), Ok(items));
    }

    pub fn fail(&self, context: &str, path: &str, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert((context.into(), path.into()), Err(message.into()));
    }

    /// The listing never completes
    pub fn hang(&self, context: &str, path: &str) {
        self.hanging
            .lock()
            .unwrap()
            .insert((context.into(), path.into()));
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Upstream for StaticUpstream {
    fn list<'a>(
        &'a self,
        context: &'a Context,
        request: &'a ListRequest,
    ) -> BoxFuture<'a, anyhow::Result<Vec<Node>>> {
        let key = (context.id.as_str().to_string(), request.path.clone());
        self.calls.lock().unwrap().push(key.clone());

        if self.hanging.lock().unwrap().contains(&key) {
            return futures::future::pending().boxed();
        }

        let response = self.responses.lock().unwrap().get(&key).cloned();
        async move {
            match response {
                Some(Ok(items)) => Ok(items.into_iter().map(Node::from).collect()),
                Some(Err(message)) => Err(anyhow::anyhow!(message)),
                None => Err(anyhow::anyhow!("no fixture for {:?}", key)),
            }
        }
        .boxed()
    }
}

/// MemorySink that remembers the order of successful writes
#[derive(Default)]
pub struct RecordingSink {
    pub inner: MemorySink,
    writes: Mutex<Vec<Row>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> Vec<Row> {
        self.writes.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.writes.lock().unwrap().clear();
    }
}

impl Sink for RecordingSink {
    fn begin_pass(&self) -> Result<PassId, SinkError> {
        self.inner.begin_pass()
    }

    fn upsert_row(&self, row: &Row) -> Result<(), SinkError> {
        self.inner.upsert_row(row)?;
        self.writes.lock().unwrap().push(row.clone());
        Ok(())
    }

    fn rows_not_written_since(
        &self,
        table: &str,
        scope: &Scope,
        pass: PassId,
    ) -> Result<Vec<RowId>, SinkError> {
        self.inner.rows_not_written_since(table, scope, pass)
    }

    fn delete_rows(&self, table: &str, ids: &[RowId]) -> Result<usize, SinkError> {
        self.inner.delete_rows(table, ids)
    }
}

/// MemorySink whose writes fail a set number of times, optionally only
/// for one table
#[derive(Default)]
pub struct FlakySink {
    pub inner: MemorySink,
    write_failures: AtomicUsize,
    table: Option<String>,
    attempts: AtomicUsize,
}

impl FlakySink {
    pub fn new(write_failures: usize) -> Self {
        Self {
            write_failures: AtomicUsize::new(write_failures),
            ..Self::default()
        }
    }

    /// Writes to `table` always fail
    pub fn broken_table(table: &str) -> Self {
        Self {
            write_failures: AtomicUsize::new(usize::MAX),
            table: Some(table.to_string()),
            ..Self::default()
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Sink for FlakySink {
    fn begin_pass(&self) -> Result<PassId, SinkError> {
        self.inner.begin_pass()
    }

    fn upsert_row(&self, row: &Row) -> Result<(), SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let applies = self.table.as_deref().map_or(true, |t| t == row.table);
        if applies {
            let left = self.write_failures.load(Ordering::SeqCst);
            if left > 0 {
                if left != usize::MAX {
                    self.write_failures.store(left - 1, Ordering::SeqCst);
                }
                return Err(SinkError::Unavailable("connection reset".into()));
            }
        }
        self.inner.upsert_row(row)
    }

    fn rows_not_written_since(
        &self,
        table: &str,
        scope: &Scope,
        pass: PassId,
    ) -> Result<Vec<RowId>, SinkError> {
        self.inner.rows_not_written_since(table, scope, pass)
    }

    fn delete_rows(&self, table: &str, ids: &[RowId]) -> Result<usize, SinkError> {
        self.inner.delete_rows(table, ids)
    }
}
