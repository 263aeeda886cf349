//! In-memory row store
//!
//! Keeps every table in memory behind one lock and can snapshot itself to a
//! JSON file between runs, so pass ids and reconciliation carry over from
//! one invocation to the next.

use super::{Sink, SinkError};
use crate::row::{PassId, Row, RowId, Scope};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct SinkState {
    last_pass: u64,
    tables: BTreeMap<String, BTreeMap<RowId, Row>>,
}

/// On-disk snapshot format
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    last_pass: u64,
    #[serde(default)]
    tables: BTreeMap<String, Vec<Row>>,
}

/// In-memory sink with optional JSON persistence
#[derive(Debug, Default)]
pub struct MemorySink {
    state: Mutex<SinkState>,
    path: Option<PathBuf>,
}

impl MemorySink {
    /// Empty sink that is never persisted
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the snapshot at `path` if it exists; `save` writes back to it
    pub fn open(path: &Path) -> Result<Self, SinkError> {
        let mut state = SinkState::default();

        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let snapshot: Snapshot = serde_json::from_str(&content)?;
            state.last_pass = snapshot.last_pass;
            for (table, rows) in snapshot.tables {
                let rows = rows.into_iter().map(|row| (row.id, row)).collect();
                state.tables.insert(table, rows);
            }
            tracing::debug!(
                "Loaded sink snapshot {:?} (last pass {})",
                path,
                state.last_pass
            );
        }

        Ok(Self {
            state: Mutex::new(state),
            path: Some(path.to_path_buf()),
        })
    }

    /// Write the snapshot to disk (no-op for a sink created with `new`)
    pub fn save(&self) -> Result<(), SinkError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let snapshot = {
            let state = self.state()?;
            Snapshot {
                last_pass: state.last_pass,
                tables: state
                    .tables
                    .iter()
                    .map(|(name, rows)| (name.clone(), rows.values().cloned().collect()))
                    .collect(),
            }
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(path, content)?;
        tracing::debug!("Saved sink snapshot {:?}", path);
        Ok(())
    }

    /// All rows of a table, ordered by id
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state()
            .map(|state| {
                state
                    .tables
                    .get(table)
                    .map(|rows| rows.values().cloned().collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    pub fn row(&self, table: &str, id: RowId) -> Option<Row> {
        self.state().ok()?.tables.get(table)?.get(&id).cloned()
    }

    pub fn count(&self, table: &str) -> usize {
        self.state()
            .map(|state| state.tables.get(table).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }

    pub fn table_names(&self) -> Vec<String> {
        self.state()
            .map(|state| state.tables.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn state(&self) -> Result<MutexGuard<'_, SinkState>, SinkError> {
        self.state.lock().map_err(|_| SinkError::Poisoned)
    }
}

impl Sink for MemorySink {
    fn begin_pass(&self) -> Result<PassId, SinkError> {
        let mut state = self.state()?;
        state.last_pass += 1;
        Ok(PassId(state.last_pass))
    }

    fn upsert_row(&self, row: &Row) -> Result<(), SinkError> {
        let mut state = self.state()?;
        state
            .tables
            .entry(row.table.clone())
            .or_default()
            .insert(row.id, row.clone());
        Ok(())
    }

    fn rows_not_written_since(
        &self,
        table: &str,
        scope: &Scope,
        pass: PassId,
    ) -> Result<Vec<RowId>, SinkError> {
        let state = self.state()?;
        let Some(rows) = state.tables.get(table) else {
            return Ok(Vec::new());
        };
        Ok(rows
            .values()
            .filter(|row| {
                row.context == scope.context && row.parent_id == scope.parent && row.pass < pass
            })
            .map(|row| row.id)
            .collect())
    }

    fn delete_rows(&self, table: &str, ids: &[RowId]) -> Result<usize, SinkError> {
        let mut state = self.state()?;
        let Some(rows) = state.tables.get_mut(table) else {
            return Ok(0);
        };
        Ok(ids.iter().filter(|id| rows.remove(id).is_some()).count())
    }
}
