use crate::config::SheetNames;
use crate::error::DashboardError;
use crate::store::RecordStore;
use crate::table::Table;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Instant;

/// An open record store plus the tables materialized from it.
///
/// Cached tables are never mutated; an append to a sheet drops that
/// sheet's entry and the next read materializes it again.
pub struct Session {
    store: Box<dyn RecordStore>,
    sheets: SheetNames,
    tables: HashMap<String, Rc<Table>>,
}

impl Session {
    pub fn new(store: Box<dyn RecordStore>, sheets: SheetNames) -> Self {
        Self {
            store,
            sheets,
            tables: HashMap::new(),
        }
    }

    pub fn sheets(&self) -> &SheetNames {
        &self.sheets
    }

    pub fn source_id(&self) -> String {
        self.store.source_id()
    }

    pub fn cached_sheets(&self) -> usize {
        self.tables.len()
    }

    pub fn table(&mut self, sheet: &str) -> Result<Rc<Table>, DashboardError> {
        if let Some(t) = self.tables.get(sheet) {
            return Ok(Rc::clone(t));
        }
        let started = Instant::now();
        let raw = self
            .store
            .fetch_all_records(sheet)
            .map_err(|source| DashboardError::StoreRead {
                sheet: sheet.to_string(),
                source,
            })?;
        let table = Rc::new(Table::materialize(&raw));
        tracing::debug!(
            sheet,
            rows = table.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "materialized table"
        );
        self.tables.insert(sheet.to_string(), Rc::clone(&table));
        Ok(table)
    }

    pub fn append(&mut self, sheet: &str, cells: &[serde_json::Value]) -> Result<(), DashboardError> {
        let started = Instant::now();
        let result = self.store.append_row(sheet, cells);
        let elapsed_ms = started.elapsed().as_millis() as u64;
        // Drop the cached copy even on failure; the store may have partially written.
        self.tables.remove(sheet);
        match result {
            Ok(()) => {
                tracing::info!(sheet, elapsed_ms, "row appended");
                Ok(())
            }
            Err(source) => {
                tracing::warn!(sheet, elapsed_ms, error = %source, "append failed");
                Err(DashboardError::StoreWrite {
                    sheet: sheet.to_string(),
                    source,
                })
            }
        }
    }

    /// Drops every cached table. Returns how many were dropped.
    pub fn reload(&mut self) -> usize {
        let n = self.tables.len();
        self.tables.clear();
        n
    }
}
