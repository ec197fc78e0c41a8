use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;

use crate::common::{HeapStoreError, Result};
use crate::storage::HeapFile;
use crate::tuple::Schema;

/// A registered table
struct TableEntry {
    name: String,
    file: Arc<HeapFile>,
    primary_key: String,
}

#[derive(Default)]
struct CatalogState {
    by_id: HashMap<u32, TableEntry>,
    by_name: HashMap<String, u32>,
}

/// The Catalog keeps track of every table and its heap file.
///
/// Tables are looked up by id when resolving pages and by name when
/// planning queries. A catalog is shared as `Arc<Catalog>` by the buffer pool
/// and page cache.
pub struct Catalog {
    state: RwLock<CatalogState>,
    next_table_id: AtomicU32,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(CatalogState::default()),
            next_table_id: AtomicU32::new(1),
        }
    }

    /// Registers `file` as table `name` and returns its id.
    ///
    /// A table already registered under `name` or under the file's id is
    /// replaced.
    pub fn add_table(&self, file: HeapFile, name: &str, primary_key: &str) -> u32 {
        let table_id = file.table_id();
        self.next_table_id.fetch_max(table_id + 1, Ordering::SeqCst);

        let mut state = self.state.write();
        if let Some(old_id) = state.by_name.insert(name.to_string(), table_id) {
            if old_id != table_id {
                state.by_id.remove(&old_id);
            }
        }
        if let Some(old) = state.by_id.insert(
            table_id,
            TableEntry {
                name: name.to_string(),
                file: Arc::new(file),
                primary_key: primary_key.to_string(),
            },
        ) {
            if old.name != name {
                state.by_name.remove(&old.name);
            }
        }

        debug!("registered table {} as {}", name, table_id);
        table_id
    }

    /// Opens (creating if needed) a heap file at `path` under a fresh table
    /// id and registers it as `name`.
    pub fn create_table<P: AsRef<Path>>(
        &self,
        path: P,
        name: &str,
        schema: Arc<Schema>,
        primary_key: &str,
    ) -> Result<u32> {
        let table_id = self.next_table_id.fetch_add(1, Ordering::SeqCst);
        let file = HeapFile::open(table_id, path, schema)?;
        Ok(self.add_table(file, name, primary_key))
    }

    pub fn table_id(&self, name: &str) -> Result<u32> {
        self.state
            .read()
            .by_name
            .get(name)
            .copied()
            .ok_or_else(|| HeapStoreError::TableNameNotFound(name.to_string()))
    }

    /// Returns the heap file backing table `table_id`.
    pub fn table(&self, table_id: u32) -> Result<Arc<HeapFile>> {
        self.state
            .read()
            .by_id
            .get(&table_id)
            .map(|entry| entry.file.clone())
            .ok_or(HeapStoreError::TableNotFound(table_id))
    }

    pub fn schema(&self, table_id: u32) -> Result<Arc<Schema>> {
        Ok(self.table(table_id)?.schema().clone())
    }

    pub fn table_name(&self, table_id: u32) -> Result<String> {
        self.state
            .read()
            .by_id
            .get(&table_id)
            .map(|entry| entry.name.clone())
            .ok_or(HeapStoreError::TableNotFound(table_id))
    }

    pub fn primary_key(&self, table_id: u32) -> Result<String> {
        self.state
            .read()
            .by_id
            .get(&table_id)
            .map(|entry| entry.primary_key.clone())
            .ok_or(HeapStoreError::TableNotFound(table_id))
    }

    /// Returns the ids of all registered tables in ascending order.
    pub fn table_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.state.read().by_id.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Forgets every table. Files on disk are left untouched.
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.by_id.clear();
        state.by_name.clear();
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}
