use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::catalog::Catalog;
use crate::common::{
    BufferPoolConfig, HeapStoreError, PageId, Permissions, Result, TransactionId,
};
use crate::concurrency::LockManager;
use crate::storage::page::HeapPage;
use crate::tuple::Tuple;

use super::{PageCache, PageRef};

/// A transaction's access to a cached page.
///
/// The handle carries the permission the page was fetched with. Latch guards
/// taken from it should be short-lived and must be dropped before the same
/// thread calls back into the buffer pool.
pub struct PageHandle {
    page_id: PageId,
    perm: Permissions,
    page: PageRef,
}

impl PageHandle {
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn perm(&self) -> Permissions {
        self.perm
    }

    /// Latches the page for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, HeapPage> {
        self.page.read()
    }

    /// Latches the page for writing. Fails on a handle fetched read-only.
    pub fn write(&self) -> Result<RwLockWriteGuard<'_, HeapPage>> {
        if self.perm != Permissions::ReadWrite {
            return Err(HeapStoreError::InvalidArgument(format!(
                "{} was fetched read-only",
                self.page_id
            )));
        }
        Ok(self.page.write())
    }
}

/// BufferPool hands out pages to transactions under strict two-phase locking.
///
/// Every page access goes through [`BufferPool::get_page`], which first takes
/// the page lock matching the requested permission and then serves the page
/// from the [`PageCache`], loading it from its table's heap file on a miss.
///
/// The pool never writes uncommitted changes to disk: only clean pages with
/// no live [`PageHandle`] are evicted. Changes reach disk when their
/// transaction commits and are discarded by re-reading the page when it
/// aborts.
pub struct BufferPool {
    config: BufferPoolConfig,
    catalog: Arc<Catalog>,
    lock_manager: Arc<LockManager>,
    cache: PageCache,
    /// Serializes cache misses so each page is loaded once
    load_latch: Mutex<()>,
}

impl BufferPool {
    pub fn new(config: BufferPoolConfig, catalog: Arc<Catalog>) -> Result<Self> {
        Self::with_lock_manager(config, catalog, Arc::new(LockManager::new()))
    }

    /// Creates a buffer pool that takes its page locks from `lock_manager`.
    pub fn with_lock_manager(
        config: BufferPoolConfig,
        catalog: Arc<Catalog>,
        lock_manager: Arc<LockManager>,
    ) -> Result<Self> {
        let cache = PageCache::new(config.num_pages, catalog.clone())?;
        Ok(Self {
            config,
            catalog,
            lock_manager,
            cache,
            load_latch: Mutex::new(()),
        })
    }

    /// Fetches `page_id` on behalf of `tid`, blocking until the lock for
    /// `perm` is granted.
    ///
    /// If waiting would deadlock, or the lock is not granted within the
    /// configured timeout, `tid` is aborted and `Deadlock` or `LockTimeout`
    /// is returned.
    pub fn get_page(
        &self,
        tid: TransactionId,
        page_id: PageId,
        perm: Permissions,
    ) -> Result<PageHandle> {
        self.acquire_lock(tid, page_id, perm)?;

        let page = match self.cache.get(page_id) {
            Some(page) => page,
            None => self.load_page(page_id)?,
        };
        Ok(PageHandle {
            page_id,
            perm,
            page,
        })
    }

    fn acquire_lock(&self, tid: TransactionId, page_id: PageId, perm: Permissions) -> Result<()> {
        let deadline = Instant::now() + self.config.lock_timeout;
        loop {
            let granted = match perm {
                Permissions::ReadOnly => self.lock_manager.acquire_shared(tid, page_id),
                Permissions::ReadWrite => self.lock_manager.acquire_exclusive(tid, page_id),
            };
            if granted {
                return Ok(());
            }

            if self.lock_manager.would_deadlock(tid, page_id) {
                warn!("aborting {}: deadlock waiting for {}", tid, page_id);
                self.abort_quietly(tid);
                return Err(HeapStoreError::Deadlock(tid));
            }
            if Instant::now() >= deadline {
                warn!("aborting {}: timed out waiting for {}", tid, page_id);
                self.abort_quietly(tid);
                return Err(HeapStoreError::LockTimeout { tid, page_id });
            }
            thread::sleep(self.config.lock_retry_interval);
        }
    }

    fn abort_quietly(&self, tid: TransactionId) {
        if let Err(e) = self.transaction_complete(tid, false) {
            warn!("failed to roll back {}: {}", tid, e);
        }
    }

    fn load_page(&self, page_id: PageId) -> Result<PageRef> {
        let _loading = self.load_latch.lock();
        if let Some(page) = self.cache.get(page_id) {
            return Ok(page);
        }

        if self.cache.len() >= self.cache.capacity() {
            self.cache
                .evict_clean()?
                .ok_or(HeapStoreError::BufferPoolFull)?;
        }

        let page = self.catalog.table(page_id.table_id())?.read_page(page_id)?;
        let page = Arc::new(RwLock::new(page));
        self.cache.put(page_id, page.clone());
        debug!("loaded {}", page_id);
        Ok(page)
    }

    /// Inserts `tuple` into table `table_id` on behalf of `tid`. Returns the
    /// ids of the pages modified, which stay dirty in the cache until `tid`
    /// completes.
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        table_id: u32,
        tuple: Tuple,
    ) -> Result<Vec<PageId>> {
        let file = self.catalog.table(table_id)?;
        file.insert_tuple(self, tid, tuple)
    }

    /// Deletes the stored tuple named by `tuple`'s record id on behalf of
    /// `tid` and returns the id of the page modified.
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple) -> Result<PageId> {
        let record_id = tuple.record_id().ok_or_else(|| {
            HeapStoreError::InvalidArgument("tuple has no record id".to_string())
        })?;
        let file = self.catalog.table(record_id.page_id.table_id())?;
        file.delete_tuple(self, tid, tuple)
    }

    /// Commits or aborts `tid`.
    ///
    /// On commit every page `tid` dirtied is written to disk and the touched
    /// table files are synced; on abort each page is reloaded from disk.
    /// Either way all of `tid`'s locks are released, even if writing or
    /// reloading fails.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) -> Result<()> {
        let dirty = self.cache.dirtied_by(tid);
        let result = if commit {
            dirty
                .iter()
                .try_for_each(|&pid| self.flush_page(pid).map(|_| ()))
                .and_then(|()| self.sync_tables(&dirty))
        } else {
            dirty.iter().try_for_each(|&pid| self.cache.force_reload(pid))
        };
        self.lock_manager.release_all(tid);

        info!(
            "{} {} ({} dirty pages)",
            tid,
            if commit { "committed" } else { "aborted" },
            dirty.len()
        );
        result
    }

    fn sync_tables(&self, pages: &[PageId]) -> Result<()> {
        let tables: BTreeSet<u32> = pages.iter().map(|pid| pid.table_id()).collect();
        for table_id in tables {
            self.catalog.table(table_id)?.sync()?;
        }
        Ok(())
    }

    pub fn holds_lock(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.lock_manager.holds_lock(tid, page_id)
    }

    /// Releases `tid`'s lock on `page_id` before the transaction ends.
    ///
    /// This breaks two-phase locking; callers must know the page was not
    /// used in a way that depends on isolation.
    pub fn release_page(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.lock_manager.release(tid, page_id)
    }

    /// Writes a cached page to disk and marks it clean. Returns false if the
    /// page is not cached.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let Some(page) = self.cache.get(page_id) else {
            return Ok(false);
        };
        let file = self.catalog.table(page_id.table_id())?;

        let mut page = page.write();
        file.write_page(&page)?;
        page.mark_dirty(None);
        Ok(true)
    }

    /// Writes every page dirtied by `tid` to disk.
    pub fn flush_pages(&self, tid: TransactionId) -> Result<()> {
        for page_id in self.cache.dirtied_by(tid) {
            self.flush_page(page_id)?;
        }
        Ok(())
    }

    /// Writes every dirty page to disk, whoever dirtied it.
    ///
    /// Intended for tests and shutdown: it can write uncommitted changes.
    pub fn flush_all_pages(&self) -> Result<()> {
        for page_id in self.cache.dirty_pages() {
            self.flush_page(page_id)?;
        }
        Ok(())
    }

    /// Drops a page from the cache without writing it. Returns false if the
    /// page was not cached.
    pub fn discard_page(&self, page_id: PageId) -> bool {
        self.cache.remove(page_id).is_some()
    }

    /// Returns the maximum number of cached pages.
    pub fn capacity(&self) -> usize {
        self.cache.capacity()
    }

    /// Returns the ids of cached pages, most recently used first.
    pub fn cached_pages(&self) -> Vec<PageId> {
        self.cache.page_ids()
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_manager
    }

    pub fn page_cache(&self) -> &PageCache {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::SlotId;
    use crate::tuple::{DataType, Schema, TupleBuilder};
    use tempfile::TempDir;

    fn create_pool(num_pages: usize, file_pages: u32) -> (BufferPool, u32, TempDir) {
        let dir = TempDir::new().unwrap();
        let catalog = Arc::new(Catalog::new());
        let schema = Schema::builder().column("id", DataType::Integer).build_arc();
        let table_id = catalog
            .create_table(dir.path().join("t.dat"), "t", schema, "id")
            .unwrap();
        let file = catalog.table(table_id).unwrap();
        for page_no in 0..file_pages {
            let page = HeapPage::new(
                PageId::new(table_id, page_no),
                &HeapPage::empty_page_data(),
                file.schema().clone(),
            )
            .unwrap();
            file.write_page(&page).unwrap();
        }

        let pool = BufferPool::new(BufferPoolConfig::new(num_pages), catalog).unwrap();
        (pool, table_id, dir)
    }

    #[test]
    fn test_buffer_pool_new() {
        let (pool, _, _dir) = create_pool(4, 0);
        assert_eq!(pool.capacity(), 4);
        assert!(pool.cached_pages().is_empty());
    }

    #[test]
    fn test_get_page_caches_and_locks() {
        let (pool, table_id, _dir) = create_pool(4, 2);
        let tid = TransactionId::new();
        let pid = PageId::new(table_id, 1);

        let handle = pool.get_page(tid, pid, Permissions::ReadOnly).unwrap();
        assert_eq!(handle.page_id(), pid);
        {
            let page = handle.read();
            assert_eq!(page.num_empty_slots(), page.num_slots());
        }
        assert!(pool.holds_lock(tid, pid));
        assert_eq!(pool.cached_pages(), vec![pid]);

        // A second fetch shares the cached page
        let again = pool.get_page(tid, pid, Permissions::ReadOnly).unwrap();
        assert!(Arc::ptr_eq(&handle.page, &again.page));
    }

    #[test]
    fn test_read_only_handle_rejects_write() {
        let (pool, table_id, _dir) = create_pool(4, 1);
        let tid = TransactionId::new();

        let handle = pool
            .get_page(tid, PageId::new(table_id, 0), Permissions::ReadOnly)
            .unwrap();
        assert!(matches!(
            handle.write(),
            Err(HeapStoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_missing_page() {
        let (pool, table_id, _dir) = create_pool(4, 1);
        let tid = TransactionId::new();

        assert!(matches!(
            pool.get_page(tid, PageId::new(table_id, 5), Permissions::ReadOnly),
            Err(HeapStoreError::PageNotFound(_))
        ));
        assert!(matches!(
            pool.get_page(tid, PageId::new(99, 0), Permissions::ReadOnly),
            Err(HeapStoreError::TableNotFound(99))
        ));
    }

    #[test]
    fn test_full_of_dirty_pages() {
        let (pool, table_id, _dir) = create_pool(2, 3);
        let tid = TransactionId::new();

        for page_no in 0..2 {
            let handle = pool
                .get_page(tid, PageId::new(table_id, page_no), Permissions::ReadWrite)
                .unwrap();
            handle.write().unwrap().mark_dirty(Some(tid));
        }

        assert!(matches!(
            pool.get_page(tid, PageId::new(table_id, 2), Permissions::ReadOnly),
            Err(HeapStoreError::BufferPoolFull)
        ));

        pool.transaction_complete(tid, true).unwrap();
        let other = TransactionId::new();
        assert!(pool
            .get_page(other, PageId::new(table_id, 2), Permissions::ReadOnly)
            .is_ok());
    }

    #[test]
    fn test_refetch_returns_held_instance() {
        let (pool, table_id, _dir) = create_pool(1, 2);
        let tid = TransactionId::new();
        let p0 = PageId::new(table_id, 0);

        let reader = pool.get_page(tid, p0, Permissions::ReadOnly).unwrap();
        assert!(matches!(
            pool.get_page(tid, PageId::new(table_id, 1), Permissions::ReadOnly),
            Err(HeapStoreError::BufferPoolFull)
        ));
        let writer = pool.get_page(tid, p0, Permissions::ReadWrite).unwrap();
        assert!(Arc::ptr_eq(&reader.page, &writer.page));
    }

    #[test]
    fn test_flush_pages_writes_only_own_pages() {
        let (pool, table_id, _dir) = create_pool(4, 2);
        let schema = pool.catalog().schema(table_id).unwrap();
        let (t1, t2) = (TransactionId::new(), TransactionId::new());
        let p0 = PageId::new(table_id, 0);
        let p1 = PageId::new(table_id, 1);

        for (tid, pid, id) in [(t1, p0, 1), (t2, p1, 2)] {
            let handle = pool.get_page(tid, pid, Permissions::ReadWrite).unwrap();
            let mut page = handle.write().unwrap();
            page.insert_tuple(TupleBuilder::new(schema.clone()).value(id).build())
                .unwrap();
            page.mark_dirty(Some(tid));
        }

        pool.flush_pages(t1).unwrap();
        assert_eq!(pool.page_cache().dirty_pages(), vec![p1]);

        let file = pool.catalog().table(table_id).unwrap();
        assert_eq!(file.read_page(p0).unwrap().tuples().count(), 1);
        assert_eq!(file.read_page(p1).unwrap().tuples().count(), 0);

        // Flushing does not end the transaction
        assert!(pool.holds_lock(t1, p0));
        pool.transaction_complete(t1, true).unwrap();
        pool.transaction_complete(t2, false).unwrap();
    }

    #[test]
    fn test_abort_discards_changes() {
        let (pool, table_id, _dir) = create_pool(4, 1);
        let schema = pool.catalog().schema(table_id).unwrap();
        let tid = TransactionId::new();

        pool.insert_tuple(tid, table_id, TupleBuilder::new(schema).value(7).build())
            .unwrap();
        pool.transaction_complete(tid, false).unwrap();
        assert!(!pool.holds_lock(tid, PageId::new(table_id, 0)));

        let reader = TransactionId::new();
        let handle = pool
            .get_page(reader, PageId::new(table_id, 0), Permissions::ReadOnly)
            .unwrap();
        let page = handle.read();
        assert!(!page.is_slot_used(SlotId::new(0)));
        assert!(!page.is_dirty());
    }

    #[test]
    fn test_transaction_complete_is_idempotent() {
        let (pool, _, _dir) = create_pool(4, 0);
        let tid = TransactionId::new();
        pool.transaction_complete(tid, true).unwrap();
        pool.transaction_complete(tid, true).unwrap();
        pool.transaction_complete(tid, false).unwrap();
    }
}
