use std::sync::Arc;

use log::debug;
use parking_lot::{Mutex, RwLock};

use crate::catalog::Catalog;
use crate::common::{HeapStoreError, PageId, Result, TransactionId};
use crate::storage::page::HeapPage;

use super::LruCache;

/// A cached page shared between every transaction that fetched it.
pub type PageRef = Arc<RwLock<HeapPage>>;

/// LRU cache of heap pages keyed by page id.
///
/// The cache map sits behind one mutex; page contents sit behind each page's
/// own `RwLock`, so readers of different pages never contend on the map for
/// longer than a lookup.
pub struct PageCache {
    pages: Mutex<LruCache<PageId, PageRef>>,
    catalog: Arc<Catalog>,
}

impl PageCache {
    pub fn new(capacity: usize, catalog: Arc<Catalog>) -> Result<Self> {
        Ok(Self {
            pages: Mutex::new(LruCache::new(capacity)?),
            catalog,
        })
    }

    /// Looks up a cached page, marking it most recently used.
    pub fn get(&self, page_id: PageId) -> Option<PageRef> {
        self.pages.lock().get(&page_id).cloned()
    }

    /// Caches `page` under `page_id`, returning any page it replaced.
    ///
    /// The caller must make room first; a full cache evicts its least recently
    /// used page regardless of state.
    pub fn put(&self, page_id: PageId, page: PageRef) -> Option<PageRef> {
        self.pages.lock().put(page_id, page)
    }

    pub fn contains(&self, page_id: PageId) -> bool {
        self.pages.lock().contains(&page_id)
    }

    pub fn len(&self) -> usize {
        self.pages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.pages.lock().capacity()
    }

    pub fn remove(&self, page_id: PageId) -> Option<PageRef> {
        self.pages.lock().remove(&page_id)
    }

    pub fn clear(&self) {
        self.pages.lock().clear();
    }

    /// Returns the ids of all cached pages, most recently used first.
    pub fn page_ids(&self) -> Vec<PageId> {
        self.pages.lock().iter().map(|(pid, _)| *pid).collect()
    }

    /// Replaces the cached contents of `page_id` with the version on disk.
    ///
    /// The page keeps its place in the recency order, and every holder of the
    /// page's `PageRef` observes the reloaded contents.
    pub fn force_reload(&self, page_id: PageId) -> Result<()> {
        let page = self.pages.lock().peek(&page_id).cloned().ok_or_else(|| {
            HeapStoreError::InvalidArgument(format!("{} is not cached", page_id))
        })?;

        let fresh = self
            .catalog
            .table(page_id.table_id())?
            .read_page(page_id)?;
        *page.write() = fresh;

        debug!("reloaded {} from disk", page_id);
        Ok(())
    }

    /// Evicts the least recently used page that is clean and not pinned.
    ///
    /// A page is pinned while any `PageRef` to it lives outside the cache, so
    /// every holder keeps seeing the one cached instance. Pages latched for
    /// writing are skipped too. Returns the id of the evicted page, or `None`
    /// if every cached page is ineligible.
    pub fn evict_clean(&self) -> Result<Option<PageId>> {
        let victim = self.pages.lock().evict_lru_where(|_, page| {
            if Arc::strong_count(page) > 1 {
                return false;
            }
            match page.try_read() {
                Some(page) => !page.is_dirty(),
                None => false,
            }
        });

        Ok(victim.map(|(pid, _)| {
            debug!("evicted {}", pid);
            pid
        }))
    }

    /// Returns the cached pages currently dirtied by `tid`.
    pub fn dirtied_by(&self, tid: TransactionId) -> Vec<PageId> {
        self.collect_dirty(|dirtier| dirtier == tid)
    }

    /// Returns every dirty cached page.
    pub fn dirty_pages(&self) -> Vec<PageId> {
        self.collect_dirty(|_| true)
    }

    fn collect_dirty<F>(&self, matches: F) -> Vec<PageId>
    where
        F: Fn(TransactionId) -> bool,
    {
        let pages: Vec<(PageId, PageRef)> = self
            .pages
            .lock()
            .iter()
            .map(|(pid, page)| (*pid, page.clone()))
            .collect();

        pages
            .into_iter()
            .filter(|(_, page)| page.read().dirtier().is_some_and(&matches))
            .map(|(pid, _)| pid)
            .collect()
    }
}
