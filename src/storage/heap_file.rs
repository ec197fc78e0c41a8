use std::path::Path;
use std::sync::Arc;

use log::debug;

use crate::buffer::BufferPool;
use crate::common::{
    HeapStoreError, PageId, Permissions, Result, TransactionId, PAGE_SIZE,
};
use crate::tuple::{Schema, Tuple};

use super::disk::DiskManager;
use super::page::HeapPage;

/// HeapFile stores the tuples of one table, unordered, in a flat file of
/// fixed-size [`HeapPage`]s.
///
/// Reads and writes of whole pages go straight to disk and are meant for the
/// buffer pool. Tuple-level operations go through a [`BufferPool`] so that
/// they take page locks and see cached modifications.
pub struct HeapFile {
    table_id: u32,
    schema: Arc<Schema>,
    disk: DiskManager,
}

impl HeapFile {
    /// Opens (creating if needed) the backing file at `path`.
    pub fn open<P: AsRef<Path>>(table_id: u32, path: P, schema: Arc<Schema>) -> Result<Self> {
        let disk = DiskManager::new(path)?;
        debug!(
            "opened table {} at {} with {} pages",
            table_id,
            disk.path().display(),
            disk.num_pages()
        );
        Ok(Self {
            table_id,
            schema,
            disk,
        })
    }

    pub fn table_id(&self) -> u32 {
        self.table_id
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn path(&self) -> &Path {
        self.disk.path()
    }

    /// Returns the number of pages in the backing file.
    pub fn num_pages(&self) -> u32 {
        self.disk.num_pages()
    }

    /// Forces written pages out to the storage device.
    pub fn sync(&self) -> Result<()> {
        self.disk.sync()
    }

    /// Reads a page directly from disk, bypassing the buffer pool.
    pub fn read_page(&self, page_id: PageId) -> Result<HeapPage> {
        if page_id.table_id() != self.table_id || page_id.page_no() >= self.num_pages() {
            return Err(HeapStoreError::PageNotFound(page_id));
        }

        let mut data = vec![0u8; PAGE_SIZE];
        self.disk.read_page(page_id.page_no(), &mut data)?;
        HeapPage::new(page_id, &data, self.schema.clone())
    }

    /// Writes a page image directly to disk.
    pub fn write_page(&self, page: &HeapPage) -> Result<()> {
        let page_id = page.page_id();
        if page_id.table_id() != self.table_id {
            return Err(HeapStoreError::InvalidArgument(format!(
                "{} does not belong to table {}",
                page_id, self.table_id
            )));
        }
        self.disk.write_page(page_id.page_no(), &page.page_data()?)
    }

    /// Inserts `tuple` into the first page with a free slot, appending a new
    /// page when every existing one is full. Returns the ids of the pages
    /// modified.
    ///
    /// Full pages passed over keep no lock unless `tid` already held one.
    pub fn insert_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: Tuple,
    ) -> Result<Vec<PageId>> {
        if **tuple.schema() != *self.schema {
            return Err(HeapStoreError::SchemaMismatch(format!(
                "tuple schema {} does not match table {} schema {}",
                tuple.schema(),
                self.table_id,
                self.schema
            )));
        }

        if HeapPage::slots_per_page(&self.schema) == 0 {
            return Err(HeapStoreError::SchemaMismatch(format!(
                "tuples of width {} do not fit in a {}-byte page",
                self.schema.tuple_width(),
                PAGE_SIZE
            )));
        }

        for page_no in 0..self.num_pages() {
            let page_id = PageId::new(self.table_id, page_no);
            let held_before = pool.holds_lock(tid, page_id);
            let handle = pool.get_page(tid, page_id, Permissions::ReadWrite)?;
            {
                let mut page = handle.write()?;
                if page.num_empty_slots() > 0 {
                    page.insert_tuple(tuple)?;
                    page.mark_dirty(Some(tid));
                    return Ok(vec![page_id]);
                }
            }
            // Nothing was read or written here, so the lock can go early
            drop(handle);
            if !held_before {
                pool.release_page(tid, page_id);
            }
        }

        // Every page is full: append a blank one and insert through the pool
        let page_no = self.disk.allocate_page(&HeapPage::empty_page_data())?;
        let page_id = PageId::new(self.table_id, page_no);
        debug!("table {} grew to {} pages", self.table_id, page_no + 1);

        let handle = pool.get_page(tid, page_id, Permissions::ReadWrite)?;
        let mut page = handle.write()?;
        page.insert_tuple(tuple)?;
        page.mark_dirty(Some(tid));
        Ok(vec![page_id])
    }

    /// Removes the stored tuple named by `tuple`'s record id and returns the
    /// id of the page modified.
    pub fn delete_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> Result<PageId> {
        let record_id = tuple.record_id().ok_or_else(|| {
            HeapStoreError::InvalidArgument("tuple has no record id".to_string())
        })?;
        let page_id = record_id.page_id;
        if page_id.table_id() != self.table_id {
            return Err(HeapStoreError::InvalidArgument(format!(
                "tuple {} is not in table {}",
                record_id, self.table_id
            )));
        }
        if page_id.page_no() >= self.num_pages() {
            return Err(HeapStoreError::TupleNotFound(record_id));
        }

        let handle = pool.get_page(tid, page_id, Permissions::ReadWrite)?;
        let mut page = handle.write()?;
        page.delete_tuple(tuple)?;
        page.mark_dirty(Some(tid));
        Ok(page_id)
    }

    /// Returns an iterator over every tuple in the table on behalf of `tid`.
    pub fn iter<'a>(&'a self, pool: &'a BufferPool, tid: TransactionId) -> HeapFileIterator<'a> {
        HeapFileIterator::new(self, pool, tid)
    }
}

/// Iterates over a heap file's tuples in page order, then slot order.
///
/// Pages are fetched lazily through the buffer pool with read-only
/// permission, so iterating takes a shared lock on each page visited.
pub struct HeapFileIterator<'a> {
    file: &'a HeapFile,
    pool: &'a BufferPool,
    tid: TransactionId,
    next_page: u32,
    current: std::vec::IntoIter<Tuple>,
    /// Set once an error has been yielded
    failed: bool,
}

impl<'a> HeapFileIterator<'a> {
    fn new(file: &'a HeapFile, pool: &'a BufferPool, tid: TransactionId) -> Self {
        Self {
            file,
            pool,
            tid,
            next_page: 0,
            current: Vec::new().into_iter(),
            failed: false,
        }
    }

    /// Restarts iteration from the first page.
    pub fn rewind(&mut self) {
        self.next_page = 0;
        self.current = Vec::new().into_iter();
        self.failed = false;
    }

    fn load_page(&mut self, page_no: u32) -> Result<Vec<Tuple>> {
        let page_id = PageId::new(self.file.table_id, page_no);
        let handle = self.pool.get_page(self.tid, page_id, Permissions::ReadOnly)?;
        let page = handle.read();
        Ok(page.tuples().cloned().collect())
    }
}

impl Iterator for HeapFileIterator<'_> {
    type Item = Result<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if let Some(tuple) = self.current.next() {
                return Some(Ok(tuple));
            }
            if self.next_page >= self.file.num_pages() {
                return None;
            }
            let page_no = self.next_page;
            self.next_page += 1;
            match self.load_page(page_no) {
                Ok(tuples) => self.current = tuples.into_iter(),
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::{DataType, TupleBuilder};
    use tempfile::NamedTempFile;

    fn create_test_schema() -> Arc<Schema> {
        Schema::builder()
            .column("id", DataType::Integer)
            .column("score", DataType::Double)
            .build_arc()
    }

    #[test]
    fn test_open_empty_file() {
        let temp_file = NamedTempFile::new().unwrap();
        let file = HeapFile::open(3, temp_file.path(), create_test_schema()).unwrap();
        assert_eq!(file.table_id(), 3);
        assert_eq!(file.num_pages(), 0);
    }

    #[test]
    fn test_read_page_out_of_range() {
        let temp_file = NamedTempFile::new().unwrap();
        let file = HeapFile::open(3, temp_file.path(), create_test_schema()).unwrap();

        assert!(matches!(
            file.read_page(PageId::new(3, 0)),
            Err(HeapStoreError::PageNotFound(_))
        ));
    }

    #[test]
    fn test_read_page_wrong_table() {
        let temp_file = NamedTempFile::new().unwrap();
        let file = HeapFile::open(3, temp_file.path(), create_test_schema()).unwrap();
        file.disk.allocate_page(&HeapPage::empty_page_data()).unwrap();

        assert!(file.read_page(PageId::new(3, 0)).is_ok());
        assert!(matches!(
            file.read_page(PageId::new(4, 0)),
            Err(HeapStoreError::PageNotFound(_))
        ));
    }

    #[test]
    fn test_write_then_read_page() {
        let temp_file = NamedTempFile::new().unwrap();
        let schema = create_test_schema();
        let file = HeapFile::open(3, temp_file.path(), schema.clone()).unwrap();
        file.disk.allocate_page(&HeapPage::empty_page_data()).unwrap();

        let mut page = file.read_page(PageId::new(3, 0)).unwrap();
        page.insert_tuple(TupleBuilder::new(schema).value(5).value(2.5).build())
            .unwrap();
        file.write_page(&page).unwrap();

        let reread = file.read_page(PageId::new(3, 0)).unwrap();
        assert_eq!(reread.num_empty_slots(), reread.num_slots() - 1);
        assert_eq!(reread.tuples().next(), page.tuples().next());
    }

    #[test]
    fn test_sync_after_write() {
        let temp_file = NamedTempFile::new().unwrap();
        let schema = create_test_schema();
        let file = HeapFile::open(3, temp_file.path(), schema).unwrap();
        file.disk.allocate_page(&HeapPage::empty_page_data()).unwrap();

        let page = file.read_page(PageId::new(3, 0)).unwrap();
        file.write_page(&page).unwrap();
        file.sync().unwrap();
        assert_eq!(
            std::fs::metadata(temp_file.path()).unwrap().len(),
            PAGE_SIZE as u64
        );
    }
}
