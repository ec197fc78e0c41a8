use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::common::{HeapStoreError, Result, PAGE_SIZE};

/// DiskManager reads and writes fixed-size pages of one table file.
///
/// Page `n` lives at byte offset `n * PAGE_SIZE`; the file length is always a
/// whole number of pages.
pub struct DiskManager {
    /// The backing file
    file: Mutex<File>,
    path: PathBuf,
    /// Number of pages currently in the file
    num_pages: AtomicU32,
    num_reads: AtomicU32,
    num_writes: AtomicU32,
}

impl DiskManager {
    /// Opens (creating if needed) the file at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let len = file.metadata()?.len();
        if len % PAGE_SIZE as u64 != 0 {
            return Err(HeapStoreError::CorruptFile {
                path: path.as_ref().display().to_string(),
                len,
            });
        }

        Ok(Self {
            file: Mutex::new(file),
            path: path.as_ref().to_path_buf(),
            num_pages: AtomicU32::new((len / PAGE_SIZE as u64) as u32),
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        })
    }

    /// Reads page `page_no` into `data`, which must be exactly PAGE_SIZE bytes.
    pub fn read_page(&self, page_no: u32, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(Self::offset(page_no)))?;
        file.read_exact(data)?;

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Writes `data` (exactly PAGE_SIZE bytes) as page `page_no`.
    pub fn write_page(&self, page_no: u32, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(Self::offset(page_no)))?;
        file.write_all(data)?;
        file.flush()?;
        self.num_pages.fetch_max(page_no + 1, Ordering::SeqCst);

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Appends a page holding `data` to the end of the file and returns its
    /// page number. Concurrent callers always receive distinct page numbers.
    pub fn allocate_page(&self, data: &[u8]) -> Result<u32> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");

        let mut file = self.file.lock();
        let page_no = self.num_pages.load(Ordering::SeqCst);
        file.seek(SeekFrom::Start(Self::offset(page_no)))?;
        file.write_all(data)?;
        file.flush()?;
        self.num_pages.store(page_no + 1, Ordering::SeqCst);

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(page_no)
    }

    /// Returns the number of pages currently in the file.
    pub fn num_pages(&self) -> u32 {
        self.num_pages.load(Ordering::SeqCst)
    }

    pub fn num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    pub fn num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes any buffered writes to disk.
    pub fn sync(&self) -> Result<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }

    fn offset(page_no: u32) -> u64 {
        page_no as u64 * PAGE_SIZE as u64
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let _ = self.file.get_mut().sync_all();
    }
}
