use thiserror::Error;

use super::types::{PageId, RecordId, TransactionId};

/// Storage core error types
#[derive(Error, Debug)]
pub enum HeapStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File {path} has length {len}, which is not a whole number of pages")]
    CorruptFile { path: String, len: u64 },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Page {0} not found")]
    PageNotFound(PageId),

    #[error("Tuple {0} not found")]
    TupleNotFound(RecordId),

    #[error("Invalid slot ID: {0}")]
    InvalidSlotId(u16),

    #[error("Page {0} has no free slot")]
    PageFull(PageId),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Table {0} not found")]
    TableNotFound(u32),

    #[error("Table {0:?} not found")]
    TableNameNotFound(String),

    #[error("Buffer pool is full of dirty or write-locked pages, no evictable page available")]
    BufferPoolFull,

    #[error("{0} aborted: deadlock detected")]
    Deadlock(TransactionId),

    #[error("{tid} aborted: timed out waiting for a lock on {page_id}")]
    LockTimeout { tid: TransactionId, page_id: PageId },
}

impl HeapStoreError {
    /// Returns true for errors that mean "the transaction was aborted and may
    /// be retried from the start".
    pub fn is_abort(&self) -> bool {
        matches!(
            self,
            HeapStoreError::Deadlock(_) | HeapStoreError::LockTimeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, HeapStoreError>;
