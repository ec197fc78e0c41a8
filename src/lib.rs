//! Heapstore - a transactional heap-file storage core in Rust
//!
//! This crate provides the storage layer of a small relational database:
//! tables are unordered heap files of fixed-size pages, pages are cached in
//! memory by a buffer pool, and transactions are isolated with page-level
//! shared/exclusive locks under strict two-phase locking.
//!
//! # Architecture
//!
//! The system is organized into several layers:
//!
//! - **Storage Layer** (`storage`): Handles disk I/O and page organization
//!   - `DiskManager`: Reads and writes pages of one file
//!   - `HeapPage`: Fixed-width tuple slots with an occupancy bitmap
//!   - `HeapFile`: A table's pages, with tuple insert/delete and scans
//!
//! - **Buffer Pool** (`buffer`): Memory management for database pages
//!   - `BufferPool`: Locks pages for transactions, caches them, commits and aborts
//!   - `PageCache`: LRU cache of pages with in-place reload from disk
//!   - `LruCache`: Generic fixed-capacity least-recently-used map
//!
//! - **Concurrency** (`concurrency`): `LockManager` with shared/exclusive
//!   page locks, lock upgrade and deadlock detection
//!
//! - **Catalog** (`catalog`): Table names, ids, schemas and heap files
//!
//! - **Tuples** (`tuple`): Typed values, schemas and fixed-width tuples
//!
//! Uncommitted changes never reach disk: the buffer pool only evicts clean
//! pages, writes a transaction's pages when it commits and re-reads them when
//! it aborts.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use heapstore::buffer::BufferPool;
//! use heapstore::catalog::Catalog;
//! use heapstore::common::{BufferPoolConfig, TransactionId};
//! use heapstore::tuple::{DataType, Schema, TupleBuilder};
//!
//! let schema = Schema::builder()
//!     .column("id", DataType::Integer)
//!     .column("name", DataType::Text(32))
//!     .build_arc();
//!
//! // Register a table backed by a heap file
//! let catalog = Arc::new(Catalog::new());
//! let table_id = catalog
//!     .create_table("users.dat", "users", schema.clone(), "id")
//!     .unwrap();
//!
//! // Create a buffer pool caching up to 50 pages
//! let pool = BufferPool::new(BufferPoolConfig::default(), catalog.clone()).unwrap();
//!
//! // Insert a tuple and commit
//! let tid = TransactionId::new();
//! let tuple = TupleBuilder::new(schema).value(1).value("Alice").build();
//! pool.insert_tuple(tid, table_id, tuple).unwrap();
//! pool.transaction_complete(tid, true).unwrap();
//!
//! // Scan the table in a new transaction
//! let tid = TransactionId::new();
//! let file = catalog.table(table_id).unwrap();
//! for tuple in file.iter(&pool, tid) {
//!     println!("{}", tuple.unwrap());
//! }
//! pool.transaction_complete(tid, true).unwrap();
//! ```

pub mod buffer;
pub mod catalog;
pub mod common;
pub mod concurrency;
pub mod storage;
pub mod tuple;

// Re-export commonly used types at the crate root
pub use common::{
    HeapStoreError, PageId, Permissions, RecordId, Result, SlotId, TransactionId,
};
