mod buffer_pool;
mod lru_cache;
mod page_cache;

pub use buffer_pool::{BufferPool, PageHandle};
pub use lru_cache::{Iter, LruCache};
pub use page_cache::{PageCache, PageRef};
