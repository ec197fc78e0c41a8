mod heap_page;

pub use heap_page::HeapPage;
