mod buffer_pool;
mod error;
mod paged_file;

pub use buffer_pool::{BufferPool, PageRef};
pub use error::{FileError, FileResult};
pub use paged_file::PagedFile;

use std::fmt;

/// Page size in bytes (4KB)
pub const PAGE_SIZE: usize = 4096;

/// Number of pages in the buffer pool when no capacity is configured
pub const DEFAULT_POOL_PAGES: usize = 50;

/// Identifier of a table (and of the heap file storing it)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub u32);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Names one page of one table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId {
    pub table: TableId,
    pub page_no: usize,
}

impl PageId {
    pub fn new(table: TableId, page_no: usize) -> Self {
        Self { table, page_no }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table, self.page_no)
    }
}
