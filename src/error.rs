use thiserror::Error;

use crate::catalog::CatalogError;
use crate::file::{FileError, PageId};
use crate::lock::LockError;
use crate::record::RecordError;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    #[error("Transaction aborted: {0}")]
    Lock(#[from] LockError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Buffer pool capacity must be positive")]
    InvalidCapacity,

    #[error("Buffer pool holds {size} pages, capacity is {capacity}")]
    CapacityExceeded { size: usize, capacity: usize },

    #[error("Cannot evict from an empty buffer pool")]
    EvictFromEmptyPool,

    #[error("Cannot evict: all {0} cached pages are pinned")]
    AllPagesPinned(usize),

    #[error("Page {0} is not in the buffer pool")]
    PageNotResident(PageId),

    #[error("Iterator already open")]
    IteratorAlreadyOpen,

    #[error("Iterator not open")]
    IteratorNotOpen,

    #[error("No more tuples")]
    NoSuchElement,

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Unsupported aggregate: {0}")]
    UnsupportedAggregate(String),

    #[error("Aggregate overflows an integer field: {0}")]
    AggregateOverflow(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

pub type DbResult<T> = Result<T, DbError>;
