pub mod catalog;
pub mod config;
pub mod database;
pub mod error;
pub mod execution;
pub mod file;
pub mod lock;
pub mod record;
pub mod stats;

pub use catalog::{Catalog, CatalogError, CatalogResult};
pub use config::DbConfig;
pub use database::Database;
pub use error::{DbError, DbResult};
pub use execution::OpIterator;
pub use file::{BufferPool, DEFAULT_POOL_PAGES, PAGE_SIZE, PageId, PageRef, TableId};
pub use lock::{LockManager, Permissions, TransactionId};
pub use record::{
    CompareOp, Field, FieldType, HeapFile, HeapPage, RecordError, RecordId, RecordResult, Tuple,
    TupleDesc,
};
pub use stats::TableStats;
