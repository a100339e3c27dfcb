mod error;
mod heap_file;
mod page;
mod schema;
mod tuple;
mod value;

pub use error::{RecordError, RecordResult};
pub use heap_file::{HeapFile, HeapFileIterator};
pub use page::{HeapPage, HeapPageIter};
pub use schema::{TdItem, TupleDesc};
pub use tuple::{RecordId, Tuple};
pub use value::{CompareOp, Field, FieldType};
