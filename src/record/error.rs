use crate::file::{FileError, PageId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Invalid slot: page={0}, slot={1}")]
    InvalidSlot(PageId, usize),

    #[error("Slot not in use: page={0}, slot={1}")]
    SlotNotUsed(PageId, usize),

    #[error("Page full: page={0}")]
    PageFull(PageId),

    #[error("Tuple has no record id")]
    MissingRecordId,

    #[error("No such field: {0}")]
    NoSuchField(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },
}

pub type RecordResult<T> = Result<T, RecordError>;
