use std::io;
use thiserror::Error;

use super::{PageId, TableId};

#[derive(Debug, Error)]
pub enum FileError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("File already exists: {0}")]
    FileAlreadyExists(String),

    #[error("Page {page_no} out of range: file has {num_pages} pages")]
    PageOutOfRange { page_no: usize, num_pages: usize },

    #[error("Page {0} does not belong to table {1}")]
    ForeignPage(PageId, TableId),

    #[error("Invalid page size: expected {expected}, got {actual}")]
    InvalidPageSize { expected: usize, actual: usize },
}

pub type FileResult<T> = Result<T, FileError>;
