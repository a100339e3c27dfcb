use thiserror::Error;

use super::TransactionId;
use crate::file::PageId;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("Deadlock detected: {txn} aborted while waiting for page {page}")]
    Deadlock { txn: TransactionId, page: PageId },

    #[error("Lock timeout: {txn} gave up waiting for page {page}")]
    Timeout { txn: TransactionId, page: PageId },
}

pub type LockResult<T> = Result<T, LockError>;
