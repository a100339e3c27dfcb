mod error;
mod manager;

pub use error::{LockError, LockResult};
pub use manager::LockManager;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock wait budget when no timeout is configured
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 1000;

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique, monotonically increasing transaction identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(u64);

impl TransactionId {
    /// Allocate the next transaction id
    pub fn new() -> Self {
        Self(NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn-{}", self.0)
    }
}

/// Access mode requested for a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permissions {
    ReadOnly,
    ReadWrite,
}
