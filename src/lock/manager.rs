use ahash::{AHashMap, AHashSet};
use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

use super::error::{LockError, LockResult};
use super::{Permissions, TransactionId};
use crate::file::PageId;

/// Holders of one page lock
#[derive(Debug, Default)]
struct PageLock {
    shared: AHashSet<TransactionId>,
    exclusive: Option<TransactionId>,
}

impl PageLock {
    fn is_free(&self) -> bool {
        self.shared.is_empty() && self.exclusive.is_none()
    }
}

#[derive(Debug, Default)]
struct LockTable {
    locks: AHashMap<PageId, PageLock>,
    /// Pages each transaction holds a lock on
    held: AHashMap<TransactionId, AHashSet<PageId>>,
    /// Edges waiter -> holders it is blocked on
    waits_for: AHashMap<TransactionId, AHashSet<TransactionId>>,
}

impl LockTable {
    /// Transactions that prevent `txn` from taking `pid` with `perm`
    fn blockers(&self, txn: TransactionId, pid: PageId, perm: Permissions) -> AHashSet<TransactionId> {
        let mut blockers = AHashSet::new();
        let Some(lock) = self.locks.get(&pid) else {
            return blockers;
        };

        if let Some(writer) = lock.exclusive
            && writer != txn
        {
            blockers.insert(writer);
        }

        if perm == Permissions::ReadWrite && lock.exclusive != Some(txn) {
            blockers.extend(lock.shared.iter().copied().filter(|&t| t != txn));
        }

        blockers
    }

    fn grant(&mut self, txn: TransactionId, pid: PageId, perm: Permissions) {
        let lock = self.locks.entry(pid).or_default();
        match perm {
            Permissions::ReadOnly => {
                if lock.exclusive != Some(txn) {
                    lock.shared.insert(txn);
                }
            }
            Permissions::ReadWrite => {
                // Upgrade replaces the shared hold
                lock.shared.remove(&txn);
                lock.exclusive = Some(txn);
            }
        }
        self.held.entry(txn).or_default().insert(pid);
    }

    fn release(&mut self, txn: TransactionId, pid: PageId) {
        if let Some(lock) = self.locks.get_mut(&pid) {
            lock.shared.remove(&txn);
            if lock.exclusive == Some(txn) {
                lock.exclusive = None;
            }
            if lock.is_free() {
                self.locks.remove(&pid);
            }
        }
    }

    /// Drop `txn` from the wait-for graph, both as waiter and as holder
    fn forget_waits(&mut self, txn: TransactionId) {
        self.waits_for.remove(&txn);
        for holders in self.waits_for.values_mut() {
            holders.remove(&txn);
        }
    }

    /// Whether following wait-for edges from `start` leads back to it
    fn has_cycle(&self, start: TransactionId) -> bool {
        let mut visited = AHashSet::new();
        let mut stack: Vec<TransactionId> = self
            .waits_for
            .get(&start)
            .map(|h| h.iter().copied().collect())
            .unwrap_or_default();

        while let Some(node) = stack.pop() {
            if node == start {
                return true;
            }
            if !visited.insert(node) {
                continue;
            }
            if let Some(next) = self.waits_for.get(&node) {
                stack.extend(next.iter().copied());
            }
        }

        false
    }
}

/// Page-level shared/exclusive locks for transactions
///
/// A request that cannot be granted waits on a condition variable until the
/// conflicting holders release or the timeout expires. While waiting, the
/// requester records wait-for edges to the holders; if that closes a cycle
/// the requester is aborted with [`LockError::Deadlock`].
pub struct LockManager {
    table: Mutex<LockTable>,
    cond_var: Condvar,
    timeout: Duration,
}

impl LockManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            table: Mutex::new(LockTable::default()),
            cond_var: Condvar::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Block until `txn` holds `pid` with at least `perm`
    pub fn acquire(&self, txn: TransactionId, pid: PageId, perm: Permissions) -> LockResult<()> {
        let deadline = Instant::now() + self.timeout;
        let mut table = self.table.lock();

        loop {
            let blockers = table.blockers(txn, pid, perm);
            if blockers.is_empty() {
                table.waits_for.remove(&txn);
                table.grant(txn, pid, perm);
                return Ok(());
            }

            table.waits_for.insert(txn, blockers);
            if table.has_cycle(txn) {
                table.waits_for.remove(&txn);
                return Err(LockError::Deadlock { txn, page: pid });
            }

            if Instant::now() >= deadline {
                table.waits_for.remove(&txn);
                return Err(LockError::Timeout { txn, page: pid });
            }

            // Blockers are recomputed on wake-up, so a timed out wait still gets one last check
            self.cond_var.wait_until(&mut table, deadline);
        }
    }

    /// Release whatever lock `txn` holds on `pid`
    pub fn release(&self, txn: TransactionId, pid: PageId) {
        let mut table = self.table.lock();
        table.release(txn, pid);
        if let Some(pages) = table.held.get_mut(&txn) {
            pages.remove(&pid);
            if pages.is_empty() {
                table.held.remove(&txn);
            }
        }
        drop(table);
        self.cond_var.notify_all();
    }

    /// Release every lock held by `txn`
    pub fn release_all(&self, txn: TransactionId) {
        let mut table = self.table.lock();
        if let Some(pages) = table.held.remove(&txn) {
            for pid in pages {
                table.release(txn, pid);
            }
        }
        table.forget_waits(txn);
        drop(table);
        self.cond_var.notify_all();
    }

    pub fn holds_lock(&self, txn: TransactionId, pid: PageId) -> bool {
        self.table
            .lock()
            .held
            .get(&txn)
            .is_some_and(|pages| pages.contains(&pid))
    }

    /// Strongest mode `txn` currently holds on `pid`
    pub fn lock_mode(&self, txn: TransactionId, pid: PageId) -> Option<Permissions> {
        let table = self.table.lock();
        let lock = table.locks.get(&pid)?;
        if lock.exclusive == Some(txn) {
            Some(Permissions::ReadWrite)
        } else if lock.shared.contains(&txn) {
            Some(Permissions::ReadOnly)
        } else {
            None
        }
    }

    /// Pages `txn` holds a lock on
    pub fn pages_locked_by(&self, txn: TransactionId) -> Vec<PageId> {
        let table = self.table.lock();
        let mut pages: Vec<PageId> = table
            .held
            .get(&txn)
            .map(|p| p.iter().copied().collect())
            .unwrap_or_default();
        pages.sort();
        pages
    }
}
