use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::sync::Arc;

use super::{PageId, TableId};
use crate::catalog::Catalog;
use crate::error::{DbError, DbResult};
use crate::lock::{LockManager, Permissions, TransactionId};
use crate::record::{HeapPage, RecordError, Tuple};

/// Shared handle to a cached page
///
/// Every caller asking for the same page gets a clone of the same handle. A
/// handle held outside the pool pins the page: it is never chosen as an
/// eviction victim while a clone is alive.
pub type PageRef = Arc<RwLock<HeapPage>>;

/// Bounded page cache with strict LRU replacement
///
/// The cache map is the only place a page lives in memory; pages are loaded
/// through the owning heap file and written back on eviction or flush.
/// Membership changes run under one mutex, while page contents sit behind a
/// per-page lock that callers take without involving the pool.
pub struct BufferPool {
    capacity: usize,
    catalog: Arc<Catalog>,
    locks: Arc<LockManager>,
    /// LRU order doubles as the replacement order; capacity is enforced here,
    /// not by the cache, so a pinned tail can be skipped
    cache: Mutex<LruCache<PageId, PageRef>>,
}

impl BufferPool {
    pub fn new(capacity: usize, catalog: Arc<Catalog>, locks: Arc<LockManager>) -> DbResult<Self> {
        if capacity == 0 {
            return Err(DbError::InvalidCapacity);
        }

        Ok(Self {
            capacity,
            catalog,
            locks,
            cache: Mutex::new(LruCache::unbounded()),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.locks
    }

    /// Get a page for `txn`, loading it from its heap file if necessary
    ///
    /// The page lock is taken before the cache is touched, so a blocked
    /// transaction never holds up the pool. Every successful call moves the
    /// page to the most recently used end.
    pub fn get_page(&self, txn: TransactionId, pid: PageId, perm: Permissions) -> DbResult<PageRef> {
        self.locks.acquire(txn, pid, perm)?;

        let mut cache = self.cache.lock();
        if let Some(page) = cache.get(&pid) {
            return Ok(Arc::clone(page));
        }

        // Read first so a bad page id costs no eviction
        let file = self.catalog.file(pid.table)?;
        let page = Arc::new(RwLock::new(file.read_page(pid)?));

        if cache.len() >= self.capacity {
            self.evict_page(&mut cache)?;
        }
        cache.put(pid, Arc::clone(&page));

        if cache.len() > self.capacity {
            return Err(DbError::CapacityExceeded {
                size: cache.len(),
                capacity: self.capacity,
            });
        }

        Ok(page)
    }

    /// Insert `tuple` into `table` on behalf of `txn`
    pub fn insert_tuple(&self, txn: TransactionId, table: TableId, tuple: &mut Tuple) -> DbResult<()> {
        let file = self.catalog.file(table)?;
        let pages = file.insert_tuple(txn, tuple, self)?;
        self.mark_pages_dirty(txn, pages)
    }

    /// Delete `tuple` from the table its record id points into
    pub fn delete_tuple(&self, txn: TransactionId, tuple: &Tuple) -> DbResult<()> {
        let rid = tuple.record_id().ok_or(RecordError::MissingRecordId)?;
        let file = self.catalog.file(rid.page.table)?;
        let pages = file.delete_tuple(txn, tuple, self)?;
        self.mark_pages_dirty(txn, pages)
    }

    fn mark_pages_dirty(&self, txn: TransactionId, pages: Vec<PageRef>) -> DbResult<()> {
        for page in pages {
            let pid = {
                let mut guard = page.write();
                guard.mark_dirty(true, txn);
                guard.id()
            };

            // A mutated page must stay the authoritative cached copy
            let mut cache = self.cache.lock();
            if !cache.contains(&pid) {
                if cache.len() >= self.capacity {
                    self.evict_page(&mut cache)?;
                }
                cache.put(pid, page);
            }
        }
        Ok(())
    }

    /// Write one resident page back if it is dirty
    pub fn flush_page(&self, pid: PageId) -> DbResult<()> {
        let cache = self.cache.lock();
        let page = cache.peek(&pid).ok_or(DbError::PageNotResident(pid))?;
        self.write_back(page)
    }

    /// Write back every dirty page and sync the files touched
    pub fn flush_all_pages(&self) -> DbResult<()> {
        let cache = self.cache.lock();
        let mut tables = BTreeSet::new();
        for (pid, page) in cache.iter() {
            self.write_back(page)?;
            tables.insert(pid.table);
        }

        for table in tables {
            self.catalog.file(table)?.sync()?;
        }
        Ok(())
    }

    /// Write back the pages dirtied by `txn`
    pub fn flush_pages(&self, txn: TransactionId) -> DbResult<()> {
        let cache = self.cache.lock();
        for (_, page) in cache.iter() {
            if page.read().is_dirty() == Some(txn) {
                self.write_back(page)?;
            }
        }
        Ok(())
    }

    /// Drop a page from the cache without writing it back
    pub fn discard_page(&self, pid: PageId) {
        self.cache.lock().pop(&pid);
    }

    /// Finish `txn`: on commit its dirty pages are written back, on abort
    /// they are discarded so the next read sees the on-disk version. Its
    /// locks are released either way.
    pub fn transaction_complete(&self, txn: TransactionId, commit: bool) -> DbResult<()> {
        let result = if commit {
            self.flush_pages(txn)
        } else {
            let mut cache = self.cache.lock();
            let dirtied: Vec<PageId> = cache
                .iter()
                .filter(|(_, page)| page.read().is_dirty() == Some(txn))
                .map(|(pid, _)| *pid)
                .collect();
            for pid in dirtied {
                cache.pop(&pid);
            }
            Ok(())
        };

        self.locks.release_all(txn);
        result
    }

    /// Release `txn`'s lock on one page before the transaction ends
    pub fn release_page(&self, txn: TransactionId, pid: PageId) {
        self.locks.release(txn, pid);
    }

    pub fn holds_lock(&self, txn: TransactionId, pid: PageId) -> bool {
        self.locks.holds_lock(txn, pid)
    }

    /// Number of pages currently cached
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }

    pub fn is_cached(&self, pid: PageId) -> bool {
        self.cache.lock().contains(&pid)
    }

    pub fn dirty_count(&self) -> usize {
        self.cache
            .lock()
            .iter()
            .filter(|(_, page)| page.read().is_dirty().is_some())
            .count()
    }

    /// Cached page ids, least recently used first
    pub fn cached_pages(&self) -> Vec<PageId> {
        self.cache.lock().iter().rev().map(|(pid, _)| *pid).collect()
    }

    fn write_back(&self, page: &PageRef) -> DbResult<()> {
        let mut guard = page.write();
        if guard.is_dirty().is_some() {
            self.catalog.file(guard.id().table)?.write_page(&guard)?;
            guard.mark_clean();
        }
        Ok(())
    }

    /// Evict the least recently used unpinned page, writing it back if dirty
    fn evict_page(&self, cache: &mut LruCache<PageId, PageRef>) -> DbResult<()> {
        if cache.is_empty() {
            return Err(DbError::EvictFromEmptyPool);
        }

        // The cache's own reference is the only one for an unpinned page
        let victim = cache
            .iter()
            .rev()
            .find(|(_, page)| Arc::strong_count(page) == 1)
            .map(|(pid, _)| *pid)
            .ok_or(DbError::AllPagesPinned(cache.len()))?;

        if let Some(page) = cache.peek(&victim) {
            self.write_back(page)?;
        }
        cache.pop(&victim);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::PAGE_SIZE;
    use crate::record::{Field, FieldType, HeapFile, TupleDesc};
    use std::time::Duration;
    use tempfile::TempDir;

    struct TestEnv {
        _dir: TempDir,
        catalog: Arc<Catalog>,
        locks: Arc<LockManager>,
        table: TableId,
    }

    /// One single-int table whose file already holds `pages` empty pages
    fn setup_test_env(pages: usize) -> TestEnv {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Arc::new(Catalog::new());
        let locks = Arc::new(LockManager::new(Duration::from_millis(100)));

        let table = catalog.next_table_id();
        let desc = Arc::new(TupleDesc::from_types(&[FieldType::Int]));
        let file = HeapFile::open(table, dir.path().join("t.dat"), desc, PAGE_SIZE).unwrap();
        for _ in 0..pages {
            file.allocate_page().unwrap();
        }
        catalog.add_table(Arc::new(file), "t", None);

        TestEnv {
            _dir: dir,
            catalog,
            locks,
            table,
        }
    }

    fn pool(env: &TestEnv, capacity: usize) -> BufferPool {
        BufferPool::new(capacity, Arc::clone(&env.catalog), Arc::clone(&env.locks)).unwrap()
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let env = setup_test_env(0);
        let result = BufferPool::new(0, Arc::clone(&env.catalog), Arc::clone(&env.locks));
        assert!(matches!(result, Err(DbError::InvalidCapacity)));
    }

    #[test]
    fn test_get_page_shares_instance() {
        let env = setup_test_env(1);
        let bp = pool(&env, 4);
        let txn = TransactionId::new();
        let pid = PageId::new(env.table, 0);

        let a = bp.get_page(txn, pid, Permissions::ReadOnly).unwrap();
        let b = bp.get_page(txn, pid, Permissions::ReadOnly).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(bp.len(), 1);
        assert!(bp.holds_lock(txn, pid));
    }

    #[test]
    fn test_get_page_out_of_range() {
        let env = setup_test_env(1);
        let bp = pool(&env, 4);
        let result = bp.get_page(
            TransactionId::new(),
            PageId::new(env.table, 5),
            Permissions::ReadOnly,
        );
        assert!(result.is_err());
        assert!(bp.is_empty());
    }

    #[test]
    fn test_failed_read_keeps_full_cache() {
        let env = setup_test_env(2);
        let bp = pool(&env, 2);
        let txn = TransactionId::new();
        let pid = |n| PageId::new(env.table, n);

        bp.get_page(txn, pid(0), Permissions::ReadOnly).unwrap();
        bp.get_page(txn, pid(1), Permissions::ReadOnly).unwrap();

        assert!(bp.get_page(txn, pid(7), Permissions::ReadOnly).is_err());
        assert!(bp.get_page(txn, PageId::new(TableId(99), 0), Permissions::ReadOnly).is_err());
        assert_eq!(bp.cached_pages(), vec![pid(0), pid(1)]);
    }

    #[test]
    fn test_capacity_invariant() {
        let env = setup_test_env(10);
        let bp = pool(&env, 3);
        let txn = TransactionId::new();

        for n in 0..10 {
            bp.get_page(txn, PageId::new(env.table, n), Permissions::ReadOnly)
                .unwrap();
            assert_eq!(bp.len(), (n + 1).min(3));
        }
    }

    #[test]
    fn test_lru_eviction() {
        let env = setup_test_env(4);
        let bp = pool(&env, 3);
        let txn = TransactionId::new();
        let pid = |n| PageId::new(env.table, n);

        for n in 0..3 {
            bp.get_page(txn, pid(n), Permissions::ReadOnly).unwrap();
        }

        // Touch page 0 so page 1 becomes least recently used
        bp.get_page(txn, pid(0), Permissions::ReadOnly).unwrap();
        bp.get_page(txn, pid(3), Permissions::ReadOnly).unwrap();

        assert!(bp.is_cached(pid(0)));
        assert!(!bp.is_cached(pid(1)));
        assert!(bp.is_cached(pid(2)));
        assert!(bp.is_cached(pid(3)));
        assert_eq!(bp.cached_pages(), vec![pid(2), pid(0), pid(3)]);
    }

    #[test]
    fn test_pinned_page_not_evicted() {
        let env = setup_test_env(3);
        let bp = pool(&env, 2);
        let txn = TransactionId::new();
        let pid = |n| PageId::new(env.table, n);

        let pinned = bp.get_page(txn, pid(0), Permissions::ReadOnly).unwrap();
        bp.get_page(txn, pid(1), Permissions::ReadOnly).unwrap();
        bp.get_page(txn, pid(2), Permissions::ReadOnly).unwrap();

        assert!(bp.is_cached(pid(0)));
        assert!(!bp.is_cached(pid(1)));
        drop(pinned);
    }

    #[test]
    fn test_all_pages_pinned() {
        let env = setup_test_env(2);
        let bp = pool(&env, 1);
        let txn = TransactionId::new();

        let _held = bp
            .get_page(txn, PageId::new(env.table, 0), Permissions::ReadOnly)
            .unwrap();
        let result = bp.get_page(txn, PageId::new(env.table, 1), Permissions::ReadOnly);
        assert!(matches!(result, Err(DbError::AllPagesPinned(1))));
        assert_eq!(bp.len(), 1);
    }

    #[test]
    fn test_insert_marks_dirty_and_flush_writes_back() {
        let env = setup_test_env(0);
        let bp = pool(&env, 4);
        let txn = TransactionId::new();

        let mut tuple = Tuple::new(vec![Field::Int(42)]);
        bp.insert_tuple(txn, env.table, &mut tuple).unwrap();
        let pid = tuple.record_id().unwrap().page;
        assert_eq!(bp.dirty_count(), 1);

        bp.flush_page(pid).unwrap();
        assert_eq!(bp.dirty_count(), 0);

        // A cold read reproduces the flushed tuple
        let file = env.catalog.file(env.table).unwrap();
        let page = file.read_page(pid).unwrap();
        assert_eq!(page.tuple(0).unwrap(), tuple);
    }

    #[test]
    fn test_flush_page_not_resident() {
        let env = setup_test_env(1);
        let bp = pool(&env, 4);
        let result = bp.flush_page(PageId::new(env.table, 0));
        assert!(matches!(result, Err(DbError::PageNotResident(_))));
    }

    #[test]
    fn test_dirty_page_flushed_on_eviction() {
        let env = setup_test_env(0);
        let bp = pool(&env, 1);
        let txn = TransactionId::new();

        let mut tuple = Tuple::new(vec![Field::Int(7)]);
        bp.insert_tuple(txn, env.table, &mut tuple).unwrap();

        // A second page forces the first one out
        let file = env.catalog.file(env.table).unwrap();
        file.allocate_page().unwrap();
        bp.get_page(txn, PageId::new(env.table, 1), Permissions::ReadOnly)
            .unwrap();
        assert!(!bp.is_cached(PageId::new(env.table, 0)));

        let page = file.read_page(PageId::new(env.table, 0)).unwrap();
        assert_eq!(page.tuple(0).unwrap().field(0).unwrap(), &Field::Int(7));
    }

    #[test]
    fn test_discard_drops_changes() {
        let env = setup_test_env(0);
        let bp = pool(&env, 4);
        let txn = TransactionId::new();

        let mut tuple = Tuple::new(vec![Field::Int(1)]);
        bp.insert_tuple(txn, env.table, &mut tuple).unwrap();
        let pid = tuple.record_id().unwrap().page;

        bp.discard_page(pid);
        assert!(!bp.is_cached(pid));

        let page = bp.get_page(txn, pid, Permissions::ReadOnly).unwrap();
        assert_eq!(page.read().iter().count(), 0);
    }

    #[test]
    fn test_transaction_complete() {
        let env = setup_test_env(0);
        let bp = pool(&env, 4);

        let committed = TransactionId::new();
        let mut kept = Tuple::new(vec![Field::Int(1)]);
        bp.insert_tuple(committed, env.table, &mut kept).unwrap();
        let pid = kept.record_id().unwrap().page;
        bp.transaction_complete(committed, true).unwrap();
        assert_eq!(bp.dirty_count(), 0);
        assert!(!bp.holds_lock(committed, pid));

        let aborted = TransactionId::new();
        let mut lost = Tuple::new(vec![Field::Int(2)]);
        bp.insert_tuple(aborted, env.table, &mut lost).unwrap();
        bp.transaction_complete(aborted, false).unwrap();
        assert!(!bp.holds_lock(aborted, pid));

        let reader = TransactionId::new();
        let page = bp.get_page(reader, pid, Permissions::ReadOnly).unwrap();
        let values: Vec<Field> = page
            .read()
            .iter()
            .map(|t| t.unwrap().field(0).unwrap().clone())
            .collect();
        assert_eq!(values, vec![Field::Int(1)]);
    }

    #[test]
    fn test_conflicting_writer_times_out() {
        let env = setup_test_env(1);
        let bp = pool(&env, 4);
        let pid = PageId::new(env.table, 0);
        let (t1, t2) = (TransactionId::new(), TransactionId::new());

        bp.get_page(t1, pid, Permissions::ReadWrite).unwrap();
        let result = bp.get_page(t2, pid, Permissions::ReadOnly);
        assert!(matches!(result, Err(DbError::Lock(_))));

        bp.release_page(t1, pid);
        bp.get_page(t2, pid, Permissions::ReadOnly).unwrap();
    }
}
