use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::error::{RecordError, RecordResult};
use super::page::HeapPage;
use super::schema::TupleDesc;
use super::tuple::Tuple;
use crate::error::{DbError, DbResult};
use crate::execution::OpIterator;
use crate::file::{BufferPool, FileError, PageId, PageRef, PagedFile, TableId};
use crate::lock::{Permissions, TransactionId};

/// Unordered, page-organized storage for one table
///
/// Pages are only read and written here; every page a caller sees comes
/// through the buffer pool. `free_pages` holds page numbers believed to have
/// a free slot. It may miss pages with room, and every hint is rechecked
/// against the cached page before it is used.
pub struct HeapFile {
    id: TableId,
    desc: Arc<TupleDesc>,
    page_size: usize,
    path: PathBuf,
    file: Mutex<PagedFile>,
    free_pages: Mutex<BTreeSet<usize>>,
}

impl HeapFile {
    /// Open (or create) the heap file at `path`
    pub fn open<P: AsRef<Path>>(
        id: TableId,
        path: P,
        desc: Arc<TupleDesc>,
        page_size: usize,
    ) -> RecordResult<Self> {
        if HeapPage::calculate_slot_count(page_size, desc.byte_size()) == 0 {
            return Err(RecordError::SchemaMismatch(format!(
                "Tuple size {} does not fit in a {} byte page",
                desc.byte_size(),
                page_size
            )));
        }

        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(FileError::from)?;
        }
        let file = PagedFile::open(&path, page_size)?;

        Ok(Self {
            id,
            desc,
            page_size,
            path,
            file: Mutex::new(file),
            free_pages: Mutex::new(BTreeSet::new()),
        })
    }

    pub fn id(&self) -> TableId {
        self.id
    }

    pub fn tuple_desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of pages, a trailing partial page included
    pub fn num_pages(&self) -> RecordResult<usize> {
        Ok(self.file.lock().num_pages()?)
    }

    fn check_owner(&self, pid: PageId) -> RecordResult<()> {
        if pid.table != self.id {
            return Err(FileError::ForeignPage(pid, self.id).into());
        }
        Ok(())
    }

    /// Read and decode one page from disk
    ///
    /// Only the buffer pool should call this; anyone else would get a copy
    /// that can diverge from the cached page.
    pub fn read_page(&self, pid: PageId) -> RecordResult<HeapPage> {
        self.check_owner(pid)?;

        let mut buffer = vec![0u8; self.page_size];
        self.file.lock().read_page(pid.page_no, &mut buffer)?;
        HeapPage::new(pid, buffer, Arc::clone(&self.desc))
    }

    /// Write a page's bytes back at its offset
    pub fn write_page(&self, page: &HeapPage) -> RecordResult<()> {
        let pid = page.id();
        self.check_owner(pid)?;
        self.file.lock().write_page(pid.page_no, page.page_data())?;
        Ok(())
    }

    /// Append one empty page to the file and return its id
    pub fn allocate_page(&self) -> RecordResult<PageId> {
        let page_no = self
            .file
            .lock()
            .append_page(&HeapPage::empty_page_data(self.page_size))?;
        self.free_pages.lock().insert(page_no);
        Ok(PageId::new(self.id, page_no))
    }

    pub fn sync(&self) -> RecordResult<()> {
        self.file.lock().sync()?;
        Ok(())
    }

    /// Page numbers currently hinted as having a free slot
    pub fn free_page_hints(&self) -> Vec<usize> {
        self.free_pages.lock().iter().copied().collect()
    }

    /// Find an existing page with a free slot, fetched read-write for `txn`
    ///
    /// Hinted pages are tried lowest first; stale hints are dropped. Without
    /// a usable hint, every page is checked in order. Locks taken only to
    /// inspect a full page are given back.
    pub fn find_free_page(&self, txn: TransactionId, pool: &BufferPool) -> DbResult<Option<PageRef>> {
        loop {
            let hint = self.free_pages.lock().first().copied();
            let Some(page_no) = hint else {
                break;
            };

            let pid = PageId::new(self.id, page_no);
            let already_held = pool.holds_lock(txn, pid);

            let page = pool.get_page(txn, pid, Permissions::ReadWrite)?;
            if page.read().num_empty_slots() > 0 {
                return Ok(Some(page));
            }
            self.free_pages.lock().remove(&page_no);

            drop(page);
            if !already_held {
                pool.release_page(txn, pid);
            }
        }

        for page_no in 0..self.num_pages()? {
            let pid = PageId::new(self.id, page_no);
            let already_held = pool.holds_lock(txn, pid);

            let page = pool.get_page(txn, pid, Permissions::ReadWrite)?;
            if page.read().num_empty_slots() > 0 {
                self.free_pages.lock().insert(page_no);
                return Ok(Some(page));
            }

            drop(page);
            if !already_held {
                pool.release_page(txn, pid);
            }
        }

        Ok(None)
    }

    /// Place `tuple` on the first page with room, allocating one if needed
    ///
    /// Assigns the tuple's record id and returns the page it landed on.
    pub fn insert_tuple(
        &self,
        txn: TransactionId,
        tuple: &mut Tuple,
        pool: &BufferPool,
    ) -> DbResult<Vec<PageRef>> {
        self.desc.validate(tuple.fields())?;

        let page = match self.find_free_page(txn, pool)? {
            Some(page) => page,
            None => {
                let pid = self.allocate_page()?;
                pool.get_page(txn, pid, Permissions::ReadWrite)?
            }
        };

        {
            let mut guard = page.write();
            guard.insert_tuple(tuple)?;
            guard.mark_dirty(true, txn);
            if guard.num_empty_slots() == 0 {
                self.free_pages.lock().remove(&guard.id().page_no);
            }
        }

        Ok(vec![page])
    }

    /// Free the slot `tuple` occupies and return the page it was on
    pub fn delete_tuple(
        &self,
        txn: TransactionId,
        tuple: &Tuple,
        pool: &BufferPool,
    ) -> DbResult<Vec<PageRef>> {
        let rid = tuple.record_id().ok_or(RecordError::MissingRecordId)?;
        self.check_owner(rid.page)?;

        let num_pages = self.num_pages()?;
        if rid.page.page_no >= num_pages {
            return Err(RecordError::from(FileError::PageOutOfRange {
                page_no: rid.page.page_no,
                num_pages,
            })
            .into());
        }

        let page = pool.get_page(txn, rid.page, Permissions::ReadWrite)?;
        {
            let mut guard = page.write();
            guard.delete_tuple(tuple)?;
            guard.mark_dirty(true, txn);
        }
        self.free_pages.lock().insert(rid.page.page_no);

        Ok(vec![page])
    }

    /// Iterator over every live tuple of this file, read through `pool`
    pub fn iterator(self: &Arc<Self>, txn: TransactionId, pool: Arc<BufferPool>) -> HeapFileIterator {
        HeapFileIterator {
            file: Arc::clone(self),
            pool,
            txn,
            cursor: None,
        }
    }
}

/// Walks a heap file page by page through the buffer pool
///
/// Only a `(page_no, slot)` cursor survives between calls: each step fetches
/// the page again, so no page stays pinned by an idle iterator and slots
/// freed mid-scan are skipped.
pub struct HeapFileIterator {
    file: Arc<HeapFile>,
    pool: Arc<BufferPool>,
    txn: TransactionId,
    /// `None` while closed
    cursor: Option<(usize, usize)>,
}

impl HeapFileIterator {
    /// Position of the next live tuple at or after the cursor
    fn seek(&mut self) -> DbResult<Option<(usize, usize, PageRef)>> {
        let (mut page_no, mut slot) = self.cursor.ok_or(DbError::IteratorNotOpen)?;
        let num_pages = self.file.num_pages()?;

        while page_no < num_pages {
            let pid = PageId::new(self.file.id(), page_no);
            let page = self.pool.get_page(self.txn, pid, Permissions::ReadOnly)?;
            let found = page.read().next_used_slot(slot);
            if let Some(slot) = found {
                // Skipping free slots does not move the logical position
                self.cursor = Some((page_no, slot));
                return Ok(Some((page_no, slot, page)));
            }
            page_no += 1;
            slot = 0;
        }

        self.cursor = Some((num_pages, 0));
        Ok(None)
    }
}

impl OpIterator for HeapFileIterator {
    fn open(&mut self) -> DbResult<()> {
        if self.cursor.is_some() {
            return Err(DbError::IteratorAlreadyOpen);
        }
        self.cursor = Some((0, 0));
        Ok(())
    }

    fn has_next(&mut self) -> DbResult<bool> {
        Ok(self.seek()?.is_some())
    }

    fn next(&mut self) -> DbResult<Tuple> {
        let (page_no, slot, page) = self.seek()?.ok_or(DbError::NoSuchElement)?;
        let tuple = page.read().tuple(slot)?;
        self.cursor = Some((page_no, slot + 1));
        Ok(tuple)
    }

    fn rewind(&mut self) -> DbResult<()> {
        self.close();
        self.open()
    }

    fn close(&mut self) {
        self.cursor = None;
    }

    fn tuple_desc(&self) -> &TupleDesc {
        &self.file.desc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::file::PAGE_SIZE;
    use crate::lock::LockManager;
    use crate::record::{Field, FieldType};
    use std::collections::HashSet;
    use std::time::Duration;
    use tempfile::TempDir;

    struct TestEnv {
        _dir: TempDir,
        file: Arc<HeapFile>,
        pool: Arc<BufferPool>,
    }

    fn setup_test_env(page_size: usize, capacity: usize) -> TestEnv {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Arc::new(Catalog::new());
        let locks = Arc::new(LockManager::new(Duration::from_millis(100)));

        let desc = Arc::new(TupleDesc::from_types(&[FieldType::Int, FieldType::Int]));
        let file = Arc::new(
            HeapFile::open(catalog.next_table_id(), dir.path().join("heap.dat"), desc, page_size)
                .unwrap(),
        );
        catalog.add_table(Arc::clone(&file), "heap", None);
        let pool = Arc::new(BufferPool::new(capacity, catalog, locks).unwrap());

        TestEnv {
            _dir: dir,
            file,
            pool,
        }
    }

    fn row(a: i32, b: i32) -> Tuple {
        Tuple::new(vec![Field::Int(a), Field::Int(b)])
    }

    fn scan_all(env: &TestEnv, txn: TransactionId) -> Vec<Tuple> {
        let mut it = env.file.iterator(txn, Arc::clone(&env.pool));
        it.open().unwrap();
        let mut out = Vec::new();
        while it.has_next().unwrap() {
            out.push(it.next().unwrap());
        }
        it.close();
        out
    }

    #[test]
    fn test_tuple_too_large() {
        let dir = tempfile::tempdir().unwrap();
        let desc = Arc::new(TupleDesc::from_types(&[FieldType::Str(16)]));
        let result = HeapFile::open(TableId(1), dir.path().join("x.dat"), desc, 8);
        assert!(matches!(result, Err(RecordError::SchemaMismatch(_))));
    }

    #[test]
    fn test_allocation_is_monotonic() {
        let env = setup_test_env(PAGE_SIZE, 4);
        assert_eq!(env.file.num_pages().unwrap(), 0);

        for n in 0..5 {
            let pid = env.file.allocate_page().unwrap();
            assert_eq!(pid.page_no, n);
            assert_eq!(env.file.num_pages().unwrap(), n + 1);
        }
        let len = std::fs::metadata(env.file.path()).unwrap().len();
        assert_eq!(len, (5 * PAGE_SIZE) as u64);
    }

    #[test]
    fn test_read_page_checks() {
        let env = setup_test_env(PAGE_SIZE, 4);
        env.file.allocate_page().unwrap();

        let foreign = PageId::new(TableId(99), 0);
        assert!(matches!(
            env.file.read_page(foreign),
            Err(RecordError::File(FileError::ForeignPage(..)))
        ));

        let beyond = PageId::new(env.file.id(), 1);
        assert!(matches!(
            env.file.read_page(beyond),
            Err(RecordError::File(FileError::PageOutOfRange { .. }))
        ));
    }

    #[test]
    fn test_write_page_round_trip() {
        let env = setup_test_env(PAGE_SIZE, 4);
        let pid = env.file.allocate_page().unwrap();

        let mut page = env.file.read_page(pid).unwrap();
        page.insert_tuple(&mut row(1, 2)).unwrap();
        env.file.write_page(&page).unwrap();

        let reread = env.file.read_page(pid).unwrap();
        assert_eq!(reread, page);
    }

    #[test]
    fn test_insert_fills_pages_in_order() {
        // 32 byte pages hold three 8 byte tuples
        let env = setup_test_env(32, 8);
        let txn = TransactionId::new();

        let mut placed = Vec::new();
        for i in 0..7 {
            let mut t = row(i, i);
            env.file.insert_tuple(txn, &mut t, &env.pool).unwrap();
            placed.push(t.record_id().unwrap());
        }

        assert_eq!(env.file.num_pages().unwrap(), 3);
        let pages: Vec<usize> = placed.iter().map(|rid| rid.page.page_no).collect();
        assert_eq!(pages, vec![0, 0, 0, 1, 1, 1, 2]);
        assert_eq!(env.file.free_page_hints(), vec![2]);
    }

    #[test]
    fn test_delete_then_insert_reuses_slot() {
        let env = setup_test_env(32, 8);
        let txn = TransactionId::new();

        let mut tuples = Vec::new();
        for i in 0..6 {
            let mut t = row(i, 0);
            env.file.insert_tuple(txn, &mut t, &env.pool).unwrap();
            tuples.push(t);
        }

        let page = env.pool.get_page(txn, PageId::new(env.file.id(), 0), Permissions::ReadOnly).unwrap();
        let before = page.read().num_empty_slots();
        drop(page);

        env.file.delete_tuple(txn, &tuples[1], &env.pool).unwrap();
        let mut t = row(100, 0);
        env.file.insert_tuple(txn, &mut t, &env.pool).unwrap();
        assert_eq!(t.record_id(), tuples[1].record_id());

        let page = env.pool.get_page(txn, PageId::new(env.file.id(), 0), Permissions::ReadOnly).unwrap();
        assert_eq!(page.read().num_empty_slots(), before);
    }

    #[test]
    fn test_scan_finds_free_page_without_hints() {
        let env = setup_test_env(32, 8);
        let txn = TransactionId::new();

        let mut tuples = Vec::new();
        for i in 0..6 {
            let mut t = row(i, 0);
            env.file.insert_tuple(txn, &mut t, &env.pool).unwrap();
            tuples.push(t);
        }

        // Freeing a slot straight on the cached page leaves no hint behind
        let pid = PageId::new(env.file.id(), 0);
        env.pool
            .get_page(txn, pid, Permissions::ReadWrite)
            .unwrap()
            .write()
            .delete_tuple(&tuples[2])
            .unwrap();
        assert!(env.file.free_page_hints().is_empty());

        let page = env.file.find_free_page(txn, &env.pool).unwrap().unwrap();
        assert_eq!(page.read().id(), pid);
        assert_eq!(env.file.free_page_hints(), vec![0]);
    }

    #[test]
    fn test_stale_hint_lock_released() {
        let env = setup_test_env(32, 8);
        let writer = TransactionId::new();

        let mut tuples = Vec::new();
        for i in 0..6 {
            let mut t = row(i, 0);
            env.file.insert_tuple(writer, &mut t, &env.pool).unwrap();
            tuples.push(t);
        }

        // Refill the freed slot behind the file's back so the hint goes stale
        let pid = PageId::new(env.file.id(), 0);
        env.file.delete_tuple(writer, &tuples[0], &env.pool).unwrap();
        assert_eq!(env.file.free_page_hints(), vec![0]);
        env.pool
            .get_page(writer, pid, Permissions::ReadWrite)
            .unwrap()
            .write()
            .insert_tuple(&mut row(50, 0))
            .unwrap();
        env.pool.transaction_complete(writer, true).unwrap();

        let txn = TransactionId::new();
        assert!(env.file.find_free_page(txn, &env.pool).unwrap().is_none());
        assert!(env.file.free_page_hints().is_empty());
        assert!(!env.pool.holds_lock(txn, pid));
        assert!(!env.pool.holds_lock(txn, PageId::new(env.file.id(), 1)));
    }

    #[test]
    fn test_delete_errors() {
        let env = setup_test_env(PAGE_SIZE, 4);
        let txn = TransactionId::new();

        let unplaced = row(1, 1);
        assert!(env.file.delete_tuple(txn, &unplaced, &env.pool).is_err());

        let mut t = row(1, 1);
        env.file.insert_tuple(txn, &mut t, &env.pool).unwrap();
        env.file.delete_tuple(txn, &t, &env.pool).unwrap();
        let again = env.file.delete_tuple(txn, &t, &env.pool);
        assert!(matches!(
            again,
            Err(DbError::Record(RecordError::SlotNotUsed(..)))
        ));
    }

    #[test]
    fn test_iterator_protocol() {
        let env = setup_test_env(PAGE_SIZE, 4);
        let txn = TransactionId::new();
        let mut it = env.file.iterator(txn, Arc::clone(&env.pool));

        assert!(matches!(it.has_next(), Err(DbError::IteratorNotOpen)));
        assert!(matches!(it.next(), Err(DbError::IteratorNotOpen)));

        it.open().unwrap();
        assert!(matches!(it.open(), Err(DbError::IteratorAlreadyOpen)));
        assert!(!it.has_next().unwrap());
        assert!(matches!(it.next(), Err(DbError::NoSuchElement)));

        it.close();
        it.close();
        it.open().unwrap();
    }

    #[test]
    fn test_iterator_skips_empty_interior_page() {
        let env = setup_test_env(32, 2);
        let txn = TransactionId::new();

        let mut tuples = Vec::new();
        for i in 0..9 {
            let mut t = row(i, i * 10);
            env.file.insert_tuple(txn, &mut t, &env.pool).unwrap();
            tuples.push(t);
        }
        // Empty page 1 entirely
        for t in &tuples[3..6] {
            env.file.delete_tuple(txn, t, &env.pool).unwrap();
        }

        let seen = scan_all(&env, txn);
        assert_eq!(seen.len(), 6);
        let rids: HashSet<_> = seen.iter().map(|t| t.record_id().unwrap()).collect();
        assert_eq!(rids.len(), 6);
        assert!(rids.iter().all(|rid| rid.page.page_no != 1));

        // Pool capacity still holds with a scan over more pages than fit
        assert!(env.pool.len() <= 2);
    }

    #[test]
    fn test_has_next_is_idempotent_and_rewind_sees_changes() {
        let env = setup_test_env(PAGE_SIZE, 4);
        let txn = TransactionId::new();
        for i in 0..3 {
            env.file.insert_tuple(txn, &mut row(i, 0), &env.pool).unwrap();
        }

        let mut it = env.file.iterator(txn, Arc::clone(&env.pool));
        it.open().unwrap();
        assert!(it.has_next().unwrap());
        assert!(it.has_next().unwrap());
        assert_eq!(it.next().unwrap().field(0).unwrap(), &Field::Int(0));

        env.file.insert_tuple(txn, &mut row(3, 0), &env.pool).unwrap();
        it.rewind().unwrap();
        let mut count = 0;
        while it.has_next().unwrap() {
            it.next().unwrap();
            count += 1;
        }
        assert_eq!(count, 4);
    }
}
