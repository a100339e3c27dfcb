use csv::{ReaderBuilder, Trim};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::catalog::Catalog;
use crate::config::DbConfig;
use crate::error::{DbError, DbResult};
use crate::file::{BufferPool, TableId};
use crate::lock::{LockManager, TransactionId};
use crate::record::{Field, HeapFile, RecordError, RecordResult, Tuple, TupleDesc};
use crate::stats::{IO_COST_PER_PAGE, TableStats};

/// One catalog, one lock manager and one buffer pool sharing them
///
/// Everything is reachable through shared references, so a `Database` can
/// be wrapped in an `Arc` and used from several threads.
pub struct Database {
    config: DbConfig,
    catalog: Arc<Catalog>,
    locks: Arc<LockManager>,
    pool: Arc<BufferPool>,
}

impl Database {
    pub fn new(config: DbConfig) -> DbResult<Self> {
        config.validate()?;

        let catalog = Arc::new(Catalog::new());
        let locks = Arc::new(LockManager::new(config.lock_timeout()));
        let pool = Arc::new(BufferPool::new(
            config.pool_pages,
            Arc::clone(&catalog),
            Arc::clone(&locks),
        )?);

        Ok(Self {
            config,
            catalog,
            locks,
            pool,
        })
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.locks
    }

    /// Open (or create) the heap file at `path` and register it as `name`
    pub fn create_table<P: Into<PathBuf>>(
        &self,
        name: &str,
        path: P,
        desc: TupleDesc,
        primary_key: Option<&str>,
    ) -> DbResult<TableId> {
        let file = HeapFile::open(
            self.catalog.next_table_id(),
            path.into(),
            Arc::new(desc),
            self.config.page_size,
        )?;
        let id = file.id();
        self.catalog.add_table(Arc::new(file), name, primary_key);
        Ok(id)
    }

    /// Register every table of a text schema file
    pub fn load_schema<P: AsRef<Path>>(&self, path: P) -> DbResult<Vec<TableId>> {
        Ok(self
            .catalog
            .load_schema(path, self.config.page_size, self.config.string_len)?)
    }

    pub fn begin(&self) -> TransactionId {
        TransactionId::new()
    }

    pub fn commit(&self, txn: TransactionId) -> DbResult<()> {
        self.pool.transaction_complete(txn, true)
    }

    pub fn abort(&self, txn: TransactionId) -> DbResult<()> {
        self.pool.transaction_complete(txn, false)
    }

    /// Append the rows of a headerless CSV file to `table` under `txn`
    ///
    /// Rows that do not fit the table schema are reported and skipped;
    /// storage and locking errors abort the load. Returns the number of
    /// rows inserted.
    pub fn load_csv<P: AsRef<Path>>(&self, txn: TransactionId, table: TableId, path: P) -> DbResult<usize> {
        let path = path.as_ref();
        let desc = self.catalog.tuple_desc(table)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All)
            .from_path(path)?;

        let mut inserted = 0;
        let mut skipped = 0;
        for (line, record) in reader.records().enumerate() {
            let record = record?;
            let fields = match parse_row(&desc, record.iter()) {
                Ok(fields) => fields,
                Err(e) => {
                    eprintln!("Warning: skipping row {} of {}: {}", line + 1, path.display(), e);
                    skipped += 1;
                    continue;
                }
            };

            let mut tuple = Tuple::new(fields);
            self.pool.insert_tuple(txn, table, &mut tuple)?;
            inserted += 1;
        }

        if skipped > 0 {
            eprintln!(
                "Loaded {} rows from {} into table {}, skipped {}",
                inserted,
                path.display(),
                table,
                skipped
            );
        }
        Ok(inserted)
    }

    /// Statistics for every table in the catalog, keyed by table name
    pub fn compute_statistics(&self) -> DbResult<HashMap<String, TableStats>> {
        let mut stats = HashMap::new();
        for id in self.catalog.table_ids() {
            let name = self.catalog.table_name(id)?;
            stats.insert(name, TableStats::new(id, IO_COST_PER_PAGE, self)?);
        }
        Ok(stats)
    }

    /// Write every dirty cached page back to its file
    pub fn flush(&self) -> DbResult<()> {
        self.pool.flush_all_pages()
    }

    /// Resolve a table name, for callers that only know names
    pub fn table_id(&self, name: &str) -> DbResult<TableId> {
        self.catalog.table_id(name).map_err(DbError::from)
    }
}

fn parse_row<'a>(desc: &TupleDesc, values: impl Iterator<Item = &'a str>) -> RecordResult<Vec<Field>> {
    let values: Vec<&str> = values.collect();
    if values.len() != desc.num_fields() {
        return Err(RecordError::SchemaMismatch(format!(
            "expected {} columns, got {}",
            desc.num_fields(),
            values.len()
        )));
    }

    let fields = desc
        .items()
        .iter()
        .zip(values)
        .map(|(item, text)| Field::parse(text, &item.field_type))
        .collect::<RecordResult<Vec<_>>>()?;
    desc.validate(&fields)?;
    Ok(fields)
}
