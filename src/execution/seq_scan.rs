use std::sync::Arc;

use super::OpIterator;
use crate::error::DbResult;
use crate::file::{BufferPool, TableId};
use crate::lock::TransactionId;
use crate::record::{HeapFileIterator, Tuple, TupleDesc};

/// Sequential scan over every live tuple of a table
///
/// Field names in the output schema are qualified as `alias.field`.
pub struct SeqScan {
    table: TableId,
    alias: String,
    desc: TupleDesc,
    inner: HeapFileIterator,
}

impl SeqScan {
    pub fn new(txn: TransactionId, table: TableId, alias: &str, pool: Arc<BufferPool>) -> DbResult<Self> {
        let file = pool.catalog().file(table)?;
        let desc = file.tuple_desc().with_alias(alias);
        Ok(Self {
            table,
            alias: alias.to_string(),
            desc,
            inner: file.iterator(txn, pool),
        })
    }

    pub fn table(&self) -> TableId {
        self.table
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }
}

impl OpIterator for SeqScan {
    fn open(&mut self) -> DbResult<()> {
        self.inner.open()
    }

    fn has_next(&mut self) -> DbResult<bool> {
        self.inner.has_next()
    }

    fn next(&mut self) -> DbResult<Tuple> {
        self.inner.next()
    }

    fn rewind(&mut self) -> DbResult<()> {
        self.inner.rewind()
    }

    fn close(&mut self) {
        self.inner.close()
    }

    fn tuple_desc(&self) -> &TupleDesc {
        &self.desc
    }
}
