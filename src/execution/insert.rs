use std::sync::Arc;

use super::OpIterator;
use crate::error::{DbError, DbResult};
use crate::file::{BufferPool, TableId};
use crate::lock::TransactionId;
use crate::record::{Field, FieldType, Tuple, TupleDesc};

/// Inserts every child tuple into a table and yields one `(count)` tuple
///
/// The child is consumed once, on the first call that needs the count;
/// rewinding replays the count without inserting again.
pub struct Insert {
    txn: TransactionId,
    child: Box<dyn OpIterator>,
    table: TableId,
    pool: Arc<BufferPool>,
    desc: TupleDesc,
    count: Option<i32>,
    emitted: bool,
    open: bool,
}

impl Insert {
    pub fn new(
        txn: TransactionId,
        child: Box<dyn OpIterator>,
        table: TableId,
        pool: Arc<BufferPool>,
    ) -> DbResult<Self> {
        let table_desc = pool.catalog().tuple_desc(table)?;
        if *child.tuple_desc() != *table_desc {
            return Err(DbError::SchemaMismatch(format!(
                "cannot insert [{}] into table with [{}]",
                child.tuple_desc(),
                table_desc
            )));
        }

        Ok(Self {
            txn,
            child,
            table,
            pool,
            desc: TupleDesc::new(vec![(FieldType::Int, "insert_count".to_string())]),
            count: None,
            emitted: false,
            open: false,
        })
    }

    fn run(&mut self) -> DbResult<i32> {
        if let Some(count) = self.count {
            return Ok(count);
        }

        let mut count = 0;
        while self.child.has_next()? {
            let mut tuple = self.child.next()?;
            self.pool.insert_tuple(self.txn, self.table, &mut tuple)?;
            count += 1;
        }
        self.count = Some(count);
        Ok(count)
    }
}

impl OpIterator for Insert {
    fn open(&mut self) -> DbResult<()> {
        if self.open {
            return Err(DbError::IteratorAlreadyOpen);
        }
        self.child.open()?;
        self.open = true;
        self.emitted = false;
        Ok(())
    }

    fn has_next(&mut self) -> DbResult<bool> {
        if !self.open {
            return Err(DbError::IteratorNotOpen);
        }
        Ok(!self.emitted)
    }

    fn next(&mut self) -> DbResult<Tuple> {
        if !self.has_next()? {
            return Err(DbError::NoSuchElement);
        }
        let count = self.run()?;
        self.emitted = true;
        Ok(Tuple::new(vec![Field::Int(count)]))
    }

    fn rewind(&mut self) -> DbResult<()> {
        self.close();
        self.open()
    }

    fn close(&mut self) {
        self.child.close();
        self.open = false;
    }

    fn tuple_desc(&self) -> &TupleDesc {
        &self.desc
    }
}
