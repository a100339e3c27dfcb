use std::sync::Arc;

use super::OpIterator;
use crate::error::{DbError, DbResult};
use crate::file::BufferPool;
use crate::lock::TransactionId;
use crate::record::{Field, FieldType, Tuple, TupleDesc};

/// Deletes every child tuple from the table it was read from and yields one
/// `(count)` tuple
pub struct Delete {
    txn: TransactionId,
    child: Box<dyn OpIterator>,
    pool: Arc<BufferPool>,
    desc: TupleDesc,
    count: Option<i32>,
    emitted: bool,
    open: bool,
}

impl Delete {
    pub fn new(txn: TransactionId, child: Box<dyn OpIterator>, pool: Arc<BufferPool>) -> Self {
        Self {
            txn,
            child,
            pool,
            desc: TupleDesc::new(vec![(FieldType::Int, "delete_count".to_string())]),
            count: None,
            emitted: false,
            open: false,
        }
    }

    fn run(&mut self) -> DbResult<i32> {
        if let Some(count) = self.count {
            return Ok(count);
        }

        let mut count = 0;
        while self.child.has_next()? {
            let tuple = self.child.next()?;
            self.pool.delete_tuple(self.txn, &tuple)?;
            count += 1;
        }
        self.count = Some(count);
        Ok(count)
    }
}

impl OpIterator for Delete {
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
