use super::OpIterator;
use crate::error::{DbError, DbResult};
use crate::record::{Tuple, TupleDesc};

/// Iterator over tuples held in memory
pub struct TupleIterator {
    desc: TupleDesc,
    tuples: Vec<Tuple>,
    position: Option<usize>,
}

impl TupleIterator {
    pub fn new(desc: TupleDesc, tuples: Vec<Tuple>) -> Self {
        Self {
            desc,
            tuples,
            position: None,
        }
    }

    fn position(&self) -> DbResult<usize> {
        self.position.ok_or(DbError::IteratorNotOpen)
    }
}

impl OpIterator for TupleIterator {
    fn open(&mut self) -> DbResult<()> {
        if self.position.is_some() {
            return Err(DbError::IteratorAlreadyOpen);
        }
        self.position = Some(0);
        Ok(())
    }

    fn has_next(&mut self) -> DbResult<bool> {
        Ok(self.position()? < self.tuples.len())
    }

    fn next(&mut self) -> DbResult<Tuple> {
        let pos = self.position()?;
        let tuple = self.tuples.get(pos).cloned().ok_or(DbError::NoSuchElement)?;
        self.position = Some(pos + 1);
        Ok(tuple)
    }

    fn rewind(&mut self) -> DbResult<()> {
        self.close();
        self.open()
    }

    fn close(&mut self) {
        self.position = None;
    }

    fn tuple_desc(&self) -> &TupleDesc {
        &self.desc
    }
}
