use std::fmt;

use super::{OpIterator, OperatorState};
use crate::error::{DbError, DbResult};
use crate::record::{CompareOp, Tuple, TupleDesc};

/// Compares a field of a left tuple with a field of a right tuple
#[derive(Debug, Clone)]
pub struct JoinPredicate {
    field1: usize,
    op: CompareOp,
    field2: usize,
}

impl JoinPredicate {
    pub fn new(field1: usize, op: CompareOp, field2: usize) -> Self {
        Self { field1, op, field2 }
    }

    pub fn field1(&self) -> usize {
        self.field1
    }

    pub fn field2(&self) -> usize {
        self.field2
    }

    pub fn op(&self) -> CompareOp {
        self.op
    }

    pub fn filter(&self, left: &Tuple, right: &Tuple) -> DbResult<bool> {
        Ok(left
            .field(self.field1)?
            .compare(self.op, right.field(self.field2)?))
    }
}

impl fmt::Display for JoinPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "left.f{} {} right.f{}", self.field1, self.op, self.field2)
    }
}

/// Nested-loops join; output tuples are the left fields followed by the right
pub struct Join {
    predicate: JoinPredicate,
    left: Box<dyn OpIterator>,
    right: Box<dyn OpIterator>,
    desc: TupleDesc,
    /// Left tuple the right side is currently being matched against
    current: Option<Tuple>,
    state: OperatorState,
}

impl Join {
    pub fn new(predicate: JoinPredicate, left: Box<dyn OpIterator>, right: Box<dyn OpIterator>) -> Self {
        let desc = left.tuple_desc().merge(right.tuple_desc());
        Self {
            predicate,
            left,
            right,
            desc,
            current: None,
            state: OperatorState::default(),
        }
    }

    pub fn predicate(&self) -> &JoinPredicate {
        &self.predicate
    }

    fn fetch_next(&mut self) -> DbResult<Option<Tuple>> {
        loop {
            let left = match self.current.take() {
                Some(tuple) => tuple,
                None => {
                    if !self.left.has_next()? {
                        return Ok(None);
                    }
                    self.right.rewind()?;
                    self.left.next()?
                }
            };

            while self.right.has_next()? {
                let right = self.right.next()?;
                if self.predicate.filter(&left, &right)? {
                    let joined = left.merge(&right);
                    self.current = Some(left);
                    return Ok(Some(joined));
                }
            }
        }
    }
}

impl OpIterator for Join {
    fn open(&mut self) -> DbResult<()> {
        self.state.open()?;
        self.current = None;
        self.left.open()?;
        self.right.open()
    }

    fn has_next(&mut self) -> DbResult<bool> {
        self.state.ensure_open()?;
        if self.state.peeked.is_none() {
            self.state.peeked = self.fetch_next()?;
        }
        Ok(self.state.peeked.is_some())
    }

    fn next(&mut self) -> DbResult<Tuple> {
        self.has_next()?;
        self.state.peeked.take().ok_or(DbError::NoSuchElement)
    }

    fn rewind(&mut self) -> DbResult<()> {
        self.state.ensure_open()?;
        self.state.peeked = None;
        self.current = None;
        self.left.rewind()?;
        self.right.rewind()
    }

    fn close(&mut self) {
        self.left.close();
        self.right.close();
        self.current = None;
        self.state.close();
    }

    fn tuple_desc(&self) -> &TupleDesc {
        &self.desc
    }
}
