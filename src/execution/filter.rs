use std::fmt;

use super::{OpIterator, OperatorState};
use crate::error::{DbError, DbResult};
use crate::record::{CompareOp, Field, Tuple, TupleDesc};

/// Compares one field of a tuple against a constant
#[derive(Debug, Clone)]
pub struct Predicate {
    field: usize,
    op: CompareOp,
    operand: Field,
}

impl Predicate {
    pub fn new(field: usize, op: CompareOp, operand: Field) -> Self {
        Self { field, op, operand }
    }

    pub fn field(&self) -> usize {
        self.field
    }

    pub fn op(&self) -> CompareOp {
        self.op
    }

    pub fn operand(&self) -> &Field {
        &self.operand
    }

    pub fn filter(&self, tuple: &Tuple) -> DbResult<bool> {
        Ok(tuple.field(self.field)?.compare(self.op, &self.operand))
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{} {} {}", self.field, self.op, self.operand)
    }
}

/// Passes through the child tuples that satisfy a predicate
pub struct Filter {
    predicate: Predicate,
    child: Box<dyn OpIterator>,
    state: OperatorState,
}

impl Filter {
    pub fn new(predicate: Predicate, child: Box<dyn OpIterator>) -> Self {
        Self {
            predicate,
            child,
            state: OperatorState::default(),
        }
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    fn fetch_next(&mut self) -> DbResult<Option<Tuple>> {
        while self.child.has_next()? {
            let tuple = self.child.next()?;
            if self.predicate.filter(&tuple)? {
                return Ok(Some(tuple));
            }
        }
        Ok(None)
    }
}

impl OpIterator for Filter {
    fn open(&mut self) -> DbResult<()> {
        self.state.open()?;
        self.child.open()
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
        self.child.rewind()
    }

    fn close(&mut self) {
        self.child.close();
        self.state.close();
    }

    fn tuple_desc(&self) -> &TupleDesc {
        self.child.tuple_desc()
    }
}
