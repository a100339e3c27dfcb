mod aggregate;
mod delete;
mod filter;
mod insert;
mod join;
mod seq_scan;
mod tuple_iterator;

pub use aggregate::{Aggregate, AggregateOp, Aggregator, IntegerAggregator, StringAggregator};
pub use delete::Delete;
pub use filter::{Filter, Predicate};
pub use insert::Insert;
pub use join::{Join, JoinPredicate};
pub use seq_scan::SeqScan;
pub use tuple_iterator::TupleIterator;

use crate::error::{DbError, DbResult};
use crate::record::{Tuple, TupleDesc};

/// Pull-based tuple source shared by scans and operators
///
/// An iterator starts closed. `open` fails if it is already open, and
/// `has_next`/`next` fail unless it is open. `has_next` never moves the
/// position; `next` fails with [`DbError::NoSuchElement`] once the source is
/// exhausted. `rewind` behaves like `close` followed by `open`, and `close`
/// may be called any number of times.
pub trait OpIterator {
    fn open(&mut self) -> DbResult<()>;

    fn has_next(&mut self) -> DbResult<bool>;

    fn next(&mut self) -> DbResult<Tuple>;

    fn rewind(&mut self) -> DbResult<()>;

    fn close(&mut self);

    /// Schema of the tuples this iterator produces
    fn tuple_desc(&self) -> &TupleDesc;
}

/// Open `op`, drain it and close it again
pub fn collect_tuples(op: &mut dyn OpIterator) -> DbResult<Vec<Tuple>> {
    op.open()?;
    let mut tuples = Vec::new();
    let drained = drain(op, &mut tuples);
    op.close();
    drained.map(|()| tuples)
}

fn drain(op: &mut dyn OpIterator, out: &mut Vec<Tuple>) -> DbResult<()> {
    while op.has_next()? {
        out.push(op.next()?);
    }
    Ok(())
}

/// Open flag plus one tuple of lookahead, for operators that compute their
/// next output on demand
#[derive(Debug, Default)]
struct OperatorState {
    open: bool,
    peeked: Option<Tuple>,
}

impl OperatorState {
    fn open(&mut self) -> DbResult<()> {
        if self.open {
            return Err(DbError::IteratorAlreadyOpen);
        }
        self.open = true;
        self.peeked = None;
        Ok(())
    }

    fn ensure_open(&self) -> DbResult<()> {
        if !self.open {
            return Err(DbError::IteratorNotOpen);
        }
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
        self.peeked = None;
    }
}
