use std::fmt;
use std::sync::Arc;

use super::{IntHistogram, NUM_HIST_BINS, StringHistogram};
use crate::database::Database;
use crate::error::{DbError, DbResult};
use crate::execution::OpIterator;
use crate::file::{BufferPool, TableId};
use crate::lock::TransactionId;
use crate::record::{CompareOp, Field, FieldType, HeapFile, RecordError, TupleDesc};

#[derive(Debug, Clone)]
enum ColumnHistogram {
    Int(IntHistogram),
    Str(StringHistogram),
}

impl fmt::Display for ColumnHistogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnHistogram::Int(h) => fmt::Display::fmt(h, f),
            ColumnHistogram::Str(h) => fmt::Display::fmt(h, f),
        }
    }
}

/// Per-column histograms and size of one table, for cost estimation
#[derive(Debug, Clone)]
pub struct TableStats {
    table: TableId,
    desc: Arc<TupleDesc>,
    io_cost_per_page: usize,
    num_pages: usize,
    total_tuples: usize,
    histograms: Vec<ColumnHistogram>,
}

impl TableStats {
    /// Scan `table` twice inside a private transaction: once for the range
    /// of every integer column, once to fill the histograms
    pub fn new(table: TableId, io_cost_per_page: usize, db: &Database) -> DbResult<Self> {
        let file = db.catalog().file(table)?;
        let txn = db.begin();

        match Self::compute(&file, io_cost_per_page, db.buffer_pool(), txn) {
            Ok(stats) => {
                db.commit(txn)?;
                Ok(stats)
            }
            Err(e) => {
                if let Err(abort_err) = db.abort(txn) {
                    eprintln!("Warning: failed to abort statistics scan of {}: {}", table, abort_err);
                }
                Err(e)
            }
        }
    }

    fn compute(
        file: &Arc<HeapFile>,
        io_cost_per_page: usize,
        pool: &Arc<BufferPool>,
        txn: TransactionId,
    ) -> DbResult<Self> {
        let desc = Arc::clone(file.tuple_desc());
        let mut scan = file.iterator(txn, Arc::clone(pool));

        let mut ranges: Vec<Option<(i32, i32)>> = vec![None; desc.num_fields()];
        let mut total_tuples = 0;
        scan.open()?;
        while scan.has_next()? {
            let tuple = scan.next()?;
            total_tuples += 1;
            for (range, field) in ranges.iter_mut().zip(tuple.fields()) {
                if let Field::Int(v) = field {
                    *range = Some(match *range {
                        Some((lo, hi)) => (lo.min(*v), hi.max(*v)),
                        None => (*v, *v),
                    });
                }
            }
        }

        let mut histograms: Vec<ColumnHistogram> = desc
            .items()
            .iter()
            .zip(&ranges)
            .map(|(item, range)| match item.field_type {
                FieldType::Int => {
                    let (lo, hi) = range.unwrap_or((0, 0));
                    ColumnHistogram::Int(IntHistogram::new(NUM_HIST_BINS, lo, hi))
                }
                FieldType::Str(_) => ColumnHistogram::Str(StringHistogram::new(NUM_HIST_BINS)),
            })
            .collect();

        scan.rewind()?;
        while scan.has_next()? {
            let tuple = scan.next()?;
            for (histogram, field) in histograms.iter_mut().zip(tuple.fields()) {
                match (histogram, field) {
                    (ColumnHistogram::Int(h), Field::Int(v)) => h.add_value(*v),
                    (ColumnHistogram::Str(h), Field::Str(s)) => h.add_value(s),
                    _ => {}
                }
            }
        }
        scan.close();

        Ok(Self {
            table: file.id(),
            desc,
            io_cost_per_page,
            num_pages: file.num_pages()?,
            total_tuples,
            histograms,
        })
    }

    pub fn table(&self) -> TableId {
        self.table
    }

    pub fn num_pages(&self) -> usize {
        self.num_pages
    }

    pub fn total_tuples(&self) -> usize {
        self.total_tuples
    }

    /// Cost of reading every page of the table once
    pub fn estimate_scan_cost(&self) -> f64 {
        (self.num_pages * self.io_cost_per_page) as f64
    }

    /// Tuples expected to survive a predicate of the given selectivity
    pub fn estimate_table_cardinality(&self, selectivity: f64) -> usize {
        (selectivity.clamp(0.0, 1.0) * self.total_tuples as f64).floor() as usize
    }

    fn histogram(&self, field: usize) -> DbResult<&ColumnHistogram> {
        self.histograms
            .get(field)
            .ok_or_else(|| RecordError::NoSuchField(format!("#{}", field)).into())
    }

    /// Estimated fraction of tuples satisfying `field op constant`
    pub fn estimate_selectivity(&self, field: usize, op: CompareOp, constant: &Field) -> DbResult<f64> {
        match (self.histogram(field)?, constant) {
            (ColumnHistogram::Int(h), Field::Int(v)) => Ok(h.estimate_selectivity(op, *v)),
            (ColumnHistogram::Str(h), Field::Str(s)) => Ok(h.estimate_selectivity(op, s)),
            (_, constant) => Err(DbError::SchemaMismatch(format!(
                "cannot compare {} with {}",
                self.desc.field_type(field)?,
                constant
            ))),
        }
    }

    /// Expected selectivity of `field op c` for a constant `c` drawn from
    /// the column itself
    pub fn avg_selectivity(&self, field: usize, op: CompareOp) -> DbResult<f64> {
        Ok(match self.histogram(field)? {
            ColumnHistogram::Int(h) => h.avg_selectivity(op),
            ColumnHistogram::Str(h) => h.avg_selectivity(op),
        })
    }
}

impl fmt::Display for TableStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "table {}: {} tuples in {} pages, scan cost {}",
            self.table,
            self.total_tuples,
            self.num_pages,
            self.estimate_scan_cost()
        )?;
        for (item, histogram) in self.desc.items().iter().zip(&self.histograms) {
            writeln!(f, "  {} {}: {}", item.name, item.field_type, histogram)?;
        }
        Ok(())
    }
}
