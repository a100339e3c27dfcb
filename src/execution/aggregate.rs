use std::collections::BTreeMap;
use std::fmt;

use super::{OpIterator, TupleIterator};
use crate::error::{DbError, DbResult};
use crate::record::{Field, FieldType, Tuple, TupleDesc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    Min,
    Max,
    Sum,
    Avg,
    Count,
}

impl fmt::Display for AggregateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AggregateOp::Min => "min",
            AggregateOp::Max => "max",
            AggregateOp::Sum => "sum",
            AggregateOp::Avg => "avg",
            AggregateOp::Count => "count",
        };
        f.write_str(s)
    }
}

/// Folds tuples into per-group aggregate values
pub trait Aggregator {
    /// Add one tuple to the group its group-by field selects
    fn merge_tuple(&mut self, tuple: &Tuple) -> DbResult<()>;

    /// One tuple per group in group key order: `(group, value)`, or just
    /// `(value)` without grouping; errors when a value does not fit an
    /// integer field
    fn results(&self) -> DbResult<Vec<Tuple>>;
}

/// Group key; `None` when there is no grouping
type GroupKey = Option<Field>;

fn group_key(gfield: Option<usize>, tuple: &Tuple) -> DbResult<GroupKey> {
    match gfield {
        Some(i) => Ok(Some(tuple.field(i)?.clone())),
        None => Ok(None),
    }
}

fn result_tuple(key: &GroupKey, op: AggregateOp, value: i64) -> DbResult<Tuple> {
    let value = i32::try_from(value).map_err(|_| {
        DbError::AggregateOverflow(match key {
            Some(group) => format!("{} of group {} is {}", op, group, value),
            None => format!("{} is {}", op, value),
        })
    })?;

    let mut fields = Vec::with_capacity(2);
    if let Some(group) = key {
        fields.push(group.clone());
    }
    fields.push(Field::Int(value));
    Ok(Tuple::new(fields))
}

/// Running state of one integer group
#[derive(Debug, Clone, Copy)]
struct IntAccumulator {
    value: i64,
    count: i64,
}

/// MIN, MAX, SUM, AVG and COUNT over an integer field
///
/// AVG truncates toward zero like integer division.
pub struct IntegerAggregator {
    gfield: Option<usize>,
    afield: usize,
    op: AggregateOp,
    groups: BTreeMap<GroupKey, IntAccumulator>,
}

impl IntegerAggregator {
    pub fn new(gfield: Option<usize>, afield: usize, op: AggregateOp) -> Self {
        Self {
            gfield,
            afield,
            op,
            groups: BTreeMap::new(),
        }
    }
}

impl Aggregator for IntegerAggregator {
    fn merge_tuple(&mut self, tuple: &Tuple) -> DbResult<()> {
        let key = group_key(self.gfield, tuple)?;
        let value = tuple.field(self.afield)?.as_int().ok_or_else(|| {
            DbError::SchemaMismatch(format!("field {} is not an integer", self.afield))
        })? as i64;

        let op = self.op;
        self.groups
            .entry(key)
            .and_modify(|acc| {
                acc.count += 1;
                acc.value = match op {
                    AggregateOp::Min => acc.value.min(value),
                    AggregateOp::Max => acc.value.max(value),
                    AggregateOp::Sum | AggregateOp::Avg => acc.value.saturating_add(value),
                    AggregateOp::Count => acc.count,
                };
            })
            .or_insert(IntAccumulator {
                value: if op == AggregateOp::Count { 1 } else { value },
                count: 1,
            });
        Ok(())
    }

    fn results(&self) -> DbResult<Vec<Tuple>> {
        let mut out = self
            .groups
            .iter()
            .map(|(key, acc)| {
                let value = match self.op {
                    AggregateOp::Avg => acc.value / acc.count,
                    _ => acc.value,
                };
                result_tuple(key, self.op, value)
            })
            .collect::<DbResult<Vec<_>>>()?;

        if out.is_empty() && self.gfield.is_none() && self.op == AggregateOp::Count {
            out.push(result_tuple(&None, self.op, 0)?);
        }
        Ok(out)
    }
}

/// COUNT over a string field
pub struct StringAggregator {
    gfield: Option<usize>,
    groups: BTreeMap<GroupKey, i64>,
}

impl StringAggregator {
    pub fn new(gfield: Option<usize>, op: AggregateOp) -> DbResult<Self> {
        if op != AggregateOp::Count {
            return Err(DbError::UnsupportedAggregate(format!(
                "{} over a string field",
                op
            )));
        }

        Ok(Self {
            gfield,
            groups: BTreeMap::new(),
        })
    }
}

impl Aggregator for StringAggregator {
    fn merge_tuple(&mut self, tuple: &Tuple) -> DbResult<()> {
        let key = group_key(self.gfield, tuple)?;
        *self.groups.entry(key).or_insert(0) += 1;
        Ok(())
    }

    fn results(&self) -> DbResult<Vec<Tuple>> {
        let mut out = self
            .groups
            .iter()
            .map(|(key, count)| result_tuple(key, AggregateOp::Count, *count))
            .collect::<DbResult<Vec<_>>>()?;

        if out.is_empty() && self.gfield.is_none() {
            out.push(result_tuple(&None, AggregateOp::Count, 0)?);
        }
        Ok(out)
    }
}

/// Computes one aggregate over its child, optionally grouped by one field
///
/// The child is drained when the operator is opened; groups come out in
/// ascending key order.
pub struct Aggregate {
    child: Box<dyn OpIterator>,
    afield: usize,
    gfield: Option<usize>,
    op: AggregateOp,
    desc: TupleDesc,
    results: Option<TupleIterator>,
}

impl Aggregate {
    pub fn new(
        child: Box<dyn OpIterator>,
        afield: usize,
        gfield: Option<usize>,
        op: AggregateOp,
    ) -> DbResult<Self> {
        let child_desc = child.tuple_desc();
        let afield_type = child_desc.field_type(afield)?;
        if matches!(afield_type, FieldType::Str(_)) && op != AggregateOp::Count {
            return Err(DbError::UnsupportedAggregate(format!(
                "{} over a string field",
                op
            )));
        }

        let mut items = Vec::with_capacity(2);
        if let Some(g) = gfield {
            items.push((child_desc.field_type(g)?, child_desc.field_name(g)?.to_string()));
        }
        items.push((
            FieldType::Int,
            format!("{}({})", op, child_desc.field_name(afield)?),
        ));

        Ok(Self {
            child,
            afield,
            gfield,
            op,
            desc: TupleDesc::new(items),
            results: None,
        })
    }

    pub fn group_field(&self) -> Option<usize> {
        self.gfield
    }

    pub fn aggregate_field(&self) -> usize {
        self.afield
    }

    pub fn aggregate_op(&self) -> AggregateOp {
        self.op
    }

    fn aggregator(&self) -> DbResult<Box<dyn Aggregator>> {
        match self.child.tuple_desc().field_type(self.afield)? {
            FieldType::Int => Ok(Box::new(IntegerAggregator::new(
                self.gfield,
                self.afield,
                self.op,
            ))),
            FieldType::Str(_) => Ok(Box::new(StringAggregator::new(self.gfield, self.op)?)),
        }
    }

    /// Drain the child into `aggregator`
    fn pre_pass(&mut self, aggregator: &mut dyn Aggregator) -> DbResult<()> {
        let mut merged = 0usize;
        while self.child.has_next()? {
            match self.child.next() {
                Ok(tuple) => aggregator.merge_tuple(&tuple)?,
                Err(DbError::NoSuchElement) => {
                    eprintln!(
                        "Warning: aggregate input ended early after {} tuples",
                        merged
                    );
                    break;
                }
                Err(e) => return Err(e),
            }
            merged += 1;
        }
        Ok(())
    }

    fn results_mut(&mut self) -> DbResult<&mut TupleIterator> {
        self.results.as_mut().ok_or(DbError::IteratorNotOpen)
    }
}

impl OpIterator for Aggregate {
    fn open(&mut self) -> DbResult<()> {
        if self.results.is_some() {
            return Err(DbError::IteratorAlreadyOpen);
        }

        let mut aggregator = self.aggregator()?;
        self.child.open()?;
        let merged = self.pre_pass(&mut *aggregator);
        self.child.close();
        merged?;

        let mut results = TupleIterator::new(self.desc.clone(), aggregator.results()?);
        results.open()?;
        self.results = Some(results);
        Ok(())
    }

    fn has_next(&mut self) -> DbResult<bool> {
        self.results_mut()?.has_next()
    }

    fn next(&mut self) -> DbResult<Tuple> {
        self.results_mut()?.next()
    }

    fn rewind(&mut self) -> DbResult<()> {
        self.results_mut()?.rewind()
    }

    fn close(&mut self) {
        self.results = None;
    }

    fn tuple_desc(&self) -> &TupleDesc {
        &self.desc
    }
}
