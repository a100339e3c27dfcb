use std::fmt;

use crate::file::PageId;

use super::error::{RecordError, RecordResult};
use super::value::Field;

/// Storage location of one tuple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId {
    pub page: PageId,
    pub slot: usize,
}

impl RecordId {
    pub fn new(page: PageId, slot: usize) -> Self {
        Self { page, slot }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.page, self.slot)
    }
}

/// A row of field values, optionally placed on a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple {
    fields: Vec<Field>,
    record_id: Option<RecordId>,
}

impl Tuple {
    pub fn new(fields: Vec<Field>) -> Self {
        Self {
            fields,
            record_id: None,
        }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn into_fields(self) -> Vec<Field> {
        self.fields
    }

    pub fn field(&self, i: usize) -> RecordResult<&Field> {
        self.fields
            .get(i)
            .ok_or_else(|| RecordError::NoSuchField(format!("index {}", i)))
    }

    pub fn set_field(&mut self, i: usize, value: Field) -> RecordResult<()> {
        let slot = self
            .fields
            .get_mut(i)
            .ok_or_else(|| RecordError::NoSuchField(format!("index {}", i)))?;
        *slot = value;
        Ok(())
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, rid: Option<RecordId>) {
        self.record_id = rid;
    }

    /// Concatenation of two tuples; the result is not placed anywhere
    pub fn merge(&self, other: &Tuple) -> Tuple {
        let mut fields = Vec::with_capacity(self.fields.len() + other.fields.len());
        fields.extend_from_slice(&self.fields);
        fields.extend_from_slice(&other.fields);
        Tuple::new(fields)
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, "\t")?;
            }
            write!(f, "{}", field)?;
        }
        Ok(())
    }
}
