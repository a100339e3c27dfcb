use std::sync::Arc;

use super::error::{RecordError, RecordResult};
use super::schema::TupleDesc;
use super::tuple::{RecordId, Tuple};
use super::value::Field;
use crate::file::PageId;
use crate::lock::TransactionId;

/// Decoded heap page: a slot bitmap followed by fixed-size tuple slots
///
/// Layout: `[header bitmap][num_slots * slot_size][padding]`. Bit `i` of the
/// bitmap lives in byte `i / 8` at position `i % 8` (least significant first)
/// and is set iff slot `i` holds a live tuple. The raw page bytes are kept as
/// read, so padding and freed slot contents survive a write back unchanged.
#[derive(Debug, Clone)]
pub struct HeapPage {
    id: PageId,
    desc: Arc<TupleDesc>,
    num_slots: usize,
    slot_size: usize,
    header_size: usize,
    data: Vec<u8>,
    dirtied_by: Option<TransactionId>,
}

impl HeapPage {
    /// Calculate the number of slots for a page and tuple size
    pub fn calculate_slot_count(page_size: usize, slot_size: usize) -> usize {
        if slot_size == 0 {
            return 0;
        }

        // Each slot costs slot_size bytes plus one bitmap bit:
        // num_slots * (slot_size * 8 + 1) <= page_size * 8
        (page_size * 8) / (slot_size * 8 + 1)
    }

    /// Bytes of bitmap needed for `num_slots` slots
    pub fn calculate_header_size(num_slots: usize) -> usize {
        num_slots.div_ceil(8)
    }

    /// All-zero bytes of an empty page
    pub fn empty_page_data(page_size: usize) -> Vec<u8> {
        vec![0u8; page_size]
    }

    /// Decode a page from its on-disk bytes
    pub fn new(id: PageId, data: Vec<u8>, desc: Arc<TupleDesc>) -> RecordResult<Self> {
        let slot_size = desc.byte_size();
        let num_slots = Self::calculate_slot_count(data.len(), slot_size);
        if num_slots == 0 {
            return Err(RecordError::SchemaMismatch(format!(
                "Tuple size {} does not fit in a {} byte page",
                slot_size,
                data.len()
            )));
        }

        Ok(Self {
            id,
            desc,
            num_slots,
            slot_size,
            header_size: Self::calculate_header_size(num_slots),
            data,
            dirtied_by: None,
        })
    }

    pub fn id(&self) -> PageId {
        self.id
    }

    pub fn tuple_desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    /// Encoded page bytes, exactly one page long
    pub fn page_data(&self) -> &[u8] {
        &self.data
    }

    /// Transaction that last dirtied this page, if it is dirty
    pub fn is_dirty(&self) -> Option<TransactionId> {
        self.dirtied_by
    }

    pub fn mark_dirty(&mut self, dirty: bool, txn: TransactionId) {
        self.dirtied_by = dirty.then_some(txn);
    }

    pub fn mark_clean(&mut self) {
        self.dirtied_by = None;
    }

    pub fn is_slot_used(&self, slot: usize) -> bool {
        if slot >= self.num_slots {
            return false;
        }
        self.data[slot / 8] & (1 << (slot % 8)) != 0
    }

    fn set_slot(&mut self, slot: usize, used: bool) {
        let mask = 1u8 << (slot % 8);
        if used {
            self.data[slot / 8] |= mask;
        } else {
            self.data[slot / 8] &= !mask;
        }
    }

    pub fn num_empty_slots(&self) -> usize {
        (0..self.num_slots).filter(|&s| !self.is_slot_used(s)).count()
    }

    /// First used slot at or after `from`
    pub fn next_used_slot(&self, from: usize) -> Option<usize> {
        (from..self.num_slots).find(|&s| self.is_slot_used(s))
    }

    fn slot_range(&self, slot: usize) -> std::ops::Range<usize> {
        let start = self.header_size + slot * self.slot_size;
        start..start + self.slot_size
    }

    /// Decode the tuple stored in a used slot
    pub fn tuple(&self, slot: usize) -> RecordResult<Tuple> {
        if slot >= self.num_slots {
            return Err(RecordError::InvalidSlot(self.id, slot));
        }
        if !self.is_slot_used(slot) {
            return Err(RecordError::SlotNotUsed(self.id, slot));
        }

        let bytes = &self.data[self.slot_range(slot)];
        let mut fields = Vec::with_capacity(self.desc.num_fields());
        let mut offset = 0;
        for item in self.desc.items() {
            let size = item.field_type.size();
            fields.push(Field::deserialize(
                &bytes[offset..offset + size],
                &item.field_type,
            )?);
            offset += size;
        }

        let mut tuple = Tuple::new(fields);
        tuple.set_record_id(Some(RecordId::new(self.id, slot)));
        Ok(tuple)
    }

    /// Store `tuple` in the first free slot and assign its record id
    pub fn insert_tuple(&mut self, tuple: &mut Tuple) -> RecordResult<usize> {
        self.desc.validate(tuple.fields())?;

        let slot = (0..self.num_slots)
            .find(|&s| !self.is_slot_used(s))
            .ok_or(RecordError::PageFull(self.id))?;

        let range = self.slot_range(slot);
        let mut offset = range.start;
        for (field, item) in tuple.fields().iter().zip(self.desc.items()) {
            let size = item.field_type.size();
            field.serialize_into(&item.field_type, &mut self.data[offset..offset + size])?;
            offset += size;
        }

        self.set_slot(slot, true);
        tuple.set_record_id(Some(RecordId::new(self.id, slot)));
        Ok(slot)
    }

    /// Free the slot named by `tuple`'s record id
    pub fn delete_tuple(&mut self, tuple: &Tuple) -> RecordResult<()> {
        let rid = tuple.record_id().ok_or(RecordError::MissingRecordId)?;
        if rid.page != self.id || rid.slot >= self.num_slots {
            return Err(RecordError::InvalidSlot(rid.page, rid.slot));
        }
        if !self.is_slot_used(rid.slot) {
            return Err(RecordError::SlotNotUsed(rid.page, rid.slot));
        }

        self.set_slot(rid.slot, false);
        Ok(())
    }

    /// Iterate over the live tuples of this page
    pub fn iter(&self) -> HeapPageIter<'_> {
        HeapPageIter {
            page: self,
            next_slot: 0,
        }
    }
}

impl PartialEq for HeapPage {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && *self.desc == *other.desc && self.data == other.data
    }
}

/// Iterator over the live tuples of one page, in slot order
pub struct HeapPageIter<'a> {
    page: &'a HeapPage,
    next_slot: usize,
}

impl Iterator for HeapPageIter<'_> {
    type Item = RecordResult<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.page.next_used_slot(self.next_slot)?;
        self.next_slot = slot + 1;
        Some(self.page.tuple(slot))
    }
}
