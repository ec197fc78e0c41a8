use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};

use crate::common::{
    HeapStoreError, PageId, RecordId, Result, SlotId, TransactionId, PAGE_SIZE,
};
use crate::tuple::{Schema, Tuple};

/// Heap page layout:
///
/// +---------------------------+
/// | Occupancy bitmap          |  ceil(num_slots / 8) bytes
/// +---------------------------+
/// | [slot 0]                  |  tuple_width bytes each
/// | [slot 1]                  |
/// | ...                       |
/// | [slot num_slots - 1]      |
/// +---------------------------+
/// | zero padding              |
/// +---------------------------+
///
/// Bit `i % 8` (least significant first) of byte `i / 8` is set when slot `i`
/// holds a tuple. The bytes of a free slot are ignored on read and written as
/// zeros.
#[derive(Debug, Clone)]
pub struct HeapPage {
    page_id: PageId,
    schema: Arc<Schema>,
    header: Vec<u8>,
    slots: Vec<Option<Tuple>>,
    /// The transaction that last modified the page, while it is dirty
    dirtier: Option<TransactionId>,
}

impl HeapPage {
    /// Decodes a page image read from disk.
    pub fn new(page_id: PageId, data: &[u8], schema: Arc<Schema>) -> Result<Self> {
        if data.len() != PAGE_SIZE {
            return Err(HeapStoreError::InvalidArgument(format!(
                "page image for {} is {} bytes, expected {}",
                page_id,
                data.len(),
                PAGE_SIZE
            )));
        }

        let num_slots = Self::slots_per_page(&schema);
        let header_size = Self::header_size(num_slots);
        let width = schema.tuple_width();
        let header = data[..header_size].to_vec();

        let mut slots = Vec::with_capacity(num_slots);
        for slot in 0..num_slots {
            if header[slot / 8] & (1 << (slot % 8)) == 0 {
                slots.push(None);
                continue;
            }
            let start = header_size + slot * width;
            let mut tuple = Tuple::from_bytes(schema.clone(), &data[start..start + width])
                .ok_or_else(|| {
                    HeapStoreError::SchemaMismatch(format!(
                        "slot {} of {} does not decode as {}",
                        slot, page_id, schema
                    ))
                })?;
            tuple.set_record_id(Some(RecordId::new(page_id, SlotId::new(slot as u16))));
            slots.push(Some(tuple));
        }

        Ok(Self {
            page_id,
            schema,
            header,
            slots,
            dirtier: None,
        })
    }

    /// Returns the image of a page with every slot free.
    pub fn empty_page_data() -> Bytes {
        Bytes::from(vec![0u8; PAGE_SIZE])
    }

    /// Number of tuple slots a page holds for `schema`: each tuple costs its
    /// width plus one header bit.
    pub fn slots_per_page(schema: &Schema) -> usize {
        (PAGE_SIZE * 8) / (schema.tuple_width() * 8 + 1)
    }

    fn header_size(num_slots: usize) -> usize {
        num_slots.div_ceil(8)
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Encodes the page into its on-disk image.
    pub fn page_data(&self) -> Result<Bytes> {
        let width = self.schema.tuple_width();
        let mut buf = BytesMut::with_capacity(PAGE_SIZE);
        buf.put_slice(&self.header);
        for slot in &self.slots {
            match slot {
                Some(tuple) => tuple.write_to(&mut buf)?,
                None => buf.put_bytes(0, width),
            }
        }
        buf.put_bytes(0, PAGE_SIZE - buf.len());
        Ok(buf.freeze())
    }

    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    pub fn num_empty_slots(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_none()).count()
    }

    pub fn is_slot_used(&self, slot: SlotId) -> bool {
        let i = slot.as_usize();
        i < self.slots.len() && self.header[i / 8] & (1 << (i % 8)) != 0
    }

    /// Returns the tuple stored in `slot`, if any.
    pub fn tuple(&self, slot: SlotId) -> Result<Option<&Tuple>> {
        self.slots
            .get(slot.as_usize())
            .map(Option::as_ref)
            .ok_or(HeapStoreError::InvalidSlotId(slot.as_u16()))
    }

    /// Iterates over stored tuples in slot order.
    pub fn tuples(&self) -> impl Iterator<Item = &Tuple> {
        self.slots.iter().flatten()
    }

    /// Stores `tuple` in the first free slot and returns its new record id.
    pub fn insert_tuple(&mut self, mut tuple: Tuple) -> Result<RecordId> {
        if **tuple.schema() != *self.schema {
            return Err(HeapStoreError::SchemaMismatch(format!(
                "tuple schema {} does not match page schema {}",
                tuple.schema(),
                self.schema
            )));
        }
        // Reject values that cannot be encoded before taking a slot
        tuple.to_bytes()?;

        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(HeapStoreError::PageFull(self.page_id))?;

        let record_id = RecordId::new(self.page_id, SlotId::new(slot as u16));
        tuple.set_record_id(Some(record_id));
        self.slots[slot] = Some(tuple);
        self.set_slot_used(slot, true);
        Ok(record_id)
    }

    /// Frees the slot named by the tuple's record id.
    pub fn delete_tuple(&mut self, tuple: &Tuple) -> Result<()> {
        let record_id = tuple.record_id().ok_or_else(|| {
            HeapStoreError::InvalidArgument("tuple has no record id".to_string())
        })?;
        if record_id.page_id != self.page_id {
            return Err(HeapStoreError::TupleNotFound(record_id));
        }
        let slot = record_id.slot_id.as_usize();
        if !self.is_slot_used(record_id.slot_id) {
            return Err(HeapStoreError::TupleNotFound(record_id));
        }

        self.slots[slot] = None;
        self.set_slot_used(slot, false);
        Ok(())
    }

    /// Marks the page dirty on behalf of `tid`, or clean with `None`.
    pub fn mark_dirty(&mut self, tid: Option<TransactionId>) {
        self.dirtier = tid;
    }

    /// Returns the transaction that dirtied this page, if it is dirty.
    pub fn dirtier(&self) -> Option<TransactionId> {
        self.dirtier
    }

    pub fn is_dirty(&self) -> bool {
        self.dirtier.is_some()
    }

    fn set_slot_used(&mut self, slot: usize, used: bool) {
        if used {
            self.header[slot / 8] |= 1 << (slot % 8);
        } else {
            self.header[slot / 8] &= !(1 << (slot % 8));
        }
    }
}
