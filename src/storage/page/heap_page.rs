//! Slotted heap page.
//!
//! Layout of one page of `page_size` bytes:
//!
//! ```text
//! [header bitmap: ceil(N / 8) bytes][slot 0][slot 1] ... [slot N-1][zero padding]
//! ```
//!
//! where `N = floor(page_size * 8 / (tuple_size * 8 + 1))`. Bit `i % 8` (least
//! significant first) of header byte `i / 8` is set when slot `i` holds a tuple.

use crate::access::{RecordId, Tuple, TupleDesc};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{Page, PageId};
use crate::transaction::TransactionId;
use std::sync::Arc;

/// Number of tuple slots that fit in one page.
pub fn slots_per_page(page_size: usize, tuple_size: usize) -> usize {
    (page_size * 8) / (tuple_size * 8 + 1)
}

/// Number of header bytes needed for `num_slots` occupancy bits.
pub fn header_size(num_slots: usize) -> usize {
    num_slots.div_ceil(8)
}

#[derive(Debug, Clone)]
pub struct HeapPage {
    pid: PageId,
    desc: Arc<TupleDesc>,
    page_size: usize,
    header: Vec<u8>,
    tuples: Vec<Option<Tuple>>,
    dirty: Option<TransactionId>,
}

impl HeapPage {
    /// Bytes of a page with every slot empty.
    pub fn empty_page_data(page_size: usize) -> Vec<u8> {
        vec![0u8; page_size]
    }

    /// Decodes a page from exactly `page_size` bytes.
    pub fn from_bytes(pid: PageId, desc: Arc<TupleDesc>, data: &[u8]) -> StorageResult<Self> {
        let page_size = data.len();
        let num_slots = slots_per_page(page_size, desc.size());
        let header_len = header_size(num_slots);
        if num_slots == 0 {
            return Err(StorageError::Corrupted(format!(
                "{} bytes cannot hold a {} byte tuple",
                page_size,
                desc.size()
            )));
        }

        let header = data[..header_len].to_vec();
        let mut tuples = Vec::with_capacity(num_slots);
        let tuple_size = desc.size();
        for slot in 0..num_slots {
            if header[slot / 8] & (1 << (slot % 8)) == 0 {
                tuples.push(None);
                continue;
            }
            let start = header_len + slot * tuple_size;
            let mut tuple = Tuple::parse(desc.clone(), &data[start..start + tuple_size])?;
            tuple.set_record_id(Some(RecordId::new(pid, slot)));
            tuples.push(Some(tuple));
        }

        Ok(Self {
            pid,
            desc,
            page_size,
            header,
            tuples,
            dirty: None,
        })
    }

    pub fn num_slots(&self) -> usize {
        self.tuples.len()
    }

    pub fn tuple_desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    pub fn is_slot_used(&self, slot: usize) -> bool {
        slot < self.num_slots() && self.header[slot / 8] & (1 << (slot % 8)) != 0
    }

    fn set_slot(&mut self, slot: usize, used: bool) {
        if used {
            self.header[slot / 8] |= 1 << (slot % 8);
        } else {
            self.header[slot / 8] &= !(1 << (slot % 8));
        }
    }

    pub fn num_empty_slots(&self) -> usize {
        (0..self.num_slots())
            .filter(|&slot| !self.is_slot_used(slot))
            .count()
    }

    /// Places `tuple` in the lowest free slot and stamps its record id.
    pub fn insert_tuple(&mut self, tuple: &mut Tuple) -> StorageResult<RecordId> {
        if tuple.desc().as_ref() != self.desc.as_ref() {
            return Err(StorageError::SchemaMismatch(
                "tuple descriptor differs from page descriptor".to_string(),
            ));
        }
        let slot = (0..self.num_slots())
            .find(|&slot| !self.is_slot_used(slot))
            .ok_or(StorageError::PageFull(self.pid))?;

        let record_id = RecordId::new(self.pid, slot);
        tuple.set_record_id(Some(record_id));
        self.set_slot(slot, true);
        self.tuples[slot] = Some(tuple.clone());
        Ok(record_id)
    }

    /// Clears the slot named by the tuple's record id.
    pub fn delete_tuple(&mut self, tuple: &Tuple) -> StorageResult<()> {
        let record_id = tuple.record_id().ok_or(StorageError::MissingRecordId)?;
        if record_id.page_id != self.pid {
            return Err(StorageError::ForeignTuple {
                record_id,
                table_id: self.pid.table_id,
            });
        }
        self.delete_slot(record_id.slot)
    }

    pub fn delete_slot(&mut self, slot: usize) -> StorageResult<()> {
        if slot >= self.num_slots() {
            return Err(StorageError::InvalidSlot {
                slot,
                max: self.num_slots(),
            });
        }
        if !self.is_slot_used(slot) {
            return Err(StorageError::SlotEmpty {
                page_id: self.pid,
                slot,
            });
        }
        self.set_slot(slot, false);
        self.tuples[slot] = None;
        Ok(())
    }

    pub fn tuple(&self, slot: usize) -> Option<&Tuple> {
        self.tuples.get(slot).and_then(|t| t.as_ref())
    }

    /// Occupied tuples in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Tuple> {
        self.tuples.iter().filter_map(|t| t.as_ref())
    }
}

impl Page for HeapPage {
    fn id(&self) -> PageId {
        self.pid
    }

    fn is_dirty(&self) -> Option<TransactionId> {
        self.dirty
    }

    fn mark_dirty(&mut self, tid: Option<TransactionId>) {
        self.dirty = tid;
    }

    fn page_data(&self) -> Vec<u8> {
        let tuple_size = self.desc.size();
        let mut data = Vec::with_capacity(self.page_size);
        data.extend_from_slice(&self.header);
        for tuple in &self.tuples {
            match tuple {
                Some(t) => t.serialize(&mut data),
                None => data.resize(data.len() + tuple_size, 0),
            }
        }
        data.resize(self.page_size, 0);
        data
    }
}
