//! The forward-growing array of fixed-width record slots starting just
//! after the header.
//!
//! Each slot holds a key-part (inline key bytes or a `u16` position
//! pointer into the data heap), a value-part (inline value bytes, a `u16`
//! position pointer, or — internal nodes — a `u64` child pointer), and an
//! optional one-byte record-flags field. This module is pure address
//! arithmetic and byte shifting; encoding/decoding of the key/value bytes
//! themselves goes through `Encoder` via a `PageCursor` positioned at the
//! offsets this module computes.

use crate::codec::{move_data, read_u16, read_u64, write_u16, write_u64};
use crate::errors::NodeError;

#[derive(Debug, Clone, Copy)]
pub struct SlotLayout {
    pub keys_inline: bool,
    pub key_part_size: usize,
    pub values_inline: bool,
    pub value_part_size: usize,
    pub has_record_flags: bool,
    pub record_size: usize,
    pub records_offset: usize,
}

impl SlotLayout {
    pub fn slot_offset(&self, index: usize) -> usize {
        self.records_offset + index * self.record_size
    }

    pub fn key_part_offset(&self, index: usize) -> usize {
        self.slot_offset(index)
    }

    pub fn value_part_offset(&self, index: usize) -> usize {
        self.slot_offset(index) + self.key_part_size
    }

    pub fn flags_offset(&self, index: usize) -> usize {
        self.value_part_offset(index) + self.value_part_size
    }

    /// First byte past the live slot area for `size` slots — where the
    /// marker array (internal nodes) or the data heap boundary check
    /// begins.
    pub fn slots_end(&self, size: usize) -> usize {
        self.slot_offset(size)
    }
}

pub fn read_position(buf: &[u8], off: usize) -> Result<u16, NodeError> {
    read_u16(buf, off)
}

pub fn write_position(buf: &mut [u8], off: usize, v: u16) -> Result<(), NodeError> {
    write_u16(buf, off, v)
}

pub fn read_pointer(buf: &[u8], off: usize) -> Result<u64, NodeError> {
    read_u64(buf, off)
}

pub fn write_pointer(buf: &mut [u8], off: usize, v: u64) -> Result<(), NodeError> {
    write_u64(buf, off, v)
}

/// Shift the tail of the slot array (and anything stored contiguously
/// after it, e.g. the marker array) right by one record to make room for
/// an insertion at `at`. Mirrors spec.md §4.2 step 2: slots and markers
/// sit back to back, so both move in one `copy_within`.
pub fn shift_tail_right_one(
    buf: &mut [u8],
    layout: &SlotLayout,
    at: usize,
    size: usize,
    trailing_bytes: usize,
) -> Result<(), NodeError> {
    if at >= size {
        return Ok(());
    }
    let src = layout.slot_offset(at);
    let region_len = (size - at) * layout.record_size + trailing_bytes;
    let dst = src + layout.record_size;
    move_data(buf, src, dst, region_len)
}

/// Shift the tail left by one record after removing the slot at `at`.
pub fn shift_tail_left_one(
    buf: &mut [u8],
    layout: &SlotLayout,
    at: usize,
    size: usize,
    trailing_bytes: usize,
) -> Result<(), NodeError> {
    if at + 1 >= size {
        return Ok(());
    }
    let src = layout.slot_offset(at + 1);
    let region_len = (size - at - 1) * layout.record_size + trailing_bytes;
    let dst = layout.slot_offset(at);
    move_data(buf, src, dst, region_len)
}
