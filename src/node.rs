//! `NodeOps`: the operations composing every other component into the
//! public surface a caller drives — search, insert, update, delete,
//! split-tail move, and the lazy-initialize/latch-session lifecycle that
//! ties a `Node` to a page buffer for the duration of one latched
//! session.
//!
//! A single struct models both leaf and internal nodes; behavior branches
//! on `isLeaf()` rather than through a type hierarchy (see design notes).

use crate::codec::PageCursor;
use crate::encoding::{EncoderRegistry, PageIndexEncoder, PositionEncoder};
use crate::errors::NodeError;
use crate::header::{NodeHeader, FLAG_HAS_RECORD_FLAGS, FLAG_LEAF, HEADER_SIZE, NONE_POINTER};
use crate::heap;
use crate::latch::{PageLatch, SessionKind};
use crate::marker::{self, Marker, MARKER_SIZE};
use crate::slot::{self, SlotLayout};
use crate::util;
use crate::config::NodeConfig;

const TOMBSTONE_BIT: u8 = 1 << 0;

/// Derived layout constants, recomputed once per latch session (or forced
/// on `create`/`convertToNonLeaf`) rather than carried as compile-time
/// constants, since the key/value encoders are supplied at construction.
#[derive(Debug, Clone, Copy)]
struct Layout {
    keys_inline: bool,
    key_part_size: usize,
    values_inline: bool,
    value_part_size: usize,
    has_record_flags: bool,
    record_size: usize,
    records_offset: usize,
    max_entry_size: usize,
    page_space: usize,
}

impl Layout {
    fn compute<K, V>(registry: &EncoderRegistry<K, V>, config: &NodeConfig, header: &NodeHeader) -> Self {
        let keys_inline =
            registry.key().is_of_bound_size() && registry.key().maximum_size() <= config.inline_keys_threshold;
        let key_part_size = if keys_inline {
            registry.key().maximum_size()
        } else {
            PositionEncoder::SIZE
        };

        let is_leaf = header.is_leaf();
        let values_inline = is_leaf
            && registry.value().is_of_bound_size()
            && registry.value().maximum_size() <= config.inline_values_threshold;
        let value_part_size = if is_leaf {
            if values_inline {
                registry.value().maximum_size()
            } else {
                PositionEncoder::SIZE
            }
        } else {
            PageIndexEncoder::SIZE
        };

        let has_record_flags = is_leaf && header.has_record_flags();
        let record_size = key_part_size + value_part_size + if has_record_flags { 1 } else { 0 };
        let page_space = config.page_size - HEADER_SIZE;

        Self {
            keys_inline,
            key_part_size,
            values_inline,
            value_part_size,
            has_record_flags,
            record_size,
            records_offset: HEADER_SIZE,
            max_entry_size: page_space / 3,
            page_space,
        }
    }

    fn slot_layout(&self) -> SlotLayout {
        SlotLayout {
            keys_inline: self.keys_inline,
            key_part_size: self.key_part_size,
            values_inline: self.values_inline,
            value_part_size: self.value_part_size,
            has_record_flags: self.has_record_flags,
            record_size: self.record_size,
            records_offset: self.records_offset,
        }
    }
}

pub struct Node<'a, K, V> {
    buf: &'a mut [u8],
    header: NodeHeader,
    registry: &'a EncoderRegistry<K, V>,
    config: NodeConfig,
    layout: Layout,
    session_kind: SessionKind,
}

impl<'a, K, V> Node<'a, K, V> {
    // ---- latch session lifecycle -----------------------------------
    //
    // Each `begin_*` stamps the session kind it opened with; each `end_*`
    // checks that stamp before touching the latch, so a mismatched pair
    // (e.g. `begin_read` closed with `end_write`) is rejected as
    // `LatchProtocolMisuse` instead of releasing a lock that was never
    // acquired in that mode.

    pub fn begin_read<L: PageLatch>(
        buf: &'a mut [u8],
        latch: &L,
        registry: &'a EncoderRegistry<K, V>,
        config: NodeConfig,
    ) -> Result<Self, NodeError> {
        config.validate()?;
        latch.acquire_shared();
        let header = NodeHeader::load_eager(buf)?;
        let layout = Layout::compute(registry, &config, &header);
        Ok(Self { buf, header, registry, config, layout, session_kind: SessionKind::Read })
    }

    pub fn end_read<L: PageLatch>(self, latch: &L) -> Result<(), NodeError> {
        if self.session_kind != SessionKind::Read {
            return Err(NodeError::latch_misuse(
                "endRead called on a session that was not opened with beginRead".to_string(),
            ));
        }
        if self.header.is_dirty() {
            return Err(NodeError::latch_misuse(
                "endRead called with unflushed dirty header fields".to_string(),
            ));
        }
        latch.release_shared();
        Ok(())
    }

    pub fn begin_write<L: PageLatch>(
        buf: &'a mut [u8],
        latch: &L,
        registry: &'a EncoderRegistry<K, V>,
        config: NodeConfig,
    ) -> Result<Self, NodeError> {
        config.validate()?;
        latch.acquire_exclusive();
        let header = NodeHeader::load_eager(buf)?;
        let layout = Layout::compute(registry, &config, &header);
        Ok(Self { buf, header, registry, config, layout, session_kind: SessionKind::Write })
    }

    pub fn end_write<L: PageLatch>(mut self, latch: &L) -> Result<(), NodeError> {
        if self.session_kind != SessionKind::Write {
            return Err(NodeError::latch_misuse(
                "endWrite called on a session that was not opened with beginWrite".to_string(),
            ));
        }
        self.header.flush(self.buf)?;
        latch.release_exclusive();
        Ok(())
    }

    pub fn begin_create<L: PageLatch>(
        buf: &'a mut [u8],
        latch: &L,
        registry: &'a EncoderRegistry<K, V>,
        config: NodeConfig,
        leaf: bool,
    ) -> Result<Self, NodeError> {
        config.validate()?;
        latch.acquire_exclusive();
        let mut header = NodeHeader::new_for_create(leaf, registry.version, config.page_size as u32);
        if leaf && config.tombstone_mode {
            header.set_has_record_flags(true);
        }
        let layout = Layout::compute(registry, &config, &header);
        Ok(Self { buf, header, registry, config, layout, session_kind: SessionKind::Create })
    }

    /// Same write-back/release behavior as `end_write`, but only accepts a
    /// session opened with `begin_create`; kept as a distinct name so
    /// callers mirror the `beginCreate` / `endWrite`-style pairing the
    /// concurrency model describes.
    pub fn end_create<L: PageLatch>(self, latch: &L) -> Result<(), NodeError> {
        if self.session_kind != SessionKind::Create {
            return Err(NodeError::latch_misuse(
                "endCreate called on a session that was not opened with beginCreate".to_string(),
            ));
        }
        let mut this = self;
        this.session_kind = SessionKind::Write;
        this.end_write(latch)
    }

    /// Re-initialize an empty leaf page as an internal page in place.
    pub fn convert_to_non_leaf(&mut self) -> Result<(), NodeError> {
        if self.header.size() != 0 {
            return Err(NodeError::invariant(
                "convertToNonLeaf requires an empty node".to_string(),
            ));
        }
        let flags = self.header.flags() & !(FLAG_LEAF | FLAG_HAS_RECORD_FLAGS);
        self.header.set_flags(flags);
        self.header.set_left_pointer(NONE_POINTER);
        self.header.set_marker_count(0);
        self.layout = Layout::compute(self.registry, &self.config, &self.header);
        Ok(())
    }

    // ---- accessors ----------------------------------------------------

    pub fn is_leaf(&self) -> bool {
        self.header.is_leaf()
    }

    pub fn is_continued_from(&self) -> bool {
        self.header.is_continued_from()
    }

    pub fn is_continued_to(&self) -> bool {
        self.header.is_continued_to()
    }

    pub fn encoders_version(&self) -> u8 {
        self.header.encoders_version()
    }

    pub fn size(&self) -> u32 {
        self.header.size()
    }

    pub fn tree_size(&mut self) -> Result<u64, NodeError> {
        self.header.tree_size(self.buf)
    }

    pub fn set_tree_size(&mut self, v: u64) {
        self.header.set_tree_size(v)
    }

    pub fn left_pointer(&mut self) -> Result<u64, NodeError> {
        if self.is_leaf() {
            return Err(NodeError::invariant("getLeftPointer called on a leaf".to_string()));
        }
        self.header.left_pointer(self.buf)
    }

    pub fn set_left_pointer(&mut self, v: u64) -> Result<(), NodeError> {
        if self.is_leaf() {
            return Err(NodeError::invariant("setLeftPointer called on a leaf".to_string()));
        }
        self.header.set_left_pointer(v);
        Ok(())
    }

    pub fn left_sibling(&mut self) -> Result<u64, NodeError> {
        self.header.left_sibling(self.buf)
    }

    pub fn set_left_sibling(&mut self, v: u64) {
        self.header.set_left_sibling(v)
    }

    pub fn right_sibling(&mut self) -> Result<u64, NodeError> {
        self.header.right_sibling(self.buf)
    }

    pub fn set_right_sibling(&mut self, v: u64) {
        self.header.set_right_sibling(v)
    }

    pub fn free_data_position(&mut self) -> Result<u32, NodeError> {
        self.header.free_data_position(self.buf)
    }

    fn marker_count(&mut self) -> Result<u32, NodeError> {
        if self.is_leaf() {
            return Ok(0);
        }
        self.header.marker_count(self.buf)
    }

    fn marker_base(&mut self, size: usize) -> Result<usize, NodeError> {
        Ok(self.layout.slot_layout().slots_end(size))
    }

    // ---- §4.1 search ----------------------------------------------------

    /// Lower-bound binary search. Non-negative = hit index; negative =
    /// `-(insertionPoint + 1)`.
    pub fn index_of(&mut self, key: &K) -> Result<i64, NodeError>
    where
        K: Ord,
    {
        let size = self.header.size() as usize;
        let (mut lo, mut hi) = (0i64, size as i64);
        while lo < hi {
            let mid = (lo + hi) / 2;
            let probe = self.key_at(mid as usize)?;
            match self.registry.compare(&probe, key) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => return Ok(mid),
            }
        }
        Ok(util::to_insertion_point(lo as usize))
    }

    /// `pointerAt` (internal only): resolve a search result to the child
    /// pointer that would be followed for that key.
    pub fn pointer_at(&mut self, search_result: i64) -> Result<u64, NodeError> {
        if self.is_leaf() {
            return Err(NodeError::invariant("pointerAt called on a leaf".to_string()));
        }
        if util::is_insertion_point(search_result) {
            let idx = util::to_index(search_result);
            if idx == 0 {
                self.left_pointer()
            } else {
                self.child_pointer_at(idx - 1)
            }
        } else {
            self.child_pointer_at(search_result as usize)
        }
    }

    // ---- slot addressing -------------------------------------------------

    fn key_part_offset(&self, idx: usize) -> usize {
        self.layout.slot_layout().key_part_offset(idx)
    }

    fn value_part_offset(&self, idx: usize) -> usize {
        self.layout.slot_layout().value_part_offset(idx)
    }

    fn flags_offset(&self, idx: usize) -> usize {
        self.layout.slot_layout().flags_offset(idx)
    }

    fn key_stream_pos(&self, idx: usize) -> Result<usize, NodeError> {
        let off = self.key_part_offset(idx);
        if self.layout.keys_inline {
            Ok(off)
        } else {
            Ok(slot::read_position(self.buf, off)? as usize)
        }
    }

    fn value_stream_pos(&self, idx: usize) -> Result<usize, NodeError> {
        let off = self.value_part_offset(idx);
        if self.layout.values_inline {
            Ok(off)
        } else {
            Ok(slot::read_position(self.buf, off)? as usize)
        }
    }

    fn child_pointer_at(&self, idx: usize) -> Result<u64, NodeError> {
        slot::read_pointer(self.buf, self.value_part_offset(idx))
    }

    pub fn key_at(&mut self, idx: usize) -> Result<K, NodeError> {
        let pos = self.key_stream_pos(idx)?;
        let mut cursor = PageCursor::new(&mut *self.buf, pos);
        self.registry.key().decode(&mut cursor)
    }

    pub fn value_at(&mut self, idx: usize) -> Result<V, NodeError> {
        if !self.is_leaf() {
            return Err(NodeError::invariant("valueAt called on an internal node".to_string()));
        }
        let pos = self.value_stream_pos(idx)?;
        let mut cursor = PageCursor::new(&mut *self.buf, pos);
        self.registry.value().decode(&mut cursor)
    }

    fn key_size_at(&self, idx: usize) -> Result<usize, NodeError> {
        if self.layout.keys_inline {
            Ok(self.layout.key_part_size)
        } else {
            let pos = self.key_stream_pos(idx)?;
            self.registry.key().exact_size_in_stream(self.buf, pos)
        }
    }

    fn value_size_at(&self, idx: usize) -> Result<usize, NodeError> {
        if self.layout.values_inline {
            Ok(self.layout.value_part_size)
        } else {
            let pos = self.value_stream_pos(idx)?;
            self.registry.value().exact_size_in_stream(self.buf, pos)
        }
    }

    pub fn is_tombstone_at(&mut self, idx: usize) -> Result<bool, NodeError> {
        if !self.layout.has_record_flags {
            return Ok(false);
        }
        let off = self.flags_offset(idx);
        let mut cursor = PageCursor::new(&mut *self.buf, off);
        let flags = self.registry.byte().decode(&mut cursor)?;
        Ok(flags & TOMBSTONE_BIT != 0)
    }

    fn set_tombstone_at(&mut self, idx: usize, on: bool) -> Result<(), NodeError> {
        let off = self.flags_offset(idx);
        let mut flags = {
            let mut cursor = PageCursor::new(&mut *self.buf, off);
            self.registry.byte().decode(&mut cursor)?
        };
        if on {
            flags |= TOMBSTONE_BIT;
        } else {
            flags &= !TOMBSTONE_BIT;
        }
        let mut cursor = PageCursor::new(&mut *self.buf, off);
        self.registry.byte().encode(flags, &mut cursor)
    }

    // ---- §4.8 space accounting -------------------------------------------

    pub fn full_entry_size(&self, key_size: usize, value_size: usize) -> usize {
        let mut n = key_size + value_size;
        if !self.layout.keys_inline {
            n += PositionEncoder::SIZE;
        }
        if self.is_leaf() {
            if !self.layout.values_inline {
                n += PositionEncoder::SIZE;
            }
            if self.layout.has_record_flags {
                n += 1;
            }
        }
        n
    }

    pub fn full_tombstone_size(&self, key_size: usize) -> usize {
        self.layout.record_size + if self.layout.keys_inline { 0 } else { key_size }
    }

    fn used_bytes(&mut self) -> Result<usize, NodeError> {
        let size = self.header.size() as usize;
        let marker_region = self.marker_count()? as usize * MARKER_SIZE;
        Ok(self.layout.records_offset + size * self.layout.record_size + marker_region)
    }

    pub fn delta_fits(&mut self, bytes: usize) -> Result<bool, NodeError> {
        let free_pos = self.header.free_data_position(self.buf)? as usize;
        let used = self.used_bytes()?;
        Ok(bytes <= free_pos.saturating_sub(used))
    }

    pub fn marker_fits(&mut self) -> Result<bool, NodeError> {
        self.delta_fits(MARKER_SIZE)
    }

    pub fn free_bytes(&mut self) -> Result<usize, NodeError> {
        let free_pos = self.header.free_data_position(self.buf)? as usize;
        let used = self.used_bytes()?;
        Ok(free_pos.saturating_sub(used))
    }

    pub fn check_entry_size(&self, n: usize) -> Result<(), NodeError> {
        if n > self.layout.max_entry_size {
            return Err(NodeError::TooLargeEntry { size: n, max: self.layout.max_entry_size });
        }
        Ok(())
    }

    // ---- §4.2 insert leaf record ------------------------------------------

    fn shift_for_insert(&mut self, index: usize) -> Result<(), NodeError> {
        let size = self.header.size() as usize;
        let trailing = self.marker_count()? as usize * MARKER_SIZE;
        slot::shift_tail_right_one(self.buf, &self.layout.slot_layout(), index, size, trailing)
    }

    fn store_key(&mut self, index: usize, key: &K) -> Result<(), NodeError> {
        let off = self.key_part_offset(index);
        if self.layout.keys_inline {
            let mut cursor = PageCursor::new(&mut *self.buf, off);
            self.registry.key().encode(key, &mut cursor)
        } else {
            let key_size = self.registry.key().size_of(key);
            let free_pos = self.header.free_data_position(self.buf)? as usize;
            let new_free = heap::allocate(free_pos, key_size)?;
            self.header.set_free_data_position(new_free as u32);
            slot::write_position(self.buf, off, new_free as u16)?;
            let mut cursor = PageCursor::new(&mut *self.buf, new_free);
            self.registry.key().encode(key, &mut cursor)
        }
    }

    fn store_value(&mut self, index: usize, value: &V) -> Result<(), NodeError> {
        let off = self.value_part_offset(index);
        if self.layout.values_inline {
            let mut cursor = PageCursor::new(&mut *self.buf, off);
            self.registry.value().encode(value, &mut cursor)
        } else {
            let value_size = self.registry.value().size_of(value);
            let free_pos = self.header.free_data_position(self.buf)? as usize;
            let new_free = heap::allocate(free_pos, value_size)?;
            self.header.set_free_data_position(new_free as u32);
            slot::write_position(self.buf, off, new_free as u16)?;
            let mut cursor = PageCursor::new(&mut *self.buf, new_free);
            self.registry.value().encode(value, &mut cursor)
        }
    }

    /// `insertValue(searchResult, key, value)`. Caller guarantees a miss.
    pub fn insert_value(&mut self, search_result: i64, key: &K, value: &V) -> Result<(), NodeError> {
        if !self.is_leaf() {
            return Err(NodeError::invariant("insertValue called on an internal node".to_string()));
        }
        let index = util::to_index(search_result);
        self.shift_for_insert(index)?;
        self.store_key(index, key)?;
        self.store_value(index, value)?;
        if self.layout.has_record_flags {
            let off = self.flags_offset(index);
            let mut cursor = PageCursor::new(&mut *self.buf, off);
            self.registry.byte().encode(0, &mut cursor)?;
        }
        self.header.set_size(self.header.size() + 1);
        Ok(())
    }

    /// `insertTombstone(searchResult, key)`: same shape, skips the value,
    /// sets the tombstone bit.
    pub fn insert_tombstone(&mut self, search_result: i64, key: &K) -> Result<(), NodeError> {
        if !self.is_leaf() {
            return Err(NodeError::invariant("insertTombstone called on an internal node".to_string()));
        }
        if !self.layout.has_record_flags {
            return Err(NodeError::invariant(
                "insertTombstone requires HAS_RECORD_FLAGS (tombstone mode)".to_string(),
            ));
        }
        let index = util::to_index(search_result);
        self.shift_for_insert(index)?;
        self.store_key(index, key)?;
        let off = self.flags_offset(index);
        let mut cursor = PageCursor::new(&mut *self.buf, off);
        self.registry.byte().encode(TOMBSTONE_BIT, &mut cursor)?;
        self.header.set_size(self.header.size() + 1);
        Ok(())
    }

    /// §4.3 `insertPointer(index, key, childPointer)`.
    pub fn insert_pointer(&mut self, index: usize, key: &K, child_pointer: u64) -> Result<(), NodeError> {
        if self.is_leaf() {
            return Err(NodeError::invariant("insertPointer called on a leaf".to_string()));
        }
        self.shift_for_insert(index)?;
        self.store_key(index, key)?;
        slot::write_pointer(self.buf, self.value_part_offset(index), child_pointer)?;
        self.header.set_size(self.header.size() + 1);

        let count = self.marker_count()? as usize;
        let new_size = self.header.size() as usize;
        let base = self.marker_base(new_size)?;
        marker::bump_pointer_indices_from(self.buf, base, count, index as u16)
    }

    // ---- §4.4 update value -------------------------------------------------

    pub fn update_value(&mut self, index: usize, value: &V, was_tombstone: bool) -> Result<(), NodeError> {
        if !self.is_leaf() {
            return Err(NodeError::invariant("updateValue called on an internal node".to_string()));
        }
        if self.layout.values_inline {
            let off = self.value_part_offset(index);
            let mut cursor = PageCursor::new(&mut *self.buf, off);
            self.registry.value().encode(value, &mut cursor)?;
        } else {
            let new_size = self.registry.value().size_of(value);
            let current_size = if was_tombstone { 0 } else { self.value_size_at(index)? };
            if was_tombstone || current_size != new_size {
                if !was_tombstone {
                    let blob_pos = self.value_stream_pos(index)?;
                    self.free_blob(blob_pos, current_size)?;
                }
                let free_pos = self.header.free_data_position(self.buf)? as usize;
                let new_free = heap::allocate(free_pos, new_size)?;
                self.header.set_free_data_position(new_free as u32);
                slot::write_position(self.buf, self.value_part_offset(index), new_free as u16)?;
            }
            let pos = self.value_stream_pos(index)?;
            let mut cursor = PageCursor::new(&mut *self.buf, pos);
            self.registry.value().encode(value, &mut cursor)?;
        }
        if was_tombstone {
            self.set_tombstone_at(index, false)?;
        }
        Ok(())
    }

    /// Free the blob at `[blob_pos, blob_pos+len)` and fix up every live
    /// slot's key/value offset that pointed past it (spec.md §4.4
    /// `deleteData`).
    fn free_blob(&mut self, blob_pos: usize, len: usize) -> Result<(), NodeError> {
        let free_pos = self.header.free_data_position(self.buf)? as usize;
        let new_free = heap::free_and_compact(self.buf, free_pos, blob_pos, len)?;
        self.header.set_free_data_position(new_free as u32);

        let size = self.header.size() as usize;
        for i in 0..size {
            if !self.layout.keys_inline {
                let off = self.key_part_offset(i);
                let pos = slot::read_position(self.buf, off)?;
                if heap::offset_shifts_on_free(pos, blob_pos) {
                    slot::write_position(self.buf, off, pos + len as u16)?;
                }
            }
            if self.is_leaf() && !self.layout.values_inline {
                let off = self.value_part_offset(i);
                let pos = slot::read_position(self.buf, off)?;
                if heap::offset_shifts_on_free(pos, blob_pos) {
                    slot::write_position(self.buf, off, pos + len as u16)?;
                }
            }
        }
        Ok(())
    }

    // ---- §4.5 delete --------------------------------------------------------

    pub fn delete(&mut self, index: usize) -> Result<(), NodeError> {
        if self.is_leaf() && self.config.tombstone_mode {
            if !self.layout.values_inline {
                let blob_pos = self.value_stream_pos(index)?;
                let len = self.value_size_at(index)?;
                self.free_blob(blob_pos, len)?;
            }
            return self.set_tombstone_at(index, true);
        }

        if !self.layout.keys_inline {
            let blob_pos = self.key_stream_pos(index)?;
            let len = self.key_size_at(index)?;
            self.free_blob(blob_pos, len)?;
        }
        if self.is_leaf() && !self.layout.values_inline && !self.is_tombstone_at(index)? {
            let blob_pos = self.value_stream_pos(index)?;
            let len = self.value_size_at(index)?;
            self.free_blob(blob_pos, len)?;
        }

        let size = self.header.size() as usize;
        let trailing = self.marker_count()? as usize * MARKER_SIZE;
        slot::shift_tail_left_one(self.buf, &self.layout.slot_layout(), index, size, trailing)?;
        self.header.set_size(self.header.size() - 1);
        Ok(())
    }

    // ---- §4.6 markers -------------------------------------------------------

    pub fn marker_at(&mut self, i: usize) -> Result<Marker, NodeError> {
        let size = self.header.size() as usize;
        let base = self.marker_base(size)?;
        marker::read_marker(self.buf, base, i)
    }

    pub fn marker_for_pointer_at(&mut self, j: u16) -> Result<Option<Marker>, NodeError> {
        let count = self.marker_count()? as usize;
        for i in 0..count {
            let m = self.marker_at(i)?;
            if m.pointer_index == j {
                return Ok(Some(m));
            }
        }
        Ok(None)
    }

    pub fn nearest_marker(&mut self, search_result: i64) -> Result<Marker, NodeError> {
        let effective = util::to_minus_one_based_index(search_result).max(0) as u16;
        let count = self.marker_count()? as usize;
        let mut best: Option<Marker> = None;
        for i in 0..count {
            let m = self.marker_at(i)?;
            if m.pointer_index <= effective {
                best = Some(m);
            } else {
                break;
            }
        }
        match best {
            Some(m) => Ok(m),
            None => self.marker_at(0),
        }
    }

    pub fn get_last_pointer_index_of_marker_at(&mut self, i: usize) -> Result<u16, NodeError> {
        let count = self.marker_count()? as usize;
        if i + 1 == count {
            Ok(self.header.size() as u16 - 1)
        } else {
            let next = self.marker_at(i + 1)?;
            Ok(next.pointer_index - 1)
        }
    }

    pub fn insert_marker(
        &mut self,
        i: usize,
        pointer_index: u16,
        block_index: u64,
        block_pages_used: u16,
    ) -> Result<(), NodeError> {
        let size = self.header.size() as usize;
        let base = self.marker_base(size)?;
        let count = self.marker_count()? as usize;
        marker::insert_marker_at(
            self.buf,
            base,
            count,
            i,
            Marker { pointer_index, block_index, block_pages_used },
        )?;
        self.header.set_marker_count(count as u32 + 1);
        Ok(())
    }

    pub fn update_marker(
        &mut self,
        i: usize,
        block_index: Option<u64>,
        block_pages_used: Option<u16>,
    ) -> Result<(), NodeError> {
        let size = self.header.size() as usize;
        let base = self.marker_base(size)?;
        marker::update_marker(self.buf, base, i, block_index, block_pages_used)
    }

    // ---- §4.7 split-tail move -----------------------------------------------

    fn reset_storage(&mut self) -> Result<(), NodeError> {
        self.header.set_size(0);
        self.header.set_free_data_position(self.config.page_size as u32);
        if !self.is_leaf() {
            self.header.set_marker_count(0);
        }
        Ok(())
    }

    pub fn move_tail_to(&mut self, dest: &mut Node<'_, K, V>, length: usize) -> Result<(), NodeError> {
        if self.is_leaf() {
            self.move_tail_to_leaf(dest, length)
        } else {
            self.move_tail_to_internal(dest, length)
        }
    }

    fn move_tail_to_leaf(&mut self, dest: &mut Node<'_, K, V>, length: usize) -> Result<(), NodeError> {
        let size = self.header.size() as usize;
        if length > size {
            return Err(NodeError::invariant("moveTailTo length exceeds size".to_string()));
        }
        let start = size - length;

        enum Entry<K, V> {
            Tombstone(K),
            Value(K, V),
        }

        let mut moving = Vec::with_capacity(length);
        for i in 0..length {
            let idx = start + i;
            let key = self.key_at(idx)?;
            if self.is_tombstone_at(idx)? {
                moving.push(Entry::Tombstone(key));
            } else {
                let value = self.value_at(idx)?;
                moving.push(Entry::Value(key, value));
            }
        }

        let mut keep = Vec::with_capacity(start);
        for i in 0..start {
            let key = self.key_at(i)?;
            if self.is_tombstone_at(i)? {
                keep.push(Entry::Tombstone(key));
            } else {
                let value = self.value_at(i)?;
                keep.push(Entry::Value(key, value));
            }
        }

        self.reset_storage()?;
        for entry in &keep {
            let sr = util::to_insertion_point(self.header.size() as usize);
            match entry {
                Entry::Tombstone(k) => self.insert_tombstone(sr, k)?,
                Entry::Value(k, v) => self.insert_value(sr, k, v)?,
            }
        }

        for entry in &moving {
            let sr = util::to_insertion_point(dest.header.size() as usize);
            match entry {
                Entry::Tombstone(k) => dest.insert_tombstone(sr, k)?,
                Entry::Value(k, v) => dest.insert_value(sr, k, v)?,
            }
        }
        Ok(())
    }

    fn move_tail_to_internal(&mut self, dest: &mut Node<'_, K, V>, length: usize) -> Result<(), NodeError> {
        let size = self.header.size() as usize;
        if length > size {
            return Err(NodeError::invariant("moveTailTo length exceeds size".to_string()));
        }
        let start = size - length;
        if start == 0 {
            return Err(NodeError::invariant(
                "moveTailTo would move the marker covering leftPointer".to_string(),
            ));
        }

        let count = self.marker_count()? as usize;
        let mut moving_markers = Vec::new();
        let mut keep_markers = Vec::new();
        for i in 0..count {
            let m = self.marker_at(i)?;
            if m.pointer_index as usize >= start {
                moving_markers.push(m);
            } else {
                keep_markers.push(m);
            }
        }

        let mut moving = Vec::with_capacity(length);
        for i in 0..length {
            let idx = start + i;
            moving.push((self.key_at(idx)?, self.child_pointer_at(idx)?));
        }

        let mut keep = Vec::with_capacity(start);
        for i in 0..start {
            keep.push((self.key_at(i)?, self.child_pointer_at(i)?));
        }

        self.reset_storage()?;
        for (k, p) in &keep {
            let sr = util::to_insertion_point(self.header.size() as usize);
            self.insert_pointer(util::to_index(sr), k, *p)?;
        }
        for (pos, m) in keep_markers.iter().enumerate() {
            self.insert_marker(pos, m.pointer_index, m.block_index, m.block_pages_used)?;
        }

        for (k, p) in &moving {
            let sr = util::to_insertion_point(dest.header.size() as usize);
            dest.insert_pointer(util::to_index(sr), k, *p)?;
        }
        for (pos, m) in moving_markers.iter().enumerate() {
            let rebased = m.pointer_index - start as u16;
            dest.insert_marker(pos, rebased, m.block_index, m.block_pages_used)?;
        }
        Ok(())
    }

    /// Corrected termination: stop when `bytesFree >= half` or `i < 0`
    /// (spec.md §9 open question — the buggy source used `size >= 0`).
    pub fn count_entries_to_move_until_half_free(&mut self) -> Result<usize, NodeError> {
        let half = self.layout.page_space / 2;
        let mut free = self.free_bytes()?;
        let size = self.header.size() as usize;
        let mut count = 0usize;
        let mut i = size as i64 - 1;
        while free < half && i >= 0 {
            let idx = i as usize;
            let key_size = self.key_size_at(idx)?;
            let value_size = if self.is_leaf() { self.value_size_at(idx)? } else { 0 };
            free += self.full_entry_size(key_size, value_size);
            count += 1;
            i -= 1;
        }
        Ok(count)
    }

    pub fn clone_from(&mut self, other: &Node<'_, K, V>) -> Result<(), NodeError> {
        if self.buf.len() != other.buf.len() {
            return Err(NodeError::invariant("cloneFrom page size mismatch".to_string()));
        }
        self.buf.copy_from_slice(other.buf);
        self.header = NodeHeader::load_eager(self.buf)?;
        self.layout = Layout::compute(self.registry, &self.config, &self.header);
        Ok(())
    }

    // ---- debug/test-only invariant verification ----------------------------

    /// Re-check spec.md §3's invariants against live page bytes. Not on any
    /// hot path; meant for tests and debug assertions in a caller, not for
    /// production latch sessions.
    pub fn verify_invariants(&mut self) -> Result<(), NodeError>
    where
        K: Ord,
    {
        let size = self.header.size() as usize;
        let free_pos = self.header.free_data_position(self.buf)? as usize;
        let marker_count = self.marker_count()? as usize;

        // Invariant 1: strictly sorted keys.
        for i in 1..size {
            let prev = self.key_at(i - 1)?;
            let cur = self.key_at(i)?;
            if self.registry.compare(&prev, &cur) != std::cmp::Ordering::Less {
                return Err(NodeError::invariant(format!(
                    "keys not strictly sorted at index {i}"
                )));
            }
        }

        // Invariant 2: slot + marker region never overruns the heap.
        let live_region = self.layout.records_offset + size * self.layout.record_size + marker_count * MARKER_SIZE;
        if !(live_region <= free_pos && free_pos <= self.config.page_size) {
            return Err(NodeError::invariant(format!(
                "live region {live_region} / freeDataPosition {free_pos} / pageSize {} out of order",
                self.config.page_size
            )));
        }

        // Invariant 3: every out-of-line slot's blob lies in the heap and blobs are disjoint.
        let mut blobs: Vec<(usize, usize)> = Vec::new();
        for i in 0..size {
            if !self.layout.keys_inline {
                let pos = self.key_stream_pos(i)?;
                let len = self.key_size_at(i)?;
                blobs.push((pos, len));
            }
            if self.is_leaf() && !self.layout.values_inline && !self.is_tombstone_at(i)? {
                let pos = self.value_stream_pos(i)?;
                let len = self.value_size_at(i)?;
                blobs.push((pos, len));
            }
        }
        for &(pos, len) in &blobs {
            if pos < free_pos || pos + len > self.config.page_size {
                return Err(NodeError::invariant(format!(
                    "blob [{pos}, {}) escapes the heap",
                    pos + len
                )));
            }
        }
        for i in 0..blobs.len() {
            for j in (i + 1)..blobs.len() {
                let (a_pos, a_len) = blobs[i];
                let (b_pos, b_len) = blobs[j];
                if a_pos < b_pos + b_len && b_pos < a_pos + a_len {
                    return Err(NodeError::invariant(format!(
                        "blobs [{a_pos}, {}) and [{b_pos}, {}) overlap",
                        a_pos + a_len,
                        b_pos + b_len
                    )));
                }
            }
        }

        // Invariant 4: markers sorted, in range, unique pointerIndex.
        if !self.is_leaf() {
            let mut last: Option<u16> = None;
            for i in 0..marker_count {
                let m = self.marker_at(i)?;
                if m.pointer_index as usize >= size {
                    return Err(NodeError::invariant(format!(
                        "marker {i} pointerIndex {} out of range for size {size}",
                        m.pointer_index
                    )));
                }
                if let Some(prev) = last {
                    if m.pointer_index <= prev {
                        return Err(NodeError::invariant(format!(
                            "markers not strictly sorted at index {i}"
                        )));
                    }
                }
                last = Some(m.pointer_index);
            }
        }

        // Invariant 6: leaf/internal flag consistency.
        if self.is_leaf() && marker_count != 0 {
            return Err(NodeError::invariant("a leaf must not carry markers".to_string()));
        }
        if !self.is_leaf() && self.layout.has_record_flags {
            return Err(NodeError::invariant(
                "an internal node must not have HAS_RECORD_FLAGS set".to_string(),
            ));
        }

        // Invariant 7: encoder version in flags matches the registry this node was opened with.
        if self.header.encoders_version() != self.registry.version {
            return Err(NodeError::invariant(format!(
                "page encoders_version {} does not match registry version {}",
                self.header.encoders_version(),
                self.registry.version
            )));
        }

        Ok(())
    }
}

impl<'a, K, V> PartialEq for Node<'a, K, V> {
    /// Byte-for-byte comparison of the underlying page, for tests that want
    /// to assert two pages ended up identical rather than compare field by
    /// field.
    fn eq(&self, other: &Self) -> bool {
        self.buf == other.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::{FixedU64Encoder, FixedU32Encoder};
    use crate::latch::MemLatch;

    fn registry() -> EncoderRegistry<u64, u32> {
        EncoderRegistry::new(0, FixedU64Encoder, FixedU32Encoder)
    }

    fn config() -> NodeConfig {
        NodeConfig { page_size: 4096, ..NodeConfig::default() }
    }

    #[test]
    fn insert_search_delete_roundtrip_on_a_leaf() {
        let registry = registry();
        let config = config();
        let latch = MemLatch::new(1);
        let mut buf = vec![0u8; config.page_size];

        {
            let mut node = Node::begin_create(&mut buf, &latch, &registry, config, true).unwrap();
            for (k, v) in [(1u64, 10u32), (3, 30), (2, 20)] {
                let sr = node.index_of(&k).unwrap();
                assert!(util::is_insertion_point(sr));
                node.insert_value(sr, &k, &v).unwrap();
            }
            assert_eq!(node.size(), 3);
            node.end_create(&latch).unwrap();
        }

        {
            let mut node = Node::begin_write(&mut buf, &latch, &registry, config).unwrap();
            assert_eq!(node.key_at(0).unwrap(), 1);
            assert_eq!(node.key_at(1).unwrap(), 2);
            assert_eq!(node.key_at(2).unwrap(), 3);
            assert_eq!(node.value_at(1).unwrap(), 20);

            let sr = node.index_of(&2u64).unwrap();
            assert!(!util::is_insertion_point(sr));
            node.delete(sr as usize).unwrap();
            assert_eq!(node.size(), 2);
            assert_eq!(node.key_at(0).unwrap(), 1);
            assert_eq!(node.key_at(1).unwrap(), 3);
            node.end_write(&latch).unwrap();
        }
    }

    #[test]
    fn tombstone_mode_marks_instead_of_removing() {
        let registry = registry();
        let config = NodeConfig { tombstone_mode: true, ..config() };
        let latch = MemLatch::new(2);
        let mut buf = vec![0u8; config.page_size];

        let mut node = Node::begin_create(&mut buf, &latch, &registry, config, true).unwrap();
        for (k, v) in [(1u64, 10u32), (2, 20), (3, 30)] {
            let sr = node.index_of(&k).unwrap();
            node.insert_value(sr, &k, &v).unwrap();
        }
        let sr = node.index_of(&2u64).unwrap();
        node.delete(sr as usize).unwrap();
        assert_eq!(node.size(), 3);
        assert!(node.is_tombstone_at(1).unwrap());
        node.end_create(&latch).unwrap();
    }

    #[test]
    fn internal_pointer_insert_bumps_marker_indices() {
        let registry = registry();
        let config = config();
        let latch = MemLatch::new(3);
        let mut buf = vec![0u8; config.page_size];

        let mut node = Node::begin_create(&mut buf, &latch, &registry, config, false).unwrap();
        node.set_left_pointer(100).unwrap();
        for (k, p) in [(10u64, 101u64), (20, 102), (30, 103)] {
            let sr = node.index_of(&k).unwrap();
            node.insert_pointer(util::to_index(sr), &k, p).unwrap();
        }
        node.insert_marker(0, 1, 7, 2).unwrap();

        let sr = node.index_of(&15u64).unwrap();
        node.insert_pointer(util::to_index(sr), &15u64, 104).unwrap();

        assert_eq!(node.marker_at(0).unwrap().pointer_index, 2);
        assert_eq!(node.pointer_at(util::to_insertion_point(0)).unwrap(), 100);
        assert_eq!(node.pointer_at(0).unwrap(), 101);
        assert_eq!(node.pointer_at(1).unwrap(), 104);
        assert_eq!(node.pointer_at(2).unwrap(), 102);
        node.end_create(&latch).unwrap();
    }

    #[test]
    fn update_value_inline_is_in_place() {
        let registry = registry();
        let config = config();
        let latch = MemLatch::new(4);
        let mut buf = vec![0u8; config.page_size];

        let mut node = Node::begin_create(&mut buf, &latch, &registry, config, true).unwrap();
        let sr = node.index_of(&1u64).unwrap();
        node.insert_value(sr, &1u64, &10u32).unwrap();
        node.update_value(0, &99u32, false).unwrap();
        assert_eq!(node.value_at(0).unwrap(), 99);
        node.end_create(&latch).unwrap();
    }

    #[test]
    fn move_tail_to_splits_the_last_records_in_order() {
        let registry = registry();
        let config = config();
        let latch_a = MemLatch::new(5);
        let latch_b = MemLatch::new(6);
        let mut buf_a = vec![0u8; config.page_size];
        let mut buf_b = vec![0u8; config.page_size];

        let mut src = Node::begin_create(&mut buf_a, &latch_a, &registry, config, true).unwrap();
        for k in 0u64..10 {
            let sr = src.index_of(&k).unwrap();
            src.insert_value(sr, &k, &(k as u32 * 10)).unwrap();
        }
        let mut dest = Node::begin_create(&mut buf_b, &latch_b, &registry, config, true).unwrap();

        src.move_tail_to(&mut dest, 4).unwrap();

        assert_eq!(src.size(), 6);
        assert_eq!(dest.size(), 4);
        for i in 0..6 {
            assert_eq!(src.key_at(i).unwrap(), i as u64);
        }
        for i in 0..4 {
            assert_eq!(dest.key_at(i).unwrap(), 6 + i as u64);
        }
        src.end_create(&latch_a).unwrap();
        dest.end_create(&latch_b).unwrap();
    }

    #[test]
    fn verify_invariants_passes_on_a_well_formed_leaf() {
        let registry = registry();
        let config = config();
        let latch = MemLatch::new(7);
        let mut buf = vec![0u8; config.page_size];

        let mut node = Node::begin_create(&mut buf, &latch, &registry, config, true).unwrap();
        for (k, v) in [(1u64, 10u32), (3, 30), (2, 20)] {
            let sr = node.index_of(&k).unwrap();
            node.insert_value(sr, &k, &v).unwrap();
        }
        node.verify_invariants().unwrap();
        node.end_create(&latch).unwrap();
    }

    #[test]
    fn clone_from_produces_a_byte_identical_node() {
        let registry = registry();
        let config = config();
        let latch_a = MemLatch::new(8);
        let latch_b = MemLatch::new(9);
        let mut buf_a = vec![0u8; config.page_size];
        let mut buf_b = vec![0u8; config.page_size];

        let mut src = Node::begin_create(&mut buf_a, &latch_a, &registry, config, true).unwrap();
        src.insert_value(src.index_of(&1u64).unwrap(), &1u64, &10u32).unwrap();
        src.end_create(&latch_a).unwrap();

        let mut src = Node::begin_write(&mut buf_a, &latch_a, &registry, config).unwrap();
        let mut dest = Node::begin_create(&mut buf_b, &latch_b, &registry, config, true).unwrap();
        dest.clone_from(&src).unwrap();
        assert!(src == dest);
        src.end_write(&latch_a).unwrap();
        dest.end_create(&latch_b).unwrap();
    }
}
