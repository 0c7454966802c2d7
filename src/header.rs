//! Typed, cached view over the fixed-offset header fields.
//!
//! `flags` and `size` are loaded eagerly on `beginRead`/`beginWrite`; the
//! rest (`freeDataPosition`, `treeSize`, `markerCount`, `leftPointer`,
//! siblings) are loaded lazily on first access. Every setter marks the
//! field dirty so that `endWrite` writes back only what actually changed,
//! the same "minimize header writes" trade-off `SPEC_FULL.md` calls out.

use crate::codec::{read_u32, read_u64, write_u32, write_u64};
use crate::errors::NodeError;

pub const HDR_FREE_DATA_POSITION: usize = 0;
pub const HDR_FLAGS: usize = 4;
pub const HDR_SIZE: usize = 8;
pub const HDR_TREE_SIZE: usize = 12;
pub const HDR_LEFT_POINTER: usize = 20;
pub const HDR_MARKER_COUNT: usize = 28;
pub const HDR_LEFT_SIBLING: usize = 32;
pub const HDR_RIGHT_SIBLING: usize = 40;
pub const HEADER_SIZE: usize = 48;

pub const FLAG_LEAF: u32 = 1 << 0;
pub const FLAG_CONTINUED_FROM: u32 = 1 << 1;
pub const FLAG_CONTINUED_TO: u32 = 1 << 2;
pub const FLAG_HAS_RECORD_FLAGS: u32 = 1 << 3;
pub const FLAG_EXTENSION: u32 = 1 << 15;
const ENCODERS_VERSION_SHIFT: u32 = 24;

pub const NONE_SIBLING: u64 = u64::MAX;
pub const NONE_POINTER: u64 = u64::MAX;

/// Which header fields have unflushed in-memory changes. Plain bit-packed
/// `u8`, same texture as the page-level `flags` field: a tag bitset, not a
/// type hierarchy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Dirty(u8);

impl Dirty {
    const FREE_DATA_POSITION: Dirty = Dirty(1 << 0);
    const FLAGS: Dirty = Dirty(1 << 1);
    const SIZE: Dirty = Dirty(1 << 2);
    const TREE_SIZE: Dirty = Dirty(1 << 3);
    const LEFT_POINTER: Dirty = Dirty(1 << 4);
    const MARKER_COUNT: Dirty = Dirty(1 << 5);
    const LEFT_SIBLING: Dirty = Dirty(1 << 6);
    const RIGHT_SIBLING: Dirty = Dirty(1 << 7);

    const fn empty() -> Self {
        Dirty(0)
    }

    fn insert(&mut self, other: Dirty) {
        self.0 |= other.0;
    }

    fn contains(&self, other: Dirty) -> bool {
        self.0 & other.0 == other.0
    }

    fn is_empty(&self) -> bool {
        self.0 == 0
    }

    fn clear(&mut self) {
        self.0 = 0;
    }
}

#[derive(Debug, Clone)]
pub struct NodeHeader {
    free_data_position: Option<u32>,
    flags: u32,
    size: u32,
    tree_size: Option<u64>,
    left_pointer: Option<u64>,
    marker_count: Option<u32>,
    left_sibling: Option<u64>,
    right_sibling: Option<u64>,
    dirty: Dirty,
}

impl NodeHeader {
    /// Eager load of `flags`/`size` on `beginRead`/`beginWrite`; everything
    /// else stays absent until first touched.
    pub fn load_eager(buf: &[u8]) -> Result<Self, NodeError> {
        Ok(Self {
            free_data_position: None,
            flags: read_u32(buf, HDR_FLAGS)?,
            size: read_u32(buf, HDR_SIZE)?,
            tree_size: None,
            left_pointer: None,
            marker_count: None,
            left_sibling: None,
            right_sibling: None,
            dirty: Dirty::empty(),
        })
    }

    /// Build a fresh in-memory header for `create`/`convertToNonLeaf`,
    /// marking every field dirty so the first `endWrite` flushes all of it.
    pub fn new_for_create(leaf: bool, encoders_version: u8, page_size: u32) -> Self {
        let mut flags = if leaf { FLAG_LEAF } else { 0 };
        flags |= (encoders_version as u32) << ENCODERS_VERSION_SHIFT;
        let mut dirty = Dirty::empty();
        dirty.insert(Dirty::FREE_DATA_POSITION);
        dirty.insert(Dirty::FLAGS);
        dirty.insert(Dirty::SIZE);
        dirty.insert(Dirty::TREE_SIZE);
        dirty.insert(Dirty::LEFT_POINTER);
        dirty.insert(Dirty::MARKER_COUNT);
        dirty.insert(Dirty::LEFT_SIBLING);
        dirty.insert(Dirty::RIGHT_SIBLING);
        Self {
            free_data_position: Some(page_size),
            flags,
            size: 0,
            tree_size: Some(0),
            left_pointer: Some(NONE_POINTER),
            marker_count: Some(0),
            left_sibling: Some(NONE_SIBLING),
            right_sibling: Some(NONE_SIBLING),
            dirty,
        }
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Write back only the fields marked dirty, then clear the dirty mask.
    pub fn flush(&mut self, buf: &mut [u8]) -> Result<(), NodeError> {
        if self.dirty.contains(Dirty::FREE_DATA_POSITION) {
            write_u32(
                buf,
                HDR_FREE_DATA_POSITION,
                self.free_data_position.expect("dirty implies loaded"),
            )?;
        }
        if self.dirty.contains(Dirty::FLAGS) {
            write_u32(buf, HDR_FLAGS, self.flags)?;
        }
        if self.dirty.contains(Dirty::SIZE) {
            write_u32(buf, HDR_SIZE, self.size)?;
        }
        if self.dirty.contains(Dirty::TREE_SIZE) {
            write_u64(buf, HDR_TREE_SIZE, self.tree_size.expect("dirty implies loaded"))?;
        }
        if self.dirty.contains(Dirty::LEFT_POINTER) {
            write_u64(
                buf,
                HDR_LEFT_POINTER,
                self.left_pointer.expect("dirty implies loaded"),
            )?;
        }
        if self.dirty.contains(Dirty::MARKER_COUNT) {
            write_u32(
                buf,
                HDR_MARKER_COUNT,
                self.marker_count.expect("dirty implies loaded"),
            )?;
        }
        if self.dirty.contains(Dirty::LEFT_SIBLING) {
            write_u64(
                buf,
                HDR_LEFT_SIBLING,
                self.left_sibling.expect("dirty implies loaded"),
            )?;
        }
        if self.dirty.contains(Dirty::RIGHT_SIBLING) {
            write_u64(
                buf,
                HDR_RIGHT_SIBLING,
                self.right_sibling.expect("dirty implies loaded"),
            )?;
        }
        self.dirty.clear();
        Ok(())
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn set_flags(&mut self, flags: u32) {
        self.flags = flags;
        self.dirty.insert(Dirty::FLAGS);
    }

    pub fn is_leaf(&self) -> bool {
        self.flags & FLAG_LEAF != 0
    }

    pub fn is_continued_from(&self) -> bool {
        self.flags & FLAG_CONTINUED_FROM != 0
    }

    pub fn is_continued_to(&self) -> bool {
        self.flags & FLAG_CONTINUED_TO != 0
    }

    pub fn has_record_flags(&self) -> bool {
        self.flags & FLAG_HAS_RECORD_FLAGS != 0
    }

    pub fn set_has_record_flags(&mut self, on: bool) {
        if on {
            self.flags |= FLAG_HAS_RECORD_FLAGS;
        } else {
            self.flags &= !FLAG_HAS_RECORD_FLAGS;
        }
        self.dirty.insert(Dirty::FLAGS);
    }

    pub fn encoders_version(&self) -> u8 {
        (self.flags >> ENCODERS_VERSION_SHIFT) as u8
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn set_size(&mut self, size: u32) {
        self.size = size;
        self.dirty.insert(Dirty::SIZE);
    }

    pub fn free_data_position(&mut self, buf: &[u8]) -> Result<u32, NodeError> {
        if self.free_data_position.is_none() {
            self.free_data_position = Some(read_u32(buf, HDR_FREE_DATA_POSITION)?);
        }
        Ok(self.free_data_position.expect("just loaded"))
    }

    pub fn set_free_data_position(&mut self, v: u32) {
        self.free_data_position = Some(v);
        self.dirty.insert(Dirty::FREE_DATA_POSITION);
    }

    pub fn tree_size(&mut self, buf: &[u8]) -> Result<u64, NodeError> {
        if self.tree_size.is_none() {
            self.tree_size = Some(read_u64(buf, HDR_TREE_SIZE)?);
        }
        Ok(self.tree_size.expect("just loaded"))
    }

    pub fn set_tree_size(&mut self, v: u64) {
        self.tree_size = Some(v);
        self.dirty.insert(Dirty::TREE_SIZE);
    }

    pub fn left_pointer(&mut self, buf: &[u8]) -> Result<u64, NodeError> {
        if self.left_pointer.is_none() {
            self.left_pointer = Some(read_u64(buf, HDR_LEFT_POINTER)?);
        }
        Ok(self.left_pointer.expect("just loaded"))
    }

    pub fn set_left_pointer(&mut self, v: u64) {
        self.left_pointer = Some(v);
        self.dirty.insert(Dirty::LEFT_POINTER);
    }

    pub fn marker_count(&mut self, buf: &[u8]) -> Result<u32, NodeError> {
        if self.marker_count.is_none() {
            self.marker_count = Some(read_u32(buf, HDR_MARKER_COUNT)?);
        }
        Ok(self.marker_count.expect("just loaded"))
    }

    pub fn set_marker_count(&mut self, v: u32) {
        self.marker_count = Some(v);
        self.dirty.insert(Dirty::MARKER_COUNT);
    }

    pub fn left_sibling(&mut self, buf: &[u8]) -> Result<u64, NodeError> {
        if self.left_sibling.is_none() {
            self.left_sibling = Some(read_u64(buf, HDR_LEFT_SIBLING)?);
        }
        Ok(self.left_sibling.expect("just loaded"))
    }

    pub fn set_left_sibling(&mut self, v: u64) {
        self.left_sibling = Some(v);
        self.dirty.insert(Dirty::LEFT_SIBLING);
    }

    pub fn right_sibling(&mut self, buf: &[u8]) -> Result<u64, NodeError> {
        if self.right_sibling.is_none() {
            self.right_sibling = Some(read_u64(buf, HDR_RIGHT_SIBLING)?);
        }
        Ok(self.right_sibling.expect("just loaded"))
    }

    pub fn set_right_sibling(&mut self, v: u64) {
        self.right_sibling = Some(v);
        self.dirty.insert(Dirty::RIGHT_SIBLING);
    }
}
