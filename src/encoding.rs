//! Encoders for keys, values, in-page positions, page indexes, and bytes.
//!
//! The node is parameterized over `(K, V)` at construction through trait
//! objects rather than a runtime type tag (see design notes in
//! `SPEC_FULL.md`): `Encoder<T>` is the seam, `EncoderRegistry` bundles the
//! two caller-supplied encoders for a given encoder version together with
//! the three fixed internal encoders the node itself needs (slot
//! positions, child page indexes, record-flags bytes).

use std::cmp::Ordering;

use crate::codec::PageCursor;
use crate::errors::NodeError;

/// A sentinel "maximum size" for encoders whose output length varies
/// without a fixed upper bound. Any inline-threshold comparison against
/// this value is false, which is exactly the behavior an unbounded
/// encoder needs: it can never be inlined.
pub const UNBOUNDED_MAX_SIZE: usize = u32::MAX as usize;

pub trait Encoder<T> {
    fn encode(&self, value: &T, cursor: &mut PageCursor) -> Result<(), NodeError>;
    fn decode(&self, cursor: &mut PageCursor) -> Result<T, NodeError>;

    /// Size in bytes of the value encoded at `pos` in `buf`, without
    /// mutating any cursor state beyond what's needed to peek ahead.
    fn exact_size_in_stream(&self, buf: &[u8], pos: usize) -> Result<usize, NodeError>;

    fn is_of_bound_size(&self) -> bool;
    fn maximum_size(&self) -> usize;

    /// Exact encoded size of `value`, used for space accounting before the
    /// bytes are ever written.
    fn size_of(&self, value: &T) -> usize;
}

/// Length-prefixed byte blob. Unbounded: arbitrary-length keys/values
/// always go out-of-line once past the inline threshold (in practice,
/// always, since `UNBOUNDED_MAX_SIZE` never fits an inline threshold).
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesEncoder;

impl Encoder<Vec<u8>> for BytesEncoder {
    fn encode(&self, value: &Vec<u8>, cursor: &mut PageCursor) -> Result<(), NodeError> {
        cursor.write_u32(value.len() as u32)?;
        cursor.write_bytes(value)
    }

    fn decode(&self, cursor: &mut PageCursor) -> Result<Vec<u8>, NodeError> {
        let len = cursor.read_u32()? as usize;
        Ok(cursor.read_bytes(len)?.to_vec())
    }

    fn exact_size_in_stream(&self, buf: &[u8], pos: usize) -> Result<usize, NodeError> {
        let len = crate::codec::read_u32(buf, pos)? as usize;
        Ok(4 + len)
    }

    fn is_of_bound_size(&self) -> bool {
        false
    }

    fn maximum_size(&self) -> usize {
        UNBOUNDED_MAX_SIZE
    }

    fn size_of(&self, value: &Vec<u8>) -> usize {
        4 + value.len()
    }
}

/// Fixed-width 8-byte little-endian integer key/value (e.g. row ids).
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedU64Encoder;

impl Encoder<u64> for FixedU64Encoder {
    fn encode(&self, value: &u64, cursor: &mut PageCursor) -> Result<(), NodeError> {
        cursor.write_u64(*value)
    }

    fn decode(&self, cursor: &mut PageCursor) -> Result<u64, NodeError> {
        cursor.read_u64()
    }

    fn exact_size_in_stream(&self, _buf: &[u8], _pos: usize) -> Result<usize, NodeError> {
        Ok(8)
    }

    fn is_of_bound_size(&self) -> bool {
        true
    }

    fn maximum_size(&self) -> usize {
        8
    }

    fn size_of(&self, _value: &u64) -> usize {
        8
    }
}

/// Fixed-width 4-byte little-endian integer key/value.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedU32Encoder;

impl Encoder<u32> for FixedU32Encoder {
    fn encode(&self, value: &u32, cursor: &mut PageCursor) -> Result<(), NodeError> {
        cursor.write_u32(*value)
    }

    fn decode(&self, cursor: &mut PageCursor) -> Result<u32, NodeError> {
        cursor.read_u32()
    }

    fn exact_size_in_stream(&self, _buf: &[u8], _pos: usize) -> Result<usize, NodeError> {
        Ok(4)
    }

    fn is_of_bound_size(&self) -> bool {
        true
    }

    fn maximum_size(&self) -> usize {
        4
    }

    fn size_of(&self, _value: &u32) -> usize {
        4
    }
}

/// Byte width of an in-page position (slot offset into the data heap).
/// Position reads/writes themselves go through `slot::read_position`/
/// `slot::write_position` — plain offset arithmetic, not value encoding —
/// so this type carries only the width `Layout` needs.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct PositionEncoder;

impl PositionEncoder {
    pub const SIZE: usize = 2;
}

/// Byte width of a child page index (internal node pointer). Reads/writes
/// go through `slot::read_pointer`/`slot::write_pointer`, for the same
/// reason as `PositionEncoder`.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct PageIndexEncoder;

impl PageIndexEncoder {
    pub const SIZE: usize = 8;
}

/// Internal single-byte encoder for the optional record-flags field.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ByteEncoder;

impl ByteEncoder {
    pub const SIZE: usize = 1;

    pub fn encode(&self, value: u8, cursor: &mut PageCursor) -> Result<(), NodeError> {
        cursor.write_u8(value)
    }

    pub fn decode(&self, cursor: &mut PageCursor) -> Result<u8, NodeError> {
        cursor.read_u8()
    }
}

/// Bundles the caller-supplied key/value encoders for one encoder version
/// together with the node's fixed internal encoders (position, page
/// index, flags byte). `version` is stamped into the page header and
/// checked against the registry a `Node` is opened with (invariant 7).
pub struct EncoderRegistry<K, V> {
    pub version: u8,
    key: Box<dyn Encoder<K>>,
    value: Box<dyn Encoder<V>>,
    comparator: Option<Box<dyn Fn(&K, &K) -> Ordering>>,
}

impl<K, V> EncoderRegistry<K, V> {
    pub fn new(version: u8, key: impl Encoder<K> + 'static, value: impl Encoder<V> + 'static) -> Self {
        Self {
            version,
            key: Box::new(key),
            value: Box::new(value),
            comparator: None,
        }
    }

    pub fn with_comparator(
        version: u8,
        key: impl Encoder<K> + 'static,
        value: impl Encoder<V> + 'static,
        comparator: impl Fn(&K, &K) -> Ordering + 'static,
    ) -> Self {
        Self {
            version,
            key: Box::new(key),
            value: Box::new(value),
            comparator: Some(Box::new(comparator)),
        }
    }

    pub fn key(&self) -> &dyn Encoder<K> {
        self.key.as_ref()
    }

    pub fn value(&self) -> &dyn Encoder<V> {
        self.value.as_ref()
    }

    pub(crate) fn byte(&self) -> ByteEncoder {
        ByteEncoder
    }

    /// Compare two keys using the custom comparator if one was supplied,
    /// falling back to the caller-visible default (`Ord`) otherwise. The
    /// default comparator lives in `util::default_compare`; this indirection
    /// is the "default comparator hook" the design notes call for.
    pub fn compare(&self, a: &K, b: &K) -> Ordering
    where
        K: Ord,
    {
        match &self.comparator {
            Some(cmp) => cmp(a, b),
            None => crate::util::default_compare(a, b),
        }
    }
}
