//! The marker array: a contiguous, `pointerIndex`-sorted array of
//! `(pointerIndex, blockIndex, blockPagesUsed)` triples that annotate
//! ranges of child pointers in internal nodes with block metadata.
//! Stored immediately after the live slot area.

use crate::codec::{move_data, read_u16, read_u64, write_u16, write_u64};
use crate::errors::NodeError;

pub const MARKER_SIZE: usize = 2 + 8 + 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    pub pointer_index: u16,
    pub block_index: u64,
    pub block_pages_used: u16,
}

fn marker_offset(base: usize, i: usize) -> usize {
    base + i * MARKER_SIZE
}

pub fn read_marker(buf: &[u8], base: usize, i: usize) -> Result<Marker, NodeError> {
    let off = marker_offset(base, i);
    Ok(Marker {
        pointer_index: read_u16(buf, off)?,
        block_index: read_u64(buf, off + 2)?,
        block_pages_used: read_u16(buf, off + 10)?,
    })
}

pub fn write_marker(buf: &mut [u8], base: usize, i: usize, marker: Marker) -> Result<(), NodeError> {
    let off = marker_offset(base, i);
    write_u16(buf, off, marker.pointer_index)?;
    write_u64(buf, off + 2, marker.block_index)?;
    write_u16(buf, off + 10, marker.block_pages_used)?;
    Ok(())
}

fn write_pointer_index(buf: &mut [u8], base: usize, i: usize, pointer_index: u16) -> Result<(), NodeError> {
    write_u16(buf, marker_offset(base, i), pointer_index)
}

fn write_block_fields(
    buf: &mut [u8],
    base: usize,
    i: usize,
    block_index: Option<u64>,
    block_pages_used: Option<u16>,
) -> Result<(), NodeError> {
    let off = marker_offset(base, i);
    if let Some(v) = block_index {
        write_u64(buf, off + 2, v)?;
    }
    if let Some(v) = block_pages_used {
        write_u16(buf, off + 10, v)?;
    }
    Ok(())
}

/// Shift markers `[at, count)` right by one slot, then write `marker` at
/// `at`. Used both for a bare `insertMarker` call and as the marker half of
/// `insertPointer`'s combined slot+marker shift.
pub fn insert_marker_at(
    buf: &mut [u8],
    base: usize,
    count: usize,
    at: usize,
    marker: Marker,
) -> Result<(), NodeError> {
    if at < count {
        move_data(
            buf,
            marker_offset(base, at),
            marker_offset(base, at + 1),
            (count - at) * MARKER_SIZE,
        )?;
    }
    write_marker(buf, base, at, marker)
}

/// Increment the `pointerIndex` of every marker whose value is `>= at`.
/// Markers are kept sorted by `pointerIndex`, so this can stop at the first
/// marker whose pre-shift value is `< at` (spec.md §4.3).
pub fn bump_pointer_indices_from(
    buf: &mut [u8],
    base: usize,
    count: usize,
    at: u16,
) -> Result<(), NodeError> {
    for i in (0..count).rev() {
        let marker = read_marker(buf, base, i)?;
        if marker.pointer_index < at {
            break;
        }
        write_pointer_index(buf, base, i, marker.pointer_index + 1)?;
    }
    Ok(())
}

pub fn update_marker(
    buf: &mut [u8],
    base: usize,
    i: usize,
    block_index: Option<u64>,
    block_pages_used: Option<u16>,
) -> Result<(), NodeError> {
    write_block_fields(buf, base, i, block_index, block_pages_used)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(pointer_index: u16, block_index: u64, block_pages_used: u16) -> Marker {
        Marker {
            pointer_index,
            block_index,
            block_pages_used,
        }
    }

    #[test]
    fn insert_shifts_following_markers() {
        let mut buf = vec![0u8; MARKER_SIZE * 4];
        write_marker(&mut buf, 0, 0, m(1, 7, 2)).unwrap();
        write_marker(&mut buf, 0, 1, m(5, 9, 1)).unwrap();
        insert_marker_at(&mut buf, 0, 2, 1, m(3, 11, 4)).unwrap();

        assert_eq!(read_marker(&buf, 0, 0).unwrap(), m(1, 7, 2));
        assert_eq!(read_marker(&buf, 0, 1).unwrap(), m(3, 11, 4));
        assert_eq!(read_marker(&buf, 0, 2).unwrap(), m(5, 9, 1));
    }

    #[test]
    fn bump_stops_at_first_smaller_pointer_index() {
        let mut buf = vec![0u8; MARKER_SIZE * 3];
        write_marker(&mut buf, 0, 0, m(0, 1, 0)).unwrap();
        write_marker(&mut buf, 0, 1, m(2, 2, 0)).unwrap();
        write_marker(&mut buf, 0, 2, m(4, 3, 0)).unwrap();

        bump_pointer_indices_from(&mut buf, 0, 3, 2).unwrap();

        assert_eq!(read_marker(&buf, 0, 0).unwrap().pointer_index, 0);
        assert_eq!(read_marker(&buf, 0, 1).unwrap().pointer_index, 3);
        assert_eq!(read_marker(&buf, 0, 2).unwrap().pointer_index, 5);
    }
}
