//! The backward-growing data heap holding out-of-line key/value blobs.
//!
//! The heap and the slot array grow toward each other from opposite ends
//! of the same buffer; `freeDataPosition` is the low-water mark between
//! them. Allocation always happens at the tail (the lowest live offset);
//! freeing an interior blob requires closing the hole it leaves by
//! shifting everything below it up and fixing up every slot offset that
//! pointed into the shifted region (spec.md §4.4).

use crate::codec::move_data;
use crate::errors::NodeError;

/// Allocate `len` bytes at the tail of the heap, returning the new
/// `freeDataPosition` (the start of the allocated region). Caller writes
/// the blob at `[result, result + len)`.
pub fn allocate(free_data_position: usize, len: usize) -> Result<usize, NodeError> {
    free_data_position
        .checked_sub(len)
        .ok_or_else(|| NodeError::invariant("data heap underflow on allocate".to_string()))
}

/// Free the blob at `[blob_pos, blob_pos + len)` and compact the heap so
/// there is no hole: every byte below `blob_pos` shifts up by `len`.
///
/// Returns the new `freeDataPosition`. The caller is responsible for
/// walking every live slot and adding `len` to any stored offset that was
/// `< blob_pos`, since those bytes just moved (spec.md §4.4 step 2).
pub fn free_and_compact(
    buf: &mut [u8],
    free_data_position: usize,
    blob_pos: usize,
    len: usize,
) -> Result<usize, NodeError> {
    if blob_pos > free_data_position {
        move_data(buf, free_data_position, free_data_position + len, blob_pos - free_data_position)?;
    }
    Ok(free_data_position + len)
}

/// True if `offset` denotes a byte that `free_and_compact(blob_pos, len)`
/// would have shifted, and therefore needs `+= len` applied by the caller.
pub fn offset_shifts_on_free(offset: u16, blob_pos: usize) -> bool {
    (offset as usize) < blob_pos
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_moves_free_position_down() {
        assert_eq!(allocate(100, 20).unwrap(), 80);
    }

    #[test]
    fn allocate_past_zero_is_an_error() {
        assert!(allocate(10, 20).is_err());
    }

    #[test]
    fn free_and_compact_shifts_lower_region_up() {
        // heap occupies [60, 100); blob B sits at [80, 90) (len 10),
        // blob A sits below it at [60, 80).
        let mut buf = vec![0u8; 100];
        for (i, b) in buf[60..80].iter_mut().enumerate() {
            *b = i as u8;
        }
        let new_free = free_and_compact(&mut buf, 60, 80, 10).unwrap();
        assert_eq!(new_free, 70);
        // the bytes that were at [60,80) are now at [70,90)
        assert_eq!(&buf[70..90], &(0..20).collect::<Vec<u8>>()[..]);
    }

    #[test]
    fn freeing_the_lowest_blob_needs_no_shift() {
        let mut buf = vec![0u8; 100];
        let new_free = free_and_compact(&mut buf, 60, 60, 10).unwrap();
        assert_eq!(new_free, 70);
    }

    #[test]
    fn offset_shift_predicate_matches_blob_position() {
        assert!(offset_shifts_on_free(50, 80));
        assert!(!offset_shifts_on_free(90, 80));
    }
}
