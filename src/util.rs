//! Insertion-point arithmetic and the default comparator hook.
//!
//! Search results use the same sign convention as a textbook
//! `binary_search`: a non-negative result is a hit index, a negative
//! result encodes an insertion point as `-(insertion_point + 1)`.

use std::cmp::Ordering;

pub fn is_insertion_point(search_result: i64) -> bool {
    search_result < 0
}

pub fn to_index(search_result: i64) -> usize {
    debug_assert!(is_insertion_point(search_result));
    (-search_result - 1) as usize
}

pub fn to_insertion_point(index: usize) -> i64 {
    -(index as i64) - 1
}

/// Collapse a search result to "the largest index whose key is `<=` the
/// probed key", in `{-1, 0, ..., size-1}`. A hit collapses to itself; a
/// miss collapses to the insertion point's predecessor.
pub fn to_minus_one_based_index(search_result: i64) -> i64 {
    if !is_insertion_point(search_result) {
        search_result
    } else {
        to_index(search_result) as i64 - 1
    }
}

pub fn default_compare<K: Ord>(a: &K, b: &K) -> Ordering {
    a.cmp(b)
}
