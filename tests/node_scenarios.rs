//! End-to-end scenarios against a single node, driven entirely through a
//! latch session the way a caller in the cache layer would.

use seb_node::{is_insertion_point, to_index, to_insertion_point, BytesEncoder, EncoderRegistry, FixedU64Encoder, MemLatch, Node, NodeConfig};

const PAGE_SIZE: usize = 4096;

fn int_registry() -> EncoderRegistry<u64, u64> {
    EncoderRegistry::new(0, FixedU64Encoder, FixedU64Encoder)
}

fn bytes_registry() -> EncoderRegistry<u64, Vec<u8>> {
    EncoderRegistry::new(0, FixedU64Encoder, BytesEncoder)
}

/// Scenario 1: create a leaf, insert out of order, observe sorted output.
#[test]
fn scenario_1_out_of_order_insert_sorts_keys() {
    let registry = int_registry();
    let config = NodeConfig { page_size: PAGE_SIZE, ..NodeConfig::default() };
    let latch = MemLatch::new(1);
    let mut buf = vec![0u8; PAGE_SIZE];

    let mut node = Node::begin_create(&mut buf, &latch, &registry, config, true).unwrap();
    for (k, v) in [(1u64, b'a' as u64), (3, b'c' as u64), (2, b'b' as u64)] {
        let sr = node.index_of(&k).unwrap();
        node.insert_value(sr, &k, &v).unwrap();
    }

    assert_eq!(node.size(), 3);
    assert_eq!(node.key_at(0).unwrap(), 1);
    assert_eq!(node.key_at(1).unwrap(), 2);
    assert_eq!(node.key_at(2).unwrap(), 3);
    assert_eq!(node.value_at(0).unwrap(), b'a' as u64);
    assert_eq!(node.value_at(1).unwrap(), b'b' as u64);
    assert_eq!(node.value_at(2).unwrap(), b'c' as u64);

    node.end_create(&latch).unwrap();
}

/// Scenario 2: hard delete (tombstone mode off) shrinks size and frees
/// exactly the deleted record's accounted bytes.
#[test]
fn scenario_2_hard_delete_shrinks_and_frees_exact_bytes() {
    let registry = int_registry();
    let config = NodeConfig { page_size: PAGE_SIZE, ..NodeConfig::default() };
    let latch = MemLatch::new(2);
    let mut buf = vec![0u8; PAGE_SIZE];

    let mut node = Node::begin_create(&mut buf, &latch, &registry, config, true).unwrap();
    for (k, v) in [(1u64, 10u64), (3, 30), (2, 20)] {
        let sr = node.index_of(&k).unwrap();
        node.insert_value(sr, &k, &v).unwrap();
    }

    let free_before = node.free_bytes().unwrap();
    let expected_delta = node.full_entry_size(8, 8);

    let sr = node.index_of(&2u64).unwrap();
    assert!(!is_insertion_point(sr));
    node.delete(sr as usize).unwrap();

    assert_eq!(node.size(), 2);
    assert_eq!(node.key_at(0).unwrap(), 1);
    assert_eq!(node.key_at(1).unwrap(), 3);
    assert_eq!(node.free_bytes().unwrap(), free_before + expected_delta);

    node.end_create(&latch).unwrap();
}

/// Scenario 3: under tombstone mode, delete marks instead of removing.
#[test]
fn scenario_3_tombstone_mode_marks_instead_of_removing() {
    let registry = int_registry();
    let config = NodeConfig { tombstone_mode: true, page_size: PAGE_SIZE, ..NodeConfig::default() };
    let latch = MemLatch::new(3);
    let mut buf = vec![0u8; PAGE_SIZE];

    let mut node = Node::begin_create(&mut buf, &latch, &registry, config, true).unwrap();
    for (k, v) in [(1u64, 10u64), (3, 30), (2, 20)] {
        let sr = node.index_of(&k).unwrap();
        node.insert_value(sr, &k, &v).unwrap();
    }

    let sr = node.index_of(&2u64).unwrap();
    node.delete(sr as usize).unwrap();

    assert_eq!(node.size(), 3);
    assert!(node.is_tombstone_at(1).unwrap());

    node.end_create(&latch).unwrap();
}

/// Scenario 4: inserting a pointer ahead of an existing marker rewrites
/// its `pointerIndex`, and `pointerAt` resolves through `leftPointer`.
#[test]
fn scenario_4_insert_pointer_rewrites_marker_index() {
    let registry = int_registry();
    let config = NodeConfig { page_size: PAGE_SIZE, ..NodeConfig::default() };
    let latch = MemLatch::new(4);
    let mut buf = vec![0u8; PAGE_SIZE];

    let mut node = Node::begin_create(&mut buf, &latch, &registry, config, false).unwrap();
    node.set_left_pointer(100).unwrap();
    for (k, p) in [(10u64, 101u64), (20, 102), (30, 103)] {
        let sr = node.index_of(&k).unwrap();
        node.insert_pointer(to_index(sr), &k, p).unwrap();
    }
    node.insert_marker(0, 1, 7, 2).unwrap();

    let sr = node.index_of(&15u64).unwrap();
    node.insert_pointer(to_index(sr), &15u64, 104).unwrap();

    assert_eq!(node.marker_at(0).unwrap().pointer_index, 2);
    assert_eq!(node.pointer_at(to_insertion_point(0)).unwrap(), 100);
    assert_eq!(node.pointer_at(0).unwrap(), 101);
    assert_eq!(node.pointer_at(1).unwrap(), 104);
    assert_eq!(node.pointer_at(2).unwrap(), 102);

    node.end_create(&latch).unwrap();
}

/// Scenario 5: fill a leaf until it no longer fits a full entry, then
/// `moveTailTo` a sibling until the source is at least half free.
#[test]
fn scenario_5_fill_then_split_leaves_source_at_least_half_free() {
    let registry = int_registry();
    let config = NodeConfig { page_size: PAGE_SIZE, ..NodeConfig::default() };
    let latch_src = MemLatch::new(5);
    let latch_dest = MemLatch::new(6);
    let mut buf_src = vec![0u8; PAGE_SIZE];
    let mut buf_dest = vec![0u8; PAGE_SIZE];

    let mut src = Node::begin_create(&mut buf_src, &latch_src, &registry, config, true).unwrap();
    let entry_size = src.full_entry_size(8, 8);
    let mut k = 0u64;
    loop {
        if !src.delta_fits(entry_size).unwrap() {
            break;
        }
        let sr = src.index_of(&k).unwrap();
        src.insert_value(sr, &k, &(k * 10)).unwrap();
        k += 1;
    }

    const HEADER_SIZE: usize = 48;
    let half = (PAGE_SIZE - HEADER_SIZE) / 2;
    let count = src.count_entries_to_move_until_half_free().unwrap();
    assert!(count > 0);

    let mut dest = Node::begin_create(&mut buf_dest, &latch_dest, &registry, config, true).unwrap();
    src.move_tail_to(&mut dest, count).unwrap();

    assert!(src.free_bytes().unwrap() >= half);
    assert_eq!(dest.size() as usize, count);

    src.end_create(&latch_src).unwrap();
    dest.end_create(&latch_dest).unwrap();
}

/// Scenario 6: delete an out-of-line value, observe the remaining
/// out-of-line value still decodes correctly and the heap reclaimed the
/// freed bytes.
#[test]
fn scenario_6_deleting_an_out_of_line_value_preserves_the_other() {
    let registry = bytes_registry();
    let config = NodeConfig { page_size: PAGE_SIZE, ..NodeConfig::default() };
    let latch = MemLatch::new(7);
    let mut buf = vec![0u8; PAGE_SIZE];

    let mut node = Node::begin_create(&mut buf, &latch, &registry, config, true).unwrap();

    let first_value = vec![1u8; 100];
    let second_value = vec![2u8; 50];
    let first_blob_size = 4 + first_value.len(); // BytesEncoder's u32 length prefix

    let sr = node.index_of(&1u64).unwrap();
    node.insert_value(sr, &1u64, &first_value).unwrap();

    let sr = node.index_of(&2u64).unwrap();
    node.insert_value(sr, &2u64, &second_value).unwrap();

    let free_before_delete = node.free_data_position().unwrap();

    let sr = node.index_of(&1u64).unwrap();
    assert!(!is_insertion_point(sr));
    node.delete(sr as usize).unwrap();

    assert_eq!(node.size(), 1);
    assert_eq!(node.key_at(0).unwrap(), 2);
    assert_eq!(node.value_at(0).unwrap(), second_value);
    assert_eq!(
        node.free_data_position().unwrap(),
        free_before_delete + first_blob_size as u32
    );

    node.end_create(&latch).unwrap();
}
