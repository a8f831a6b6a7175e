/*
 * Swap Area Tests
 *
 * Slot allocation over the swap partition: round trips, free-list
 * reuse, and the tip-drain compaction of the high-water mark.
 */

use super::boot_kernel;
use crate::memory::PAGE_SIZE;
use crate::memory::swap::{self, SECTORS_PER_SLOT};

fn page_filled(byte: u8) -> Vec<u8> {
    vec![byte; PAGE_SIZE]
}

#[test]
fn write_then_read_round_trips() {
    let _k = boot_kernel(8);

    let mut page = page_filled(0);
    for (i, b) in page.iter_mut().enumerate() {
        *b = (i % 251) as u8;
    }

    let slot = swap::write_swap(&page).unwrap();
    assert_eq!(slot.start, 0);
    assert_eq!(swap::allocated_sectors(), SECTORS_PER_SLOT);

    let mut out = page_filled(0);
    swap::read_swap(&mut out, slot).unwrap();
    assert_eq!(out, page);

    // read_swap released the slot; it was the tip, so the high-water
    // mark fell back. Never does a release increase it.
    assert_eq!(swap::allocated_sectors(), 0);
}

#[test]
fn slots_are_allocated_from_the_free_list_first() {
    let _k = boot_kernel(8);

    let s0 = swap::write_swap(&page_filled(0xa0)).unwrap();
    let s1 = swap::write_swap(&page_filled(0xa1)).unwrap();
    let _s2 = swap::write_swap(&page_filled(0xa2)).unwrap();
    assert_eq!(swap::allocated_sectors(), 3 * SECTORS_PER_SLOT);

    // Free a non-tip slot: it parks on the free list.
    swap::free_slot(s0);
    assert_eq!(swap::free_slot_count(), 1);
    assert_eq!(swap::allocated_sectors(), 3 * SECTORS_PER_SLOT);

    // The next write reuses it instead of growing the mark.
    let s3 = swap::write_swap(&page_filled(0xa3)).unwrap();
    assert_eq!(s3.start, s0.start);
    assert_eq!(swap::free_slot_count(), 0);
    assert_eq!(swap::allocated_sectors(), 3 * SECTORS_PER_SLOT);

    let _ = s1;
}

#[test]
fn freeing_the_tip_drains_trailing_free_slots() {
    let _k = boot_kernel(8);

    let s0 = swap::write_swap(&page_filled(1)).unwrap();
    let s1 = swap::write_swap(&page_filled(2)).unwrap();
    let s2 = swap::write_swap(&page_filled(3)).unwrap();
    assert_eq!(swap::allocated_sectors(), 3 * SECTORS_PER_SLOT);

    // s1 is below the tip: parked.
    swap::free_slot(s1);
    assert_eq!(swap::allocated_sectors(), 3 * SECTORS_PER_SLOT);
    assert_eq!(swap::free_slot_count(), 1);

    // Freeing the tip slot shrinks the mark past s1 too.
    swap::free_slot(s2);
    assert_eq!(swap::allocated_sectors(), SECTORS_PER_SLOT);
    assert_eq!(swap::free_slot_count(), 0);

    swap::free_slot(s0);
    assert_eq!(swap::allocated_sectors(), 0);
}

#[test]
fn distinct_slots_do_not_alias() {
    let _k = boot_kernel(8);

    let s0 = swap::write_swap(&page_filled(0x11)).unwrap();
    let s1 = swap::write_swap(&page_filled(0x22)).unwrap();
    assert_ne!(s0.start, s1.start);

    let mut out = page_filled(0);
    swap::read_swap(&mut out, s0).unwrap();
    assert!(out.iter().all(|&b| b == 0x11));
    swap::read_swap(&mut out, s1).unwrap();
    assert!(out.iter().all(|&b| b == 0x22));
}

#[test]
fn exhausted_partition_reports_full() {
    let _k = boot_kernel(8);

    // The fixture's swap disk holds 1024 sectors = 128 slots.
    let page = page_filled(0xee);
    for _ in 0..128 {
        swap::write_swap(&page).unwrap();
    }
    assert_eq!(
        swap::write_swap(&page),
        Err(crate::memory::swap::SwapError::Full)
    );
}
