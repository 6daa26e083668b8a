//! Paging bootstrap: identity-map the first 4 MiB and turn on CR0.PG.
//!
//! One page directory and one page table are enough for the window the
//! kernel lives in (image, stack, heap and the VGA buffer all sit below
//! 4 MiB). Both tables come off the heap: a 4 KiB-aligned region is cut
//! out of an oversized allocation, which the tables then own forever.

use core::sync::atomic::{AtomicUsize, Ordering};

use bitflags::bitflags;
use log::info;

use crate::internal::cpu;
use crate::internal::memory::heap;

/// Page size, and the alignment page tables require.
pub const PAGE_SIZE: usize = 4096;
/// Entries per page directory / page table.
pub const ENTRIES: usize = 1024;
/// End of the identity-mapped region: one full page table.
pub const IDENTITY_MAP_END: usize = ENTRIES * PAGE_SIZE;

bitflags! {
    /// Page directory / page table entry bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFlags: u32 {
        /// Entry maps a present page.
        const PRESENT = 1 << 0;
        /// Page is writable.
        const WRITABLE = 1 << 1;
        /// Page is reachable from ring 3.
        const USER = 1 << 2;
    }
}

static PAGE_DIRECTORY: AtomicUsize = AtomicUsize::new(0);

/// Carve one zeroed, page-aligned table out of the heap. Exhaustion here
/// means the kernel cannot boot, so it panics rather than reporting.
fn alloc_table() -> &'static mut [u32; ENTRIES] {
    let raw = heap::malloc(PAGE_SIZE * 2);
    assert!(!raw.is_null(), "out of heap while building page tables");
    let aligned = (raw as usize + PAGE_SIZE - 1) & !(PAGE_SIZE - 1);
    let table = aligned as *mut [u32; ENTRIES];
    unsafe {
        (*table).fill(0);
        &mut *table
    }
}

/// Build the identity mapping and enable paging.
pub fn init() {
    let flags = (PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER).bits();

    let directory = alloc_table();
    let table = alloc_table();

    for (i, entry) in table.iter_mut().enumerate() {
        *entry = (i * PAGE_SIZE) as u32 | flags;
    }
    directory[0] = table.as_ptr() as u32 | flags;

    let directory_addr = directory.as_ptr() as usize;
    PAGE_DIRECTORY.store(directory_addr, Ordering::SeqCst);

    unsafe {
        cpu::write_cr3(directory_addr as u32);
        cpu::enable_paging();
    }
    info!(
        "Paging enabled, identity map 0..{:#x}, directory at {:#010x}",
        IDENTITY_MAP_END, directory_addr
    );
}

/// Physical address of the live page directory (0 before `init`).
pub fn page_directory() -> usize {
    PAGE_DIRECTORY.load(Ordering::SeqCst)
}

#[test_case]
fn test_tables_are_page_aligned() {
    let table = alloc_table();
    assert_eq!(table.as_ptr() as usize % PAGE_SIZE, 0);
    assert!(table.iter().all(|&e| e == 0));
}

#[test_case]
fn test_identity_entry_encoding() {
    let flags = (PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER).bits();
    let entry = (5 * PAGE_SIZE) as u32 | flags;
    assert_eq!(entry & 0xFFFF_F000, (5 * PAGE_SIZE) as u32);
    assert_eq!(entry & 0x7, 0x7);
}
