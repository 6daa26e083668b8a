//! Kernel heap: a first-fit free list that extends bump-wise into the
//! region above the kernel image.
//!
//! Blocks are `(header, payload)` pairs forming a singly linked list in
//! address order. Sizes are kept in 16-byte multiples so every payload is
//! 16-byte aligned without per-allocation padding. The heap is
//! single-mutator: nothing in IRQ context may allocate.

use core::alloc::{GlobalAlloc, Layout};
use core::ptr;

use log::info;
use spin::Mutex;

use crate::internal::memory::paging;
use crate::kprintln;

/// Hard cap on heap growth.
pub const MAX_HEAP_SIZE: usize = 16 * 1024 * 1024;

/// Alignment every payload gets for free; `GlobalAlloc` requests above
/// this are refused.
const MIN_ALIGN: usize = 16;

/// Block header. `size` is the payload size and excludes the header; the
/// payload starts immediately after (the header is align(16), so payloads
/// are too).
#[repr(C, align(16))]
struct Block {
    size: usize,
    free: bool,
    next: *mut Block,
}

const HEADER_SIZE: usize = core::mem::size_of::<Block>();

/// Smallest leftover worth splitting off as its own free block.
const MIN_SPLIT: usize = HEADER_SIZE + MIN_ALIGN;

const fn round_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

struct FreeList {
    head: *mut Block,
    heap_start: usize,
    bump_end: usize,
    heap_limit: usize,
}

// Raw block pointers never leave the lock.
unsafe impl Send for FreeList {}

impl FreeList {
    const fn empty() -> FreeList {
        FreeList {
            head: ptr::null_mut(),
            heap_start: 0,
            bump_end: 0,
            heap_limit: 0,
        }
    }

    fn init(&mut self, start: usize) {
        let start = round_up(start, paging::PAGE_SIZE);
        // the identity-mapped window is all the address space we get to
        // touch once CR0.PG goes live
        let limit = core::cmp::min(start + MAX_HEAP_SIZE, paging::IDENTITY_MAP_END);
        assert!(start < limit, "no heap space below the identity-mapped window");
        self.head = ptr::null_mut();
        self.heap_start = start;
        self.bump_end = start;
        self.heap_limit = limit;
    }

    unsafe fn payload(block: *mut Block) -> *mut u8 {
        unsafe { (block as *mut u8).add(HEADER_SIZE) }
    }

    unsafe fn header(payload: *mut u8) -> *mut Block {
        unsafe { payload.sub(HEADER_SIZE) as *mut Block }
    }

    fn malloc(&mut self, size: usize) -> *mut u8 {
        if size == 0 || size > MAX_HEAP_SIZE || self.heap_limit == 0 {
            return ptr::null_mut();
        }
        let size = round_up(size, MIN_ALIGN);

        // first fit over the existing list
        let mut cursor = self.head;
        while !cursor.is_null() {
            unsafe {
                if (*cursor).free && (*cursor).size >= size {
                    if (*cursor).size - size >= MIN_SPLIT {
                        self.split(cursor, size);
                    }
                    (*cursor).free = false;
                    return Self::payload(cursor);
                }
                cursor = (*cursor).next;
            }
        }

        self.extend(size)
    }

    /// Carve `size` bytes out of a larger free block, leaving the
    /// remainder as a new free block right behind it.
    unsafe fn split(&mut self, block: *mut Block, size: usize) {
        unsafe {
            let remainder = Self::payload(block).add(size) as *mut Block;
            remainder.write(Block {
                size: (*block).size - size - HEADER_SIZE,
                free: true,
                next: (*block).next,
            });
            (*block).size = size;
            (*block).next = remainder;
        }
    }

    /// Append a fresh block at the bump end. Null once the cap is hit.
    fn extend(&mut self, size: usize) -> *mut u8 {
        if self.bump_end + HEADER_SIZE + size > self.heap_limit {
            return ptr::null_mut();
        }

        let block = self.bump_end as *mut Block;
        unsafe {
            block.write(Block {
                size,
                free: false,
                next: ptr::null_mut(),
            });
        }
        self.bump_end += HEADER_SIZE + size;

        if self.head.is_null() {
            self.head = block;
        } else {
            let mut cursor = self.head;
            unsafe {
                while !(*cursor).next.is_null() {
                    cursor = (*cursor).next;
                }
                (*cursor).next = block;
            }
        }

        unsafe { Self::payload(block) }
    }

    fn free(&mut self, payload: *mut u8) {
        if payload.is_null() {
            return;
        }
        let block = unsafe { Self::header(payload) };
        debug_assert!(
            (block as usize) >= self.heap_start && (block as usize) < self.bump_end,
            "free of pointer outside the heap"
        );
        unsafe {
            (*block).free = true;
            self.coalesce_forward(block);
        }
    }

    /// Merge with the next block when it is free and physically adjacent.
    unsafe fn coalesce_forward(&mut self, block: *mut Block) {
        unsafe {
            let next = (*block).next;
            if next.is_null() || !(*next).free {
                return;
            }
            let end = Self::payload(block).add((*block).size) as *mut Block;
            if end == next {
                (*block).size += HEADER_SIZE + (*next).size;
                (*block).next = (*next).next;
            }
        }
    }

    fn stats(&self) -> (usize, usize, usize) {
        let mut used = 0;
        let mut free = 0;
        let mut blocks = 0;
        let mut cursor = self.head;
        while !cursor.is_null() {
            let block = unsafe { &*cursor };
            if block.free {
                free += block.size;
            } else {
                used += block.size;
            }
            blocks += 1;
            cursor = block.next;
        }
        free += self.heap_limit - self.bump_end;
        (used, free, blocks)
    }
}

struct LockedHeap(Mutex<FreeList>);

#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap(Mutex::new(FreeList::empty()));

unsafe impl GlobalAlloc for LockedHeap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > MIN_ALIGN {
            return ptr::null_mut();
        }
        self.0.lock().malloc(layout.size().max(1))
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        self.0.lock().free(ptr);
    }
}

/// Start the heap at `kernel_end`, rounded up to the next page.
pub fn init(kernel_end: usize) {
    let mut list = ALLOCATOR.0.lock();
    list.init(kernel_end);
    info!(
        "Heap at {:#010x}..{:#010x}",
        list.heap_start, list.heap_limit
    );
}

/// Allocate `size` bytes from the kernel heap. Null on exhaustion; that
/// is the only memory error this layer reports.
pub fn malloc(size: usize) -> *mut u8 {
    ALLOCATOR.0.lock().malloc(size)
}

/// Return an allocation to the heap.
pub fn free(ptr: *mut u8) {
    ALLOCATOR.0.lock().free(ptr)
}

fn scaled(bytes: usize) -> (usize, usize, &'static str) {
    if bytes < 1024 {
        (bytes, 0, "bytes")
    } else if bytes < 1024 * 1024 {
        (bytes / 1024, 0, "KiB")
    } else {
        let mib = bytes / (1024 * 1024);
        let decimal = (bytes % (1024 * 1024)) * 10 / (1024 * 1024);
        (mib, decimal, "MiB")
    }
}

fn print_scaled(label: &str, bytes: usize) {
    let (whole, decimal, unit) = scaled(bytes);
    if unit == "MiB" {
        kprintln!("{}: {}.{} {}", label, whole, decimal, unit);
    } else {
        kprintln!("{}: {} {}", label, whole, unit);
    }
}

/// Walk the block list and print a heap summary to the console.
pub fn print_layout() {
    let list = ALLOCATOR.0.lock();
    kprintln!("Memory Information");
    kprintln!("------------------");

    let mut cursor = list.head;
    while !cursor.is_null() {
        let block = unsafe { &*cursor };
        kprintln!(
            "  block {:#010x} size {:6} {}",
            cursor as usize,
            block.size,
            if block.free { "free" } else { "used" }
        );
        cursor = block.next;
    }

    let (used, free, blocks) = list.stats();
    kprintln!("  {} blocks, bump end {:#010x}", blocks, list.bump_end);
    print_scaled("Memory Used", used);
    print_scaled("Free Memory", free);
    kprintln!(
        "Heap Range: {:#010x} to {:#010x}",
        list.heap_start,
        list.heap_limit
    );
}

#[test_case]
fn test_malloc_free_reuse() {
    let p1 = malloc(12345);
    let p2 = malloc(54321);
    let p3 = malloc(13331);
    assert!(!p1.is_null() && !p2.is_null() && !p3.is_null());
    free(p2);
    let p4 = malloc(1000);
    assert!(!p4.is_null());
    assert_ne!(p4, p1);
    assert_ne!(p4, p3);
    free(p1);
    free(p3);
    free(p4);
}

#[test_case]
fn test_allocations_do_not_overlap() {
    let a = malloc(100);
    let b = malloc(100);
    assert!(!a.is_null() && !b.is_null());
    let a_range = a as usize..a as usize + 100;
    assert!(!a_range.contains(&(b as usize)));
    assert!(!a_range.contains(&(b as usize + 99)));
    unsafe {
        ptr::write_bytes(a, 0xAA, 100);
        ptr::write_bytes(b, 0x55, 100);
        assert_eq!(*a, 0xAA);
        assert_eq!(*b, 0x55);
    }
    free(a);
    free(b);
}

#[test_case]
fn test_free_then_same_size_fits() {
    let a = malloc(4096);
    assert!(!a.is_null());
    free(a);
    let b = malloc(4096);
    assert!(!b.is_null());
    free(b);
}

#[test_case]
fn test_payload_alignment() {
    for size in [1usize, 3, 17, 100] {
        let p = malloc(size);
        assert!(!p.is_null());
        assert_eq!(p as usize % 4, 0);
        free(p);
    }
}

#[test_case]
fn test_zero_size_is_null() {
    assert!(malloc(0).is_null());
}
