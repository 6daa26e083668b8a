//! Global Descriptor Table: flat 32-bit segment model.
//!
//! Five segment descriptors — null, kernel code/data (DPL 0), user
//! code/data (DPL 3) — all base 0, limit 4 GiB, 4 KiB granularity, plus
//! the TSS descriptor the CPU needs to find a kernel stack when ring 3
//! traps into `int 0x80`. Loaded once at boot and immutable afterwards.

use bit_field::BitField;
use lazy_static::lazy_static;

use crate::internal::cpu::{self, DescriptorTablePointer};

/// Kernel code segment selector (ring 0).
pub const KERNEL_CODE_SELECTOR: u16 = 0x08;
/// Kernel data segment selector (ring 0).
pub const KERNEL_DATA_SELECTOR: u16 = 0x10;
/// User code segment selector (ring 3, RPL 3).
pub const USER_CODE_SELECTOR: u16 = 0x18 | 3;
/// User data segment selector (ring 3, RPL 3).
pub const USER_DATA_SELECTOR: u16 = 0x20 | 3;
/// Task state segment selector.
pub const TSS_SELECTOR: u16 = 0x28;

// Access bytes: present | S=code/data | type. DPL sits in bits 5..7.
const ACCESS_KERNEL_CODE: u8 = 0x9A;
const ACCESS_KERNEL_DATA: u8 = 0x92;
const ACCESS_USER_CODE: u8 = 0xFA;
const ACCESS_USER_DATA: u8 = 0xF2;
// System descriptor: present, 32-bit available TSS.
const ACCESS_TSS: u8 = 0x89;

// Flags nibble: 4 KiB granularity, 32-bit operand size.
const FLAGS_4K_32BIT: u8 = 0b1100;
// TSS limit counts bytes.
const FLAGS_BYTE: u8 = 0b0000;

/// Kernel stack the CPU switches to on a ring-3 → ring-0 transition.
const INTERRUPT_STACK_SIZE: usize = 16 * 1024;

#[repr(C, align(16))]
struct InterruptStack([u8; INTERRUPT_STACK_SIZE]);

static INTERRUPT_STACK: InterruptStack = InterruptStack([0; INTERRUPT_STACK_SIZE]);

/// 32-bit Task State Segment. Only `ss0`/`esp0` matter here: hardware
/// task switching is not used, the CPU just reads the ring-0 stack out
/// of it on privilege crossings.
#[repr(C, packed)]
struct TaskStateSegment {
    link: u32,
    esp0: u32,
    ss0: u32,
    unused: [u32; 22],
    reserved: u16,
    iomap_base: u16,
}

impl TaskStateSegment {
    fn new() -> TaskStateSegment {
        let stack_top = INTERRUPT_STACK.0.as_ptr() as u32 + INTERRUPT_STACK_SIZE as u32;
        TaskStateSegment {
            link: 0,
            esp0: stack_top,
            ss0: KERNEL_DATA_SELECTOR as u32,
            unused: [0; 22],
            reserved: 0,
            iomap_base: core::mem::size_of::<TaskStateSegment>() as u16,
        }
    }
}

/// One packed 8-byte segment descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct GdtEntry(u64);

impl GdtEntry {
    /// The mandatory all-zero descriptor at index 0.
    pub const fn null() -> GdtEntry {
        GdtEntry(0)
    }

    /// Pack `(base, limit, access, flags)` into descriptor layout.
    /// `limit` is in 4 KiB units when the granularity flag is set.
    pub fn new(base: u32, limit: u32, access: u8, flags: u8) -> GdtEntry {
        let mut raw = 0u64;
        raw.set_bits(0..16, (limit & 0xFFFF) as u64);
        raw.set_bits(16..40, (base & 0xFF_FFFF) as u64);
        raw.set_bits(40..48, access as u64);
        raw.set_bits(48..52, ((limit >> 16) & 0xF) as u64);
        raw.set_bits(52..56, flags as u64);
        raw.set_bits(56..64, (base >> 24) as u64);
        GdtEntry(raw)
    }
}

/// The table itself: the five flat segments, then the TSS descriptor.
#[repr(C, align(8))]
pub struct Gdt {
    entries: [GdtEntry; 6],
}

impl Gdt {
    fn new(tss: &'static TaskStateSegment) -> Gdt {
        let flat = |access| GdtEntry::new(0, 0xFFFFF, access, FLAGS_4K_32BIT);
        let tss_base = tss as *const TaskStateSegment as u32;
        let tss_limit = core::mem::size_of::<TaskStateSegment>() as u32 - 1;
        Gdt {
            entries: [
                GdtEntry::null(),
                flat(ACCESS_KERNEL_CODE),
                flat(ACCESS_KERNEL_DATA),
                flat(ACCESS_USER_CODE),
                flat(ACCESS_USER_DATA),
                GdtEntry::new(tss_base, tss_limit, ACCESS_TSS, FLAGS_BYTE),
            ],
        }
    }

    fn pointer(&self) -> DescriptorTablePointer {
        DescriptorTablePointer {
            limit: (core::mem::size_of::<Gdt>() - 1) as u16,
            base: self as *const Gdt as u32,
        }
    }
}

lazy_static! {
    static ref TSS: TaskStateSegment = TaskStateSegment::new();
    static ref GDT: Gdt = Gdt::new(&TSS);
}

/// Build and load the GDT, reload all segment registers so the new
/// descriptors take effect, and point TR at the TSS. Must run before any
/// user-mode transition.
pub fn init() {
    unsafe {
        cpu::lgdt(&GDT.pointer());
        cpu::reload_segments(KERNEL_CODE_SELECTOR, KERNEL_DATA_SELECTOR);
        cpu::ltr(TSS_SELECTOR);
    }
}

#[test_case]
fn test_descriptor_packing() {
    // Flat 4 GiB kernel code descriptor, the canonical 0x00CF9A000000FFFF.
    let entry = GdtEntry::new(0, 0xFFFFF, ACCESS_KERNEL_CODE, FLAGS_4K_32BIT);
    assert_eq!(entry.0, 0x00CF_9A00_0000_FFFF);
}

#[test_case]
fn test_selector_privilege_levels() {
    assert_eq!(KERNEL_CODE_SELECTOR & 3, 0);
    assert_eq!(USER_CODE_SELECTOR & 3, 3);
    assert_eq!(USER_DATA_SELECTOR & 3, 3);
    assert_eq!(TSS_SELECTOR & 3, 0);
}

#[test_case]
fn test_tss_points_at_interrupt_stack() {
    let esp0 = TSS.esp0;
    let base = INTERRUPT_STACK.0.as_ptr() as u32;
    assert_eq!(esp0, base + INTERRUPT_STACK_SIZE as u32);
    let ss0 = TSS.ss0;
    assert_eq!(ss0, KERNEL_DATA_SELECTOR as u32);
}
