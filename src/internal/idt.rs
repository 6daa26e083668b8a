//! Interrupt Descriptor Table: 256 gates wired to the dispatch stubs.
//!
//! Vectors 0–31 are the CPU exceptions, 32–47 the remapped IRQs, 0x80 the
//! syscall gate (DPL 3 so ring 3 may `int 0x80` into it). The table is
//! immutable once loaded; per-vector behavior changes go through the
//! handler registry in `interrupts`, not through the gates.

use bit_field::BitField;
use lazy_static::lazy_static;

use crate::internal::cpu::{self, DescriptorTablePointer};
use crate::internal::gdt::KERNEL_CODE_SELECTOR;
use crate::internal::interrupts::{self, IDT_ENTRIES, IRQ_BASE, SYSCALL_VECTOR};

// Type byte: present, 32-bit interrupt gate, DPL in bits 5..7.
const GATE_INTERRUPT_DPL0: u8 = 0x8E;
const GATE_INTERRUPT_DPL3: u8 = 0xEE;

/// One packed 8-byte gate descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C, packed)]
pub struct IdtEntry {
    offset_low: u16,
    selector: u16,
    zero: u8,
    type_attr: u8,
    offset_high: u16,
}

impl IdtEntry {
    const fn missing() -> IdtEntry {
        IdtEntry {
            offset_low: 0,
            selector: 0,
            zero: 0,
            type_attr: 0,
            offset_high: 0,
        }
    }

    fn new(handler: u32, selector: u16, type_attr: u8) -> IdtEntry {
        IdtEntry {
            offset_low: handler.get_bits(0..16) as u16,
            selector,
            zero: 0,
            type_attr,
            offset_high: handler.get_bits(16..32) as u16,
        }
    }
}

/// The gate table itself.
#[repr(C, align(8))]
pub struct Idt {
    entries: [IdtEntry; IDT_ENTRIES],
}

impl Idt {
    fn new() -> Idt {
        Idt {
            entries: [IdtEntry::missing(); IDT_ENTRIES],
        }
    }

    fn set_gate(&mut self, vector: usize, handler: u32, type_attr: u8) {
        self.entries[vector] = IdtEntry::new(handler, KERNEL_CODE_SELECTOR, type_attr);
    }

    fn pointer(&self) -> DescriptorTablePointer {
        DescriptorTablePointer {
            limit: (core::mem::size_of::<Idt>() - 1) as u16,
            base: self as *const Idt as u32,
        }
    }
}

lazy_static! {
    static ref IDT: Idt = {
        let mut idt = Idt::new();
        for vector in 0..IRQ_BASE + 16 {
            idt.set_gate(vector, interrupts::stub_addr(vector), GATE_INTERRUPT_DPL0);
        }
        idt.set_gate(
            SYSCALL_VECTOR,
            interrupts::syscall_stub_addr(),
            GATE_INTERRUPT_DPL3,
        );
        idt
    };
}

/// Load the IDT.
pub fn init() {
    unsafe {
        cpu::lidt(&IDT.pointer());
    }
}

#[test_case]
fn test_gate_packing_splits_offset() {
    let entry = IdtEntry::new(0xDEAD_BEEF, KERNEL_CODE_SELECTOR, GATE_INTERRUPT_DPL0);
    let low = entry.offset_low;
    let high = entry.offset_high;
    assert_eq!(low, 0xBEEF);
    assert_eq!(high, 0xDEAD);
}

#[test_case]
fn test_syscall_gate_is_user_invocable() {
    let entry = IDT.entries[SYSCALL_VECTOR];
    let attr = entry.type_attr;
    assert_eq!(attr, GATE_INTERRUPT_DPL3);
    let attr = IDT.entries[IRQ_BASE].type_attr;
    assert_eq!(attr, GATE_INTERRUPT_DPL0);
}
