//! Interrupt dispatch: vector stubs, the saved-register frame, and the
//! per-vector handler registry.
//!
//! Each of the 48 low vectors gets a small assembly stub that normalises
//! the stack (dummy error code where the CPU pushes none, then the vector
//! number), saves the general-purpose registers and the data segment,
//! switches to kernel data segments and calls into `isr_router` /
//! `irq_router` with a pointer to the saved frame. Vector 0x80 shares the
//! same frame layout and lands in `syscall_entry`.

use core::arch::global_asm;

use lazy_static::lazy_static;
use spin::Mutex;

use crate::internal::{cpu, pic};

/// Number of IDT vectors.
pub const IDT_ENTRIES: usize = 256;
/// First vector of the remapped master PIC.
pub const IRQ_BASE: usize = pic::MASTER_VECTOR_BASE as usize;
/// Vector of the timer IRQ (IRQ0).
pub const TIMER_VECTOR: usize = IRQ_BASE;
/// Vector of the keyboard IRQ (IRQ1).
pub const KEYBOARD_VECTOR: usize = IRQ_BASE + 1;
/// Vector of the page fault exception.
pub const PAGE_FAULT_VECTOR: usize = 14;
/// Vector of the syscall gate.
pub const SYSCALL_VECTOR: usize = 0x80;

// Vectors 8, 10-14, 17 and 21 push a CPU error code; the rest get a
// synthesized zero so the frame layout is uniform.
global_asm!(
    r#"
    .macro isr_noerr num
    isr\num:
        push 0
        push \num
        jmp isr_common
    .endm

    .macro isr_err num
    isr\num:
        push \num
        jmp isr_common
    .endm

    .macro irq_stub num
    isr\num:
        push 0
        push \num
        jmp irq_common
    .endm

    .macro dispatch_common name, handler
    \name:
        pusha
        push ds
        mov ax, 0x10
        mov ds, ax
        mov es, ax
        mov fs, ax
        mov gs, ax
        push esp
        call \handler
        add esp, 4
        pop eax
        mov ds, ax
        mov es, ax
        mov fs, ax
        mov gs, ax
        popa
        add esp, 8
        iretd
    .endm

    .section .text

    dispatch_common isr_common, isr_router
    dispatch_common irq_common, irq_router
    dispatch_common syscall_common, syscall_entry

    isr_noerr 0
    isr_noerr 1
    isr_noerr 2
    isr_noerr 3
    isr_noerr 4
    isr_noerr 5
    isr_noerr 6
    isr_noerr 7
    isr_err   8
    isr_noerr 9
    isr_err   10
    isr_err   11
    isr_err   12
    isr_err   13
    isr_err   14
    isr_noerr 15
    isr_noerr 16
    isr_err   17
    isr_noerr 18
    isr_noerr 19
    isr_noerr 20
    isr_err   21
    isr_noerr 22
    isr_noerr 23
    isr_noerr 24
    isr_noerr 25
    isr_noerr 26
    isr_noerr 27
    isr_noerr 28
    isr_noerr 29
    isr_noerr 30
    isr_noerr 31

    irq_stub 32
    irq_stub 33
    irq_stub 34
    irq_stub 35
    irq_stub 36
    irq_stub 37
    irq_stub 38
    irq_stub 39
    irq_stub 40
    irq_stub 41
    irq_stub 42
    irq_stub 43
    irq_stub 44
    irq_stub 45
    irq_stub 46
    irq_stub 47

    .global syscall_stub
    syscall_stub:
        push 0
        push 0x80
        jmp syscall_common

    .section .rodata
    .global isr_stub_table
    .align 4
    isr_stub_table:
        .long isr0,  isr1,  isr2,  isr3,  isr4,  isr5,  isr6,  isr7
        .long isr8,  isr9,  isr10, isr11, isr12, isr13, isr14, isr15
        .long isr16, isr17, isr18, isr19, isr20, isr21, isr22, isr23
        .long isr24, isr25, isr26, isr27, isr28, isr29, isr30, isr31
        .long isr32, isr33, isr34, isr35, isr36, isr37, isr38, isr39
        .long isr40, isr41, isr42, isr43, isr44, isr45, isr46, isr47
    "#
);

unsafe extern "C" {
    #[link_name = "isr_stub_table"]
    static STUB_TABLE: [u32; 48];
    fn syscall_stub();
}

/// Entry address of the stub for one of the 48 low vectors.
pub(crate) fn stub_addr(vector: usize) -> u32 {
    unsafe { STUB_TABLE[vector] }
}

/// Entry address of the `int 0x80` stub.
pub(crate) fn syscall_stub_addr() -> u32 {
    syscall_stub as usize as u32
}

/// Register snapshot the stubs push before entering Rust. The final five
/// fields are CPU-pushed; `user_esp`/`user_ss` are only present when the
/// interrupt crossed from ring 3.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct InterruptFrame {
    /// Saved data segment of the interrupted context.
    pub ds: u32,
    #[allow(missing_docs)]
    pub edi: u32,
    #[allow(missing_docs)]
    pub esi: u32,
    #[allow(missing_docs)]
    pub ebp: u32,
    /// ESP value captured by `pusha`; ignored by `popa`.
    pub esp_dummy: u32,
    #[allow(missing_docs)]
    pub ebx: u32,
    #[allow(missing_docs)]
    pub edx: u32,
    #[allow(missing_docs)]
    pub ecx: u32,
    #[allow(missing_docs)]
    pub eax: u32,
    /// Vector number pushed by the stub.
    pub vector: u32,
    /// CPU error code, or 0 for vectors that push none.
    pub err_code: u32,
    #[allow(missing_docs)]
    pub eip: u32,
    #[allow(missing_docs)]
    pub cs: u32,
    #[allow(missing_docs)]
    pub eflags: u32,
    /// User stack pointer (privilege crossing only).
    pub user_esp: u32,
    /// User stack segment (privilege crossing only).
    pub user_ss: u32,
}

impl InterruptFrame {
    /// Whether the interrupted context was running in ring 3.
    pub fn from_user_mode(&self) -> bool {
        self.cs & 3 == 3
    }
}

/// A registered interrupt handler: the function plus an opaque context
/// word handed back on every invocation.
pub type HandlerFn = fn(&mut InterruptFrame, usize);

#[derive(Clone, Copy)]
enum Slot {
    Unregistered,
    Registered { handler: HandlerFn, ctx: usize },
}

lazy_static! {
    static ref HANDLERS: Mutex<[Slot; IDT_ENTRIES]> =
        Mutex::new([Slot::Unregistered; IDT_ENTRIES]);
}

/// Rejected `register_handler` vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidVector(pub usize);

/// Install (or replace) the handler for a vector. The swap happens with
/// local IRQs disabled so a concurrent interrupt sees either the old or
/// the new slot, never a torn one.
pub fn register_handler(
    vector: usize,
    handler: HandlerFn,
    ctx: usize,
) -> Result<(), InvalidVector> {
    if vector >= IDT_ENTRIES {
        return Err(InvalidVector(vector));
    }
    cpu::without_interrupts(|| {
        HANDLERS.lock()[vector] = Slot::Registered { handler, ctx };
    });
    Ok(())
}

fn slot(vector: usize) -> Slot {
    HANDLERS.lock()[vector]
}

static EXCEPTION_NAMES: [&str; 32] = [
    "Division Error",
    "Debug",
    "Non-Maskable Interrupt",
    "Breakpoint",
    "Overflow",
    "Bound Range Exceeded",
    "Invalid Opcode",
    "Device Not Available",
    "Double Fault",
    "Coprocessor Segment Overrun",
    "Invalid TSS",
    "Segment Not Present",
    "Stack-Segment Fault",
    "General Protection Fault",
    "Page Fault",
    "Reserved",
    "x87 Floating-Point Exception",
    "Alignment Check",
    "Machine Check",
    "SIMD Floating-Point Exception",
    "Virtualization Exception",
    "Control Protection Exception",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Hypervisor Injection Exception",
    "VMM Communication Exception",
    "Security Exception",
    "Reserved",
];

/// Human-readable name of a CPU exception vector.
pub fn exception_name(vector: usize) -> &'static str {
    EXCEPTION_NAMES.get(vector).copied().unwrap_or("Unknown")
}

/// C-side router for CPU exceptions (vectors 0–31). Never sends EOI:
/// exceptions do not come from the PIC.
#[unsafe(no_mangle)]
extern "C" fn isr_router(frame: *mut InterruptFrame) {
    let frame = unsafe { &mut *frame };
    match slot(frame.vector as usize) {
        Slot::Registered { handler, ctx } => handler(frame, ctx),
        Slot::Unregistered => {
            panic!(
                "EXCEPTION: {} (vector {}) at EIP {:#010x}, error code {:#x}",
                exception_name(frame.vector as usize),
                frame.vector,
                frame.eip,
                frame.err_code,
            );
        }
    }
}

/// C-side router for hardware IRQs (vectors 32–47). An unregistered IRQ is
/// acknowledged and dropped.
#[unsafe(no_mangle)]
extern "C" fn irq_router(frame: *mut InterruptFrame) {
    let frame = unsafe { &mut *frame };
    if let Slot::Registered { handler, ctx } = slot(frame.vector as usize) {
        handler(frame, ctx);
    }
    pic::end_of_interrupt(frame.vector as u8);
}

/// Remap the PIC pair and open the interrupt flag. The IDT must already
/// be loaded.
pub fn init() {
    pic::init();
    cpu::enable_interrupts();
    log::info!("Interrupts enabled");
}

#[test_case]
fn test_register_handler_rejects_high_vector() {
    fn nop(_: &mut InterruptFrame, _: usize) {}
    assert_eq!(register_handler(256, nop, 0), Err(InvalidVector(256)));
    assert_eq!(register_handler(usize::MAX, nop, 0), Err(InvalidVector(usize::MAX)));
}

#[test_case]
fn test_registered_handler_receives_frame_and_ctx() {
    use core::sync::atomic::{AtomicUsize, Ordering};
    static SEEN_CTX: AtomicUsize = AtomicUsize::new(0);
    static CALLS: AtomicUsize = AtomicUsize::new(0);

    fn probe(frame: &mut InterruptFrame, ctx: usize) {
        SEEN_CTX.store(ctx, Ordering::SeqCst);
        CALLS.fetch_add(1, Ordering::SeqCst);
        frame.eax = 0x1234;
    }

    register_handler(200, probe, 77).unwrap();
    let mut frame = unsafe { core::mem::zeroed::<InterruptFrame>() };
    frame.vector = 200;
    isr_router(&mut frame);
    assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    assert_eq!(SEEN_CTX.load(Ordering::SeqCst), 77);
    assert_eq!(frame.eax, 0x1234);
}
