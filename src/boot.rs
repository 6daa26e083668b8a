//! Multiboot2 header and the `_start` stub that hands over to `kernel_main`.

use core::arch::global_asm;

use conquer_once::spin::OnceCell;

/// Magic value a Multiboot2 loader leaves in EAX at handoff.
pub const MULTIBOOT2_BOOTLOADER_MAGIC: u32 = 0x36d76289;

/// What the loader handed us. Recorded once at entry; the info structure
/// itself is not parsed here.
#[derive(Debug, Clone, Copy)]
pub struct BootHandoff {
    /// EAX at entry; must be `MULTIBOOT2_BOOTLOADER_MAGIC`.
    pub magic: u32,
    /// EBX at entry: physical address of the Multiboot2 info structure.
    pub info_addr: u32,
}

static HANDOFF: OnceCell<BootHandoff> = OnceCell::uninit();

/// Store the loader handoff. Call once from `kernel_main`.
pub fn record_handoff(magic: u32, info_addr: u32) {
    HANDOFF
        .try_init_once(|| BootHandoff { magic, info_addr })
        .expect("boot handoff recorded twice");
}

/// The recorded handoff, if `record_handoff` has run.
pub fn handoff() -> Option<BootHandoff> {
    HANDOFF.try_get().ok().copied()
}

global_asm!(
    r#"
    .section .multiboot2
    .align 8
    mb2_header_start:
        .long 0xe85250d6                                    # Multiboot2 magic
        .long 0                                             # architecture: i386 protected mode
        .long mb2_header_end - mb2_header_start
        .long -(0xe85250d6 + 0 + (mb2_header_end - mb2_header_start))
        # end tag
        .word 0
        .word 0
        .long 8
    mb2_header_end:

    .section .bss
    .align 16
    boot_stack_bottom:
        .skip 64 * 1024
    boot_stack_top:

    .section .text
    .global _start
    _start:
        cli
        lea esp, [boot_stack_top]
        push ebx                # Multiboot2 info pointer
        push eax                # loader magic
        call kernel_main
    1:
        hlt
        jmp 1b
    "#
);
