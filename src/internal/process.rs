//! The single kernel task: identity, exit state, user-mode entry, and the
//! VMA list that backs user-memory access checks.

use alloc::vec::Vec;
use core::arch::asm;

use bitflags::bitflags;
use lazy_static::lazy_static;
use log::info;
use spin::RwLock;

use crate::internal::gdt::{USER_CODE_SELECTOR, USER_DATA_SELECTOR};
use crate::internal::speaker;

bitflags! {
    /// Access rights of one virtual memory area.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VmaFlags: u8 {
        /// Readable from user mode.
        const READ = 1 << 0;
        /// Writable from user mode.
        const WRITE = 1 << 1;
        /// Executable from user mode.
        const EXEC = 1 << 2;
    }
}

/// One virtual memory area of the current task, `[start, end)`.
#[derive(Debug, Clone, Copy)]
pub struct Vma {
    /// First byte of the area.
    pub start: usize,
    /// One past the last byte.
    pub end: usize,
    /// Permissions.
    pub flags: VmaFlags,
}

struct Task {
    pid: u32,
    exit_code: Option<i32>,
    vmas: Vec<Vma>,
}

lazy_static! {
    static ref TASK: RwLock<Task> = RwLock::new(Task {
        pid: 1,
        exit_code: None,
        vmas: Vec::new(),
    });
}

/// get the current process id
pub fn pid() -> u32 {
    TASK.read().pid
}

/// Exit code recorded by SYS_EXIT, if the task has exited.
pub fn exit_code() -> Option<i32> {
    TASK.read().exit_code
}

/// Grant the task access to `[start, end)`.
pub fn add_vma(start: usize, end: usize, flags: VmaFlags) {
    debug_assert!(start < end);
    TASK.write().vmas.push(Vma { start, end, flags });
}

/// Drop the VMA that starts at `start`, if any.
pub fn remove_vma(start: usize) {
    TASK.write().vmas.retain(|vma| vma.start != start);
}

/// Whether `[addr, addr + len)` is fully covered by VMAs carrying the
/// needed permission. Areas may abut, so coverage can span several.
pub fn range_allowed(addr: usize, len: usize, write: bool) -> bool {
    let needed = if write { VmaFlags::WRITE } else { VmaFlags::READ };
    let task = TASK.read();
    let end = addr + len;

    let mut cursor = addr;
    while cursor < end {
        match task
            .vmas
            .iter()
            .find(|vma| vma.start <= cursor && cursor < vma.end && vma.flags.contains(needed))
        {
            Some(vma) => cursor = vma.end,
            None => return false,
        }
    }
    true
}

/// Record the exit and park the CPU. The kernel never returns from
/// SYS_EXIT; what runs next is the boot shell's concern, and there is
/// none here.
pub fn exit(code: i32) -> ! {
    TASK.write().exit_code = Some(code);
    speaker::stop_tone();
    info!("task {} exited with code {}", pid(), code);
    // arriving through an interrupt gate leaves IF clear; the idle loop
    // still wants the timer
    crate::internal::cpu::enable_interrupts();
    crate::hlt_loop();
}

/// Drop to ring 3 at `entry` with the given stack top. The caller must
/// have mapped and VMA-registered both the code and the stack.
pub unsafe fn enter_user_mode(entry: u32, user_stack_top: u32) -> ! {
    unsafe {
        asm!(
            "cli",
            "mov ds, {sel:x}",
            "mov es, {sel:x}",
            "mov fs, {sel:x}",
            "mov gs, {sel:x}",
            "push {sel}",       // SS
            "push {stack}",     // ESP
            "push 0x200",       // EFLAGS with IF set
            "push {code}",      // CS
            "push {entry}",     // EIP
            "iretd",
            sel = in(reg) USER_DATA_SELECTOR as u32,
            code = in(reg) USER_CODE_SELECTOR as u32,
            stack = in(reg) user_stack_top,
            entry = in(reg) entry,
            options(noreturn),
        )
    }
}

#[test_case]
fn test_range_allowed_spans_abutting_vmas() {
    add_vma(0x7000_0000, 0x7000_1000, VmaFlags::READ);
    add_vma(0x7000_1000, 0x7000_2000, VmaFlags::READ | VmaFlags::WRITE);

    assert!(range_allowed(0x7000_0800, 0x1000, false));
    assert!(!range_allowed(0x7000_0800, 0x1000, true));
    assert!(range_allowed(0x7000_1800, 0x800, true));
    assert!(!range_allowed(0x7000_1800, 0x1000, false));

    remove_vma(0x7000_0000);
    remove_vma(0x7000_1000);
    assert!(!range_allowed(0x7000_0800, 1, false));
}
