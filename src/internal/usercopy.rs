//! Fault-tolerant user-memory access.
//!
//! The copy routine is ordinary `rep movsb`, but its faulting instruction
//! has an entry in the exception table. When it faults on a bad user
//! page, the page-fault handler looks the saved EIP up and rewrites it to
//! the fixup address, which returns the remaining byte count in ECX —
//! still live in the saved frame — so callers learn exactly how much
//! survived.

use core::arch::global_asm;

use alloc::string::String;
use log::error;

use crate::internal::cpu;
use crate::internal::interrupts::{self, InterruptFrame};
use crate::internal::process;
use crate::internal::syscall::Error;

/// Everything at or above this address belongs to the kernel; user
/// pointers must stay strictly below.
pub const USER_SPLIT: usize = 0xC000_0000;

/// Exit code for a task killed by an unhandled fault.
const FAULT_EXIT_CODE: i32 = 139;

global_asm!(
    r#"
    .section .text
    # copy_user_raw(dst, src, n) -> bytes left uncopied
    .global copy_user_raw
    copy_user_raw:
        push esi
        push edi
        mov edi, [esp + 12]
        mov esi, [esp + 16]
        mov ecx, [esp + 20]
    copy_user_faulting:
        rep movsb
    copy_user_fixup:
        mov eax, ecx
        pop edi
        pop esi
        ret

    .section .ex_table, "a"
        .long copy_user_faulting, copy_user_fixup
    "#
);

#[repr(C)]
struct ExTableEntry {
    fault_eip: u32,
    fixup_eip: u32,
}

unsafe extern "C" {
    fn copy_user_raw(dst: *mut u8, src: *const u8, n: usize) -> usize;
    #[link_name = "__ex_table_start"]
    static EX_TABLE_START: ExTableEntry;
    #[link_name = "__ex_table_end"]
    static EX_TABLE_END: ExTableEntry;
}

fn ex_table() -> &'static [ExTableEntry] {
    unsafe {
        let start = &raw const EX_TABLE_START;
        let end = &raw const EX_TABLE_END;
        let len = (end as usize - start as usize) / core::mem::size_of::<ExTableEntry>();
        core::slice::from_raw_parts(start, len)
    }
}

fn fixup_for(eip: u32) -> Option<u32> {
    ex_table()
        .iter()
        .find(|entry| entry.fault_eip == eip)
        .map(|entry| entry.fixup_eip)
}

/// Direction of a user access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// The kernel reads user memory.
    Read,
    /// The kernel writes user memory.
    Write,
}

/// Whether `[addr, addr + len)` lies below the user split, does not
/// wrap, and is fully covered by VMAs with the needed permission.
pub fn access_ok(kind: Access, addr: usize, len: usize) -> bool {
    if len == 0 {
        return true;
    }
    let Some(end) = addr.checked_add(len) else {
        return false;
    };
    if end > USER_SPLIT {
        return false;
    }
    process::range_allowed(addr, len, kind == Access::Write)
}

/// Copy user memory into a kernel buffer. Returns 0 on full success or
/// the number of bytes left untransferred; a failed `access_ok` copies
/// nothing and returns the full length.
pub fn copy_from_user(dst: &mut [u8], user_src: usize) -> usize {
    if !access_ok(Access::Read, user_src, dst.len()) {
        return dst.len();
    }
    unsafe { copy_user_raw(dst.as_mut_ptr(), user_src as *const u8, dst.len()) }
}

/// Copy a kernel buffer out to user memory. Same contract as
/// `copy_from_user`.
pub fn copy_to_user(user_dst: usize, src: &[u8]) -> usize {
    if !access_ok(Access::Write, user_dst, src.len()) {
        return src.len();
    }
    unsafe { copy_user_raw(user_dst as *mut u8, src.as_ptr(), src.len()) }
}

/// Fetch a NUL-terminated string from user memory, one byte at a time.
pub fn strncpy_from_user(user_src: usize, max: usize) -> Result<String, Error> {
    let mut out = String::new();
    for i in 0..max {
        let mut byte = [0u8; 1];
        if copy_from_user(&mut byte, user_src + i) != 0 {
            return Err(Error::EFAULT);
        }
        if byte[0] == 0 {
            return Ok(out);
        }
        out.push(byte[0] as char);
    }
    Err(Error::ENAMETOOLONG)
}

fn page_fault_handler(frame: &mut InterruptFrame, _ctx: usize) {
    if let Some(fixup) = fixup_for(frame.eip) {
        frame.eip = fixup;
        return;
    }

    let addr = cpu::read_cr2();
    if frame.from_user_mode() {
        error!(
            "user page fault at {:#010x} (EIP {:#010x}, error {:#x}); killing task",
            addr, frame.eip, frame.err_code
        );
        process::exit(FAULT_EXIT_CODE);
    }
    panic!(
        "PAGE FAULT: {} access to {:#010x} from EIP {:#010x} ({}present, error {:#x})",
        if frame.err_code & 2 != 0 { "write" } else { "read" },
        addr,
        frame.eip,
        if frame.err_code & 1 != 0 { "" } else { "not " },
        frame.err_code,
    );
}

/// Hook the page-fault vector. Must run before interrupts are enabled.
pub fn init() {
    interrupts::register_handler(interrupts::PAGE_FAULT_VECTOR, page_fault_handler, 0)
        .expect("page fault vector out of range");
}

#[cfg(test)]
use crate::internal::process::VmaFlags;

#[cfg(test)]
static SOURCE: [u8; 8] = *b"payload\0";

#[test_case]
fn test_access_ok_rejects_wrap_and_split() {
    assert!(!access_ok(Access::Read, usize::MAX - 8, 16));
    assert!(!access_ok(Access::Read, USER_SPLIT - 8, 16));
    assert!(access_ok(Access::Read, 0x1000, 0));
}

#[test_case]
fn test_copy_requires_vma() {
    let mut dst = [0u8; 8];
    assert_eq!(copy_from_user(&mut dst, SOURCE.as_ptr() as usize), 8);
    assert_eq!(dst, [0u8; 8]);
}

#[test_case]
fn test_copy_with_vma_roundtrip() {
    let src = SOURCE.as_ptr() as usize;
    process::add_vma(src, src + SOURCE.len(), VmaFlags::READ);

    let mut dst = [0u8; 8];
    assert_eq!(copy_from_user(&mut dst, src), 0);
    assert_eq!(&dst, &SOURCE);

    process::remove_vma(src);
    assert_eq!(copy_from_user(&mut dst, src), 8);
}

#[test_case]
fn test_strncpy_from_user() {
    let src = SOURCE.as_ptr() as usize;
    process::add_vma(src, src + SOURCE.len(), VmaFlags::READ);

    assert_eq!(strncpy_from_user(src, 64).unwrap(), "payload");
    assert_eq!(strncpy_from_user(src, 4), Err(Error::ENAMETOOLONG));

    process::remove_vma(src);
    assert_eq!(strncpy_from_user(src, 64), Err(Error::EFAULT));
}

#[test_case]
fn test_fault_eip_is_rewritten_to_fixup() {
    let table = ex_table();
    assert!(!table.is_empty());

    let mut frame = unsafe { core::mem::zeroed::<InterruptFrame>() };
    frame.vector = interrupts::PAGE_FAULT_VECTOR as u32;
    frame.eip = table[0].fault_eip;
    page_fault_handler(&mut frame, 0);
    assert_eq!(frame.eip, table[0].fixup_eip);
}
