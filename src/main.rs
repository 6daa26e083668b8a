#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(rust386::test_runner)]
#![reexport_test_harness_main = "test_main"]

extern crate alloc;

use core::panic::PanicInfo;

use log::info;
use rust386::boot::{self, MULTIBOOT2_BOOTLOADER_MAGIC};
use rust386::internal::clk;
use rust386::internal::file::OpenFlags;
use rust386::internal::memory::{self, heap};
use rust386::internal::process::{self, VmaFlags};
use rust386::internal::speaker::{self, Song};
use rust386::internal::syscall::{CLOSE, EXIT, GETPID, LSEEK, OPEN, PUTS, READ, WRITE};
use rust386::internal::tunes;
use rust386::{kprintln, syscall};

#[cfg(not(test))]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    kprintln!("{}", info);
    rust386::hlt_loop()
}

#[cfg(test)]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    rust386::test_panic_handler(info)
}

#[unsafe(no_mangle)]
extern "C" fn kernel_main(magic: u32, mboot_info: u32) -> ! {
    rust386::init();

    if magic != MULTIBOOT2_BOOTLOADER_MAGIC {
        panic!("not booted by a Multiboot2 loader (magic {:#010x})", magic);
    }
    boot::record_handoff(magic, mboot_info);

    #[cfg(test)]
    test_main();

    kprintln!();
    heap::print_layout();
    info!("RTC reports {}", clk::get_time());

    info!("Playing the boot chime");
    speaker::play(&Song {
        notes: &tunes::BOOT_CHIME,
    });

    launch_user_task()
}

const USER_STACK_SIZE: usize = 16 * 1024;

/// Map out what the demo task may touch and drop to ring 3. The program
/// text lives in the kernel image (there is no loader), so the image gets
/// a VMA; the stack comes off the heap.
fn launch_user_task() -> ! {
    process::add_vma(
        memory::kernel_start(),
        memory::kernel_end(),
        VmaFlags::READ | VmaFlags::WRITE | VmaFlags::EXEC,
    );

    let stack = heap::malloc(USER_STACK_SIZE);
    assert!(!stack.is_null(), "no heap left for the user stack");
    let stack_base = stack as usize;
    process::add_vma(
        stack_base,
        stack_base + USER_STACK_SIZE,
        VmaFlags::READ | VmaFlags::WRITE,
    );
    let stack_top = (stack_base + USER_STACK_SIZE) & !0xF;

    info!("Entering ring 3");
    unsafe { process::enter_user_mode(user_main as usize as u32, stack_top as u32) }
}

/// The demo task. Runs at ring 3 and talks to the kernel only through
/// `int 0x80`: console output, a file round trip, one line of echoed
/// input, then exit.
extern "C" fn user_main() -> ! {
    let hello = b"hello from ring 3\n\0";
    syscall!(PUTS, hello.as_ptr());
    let _pid = syscall!(GETPID);

    let path = b"/home/demo.txt\0";
    let flags = OpenFlags::RDWR | OpenFlags::CREAT | OpenFlags::TRUNC;
    let fd = syscall!(OPEN, path.as_ptr(), flags.bits(), 0);

    let payload = b"written before lseek, read back after\n";
    syscall!(WRITE, fd, payload.as_ptr(), payload.len());
    syscall!(LSEEK, fd, 0, 0);

    let mut readback = [0u8; 64];
    let n = syscall!(READ, fd, readback.as_mut_ptr(), readback.len());
    syscall!(CLOSE, fd);
    syscall!(WRITE, 1, readback.as_ptr(), n);

    let prompt = b"type a line to echo: \0";
    syscall!(PUTS, prompt.as_ptr());
    let mut line = [0u8; 80];
    let n = syscall!(READ, 0, line.as_mut_ptr(), line.len());
    syscall!(WRITE, 1, line.as_ptr(), n);

    syscall!(EXIT, 42);
    loop {}
}
