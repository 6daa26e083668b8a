#![no_std]
#![cfg_attr(test, no_main)]
#![feature(custom_test_frameworks)]
#![test_runner(crate::test_runner)]
#![reexport_test_harness_main = "test_main"]

extern crate alloc;

pub mod boot;
pub mod internal;

use core::panic::PanicInfo;

use internal::vga::Color;
use internal::{clk, cpu, gdt, idt, interrupts, keyboard, memory, serial, syscall, usercopy, vga};
use log::{info, Level, LevelFilter, Metadata, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum QemuExitCode {
    Success = 0x10,
    Failed = 0x11,
}

pub fn exit_qemu(exit_code: QemuExitCode) {
    unsafe {
        cpu::out_u32(0xf4, exit_code as u32);
    }
}

pub trait Testable {
    fn run(&self) -> ();
}

impl<T> Testable for T
where
    T: Fn(),
{
    fn run(&self) {
        serial_print!("{}...\t", core::any::type_name::<T>());
        self();
        serial_println!("[ok]");
    }
}

pub fn test_runner(tests: &[&dyn Testable]) {
    serial_println!("Running {} tests", tests.len());
    for test in tests {
        test.run();
    }
    exit_qemu(QemuExitCode::Success);
}

pub fn test_panic_handler(info: &PanicInfo) -> ! {
    serial_println!("[failed]\n");
    serial_println!("Error: {}\n", info);
    exit_qemu(QemuExitCode::Failed);
    hlt_loop();
}

/// A logger that tags the VGA console with colored levels and mirrors
/// every line to COM1. Formats straight into the writers, so it is safe
/// before the heap is up.
pub struct KernelLogger;

impl log::Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let level = record.level();

            kprint!("[ ");

            match level {
                Level::Error => {
                    vga::write_str("ERROR", Color::LightRed, Color::Black);
                }
                Level::Warn => {
                    vga::write_str("WARN", Color::Yellow, Color::Black);
                }
                Level::Info => {
                    vga::write_str("INFO", Color::LightBlue, Color::Black);
                }
                Level::Debug => {
                    vga::write_str("DEBUG", Color::LightGreen, Color::Black);
                }
                Level::Trace => {
                    vga::write_str("TRACE", Color::LightCyan, Color::Black);
                }
            }

            match level {
                Level::Warn | Level::Info => {
                    kprint!(" ");
                }
                _ => {}
            }

            kprint!("] {}\n", record.args());
            serial_println!("[{}] {}", level, record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: KernelLogger = KernelLogger;

fn max_log_level() -> LevelFilter {
    if cfg!(feature = "trace_log") {
        LevelFilter::Trace
    } else if cfg!(feature = "debug_log") {
        LevelFilter::Debug
    } else if cfg!(feature = "warn_log") {
        LevelFilter::Warn
    } else if cfg!(feature = "error_log") {
        LevelFilter::Error
    } else {
        LevelFilter::Info
    }
}

pub fn init_logger() {
    log::set_logger(&LOGGER)
        .map(|()| log::set_max_level(max_log_level()))
        .unwrap();
}

#[cfg(feature = "ascii-art")]
const BANNER: &str = r#"                 _   _____    ___   __
  _ __ _   _ ___| |_|___ /   ( _ ) / /_
 | '__| | | / __| __| |_ \   / _ \| '_ \
 | |  | |_| \__ \ |_ ___) | | (_) | (_) |
 |_|   \__,_|___/\__|____/   \___/ \___/
"#;

fn banner() {
    #[cfg(feature = "ascii-art")]
    kprint!("{}", BANNER);
}

/// Bring the kernel up: console and logger first, then the heap, the
/// descriptor tables, interrupt dispatch, the tick source, the drivers,
/// paging, and finally the syscall surface.
pub fn init() {
    serial::init();
    kprint!("[ ");
    vga::write_str("INFO", Color::LightBlue, Color::Black);
    kprint!(" ] Booting rust386...\n");
    init_logger();
    info!("Logger initialized");

    memory::init();
    info!("Memory initialized");

    gdt::init();
    info!("GDT initialized");

    idt::init();
    info!("IDT initialized");

    usercopy::init();
    interrupts::init();

    clk::pit::init();
    keyboard::init();

    memory::paging::init();

    syscall::init();

    banner();
    info!("Kernel initialized");
}

pub fn hlt_loop() -> ! {
    loop {
        cpu::halt();
    }
}

#[cfg(test)]
#[unsafe(no_mangle)]
extern "C" fn kernel_main(_magic: u32, _mboot_info: u32) -> ! {
    init();
    test_main();
    hlt_loop();
}

#[cfg(test)]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}
