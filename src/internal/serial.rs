//! COM1 serial output. Debug channel for the logger and the test runner.

use lazy_static::lazy_static;
use spin::Mutex;

use crate::internal::cpu;

const COM1: u16 = 0x3F8;

const IER_OFF: u16 = 1;
const FCR_OFF: u16 = 2;
const LCR_OFF: u16 = 3;
const MCR_OFF: u16 = 4;
const LSR_OFF: u16 = 5;

const LCR_8N1: u8 = 0x03;
const LCR_DLAB: u8 = 0x80;
const LSR_THRE: u8 = 0x20;

/// A 16550 UART behind a fixed base port.
pub struct SerialPort {
    base: u16,
}

impl SerialPort {
    const fn new(base: u16) -> SerialPort {
        SerialPort { base }
    }

    /// Program 38400 baud, 8n1, FIFO on, no interrupts.
    pub fn init(&mut self) {
        unsafe {
            cpu::out_u8(self.base + IER_OFF, 0x00);
            cpu::out_u8(self.base + LCR_OFF, LCR_DLAB);
            cpu::out_u8(self.base, 0x03); // divisor low: 115200 / 3
            cpu::out_u8(self.base + IER_OFF, 0x00); // divisor high
            cpu::out_u8(self.base + LCR_OFF, LCR_8N1);
            cpu::out_u8(self.base + FCR_OFF, 0xC7);
            cpu::out_u8(self.base + MCR_OFF, 0x0B);
        }
    }

    fn transmit_empty(&self) -> bool {
        unsafe { cpu::in_u8(self.base + LSR_OFF) & LSR_THRE != 0 }
    }

    /// Write one byte, blocking until the transmit holding register is free.
    pub fn write_byte(&mut self, byte: u8) {
        while !self.transmit_empty() {
            cpu::pause();
        }
        unsafe { cpu::out_u8(self.base, byte) }
    }
}

impl core::fmt::Write for SerialPort {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for byte in s.bytes() {
            self.write_byte(byte);
        }
        Ok(())
    }
}

lazy_static! {
    /// The global COM1 writer
    pub static ref SERIAL1: Mutex<SerialPort> = Mutex::new(SerialPort::new(COM1));
}

/// One-time COM1 setup, called from `init`.
pub fn init() {
    SERIAL1.lock().init();
}

#[doc(hidden)]
pub fn _serial_print(args: core::fmt::Arguments) {
    use core::fmt::Write;

    cpu::without_interrupts(|| {
        SERIAL1
            .lock()
            .write_fmt(args)
            .expect("serial write failed");
    });
}

/// Print to COM1
#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => ($crate::internal::serial::_serial_print(core::format_args!($($arg)*)));
}

/// Print to COM1 with a newline
#[macro_export]
macro_rules! serial_println {
    () => ($crate::serial_print!("\n"));
    ($($arg:tt)*) => ($crate::serial_print!("{}\n", core::format_args!($($arg)*)));
}
