const BUF_HEIGHT: usize = 25;
const BUF_WIDTH: usize = 80;

use core::fmt;

use lazy_static::lazy_static;
use spin::Mutex;
use volatile::Volatile;

use crate::internal::cpu;

/// CRTC address/data register pair driving the hardware cursor.
const CRTC_ADDR: u16 = 0x3D4;
const CRTC_DATA: u16 = 0x3D5;

#[allow(dead_code)]
#[allow(missing_docs)] // no need to document this, only colours
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Color {
    Black = 0,
    Blue = 1,
    Green = 2,
    Cyan = 3,
    Red = 4,
    Magenta = 5,
    Brown = 6,
    LightGrey = 7,
    DarkGrey = 8,
    LightBlue = 9,
    LightGreen = 10,
    LightCyan = 11,
    LightRed = 12,
    Pink = 13,
    Yellow = 14,
    White = 15,
}

/// A combination of a foreground and background color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct ColorCode(u8);

impl ColorCode {
    /// Create a new ColorCode with the given foreground and background colors
    pub const fn new(foreground: Color, background: Color) -> ColorCode {
        ColorCode((background as u8) << 4 | (foreground as u8))
    }
}

/// A character cell in the VGA buffer: `(char, attr)`, 16-bit little endian
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct VgaChar {
    ascii_char: u8,
    color_code: ColorCode,
}

/// The VGA text buffer at 0xB8000
#[repr(transparent)]
pub struct Buffer {
    chars: [[Volatile<VgaChar>; BUF_WIDTH]; BUF_HEIGHT],
}

/// The VGA writer
pub struct VgaWriter {
    col_pos: usize,
    color_code: ColorCode,
    buf: &'static mut Buffer,
}

impl VgaWriter {
    /// Create a new VgaWriter with the given foreground and background colors
    pub fn new(fg: Color, bg: Color) -> VgaWriter {
        let buf = unsafe { &mut *(0xb8000 as *mut Buffer) };

        VgaWriter {
            col_pos: 0,
            color_code: ColorCode::new(fg, bg),
            buf,
        }
    }

    /// Write a byte to the VGA buffer
    pub fn write_byte(&mut self, byte: u8) {
        match byte {
            b'\n' => self.new_line(),
            0x08 => {
                if self.col_pos > 0 {
                    self.col_pos -= 1;
                    let row = BUF_HEIGHT - 1;
                    let col = self.col_pos;
                    self.buf.chars[row][col].write(VgaChar {
                        ascii_char: b' ',
                        color_code: self.color_code,
                    });
                }
            }
            byte => {
                if self.col_pos >= BUF_WIDTH {
                    self.new_line();
                }

                let row = BUF_HEIGHT - 1;
                let col = self.col_pos;

                self.buf.chars[row][col].write(VgaChar {
                    ascii_char: byte,
                    color_code: self.color_code,
                });
                self.col_pos += 1;
            }
        }
        self.update_cursor();
    }

    /// Write a string to the VGA buffer, replacing non-printable bytes with 0xFE
    pub fn write_string(&mut self, s: &str) {
        for byte in s.bytes() {
            match byte {
                0x20..=0x7e | b'\n' | 0x08 => self.write_byte(byte),
                _ => self.write_byte(0xfe),
            }
        }
    }

    /// Temporarily switch colors for one string
    pub fn write_string_colored(&mut self, s: &str, fg: Color, bg: Color) {
        let saved = self.color_code;
        self.color_code = ColorCode::new(fg, bg);
        self.write_string(s);
        self.color_code = saved;
    }

    fn new_line(&mut self) {
        for row in 1..BUF_HEIGHT {
            for col in 0..BUF_WIDTH {
                let c = self.buf.chars[row][col].read();
                self.buf.chars[row - 1][col].write(c);
            }
        }
        self.clear_row(BUF_HEIGHT - 1);
        self.col_pos = 0;
    }

    fn clear_row(&mut self, row: usize) {
        let blank = VgaChar {
            ascii_char: b' ',
            color_code: self.color_code,
        };
        for col in 0..BUF_WIDTH {
            self.buf.chars[row][col].write(blank);
        }
    }

    /// Clear the whole screen
    pub fn clear(&mut self) {
        for row in 0..BUF_HEIGHT {
            self.clear_row(row);
        }
        self.col_pos = 0;
        self.update_cursor();
    }

    fn update_cursor(&self) {
        let pos = ((BUF_HEIGHT - 1) * BUF_WIDTH + self.col_pos) as u16;
        unsafe {
            cpu::out_u8(CRTC_ADDR, 0x0F);
            cpu::out_u8(CRTC_DATA, (pos & 0xFF) as u8);
            cpu::out_u8(CRTC_ADDR, 0x0E);
            cpu::out_u8(CRTC_DATA, (pos >> 8) as u8);
        }
    }
}

impl fmt::Write for VgaWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_string(s);
        Ok(())
    }
}

lazy_static! {
    /// The global VGA writer
    pub static ref VGA_WRITER: Mutex<VgaWriter> =
        Mutex::new(VgaWriter::new(Color::White, Color::Black));
}

/// Write one string in the given colors (used by the logger's level tags)
pub fn write_str(s: &str, fg: Color, bg: Color) {
    cpu::without_interrupts(|| {
        VGA_WRITER.lock().write_string_colored(s, fg, bg);
    });
}

#[doc(hidden)] // needs to be public for the print! macro, but shouldn't be used directly
pub fn _kprint(args: fmt::Arguments) {
    use core::fmt::Write;

    cpu::without_interrupts(|| {
        VGA_WRITER.lock().write_fmt(args).unwrap();
    });
}

/// Print to the VGA buffer
#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => ($crate::internal::vga::_kprint(core::format_args!($($arg)*)));
}

/// Print to the VGA buffer with a newline
#[macro_export]
macro_rules! kprintln {
    () => ($crate::kprint!("\n"));
    ($($arg:tt)*) => ($crate::kprint!("{}\n", core::format_args!($($arg)*)));
}

/// test a single kprintln
#[test_case]
fn test_single_kprintln() {
    kprintln!("test_kprintln_simple output");
}

/// test 200 kprintlns
#[test_case]
fn test_many_kprintln() {
    for _ in 0..200 {
        kprintln!("test_kprintln_many output");
    }
}

/// test kprintln output is correct
#[test_case]
fn test_kprintln_output() {
    use core::fmt::Write;

    let s = "Hello world! Enjoy some numbers: 42 ";
    cpu::without_interrupts(|| {
        let mut writer = VGA_WRITER.lock();
        writeln!(writer, "\n{}", s).expect("writeln failed");
        for (i, c) in s.chars().enumerate() {
            let screen_char = writer.buf.chars[BUF_HEIGHT - 2][i].read();
            assert_eq!(char::from(screen_char.ascii_char), c);
        }
    });
}
