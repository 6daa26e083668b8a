//! Line-oriented console input: the stdin device.
//!
//! Pulls decoded keys out of the keyboard ring, echoes them, and hands
//! complete lines to readers. Editing is backspace-only.

use alloc::string::String;

use crate::internal::clk;
use crate::internal::file::{FileError, Stream, Whence};
use crate::internal::fs::FsError;
use crate::internal::keyboard::{self, Key};
use crate::kprint;

/// The console stdin stream.
#[derive(Debug, Clone)]
pub struct Console;

impl Console {
    /// Create a new console stream
    pub fn new() -> Self {
        Console
    }

    /// Collect one line from the keyboard, echoing as we go. Blocks
    /// cooperatively (halt between polls) until Enter arrives.
    pub fn read_line(&self) -> String {
        let mut line = String::new();
        loop {
            let Some(key) = keyboard::try_pop() else {
                clk::sleep_interrupt(1);
                continue;
            };
            match key {
                Key::Enter => {
                    kprint!("\n");
                    line.push('\n');
                    return line;
                }
                Key::Backspace => {
                    if line.pop().is_some() {
                        kprint!("\x08");
                    }
                }
                key => {
                    if let Some(c) = key.to_char() {
                        kprint!("{}", c);
                        line.push(c);
                    }
                }
            }
        }
    }
}

impl Default for Console {
    fn default() -> Self {
        Console::new()
    }
}

impl Stream for Console {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FileError> {
        if buf.is_empty() {
            return Ok(0);
        }
        let line = self.read_line();
        let bytes = line.as_bytes();
        let n = bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        Ok(n)
    }

    fn write(&mut self, _buf: &[u8]) -> Result<usize, FileError> {
        Err(FileError::PermissionError(FsError::UnwritableFile))
    }

    fn close(&mut self) -> Result<(), FileError> {
        Ok(())
    }

    fn flush(&mut self) -> Result<(), FileError> {
        Ok(())
    }

    fn seek(&mut self, _offset: i32, _whence: Whence) -> Result<usize, FileError> {
        Ok(0)
    }
}
