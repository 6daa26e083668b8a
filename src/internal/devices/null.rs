use crate::internal::file::{FileError, OpenFlags, Stream, Whence};
use crate::internal::fs::FsError;

/// Null device: reads are instant EOF, writes vanish.
#[derive(Debug, Clone)]
pub struct Null {
    /// open flags
    pub flags: OpenFlags,
}

impl Null {
    /// Create a new null device
    pub fn new(flags: OpenFlags) -> Self {
        Null { flags }
    }
}

impl Stream for Null {
    fn read(&mut self, _buf: &mut [u8]) -> Result<usize, FileError> {
        if !self.flags.readable() {
            return Err(FileError::PermissionError(FsError::UnreadableFile));
        }
        Ok(0)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, FileError> {
        if !self.flags.writable() {
            return Err(FileError::PermissionError(FsError::UnwritableFile));
        }
        Ok(buf.len())
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

/// Test the null device
#[test_case]
fn test_null() {
    let mut null = Null::new(OpenFlags::RDWR);
    let mut buf = [0u8; 8];
    assert_eq!(null.read(&mut buf).unwrap(), 0);
    assert_eq!(null.write(b"disappears").unwrap(), 10);
}
