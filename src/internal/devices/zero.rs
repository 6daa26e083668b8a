use crate::internal::file::{FileError, OpenFlags, Stream, Whence};
use crate::internal::fs::FsError;

/// Zero device
#[derive(Debug, Clone)]
pub struct Zero {
    /// open flags
    pub flags: OpenFlags,
}

impl Zero {
    /// Create a new zero device
    pub fn new(flags: OpenFlags) -> Self {
        Zero { flags }
    }
}

impl Stream for Zero {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FileError> {
        if !self.flags.readable() {
            return Err(FileError::PermissionError(FsError::UnreadableFile));
        }
        buf.fill(0);
        Ok(buf.len())
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, FileError> {
        if !self.flags.writable() {
            return Err(FileError::PermissionError(FsError::UnwritableFile));
        }
        Ok(buf.len()) // writing to /dev/zero is always successful
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

/// Test the zero device
#[test_case]
fn test_zero() {
    let mut zero = Zero::new(OpenFlags::RDWR);
    let mut buf = [0xFFu8; 10];

    assert_eq!(zero.read(&mut buf).unwrap(), 10);
    assert!(buf.iter().all(|&x| x == 0));
    assert_eq!(zero.write(&buf).unwrap(), 10);
}

/// A write-only zero device must refuse reads
#[test_case]
fn test_zero_respects_flags() {
    let mut zero = Zero::new(OpenFlags::WRONLY);
    let mut buf = [0u8; 4];
    assert!(zero.read(&mut buf).is_err());
}
