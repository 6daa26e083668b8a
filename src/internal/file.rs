// core file trait that anything involving reading or writing implements

use bitflags::bitflags;

use super::fs::FsError;
use super::syscall::Error;

bitflags! {
    /// POSIX-style open flags, as passed to the OPEN syscall. `O_RDONLY`
    /// is the empty set; the low two bits form the access mode.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        /// Write-only access.
        const WRONLY = 0x1;
        /// Read-write access.
        const RDWR = 0x2;
        /// Create the file if it does not exist.
        const CREAT = 0x40;
        /// With CREAT, fail if the file already exists.
        const EXCL = 0x80;
        /// Truncate to zero length on open.
        const TRUNC = 0x200;
        /// Every write goes to the end of the file.
        const APPEND = 0x400;
    }
}

impl OpenFlags {
    /// Whether reads are permitted under these flags.
    pub fn readable(self) -> bool {
        self.bits() & 0x3 != Self::WRONLY.bits()
    }

    /// Whether writes are permitted under these flags.
    pub fn writable(self) -> bool {
        self.intersects(Self::WRONLY | Self::RDWR)
    }
}

/// Seek origin for `Stream::seek`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Whence {
    /// Absolute offset.
    Set = 0,
    /// Relative to the current position.
    Cur = 1,
    /// Relative to the end of the file.
    End = 2,
}

impl TryFrom<usize> for Whence {
    type Error = Error;

    fn try_from(value: usize) -> Result<Self, Error> {
        match value {
            0 => Ok(Whence::Set),
            1 => Ok(Whence::Cur),
            2 => Ok(Whence::End),
            _ => Err(Error::EINVAL),
        }
    }
}

/// FileError is an enum that contains all the possible errors that can
/// occur when working with files
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileError {
    /// Error reading from a file
    ReadError(FsError),
    /// Error writing to a file
    WriteError(FsError),
    /// Error seeking in a file
    SeekError(FsError),
    /// Error closing a file
    CloseError(FsError),
    /// Error with permissions
    PermissionError(FsError),
    /// File not found
    NotFoundError(FsError),
}

/// implement conversion to POSIX error codes
impl From<FileError> for Error {
    fn from(file_error: FileError) -> Self {
        match file_error {
            FileError::ReadError(e) => Error::from(e),
            FileError::WriteError(e) => Error::from(e),
            FileError::SeekError(e) => Error::from(e),
            FileError::CloseError(e) => Error::from(e),
            FileError::PermissionError(e) => Error::from(e),
            FileError::NotFoundError(e) => Error::from(e),
        }
    }
}

/// Anything a file descriptor can point at: regular files, devices, the
/// console streams.
pub trait Stream {
    /// Read into `buf`, returning the number of bytes read (0 at EOF).
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FileError>;
    /// Write from `buf`, returning the number of bytes written.
    fn write(&mut self, buf: &[u8]) -> Result<usize, FileError>;
    /// Release the resource.
    fn close(&mut self) -> Result<(), FileError>;
    /// Push out buffered state, if any.
    fn flush(&mut self) -> Result<(), FileError>;
    /// Reposition, returning the new absolute offset.
    fn seek(&mut self, offset: i32, whence: Whence) -> Result<usize, FileError>;
}

#[test_case]
fn test_access_mode_bits() {
    assert!(OpenFlags::empty().readable());
    assert!(!OpenFlags::empty().writable());
    assert!(!OpenFlags::WRONLY.readable());
    assert!(OpenFlags::WRONLY.writable());
    assert!(OpenFlags::RDWR.readable());
    assert!(OpenFlags::RDWR.writable());
}
