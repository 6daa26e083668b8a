//! RAM-backed file store.
//!
//! Paths map straight to byte vectors; directories are a figment of the
//! path strings, exactly as in the teacher filesystem's virtual layer.
//! This is the backend the OPEN/READ/WRITE/LSEEK syscalls consume.

use alloc::string::String;
use alloc::vec::Vec;

use hashbrown::HashMap;
use lazy_static::lazy_static;
use spin::Mutex;

use crate::internal::file::{FileError, OpenFlags, Stream, Whence};
use crate::internal::syscall::Error;

lazy_static! {
    /// the global file store
    static ref FILESYSTEM: Mutex<HashMap<String, Vec<u8>>> = Mutex::new(HashMap::new());
}

/// list of filesystem errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsError {
    /// file not found
    FileNotFound,
    /// file already exists
    FileExists,
    /// file opened without read access
    UnreadableFile,
    /// file opened without write access
    UnwritableFile,
    /// seek before the start of the file
    InvalidSeek,
    /// fd does not name an open file
    InvalidFileDescriptor,
}

/// implement conversion to POSIX error codes
impl From<FsError> for Error {
    fn from(fs_error: FsError) -> Self {
        match fs_error {
            FsError::FileNotFound => Error::ENOENT,
            FsError::FileExists => Error::EEXIST,
            FsError::UnreadableFile => Error::EACCES,
            FsError::UnwritableFile => Error::EACCES,
            FsError::InvalidSeek => Error::EINVAL,
            FsError::InvalidFileDescriptor => Error::EBADF,
        }
    }
}

/// An open regular file: a path into the store plus a cursor.
#[derive(Debug, Clone)]
pub struct FileHandle {
    path: String,
    pos: usize,
    flags: OpenFlags,
}

impl FileHandle {
    /// Open `path` under `flags`, honoring CREAT/EXCL/TRUNC.
    pub fn open(path: &str, flags: OpenFlags) -> Result<FileHandle, FsError> {
        let mut fs = FILESYSTEM.lock();
        let exists = fs.contains_key(path);

        if exists && flags.contains(OpenFlags::CREAT | OpenFlags::EXCL) {
            return Err(FsError::FileExists);
        }
        if !exists {
            if !flags.contains(OpenFlags::CREAT) {
                return Err(FsError::FileNotFound);
            }
            fs.insert(String::from(path), Vec::new());
        } else if flags.contains(OpenFlags::TRUNC) && flags.writable() {
            if let Some(data) = fs.get_mut(path) {
                data.clear();
            }
        }

        Ok(FileHandle {
            path: String::from(path),
            pos: 0,
            flags,
        })
    }

    /// Byte length of the backing file.
    pub fn len(&self) -> usize {
        FILESYSTEM.lock().get(&self.path).map_or(0, Vec::len)
    }

    /// Whether the backing file holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Stream for FileHandle {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FileError> {
        if !self.flags.readable() {
            return Err(FileError::PermissionError(FsError::UnreadableFile));
        }
        let fs = FILESYSTEM.lock();
        let data = fs
            .get(&self.path)
            .ok_or(FileError::NotFoundError(FsError::FileNotFound))?;

        let available = data.len().saturating_sub(self.pos);
        let n = available.min(buf.len());
        buf[..n].copy_from_slice(&data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, FileError> {
        if !self.flags.writable() {
            return Err(FileError::PermissionError(FsError::UnwritableFile));
        }
        let mut fs = FILESYSTEM.lock();
        let data = fs
            .get_mut(&self.path)
            .ok_or(FileError::NotFoundError(FsError::FileNotFound))?;

        if self.flags.contains(OpenFlags::APPEND) {
            self.pos = data.len();
        }
        if self.pos > data.len() {
            // sparse write: pad the gap with zeroes
            data.resize(self.pos, 0);
        }

        let overlap = (data.len() - self.pos).min(buf.len());
        data[self.pos..self.pos + overlap].copy_from_slice(&buf[..overlap]);
        data.extend_from_slice(&buf[overlap..]);
        self.pos += buf.len();
        Ok(buf.len())
    }

    fn close(&mut self) -> Result<(), FileError> {
        Ok(())
    }

    fn flush(&mut self) -> Result<(), FileError> {
        Ok(())
    }

    fn seek(&mut self, offset: i32, whence: Whence) -> Result<usize, FileError> {
        let base = match whence {
            Whence::Set => 0,
            Whence::Cur => self.pos as i64,
            Whence::End => self.len() as i64,
        };
        let target = base + offset as i64;
        if target < 0 {
            return Err(FileError::SeekError(FsError::InvalidSeek));
        }
        self.pos = target as usize;
        Ok(self.pos)
    }
}

#[test_case]
fn test_write_read_roundtrip() {
    let flags = OpenFlags::RDWR | OpenFlags::CREAT | OpenFlags::TRUNC;
    let mut file = FileHandle::open("/test/roundtrip.txt", flags).unwrap();
    let payload = b"the quick brown fox";
    assert_eq!(file.write(payload).unwrap(), payload.len());

    let mut reopened = FileHandle::open("/test/roundtrip.txt", OpenFlags::empty()).unwrap();
    let mut buf = [0u8; 32];
    let n = reopened.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], payload);
    assert_eq!(reopened.read(&mut buf).unwrap(), 0);
}

#[test_case]
fn test_excl_refuses_existing() {
    let create = OpenFlags::RDWR | OpenFlags::CREAT;
    FileHandle::open("/test/excl.txt", create).unwrap();
    let result = FileHandle::open("/test/excl.txt", create | OpenFlags::EXCL);
    assert_eq!(result.unwrap_err(), FsError::FileExists);
}

#[test_case]
fn test_open_missing_without_creat() {
    let result = FileHandle::open("/test/missing.txt", OpenFlags::empty());
    assert_eq!(result.unwrap_err(), FsError::FileNotFound);
}

#[test_case]
fn test_seek_whence() {
    let flags = OpenFlags::RDWR | OpenFlags::CREAT | OpenFlags::TRUNC;
    let mut file = FileHandle::open("/test/seek.txt", flags).unwrap();
    file.write(b"0123456789").unwrap();

    assert_eq!(file.seek(2, Whence::Set).unwrap(), 2);
    let mut buf = [0u8; 3];
    file.read(&mut buf).unwrap();
    assert_eq!(&buf, b"234");

    assert_eq!(file.seek(-2, Whence::Cur).unwrap(), 3);
    assert_eq!(file.seek(-1, Whence::End).unwrap(), 9);
    assert!(file.seek(-20, Whence::Set).is_err());
}

#[test_case]
fn test_append_writes_at_end() {
    let flags = OpenFlags::RDWR | OpenFlags::CREAT | OpenFlags::TRUNC;
    let mut file = FileHandle::open("/test/append.txt", flags).unwrap();
    file.write(b"base").unwrap();

    let mut appender = FileHandle::open(
        "/test/append.txt",
        OpenFlags::WRONLY | OpenFlags::APPEND,
    )
    .unwrap();
    appender.write(b"+tail").unwrap();

    let mut reader = FileHandle::open("/test/append.txt", OpenFlags::empty()).unwrap();
    let mut buf = [0u8; 16];
    let n = reader.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"base+tail");
}
