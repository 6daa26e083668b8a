//! The global file descriptor table and the device files behind the
//! reserved descriptors.

use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::String;

use spin::Mutex;

use crate::internal::console::Console;
use crate::internal::devices::{null::Null, rand::Rand, zero::Zero};
use crate::internal::file::{FileError, OpenFlags, Stream, Whence};
use crate::internal::fs::FileHandle;
use crate::kprint;

/// File table
pub static FILES: Mutex<BTreeMap<usize, File>> = Mutex::new(BTreeMap::new());

/// stdout
#[derive(Debug, Clone)]
pub struct Stdout;

impl Stdout {
    /// Create a new Stdout
    pub fn new() -> Self {
        Stdout
    }
}

impl Stream for Stdout {
    fn read(&mut self, _buf: &mut [u8]) -> Result<usize, FileError> {
        Err(FileError::ReadError(
            crate::internal::fs::FsError::UnreadableFile,
        ))
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, FileError> {
        kprint!("{}", String::from_utf8_lossy(buf));
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

/// stderr
#[derive(Debug, Clone)]
pub struct Stderr;

impl Stderr {
    /// Create a new Stderr
    pub fn new() -> Self {
        Stderr
    }
}

impl Stream for Stderr {
    fn read(&mut self, _buf: &mut [u8]) -> Result<usize, FileError> {
        Err(FileError::ReadError(
            crate::internal::fs::FsError::UnreadableFile,
        ))
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, FileError> {
        kprint!("{}", String::from_utf8_lossy(buf));
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

/// Device
#[derive(Debug, Clone)]
pub enum Device {
    /// stdin device
    Stdin(Console),
    /// stdout device
    Stdout(Stdout),
    /// stderr device
    Stderr(Stderr),
    /// Null device
    Null(Null),
    /// Zero device
    Zero(Zero),
    /// Random device
    Rand(Rand),
}

/// Number of devices - must be updated when adding new devices
pub const NUM_DEVICES: usize = 6;

/// stdin device number and file descriptor
pub const STDIN: usize = 0;
/// stdout device number and file descriptor
pub const STDOUT: usize = 1;
/// stderr device number and file descriptor
pub const STDERR: usize = 2;
/// null device number and file descriptor
pub const NULL: usize = 3;
/// zero device number and file descriptor
pub const ZERO: usize = 4;
/// random device number and file descriptor
pub const RAND: usize = 5;

/// (device number, flags)
impl TryFrom<(usize, OpenFlags)> for Device {
    type Error = String;

    fn try_from(value: (usize, OpenFlags)) -> Result<Self, String> {
        match value.0 {
            STDIN => Ok(Device::Stdin(Console::new())),
            STDOUT => Ok(Device::Stdout(Stdout::new())),
            STDERR => Ok(Device::Stderr(Stderr::new())),
            NULL => Ok(Device::Null(Null::new(value.1))),
            ZERO => Ok(Device::Zero(Zero::new(value.1))),
            RAND => Ok(Device::Rand(Rand::new(value.1))),
            _ => Err(format!("Invalid device number: {}", value.0)),
        }
    }
}

/// Resolve a `/dev/*` path to its device number.
pub fn device_number(path: &str) -> Option<usize> {
    match path {
        "/dev/stdin" => Some(STDIN),
        "/dev/stdout" => Some(STDOUT),
        "/dev/stderr" => Some(STDERR),
        "/dev/null" => Some(NULL),
        "/dev/zero" => Some(ZERO),
        "/dev/random" => Some(RAND),
        _ => None,
    }
}

/// a file, which could be a regular file or a device
#[derive(Debug, Clone)]
pub enum File {
    /// A regular file
    File(FileHandle),
    /// A device
    Device(Device),
}

impl Stream for Device {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FileError> {
        match self {
            Device::Stdin(inner) => inner.read(buf),
            Device::Stdout(inner) => inner.read(buf),
            Device::Stderr(inner) => inner.read(buf),
            Device::Null(inner) => inner.read(buf),
            Device::Zero(inner) => inner.read(buf),
            Device::Rand(inner) => inner.read(buf),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, FileError> {
        match self {
            Device::Stdin(inner) => inner.write(buf),
            Device::Stdout(inner) => inner.write(buf),
            Device::Stderr(inner) => inner.write(buf),
            Device::Null(inner) => inner.write(buf),
            Device::Zero(inner) => inner.write(buf),
            Device::Rand(inner) => inner.write(buf),
        }
    }

    fn close(&mut self) -> Result<(), FileError> {
        match self {
            Device::Stdin(inner) => inner.close(),
            Device::Stdout(inner) => inner.close(),
            Device::Stderr(inner) => inner.close(),
            Device::Null(inner) => inner.close(),
            Device::Zero(inner) => inner.close(),
            Device::Rand(inner) => inner.close(),
        }
    }

    fn flush(&mut self) -> Result<(), FileError> {
        match self {
            Device::Stdin(inner) => inner.flush(),
            Device::Stdout(inner) => inner.flush(),
            Device::Stderr(inner) => inner.flush(),
            Device::Null(inner) => inner.flush(),
            Device::Zero(inner) => inner.flush(),
            Device::Rand(inner) => inner.flush(),
        }
    }

    fn seek(&mut self, offset: i32, whence: Whence) -> Result<usize, FileError> {
        match self {
            Device::Stdin(inner) => inner.seek(offset, whence),
            Device::Stdout(inner) => inner.seek(offset, whence),
            Device::Stderr(inner) => inner.seek(offset, whence),
            Device::Null(inner) => inner.seek(offset, whence),
            Device::Zero(inner) => inner.seek(offset, whence),
            Device::Rand(inner) => inner.seek(offset, whence),
        }
    }
}

impl Stream for File {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FileError> {
        match self {
            File::File(file) => file.read(buf),
            File::Device(device) => device.read(buf),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, FileError> {
        match self {
            File::File(file) => file.write(buf),
            File::Device(device) => device.write(buf),
        }
    }

    fn close(&mut self) -> Result<(), FileError> {
        match self {
            File::File(file) => file.close(),
            File::Device(device) => device.close(),
        }
    }

    fn flush(&mut self) -> Result<(), FileError> {
        match self {
            File::File(file) => file.flush(),
            File::Device(device) => device.flush(),
        }
    }

    fn seek(&mut self, offset: i32, whence: Whence) -> Result<usize, FileError> {
        match self {
            File::File(file) => file.seek(offset, whence),
            File::Device(device) => device.seek(offset, whence),
        }
    }
}

/// Insert `file` at the lowest free descriptor and return it.
pub fn insert(file: File) -> usize {
    let mut files = FILES.lock();
    let mut fd = 0;
    while files.contains_key(&fd) {
        fd += 1;
    }
    files.insert(fd, file);
    fd
}

/// Seed descriptors 0–5 with the standard devices.
pub fn init() {
    crate::internal::cpu::without_interrupts(|| {
        let mut files = FILES.lock();
        for i in 0..NUM_DEVICES {
            let device = Device::try_from((i, OpenFlags::RDWR)).unwrap();
            files.insert(i, File::Device(device));
        }
    });
}

#[test_case]
fn test_insert_reuses_closed_descriptors() {
    let before;
    {
        let files = FILES.lock();
        before = files.len();
    }
    let fd1 = insert(File::Device(Device::Null(Null::new(OpenFlags::RDWR))));
    let fd2 = insert(File::Device(Device::Null(Null::new(OpenFlags::RDWR))));
    assert_ne!(fd1, fd2);
    FILES.lock().remove(&fd1);
    let fd3 = insert(File::Device(Device::Null(Null::new(OpenFlags::RDWR))));
    assert_eq!(fd3, fd1);
    FILES.lock().remove(&fd2);
    FILES.lock().remove(&fd3);
    assert_eq!(FILES.lock().len(), before);
}
