use alloc::vec;

use super::*;
use crate::internal::file::{FileError, OpenFlags, Stream, Whence};
use crate::internal::fs::FileHandle;
use crate::internal::io::{File, FILES};
use crate::internal::usercopy;
use crate::kprint;

/// Kernel staging buffer per READ/WRITE call: one page, so a single
/// syscall never pins more kernel memory than that and a partial fault
/// still makes incremental progress.
const STAGING_SIZE: usize = 4096;

/// Longest path OPEN accepts.
const PATH_MAX: usize = 256;

fn with_file<R>(fd: usize, f: impl FnOnce(&mut File) -> Result<R, FileError>) -> Result<R, Error> {
    let mut files = FILES.lock();
    match files.get_mut(&fd) {
        Some(file) => f(file).map_err(Error::from),
        None => Err(Error::EBADF),
    }
}

/// terminate the current task (EXIT)
pub fn exit(code: usize, _: usize, _: usize, _: usize, _: usize) -> isize {
    process::exit(code as i32)
}

/// read from a file descriptor into user memory (READ)
pub fn read(fd: usize, ubuf: usize, count: usize, _: usize, _: usize) -> isize {
    let mut staging = vec![0u8; STAGING_SIZE.min(count)];
    let mut total = 0usize;

    while total < count {
        let chunk = STAGING_SIZE.min(count - total);
        let n = match with_file(fd, |f| f.read(&mut staging[..chunk])) {
            Ok(n) => n,
            Err(e) => {
                return if total > 0 { total as isize } else { e.to_retval() };
            }
        };
        if n == 0 {
            break; // EOF
        }

        let missed = usercopy::copy_to_user(ubuf + total, &staging[..n]);
        total += n - missed;
        if missed > 0 {
            // partial fault: report what actually landed
            return if total > 0 {
                total as isize
            } else {
                Error::EFAULT.to_retval()
            };
        }
        if n < chunk {
            break;
        }
    }
    total as isize
}

/// write user memory out to a file descriptor (WRITE)
pub fn write(fd: usize, ubuf: usize, count: usize, _: usize, _: usize) -> isize {
    let mut staging = vec![0u8; STAGING_SIZE.min(count)];
    let mut total = 0usize;

    while total < count {
        let chunk = STAGING_SIZE.min(count - total);
        let missed = usercopy::copy_from_user(&mut staging[..chunk], ubuf + total);
        let got = chunk - missed;

        if got > 0 {
            let written = match with_file(fd, |f| f.write(&staging[..got])) {
                Ok(n) => n,
                Err(e) => {
                    return if total > 0 { total as isize } else { e.to_retval() };
                }
            };
            total += written;
            if written < got {
                return total as isize;
            }
        }
        if missed > 0 {
            return if total > 0 {
                total as isize
            } else {
                Error::EFAULT.to_retval()
            };
        }
    }
    total as isize
}

/// open a file or device (OPEN)
pub fn open(upath: usize, flags: usize, _mode: usize, _: usize, _: usize) -> isize {
    let path = match usercopy::strncpy_from_user(upath, PATH_MAX) {
        Ok(path) => path,
        Err(e) => return e.to_retval(),
    };
    let flags = OpenFlags::from_bits_truncate(flags as u32);

    let file = if let Some(device) = io::device_number(&path) {
        match io::Device::try_from((device, flags)) {
            Ok(device) => File::Device(device),
            Err(_) => return Error::ENOENT.to_retval(),
        }
    } else {
        match FileHandle::open(&path, flags) {
            Ok(handle) => File::File(handle),
            Err(e) => return Error::from(e).to_retval(),
        }
    };

    io::insert(file) as isize
}

/// close a file descriptor (CLOSE)
pub fn close(fd: usize, _: usize, _: usize, _: usize, _: usize) -> isize {
    let resource = FILES.lock().remove(&fd);
    match resource {
        Some(mut resource) => match resource.close() {
            Ok(()) => 0,
            Err(e) => Error::from(e).to_retval(),
        },
        None => Error::EBADF.to_retval(),
    }
}

/// print a NUL-terminated user string on the kernel console (PUTS)
pub fn puts(ustr: usize, _: usize, _: usize, _: usize, _: usize) -> isize {
    match usercopy::strncpy_from_user(ustr, 1024) {
        Ok(s) => {
            kprint!("{}", s);
            0
        }
        Err(e) => e.to_retval(),
    }
}

/// reposition a file descriptor (LSEEK)
pub fn lseek(fd: usize, offset: usize, whence: usize, _: usize, _: usize) -> isize {
    let whence = match Whence::try_from(whence) {
        Ok(whence) => whence,
        Err(e) => return e.to_retval(),
    };
    match with_file(fd, |f| f.seek(offset as i32, whence)) {
        Ok(pos) => pos as isize,
        Err(e) => e.to_retval(),
    }
}

/// current task id (GETPID)
pub fn getpid(_: usize, _: usize, _: usize, _: usize, _: usize) -> isize {
    process::pid() as isize
}

#[cfg(test)]
use crate::internal::process::VmaFlags;

#[test_case]
fn test_write_to_stdout_via_dispatch() {
    let msg = b"dispatch says hi\n";
    let addr = msg.as_ptr() as usize;
    process::add_vma(addr, addr + msg.len(), VmaFlags::READ);
    let res = dispatch(WRITE, io::STDOUT, addr, msg.len(), 0, 0);
    process::remove_vma(addr);
    assert_eq!(res, msg.len() as isize);
}

#[test_case]
fn test_write_without_vma_is_efault() {
    let msg = b"never lands";
    let addr = msg.as_ptr() as usize;
    let res = dispatch(WRITE, io::STDOUT, addr, msg.len(), 0, 0);
    assert_eq!(res, Error::EFAULT.to_retval());
}

#[test_case]
fn test_close_bad_fd() {
    assert_eq!(dispatch(CLOSE, 9999, 0, 0, 0, 0), Error::EBADF.to_retval());
}

#[test_case]
fn test_getpid() {
    assert_eq!(dispatch(GETPID, 0, 0, 0, 0, 0), 1);
}

#[test_case]
fn test_file_roundtrip_via_dispatch() {
    let path = b"/test/dispatch.txt\0";
    let payload = b"written through int 0x80 plumbing";
    let mut readback = [0u8; 64];

    let path_addr = path.as_ptr() as usize;
    let payload_addr = payload.as_ptr() as usize;
    let readback_addr = readback.as_mut_ptr() as usize;

    process::add_vma(path_addr, path_addr + path.len(), VmaFlags::READ);
    process::add_vma(payload_addr, payload_addr + payload.len(), VmaFlags::READ);
    process::add_vma(
        readback_addr,
        readback_addr + readback.len(),
        VmaFlags::READ | VmaFlags::WRITE,
    );

    let flags = OpenFlags::RDWR | OpenFlags::CREAT | OpenFlags::TRUNC;
    let fd = dispatch(OPEN, path_addr, flags.bits() as usize, 0, 0, 0);
    assert!(fd >= 0);
    let fd = fd as usize;

    assert_eq!(
        dispatch(WRITE, fd, payload_addr, payload.len(), 0, 0),
        payload.len() as isize
    );
    assert_eq!(dispatch(LSEEK, fd, 0, 0, 0, 0), 0);
    assert_eq!(
        dispatch(READ, fd, readback_addr, readback.len(), 0, 0),
        payload.len() as isize
    );
    assert_eq!(dispatch(CLOSE, fd, 0, 0, 0, 0), 0);

    process::remove_vma(path_addr);
    process::remove_vma(payload_addr);
    process::remove_vma(readback_addr);

    assert_eq!(&readback[..payload.len()], payload);
}

#[test_case]
fn test_lseek_bad_whence() {
    assert_eq!(
        dispatch(LSEEK, io::STDOUT, 0, 7, 0, 0),
        Error::EINVAL.to_retval()
    );
}
