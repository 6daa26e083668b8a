use core::sync::atomic::{AtomicU64, Ordering};

use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};

use crate::internal::clk;
use crate::internal::file::{FileError, OpenFlags, Stream, Whence};
use crate::internal::fs::FsError;

static SEED_COUNTER: AtomicU64 = AtomicU64::new(0x5DEECE66D);

/// Random device, fed by a small PRNG reseeded from the tick counter.
/// Not cryptographic; good enough for games and salts.
#[derive(Debug, Clone)]
pub struct Rand {
    /// open flags
    pub flags: OpenFlags,
}

impl Rand {
    /// Create a new random device
    pub fn new(flags: OpenFlags) -> Self {
        Rand { flags }
    }

    fn rng() -> SmallRng {
        let salt = SEED_COUNTER.fetch_add(0x9E3779B9, Ordering::Relaxed);
        SmallRng::seed_from_u64((clk::tick_ms() as u64) << 32 ^ salt)
    }
}

impl Stream for Rand {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FileError> {
        if !self.flags.readable() {
            return Err(FileError::PermissionError(FsError::UnreadableFile));
        }
        Self::rng().fill_bytes(buf);
        Ok(buf.len())
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

/// Two reads from the random device should not match
#[test_case]
fn test_rand_varies() {
    let mut rand = Rand::new(OpenFlags::RDWR);
    let mut a = [0u8; 16];
    let mut b = [0u8; 16];
    rand.read(&mut a).unwrap();
    rand.read(&mut b).unwrap();
    assert_ne!(a, b);
}
