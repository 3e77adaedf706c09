//! The device interface consumed by the copy engine
//!
//! The engine is written against [`BlockDev`], a narrow seam over a
//! source or destination opened for un-cached, positioned I/O. The
//! platform crate implements it for real files and block devices;
//! [`MemDevice`] implements it in memory for tests and benchmarks.

use std::io;
use std::sync::Mutex;

/// Positioned block I/O over an open source or destination
///
/// Implementations must be callable from multiple threads at once with
/// disjoint offsets; the engine never issues two concurrent operations
/// over the same byte range.
pub trait BlockDev: Send + Sync {
    /// Total length in bytes
    fn len(&self) -> u64;

    /// Whether the device is zero-length
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Physical sector size in bytes; 0 when unknown
    fn sector_size(&self) -> u32;

    /// Read up to `buf.len()` bytes at `offset`; returns 0 at end of device
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    /// Write `buf` at `offset`; may write fewer bytes than requested
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize>;

    /// Durably commit all completed writes
    fn flush(&self) -> io::Result<()>;
}

/// Read until `buf` is full or the device ends
///
/// A short read below the end of the device is retried for the remainder
/// so a transient short transfer cannot leave a gap in the copy.
pub fn read_full_at(dev: &dyn BlockDev, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match dev.read_at(&mut buf[total..], offset + total as u64) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

/// Write all of `buf` at `offset`
pub fn write_all_at(dev: &dyn BlockDev, buf: &[u8], offset: u64) -> io::Result<()> {
    let mut written = 0;
    while written < buf.len() {
        match dev.write_at(&buf[written..], offset + written as u64) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "device accepted no bytes",
                ))
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// In-memory device with a fixed capacity
///
/// Reads past the end report end-of-device; writes past the end fail the
/// way a full block device would.
pub struct MemDevice {
    data: Mutex<Vec<u8>>,
    sector_size: u32,
}

impl MemDevice {
    /// Create a zero-filled device of `capacity` bytes
    pub fn new(capacity: usize, sector_size: u32) -> Self {
        Self::from_vec(vec![0u8; capacity], sector_size)
    }

    /// Create a device filled with `byte`
    pub fn filled(capacity: usize, byte: u8, sector_size: u32) -> Self {
        Self::from_vec(vec![byte; capacity], sector_size)
    }

    /// Create a device holding `data`
    pub fn from_vec(data: Vec<u8>, sector_size: u32) -> Self {
        Self {
            data: Mutex::new(data),
            sector_size,
        }
    }

    /// Copy of the current contents, for assertions
    pub fn snapshot(&self) -> Vec<u8> {
        self.data.lock().unwrap().clone()
    }
}

impl BlockDev for MemDevice {
    fn len(&self) -> u64 {
        self.data.lock().unwrap().len() as u64
    }

    fn sector_size(&self) -> u32 {
        self.sector_size
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let data = self.data.lock().unwrap();
        let offset = offset as usize;
        if offset >= data.len() {
            return Ok(0);
        }
        let n = buf.len().min(data.len() - offset);
        buf[..n].copy_from_slice(&data[offset..offset + n]);
        Ok(n)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        let mut data = self.data.lock().unwrap();
        let offset = offset as usize;
        if offset + buf.len() > data.len() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!(
                    "write of {} bytes at {} exceeds device capacity {}",
                    buf.len(),
                    offset,
                    data.len()
                ),
            ));
        }
        data[offset..offset + buf.len()].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&self) -> io::Result<()> {
        Ok(())
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================
