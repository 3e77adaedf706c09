//! Linux platform implementation
//!
//! Uses O_DIRECT for un-cached I/O, positioned reads and writes through
//! `FileExt`, and the BLK* ioctls for capability probing.

use crate::{DiskOptions, PlatformError, Result};
use diskmirror_core::device::BlockDev;
use std::fs::{File, OpenOptions as StdOpenOptions};
use std::io;
use std::os::unix::fs::{FileExt, MetadataExt, OpenOptionsExt};
use std::os::unix::io::AsRawFd;
use std::path::Path;

/// A source or destination opened for raw positioned I/O
pub struct LinuxDisk {
    file: File,
    path: String,
    len: u64,
    sector_size: u32,
}

impl LinuxDisk {
    /// Open a device or image file for raw I/O
    pub fn open(path: &str, options: DiskOptions) -> Result<Self> {
        if !Path::new(path).exists() {
            return Err(PlatformError::DeviceNotFound(path.to_string()));
        }

        let mut std_options = StdOpenOptions::new();
        std_options.read(options.read).write(options.write);

        if options.direct_io {
            std_options.custom_flags(libc::O_DIRECT);
        }

        let file = std_options.open(path).map_err(|e| {
            if e.kind() == io::ErrorKind::PermissionDenied {
                PlatformError::PermissionDenied(format!(
                    "Cannot open {}: {}. Try running with sudo.",
                    path, e
                ))
            } else if e.raw_os_error() == Some(libc::EBUSY) {
                PlatformError::DeviceBusy(format!("{} is busy. Try unmounting first.", path))
            } else {
                PlatformError::Io(e)
            }
        })?;

        if options.sequential {
            advise_sequential(&file);
        }

        let len = probe_byte_length(&file, path)?;
        let sector_size = probe_sector_size(&file);

        tracing::debug!(path, len, sector_size, "opened disk");

        Ok(Self {
            file,
            path: path.to_string(),
            len,
            sector_size,
        })
    }

    /// The path this disk was opened from
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Override the probed sector size
    ///
    /// Used when the probe reports 0 and the caller accepts a fallback.
    pub fn set_sector_size(&mut self, sector_size: u32) {
        self.sector_size = sector_size;
    }
}

impl BlockDev for LinuxDisk {
    fn len(&self) -> u64 {
        self.len
    }

    fn sector_size(&self) -> u32 {
        self.sector_size
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        FileExt::read_at(&self.file, buf, offset)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        FileExt::write_at(&self.file, buf, offset)
    }

    fn flush(&self) -> io::Result<()> {
        self.file.sync_all()
    }
}

/// Hint the kernel that access will be sequential
fn advise_sequential(file: &File) {
    let fd = file.as_raw_fd();
    // SAFETY: posix_fadvise is called with a valid fd; a zero length
    // applies the advice to the whole file.
    #[allow(unsafe_code)]
    let result = unsafe { libc::posix_fadvise(fd, 0, 0, libc::POSIX_FADV_SEQUENTIAL) };
    if result != 0 {
        tracing::debug!(result, "posix_fadvise(SEQUENTIAL) not applied");
    }
}

/// Probe the byte length of a device or file
pub fn probe_byte_length(file: &File, path: &str) -> Result<u64> {
    let fd = file.as_raw_fd();

    // Cast via u32 to handle the sign bit correctly on platforms where
    // Ioctl is i32
    const BLKGETSIZE64: libc::Ioctl = 0x8008_1272u32 as libc::Ioctl;

    let mut size: u64 = 0;
    // SAFETY: ioctl with BLKGETSIZE64 writes a u64 through the provided
    // pointer; fd is valid for the lifetime of `file`.
    #[allow(unsafe_code)]
    let result = unsafe { libc::ioctl(fd, BLKGETSIZE64, &mut size) };

    if result == 0 && size > 0 {
        return Ok(size);
    }

    // Regular files and images: fall back to metadata
    let metadata = file.metadata().map_err(PlatformError::Io)?;
    if metadata.is_file() {
        return Ok(metadata.len());
    }

    Err(PlatformError::LengthProbeFailed(path.to_string()))
}

/// Probe the physical sector size; returns 0 when it cannot be determined
pub fn probe_sector_size(file: &File) -> u32 {
    let fd = file.as_raw_fd();

    const BLKSSZGET: libc::Ioctl = 0x1268u32 as libc::Ioctl;

    let mut sector_size: i32 = 0;
    // SAFETY: ioctl with BLKSSZGET writes an i32 through the provided
    // pointer; fd is valid for the lifetime of `file`.
    #[allow(unsafe_code)]
    let result = unsafe { libc::ioctl(fd, BLKSSZGET, &mut sector_size) };

    if result == 0 && sector_size > 0 {
        return sector_size as u32;
    }

    // Regular files align to the filesystem's preferred I/O size
    if let Ok(metadata) = file.metadata() {
        if metadata.is_file() {
            let blksize = metadata.blksize();
            if blksize > 0 && blksize <= u32::MAX as u64 {
                return blksize as u32;
            }
        }
    }

    0
}

// ============================================================================
// UNIT TESTS
// ============================================================================
