//! macOS platform implementation
//!
//! macOS has no O_DIRECT; F_NOCACHE after opening bypasses the buffer
//! cache. Capability probing uses the DKIOC* ioctls.

use crate::{DiskOptions, PlatformError, Result};
use diskmirror_core::device::BlockDev;
use std::fs::{File, OpenOptions as StdOpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;

/// A source or destination opened for raw positioned I/O
pub struct MacDisk {
    file: File,
    path: String,
    len: u64,
    sector_size: u32,
}

impl MacDisk {
    /// Open a device or image file for raw I/O
    pub fn open(path: &str, options: DiskOptions) -> Result<Self> {
        if !Path::new(path).exists() {
            return Err(PlatformError::DeviceNotFound(path.to_string()));
        }

        let mut std_options = StdOpenOptions::new();
        std_options.read(options.read).write(options.write);

        let file = std_options.open(path).map_err(|e| {
            if e.kind() == io::ErrorKind::PermissionDenied {
                PlatformError::PermissionDenied(format!(
                    "Cannot open {}: {}. Try running with sudo.",
                    path, e
                ))
            } else if e.raw_os_error() == Some(libc::EBUSY) {
                PlatformError::DeviceBusy(format!(
                    "{} is busy. Try running: diskutil unmountDisk {}",
                    path, path
                ))
            } else {
                PlatformError::Io(e)
            }
        })?;

        if options.direct_io {
            set_nocache(&file)?;
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
    pub fn set_sector_size(&mut self, sector_size: u32) {
        self.sector_size = sector_size;
    }
}

impl BlockDev for MacDisk {
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

/// Set F_NOCACHE on a file descriptor for un-cached I/O
fn set_nocache(file: &File) -> Result<()> {
    let fd = file.as_raw_fd();
    // F_NOCACHE = 48 on macOS
    const F_NOCACHE: libc::c_int = 48;

    // SAFETY: fcntl with F_NOCACHE takes an integer argument; fd is valid
    // for the lifetime of `file`.
    #[allow(unsafe_code)]
    let result = unsafe { libc::fcntl(fd, F_NOCACHE, 1) };
    if result == -1 {
        return Err(PlatformError::Io(io::Error::last_os_error()));
    }
    Ok(())
}

/// Probe the byte length of a device or file
pub fn probe_byte_length(file: &File, path: &str) -> Result<u64> {
    let fd = file.as_raw_fd();

    // DKIOCGETBLOCKCOUNT = 0x40086419, DKIOCGETBLOCKSIZE = 0x40046418
    const DKIOCGETBLOCKCOUNT: libc::c_ulong = 0x4008_6419;
    const DKIOCGETBLOCKSIZE: libc::c_ulong = 0x4004_6418;

    let mut block_count: u64 = 0;
    let mut block_size: u32 = 0;

    // SAFETY: both ioctls write fixed-size integers through the provided
    // pointers; fd is valid for the lifetime of `file`.
    #[allow(unsafe_code)]
    let (count_ok, size_ok) = unsafe {
        (
            libc::ioctl(fd, DKIOCGETBLOCKCOUNT, &mut block_count) == 0,
            libc::ioctl(fd, DKIOCGETBLOCKSIZE, &mut block_size) == 0,
        )
    };

    if count_ok && size_ok && block_count > 0 && block_size > 0 {
        return Ok(block_count * block_size as u64);
    }

    let metadata = file.metadata().map_err(PlatformError::Io)?;
    if metadata.is_file() {
        return Ok(metadata.len());
    }

    Err(PlatformError::LengthProbeFailed(path.to_string()))
}

/// Probe the physical sector size; returns 0 when it cannot be determined
pub fn probe_sector_size(file: &File) -> u32 {
    let fd = file.as_raw_fd();

    const DKIOCGETBLOCKSIZE: libc::c_ulong = 0x4004_6418;

    let mut block_size: u32 = 0;
    // SAFETY: DKIOCGETBLOCKSIZE writes a u32 through the provided pointer;
    // fd is valid for the lifetime of `file`.
    #[allow(unsafe_code)]
    let result = unsafe { libc::ioctl(fd, DKIOCGETBLOCKSIZE, &mut block_size) };

    if result == 0 && block_size > 0 {
        return block_size;
    }

    // Regular files: the stat block size is a reasonable alignment
    if let Ok(metadata) = file.metadata() {
        if metadata.is_file() {
            use std::os::unix::fs::MetadataExt;
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
