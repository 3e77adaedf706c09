//! # diskmirror Platform
//!
//! Platform-specific adapters for raw device I/O and capability probing.
//!
//! This crate opens sources and destinations for un-cached, positioned
//! I/O and probes the two device capabilities the copy engine needs:
//! byte length and physical sector size. It implements the engine's
//! [`BlockDev`] seam for real files and block devices.
//!
//! ## Safety
//!
//! This crate performs raw device I/O which can destroy data. All
//! operations require explicit device paths; the CLI is responsible for
//! confirming destructive writes.

#![warn(missing_docs)]
#![warn(clippy::all)]

use thiserror::Error;

pub use diskmirror_core::device::BlockDev;

/// Platform-specific errors
#[derive(Error, Debug)]
pub enum PlatformError {
    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Device access denied (need elevated privileges)
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Device is busy or locked
    #[error("Device busy: {0}")]
    DeviceBusy(String),

    /// Device not found
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Could not determine the device's byte length
    #[error("Failed to probe device length: {0}")]
    LengthProbeFailed(String),

    /// Operation not supported on this platform
    #[error("Not supported: {0}")]
    NotSupported(String),
}

/// Result type for platform operations
pub type Result<T> = std::result::Result<T, PlatformError>;

/// Options for opening a device
#[derive(Debug, Clone)]
pub struct DiskOptions {
    /// Open for reading
    pub read: bool,

    /// Open for writing
    pub write: bool,

    /// Bypass the OS page cache
    pub direct_io: bool,

    /// Hint that access will be sequential
    pub sequential: bool,
}

impl Default for DiskOptions {
    fn default() -> Self {
        Self {
            read: true,
            write: false,
            direct_io: true,
            sequential: true,
        }
    }
}

impl DiskOptions {
    /// Create new options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set read access
    pub fn read(mut self, read: bool) -> Self {
        self.read = read;
        self
    }

    /// Set write access
    pub fn write(mut self, write: bool) -> Self {
        self.write = write;
        self
    }

    /// Set direct (un-cached) I/O mode
    pub fn direct_io(mut self, direct: bool) -> Self {
        self.direct_io = direct;
        self
    }

    /// Set the sequential access hint
    pub fn sequential(mut self, sequential: bool) -> Self {
        self.sequential = sequential;
        self
    }
}

/// Check if running with elevated privileges
pub fn has_elevated_privileges() -> bool {
    #[cfg(unix)]
    {
        // SAFETY: geteuid() has no preconditions and cannot fail.
        #[allow(unsafe_code)]
        unsafe {
            libc::geteuid() == 0
        }
    }
    #[cfg(windows)]
    {
        windows::is_elevated()
    }
    #[cfg(not(any(unix, windows)))]
    {
        false
    }
}

// Platform-specific implementations
cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod linux;
        pub use linux::LinuxDisk as Disk;
    } else if #[cfg(target_os = "macos")] {
        mod macos;
        pub use macos::MacDisk as Disk;
    } else if #[cfg(target_os = "windows")] {
        mod windows;
        pub use windows::WindowsDisk as Disk;
    }
}

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))] {
        /// Open a copy source for sequential reads
        ///
        /// `direct_io` bypasses the page cache; image files on filesystems
        /// without direct I/O support need it off.
        pub fn open_source(path: &str, direct_io: bool) -> Result<Disk> {
            Disk::open(path, DiskOptions::new().read(true).write(false).direct_io(direct_io))
        }

        /// Open a copy destination for sequential writes
        pub fn open_destination(path: &str, direct_io: bool) -> Result<Disk> {
            Disk::open(path, DiskOptions::new().read(false).write(true).direct_io(direct_io))
        }
    } else {
        /// Open a copy source (unsupported platform)
        pub fn open_source(_path: &str, _direct_io: bool) -> Result<std::convert::Infallible> {
            Err(PlatformError::NotSupported("Platform not supported".to_string()))
        }

        /// Open a copy destination (unsupported platform)
        pub fn open_destination(_path: &str, _direct_io: bool) -> Result<std::convert::Infallible> {
            Err(PlatformError::NotSupported("Platform not supported".to_string()))
        }
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================
