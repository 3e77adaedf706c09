//! Windows platform implementation
//!
//! Opens devices with FILE_FLAG_NO_BUFFERING and probes capacities via
//! DeviceIoControl. Logical drive letters (`\\.\F:`) need a different
//! probe order than physical drives: the length-info ioctl often fails on
//! removable media, while the free-space query succeeds.

use crate::{DiskOptions, PlatformError, Result};
use diskmirror_core::device::BlockDev;
use std::fs::{File, OpenOptions as StdOpenOptions};
use std::io;
use std::mem;
use std::os::windows::fs::{FileExt, OpenOptionsExt};
use std::os::windows::io::AsRawHandle;
use std::ptr;

use windows_sys::Win32::Foundation::HANDLE;
use windows_sys::Win32::Storage::FileSystem::{
    GetDiskFreeSpaceExW, FILE_FLAG_NO_BUFFERING, FILE_FLAG_SEQUENTIAL_SCAN,
    FILE_FLAG_WRITE_THROUGH, FILE_SHARE_READ,
};
use windows_sys::Win32::System::Ioctl::{
    DISK_GEOMETRY, DISK_GEOMETRY_EX, GET_LENGTH_INFORMATION, IOCTL_DISK_GET_DRIVE_GEOMETRY,
    IOCTL_DISK_GET_DRIVE_GEOMETRY_EX, IOCTL_DISK_GET_LENGTH_INFO,
};
use windows_sys::Win32::System::IO::DeviceIoControl;

/// A source or destination opened for raw positioned I/O
pub struct WindowsDisk {
    file: File,
    path: String,
    len: u64,
    sector_size: u32,
}

impl WindowsDisk {
    /// Open a device or image file for raw I/O
    pub fn open(path: &str, options: DiskOptions) -> Result<Self> {
        let mut std_options = StdOpenOptions::new();
        std_options.read(options.read).write(options.write);

        let mut flags = 0u32;
        if options.direct_io {
            flags |= FILE_FLAG_NO_BUFFERING | FILE_FLAG_WRITE_THROUGH;
        }
        if options.sequential {
            flags |= FILE_FLAG_SEQUENTIAL_SCAN;
        }
        std_options.custom_flags(flags);

        // Writers take the device exclusively; readers share.
        if !options.write {
            std_options.share_mode(FILE_SHARE_READ);
        } else {
            std_options.share_mode(0);
        }

        let file = std_options.open(path).map_err(|e| {
            if e.kind() == io::ErrorKind::PermissionDenied {
                PlatformError::PermissionDenied(format!(
                    "Cannot open {}: {}. Run from an elevated prompt.",
                    path, e
                ))
            } else if e.kind() == io::ErrorKind::NotFound {
                PlatformError::DeviceNotFound(path.to_string())
            } else {
                PlatformError::Io(e)
            }
        })?;

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

impl BlockDev for WindowsDisk {
    fn len(&self) -> u64 {
        self.len
    }

    fn sector_size(&self) -> u32 {
        self.sector_size
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.file.seek_read(buf, offset)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        self.file.seek_write(buf, offset)
    }

    fn flush(&self) -> io::Result<()> {
        self.file.sync_all()
    }
}

/// Is `path` a logical drive letter handle like `\\.\F:` or `\\.\F:\`?
fn is_logical_drive(path: &str) -> bool {
    let bytes = path.as_bytes();
    if !(path.len() == 6 || (path.len() == 7 && bytes[6] == b'\\')) {
        return false;
    }
    path.starts_with(r"\\.\") && bytes[4].is_ascii_alphabetic() && bytes[5] == b':'
}

/// Probe the byte length of a device, volume, or file
pub fn probe_byte_length(file: &File, path: &str) -> Result<u64> {
    let handle = file.as_raw_handle() as HANDLE;

    if is_logical_drive(path) {
        // Free-space query against the drive root is the reliable probe
        // for logical volumes, removable media especially.
        let drive_letter = path.as_bytes()[4] as char;
        let root: Vec<u16> = format!("{}:\\", drive_letter)
            .encode_utf16()
            .chain(std::iter::once(0))
            .collect();

        let mut total_bytes: u64 = 0;
        // SAFETY: GetDiskFreeSpaceExW writes a u64 through the non-null
        // out pointer; the root string is NUL-terminated.
        #[allow(unsafe_code)]
        let ok = unsafe {
            GetDiskFreeSpaceExW(root.as_ptr(), ptr::null_mut(), &mut total_bytes, ptr::null_mut())
        };
        if ok != 0 && total_bytes > 0 {
            return Ok(total_bytes);
        }
        tracing::debug!(path, "GetDiskFreeSpaceExW failed, trying length ioctl");
    }

    if let Some(len) = length_info_ioctl(handle) {
        return Ok(len);
    }

    if let Some(len) = drive_geometry_ex_ioctl(handle) {
        return Ok(len);
    }

    // Image files opened through a regular path
    let metadata = file.metadata().map_err(PlatformError::Io)?;
    if metadata.is_file() {
        return Ok(metadata.len());
    }

    Err(PlatformError::LengthProbeFailed(path.to_string()))
}

fn length_info_ioctl(handle: HANDLE) -> Option<u64> {
    let mut info: GET_LENGTH_INFORMATION = unsafe { mem::zeroed() };
    let mut returned: u32 = 0;

    // SAFETY: the ioctl writes at most size_of::<GET_LENGTH_INFORMATION>()
    // bytes into the provided buffer.
    #[allow(unsafe_code)]
    let ok = unsafe {
        DeviceIoControl(
            handle,
            IOCTL_DISK_GET_LENGTH_INFO,
            ptr::null(),
            0,
            &mut info as *mut _ as *mut _,
            mem::size_of::<GET_LENGTH_INFORMATION>() as u32,
            &mut returned,
            ptr::null_mut(),
        )
    };

    (ok != 0 && info.Length >= 0).then_some(info.Length as u64)
}

fn drive_geometry_ex_ioctl(handle: HANDLE) -> Option<u64> {
    let mut geometry: DISK_GEOMETRY_EX = unsafe { mem::zeroed() };
    let mut returned: u32 = 0;

    #[allow(unsafe_code)]
    let ok = unsafe {
        DeviceIoControl(
            handle,
            IOCTL_DISK_GET_DRIVE_GEOMETRY_EX,
            ptr::null(),
            0,
            &mut geometry as *mut _ as *mut _,
            mem::size_of::<DISK_GEOMETRY_EX>() as u32,
            &mut returned,
            ptr::null_mut(),
        )
    };

    (ok != 0 && geometry.DiskSize >= 0).then_some(geometry.DiskSize as u64)
}

/// Probe the physical sector size; returns 0 when it cannot be determined
///
/// The geometry ioctl is commonly unsupported for logical drive letter
/// handles; the caller decides whether to fall back to 4096.
pub fn probe_sector_size(file: &File) -> u32 {
    let handle = file.as_raw_handle() as HANDLE;

    let mut geometry: DISK_GEOMETRY = unsafe { mem::zeroed() };
    let mut returned: u32 = 0;

    #[allow(unsafe_code)]
    let ok = unsafe {
        DeviceIoControl(
            handle,
            IOCTL_DISK_GET_DRIVE_GEOMETRY,
            ptr::null(),
            0,
            &mut geometry as *mut _ as *mut _,
            mem::size_of::<DISK_GEOMETRY>() as u32,
            &mut returned,
            ptr::null_mut(),
        )
    };

    if ok != 0 && geometry.BytesPerSector > 0 {
        return geometry.BytesPerSector;
    }

    0
}

/// Check if the current process token is elevated
pub(crate) fn is_elevated() -> bool {
    use windows_sys::Win32::Foundation::CloseHandle;
    use windows_sys::Win32::Security::{
        GetTokenInformation, TokenElevation, TOKEN_ELEVATION, TOKEN_QUERY,
    };
    use windows_sys::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

    #[allow(unsafe_code)]
    unsafe {
        let mut token: HANDLE = ptr::null_mut();
        if OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut token) == 0 {
            return false;
        }

        let mut elevation: TOKEN_ELEVATION = mem::zeroed();
        let mut size: u32 = 0;

        let result = GetTokenInformation(
            token,
            TokenElevation,
            &mut elevation as *mut _ as *mut _,
            mem::size_of::<TOKEN_ELEVATION>() as u32,
            &mut size,
        );

        CloseHandle(token);

        result != 0 && elevation.TokenIsElevated != 0
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================
