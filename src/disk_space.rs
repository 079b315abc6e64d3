//! Disk space checks for the undo history volume
//!
//! Snapshots are full copies, so editing a very large file can consume a lot
//! of space in the history directory. Capturing is refused before that
//! happens rather than failing halfway through the copy.

use anyhow::{Context, Result};
use std::path::Path;

/// Information about disk space usage
#[derive(Debug, Clone)]
pub struct DiskSpaceInfo {
    /// Total disk space in bytes
    pub total_bytes: u64,
    /// Available disk space in bytes
    pub available_bytes: u64,
}

impl DiskSpaceInfo {
    /// Convert bytes to human-readable format (e.g., "1.5 GB")
    pub fn bytes_to_human(bytes: u64) -> String {
        const KB: u64 = 1024;
        const MB: u64 = 1024 * KB;
        const GB: u64 = 1024 * MB;
        const TB: u64 = 1024 * GB;

        if bytes >= TB {
            format!("{:.1} TB", bytes as f64 / TB as f64)
        } else if bytes >= GB {
            format!("{:.1} GB", bytes as f64 / GB as f64)
        } else if bytes >= MB {
            format!("{:.1} MB", bytes as f64 / MB as f64)
        } else if bytes >= KB {
            format!("{:.1} KB", bytes as f64 / KB as f64)
        } else {
            format!("{} B", bytes)
        }
    }

    pub fn available_human(&self) -> String {
        Self::bytes_to_human(self.available_bytes)
    }

    pub fn total_human(&self) -> String {
        Self::bytes_to_human(self.total_bytes)
    }
}

/// Query the filesystem holding `path` with `statvfs`
#[cfg(unix)]
pub fn get_disk_space(path: &Path) -> Result<DiskSpaceInfo> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path =
        CString::new(path.as_os_str().as_bytes()).context("Failed to convert path to CString")?;

    // SAFETY: `libc::statvfs` is a plain C struct of integers, so the zeroed
    // value is valid. `c_path` outlives the call and the return value is
    // checked before the struct is read.
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    if unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) } != 0 {
        return Err(anyhow::anyhow!(
            "Failed to get disk space for '{}': {}",
            path.display(),
            std::io::Error::last_os_error()
        ));
    }

    #[allow(clippy::unnecessary_cast)] // field widths differ across platforms
    let frsize = stat.f_frsize as u64;
    #[allow(clippy::unnecessary_cast)]
    let (blocks, bavail) = (stat.f_blocks as u64, stat.f_bavail as u64);

    Ok(DiskSpaceInfo {
        total_bytes: blocks * frsize,
        available_bytes: bavail * frsize,
    })
}

/// Check that a snapshot of `file_size` bytes fits in the history directory
///
/// Fails when the snapshot would take more than `max_percent` of the free
/// space left on that volume.
#[cfg(unix)]
pub fn check_disk_space_for_snapshot(history_dir: &Path, file_size: u64, max_percent: f64) -> Result<()> {
    let space = get_disk_space(history_dir).context("Failed to check disk space")?;

    let percent_of_free = if space.available_bytes > 0 {
        (file_size as f64 / space.available_bytes as f64) * 100.0
    } else {
        100.0
    };

    if percent_of_free > max_percent {
        return Err(anyhow::anyhow!(
            "Insufficient disk space for undo history\n\
             history directory: {}\n\
             available: {} (total: {})\n\
             snapshot required: {} ({:.1}% of free space)\n\
             maximum allowed: {:.1}% of free space\n\
             \n\
             Set [history] dir in the config file to a larger volume.",
            history_dir.display(),
            space.available_human(),
            space.total_human(),
            DiskSpaceInfo::bytes_to_human(file_size),
            percent_of_free,
            max_percent
        ));
    }

    Ok(())
}
