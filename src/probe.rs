//! Opening block devices and probing their size.
//!
//! `stat` reports a size of zero for most block devices, so the size is
//! taken from the offset reached by seeking to the end of the device.

use crate::error::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::path::Path;

/// Open a device read-only.
///
/// Permission failures are reported as [`Error::PermissionDenied`].
pub fn open_device(path: &Path) -> Result<File> {
    let file = OpenOptions::new()
        .read(true)
        .open(path)
        .map_err(|e| Error::device_open(path, e))?;
    tracing::debug!(path = %path.display(), "opened device for reading");
    Ok(file)
}

/// Size in bytes of an already opened device, leaving it at offset 0.
pub fn device_size(file: &mut File, path: &Path) -> Result<u64> {
    let size_probe = |source| Error::SizeProbe {
        path: path.to_path_buf(),
        source,
    };
    let size = file.seek(SeekFrom::End(0)).map_err(size_probe)?;
    file.seek(SeekFrom::Start(0)).map_err(size_probe)?;
    Ok(size)
}

/// Open `path`, measure it and close it again.
pub fn probe_size(path: &Path) -> Result<u64> {
    let mut file = open_device(path)?;
    let size = device_size(&mut file, path)?;
    tracing::debug!(path = %path.display(), size, "probed device size");
    Ok(size)
}
