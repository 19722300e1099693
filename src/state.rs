//! State returned from restore operations.

use std::path::PathBuf;

/// Result state from restoring one target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct State {
    /// Device path after symlink resolution.
    pub device_path: PathBuf,

    /// Number of bytes read from the snapshot stream.
    pub bytes_read: u64,

    /// Number of bytes physically written to the device.
    pub bytes_written: u64,

    /// Number of bytes skipped because their chunk was all zeros.
    pub bytes_skipped: u64,

    /// Number of chunks written.
    pub chunks_written: u64,

    /// Number of all-zero chunks skipped.
    pub chunks_skipped: u64,
}

impl State {
    /// Create an empty State for the given device.
    pub fn new(device_path: PathBuf) -> Self {
        Self {
            device_path,
            ..Self::default()
        }
    }

    pub(crate) fn record_written(&mut self, len: usize) {
        self.bytes_read += len as u64;
        self.bytes_written += len as u64;
        self.chunks_written += 1;
    }

    pub(crate) fn record_skipped(&mut self, len: usize) {
        self.bytes_read += len as u64;
        self.bytes_skipped += len as u64;
        self.chunks_skipped += 1;
    }
}
