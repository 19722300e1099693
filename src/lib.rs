//! # blkstream
//!
//! A Rust crate for backing up raw block devices as stream entries and
//! restoring snapshot data back onto them.
//!
//! ## Overview
//!
//! Backup engines usually walk a tree of named, sized, readable entries and
//! restore through an output that creates regular files. Block devices do
//! not fit that model directly: `stat` does not report their size, they
//! cannot be created or truncated, and restoring them benefits from skipping
//! regions that are already zero. `blkstream` provides the two adapters:
//!
//! - [`BlockDeviceEntry`] classifies a path as a block device, probes its
//!   size by seeking to the end, and opens an independent [`DeviceReader`]
//!   for every read pass.
//! - [`BlockOutput`] resolves a restore target through symlinks, checks that
//!   it is still a block device, and copies the snapshot stream onto it in
//!   fixed-size chunks, seeking over chunks that are entirely zero.
//!
//! Every other output operation is forwarded to a wrapped
//! [`FilesystemOutput`].
//!
//! ## Example
//!
//! ```no_run
//! use blkstream::{BlockDeviceEntry, BlockOutput, Context, Entry, FilesystemOutput, StreamingFile};
//! use std::io::Read;
//! use std::path::Path;
//!
//! let ctx = Context::new();
//! let entry = BlockDeviceEntry::from_path(Path::new("/dev/sdb")).unwrap();
//! println!("{} is {} bytes", entry.name(), entry.size());
//!
//! let mut reader = entry.open(&ctx).unwrap();
//! let mut first_sector = [0u8; 512];
//! reader.read_exact(&mut first_sector).unwrap();
//!
//! // Restore the stream onto /dev/sdc, assumed to be zero-filled.
//! let output = BlockOutput::new(FilesystemOutput::new("/dev"));
//! let state = output.restore_file(&ctx, "sdc", entry.as_ref()).unwrap();
//! println!("wrote {} bytes, skipped {}", state.bytes_written, state.bytes_skipped);
//! ```
//!
//! ## Safety
//!
//! Opening block devices usually requires root privileges. Permission
//! failures are reported as [`Error::PermissionDenied`]. The CLI tool
//! automatically requests sudo permissions when needed.

mod classify;
mod context;
mod device;
mod entry;
mod error;
mod options;
mod output;
mod probe;
mod restore;
mod state;

pub use classify::{classify, ensure_block_device, Classify, FileKind, SystemClassifier};
pub use context::Context;
pub use device::{source_directory, BlockDeviceEntry, DeviceReader};
pub use entry::{
    DeviceInfo, Entry, FsEntry, OwnerInfo, ReadStream, StaticDirectory, StreamingFile, Symlink,
};
pub use error::{Error, Result, PRIVILEGE_HINT};
pub use options::{RestoreOptions, DEFAULT_CHUNK_SIZE};
pub use output::{DirEntry, EntryKind, FilesystemOutput, Output};
pub use probe::{device_size, open_device, probe_size};
pub use restore::{copy_sparse, is_all_zero, BlockOutput};
pub use state::State;
