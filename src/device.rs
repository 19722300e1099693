//! Block devices as backup stream entries.
//!
//! [`BlockDeviceEntry`] probes the device size once and hands out a fresh
//! [`DeviceReader`] per [`open`](StreamingFile::open) call. Every reader owns
//! its own descriptor, so readers can be used concurrently and dropped in
//! any order.

use crate::classify::{ensure_block_device, Classify, SystemClassifier};
use crate::context::Context;
use crate::entry::{
    DeviceInfo, Entry, FsEntry, OwnerInfo, ReadStream, StaticDirectory, StreamingFile,
};
use crate::error::Result;
use crate::probe::{open_device, probe_size};

use std::fmt;
use std::fs::{File, Metadata};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::SystemTime;

/// A block device exposed as a streaming file.
///
/// Metadata comes from the wrapped entry, except [`size`](Entry::size) which
/// is the probed device size.
pub struct BlockDeviceEntry {
    path: PathBuf,
    size: u64,
    inner: Box<dyn Entry>,
    this: Weak<BlockDeviceEntry>,
}

impl BlockDeviceEntry {
    /// Discover the device at `path`: stat it, check that it is a block
    /// device and probe its size.
    pub fn from_path(path: &Path) -> Result<Arc<Self>> {
        Self::from_path_with(path, &SystemClassifier)
    }

    /// Like [`from_path`](Self::from_path) with a caller supplied classifier.
    pub fn from_path_with(path: &Path, classifier: &dyn Classify) -> Result<Arc<Self>> {
        let inner = FsEntry::from_path(path)?;
        ensure_block_device(classifier, path)?;
        let size = probe_size(path)?;
        tracing::debug!(path = %path.display(), size, "discovered block device");
        Ok(Self::new(path.to_path_buf(), size, Box::new(inner)))
    }

    /// Wrap `inner` with an already probed `size`.
    pub fn new(path: PathBuf, size: u64, inner: Box<dyn Entry>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            path,
            size,
            inner,
            this: this.clone(),
        })
    }

    /// Path of the device node.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for BlockDeviceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockDeviceEntry")
            .field("path", &self.path)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

impl Entry for BlockDeviceEntry {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn mode(&self) -> u32 {
        self.inner.mode()
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn mod_time(&self) -> SystemTime {
        self.inner.mod_time()
    }

    fn is_dir(&self) -> bool {
        self.inner.is_dir()
    }

    fn owner(&self) -> OwnerInfo {
        self.inner.owner()
    }

    fn device(&self) -> DeviceInfo {
        self.inner.device()
    }

    fn sys(&self) -> Option<&Metadata> {
        self.inner.sys()
    }
}

impl StreamingFile for BlockDeviceEntry {
    fn open(&self, ctx: &Context) -> Result<Box<dyn ReadStream>> {
        ctx.check()?;
        let file = open_device(&self.path)?;
        Ok(Box::new(DeviceReader {
            file,
            entry: self.this.clone(),
        }))
    }
}

/// Read stream over one open device descriptor.
pub struct DeviceReader {
    file: File,
    entry: Weak<BlockDeviceEntry>,
}

impl Read for DeviceReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Seek for DeviceReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl ReadStream for DeviceReader {
    fn entry(&self) -> Option<Arc<dyn StreamingFile>> {
        self.entry
            .upgrade()
            .map(|entry| entry as Arc<dyn StreamingFile>)
    }
}

/// Wrap a device entry in a directory holding only that device, which is
/// the shape the engine snapshots for a block volume.
pub fn source_directory(entry: Arc<BlockDeviceEntry>) -> StaticDirectory {
    let name = entry.name().to_string();
    StaticDirectory::new(name, vec![entry as Arc<dyn StreamingFile>])
}
