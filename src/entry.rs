//! Entry contracts walked by the backup engine.
//!
//! An [`Entry`] is anything nameable and sized. A [`StreamingFile`] can also
//! be opened for reading, producing a [`ReadStream`]. [`FsEntry`] is the
//! generic filesystem-backed entry that specialised entries wrap for the
//! metadata they do not compute themselves.

use crate::context::Context;
use crate::error::{Error, Result};
use std::fs::Metadata;
use std::io::{Read, Seek};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Owner of an entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OwnerInfo {
    pub uid: u32,
    pub gid: u32,
}

/// Device identity of an entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Device containing the entry (`st_dev`).
    pub dev: u64,
    /// Device the entry represents, for device files (`st_rdev`).
    pub rdev: u64,
}

/// Metadata common to every entry.
pub trait Entry: Send + Sync {
    fn name(&self) -> &str;

    /// Full `st_mode` bits, including the file type.
    fn mode(&self) -> u32;

    fn size(&self) -> u64;

    fn mod_time(&self) -> SystemTime;

    fn is_dir(&self) -> bool;

    fn owner(&self) -> OwnerInfo;

    fn device(&self) -> DeviceInfo;

    /// Platform metadata the entry was built from, if any.
    fn sys(&self) -> Option<&Metadata>;
}

/// An entry whose content can be read as a stream.
pub trait StreamingFile: Entry {
    /// Open an independent read stream positioned at offset 0.
    fn open(&self, ctx: &Context) -> Result<Box<dyn ReadStream>>;
}

/// Stream returned by [`StreamingFile::open`].
///
/// Dropping the stream releases its descriptor.
pub trait ReadStream: Read + Seek + Send {
    /// The entry this stream was opened from, if it is still alive.
    fn entry(&self) -> Option<Arc<dyn StreamingFile>>;

    /// Release the stream. Other streams of the same entry are unaffected.
    fn close(self: Box<Self>) -> Result<()> {
        drop(self);
        Ok(())
    }
}

/// A symbolic link entry.
pub trait Symlink: Entry {
    fn readlink(&self, ctx: &Context) -> Result<PathBuf>;
}

/// Entry backed by an `lstat` snapshot of a local path.
#[derive(Debug, Clone)]
pub struct FsEntry {
    name: String,
    path: PathBuf,
    metadata: Metadata,
}

impl FsEntry {
    /// Snapshot the metadata of `path` without following symlinks.
    pub fn from_path(path: &Path) -> Result<Self> {
        let metadata = std::fs::symlink_metadata(path).map_err(|source| Error::Stat {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Ok(Self {
            name,
            path: path.to_path_buf(),
            metadata,
        })
    }

    /// Local path this entry was read from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Entry for FsEntry {
    fn name(&self) -> &str {
        &self.name
    }

    fn mode(&self) -> u32 {
        self.metadata.mode()
    }

    fn size(&self) -> u64 {
        self.metadata.len()
    }

    fn mod_time(&self) -> SystemTime {
        self.metadata.modified().unwrap_or_else(|_| {
            UNIX_EPOCH + Duration::new(self.metadata.mtime().max(0) as u64, 0)
        })
    }

    fn is_dir(&self) -> bool {
        self.metadata.is_dir()
    }

    fn owner(&self) -> OwnerInfo {
        OwnerInfo {
            uid: self.metadata.uid(),
            gid: self.metadata.gid(),
        }
    }

    fn device(&self) -> DeviceInfo {
        DeviceInfo {
            dev: self.metadata.dev(),
            rdev: self.metadata.rdev(),
        }
    }

    fn sys(&self) -> Option<&Metadata> {
        Some(&self.metadata)
    }
}

/// In-memory directory with a fixed list of streaming children.
pub struct StaticDirectory {
    name: String,
    mod_time: SystemTime,
    entries: Vec<Arc<dyn StreamingFile>>,
}

impl StaticDirectory {
    pub fn new(name: impl Into<String>, entries: Vec<Arc<dyn StreamingFile>>) -> Self {
        Self {
            name: name.into(),
            mod_time: SystemTime::now(),
            entries,
        }
    }

    pub fn entries(&self) -> &[Arc<dyn StreamingFile>] {
        &self.entries
    }

    /// Look up a child by name.
    pub fn child(&self, name: &str) -> Option<&Arc<dyn StreamingFile>> {
        self.entries.iter().find(|e| e.name() == name)
    }
}

impl Entry for StaticDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    fn mode(&self) -> u32 {
        libc::S_IFDIR as u32 | 0o777
    }

    fn size(&self) -> u64 {
        0
    }

    fn mod_time(&self) -> SystemTime {
        self.mod_time
    }

    fn is_dir(&self) -> bool {
        true
    }

    fn owner(&self) -> OwnerInfo {
        OwnerInfo::default()
    }

    fn device(&self) -> DeviceInfo {
        DeviceInfo::default()
    }

    fn sys(&self) -> Option<&Metadata> {
        None
    }
}
