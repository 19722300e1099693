//! Output contract the restore engine writes through.
//!
//! [`FilesystemOutput`] is the generic implementation that restores regular
//! files, directories and symlinks below a target directory. Specialised
//! outputs wrap it and forward the operations they do not change.

use crate::context::Context;
use crate::entry::{Entry, StreamingFile, Symlink};
use crate::error::{Error, Result};
use crate::options::RestoreOptions;
use crate::restore::copy_sparse;

use std::fs::{self, OpenOptions, Permissions};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Kind of a snapshot directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

/// Directory entry metadata recorded in a snapshot.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
    /// Permission bits.
    pub mode: u32,
    pub size: u64,
    pub mod_time: SystemTime,
    pub uid: u32,
    pub gid: u32,
}

/// Operations the restore engine performs on its destination.
pub trait Output: Send + Sync {
    /// Restore the content of `remote` at `relative_path`.
    fn write_file(
        &self,
        ctx: &Context,
        relative_path: &str,
        remote: &dyn StreamingFile,
    ) -> Result<()>;

    fn begin_directory(&self, ctx: &Context, relative_path: &str, dir: &dyn Entry) -> Result<()>;

    fn write_dir_entry(
        &self,
        ctx: &Context,
        relative_path: &str,
        dir_entry: &DirEntry,
        dir: &dyn Entry,
    ) -> Result<()>;

    fn finish_directory(&self, ctx: &Context, relative_path: &str, dir: &dyn Entry) -> Result<()>;

    /// Whether `relative_path` already holds content matching `remote`.
    fn file_exists(&self, ctx: &Context, relative_path: &str, remote: &dyn StreamingFile) -> bool;

    fn create_symlink(&self, ctx: &Context, relative_path: &str, link: &dyn Symlink) -> Result<()>;

    fn symlink_exists(&self, ctx: &Context, relative_path: &str, link: &dyn Symlink) -> bool;

    /// Whether the engine may call [`write_file`](Output::write_file)
    /// concurrently for different paths.
    fn parallelizable(&self) -> bool;

    fn close(&self, ctx: &Context) -> Result<()>;
}

/// Restores entries as ordinary files below `target_path`.
#[derive(Debug, Clone)]
pub struct FilesystemOutput {
    target_path: PathBuf,
}

impl FilesystemOutput {
    pub fn new(target_path: impl Into<PathBuf>) -> Self {
        Self {
            target_path: target_path.into(),
        }
    }

    /// Directory everything is restored into.
    pub fn target_path(&self) -> &Path {
        &self.target_path
    }

    /// Local path for a slash separated path relative to the target.
    pub fn local_path(&self, relative_path: &str) -> PathBuf {
        let mut path = self.target_path.clone();
        for part in relative_path.split('/').filter(|p| !p.is_empty() && *p != ".") {
            path.push(part);
        }
        path
    }
}

fn set_mode(path: &Path, mode: u32) -> Result<()> {
    fs::set_permissions(path, Permissions::from_mode(mode & 0o7777))
        .map_err(|e| Error::fs("set permissions on", path, e))
}

impl Output for FilesystemOutput {
    fn write_file(
        &self,
        ctx: &Context,
        relative_path: &str,
        remote: &dyn StreamingFile,
    ) -> Result<()> {
        let path = self.local_path(relative_path);
        let mut reader = remote
            .open(ctx)
            .map_err(|e| Error::remote_open(remote.name(), e))?;
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|source| Error::Open {
                path: path.clone(),
                source,
            })?;
        // Read failures surface as Error::Read, write failures as Error::Write.
        let options = RestoreOptions::new().with_skip_zeros(false);
        copy_sparse(&mut reader, &mut file, &path, &options, ctx)?;
        set_mode(&path, remote.mode())
    }

    fn begin_directory(&self, _ctx: &Context, relative_path: &str, _dir: &dyn Entry) -> Result<()> {
        let path = self.local_path(relative_path);
        fs::create_dir_all(&path).map_err(|e| Error::fs("create directory", &path, e))
    }

    fn write_dir_entry(
        &self,
        _ctx: &Context,
        _relative_path: &str,
        _dir_entry: &DirEntry,
        _dir: &dyn Entry,
    ) -> Result<()> {
        Ok(())
    }

    fn finish_directory(&self, _ctx: &Context, relative_path: &str, dir: &dyn Entry) -> Result<()> {
        set_mode(&self.local_path(relative_path), dir.mode())
    }

    fn file_exists(&self, _ctx: &Context, relative_path: &str, remote: &dyn StreamingFile) -> bool {
        match fs::symlink_metadata(self.local_path(relative_path)) {
            Ok(meta) => meta.is_file() && meta.len() == remote.size(),
            Err(_) => false,
        }
    }

    fn create_symlink(&self, ctx: &Context, relative_path: &str, link: &dyn Symlink) -> Result<()> {
        let path = self.local_path(relative_path);
        let target = link.readlink(ctx)?;
        std::os::unix::fs::symlink(&target, &path)
            .map_err(|e| Error::fs("create symlink", &path, e))
    }

    fn symlink_exists(&self, ctx: &Context, relative_path: &str, link: &dyn Symlink) -> bool {
        let path = self.local_path(relative_path);
        match (fs::read_link(&path), link.readlink(ctx)) {
            (Ok(existing), Ok(wanted)) => existing == wanted,
            _ => false,
        }
    }

    fn parallelizable(&self) -> bool {
        true
    }

    fn close(&self, _ctx: &Context) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::entry::{DeviceInfo, OwnerInfo, ReadStream};
    use std::fs::Metadata;
    use std::io::{self, Cursor};
    use std::sync::Arc;

    /// In-memory snapshot file.
    pub(crate) struct MemFile {
        pub name: String,
        pub data: Vec<u8>,
    }

    struct MemStream(Cursor<Vec<u8>>);

    impl io::Read for MemStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            io::Read::read(&mut self.0, buf)
        }
    }

    impl io::Seek for MemStream {
        fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
            io::Seek::seek(&mut self.0, pos)
        }
    }

    impl ReadStream for MemStream {
        fn entry(&self) -> Option<Arc<dyn StreamingFile>> {
            None
        }
    }

    impl Entry for MemFile {
        fn name(&self) -> &str {
            &self.name
        }
        fn mode(&self) -> u32 {
            libc::S_IFREG as u32 | 0o640
        }
        fn size(&self) -> u64 {
            self.data.len() as u64
        }
        fn mod_time(&self) -> SystemTime {
            SystemTime::UNIX_EPOCH
        }
        fn is_dir(&self) -> bool {
            false
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

    impl StreamingFile for MemFile {
        fn open(&self, ctx: &Context) -> Result<Box<dyn ReadStream>> {
            ctx.check()?;
            Ok(Box::new(MemStream(Cursor::new(self.data.clone()))))
        }
    }

    pub(crate) struct MemLink {
        pub name: String,
        pub target: PathBuf,
    }

    impl Entry for MemLink {
        fn name(&self) -> &str {
            &self.name
        }
        fn mode(&self) -> u32 {
            libc::S_IFLNK as u32 | 0o777
        }
        fn size(&self) -> u64 {
            0
        }
        fn mod_time(&self) -> SystemTime {
            SystemTime::UNIX_EPOCH
        }
        fn is_dir(&self) -> bool {
            false
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

    impl Symlink for MemLink {
        fn readlink(&self, _ctx: &Context) -> Result<PathBuf> {
            Ok(self.target.clone())
        }
    }

    /// Snapshot file whose stream fails on the first read.
    struct BrokenFile(MemFile);

    struct FailingStream;

    impl io::Read for FailingStream {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::InvalidData, "corrupt blob"))
        }
    }

    impl io::Seek for FailingStream {
        fn seek(&mut self, _pos: io::SeekFrom) -> io::Result<u64> {
            Ok(0)
        }
    }

    impl ReadStream for FailingStream {
        fn entry(&self) -> Option<Arc<dyn StreamingFile>> {
            None
        }
    }

    impl Entry for BrokenFile {
        fn name(&self) -> &str {
            self.0.name()
        }
        fn mode(&self) -> u32 {
            self.0.mode()
        }
        fn size(&self) -> u64 {
            self.0.size()
        }
        fn mod_time(&self) -> SystemTime {
            self.0.mod_time()
        }
        fn is_dir(&self) -> bool {
            false
        }
        fn owner(&self) -> OwnerInfo {
            self.0.owner()
        }
        fn device(&self) -> DeviceInfo {
            self.0.device()
        }
        fn sys(&self) -> Option<&Metadata> {
            None
        }
    }

    impl StreamingFile for BrokenFile {
        fn open(&self, _ctx: &Context) -> Result<Box<dyn ReadStream>> {
            Ok(Box::new(FailingStream))
        }
    }

    #[test]
    fn test_write_file_reports_stream_read_failure() {
        let dir = tempfile::tempdir().unwrap();
        let output = FilesystemOutput::new(dir.path());
        let remote = BrokenFile(MemFile {
            name: "f".into(),
            data: vec![1, 2, 3],
        });

        let err = output.write_file(&Context::new(), "f", &remote).unwrap_err();
        assert!(matches!(err, Error::Read { .. }), "{err}");
    }

    #[test]
    fn test_write_file_reports_destination_write_failure() {
        let output = FilesystemOutput::new("/dev");
        let remote = MemFile {
            name: "full".into(),
            data: vec![1, 2, 3],
        };

        // Writes to /dev/full always fail with ENOSPC.
        if !Path::new("/dev/full").exists() {
            return;
        }
        let err = output.write_file(&Context::new(), "full", &remote).unwrap_err();
        assert!(matches!(err, Error::Write { .. }), "{err}");
    }

    #[test]
    fn test_local_path_joins_slash_separated() {
        let output = FilesystemOutput::new("/restore");
        assert_eq!(output.local_path("a/b/c"), PathBuf::from("/restore/a/b/c"));
        assert_eq!(output.local_path("/a//b/"), PathBuf::from("/restore/a/b"));
        assert_eq!(output.local_path(""), PathBuf::from("/restore"));
    }

    #[test]
    fn test_write_file_and_exists() {
        let dir = tempfile::tempdir().unwrap();
        let output = FilesystemOutput::new(dir.path());
        let ctx = Context::new();
        let remote = MemFile {
            name: "f".into(),
            data: b"payload".to_vec(),
        };

        assert!(!output.file_exists(&ctx, "f", &remote));
        output.write_file(&ctx, "f", &remote).unwrap();
        assert_eq!(fs::read(dir.path().join("f")).unwrap(), b"payload");
        assert!(output.file_exists(&ctx, "f", &remote));

        let mode = fs::metadata(dir.path().join("f")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
    }

    #[test]
    fn test_directory_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let output = FilesystemOutput::new(dir.path());
        let ctx = Context::new();
        let entry = crate::entry::StaticDirectory::new("sub", Vec::new());
        let dir_entry = DirEntry {
            name: "sub".into(),
            kind: EntryKind::Directory,
            mode: 0o755,
            size: 0,
            mod_time: SystemTime::UNIX_EPOCH,
            uid: 0,
            gid: 0,
        };

        output.begin_directory(&ctx, "sub/inner", &entry).unwrap();
        output.write_dir_entry(&ctx, "sub/inner", &dir_entry, &entry).unwrap();
        output.finish_directory(&ctx, "sub/inner", &entry).unwrap();
        assert!(dir.path().join("sub/inner").is_dir());
        assert!(output.parallelizable());
        output.close(&ctx).unwrap();
    }

    #[test]
    fn test_symlink_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let output = FilesystemOutput::new(dir.path());
        let ctx = Context::new();
        let link = MemLink {
            name: "l".into(),
            target: PathBuf::from("/dev/sda"),
        };

        assert!(!output.symlink_exists(&ctx, "l", &link));
        output.create_symlink(&ctx, "l", &link).unwrap();
        assert!(output.symlink_exists(&ctx, "l", &link));

        let other = MemLink {
            name: "l".into(),
            target: PathBuf::from("/dev/sdb"),
        };
        assert!(!output.symlink_exists(&ctx, "l", &other));
    }
}
