//! File type classification.
//!
//! Block devices are recognised from the `S_IFMT` bits of `lstat`, so a
//! symlink pointing at a device is reported as [`FileKind::Other`]. Callers
//! that want the target's kind resolve the symlink first.

use crate::error::{Error, Result};
use std::os::unix::fs::MetadataExt;
use std::path::Path;

/// Kind of filesystem object a path names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Regular,
    Directory,
    BlockSpecial,
    Other,
}

impl FileKind {
    /// Derive the kind from raw `st_mode` bits.
    pub fn from_mode(mode: u32) -> Self {
        match mode & libc::S_IFMT as u32 {
            m if m == libc::S_IFREG as u32 => FileKind::Regular,
            m if m == libc::S_IFDIR as u32 => FileKind::Directory,
            m if m == libc::S_IFBLK as u32 => FileKind::BlockSpecial,
            _ => FileKind::Other,
        }
    }

    pub fn is_block_special(self) -> bool {
        self == FileKind::BlockSpecial
    }
}

/// Answers "what kind of object is at this path".
///
/// [`SystemClassifier`] is the platform implementation. Other
/// implementations can stand in where the real device layout is not
/// available.
pub trait Classify: Send + Sync {
    fn classify(&self, path: &Path) -> Result<FileKind>;
}

/// Classifier backed by `lstat`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClassifier;

impl Classify for SystemClassifier {
    fn classify(&self, path: &Path) -> Result<FileKind> {
        classify(path)
    }
}

/// Classify `path` without following symlinks.
pub fn classify(path: &Path) -> Result<FileKind> {
    let metadata = std::fs::symlink_metadata(path).map_err(|source| Error::Stat {
        path: path.to_path_buf(),
        source,
    })?;
    let kind = FileKind::from_mode(metadata.mode());
    tracing::trace!(path = %path.display(), ?kind, "classified path");
    Ok(kind)
}

/// Fail with [`Error::NotABlockDevice`] unless `path` is block-special.
pub fn ensure_block_device(classifier: &dyn Classify, path: &Path) -> Result<()> {
    if classifier.classify(path)?.is_block_special() {
        Ok(())
    } else {
        Err(Error::NotABlockDevice {
            path: path.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_regular_and_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data");
        std::fs::write(&file, b"hello").unwrap();

        assert_eq!(classify(&file).unwrap(), FileKind::Regular);
        assert_eq!(classify(dir.path()).unwrap(), FileKind::Directory);
    }

    #[test]
    fn test_classify_char_device_is_other() {
        assert_eq!(classify(Path::new("/dev/null")).unwrap(), FileKind::Other);
    }

    #[test]
    fn test_classify_does_not_follow_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(dir.path(), &link).unwrap();

        assert_eq!(classify(&link).unwrap(), FileKind::Other);
    }

    #[test]
    fn test_classify_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = classify(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, Error::Stat { .. }));
    }

    #[test]
    fn test_from_mode() {
        assert_eq!(
            FileKind::from_mode(libc::S_IFBLK as u32 | 0o660),
            FileKind::BlockSpecial
        );
        assert_eq!(FileKind::from_mode(libc::S_IFCHR as u32), FileKind::Other);
        assert_eq!(FileKind::from_mode(libc::S_IFREG as u32 | 0o644), FileKind::Regular);
    }

    #[test]
    fn test_ensure_block_device_rejects_regular_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = ensure_block_device(&SystemClassifier, file.path()).unwrap_err();
        assert!(matches!(err, Error::NotABlockDevice { .. }));
    }
}
