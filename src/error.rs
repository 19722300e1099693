//! Error types for block device backup and restore.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Hint attached to [`Error::PermissionDenied`].
pub const PRIVILEGE_HINT: &str =
    "requires elevated/privileged execution context (run as root or in a privileged container)";

/// Errors raised while exposing or restoring a block device.
///
/// Every variant except [`Error::Cancelled`] carries the path it concerns.
/// None of them are retried internally; the caller decides whether the
/// whole job fails or continues with other entries.
#[derive(Error, Debug)]
pub enum Error {
    #[error("unable to get file information for {path}: {source}")]
    Stat { path: PathBuf, source: io::Error },

    #[error("{path} is not a block device")]
    NotABlockDevice { path: PathBuf },

    #[error("unable to evaluate symlinks for {path}: {source}")]
    SymlinkResolution { path: PathBuf, source: io::Error },

    #[error("unable to open device {path}: {source}")]
    DeviceOpen { path: PathBuf, source: io::Error },

    #[error("no permission to open device {path}, {hint}: {source}")]
    PermissionDenied {
        path: PathBuf,
        hint: &'static str,
        source: io::Error,
    },

    #[error("unable to determine size of device {path}: {source}")]
    SizeProbe { path: PathBuf, source: io::Error },

    #[error("failed to open {path}: {source}")]
    Open { path: PathBuf, source: io::Error },

    #[error("failed to read data for {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to write data to {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to seek {path}: {source}")]
    Seek { path: PathBuf, source: io::Error },

    #[error("failed to {op} {path}: {source}")]
    Filesystem {
        op: &'static str,
        path: PathBuf,
        source: io::Error,
    },

    #[error("operation cancelled")]
    Cancelled,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Classify a failed device open.
    ///
    /// `EACCES` and `EPERM` become [`Error::PermissionDenied`]; anything
    /// else is reported as [`Error::DeviceOpen`].
    pub fn device_open(path: &Path, source: io::Error) -> Self {
        let path = path.to_path_buf();
        if is_permission_error(&source) {
            Error::PermissionDenied {
                path,
                hint: PRIVILEGE_HINT,
                source,
            }
        } else {
            Error::DeviceOpen { path, source }
        }
    }

    /// Wrap a failure to open a snapshot stream, keeping cancellation as is.
    pub(crate) fn remote_open(name: &str, err: Error) -> Self {
        match err {
            Error::Cancelled => Error::Cancelled,
            other => Error::Open {
                path: PathBuf::from(name),
                source: other.into(),
            },
        }
    }

    pub(crate) fn fs(op: &'static str, path: &Path, source: io::Error) -> Self {
        Error::Filesystem {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    /// The path this error concerns, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Error::Stat { path, .. }
            | Error::NotABlockDevice { path }
            | Error::SymlinkResolution { path, .. }
            | Error::DeviceOpen { path, .. }
            | Error::PermissionDenied { path, .. }
            | Error::SizeProbe { path, .. }
            | Error::Open { path, .. }
            | Error::Read { path, .. }
            | Error::Write { path, .. }
            | Error::Seek { path, .. }
            | Error::Filesystem { path, .. } => Some(path),
            Error::Cancelled => None,
        }
    }
}

fn is_permission_error(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::PermissionDenied
        || matches!(err.raw_os_error(), Some(libc::EPERM) | Some(libc::EACCES))
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        let kind = match &err {
            Error::PermissionDenied { .. } => io::ErrorKind::PermissionDenied,
            Error::Stat { source, .. }
            | Error::SymlinkResolution { source, .. }
            | Error::DeviceOpen { source, .. }
            | Error::SizeProbe { source, .. }
            | Error::Open { source, .. }
            | Error::Read { source, .. }
            | Error::Write { source, .. }
            | Error::Seek { source, .. }
            | Error::Filesystem { source, .. } => source.kind(),
            Error::NotABlockDevice { .. } => io::ErrorKind::InvalidInput,
            Error::Cancelled => io::ErrorKind::Interrupted,
        };
        io::Error::new(kind, err)
    }
}
