//! Restoring snapshot streams onto block devices.
//!
//! [`BlockOutput`] replaces the file restore of [`FilesystemOutput`] with a
//! chunked copy onto an existing block device and forwards every other
//! output operation unchanged.
//!
//! # Precondition
//!
//! With [`RestoreOptions::skip_zeros`] enabled, chunks that are entirely zero
//! are not written; the device offset is advanced instead. The restored
//! device is only correct if those regions already contain zeros, as on a
//! freshly provisioned volume. This module does not verify or establish that.
//! Targets that may hold stale data must be restored with `skip_zeros`
//! disabled.

use crate::classify::{ensure_block_device, Classify, SystemClassifier};
use crate::context::Context;
use crate::entry::{Entry, StreamingFile, Symlink};
use crate::error::{Error, Result};
use crate::options::RestoreOptions;
use crate::output::{DirEntry, FilesystemOutput, Output};
use crate::state::State;

use once_cell::sync::Lazy;
use std::fs::OpenOptions;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const ZERO_BLOCK_SIZE: usize = 64 * 1024;

static ZERO_BLOCK: Lazy<Vec<u8>> = Lazy::new(|| vec![0u8; ZERO_BLOCK_SIZE]);

/// Whether `buf` contains only zero bytes.
pub fn is_all_zero(buf: &[u8]) -> bool {
    buf.chunks(ZERO_BLOCK_SIZE)
        .all(|chunk| chunk == &ZERO_BLOCK[..chunk.len()])
}

/// Output that restores files onto block devices.
///
/// `write_file` requires the resolved target to be a block device. Block
/// device validation happens only there; directory operations are passed
/// through without checks.
pub struct BlockOutput<C = SystemClassifier> {
    inner: FilesystemOutput,
    classifier: C,
    options: RestoreOptions,
}

impl BlockOutput {
    pub fn new(inner: FilesystemOutput) -> Self {
        Self::with_classifier(inner, SystemClassifier)
    }
}

impl<C: Classify> BlockOutput<C> {
    pub fn with_classifier(inner: FilesystemOutput, classifier: C) -> Self {
        Self {
            inner,
            classifier,
            options: RestoreOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RestoreOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &RestoreOptions {
        &self.options
    }

    /// The wrapped filesystem output.
    pub fn inner(&self) -> &FilesystemOutput {
        &self.inner
    }

    /// Resolve `relative_path` to the real device path and check that it is
    /// a block device.
    pub fn resolve_target(&self, relative_path: &str) -> Result<PathBuf> {
        let declared = self.inner.local_path(relative_path);
        let resolved = declared
            .canonicalize()
            .map_err(|source| Error::SymlinkResolution {
                path: declared.clone(),
                source,
            })?;
        ensure_block_device(&self.classifier, &resolved)?;
        if resolved != declared {
            tracing::debug!(
                declared = %declared.display(),
                resolved = %resolved.display(),
                "resolved restore target"
            );
        }
        Ok(resolved)
    }

    /// Restore `remote` onto the device at `relative_path`.
    pub fn restore_file(
        &self,
        ctx: &Context,
        relative_path: &str,
        remote: &dyn StreamingFile,
    ) -> Result<State> {
        ctx.check()?;
        let device_path = self.resolve_target(relative_path)?;

        let mut reader = remote
            .open(ctx)
            .map_err(|e| Error::remote_open(remote.name(), e))?;
        let mut device = OpenOptions::new()
            .write(true)
            .open(&device_path)
            .map_err(|source| Error::Open {
                path: device_path.clone(),
                source,
            })?;

        if self.options.skip_zeros {
            tracing::warn!(
                device = %device_path.display(),
                "skipping all-zero chunks; the device is assumed to be zero-filled"
            );
        }

        let state = copy_sparse(&mut reader, &mut device, &device_path, &self.options, ctx)?;
        tracing::info!(
            device = %device_path.display(),
            bytes_written = state.bytes_written,
            bytes_skipped = state.bytes_skipped,
            "restored block device"
        );
        Ok(state)
    }
}

/// Copy `reader` onto `writer` chunk by chunk, seeking over all-zero chunks
/// when `options.skip_zeros` is set.
///
/// `path` only provides context for errors.
pub fn copy_sparse<R, W>(
    reader: &mut R,
    writer: &mut W,
    path: &Path,
    options: &RestoreOptions,
    ctx: &Context,
) -> Result<State>
where
    R: Read + ?Sized,
    W: Write + Seek + ?Sized,
{
    let mut state = State::new(path.to_path_buf());
    let mut buffer = vec![0u8; options.chunk_size.max(1)];

    loop {
        ctx.check()?;

        let len = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(len) => len,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(Error::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let chunk = &buffer[..len];

        if options.skip_zeros && is_all_zero(chunk) {
            writer
                .seek(SeekFrom::Current(len as i64))
                .map_err(|source| Error::Seek {
                    path: path.to_path_buf(),
                    source,
                })?;
            state.record_skipped(len);
            continue;
        }

        write_chunk(writer, chunk, path)?;
        state.record_written(len);
    }

    Ok(state)
}

/// Write all of `chunk`, continuing after short writes.
fn write_chunk<W: Write + ?Sized>(writer: &mut W, chunk: &[u8], path: &Path) -> Result<()> {
    let write_error = |source| Error::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut offset = 0;
    while offset < chunk.len() {
        match writer.write(&chunk[offset..]) {
            Ok(0) => {
                return Err(write_error(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "device accepted no bytes",
                )))
            }
            Ok(written) => offset += written,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(write_error(e)),
        }
    }
    Ok(())
}

impl<C: Classify> Output for BlockOutput<C> {
    fn write_file(
        &self,
        ctx: &Context,
        relative_path: &str,
        remote: &dyn StreamingFile,
    ) -> Result<()> {
        self.restore_file(ctx, relative_path, remote).map(|_| ())
    }

    fn begin_directory(&self, ctx: &Context, relative_path: &str, dir: &dyn Entry) -> Result<()> {
        self.inner.begin_directory(ctx, relative_path, dir)
    }

    fn write_dir_entry(
        &self,
        ctx: &Context,
        relative_path: &str,
        dir_entry: &DirEntry,
        dir: &dyn Entry,
    ) -> Result<()> {
        self.inner.write_dir_entry(ctx, relative_path, dir_entry, dir)
    }

    fn finish_directory(&self, ctx: &Context, relative_path: &str, dir: &dyn Entry) -> Result<()> {
        self.inner.finish_directory(ctx, relative_path, dir)
    }

    fn file_exists(&self, ctx: &Context, relative_path: &str, remote: &dyn StreamingFile) -> bool {
        self.inner.file_exists(ctx, relative_path, remote)
    }

    fn create_symlink(&self, ctx: &Context, relative_path: &str, link: &dyn Symlink) -> Result<()> {
        self.inner.create_symlink(ctx, relative_path, link)
    }

    fn symlink_exists(&self, ctx: &Context, relative_path: &str, link: &dyn Symlink) -> bool {
        self.inner.symlink_exists(ctx, relative_path, link)
    }

    /// Always false: concurrent writers on one device corrupt it.
    fn parallelizable(&self) -> bool {
        false
    }

    fn close(&self, ctx: &Context) -> Result<()> {
        self.inner.close(ctx)
    }
}
