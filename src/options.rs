//! Configuration options for restoring onto block devices.

/// Default size of the chunks read from the snapshot stream.
pub const DEFAULT_CHUNK_SIZE: usize = 128 * 1024;

/// Options for controlling the restore behavior.
#[derive(Debug, Clone)]
pub struct RestoreOptions {
    /// Size of each chunk read from the snapshot stream and inspected for
    /// zero runs.
    pub chunk_size: usize,

    /// Skip writing chunks that contain only zero bytes.
    ///
    /// When enabled (default), an all-zero chunk advances the device offset
    /// without writing. This is only correct if the destination device
    /// already reads back zeros in those regions, e.g. a freshly
    /// provisioned volume. Nothing checks that precondition.
    ///
    /// When disabled, every chunk is written.
    pub skip_zeros: bool,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            skip_zeros: true,
        }
    }
}

impl RestoreOptions {
    /// Create a new RestoreOptions with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the chunk size. Zero is raised to one byte.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Enable or disable skipping all-zero chunks.
    pub fn with_skip_zeros(mut self, skip: bool) -> Self {
        self.skip_zeros = skip;
        self
    }
}
