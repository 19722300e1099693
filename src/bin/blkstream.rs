//! CLI tool for backing up and restoring raw block devices.
//!
//! This tool uses the `blkstream` library to read a block device as a stream
//! entry and to restore an image onto a block device, skipping zero chunks.

use blkstream::{
    classify, source_directory, BlockDeviceEntry, BlockOutput, Context, DeviceInfo, Entry,
    FilesystemOutput, FsEntry, OwnerInfo, ReadStream, RestoreOptions, StreamingFile,
    DEFAULT_CHUNK_SIZE,
};
use clap::{Parser, Subcommand};
use std::fs::{File, Metadata};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing_subscriber::EnvFilter;

/// Back up and restore raw block devices.
#[derive(Parser, Debug)]
#[command(name = "blkstream")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable verbose output (repeat for more detail)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the kind and size of a path
    Probe {
        /// Path to the device
        device: PathBuf,
    },

    /// Stream a block device into a file
    Backup {
        /// Path to the block device
        device: PathBuf,

        /// Output file path (default: stdout)
        #[arg(short = 'O', long)]
        output: Option<PathBuf>,
    },

    /// Restore an image onto a block device
    Restore {
        /// Image file holding the device content
        image: PathBuf,

        /// Target block device, or a symlink to one
        target: PathBuf,

        /// Size of the chunks inspected for zero runs
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,

        /// Write all-zero chunks instead of skipping them (for targets that
        /// are not known to be zero-filled)
        #[arg(long)]
        no_skip_zeros: bool,
    },
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(args: &Args) -> io::Result<()> {
    // Raw devices are only accessible with elevated privileges.
    sudo::escalate_if_needed().map_err(|e| {
        io::Error::new(
            io::ErrorKind::PermissionDenied,
            format!("Failed to escalate privileges: {}", e),
        )
    })?;

    let ctx = Context::new();
    match &args.command {
        Command::Probe { device } => probe(device),
        Command::Backup { device, output } => backup(&ctx, device, output.as_deref()),
        Command::Restore {
            image,
            target,
            chunk_size,
            no_skip_zeros,
        } => {
            let options = RestoreOptions::new()
                .with_chunk_size(*chunk_size)
                .with_skip_zeros(!no_skip_zeros);
            restore(&ctx, image, target, options)
        }
    }
}

fn probe(path: &Path) -> io::Result<()> {
    let kind = classify(path)?;
    println!("Path: {}", path.display());
    println!("Kind: {:?}", kind);

    if kind.is_block_special() {
        let entry = BlockDeviceEntry::from_path(path)?;
        let DeviceInfo { rdev, .. } = entry.device();
        println!("Size: {} (0x{:x})", entry.size(), entry.size());
        println!("Device number: 0x{:x}", rdev);
    }
    Ok(())
}

fn backup(ctx: &Context, device: &Path, output: Option<&Path>) -> io::Result<()> {
    let entry = BlockDeviceEntry::from_path(device)?;
    let size = entry.size();
    let root = source_directory(Arc::clone(&entry));
    tracing::info!(directory = root.name(), size, "backing up device");

    let mut reader = entry.open(ctx)?;
    let copied = match output {
        Some(path) => io::copy(&mut reader, &mut File::create(path)?)?,
        None => io::copy(&mut reader, &mut io::stdout().lock())?,
    };

    if copied != size {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("read {} of {} bytes from {}", copied, size, device.display()),
        ));
    }
    eprintln!("Read {} bytes from {}", copied, device.display());
    Ok(())
}

fn restore(ctx: &Context, image: &Path, target: &Path, options: RestoreOptions) -> io::Result<()> {
    let (dir, name) = match (target.parent(), target.file_name()) {
        (Some(dir), Some(name)) => (dir, name.to_string_lossy().into_owned()),
        _ => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid restore target {}", target.display()),
            ))
        }
    };

    let remote = ImageFile::new(image)?;
    let output = BlockOutput::new(FilesystemOutput::new(dir)).with_options(options);
    let state = output.restore_file(ctx, &name, &remote)?;

    eprintln!("Device: {}", state.device_path.display());
    eprintln!(
        "Written {} bytes in {} chunk(s), skipped {} zero bytes in {} chunk(s)",
        state.bytes_written, state.chunks_written, state.bytes_skipped, state.chunks_skipped
    );
    io::stdout().flush()
}

/// A local image file served as a snapshot stream.
struct ImageFile {
    entry: FsEntry,
}

impl ImageFile {
    fn new(path: &Path) -> io::Result<Self> {
        Ok(Self {
            entry: FsEntry::from_path(path)?,
        })
    }
}

impl Entry for ImageFile {
    fn name(&self) -> &str {
        self.entry.name()
    }

    fn mode(&self) -> u32 {
        self.entry.mode()
    }

    fn size(&self) -> u64 {
        self.entry.size()
    }

    fn mod_time(&self) -> SystemTime {
        self.entry.mod_time()
    }

    fn is_dir(&self) -> bool {
        self.entry.is_dir()
    }

    fn owner(&self) -> OwnerInfo {
        self.entry.owner()
    }

    fn device(&self) -> DeviceInfo {
        self.entry.device()
    }

    fn sys(&self) -> Option<&Metadata> {
        self.entry.sys()
    }
}

impl StreamingFile for ImageFile {
    fn open(&self, ctx: &Context) -> blkstream::Result<Box<dyn ReadStream>> {
        ctx.check()?;
        let path = self.entry.path();
        let file = File::open(path).map_err(|source| blkstream::Error::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Box::new(ImageReader(file)))
    }
}

struct ImageReader(File);

impl Read for ImageReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl Seek for ImageReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.0.seek(pos)
    }
}

impl ReadStream for ImageReader {
    fn entry(&self) -> Option<Arc<dyn StreamingFile>> {
        None
    }
}
