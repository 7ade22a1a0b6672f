use flatfs::shell::Shell;
use flatfs::{
    AllocPolicy, FileBlockDevice, RenamePolicy, Volume, VolumeConfig, DEFAULT_IMAGE_SIZE,
    DEFAULT_MAX_ENTRIES,
};

use clap::{Parser, Subcommand};
use log::error;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "flatfs", about = "Single-volume flat file store on a disk image")]
struct Opts {
    /// Image file holding the volume, created if missing
    image: PathBuf,
    /// Minimum image size in bytes
    #[arg(long, default_value_t = DEFAULT_IMAGE_SIZE)]
    size: u64,
    /// Entry table capacity used when formatting
    #[arg(long, default_value_t = DEFAULT_MAX_ENTRIES)]
    max_entries: u32,
    #[arg(long, value_enum, default_value_t = AllocPolicy::FirstFit)]
    alloc: AllocPolicy,
    /// What `mv` does when the destination exists
    #[arg(long, value_enum, default_value_t = RenamePolicy::Reject)]
    rename: RenamePolicy,
    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Interactive shell (default)
    Shell,
    /// Print every entry and exit
    Ls,
    /// Mount the volume with FUSE
    #[cfg(feature = "mount")]
    Mount { mountpoint: PathBuf },
}

fn run(opts: Opts) -> Result<(), Box<dyn std::error::Error>> {
    let config = VolumeConfig::default()
        .with_max_entries(opts.max_entries)
        .with_alloc_policy(opts.alloc)
        .with_rename_policy(opts.rename);
    let blk_dev = Arc::new(FileBlockDevice::open(&opts.image, opts.size)?);
    let mut volume = Volume::open(blk_dev, config)?;

    match opts.command.unwrap_or(Cmd::Shell) {
        Cmd::Shell => {
            let stdin = io::stdin();
            Shell::new(&mut volume, stdin.lock(), io::stdout()).run()?;
        }
        Cmd::Ls => {
            for entry in volume.list_dir("/")? {
                let suffix = if entry.is_directory { "/" } else { "" };
                println!("{}{} {}", entry.name, suffix, entry.size);
            }
        }
        #[cfg(feature = "mount")]
        Cmd::Mount { mountpoint } => flatfs::fuse::mount(volume, mountpoint)?,
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    match run(Opts::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("flatfs: {}", e);
            ExitCode::FAILURE
        }
    }
}
