pub mod allocator; // placement of content extents
pub mod block_cache;
pub mod block_device; // devices a volume can live on
mod common;
pub mod config;
pub mod disk; // byte-addressable view of a block device
pub mod error;
#[cfg(feature = "mount")]
pub mod fuse;
pub mod layout; // on-disk records
pub mod shell;
pub mod tree; // directory view of flat names
pub mod volume; // the engine

pub use block_device::{BlockDevice, FileBlockDevice, MemBlockDevice};
pub use common::*;
pub use config::{AllocPolicy, RenamePolicy, VolumeConfig};
pub use error::VolumeError;
pub use layout::FileEntry;
pub use volume::Volume;
