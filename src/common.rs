/// Must be at offset 0 of every formatted volume
pub const FSMAGIC: [u8; 4] = *b"FLFS";

/// on-disk layout version
pub const FSVERSION: u8 = 1;

/// block size of the underlying device
pub const BLOCK_SZ: usize = 512;

/// # of blocks the block cache keeps around
pub const BLOCK_CACHE_SIZE: usize = 16;

/// bytes reserved for an entry name, including the terminating NUL
pub const NAME_CAP: usize = 20;

/// longest name that fits in an entry
pub const MAX_NAME_LEN: usize = NAME_CAP - 1;

/// default capacity of the entry table
pub const DEFAULT_MAX_ENTRIES: u32 = 100;

/// block-start alignment of new extents
pub const DEFAULT_ALIGN: u32 = 4;

/// default image size used by the cli, 1 MiB
pub const DEFAULT_IMAGE_SIZE: u64 = 1 << 20;
