//! Byte-addressable view of a block device.
//!
//! Every access is split into per-block pieces and served through the block
//! cache, so callers never see block boundaries.

use super::*;
use block_cache::BlockCacheManager;
use block_device::BlockDevice;

use std::io;
use std::sync::{Arc, Mutex};

pub struct Disk {
    blk_dev: Arc<dyn BlockDevice>,
    blk_cch_mgr: Mutex<BlockCacheManager>,
}

impl Disk {
    pub fn new(blk_dev: Arc<dyn BlockDevice>) -> Self {
        Self {
            blk_dev,
            blk_cch_mgr: Mutex::new(BlockCacheManager::new(BLOCK_CACHE_SIZE)),
        }
    }

    /// device length in bytes
    pub fn size(&self) -> u64 {
        (self.blk_dev.num_blocks() * BLOCK_SZ) as u64
    }

    fn check_range(&self, offset: u64, len: usize) -> io::Result<()> {
        match offset.checked_add(len as u64) {
            Some(end) if end <= self.size() => Ok(()),
            _ => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "range {}+{} beyond end of device ({} bytes)",
                    offset,
                    len,
                    self.size()
                ),
            )),
        }
    }

    /// Walk `[offset, offset + len)` block by block, handing each piece to `f`
    /// as (blockno, offset in block, offset in caller's buffer, piece length).
    fn for_each_piece<F>(offset: u64, len: usize, mut f: F) -> io::Result<()>
    where
        F: FnMut(usize, usize, usize, usize) -> io::Result<()>,
    {
        let mut done = 0;
        while done < len {
            let pos = offset as usize + done;
            let blockno = pos / BLOCK_SZ;
            let in_block = pos % BLOCK_SZ;
            let piece = (BLOCK_SZ - in_block).min(len - done);
            f(blockno, in_block, done, piece)?;
            done += piece;
        }
        Ok(())
    }

    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.check_range(offset, buf.len())?;
        let mut mgr = self.blk_cch_mgr.lock().unwrap();
        Self::for_each_piece(offset, buf.len(), |blockno, in_block, at, piece| {
            let block_cache = mgr.get_block_cache(blockno, self.blk_dev.clone())?;
            let guard = block_cache.lock().unwrap();
            guard.read(in_block, &mut buf[at..at + piece]);
            Ok(())
        })
    }

    pub fn write_at(&self, offset: u64, buf: &[u8]) -> io::Result<()> {
        self.check_range(offset, buf.len())?;
        let mut mgr = self.blk_cch_mgr.lock().unwrap();
        Self::for_each_piece(offset, buf.len(), |blockno, in_block, at, piece| {
            let block_cache = mgr.get_block_cache(blockno, self.blk_dev.clone())?;
            let mut guard = block_cache.lock().unwrap();
            guard.write(in_block, &buf[at..at + piece])
        })
    }
}
