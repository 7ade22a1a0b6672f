use super::*;
use block_device::BlockDevice;

use std::io;
use std::sync::{Arc, Mutex};

pub struct BlockCache {
    cache: [u8; BLOCK_SZ],
    blockno: usize,
    blk_dev: Arc<dyn BlockDevice>,
}

impl BlockCache {
    /// block(disk) -> block(mem). Load a new BlockCache from disk.
    pub fn new(blockno: usize, block_device: Arc<dyn BlockDevice>) -> io::Result<Self> {
        let mut cache = [0u8; BLOCK_SZ];
        block_device.read_block(blockno, &mut cache)?;
        Ok(Self {
            cache,
            blockno,
            blk_dev: block_device,
        })
    }

    pub fn read(&self, offset: usize, buf: &mut [u8]) {
        assert!(offset + buf.len() <= BLOCK_SZ);
        buf.copy_from_slice(&self.cache[offset..offset + buf.len()]);
    }

    /// Modify the cached bytes and write the block straight through to disk.
    pub fn write(&mut self, offset: usize, buf: &[u8]) -> io::Result<()> {
        assert!(offset + buf.len() <= BLOCK_SZ);
        self.cache[offset..offset + buf.len()].copy_from_slice(buf);
        self.sync()
    }

    /// block(mem) -> block(disk).
    pub fn sync(&self) -> io::Result<()> {
        self.blk_dev.write_block(self.blockno, &self.cache)
    }
}

/// Keeps at most `capacity` recently used blocks. The most recently used
/// block sits at the back.
pub struct BlockCacheManager {
    queue: Vec<(usize /* blockno */, Arc<Mutex<BlockCache>>)>,
    capacity: usize,
}

impl BlockCacheManager {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn get_block_cache(
        &mut self,
        blockno: usize,
        block_device: Arc<dyn BlockDevice>,
    ) -> io::Result<Arc<Mutex<BlockCache>>> {
        if let Some(idx) = self.queue.iter().position(|pair| pair.0 == blockno) {
            let pair = self.queue.remove(idx);
            let block_cache = Arc::clone(&pair.1);
            self.queue.push(pair);
            return Ok(block_cache);
        }

        if self.queue.len() >= self.capacity {
            // evict the oldest block nobody else holds; writes are already on disk
            if let Some(idx) = self
                .queue
                .iter()
                .position(|pair| Arc::strong_count(&pair.1) == 1)
            {
                self.queue.remove(idx);
            }
        }

        let block_cache = Arc::new(Mutex::new(BlockCache::new(blockno, block_device)?));
        self.queue.push((blockno, Arc::clone(&block_cache)));
        Ok(block_cache)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.queue.len()
    }
}
