use super::*;

use std::any::Any;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

pub trait BlockDevice: Send + Sync + Any {
    fn read_block(&self, blockno: usize, buf: &mut [u8]) -> io::Result<()>;
    fn write_block(&self, blockno: usize, buf: &[u8]) -> io::Result<()>;
    /// # of blocks on the device
    fn num_blocks(&self) -> usize;
}

fn out_of_range(blockno: usize, num_blocks: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("block {} out of range ({} blocks)", blockno, num_blocks),
    )
}

/// A device living entirely in memory, zero filled on creation.
pub struct MemBlockDevice(Mutex<Vec<u8>>);

impl MemBlockDevice {
    pub fn new(num_blocks: usize) -> Self {
        Self(Mutex::new(vec![0u8; num_blocks * BLOCK_SZ]))
    }

    /// Copy of the raw image, handy for poking at the layout in tests.
    pub fn snapshot(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }

    /// Overwrite raw bytes, bypassing any cache.
    pub fn poke(&self, offset: usize, bytes: &[u8]) {
        let mut image = self.0.lock().unwrap();
        image[offset..offset + bytes.len()].copy_from_slice(bytes);
    }
}

impl BlockDevice for MemBlockDevice {
    fn read_block(&self, blockno: usize, buf: &mut [u8]) -> io::Result<()> {
        let image = self.0.lock().unwrap();
        let num_blocks = image.len() / BLOCK_SZ;
        if blockno >= num_blocks {
            return Err(out_of_range(blockno, num_blocks));
        }
        let start = blockno * BLOCK_SZ;
        buf[..BLOCK_SZ].copy_from_slice(&image[start..start + BLOCK_SZ]);
        Ok(())
    }

    fn write_block(&self, blockno: usize, buf: &[u8]) -> io::Result<()> {
        let mut image = self.0.lock().unwrap();
        let num_blocks = image.len() / BLOCK_SZ;
        if blockno >= num_blocks {
            return Err(out_of_range(blockno, num_blocks));
        }
        let start = blockno * BLOCK_SZ;
        image[start..start + BLOCK_SZ].copy_from_slice(&buf[..BLOCK_SZ]);
        Ok(())
    }

    fn num_blocks(&self) -> usize {
        self.0.lock().unwrap().len() / BLOCK_SZ
    }
}

/// A device backed by an image file on the host.
pub struct FileBlockDevice {
    file: Mutex<File>,
    num_blocks: usize,
}

impl FileBlockDevice {
    /// Open (or create) `path`, growing it to at least `size` bytes.
    /// The device covers the whole file, rounded down to full blocks.
    pub fn open<P: AsRef<Path>>(path: P, size: u64) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let len = file.metadata()?.len();
        if len < size {
            file.set_len(size)?;
        }
        let num_blocks = (len.max(size) / BLOCK_SZ as u64) as usize;
        Ok(Self {
            file: Mutex::new(file),
            num_blocks,
        })
    }
}

impl BlockDevice for FileBlockDevice {
    fn read_block(&self, blockno: usize, buf: &mut [u8]) -> io::Result<()> {
        if blockno >= self.num_blocks {
            return Err(out_of_range(blockno, self.num_blocks));
        }
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start((blockno * BLOCK_SZ) as u64))?;
        file.read_exact(&mut buf[..BLOCK_SZ])
    }

    fn write_block(&self, blockno: usize, buf: &[u8]) -> io::Result<()> {
        if blockno >= self.num_blocks {
            return Err(out_of_range(blockno, self.num_blocks));
        }
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start((blockno * BLOCK_SZ) as u64))?;
        file.write_all(&buf[..BLOCK_SZ])?;
        file.flush()
    }

    fn num_blocks(&self) -> usize {
        self.num_blocks
    }
}
