//! Placement of content extents inside the data region.
//!
//! Nothing is stored for the allocator itself: the live entries are the
//! allocation map, so removing an entry frees its extent implicitly.

use error::{Result, VolumeError};

use super::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub start: u64,
    pub len: u64,
}

impl Extent {
    pub fn new(start: u64, len: u64) -> Self {
        Self { start, len }
    }

    pub fn end(&self) -> u64 {
        self.start + self.len
    }

    /// Empty extents claim no bytes and never overlap anything.
    pub fn overlaps(&self, other: &Extent) -> bool {
        self.len > 0 && other.len > 0 && self.start < other.end() && other.start < self.end()
    }
}

fn align_up(offset: u64, align: u64) -> u64 {
    (offset + align - 1) / align * align
}

#[derive(Debug, Clone, Copy)]
pub struct Allocator {
    /// first byte of the data region
    base: u64,
    /// one past the last usable byte
    limit: u64,
    align: u64,
}

impl Allocator {
    pub fn new(base: u64, limit: u64, align: u32) -> Self {
        Self {
            base,
            limit,
            align: align.max(1) as u64,
        }
    }

    fn check(&self, start: u64, len: u64) -> Result<u64> {
        if start + len > self.limit {
            return Err(VolumeError::NoSpace(len));
        }
        Ok(start)
    }

    /// Aligned high-water mark over `used`, or the base of the region.
    pub fn bump<I>(&self, used: I, len: u64) -> Result<u64>
    where
        I: IntoIterator<Item = Extent>,
    {
        let top = used
            .into_iter()
            .map(|e| e.end())
            .fold(self.base, u64::max);
        self.check(align_up(top, self.align), len)
    }

    /// Lowest aligned offset where `len` bytes overlap none of `used`.
    pub fn first_fit<I>(&self, used: I, len: u64) -> Result<u64>
    where
        I: IntoIterator<Item = Extent>,
    {
        let mut used: Vec<Extent> = used.into_iter().filter(|e| e.len > 0).collect();
        used.sort_by_key(|e| e.start);

        let mut cursor = align_up(self.base, self.align);
        for e in used {
            if e.start >= cursor + len {
                break;
            }
            cursor = cursor.max(align_up(e.end(), self.align));
        }
        self.check(cursor, len)
    }

    /// Whether `candidate` is inside the region and clear of every `used` extent.
    pub fn fits<I>(&self, used: I, candidate: Extent) -> bool
    where
        I: IntoIterator<Item = Extent>,
    {
        candidate.start >= self.base
            && candidate.end() <= self.limit
            && !used.into_iter().any(|e| e.overlaps(&candidate))
    }

    /// Whether `len` bytes at `start` stay inside the region.
    pub fn in_bounds(&self, start: u64, len: u64) -> Result<()> {
        self.check(start, len).map(|_| ())
    }
}
