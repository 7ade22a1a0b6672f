//! The volume engine: owns the in-memory entry table and metadata, and is the
//! only reader and writer of the device.
//!
//! Every mutating operation validates first, then changes the table and
//! rewrites metadata plus the whole entry table.

use super::*;
use allocator::{Allocator, Extent};
use block_device::BlockDevice;
use config::{AllocPolicy, RenamePolicy, VolumeConfig};
use disk::Disk;
use error::{Result, VolumeError};
use layout::{
    fit_name, DiskEntry, FileEntry, Layout, VolumeHeader, VolumeMeta, ENTRY_SIZE, HEADER_SIZE,
    META_SIZE,
};

use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;

pub struct Volume {
    disk: Disk,
    config: VolumeConfig,
    layout: Layout,
    meta: VolumeMeta,
    entries: Vec<FileEntry>,
    /// name -> position in `entries`
    index: HashMap<String, usize>,
}

impl Volume {
    /// Mount the volume on `blk_dev`, formatting it first if it doesn't carry
    /// a valid header.
    pub fn open(blk_dev: Arc<dyn BlockDevice>, config: VolumeConfig) -> Result<Self> {
        let disk = Disk::new(blk_dev);
        let mut buf = [0u8; HEADER_SIZE as usize];
        disk.read_at(0, &mut buf)?;

        let mut volume = Volume {
            disk,
            layout: Layout::new(config.max_entries),
            config,
            meta: VolumeMeta::default(),
            entries: Vec::new(),
            index: HashMap::new(),
        };

        match VolumeHeader::decode(&buf) {
            Some(header) if header.is_valid() => {
                if header.max_entries != volume.config.max_entries {
                    warn!(
                        "volume was formatted for {} entries, ignoring configured {}",
                        header.max_entries, volume.config.max_entries
                    );
                }
                volume.layout = Layout::new(header.max_entries);
                volume.load()?;
                info!(
                    "loaded volume: {} of {} entries in use",
                    volume.entries.len(),
                    volume.layout.max_entries()
                );
            }
            _ => {
                info!("no volume found on device, formatting");
                volume.format()?;
            }
        }
        Ok(volume)
    }

    /// Write a fresh header and an empty table. Old content becomes unreachable.
    pub fn format(&mut self) -> Result<()> {
        let layout = Layout::new(self.config.max_entries);
        if layout.data_start() > self.disk.size() {
            return Err(VolumeError::NoSpace(layout.data_start()));
        }
        let header = VolumeHeader::new(layout.max_entries());
        self.disk.write_at(layout.header_offset(), &header.encode()?)?;

        self.layout = layout;
        self.meta = VolumeMeta::default();
        self.entries.clear();
        self.index.clear();
        self.persist_table()?;
        info!(
            "formatted volume: {} entries max, data region at {}",
            layout.max_entries(),
            layout.data_start()
        );
        Ok(())
    }

    fn load(&mut self) -> Result<()> {
        let mut buf = [0u8; META_SIZE as usize];
        self.disk.read_at(self.layout.meta_offset(), &mut buf)?;
        let meta = VolumeMeta::decode(&buf)?;
        if meta.entry_count > self.layout.max_entries() {
            return Err(VolumeError::CorruptVolume(format!(
                "{} entries recorded, table holds {}",
                meta.entry_count,
                self.layout.max_entries()
            )));
        }
        if self.layout.data_start() > self.disk.size() {
            return Err(VolumeError::CorruptVolume(format!(
                "entry table for {} entries does not fit on the device",
                self.layout.max_entries()
            )));
        }

        let mut entries = Vec::with_capacity(meta.entry_count as usize);
        if meta.entry_count > 0 {
            let mut table = vec![0u8; meta.entry_count as usize * ENTRY_SIZE as usize];
            self.disk.read_at(self.layout.table_offset(), &mut table)?;
            for chunk in table.chunks(ENTRY_SIZE as usize) {
                let entry = FileEntry::try_from(DiskEntry::decode(chunk)?)?;
                self.check_entry(&entry)?;
                entries.push(entry);
            }
        }

        let mut index = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            if index.insert(entry.name.clone(), i).is_some() {
                return Err(VolumeError::CorruptVolume(format!(
                    "duplicate entry {:?}",
                    entry.name
                )));
            }
        }

        self.meta = meta;
        self.entries = entries;
        self.index = index;
        Ok(())
    }

    fn check_entry(&self, entry: &FileEntry) -> Result<()> {
        if entry.is_directory && entry.size != 0 {
            return Err(VolumeError::CorruptVolume(format!(
                "directory {:?} has {} bytes of content",
                entry.name, entry.size
            )));
        }
        if (entry.block_start as u64) < self.layout.data_start() || entry.end() > self.disk.size()
        {
            return Err(VolumeError::CorruptVolume(format!(
                "entry {:?} points outside the data region ({}+{})",
                entry.name, entry.block_start, entry.size
            )));
        }
        Ok(())
    }

    /// metadata + entry table (mem) -> disk.
    pub fn persist_table(&self) -> Result<()> {
        self.disk
            .write_at(self.layout.meta_offset(), &self.meta.encode()?)?;
        if !self.entries.is_empty() {
            let mut table = Vec::with_capacity(self.entries.len() * ENTRY_SIZE as usize);
            for entry in &self.entries {
                table.extend_from_slice(&DiskEntry::from(entry).encode()?);
            }
            self.disk.write_at(self.layout.table_offset(), &table)?;
        }
        Ok(())
    }

    fn sync_meta(&mut self) {
        self.meta.entry_count = self.entries.len() as u32;
    }

    fn reindex(&mut self) {
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.name.clone(), i))
            .collect();
    }

    fn position(&self, name: &str) -> Option<usize> {
        let name = fit_name(name).ok()?;
        self.index.get(&name).copied()
    }

    fn position_or_err(&self, name: &str) -> Result<usize> {
        self.position(name)
            .ok_or_else(|| VolumeError::NotFound(name.to_string()))
    }

    /// position of a regular file
    fn file_position(&self, name: &str) -> Result<usize> {
        let idx = self.position_or_err(name)?;
        if self.entries[idx].is_directory {
            return Err(VolumeError::IsDirectory(name.to_string()));
        }
        Ok(idx)
    }

    fn allocator(&self) -> Allocator {
        let limit = self.disk.size().min(u32::MAX as u64);
        Allocator::new(
            self.layout.data_start(),
            limit,
            self.config.effective_alignment(),
        )
    }

    /// extents of every entry except `skip`
    fn extents_except(&self, skip: Option<usize>) -> Vec<Extent> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != skip)
            .map(|(_, e)| Extent::new(e.block_start as u64, e.size as u64))
            .collect()
    }

    pub fn find_entry(&self, name: &str) -> Option<&FileEntry> {
        self.position(name).map(|idx| &self.entries[idx])
    }

    pub fn stat(&self, name: &str) -> Result<&FileEntry> {
        self.find_entry(name)
            .ok_or_else(|| VolumeError::NotFound(name.to_string()))
    }

    pub fn create_entry(&mut self, name: &str, is_directory: bool) -> Result<()> {
        let name = fit_name(name)?;
        if self.index.contains_key(&name) {
            return Err(VolumeError::AlreadyExists(name));
        }
        if self.entries.len() >= self.layout.max_entries() as usize {
            return Err(VolumeError::TableFull(self.layout.max_entries()));
        }

        let alloc = self.allocator();
        let used = self.extents_except(None);
        let block_start = match self.config.alloc_policy {
            AllocPolicy::Bump => alloc.bump(used, 0)?,
            AllocPolicy::FirstFit => match alloc.bump(used.clone(), 0) {
                Ok(start) => start,
                Err(_) => alloc.first_fit(used, 0)?,
            },
        };

        debug!(
            "create {:?} (dir: {}) at {}",
            name, is_directory, block_start
        );
        self.index.insert(name.clone(), self.entries.len());
        self.entries.push(FileEntry {
            name,
            size: 0,
            block_start: block_start as u32,
            is_directory,
        });
        self.sync_meta();
        self.persist_table()
    }

    pub fn get_content(&self, name: &str) -> Result<Vec<u8>> {
        let entry = &self.entries[self.file_position(name)?];
        let mut buf = vec![0u8; entry.size as usize];
        if !buf.is_empty() {
            self.disk.read_at(entry.block_start as u64, &mut buf)?;
        }
        debug!("read {} bytes from {:?}", buf.len(), entry.name);
        Ok(buf)
    }

    /// Replace the whole content of `name`.
    pub fn set_content(&mut self, name: &str, data: &[u8]) -> Result<()> {
        let idx = self.file_position(name)?;
        let len = data.len() as u64;
        self.check_len(len)?;

        let alloc = self.allocator();
        let current = self.entries[idx].block_start as u64;
        let block_start = match self.config.alloc_policy {
            AllocPolicy::Bump => {
                alloc.in_bounds(current, len)?;
                current
            }
            AllocPolicy::FirstFit => {
                let others = self.extents_except(Some(idx));
                if alloc.fits(others.iter().copied(), Extent::new(current, len)) {
                    current
                } else {
                    alloc.first_fit(others, len)?
                }
            }
        };
        if block_start != current {
            debug!(
                "relocate {:?} from {} to {}",
                self.entries[idx].name, current, block_start
            );
        }

        self.disk.write_at(block_start, data)?;
        let entry = &mut self.entries[idx];
        entry.block_start = block_start as u32;
        entry.size = len as u32;
        debug!("wrote {} bytes to {:?}", len, entry.name);
        self.persist_table()
    }

    /// Cut or zero-extend the content of `name` to `len` bytes.
    pub fn truncate(&mut self, name: &str, len: u64) -> Result<()> {
        self.file_position(name)?;
        self.check_len(len)?;
        let mut data = self.get_content(name)?;
        data.resize(len as usize, 0);
        self.set_content(name, &data)
    }

    /// Overwrite part of `name` starting at `offset`. A gap between the old
    /// end and `offset` reads back as zeroes.
    pub fn write_at(&mut self, name: &str, offset: u64, data: &[u8]) -> Result<()> {
        self.file_position(name)?;
        let end = offset
            .checked_add(data.len() as u64)
            .ok_or(VolumeError::FileTooLarge(u64::MAX))?;
        self.check_len(end)?;

        let mut content = self.get_content(name)?;
        let (start, end) = (offset as usize, end as usize);
        if content.len() < end {
            content.resize(end, 0);
        }
        content[start..end].copy_from_slice(data);
        self.set_content(name, &content)
    }

    /// Runs before any buffer of `len` bytes exists.
    fn check_len(&self, len: u64) -> Result<()> {
        if len > u32::MAX as u64 {
            return Err(VolumeError::FileTooLarge(len));
        }
        if len > self.capacity_bytes() {
            return Err(VolumeError::NoSpace(len));
        }
        Ok(())
    }

    /// Only the root can be listed; the table is flat.
    pub fn list_dir(&self, path: &str) -> Result<&[FileEntry]> {
        if !path.is_empty() && path != "/" {
            return Err(VolumeError::Unsupported(path.to_string()));
        }
        Ok(&self.entries)
    }

    /// Drop the entry. Its content bytes are left where they are.
    pub fn remove_entry(&mut self, name: &str) -> Result<()> {
        let idx = self.position_or_err(name)?;
        let entry = self.entries.remove(idx);
        debug!("remove {:?}", entry.name);
        self.reindex();
        self.sync_meta();
        self.persist_table()
    }

    /// Remove a directory entry that has no `"<name>/..."` entries under it.
    pub fn remove_dir(&mut self, name: &str) -> Result<()> {
        let idx = self.position_or_err(name)?;
        let dir = &self.entries[idx];
        if !dir.is_directory {
            return Err(VolumeError::NotADirectory(name.to_string()));
        }
        if tree::has_children(&self.entries, &dir.name) {
            return Err(VolumeError::DirectoryNotEmpty(name.to_string()));
        }
        self.remove_entry(name)
    }

    /// Give `old_name` a new name in place; block-start, size and content
    /// stay. A taken `new_name` is handled per the configured
    /// [`RenamePolicy`].
    pub fn rename(&mut self, old_name: &str, new_name: &str) -> Result<()> {
        let mut idx = self.position_or_err(old_name)?;
        let new_name = fit_name(new_name)?;
        if self.entries[idx].name == new_name {
            return Ok(());
        }

        if let Some(&victim) = self.index.get(&new_name) {
            match self.config.rename_policy {
                RenamePolicy::Reject => return Err(VolumeError::NameCollision(new_name)),
                RenamePolicy::Overwrite => {
                    debug!("rename overwrites {:?}", new_name);
                    self.entries.remove(victim);
                    if victim < idx {
                        idx -= 1;
                    }
                }
            }
        }

        debug!("rename {:?} -> {:?}", self.entries[idx].name, new_name);
        self.entries[idx].name = new_name;
        self.reindex();
        self.sync_meta();
        self.persist_table()
    }

    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_entries(&self) -> u32 {
        self.layout.max_entries()
    }

    pub fn data_start(&self) -> u64 {
        self.layout.data_start()
    }

    /// Bytes from the data region start up to the furthest content byte.
    pub fn used_bytes(&self) -> u64 {
        self.entries
            .iter()
            .map(|e| e.end())
            .max()
            .map_or(0, |end| end - self.layout.data_start())
    }

    /// Size of the data region.
    pub fn capacity_bytes(&self) -> u64 {
        self.disk.size().saturating_sub(self.layout.data_start())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use block_device::MemBlockDevice;

    fn mem_dev() -> Arc<MemBlockDevice> {
        Arc::new(MemBlockDevice::new(64))
    }

    fn open(dev: &Arc<MemBlockDevice>, config: VolumeConfig) -> Volume {
        Volume::open(dev.clone(), config).unwrap()
    }

    fn names(volume: &Volume) -> Vec<&str> {
        volume.entries().iter().map(|e| e.name.as_str()).collect()
    }

    /// device offset of table slot `i`
    fn slot(i: usize) -> usize {
        (HEADER_SIZE + META_SIZE + i as u64 * ENTRY_SIZE) as usize
    }

    fn reopen_is_corrupt(dev: &Arc<MemBlockDevice>) -> bool {
        matches!(
            Volume::open(dev.clone(), VolumeConfig::default()),
            Err(VolumeError::CorruptVolume(_))
        )
    }

    #[test]
    fn blank_device_gets_formatted() {
        let dev = mem_dev();
        let volume = open(&dev, VolumeConfig::default());
        assert!(volume.list_dir("/").unwrap().is_empty());
        assert_eq!(&dev.snapshot()[..4], b"FLFS");
    }

    #[test]
    fn hello_scenario() {
        let dev = mem_dev();
        let mut volume = open(&dev, VolumeConfig::default());
        volume.format().unwrap();
        volume.create_entry("f.txt", false).unwrap();
        volume.set_content("f.txt", b"hello").unwrap();
        assert_eq!(volume.get_content("f.txt").unwrap(), b"hello");

        let listing = volume.list_dir("/").unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].name, "f.txt");
        assert_eq!(listing[0].size, 5);
        assert!(!listing[0].is_directory);
    }

    #[test]
    fn first_entry_starts_at_aligned_data_region() {
        let dev = mem_dev();
        let mut volume = open(&dev, VolumeConfig::default());
        volume.create_entry("a", false).unwrap();
        let start = volume.find_entry("a").unwrap().block_start as u64;
        let data_start = 13 + 100 * ENTRY_SIZE;
        assert_eq!(volume.data_start(), data_start);
        assert_eq!(start, (data_start + 3) / 4 * 4);
    }

    #[test]
    fn duplicate_create_leaves_table_alone() {
        let dev = mem_dev();
        let mut volume = open(&dev, VolumeConfig::default());
        volume.create_entry("a", false).unwrap();
        let before = volume.entries().to_vec();
        let err = volume.create_entry("a", true).unwrap_err();
        assert!(matches!(err, VolumeError::AlreadyExists(_)));
        assert_eq!(volume.entries(), &before[..]);
    }

    #[test]
    fn long_names_are_truncated_consistently() {
        let dev = mem_dev();
        let mut volume = open(&dev, VolumeConfig::default());
        let long = "a-rather-long-file-name.txt";
        volume.create_entry(long, false).unwrap();
        assert_eq!(volume.entries()[0].name, &long[..19]);
        volume.set_content(long, b"x").unwrap();
        assert_eq!(volume.get_content(long).unwrap(), b"x");
        assert!(matches!(
            volume.create_entry(&long[..19], false),
            Err(VolumeError::AlreadyExists(_))
        ));
    }

    #[test]
    fn content_ops_refuse_directories() {
        let dev = mem_dev();
        let mut volume = open(&dev, VolumeConfig::default());
        volume.create_entry("d", true).unwrap();
        assert!(matches!(
            volume.get_content("d"),
            Err(VolumeError::IsDirectory(_))
        ));
        assert!(matches!(
            volume.set_content("d", b"x"),
            Err(VolumeError::IsDirectory(_))
        ));
        assert!(matches!(
            volume.get_content("nope"),
            Err(VolumeError::NotFound(_))
        ));
    }

    #[test]
    fn list_dir_only_knows_root() {
        let dev = mem_dev();
        let volume = open(&dev, VolumeConfig::default());
        assert!(volume.list_dir("").is_ok());
        assert!(matches!(
            volume.list_dir("/d"),
            Err(VolumeError::Unsupported(_))
        ));
    }

    #[test]
    fn remove_keeps_order_of_the_rest() {
        let dev = mem_dev();
        let mut volume = open(&dev, VolumeConfig::default());
        for name in ["a", "b", "c"] {
            volume.create_entry(name, false).unwrap();
        }
        volume.remove_entry("b").unwrap();
        assert_eq!(names(&volume), vec!["a", "c"]);
        assert!(matches!(
            volume.get_content("b"),
            Err(VolumeError::NotFound(_))
        ));
        assert!(volume.find_entry("c").is_some());
        assert!(matches!(
            volume.remove_entry("b"),
            Err(VolumeError::NotFound(_))
        ));

        let reopened = open(&dev, VolumeConfig::default());
        assert_eq!(names(&reopened), vec!["a", "c"]);
    }

    #[test]
    fn table_full_is_recoverable() {
        let dev = mem_dev();
        let mut volume = open(&dev, VolumeConfig::default().with_max_entries(2));
        volume.create_entry("a", false).unwrap();
        volume.create_entry("b", false).unwrap();
        assert!(matches!(
            volume.create_entry("c", false),
            Err(VolumeError::TableFull(2))
        ));
        volume.remove_entry("a").unwrap();
        volume.create_entry("c", false).unwrap();
        assert_eq!(names(&volume), vec!["b", "c"]);
    }

    #[test]
    fn capacity_comes_from_the_header() {
        let dev = mem_dev();
        let mut volume = open(&dev, VolumeConfig::default().with_max_entries(8));
        volume.create_entry("a", false).unwrap();
        let data_start = volume.data_start();

        let reopened = open(&dev, VolumeConfig::default().with_max_entries(50));
        assert_eq!(reopened.max_entries(), 8);
        assert_eq!(reopened.data_start(), data_start);
        assert_eq!(names(&reopened), vec!["a"]);
    }

    #[test]
    fn bump_policy_overlaps_on_growth() {
        let dev = mem_dev();
        let config = VolumeConfig::default().with_alloc_policy(AllocPolicy::Bump);
        let mut volume = open(&dev, config);
        volume.create_entry("a", false).unwrap();
        volume.set_content("a", b"1234").unwrap();
        volume.create_entry("b", false).unwrap();
        volume.set_content("b", b"BBBB").unwrap();
        // a grows into b's bytes
        volume.set_content("a", b"12345678").unwrap();
        assert_eq!(volume.get_content("a").unwrap(), b"12345678");
        assert_eq!(volume.get_content("b").unwrap(), b"5678");
    }

    #[test]
    fn bump_policy_never_reuses_space() {
        let dev = mem_dev();
        let config = VolumeConfig::default().with_alloc_policy(AllocPolicy::Bump);
        let mut volume = open(&dev, config);
        volume.create_entry("a", false).unwrap();
        volume.set_content("a", b"12345678").unwrap();
        let a_start = volume.find_entry("a").unwrap().block_start;
        volume.create_entry("b", false).unwrap();
        volume.remove_entry("a").unwrap();
        volume.create_entry("c", false).unwrap();
        let c_start = volume.find_entry("c").unwrap().block_start;
        assert_eq!(c_start, a_start + 8);
    }

    #[test]
    fn first_fit_relocates_on_growth() {
        let dev = mem_dev();
        let mut volume = open(&dev, VolumeConfig::default());
        volume.create_entry("a", false).unwrap();
        volume.set_content("a", b"1234").unwrap();
        volume.create_entry("b", false).unwrap();
        volume.set_content("b", b"BBBB").unwrap();

        volume.set_content("a", b"12345678").unwrap();
        assert_eq!(volume.get_content("a").unwrap(), b"12345678");
        assert_eq!(volume.get_content("b").unwrap(), b"BBBB");
        let a = volume.find_entry("a").unwrap().clone();
        let b = volume.find_entry("b").unwrap().clone();
        assert!(a.block_start as u64 >= b.end());
    }

    #[test]
    fn first_fit_reuses_freed_space() {
        let dev = mem_dev();
        let mut volume = open(&dev, VolumeConfig::default());
        volume.create_entry("a", false).unwrap();
        volume.set_content("a", &[1u8; 64]).unwrap();
        let a_start = volume.find_entry("a").unwrap().block_start;
        volume.create_entry("b", false).unwrap();
        volume.set_content("b", &[2u8; 64]).unwrap();
        volume.remove_entry("a").unwrap();

        volume.create_entry("c", false).unwrap();
        volume.create_entry("d", false).unwrap();
        volume.set_content("c", &[3u8; 32]).unwrap();
        // d shares c's block-start, so it has to move into a's old extent
        volume.set_content("d", &[4u8; 16]).unwrap();
        assert_eq!(volume.find_entry("d").unwrap().block_start, a_start);
        assert_eq!(volume.get_content("c").unwrap(), vec![3u8; 32]);
        assert_eq!(volume.get_content("d").unwrap(), vec![4u8; 16]);
        assert_eq!(volume.get_content("b").unwrap(), vec![2u8; 64]);
    }

    #[test]
    fn content_past_the_device_is_no_space() {
        let dev = Arc::new(MemBlockDevice::new(8));
        let mut volume = open(&dev, VolumeConfig::default().with_max_entries(4));
        volume.create_entry("big", false).unwrap();
        let too_big = vec![0u8; 8 * BLOCK_SZ];
        assert!(matches!(
            volume.set_content("big", &too_big),
            Err(VolumeError::NoSpace(_))
        ));
        assert_eq!(volume.find_entry("big").unwrap().size, 0);
    }

    #[test]
    fn truncate_shrinks_and_extends() {
        let dev = mem_dev();
        let mut volume = open(&dev, VolumeConfig::default());
        volume.create_entry("f", false).unwrap();
        volume.set_content("f", b"hello world").unwrap();
        volume.truncate("f", 5).unwrap();
        assert_eq!(volume.get_content("f").unwrap(), b"hello");
        volume.truncate("f", 7).unwrap();
        assert_eq!(volume.get_content("f").unwrap(), b"hello\0\0");
    }

    #[test]
    fn remove_dir_checks_children() {
        let dev = mem_dev();
        let mut volume = open(&dev, VolumeConfig::default());
        volume.create_entry("d", true).unwrap();
        volume.create_entry("d/f", false).unwrap();
        volume.create_entry("dx", false).unwrap();
        assert!(matches!(
            volume.remove_dir("d"),
            Err(VolumeError::DirectoryNotEmpty(_))
        ));
        assert!(matches!(
            volume.remove_dir("dx"),
            Err(VolumeError::NotADirectory(_))
        ));
        volume.remove_entry("d/f").unwrap();
        volume.remove_dir("d").unwrap();
        assert_eq!(names(&volume), vec!["dx"]);
    }

    #[test]
    fn rename_in_place() {
        let dev = mem_dev();
        let mut volume = open(&dev, VolumeConfig::default());
        volume.create_entry("a", false).unwrap();
        volume.set_content("a", b"data").unwrap();
        let before = volume.find_entry("a").unwrap().clone();
        volume.rename("a", "b").unwrap();
        let after = volume.find_entry("b").unwrap();
        assert_eq!(after.block_start, before.block_start);
        assert_eq!(after.size, before.size);
        assert!(volume.find_entry("a").is_none());
        assert_eq!(volume.get_content("b").unwrap(), b"data");
        assert!(matches!(
            volume.rename("a", "c"),
            Err(VolumeError::NotFound(_))
        ));
    }

    #[test]
    fn rename_collision_rejected_by_default() {
        let dev = mem_dev();
        let mut volume = open(&dev, VolumeConfig::default());
        volume.create_entry("a", false).unwrap();
        volume.create_entry("b", false).unwrap();
        assert!(matches!(
            volume.rename("a", "b"),
            Err(VolumeError::NameCollision(_))
        ));
        assert_eq!(names(&volume), vec!["a", "b"]);
    }

    #[test]
    fn rename_overwrite_replaces_target() {
        let dev = mem_dev();
        let config = VolumeConfig::default().with_rename_policy(RenamePolicy::Overwrite);
        let mut volume = open(&dev, config);
        volume.create_entry("a", false).unwrap();
        volume.create_entry("b", false).unwrap();
        volume.create_entry("c", false).unwrap();
        volume.set_content("c", b"from c").unwrap();
        volume.rename("c", "a").unwrap();
        assert_eq!(names(&volume), vec!["b", "a"]);
        assert_eq!(volume.get_content("a").unwrap(), b"from c");

        let reopened = open(&dev, VolumeConfig::default());
        assert_eq!(names(&reopened), vec!["b", "a"]);
    }

    #[test]
    fn corrupt_entry_count_is_reported() {
        let dev = mem_dev();
        drop(open(&dev, VolumeConfig::default()));
        dev.poke(HEADER_SIZE as usize, &500u32.to_le_bytes());
        assert!(matches!(
            Volume::open(dev.clone(), VolumeConfig::default()),
            Err(VolumeError::CorruptVolume(_))
        ));
    }

    #[test]
    fn corrupt_entry_is_reported() {
        let dev = mem_dev();
        let mut volume = open(&dev, VolumeConfig::default());
        volume.create_entry("a", false).unwrap();
        drop(volume);
        // block_start of the first entry, pointing into the header
        let at = (HEADER_SIZE + META_SIZE) as usize + NAME_CAP + 4;
        dev.poke(at, &1u32.to_le_bytes());
        assert!(matches!(
            Volume::open(dev.clone(), VolumeConfig::default()),
            Err(VolumeError::CorruptVolume(_))
        ));
    }

    #[test]
    fn table_larger_than_device_is_reported() {
        let dev = mem_dev();
        drop(open(&dev, VolumeConfig::default()));
        // max_entries in the header
        dev.poke(5, &100_000u32.to_le_bytes());
        assert!(reopen_is_corrupt(&dev));
    }

    #[test]
    fn duplicate_names_on_disk_are_reported() {
        let dev = mem_dev();
        let mut volume = open(&dev, VolumeConfig::default());
        volume.create_entry("a", false).unwrap();
        volume.create_entry("b", false).unwrap();
        drop(volume);
        dev.poke(slot(1), b"a\0");
        assert!(reopen_is_corrupt(&dev));
    }

    #[test]
    fn extent_past_device_end_is_reported() {
        let dev = mem_dev();
        let mut volume = open(&dev, VolumeConfig::default());
        volume.create_entry("a", false).unwrap();
        drop(volume);
        dev.poke(slot(0) + NAME_CAP, &1_000_000u32.to_le_bytes());
        assert!(reopen_is_corrupt(&dev));
    }

    #[test]
    fn non_utf8_name_is_reported() {
        let dev = mem_dev();
        let mut volume = open(&dev, VolumeConfig::default());
        volume.create_entry("a", false).unwrap();
        drop(volume);
        dev.poke(slot(0), &[0xff, 0xfe, 0]);
        assert!(reopen_is_corrupt(&dev));
    }

    #[test]
    fn directory_with_content_is_reported() {
        let dev = mem_dev();
        let mut volume = open(&dev, VolumeConfig::default());
        volume.create_entry("d", true).unwrap();
        drop(volume);
        dev.poke(slot(0) + NAME_CAP, &4u32.to_le_bytes());
        assert!(reopen_is_corrupt(&dev));
    }

    #[test]
    fn set_content_on_missing_entry() {
        let dev = mem_dev();
        let mut volume = open(&dev, VolumeConfig::default());
        assert!(matches!(
            volume.set_content("ghost", b"boo"),
            Err(VolumeError::NotFound(_))
        ));
        assert!(volume.is_empty());
    }

    #[test]
    fn write_at_splices_into_content() {
        let dev = mem_dev();
        let mut volume = open(&dev, VolumeConfig::default());
        volume.create_entry("f", false).unwrap();
        volume.set_content("f", b"hello world").unwrap();
        volume.write_at("f", 6, b"WORLD!").unwrap();
        assert_eq!(volume.get_content("f").unwrap(), b"hello WORLD!");
        volume.write_at("f", 14, b"x").unwrap();
        assert_eq!(volume.get_content("f").unwrap(), b"hello WORLD!\0\0x");
        volume.write_at("f", 0, b"").unwrap();
        assert_eq!(volume.find_entry("f").unwrap().size, 15);
    }

    #[test]
    fn write_at_far_offset_fails_before_allocating() {
        let dev = mem_dev();
        let mut volume = open(&dev, VolumeConfig::default());
        volume.create_entry("f", false).unwrap();
        volume.set_content("f", b"keep").unwrap();
        assert!(matches!(
            volume.write_at("f", 1 << 40, b"x"),
            Err(VolumeError::FileTooLarge(_))
        ));
        assert!(matches!(
            volume.write_at("f", u64::MAX, b"xy"),
            Err(VolumeError::FileTooLarge(_))
        ));
        // fits in a u32 but not on a 32 KiB device
        assert!(matches!(
            volume.write_at("f", 1 << 20, b"x"),
            Err(VolumeError::NoSpace(_))
        ));
        assert!(matches!(
            volume.write_at("nope", 0, b"x"),
            Err(VolumeError::NotFound(_))
        ));
        assert_eq!(volume.get_content("f").unwrap(), b"keep");
    }

    #[test]
    fn truncate_checks_length_first() {
        let dev = mem_dev();
        let mut volume = open(&dev, VolumeConfig::default());
        volume.create_entry("f", false).unwrap();
        volume.set_content("f", b"keep").unwrap();
        assert!(matches!(
            volume.truncate("f", 1 << 40),
            Err(VolumeError::FileTooLarge(_))
        ));
        assert!(matches!(
            volume.truncate("f", 1 << 20),
            Err(VolumeError::NoSpace(_))
        ));
        assert_eq!(volume.get_content("f").unwrap(), b"keep");
    }

    #[test]
    fn usage_accounting() {
        let dev = mem_dev();
        let mut volume = open(&dev, VolumeConfig::default());
        assert_eq!(volume.used_bytes(), 0);
        assert_eq!(
            volume.capacity_bytes(),
            64 * BLOCK_SZ as u64 - volume.data_start()
        );
        volume.create_entry("a", false).unwrap();
        volume.set_content("a", b"abc").unwrap();
        let a = volume.find_entry("a").unwrap().clone();
        assert_eq!(volume.used_bytes(), a.end() - volume.data_start());
    }
}
