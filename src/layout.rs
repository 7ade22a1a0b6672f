//! Volume layout:
//! [ header | metadata | entry table (max_entries records) | data region ... ]
//!
//! The entry table is reserved for `max_entries` records regardless of how many
//! are in use, so the data region starts at a fixed offset for the life of the
//! volume. All records are bincode encoded (fixed ints, little endian).

use super::*;
use error::{Result, VolumeError};

use serde::{Deserialize, Serialize};

/// bytes of an encoded [`VolumeHeader`]
pub const HEADER_SIZE: u64 = 4 + 1 + 4;

/// bytes of an encoded [`VolumeMeta`]
pub const META_SIZE: u64 = 4;

/// bytes of an encoded [`DiskEntry`]
pub const ENTRY_SIZE: u64 = NAME_CAP as u64 + 4 + 4 + 1;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VolumeHeader {
    /// Must be FSMAGIC
    pub magic: [u8; 4],
    /// Must be FSVERSION
    pub version: u8,
    /// Capacity of the entry table, fixed at format time
    pub max_entries: u32,
}

impl VolumeHeader {
    pub fn new(max_entries: u32) -> Self {
        Self {
            magic: FSMAGIC,
            version: FSVERSION,
            max_entries,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.magic == FSMAGIC && self.version == FSVERSION
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        encode(self)
    }

    /// Never fails on garbage: an unreadable header just isn't valid.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        bincode::deserialize(bytes).ok()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct VolumeMeta {
    /// # of entries in use
    pub entry_count: u32,
}

impl VolumeMeta {
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes)
            .map_err(|e| VolumeError::CorruptVolume(format!("metadata: {}", e)))
    }
}

/// entry on disk
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DiskEntry {
    /// NUL padded
    pub name: [u8; NAME_CAP],
    /// Size of content (bytes)
    pub size: u32,
    /// Absolute offset of the content on the device
    pub block_start: u32,
    pub is_directory: bool,
}

impl DiskEntry {
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| VolumeError::CorruptVolume(format!("entry: {}", e)))
    }
}

/// entry in memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub size: u32,
    pub block_start: u32,
    pub is_directory: bool,
}

impl FileEntry {
    /// one past the last content byte
    pub fn end(&self) -> u64 {
        self.block_start as u64 + self.size as u64
    }
}

impl From<&FileEntry> for DiskEntry {
    fn from(entry: &FileEntry) -> Self {
        let mut name = [0u8; NAME_CAP];
        let bytes = entry.name.as_bytes();
        let len = bytes.len().min(MAX_NAME_LEN);
        name[..len].copy_from_slice(&bytes[..len]);
        DiskEntry {
            name,
            size: entry.size,
            block_start: entry.block_start,
            is_directory: entry.is_directory,
        }
    }
}

impl TryFrom<DiskEntry> for FileEntry {
    type Error = VolumeError;

    fn try_from(d: DiskEntry) -> Result<Self> {
        let len = d
            .name
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| VolumeError::CorruptVolume("entry name is not terminated".into()))?;
        if len == 0 {
            return Err(VolumeError::CorruptVolume("entry name is empty".into()));
        }
        let name = std::str::from_utf8(&d.name[..len])
            .map_err(|_| VolumeError::CorruptVolume("entry name is not utf-8".into()))?;
        Ok(FileEntry {
            name: name.to_string(),
            size: d.size,
            block_start: d.block_start,
            is_directory: d.is_directory,
        })
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| VolumeError::CorruptVolume(format!("encode: {}", e)))
}

/// Cut `name` down to what an entry can hold: stop at the first NUL, then at
/// `MAX_NAME_LEN` bytes on a char boundary.
pub fn fit_name(name: &str) -> Result<String> {
    let name = name.split('\0').next().unwrap_or_default();
    if name.is_empty() {
        return Err(VolumeError::InvalidName(name.to_string()));
    }
    let mut end = name.len().min(MAX_NAME_LEN);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    Ok(name[..end].to_string())
}

/// Offsets of every region, derived from the table capacity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layout {
    max_entries: u32,
}

impl Layout {
    pub fn new(max_entries: u32) -> Self {
        Self { max_entries }
    }

    pub fn max_entries(&self) -> u32 {
        self.max_entries
    }

    pub fn header_offset(&self) -> u64 {
        0
    }

    pub fn meta_offset(&self) -> u64 {
        HEADER_SIZE
    }

    pub fn table_offset(&self) -> u64 {
        HEADER_SIZE + META_SIZE
    }

    pub fn data_start(&self) -> u64 {
        self.table_offset() + self.max_entries as u64 * ENTRY_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> FileEntry {
        FileEntry {
            name: name.to_string(),
            size: 5,
            block_start: 4096,
            is_directory: false,
        }
    }

    #[test]
    fn record_sizes_match_encoding() {
        let header = VolumeHeader::new(DEFAULT_MAX_ENTRIES);
        assert_eq!(header.encode().unwrap().len() as u64, HEADER_SIZE);
        assert_eq!(VolumeMeta::default().encode().unwrap().len() as u64, META_SIZE);
        let d = DiskEntry::from(&entry("f.txt"));
        assert_eq!(d.encode().unwrap().len() as u64, ENTRY_SIZE);
    }

    #[test]
    fn header_starts_with_magic() {
        let bytes = VolumeHeader::new(7).encode().unwrap();
        assert_eq!(&bytes[..4], b"FLFS");
        assert_eq!(bytes[4], FSVERSION);
        let back = VolumeHeader::decode(&bytes).unwrap();
        assert!(back.is_valid());
        assert_eq!(back.max_entries, 7);
    }

    #[test]
    fn zeroed_header_is_invalid() {
        let header = VolumeHeader::decode(&[0u8; HEADER_SIZE as usize]).unwrap();
        assert!(!header.is_valid());
    }

    #[test]
    fn entry_survives_disk_form() {
        let e = entry("dir/sub");
        let bytes = DiskEntry::from(&e).encode().unwrap();
        let back = FileEntry::try_from(DiskEntry::decode(&bytes).unwrap()).unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn unterminated_name_is_corrupt() {
        let mut d = DiskEntry::from(&entry("x"));
        d.name = [b'a'; NAME_CAP];
        let err = FileEntry::try_from(d).unwrap_err();
        assert!(matches!(err, VolumeError::CorruptVolume(_)));
    }

    #[test]
    fn bad_directory_flag_is_corrupt() {
        let mut bytes = DiskEntry::from(&entry("x")).encode().unwrap();
        let last = bytes.len() - 1;
        bytes[last] = 7;
        assert!(matches!(
            DiskEntry::decode(&bytes),
            Err(VolumeError::CorruptVolume(_))
        ));
    }

    #[test]
    fn fit_name_truncates_on_char_boundary() {
        assert_eq!(fit_name("short").unwrap(), "short");
        let long = "abcdefghijklmnopqrstuvwxyz";
        assert_eq!(fit_name(long).unwrap(), &long[..MAX_NAME_LEN]);
        // ten two-byte chars, byte 19 falls inside the tenth
        let wide = "éééééééééé";
        let fitted = fit_name(wide).unwrap();
        assert_eq!(fitted.len(), 18);
        assert!(matches!(fit_name(""), Err(VolumeError::InvalidName(_))));
    }

    #[test]
    fn fit_name_stops_at_nul() {
        assert_eq!(fit_name("a\0b").unwrap(), "a");
        assert_eq!(fit_name("abc\0").unwrap(), "abc");
        assert!(matches!(fit_name("\0abc"), Err(VolumeError::InvalidName(_))));
    }

    #[test]
    fn data_region_follows_reserved_table() {
        let layout = Layout::new(100);
        assert_eq!(layout.meta_offset(), 9);
        assert_eq!(layout.table_offset(), 13);
        assert_eq!(layout.data_start(), 13 + 100 * ENTRY_SIZE);
    }
}
