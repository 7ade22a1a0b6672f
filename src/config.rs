use super::*;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Where content extents go.
#[derive(Serialize, Deserialize, ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AllocPolicy {
    /// Lowest aligned gap between live extents. Freed space is reused and
    /// content that outgrows its extent is moved.
    #[default]
    FirstFit,
    /// Only ever raise the high-water mark. Content is written in place at
    /// its block-start even when it grows into the next entry.
    Bump,
}

/// What `rename` does when the new name is taken.
#[derive(Serialize, Deserialize, ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RenamePolicy {
    /// fail with `NameCollision`
    #[default]
    Reject,
    /// drop the existing entry, then rename
    Overwrite,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct VolumeConfig {
    /// Capacity of the entry table when formatting. An existing volume keeps
    /// the capacity it was formatted with.
    pub max_entries: u32,
    /// block-start alignment, must be a power of two
    pub alignment: u32,
    pub alloc_policy: AllocPolicy,
    pub rename_policy: RenamePolicy,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            alignment: DEFAULT_ALIGN,
            alloc_policy: AllocPolicy::default(),
            rename_policy: RenamePolicy::default(),
        }
    }
}

impl VolumeConfig {
    pub fn with_max_entries(mut self, max_entries: u32) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_alloc_policy(mut self, alloc_policy: AllocPolicy) -> Self {
        self.alloc_policy = alloc_policy;
        self
    }

    pub fn with_rename_policy(mut self, rename_policy: RenamePolicy) -> Self {
        self.rename_policy = rename_policy;
        self
    }

    /// alignment actually used; anything that is not a power of two falls back to 1
    pub fn effective_alignment(&self) -> u32 {
        if self.alignment.is_power_of_two() {
            self.alignment
        } else {
            1
        }
    }
}
