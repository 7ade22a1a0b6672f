use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VolumeError {
    #[error("entry already exists: {0}")]
    AlreadyExists(String),
    #[error("entry not found: {0}")]
    NotFound(String),
    #[error("is a directory: {0}")]
    IsDirectory(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("directory is not empty: {0}")]
    DirectoryNotEmpty(String),
    #[error("only the root directory can be listed, got {0:?}")]
    Unsupported(String),
    #[error("entry table is full ({0} entries)")]
    TableFull(u32),
    #[error("rename target already exists: {0}")]
    NameCollision(String),
    #[error("invalid entry name: {0:?}")]
    InvalidName(String),
    #[error("name too long: {0:?}")]
    NameTooLong(String),
    #[error("content of {0} bytes exceeds the entry size limit")]
    FileTooLarge(u64),
    #[error("no space left in data region for {0} bytes")]
    NoSpace(u64),
    #[error("corrupt volume: {0}")]
    CorruptVolume(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, VolumeError>;

impl VolumeError {
    /// Closest errno, for reporting through FUSE.
    pub fn errno(&self) -> i32 {
        match self {
            VolumeError::AlreadyExists(_) | VolumeError::NameCollision(_) => libc::EEXIST,
            VolumeError::NotFound(_) => libc::ENOENT,
            VolumeError::IsDirectory(_) => libc::EISDIR,
            VolumeError::NotADirectory(_) => libc::ENOTDIR,
            VolumeError::DirectoryNotEmpty(_) => libc::ENOTEMPTY,
            VolumeError::Unsupported(_) => libc::ENOSYS,
            VolumeError::TableFull(_) | VolumeError::NoSpace(_) => libc::ENOSPC,
            VolumeError::InvalidName(_) => libc::EINVAL,
            VolumeError::NameTooLong(_) => libc::ENAMETOOLONG,
            VolumeError::FileTooLarge(_) => libc::EFBIG,
            VolumeError::CorruptVolume(_) | VolumeError::Io(_) => libc::EIO,
        }
    }
}
