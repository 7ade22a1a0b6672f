//! FUSE front end. Entry names are split on `/` so that `"dir/sub"` shows up
//! inside `dir`; the volume itself stays flat.

use super::*;
use error::VolumeError;
use layout::FileEntry;
use volume::Volume;

use fuser::{
    FileAttr, FileType, Filesystem, MountOption, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyWrite, Request, TimeOrNow,
};
use libc::{getgid, getuid};
use log::{debug, info};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const ROOT_INO: u64 = 1;

const TTL: Duration = Duration::from_secs(1);

pub struct FlatFuse {
    volume: Volume,
    /// ino -> full entry name
    names: HashMap<u64, String>,
    inos: HashMap<String, u64>,
    next_ino: u64,
    uid: u32,
    gid: u32,
}

impl FlatFuse {
    pub fn new(volume: Volume) -> Self {
        let uid = unsafe { getuid() };
        let gid = unsafe { getgid() };
        Self {
            volume,
            names: HashMap::new(),
            inos: HashMap::new(),
            next_ino: ROOT_INO + 1,
            uid,
            gid,
        }
    }

    /// Entry name of the directory `ino`, `None` for the root.
    fn dir_name(&self, ino: u64) -> Result<Option<&str>, i32> {
        if ino == ROOT_INO {
            return Ok(None);
        }
        let name = self.names.get(&ino).ok_or(libc::ENOENT)?;
        Ok(Some(name.as_str()))
    }

    /// Full entry name of `name` inside directory `parent`.
    fn child_path(&self, parent: u64, name: &OsStr) -> Result<String, i32> {
        let name = name.to_str().ok_or(libc::EINVAL)?;
        tree::child_name(self.dir_name(parent)?, name).map_err(errno)
    }

    fn ino_for(&mut self, full: &str) -> u64 {
        if let Some(ino) = self.inos.get(full) {
            return *ino;
        }
        let ino = self.next_ino;
        self.next_ino += 1;
        self.inos.insert(full.to_string(), ino);
        self.names.insert(ino, full.to_string());
        ino
    }

    fn forget_name(&mut self, full: &str) {
        if let Some(ino) = self.inos.remove(full) {
            self.names.remove(&ino);
        }
    }

    fn entry_of(&self, ino: u64) -> Result<&FileEntry, i32> {
        let name = self.names.get(&ino).ok_or(libc::ENOENT)?;
        self.volume.stat(name).map_err(|e| e.errno())
    }

    fn attr(&self, ino: u64, entry: &FileEntry) -> FileAttr {
        let (kind, perm, nlink) = if entry.is_directory {
            (FileType::Directory, 0o755, 2)
        } else {
            (FileType::RegularFile, 0o644, 1)
        };
        self.make_attr(ino, entry.size as u64, kind, perm, nlink)
    }

    fn root_attr(&self) -> FileAttr {
        self.make_attr(ROOT_INO, 0, FileType::Directory, 0o755, 2)
    }

    fn make_attr(&self, ino: u64, size: u64, kind: FileType, perm: u16, nlink: u32) -> FileAttr {
        FileAttr {
            ino,
            size,
            blocks: (size + BLOCK_SZ as u64 - 1) / BLOCK_SZ as u64,
            atime: UNIX_EPOCH,
            mtime: UNIX_EPOCH,
            ctime: UNIX_EPOCH,
            crtime: UNIX_EPOCH,
            kind,
            perm,
            nlink,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: BLOCK_SZ as u32,
            flags: 0,
        }
    }

    /// Direct children of the directory `ino`, as (full name, short name, is dir).
    fn children(&self, ino: u64) -> Result<Vec<(String, String, bool)>, i32> {
        if ino != ROOT_INO && !self.entry_of(ino)?.is_directory {
            return Err(libc::ENOTDIR);
        }
        let dir = self.dir_name(ino)?;
        Ok(tree::children(self.volume.entries(), dir)
            .map(|(e, short)| (e.name.clone(), short.to_string(), e.is_directory))
            .collect())
    }

    fn lookup_attr(&mut self, full: &str) -> Result<FileAttr, i32> {
        let entry = self.volume.stat(full).map_err(|e| e.errno())?.clone();
        let ino = self.ino_for(&entry.name);
        Ok(self.attr(ino, &entry))
    }

    fn make_node(
        &mut self,
        parent: u64,
        name: &OsStr,
        is_directory: bool,
    ) -> Result<FileAttr, i32> {
        let full = self.child_path(parent, name)?;
        self.volume.create_entry(&full, is_directory).map_err(errno)?;
        self.lookup_attr(&full)
    }

    fn move_node(
        &mut self,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
    ) -> Result<(), i32> {
        let from = self.child_path(parent, name)?;
        let to = self.child_path(newparent, newname)?;
        let entry = self.volume.stat(&from).map_err(errno)?;
        // children are separate entries and would be left behind
        if entry.is_directory && tree::has_children(self.volume.entries(), &entry.name) {
            return Err(libc::ENOTEMPTY);
        }
        self.volume.rename(&from, &to).map_err(errno)?;
        self.forget_name(&to);
        if let Some(ino) = self.inos.remove(&from) {
            self.inos.insert(to.clone(), ino);
            self.names.insert(ino, to);
        }
        Ok(())
    }

    fn write_node(&mut self, ino: u64, offset: i64, data: &[u8]) -> Result<u32, i32> {
        let name = self.names.get(&ino).ok_or(libc::ENOENT)?;
        let offset = u64::try_from(offset).map_err(|_| libc::EINVAL)?;
        let written = u32::try_from(data.len()).map_err(|_| libc::EFBIG)?;
        self.volume.write_at(name, offset, data).map_err(errno)?;
        Ok(written)
    }

    fn read_node(&self, ino: u64, offset: i64, size: u32) -> Result<Vec<u8>, i32> {
        let name = self.names.get(&ino).ok_or(libc::ENOENT)?;
        let content = self.volume.get_content(name).map_err(errno)?;
        let start = usize::try_from(offset.max(0))
            .unwrap_or(usize::MAX)
            .min(content.len());
        let end = start.saturating_add(size as usize).min(content.len());
        Ok(content[start..end].to_vec())
    }

    /// readdir rows past `offset`, as (ino, offset of the next row, kind, name).
    fn listing(
        &mut self,
        ino: u64,
        offset: i64,
    ) -> Result<Vec<(u64, i64, FileType, String)>, i32> {
        let children = self.children(ino)?;
        let parent = match self.dir_name(ino)?.and_then(tree::parent_name) {
            Some(dir) => {
                let dir = dir.to_string();
                self.ino_for(&dir)
            }
            None => ROOT_INO,
        };
        let mut rows = vec![
            (ino, FileType::Directory, ".".to_string()),
            (parent, FileType::Directory, "..".to_string()),
        ];
        for (full, short, is_directory) in children {
            let kind = if is_directory {
                FileType::Directory
            } else {
                FileType::RegularFile
            };
            rows.push((self.ino_for(&full), kind, short));
        }
        Ok(rows
            .into_iter()
            .enumerate()
            .skip(offset.max(0) as usize)
            .map(|(i, (ino, kind, name))| (ino, (i + 1) as i64, kind, name))
            .collect())
    }
}

fn errno(e: VolumeError) -> i32 {
    debug!("fuse: {}", e);
    e.errno()
}

impl Filesystem for FlatFuse {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        match self.child_path(parent, name).and_then(|full| self.lookup_attr(&full)) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(e) => reply.error(e),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        if ino == ROOT_INO {
            return reply.attr(&TTL, &self.root_attr());
        }
        match self.entry_of(ino) {
            Ok(entry) => reply.attr(&TTL, &self.attr(ino, entry)),
            Err(e) => reply.error(e),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        if ino == ROOT_INO {
            return reply.attr(&TTL, &self.root_attr());
        }
        let Some(name) = self.names.get(&ino).cloned() else {
            return reply.error(libc::ENOENT);
        };
        if let Some(size) = size {
            if let Err(e) = self.volume.truncate(&name, size) {
                return reply.error(errno(e));
            }
        }
        match self.entry_of(ino) {
            Ok(entry) => reply.attr(&TTL, &self.attr(ino, entry)),
            Err(e) => reply.error(e),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        match self.make_node(parent, name, true) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(e) => reply.error(e),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let result = self.child_path(parent, name).and_then(|full| {
            if self.volume.stat(&full).map_err(errno)?.is_directory {
                return Err(libc::EISDIR);
            }
            self.volume.remove_entry(&full).map_err(errno)?;
            self.forget_name(&full);
            Ok(())
        });
        match result {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let result = self.child_path(parent, name).and_then(|full| {
            self.volume.remove_dir(&full).map_err(errno)?;
            self.forget_name(&full);
            Ok(())
        });
        match result {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e),
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        match self.move_node(parent, name, newparent, newname) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        match self.read_node(ino, offset, size) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(e),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        match self.write_node(ino, offset, data) {
            Ok(written) => reply.written(written),
            Err(e) => reply.error(e),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let rows = match self.listing(ino, offset) {
            Ok(rows) => rows,
            Err(e) => return reply.error(e),
        };
        for (ino, next, kind, name) in rows {
            // buffer full
            if reply.add(ino, next, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        match self.make_node(parent, name, false) {
            Ok(attr) => reply.created(&TTL, &attr, 0, 0, 0),
            Err(e) => reply.error(e),
        }
    }
}

/// Serve `volume` at `mountpoint` until it is unmounted.
pub fn mount<P: AsRef<Path>>(volume: Volume, mountpoint: P) -> io::Result<()> {
    info!("mounting at {}", mountpoint.as_ref().display());
    let options = [
        MountOption::FSName("flatfs".to_string()),
        MountOption::RW,
        MountOption::DefaultPermissions,
    ];
    fuser::mount2(FlatFuse::new(volume), mountpoint, &options)
}
