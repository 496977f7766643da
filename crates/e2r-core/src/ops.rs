//! Read-only VFS boundary consumed by mount adapters.

use crate::Ext2Fs;
use e2r_error::{Ext2Error, Result};
use e2r_ondisk::{Ext2FileType, Ext2Inode, Ext2Superblock};
use e2r_types::InodeNumber;
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::time::SystemTime;
use tracing::trace;

/// File type as seen by a mount adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileType {
    RegularFile,
    Directory,
    Symlink,
    BlockDevice,
    CharDevice,
    Fifo,
    Socket,
}

/// Inode attributes returned by [`FsOps::getattr`] and [`FsOps::lookup`],
/// analogous to POSIX `struct stat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InodeAttr {
    pub ino: InodeNumber,
    /// File size in bytes.
    pub size: u64,
    /// Number of 512-byte sectors allocated.
    pub blocks: u64,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
    pub kind: FileType,
    /// POSIX permission bits (lower 12 bits of mode).
    pub perm: u16,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    /// Device number for block/char devices, else 0.
    pub rdev: u32,
    /// Preferred I/O block size.
    pub blksize: u32,
}

/// A directory entry returned by [`FsOps::readdir`].
///
/// `offset` is an opaque cookie: passing it back to `readdir` resumes after
/// this entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub ino: InodeNumber,
    pub offset: u64,
    pub kind: FileType,
    pub name: Vec<u8>,
}

impl DirEntry {
    /// Return the name as a UTF-8 string (lossy).
    #[must_use]
    pub fn name_str(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }
}

/// Access mode requested by an `open` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpenAccess {
    Read,
    Write,
    ReadWrite,
}

impl OpenAccess {
    #[must_use]
    pub fn wants_write(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

/// Read-only VFS operations for a mount adapter.
///
/// Implementations are `Send + Sync` so an adapter can dispatch requests
/// from several threads. Errors map to errnos via
/// [`Ext2Error::to_errno`].
pub trait FsOps: Send + Sync {
    /// Attributes of `ino`. Unused inodes are `NotFound`.
    fn getattr(&self, ino: InodeNumber) -> Result<InodeAttr>;

    /// Attributes of the child `name` of directory `parent`.
    ///
    /// Returns `NotFound` if the name does not exist, or `NotDirectory` if
    /// `parent` is not a directory.
    fn lookup(&self, parent: InodeNumber, name: &OsStr) -> Result<InodeAttr>;

    /// Entries of directory `ino` starting at cookie `offset` (0 for the
    /// first call). An empty result marks the end of the directory.
    fn readdir(&self, ino: InodeNumber, offset: u64) -> Result<Vec<DirEntry>>;

    /// Check that `ino` may be opened with `access`.
    ///
    /// Any write access fails with `ReadOnly`.
    fn open(&self, ino: InodeNumber, access: OpenAccess) -> Result<InodeAttr>;

    /// Up to `size` bytes of `ino` from `offset`; fewer at end of file.
    /// Returns `IsDirectory` for directories.
    fn read(&self, ino: InodeNumber, offset: u64, size: u32) -> Result<Vec<u8>>;
}

impl Ext2Fs {
    /// Read an inode and convert it to VFS attributes.
    pub fn read_inode_attr(&self, ino: InodeNumber) -> Result<InodeAttr> {
        let inode = self.read_inode(ino)?;
        Ok(inode_to_attr(self.superblock(), ino, &inode))
    }
}

pub(crate) fn inode_to_attr(sb: &Ext2Superblock, ino: InodeNumber, inode: &Ext2Inode) -> InodeAttr {
    let kind = inode_file_type(inode);
    // device inodes keep the device number in the first block slot
    let rdev = match kind {
        FileType::BlockDevice | FileType::CharDevice => inode.direct[0],
        _ => 0,
    };
    InodeAttr {
        ino,
        size: inode.size_bytes(),
        blocks: u64::from(inode.sectors),
        atime: inode.atime_system_time(),
        mtime: inode.mtime_system_time(),
        ctime: inode.ctime_system_time(),
        kind,
        perm: inode.permission_bits(),
        nlink: u32::from(inode.links_count),
        uid: u32::from(inode.uid),
        gid: u32::from(inode.gid),
        rdev,
        blksize: sb.block_size,
    }
}

fn inode_file_type(inode: &Ext2Inode) -> FileType {
    if inode.is_dir() {
        FileType::Directory
    } else if inode.is_symlink() {
        FileType::Symlink
    } else if inode.is_blkdev() {
        FileType::BlockDevice
    } else if inode.is_chrdev() {
        FileType::CharDevice
    } else if inode.is_fifo() {
        FileType::Fifo
    } else if inode.is_socket() {
        FileType::Socket
    } else {
        FileType::RegularFile
    }
}

fn dir_entry_file_type(ft: Ext2FileType) -> FileType {
    match ft {
        Ext2FileType::Dir => FileType::Directory,
        Ext2FileType::Symlink => FileType::Symlink,
        Ext2FileType::Blkdev => FileType::BlockDevice,
        Ext2FileType::Chrdev => FileType::CharDevice,
        Ext2FileType::Fifo => FileType::Fifo,
        Ext2FileType::Sock => FileType::Socket,
        Ext2FileType::RegFile | Ext2FileType::Unknown => FileType::RegularFile,
    }
}

impl FsOps for Ext2Fs {
    fn getattr(&self, ino: InodeNumber) -> Result<InodeAttr> {
        self.read_inode_attr(ino)
    }

    fn lookup(&self, parent: InodeNumber, name: &OsStr) -> Result<InodeAttr> {
        trace!(parent = parent.0, name = %name.to_string_lossy(), "lookup");
        let entry = self
            .lookup_name(parent, name.as_encoded_bytes())?
            .ok_or_else(|| Ext2Error::NotFound(name.to_string_lossy().into_owned()))?;
        self.read_inode_attr(entry.inode)
    }

    fn readdir(&self, ino: InodeNumber, offset: u64) -> Result<Vec<DirEntry>> {
        let entries = self
            .read_dir(ino)?
            .into_iter()
            .enumerate()
            .filter(|(idx, _)| (*idx as u64) >= offset)
            .map(|(idx, e)| DirEntry {
                ino: e.inode,
                offset: (idx as u64) + 1,
                kind: dir_entry_file_type(e.file_type),
                name: e.name,
            })
            .collect();
        Ok(entries)
    }

    fn open(&self, ino: InodeNumber, access: OpenAccess) -> Result<InodeAttr> {
        let attr = self.read_inode_attr(ino)?;
        if access.wants_write() {
            return Err(Ext2Error::ReadOnly);
        }
        Ok(attr)
    }

    fn read(&self, ino: InodeNumber, offset: u64, size: u32) -> Result<Vec<u8>> {
        let inode = self.read_inode(ino)?;
        if inode.is_dir() {
            return Err(Ext2Error::IsDirectory);
        }
        self.read_range(ino, offset, u64::from(size))
    }
}
