#![forbid(unsafe_code)]
//! Read-only ext2 filesystem access.
//!
//! [`Ext2Fs`] bundles a parsed superblock with the device it came from.
//! Everything else borrows it: block iterators own their inode, group
//! descriptor and indirect-block cache, and release them when dropped.

mod blkiter;
mod dir;
mod extract;
mod ops;
mod path;
mod resolver;

pub use blkiter::{BlockIter, IterState};
pub use extract::{ByteWindow, ContentSink, FileSink, FnSink};
pub use ops::{DirEntry, FileType, FsOps, InodeAttr, OpenAccess};
pub use path::{Ext2Entity, PathExpect, parse_path_segments};
pub use resolver::{BlockResolver, IndirectBlockCache, IndirectLevel, Resolution};

use e2r_block::{ByteDevice, FileByteDevice, read_block_into, read_superblock_region};
use e2r_error::{Ext2Error, Result};
use e2r_ondisk::{Ext2GroupDesc, Ext2Inode, Ext2Superblock};
use e2r_types::{
    BlockNumber, BlockSize, EXT2_GROUP_DESC_SIZE, GroupNumber, InodeNumber, ParseError,
};
use std::io;
use std::path::Path;
use tracing::{debug, trace, warn};

// ── Open API ────────────────────────────────────────────────────────────────

/// Options controlling how an image is opened.
///
/// By default the superblock geometry is validated. Disable it only for
/// diagnostic workflows where reading a partially-corrupt image is
/// intentional.
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    /// Skip geometry validation. The magic number is always checked.
    pub skip_validation: bool,
}

/// An opened ext2 image.
///
/// Immutable after construction and `Send + Sync`: a single handle can serve
/// concurrent readers, each with its own iterators.
pub struct Ext2Fs {
    sb: Ext2Superblock,
    block_size: BlockSize,
    dev: Box<dyn ByteDevice>,
}

impl std::fmt::Debug for Ext2Fs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ext2Fs")
            .field("block_size", &self.block_size)
            .field("inodes_count", &self.sb.inodes_count)
            .field("blocks_count", &self.sb.blocks_count)
            .field("dev_len", &self.dev.len_bytes())
            .finish_non_exhaustive()
    }
}

impl Ext2Fs {
    /// Open an image at `path` with default options (validation enabled).
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(path, &OpenOptions::default())
    }

    pub fn open_with_options(path: impl AsRef<Path>, options: &OpenOptions) -> Result<Self> {
        let dev = FileByteDevice::open(path.as_ref())?;
        Self::from_device(Box::new(dev), options)
    }

    /// Open an image from an already-opened device.
    ///
    /// A short superblock read or a bad magic number fails with
    /// `Ext2Error::Corruption` before any other structure is read.
    pub fn from_device(dev: Box<dyn ByteDevice>, options: &OpenOptions) -> Result<Self> {
        let region = read_superblock_region(&*dev).map_err(|e| short_read_to_corruption(e, 1))?;
        let sb = Ext2Superblock::parse_superblock_region(&region)
            .map_err(|e| parse_to_ext2_error(&e, 1))?;

        if !options.skip_validation {
            sb.validate_geometry().map_err(|e| parse_to_ext2_error(&e, 1))?;
        }
        let block_size = sb.block_size().map_err(|e| parse_to_ext2_error(&e, 1))?;

        debug!(
            block_size = block_size.get(),
            inodes_count = sb.inodes_count,
            blocks_count = sb.blocks_count,
            inodes_per_group = sb.inodes_per_group,
            inode_size = sb.inode_size,
            groups = sb.groups_count(),
            rev_level = sb.rev_level,
            "opened ext2 image"
        );

        Ok(Self {
            sb,
            block_size,
            dev,
        })
    }

    /// The device backing this filesystem.
    #[must_use]
    pub fn device(&self) -> &dyn ByteDevice {
        &*self.dev
    }

    #[must_use]
    pub fn superblock(&self) -> &Ext2Superblock {
        &self.sb
    }

    #[must_use]
    pub fn block_size(&self) -> BlockSize {
        self.block_size
    }

    // ── Metadata readers ────────────────────────────────────────────────

    /// Read the descriptor of block group `group`.
    pub fn read_group_desc(&self, group: GroupNumber) -> Result<Ext2GroupDesc> {
        if group.0 >= self.sb.groups_count() {
            return Err(Ext2Error::InvalidArgument(format!(
                "group {group} out of range (groups_count={})",
                self.sb.groups_count()
            )));
        }
        let block = self.sb.group_desc_block(group).0;
        let offset = self
            .sb
            .group_desc_offset(group)
            .ok_or_else(|| Ext2Error::corruption(block, "group descriptor offset overflow"))?;

        let mut buf = [0_u8; EXT2_GROUP_DESC_SIZE];
        self.dev
            .read_exact_at(offset, &mut buf)
            .map_err(|e| short_read_to_corruption(e, block))?;
        Ext2GroupDesc::parse_from_bytes(&buf).map_err(|e| parse_to_ext2_error(&e, block))
    }

    fn check_inode_number(&self, ino: InodeNumber) -> Result<()> {
        if ino.is_none() || ino.0 >= self.sb.inodes_count {
            return Err(Ext2Error::InvalidArgument(format!(
                "inode {ino} out of range (inodes_count={})",
                self.sb.inodes_count
            )));
        }
        Ok(())
    }

    /// Read an inode by number.
    ///
    /// Inode 0 and numbers at or above `inodes_count` are rejected before any
    /// I/O. An unused slot (link count 0) is `NotFound`.
    pub fn read_inode(&self, ino: InodeNumber) -> Result<Ext2Inode> {
        self.read_inode_with_desc(ino).map(|(_, inode)| inode)
    }

    /// Read an inode together with the descriptor of the group holding it.
    pub fn read_inode_with_desc(&self, ino: InodeNumber) -> Result<(Ext2GroupDesc, Ext2Inode)> {
        self.check_inode_number(ino)?;
        let loc = self.sb.locate_inode(ino).ok_or_else(|| {
            warn!(ino = ino.0, "inodes_per_group is zero");
            Ext2Error::corruption(1, "s_inodes_per_group is zero")
        })?;
        let gd = self.read_group_desc(loc.group)?;

        let table = u64::from(gd.inode_table);
        if table == 0 || gd.inode_table >= self.sb.blocks_count {
            warn!(group = loc.group.0, inode_table = table, "inode table outside image");
            return Err(Ext2Error::corruption(
                self.sb.group_desc_block(loc.group).0,
                format!("group {} inode table {table} outside image", loc.group),
            ));
        }
        let offset = loc
            .device_offset(gd.inode_table, self.block_size)
            .ok_or_else(|| Ext2Error::corruption(table, "inode offset overflow"))?;
        let record_block = offset / u64::from(self.block_size.get());

        let mut buf = vec![0_u8; usize::from(self.sb.inode_size)];
        self.dev
            .read_exact_at(offset, &mut buf)
            .map_err(|e| short_read_to_corruption(e, record_block))?;
        let inode =
            Ext2Inode::parse_from_bytes(&buf).map_err(|e| parse_to_ext2_error(&e, record_block))?;

        trace!(
            ino = ino.0,
            group = loc.group.0,
            offset,
            mode = inode.mode,
            size = inode.size,
            links = inode.links_count,
            "read_inode"
        );

        if !inode.is_in_use() {
            return Err(Ext2Error::NotFound(format!("inode {ino} is not in use")));
        }
        Ok((gd, inode))
    }

    /// Read one data block into `buf` (exactly one block long).
    ///
    /// Short reads surface as `Ext2Error::Io`.
    pub fn read_block_into(&self, block: BlockNumber, buf: &mut [u8]) -> Result<()> {
        read_block_into(&*self.dev, self.block_size, block, buf)
    }

    /// Open a block iterator over `ino`'s logical blocks.
    pub fn block_iter(&self, ino: InodeNumber) -> Result<BlockIter<'_>> {
        BlockIter::new(self, ino)
    }

    /// Physical blocks of `ino` in logical order.
    pub fn collect_blocks(&self, ino: InodeNumber) -> Result<Vec<BlockNumber>> {
        self.block_iter(ino)?.collect()
    }
}

/// A device short read on a metadata record means the image is truncated.
fn short_read_to_corruption(err: Ext2Error, block: u64) -> Ext2Error {
    match err {
        Ext2Error::Io(io) if io.kind() == io::ErrorKind::UnexpectedEof => {
            warn!(block, error = %io, "metadata short read");
            Ext2Error::corruption(block, format!("truncated metadata: {io}"))
        }
        other => other,
    }
}

/// Convert a `ParseError` on live metadata into `Ext2Error::Corruption`.
///
/// This is the crate-boundary conversion described in the `e2r-error`
/// error taxonomy.
fn parse_to_ext2_error(e: &ParseError, block: u64) -> Ext2Error {
    warn!(block, error = %e, "corrupt metadata");
    Ext2Error::corruption(block, e.to_string())
}
