//! Sequential walk over the physical blocks of one inode.

use crate::Ext2Fs;
use crate::resolver::{BlockResolver, Resolution};
use e2r_error::Result;
use e2r_ondisk::{Ext2GroupDesc, Ext2Inode};
use e2r_types::{BlockNumber, InodeNumber};

/// Iterator lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterState {
    Active,
    Done,
}

/// Sequential cursor over the physical blocks of one inode.
///
/// Owns the inode, its group descriptor and the indirect cache; all are
/// released when the iterator is dropped. Yields exactly
/// `ceil(size / block_size)` blocks in logical order. The first error ends
/// the iteration.
#[derive(Debug)]
pub struct BlockIter<'fs> {
    fs: &'fs Ext2Fs,
    ino: InodeNumber,
    inode: Ext2Inode,
    group_desc: Ext2GroupDesc,
    resolver: BlockResolver,
    position: u64,
    state: IterState,
}

impl<'fs> BlockIter<'fs> {
    pub fn new(fs: &'fs Ext2Fs, ino: InodeNumber) -> Result<Self> {
        let (group_desc, inode) = fs.read_inode_with_desc(ino)?;
        Ok(Self::from_inode(fs, ino, inode, group_desc))
    }

    /// Iterate an inode that the caller already loaded.
    #[must_use]
    pub fn from_inode(
        fs: &'fs Ext2Fs,
        ino: InodeNumber,
        inode: Ext2Inode,
        group_desc: Ext2GroupDesc,
    ) -> Self {
        Self {
            fs,
            ino,
            inode,
            group_desc,
            resolver: BlockResolver::new(fs.block_size(), fs.superblock().blocks_count),
            position: 0,
            state: IterState::Active,
        }
    }

    /// Advance to the next physical block, or `None` past the end.
    pub fn next_block(&mut self) -> Result<Option<BlockNumber>> {
        if self.state == IterState::Done {
            return Ok(None);
        }
        let resolved = self
            .resolver
            .resolve(self.fs.device(), &self.inode, self.position);
        match resolved {
            Ok(Resolution::More(block)) => {
                self.position += 1;
                Ok(Some(block))
            }
            Ok(Resolution::Last(block)) => {
                self.position += 1;
                self.state = IterState::Done;
                Ok(Some(block))
            }
            Ok(Resolution::OutOfRange) => {
                self.state = IterState::Done;
                Ok(None)
            }
            Err(e) => {
                self.state = IterState::Done;
                Err(e)
            }
        }
    }

    #[must_use]
    pub fn ino(&self) -> InodeNumber {
        self.ino
    }

    #[must_use]
    pub fn inode(&self) -> &Ext2Inode {
        &self.inode
    }

    #[must_use]
    pub fn group_desc(&self) -> &Ext2GroupDesc {
        &self.group_desc
    }

    /// Logical index of the next block to be yielded.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    #[must_use]
    pub fn state(&self) -> IterState {
        self.state
    }

    /// Indirect blocks read so far by this iterator.
    #[must_use]
    pub fn indirect_reads(&self) -> u64 {
        self.resolver.cache().misses()
    }
}

impl Iterator for BlockIter<'_> {
    type Item = Result<BlockNumber>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_block().transpose()
    }
}
