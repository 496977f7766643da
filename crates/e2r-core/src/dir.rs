//! Directory enumeration over an inode's data blocks.

use crate::blkiter::BlockIter;
use crate::{Ext2Fs, parse_to_ext2_error};
use e2r_error::{Ext2Error, Result};
use e2r_ondisk::{DirBlockIter, Ext2DirEntry};
use e2r_types::InodeNumber;
use std::ops::ControlFlow;

impl Ext2Fs {
    /// Visit the live entries of directory `ino` in on-disk order.
    ///
    /// Scanning stops once the bytes consumed (tombstones included) reach the
    /// directory size, even in the middle of a block. The visitor can stop
    /// early by returning `ControlFlow::Break`. Each call starts a fresh scan.
    pub fn visit_dir<F>(&self, ino: InodeNumber, mut visit: F) -> Result<()>
    where
        F: FnMut(Ext2DirEntry) -> ControlFlow<()>,
    {
        let (gd, inode) = self.read_inode_with_desc(ino)?;
        if !inode.is_dir() {
            return Err(Ext2Error::NotDirectory);
        }

        let block_len = self.block_size().as_usize();
        let mut remaining = inode.size_bytes();
        let mut buf = vec![0_u8; block_len];
        let mut iter = BlockIter::from_inode(self, ino, inode, gd);

        while remaining > 0 {
            let Some(block) = iter.next_block()? else {
                break;
            };
            self.read_block_into(block, &mut buf)?;

            let limit = usize::try_from(remaining).unwrap_or(usize::MAX).min(block_len);
            let mut records = DirBlockIter::new(&buf, limit);
            for entry in records.by_ref() {
                let entry = entry.map_err(|e| parse_to_ext2_error(&e, block.0))?;
                if visit(entry).is_break() {
                    return Ok(());
                }
            }
            remaining = remaining.saturating_sub(records.consumed() as u64);
        }
        Ok(())
    }

    /// All live entries of directory `ino`, `.` and `..` included.
    pub fn read_dir(&self, ino: InodeNumber) -> Result<Vec<Ext2DirEntry>> {
        let mut entries = Vec::new();
        self.visit_dir(ino, |entry| {
            entries.push(entry);
            ControlFlow::Continue(())
        })?;
        Ok(entries)
    }

    /// Find `name` in directory `dir`, stopping at the first match.
    pub fn lookup_name(&self, dir: InodeNumber, name: &[u8]) -> Result<Option<Ext2DirEntry>> {
        let mut found = None;
        self.visit_dir(dir, |entry| {
            if entry.name == name {
                found = Some(entry);
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })?;
        Ok(found)
    }
}
