#![forbid(unsafe_code)]
//! On-disk format parsing for ext2 structures.
//!
//! Pure parsing crate: no I/O, no side effects. Parses byte slices into
//! typed Rust structures representing the ext2 superblock, block group
//! descriptors, inodes with their block pointer arrays, and linked-list
//! directory records.

pub mod dir;
pub mod ext2;

pub use dir::{
    DirBlockIter, DirEntryHeader, Ext2DirEntry, Ext2FileType, iter_dir_block, parse_dir_block,
};
pub use ext2::{Ext2GroupDesc, Ext2Inode, Ext2Superblock, InodeLocation};
