//! Directory record parsing.
//!
//! A directory's data blocks hold a packed linked list of variable-length
//! records. Each record begins with an 8-byte header followed by the name.
//! Records never span a block boundary, and the directory size bounds how
//! many bytes of the final block are meaningful.

use e2r_types::{
    EXT2_DIR_ENTRY_HEADER_LEN, InodeNumber, ParseError, read_le_u16, read_le_u32, read_u8,
};
use serde::{Deserialize, Serialize};

/// File type indicator stored in directory records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Ext2FileType {
    Unknown = 0,
    RegFile = 1,
    Dir = 2,
    Chrdev = 3,
    Blkdev = 4,
    Fifo = 5,
    Sock = 6,
    Symlink = 7,
}

impl Ext2FileType {
    #[must_use]
    pub fn from_raw(val: u8) -> Self {
        match val {
            1 => Self::RegFile,
            2 => Self::Dir,
            3 => Self::Chrdev,
            4 => Self::Blkdev,
            5 => Self::Fifo,
            6 => Self::Sock,
            7 => Self::Symlink,
            _ => Self::Unknown,
        }
    }

    /// Single-letter tag used by directory listings: `f`, `d` or `o`.
    #[must_use]
    pub fn tag(self) -> char {
        match self {
            Self::RegFile => 'f',
            Self::Dir => 'd',
            _ => 'o',
        }
    }
}

/// The fixed 8-byte record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntryHeader {
    pub inode: u32,
    pub rec_len: u16,
    pub name_len: u8,
    pub file_type: u8,
}

impl DirEntryHeader {
    pub fn parse(block: &[u8], offset: usize) -> Result<Self, ParseError> {
        Ok(Self {
            inode: read_le_u32(block, offset)?,
            rec_len: read_le_u16(block, offset + 4)?,
            name_len: read_u8(block, offset + 6)?,
            file_type: read_u8(block, offset + 7)?,
        })
    }

    /// Check the record-length invariants: a multiple of 4 that covers the
    /// header and the name.
    pub fn validate(&self) -> Result<(), ParseError> {
        let rec_len = usize::from(self.rec_len);
        if rec_len % 4 != 0 {
            return Err(ParseError::InvalidField {
                field: "rec_len",
                reason: "not a multiple of 4",
            });
        }
        if rec_len < EXT2_DIR_ENTRY_HEADER_LEN + usize::from(self.name_len) {
            return Err(ParseError::InvalidField {
                field: "rec_len",
                reason: "shorter than header plus name",
            });
        }
        Ok(())
    }
}

/// A parsed directory entry with an owned name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ext2DirEntry {
    pub inode: InodeNumber,
    pub rec_len: u16,
    pub name_len: u8,
    pub file_type: Ext2FileType,
    pub name: Vec<u8>,
}

impl Ext2DirEntry {
    /// Return the name as a UTF-8 string (lossy).
    #[must_use]
    pub fn name_str(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }

    #[must_use]
    pub fn is_dot(&self) -> bool {
        self.name == b"."
    }

    #[must_use]
    pub fn is_dotdot(&self) -> bool {
        self.name == b".."
    }

    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.file_type == Ext2FileType::Dir
    }

    #[must_use]
    pub fn is_regular(&self) -> bool {
        self.file_type == Ext2FileType::RegFile
    }
}

/// Iterator over the live records of one directory block.
///
/// Only the first `limit` bytes of the block are scanned: the directory's
/// remaining size may end before the block does. Tombstones (inode 0) are
/// validated and skipped. Any malformed record ends iteration with an error.
#[derive(Debug)]
pub struct DirBlockIter<'a> {
    block: &'a [u8],
    limit: usize,
    offset: usize,
    done: bool,
}

impl<'a> DirBlockIter<'a> {
    #[must_use]
    pub fn new(block: &'a [u8], limit: usize) -> Self {
        Self {
            block,
            limit: limit.min(block.len()),
            offset: 0,
            done: false,
        }
    }

    /// Bytes of the block consumed so far, tombstones included.
    #[must_use]
    pub fn consumed(&self) -> usize {
        self.offset
    }

    fn fail(&mut self, err: ParseError) -> Option<Result<Ext2DirEntry, ParseError>> {
        self.done = true;
        Some(Err(err))
    }
}

impl Iterator for DirBlockIter<'_> {
    type Item = Result<Ext2DirEntry, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done || self.offset >= self.limit {
                return None;
            }

            let header = match DirEntryHeader::parse(self.block, self.offset) {
                Ok(h) => h,
                Err(e) => return self.fail(e),
            };
            if let Err(e) = header.validate() {
                return self.fail(e);
            }

            let entry_end = self.offset + usize::from(header.rec_len);
            if entry_end > self.block.len() {
                return self.fail(ParseError::InvalidField {
                    field: "rec_len",
                    reason: "record extends past block boundary",
                });
            }

            let start = self.offset;
            self.offset = entry_end;
            if header.inode == 0 {
                continue;
            }

            let name_start = start + EXT2_DIR_ENTRY_HEADER_LEN;
            let name = self.block[name_start..name_start + usize::from(header.name_len)].to_vec();
            return Some(Ok(Ext2DirEntry {
                inode: InodeNumber(header.inode),
                rec_len: header.rec_len,
                name_len: header.name_len,
                file_type: Ext2FileType::from_raw(header.file_type),
                name,
            }));
        }
    }
}

#[must_use]
pub fn iter_dir_block(block: &[u8], limit: usize) -> DirBlockIter<'_> {
    DirBlockIter::new(block, limit)
}

/// Parse the live entries in the first `limit` bytes of a directory block.
///
/// Returns the entries and the number of bytes consumed.
pub fn parse_dir_block(
    block: &[u8],
    limit: usize,
) -> Result<(Vec<Ext2DirEntry>, usize), ParseError> {
    let mut iter = DirBlockIter::new(block, limit);
    let mut entries = Vec::new();
    for entry in iter.by_ref() {
        entries.push(entry?);
    }
    Ok((entries, iter.consumed()))
}
