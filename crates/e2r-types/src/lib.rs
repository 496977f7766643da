#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const EXT2_SUPERBLOCK_OFFSET: usize = 1024;
pub const EXT2_SUPERBLOCK_SIZE: usize = 1024;
pub const EXT2_SUPER_MAGIC: u16 = 0xEF53;

/// Inode record size implied by revision 0 images.
pub const EXT2_GOOD_OLD_INODE_SIZE: u16 = 128;
/// First non-reserved inode on revision 0 images.
pub const EXT2_GOOD_OLD_FIRST_INO: u32 = 11;
pub const EXT2_GOOD_OLD_REV: u32 = 0;
pub const EXT2_DYNAMIC_REV: u32 = 1;

/// On-disk size of one block group descriptor.
pub const EXT2_GROUP_DESC_SIZE: usize = 32;

/// Number of direct block pointers held in the inode.
pub const EXT2_NDIR_BLOCKS: usize = 12;
pub const EXT2_IND_BLOCK: usize = 12;
pub const EXT2_DIND_BLOCK: usize = 13;
pub const EXT2_TIND_BLOCK: usize = 14;
/// Total pointer slots in `i_block`.
pub const EXT2_N_BLOCKS: usize = 15;
/// Longest symlink target stored inline in `i_block`.
pub const EXT2_FAST_SYMLINK_MAX: usize = EXT2_N_BLOCKS * 4;

/// Size of one block pointer inside an indirect block.
pub const EXT2_BLOCK_POINTER_SIZE: u32 = 4;

/// Fixed directory record header: inode, rec_len, name_len, file_type.
pub const EXT2_DIR_ENTRY_HEADER_LEN: usize = 8;
pub const EXT2_NAME_LEN: usize = 255;

pub const EXT2_MIN_BLOCK_SIZE: u32 = 1024;
pub const EXT2_MAX_BLOCK_SIZE: u32 = 65536;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockNumber(pub u64);

/// ext2 inode number (u32, 1-indexed; 0 marks an unused directory record).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InodeNumber(pub u32);

/// Validated block size (must be a power of two in 1024..=65536).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockSize(u32);

impl BlockSize {
    /// Create a `BlockSize` if `value` is a power of two in [1024, 65536].
    pub fn new(value: u32) -> Result<Self, ParseError> {
        if !value.is_power_of_two()
            || !(EXT2_MIN_BLOCK_SIZE..=EXT2_MAX_BLOCK_SIZE).contains(&value)
        {
            return Err(ParseError::InvalidField {
                field: "block_size",
                reason: "must be power of two in 1024..=65536",
            });
        }
        Ok(Self(value))
    }

    #[must_use]
    pub fn get(self) -> u32 {
        self.0
    }

    /// Block size as `usize`, for buffer lengths.
    #[must_use]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Number of bits to shift to convert between bytes and blocks.
    #[must_use]
    pub fn shift(self) -> u32 {
        self.0.trailing_zeros()
    }

    /// Number of 32-bit block pointers that fit in one indirect block.
    #[must_use]
    pub fn pointers_per_block(self) -> u64 {
        u64::from(self.0 / EXT2_BLOCK_POINTER_SIZE)
    }

    /// Blocks needed to hold `size` bytes (`ceil(size / block_size)`).
    #[must_use]
    pub fn blocks_for_bytes(self, size: u64) -> u64 {
        size.div_ceil(u64::from(self.0))
    }
}

/// Block group index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupNumber(pub u32);

/// Byte offset on a `ByteDevice` (pread semantics).
///
/// This is a unit-carrying wrapper to prevent mixing bytes and blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ByteOffset(pub u64);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("insufficient data: need {needed} bytes at offset {offset}, got {actual}")]
    InsufficientData {
        needed: usize,
        offset: usize,
        actual: usize,
    },
    #[error("invalid magic: expected {expected:#x}, got {actual:#x}")]
    InvalidMagic { expected: u64, actual: u64 },
    #[error("invalid field: {field} ({reason})")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
}

#[inline]
pub fn ensure_slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8], ParseError> {
    let Some(end) = offset.checked_add(len) else {
        return Err(ParseError::InvalidField {
            field: "offset",
            reason: "overflow",
        });
    };

    if end > data.len() {
        return Err(ParseError::InsufficientData {
            needed: len,
            offset,
            actual: data.len().saturating_sub(offset),
        });
    }

    Ok(&data[offset..end])
}

#[inline]
pub fn read_u8(data: &[u8], offset: usize) -> Result<u8, ParseError> {
    let bytes = ensure_slice(data, offset, 1)?;
    Ok(bytes[0])
}

#[inline]
pub fn read_le_u16(data: &[u8], offset: usize) -> Result<u16, ParseError> {
    let bytes = ensure_slice(data, offset, 2)?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

#[inline]
pub fn read_le_u32(data: &[u8], offset: usize) -> Result<u32, ParseError> {
    let bytes = ensure_slice(data, offset, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[inline]
pub fn read_fixed<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N], ParseError> {
    let bytes = ensure_slice(data, offset, N)?;
    let mut out = [0_u8; N];
    out.copy_from_slice(bytes);
    Ok(out)
}

#[must_use]
pub fn trim_nul_padded(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim().to_owned()
}

/// `1024 << log_block_size`, or `None` if the shift overflows.
#[must_use]
pub fn ext2_block_size_from_log(log_block_size: u32) -> Option<u32> {
    let shift = 10_u32.checked_add(log_block_size)?;
    1_u32.checked_shl(shift)
}

impl fmt::Display for BlockNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for InodeNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for BlockSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for GroupNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl InodeNumber {
    /// Inode number 0 never names a file; directory records use it as a tombstone.
    pub const NONE: Self = Self(0);
    pub const ROOT: Self = Self(2);

    #[must_use]
    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

// ── POSIX file mode constants ────────────────────────────────────────────────

/// File type mask (upper 4 bits of mode).
pub const S_IFMT: u16 = 0o170_000;
/// Named pipe (FIFO).
pub const S_IFIFO: u16 = 0o010_000;
/// Character device.
pub const S_IFCHR: u16 = 0o020_000;
/// Directory.
pub const S_IFDIR: u16 = 0o040_000;
/// Block device.
pub const S_IFBLK: u16 = 0o060_000;
/// Regular file.
pub const S_IFREG: u16 = 0o100_000;
/// Symbolic link.
pub const S_IFLNK: u16 = 0o120_000;
/// Socket.
pub const S_IFSOCK: u16 = 0o140_000;

// ── Superblock state (s_state) ──────────────────────────────────────────────

pub const EXT2_VALID_FS: u16 = 0x0001;

// ── Checked arithmetic helpers ──────────────────────────────────────────────

impl BlockNumber {
    /// Convert this block number to its byte offset using the given block size.
    ///
    /// Returns `None` on overflow.
    #[must_use]
    pub fn to_byte_offset(self, block_size: BlockSize) -> Option<ByteOffset> {
        self.0
            .checked_mul(u64::from(block_size.get()))
            .map(ByteOffset)
    }
}

/// Compute the inode's block group from its inode number.
///
/// Inode numbers are 1-indexed; group assignment uses `(ino - 1) / inodes_per_group`.
/// `None` when `inodes_per_group` is zero.
#[must_use]
pub fn inode_to_group(ino: InodeNumber, inodes_per_group: u32) -> Option<GroupNumber> {
    ino.0.saturating_sub(1).checked_div(inodes_per_group).map(GroupNumber)
}

/// Compute the index of an inode within its block group.
#[must_use]
pub fn inode_index_in_group(ino: InodeNumber, inodes_per_group: u32) -> Option<u32> {
    ino.0.saturating_sub(1).checked_rem(inodes_per_group)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_helpers() {
        let bytes = [0x34_u8, 0x12, 0x78, 0x56, 0xEF, 0xCD, 0xAB, 0x90];
        assert_eq!(read_u8(&bytes, 1).expect("u8"), 0x12);
        assert_eq!(read_le_u16(&bytes, 0).expect("u16"), 0x1234);
        assert_eq!(read_le_u32(&bytes, 0).expect("u32"), 0x5678_1234);
        assert_eq!(read_le_u32(&bytes, 4).expect("u32"), 0x90AB_CDEF);
    }

    #[test]
    fn test_read_past_end_reports_shortfall() {
        let bytes = [0_u8; 6];
        let err = read_le_u32(&bytes, 4).expect_err("short");
        assert_eq!(
            err,
            ParseError::InsufficientData {
                needed: 4,
                offset: 4,
                actual: 2,
            }
        );
        assert!(matches!(
            ensure_slice(&bytes, usize::MAX, 2),
            Err(ParseError::InvalidField {
                field: "offset",
                ..
            })
        ));
    }

    #[test]
    fn test_trim_nul_padded() {
        let raw = b"e2r\0\0\0\0";
        assert_eq!(trim_nul_padded(raw), "e2r");
        assert_eq!(trim_nul_padded(b"\0\0"), "");
    }

    #[test]
    fn test_ext2_block_size_from_log() {
        assert_eq!(ext2_block_size_from_log(0), Some(1024));
        assert_eq!(ext2_block_size_from_log(2), Some(4096));
        assert_eq!(ext2_block_size_from_log(6), Some(65536));
        assert_eq!(ext2_block_size_from_log(22), None);
        assert_eq!(ext2_block_size_from_log(u32::MAX), None);
    }

    #[test]
    fn test_block_size_validation() {
        assert!(BlockSize::new(1024).is_ok());
        assert!(BlockSize::new(65536).is_ok());
        assert!(BlockSize::new(512).is_err());
        assert!(BlockSize::new(3000).is_err());
        assert!(BlockSize::new(131_072).is_err());
    }

    #[test]
    fn test_block_size_geometry() {
        let bs = BlockSize::new(1024).expect("bs");
        assert_eq!(bs.shift(), 10);
        assert_eq!(bs.pointers_per_block(), 256);
        assert_eq!(bs.blocks_for_bytes(0), 0);
        assert_eq!(bs.blocks_for_bytes(1), 1);
        assert_eq!(bs.blocks_for_bytes(1024), 1);
        assert_eq!(bs.blocks_for_bytes(1025), 2);

        let big = BlockSize::new(4096).expect("bs");
        assert_eq!(big.pointers_per_block(), 1024);
        assert_eq!(BlockNumber(u64::MAX).to_byte_offset(big), None);
    }

    #[test]
    fn test_inode_group_math() {
        assert_eq!(inode_to_group(InodeNumber(1), 64), Some(GroupNumber(0)));
        assert_eq!(inode_to_group(InodeNumber(64), 64), Some(GroupNumber(0)));
        assert_eq!(inode_to_group(InodeNumber(65), 64), Some(GroupNumber(1)));
        assert_eq!(inode_index_in_group(InodeNumber(2), 64), Some(1));
        assert_eq!(inode_index_in_group(InodeNumber(65), 64), Some(0));
        assert_eq!(inode_to_group(InodeNumber(2), 0), None);
        assert_eq!(inode_index_in_group(InodeNumber(2), 0), None);
    }

    #[test]
    fn test_inode_number_constants() {
        assert_eq!(InodeNumber::ROOT, InodeNumber(2));
        assert!(InodeNumber::NONE.is_none());
        assert!(!InodeNumber::ROOT.is_none());
        assert_eq!(InodeNumber::ROOT.to_string(), "2");
    }
}
