use e2r_types::{
    BlockNumber, BlockSize, EXT2_DIND_BLOCK, EXT2_FAST_SYMLINK_MAX, EXT2_GOOD_OLD_FIRST_INO,
    EXT2_GOOD_OLD_INODE_SIZE, EXT2_GOOD_OLD_REV, EXT2_GROUP_DESC_SIZE, EXT2_IND_BLOCK,
    EXT2_N_BLOCKS, EXT2_NDIR_BLOCKS, EXT2_SUPER_MAGIC, EXT2_SUPERBLOCK_SIZE, EXT2_TIND_BLOCK,
    GroupNumber, InodeNumber, ParseError, S_IFBLK, S_IFCHR, S_IFDIR, S_IFIFO, S_IFLNK, S_IFMT,
    S_IFREG, S_IFSOCK, ext2_block_size_from_log, inode_index_in_group, inode_to_group, read_fixed,
    read_le_u16, read_le_u32, trim_nul_padded,
};
use serde::{Deserialize, Serialize};

// ── Superblock ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ext2Superblock {
    // ── Core geometry ────────────────────────────────────────────────────
    pub inodes_count: u32,
    pub blocks_count: u32,
    pub reserved_blocks_count: u32,
    pub free_blocks_count: u32,
    pub free_inodes_count: u32,
    pub first_data_block: u32,
    pub log_block_size: u32,
    pub block_size: u32,
    pub blocks_per_group: u32,
    pub inodes_per_group: u32,
    /// Effective inode record size (128 on revision 0 images).
    pub inode_size: u16,
    pub first_ino: u32,

    // ── Identity ─────────────────────────────────────────────────────────
    pub magic: u16,
    pub uuid: [u8; 16],
    pub volume_name: String,
    pub last_mounted: String,

    // ── Revision & OS ────────────────────────────────────────────────────
    pub rev_level: u32,
    pub minor_rev_level: u16,
    pub creator_os: u32,

    // ── State & error tracking ───────────────────────────────────────────
    pub state: u16,
    pub errors: u16,
    pub mnt_count: u16,
    pub max_mnt_count: u16,

    // ── Timestamps ───────────────────────────────────────────────────────
    pub mtime: u32,
    pub wtime: u32,
    pub lastcheck: u32,
}

impl Ext2Superblock {
    /// Parse an ext2 superblock from a 1024-byte superblock region.
    pub fn parse_superblock_region(region: &[u8]) -> Result<Self, ParseError> {
        if region.len() < EXT2_SUPERBLOCK_SIZE {
            return Err(ParseError::InsufficientData {
                needed: EXT2_SUPERBLOCK_SIZE,
                offset: 0,
                actual: region.len(),
            });
        }

        let magic = read_le_u16(region, 0x38)?;
        if magic != EXT2_SUPER_MAGIC {
            return Err(ParseError::InvalidMagic {
                expected: u64::from(EXT2_SUPER_MAGIC),
                actual: u64::from(magic),
            });
        }

        let log_block_size = read_le_u32(region, 0x18)?;
        let Some(block_size) = ext2_block_size_from_log(log_block_size) else {
            return Err(ParseError::InvalidField {
                field: "s_log_block_size",
                reason: "invalid shift",
            });
        };

        let rev_level = read_le_u32(region, 0x4C)?;
        let (inode_size, first_ino) = if rev_level == EXT2_GOOD_OLD_REV {
            (EXT2_GOOD_OLD_INODE_SIZE, EXT2_GOOD_OLD_FIRST_INO)
        } else {
            (read_le_u16(region, 0x58)?, read_le_u32(region, 0x54)?)
        };

        Ok(Self {
            inodes_count: read_le_u32(region, 0x00)?,
            blocks_count: read_le_u32(region, 0x04)?,
            reserved_blocks_count: read_le_u32(region, 0x08)?,
            free_blocks_count: read_le_u32(region, 0x0C)?,
            free_inodes_count: read_le_u32(region, 0x10)?,
            first_data_block: read_le_u32(region, 0x14)?,
            log_block_size,
            block_size,
            blocks_per_group: read_le_u32(region, 0x20)?,
            inodes_per_group: read_le_u32(region, 0x28)?,
            inode_size,
            first_ino,

            magic,
            uuid: read_fixed::<16>(region, 0x68)?,
            volume_name: trim_nul_padded(&read_fixed::<16>(region, 0x78)?),
            last_mounted: trim_nul_padded(&read_fixed::<64>(region, 0x88)?),

            rev_level,
            minor_rev_level: read_le_u16(region, 0x3E)?,
            creator_os: read_le_u32(region, 0x48)?,

            state: read_le_u16(region, 0x3A)?,
            errors: read_le_u16(region, 0x3C)?,
            mnt_count: read_le_u16(region, 0x34)?,
            max_mnt_count: read_le_u16(region, 0x36)?,

            mtime: read_le_u32(region, 0x2C)?,
            wtime: read_le_u32(region, 0x30)?,
            lastcheck: read_le_u32(region, 0x40)?,
        })
    }

    /// Validated block size.
    pub fn block_size(&self) -> Result<BlockSize, ParseError> {
        BlockSize::new(self.block_size)
    }

    /// Number of block groups in this filesystem.
    #[must_use]
    pub fn groups_count(&self) -> u32 {
        if self.blocks_per_group == 0 {
            return 0;
        }
        let data_blocks = self.blocks_count.saturating_sub(self.first_data_block);
        data_blocks.div_ceil(self.blocks_per_group)
    }

    /// Validate the geometry fields the reader depends on.
    pub fn validate_geometry(&self) -> Result<(), ParseError> {
        self.block_size()?;

        if self.inodes_count == 0 {
            return Err(ParseError::InvalidField {
                field: "s_inodes_count",
                reason: "cannot be zero",
            });
        }
        if self.blocks_per_group == 0 {
            return Err(ParseError::InvalidField {
                field: "s_blocks_per_group",
                reason: "cannot be zero",
            });
        }
        if self.inodes_per_group == 0 {
            return Err(ParseError::InvalidField {
                field: "s_inodes_per_group",
                reason: "cannot be zero",
            });
        }
        let bitmap_capacity = self.block_size.saturating_mul(8);
        if self.blocks_per_group > bitmap_capacity {
            return Err(ParseError::InvalidField {
                field: "s_blocks_per_group",
                reason: "exceeds block_size * 8 (block bitmap capacity)",
            });
        }
        if self.inodes_per_group > bitmap_capacity {
            return Err(ParseError::InvalidField {
                field: "s_inodes_per_group",
                reason: "exceeds block_size * 8 (inode bitmap capacity)",
            });
        }

        if self.inode_size < EXT2_GOOD_OLD_INODE_SIZE {
            return Err(ParseError::InvalidField {
                field: "s_inode_size",
                reason: "must be >= 128",
            });
        }
        if !self.inode_size.is_power_of_two() {
            return Err(ParseError::InvalidField {
                field: "s_inode_size",
                reason: "must be a power of two",
            });
        }
        if u32::from(self.inode_size) > self.block_size {
            return Err(ParseError::InvalidField {
                field: "s_inode_size",
                reason: "inode_size exceeds block_size",
            });
        }

        let expected_first_data_block = u32::from(self.block_size == 1024);
        if self.first_data_block != expected_first_data_block {
            return Err(ParseError::InvalidField {
                field: "s_first_data_block",
                reason: "must be 1 for 1K blocks and 0 otherwise",
            });
        }
        if self.blocks_count <= self.first_data_block {
            return Err(ParseError::InvalidField {
                field: "s_blocks_count",
                reason: "no data blocks",
            });
        }

        Ok(())
    }

    /// Compute the byte offset of a group descriptor within the descriptor table.
    ///
    /// The table starts at byte 2048 for 1K blocks (the block after the
    /// superblock) and at the start of block 1 for larger blocks.
    #[must_use]
    pub fn group_desc_offset(&self, group: GroupNumber) -> Option<u64> {
        let gdt_start_block = if self.block_size == 1024 { 2_u64 } else { 1_u64 };
        let gdt_start_byte = gdt_start_block.checked_mul(u64::from(self.block_size))?;
        let desc_offset = u64::from(group.0).checked_mul(EXT2_GROUP_DESC_SIZE as u64)?;
        gdt_start_byte.checked_add(desc_offset)
    }

    /// Block holding the descriptor for `group`, for corruption reports.
    #[must_use]
    pub fn group_desc_block(&self, group: GroupNumber) -> BlockNumber {
        let offset = self.group_desc_offset(group).unwrap_or(0);
        BlockNumber(offset / u64::from(self.block_size.max(1)))
    }

    /// Locate an inode: its group, slot within the group, and byte offset
    /// inside the group's inode table.
    ///
    /// `None` when `inodes_per_group` is zero, which only an unvalidated
    /// superblock can hold.
    #[must_use]
    pub fn locate_inode(&self, ino: InodeNumber) -> Option<InodeLocation> {
        let group = inode_to_group(ino, self.inodes_per_group)?;
        let index = inode_index_in_group(ino, self.inodes_per_group)?;
        let offset_in_table = u64::from(index) * u64::from(self.inode_size);
        Some(InodeLocation {
            group,
            index,
            offset_in_table,
        })
    }
}

/// Where an inode record lives relative to its group's inode table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InodeLocation {
    pub group: GroupNumber,
    pub index: u32,
    pub offset_in_table: u64,
}

impl InodeLocation {
    /// Absolute byte offset of the record, given the inode table's first block.
    #[must_use]
    pub fn device_offset(&self, inode_table: u32, block_size: BlockSize) -> Option<u64> {
        u64::from(inode_table)
            .checked_mul(u64::from(block_size.get()))?
            .checked_add(self.offset_in_table)
    }
}

// ── Block group descriptor ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ext2GroupDesc {
    pub block_bitmap: u32,
    pub inode_bitmap: u32,
    pub inode_table: u32,
    pub free_blocks_count: u16,
    pub free_inodes_count: u16,
    pub used_dirs_count: u16,
}

impl Ext2GroupDesc {
    pub fn parse_from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < EXT2_GROUP_DESC_SIZE {
            return Err(ParseError::InsufficientData {
                needed: EXT2_GROUP_DESC_SIZE,
                offset: 0,
                actual: bytes.len(),
            });
        }

        Ok(Self {
            block_bitmap: read_le_u32(bytes, 0x00)?,
            inode_bitmap: read_le_u32(bytes, 0x04)?,
            inode_table: read_le_u32(bytes, 0x08)?,
            free_blocks_count: read_le_u16(bytes, 0x0C)?,
            free_inodes_count: read_le_u16(bytes, 0x0E)?,
            used_dirs_count: read_le_u16(bytes, 0x10)?,
        })
    }
}

// ── Inode ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ext2Inode {
    pub mode: u16,
    pub uid: u16,
    pub gid: u16,
    /// Lower 32 bits of the file size; the only size field this reader honors.
    pub size: u32,
    pub links_count: u16,
    /// Allocated 512-byte sectors.
    pub sectors: u32,
    pub flags: u32,
    pub generation: u32,
    pub file_acl: u32,

    // ── Timestamps (seconds) ─────────────────────────────────────────────
    pub atime: u32,
    pub ctime: u32,
    pub mtime: u32,
    pub dtime: u32,

    // ── Block map ────────────────────────────────────────────────────────
    pub direct: [u32; EXT2_NDIR_BLOCKS],
    pub single_indirect: u32,
    pub double_indirect: u32,
    pub triple_indirect: u32,
}

impl Ext2Inode {
    /// Parse an ext2 inode from raw bytes (at least 128).
    pub fn parse_from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        let base = usize::from(EXT2_GOOD_OLD_INODE_SIZE);
        if bytes.len() < base {
            return Err(ParseError::InsufficientData {
                needed: base,
                offset: 0,
                actual: bytes.len(),
            });
        }

        let mut block = [0_u32; EXT2_N_BLOCKS];
        for (i, slot) in block.iter_mut().enumerate() {
            *slot = read_le_u32(bytes, 0x28 + i * 4)?;
        }
        let mut direct = [0_u32; EXT2_NDIR_BLOCKS];
        direct.copy_from_slice(&block[..EXT2_NDIR_BLOCKS]);

        Ok(Self {
            mode: read_le_u16(bytes, 0x00)?,
            uid: read_le_u16(bytes, 0x02)?,
            size: read_le_u32(bytes, 0x04)?,
            atime: read_le_u32(bytes, 0x08)?,
            ctime: read_le_u32(bytes, 0x0C)?,
            mtime: read_le_u32(bytes, 0x10)?,
            dtime: read_le_u32(bytes, 0x14)?,
            gid: read_le_u16(bytes, 0x18)?,
            links_count: read_le_u16(bytes, 0x1A)?,
            sectors: read_le_u32(bytes, 0x1C)?,
            flags: read_le_u32(bytes, 0x20)?,
            direct,
            single_indirect: block[EXT2_IND_BLOCK],
            double_indirect: block[EXT2_DIND_BLOCK],
            triple_indirect: block[EXT2_TIND_BLOCK],
            generation: read_le_u32(bytes, 0x64)?,
            file_acl: read_le_u32(bytes, 0x68)?,
        })
    }

    /// Size in bytes as used for block accounting.
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        u64::from(self.size)
    }

    /// `ceil(size / block_size)`: logical blocks holding file content.
    /// Zero for a fast symlink, whose block map holds the target text.
    #[must_use]
    pub fn used_blocks(&self, block_size: BlockSize) -> u64 {
        if self.is_fast_symlink() {
            return 0;
        }
        block_size.blocks_for_bytes(self.size_bytes())
    }

    /// A slot with a zero link count is unused.
    #[must_use]
    pub fn is_in_use(&self) -> bool {
        self.links_count != 0
    }

    // ── File type detection ─────────────────────────────────────────────

    /// Extract the file type bits from the mode field.
    #[must_use]
    pub fn file_type_mode(&self) -> u16 {
        self.mode & S_IFMT
    }

    #[must_use]
    pub fn is_regular(&self) -> bool {
        self.file_type_mode() == S_IFREG
    }

    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.file_type_mode() == S_IFDIR
    }

    #[must_use]
    pub fn is_symlink(&self) -> bool {
        self.file_type_mode() == S_IFLNK
    }

    #[must_use]
    pub fn is_chrdev(&self) -> bool {
        self.file_type_mode() == S_IFCHR
    }

    #[must_use]
    pub fn is_blkdev(&self) -> bool {
        self.file_type_mode() == S_IFBLK
    }

    #[must_use]
    pub fn is_fifo(&self) -> bool {
        self.file_type_mode() == S_IFIFO
    }

    #[must_use]
    pub fn is_socket(&self) -> bool {
        self.file_type_mode() == S_IFSOCK
    }

    // ── Symlink helpers ─────────────────────────────────────────────────

    /// A symlink whose target (at most 60 bytes) lives in `i_block`.
    #[must_use]
    pub fn is_fast_symlink(&self) -> bool {
        self.is_symlink() && self.size_bytes() <= EXT2_FAST_SYMLINK_MAX as u64
    }

    /// Inline target of a fast symlink, `None` for anything else.
    #[must_use]
    pub fn fast_symlink_target(&self) -> Option<Vec<u8>> {
        if !self.is_fast_symlink() {
            return None;
        }
        let slots = self
            .direct
            .iter()
            .chain([&self.single_indirect, &self.double_indirect, &self.triple_indirect]);
        let mut target: Vec<u8> = slots.flat_map(|slot| slot.to_le_bytes()).collect();
        target.truncate(usize::try_from(self.size).ok()?);
        Some(target)
    }

    /// Permission bits (lower 12 bits of mode).
    #[must_use]
    pub fn permission_bits(&self) -> u16 {
        self.mode & 0o7777
    }

    /// Seconds since the epoch as `SystemTime`.
    #[must_use]
    pub fn to_system_time(secs: u32) -> std::time::SystemTime {
        std::time::UNIX_EPOCH + std::time::Duration::from_secs(u64::from(secs))
    }

    #[must_use]
    pub fn atime_system_time(&self) -> std::time::SystemTime {
        Self::to_system_time(self.atime)
    }

    #[must_use]
    pub fn mtime_system_time(&self) -> std::time::SystemTime {
        Self::to_system_time(self.mtime)
    }

    #[must_use]
    pub fn ctime_system_time(&self) -> std::time::SystemTime {
        Self::to_system_time(self.ctime)
    }
}
