//! Logical-to-physical block mapping through the inode's block map.
//!
//! Logical block `n` of an inode lives in one of four ranges, with
//! `P = block_size / 4` pointers per indirect block:
//!
//! | Range | Path |
//! |-------|------|
//! | `[0, 12)` | `direct[n]` |
//! | `[12, 12 + P)` | single indirect |
//! | next `P²` | double indirect |
//! | next `P³` | triple indirect |
//!
//! Each level of indirection has one cached block. Sequential traversal
//! re-reads an indirect block only when the walk crosses into a new one.

use e2r_block::{ByteDevice, read_block_into};
use e2r_error::{Ext2Error, Result};
use e2r_ondisk::Ext2Inode;
use e2r_types::{BlockNumber, BlockSize, EXT2_NDIR_BLOCKS, read_le_u32};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

/// Outcome of resolving one logical block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    /// A data block with further blocks after it.
    More(BlockNumber),
    /// The final data block covered by the inode's size.
    Last(BlockNumber),
    /// The logical index is at or past the end of the file.
    OutOfRange,
}

impl Resolution {
    #[must_use]
    pub fn block(self) -> Option<BlockNumber> {
        match self {
            Self::More(b) | Self::Last(b) => Some(b),
            Self::OutOfRange => None,
        }
    }
}

/// Cache slot, named by distance from the data block.
///
/// `Single` holds a block of data pointers, `Double` a block of pointers to
/// `Single` blocks, `Triple` the inode's triple-indirect root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndirectLevel {
    Single,
    Double,
    Triple,
}

impl IndirectLevel {
    fn slot(self) -> usize {
        match self {
            Self::Single => 0,
            Self::Double => 1,
            Self::Triple => 2,
        }
    }
}

#[derive(Debug)]
struct CacheSlot {
    tag: Option<BlockNumber>,
    data: Vec<u8>,
}

/// One cached indirect block per level of indirection.
///
/// A slot's tag names the block its buffer holds. A failed read leaves the
/// tag cleared, so a stale buffer is never mistaken for the requested block.
#[derive(Debug)]
pub struct IndirectBlockCache {
    block_size: BlockSize,
    slots: [CacheSlot; 3],
    misses: u64,
}

impl IndirectBlockCache {
    #[must_use]
    pub fn new(block_size: BlockSize) -> Self {
        let slot = || CacheSlot {
            tag: None,
            data: vec![0_u8; block_size.as_usize()],
        };
        Self {
            block_size,
            slots: [slot(), slot(), slot()],
            misses: 0,
        }
    }

    /// Make `block` resident in `level`'s slot and return its bytes.
    pub fn get_or_load(
        &mut self,
        dev: &dyn ByteDevice,
        level: IndirectLevel,
        block: BlockNumber,
    ) -> Result<&[u8]> {
        let slot = &mut self.slots[level.slot()];
        if slot.tag != Some(block) {
            slot.tag = None;
            trace!(?level, block = block.0, "indirect cache miss");
            read_block_into(dev, self.block_size, block, &mut slot.data)?;
            slot.tag = Some(block);
            self.misses += 1;
        }
        Ok(&slot.data)
    }

    /// Pointer number `index` of indirect block `block`.
    pub fn pointer_at(
        &mut self,
        dev: &dyn ByteDevice,
        level: IndirectLevel,
        block: BlockNumber,
        index: u64,
    ) -> Result<u32> {
        let data = self.get_or_load(dev, level, block)?;
        let offset = usize::try_from(index)
            .ok()
            .and_then(|i| i.checked_mul(4))
            .ok_or_else(|| Ext2Error::corruption(block.0, "pointer index overflow"))?;
        read_le_u32(data, offset).map_err(|e| Ext2Error::corruption(block.0, e.to_string()))
    }

    /// Block currently held by `level`'s slot.
    #[must_use]
    pub fn cached_block(&self, level: IndirectLevel) -> Option<BlockNumber> {
        self.slots[level.slot()].tag
    }

    /// Indirect-block reads performed so far.
    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.tag = None;
        }
    }
}

/// Maps logical block indices of one inode to physical blocks.
#[derive(Debug)]
pub struct BlockResolver {
    block_size: BlockSize,
    blocks_count: u32,
    cache: IndirectBlockCache,
}

impl BlockResolver {
    #[must_use]
    pub fn new(block_size: BlockSize, blocks_count: u32) -> Self {
        Self {
            block_size,
            blocks_count,
            cache: IndirectBlockCache::new(block_size),
        }
    }

    #[must_use]
    pub fn cache(&self) -> &IndirectBlockCache {
        &self.cache
    }

    /// Resolve logical block `logical` of `inode`.
    ///
    /// Only `ceil(size / block_size)` blocks are in range. A zero pointer or
    /// one at or past `blocks_count` is corruption, including holes.
    pub fn resolve(
        &mut self,
        dev: &dyn ByteDevice,
        inode: &Ext2Inode,
        logical: u64,
    ) -> Result<Resolution> {
        let used = inode.used_blocks(self.block_size);
        if logical >= used {
            return Ok(Resolution::OutOfRange);
        }
        let block = self.map(dev, inode, logical)?;
        if logical + 1 == used {
            Ok(Resolution::Last(block))
        } else {
            Ok(Resolution::More(block))
        }
    }

    fn map(
        &mut self,
        dev: &dyn ByteDevice,
        inode: &Ext2Inode,
        logical: u64,
    ) -> Result<BlockNumber> {
        let p = self.block_size.pointers_per_block();
        let ndir = EXT2_NDIR_BLOCKS as u64;

        if logical < ndir {
            // logical < 12, so the cast cannot truncate
            return self.check(inode.direct[logical as usize], logical, "direct");
        }

        let mut idx = logical - ndir;
        if idx < p {
            let root = self.check(inode.single_indirect, logical, "single-indirect root")?;
            let ptr = self.cache.pointer_at(dev, IndirectLevel::Single, root, idx)?;
            return self.check(ptr, logical, "data");
        }

        idx -= p;
        if idx < p * p {
            let root = self.check(inode.double_indirect, logical, "double-indirect root")?;
            let mid = self.cache.pointer_at(dev, IndirectLevel::Double, root, idx / p)?;
            let mid = self.check(mid, logical, "single-indirect")?;
            let ptr = self.cache.pointer_at(dev, IndirectLevel::Single, mid, idx % p)?;
            return self.check(ptr, logical, "data");
        }

        idx -= p * p;
        if idx < p * p * p {
            let root = self.check(inode.triple_indirect, logical, "triple-indirect root")?;
            let upper = self
                .cache
                .pointer_at(dev, IndirectLevel::Triple, root, idx / (p * p))?;
            let upper = self.check(upper, logical, "double-indirect")?;
            let mid = self
                .cache
                .pointer_at(dev, IndirectLevel::Double, upper, (idx / p) % p)?;
            let mid = self.check(mid, logical, "single-indirect")?;
            let ptr = self.cache.pointer_at(dev, IndirectLevel::Single, mid, idx % p)?;
            return self.check(ptr, logical, "data");
        }

        warn!(logical, "logical block beyond triple-indirect range");
        Err(Ext2Error::corruption(
            u64::from(inode.triple_indirect),
            format!("logical block {logical} beyond triple-indirect range"),
        ))
    }

    fn check(&self, ptr: u32, logical: u64, what: &str) -> Result<BlockNumber> {
        if ptr == 0 || ptr >= self.blocks_count {
            warn!(
                logical,
                pointer = ptr,
                blocks_count = self.blocks_count,
                what,
                "bad block pointer"
            );
            return Err(Ext2Error::corruption(
                u64::from(ptr),
                format!(
                    "{what} pointer {ptr} for logical block {logical} outside image \
                     (blocks_count={})",
                    self.blocks_count
                ),
            ));
        }
        Ok(BlockNumber(u64::from(ptr)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use e2r_block::MemoryByteDevice;
    use e2r_types::S_IFREG;

    const BS: usize = 1024;
    const P: u64 = 256;

    fn inode(size: u32) -> Ext2Inode {
        Ext2Inode {
            mode: S_IFREG | 0o644,
            uid: 0,
            gid: 0,
            size,
            links_count: 1,
            sectors: 0,
            flags: 0,
            generation: 0,
            file_acl: 0,
            atime: 0,
            ctime: 0,
            mtime: 0,
            dtime: 0,
            direct: [0; EXT2_NDIR_BLOCKS],
            single_indirect: 0,
            double_indirect: 0,
            triple_indirect: 0,
        }
    }

    fn put_ptr(img: &mut [u8], block: usize, index: usize, value: u32) {
        let off = block * BS + index * 4;
        img[off..off + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn bs() -> BlockSize {
        BlockSize::new(1024).expect("bs")
    }

    #[test]
    fn direct_blocks_and_last_flag() {
        let dev = MemoryByteDevice::new(vec![0_u8; 64 * BS]);
        let mut ino = inode(3 * 1024 - 1);
        ino.direct[..3].copy_from_slice(&[40, 41, 42]);
        let mut r = BlockResolver::new(bs(), 64);

        assert_eq!(
            r.resolve(&dev, &ino, 0).expect("0"),
            Resolution::More(BlockNumber(40))
        );
        assert_eq!(
            r.resolve(&dev, &ino, 2).expect("2"),
            Resolution::Last(BlockNumber(42))
        );
        assert_eq!(r.resolve(&dev, &ino, 3).expect("3"), Resolution::OutOfRange);
        assert_eq!(r.cache().misses(), 0);
    }

    #[test]
    fn empty_file_is_out_of_range_at_zero() {
        let dev = MemoryByteDevice::new(vec![0_u8; 8 * BS]);
        let mut r = BlockResolver::new(bs(), 8);
        assert_eq!(
            r.resolve(&dev, &inode(0), 0).expect("0"),
            Resolution::OutOfRange
        );
    }

    #[test]
    fn single_indirect_reads_once_for_sequential_walk() {
        let mut img = vec![0_u8; 64 * BS];
        put_ptr(&mut img, 20, 0, 50);
        put_ptr(&mut img, 20, 1, 51);
        let dev = MemoryByteDevice::new(img);

        let mut ino = inode(14 * 1024);
        ino.direct = [30; EXT2_NDIR_BLOCKS];
        ino.single_indirect = 20;
        let mut r = BlockResolver::new(bs(), 64);

        assert_eq!(
            r.resolve(&dev, &ino, 12).expect("12"),
            Resolution::More(BlockNumber(50))
        );
        assert_eq!(
            r.resolve(&dev, &ino, 13).expect("13"),
            Resolution::Last(BlockNumber(51))
        );
        assert_eq!(r.cache().misses(), 1);
        assert_eq!(
            r.cache().cached_block(IndirectLevel::Single),
            Some(BlockNumber(20))
        );
    }

    #[test]
    fn double_indirect_path() {
        let mut img = vec![0_u8; 64 * BS];
        put_ptr(&mut img, 21, 0, 22);
        put_ptr(&mut img, 21, 1, 23);
        put_ptr(&mut img, 22, 0, 55);
        put_ptr(&mut img, 22, 255, 56);
        put_ptr(&mut img, 23, 0, 57);
        let dev = MemoryByteDevice::new(img);

        let first = 12 + P;
        let mut ino = inode(u32::try_from((first + P + 1) * 1024).expect("size"));
        ino.double_indirect = 21;
        let mut r = BlockResolver::new(bs(), 64);

        assert_eq!(r.resolve(&dev, &ino, first).expect("d0").block(), Some(BlockNumber(55)));
        assert_eq!(
            r.resolve(&dev, &ino, first + 255).expect("d255").block(),
            Some(BlockNumber(56))
        );
        assert_eq!(r.cache().misses(), 2);
        assert_eq!(
            r.resolve(&dev, &ino, first + P).expect("d256"),
            Resolution::Last(BlockNumber(57))
        );
        // crossing into the next leaf reloads only the single slot
        assert_eq!(r.cache().misses(), 3);
        assert_eq!(
            r.cache().cached_block(IndirectLevel::Double),
            Some(BlockNumber(21))
        );
    }

    #[test]
    fn triple_indirect_path() {
        let mut img = vec![0_u8; 64 * BS];
        put_ptr(&mut img, 24, 0, 25);
        put_ptr(&mut img, 25, 0, 26);
        put_ptr(&mut img, 26, 0, 60);
        put_ptr(&mut img, 26, 1, 61);
        let dev = MemoryByteDevice::new(img);

        let first = 12 + P + P * P;
        let mut ino = inode(u32::try_from((first + 2) * 1024).expect("size"));
        ino.triple_indirect = 24;
        let mut r = BlockResolver::new(bs(), 64);

        assert_eq!(
            r.resolve(&dev, &ino, first).expect("t0"),
            Resolution::More(BlockNumber(60))
        );
        assert_eq!(
            r.resolve(&dev, &ino, first + 1).expect("t1"),
            Resolution::Last(BlockNumber(61))
        );
        assert_eq!(r.cache().misses(), 3);
        assert_eq!(
            r.cache().cached_block(IndirectLevel::Triple),
            Some(BlockNumber(24))
        );
    }

    #[test]
    fn zero_and_out_of_image_pointers_are_corruption() {
        let mut img = vec![0_u8; 64 * BS];
        put_ptr(&mut img, 20, 0, 9999);
        let dev = MemoryByteDevice::new(img);
        let mut r = BlockResolver::new(bs(), 64);

        let hole = inode(1024);
        assert!(matches!(
            r.resolve(&dev, &hole, 0),
            Err(Ext2Error::Corruption { block: 0, .. })
        ));

        let mut past = inode(13 * 1024);
        past.direct = [30; EXT2_NDIR_BLOCKS];
        past.single_indirect = 20;
        assert!(matches!(
            r.resolve(&dev, &past, 12),
            Err(Ext2Error::Corruption { block: 9999, .. })
        ));

        let mut bad_root = inode(13 * 1024);
        bad_root.direct = [30; EXT2_NDIR_BLOCKS];
        bad_root.single_indirect = 64;
        assert!(matches!(
            r.resolve(&dev, &bad_root, 12),
            Err(Ext2Error::Corruption { block: 64, .. })
        ));
    }

    #[test]
    fn short_indirect_read_is_io_and_clears_tag() {
        // device ends before the indirect block that blocks_count allows
        let dev = MemoryByteDevice::new(vec![0_u8; 16 * BS]);
        let mut ino = inode(13 * 1024);
        ino.direct = [3; EXT2_NDIR_BLOCKS];
        ino.single_indirect = 40;
        let mut r = BlockResolver::new(bs(), 64);

        assert!(matches!(r.resolve(&dev, &ino, 12), Err(Ext2Error::Io(_))));
        assert_eq!(r.cache().cached_block(IndirectLevel::Single), None);
    }

    #[test]
    fn clear_drops_all_tags() {
        let mut cache = IndirectBlockCache::new(bs());
        let dev = MemoryByteDevice::new(vec![0_u8; 8 * BS]);
        cache
            .get_or_load(&dev, IndirectLevel::Double, BlockNumber(3))
            .expect("load");
        assert_eq!(cache.cached_block(IndirectLevel::Double), Some(BlockNumber(3)));
        cache.clear();
        assert_eq!(cache.cached_block(IndirectLevel::Double), None);
        assert_eq!(cache.misses(), 1);
    }
}
