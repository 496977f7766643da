//! Synthetic ext2 images.
//!
//! [`ImageBuilder`] lays out a single-block-group image: boot area,
//! superblock, descriptor table, block and inode bitmaps, inode table, then
//! data and indirect blocks allocated sequentially in inode order. The
//! resulting [`BuiltImage`] remembers where every inode's data landed so
//! tests can compare reader output against the layout, independent of the
//! reader's own block mapping.

use crate::device::CountingByteDevice;
use anyhow::{Context, Result, bail, ensure};
use e2r_block::MemoryByteDevice;
use e2r_core::{Ext2Fs, OpenOptions};
use e2r_ondisk::Ext2FileType;
use e2r_types::{
    BlockSize, EXT2_DIR_ENTRY_HEADER_LEN, EXT2_DYNAMIC_REV, EXT2_FAST_SYMLINK_MAX,
    EXT2_GOOD_OLD_FIRST_INO, EXT2_GOOD_OLD_INODE_SIZE, EXT2_GOOD_OLD_REV, EXT2_NAME_LEN,
    EXT2_NDIR_BLOCKS, EXT2_SUPER_MAGIC, EXT2_SUPERBLOCK_OFFSET, EXT2_VALID_FS, InodeNumber,
    S_IFDIR, S_IFLNK, S_IFMT, S_IFREG,
};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Timestamp stamped on every inode and the superblock.
pub const IMAGE_TIMESTAMP: u32 = 1_700_000_000;

fn align4(n: usize) -> usize {
    (n + 3) & !3
}

fn required_rec_len(name_len: usize) -> usize {
    align4(EXT2_DIR_ENTRY_HEADER_LEN + name_len)
}

fn put_u16(buf: &mut [u8], off: usize, value: u16) {
    buf[off..off + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut [u8], off: usize, value: u32) {
    buf[off..off + 4].copy_from_slice(&value.to_le_bytes());
}

fn set_bit(bitmap: &mut [u8], bit: usize) {
    bitmap[bit / 8] |= 1 << (bit % 8);
}

// ── Tree model ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct DirRecord {
    /// 0 marks a tombstone.
    ino: u32,
    name: Vec<u8>,
    file_type: Ext2FileType,
}

#[derive(Debug, Clone)]
enum NodeKind {
    Dir { parent: u32, records: Vec<DirRecord> },
    File { content: Vec<u8> },
    /// Target held in the block-map slots, no data blocks.
    InlineSymlink { target: Vec<u8> },
    Special,
}

#[derive(Debug, Clone)]
struct Node {
    mode: u16,
    links: u16,
    kind: NodeKind,
}

fn file_type_of(mode: u16) -> Ext2FileType {
    match mode & S_IFMT {
        S_IFREG => Ext2FileType::RegFile,
        S_IFDIR => Ext2FileType::Dir,
        e2r_types::S_IFCHR => Ext2FileType::Chrdev,
        e2r_types::S_IFBLK => Ext2FileType::Blkdev,
        e2r_types::S_IFIFO => Ext2FileType::Fifo,
        e2r_types::S_IFSOCK => Ext2FileType::Sock,
        e2r_types::S_IFLNK => Ext2FileType::Symlink,
        _ => Ext2FileType::Unknown,
    }
}

/// Builder for single-group ext2 images.
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    block_size: u32,
    inodes_count: u32,
    inode_size: u16,
    rev_level: u32,
    volume_name: String,
    typed_entries: bool,
    spare_blocks: u32,
    nodes: BTreeMap<u32, Node>,
    next_ino: u32,
}

impl ImageBuilder {
    /// An empty filesystem with just the root directory.
    ///
    /// Defaults: 64 inodes of 128 bytes, revision 1, typed directory
    /// entries, 16 spare blocks after the last allocated one.
    #[must_use]
    pub fn new(block_size: u32) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            InodeNumber::ROOT.0,
            Node {
                mode: S_IFDIR | 0o755,
                links: 2,
                kind: NodeKind::Dir {
                    parent: InodeNumber::ROOT.0,
                    records: Vec::new(),
                },
            },
        );
        Self {
            block_size,
            inodes_count: 64,
            inode_size: EXT2_GOOD_OLD_INODE_SIZE,
            rev_level: EXT2_DYNAMIC_REV,
            volume_name: String::from("e2r-test"),
            typed_entries: true,
            spare_blocks: 16,
            nodes,
            next_ino: EXT2_GOOD_OLD_FIRST_INO,
        }
    }

    #[must_use]
    pub fn inodes_count(mut self, count: u32) -> Self {
        self.inodes_count = count;
        self
    }

    /// On-disk inode record size; ignored for revision 0 images.
    #[must_use]
    pub fn inode_size(mut self, size: u16) -> Self {
        self.inode_size = size;
        self
    }

    #[must_use]
    pub fn revision(mut self, rev_level: u32) -> Self {
        self.rev_level = rev_level;
        self
    }

    #[must_use]
    pub fn volume_name(mut self, name: &str) -> Self {
        self.volume_name = name.to_owned();
        self
    }

    /// When false, every directory record carries type indicator 0.
    #[must_use]
    pub fn typed_entries(mut self, typed: bool) -> Self {
        self.typed_entries = typed;
        self
    }

    #[must_use]
    pub fn spare_blocks(mut self, count: u32) -> Self {
        self.spare_blocks = count;
        self
    }

    fn effective_inode_size(&self) -> u16 {
        if self.rev_level == EXT2_GOOD_OLD_REV {
            EXT2_GOOD_OLD_INODE_SIZE
        } else {
            self.inode_size
        }
    }

    fn allocate_ino(&mut self) -> Result<u32> {
        let ino = self.next_ino;
        ensure!(
            ino < self.inodes_count,
            "out of inodes: next={ino} inodes_count={}",
            self.inodes_count
        );
        self.next_ino += 1;
        Ok(ino)
    }

    fn link(&mut self, parent: u32, name: &str, ino: u32, mode: u16) -> Result<()> {
        let name = name.as_bytes();
        ensure!(
            !name.is_empty() && name.len() <= EXT2_NAME_LEN && !name.contains(&b'/'),
            "invalid entry name {:?}",
            String::from_utf8_lossy(name)
        );
        let node = self
            .nodes
            .get_mut(&parent)
            .with_context(|| format!("parent inode {parent} does not exist"))?;
        let NodeKind::Dir { records, .. } = &mut node.kind else {
            bail!("parent inode {parent} is not a directory");
        };
        if records.iter().any(|r| r.ino != 0 && r.name == name) {
            bail!(
                "entry {:?} already exists in inode {parent}",
                String::from_utf8_lossy(name)
            );
        }
        records.push(DirRecord {
            ino,
            name: name.to_vec(),
            file_type: file_type_of(mode),
        });
        if mode & S_IFMT == S_IFDIR {
            node.links += 1;
        }
        Ok(())
    }

    /// Create directory `name` inside `parent`; returns its inode number.
    pub fn add_dir(&mut self, parent: u32, name: &str) -> Result<u32> {
        let ino = self.allocate_ino()?;
        let mode = S_IFDIR | 0o755;
        self.link(parent, name, ino, mode)?;
        self.nodes.insert(
            ino,
            Node {
                mode,
                links: 2,
                kind: NodeKind::Dir {
                    parent,
                    records: Vec::new(),
                },
            },
        );
        Ok(ino)
    }

    /// Create regular file `name` inside `parent` holding `content`.
    pub fn add_file(&mut self, parent: u32, name: &str, content: &[u8]) -> Result<u32> {
        let ino = self.allocate_ino()?;
        let mode = S_IFREG | 0o644;
        self.link(parent, name, ino, mode)?;
        self.nodes.insert(
            ino,
            Node {
                mode,
                links: 1,
                kind: NodeKind::File {
                    content: content.to_vec(),
                },
            },
        );
        Ok(ino)
    }

    /// Create symlink `name` inside `parent` pointing at `target`.
    ///
    /// Targets up to 60 bytes are stored inline in the block map; longer ones
    /// get a data block like a regular file.
    pub fn add_symlink(&mut self, parent: u32, name: &str, target: &str) -> Result<u32> {
        let ino = self.allocate_ino()?;
        let mode = S_IFLNK | 0o777;
        self.link(parent, name, ino, mode)?;
        let target = target.as_bytes().to_vec();
        let kind = if target.len() <= EXT2_FAST_SYMLINK_MAX {
            NodeKind::InlineSymlink { target }
        } else {
            NodeKind::File { content: target }
        };
        self.nodes.insert(
            ino,
            Node {
                mode,
                links: 1,
                kind,
            },
        );
        Ok(ino)
    }

    /// Create a data-less inode (FIFO, socket, device) with the given mode.
    pub fn add_special(&mut self, parent: u32, name: &str, mode: u16) -> Result<u32> {
        let ino = self.allocate_ino()?;
        self.link(parent, name, ino, mode)?;
        self.nodes.insert(
            ino,
            Node {
                mode,
                links: 1,
                kind: NodeKind::Special,
            },
        );
        Ok(ino)
    }

    /// Turn the entry `name` of `parent` into a tombstone.
    ///
    /// The record keeps its length and stale name; only the inode field is
    /// cleared. A file left without links is dropped from the inode table.
    pub fn unlink(&mut self, parent: u32, name: &str) -> Result<()> {
        let node = self
            .nodes
            .get_mut(&parent)
            .with_context(|| format!("parent inode {parent} does not exist"))?;
        let NodeKind::Dir { records, .. } = &mut node.kind else {
            bail!("parent inode {parent} is not a directory");
        };
        let record = records
            .iter_mut()
            .find(|r| r.ino != 0 && r.name == name.as_bytes())
            .with_context(|| format!("no entry {name:?} in inode {parent}"))?;
        let child = std::mem::replace(&mut record.ino, 0);

        let child_node = self
            .nodes
            .get_mut(&child)
            .with_context(|| format!("dangling entry {name:?}"))?;
        ensure!(
            !matches!(child_node.kind, NodeKind::Dir { .. }),
            "unlinking directories is not supported"
        );
        child_node.links -= 1;
        if child_node.links == 0 {
            self.nodes.remove(&child);
        }
        Ok(())
    }

    // ── Layout ──────────────────────────────────────────────────────────

    fn encode_dir(&self, ino: u32, parent: u32, records: &[DirRecord]) -> Result<Vec<u8>> {
        let bs = self.block_size as usize;
        let dot = [
            DirRecord {
                ino,
                name: b".".to_vec(),
                file_type: Ext2FileType::Dir,
            },
            DirRecord {
                ino: parent,
                name: b"..".to_vec(),
                file_type: Ext2FileType::Dir,
            },
        ];

        let mut out = Vec::new();
        let mut block = vec![0_u8; bs];
        let mut offset = 0_usize;
        let mut last = 0_usize;

        for record in dot.iter().chain(records) {
            let need = required_rec_len(record.name.len());
            if offset + need > bs {
                put_u16(&mut block, last + 4, u16::try_from(bs - last)?);
                out.append(&mut block);
                block = vec![0_u8; bs];
                offset = 0;
            }
            let file_type = if self.typed_entries {
                record.file_type as u8
            } else {
                0
            };
            put_u32(&mut block, offset, record.ino);
            put_u16(&mut block, offset + 4, u16::try_from(need)?);
            block[offset + 6] = u8::try_from(record.name.len())?;
            block[offset + 7] = file_type;
            block[offset + 8..offset + 8 + record.name.len()].copy_from_slice(&record.name);
            last = offset;
            offset += need;
        }
        put_u16(&mut block, last + 4, u16::try_from(bs - last)?);
        out.append(&mut block);
        Ok(out)
    }

    /// Lay out the image.
    pub fn build(&self) -> Result<BuiltImage> {
        let block_size = BlockSize::new(self.block_size).context("invalid block size")?;
        let bs = block_size.as_usize();
        let p = block_size.pointers_per_block();
        let inode_size = self.effective_inode_size();
        ensure!(
            self.inodes_count > InodeNumber::ROOT.0 && self.inodes_count <= self.block_size * 8,
            "inodes_count {} does not fit one group",
            self.inodes_count
        );

        let first_data_block = u32::from(self.block_size == 1024);
        let gdt_block = first_data_block + 1;
        let block_bitmap = gdt_block + 1;
        let inode_bitmap = block_bitmap + 1;
        let inode_table = inode_bitmap + 1;
        let table_bytes = u64::from(self.inodes_count) * u64::from(inode_size);
        let table_blocks = u32::try_from(block_size.blocks_for_bytes(table_bytes))?;

        let mut alloc = Allocator {
            next: inode_table + table_blocks,
            pointers_per_block: p,
        };
        let mut payloads = BTreeMap::new();
        let mut layouts = BTreeMap::new();
        for (&ino, node) in &self.nodes {
            let payload = match &node.kind {
                NodeKind::Dir { parent, records } => self.encode_dir(ino, *parent, records)?,
                NodeKind::File { content } => content.clone(),
                NodeKind::InlineSymlink { .. } | NodeKind::Special => Vec::new(),
            };
            let count = block_size.blocks_for_bytes(payload.len() as u64);
            let layout = alloc.map_blocks(count, payload.len() as u64)?;
            payloads.insert(ino, payload);
            layouts.insert(ino, layout);
        }

        let used_blocks = alloc.next;
        let blocks_count = used_blocks + self.spare_blocks;
        let blocks_per_group = self.block_size * 8;
        ensure!(
            blocks_count - first_data_block <= blocks_per_group,
            "image needs {blocks_count} blocks, more than one group holds"
        );

        let mut bytes = vec![0_u8; blocks_count as usize * bs];

        // data, indirect blocks and inode records
        for (&ino, node) in &self.nodes {
            let layout = &layouts[&ino];
            let payload = &payloads[&ino];
            for (i, &block) in layout.data_blocks.iter().enumerate() {
                let src = &payload[i * bs..payload.len().min((i + 1) * bs)];
                let dst = block as usize * bs;
                bytes[dst..dst + src.len()].copy_from_slice(src);
            }
            for (block, pointers) in &layout.pointer_blocks {
                let base = *block as usize * bs;
                for (i, &ptr) in pointers.iter().enumerate() {
                    put_u32(&mut bytes, base + i * 4, ptr);
                }
            }

            let off = inode_table as usize * bs + (ino as usize - 1) * usize::from(inode_size);
            let sectors = (layout.data_blocks.len() + layout.pointer_blocks.len()) * bs / 512;
            let size = match &node.kind {
                NodeKind::InlineSymlink { target } => target.len(),
                _ => payload.len(),
            };
            put_u16(&mut bytes, off, node.mode);
            put_u32(&mut bytes, off + 0x04, u32::try_from(size)?);
            put_u32(&mut bytes, off + 0x08, IMAGE_TIMESTAMP);
            put_u32(&mut bytes, off + 0x0C, IMAGE_TIMESTAMP);
            put_u32(&mut bytes, off + 0x10, IMAGE_TIMESTAMP);
            put_u16(&mut bytes, off + 0x1A, node.links);
            put_u32(&mut bytes, off + 0x1C, u32::try_from(sectors)?);
            for (slot, &ptr) in layout.block_map.iter().enumerate() {
                put_u32(&mut bytes, off + 0x28 + slot * 4, ptr);
            }
            if let NodeKind::InlineSymlink { target } = &node.kind {
                bytes[off + 0x28..off + 0x28 + target.len()].copy_from_slice(target);
            }
        }

        // bitmaps
        {
            let base = block_bitmap as usize * bs;
            for block in first_data_block..used_blocks {
                set_bit(&mut bytes[base..base + bs], (block - first_data_block) as usize);
            }
        }
        let used_inodes = {
            let base = inode_bitmap as usize * bs;
            let mut used = 0_u32;
            for ino in 1..=self.inodes_count {
                if ino < EXT2_GOOD_OLD_FIRST_INO || self.nodes.contains_key(&ino) {
                    set_bit(&mut bytes[base..base + bs], ino as usize - 1);
                    used += 1;
                }
            }
            used
        };
        let dirs = self
            .nodes
            .values()
            .filter(|n| matches!(n.kind, NodeKind::Dir { .. }))
            .count();

        // descriptor table
        let gd = gdt_block as usize * bs;
        put_u32(&mut bytes, gd, block_bitmap);
        put_u32(&mut bytes, gd + 0x04, inode_bitmap);
        put_u32(&mut bytes, gd + 0x08, inode_table);
        put_u16(&mut bytes, gd + 0x0C, u16::try_from(blocks_count - used_blocks)?);
        put_u16(
            &mut bytes,
            gd + 0x0E,
            u16::try_from(self.inodes_count - used_inodes)?,
        );
        put_u16(&mut bytes, gd + 0x10, u16::try_from(dirs)?);

        // superblock
        let sb = EXT2_SUPERBLOCK_OFFSET;
        put_u32(&mut bytes, sb, self.inodes_count);
        put_u32(&mut bytes, sb + 0x04, blocks_count);
        put_u32(&mut bytes, sb + 0x0C, blocks_count - used_blocks);
        put_u32(&mut bytes, sb + 0x10, self.inodes_count - used_inodes);
        put_u32(&mut bytes, sb + 0x14, first_data_block);
        put_u32(&mut bytes, sb + 0x18, block_size.shift() - 10);
        put_u32(&mut bytes, sb + 0x1C, block_size.shift() - 10);
        put_u32(&mut bytes, sb + 0x20, blocks_per_group);
        put_u32(&mut bytes, sb + 0x24, blocks_per_group);
        put_u32(&mut bytes, sb + 0x28, self.inodes_count);
        put_u32(&mut bytes, sb + 0x2C, IMAGE_TIMESTAMP);
        put_u32(&mut bytes, sb + 0x30, IMAGE_TIMESTAMP);
        put_u16(&mut bytes, sb + 0x36, 20);
        put_u16(&mut bytes, sb + 0x38, EXT2_SUPER_MAGIC);
        put_u16(&mut bytes, sb + 0x3A, EXT2_VALID_FS);
        put_u16(&mut bytes, sb + 0x3C, 1);
        put_u32(&mut bytes, sb + 0x40, IMAGE_TIMESTAMP);
        put_u32(&mut bytes, sb + 0x4C, self.rev_level);
        if self.rev_level != EXT2_GOOD_OLD_REV {
            put_u32(&mut bytes, sb + 0x54, EXT2_GOOD_OLD_FIRST_INO);
            put_u16(&mut bytes, sb + 0x58, inode_size);
        }
        for (i, b) in bytes[sb + 0x68..sb + 0x78].iter_mut().enumerate() {
            *b = 0xE2 ^ i as u8;
        }
        let name = self.volume_name.as_bytes();
        let name_len = name.len().min(16);
        bytes[sb + 0x78..sb + 0x78 + name_len].copy_from_slice(&name[..name_len]);

        Ok(BuiltImage {
            bytes,
            block_size,
            inode_table,
            inode_size,
            layouts,
        })
    }
}

struct Allocator {
    next: u32,
    pointers_per_block: u64,
}

impl Allocator {
    fn take(&mut self) -> u32 {
        let block = self.next;
        self.next += 1;
        block
    }

    /// Allocate one indirect block at `depth` (1 = holds data pointers) and
    /// everything below it, consuming up to `remaining` data blocks.
    fn tree(&mut self, depth: u32, remaining: &mut u64, layout: &mut InodeLayout) -> u32 {
        let block = self.take();
        let mut pointers = Vec::new();
        while *remaining > 0 && (pointers.len() as u64) < self.pointers_per_block {
            if depth == 1 {
                let data = self.take();
                layout.data_blocks.push(data);
                pointers.push(data);
                *remaining -= 1;
            } else {
                pointers.push(self.tree(depth - 1, remaining, layout));
            }
        }
        layout.pointer_blocks.push((block, pointers));
        block
    }

    fn map_blocks(&mut self, count: u64, size: u64) -> Result<InodeLayout> {
        let mut layout = InodeLayout {
            size,
            data_blocks: Vec::new(),
            pointer_blocks: Vec::new(),
            block_map: [0; 15],
        };
        let mut remaining = count;
        for slot in 0..EXT2_NDIR_BLOCKS {
            if remaining == 0 {
                break;
            }
            let block = self.take();
            layout.data_blocks.push(block);
            layout.block_map[slot] = block;
            remaining -= 1;
        }
        for (depth, slot) in [(1, 12), (2, 13), (3, 14)] {
            if remaining == 0 {
                break;
            }
            let root = self.tree(depth, &mut remaining, &mut layout);
            layout.block_map[slot] = root;
        }
        ensure!(remaining == 0, "file of {count} blocks exceeds the block map");
        Ok(layout)
    }
}

/// Where one inode's content was placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InodeLayout {
    pub size: u64,
    /// Data blocks in logical order.
    pub data_blocks: Vec<u32>,
    /// Indirect blocks and the pointers written into each.
    pub pointer_blocks: Vec<(u32, Vec<u32>)>,
    /// The inode's 15 block-map slots.
    pub block_map: [u32; 15],
}

impl InodeLayout {
    #[must_use]
    pub fn indirect_blocks(&self) -> Vec<u32> {
        self.pointer_blocks.iter().map(|(b, _)| *b).collect()
    }
}

/// A laid-out image plus the layout it was built from.
#[derive(Debug, Clone)]
pub struct BuiltImage {
    bytes: Vec<u8>,
    block_size: BlockSize,
    inode_table: u32,
    inode_size: u16,
    layouts: BTreeMap<u32, InodeLayout>,
}

impl BuiltImage {
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    #[must_use]
    pub fn block_size(&self) -> BlockSize {
        self.block_size
    }

    #[must_use]
    pub fn layout(&self, ino: u32) -> Option<&InodeLayout> {
        self.layouts.get(&ino)
    }

    #[must_use]
    pub fn device(&self) -> MemoryByteDevice {
        MemoryByteDevice::new(self.bytes.clone())
    }

    /// Open the image with default options.
    pub fn open(&self) -> e2r_error::Result<Ext2Fs> {
        Ext2Fs::from_device(Box::new(self.device()), &OpenOptions::default())
    }

    /// Open the image through a read-counting device.
    pub fn open_counting(
        &self,
    ) -> e2r_error::Result<(Ext2Fs, Arc<CountingByteDevice<MemoryByteDevice>>)> {
        let dev = Arc::new(CountingByteDevice::new(self.device()));
        let fs = Ext2Fs::from_device(Box::new(Arc::clone(&dev)), &OpenOptions::default())?;
        Ok((fs, dev))
    }

    /// Content of `ino` assembled straight from its recorded data blocks.
    #[must_use]
    pub fn reference_dump(&self, ino: u32) -> Option<Vec<u8>> {
        let layout = self.layouts.get(&ino)?;
        let bs = self.block_size.as_usize();
        let mut out = Vec::with_capacity(layout.data_blocks.len() * bs);
        for &block in &layout.data_blocks {
            let start = block as usize * bs;
            out.extend_from_slice(&self.bytes[start..start + bs]);
        }
        out.truncate(usize::try_from(layout.size).ok()?);
        Some(out)
    }

    /// Byte offset of `ino`'s inode record.
    #[must_use]
    pub fn inode_offset(&self, ino: u32) -> usize {
        self.inode_table as usize * self.block_size.as_usize()
            + (ino as usize - 1) * usize::from(self.inode_size)
    }

    #[must_use]
    pub fn block_offset(&self, block: u32) -> usize {
        block as usize * self.block_size.as_usize()
    }

    pub fn put_u16(&mut self, offset: usize, value: u16) {
        put_u16(&mut self.bytes, offset, value);
    }

    pub fn put_u32(&mut self, offset: usize, value: u32) {
        put_u32(&mut self.bytes, offset, value);
    }

    /// Overwrite block-map slot `slot` (0..15) of `ino`.
    pub fn set_block_pointer(&mut self, ino: u32, slot: usize, value: u32) {
        let off = self.inode_offset(ino) + 0x28 + slot * 4;
        self.put_u32(off, value);
    }

    /// Overwrite the size field of `ino`.
    pub fn set_inode_size(&mut self, ino: u32, size: u32) {
        let off = self.inode_offset(ino) + 0x04;
        self.put_u32(off, size);
    }

    /// Drop everything past `len` bytes.
    pub fn truncate(&mut self, len: usize) {
        self.bytes.truncate(len);
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, &self.bytes)
            .with_context(|| format!("failed to write image {}", path.display()))
    }
}
