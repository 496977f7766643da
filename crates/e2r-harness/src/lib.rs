#![forbid(unsafe_code)]
//! Test support for e2r: synthetic images, read-counting devices and
//! sparse JSON conformance fixtures.

mod device;
mod image;

pub use device::CountingByteDevice;
pub use image::{BuiltImage, IMAGE_TIMESTAMP, ImageBuilder, InodeLayout};

use anyhow::{Context, Result, bail};
use e2r_ondisk::{Ext2DirEntry, Ext2GroupDesc, Ext2Inode, Ext2Superblock, parse_dir_block};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct SparseFixture {
    pub size: usize,
    pub writes: Vec<FixtureWrite>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FixtureWrite {
    pub offset: usize,
    pub hex: String,
}

/// Expand a sparse fixture (`size` zero bytes plus hex patches) into bytes.
pub fn load_sparse_fixture(path: &Path) -> Result<Vec<u8>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read fixture {}", path.display()))?;
    let fixture: SparseFixture = serde_json::from_str(&text)
        .with_context(|| format!("invalid fixture json {}", path.display()))?;

    let mut bytes = vec![0_u8; fixture.size];
    for write in fixture.writes {
        let payload = hex::decode(write.hex)
            .with_context(|| format!("invalid hex at offset {}", write.offset))?;

        let end = write
            .offset
            .checked_add(payload.len())
            .context("fixture offset overflow")?;
        if end > bytes.len() {
            bail!(
                "fixture write out of bounds: offset={} payload={} size={}",
                write.offset,
                payload.len(),
                bytes.len()
            );
        }

        bytes[write.offset..end].copy_from_slice(&payload);
    }

    Ok(bytes)
}

pub fn validate_superblock_fixture(path: &Path) -> Result<Ext2Superblock> {
    let data = load_sparse_fixture(path)?;
    let sb = Ext2Superblock::parse_superblock_region(&data)
        .with_context(|| format!("failed superblock parse for fixture {}", path.display()))?;
    sb.validate_geometry()
        .with_context(|| format!("invalid geometry in fixture {}", path.display()))?;
    Ok(sb)
}

pub fn validate_group_desc_fixture(path: &Path) -> Result<Ext2GroupDesc> {
    let data = load_sparse_fixture(path)?;
    Ext2GroupDesc::parse_from_bytes(&data)
        .with_context(|| format!("failed group desc parse for fixture {}", path.display()))
}

pub fn validate_inode_fixture(path: &Path) -> Result<Ext2Inode> {
    let data = load_sparse_fixture(path)?;
    Ext2Inode::parse_from_bytes(&data)
        .with_context(|| format!("failed inode parse for fixture {}", path.display()))
}

/// Parse the live entries of a directory block fixture, scanning `limit`
/// bytes.
pub fn validate_dir_block_fixture(path: &Path, limit: usize) -> Result<Vec<Ext2DirEntry>> {
    let data = load_sparse_fixture(path)?;
    let (entries, _consumed) = parse_dir_block(&data, limit)
        .with_context(|| format!("failed dir block parse for fixture {}", path.display()))?;
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_path(rel: &str) -> std::path::PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .parent()
            .and_then(Path::parent)
            .expect("workspace root")
            .join("conformance")
            .join("fixtures")
            .join(rel)
    }

    #[test]
    fn superblock_fixture_parses() {
        let sb = validate_superblock_fixture(&fixture_path("ext2_superblock_1k.json"))
            .expect("superblock fixture");
        assert_eq!(sb.block_size, 1024);
        assert_eq!(sb.inodes_count, 64);
    }

    #[test]
    fn out_of_bounds_write_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{"size": 4, "writes": [{"offset": 2, "hex": "aabbcc"}]}"#)
            .expect("write fixture");
        let err = load_sparse_fixture(&path).expect_err("oob");
        assert!(err.to_string().contains("out of bounds"), "{err:#}");
    }

    #[test]
    fn bad_hex_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("hex.json");
        fs::write(&path, r#"{"size": 4, "writes": [{"offset": 0, "hex": "zz"}]}"#)
            .expect("write fixture");
        assert!(load_sparse_fixture(&path).is_err());
    }
}
