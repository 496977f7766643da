#![forbid(unsafe_code)]
//! Read-only block I/O layer.
//!
//! Provides the `ByteDevice` trait with positioned-read semantics, a
//! file-backed implementation, an in-memory implementation, and a block-sized
//! read helper. Nothing here keeps a shared cursor, so a device can be read
//! from several threads at once.

use e2r_error::{Ext2Error, Result};
use e2r_types::{BlockNumber, BlockSize, EXT2_SUPERBLOCK_OFFSET, EXT2_SUPERBLOCK_SIZE};
use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::Arc;
use tracing::trace;

/// Byte-addressed device for fixed-offset reads (pread semantics).
pub trait ByteDevice: Send + Sync {
    /// Total length in bytes.
    fn len_bytes(&self) -> u64;

    /// Read exactly `buf.len()` bytes from `offset` into `buf`.
    ///
    /// A range extending past the end of the device fails with
    /// `Ext2Error::Io` of kind `UnexpectedEof`.
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;
}

impl<D: ByteDevice + ?Sized> ByteDevice for Arc<D> {
    fn len_bytes(&self) -> u64 {
        (**self).len_bytes()
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        (**self).read_exact_at(offset, buf)
    }
}

impl<D: ByteDevice + ?Sized> ByteDevice for Box<D> {
    fn len_bytes(&self) -> u64 {
        (**self).len_bytes()
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        (**self).read_exact_at(offset, buf)
    }
}

/// Check `[offset, offset + len)` against a device of `device_len` bytes.
fn check_range(offset: u64, len: usize, device_len: u64) -> Result<()> {
    let end = u64::try_from(len)
        .ok()
        .and_then(|len| offset.checked_add(len))
        .ok_or_else(|| {
            Ext2Error::InvalidArgument(format!("read range overflows: offset={offset} len={len}"))
        })?;
    if end > device_len {
        return Err(Ext2Error::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("short read: offset={offset} len={len} device_len={device_len}"),
        )));
    }
    Ok(())
}

/// File-backed byte device using `pread`-style I/O.
///
/// This uses `std::os::unix::fs::FileExt`, which is thread-safe and does not
/// require a shared seek position. The file is opened read-only.
#[derive(Debug, Clone)]
pub struct FileByteDevice {
    file: Arc<File>,
    len: u64,
}

impl FileByteDevice {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_file(file)
    }

    pub fn from_file(file: File) -> Result<Self> {
        let len = file.metadata()?.len();
        Ok(Self {
            file: Arc::new(file),
            len,
        })
    }
}

impl ByteDevice for FileByteDevice {
    fn len_bytes(&self) -> u64 {
        self.len
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_range(offset, buf.len(), self.len)?;
        self.file.read_exact_at(buf, offset)?;
        Ok(())
    }
}

/// In-memory byte device over an owned image.
#[derive(Debug, Clone)]
pub struct MemoryByteDevice {
    bytes: Arc<[u8]>,
}

impl MemoryByteDevice {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Arc::from(bytes),
        }
    }
}

impl ByteDevice for MemoryByteDevice {
    fn len_bytes(&self) -> u64 {
        u64::try_from(self.bytes.len()).unwrap_or(u64::MAX)
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_range(offset, buf.len(), self.len_bytes())?;
        let start = usize::try_from(offset)
            .map_err(|_| Ext2Error::InvalidArgument(format!("offset {offset} overflows usize")))?;
        buf.copy_from_slice(&self.bytes[start..start + buf.len()]);
        Ok(())
    }
}

/// Read the ext2 superblock region (1024 bytes at offset 1024).
pub fn read_superblock_region(dev: &dyn ByteDevice) -> Result<[u8; EXT2_SUPERBLOCK_SIZE]> {
    let mut buf = [0_u8; EXT2_SUPERBLOCK_SIZE];
    dev.read_exact_at(EXT2_SUPERBLOCK_OFFSET as u64, &mut buf)?;
    Ok(buf)
}

/// Read one whole block into `buf`, which must be exactly one block long.
pub fn read_block_into(
    dev: &dyn ByteDevice,
    block_size: BlockSize,
    block: BlockNumber,
    buf: &mut [u8],
) -> Result<()> {
    if buf.len() != block_size.as_usize() {
        return Err(Ext2Error::InvalidArgument(format!(
            "block buffer size mismatch: got={} expected={block_size}",
            buf.len()
        )));
    }
    let offset = block.to_byte_offset(block_size).ok_or_else(|| {
        Ext2Error::corruption(block.0, "block offset overflows u64")
    })?;
    trace!(block = block.0, offset = offset.0, "read_block");
    dev.read_exact_at(offset.0, buf)
}
