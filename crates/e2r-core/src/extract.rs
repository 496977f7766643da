//! Copying file content to a positioned sink.

use crate::Ext2Fs;
use crate::blkiter::BlockIter;
use crate::path::PathExpect;
use e2r_error::{Ext2Error, Result};
use e2r_types::InodeNumber;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use tracing::debug;

/// Destination for extracted bytes.
///
/// `offset` is relative to the start of the requested window. Returning fewer
/// bytes than `buf.len()` aborts the copy.
pub trait ContentSink {
    fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize>;
}

impl<S: ContentSink + ?Sized> ContentSink for &mut S {
    fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize> {
        (**self).write_at(buf, offset)
    }
}

/// Grows as needed; gaps are zero-filled.
impl ContentSink for Vec<u8> {
    fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize> {
        let start = usize::try_from(offset)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset overflows usize"))?;
        let end = start
            .checked_add(buf.len())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "write end overflows"))?;
        if self.len() < end {
            self.resize(end, 0);
        }
        self[start..end].copy_from_slice(buf);
        Ok(buf.len())
    }
}

/// Positioned writes into a file.
#[derive(Debug)]
pub struct FileSink {
    file: File,
}

impl FileSink {
    #[must_use]
    pub fn new(file: File) -> Self {
        Self { file }
    }

    #[must_use]
    pub fn into_inner(self) -> File {
        self.file
    }
}

impl ContentSink for FileSink {
    fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize> {
        FileExt::write_at(&self.file, buf, offset)
    }
}

/// Adapter for a closure `(buf, offset) -> written`.
pub struct FnSink<F>(pub F);

impl<F> ContentSink for FnSink<F>
where
    F: FnMut(&[u8], u64) -> io::Result<usize>,
{
    fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize> {
        (self.0)(buf, offset)
    }
}

/// Byte window `[offset, offset + length)` within a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteWindow {
    pub offset: u64,
    pub length: u64,
}

impl ByteWindow {
    #[must_use]
    pub fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    /// Intersect with `[0, size)`, returning `(start, end)`.
    #[must_use]
    pub fn clamp(self, size: u64) -> (u64, u64) {
        let start = self.offset.min(size);
        let end = self.offset.saturating_add(self.length).min(size);
        (start, end.max(start))
    }
}

impl Ext2Fs {
    /// Copy the bytes of `ino` inside `window` (the whole file if `None`)
    /// to `sink`. Returns the number of bytes written.
    ///
    /// Blocks wholly before the window are skipped without being read and
    /// the walk stops after the window ends.
    pub fn copy_inode(
        &self,
        ino: InodeNumber,
        sink: &mut dyn ContentSink,
        window: Option<ByteWindow>,
    ) -> Result<u64> {
        let (gd, inode) = self.read_inode_with_desc(ino)?;
        let size = inode.size_bytes();
        let (start, end) = window.map_or((0, size), |w| w.clamp(size));
        if start >= end {
            return Ok(0);
        }

        if let Some(target) = inode.fast_symlink_target() {
            // start < end <= size <= 60
            write_chunk(sink, &target[start as usize..end as usize], 0)?;
            debug!(ino = ino.0, start, end, "copied inline symlink target");
            return Ok(end - start);
        }

        let bs = u64::from(self.block_size().get());
        let mut buf = vec![0_u8; self.block_size().as_usize()];
        let mut iter = BlockIter::from_inode(self, ino, inode, gd);
        let mut logical = 0_u64;
        let mut written = 0_u64;

        while let Some(block) = iter.next_block()? {
            let block_start = logical * bs;
            let block_end = (block_start + bs).min(size);
            logical += 1;
            if block_end <= start {
                continue;
            }
            if block_start >= end {
                break;
            }

            self.read_block_into(block, &mut buf)?;
            let lo = start.max(block_start);
            let hi = end.min(block_end);
            // both bounds lie within one block
            let chunk = &buf[(lo - block_start) as usize..(hi - block_start) as usize];
            write_chunk(sink, chunk, lo - start)?;
            written += hi - lo;

            if hi >= end {
                break;
            }
        }

        debug!(ino = ino.0, start, end, written, "copied inode content");
        Ok(written)
    }

    /// Resolve `path` to a non-directory and copy its content.
    pub fn copy_path(
        &self,
        path: &str,
        sink: &mut dyn ContentSink,
        window: Option<ByteWindow>,
    ) -> Result<u64> {
        let ino = self.resolve_path(path, PathExpect::File)?;
        self.copy_inode(ino, sink, window)
    }

    /// Whole content of `ino`.
    pub fn read_file(&self, ino: InodeNumber) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.copy_inode(ino, &mut out, None)?;
        Ok(out)
    }

    /// Up to `length` bytes of `ino` starting at `offset`.
    pub fn read_range(&self, ino: InodeNumber, offset: u64, length: u64) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.copy_inode(ino, &mut out, Some(ByteWindow::new(offset, length)))?;
        Ok(out)
    }
}

fn write_chunk(sink: &mut dyn ContentSink, chunk: &[u8], offset: u64) -> Result<()> {
    let n = sink.write_at(chunk, offset)?;
    if n != chunk.len() {
        return Err(Ext2Error::Io(io::Error::new(
            io::ErrorKind::WriteZero,
            format!("short sink write at {offset}: {n} of {} bytes", chunk.len()),
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_clamps_to_size() {
        assert_eq!(ByteWindow::new(0, 10).clamp(100), (0, 10));
        assert_eq!(ByteWindow::new(90, 50).clamp(100), (90, 100));
        assert_eq!(ByteWindow::new(150, 10).clamp(100), (100, 100));
        assert_eq!(ByteWindow::new(5, u64::MAX).clamp(100), (5, 100));
        assert_eq!(ByteWindow::new(0, 0).clamp(100), (0, 0));
    }

    #[test]
    fn vec_sink_zero_fills_gaps() {
        let mut sink: Vec<u8> = Vec::new();
        assert_eq!(sink.write_at(b"cd", 2).expect("write"), 2);
        assert_eq!(sink, b"\0\0cd");
        sink.write_at(b"ab", 0).expect("write");
        assert_eq!(sink, b"abcd");
    }

    #[test]
    fn short_sink_write_is_io() {
        let mut sink =
            FnSink(|buf: &[u8], _offset: u64| -> io::Result<usize> { Ok(buf.len() / 2) });
        let err = write_chunk(&mut sink, b"abcd", 0).expect_err("short");
        assert!(matches!(err, Ext2Error::Io(ref e) if e.kind() == io::ErrorKind::WriteZero));

        let mut failing =
            FnSink(|_: &[u8], _: u64| -> io::Result<usize> { Err(io::Error::other("disk full")) });
        assert!(matches!(
            write_chunk(&mut failing, b"x", 0),
            Err(Ext2Error::Io(_))
        ));
    }

    #[test]
    fn file_sink_writes_at_offset() {
        let file = tempfile::tempfile().expect("tempfile");
        let mut sink = FileSink::new(file);
        sink.write_at(b"xyz", 4).expect("write");
        let file = sink.into_inner();
        let mut buf = [0_u8; 7];
        FileExt::read_exact_at(&file, &mut buf, 0).expect("read");
        assert_eq!(&buf, b"\0\0\0\0xyz");
    }
}
