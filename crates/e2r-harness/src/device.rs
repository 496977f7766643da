use e2r_block::ByteDevice;
use e2r_error::Result;
use e2r_types::BlockSize;
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
struct ReadStats {
    total: u64,
    by_offset: HashMap<u64, u32>,
}

/// Wraps a device and records every read by starting offset.
///
/// Share it through an `Arc` so the counts stay visible after the
/// filesystem takes ownership of its device handle.
pub struct CountingByteDevice<D> {
    inner: D,
    stats: Mutex<ReadStats>,
}

impl<D: ByteDevice> CountingByteDevice<D> {
    #[must_use]
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            stats: Mutex::new(ReadStats::default()),
        }
    }

    /// Reads issued so far, failed ones included.
    #[must_use]
    pub fn total_reads(&self) -> u64 {
        self.stats.lock().total
    }

    /// Reads that started at `offset`.
    #[must_use]
    pub fn reads_at(&self, offset: u64) -> u32 {
        self.stats.lock().by_offset.get(&offset).copied().unwrap_or(0)
    }

    /// Reads that started at the first byte of `block`.
    #[must_use]
    pub fn reads_of_block(&self, block: u32, block_size: BlockSize) -> u32 {
        self.reads_at(u64::from(block) * u64::from(block_size.get()))
    }

    pub fn reset(&self) {
        let mut stats = self.stats.lock();
        stats.total = 0;
        stats.by_offset.clear();
    }
}

impl<D> std::fmt::Debug for CountingByteDevice<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountingByteDevice")
            .field("total_reads", &self.stats.lock().total)
            .finish_non_exhaustive()
    }
}

impl<D: ByteDevice> ByteDevice for CountingByteDevice<D> {
    fn len_bytes(&self) -> u64 {
        self.inner.len_bytes()
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        {
            let mut stats = self.stats.lock();
            stats.total += 1;
            *stats.by_offset.entry(offset).or_insert(0) += 1;
        }
        self.inner.read_exact_at(offset, buf)
    }
}
