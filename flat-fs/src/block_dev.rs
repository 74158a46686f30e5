//! # Block device
//!
//! The disk is simulated entirely in memory: `count` blocks of `block_size`
//! bytes each, read and written a whole block at a time. The same byte
//! array round-trips through a single image file, so a session can be saved
//! and restored later.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::Result;

/// An in-memory block device.
pub struct MemDisk {
    data: Vec<u8>,
    block_size: usize,
    count: usize,
}

impl MemDisk {
    /// A zero-filled disk of `count` blocks, `block_size` bytes each.
    pub fn new(count: usize, block_size: usize) -> Self {
        Self {
            data: vec![0; count * block_size],
            block_size,
            count,
        }
    }

    /// Number of blocks on the device.
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Bytes per block.
    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Copies block `n` into `out`, up to one block. Returns the bytes
    /// copied, `min(block_size, out.len())`.
    ///
    /// Panics if `n` is out of range.
    pub fn read_block(&self, n: usize, out: &mut [u8]) -> usize {
        assert!(n < self.count, "block {n} out of range");
        let len = out.len().min(self.block_size);
        out[..len].copy_from_slice(&self.data[n * self.block_size..][..len]);
        len
    }

    /// Copies `bytes` over block `n`, up to one block. Returns the bytes
    /// copied, `min(block_size, bytes.len())`.
    ///
    /// Panics if `n` is out of range.
    pub fn write_block(&mut self, n: usize, bytes: &[u8]) -> usize {
        assert!(n < self.count, "block {n} out of range");
        let len = bytes.len().min(self.block_size);
        self.data[n * self.block_size..][..len].copy_from_slice(&bytes[..len]);
        len
    }

    /// Writes the image: little-endian `u64` block count, little-endian
    /// `u64` block size, then every block in index order.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path.as_ref())?;
        file.write_all(&(self.count as u64).to_le_bytes())?;
        file.write_all(&(self.block_size as u64).to_le_bytes())?;
        file.write_all(&self.data)?;
        log::debug!(
            "saved {} blocks x {} bytes to {:?}",
            self.count,
            self.block_size,
            path.as_ref()
        );
        Ok(())
    }

    /// Reads an image written by [`save`](Self::save). Fails if the file
    /// cannot be opened or holds fewer bytes than its header promises.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut file = File::open(path.as_ref())?;
        let mut word = [0u8; 8];

        file.read_exact(&mut word)?;
        let count = u64::from_le_bytes(word) as usize;
        file.read_exact(&mut word)?;
        let block_size = u64::from_le_bytes(word) as usize;

        let mut data = vec![0; count * block_size];
        file.read_exact(&mut data)?;
        log::debug!(
            "loaded {count} blocks x {block_size} bytes from {:?}",
            path.as_ref()
        );

        Ok(Self {
            data,
            block_size,
            count,
        })
    }

    /// The raw device contents, for snapshot comparison.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}
