//! # On-disk layout
//!
//! The disk is split into three regions:
//!
//! allocation bitmap (block 0) | descriptor array (blocks `1..k`) | data (blocks `k..N`)

mod bitmap;
pub use bitmap::Bitmap;

mod descriptor;
pub use descriptor::Descriptor;

mod dir_entry;
pub use dir_entry::DirEntry;

use crate::{FsError, Result, MAX_BLOCKS_PER_FILE};

/// Block holding the allocation bitmap.
pub const BITMAP_BLOCK: usize = 0;

/// The division of the device derived from its dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Total blocks on the device.
    pub blocks: u64,
    /// Bytes per block.
    pub block_size: u64,
    /// Metadata blocks: the bitmap plus `k - 1` descriptor blocks.
    pub k: u64,
}

impl Geometry {
    /// Solves `k = ⌊(N − F + B/D) / (1 + B/D)⌋` in exact integer
    /// arithmetic (multiply through by `D`), where `D` is the descriptor
    /// footprint and `F` the per-file block limit. The layout is unusable
    /// unless at least one descriptor block and two data blocks remain.
    pub fn compute(blocks: u64, block_size: u64) -> Result<Self> {
        let d = Descriptor::SIZE as u64;
        let f = MAX_BLOCKS_PER_FILE as u64;

        if block_size == 0 || blocks <= f {
            return Err(FsError::Geometry { blocks, block_size });
        }

        let k = ((blocks - f) * d + block_size) / (d + block_size);
        if k < 2 || blocks - k < 2 {
            return Err(FsError::Geometry { blocks, block_size });
        }

        Ok(Self {
            blocks,
            block_size,
            k,
        })
    }

    /// Block indices of the descriptor array, always `[1, k)`.
    pub fn descriptor_area(&self) -> Vec<u64> {
        (1..self.k).collect()
    }

    /// How many whole descriptor records the array holds.
    pub fn descriptor_slots(&self) -> u64 {
        (self.k - 1) * self.block_size / Descriptor::SIZE as u64
    }

    /// Data blocks tracked by the bitmap.
    pub fn data_blocks(&self) -> u64 {
        self.blocks - self.k
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_geometry() {
        // the scenario disk: 20 blocks of 64 bytes
        let g = Geometry::compute(20, 64).unwrap();
        assert_eq!(g.k, 6);
        assert_eq!(g.data_blocks(), 14);
        assert_eq!(g.descriptor_area(), vec![1, 2, 3, 4, 5]);
        assert_eq!(g.descriptor_slots(), 9);
    }

    #[test]
    fn undersized_devices_are_rejected() {
        assert!(Geometry::compute(0, 64).is_err());
        assert!(Geometry::compute(3, 64).is_err());
        assert!(Geometry::compute(4, 8).is_err());
        assert!(Geometry::compute(20, 0).is_err());
    }

    #[test]
    fn metadata_never_swallows_the_disk() {
        for blocks in 5..200 {
            if let Ok(g) = Geometry::compute(blocks, 64) {
                assert!(g.k >= 2);
                assert!(g.data_blocks() >= 2);
            }
        }
    }
}
