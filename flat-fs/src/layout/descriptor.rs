use crate::record::Record;
use crate::MAX_BLOCKS_PER_FILE;

/// A file on disk: logical length plus direct block pointers. Slot 0 of
/// the descriptor array always holds the root directory.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Descriptor {
    /// Whether this slot describes a live file.
    pub occupied: bool,
    /// Logical file size in bytes.
    pub length: u64,
    /// Direct pointers into the device; only the first
    /// `ceil(length / block_size)` are meaningful.
    pub blocks: [u64; MAX_BLOCKS_PER_FILE],
}

impl Descriptor {
    /// On-disk footprint: occupied byte, length, three pointers.
    pub const SIZE: usize = 1 + 8 + 8 * MAX_BLOCKS_PER_FILE;

    /// A freshly created, zero-length file.
    pub fn new() -> Self {
        Self {
            occupied: true,
            length: 0,
            blocks: [0; MAX_BLOCKS_PER_FILE],
        }
    }

    /// Blocks currently backing the file.
    #[inline]
    pub fn allocated(&self, block_size: u64) -> usize {
        self.length.div_ceil(block_size) as usize
    }

    /// The live prefix of the pointer array.
    #[inline]
    pub fn live_blocks(&self, block_size: u64) -> &[u64] {
        &self.blocks[..self.allocated(block_size)]
    }
}

impl Record for Descriptor {
    const SIZE: usize = Descriptor::SIZE;

    fn decode(bytes: &[u8]) -> Self {
        let mut blocks = [0; MAX_BLOCKS_PER_FILE];
        for (block, chunk) in blocks.iter_mut().zip(bytes[9..Self::SIZE].chunks_exact(8)) {
            *block = u64::from_le_bytes(chunk.try_into().unwrap());
        }

        Self {
            occupied: bytes[0] != 0,
            length: u64::from_le_bytes(bytes[1..9].try_into().unwrap()),
            blocks,
        }
    }

    fn encode(&self, out: &mut [u8]) {
        out[0] = self.occupied.into();
        out[1..9].copy_from_slice(&self.length.to_le_bytes());
        for (chunk, block) in out[9..Self::SIZE].chunks_exact_mut(8).zip(self.blocks) {
            chunk.copy_from_slice(&block.to_le_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_pinned() {
        let descriptor = Descriptor {
            occupied: true,
            length: 0x0102,
            blocks: [7, 8, 9],
        };

        let mut bytes = [0u8; Descriptor::SIZE];
        descriptor.encode(&mut bytes);

        assert_eq!(bytes[0], 1);
        assert_eq!(&bytes[1..9], &[0x02, 0x01, 0, 0, 0, 0, 0, 0]);
        assert_eq!(bytes[9], 7);
        assert_eq!(bytes[17], 8);
        assert_eq!(bytes[25], 9);
        assert_eq!(Descriptor::decode(&bytes), descriptor);
    }

    #[test]
    fn live_prefix_follows_the_length() {
        let mut descriptor = Descriptor::new();
        assert!(descriptor.live_blocks(64).is_empty());

        descriptor.length = 65;
        descriptor.blocks = [10, 11, 0];
        assert_eq!(descriptor.allocated(64), 2);
        assert_eq!(descriptor.live_blocks(64), &[10, 11]);
    }
}
