//! # Layout manager
//!
//! Owns the device and the on-disk layout: the bitmap allocator, the flat
//! descriptor array and the root directory, which is an ordinary file kept
//! in descriptor slot 0. Every operation here goes straight to the device;
//! caching is somebody else's business.

use log::debug;

use crate::layout::{Bitmap, Descriptor, DirEntry, Geometry};
use crate::record::{self, Position};
use crate::{FsError, MemDisk, Result, MAX_BLOCKS_PER_FILE};

/// Descriptor slot of the root directory.
pub const ROOT: u64 = 0;

/// One row of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub descriptor_index: u64,
}

/// The core filesystem over an owned block device.
pub struct FlatFs {
    disk: MemDisk,
    geometry: Geometry,
    /// Block list of the descriptor array, fixed at `[1, k)`.
    descriptor_area: Vec<u64>,
}

impl FlatFs {
    /// Lays a fresh filesystem over `disk`: computes the geometry and
    /// writes an empty root directory into descriptor slot 0.
    pub fn format(disk: MemDisk) -> Result<Self> {
        let mut fs = Self::mount(disk)?;
        if fs.geometry.descriptor_slots() == 0 {
            return Err(FsError::NoSpace("descriptor table cannot hold the root"));
        }
        fs.write_descriptor(ROOT, &Descriptor::new());
        debug!(
            "formatted: {} metadata + {} data blocks",
            fs.geometry.k,
            fs.geometry.data_blocks()
        );
        Ok(fs)
    }

    /// Adopts a disk restored from an image. The on-disk state (root,
    /// bitmap, descriptors) is taken as is.
    pub fn mount(disk: MemDisk) -> Result<Self> {
        let geometry = Geometry::compute(disk.count() as u64, disk.block_size() as u64)?;
        let descriptor_area = geometry.descriptor_area();
        Ok(Self {
            disk,
            geometry,
            descriptor_area,
        })
    }

    #[inline]
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// The underlying device, for snapshot inspection.
    #[inline]
    pub fn disk(&self) -> &MemDisk {
        &self.disk
    }

    /// Persists the device to an image file.
    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        self.disk.save(path)
    }

    /// Creates `name` in the root directory and returns its descriptor
    /// index. The caller is responsible for rejecting duplicates.
    ///
    /// The fresh descriptor is written last: if anything earlier fails,
    /// the directory is left consistent.
    pub fn create(&mut self, name: &str) -> Result<u64> {
        let index = self
            .free_descriptor()
            .ok_or(FsError::NoSpace("no free descriptor"))?;
        let mut root = self.read_descriptor(ROOT);

        // recycle a freed slot when one exists, otherwise grow the root
        let slot = match self.find_entry(&root, |entry| !entry.occupied) {
            Some(position) => position,
            None => self.grow_root(&mut root)?,
        };

        let block_size = self.geometry.block_size;
        record::write_record(
            &mut self.disk,
            root.live_blocks(block_size),
            slot,
            &DirEntry::new(name, index),
        );
        self.write_descriptor(ROOT, &root);
        self.write_descriptor(index, &Descriptor::new());

        debug!("created {name:?} at descriptor {index}");
        Ok(index)
    }

    /// Unlinks the file at `index` from the root directory and releases
    /// its blocks.
    pub fn remove(&mut self, index: u64) -> Result<()> {
        let root = self.read_descriptor(ROOT);
        let slot = self
            .find_entry(&root, |entry| {
                entry.occupied && entry.descriptor_index == index
            })
            .ok_or_else(|| FsError::NotFound(format!("file #{index}")))?;

        let block_size = self.geometry.block_size;
        let target = self.read_descriptor(index);

        let mut bitmap = self.bitmap();
        for &block in target.live_blocks(block_size) {
            bitmap.clear((block - self.geometry.k) as usize);
        }
        bitmap.store(&mut self.disk);

        record::write_record(
            &mut self.disk,
            root.live_blocks(block_size),
            slot,
            &DirEntry::vacant(),
        );
        self.write_descriptor(index, &Descriptor::default());

        debug!("removed descriptor {index}");
        Ok(())
    }

    /// Descriptor index of the first occupied entry named `name`.
    pub fn search(&self, name: &str) -> Option<u64> {
        let root = self.read_descriptor(ROOT);
        let mut found = None;
        self.find_entry(&root, |entry| {
            if entry.occupied && entry.name() == name {
                found = Some(entry.descriptor_index);
                true
            } else {
                false
            }
        });
        found
    }

    /// Reads from byte `pos` of the file at `index`, bounded by the file
    /// length and the buffer. Returns the bytes read.
    pub fn read(&self, index: u64, pos: u64, out: &mut [u8]) -> usize {
        let descriptor = self.read_descriptor(index);
        if pos >= descriptor.length {
            return 0;
        }

        let block_size = self.geometry.block_size;
        let want = (out.len() as u64).min(descriptor.length - pos) as usize;
        record::read_bytes(
            &self.disk,
            descriptor.live_blocks(block_size),
            Position::from_offset(pos, block_size),
            &mut out[..want],
        )
    }

    /// Writes `data` at byte `pos` of the file at `index`, allocating
    /// blocks up to the per-file limit. The returned count falls short of
    /// `data.len()` when the allocation does; nothing is written when no
    /// byte of the span is storable.
    pub fn write(&mut self, index: u64, pos: u64, data: &[u8]) -> usize {
        let block_size = self.geometry.block_size;
        if data.is_empty() || pos >= (MAX_BLOCKS_PER_FILE as u64) * block_size {
            return 0;
        }

        let mut descriptor = self.read_descriptor(index);
        let mut held = descriptor.allocated(block_size);
        let end = pos + data.len() as u64;

        if end > held as u64 * block_size {
            let shortfall = end - held as u64 * block_size;
            let want =
                (shortfall.div_ceil(block_size) as usize).min(MAX_BLOCKS_PER_FILE - held);
            if want > 0 {
                let mut bitmap = self.bitmap();
                let grabbed = bitmap.grab(want);
                if !grabbed.is_empty() {
                    for (i, bit) in grabbed.iter().enumerate() {
                        descriptor.blocks[held + i] = self.geometry.k + *bit as u64;
                    }
                    held += grabbed.len();
                    // a short grab that still misses `pos` must not reach
                    // the disk, or the bits would leak
                    if pos < held as u64 * block_size {
                        bitmap.store(&mut self.disk);
                        debug!("descriptor {index}: +{} block(s)", grabbed.len());
                    }
                }
            }
        }

        let capacity = held as u64 * block_size;
        if pos >= capacity {
            return 0;
        }

        let storable = (capacity - pos).min(data.len() as u64) as usize;
        descriptor.length = descriptor.length.max(pos + storable as u64);
        self.write_descriptor(index, &descriptor);

        record::write_bytes(
            &mut self.disk,
            &descriptor.blocks[..held],
            Position::from_offset(pos, block_size),
            &data[..storable],
        )
    }

    /// Snapshot of the root directory in on-disk order.
    pub fn list(&self) -> Vec<FileInfo> {
        let root = self.read_descriptor(ROOT);
        let mut files = Vec::new();
        self.find_entry(&root, |entry| {
            if entry.occupied {
                files.push(FileInfo {
                    name: entry.name().to_owned(),
                    size: self.read_descriptor(entry.descriptor_index).length,
                    descriptor_index: entry.descriptor_index,
                });
            }
            false
        });
        files
    }

    /// The descriptor at `index`, staged off the descriptor area.
    pub fn read_descriptor(&self, index: u64) -> Descriptor {
        record::read_record(&self.disk, &self.descriptor_area, self.descriptor_position(index))
    }

    fn write_descriptor(&mut self, index: u64, descriptor: &Descriptor) {
        let position = self.descriptor_position(index);
        record::write_record(
            &mut self.disk,
            &self.descriptor_area,
            position,
            descriptor,
        );
    }

    #[inline]
    fn descriptor_position(&self, index: u64) -> Position {
        Position::from_offset(index * Descriptor::SIZE as u64, self.geometry.block_size)
    }

    /// First unoccupied slot of the descriptor array.
    fn free_descriptor(&self) -> Option<u64> {
        record::find_record(&self.disk, &self.descriptor_area, |d: &Descriptor| {
            !d.occupied
        })
        .map(|pos| pos.offset(self.geometry.block_size) / Descriptor::SIZE as u64)
    }

    /// Scans the root's entries, visiting only the `length`-bounded prefix;
    /// slack capacity past the length is not part of the directory.
    fn find_entry(
        &self,
        root: &Descriptor,
        mut pred: impl FnMut(&DirEntry) -> bool,
    ) -> Option<Position> {
        let block_size = self.geometry.block_size;
        let mut examined = 0;
        record::find_record(&self.disk, root.live_blocks(block_size), |entry: &DirEntry| {
            examined += DirEntry::SIZE as u64;
            examined <= root.length && pred(entry)
        })
    }

    /// Extends the root file by one entry slot, allocating data blocks as
    /// needed, and returns the position of the fresh slot.
    fn grow_root(&mut self, root: &mut Descriptor) -> Result<Position> {
        let block_size = self.geometry.block_size;
        let needed = root.length + DirEntry::SIZE as u64;
        let held = root.allocated(block_size);
        let have = held as u64 * block_size;

        if needed > have {
            let extra = (needed - have).div_ceil(block_size) as usize;
            if held + extra > MAX_BLOCKS_PER_FILE {
                return Err(FsError::DirectoryFull(MAX_BLOCKS_PER_FILE));
            }

            let mut bitmap = self.bitmap();
            if bitmap.free_bits() < extra {
                return Err(FsError::NoSpace("no free data block for the directory"));
            }
            for (i, bit) in bitmap.grab(extra).into_iter().enumerate() {
                root.blocks[held + i] = self.geometry.k + bit as u64;
            }
            bitmap.store(&mut self.disk);
            debug!("root directory: +{extra} block(s)");
        }

        let slot = Position::from_offset(root.length, block_size);
        root.length += DirEntry::SIZE as u64;
        Ok(slot)
    }

    fn bitmap(&self) -> Bitmap {
        Bitmap::load(&self.disk, self.geometry.data_blocks() as usize)
    }
}
