//! # Cache layer
//!
//! A decorator over [`FlatFs`] with two read caches:
//!
//! * a name-sorted snapshot of each directory, so `search` is a binary
//!   lookup and `list` never rescans the disk;
//! * one read buffer per file, widened to the next block boundary, so a
//!   run of small sequential reads costs one pass over the device.
//!
//! Writes go straight through; the affected read buffer is invalidated and
//! the snapshot entry has its size patched in place. Observable behaviour
//! is identical to the bare manager.

use std::collections::HashMap;
use std::path::Path;

use log::trace;

use crate::ffs::{FileInfo, FlatFs, ROOT};
use crate::Result;

struct ReadBuffer {
    /// Byte position of `data[0]` within the file.
    start: u64,
    data: Vec<u8>,
}

/// [`FlatFs`] behind the directory snapshot and read buffers.
pub struct Cached {
    inner: FlatFs,
    /// Name-sorted snapshots, keyed by directory descriptor.
    dirs: HashMap<u64, Vec<FileInfo>>,
    /// descriptor index -> (directory, name); locates the snapshot entry
    /// of a file without rescanning anything.
    names: HashMap<u64, (u64, String)>,
    buffers: HashMap<u64, ReadBuffer>,
}

impl Cached {
    pub fn new(inner: FlatFs) -> Self {
        Self {
            inner,
            dirs: HashMap::new(),
            names: HashMap::new(),
            buffers: HashMap::new(),
        }
    }

    /// The wrapped layout manager, for snapshot inspection.
    #[inline]
    pub fn layout(&self) -> &FlatFs {
        &self.inner
    }

    pub fn create(&mut self, name: &str) -> Result<u64> {
        let index = self.inner.create(name)?;

        if let Some(entries) = self.dirs.get_mut(&ROOT) {
            let at = entries.partition_point(|e| e.name.as_str() < name);
            entries.insert(
                at,
                FileInfo {
                    name: name.to_owned(),
                    size: 0,
                    descriptor_index: index,
                },
            );
            self.names.insert(index, (ROOT, name.to_owned()));
        } else {
            self.snapshot(ROOT);
        }

        Ok(index)
    }

    pub fn remove(&mut self, index: u64) -> Result<()> {
        self.inner.remove(index)?;
        self.buffers.remove(&index);

        if let Some((dir, name)) = self.names.remove(&index) {
            if let Some(entries) = self.dirs.get_mut(&dir) {
                if let Ok(at) = entries.binary_search_by(|e| e.name.as_str().cmp(&name)) {
                    entries.remove(at);
                }
            }
        }

        Ok(())
    }

    pub fn search(&mut self, name: &str) -> Option<u64> {
        let entries = self.snapshot(ROOT);
        entries
            .binary_search_by(|e| e.name.as_str().cmp(name))
            .ok()
            .map(|at| entries[at].descriptor_index)
    }

    /// Serves the read from the file's buffer when it covers the whole
    /// request; otherwise reads through, widened to the next block
    /// boundary, and keeps the surplus for the next call.
    pub fn read(&mut self, index: u64, pos: u64, out: &mut [u8]) -> usize {
        if let Some(buffer) = self.buffers.get(&index) {
            let end = pos + out.len() as u64;
            if pos >= buffer.start && end <= buffer.start + buffer.data.len() as u64 {
                let lo = (pos - buffer.start) as usize;
                out.copy_from_slice(&buffer.data[lo..lo + out.len()]);
                trace!("read of {} bytes at {pos} served from buffer", out.len());
                return out.len();
            }
        }

        let block_size = self.inner.geometry().block_size;
        let tail = block_size - (pos + out.len() as u64) % block_size;
        let mut staged = vec![0u8; out.len() + tail as usize];
        let got = self.inner.read(index, pos, &mut staged);
        staged.truncate(got);

        let give = got.min(out.len());
        out[..give].copy_from_slice(&staged[..give]);
        self.buffers.insert(
            index,
            ReadBuffer {
                start: pos,
                data: staged,
            },
        );
        give
    }

    /// Write-through. The file's read buffer is dropped (it may now hold
    /// stale bytes) and the cached directory entry learns the new size.
    pub fn write(&mut self, index: u64, pos: u64, data: &[u8]) -> usize {
        let written = self.inner.write(index, pos, data);
        self.buffers.remove(&index);

        if written > 0 {
            let size = self.inner.read_descriptor(index).length;
            if let Some((dir, name)) = self.names.get(&index) {
                if let Some(entries) = self.dirs.get_mut(dir) {
                    if let Ok(at) = entries.binary_search_by(|e| e.name.as_str().cmp(name)) {
                        entries[at].size = size;
                    }
                }
            }
        }

        written
    }

    /// Drops the file's read buffer.
    pub fn close(&mut self, index: u64) {
        self.buffers.remove(&index);
    }

    /// Name-sorted listing, straight from the snapshot.
    pub fn list(&mut self) -> Vec<FileInfo> {
        self.snapshot(ROOT).to_vec()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.inner.save(path)
    }

    /// The snapshot of `dir`, fetched from the manager on first use.
    fn snapshot(&mut self, dir: u64) -> &[FileInfo] {
        if !self.dirs.contains_key(&dir) {
            let mut entries = self.inner.list();
            entries.sort_by(|a, b| a.name.cmp(&b.name));
            for entry in &entries {
                self.names
                    .insert(entry.descriptor_index, (dir, entry.name.clone()));
            }
            trace!("cached {} entries of directory {dir}", entries.len());
            self.dirs.insert(dir, entries);
        }
        &self.dirs[&dir]
    }
}
