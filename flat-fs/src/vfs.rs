//! # Facade layer
//!
//! The UNIX-like surface over either core (the bare layout manager or the
//! cached one) plus the open file table, which tracks the current byte
//! position of every open file.

use std::collections::BTreeMap;
use std::path::Path;

use log::debug;

use crate::cache::Cached;
use crate::ffs::{FileInfo, FlatFs};
use crate::{FsError, Result, NAME_MAX};

/// The two interchangeable cores. Same operations, same observable
/// behaviour; the cached one just touches the device less.
pub enum Backend {
    Plain(FlatFs),
    Cached(Cached),
}

impl Backend {
    pub fn search(&mut self, name: &str) -> Option<u64> {
        match self {
            Self::Plain(fs) => fs.search(name),
            Self::Cached(fs) => fs.search(name),
        }
    }

    pub fn create(&mut self, name: &str) -> Result<u64> {
        match self {
            Self::Plain(fs) => fs.create(name),
            Self::Cached(fs) => fs.create(name),
        }
    }

    pub fn remove(&mut self, index: u64) -> Result<()> {
        match self {
            Self::Plain(fs) => fs.remove(index),
            Self::Cached(fs) => fs.remove(index),
        }
    }

    pub fn read(&mut self, index: u64, pos: u64, out: &mut [u8]) -> usize {
        match self {
            Self::Plain(fs) => fs.read(index, pos, out),
            Self::Cached(fs) => fs.read(index, pos, out),
        }
    }

    pub fn write(&mut self, index: u64, pos: u64, data: &[u8]) -> usize {
        match self {
            Self::Plain(fs) => fs.write(index, pos, data),
            Self::Cached(fs) => fs.write(index, pos, data),
        }
    }

    pub fn close(&mut self, index: u64) {
        match self {
            Self::Plain(_) => {}
            Self::Cached(fs) => fs.close(index),
        }
    }

    /// Name-sorted listing of the root directory.
    pub fn list(&mut self) -> Vec<FileInfo> {
        match self {
            Self::Plain(fs) => {
                let mut entries = fs.list();
                entries.sort_by(|a, b| a.name.cmp(&b.name));
                entries
            }
            Self::Cached(fs) => fs.list(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        match self {
            Self::Plain(fs) => fs.save(path),
            Self::Cached(fs) => fs.save(path),
        }
    }

    /// The layout manager at the bottom, for snapshot inspection.
    pub fn layout(&self) -> &FlatFs {
        match self {
            Self::Plain(fs) => fs,
            Self::Cached(fs) => fs.layout(),
        }
    }
}

impl From<FlatFs> for Backend {
    fn from(fs: FlatFs) -> Self {
        Self::Plain(fs)
    }
}

impl From<Cached> for Backend {
    fn from(fs: Cached) -> Self {
        Self::Cached(fs)
    }
}

/// The user-facing filesystem.
pub struct Filesystem {
    backend: Backend,
    /// Open file table: descriptor index -> current byte position.
    oft: BTreeMap<u64, u64>,
}

impl Filesystem {
    pub fn new(backend: impl Into<Backend>) -> Self {
        Self {
            backend: backend.into(),
            oft: BTreeMap::new(),
        }
    }

    /// Creates an empty file. The name must be new and fit `NAME_MAX`
    /// bytes.
    pub fn create(&mut self, name: &str) -> Result<()> {
        if name.len() > NAME_MAX {
            return Err(FsError::NameTooLong {
                name: name.to_owned(),
                max: NAME_MAX,
            });
        }
        if self.backend.search(name).is_some() {
            return Err(FsError::Duplicate(name.to_owned()));
        }
        self.backend.create(name)?;
        Ok(())
    }

    /// Removes the named file, silently closing it first if it was open.
    pub fn destroy(&mut self, name: &str) -> Result<()> {
        let index = self
            .backend
            .search(name)
            .ok_or_else(|| FsError::NotFound(format!("file with name \"{name}\"")))?;
        self.backend.remove(index)?;
        self.oft.remove(&index);
        Ok(())
    }

    /// Opens the named file at position 0 and returns its index.
    pub fn open(&mut self, name: &str) -> Result<u64> {
        let index = self
            .backend
            .search(name)
            .ok_or_else(|| FsError::NotFound(format!("file with name \"{name}\"")))?;
        if self.oft.contains_key(&index) {
            return Err(FsError::AlreadyOpen);
        }
        self.oft.insert(index, 0);
        debug!("opened {name:?} as {index}");
        Ok(index)
    }

    pub fn close(&mut self, index: u64) -> Result<()> {
        self.oft.remove(&index).ok_or(FsError::NotOpen)?;
        self.backend.close(index);
        Ok(())
    }

    /// Reads from the current position, which advances by the returned
    /// count.
    pub fn read(&mut self, index: u64, out: &mut [u8]) -> Result<usize> {
        let pos = *self.oft.get(&index).ok_or(FsError::NotOpen)?;
        let count = self.backend.read(index, pos, out);
        self.oft.insert(index, pos + count as u64);
        Ok(count)
    }

    /// Writes at the current position, which advances by the returned
    /// count. The count falls short when the file hits its block limit.
    pub fn write(&mut self, index: u64, data: &[u8]) -> Result<usize> {
        let pos = *self.oft.get(&index).ok_or(FsError::NotOpen)?;
        let count = self.backend.write(index, pos, data);
        self.oft.insert(index, pos + count as u64);
        Ok(count)
    }

    /// Moves the current position of an open file.
    pub fn lseek(&mut self, index: u64, pos: u64) -> Result<()> {
        *self.oft.get_mut(&index).ok_or(FsError::NotOpen)? = pos;
        Ok(())
    }

    /// Name-sorted listing of the root directory.
    pub fn directory(&mut self) -> Vec<FileInfo> {
        self.backend.list()
    }

    /// Closes every open file, then persists the device to `path`.
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<()> {
        for (index, _) in std::mem::take(&mut self.oft) {
            self.backend.close(index);
        }
        self.backend.save(path.as_ref())
    }

    /// The layout manager at the bottom, for snapshot inspection.
    pub fn layout(&self) -> &FlatFs {
        self.backend.layout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemDisk;

    fn fresh() -> Filesystem {
        Filesystem::new(FlatFs::format(MemDisk::new(20, 64)).unwrap())
    }

    #[test]
    fn names_are_unique_and_bounded() {
        let mut fs = fresh();
        fs.create("a").unwrap();

        assert!(matches!(fs.create("a"), Err(FsError::Duplicate(_))));
        assert!(matches!(
            fs.create("a-name-way-past-twenty-bytes"),
            Err(FsError::NameTooLong { .. })
        ));
    }

    #[test]
    fn open_close_discipline() {
        let mut fs = fresh();
        fs.create("a").unwrap();

        let index = fs.open("a").unwrap();
        assert!(matches!(fs.open("a"), Err(FsError::AlreadyOpen)));
        assert!(matches!(fs.open("b"), Err(FsError::NotFound(_))));

        fs.close(index).unwrap();
        assert!(matches!(fs.close(index), Err(FsError::NotOpen)));
        assert!(matches!(fs.lseek(index, 0), Err(FsError::NotOpen)));
        assert!(matches!(fs.read(index, &mut [0; 4]), Err(FsError::NotOpen)));
    }

    #[test]
    fn position_advances_with_io() {
        let mut fs = fresh();
        fs.create("a").unwrap();
        let index = fs.open("a").unwrap();

        assert_eq!(fs.write(index, b"hello world").unwrap(), 11);
        // the position is past the data; reading yields nothing
        assert_eq!(fs.read(index, &mut [0; 4]).unwrap(), 0);

        fs.lseek(index, 6).unwrap();
        let mut out = [0u8; 5];
        assert_eq!(fs.read(index, &mut out).unwrap(), 5);
        assert_eq!(&out, b"world");
    }

    #[test]
    fn destroy_evicts_the_open_file() {
        let mut fs = fresh();
        fs.create("a").unwrap();
        let index = fs.open("a").unwrap();

        fs.destroy("a").unwrap();
        assert!(matches!(fs.read(index, &mut [0; 1]), Err(FsError::NotOpen)));
        assert!(matches!(fs.destroy("a"), Err(FsError::NotFound(_))));
    }

    #[test]
    fn save_closes_everything_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fs.img");

        let mut fs = fresh();
        fs.create("a").unwrap();
        let index = fs.open("a").unwrap();
        fs.save(&path).unwrap();

        assert!(matches!(fs.read(index, &mut [0; 1]), Err(FsError::NotOpen)));
        assert!(path.exists());
    }
}
