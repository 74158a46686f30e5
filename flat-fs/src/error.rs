use thiserror::Error;

/// Every fault the filesystem reports. Errors bubble up to the facade
/// boundary; the call fails, the filesystem stays usable.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("device of {blocks} blocks x {block_size} bytes is too small for a usable layout")]
    Geometry { blocks: u64, block_size: u64 },

    #[error("out of space: {0}")]
    NoSpace(&'static str),

    #[error("file name \"{name}\" is longer than {max} bytes")]
    NameTooLong { name: String, max: usize },

    #[error("file with name \"{0}\" already exists")]
    Duplicate(String),

    #[error("{0} is not found")]
    NotFound(String),

    #[error("file is already open")]
    AlreadyOpen,

    #[error("file is not opened")]
    NotOpen,

    #[error("directory cannot grow past {0} blocks")]
    DirectoryFull(usize),

    #[error("image i/o failed: {0}")]
    Io(#[from] std::io::Error),
}
