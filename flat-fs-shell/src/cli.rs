use clap::Parser;
use std::path::PathBuf;

/// Interactive shell over a flat-fs disk.
#[derive(Parser)]
pub struct Cli {
    /// Run the bare layout manager, without the cache layer
    #[arg(long)]
    pub no_cache: bool,

    /// Image to restore at startup, as if by `in` with its saved geometry
    #[arg(long, short)]
    pub image: Option<PathBuf>,
}
