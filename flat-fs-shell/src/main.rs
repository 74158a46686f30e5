mod cli;

use std::io::{self, BufRead, Write};
use std::path::Path;

use clap::Parser;
use flat_fs::{Backend, Cached, Filesystem, FlatFs, MemDisk};
use log::{debug, warn};

use cli::Cli;

/// command, usage line, description; in banner order.
const COMMANDS: &[(&str, &str, &str)] = &[
    ("cr", "cr <name>", "create a new file with the name <name>"),
    ("de", "de <name>", "destroy the named file <name>"),
    (
        "op",
        "op <name>",
        "open the named file <name> for reading and writing; display an index value",
    ),
    ("cl", "cl <index>", "close the specified file <index>"),
    (
        "rd",
        "rd <index> <count>",
        "sequentially read a number of bytes <count> from the specified file <index> and display them",
    ),
    (
        "wr",
        "wr <index> <char> <count>",
        "sequentially write <count> number of <char>s into the specified file <index> at its current position",
    ),
    (
        "sk",
        "sk <index> <pos>",
        "set the current position of the specified file <index> to <pos>",
    ),
    ("dr", "dr", "directory: list the names of all files and their lengths"),
    (
        "in",
        "in <cylinders> <surfaces> <sectors> <block_size> <path>",
        "create a disk using the given dimension parameters and initialize it using the image file",
    ),
    (
        "sv",
        "sv <path>",
        "close all files and save the contents of the disk in the file <path>",
    ),
    ("help", "help", "show this message again"),
    ("ex", "ex", "leave the shell"),
];

struct Shell {
    fs: Option<Filesystem>,
    use_cache: bool,
}

impl Shell {
    fn fs(&mut self) -> Result<&mut Filesystem, String> {
        self.fs
            .as_mut()
            .ok_or_else(|| "no disk initialized".to_owned())
    }

    /// Wraps a fresh or restored manager in the configured backend.
    fn adopt(&mut self, fs: FlatFs) {
        let backend = if self.use_cache {
            Backend::from(Cached::new(fs))
        } else {
            Backend::from(fs)
        };
        self.fs = Some(Filesystem::new(backend));
    }

    /// Builds the disk for `in`: restored from the image when it loads,
    /// freshly formatted with the requested dimensions otherwise.
    fn init_disk(
        &mut self,
        blocks: usize,
        block_size: usize,
        path: &Path,
    ) -> Result<&'static str, String> {
        let (fs, status) = match MemDisk::load(path) {
            Ok(disk) => {
                if disk.count() != blocks || disk.block_size() != block_size {
                    warn!(
                        "image geometry {}x{} overrides the requested {}x{}",
                        disk.count(),
                        disk.block_size(),
                        blocks,
                        block_size
                    );
                }
                (FlatFs::mount(disk).map_err(|e| e.to_string())?, "restored")
            }
            Err(err) => {
                debug!("no usable image at {path:?} ({err}), formatting");
                let disk = MemDisk::new(blocks, block_size);
                (FlatFs::format(disk).map_err(|e| e.to_string())?, "initialized")
            }
        };
        self.adopt(fs);
        Ok(status)
    }

    fn execute(&mut self, tokens: &[&str]) -> Result<String, String> {
        match tokens {
            ["cr", name] => {
                self.fs()?.create(name).map_err(|e| e.to_string())?;
                Ok(format!("file \"{name}\" created"))
            }
            ["de", name] => {
                self.fs()?.destroy(name).map_err(|e| e.to_string())?;
                Ok(format!("file \"{name}\" destroyed"))
            }
            ["op", name] => {
                let index = self.fs()?.open(name).map_err(|e| e.to_string())?;
                Ok(format!("file \"{name}\" opened, index={index}"))
            }
            ["cl", index] => {
                let index = parse(index)?;
                self.fs()?.close(index).map_err(|e| e.to_string())?;
                Ok(format!("file {index} closed"))
            }
            ["rd", index, count] => {
                let index = parse(index)?;
                let count: usize = parse(count)?;
                let mut buf = vec![0u8; count];
                let read = self.fs()?.read(index, &mut buf).map_err(|e| e.to_string())?;
                buf.truncate(read);
                Ok(format!(
                    "{read} bytes read: \"{}\"",
                    String::from_utf8_lossy(&buf)
                ))
            }
            ["wr", index, ch, count] => {
                let index = parse(index)?;
                let &[byte] = ch.as_bytes() else {
                    return Err("invalid arguments".to_owned());
                };
                let count: usize = parse(count)?;
                let written = self
                    .fs()?
                    .write(index, &vec![byte; count])
                    .map_err(|e| e.to_string())?;
                Ok(format!("{written} bytes written"))
            }
            ["sk", index, pos] => {
                let index = parse(index)?;
                let pos = parse(pos)?;
                self.fs()?.lseek(index, pos).map_err(|e| e.to_string())?;
                Ok(format!("current position is {pos}"))
            }
            ["dr"] => {
                let listing = self.fs()?.directory();
                Ok(listing
                    .iter()
                    .map(|entry| format!("{} {}", entry.name, entry.size))
                    .collect::<Vec<_>>()
                    .join(", "))
            }
            ["in", cylinders, surfaces, sectors, block_size, path] => {
                let cylinders: usize = parse(cylinders)?;
                let surfaces: usize = parse(surfaces)?;
                let sectors: usize = parse(sectors)?;
                let block_size = parse(block_size)?;
                let blocks = cylinders * surfaces * sectors;
                let status = self.init_disk(blocks, block_size, Path::new(path))?;
                Ok(format!("disk {status}"))
            }
            ["sv", path] => {
                self.fs()?.save(path).map_err(|e| e.to_string())?;
                Ok("disk saved".to_owned())
            }
            ["help"] => {
                print_usage();
                Ok(String::new())
            }
            [cmd, ..] if COMMANDS.iter().any(|(known, ..)| known == cmd) => {
                Err("invalid input".to_owned())
            }
            _ => Err("unknown command".to_owned()),
        }
    }
}

fn parse<T: std::str::FromStr>(token: &str) -> Result<T, String> {
    token.parse().map_err(|_| "invalid arguments".to_owned())
}

fn print_usage() {
    println!("SHELL USAGE\n");
    for (cmd, usage, description) in COMMANDS {
        println!("* {cmd} - {description}");
        println!("     usage: {usage}");
        println!();
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let mut shell = Shell {
        fs: None,
        use_cache: !cli.no_cache,
    };

    if let Some(image) = cli.image.as_deref() {
        match MemDisk::load(image)
            .and_then(FlatFs::mount)
            .map_err(|e| e.to_string())
        {
            Ok(fs) => {
                shell.adopt(fs);
                println!("disk restored from {image:?}");
            }
            Err(message) => println!("error: {message}"),
        }
    }

    print_usage();

    let stdin = io::stdin();
    loop {
        print!("cmd> ");
        io::stdout().flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            [] => continue,
            ["ex"] => break,
            tokens => match shell.execute(tokens) {
                Ok(message) => println!("{message}"),
                Err(message) => println!("error: {message}"),
            },
        }
    }
}
