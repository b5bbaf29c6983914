use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    path::Path,
};

use env_logger::{Env, Target};
use log::warn;

/// Initialises `env_logger` with default filter `info`.
///
/// Records go to stderr and are appended to `log_file`. If the file cannot be
/// opened, logging continues on stderr alone.
pub fn init_logger(log_file: Option<&Path>) {
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));

    let mut unavailable = None;
    if let Some(path) = log_file {
        match open_log_file(path) {
            Ok(file) => {
                builder.target(Target::Pipe(Box::new(Tee::new(io::stderr(), file))));
            }
            Err(err) => unavailable = Some((path, err)),
        }
    }
    builder.init();

    if let Some((path, err)) = unavailable {
        warn!("Logging to stderr only, cannot open {}: {err}", path.display());
    }
}

fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Writes everything to both sinks.
struct Tee<A, B> {
    first: A,
    second: B,
}

impl<A: Write, B: Write> Tee<A, B> {
    fn new(first: A, second: B) -> Self {
        Tee { first, second }
    }
}

impl<A: Write, B: Write> Write for Tee<A, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.first.write_all(buf)?;
        self.second.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.first.flush()?;
        self.second.flush()
    }
}
