use std::{
    fs::File,
    path::{Path, PathBuf},
};

use fs4::fs_std::FileExt;
use log::debug;
use thiserror::Error;

/// Exclusive advisory lock, released when dropped.
pub struct FileLock {
    _file: File,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("{} is held by another rigup run", .0.display())]
    Contended(PathBuf),
    #[error(transparent)]
    IO(#[from] std::io::Error),
}

impl FileLock {
    /// Takes the lock or fails straight away; two runs must never interleave.
    pub fn new(path: &Path) -> Result<Self, Error> {
        let file = File::create(path)?;
        match file.try_lock_exclusive() {
            Ok(true) => {
                debug!("Acquired a lock on {}", path.display());
                Ok(Self { _file: file })
            }
            Ok(false) => Err(Error::Contended(path.to_path_buf())),
            Err(error) if error.raw_os_error() == fs4::lock_contended_error().raw_os_error() => {
                Err(Error::Contended(path.to_path_buf()))
            }
            Err(error) => Err(error.into()),
        }
    }
}
