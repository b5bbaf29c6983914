use std::{
    ffi::OsString,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

use log::info;
use thiserror::Error;

use crate::model::Startup;

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Could not back up {}: {source}", .path.display())]
    Backup {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Could not write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Regenerates the startup file below `home`, keeping the previous one as
/// `<file>.bak`. Returns the path that was written.
pub fn write_startup_file(home: &Path, startup: &Startup) -> Result<PathBuf, StartupError> {
    let path = home.join(&startup.file);

    if path.exists() {
        let backup = backup_path(&path);
        std::fs::copy(&path, &backup).map_err(|source| StartupError::Backup {
            path: path.clone(),
            source,
        })?;
        info!("Backed up {} to {}", path.display(), backup.display());
    }

    let write = |source| StartupError::Write {
        path: path.clone(),
        source,
    };
    std::fs::write(&path, startup.render()).map_err(write)?;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).map_err(write)?;

    info!("Wrote {}", path.display());
    Ok(path)
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".bak");
    path.with_file_name(name)
}
