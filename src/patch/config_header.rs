use std::path::Path;

use log::{debug, info, warn};

/// Template shipped by suckless projects and changed by most patches.
pub const CONFIG_DEFAULTS: &str = "config.def.h";
/// Generated from the template by the Makefile, only when missing.
pub const CONFIG_HEADER: &str = "config.h";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    /// `config.h` was a copy of the old template and was removed; `make`
    /// recreates it from the patched one.
    Regenerated,
    /// `config.h` was edited by the operator and is left alone.
    Customised,
    /// Nothing to do: no template, no `config.h`, or already in sync.
    Unchanged,
}

/// Reads the template before a patch touches it.
pub fn snapshot(working_copy: &Path) -> Option<String> {
    std::fs::read_to_string(working_copy.join(CONFIG_DEFAULTS)).ok()
}

/// Prepares `config.h` for a rebuild after patches changed the template.
///
/// `before` is the template as it was before this run's patches.
pub fn refresh(working_copy: &Path, before: Option<&str>) -> std::io::Result<Refresh> {
    let header_path = working_copy.join(CONFIG_HEADER);
    let Some(defaults) = snapshot(working_copy) else {
        return Ok(Refresh::Unchanged);
    };
    let header = match std::fs::read_to_string(&header_path) {
        Ok(header) => header,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!("No {} yet in {}", CONFIG_HEADER, working_copy.display());
            return Ok(Refresh::Unchanged);
        }
        Err(err) => return Err(err),
    };

    if header == defaults {
        Ok(Refresh::Unchanged)
    } else if before == Some(header.as_str()) {
        // Removing works even when an elevated build created the file.
        std::fs::remove_file(&header_path)?;
        info!(
            "Regenerating {} from the patched {}",
            header_path.display(),
            CONFIG_DEFAULTS
        );
        Ok(Refresh::Regenerated)
    } else {
        warn!(
            "Keeping customised {}; merge the new settings from {} by hand",
            header_path.display(),
            CONFIG_DEFAULTS
        );
        Ok(Refresh::Customised)
    }
}
