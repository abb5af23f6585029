use crate::error::{Result, RootCauseError};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const ROOTCAUSE_DIR: &str = ".rootcause";
pub const CONFIG_FILE: &str = ".rootcause/config.yaml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

/// `~/.rootcause/config.yaml`, consulted when the project has no config.
pub fn user_config_path() -> Result<PathBuf> {
    let home = home::home_dir().ok_or(RootCauseError::HomeNotFound)?;
    Ok(home.join(CONFIG_FILE))
}
