use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

pub const EVENT_LOG_FILE: &str = "events.dat";
pub const STRING_TABLE_FILE: &str = "strings.dat";
pub const FOCUS_LOG_FILE: &str = "focus.dat";
pub const SETTINGS_FILE: &str = "settings.json";

/// The default per-user data directory.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = dirs::data_dir().context("no user data directory available")?;
    Ok(base.join("tabtrail"))
}

/// Ensure the data directory exists and return it. Fails if the path exists
/// but is not a directory.
pub fn ensure_data_dir(dir: &Path) -> Result<()> {
    if dir.exists() && !dir.is_dir() {
        bail!(
            "data path {} exists but is not a directory",
            dir.display()
        );
    }
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create data directory {}", dir.display()))?;
    Ok(())
}
