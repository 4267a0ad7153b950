// 🧹 Working directories - wiped and recreated at the start of a run

use crate::error::Result;
use std::fs;
use std::path::Path;

/// Remove `dir` with everything in it, then create it empty
pub fn reset_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)?;
    tracing::debug!(dir = %dir.display(), "directory reset");
    Ok(())
}
