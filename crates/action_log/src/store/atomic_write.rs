//! Replace-by-rename for metadata records.
//!
//! A checkpoint on disk is always either the previous one or the new one:
//! the bytes go to a `.tmp` sibling first and only a fully synced file is
//! renamed into place.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Suffix of in-flight metadata files.
pub const TMP_SUFFIX: &str = ".tmp";

/// Path of the temp file used while writing `path`.
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(TMP_SUFFIX);
    PathBuf::from(name)
}

/// Write `data` to the sibling temp file, sync it, then rename it over `path`.
pub fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let tmp = tmp_path(path);

    let mut file = File::create(&tmp)?;
    file.write_all(data)?;
    file.sync_all()?;

    fs::rename(&tmp, path)?;
    Ok(())
}
