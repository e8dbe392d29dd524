//! Staging directory handling.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::BuildError;

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> BuildError + '_ {
    move |source| BuildError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Remove `dir` if present and create it empty.
pub fn recreate_dir(dir: &Path) -> Result<(), BuildError> {
    if dir.exists() {
        fs::remove_dir_all(dir).map_err(io_error(dir))?;
    }
    fs::create_dir_all(dir).map_err(io_error(dir))
}

/// Copy the tree under `src` into `dst`; returns the number of files copied.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<u64, BuildError> {
    let mut files = 0;
    for entry in WalkDir::new(src).sort_by_file_name() {
        let entry = entry.map_err(|e| BuildError::Io {
            path: e.path().map(Path::to_path_buf).unwrap_or_else(|| src.to_path_buf()),
            source: io::Error::from(e),
        })?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|_| BuildError::Io {
                path: entry.path().to_path_buf(),
                source: io::Error::new(io::ErrorKind::Other, "entry outside source tree"),
            })?;
        let target: PathBuf = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(io_error(&target))?;
        } else {
            fs::copy(entry.path(), &target).map_err(io_error(&target))?;
            files += 1;
        }
    }
    debug!(from = %src.display(), to = %dst.display(), files, "copied tree");
    Ok(files)
}
