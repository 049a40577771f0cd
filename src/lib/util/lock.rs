//! A directory-scoped advisory lock. The metadata cache directory is shared
//! across invocations for the same architecture (§5); this keeps two solver
//! processes from racing on the same repo's on-disk metadata.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::err::{Res, SolveError};

/// An exclusive lock on a directory, held for the lifetime of the value.
/// The lock file itself (`.lock`) lives inside the directory it protects.
/// Locking is advisory and unix-only (`fs2::FileExt`, per Cargo.toml's
/// `cfg(unix)` dependency); elsewhere the directory is still created but no
/// lock is taken.
pub struct DirLock {
    path: PathBuf,
    _file: File,
}

impl DirLock {
    /// Acquire an exclusive lock on `path`, creating the directory first if
    /// it doesn't exist.
    pub fn acquire(path: &Path) -> Res<Self> {
        fs::create_dir_all(path)?;
        let lock_path = path.join(".lock");
        let file = File::create(&lock_path)?;
        lock_exclusive(&file, &lock_path)?;

        Ok(DirLock {
            path: path.to_path_buf(),
            _file: file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(unix)]
fn lock_exclusive(file: &File, lock_path: &Path) -> Res<()> {
    use fs2::FileExt;
    file.lock_exclusive().map_err(|e| {
        SolveError::generic(format!("could not lock {}: {}", lock_path.display(), e))
    })
}

#[cfg(not(unix))]
fn lock_exclusive(_file: &File, _lock_path: &Path) -> Res<()> {
    Ok(())
}

#[cfg(unix)]
fn unlock(file: &File) {
    use fs2::FileExt;
    let _ = file.unlock();
}

#[cfg(not(unix))]
fn unlock(_file: &File) {}

impl Drop for DirLock {
    fn drop(&mut self) {
        unlock(&self._file);
    }
}
