//! Advisory file locks for the atomic write path.
//!
//! Cross-platform (fs2) exclusive lock held on the temporary sibling while it is
//! being written. A concurrent writer following the same discipline blocks until
//! the rename is done.
//!
//! Lock is released on Drop.

use fs2::FileExt;
use log::debug;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    pub fn file_mut(&mut self) -> &mut File {
        &mut self.file
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // ошибки unlock на Drop игнорируем
        let _ = self.file.unlock();
    }
}

/// Open (create if missing) `path` for writing and take an exclusive lock. Blocks until acquired.
///
/// The file is NOT truncated before the lock is held; callers truncate through the guard.
/// If the previous holder renamed `path` away while we were waiting, the locked inode is
/// no longer `path`: drop it and open again.
pub fn lock_exclusive_for_write(path: &Path) -> io::Result<LockGuard> {
    loop {
        let file = open_for_write(path)?;
        file.lock_exclusive()?;
        if still_at_path(&file, path)? {
            return Ok(LockGuard {
                file,
                path: path.to_path_buf(),
            });
        }
        let _ = file.unlock();
        debug!("lock: {} was replaced while waiting, reopening", path.display());
    }
}

fn open_for_write(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
}

#[cfg(unix)]
fn still_at_path(file: &File, path: &Path) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let held = file.metadata()?;
    match std::fs::metadata(path) {
        Ok(md) => Ok(md.dev() == held.dev() && md.ino() == held.ino()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

// на Windows открытый файл нельзя переименовать, подмена невозможна
#[cfg(not(unix))]
fn still_at_path(_file: &File, _path: &Path) -> io::Result<bool> {
    Ok(true)
}

/// Non-blocking variant: Err(WouldBlock-like) if someone else holds the lock.
#[cfg(test)]
fn try_lock_exclusive_for_write(path: &Path) -> io::Result<LockGuard> {
    let file = open_for_write(path)?;
    file.try_lock_exclusive()?;
    Ok(LockGuard {
        file,
        path: path.to_path_buf(),
    })
}
