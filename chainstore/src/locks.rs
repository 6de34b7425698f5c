//! Sentinel and interprocess lock files.
//!
//! Two sentinels guard a store. The flush lock is a plain marker file: it
//! exists while a process is mid-write, so its presence at open time means
//! the previous session ended dirty. The interprocess lock holds an OS file
//! lock for the process lifetime, preventing two processes from opening the
//! same store.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::file;

/// A sentinel file marked by its existence.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
}

impl FileLock {
    /// Binds the sentinel to a path without touching the file.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// The sentinel path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True if the sentinel exists.
    pub fn exists(&self) -> bool {
        file::is_file(&self.path)
    }

    /// Creates the sentinel.
    pub fn create(&self) -> bool {
        file::create_file(&self.path)
    }

    /// Removes the sentinel; true when absent afterwards.
    pub fn destroy(&self) -> bool {
        file::remove(&self.path)
    }
}

/// Crashed-dirty marker: present while a process is mid-write.
#[derive(Debug)]
pub struct FlushLock {
    lock: FileLock,
}

impl FlushLock {
    /// Binds the flush sentinel to a path without touching the file.
    pub fn new(path: PathBuf) -> Self {
        Self {
            lock: FileLock::new(path),
        }
    }

    /// True if a previous session left the sentinel behind.
    pub fn is_locked(&self) -> bool {
        self.lock.exists()
    }

    /// Creates the sentinel; false if it already exists (dirty shutdown).
    pub fn try_lock(&self) -> bool {
        !self.lock.exists() && self.lock.create()
    }

    /// Removes the sentinel.
    pub fn try_unlock(&self) -> bool {
        self.lock.destroy()
    }
}

/// Process-exclusive ownership of a store directory.
///
/// Holds an OS exclusive lock (flock) on the lock file for the lifetime of
/// the lock; the file itself is removed on unlock. Dropping the value
/// releases the lock.
#[derive(Debug)]
pub struct InterprocessLock {
    lock: FileLock,
    handle: Option<File>,
}

impl InterprocessLock {
    /// Binds the lock to a path without touching the file.
    pub fn new(path: PathBuf) -> Self {
        Self {
            lock: FileLock::new(path),
            handle: None,
        }
    }

    /// True if this instance holds the lock.
    pub fn is_locked(&self) -> bool {
        self.handle.is_some()
    }

    /// Creates the file and acquires exclusive access.
    ///
    /// False if the lock is already held here or by another process.
    pub fn try_lock(&mut self) -> bool {
        if self.handle.is_some() {
            return false;
        }

        let Ok(handle) = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.lock.path())
        else {
            return false;
        };

        if !lock_exclusive(&handle) {
            return false;
        }

        self.handle = Some(handle);
        true
    }

    /// Releases the lock (if held) and deletes the file.
    ///
    /// True if the lock was not held, or was released and the file deleted.
    pub fn try_unlock(&mut self) -> bool {
        match self.handle.take() {
            None => true,
            Some(handle) => {
                unlock(&handle);
                drop(handle);
                self.lock.destroy()
            }
        }
    }
}

impl Drop for InterprocessLock {
    fn drop(&mut self) {
        self.try_unlock();
    }
}

#[cfg(unix)]
fn lock_exclusive(handle: &File) -> bool {
    use std::os::unix::io::AsRawFd;
    unsafe { libc::flock(handle.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) == 0 }
}

#[cfg(unix)]
fn unlock(handle: &File) {
    use std::os::unix::io::AsRawFd;
    unsafe {
        libc::flock(handle.as_raw_fd(), libc::LOCK_UN);
    }
}

#[cfg(not(unix))]
fn lock_exclusive(_handle: &File) -> bool {
    true
}

#[cfg(not(unix))]
fn unlock(_handle: &File) {}
