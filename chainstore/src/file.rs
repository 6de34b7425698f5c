//! Filesystem utilities for store and table files.
//!
//! These return `bool`/`Option` in the style of the rest of the engine:
//! callers translate failures into the appropriate error code with the
//! context (which table, which phase) that this layer does not have.

use std::fs::{self, File};
use std::path::Path;

/// True only if the directory exists.
pub fn is_directory(path: &Path) -> bool {
    path.is_dir()
}

/// Creates the directory and any missing parents.
pub fn create_directory(path: &Path) -> bool {
    fs::create_dir_all(path).is_ok()
}

/// Clears and recreates the directory; true if it ends up empty.
pub fn clear_directory(path: &Path) -> bool {
    if path.is_dir() && fs::remove_dir_all(path).is_err() {
        return false;
    }
    fs::create_dir_all(path).is_ok()
}

/// True only if the file exists.
pub fn is_file(path: &Path) -> bool {
    path.is_file()
}

/// Creates (or truncates) an empty file.
pub fn create_file(path: &Path) -> bool {
    File::create(path).is_ok()
}

/// Creates (or replaces) a file with the given contents.
pub fn create_file_with(path: &Path, data: &[u8]) -> bool {
    fs::write(path, data).is_ok()
}

/// Deletes a file or empty directory; false on error only (absence is ok).
pub fn remove(path: &Path) -> bool {
    if path.is_dir() {
        fs::remove_dir(path).is_ok()
    } else if path.is_file() {
        fs::remove_file(path).is_ok()
    } else {
        true
    }
}

/// Deletes a directory tree; false on error only (absence is ok).
pub fn remove_tree(path: &Path) -> bool {
    if path.is_dir() {
        fs::remove_dir_all(path).is_ok()
    } else {
        true
    }
}

/// Renames a file or directory, replacing any file at the destination.
pub fn rename(from: &Path, to: &Path) -> bool {
    fs::rename(from, to).is_ok()
}

/// Copies a file; false if the source is missing or the target exists.
pub fn copy(from: &Path, to: &Path) -> bool {
    if to.exists() {
        return false;
    }
    fs::copy(from, to).is_ok()
}

/// Copies a directory's files (non-recursively); false if the target exists.
pub fn copy_directory(from: &Path, to: &Path) -> bool {
    if !from.is_dir() || to.exists() || !create_directory(to) {
        return false;
    }
    let Ok(entries) = fs::read_dir(from) else {
        return false;
    };
    for entry in entries {
        let Ok(entry) = entry else {
            return false;
        };
        let source = entry.path();
        if !source.is_file() {
            continue;
        }
        let Some(name) = source.file_name() else {
            return false;
        };
        if fs::copy(&source, to.join(name)).is_err() {
            return false;
        }
    }
    true
}

/// The size of a file in bytes.
pub fn size(path: &Path) -> Option<u64> {
    fs::metadata(path).ok().map(|metadata| metadata.len())
}

/// Free space on the volume holding `path`, in bytes.
#[cfg(unix)]
pub fn space(path: &Path) -> Option<u64> {
    use std::os::unix::ffi::OsStrExt;

    let name = std::ffi::CString::new(path.as_os_str().as_bytes()).ok()?;
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    if unsafe { libc::statvfs(name.as_ptr(), &mut stat) } != 0 {
        return None;
    }
    Some(stat.f_bavail as u64 * stat.f_frsize as u64)
}

/// Free space on the volume holding `path`, in bytes.
#[cfg(not(unix))]
pub fn space(_path: &Path) -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directories_create_clear_and_remove() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("a").join("b");

        assert!(!is_directory(&nested));
        assert!(create_directory(&nested));
        assert!(is_directory(&nested));

        assert!(create_file_with(&nested.join("x"), b"x"));
        assert!(clear_directory(&nested));
        assert!(is_directory(&nested));
        assert!(!is_file(&nested.join("x")));

        assert!(remove(&nested));
        assert!(!is_directory(&nested));
        assert!(remove(&nested), "removing an absent path is not an error");
    }

    #[test]
    fn files_round_trip() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join("file.data");

        assert!(create_file_with(&path, &[1, 2, 3]));
        assert_eq!(size(&path), Some(3));

        let target = root.path().join("copy.data");
        assert!(copy(&path, &target));
        assert!(!copy(&path, &target), "copy refuses an existing target");
        assert_eq!(size(&target), Some(3));

        let renamed = root.path().join("renamed.data");
        assert!(rename(&target, &renamed));
        assert!(is_file(&renamed));
        assert!(!is_file(&target));
    }

    #[test]
    fn copy_directory_copies_files() {
        let root = tempfile::tempdir().unwrap();
        let from = root.path().join("from");
        let to = root.path().join("to");

        assert!(create_directory(&from));
        assert!(create_file_with(&from.join("one"), b"1"));
        assert!(create_file_with(&from.join("two"), b"22"));

        assert!(copy_directory(&from, &to));
        assert_eq!(size(&to.join("one")), Some(1));
        assert_eq!(size(&to.join("two")), Some(2));
        assert!(!copy_directory(&from, &to), "target must not exist");
    }

    #[cfg(unix)]
    #[test]
    fn space_reports_nonzero() {
        let root = tempfile::tempdir().unwrap();
        assert!(space(root.path()).unwrap() > 0);
    }
}
