//! The engine's error taxonomy.
//!
//! Two kinds of failure exist. Local, recoverable conditions (a key that is
//! not present, a terminal link, a short read) are expressed as `Option` or
//! `bool` results at the call site and never appear here. Store-fatal
//! conditions are values of [`Error`]: the first one observed by a memory map
//! is latched on that map and reported by `get_fault` forever after.

/// Convenience alias for results carrying [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Storage engine error codes.
///
/// The names are the contract; callers must not rely on discriminant values.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    // general
    /// An operation was invoked from an invalid state.
    #[error("unknown state")]
    UnknownState,
    /// On-disk state is inconsistent with recorded sizes.
    #[error("store integrity violation")]
    Integrity,

    // memory map
    /// `open` called on a map that is already open.
    #[error("file is already open")]
    OpenOpen,
    /// The backing file could not be opened or created.
    #[error("failed to open file")]
    OpenFailure,
    /// The backing file size could not be read.
    #[error("failed to read file size")]
    SizeFailure,
    /// `close` called while the map is still loaded.
    #[error("close requires an unloaded map")]
    CloseLoaded,
    /// `load` called on a map that is already loaded.
    #[error("map is already loaded")]
    LoadLoaded,
    /// The mapping could not be established.
    #[error("failed to load memory map")]
    LoadFailure,
    /// `flush` called on a map that is not loaded.
    #[error("flush requires a loaded map")]
    FlushUnloaded,
    /// The mapping could not be released.
    #[error("failed to unload memory map")]
    UnloadFailure,

    // os
    /// The volume backing the store is out of space.
    #[error("disk full")]
    DiskFull,
    /// mmap(2) failed.
    #[error("memory map failure")]
    MmapFailure,
    /// munmap(2) failed.
    #[error("memory unmap failure")]
    MunmapFailure,
    /// ftruncate(2) failed.
    #[error("file resize failure")]
    FtruncateFailure,
    /// fsync(2)/msync(2) failed.
    #[error("file sync failure")]
    FsyncFailure,

    // locks
    /// The transactor lock could not be taken.
    #[error("transactor lock failure")]
    TransactorLock,
    /// Another process owns the store.
    #[error("process lock failure")]
    ProcessLock,
    /// The flush sentinel could not be created.
    #[error("flush lock failure")]
    FlushLock,
    /// The flush sentinel could not be removed.
    #[error("flush unlock failure")]
    FlushUnlock,
    /// The process lock could not be released.
    #[error("process unlock failure")]
    ProcessUnlock,

    // filesystem
    /// An expected directory does not exist and could not be created.
    #[error("missing directory")]
    MissingDirectory,
    /// A directory could not be cleared.
    #[error("failed to clear directory")]
    ClearDirectory,
    /// A file or directory rename failed.
    #[error("failed to rename directory")]
    RenameDirectory,
    /// A file or directory copy failed.
    #[error("failed to copy directory")]
    CopyDirectory,

    // store
    /// Recovery required a snapshot that does not exist.
    #[error("missing snapshot")]
    MissingSnapshot,
    /// A store operation touched a file that is not loaded.
    #[error("file is not loaded")]
    UnloadedFile,

    // tables
    /// Table creation failed.
    #[error("failed to create table {0}")]
    CreateTable(String),
    /// Table close failed.
    #[error("failed to close table {0}")]
    CloseTable(String),
    /// Recording a table's body size failed.
    #[error("failed to back up table {0}")]
    BackupTable(String),
    /// Restoring a table to its recorded body size failed.
    #[error("failed to restore table {0}")]
    RestoreTable(String),
    /// A table's head file failed verification.
    #[error("failed to verify table {0}")]
    VerifyTable(String),
}
