//! Store lifecycle: table registry, locks, snapshots, and recovery.

use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};
use tracing::{debug, trace_span, warn};

use crate::error::{Error, Result};
use crate::file;
use crate::locks::{FlushLock, InterprocessLock};
use crate::memory::map::MemoryMap;
use crate::settings::Settings;
use crate::table::arraymap::Arraymap;
use crate::table::hashmap::Hashmap;
use crate::table::nomap::Nomap;

/// The chain tables a full node registers, in registration order.
///
/// The names are stable identifiers: they appear in the store's file names
/// and must never change across versions.
pub const TABLE_NAMES: [&str; 18] = [
    "archive_header",
    "archive_tx",
    "archive_txs",
    "archive_input",
    "archive_output",
    "archive_point",
    "archive_ins",
    "archive_outs",
    "candidate",
    "confirmed",
    "strong_tx",
    "validated_bk",
    "validated_tx",
    "address",
    "filter_bk",
    "filter_tx",
    "duplicate",
    "prevout",
];

/// Lifecycle hooks a registered table exposes to the store.
///
/// The typed assemblies implement this; the store drives it during
/// create/open/snapshot/close and recovery. All methods are not thread
/// safe with respect to queries and are called with writes paused.
pub trait Table: Send + Sync {
    /// Formats the table's (empty, loaded) head file.
    fn create(&self) -> bool;
    /// Checks head-file size and recorded body count consistency.
    fn verify(&self) -> bool;
    /// Records the current body count into the head.
    fn backup(&self) -> bool;
    /// Truncates the body to the recorded count.
    fn restore(&self) -> bool;
    /// The first latched fault on the table's files.
    fn get_fault(&self) -> Option<Error>;
}

impl<const N: usize, const K: usize, const S: usize> Table for Hashmap<N, K, S> {
    fn create(&self) -> bool {
        Hashmap::create(self)
    }
    fn verify(&self) -> bool {
        Hashmap::verify(self)
    }
    fn backup(&self) -> bool {
        Hashmap::backup(self)
    }
    fn restore(&self) -> bool {
        Hashmap::restore(self)
    }
    fn get_fault(&self) -> Option<Error> {
        Hashmap::get_fault(self)
    }
}

impl<const N: usize, const S: usize> Table for Nomap<N, S> {
    fn create(&self) -> bool {
        Nomap::create(self)
    }
    fn verify(&self) -> bool {
        Nomap::verify(self)
    }
    fn backup(&self) -> bool {
        Nomap::backup(self)
    }
    fn restore(&self) -> bool {
        Nomap::restore(self)
    }
    fn get_fault(&self) -> Option<Error> {
        Nomap::get_fault(self)
    }
}

impl<const N: usize, const S: usize> Table for Arraymap<N, S> {
    fn create(&self) -> bool {
        Arraymap::create(self)
    }
    fn verify(&self) -> bool {
        Arraymap::verify(self)
    }
    fn backup(&self) -> bool {
        Arraymap::backup(self)
    }
    fn restore(&self) -> bool {
        Arraymap::restore(self)
    }
    fn get_fault(&self) -> Option<Error> {
        Arraymap::get_fault(self)
    }
}

struct Entry {
    name: String,
    head: Arc<MemoryMap>,
    body: Arc<MemoryMap>,
    table: Box<dyn Table>,
}

/// The set of tables under one directory, with the locks that guard them.
///
/// Register every table, then `create` (new store) or `open` (existing).
/// Typed table handles stay with the caller; the store keeps lifecycle
/// hooks. A second process opening the same directory fails its process
/// lock; a crashed previous session is detected by its flush sentinel and
/// recovered from the most recent snapshot.
pub struct Store {
    settings: Settings,
    tables: Vec<Entry>,
    flush_lock: FlushLock,
    process_lock: InterprocessLock,
    transactor: RwLock<()>,
}

impl Store {
    /// A store over `settings` with no tables registered yet.
    pub fn new(settings: Settings) -> Self {
        let flush_lock = FlushLock::new(settings.flush_lock());
        let process_lock = InterprocessLock::new(settings.process_lock());
        Self {
            settings,
            tables: Vec::new(),
            flush_lock,
            process_lock,
            transactor: RwLock::new(()),
        }
    }

    /// The store's configuration.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Registers a table before `create`/`open`.
    ///
    /// The store derives the head and body files from the table name and
    /// hands them to `build`, which assembles the typed table. The caller
    /// keeps the returned handle for queries; the store retains a clone for
    /// lifecycle operations.
    pub fn register<T, F>(&mut self, name: &str, build: F) -> T
    where
        T: Table + Clone + 'static,
        F: FnOnce(Arc<MemoryMap>, Arc<MemoryMap>) -> T,
    {
        let head = Arc::new(MemoryMap::new(
            self.settings.head_file(name),
            self.settings.minimum,
            self.settings.expansion,
        ));
        let body = Arc::new(MemoryMap::new(
            self.settings.body_file(name),
            self.settings.minimum,
            self.settings.expansion,
        ));
        let table = build(head.clone(), body.clone());
        self.tables.push(Entry {
            name: name.to_string(),
            head,
            body,
            table: Box::new(table.clone()),
        });
        table
    }

    /// Shared transactor guard.
    ///
    /// Writers hold this for the duration of a logical write so `snapshot`
    /// (which takes it exclusive) observes a consistent point between
    /// writes, never inside one.
    pub fn transactor(&self) -> RwLockReadGuard<'_, ()> {
        self.transactor.read()
    }

    /// Creates the directory tree and formats every table.
    ///
    /// **Destroys any existing store under the same directory.** Leaves the
    /// store closed; follow with `open`.
    pub fn create(&mut self) -> Result<()> {
        let _span = trace_span!("store_create").entered();

        if !file::create_directory(&self.settings.directory) {
            return Err(Error::MissingDirectory);
        }
        if !file::clear_directory(&self.settings.primary())
            || !file::clear_directory(&self.settings.temporary())
        {
            return Err(Error::ClearDirectory);
        }
        // A snapshot of another store generation is stale.
        if !file::remove_tree(&self.settings.secondary()) {
            return Err(Error::ClearDirectory);
        }

        for entry in &self.tables {
            entry.head.open()?;
            entry.head.load()?;
            entry.body.open()?;
            entry.body.load()?;
            if !entry.table.create() {
                return Err(Error::CreateTable(entry.name.clone()));
            }
            entry.head.unload()?;
            entry.head.close()?;
            entry.body.unload()?;
            entry.body.close()?;
            debug!(table = %entry.name, "table created");
        }
        Ok(())
    }

    /// Acquires the locks, loads every table, and recovers from a dirty
    /// shutdown if the flush sentinel is present.
    pub fn open(&mut self) -> Result<()> {
        let _span = trace_span!("store_open").entered();

        if !file::is_directory(&self.settings.primary()) {
            return Err(Error::MissingDirectory);
        }
        if !self.process_lock.try_lock() {
            return Err(Error::ProcessLock);
        }

        let dirty = self.flush_lock.is_locked();
        if dirty {
            warn!("flush sentinel present, recovering from dirty shutdown");
            if let Err(error) = self.promote_snapshot() {
                self.process_lock.try_unlock();
                return Err(error);
            }
        } else if !self.flush_lock.try_lock() {
            self.process_lock.try_unlock();
            return Err(Error::FlushLock);
        }

        if let Err(error) = self.open_tables(dirty) {
            self.unload_tables();
            if !dirty {
                self.flush_lock.try_unlock();
            }
            self.process_lock.try_unlock();
            return Err(error);
        }
        Ok(())
    }

    /// Pauses writes and records a consistent point across every table.
    ///
    /// Records body counts into the heads, flushes everything, and swaps a
    /// copy of the head files into `secondary/` (staged in `temporary/`).
    pub fn snapshot(&mut self) -> Result<()> {
        let _span = trace_span!("store_snapshot").entered();
        let _exclusive = self.transactor.write();

        for entry in &self.tables {
            if !entry.table.backup() {
                return Err(Error::BackupTable(entry.name.clone()));
            }
        }
        for entry in &self.tables {
            entry.body.flush()?;
            entry.head.flush()?;
        }

        let temporary = self.settings.temporary();
        if !file::clear_directory(&temporary) {
            return Err(Error::ClearDirectory);
        }
        for entry in &self.tables {
            // The mapped file is capacity-padded on disk; copy the logical
            // prefix through the map rather than the raw file.
            let Some(access) = entry.head.get(0) else {
                return Err(Error::UnloadedFile);
            };
            let Some(bytes) = access.read(0, access.size()) else {
                return Err(Error::UnloadedFile);
            };
            let staged = temporary.join(self.settings.head_file_name(&entry.name));
            if !file::create_file_with(&staged, bytes) {
                return Err(Error::CopyDirectory);
            }
        }

        let secondary = self.settings.secondary();
        if !file::remove_tree(&secondary) {
            return Err(Error::ClearDirectory);
        }
        if !file::rename(&temporary, &secondary) {
            return Err(Error::RenameDirectory);
        }
        debug!("snapshot complete");
        Ok(())
    }

    /// Records body counts, flushes, unloads, and releases the locks.
    ///
    /// The flush sentinel is removed only when every table closed cleanly,
    /// so a failed close forces recovery on the next open.
    pub fn close(&mut self) -> Result<()> {
        let _span = trace_span!("store_close").entered();
        let mut result = Ok(());

        {
            let _exclusive = self.transactor.write();
            for entry in &self.tables {
                if !entry.table.backup() && result.is_ok() {
                    result = Err(Error::BackupTable(entry.name.clone()));
                }
            }
            for entry in &self.tables {
                for map in [&entry.head, &entry.body] {
                    if map.unload().and_then(|()| map.close()).is_err() && result.is_ok() {
                        result = Err(Error::CloseTable(entry.name.clone()));
                    }
                }
            }
        }

        if result.is_ok() && !self.flush_lock.try_unlock() {
            result = Err(Error::FlushUnlock);
        }
        if !self.process_lock.try_unlock() && result.is_ok() {
            result = Err(Error::ProcessUnlock);
        }
        result
    }

    /// The first latched fault across all tables.
    pub fn get_fault(&self) -> Option<Error> {
        self.tables.iter().find_map(|entry| entry.table.get_fault())
    }

    /// True while any table's volume is out of space.
    pub fn is_full(&self) -> bool {
        self.tables
            .iter()
            .any(|entry| entry.head.is_full() || entry.body.is_full())
    }

    /// Clears every table's disk-full condition.
    pub fn reset_full(&self) {
        for entry in &self.tables {
            entry.head.reset_full();
            entry.body.reset_full();
        }
    }

    /// Swaps the snapshot head files into `primary/` ahead of recovery.
    ///
    /// A crashed session leaves capacity-padded files and bucket links that
    /// run ahead of the recorded body sizes; the snapshot heads are the
    /// last consistent set. Without a snapshot the store cannot recover.
    fn promote_snapshot(&self) -> Result<()> {
        let secondary = self.settings.secondary();
        if !file::is_directory(&secondary) {
            return Err(Error::MissingSnapshot);
        }

        let temporary = self.settings.temporary();
        if !file::remove_tree(&temporary) {
            return Err(Error::ClearDirectory);
        }
        if !file::copy_directory(&secondary, &temporary) {
            return Err(Error::CopyDirectory);
        }
        for entry in &self.tables {
            if !file::is_file(&temporary.join(self.settings.head_file_name(&entry.name))) {
                return Err(Error::MissingSnapshot);
            }
        }
        for entry in &self.tables {
            let name = self.settings.head_file_name(&entry.name);
            if !file::rename(&temporary.join(&name), &self.settings.head_file(&entry.name)) {
                return Err(Error::RenameDirectory);
            }
        }
        debug!("snapshot heads promoted");
        Ok(())
    }

    fn open_tables(&self, dirty: bool) -> Result<()> {
        for entry in &self.tables {
            entry.head.open()?;
            entry.head.load()?;
            entry.body.open()?;
            entry.body.load()?;
        }
        if dirty {
            for entry in &self.tables {
                if !entry.table.restore() {
                    return Err(Error::RestoreTable(entry.name.clone()));
                }
                debug!(table = %entry.name, "body truncated to recorded size");
            }
        }
        for entry in &self.tables {
            if !entry.table.verify() {
                return Err(Error::VerifyTable(entry.name.clone()));
            }
        }
        Ok(())
    }

    fn unload_tables(&self) {
        for entry in &self.tables {
            for map in [&entry.head, &entry.body] {
                let _ = map.unload();
                let _ = map.close();
            }
        }
    }

    /// Dirty termination for recovery tests: releases the process lock but
    /// leaves the flush sentinel, the capacity-padded files, and the live
    /// mappings behind, as a killed process would.
    #[cfg(test)]
    pub(crate) fn crash(mut self) {
        self.process_lock.try_unlock();
    }
}
