//! Store configuration.

use std::path::PathBuf;

/// Store directory and map growth policy.
///
/// `minimum` is the smallest capacity any table file is mapped at;
/// `expansion` is the percentage of headroom added when a body grows. Both
/// are deliberately coarse: per-table tuning belongs to the schema layer
/// that registers the tables.
#[derive(Clone, Debug)]
pub struct Settings {
    /// The store root directory.
    pub directory: PathBuf,
    /// Minimum mapped capacity per file, in bytes.
    pub minimum: usize,
    /// Growth headroom, in percent of the required size.
    pub expansion: usize,
}

impl Settings {
    /// Settings rooted at `directory` with default growth policy.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            minimum: 4096,
            expansion: 50,
        }
    }

    /// Overrides the minimum mapped capacity.
    pub fn with_minimum(mut self, minimum: usize) -> Self {
        self.minimum = minimum;
        self
    }

    /// Overrides the growth headroom percentage.
    pub fn with_expansion(mut self, expansion: usize) -> Self {
        self.expansion = expansion;
        self
    }

    /// The live table directory.
    pub fn primary(&self) -> PathBuf {
        self.directory.join("primary")
    }

    /// The snapshot directory.
    pub fn secondary(&self) -> PathBuf {
        self.directory.join("secondary")
    }

    /// The staging directory for atomic snapshot swaps.
    pub fn temporary(&self) -> PathBuf {
        self.directory.join("temporary")
    }

    /// The crashed-dirty sentinel path.
    pub fn flush_lock(&self) -> PathBuf {
        self.directory.join("flush.lock")
    }

    /// The process-ownership lock path.
    pub fn process_lock(&self) -> PathBuf {
        self.directory.join("process.lock")
    }

    /// A table's head file name.
    pub fn head_file_name(&self, table: &str) -> String {
        format!("{table}.head")
    }

    /// A table's body file name.
    pub fn body_file_name(&self, table: &str) -> String {
        format!("{table}.data")
    }

    /// A table's live head file path.
    pub fn head_file(&self, table: &str) -> PathBuf {
        self.primary().join(self.head_file_name(table))
    }

    /// A table's live body file path.
    pub fn body_file(&self, table: &str) -> PathBuf {
        self.primary().join(self.body_file_name(table))
    }
}
