//! Memory-mapped, append-mostly table storage for a Bitcoin full node.
//!
//! The engine provides durable, concurrent key→value storage with O(1)
//! bucket lookup and linked-chain traversal, without a general-purpose
//! allocator and without transactions. Each table is a pair of files: a
//! *head* of bucket slots and a *body* of element bytes, both memory
//! mapped and grown in place. Elements are appended, then published with a
//! single bucket-slot store; nothing is ever rewritten.
//!
//! Three assemblies cover the access patterns:
//!
//! * [`Hashmap`]: keyed elements chained per hash bucket (headers,
//!   transactions, points);
//! * [`Nomap`]: dense ordinal records with no key at all (height indexes);
//! * [`Arraymap`]: ordinal-keyed variable-size slabs (filters).
//!
//! The [`Store`] coordinates the set of tables: creation, locking against
//! other processes, snapshots, clean shutdown, and recovery after a dirty
//! one. Chain schemas (the element types for headers, transactions,
//! inputs, outputs, and the rest) live above this crate, parameterizing
//! the assemblies by link width, key width, and payload size.
//!
//! Most mutation never blocks readers: a body grows in page-aligned steps,
//! and only the rare remap takes the exclusive lock that waits for
//! outstanding readers. The re-entrancy rule that follows is documented on
//! [`Iter`] and [`Access`]: never write to a table on the thread that holds
//! one of its read windows.

#![forbid(unused_must_use)]
#![warn(missing_docs)]

mod error;
pub mod file;
pub mod keys;
mod link;
mod locks;
mod memory;
mod settings;
mod store;
pub mod table;

#[cfg(test)]
mod tests;

pub use error::{Error, Result};
pub use link::{Link, SLAB};
pub use locks::{FileLock, FlushLock, InterprocessLock};
pub use memory::access::Access;
pub use memory::map::MemoryMap;
pub use memory::reader::Reader;
pub use memory::writer::{Finalizer, Writer};
pub use settings::Settings;
pub use store::{Store, Table, TABLE_NAMES};
pub use table::arraymap::Arraymap;
pub use table::element::Element;
pub use table::hashmap::Hashmap;
pub use table::iterator::Iter;
pub use table::nomap::Nomap;
