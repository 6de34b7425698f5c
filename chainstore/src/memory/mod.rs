//! Memory-mapped storage: the map, scoped accessors, and byte streams.

pub mod access;
pub mod map;
pub mod reader;
pub mod writer;
