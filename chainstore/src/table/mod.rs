//! Table primitives: link arithmetic, heads, iteration, and the three
//! table assemblies.

pub mod arrayhead;
pub mod arraymap;
pub mod element;
pub mod hashhead;
pub mod hashmap;
pub mod iterator;
pub mod manager;
pub mod nomap;
