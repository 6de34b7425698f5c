//! The element serialization contract.

use crate::memory::reader::Reader;
use crate::memory::writer::Writer;

/// A value stored in a table body.
///
/// Tables are parameterized by element types rather than schemas: the table
/// allocates what [`count`](Self::count) asks for, streams the payload
/// through [`to_data`](Self::to_data), and reconstructs it with
/// [`from_data`](Self::from_data). Chain-specific element types live with
/// their tables, outside the engine.
pub trait Element: Sized {
    /// Allocation size: the number of records for a record table, or the
    /// total byte count (next link plus key plus payload) for a slab
    /// table.
    fn count(&self) -> usize;

    /// Serializes the payload; false invalidates the element, which is then
    /// never published.
    fn to_data(&self, sink: &mut Writer<'_, '_>) -> bool;

    /// Deserializes a payload; `None` reports the element absent.
    fn from_data(source: &mut Reader<'_, '_>) -> Option<Self>;
}
