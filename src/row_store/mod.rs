//! In-memory columnar row store
//!
//! Rows are addressed by [`MatchDoc`] handles and read through typed [`Reference`]s.
//! Every row belongs to exactly one [`MatchDocAllocator`]; merging moves rows between
//! allocators instead of copying handles.

pub mod allocator;
pub mod arena;
pub mod reference;
pub mod value;

pub use allocator::{MatchDocAllocator, DEFAULT_SERIALIZE_LEVEL};
pub use arena::{Arena, ArenaSnapshot, ArenaStatistics};
pub use reference::{MatchDoc, Reference, ReferenceBase};
pub use value::{ColumnData, ColumnType, ValueType};
