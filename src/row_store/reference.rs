//! Row handles and column references

use super::allocator::MatchDocAllocator;
use super::value::{ColumnType, ValueType};
use crate::identifiers::AllocatorId;
use std::fmt::{self, Display, Formatter};
use std::marker::PhantomData;

/// Handle to one row inside a [`MatchDocAllocator`]
///
/// A MatchDoc owns nothing. It is only meaningful together with the allocator whose
/// id it carries, and becomes dangling once that allocator is consumed or dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MatchDoc {
    allocator: AllocatorId,
    slot: u32,
}

impl MatchDoc {
    pub(crate) fn new(allocator: AllocatorId, slot: u32) -> Self {
        Self { allocator, slot }
    }

    pub fn allocator_id(&self) -> AllocatorId {
        self.allocator
    }

    pub fn slot(&self) -> u32 {
        self.slot
    }

    pub(crate) fn index(&self) -> usize {
        self.slot as usize
    }
}

impl Display for MatchDoc {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.allocator, self.slot)
    }
}

/// Untyped description of a declared column
///
/// Obtained from [`MatchDocAllocator::find_reference_without_type`] or the
/// serialize-level listing. Use [`ReferenceBase::typed`] for checked access.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReferenceBase {
    pub(crate) name: String,
    pub(crate) value_type: ValueType,
    pub(crate) column: usize,
    pub(crate) allocator: AllocatorId,
    pub(crate) serialize_level: u8,
}

impl ReferenceBase {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn serialize_level(&self) -> u8 {
        self.serialize_level
    }

    pub fn allocator_id(&self) -> AllocatorId {
        self.allocator
    }

    /// Checked downcast to a typed reference
    pub fn typed<T: ColumnType>(&self) -> Option<Reference<T>> {
        (self.value_type == T::VALUE_TYPE).then(|| Reference {
            name: self.name.clone(),
            column: self.column,
            allocator: self.allocator,
            _marker: PhantomData,
        })
    }
}

/// Typed accessor for one named column of an allocator
#[derive(Debug)]
pub struct Reference<T> {
    pub(crate) name: String,
    pub(crate) column: usize,
    pub(crate) allocator: AllocatorId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Reference<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            column: self.column,
            allocator: self.allocator,
            _marker: PhantomData,
        }
    }
}

impl<T: ColumnType> Reference<T> {
    pub(crate) fn new(name: String, column: usize, allocator: AllocatorId) -> Self {
        Self {
            name,
            column,
            allocator,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_type(&self) -> ValueType {
        T::VALUE_TYPE
    }

    pub fn allocator_id(&self) -> AllocatorId {
        self.allocator
    }

    /// Read this column for `doc`
    pub fn get<'a>(&self, allocator: &'a MatchDocAllocator, doc: MatchDoc) -> Option<&'a T> {
        allocator.get(self, doc)
    }

    /// Mutable access to this column for `doc`
    pub fn get_mut<'a>(&self, allocator: &'a mut MatchDocAllocator, doc: MatchDoc) -> Option<&'a mut T> {
        allocator.get_mut(self, doc)
    }

    /// Overwrite this column for `doc`, returning false if the handle is not valid
    pub fn set(&self, allocator: &mut MatchDocAllocator, doc: MatchDoc, value: T) -> bool {
        allocator.set(self, doc, value)
    }
}
