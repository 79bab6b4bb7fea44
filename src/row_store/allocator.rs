//! Pool-backed columnar row allocator
//!
//! A [`MatchDocAllocator`] owns a set of named, typed columns and hands out
//! [`MatchDoc`] handles for rows. Rows are never released individually:
//! [`MatchDocAllocator::deallocate`] only tombstones the slot and puts it on a free
//! list, and everything is released at once when the allocator is dropped.
//!
//! Rows move between allocators through [`MatchDocAllocator::merge_allocator`] and
//! [`MatchDocAllocator::append_allocator`], which consume the source allocator so
//! that rows left behind can never be read again.

use super::reference::{MatchDoc, Reference, ReferenceBase};
use super::value::{ColumnData, ColumnType, ValueType};
use crate::error::MergeError;
use crate::identifiers::AllocatorId;
use crate::Result;
use rustc_hash::FxHashMap;

/// Serialize level given to columns declared without an explicit level
pub const DEFAULT_SERIALIZE_LEVEL: u8 = 1;

#[derive(Debug, Clone)]
struct Column {
    name: String,
    serialize_level: u8,
    data: ColumnData,
}

/// Columnar row store for one shard, one aggregate result, or one merged result
///
/// Cloning an allocator keeps its id, so handles from the original stay valid
/// against the clone.
#[derive(Debug, Clone)]
pub struct MatchDocAllocator {
    id: AllocatorId,
    columns: Vec<Column>,
    column_index: FxHashMap<String, usize>,
    slot_count: usize,
    deleted: Vec<bool>,
    free_slots: Vec<u32>,
}

impl Default for MatchDocAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchDocAllocator {
    /// Create an empty allocator with a fresh id
    pub fn new() -> Self {
        Self {
            id: AllocatorId::new(),
            columns: Vec::new(),
            column_index: FxHashMap::default(),
            slot_count: 0,
            deleted: Vec::new(),
            free_slots: Vec::new(),
        }
    }

    pub fn id(&self) -> AllocatorId {
        self.id
    }

    /// Declare a typed column, or return the existing one if the name is taken
    pub fn declare<T: ColumnType>(&mut self, name: &str) -> Result<Reference<T>> {
        self.declare_with_level(name, DEFAULT_SERIALIZE_LEVEL)
    }

    /// Declare a typed column with an explicit serialize level
    pub fn declare_with_level<T: ColumnType>(&mut self, name: &str, serialize_level: u8) -> Result<Reference<T>> {
        let base = self.declare_with_type(name, T::VALUE_TYPE, serialize_level)?;
        Ok(Reference::new(base.name, base.column, self.id))
    }

    /// Declare a column whose kind is only known at runtime
    pub fn declare_with_type(&mut self, name: &str, value_type: ValueType, serialize_level: u8) -> Result<ReferenceBase> {
        if let Some(&column) = self.column_index.get(name) {
            let existing = self.columns[column].data.value_type();
            if existing != value_type {
                return Err(MergeError::type_mismatch(name, value_type, existing));
            }
            return Ok(self.reference_base(column));
        }

        let mut data = ColumnData::new(value_type);
        data.resize(self.slot_count);
        self.columns.push(Column {
            name: name.to_string(),
            serialize_level,
            data,
        });
        let column = self.columns.len() - 1;
        self.column_index.insert(name.to_string(), column);
        Ok(self.reference_base(column))
    }

    /// Look up a column by name without committing to its type
    pub fn find_reference_without_type(&self, name: &str) -> Option<ReferenceBase> {
        self.column_index.get(name).map(|&column| self.reference_base(column))
    }

    /// Look up a column by name and type
    pub fn find_reference<T: ColumnType>(&self, name: &str) -> Option<Reference<T>> {
        self.find_reference_without_type(name)?.typed()
    }

    /// All columns in declaration order
    pub fn references(&self) -> Vec<ReferenceBase> {
        (0..self.columns.len()).map(|column| self.reference_base(column)).collect()
    }

    /// Columns whose serialize level is at least `level`, in declaration order
    pub fn get_all_need_serialize_references(&self, level: u8) -> Vec<ReferenceBase> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, column)| column.serialize_level >= level)
            .map(|(index, _)| self.reference_base(index))
            .collect()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Allocate a row with every column at its default value
    pub fn allocate(&mut self) -> MatchDoc {
        if let Some(slot) = self.free_slots.pop() {
            self.deleted[slot as usize] = false;
            return MatchDoc::new(self.id, slot);
        }

        let slot = self.slot_count;
        self.slot_count += 1;
        for column in &mut self.columns {
            column.data.resize(self.slot_count);
        }
        self.deleted.push(false);
        MatchDoc::new(self.id, slot as u32)
    }

    /// Tombstone a row; returns false if the handle was not live in this allocator
    pub fn deallocate(&mut self, doc: MatchDoc) -> bool {
        if !self.is_valid(doc) {
            return false;
        }
        for column in &mut self.columns {
            column.data.reset(doc.index());
        }
        self.deleted[doc.index()] = true;
        self.free_slots.push(doc.slot());
        true
    }

    /// Whether `doc` is a live row of this allocator
    pub fn is_valid(&self, doc: MatchDoc) -> bool {
        doc.allocator_id() == self.id && doc.index() < self.slot_count && !self.deleted[doc.index()]
    }

    pub fn live_count(&self) -> usize {
        self.slot_count - self.free_slots.len()
    }

    /// All live rows in slot order
    pub fn live_docs(&self) -> Vec<MatchDoc> {
        (0..self.slot_count)
            .filter(|&slot| !self.deleted[slot])
            .map(|slot| MatchDoc::new(self.id, slot as u32))
            .collect()
    }

    pub fn get<T: ColumnType>(&self, reference: &Reference<T>, doc: MatchDoc) -> Option<&T> {
        if reference.allocator != self.id || !self.is_valid(doc) {
            return None;
        }
        T::values(&self.columns.get(reference.column)?.data)?.get(doc.index())
    }

    pub fn get_mut<T: ColumnType>(&mut self, reference: &Reference<T>, doc: MatchDoc) -> Option<&mut T> {
        if reference.allocator != self.id || !self.is_valid(doc) {
            return None;
        }
        T::values_mut(&mut self.columns.get_mut(reference.column)?.data)?.get_mut(doc.index())
    }

    pub fn set<T: ColumnType>(&mut self, reference: &Reference<T>, doc: MatchDoc, value: T) -> bool {
        match self.get_mut(reference, doc) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Mutable access to `dst` and shared access to `src` in the same column
    ///
    /// Returns None when either handle is invalid or both name the same row.
    pub fn get_pair_mut<T: ColumnType>(
        &mut self,
        reference: &Reference<T>,
        dst: MatchDoc,
        src: MatchDoc,
    ) -> Option<(&mut T, &T)> {
        if reference.allocator != self.id || !self.is_valid(dst) || !self.is_valid(src) || dst == src {
            return None;
        }
        let values = T::values_mut(&mut self.columns.get_mut(reference.column)?.data)?;
        let (d, s) = (dst.index(), src.index());
        if d < s {
            let (left, right) = values.split_at_mut(s);
            Some((&mut left[d], &right[0]))
        } else {
            let (left, right) = values.split_at_mut(d);
            Some((&mut right[0], &left[s]))
        }
    }

    /// Whether both allocators declare the same columns, in the same order, with the same kinds
    pub fn is_same_schema(&self, other: &MatchDocAllocator) -> bool {
        self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(&other.columns)
                .all(|(a, b)| a.name == b.name && a.data.value_type() == b.data.value_type())
    }

    /// Check whether rows of `other` can be imported into this allocator
    ///
    /// An allocator with no columns and no live rows adopts any schema. Otherwise a
    /// strict import needs identical schemas, and an append-only import needs every
    /// column of this allocator to exist in `other` with the same kind.
    pub fn check_mergeable(&self, other: &MatchDocAllocator, append_only: bool) -> Result<()> {
        if self.adopts_schema() {
            return Ok(());
        }

        if !append_only {
            if self.is_same_schema(other) {
                return Ok(());
            }
            return Err(MergeError::AllocatorMerge(format!(
                "schema mismatch: target has [{}], source has [{}]",
                self.schema_summary(),
                other.schema_summary()
            )));
        }

        for column in &self.columns {
            match other.column_index.get(&column.name) {
                Some(&index) if other.columns[index].data.value_type() == column.data.value_type() => {}
                Some(&index) => {
                    return Err(MergeError::AllocatorMerge(format!(
                        "column '{}' is {} in target but {} in source",
                        column.name,
                        column.data.value_type(),
                        other.columns[index].data.value_type()
                    )))
                }
                None => {
                    return Err(MergeError::AllocatorMerge(format!(
                        "source allocator is missing column '{}'",
                        column.name
                    )))
                }
            }
        }
        Ok(())
    }

    /// Import `docs` from `other`, which must have an identical schema
    ///
    /// Returns the new handles, in the same order as `docs`. The source allocator
    /// is consumed.
    pub fn merge_allocator(&mut self, other: MatchDocAllocator, docs: &[MatchDoc]) -> Result<Vec<MatchDoc>> {
        self.import_rows(other, docs, false)
    }

    /// Import `docs` from `other`, appending any columns this allocator lacks
    pub fn append_allocator(&mut self, other: MatchDocAllocator, docs: &[MatchDoc]) -> Result<Vec<MatchDoc>> {
        self.import_rows(other, docs, true)
    }

    fn import_rows(&mut self, mut other: MatchDocAllocator, docs: &[MatchDoc], append_only: bool) -> Result<Vec<MatchDoc>> {
        // A clone shares its id with the original; give the source its own id
        // and rewrite the handles that point at it.
        let rehomed: Vec<MatchDoc>;
        let docs = if other.id == self.id {
            other.id = AllocatorId::new();
            tracing::trace!("Source allocator shares id {}, importing as {}", self.id, other.id);
            rehomed = docs.iter().map(|doc| MatchDoc::new(other.id, doc.index() as u32)).collect();
            &rehomed[..]
        } else {
            docs
        };
        self.check_mergeable(&other, append_only)?;
        if let Some(doc) = docs.iter().find(|doc| !other.is_valid(**doc)) {
            return Err(MergeError::InvalidMatchDoc(format!(
                "{} is not a live row of source allocator {}",
                doc, other.id
            )));
        }

        // Extend the schema with source-only columns; a schema-less target adopts all of them.
        for column in &other.columns {
            if !self.column_index.contains_key(&column.name) {
                self.declare_with_type(&column.name, column.data.value_type(), column.serialize_level)?;
            }
        }

        let mapping: Vec<(usize, usize)> = self
            .columns
            .iter()
            .enumerate()
            .filter_map(|(dst, column)| other.column_index.get(&column.name).map(|&src| (dst, src)))
            .collect();

        let mut imported = Vec::with_capacity(docs.len());
        for &doc in docs {
            let new_doc = self.allocate();
            for &(dst, src) in &mapping {
                self.columns[dst]
                    .data
                    .move_from(new_doc.index(), &mut other.columns[src].data, doc.index())?;
            }
            imported.push(new_doc);
        }

        tracing::trace!(
            "Imported {} rows from allocator {} into {}",
            imported.len(),
            other.id,
            self.id
        );
        Ok(imported)
    }

    fn adopts_schema(&self) -> bool {
        self.columns.is_empty() && self.live_count() == 0
    }

    fn schema_summary(&self) -> String {
        self.columns
            .iter()
            .map(|c| format!("{}:{}", c.name, c.data.value_type()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn reference_base(&self, column: usize) -> ReferenceBase {
        let entry = &self.columns[column];
        ReferenceBase {
            name: entry.name.clone(),
            value_type: entry.data.value_type(),
            column,
            allocator: self.id,
            serialize_level: entry.serialize_level,
        }
    }
}
