//! Group-by aggregate results
//!
//! An [`AggregateResult`] holds one group-by dimension: a set of rows, one per group
//! key, each carrying the group key plus one column per aggregate function in
//! declaration order. [`AggResultReader`] gives typed read access by group key.
//!
//! # Usage Examples
//!
//! ```rust
//! use shardmerge::aggregate::{AggregateResult, AggResultReader};
//! use shardmerge::row_store::ValueType;
//!
//! let mut result = AggregateResult::builder("user_id")
//!     .function("sum", "price", ValueType::Int64)
//!     .function("count", "", ValueType::Int64)
//!     .build()?;
//!
//! let row = result.add_group("user1");
//! result.set_fun_value(row, 0, 4444i64);
//! result.set_fun_value(row, 1, 111i64);
//!
//! let reader = AggResultReader::new(&result);
//! assert_eq!(reader.get::<i64>("user1", 0), Some(&4444));
//! # Ok::<(), shardmerge::error::MergeError>(())
//! ```

use crate::error::MergeError;
use crate::row_store::{ColumnType, MatchDoc, MatchDocAllocator, Reference, ReferenceBase, ValueType};
use crate::sketch::HllSketch;
use crate::Result;
use std::collections::BTreeMap;

/// Name of the reserved group-key column
pub const GROUP_KEY_COLUMN: &str = "__group_key";

/// One group-by dimension's key → row set
#[derive(Debug, Clone)]
pub struct AggregateResult {
    group_expr_str: String,
    fun_names: Vec<String>,
    fun_params: Vec<String>,
    allocator: MatchDocAllocator,
    docs: Vec<MatchDoc>,
    key_map: BTreeMap<String, MatchDoc>,
}

impl AggregateResult {
    pub fn builder(group_expr: impl Into<String>) -> AggregateResultBuilder {
        AggregateResultBuilder {
            group_expr: group_expr.into(),
            functions: Vec::new(),
        }
    }

    /// Assemble a result from already populated parts
    ///
    /// No validation happens here; see [`AggregateResult::validate`].
    pub fn from_parts(
        group_expr_str: impl Into<String>,
        fun_names: Vec<String>,
        fun_params: Vec<String>,
        allocator: MatchDocAllocator,
        docs: Vec<MatchDoc>,
    ) -> Self {
        let mut result = Self {
            group_expr_str: group_expr_str.into(),
            fun_names,
            fun_params,
            allocator,
            docs,
            key_map: BTreeMap::new(),
        };
        result.construct_group_value_map();
        result
    }

    pub fn group_expr_str(&self) -> &str {
        &self.group_expr_str
    }

    pub fn fun_names(&self) -> &[String] {
        &self.fun_names
    }

    pub fn fun_params(&self) -> &[String] {
        &self.fun_params
    }

    pub fn fun_count(&self) -> usize {
        self.fun_names.len()
    }

    /// Number of group rows
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn docs(&self) -> &[MatchDoc] {
        &self.docs
    }

    pub fn allocator(&self) -> &MatchDocAllocator {
        &self.allocator
    }

    pub(crate) fn allocator_mut(&mut self) -> &mut MatchDocAllocator {
        &mut self.allocator
    }

    pub fn key_map(&self) -> &BTreeMap<String, MatchDoc> {
        &self.key_map
    }

    pub fn group_key_reference(&self) -> Option<Reference<String>> {
        self.allocator.find_reference(GROUP_KEY_COLUMN)
    }

    /// Function-result columns in declaration order, group key excluded
    pub fn fun_references(&self) -> Vec<ReferenceBase> {
        self.allocator
            .references()
            .into_iter()
            .filter(|reference| reference.name() != GROUP_KEY_COLUMN)
            .collect()
    }

    /// Append a row for `key` with default function values
    pub fn add_group(&mut self, key: &str) -> MatchDoc {
        let doc = self.allocator.allocate();
        if let Some(reference) = self.group_key_reference() {
            reference.set(&mut self.allocator, doc, key.to_string());
        }
        self.docs.push(doc);
        self.key_map.insert(key.to_string(), doc);
        doc
    }

    /// Set function `fun_index` of `doc`; false if the column has another type
    pub fn set_fun_value<T: ColumnType>(&mut self, doc: MatchDoc, fun_index: usize, value: T) -> bool {
        match self.fun_reference::<T>(fun_index) {
            Some(reference) => reference.set(&mut self.allocator, doc, value),
            None => false,
        }
    }

    /// Typed reference to function column `fun_index`
    pub fn fun_reference<T: ColumnType>(&self, fun_index: usize) -> Option<Reference<T>> {
        self.fun_references().get(fun_index)?.typed()
    }

    /// Check the row invariant against the query's declared function count
    pub fn validate(&self, expected_fun_count: usize) -> Result<()> {
        if self.fun_names.len() != expected_fun_count {
            return Err(MergeError::Aggregation(format!(
                "'{}' declares {} functions, query expects {}",
                self.group_expr_str,
                self.fun_names.len(),
                expected_fun_count
            )));
        }
        if self.fun_params.len() != self.fun_names.len() {
            return Err(MergeError::Aggregation(format!(
                "'{}' has {} function names but {} parameters",
                self.group_expr_str,
                self.fun_names.len(),
                self.fun_params.len()
            )));
        }
        if self.group_key_reference().is_none() {
            return Err(MergeError::Aggregation(format!(
                "'{}' has no string group key column",
                self.group_expr_str
            )));
        }
        let columns = self.fun_references().len();
        if columns != self.fun_names.len() {
            return Err(MergeError::Aggregation(format!(
                "'{}' has {} function columns for {} functions",
                self.group_expr_str,
                columns,
                self.fun_names.len()
            )));
        }
        Ok(())
    }

    /// Rebuild the key → row map from the current row list
    pub fn construct_group_value_map(&mut self) {
        self.key_map.clear();
        let Some(reference) = self.group_key_reference() else {
            return;
        };
        for &doc in &self.docs {
            if let Some(key) = self.allocator.get(&reference, doc) {
                self.key_map.insert(key.clone(), doc);
            }
        }
    }

    pub(crate) fn set_docs(&mut self, docs: Vec<MatchDoc>) {
        self.docs = docs;
        self.construct_group_value_map();
    }

    /// Give up the rows, consuming the result
    pub(crate) fn into_rows(self) -> (MatchDocAllocator, Vec<MatchDoc>) {
        (self.allocator, self.docs)
    }
}

/// Builder declaring an aggregate result's function columns in order
#[derive(Debug, Clone)]
pub struct AggregateResultBuilder {
    group_expr: String,
    functions: Vec<(String, String, ValueType)>,
}

impl AggregateResultBuilder {
    /// Declare the next function column
    pub fn function(mut self, name: impl Into<String>, param: impl Into<String>, value_type: ValueType) -> Self {
        self.functions.push((name.into(), param.into(), value_type));
        self
    }

    pub fn build(self) -> Result<AggregateResult> {
        let mut allocator = MatchDocAllocator::new();
        allocator.declare::<String>(GROUP_KEY_COLUMN)?;

        let mut fun_names = Vec::with_capacity(self.functions.len());
        let mut fun_params = Vec::with_capacity(self.functions.len());
        for (index, (name, param, value_type)) in self.functions.into_iter().enumerate() {
            let column = format!("{}({})#{}", name, param, index);
            allocator.declare_with_type(&column, value_type, crate::row_store::DEFAULT_SERIALIZE_LEVEL)?;
            fun_names.push(name);
            fun_params.push(param);
        }

        Ok(AggregateResult::from_parts(
            self.group_expr,
            fun_names,
            fun_params,
            allocator,
            Vec::new(),
        ))
    }
}

/// Typed read access to an [`AggregateResult`] by group key
#[derive(Debug)]
pub struct AggResultReader<'a> {
    result: &'a AggregateResult,
    fun_refs: Vec<ReferenceBase>,
}

impl<'a> AggResultReader<'a> {
    pub fn new(result: &'a AggregateResult) -> Self {
        Self {
            result,
            fun_refs: result.fun_references(),
        }
    }

    /// Group keys in ascending order
    pub fn group_keys(&self) -> impl Iterator<Item = &'a str> {
        self.result.key_map.keys().map(String::as_str)
    }

    pub fn row(&self, key: &str) -> Option<MatchDoc> {
        self.result.key_map.get(key).copied()
    }

    /// Position of the first function with this name, ignoring ASCII case
    pub fn fun_index(&self, fun_name: &str) -> Option<usize> {
        self.result
            .fun_names
            .iter()
            .position(|name| name.eq_ignore_ascii_case(fun_name))
    }

    pub fn fun_value_type(&self, fun_index: usize) -> Option<ValueType> {
        self.fun_refs.get(fun_index).map(ReferenceBase::value_type)
    }

    /// Typed value of function `fun_index` for group `key`
    pub fn get<T: ColumnType>(&self, key: &str, fun_index: usize) -> Option<&'a T> {
        let doc = self.row(key)?;
        let reference = self.fun_refs.get(fun_index)?.typed::<T>()?;
        self.result.allocator.get(&reference, doc)
    }

    pub fn get_by_name<T: ColumnType>(&self, key: &str, fun_name: &str) -> Option<&'a T> {
        self.get(key, self.fun_index(fun_name)?)
    }

    /// Value of a numeric or sketch function widened to f64
    pub fn get_as_f64(&self, key: &str, fun_index: usize) -> Option<f64> {
        match self.fun_value_type(fun_index)? {
            ValueType::Int32 => self.get::<i32>(key, fun_index).map(|v| *v as f64),
            ValueType::Int64 => self.get::<i64>(key, fun_index).map(|v| *v as f64),
            ValueType::UInt32 => self.get::<u32>(key, fun_index).map(|v| *v as f64),
            ValueType::UInt64 => self.get::<u64>(key, fun_index).map(|v| *v as f64),
            ValueType::Float => self.get::<f32>(key, fun_index).map(|v| *v as f64),
            ValueType::Double => self.get::<f64>(key, fun_index).copied(),
            ValueType::Sketch => self.distinct_estimate(key, fun_index).map(|v| v as f64),
            _ => None,
        }
    }

    /// Cardinality estimate of a distinct-count function
    pub fn distinct_estimate(&self, key: &str, fun_index: usize) -> Option<u64> {
        self.get::<HllSketch>(key, fun_index).map(HllSketch::estimate)
    }
}
