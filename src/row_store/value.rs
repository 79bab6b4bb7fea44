//! Column value types
//!
//! The row store supports a closed set of value kinds, named by [`ValueType`].
//! Each kind maps to one Rust type through [`ColumnType`], and [`ColumnData`] holds a
//! whole column of one kind. Code that must handle "any column" matches on
//! `ValueType` once and then runs a generic implementation for the concrete type.

use crate::error::MergeError;
use crate::sketch::HllSketch;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display, Formatter};

/// Runtime tag for the value kind stored in a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Int32,
    Int64,
    UInt32,
    UInt64,
    Float,
    Double,
    Hash128,
    String,
    Sketch,
    Int64Seq,
    StringSeq,
}

impl ValueType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::Float => "float",
            Self::Double => "double",
            Self::Hash128 => "hash128",
            Self::String => "string",
            Self::Sketch => "sketch",
            Self::Int64Seq => "int64[]",
            Self::StringSeq => "string[]",
        }
    }

    /// Whether sum/max/min/count can operate on this kind
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Int32 | Self::Int64 | Self::UInt32 | Self::UInt64 | Self::Float | Self::Double
        )
    }

    /// Whether this kind holds more than one value per row
    pub fn is_sequence(&self) -> bool {
        matches!(self, Self::Int64Seq | Self::StringSeq)
    }
}

impl Display for ValueType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A Rust type that can be stored in a row store column
pub trait ColumnType: Clone + Default + Debug + 'static {
    const VALUE_TYPE: ValueType;

    fn values(column: &ColumnData) -> Option<&Vec<Self>>;
    fn values_mut(column: &mut ColumnData) -> Option<&mut Vec<Self>>;
}

macro_rules! column_types {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        /// Storage for one column, one entry per allocator slot
        #[derive(Debug, Clone, PartialEq)]
        pub enum ColumnData {
            $($variant(Vec<$ty>),)*
        }

        impl ColumnData {
            /// Create an empty column of the given kind
            pub fn new(value_type: ValueType) -> Self {
                match value_type {
                    $(ValueType::$variant => Self::$variant(Vec::new()),)*
                }
            }

            pub fn value_type(&self) -> ValueType {
                match self {
                    $(Self::$variant(_) => ValueType::$variant,)*
                }
            }

            pub fn len(&self) -> usize {
                match self {
                    $(Self::$variant(values) => values.len(),)*
                }
            }

            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }

            /// Grow or shrink the column, filling new slots with default values
            pub fn resize(&mut self, len: usize) {
                match self {
                    $(Self::$variant(values) => values.resize_with(len, Default::default),)*
                }
            }

            /// Reset one slot to the default value
            pub fn reset(&mut self, slot: usize) {
                match self {
                    $(Self::$variant(values) => {
                        if let Some(value) = values.get_mut(slot) {
                            *value = Default::default();
                        }
                    })*
                }
            }

            /// Move the value at `src_slot` of `source` into `dst_slot` of this column
            ///
            /// The source slot is left holding the default value.
            pub fn move_from(
                &mut self,
                dst_slot: usize,
                source: &mut ColumnData,
                src_slot: usize,
            ) -> Result<(), MergeError> {
                match (self, source) {
                    $((Self::$variant(dst), Self::$variant(src)) => {
                        let value = src.get_mut(src_slot).map(std::mem::take).ok_or_else(|| {
                            MergeError::InvalidMatchDoc(format!("source slot {} out of range", src_slot))
                        })?;
                        let target = dst.get_mut(dst_slot).ok_or_else(|| {
                            MergeError::InvalidMatchDoc(format!("target slot {} out of range", dst_slot))
                        })?;
                        *target = value;
                        Ok(())
                    })*
                    (dst, src) => Err(MergeError::type_mismatch(
                        "<column>",
                        dst.value_type(),
                        src.value_type(),
                    )),
                }
            }
        }

        $(
            impl ColumnType for $ty {
                const VALUE_TYPE: ValueType = ValueType::$variant;

                fn values(column: &ColumnData) -> Option<&Vec<Self>> {
                    match column {
                        ColumnData::$variant(values) => Some(values),
                        _ => None,
                    }
                }

                fn values_mut(column: &mut ColumnData) -> Option<&mut Vec<Self>> {
                    match column {
                        ColumnData::$variant(values) => Some(values),
                        _ => None,
                    }
                }
            }
        )*
    };
}

column_types! {
    Int32 => i32,
    Int64 => i64,
    UInt32 => u32,
    UInt64 => u64,
    Float => f32,
    Double => f64,
    Hash128 => u128,
    String => String,
    Sketch => HllSketch,
    Int64Seq => Vec<i64>,
    StringSeq => Vec<String>,
}
