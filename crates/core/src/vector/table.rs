//! Read-only tabular access to feature attributes

use super::{AttributeValue, FeatureCollection, NULL};
use std::collections::HashSet;

const I64_MIN: f64 = -9_223_372_036_854_775_808.0;
const I64_END: f64 = 9_223_372_036_854_775_808.0;

/// Hashable identity of an [`AttributeValue`].
///
/// Integral floats fold onto the matching `Int`, so `1` and `1.0` are one
/// value. Other floats compare by bit pattern after folding every NaN onto
/// a single NaN, so all NaNs count as one distinct value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKey<'a> {
    Null,
    Bool(bool),
    Int(i64),
    Float(u64),
    String(&'a str),
}

impl<'a> From<&'a AttributeValue> for AttributeKey<'a> {
    fn from(value: &'a AttributeValue) -> Self {
        match value {
            AttributeValue::Null => AttributeKey::Null,
            AttributeValue::Bool(b) => AttributeKey::Bool(*b),
            AttributeValue::Int(i) => AttributeKey::Int(*i),
            AttributeValue::Float(f) if f.is_nan() => AttributeKey::Float(f64::NAN.to_bits()),
            AttributeValue::Float(f) if f.fract() == 0.0 && (I64_MIN..I64_END).contains(f) => {
                AttributeKey::Int(*f as i64)
            }
            AttributeValue::Float(f) => AttributeKey::Float(f.to_bits()),
            AttributeValue::String(s) => AttributeKey::String(s.as_str()),
        }
    }
}

/// Rows of named columns, read-only.
pub trait AttributeTable {
    /// Column names in schema order
    fn column_names(&self) -> &[String];

    /// Number of rows
    fn row_count(&self) -> usize;

    /// Value at `row` in `column`; missing cells read as `Null`
    fn value(&self, row: usize, column: &str) -> &AttributeValue;

    fn has_column(&self, column: &str) -> bool {
        self.column_names().iter().any(|c| c == column)
    }

    /// Number of distinct values in `column`
    fn distinct_count(&self, column: &str) -> usize {
        (0..self.row_count())
            .map(|row| self.value(row, column).key())
            .collect::<HashSet<_>>()
            .len()
    }
}

impl AttributeTable for FeatureCollection {
    fn column_names(&self) -> &[String] {
        self.columns()
    }

    fn row_count(&self) -> usize {
        self.len()
    }

    fn value(&self, row: usize, column: &str) -> &AttributeValue {
        self.features()
            .get(row)
            .and_then(|f| f.get_property(column))
            .unwrap_or(&NULL)
    }
}
