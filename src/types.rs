use serde::{Deserialize, Serialize};

use crate::error::QueryError;

/// Timestamp type (seconds since epoch, unsigned 32-bit).
pub type Timestamp = u32;

/// A resolved literal tag predicate: both ids are interned, fixed-width byte
/// strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagPair {
    pub name: Vec<u8>,
    pub value: Vec<u8>,
}

/// The value of a single data point, decoded from its cell flags.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Long(i64),
    Double(f64),
}

impl CellValue {
    pub fn is_integer(&self) -> bool {
        matches!(self, CellValue::Long(_))
    }

    /// # Panics
    /// Panics if the value is a float; check [`CellValue::is_integer`] first.
    pub fn long_value(&self) -> i64 {
        match self {
            CellValue::Long(v) => *v,
            CellValue::Double(v) => panic!("long_value called on a float point: {v}"),
        }
    }

    /// # Panics
    /// Panics if the value is an integer; check [`CellValue::is_integer`] first.
    pub fn double_value(&self) -> f64 {
        match self {
            CellValue::Double(v) => *v,
            CellValue::Long(v) => panic!("double_value called on an integer point: {v}"),
        }
    }
}

/// A single timestamped point yielded by a [`SeekableView`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    timestamp: Timestamp,
    value: CellValue,
}

impl DataPoint {
    pub fn new(timestamp: Timestamp, value: CellValue) -> Self {
        Self { timestamp, value }
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn value(&self) -> CellValue {
        self.value
    }

    pub fn is_integer(&self) -> bool {
        self.value.is_integer()
    }

    /// # Panics
    /// Panics if the point holds a float; check [`DataPoint::is_integer`] first.
    pub fn long_value(&self) -> i64 {
        self.value.long_value()
    }

    /// # Panics
    /// Panics if the point holds an integer; check [`DataPoint::is_integer`] first.
    pub fn double_value(&self) -> f64 {
        self.value.double_value()
    }
}

/// Forward-only, seekable iteration over time-ordered data points.
///
/// `seek` positions the view so that the next yielded point is the first one
/// with a timestamp greater than or equal to the target, when such a point
/// exists; otherwise the view is exhausted.
pub trait SeekableView {
    fn has_next(&self) -> bool;

    /// Yields the next point, or [`QueryError::Exhausted`] past the end.
    fn next_point(&mut self) -> Result<DataPoint, QueryError>;

    fn seek(&mut self, timestamp: Timestamp);
}

/// Identity of an aggregation function, attached to a group of series.
///
/// The aggregation arithmetic itself lives in the caller's function
/// catalogue; the query core only carries the identity through planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aggregator(&'static str);

impl Aggregator {
    pub const SUM: Aggregator = Aggregator("sum");
    pub const MIN: Aggregator = Aggregator("min");
    pub const MAX: Aggregator = Aggregator("max");
    pub const AVG: Aggregator = Aggregator("avg");
    pub const DEV: Aggregator = Aggregator("dev");

    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl std::fmt::Display for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_value_accessors() {
        let l = CellValue::Long(-42);
        assert!(l.is_integer());
        assert_eq!(l.long_value(), -42);

        let d = CellValue::Double(2.5);
        assert!(!d.is_integer());
        assert_eq!(d.double_value(), 2.5);
    }

    #[test]
    #[should_panic(expected = "long_value called on a float point")]
    fn long_value_on_float_panics() {
        CellValue::Double(1.0).long_value();
    }
}
