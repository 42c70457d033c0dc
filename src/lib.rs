#![doc = r#"
tsquery: Time-Series Query Core in Rust

This crate is the query core of a metrics database whose data points live in
a wide-column key-value store. It takes a descriptive query (metric name,
tag predicates, time range, optional grouping, optional rate conversion,
aggregator identity) and returns grouped, time-ordered data-point streams:
- Tag predicates are compiled into a byte-level regular expression applied
  server-side to row keys, so filtering happens inside the store scan
- Scanned rows are materialised into Spans: per-series point sequences with
  strict time ordering, merging adjacent rows where their deltas allow
- Spans are partitioned into groups by the values of the group-by tags and
  exposed as seekable iterators for downstream aggregation

Writing points, schema migration, and the HTTP/CLI surfaces live elsewhere;
the store client and the id-interning service are consumed through the
traits in `store` and `uid`.
"#]
// Declare modules
pub mod core;
pub mod error;
pub mod filter;
pub mod group;
pub mod query;
pub mod row_key;
pub mod row_seq;
pub mod span;
pub mod store;
pub mod telemetry;
pub mod types;
pub mod uid;

/// Main entry point for running queries against a store.
pub use crate::core::{EngineConfig, QueryEngine};
/// Error type for query planning and execution.
pub use crate::error::QueryError;
/// A configured single-shot query.
pub use crate::query::Query;
/// A group of series sharing one group key, ready for aggregation.
pub use crate::group::SpanGroup;
/// One series' time-ordered points inside the queried range.
pub use crate::span::Span;
/// Structured event hook for observability.
pub use crate::telemetry::{QueryEvent, QueryEventListener};
/// Data-point value types and the seekable iteration contract.
pub use crate::types::{Aggregator, CellValue, DataPoint, SeekableView, Timestamp};

/// Number of low bits in a cell qualifier reserved for value-type flags.
pub const FLAG_BITS: u16 = 4;
/// Qualifier flag marking a floating-point value.
pub const FLAG_FLOAT: u16 = 0x8;
/// Qualifier flag bits encoding the value length minus one.
pub const LENGTH_MASK: u16 = 0x7;
/// Bytes encoding the base timestamp inside a row key.
pub const TIMESTAMP_BYTES: usize = 4;
/// Maximum number of seconds a single row can span.
pub const MAX_TIMESPAN: u32 = 1 << (16 - FLAG_BITS);
