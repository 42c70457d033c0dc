use thiserror::Error;

/// Error type for query planning and execution.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Invalid timestamp: {0} (must be in [1, 2^32))")]
    InvalidTimestamp(u64),

    #[error("Invalid time range: start={start}, end={end}")]
    TimeRangeInvalid { start: u64, end: u64 },

    #[error("Start time was never set on this query")]
    StartTimeUnset,

    #[error("No such {kind}: {name:?}")]
    NoSuchName { kind: &'static str, name: String },

    #[error("No such {kind} id: {id:?}")]
    NoSuchId { kind: &'static str, id: Vec<u8> },

    #[error("Row does not belong to this span ({reason}): span row key {existing:?}, added row key {added:?}")]
    SeriesMismatch {
        reason: &'static str,
        existing: Vec<u8>,
        added: Vec<u8>,
    },

    #[error("Row added out of order: span ends at {last_ts} but the new row starts at {first_ts}")]
    OutOfOrderRow { last_ts: u32, first_ts: u32 },

    #[error("Scanner returned a row outside the requested metric: {row:?}")]
    ScannerInvariant { row: Vec<u8> },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Malformed row key: length {len} does not fit the key schema")]
    MalformedKey { len: usize },

    #[error("Malformed row: {reason}")]
    MalformedRow { reason: String },

    #[error("Iterator exhausted")]
    Exhausted,
}

impl From<std::io::Error> for QueryError {
    fn from(err: std::io::Error) -> Self {
        QueryError::Storage(err.to_string())
    }
}
