//! Wide-column store contract consumed by the query core, plus the
//! in-memory reference implementation used by tests and embedders.
//!
//! The store is a range scanner over `[start_row, end_row)` with an
//! optional server-side row-key filter, returning rows whose cells are
//! sorted by qualifier ascending. Scanners must release their resources on
//! drop so that a caller abandoning a query mid-scan cannot leak one.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::RwLock;

use regex::bytes::Regex;

use crate::error::QueryError;

/// Column family holding data points.
pub const POINTS_FAMILY: &[u8] = b"t";

/// One cell of a scanned row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub qualifier: Vec<u8>,
    pub value: Vec<u8>,
}

/// One row returned by a scanner. Cells are sorted by qualifier ascending,
/// per the store contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedRow {
    pub key: Vec<u8>,
    pub cells: Vec<Cell>,
}

/// A range scan with an optional pushed-down row-key filter.
///
/// `key_filter` is a regular expression in the store's native dialect (the
/// `regex` crate over raw bytes); a row is returned only if its key
/// matches.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub start_row: Vec<u8>,
    pub end_row: Vec<u8>,
    pub family: Vec<u8>,
    pub key_filter: Option<String>,
}

/// Forward cursor over the rows of one scan.
///
/// `next` blocks on I/O. `close` is idempotent; implementations must also
/// close on drop so the scanner is released on every exit path.
pub trait RowScanner {
    fn next(&mut self) -> Result<Option<ScannedRow>, QueryError>;

    fn close(&mut self);
}

/// The store client surface the query core drives.
pub trait PointStore: std::fmt::Debug + Send + Sync {
    fn scan<'a>(&'a self, request: &ScanRequest) -> Result<Box<dyn RowScanner + 'a>, QueryError>;
}

type RowMap = BTreeMap<Vec<u8>, BTreeMap<Vec<u8>, Vec<u8>>>;

/// In-memory [`PointStore`]: per-family sorted row maps, scans snapshot the
/// matching range under a read lock.
#[derive(Debug, Default)]
pub struct MemStore {
    families: RwLock<HashMap<Vec<u8>, RowMap>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes one cell. The qualifier map keeps cells sorted for scans.
    pub fn put(&self, family: &[u8], row_key: &[u8], qualifier: &[u8], value: &[u8]) {
        let mut families = self.families.write().expect("mem store lock");
        families
            .entry(family.to_vec())
            .or_default()
            .entry(row_key.to_vec())
            .or_default()
            .insert(qualifier.to_vec(), value.to_vec());
    }

    /// Writes a whole row of `(qualifier, value)` cells.
    pub fn put_row(&self, family: &[u8], row_key: &[u8], cells: &[(Vec<u8>, Vec<u8>)]) {
        for (qualifier, value) in cells {
            self.put(family, row_key, qualifier, value);
        }
    }
}

impl PointStore for MemStore {
    fn scan<'a>(&'a self, request: &ScanRequest) -> Result<Box<dyn RowScanner + 'a>, QueryError> {
        let filter = match &request.key_filter {
            Some(pattern) => Some(Regex::new(pattern).map_err(|e| {
                QueryError::Storage(format!("bad row filter {pattern:?}: {e}"))
            })?),
            None => None,
        };

        let families = self.families.read().expect("mem store lock");
        let mut rows = VecDeque::new();
        if let Some(family) = families.get(&request.family) {
            for (key, cells) in family.range(request.start_row.clone()..request.end_row.clone()) {
                if let Some(filter) = &filter {
                    if !filter.is_match(key) {
                        continue;
                    }
                }
                rows.push_back(ScannedRow {
                    key: key.clone(),
                    cells: cells
                        .iter()
                        .map(|(qualifier, value)| Cell {
                            qualifier: qualifier.clone(),
                            value: value.clone(),
                        })
                        .collect(),
                });
            }
        }
        Ok(Box::new(MemScanner { rows, closed: false }))
    }
}

struct MemScanner {
    rows: VecDeque<ScannedRow>,
    closed: bool,
}

impl RowScanner for MemScanner {
    fn next(&mut self) -> Result<Option<ScannedRow>, QueryError> {
        if self.closed {
            return Ok(None);
        }
        Ok(self.rows.pop_front())
    }

    fn close(&mut self) {
        self.closed = true;
        self.rows.clear();
    }
}

impl Drop for MemScanner {
    fn drop(&mut self) {
        self.close();
    }
}
