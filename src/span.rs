//! A Span is the ordered list of row sequences that make up one series
//! inside a query's time range: identical metric id and tag bytes, strictly
//! increasing timestamps across row boundaries.
//!
//! Spans are populated through [`SpanBuilder`] while the scan runs and
//! frozen by [`SpanBuilder::finish`]; callers never observe a partially
//! populated [`Span`].

use std::collections::BTreeMap;

use crate::error::QueryError;
use crate::row_key::KeyLayout;
use crate::row_seq::{last_timestamp_in_row, RowSeq, RowSeqIter};
use crate::store::ScannedRow;
use crate::types::{CellValue, DataPoint, SeekableView, Timestamp};
use crate::uid::{name_or_placeholder, UidTable, Uids};

/// Accumulates scanned rows for one series.
#[derive(Debug)]
pub struct SpanBuilder {
    layout: KeyLayout,
    rows: Vec<RowSeq>,
}

impl SpanBuilder {
    pub fn new(layout: KeyLayout) -> Self {
        Self { layout, rows: Vec::new() }
    }

    /// Adds a scanned row.
    ///
    /// The row must belong to the same series as the rows already added
    /// ([`QueryError::SeriesMismatch`]) and must continue the time order
    /// ([`QueryError::OutOfOrderRow`]). A row whose points still fit the
    /// previous row sequence's delta range is merged into it instead of
    /// opening a new one.
    pub fn add_row(&mut self, row: &ScannedRow) -> Result<(), QueryError> {
        if self.rows.is_empty() {
            self.rows.push(RowSeq::from_row(self.layout, row)?);
            return Ok(());
        }

        let last = self.rows.last().expect("non-empty rows");
        self.check_same_series(last, row)?;
        let last_ts = last.last_timestamp();
        let last_base = last.base_time();

        let new_last_ts = last_timestamp_in_row(&self.layout, row)?;
        if RowSeq::can_time_delta_fit(new_last_ts as i64 - last_base as i64) {
            return self
                .rows
                .last_mut()
                .expect("non-empty rows")
                .add_row(row);
        }

        let seq = RowSeq::from_row(self.layout, row)?;
        if last_ts >= seq.timestamp(0) {
            return Err(QueryError::OutOfOrderRow {
                last_ts,
                first_ts: seq.timestamp(0),
            });
        }
        self.rows.push(seq);
        Ok(())
    }

    fn check_same_series(&self, last: &RowSeq, row: &ScannedRow) -> Result<(), QueryError> {
        self.layout.check(&row.key)?;
        let reason = if row.key.len() != last.key().len() {
            Some("row length mismatch")
        } else if row.key[..self.layout.metric] != last.key()[..self.layout.metric] {
            Some("metric id mismatch")
        } else if row.key[self.layout.tags_offset()..] != last.key()[self.layout.tags_offset()..] {
            Some("tags mismatch")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(QueryError::SeriesMismatch {
                reason,
                existing: last.key().to_vec(),
                added: row.key.to_vec(),
            }),
            None => Ok(()),
        }
    }

    /// Freezes the accumulated rows. `None` if no row was ever added.
    pub fn finish(self) -> Option<Span> {
        if self.rows.is_empty() {
            return None;
        }
        Some(Span {
            layout: self.layout,
            rows: self.rows,
        })
    }
}

/// Index of a data point inside a span: which row sequence, and where in
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowOffset {
    pub row: usize,
    pub offset: usize,
}

/// Read-only, time-ordered sequence of data points for one series.
/// Invariant: holds at least one row sequence.
#[derive(Debug, Clone)]
pub struct Span {
    layout: KeyLayout,
    rows: Vec<RowSeq>,
}

impl Span {
    /// Total number of data points across all row sequences.
    pub fn size(&self) -> usize {
        self.rows.iter().map(RowSeq::size).sum()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Row key of the first row, retained for identity and tag lookups.
    pub fn row_key(&self) -> &[u8] {
        self.rows[0].key()
    }

    pub fn metric_id(&self) -> &[u8] {
        self.rows[0].metric_id()
    }

    pub fn tag_bytes(&self) -> &[u8] {
        self.rows[0].tag_bytes()
    }

    /// Resolves the metric id, with a `<…>` placeholder if unknown.
    pub fn metric_name(&self, uids: &Uids) -> String {
        name_or_placeholder(uids.metrics.as_ref(), self.metric_id())
    }

    /// Resolves this series' tags to names. A missing id surfaces as
    /// [`QueryError::NoSuchId`].
    pub fn tags(&self, uids: &Uids) -> Result<BTreeMap<String, String>, QueryError> {
        let (_, _, pairs) = self.layout.split(self.row_key())?;
        let mut tags = BTreeMap::new();
        for (name, value) in pairs {
            tags.insert(
                uids.tag_names.name(name)?,
                uids.tag_values.name(value)?,
            );
        }
        Ok(tags)
    }

    /// Locates the ith point. Linearly accumulates row sizes; row counts
    /// per span are bounded by the queried range over `MAX_TIMESPAN`.
    fn row_offset_for(&self, i: usize) -> RowOffset {
        let mut skipped = 0;
        for (row, seq) in self.rows.iter().enumerate() {
            if skipped + seq.size() > i {
                return RowOffset { row, offset: i - skipped };
            }
            skipped += seq.size();
        }
        panic!("index {} out of range for span of size {}", i, self.size());
    }

    /// # Panics
    /// Panics if `i >= size()`.
    pub fn timestamp(&self, i: usize) -> Timestamp {
        let at = self.row_offset_for(i);
        self.rows[at.row].timestamp(at.offset)
    }

    pub fn value(&self, i: usize) -> CellValue {
        let at = self.row_offset_for(i);
        self.rows[at.row].value(at.offset)
    }

    pub fn is_integer(&self, i: usize) -> bool {
        let at = self.row_offset_for(i);
        self.rows[at.row].is_integer(at.offset)
    }

    /// # Panics
    /// Panics on a float point or an out-of-range index.
    pub fn long_value(&self, i: usize) -> i64 {
        let at = self.row_offset_for(i);
        self.rows[at.row].long_value(at.offset)
    }

    /// # Panics
    /// Panics on an integer point or an out-of-range index.
    pub fn double_value(&self, i: usize) -> f64 {
        let at = self.row_offset_for(i);
        self.rows[at.row].double_value(at.offset)
    }

    /// Index of the first row sequence whose last timestamp is at or past
    /// the target; the last row if the target is beyond every sequence.
    fn seek_row(&self, timestamp: Timestamp) -> usize {
        let mut row_index = 0;
        for seq in &self.rows {
            if seq.last_timestamp() < timestamp {
                row_index += 1;
            } else {
                break;
            }
        }
        if row_index == self.rows.len() {
            row_index -= 1;
        }
        row_index
    }

    pub fn iter(&self) -> SpanIter<'_> {
        SpanIter {
            span: self,
            row_index: 0,
            inner: self.rows[0].internal_iterator(),
        }
    }
}

/// [`SeekableView`] over one [`Span`], chaining its row sequences.
#[derive(Debug)]
pub struct SpanIter<'a> {
    span: &'a Span,
    row_index: usize,
    inner: RowSeqIter<'a>,
}

impl SeekableView for SpanIter<'_> {
    fn has_next(&self) -> bool {
        self.inner.has_next() || self.row_index < self.span.rows.len() - 1
    }

    fn next_point(&mut self) -> Result<DataPoint, QueryError> {
        if self.inner.has_next() {
            return self.inner.next_point();
        }
        if self.row_index < self.span.rows.len() - 1 {
            self.row_index += 1;
            self.inner = self.span.rows[self.row_index].internal_iterator();
            return self.inner.next_point();
        }
        Err(QueryError::Exhausted)
    }

    fn seek(&mut self, timestamp: Timestamp) {
        self.row_index = self.span.seek_row(timestamp);
        self.inner = self.span.rows[self.row_index].internal_iterator();
        self.inner.seek(timestamp);
    }
}
