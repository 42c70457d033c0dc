//! One scanned row parsed into a compact, append-only point sequence.
//!
//! Each cell qualifier is a big-endian u16: the upper `16 - FLAG_BITS` bits
//! are the point's time delta in seconds relative to the row's base time,
//! the low `FLAG_BITS` bits are value-type flags. Deltas are strictly
//! increasing within a sequence.

use crate::error::QueryError;
use crate::row_key::KeyLayout;
use crate::store::ScannedRow;
use crate::types::{CellValue, DataPoint, SeekableView, Timestamp};
use crate::{FLAG_BITS, FLAG_FLOAT, LENGTH_MASK, MAX_TIMESPAN};

/// Parsed contents of one row: the retained key, the decoded base time,
/// and columnar `(qualifier, value)` point storage.
#[derive(Debug, Clone)]
pub struct RowSeq {
    layout: KeyLayout,
    key: Vec<u8>,
    base_time: Timestamp,
    qualifiers: Vec<u16>,
    values: Vec<CellValue>,
}

impl RowSeq {
    /// Parses a freshly scanned row. The row must hold at least one cell,
    /// with cells sorted by qualifier and strictly increasing deltas.
    pub fn from_row(layout: KeyLayout, row: &ScannedRow) -> Result<Self, QueryError> {
        let base_time = layout.base_time(&row.key)?;
        if row.cells.is_empty() {
            return Err(QueryError::MalformedRow {
                reason: format!("empty row: key {:?}", row.key),
            });
        }

        let mut qualifiers = Vec::with_capacity(row.cells.len());
        let mut values = Vec::with_capacity(row.cells.len());
        for cell in &row.cells {
            let qualifier = decode_qualifier(&cell.qualifier)?;
            if let Some(&last) = qualifiers.last() {
                if qualifier >> FLAG_BITS <= last >> FLAG_BITS {
                    return Err(QueryError::MalformedRow {
                        reason: format!(
                            "cell deltas not strictly increasing in row {:?}",
                            row.key
                        ),
                    });
                }
            }
            qualifiers.push(qualifier);
            values.push(decode_value(qualifier & FLAGS_MASK, &cell.value)?);
        }

        Ok(Self {
            layout,
            key: row.key.clone(),
            base_time,
            qualifiers,
            values,
        })
    }

    /// Whether a time delta is representable in a qualifier's delta bits.
    pub fn can_time_delta_fit(delta: i64) -> bool {
        (0..MAX_TIMESPAN as i64).contains(&delta)
    }

    /// Appends the cells of a later row, rebasing their deltas onto this
    /// sequence's base time.
    ///
    /// # Panics
    /// The caller must have verified the merge with
    /// [`RowSeq::can_time_delta_fit`] on `other_base - base + max_delta`;
    /// a row with a non-greater base time or an overflowing rebased delta
    /// panics.
    pub fn add_row(&mut self, row: &ScannedRow) -> Result<(), QueryError> {
        let other_base = self.layout.base_time(&row.key)?;
        assert!(
            other_base > self.base_time,
            "add_row requires a later base time: {} <= {}",
            other_base,
            self.base_time
        );
        let shift = (other_base - self.base_time) as i64;

        for cell in &row.cells {
            let qualifier = decode_qualifier(&cell.qualifier)?;
            let rebased = shift + (qualifier >> FLAG_BITS) as i64;
            assert!(
                Self::can_time_delta_fit(rebased),
                "rebased delta {} does not fit; caller must check can_time_delta_fit",
                rebased
            );
            if let Some(&last) = self.qualifiers.last() {
                if rebased as u16 <= last >> FLAG_BITS {
                    return Err(QueryError::OutOfOrderRow {
                        last_ts: self.last_timestamp(),
                        first_ts: other_base + (qualifier >> FLAG_BITS) as u32,
                    });
                }
            }
            self.qualifiers
                .push(((rebased as u16) << FLAG_BITS) | (qualifier & FLAGS_MASK));
            self.values.push(decode_value(qualifier & FLAGS_MASK, &cell.value)?);
        }
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.qualifiers.len()
    }

    /// The retained row-key bytes of the first row merged into this
    /// sequence.
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn base_time(&self) -> Timestamp {
        self.base_time
    }

    pub fn metric_id(&self) -> &[u8] {
        &self.key[..self.layout.metric]
    }

    pub fn tag_bytes(&self) -> &[u8] {
        &self.key[self.layout.tags_offset()..]
    }

    fn delta(&self, i: usize) -> u16 {
        self.qualifiers[i] >> FLAG_BITS
    }

    /// Timestamp of the ith point.
    ///
    /// # Panics
    /// Panics if `i >= size()`.
    pub fn timestamp(&self, i: usize) -> Timestamp {
        self.base_time + self.delta(i) as u32
    }

    pub fn last_timestamp(&self) -> Timestamp {
        self.timestamp(self.size() - 1)
    }

    pub fn value(&self, i: usize) -> CellValue {
        self.values[i]
    }

    pub fn is_integer(&self, i: usize) -> bool {
        self.qualifiers[i] & FLAG_FLOAT == 0
    }

    /// # Panics
    /// Panics on a float point or an out-of-range index.
    pub fn long_value(&self, i: usize) -> i64 {
        self.values[i].long_value()
    }

    /// # Panics
    /// Panics on an integer point or an out-of-range index.
    pub fn double_value(&self, i: usize) -> f64 {
        self.values[i].double_value()
    }

    /// Forward + seekable iteration over this sequence's points.
    pub fn internal_iterator(&self) -> RowSeqIter<'_> {
        RowSeqIter { seq: self, pos: 0 }
    }
}

/// Last point timestamp of a raw scanned row, before parsing it in full.
/// Used to decide whether the row can merge into an existing sequence.
pub fn last_timestamp_in_row(layout: &KeyLayout, row: &ScannedRow) -> Result<Timestamp, QueryError> {
    let base_time = layout.base_time(&row.key)?;
    let last = row.cells.last().ok_or_else(|| QueryError::MalformedRow {
        reason: format!("empty row: key {:?}", row.key),
    })?;
    let qualifier = decode_qualifier(&last.qualifier)?;
    Ok(base_time + (qualifier >> FLAG_BITS) as u32)
}

const FLAGS_MASK: u16 = (1 << FLAG_BITS) - 1;

fn decode_qualifier(bytes: &[u8]) -> Result<u16, QueryError> {
    match bytes {
        [hi, lo] => Ok(u16::from_be_bytes([*hi, *lo])),
        _ => Err(QueryError::MalformedRow {
            reason: format!("qualifier must be 2 bytes, got {}", bytes.len()),
        }),
    }
}

fn decode_value(flags: u16, bytes: &[u8]) -> Result<CellValue, QueryError> {
    let len = (flags & LENGTH_MASK) as usize + 1;
    if bytes.len() != len {
        return Err(QueryError::MalformedRow {
            reason: format!("value is {} bytes but flags {:#x} say {}", bytes.len(), flags, len),
        });
    }
    if flags & FLAG_FLOAT != 0 {
        match bytes {
            [a, b, c, d] => Ok(CellValue::Double(
                f32::from_be_bytes([*a, *b, *c, *d]) as f64
            )),
            [a, b, c, d, e, f, g, h] => Ok(CellValue::Double(f64::from_be_bytes([
                *a, *b, *c, *d, *e, *f, *g, *h,
            ]))),
            _ => Err(QueryError::MalformedRow {
                reason: format!("unsupported float width {len}"),
            }),
        }
    } else {
        match bytes {
            [a] => Ok(CellValue::Long(*a as i8 as i64)),
            [a, b] => Ok(CellValue::Long(i16::from_be_bytes([*a, *b]) as i64)),
            [a, b, c, d] => Ok(CellValue::Long(i32::from_be_bytes([*a, *b, *c, *d]) as i64)),
            [a, b, c, d, e, f, g, h] => Ok(CellValue::Long(i64::from_be_bytes([
                *a, *b, *c, *d, *e, *f, *g, *h,
            ]))),
            _ => Err(QueryError::MalformedRow {
                reason: format!("unsupported integer width {len}"),
            }),
        }
    }
}

/// Forward + seekable view over one [`RowSeq`].
#[derive(Debug)]
pub struct RowSeqIter<'a> {
    seq: &'a RowSeq,
    pos: usize,
}

impl SeekableView for RowSeqIter<'_> {
    fn has_next(&self) -> bool {
        self.pos < self.seq.size()
    }

    fn next_point(&mut self) -> Result<DataPoint, QueryError> {
        if !self.has_next() {
            return Err(QueryError::Exhausted);
        }
        let point = DataPoint::new(self.seq.timestamp(self.pos), self.seq.value(self.pos));
        self.pos += 1;
        Ok(point)
    }

    fn seek(&mut self, timestamp: Timestamp) {
        let mut pos = 0;
        while pos < self.seq.size() && self.seq.timestamp(pos) < timestamp {
            pos += 1;
        }
        self.pos = pos;
    }
}

#[cfg(test)]
pub(crate) mod tests_support {
    use crate::store::Cell;
    use crate::FLAG_BITS;

    pub(crate) fn qualifier(delta: u16, flags: u16) -> Vec<u8> {
        ((delta << FLAG_BITS) | flags).to_be_bytes().to_vec()
    }

    pub(crate) fn long_cell(delta: u16, value: i8) -> Cell {
        Cell {
            qualifier: qualifier(delta, 0x0),
            value: vec![value as u8],
        }
    }
}
