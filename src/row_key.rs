//! Row-key codec for the point table.
//!
//! Layout, bit-exact:
//!
//! ```text
//! [ metric_id : W_m ][ base_time : 4, big-endian u32 ][ (name_id : W_n, value_id : W_v) × k ]
//! ```
//!
//! Tag pairs are stored in ascending `name_id` order with no duplicate
//! names. All operations here are fixed-offset arithmetic on the widths the
//! intern service reports.

use crate::error::QueryError;
use crate::types::Timestamp;
use crate::uid::{name_or_placeholder, Uids};
use crate::{MAX_TIMESPAN, TIMESTAMP_BYTES};

/// Byte widths of the three id namespaces, fixed per process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyLayout {
    pub metric: usize,
    pub name: usize,
    pub value: usize,
}

impl KeyLayout {
    /// Bytes one `(name_id, value_id)` pair occupies.
    pub fn tag_pair(&self) -> usize {
        self.name + self.value
    }

    /// Offset of the first tag pair in a row key.
    pub fn tags_offset(&self) -> usize {
        self.metric + TIMESTAMP_BYTES
    }

    /// Validates that `key` is `W_m + 4 + k·(W_n+W_v)` bytes for some `k ≥ 0`.
    pub fn check(&self, key: &[u8]) -> Result<(), QueryError> {
        let prefix = self.tags_offset();
        if key.len() < prefix || (key.len() - prefix) % self.tag_pair() != 0 {
            return Err(QueryError::MalformedKey { len: key.len() });
        }
        Ok(())
    }

    pub fn metric_id<'a>(&self, key: &'a [u8]) -> Result<&'a [u8], QueryError> {
        self.check(key)?;
        Ok(&key[..self.metric])
    }

    /// Decodes the 4-byte base timestamp.
    pub fn base_time(&self, key: &[u8]) -> Result<Timestamp, QueryError> {
        self.check(key)?;
        let mut be = [0u8; 4];
        be.copy_from_slice(&key[self.metric..self.metric + TIMESTAMP_BYTES]);
        Ok(u32::from_be_bytes(be))
    }

    /// The tag section of the key (possibly empty).
    pub fn tag_bytes<'a>(&self, key: &'a [u8]) -> Result<&'a [u8], QueryError> {
        self.check(key)?;
        Ok(&key[self.tags_offset()..])
    }

    /// Splits a key into metric id, base time, and `(name_id, value_id)`
    /// pairs.
    pub fn split<'a>(
        &self,
        key: &'a [u8],
    ) -> Result<(&'a [u8], Timestamp, Vec<(&'a [u8], &'a [u8])>), QueryError> {
        let base_time = self.base_time(key)?;
        let tags = &key[self.tags_offset()..];
        let pairs = tags
            .chunks_exact(self.tag_pair())
            .map(|pair| (&pair[..self.name], &pair[self.name..]))
            .collect();
        Ok((&key[..self.metric], base_time, pairs))
    }
}

/// Assembles a row key from its parts. Pairs must already be sorted by
/// `name_id`.
pub fn build_row_key(
    layout: &KeyLayout,
    metric_id: &[u8],
    base_time: Timestamp,
    pairs: &[(&[u8], &[u8])],
) -> Vec<u8> {
    let mut key =
        Vec::with_capacity(layout.tags_offset() + pairs.len() * layout.tag_pair());
    key.extend_from_slice(metric_id);
    key.extend_from_slice(&base_time.to_be_bytes());
    for (name, value) in pairs {
        key.extend_from_slice(name);
        key.extend_from_slice(value);
    }
    key
}

/// First row key of a scan: the range starts `MAX_TIMESPAN` seconds before
/// the query start because a matching point may sit in a row whose base
/// time is earlier.
pub fn scan_start_row(layout: &KeyLayout, metric_id: &[u8], start_time: Timestamp) -> Vec<u8> {
    let mut row = Vec::with_capacity(layout.tags_offset());
    row.extend_from_slice(metric_id);
    row.extend_from_slice(&start_time.saturating_sub(MAX_TIMESPAN).to_be_bytes());
    row
}

/// Exclusive upper row key of a scan. An unset end time (0) scans to the
/// end of the metric.
pub fn scan_end_row(layout: &KeyLayout, metric_id: &[u8], end_time: Timestamp) -> Vec<u8> {
    let mut row = Vec::with_capacity(layout.tags_offset());
    row.extend_from_slice(metric_id);
    let end = if end_time == 0 {
        u32::MAX
    } else {
        end_time.saturating_add(MAX_TIMESPAN)
    };
    row.extend_from_slice(&end.to_be_bytes());
    row
}

/// Renders a row key for diagnostics, resolving ids through the intern
/// service and falling back to `<…>` placeholders for unknown ids.
pub fn format_row_key(uids: &Uids, key: &[u8]) -> String {
    let layout = uids.layout();
    let (metric, base_time, pairs) = match layout.split(key) {
        Ok(parts) => parts,
        Err(_) => return format!("{key:?}"),
    };
    let mut s = format!(
        "{}@{}{{",
        name_or_placeholder(uids.metrics.as_ref(), metric),
        base_time
    );
    for (i, (name, value)) in pairs.iter().enumerate() {
        if i != 0 {
            s.push_str(", ");
        }
        s.push_str(&name_or_placeholder(uids.tag_names.as_ref(), name));
        s.push('=');
        s.push_str(&name_or_placeholder(uids.tag_values.as_ref(), value));
    }
    s.push('}');
    s
}
