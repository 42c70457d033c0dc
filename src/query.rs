//! Query planning and execution: time-range validation, partitioning of
//! tag predicates into literals and group-bys, scan-range and filter
//! assembly, and materialisation of scanned rows into spans.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::QueryError;
use crate::filter::build_row_filter;
use crate::group::{group_spans, SpanGroup};
use crate::row_key::{scan_end_row, scan_start_row, KeyLayout};
use crate::span::{Span, SpanBuilder};
use crate::store::{PointStore, ScanRequest};
use crate::telemetry::{query_metrics, QueryEvent, QueryEventListener};
use crate::types::{Aggregator, TagPair, Timestamp};
use crate::uid::{name_or_placeholder, UidTable, Uids};
use crate::TIMESTAMP_BYTES;

/// A single-shot, single-threaded query over one metric.
///
/// Built by [`crate::core::QueryEngine::query`], configured through the
/// setters, executed once with [`Query::run`].
#[derive(Debug)]
pub struct Query {
    uids: Uids,
    store: Arc<dyn PointStore>,
    listener: Arc<dyn QueryEventListener>,
    family: Vec<u8>,

    /// Start time in seconds; 0 means "never set".
    start_time: Timestamp,
    /// End time in seconds; 0 means "unset", which scans open-ended and
    /// snaps to "now" when first read.
    end_time: Timestamp,

    metric: Vec<u8>,
    /// Sorted by name id. A name id never appears both here and in
    /// `group_bys`.
    literal_tags: Vec<TagPair>,
    /// Sorted name ids of the group-by tags.
    group_bys: Vec<Vec<u8>>,
    /// Value-id whitelists for group-bys of the `name={v1|v2}` form.
    group_by_values: BTreeMap<Vec<u8>, Vec<Vec<u8>>>,

    aggregator: Aggregator,
    rate: bool,
}

impl Query {
    pub(crate) fn new(
        uids: Uids,
        store: Arc<dyn PointStore>,
        listener: Arc<dyn QueryEventListener>,
        family: Vec<u8>,
    ) -> Self {
        Self {
            uids,
            store,
            listener,
            family,
            start_time: 0,
            end_time: 0,
            metric: Vec::new(),
            literal_tags: Vec::new(),
            group_bys: Vec::new(),
            group_by_values: BTreeMap::new(),
            aggregator: Aggregator::SUM,
            rate: false,
        }
    }

    /// Sets the inclusive start of the queried range, seconds since epoch.
    pub fn set_start_time(&mut self, timestamp: u64) -> Result<(), QueryError> {
        let ts = check_timestamp(timestamp)?;
        if self.end_time != 0 && ts >= self.end_time {
            return Err(QueryError::TimeRangeInvalid {
                start: timestamp,
                end: self.end_time as u64,
            });
        }
        self.start_time = ts;
        Ok(())
    }

    /// The start of the queried range; a query cannot run without one.
    pub fn start_time(&self) -> Result<Timestamp, QueryError> {
        if self.start_time == 0 {
            return Err(QueryError::StartTimeUnset);
        }
        Ok(self.start_time)
    }

    /// Sets the inclusive end of the queried range, seconds since epoch.
    pub fn set_end_time(&mut self, timestamp: u64) -> Result<(), QueryError> {
        let ts = check_timestamp(timestamp)?;
        if self.start_time != 0 && ts <= self.start_time {
            return Err(QueryError::TimeRangeInvalid {
                start: self.start_time as u64,
                end: timestamp,
            });
        }
        self.end_time = ts;
        Ok(())
    }

    /// The end of the queried range. If it was never set, it snaps to the
    /// current wall-clock time on first read and stays there.
    pub fn end_time(&mut self) -> Timestamp {
        if self.end_time == 0 {
            self.end_time = now_seconds();
        }
        self.end_time
    }

    /// Resolves the metric and tag predicates and partitions the tags:
    ///
    /// - `name=*` groups by `name` over every value found;
    /// - `name=v1|v2|…` groups by `name` over the listed values;
    /// - anything else is a literal `(name, value)` requirement.
    pub fn set_time_series(
        &mut self,
        metric: &str,
        tags: &BTreeMap<String, String>,
        aggregator: Aggregator,
        rate: bool,
    ) -> Result<(), QueryError> {
        self.metric = self.uids.metrics.id(metric)?;
        self.literal_tags.clear();
        self.group_bys.clear();
        self.group_by_values.clear();

        for (name, value) in tags {
            let grouped = value == "*" || value.bytes().skip(1).any(|b| b == b'|');
            if grouped {
                let name_id = self.uids.tag_names.id(name)?;
                // A leading `*` swallows any whitelist: group over every
                // value.
                if !value.starts_with('*') {
                    let mut value_ids = Vec::new();
                    for part in value.split('|') {
                        value_ids.push(self.uids.tag_values.id(part)?);
                    }
                    self.group_by_values.insert(name_id.clone(), value_ids);
                }
                self.group_bys.push(name_id);
            } else {
                self.literal_tags.push(TagPair {
                    name: self.uids.tag_names.id(name)?,
                    value: self.uids.tag_values.id(value)?,
                });
            }
        }

        self.literal_tags.sort_by(|a, b| a.name.cmp(&b.name));
        self.group_bys.sort();
        self.aggregator = aggregator;
        self.rate = rate;
        Ok(())
    }

    /// Executes the query: scans the store, materialises spans, groups
    /// them, and returns the groups in ascending group-key order. An empty
    /// scan yields an empty result.
    ///
    /// # Panics
    /// Panics if [`Query::set_time_series`] was never called.
    pub fn run(&mut self) -> Result<Vec<SpanGroup>, QueryError> {
        let start_time = self.start_time()?;
        assert!(!self.metric.is_empty(), "set_time_series was never called");
        let (spans, rows) = self.find_spans()?;
        query_metrics::record_query_run();
        if rows == 0 {
            return Ok(Vec::new());
        }
        // Read (and possibly snap) the end time only when there is
        // something to group; an empty scan leaves an unset end time unset.
        let end_time = self.end_time();
        Ok(group_spans(
            &self.uids.layout(),
            spans,
            &self.group_bys,
            start_time,
            end_time,
            self.aggregator,
            self.rate,
            &self.listener,
        ))
    }

    /// Scans the store and routes each row to its span, keyed by the row
    /// key with the timestamp bytes ignored. Returns the spans in
    /// time-agnostic key order, plus the raw row count.
    fn find_spans(&self) -> Result<(Vec<Span>, usize), QueryError> {
        let layout = self.uids.layout();
        let request = self.scan_request(&layout);
        let mut builders: BTreeMap<SpanKey, SpanBuilder> = BTreeMap::new();
        let mut rows = 0usize;

        // The scanner is scoped to this call: every exit path, including
        // errors, drops and thereby closes it.
        let mut scanner = self.store.scan(&request)?;
        while let Some(row) = scanner.next()? {
            if row.key.len() < layout.metric
                || self.metric.as_slice() != &row.key[..layout.metric]
            {
                return Err(QueryError::ScannerInvariant { row: row.key });
            }
            layout.check(&row.key)?;
            builders
                .entry(SpanKey::new(row.key.clone(), layout.metric))
                .or_insert_with(|| SpanBuilder::new(layout))
                .add_row(&row)?;
            rows += 1;
        }
        scanner.close();

        query_metrics::record_scan(rows as u64, builders.len() as u64);
        self.listener.on_event(QueryEvent::ScanFinished {
            rows,
            spans: builders.len(),
        });

        let spans = builders
            .into_values()
            .filter_map(SpanBuilder::finish)
            .collect();
        Ok((spans, rows))
    }

    fn scan_request(&self, layout: &KeyLayout) -> ScanRequest {
        let key_filter = if self.literal_tags.is_empty() && self.group_bys.is_empty() {
            None
        } else {
            Some(build_row_filter(
                layout,
                &self.literal_tags,
                &self.group_bys,
                &self.group_by_values,
            ))
        };
        ScanRequest {
            start_row: scan_start_row(layout, &self.metric, self.start_time),
            end_row: scan_end_row(layout, &self.metric, self.end_time),
            family: self.family.clone(),
            key_filter,
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Query(start_time={}, end_time={}, metric={}",
            self.start_time,
            self.end_time,
            name_or_placeholder(self.uids.metrics.as_ref(), &self.metric)
        )?;
        write!(f, ", tags=[")?;
        for (i, tag) in self.literal_tags.iter().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            write!(
                f,
                "{}={}",
                name_or_placeholder(self.uids.tag_names.as_ref(), &tag.name),
                name_or_placeholder(self.uids.tag_values.as_ref(), &tag.value)
            )?;
        }
        write!(
            f,
            "], rate={}, aggregator={}, group_bys=[",
            self.rate, self.aggregator
        )?;
        for (i, name) in self.group_bys.iter().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", name_or_placeholder(self.uids.tag_names.as_ref(), name))?;
            if let Some(values) = self.group_by_values.get(name) {
                write!(f, "={{")?;
                for (j, value) in values.iter().enumerate() {
                    if j != 0 {
                        write!(f, "|")?;
                    }
                    write!(
                        f,
                        "{}",
                        name_or_placeholder(self.uids.tag_values.as_ref(), value)
                    )?;
                }
                write!(f, "}}")?;
            }
        }
        write!(f, "])")
    }
}

fn check_timestamp(timestamp: u64) -> Result<Timestamp, QueryError> {
    if timestamp == 0 || timestamp > u32::MAX as u64 {
        return Err(QueryError::InvalidTimestamp(timestamp));
    }
    Ok(timestamp as Timestamp)
}

fn now_seconds() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before Unix epoch")
        .as_secs() as Timestamp
}

/// Span-map key: orders row keys by metric id, then tag bytes, skipping
/// the 4 timestamp bytes in between, so all rows of one series collapse
/// onto one entry. The key bytes themselves are left untouched.
#[derive(Debug, Clone)]
struct SpanKey {
    row: Vec<u8>,
    metric_width: usize,
}

impl SpanKey {
    fn new(row: Vec<u8>, metric_width: usize) -> Self {
        debug_assert!(row.len() >= metric_width + TIMESTAMP_BYTES);
        Self { row, metric_width }
    }
}

impl Ord for SpanKey {
    fn cmp(&self, other: &Self) -> Ordering {
        let mw = self.metric_width;
        self.row[..mw]
            .cmp(&other.row[..mw])
            .then_with(|| self.row[mw + TIMESTAMP_BYTES..].cmp(&other.row[mw + TIMESTAMP_BYTES..]))
    }
}

impl PartialOrd for SpanKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SpanKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SpanKey {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemStore, POINTS_FAMILY};
    use crate::telemetry::noop_event_listener;
    use crate::uid::MemUidTable;

    fn test_uids() -> Uids {
        let metrics = Arc::new(MemUidTable::new("metric", 3));
        let tag_names = Arc::new(MemUidTable::new("tag name", 3));
        let tag_values = Arc::new(MemUidTable::new("tag value", 3));
        metrics.assign("sys.cpu.user");
        for name in ["dc", "host"] {
            tag_names.assign(name);
        }
        for value in ["ny", "web01", "web02"] {
            tag_values.assign(value);
        }
        Uids {
            metrics,
            tag_names,
            tag_values,
        }
    }

    fn test_query() -> Query {
        Query::new(
            test_uids(),
            Arc::new(MemStore::new()),
            noop_event_listener(),
            POINTS_FAMILY.to_vec(),
        )
    }

    fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn timestamps_are_validated() {
        let mut q = test_query();
        assert!(matches!(
            q.set_start_time(0),
            Err(QueryError::InvalidTimestamp(0))
        ));
        assert!(matches!(
            q.set_start_time(1 << 32),
            Err(QueryError::InvalidTimestamp(_))
        ));
        q.set_start_time(1000).unwrap();
        assert_eq!(q.start_time().unwrap(), 1000);

        assert!(matches!(
            q.set_end_time(1000),
            Err(QueryError::TimeRangeInvalid { start: 1000, end: 1000 })
        ));
        q.set_end_time(2000).unwrap();
        assert!(matches!(
            q.set_start_time(2000),
            Err(QueryError::TimeRangeInvalid { .. })
        ));
    }

    #[test]
    fn unset_start_time_is_an_error() {
        let mut q = test_query();
        assert!(matches!(q.start_time(), Err(QueryError::StartTimeUnset)));
        assert!(matches!(q.run(), Err(QueryError::StartTimeUnset)));
    }

    #[test]
    fn planner_partitions_tags() {
        let mut q = test_query();
        q.set_time_series(
            "sys.cpu.user",
            &tags(&[("dc", "ny"), ("host", "*")]),
            Aggregator::SUM,
            false,
        )
        .unwrap();

        assert_eq!(q.metric, vec![0, 0, 1]);
        assert_eq!(q.literal_tags.len(), 1);
        assert_eq!(q.literal_tags[0].name, vec![0, 0, 1]); // dc
        assert_eq!(q.literal_tags[0].value, vec![0, 0, 1]); // ny
        assert_eq!(q.group_bys, vec![vec![0, 0, 2]]); // host
        assert!(q.group_by_values.is_empty());
    }

    #[test]
    fn planner_splits_whitelists() {
        let mut q = test_query();
        q.set_time_series(
            "sys.cpu.user",
            &tags(&[("host", "web01|web02")]),
            Aggregator::MAX,
            true,
        )
        .unwrap();

        assert!(q.literal_tags.is_empty());
        assert_eq!(q.group_bys, vec![vec![0, 0, 2]]);
        let values = q.group_by_values.get([0u8, 0, 2].as_slice()).unwrap();
        assert_eq!(values, &vec![vec![0, 0, 2], vec![0, 0, 3]]);
        assert!(q.rate);
        assert_eq!(q.aggregator, Aggregator::MAX);
    }

    #[test]
    fn leading_star_groups_over_all_values() {
        // `*|web01` is a group-by, and the leading `*` swallows the
        // whitelist.
        let mut q = test_query();
        q.set_time_series(
            "sys.cpu.user",
            &tags(&[("host", "*|web01")]),
            Aggregator::SUM,
            false,
        )
        .unwrap();
        assert_eq!(q.group_bys.len(), 1);
        assert!(q.group_by_values.is_empty());
    }

    #[test]
    fn unknown_names_fail_resolution() {
        let mut q = test_query();
        assert!(matches!(
            q.set_time_series("no.such.metric", &tags(&[]), Aggregator::SUM, false),
            Err(QueryError::NoSuchName { kind: "metric", .. })
        ));
        assert!(matches!(
            q.set_time_series(
                "sys.cpu.user",
                &tags(&[("rack", "r1")]),
                Aggregator::SUM,
                false
            ),
            Err(QueryError::NoSuchName { kind: "tag name", .. })
        ));
        assert!(matches!(
            q.set_time_series(
                "sys.cpu.user",
                &tags(&[("host", "web01|web03")]),
                Aggregator::SUM,
                false
            ),
            Err(QueryError::NoSuchName { kind: "tag value", .. })
        ));
    }

    #[test]
    fn span_keys_ignore_timestamp_bytes() {
        let a = SpanKey::new(vec![0, 0, 1, 0, 0, 4, 0, 9, 9], 3);
        let b = SpanKey::new(vec![0, 0, 1, 0xFF, 0xFF, 0xFF, 0xFF, 9, 9], 3);
        assert_eq!(a, b);

        let c = SpanKey::new(vec![0, 0, 1, 0, 0, 0, 0, 9, 8], 3);
        assert!(c < a);

        let other_metric = SpanKey::new(vec![0, 0, 2, 0, 0, 0, 0, 9, 9], 3);
        assert!(a < other_metric);
    }

    #[test]
    fn display_resolves_ids() {
        let mut q = test_query();
        q.set_start_time(1000).unwrap();
        q.set_end_time(2000).unwrap();
        q.set_time_series(
            "sys.cpu.user",
            &tags(&[("dc", "ny"), ("host", "web01|web02")]),
            Aggregator::SUM,
            false,
        )
        .unwrap();
        let rendered = q.to_string();
        assert!(rendered.contains("metric=sys.cpu.user"));
        assert!(rendered.contains("dc=ny"));
        assert!(rendered.contains("host={web01|web02}"));
    }
}
