//! Partitions the spans found by a scan into groups keyed by the values of
//! the query's group-by tags, and packages each group for downstream
//! aggregation.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::row_key::KeyLayout;
use crate::span::{Span, SpanIter};
use crate::telemetry::{query_metrics, QueryEvent, QueryEventListener};
use crate::types::{Aggregator, SeekableView, Timestamp};

/// A set of spans sharing one group key, with the time bounds, aggregator
/// identity, and rate flag the caller's aggregation stage needs.
#[derive(Debug, Clone)]
pub struct SpanGroup {
    group_key: Vec<u8>,
    start_time: Timestamp,
    end_time: Timestamp,
    spans: Vec<Span>,
    aggregator: Aggregator,
    rate: bool,
}

impl SpanGroup {
    fn new(
        group_key: Vec<u8>,
        start_time: Timestamp,
        end_time: Timestamp,
        aggregator: Aggregator,
        rate: bool,
    ) -> Self {
        Self {
            group_key,
            start_time,
            end_time,
            spans: Vec::new(),
            aggregator,
            rate,
        }
    }

    /// Concatenated value ids of the group-by tags, in sorted-name order.
    /// Empty for a query without group-bys.
    pub fn group_key(&self) -> &[u8] {
        &self.group_key
    }

    pub fn start_time(&self) -> Timestamp {
        self.start_time
    }

    pub fn end_time(&self) -> Timestamp {
        self.end_time
    }

    pub fn aggregator(&self) -> Aggregator {
        self.aggregator
    }

    /// Whether the caller asked for rate-of-change conversion instead of
    /// raw values.
    pub fn rate(&self) -> bool {
        self.rate
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    /// Total number of data points across the group's spans.
    pub fn size(&self) -> usize {
        self.spans.iter().map(Span::size).sum()
    }

    /// One seekable view per span, for the aggregator to merge.
    pub fn views(&self) -> Vec<SpanIter<'_>> {
        self.spans.iter().map(Span::iter).collect()
    }

    /// Like [`SpanGroup::views`], but each view is already positioned at
    /// the group's start bound, trimming the scan padding.
    pub fn views_from_start(&self) -> Vec<SpanIter<'_>> {
        let mut views = self.views();
        for view in &mut views {
            view.seek(self.start_time);
        }
        views
    }
}

/// Assigns each span to its group, in ascending group-key byte order.
///
/// A span whose tags lack one of the group-by names cannot be assigned to
/// any group; it is dropped and reported through the event listener.
#[allow(clippy::too_many_arguments)]
pub(crate) fn group_spans(
    layout: &KeyLayout,
    spans: Vec<Span>,
    group_bys: &[Vec<u8>],
    start_time: Timestamp,
    end_time: Timestamp,
    aggregator: Aggregator,
    rate: bool,
    listener: &Arc<dyn QueryEventListener>,
) -> Vec<SpanGroup> {
    if spans.is_empty() {
        return Vec::new();
    }

    if group_bys.is_empty() {
        let mut group = SpanGroup::new(Vec::new(), start_time, end_time, aggregator, rate);
        group.spans = spans;
        return vec![group];
    }

    let mut groups: BTreeMap<Vec<u8>, SpanGroup> = BTreeMap::new();
    for span in spans {
        match group_key_of(layout, &span, group_bys) {
            Some(key) => {
                groups
                    .entry(key.clone())
                    .or_insert_with(|| {
                        SpanGroup::new(key, start_time, end_time, aggregator, rate)
                    })
                    .spans
                    .push(span);
            }
            None => {
                query_metrics::record_span_dropped();
                listener.on_event(QueryEvent::SpanDropped {
                    row_key: span.row_key().to_vec(),
                });
            }
        }
    }
    groups.into_values().collect()
}

/// Extracts the group key of one span: the value id of each group-by name,
/// concatenated in order. Both the span's tag block and `group_bys` are
/// sorted by name id, so a single merge walk suffices.
fn group_key_of(layout: &KeyLayout, span: &Span, group_bys: &[Vec<u8>]) -> Option<Vec<u8>> {
    let tag_bytes = span.tag_bytes();
    let mut pairs = tag_bytes.chunks_exact(layout.tag_pair());
    let mut key = Vec::with_capacity(group_bys.len() * layout.value);

    for wanted in group_bys {
        let value = loop {
            let pair = pairs.next()?;
            let name = &pair[..layout.name];
            if name == wanted.as_slice() {
                break &pair[layout.name..];
            }
            if name > wanted.as_slice() {
                // Names ascend; the wanted one cannot appear later.
                return None;
            }
        };
        key.extend_from_slice(value);
    }
    Some(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row_key::build_row_key;
    use crate::row_seq::tests_support::long_cell;
    use crate::span::SpanBuilder;
    use crate::store::ScannedRow;
    use crate::telemetry::noop_event_listener;

    const LAYOUT: KeyLayout = KeyLayout {
        metric: 3,
        name: 3,
        value: 3,
    };

    fn span_with_tags(tags: &[(u8, u8)]) -> Span {
        let pairs: Vec<(Vec<u8>, Vec<u8>)> = tags
            .iter()
            .map(|&(n, v)| (vec![0, 0, n], vec![0, 0, v]))
            .collect();
        let borrowed: Vec<(&[u8], &[u8])> = pairs
            .iter()
            .map(|(n, v)| (n.as_slice(), v.as_slice()))
            .collect();
        let key = build_row_key(&LAYOUT, &[0, 0, 1], 1024, &borrowed);
        let mut builder = SpanBuilder::new(LAYOUT);
        builder
            .add_row(&ScannedRow {
                key,
                cells: vec![long_cell(1, 1)],
            })
            .unwrap();
        builder.finish().unwrap()
    }

    fn assemble(spans: Vec<Span>, group_bys: &[Vec<u8>]) -> Vec<SpanGroup> {
        group_spans(
            &LAYOUT,
            spans,
            group_bys,
            1000,
            2000,
            Aggregator::SUM,
            false,
            &noop_event_listener(),
        )
    }

    #[test]
    fn no_spans_yield_no_groups() {
        assert!(assemble(Vec::new(), &[vec![0, 0, 2]]).is_empty());
    }

    #[test]
    fn no_group_bys_yield_one_group() {
        let groups = assemble(
            vec![span_with_tags(&[(2, 5)]), span_with_tags(&[(2, 6)])],
            &[],
        );
        assert_eq!(groups.len(), 1);
        assert!(groups[0].group_key().is_empty());
        assert_eq!(groups[0].spans().len(), 2);
        assert_eq!(groups[0].size(), 2);
        assert_eq!(groups[0].aggregator(), Aggregator::SUM);
        assert!(!groups[0].rate());
    }

    #[test]
    fn spans_split_by_group_value() {
        let groups = assemble(
            vec![
                span_with_tags(&[(2, 6)]),
                span_with_tags(&[(2, 5)]),
                span_with_tags(&[(2, 5), (3, 9)]),
            ],
            &[vec![0, 0, 2]],
        );
        assert_eq!(groups.len(), 2);
        // Ascending group-key order.
        assert_eq!(groups[0].group_key(), &[0, 0, 5]);
        assert_eq!(groups[0].spans().len(), 2);
        assert_eq!(groups[1].group_key(), &[0, 0, 6]);
        assert_eq!(groups[1].spans().len(), 1);
    }

    #[test]
    fn multi_name_group_key_concatenates_values() {
        let groups = assemble(
            vec![span_with_tags(&[(2, 5), (4, 7)])],
            &[vec![0, 0, 2], vec![0, 0, 4]],
        );
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].group_key(), &[0, 0, 5, 0, 0, 7]);
    }

    #[test]
    fn span_missing_a_group_by_name_is_dropped() {
        let groups = assemble(
            vec![span_with_tags(&[(3, 9)]), span_with_tags(&[(2, 5)])],
            &[vec![0, 0, 2]],
        );
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].group_key(), &[0, 0, 5]);
        assert_eq!(groups[0].spans().len(), 1);
    }

    #[test]
    fn views_from_start_trim_scan_padding() {
        let span = span_with_tags(&[(2, 5)]);
        let mut group = SpanGroup::new(Vec::new(), 1025, 2000, Aggregator::SUM, false);
        group.spans.push(span);

        let mut views = group.views_from_start();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].next_point().unwrap().timestamp(), 1025);
    }
}
