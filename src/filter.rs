//! Builds the row-key filter pushed down to the store with each scan.
//!
//! The filter is a single regular expression over the raw key bytes,
//! matching exactly the rows whose tag section contains every required
//! `(name_id, value_id)` pair, in any position: tag blocks are sorted by
//! name id, and unrequired tags may be interleaved anywhere. For a key
//! with 2 required tags `{0 0 1 0 0 2}` and `{4 5 6 9 8 7}` the pattern is
//!
//! ```text
//! (?s-u)^.{7}(?:.{6})*\x00\x00\x01\x00\x00\x02(?:.{6})*\x04\x05\x06\x09\x08\x07(?:.{6})*$
//! ```
//!
//! `(?s-u)` puts the engine in byte mode with DOTALL so `.` matches every
//! byte 0..=255; literal id bytes are emitted as `\xHH` escapes.

use std::collections::BTreeMap;

use crate::row_key::KeyLayout;
use crate::types::TagPair;
use crate::TIMESTAMP_BYTES;

/// Builds the scan filter for the given literal tags and group-by tags.
///
/// Both inputs must be sorted by name id; they are merged into the pattern
/// in ascending id order. `group_by_values` optionally constrains a
/// group-by name to a whitelist of value ids.
///
/// # Panics
/// Panics if a name id appears both as a literal tag and as a group-by;
/// the planner never produces such a query.
pub fn build_row_filter(
    layout: &KeyLayout,
    literal_tags: &[TagPair],
    group_bys: &[Vec<u8>],
    group_by_values: &BTreeMap<Vec<u8>, Vec<Vec<u8>>>,
) -> String {
    let tag_width = layout.tag_pair();
    // Reserved up front: each required tag costs one skip block plus its
    // escaped id bytes; whitelisted group-bys cost a few alternatives.
    let mut buf = String::with_capacity(
        22 + (16 + 4 * tag_width) * (literal_tags.len() + 3 * group_bys.len()),
    );

    buf.push_str("(?s-u)^.{");
    buf.push_str(&(layout.metric + TIMESTAMP_BYTES).to_string());
    buf.push('}');

    let skip_any_tags = format!("(?:.{{{tag_width}}})*");

    let mut tags = literal_tags.iter().peekable();
    let mut groups = group_bys.iter().peekable();
    while tags.peek().is_some() || groups.peek().is_some() {
        buf.push_str(&skip_any_tags);
        if literal_is_next(layout, tags.peek().copied(), groups.peek().copied()) {
            let tag = tags.next().expect("peeked literal tag");
            push_id(&mut buf, &tag.name);
            push_id(&mut buf, &tag.value);
        } else {
            let name = groups.next().expect("peeked group-by tag");
            push_id(&mut buf, name);
            match group_by_values.get(name) {
                // Any value id.
                None => {
                    buf.push_str(&format!(".{{{}}}", layout.value));
                }
                Some(value_ids) => {
                    buf.push_str("(?:");
                    for (i, value_id) in value_ids.iter().enumerate() {
                        if i != 0 {
                            buf.push('|');
                        }
                        push_id(&mut buf, value_id);
                    }
                    buf.push(')');
                }
            }
        }
    }

    buf.push_str(&skip_any_tags);
    buf.push('$');
    buf
}

/// Merge-order decision between the next literal tag and the next group-by
/// name: whichever carries the smaller name id goes first.
fn literal_is_next(
    layout: &KeyLayout,
    tag: Option<&TagPair>,
    group_by: Option<&Vec<u8>>,
) -> bool {
    let (tag, group_by) = match (tag, group_by) {
        (None, _) => return false,
        (Some(_), None) => return true,
        (Some(tag), Some(group_by)) => (tag, group_by),
    };
    use std::cmp::Ordering;
    match tag.name[..layout.name].cmp(&group_by[..layout.name]) {
        Ordering::Less => true,
        Ordering::Greater => false,
        Ordering::Equal => panic!(
            "tag id {:?} is both a literal tag and a group-by",
            group_by
        ),
    }
}

fn push_id(buf: &mut String, id: &[u8]) {
    for b in id {
        buf.push_str(&format!("\\x{b:02x}"));
    }
}
