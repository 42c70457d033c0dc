//! Property test: the scan filter matches a row exactly when the row's tag
//! section satisfies every requirement.

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;
use regex::bytes::Regex;

use tsquery::filter::build_row_filter;
use tsquery::row_key::{build_row_key, KeyLayout};
use tsquery::types::TagPair;

const LAYOUT: KeyLayout = KeyLayout {
    metric: 3,
    name: 3,
    value: 3,
};

#[derive(Debug, Clone)]
enum Requirement {
    Literal(u8),
    AnyValue,
    Whitelist(BTreeSet<u8>),
}

fn id(n: u8) -> Vec<u8> {
    vec![0, 0, n]
}

fn requirement_strategy() -> impl Strategy<Value = Requirement> {
    prop_oneof![
        (1u8..7).prop_map(Requirement::Literal),
        Just(Requirement::AnyValue),
        prop::collection::btree_set(1u8..7, 2..4).prop_map(Requirement::Whitelist),
    ]
}

fn row_matches(row: &BTreeMap<u8, u8>, requirements: &BTreeMap<u8, Requirement>) -> bool {
    requirements.iter().all(|(name, req)| match row.get(name) {
        None => false,
        Some(&value) => match req {
            Requirement::Literal(expected) => value == *expected,
            Requirement::AnyValue => true,
            Requirement::Whitelist(values) => values.contains(&value),
        },
    })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        .. ProptestConfig::default()
    })]

    #[test]
    fn filter_matches_iff_requirements_are_satisfied(
        row in prop::collection::btree_map(1u8..7, 1u8..7, 0..5),
        requirements in prop::collection::btree_map(1u8..7, requirement_strategy(), 1..4),
    ) {
        let mut literal_tags = Vec::new();
        let mut group_bys = Vec::new();
        let mut group_by_values = BTreeMap::new();
        for (name, req) in &requirements {
            match req {
                Requirement::Literal(value) => literal_tags.push(TagPair {
                    name: id(*name),
                    value: id(*value),
                }),
                Requirement::AnyValue => group_bys.push(id(*name)),
                Requirement::Whitelist(values) => {
                    group_by_values
                        .insert(id(*name), values.iter().map(|&v| id(v)).collect());
                    group_bys.push(id(*name));
                }
            }
        }

        let pattern = build_row_filter(&LAYOUT, &literal_tags, &group_bys, &group_by_values);
        let regex = Regex::new(&pattern).unwrap();

        let pairs: Vec<(Vec<u8>, Vec<u8>)> = row
            .iter()
            .map(|(&n, &v)| (id(n), id(v)))
            .collect();
        let borrowed: Vec<(&[u8], &[u8])> = pairs
            .iter()
            .map(|(n, v)| (n.as_slice(), v.as_slice()))
            .collect();
        let key = build_row_key(&LAYOUT, &[0, 0, 1], 1024, &borrowed);

        prop_assert_eq!(regex.is_match(&key), row_matches(&row, &requirements));
    }
}
