// tests/property_edit_distance.rs

use proptest::prelude::*;

use mk::cache::Cache;
use mk::edit::{distance_cached, distance_graph};

/// Textbook Wagner-Fischer table, used as the reference answer.
fn reference(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    for i in 1..=a.len() {
        let mut row = vec![i; b.len() + 1];
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            row[j] = (prev[j - 1] + cost).min(prev[j] + 1).min(row[j - 1] + 1);
        }
        prev = row;
    }
    prev[b.len()]
}

// Small alphabet so the strings share characters often.
fn word() -> impl Strategy<Value = String> {
    "[abcé]{0,7}"
}

proptest! {
    #[test]
    fn graph_and_cache_agree_with_the_table(a in word(), b in word()) {
        let expected = reference(&a, &b);

        let (graph, system) = distance_graph(&a, &b).expect("graph evaluation");
        prop_assert_eq!(graph, expected);

        let cells = (a.chars().count() + 1) * (b.chars().count() + 1);
        prop_assert!(system.invocations() <= cells);

        let mut cache = Cache::new();
        prop_assert_eq!(distance_cached(&a, &b, &mut cache), expected);
    }

    #[test]
    fn distance_is_symmetric_and_bounded(a in word(), b in word()) {
        let mut cache = Cache::new();
        let forward = distance_cached(&a, &b, &mut cache);
        let backward = distance_cached(&b, &a, &mut cache);

        prop_assert_eq!(forward, backward);
        prop_assert!(forward <= a.chars().count().max(b.chars().count()));
        prop_assert_eq!(forward == 0, a == b);
    }
}
