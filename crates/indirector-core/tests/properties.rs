//! Property-based tests for request construction and search filters
//!
//! Uses proptest to check that:
//! 1. Keys survive path escaping as a single, reversible segment
//! 2. Query strings are deterministic and never leak caller identity
//! 3. Filters behave as a conjunction and treat missing facts as non-matching

use proptest::prelude::*;
use serde_json::json;
use std::collections::BTreeMap;

use indirector_core::{escape_segment, unescape_segment, Filter, Instance, Method, Options, Request};

// =============================================================================
// KEYS
// =============================================================================

proptest! {
    /// An escaped key is one path segment that decodes back to the key
    #[test]
    fn prop_escaped_key_is_single_segment(key in "[ -~]{1,40}") {
        let escaped = escape_segment(&key);
        prop_assert!(!escaped.contains('/'));
        prop_assert!(!escaped.contains('?'));
        prop_assert!(!escaped.contains('#'));

        let decoded = unescape_segment(&escaped).unwrap();
        prop_assert_eq!(decoded, key);
    }

    /// Every method but search needs a key
    #[test]
    fn prop_empty_key_only_for_search(index in 0usize..5) {
        let method = Method::ALL[index];
        let result = Request::new("widget", method, "", Options::new(), None);
        prop_assert_eq!(result.is_ok(), method == Method::Search);
    }
}

// =============================================================================
// QUERY STRINGS
// =============================================================================

proptest! {
    /// Query strings depend only on the options, never on insertion order
    #[test]
    fn prop_query_string_deterministic(
        params in prop::collection::btree_map("[a-z]{1,8}", "[ -~]{0,12}", 0..6),
    ) {
        let forward = params.iter().fold(Options::new(), |o, (k, v)| o.with_param(k, v));
        let backward = params.iter().rev().fold(Options::new(), |o, (k, v)| o.with_param(k, v));

        let a = Request::new("facts", Method::Search, "", forward, None).unwrap();
        let b = Request::new("facts", Method::Search, "", backward, None).unwrap();
        prop_assert_eq!(a.query_string(), b.query_string());
    }

    /// Caller identity stays local
    #[test]
    fn prop_query_string_skips_identity(node in "[a-z]{1,10}", ip in "10\\.[0-9]{1,3}\\.[0-9]{1,3}\\.[0-9]{1,3}") {
        let mut options = Options::new().with_node(node).with_environment("production");
        options.ip = Some(ip);
        options.authenticated = true;
        let request = Request::new("catalog", Method::Find, "n1", options, None).unwrap();
        let query = request.query_string();
        prop_assert!(!query.contains("node="));
        prop_assert!(!query.contains("ip="));
        prop_assert!(!query.contains("authenticated="));
        prop_assert!(query.starts_with("environment=production"));
    }
}

// =============================================================================
// FILTERS
// =============================================================================

fn instance_with(values: &BTreeMap<String, i64>) -> Instance {
    Instance::new("n1", json!({ "name": "n1", "values": values }))
}

proptest! {
    /// `eq` and `ne` partition instances that carry the fact
    #[test]
    fn prop_eq_and_ne_are_complements(actual in 0i64..10, expected in 0i64..10) {
        let values = BTreeMap::from([("cpus".to_string(), actual)]);
        let instance = instance_with(&values);

        let eq = Filter::from_params(&BTreeMap::from([("facts.cpus".to_string(), expected.to_string())])).unwrap();
        let ne = Filter::from_params(&BTreeMap::from([("facts.cpus.ne".to_string(), expected.to_string())])).unwrap();
        prop_assert_ne!(eq.matches(&instance), ne.matches(&instance));
    }

    /// A fact the instance lacks never matches, whatever the operator
    #[test]
    fn prop_missing_fact_never_matches(op in prop::sample::select(vec!["eq", "ne", "lt", "le", "gt", "ge"]), bound in 0i64..100) {
        let instance = instance_with(&BTreeMap::new());
        let params = BTreeMap::from([(format!("facts.cpus.{}", op), bound.to_string())]);
        let filter = Filter::from_params(&params).unwrap();
        prop_assert!(!filter.matches(&instance));
    }

    /// Numeric bounds agree with integer comparison
    #[test]
    fn prop_numeric_bounds(actual in -50i64..50, bound in -50i64..50) {
        let instance = instance_with(&BTreeMap::from([("load".to_string(), actual)]));
        let check = |op: &str| {
            Filter::from_params(&BTreeMap::from([(format!("facts.load.{}", op), bound.to_string())]))
                .unwrap()
                .matches(&instance)
        };
        prop_assert_eq!(check("lt"), actual < bound);
        prop_assert_eq!(check("le"), actual <= bound);
        prop_assert_eq!(check("gt"), actual > bound);
        prop_assert_eq!(check("ge"), actual >= bound);
    }

    /// Adding a predicate can only shrink the result set
    #[test]
    fn prop_conjunction_shrinks(
        cpus in prop::collection::vec(0i64..8, 0..12),
        threshold in 0i64..8,
    ) {
        let instances: Vec<Instance> = cpus
            .iter()
            .enumerate()
            .map(|(i, c)| Instance::new(format!("n{}", i), json!({"values": {"cpus": c, "kernel": "Linux"}})))
            .collect();

        let loose = Filter::from_params(&BTreeMap::from([("facts.kernel".to_string(), "Linux".to_string())])).unwrap();
        let strict = Filter::from_params(&BTreeMap::from([
            ("facts.kernel".to_string(), "Linux".to_string()),
            ("facts.cpus.ge".to_string(), threshold.to_string()),
        ])).unwrap();

        let loose_count = loose.apply(instances.clone()).len();
        let strict_count = strict.apply(instances).len();
        prop_assert_eq!(loose_count, cpus.len());
        prop_assert!(strict_count <= loose_count);
    }
}
