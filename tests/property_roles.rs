//! Property-based tests for role graphs, effects and filtered removal
//!
//! Uses proptest to check the invariants over random graphs and rule sets

use proptest::prelude::*;
use std::collections::HashSet;
use tollgate::{DefaultRoleManager, Enforcer, MemoryAdapter, Model, RoleManager};

const NAMES: [&str; 6] = ["alice", "bob", "admin", "editor", "reader", "guest"];

const DENY_MODEL: &str = "[request_definition]\nr = sub, obj, act\n\
                          [policy_definition]\np = sub, obj, act, eft\n\
                          [policy_effect]\ne = some(where (p.eft == allow)) && !some(where (p.eft == deny))\n\
                          [matchers]\nm = r.sub == p.sub && r.obj == p.obj && r.act == p.act\n";

const ACL_MODEL: &str = "[request_definition]\nr = sub, obj, act\n\
                         [policy_definition]\np = sub, obj, act\n\
                         [policy_effect]\ne = some(where (p.eft == allow))\n\
                         [matchers]\nm = r.sub == p.sub && r.obj == p.obj && r.act == p.act\n";

fn edge() -> impl Strategy<Value = (usize, usize)> {
    (0..NAMES.len(), 0..NAMES.len())
}

fn reachability(rm: &DefaultRoleManager) -> Vec<bool> {
    let mut matrix = Vec::new();
    for a in NAMES {
        for b in NAMES {
            matrix.push(rm.has_link(a, b, None));
        }
    }
    matrix
}

fn graph(edges: &[(usize, usize)]) -> DefaultRoleManager {
    let mut rm = DefaultRoleManager::new();
    for &(a, b) in edges {
        rm.add_link(NAMES[a], NAMES[b], None);
    }
    rm
}

fn rule_strategy() -> impl Strategy<Value = Vec<String>> {
    (0..3usize, 0..3usize, 0..2usize).prop_map(|(s, o, a)| {
        vec![
            ["alice", "bob", "carol"][s].to_string(),
            ["data1", "data2", "data3"][o].to_string(),
            ["read", "write"][a].to_string(),
        ]
    })
}

proptest! {
    #[test]
    fn prop_has_link_is_reflexive(edges in prop::collection::vec(edge(), 0..20)) {
        let rm = graph(&edges);
        for name in NAMES {
            prop_assert!(rm.has_link(name, name, None));
        }
        prop_assert!(rm.has_link("stranger", "stranger", None));
    }

    #[test]
    fn prop_add_then_delete_restores_reachability(
        edges in prop::collection::vec(edge(), 0..20),
        extra in edge()
    ) {
        prop_assume!(!edges.contains(&extra));
        let mut rm = graph(&edges);
        let before = reachability(&rm);

        rm.add_link(NAMES[extra.0], NAMES[extra.1], None);
        prop_assert!(rm.has_link(NAMES[extra.0], NAMES[extra.1], None));
        prop_assert!(rm.delete_link(NAMES[extra.0], NAMES[extra.1], None));

        prop_assert_eq!(reachability(&rm), before);
    }

    #[test]
    fn prop_has_link_is_transitive(edges in prop::collection::vec(edge(), 0..20)) {
        let rm = graph(&edges);
        for a in NAMES {
            for b in NAMES {
                for c in NAMES {
                    if rm.has_link(a, b, None) && rm.has_link(b, c, None) {
                        prop_assert!(rm.has_link(a, c, None), "{} -> {} -> {}", a, b, c);
                    }
                }
            }
        }
    }

    #[test]
    fn prop_explicit_deny_wins_in_any_order(
        allows in 0usize..5,
        deny_at in 0usize..6
    ) {
        let e = Enforcer::new(Model::from_text(DENY_MODEL).unwrap(), MemoryAdapter::new()).unwrap();
        let mut rules: Vec<Vec<String>> = (0..allows)
            .map(|i| vec!["alice".into(), "data1".into(), "read".into(), format!("allow{}", i)])
            .collect();
        // Distinct "allow<i>" values are not "deny", so they count as allow
        let position = deny_at.min(rules.len());
        rules.insert(position, vec!["alice".into(), "data1".into(), "read".into(), "deny".into()]);
        e.add_policies(rules).unwrap();

        prop_assert!(!e.enforce(&["alice", "data1", "read"]).unwrap());
    }

    #[test]
    fn prop_enforce_is_deterministic(
        rules in prop::collection::vec(rule_strategy(), 0..15),
        request in rule_strategy()
    ) {
        let e = Enforcer::new(Model::from_text(ACL_MODEL).unwrap(), MemoryAdapter::new()).unwrap();
        for rule in &rules {
            e.add_policy(rule).unwrap();
        }
        let first = e.enforce(&request).unwrap();
        prop_assert_eq!(e.enforce(&request).unwrap(), first);
        prop_assert_eq!(first, rules.contains(&request));
    }

    #[test]
    fn prop_remove_filtered_removes_exactly_matching(
        rules in prop::collection::vec(rule_strategy(), 0..15),
        object in prop::sample::select(vec!["data1", "data2", "data3"])
    ) {
        let e = Enforcer::new(Model::from_text(ACL_MODEL).unwrap(), MemoryAdapter::new()).unwrap();
        for rule in &rules {
            e.add_policy(rule).unwrap();
        }
        let unique: Vec<Vec<String>> = {
            let mut seen = HashSet::new();
            rules.iter().filter(|r| seen.insert((*r).clone())).cloned().collect()
        };

        let removed = e.remove_filtered_policy(1, &[object]).unwrap();
        let expected: Vec<Vec<String>> = unique.iter().filter(|r| r[1] != object).cloned().collect();

        prop_assert_eq!(removed, expected.len() != unique.len());
        prop_assert_eq!(e.get_policy().unwrap(), expected);
    }
}
