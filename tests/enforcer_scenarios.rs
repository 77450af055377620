//! End-to-end enforcer scenarios, run against every policy store

use std::collections::HashSet;
use std::path::PathBuf;
use tempfile::TempDir;
use tollgate::{Adapter, Enforcer, FileAdapter, MemoryAdapter, Model, SqliteAdapter, TableName};

const RBAC_MODEL: &str = r#"
[request_definition]
r = sub, obj, act

[policy_definition]
p = sub, obj, act

[role_definition]
g = _, _

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act
"#;

#[derive(Debug, Clone, Copy)]
enum Store {
    Memory,
    File,
    Sqlite,
}

const STORES: [Store; 3] = [Store::Memory, Store::File, Store::Sqlite];

struct Fixture {
    store: Store,
    path: PathBuf,
    _dir: TempDir,
}

impl Fixture {
    fn new(store: Store) -> Self {
        let dir = TempDir::new().unwrap();
        let path = match store {
            Store::Sqlite => dir.path().join("policy.db"),
            _ => dir.path().join("policy.csv"),
        };
        Fixture { store, path, _dir: dir }
    }

    fn adapter(&self) -> Box<dyn Adapter> {
        match self.store {
            Store::Memory => Box::new(MemoryAdapter::new()),
            Store::File => Box::new(FileAdapter::new(&self.path)),
            Store::Sqlite => Box::new(SqliteAdapter::open(&self.path, TableName::default()).unwrap()),
        }
    }

    /// Whether a second adapter on the same path sees earlier writes
    fn persistent(&self) -> bool {
        !matches!(self.store, Store::Memory)
    }

    fn enforcer(&self) -> Enforcer {
        let model = Model::from_text(RBAC_MODEL).unwrap();
        Enforcer::builder(model)
            .boxed_adapter(self.adapter())
            .build()
            .unwrap()
    }

    /// Enforcer holding the reference rule set
    fn seeded(&self) -> Enforcer {
        let e = self.enforcer();
        e.add_policies(vec![
            vec!["alice", "data1", "read"],
            vec!["bob", "data2", "write"],
            vec!["data2_admin", "data2", "read"],
            vec!["data2_admin", "data2", "write"],
        ])
        .unwrap();
        e.add_grouping_policy(&["alice", "data2_admin"]).unwrap();
        e
    }
}

fn rules(rows: &[&[&str]]) -> Vec<Vec<String>> {
    rows.iter()
        .map(|row| row.iter().map(|s| s.to_string()).collect())
        .collect()
}

fn as_set(rules: Vec<Vec<String>>) -> HashSet<Vec<String>> {
    rules.into_iter().collect()
}

#[test]
fn test_reference_scenario() {
    for store in STORES {
        let fixture = Fixture::new(store);
        let e = fixture.seeded();

        assert!(e.enforce(&["alice", "data1", "read"]).unwrap(), "{:?}", store);
        assert!(!e.enforce(&["bob", "data1", "read"]).unwrap(), "{:?}", store);
        assert!(e.enforce(&["bob", "data2", "write"]).unwrap(), "{:?}", store);
        assert!(e.enforce(&["alice", "data2", "read"]).unwrap(), "{:?}", store);
        assert!(e.enforce(&["alice", "data2", "write"]).unwrap(), "{:?}", store);
    }
}

#[test]
fn test_remove_filtered_write_rules() {
    for store in STORES {
        let fixture = Fixture::new(store);
        let e = fixture.seeded();

        assert!(e.remove_filtered_policy(2, &["write"]).unwrap());

        assert!(!e.enforce(&["bob", "data2", "write"]).unwrap(), "{:?}", store);
        assert!(!e.enforce(&["alice", "data2", "write"]).unwrap(), "{:?}", store);
        assert!(e.enforce(&["alice", "data1", "read"]).unwrap(), "{:?}", store);
        assert!(e.enforce(&["alice", "data2", "read"]).unwrap(), "{:?}", store);
        assert_eq!(
            e.get_policy().unwrap(),
            rules(&[&["alice", "data1", "read"], &["data2_admin", "data2", "read"]])
        );

        e.load_policy().unwrap();
        assert_eq!(e.get_policy().unwrap().len(), 2, "{:?}", store);
    }
}

#[test]
fn test_save_then_load_round_trip() {
    for store in STORES {
        let fixture = Fixture::new(store);
        let e = fixture.seeded();
        let before_p = as_set(e.get_policy().unwrap());
        let before_g = as_set(e.get_grouping_policy().unwrap());

        e.save_policy().unwrap();
        e.load_policy().unwrap();
        assert_eq!(as_set(e.get_policy().unwrap()), before_p, "{:?}", store);
        assert_eq!(as_set(e.get_grouping_policy().unwrap()), before_g, "{:?}", store);
        assert!(e.enforce(&["alice", "data2", "write"]).unwrap());

        if fixture.persistent() {
            let reopened = fixture.enforcer();
            assert_eq!(as_set(reopened.get_policy().unwrap()), before_p, "{:?}", store);
            assert_eq!(as_set(reopened.get_grouping_policy().unwrap()), before_g, "{:?}", store);
            assert!(reopened.enforce(&["alice", "data2", "write"]).unwrap());
        }
    }
}

#[test]
fn test_permission_lifecycle() {
    for store in STORES {
        let fixture = Fixture::new(store);
        let e = fixture.seeded();

        assert!(e.add_permission_for_user("bob", &["data1", "read"]).unwrap());
        assert!(e.enforce(&["bob", "data1", "read"]).unwrap(), "{:?}", store);

        assert!(e.delete_permission_for_user("bob", &["data1", "read"]).unwrap());
        assert!(!e.enforce(&["bob", "data1", "read"]).unwrap(), "{:?}", store);
        assert!(!e.delete_permission_for_user("bob", &["data1", "read"]).unwrap());

        if fixture.persistent() {
            let reopened = fixture.enforcer();
            assert!(!reopened.has_permission_for_user("bob", &["data1", "read"]).unwrap());
            assert!(reopened.has_permission_for_user("bob", &["data2", "write"]).unwrap());
        }
    }
}

#[test]
fn test_add_policies_after_clear() {
    for store in STORES {
        let fixture = Fixture::new(store);
        let e = fixture.seeded();
        let batch = rules(&[
            &["alice", "data1", "read"],
            &["bob", "data2", "write"],
            &["carol", "data3", "read"],
        ]);

        e.clear_policy().unwrap();
        assert!(e.get_policy().unwrap().is_empty());
        assert!(!e.enforce(&["alice", "data1", "read"]).unwrap());

        assert!(e.add_policies(batch.clone()).unwrap());
        assert_eq!(e.get_policy().unwrap(), batch, "{:?}", store);

        e.load_policy().unwrap();
        assert_eq!(e.get_policy().unwrap(), batch, "{:?}", store);
        assert!(e.get_grouping_policy().unwrap().is_empty());
    }
}

#[test]
fn test_remove_policies_leaves_rest() {
    for store in STORES {
        let fixture = Fixture::new(store);
        let e = fixture.seeded();

        assert!(e
            .remove_policies(vec![
                vec!["alice", "data1", "read"],
                vec!["data2_admin", "data2", "write"],
            ])
            .unwrap());

        let expected = rules(&[&["bob", "data2", "write"], &["data2_admin", "data2", "read"]]);
        assert_eq!(e.get_policy().unwrap(), expected, "{:?}", store);

        e.load_policy().unwrap();
        assert_eq!(e.get_policy().unwrap(), expected, "{:?}", store);
    }
}

#[test]
fn test_invalid_batch_leaves_store_unchanged() {
    for store in STORES {
        let fixture = Fixture::new(store);
        let e = fixture.seeded();

        let result = e.add_policies(vec![vec!["carol", "data3", "read"], vec!["carol", "data3"]]);
        assert!(result.is_err(), "{:?}", store);

        e.load_policy().unwrap();
        assert!(!e.has_policy(&["carol", "data3", "read"]).unwrap(), "{:?}", store);
        assert_eq!(e.get_policy().unwrap().len(), 4);
    }
}

#[test]
fn test_role_changes_persist() {
    for store in STORES {
        let fixture = Fixture::new(store);
        let e = fixture.seeded();

        assert!(e.add_role_for_user("bob", "data2_admin", None).unwrap());
        assert!(e.delete_role_for_user("alice", "data2_admin", None).unwrap());

        e.load_policy().unwrap();
        assert_eq!(e.get_users_for_role("data2_admin", None).unwrap(), vec!["bob"], "{:?}", store);
        assert!(e.enforce(&["bob", "data2", "read"]).unwrap());
        assert!(!e.enforce(&["alice", "data2", "read"]).unwrap());
    }
}

#[test]
fn test_wildcard_subject_through_role_call() {
    for store in STORES {
        let fixture = Fixture::new(store);
        let e = fixture.enforcer();
        e.add_policy(&["*", "data1", "read"]).unwrap();

        assert!(e.enforce(&["alice", "data1", "read"]).unwrap(), "{:?}", store);
        assert!(e.enforce(&["anyone", "data1", "read"]).unwrap(), "{:?}", store);
        assert!(!e.enforce(&["alice", "data1", "write"]).unwrap(), "{:?}", store);
        assert!(!e.enforce(&["alice", "data2", "read"]).unwrap(), "{:?}", store);

        if fixture.persistent() {
            let reopened = fixture.enforcer();
            assert!(reopened.enforce(&["bob", "data1", "read"]).unwrap(), "{:?}", store);
        }
    }
}
