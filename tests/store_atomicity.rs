//! Failed store writes must leave the enforcer exactly as it was

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tollgate::{Adapter, Enforcer, Error, MemoryAdapter, Model, Result};

const RBAC_MODEL: &str = "[request_definition]\nr = sub, obj, act\n\
                          [policy_definition]\np = sub, obj, act\n\
                          [role_definition]\ng = _, _\n\
                          [policy_effect]\ne = some(where (p.eft == allow))\n\
                          [matchers]\nm = g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act\n";

/// Memory store that fails every call while `offline` is set
struct FlakyAdapter {
    inner: MemoryAdapter,
    offline: Arc<AtomicBool>,
}

impl FlakyAdapter {
    fn check(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::store(
                "flaky store",
                io::Error::new(io::ErrorKind::ConnectionRefused, "store offline"),
            ));
        }
        Ok(())
    }
}

impl Adapter for FlakyAdapter {
    fn load_policy(&mut self, model: &mut Model) -> Result<()> {
        self.check()?;
        self.inner.load_policy(model)
    }

    fn save_policy(&mut self, model: &Model) -> Result<()> {
        self.check()?;
        self.inner.save_policy(model)
    }

    fn add_policy(&mut self, ptype: &str, rule: &[String]) -> Result<bool> {
        self.check()?;
        self.inner.add_policy(ptype, rule)
    }

    fn add_policies(&mut self, ptype: &str, rules: &[Vec<String>]) -> Result<bool> {
        self.check()?;
        self.inner.add_policies(ptype, rules)
    }

    fn remove_policy(&mut self, ptype: &str, rule: &[String]) -> Result<bool> {
        self.check()?;
        self.inner.remove_policy(ptype, rule)
    }

    fn remove_policies(&mut self, ptype: &str, rules: &[Vec<String>]) -> Result<bool> {
        self.check()?;
        self.inner.remove_policies(ptype, rules)
    }

    fn remove_filtered_policy(&mut self, ptype: &str, field_index: usize, values: &[String]) -> Result<bool> {
        self.check()?;
        self.inner.remove_filtered_policy(ptype, field_index, values)
    }

    fn clear_policy(&mut self) -> Result<()> {
        self.check()?;
        self.inner.clear_policy()
    }
}

fn setup() -> (Enforcer, Arc<AtomicBool>) {
    let offline = Arc::new(AtomicBool::new(false));
    let adapter = FlakyAdapter {
        inner: MemoryAdapter::with_rules(vec![
            ("p", vec!["alice", "data1", "read"]),
            ("p", vec!["data2_admin", "data2", "write"]),
            ("g", vec!["bob", "data2_admin"]),
        ]),
        offline: Arc::clone(&offline),
    };
    let model = Model::from_text(RBAC_MODEL).unwrap();
    let enforcer = Enforcer::builder(model)
        .adapter(adapter)
        .cache(64, None)
        .build()
        .unwrap();
    (enforcer, offline)
}

fn snapshot(e: &Enforcer) -> (Vec<Vec<String>>, Vec<Vec<String>>) {
    (e.get_policy().unwrap(), e.get_grouping_policy().unwrap())
}

fn assert_store_error<T: std::fmt::Debug>(result: Result<T>) {
    match result {
        Err(Error::StoreUnavailable { context, .. }) => assert_eq!(context, "flaky store"),
        other => panic!("expected StoreUnavailable, got {:?}", other),
    }
}

#[test]
fn test_failed_mutations_change_nothing() {
    let (e, offline) = setup();
    let before = snapshot(&e);
    let events = e.subscribe();

    offline.store(true, Ordering::SeqCst);

    assert_store_error(e.add_policy(&["carol", "data3", "read"]));
    assert_store_error(e.add_policies(vec![vec!["x", "y", "z"], vec!["u", "v", "w"]]));
    assert_store_error(e.remove_policy(&["alice", "data1", "read"]));
    assert_store_error(e.remove_policies(vec![vec!["alice", "data1", "read"]]));
    assert_store_error(e.remove_filtered_policy(0, &["alice"]));
    assert_store_error(e.add_role_for_user("carol", "data2_admin", None));
    assert_store_error(e.delete_role_for_user("bob", "data2_admin", None));
    assert_store_error(e.clear_policy());

    assert_eq!(snapshot(&e), before);
    assert!(e.enforce(&["alice", "data1", "read"]).unwrap());
    assert!(e.enforce(&["bob", "data2", "write"]).unwrap());
    assert!(!e.enforce(&["carol", "data2", "write"]).unwrap());
    assert!(events.try_recv().is_err());
}

#[test]
fn test_no_op_mutations_skip_the_store() {
    let (e, offline) = setup();
    offline.store(true, Ordering::SeqCst);

    assert!(!e.add_policy(&["alice", "data1", "read"]).unwrap());
    assert!(!e.remove_policy(&["nobody", "data1", "read"]).unwrap());
    assert!(!e.remove_filtered_policy(0, &["nobody"]).unwrap());
}

#[test]
fn test_failed_load_keeps_previous_rules() {
    let (e, offline) = setup();
    let before = snapshot(&e);

    offline.store(true, Ordering::SeqCst);
    assert_store_error(e.load_policy());

    assert_eq!(e.state(), tollgate::EnforcerState::Loaded);
    assert_eq!(snapshot(&e), before);
    assert!(e.enforce(&["bob", "data2", "write"]).unwrap());
}

#[test]
fn test_failed_save_reports_error() {
    let (e, offline) = setup();
    offline.store(true, Ordering::SeqCst);
    assert_store_error(e.save_policy());

    offline.store(false, Ordering::SeqCst);
    e.save_policy().unwrap();
}

#[test]
fn test_recovery_after_outage() {
    let (e, offline) = setup();

    offline.store(true, Ordering::SeqCst);
    assert_store_error(e.add_policy(&["carol", "data3", "read"]));

    offline.store(false, Ordering::SeqCst);
    assert!(e.add_policy(&["carol", "data3", "read"]).unwrap());
    e.load_policy().unwrap();
    assert!(e.enforce(&["carol", "data3", "read"]).unwrap());
}

#[test]
fn test_failed_build_load() {
    let offline = Arc::new(AtomicBool::new(true));
    let adapter = FlakyAdapter {
        inner: MemoryAdapter::new(),
        offline,
    };
    let model = Model::from_text(RBAC_MODEL).unwrap();
    assert_store_error(Enforcer::new(model, adapter).map(|_| ()));
}
