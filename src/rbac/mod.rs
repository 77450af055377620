//! Role inheritance
//!
//! Each role key of the model (`g`, `g2`, ...) gets its own [`RoleManager`].
//! Links come from the rules of that key: `[child, parent]` or
//! `[child, parent, domain]`.

mod default_role_manager;

pub use default_role_manager::DefaultRoleManager;

use crate::error::{Error, Result};
use crate::matcher::RoleLookup;
use crate::model::Model;
use std::collections::BTreeMap;
use tracing::debug;

/// Role-inheritance graph for one role key
///
/// `has_link(x, x)` is true for every `x`; cycles must not loop forever.
pub trait RoleManager: Send + Sync {
    /// `name1` inherits from `name2`
    fn add_link(&mut self, name1: &str, name2: &str, domain: Option<&str>);

    /// Returns false if the link did not exist
    fn delete_link(&mut self, name1: &str, name2: &str, domain: Option<&str>) -> bool;

    /// `name2` is reachable from `name1` through zero or more links
    fn has_link(&self, name1: &str, name2: &str, domain: Option<&str>) -> bool;

    /// Roles `name` inherits from directly, sorted
    fn get_roles(&self, name: &str, domain: Option<&str>) -> Vec<String>;

    /// Subjects inheriting directly from `name`, sorted
    fn get_users(&self, name: &str, domain: Option<&str>) -> Vec<String>;

    /// Every role reachable from `name`, nearest first
    fn get_implicit_roles(&self, name: &str, domain: Option<&str>) -> Vec<String>;

    fn clear(&mut self);
}

/// Split a role rule into (child, parent, domain)
pub(crate) fn link_parts(rule: &[String]) -> Option<(&str, &str, Option<&str>)> {
    match rule {
        [child, parent] => Some((child.as_str(), parent.as_str(), None)),
        [child, parent, domain] => Some((child.as_str(), parent.as_str(), Some(domain.as_str()))),
        _ => None,
    }
}

/// Role managers keyed by role ptype
pub(crate) struct RoleRegistry {
    managers: BTreeMap<String, Box<dyn RoleManager>>,
}

impl RoleRegistry {
    /// One manager per role key in `model`; `custom` replaces the default
    /// manager for its key
    ///
    /// A custom manager for a key the model does not define fails with
    /// [`Error::Config`].
    pub(crate) fn new(
        model: &Model,
        mut custom: BTreeMap<String, Box<dyn RoleManager>>,
    ) -> Result<Self> {
        if let Some(ptype) = custom.keys().find(|k| !model.roles().contains_key(k.as_str())) {
            return Err(Error::Config(format!(
                "role manager registered for '{}', which the model does not define",
                ptype
            )));
        }

        let managers = model
            .roles()
            .keys()
            .map(|ptype| {
                let manager = custom
                    .remove(ptype)
                    .unwrap_or_else(|| Box::new(DefaultRoleManager::new()) as Box<dyn RoleManager>);
                (ptype.clone(), manager)
            })
            .collect();
        Ok(RoleRegistry { managers })
    }

    pub(crate) fn get(&self, ptype: &str) -> Option<&dyn RoleManager> {
        self.managers.get(ptype).map(|m| m.as_ref())
    }

    /// Clear every graph and rebuild it from the model's role rules
    pub(crate) fn rebuild(&mut self, model: &Model) {
        for (ptype, manager) in self.managers.iter_mut() {
            manager.clear();
            let rules = model.policy(ptype);
            for (child, parent, domain) in rules.iter().filter_map(|r| link_parts(r)) {
                manager.add_link(child, parent, domain);
            }
            debug!(ptype = %ptype, links = rules.len(), "Rebuilt role graph");
        }
    }

    pub(crate) fn add_links(&mut self, ptype: &str, rules: &[Vec<String>]) {
        if let Some(manager) = self.managers.get_mut(ptype) {
            for (child, parent, domain) in rules.iter().filter_map(|r| link_parts(r)) {
                manager.add_link(child, parent, domain);
            }
        }
    }

    pub(crate) fn delete_links(&mut self, ptype: &str, rules: &[Vec<String>]) {
        if let Some(manager) = self.managers.get_mut(ptype) {
            for (child, parent, domain) in rules.iter().filter_map(|r| link_parts(r)) {
                manager.delete_link(child, parent, domain);
            }
        }
    }
}

impl RoleLookup for RoleRegistry {
    fn has_link(
        &self,
        ptype: &str,
        name1: &str,
        name2: &str,
        domain: Option<&str>,
    ) -> Result<bool> {
        self.managers
            .get(ptype)
            .map(|manager| manager.has_link(name1, name2, domain))
            .ok_or_else(|| Error::MatcherEval(format!("no role manager for '{}'", ptype)))
    }
}

impl std::fmt::Debug for RoleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleRegistry")
            .field("ptypes", &self.managers.keys().collect::<Vec<_>>())
            .finish()
    }
}
