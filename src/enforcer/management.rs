//! Policy management: add, remove and query rules by ptype

use super::{owned, owned_rules, Enforcer, State};
use crate::error::Result;
use crate::events::PolicyEvent;
use crate::model::PolicyKind;
use parking_lot::RwLockWriteGuard;
use tracing::{debug, warn};

impl Enforcer {
    fn write_loaded(&self) -> Result<RwLockWriteGuard<'_, State>> {
        let state = self.state.write();
        state.require_loaded()?;
        Ok(state)
    }

    pub(crate) fn add_rules(&self, ptype: &str, rules: Vec<Vec<String>>, batch: bool) -> Result<bool> {
        let mut state = self.write_loaded()?;
        for rule in &rules {
            state.model.validate_rule(ptype, rule)?;
        }
        if rules.is_empty() || !state.model.can_add_all(ptype, &rules) {
            debug!(ptype, rules = rules.len(), "Rules already present, nothing added");
            return Ok(false);
        }

        if state.auto_save {
            let mut adapter = self.adapter.lock();
            let changed = if batch {
                adapter.add_policies(ptype, &rules)?
            } else {
                adapter.add_policy(ptype, &rules[0])?
            };
            if !changed {
                warn!(ptype, "Store already held the added rules");
            }
        }

        let state = &mut *state;
        state.model.add_policies(ptype, rules.clone())?;
        if state.model.kind(ptype) == Some(PolicyKind::Role) {
            state.roles.add_links(ptype, &rules);
        }
        self.clear_cache();

        debug!(ptype, rules = rules.len(), "Added rules");
        self.events.publish(PolicyEvent::PolicyAdded {
            ptype: ptype.to_string(),
            rules,
        });
        Ok(true)
    }

    pub(crate) fn remove_rules(&self, ptype: &str, rules: Vec<Vec<String>>, batch: bool) -> Result<bool> {
        let mut state = self.write_loaded()?;
        for rule in &rules {
            state.model.validate_rule(ptype, rule)?;
        }
        if rules.is_empty() || !state.model.can_remove_all(ptype, &rules) {
            debug!(ptype, rules = rules.len(), "Rules not present, nothing removed");
            return Ok(false);
        }

        if state.auto_save {
            let mut adapter = self.adapter.lock();
            let changed = if batch {
                adapter.remove_policies(ptype, &rules)?
            } else {
                adapter.remove_policy(ptype, &rules[0])?
            };
            if !changed {
                warn!(ptype, "Store did not hold the removed rules");
            }
        }

        let state = &mut *state;
        state.model.remove_policies(ptype, &rules)?;
        if state.model.kind(ptype) == Some(PolicyKind::Role) {
            state.roles.delete_links(ptype, &rules);
        }
        self.clear_cache();

        debug!(ptype, rules = rules.len(), "Removed rules");
        self.events.publish(PolicyEvent::PolicyRemoved {
            ptype: ptype.to_string(),
            rules,
        });
        Ok(true)
    }

    pub(crate) fn remove_filtered_rules(
        &self,
        ptype: &str,
        field_index: usize,
        values: Vec<String>,
    ) -> Result<bool> {
        let mut state = self.write_loaded()?;
        let matching = state.model.filtered_policy(ptype, field_index, &values)?;
        if matching.is_empty() {
            debug!(ptype, field_index, "No rules match filter");
            return Ok(false);
        }

        if state.auto_save && !self.adapter.lock().remove_filtered_policy(ptype, field_index, &values)? {
            warn!(ptype, field_index, "Store held no rows matching the filter");
        }

        let state = &mut *state;
        let removed = state.model.remove_filtered_policy(ptype, field_index, &values)?;
        if state.model.kind(ptype) == Some(PolicyKind::Role) {
            state.roles.rebuild(&state.model);
        }
        self.clear_cache();

        debug!(ptype, field_index, rules = removed.len(), "Removed filtered rules");
        self.events.publish(PolicyEvent::FilteredPolicyRemoved {
            ptype: ptype.to_string(),
            field_index,
            field_values: values,
            rules: removed,
        });
        Ok(true)
    }

    fn read_rules(&self, ptype: &str) -> Result<Vec<Vec<String>>> {
        let state = self.state.read();
        state.require_loaded()?;
        Ok(state.model.policy(ptype).to_vec())
    }

    fn read_filtered(&self, ptype: &str, field_index: usize, values: &[String]) -> Result<Vec<Vec<String>>> {
        let state = self.state.read();
        state.require_loaded()?;
        state.model.filtered_policy(ptype, field_index, values)
    }

    fn contains_rule(&self, ptype: &str, rule: &[String]) -> Result<bool> {
        let state = self.state.read();
        state.require_loaded()?;
        Ok(state.model.has_policy(ptype, rule))
    }

    /// Add a `p` rule; `Ok(false)` if it is already present
    pub fn add_policy<S: AsRef<str>>(&self, rule: &[S]) -> Result<bool> {
        self.add_named_policy("p", rule)
    }

    /// Add `p` rules, all or none; `Ok(false)` if any is already present
    pub fn add_policies<I, R, S>(&self, rules: I) -> Result<bool>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.add_named_policies("p", rules)
    }

    pub fn remove_policy<S: AsRef<str>>(&self, rule: &[S]) -> Result<bool> {
        self.remove_named_policy("p", rule)
    }

    /// Remove `p` rules, all or none; `Ok(false)` if any is missing
    pub fn remove_policies<I, R, S>(&self, rules: I) -> Result<bool>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.remove_named_policies("p", rules)
    }

    /// Remove every `p` rule whose fields from `field_index` on equal
    /// `values`; an empty value matches anything
    pub fn remove_filtered_policy<S: AsRef<str>>(&self, field_index: usize, values: &[S]) -> Result<bool> {
        self.remove_filtered_named_policy("p", field_index, values)
    }

    pub fn add_named_policy<S: AsRef<str>>(&self, ptype: &str, rule: &[S]) -> Result<bool> {
        self.add_rules(ptype, vec![owned(rule)], false)
    }

    pub fn add_named_policies<I, R, S>(&self, ptype: &str, rules: I) -> Result<bool>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.add_rules(ptype, owned_rules(rules), true)
    }

    pub fn remove_named_policy<S: AsRef<str>>(&self, ptype: &str, rule: &[S]) -> Result<bool> {
        self.remove_rules(ptype, vec![owned(rule)], false)
    }

    pub fn remove_named_policies<I, R, S>(&self, ptype: &str, rules: I) -> Result<bool>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.remove_rules(ptype, owned_rules(rules), true)
    }

    pub fn remove_filtered_named_policy<S: AsRef<str>>(
        &self,
        ptype: &str,
        field_index: usize,
        values: &[S],
    ) -> Result<bool> {
        self.remove_filtered_rules(ptype, field_index, owned(values))
    }

    /// Add a `g` link: `rule` is `[child, parent]` or `[child, parent, domain]`
    pub fn add_grouping_policy<S: AsRef<str>>(&self, rule: &[S]) -> Result<bool> {
        self.add_named_policy("g", rule)
    }

    pub fn add_grouping_policies<I, R, S>(&self, rules: I) -> Result<bool>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.add_named_policies("g", rules)
    }

    pub fn remove_grouping_policy<S: AsRef<str>>(&self, rule: &[S]) -> Result<bool> {
        self.remove_named_policy("g", rule)
    }

    pub fn remove_grouping_policies<I, R, S>(&self, rules: I) -> Result<bool>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.remove_named_policies("g", rules)
    }

    pub fn remove_filtered_grouping_policy<S: AsRef<str>>(
        &self,
        field_index: usize,
        values: &[S],
    ) -> Result<bool> {
        self.remove_filtered_named_policy("g", field_index, values)
    }

    /// Every `p` rule, in insertion order
    pub fn get_policy(&self) -> Result<Vec<Vec<String>>> {
        self.read_rules("p")
    }

    pub fn get_filtered_policy<S: AsRef<str>>(&self, field_index: usize, values: &[S]) -> Result<Vec<Vec<String>>> {
        self.read_filtered("p", field_index, &owned(values))
    }

    /// Every rule of `ptype`; empty for a ptype the model does not define
    pub fn get_named_policy(&self, ptype: &str) -> Result<Vec<Vec<String>>> {
        self.read_rules(ptype)
    }

    pub fn get_filtered_named_policy<S: AsRef<str>>(
        &self,
        ptype: &str,
        field_index: usize,
        values: &[S],
    ) -> Result<Vec<Vec<String>>> {
        self.read_filtered(ptype, field_index, &owned(values))
    }

    pub fn get_grouping_policy(&self) -> Result<Vec<Vec<String>>> {
        self.read_rules("g")
    }

    pub fn get_filtered_grouping_policy<S: AsRef<str>>(
        &self,
        field_index: usize,
        values: &[S],
    ) -> Result<Vec<Vec<String>>> {
        self.read_filtered("g", field_index, &owned(values))
    }

    pub fn has_policy<S: AsRef<str>>(&self, rule: &[S]) -> Result<bool> {
        self.contains_rule("p", &owned(rule))
    }

    pub fn has_named_policy<S: AsRef<str>>(&self, ptype: &str, rule: &[S]) -> Result<bool> {
        self.contains_rule(ptype, &owned(rule))
    }

    pub fn has_grouping_policy<S: AsRef<str>>(&self, rule: &[S]) -> Result<bool> {
        self.contains_rule("g", &owned(rule))
    }
}
