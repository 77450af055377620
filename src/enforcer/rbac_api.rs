//! Role and permission helpers over the `p` and `g` rules
//!
//! Domain arguments select the third field of a `g = _, _, _` link. Passing a
//! domain to a model whose `g` has two fields fails with `InvalidPolicy`.

use super::{owned, Enforcer, State};
use crate::error::{Error, Result};
use crate::rbac::RoleManager;
use parking_lot::RwLockReadGuard;

fn link(user: &str, role: &str, domain: Option<&str>) -> Vec<String> {
    let mut rule = vec![user.to_string(), role.to_string()];
    if let Some(domain) = domain {
        rule.push(domain.to_string());
    }
    rule
}

fn role_manager<'a>(state: &'a State) -> Result<&'a dyn RoleManager> {
    state
        .roles
        .get("g")
        .ok_or_else(|| Error::InvalidPolicy("model defines no role key 'g'".to_string()))
}

/// Position of the `p` field called `name`, or `fallback` when the model
/// uses other field names
fn field_index(state: &State, name: &str, fallback: usize) -> usize {
    state
        .model
        .policy_fields("p")
        .and_then(|fields| fields.iter().position(|f| f == name))
        .unwrap_or(fallback)
}

impl Enforcer {
    fn read_loaded(&self) -> Result<RwLockReadGuard<'_, State>> {
        let state = self.state.read();
        state.require_loaded()?;
        Ok(state)
    }

    /// Make `user` a member of `role`; `Ok(false)` if it already is
    pub fn add_role_for_user(&self, user: &str, role: &str, domain: Option<&str>) -> Result<bool> {
        self.add_rules("g", vec![link(user, role, domain)], false)
    }

    pub fn delete_role_for_user(&self, user: &str, role: &str, domain: Option<&str>) -> Result<bool> {
        self.remove_rules("g", vec![link(user, role, domain)], false)
    }

    /// Remove every direct role of `user` (within `domain` if given)
    pub fn delete_roles_for_user(&self, user: &str, domain: Option<&str>) -> Result<bool> {
        self.remove_filtered_rules("g", 0, link(user, "", domain))
    }

    /// Direct roles of `user`, sorted
    pub fn get_roles_for_user(&self, user: &str, domain: Option<&str>) -> Result<Vec<String>> {
        let state = self.read_loaded()?;
        Ok(role_manager(&state)?.get_roles(user, domain))
    }

    /// Direct members of `role`, sorted
    pub fn get_users_for_role(&self, role: &str, domain: Option<&str>) -> Result<Vec<String>> {
        let state = self.read_loaded()?;
        Ok(role_manager(&state)?.get_users(role, domain))
    }

    /// True if `user` holds `role` directly
    pub fn has_role_for_user(&self, user: &str, role: &str, domain: Option<&str>) -> Result<bool> {
        Ok(self
            .get_roles_for_user(user, domain)?
            .iter()
            .any(|r| r == role))
    }

    /// Every role `user` holds directly or through inheritance, nearest first
    pub fn get_implicit_roles_for_user(&self, user: &str, domain: Option<&str>) -> Result<Vec<String>> {
        let state = self.read_loaded()?;
        Ok(role_manager(&state)?.get_implicit_roles(user, domain))
    }

    /// Permissions of `user` and of every role it inherits
    pub fn get_implicit_permissions_for_user(
        &self,
        user: &str,
        domain: Option<&str>,
    ) -> Result<Vec<Vec<String>>> {
        let state = self.read_loaded()?;
        let mut subjects = vec![user.to_string()];
        subjects.extend(role_manager(&state)?.get_implicit_roles(user, domain));

        let mut permissions = Vec::new();
        for subject in subjects {
            let mut filter = vec![subject];
            if let Some(domain) = domain {
                filter.push(domain.to_string());
            }
            permissions.extend(state.model.filtered_policy("p", 0, &filter)?);
        }
        Ok(permissions)
    }

    /// Remove `user` from every role and drop its permissions
    pub fn delete_user(&self, user: &str) -> Result<bool> {
        let mut changed = false;
        if self.state.read().model.kind("g").is_some() {
            changed |= self.remove_filtered_rules("g", 0, vec![user.to_string()])?;
        }
        changed |= self.remove_filtered_rules("p", 0, vec![user.to_string()])?;
        Ok(changed)
    }

    /// Remove every membership of `role` and drop its permissions
    pub fn delete_role(&self, role: &str) -> Result<bool> {
        let mut changed = false;
        if self.state.read().model.kind("g").is_some() {
            changed |= self.remove_filtered_rules("g", 1, vec![role.to_string()])?;
        }
        changed |= self.remove_filtered_rules("p", 0, vec![role.to_string()])?;
        Ok(changed)
    }

    /// Grant `user` a permission: the rule is `user` followed by `permission`
    pub fn add_permission_for_user<S: AsRef<str>>(&self, user: &str, permission: &[S]) -> Result<bool> {
        self.add_rules("p", vec![permission_rule(user, permission)], false)
    }

    pub fn delete_permission_for_user<S: AsRef<str>>(&self, user: &str, permission: &[S]) -> Result<bool> {
        self.remove_rules("p", vec![permission_rule(user, permission)], false)
    }

    pub fn delete_permissions_for_user(&self, user: &str) -> Result<bool> {
        self.remove_filtered_rules("p", 0, vec![user.to_string()])
    }

    /// Direct permissions of `user` (with `domain` as the second field if given)
    pub fn get_permissions_for_user(&self, user: &str, domain: Option<&str>) -> Result<Vec<Vec<String>>> {
        let mut filter = vec![user];
        filter.extend(domain);
        self.get_filtered_policy(0, &filter)
    }

    pub fn has_permission_for_user<S: AsRef<str>>(&self, user: &str, permission: &[S]) -> Result<bool> {
        self.has_policy(&permission_rule(user, permission))
    }

    /// Distinct subjects of the `p` rules
    pub fn get_all_subjects(&self) -> Result<Vec<String>> {
        let state = self.read_loaded()?;
        Ok(state.model.values_for_field("p", field_index(&state, "sub", 0)))
    }

    pub fn get_all_objects(&self) -> Result<Vec<String>> {
        let state = self.read_loaded()?;
        Ok(state.model.values_for_field("p", field_index(&state, "obj", 1)))
    }

    pub fn get_all_actions(&self) -> Result<Vec<String>> {
        let state = self.read_loaded()?;
        Ok(state.model.values_for_field("p", field_index(&state, "act", 2)))
    }

    /// Distinct parent roles of the `g` links
    pub fn get_all_roles(&self) -> Result<Vec<String>> {
        let state = self.read_loaded()?;
        Ok(state.model.values_for_field("g", 1))
    }
}

fn permission_rule<S: AsRef<str>>(user: &str, permission: &[S]) -> Vec<String> {
    let mut rule = vec![user.to_string()];
    rule.extend(owned(permission));
    rule
}
