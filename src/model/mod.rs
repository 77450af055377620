//! Access-control model
//!
//! A [`Model`] holds the definitions parsed from a Casbin model file together
//! with the policy and role rules loaded into it. Rules are kept per ptype in
//! insertion order and are unique within their ptype.

mod parser;

use crate::effect::EffectKind;
use crate::error::{Error, Result};
use crate::matcher::ast::Expr;
use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;
use std::path::Path;
use std::str::FromStr;

/// Whether a ptype holds permissions (`p`, `p2`) or role links (`g`, `g2`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    Policy,
    Role,
}

/// Rules of one ptype
#[derive(Debug, Clone)]
pub struct PolicySet {
    kind: PolicyKind,
    fields: Vec<String>,
    rules: Vec<Vec<String>>,
    index: HashSet<Vec<String>>,
}

impl PolicySet {
    fn new(kind: PolicyKind, fields: Vec<String>) -> Self {
        PolicySet {
            kind,
            fields,
            rules: Vec::new(),
            index: HashSet::new(),
        }
    }

    pub fn kind(&self) -> PolicyKind {
        self.kind
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn rules(&self) -> &[Vec<String>] {
        &self.rules
    }

    fn insert(&mut self, rule: Vec<String>) -> bool {
        if self.index.contains(&rule) {
            return false;
        }
        self.index.insert(rule.clone());
        self.rules.push(rule);
        true
    }

    fn remove(&mut self, rule: &[String]) -> bool {
        if !self.index.remove(rule) {
            return false;
        }
        self.rules.retain(|r| r.as_slice() != rule);
        true
    }

    fn clear(&mut self) {
        self.rules.clear();
        self.index.clear();
    }
}

/// A parsed matcher: its source text and expression tree
#[derive(Debug, Clone)]
pub struct MatcherDef {
    source: String,
    expr: Expr,
}

impl MatcherDef {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }
}

/// Request, policy and effect keys used together with a matcher key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pairing {
    pub request: String,
    pub policy: String,
    pub effect: String,
    pub matcher: String,
}

/// True if `rule` matches `values` starting at `field_index`; empty values
/// match anything
pub fn rule_matches_filter(rule: &[String], field_index: usize, values: &[String]) -> bool {
    values.iter().enumerate().all(|(offset, value)| {
        value.is_empty()
            || rule
                .get(field_index + offset)
                .map(|field| field == value)
                .unwrap_or(false)
    })
}

/// Parsed model definition plus its loaded rules
#[derive(Debug, Clone)]
pub struct Model {
    requests: BTreeMap<String, Vec<String>>,
    rules: BTreeMap<String, PolicySet>,
    roles: BTreeMap<String, usize>,
    effects: BTreeMap<String, (EffectKind, String)>,
    matchers: BTreeMap<String, MatcherDef>,
}

impl FromStr for Model {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        parser::parse_model(text)
    }
}

impl Model {
    fn empty() -> Self {
        Model {
            requests: BTreeMap::new(),
            rules: BTreeMap::new(),
            roles: BTreeMap::new(),
            effects: BTreeMap::new(),
            matchers: BTreeMap::new(),
        }
    }

    /// Parse model text
    ///
    /// # Examples
    ///
    /// ```
    /// use tollgate::Model;
    ///
    /// let model = Model::from_text(
    ///     "[request_definition]\nr = sub, obj, act\n\
    ///      [policy_definition]\np = sub, obj, act\n\
    ///      [policy_effect]\ne = some(where (p.eft == allow))\n\
    ///      [matchers]\nm = r.sub == p.sub && r.obj == p.obj && r.act == p.act\n",
    /// )
    /// .unwrap();
    /// assert_eq!(model.arity("p"), Some(3));
    /// ```
    pub fn from_text(text: &str) -> Result<Self> {
        parser::parse_model(text)
    }

    /// Read and parse a model file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        parser::parse_model(&text)
    }

    /// Render the definitions (not the rules) in canonical model syntax
    pub fn to_text(&self) -> String {
        let mut out = String::new();

        out.push_str("[request_definition]\n");
        for (key, fields) in &self.requests {
            let _ = writeln!(out, "{} = {}", key, fields.join(", "));
        }

        out.push_str("\n[policy_definition]\n");
        for (key, set) in self.rules.iter().filter(|(_, s)| s.kind == PolicyKind::Policy) {
            let _ = writeln!(out, "{} = {}", key, set.fields.join(", "));
        }

        if !self.roles.is_empty() {
            out.push_str("\n[role_definition]\n");
            for (key, arity) in &self.roles {
                let _ = writeln!(out, "{} = {}", key, vec!["_"; *arity].join(", "));
            }
        }

        out.push_str("\n[policy_effect]\n");
        for (key, (_, source)) in &self.effects {
            let _ = writeln!(out, "{} = {}", key, source);
        }

        out.push_str("\n[matchers]\n");
        for (key, matcher) in &self.matchers {
            let _ = writeln!(out, "{} = {}", key, matcher.source);
        }

        out
    }

    /// Keys used with matcher `m_key`: `mN` pairs with `rN`/`pN`/`eN` when
    /// those are defined, otherwise with `r`/`p`/`e`
    pub fn pairing(&self, m_key: &str) -> Pairing {
        let suffix = m_key.strip_prefix('m').unwrap_or("");
        let pick = |letter: &str, defined: bool| {
            if defined && !suffix.is_empty() {
                format!("{}{}", letter, suffix)
            } else {
                letter.to_string()
            }
        };

        Pairing {
            request: pick("r", self.requests.contains_key(&format!("r{}", suffix))),
            policy: pick("p", self.rules.contains_key(&format!("p{}", suffix))),
            effect: pick("e", self.effects.contains_key(&format!("e{}", suffix))),
            matcher: m_key.to_string(),
        }
    }

    pub fn request_fields(&self, key: &str) -> Option<&[String]> {
        self.requests.get(key).map(Vec::as_slice)
    }

    /// Field names of a policy ptype; `None` for role keys and unknown keys
    pub fn policy_fields(&self, ptype: &str) -> Option<&[String]> {
        self.rules
            .get(ptype)
            .filter(|s| s.kind == PolicyKind::Policy)
            .map(|s| s.fields.as_slice())
    }

    /// Number of fields in a rule of `ptype`
    pub fn arity(&self, ptype: &str) -> Option<usize> {
        self.rules.get(ptype).map(|s| s.fields.len())
    }

    /// Role key -> arity (2, or 3 with domain)
    pub fn roles(&self) -> &BTreeMap<String, usize> {
        &self.roles
    }

    pub fn effect(&self, key: &str) -> Option<EffectKind> {
        self.effects.get(key).map(|(kind, _)| *kind)
    }

    pub fn matcher(&self, key: &str) -> Option<&MatcherDef> {
        self.matchers.get(key)
    }

    pub fn matcher_keys(&self) -> impl Iterator<Item = &str> {
        self.matchers.keys().map(String::as_str)
    }

    /// Position of the `eft` field in a policy ptype
    pub fn eft_index(&self, ptype: &str) -> Option<usize> {
        self.policy_fields(ptype)?.iter().position(|f| f == "eft")
    }

    /// All ptypes (policy and role), sorted
    pub fn ptypes(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    pub fn kind(&self, ptype: &str) -> Option<PolicyKind> {
        self.rules.get(ptype).map(|s| s.kind)
    }

    /// Rules of `ptype` in insertion order; empty for unknown ptypes
    pub fn policy(&self, ptype: &str) -> &[Vec<String>] {
        self.rules.get(ptype).map(|s| s.rules()).unwrap_or(&[])
    }

    pub fn has_policy(&self, ptype: &str, rule: &[String]) -> bool {
        self.rules
            .get(ptype)
            .map(|s| s.index.contains(rule))
            .unwrap_or(false)
    }

    /// Every rule with its ptype, grouped by ptype
    pub fn rules(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.rules.iter().flat_map(|(ptype, set)| {
            set.rules
                .iter()
                .map(move |rule| (ptype.as_str(), rule.as_slice()))
        })
    }

    pub fn rule_count(&self) -> usize {
        self.rules.values().map(|s| s.rules.len()).sum()
    }

    /// Check that `ptype` is defined and `rule` has its arity
    pub fn validate_rule(&self, ptype: &str, rule: &[String]) -> Result<()> {
        let set = self
            .rules
            .get(ptype)
            .ok_or_else(|| Error::InvalidPolicy(format!("ptype '{}' is not defined by the model", ptype)))?;

        if rule.len() != set.fields.len() {
            return Err(Error::InvalidPolicy(format!(
                "{} rule {:?} has {} fields, expected {}",
                ptype,
                rule,
                rule.len(),
                set.fields.len()
            )));
        }

        Ok(())
    }

    /// Check a filter against the arity of `ptype`
    pub fn validate_filter(&self, ptype: &str, field_index: usize, values: &[String]) -> Result<()> {
        let arity = self
            .arity(ptype)
            .ok_or_else(|| Error::InvalidPolicy(format!("ptype '{}' is not defined by the model", ptype)))?;

        if field_index >= arity || field_index + values.len() > arity {
            return Err(Error::InvalidPolicy(format!(
                "filter at field {} with {} values is out of range for {} (arity {})",
                field_index,
                values.len(),
                ptype,
                arity
            )));
        }

        Ok(())
    }

    /// Add one rule; `Ok(false)` if it is already present
    pub fn add_policy(&mut self, ptype: &str, rule: Vec<String>) -> Result<bool> {
        self.validate_rule(ptype, &rule)?;
        Ok(self.set_mut(ptype)?.insert(rule))
    }

    /// Add a batch; `Ok(false)` and no change if any rule is already present
    /// or repeated within the batch
    pub fn add_policies(&mut self, ptype: &str, rules: Vec<Vec<String>>) -> Result<bool> {
        for rule in &rules {
            self.validate_rule(ptype, rule)?;
        }
        if !self.can_add_all(ptype, &rules) {
            return Ok(false);
        }

        let set = self.set_mut(ptype)?;
        for rule in rules {
            set.insert(rule);
        }
        Ok(true)
    }

    /// True if none of `rules` is present and the batch has no repeats
    pub fn can_add_all(&self, ptype: &str, rules: &[Vec<String>]) -> bool {
        let mut batch = HashSet::new();
        rules
            .iter()
            .all(|rule| !self.has_policy(ptype, rule) && batch.insert(rule))
    }

    /// True if every rule of `rules` is present and the batch has no repeats
    pub fn can_remove_all(&self, ptype: &str, rules: &[Vec<String>]) -> bool {
        let mut batch = HashSet::new();
        rules
            .iter()
            .all(|rule| self.has_policy(ptype, rule) && batch.insert(rule))
    }

    pub fn remove_policy(&mut self, ptype: &str, rule: &[String]) -> Result<bool> {
        self.validate_rule(ptype, rule)?;
        Ok(self.set_mut(ptype)?.remove(rule))
    }

    /// Remove a batch; `Ok(false)` and no change if any rule is missing
    pub fn remove_policies(&mut self, ptype: &str, rules: &[Vec<String>]) -> Result<bool> {
        for rule in rules {
            self.validate_rule(ptype, rule)?;
        }
        if !self.can_remove_all(ptype, rules) {
            return Ok(false);
        }

        let set = self.set_mut(ptype)?;
        for rule in rules {
            set.remove(rule);
        }
        Ok(true)
    }

    /// Rules of `ptype` matching the filter, in insertion order
    pub fn filtered_policy(
        &self,
        ptype: &str,
        field_index: usize,
        values: &[String],
    ) -> Result<Vec<Vec<String>>> {
        self.validate_filter(ptype, field_index, values)?;
        Ok(self
            .policy(ptype)
            .iter()
            .filter(|rule| rule_matches_filter(rule, field_index, values))
            .cloned()
            .collect())
    }

    /// Remove and return every rule of `ptype` matching the filter
    pub fn remove_filtered_policy(
        &mut self,
        ptype: &str,
        field_index: usize,
        values: &[String],
    ) -> Result<Vec<Vec<String>>> {
        let removed = self.filtered_policy(ptype, field_index, values)?;
        let set = self.set_mut(ptype)?;
        for rule in &removed {
            set.remove(rule);
        }
        Ok(removed)
    }

    /// Drop every rule; definitions are kept
    pub fn clear_policy(&mut self) {
        for set in self.rules.values_mut() {
            set.clear();
        }
    }

    /// Distinct values of one field across the rules of `ptype`, in first-seen order
    pub fn values_for_field(&self, ptype: &str, field_index: usize) -> Vec<String> {
        let mut seen = HashSet::new();
        self.policy(ptype)
            .iter()
            .filter_map(|rule| rule.get(field_index))
            .filter(|value| seen.insert(value.as_str()))
            .cloned()
            .collect()
    }

    fn set_mut(&mut self, ptype: &str) -> Result<&mut PolicySet> {
        self.rules
            .get_mut(ptype)
            .ok_or_else(|| Error::InvalidPolicy(format!("ptype '{}' is not defined by the model", ptype)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RBAC_MODEL: &str = r#"
[request_definition]
r = sub, obj, act

[policy_definition]
p = sub, obj, act

[role_definition]
g = _, _

[policy_effect]
e = some(where (p.eft == allow))

# role-aware matcher
[matchers]
m = g(r.sub, p.sub) && r.obj == p.obj \
    && r.act == p.act
"#;

    fn rule(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|s| s.to_string()).collect()
    }

    fn model_with(matchers: &str) -> String {
        format!(
            "[request_definition]\nr = sub, obj, act\n\n[policy_definition]\np = sub, obj, act\n\n\
             [role_definition]\ng = _, _\n\n[policy_effect]\ne = some(where (p.eft == allow))\n\n\
             [matchers]\n{}\n",
            matchers
        )
    }

    #[test]
    fn test_parse_rbac_model() {
        let model = Model::from_text(RBAC_MODEL).unwrap();

        assert_eq!(model.request_fields("r").unwrap(), rule(&["sub", "obj", "act"]).as_slice());
        assert_eq!(model.arity("p"), Some(3));
        assert_eq!(model.arity("g"), Some(2));
        assert_eq!(model.roles().get("g"), Some(&2));
        assert_eq!(model.effect("e"), Some(EffectKind::AllowOverride));
        assert_eq!(
            model.matcher("m").unwrap().source(),
            "g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act"
        );
        assert_eq!(model.eft_index("p"), None);
    }

    #[test]
    fn test_from_str_trait() {
        let model: Model = RBAC_MODEL.parse().unwrap();
        assert_eq!(model.kind("g"), Some(PolicyKind::Role));
        assert_eq!(model.kind("p"), Some(PolicyKind::Policy));
    }

    #[test]
    fn test_missing_sections() {
        let no_matcher = "[request_definition]\nr = sub\n[policy_definition]\np = sub\n\
                          [policy_effect]\ne = some(where (p.eft == allow))\n";
        assert!(matches!(Model::from_text(no_matcher), Err(Error::ModelSyntax(msg)) if msg.contains("'m'")));

        let no_effect = "[request_definition]\nr = sub\n[policy_definition]\np = sub\n\
                         [matchers]\nm = r.sub == p.sub\n";
        assert!(matches!(Model::from_text(no_effect), Err(Error::ModelSyntax(_))));
    }

    #[test]
    fn test_malformed_syntax() {
        assert!(Model::from_text("r = sub\n").is_err());
        assert!(Model::from_text("[unknown]\nx = 1\n").is_err());
        assert!(Model::from_text("[request_definition\nr = sub\n").is_err());
        assert!(Model::from_text("[request_definition]\nr sub\n").is_err());
        assert!(Model::from_text("[request_definition]\np = sub\n").is_err());
        assert!(Model::from_text("[request_definition]\nr = sub\nr = obj\n").is_err());
    }

    #[test]
    fn test_undefined_references() {
        assert!(Model::from_text(&model_with("m = r.subject == p.sub")).is_err());
        assert!(Model::from_text(&model_with("m = r.sub == p.owner")).is_err());
        assert!(Model::from_text(&model_with("m = r.sub == q.sub")).is_err());
        assert!(Model::from_text(&model_with("m = g2(r.sub, p.sub)")).is_err());
        assert!(Model::from_text(&model_with("m = g(r.sub, p.sub, r.obj)")).is_err());
        assert!(Model::from_text(&model_with("m = r.sub == p.sub &&")).is_err());
    }

    #[test]
    fn test_deeply_nested_matcher_rejected() {
        let matcher = format!("m = {}r.sub == p.sub", "!".repeat(50_000));
        assert!(matches!(Model::from_text(&model_with(&matcher)), Err(Error::ModelSyntax(_))));
    }

    #[test]
    fn test_unsupported_effect() {
        let text = model_with("m = r.sub == p.sub").replace(
            "some(where (p.eft == allow))",
            "priority(p.eft) || deny",
        );
        assert!(matches!(Model::from_text(&text), Err(Error::ModelSyntax(_))));
    }

    #[test]
    fn test_pairing_falls_back_to_base_keys() {
        let text = "[request_definition]\nr = sub, obj, act\nr2 = sub, obj\n\
                    [policy_definition]\np = sub, obj, act\n\
                    [policy_effect]\ne = some(where (p.eft == allow))\n\
                    [matchers]\nm = r.sub == p.sub\nm2 = r2.sub == p.sub && r2.obj == p.obj\n";
        let model = Model::from_text(text).unwrap();

        let pairing = model.pairing("m2");
        assert_eq!(pairing.request, "r2");
        assert_eq!(pairing.policy, "p");
        assert_eq!(pairing.effect, "e");
        assert_eq!(model.pairing("m").request, "r");
    }

    #[test]
    fn test_to_text_reparses() {
        let model = Model::from_text(RBAC_MODEL).unwrap();
        let again = Model::from_text(&model.to_text()).unwrap();
        assert_eq!(model.to_text(), again.to_text());
    }

    #[test]
    fn test_add_and_remove_rules() {
        let mut model = Model::from_text(RBAC_MODEL).unwrap();

        assert!(model.add_policy("p", rule(&["alice", "data1", "read"])).unwrap());
        assert!(!model.add_policy("p", rule(&["alice", "data1", "read"])).unwrap());
        assert!(matches!(
            model.add_policy("p", rule(&["alice", "data1"])),
            Err(Error::InvalidPolicy(_))
        ));
        assert!(matches!(
            model.add_policy("p9", rule(&["alice", "data1", "read"])),
            Err(Error::InvalidPolicy(_))
        ));

        assert!(model.remove_policy("p", &rule(&["alice", "data1", "read"])).unwrap());
        assert!(!model.remove_policy("p", &rule(&["alice", "data1", "read"])).unwrap());
        assert_eq!(model.rule_count(), 0);
    }

    #[test]
    fn test_batches_are_all_or_nothing() {
        let mut model = Model::from_text(RBAC_MODEL).unwrap();
        model.add_policy("p", rule(&["alice", "data1", "read"])).unwrap();

        let batch = vec![rule(&["bob", "data2", "write"]), rule(&["alice", "data1", "read"])];
        assert!(!model.add_policies("p", batch).unwrap());
        assert_eq!(model.policy("p").len(), 1);

        let bad = vec![rule(&["bob", "data2", "write"]), rule(&["bob"])];
        assert!(model.add_policies("p", bad).is_err());
        assert_eq!(model.policy("p").len(), 1);

        let missing = vec![rule(&["alice", "data1", "read"]), rule(&["carol", "x", "y"])];
        assert!(!model.remove_policies("p", &missing).unwrap());
        assert_eq!(model.policy("p").len(), 1);
    }

    #[test]
    fn test_remove_filtered_policy() {
        let mut model = Model::from_text(RBAC_MODEL).unwrap();
        for r in [
            ["alice", "data1", "read"],
            ["bob", "data2", "write"],
            ["data2_admin", "data2", "read"],
            ["data2_admin", "data2", "write"],
        ] {
            model.add_policy("p", rule(&r)).unwrap();
        }

        let removed = model
            .remove_filtered_policy("p", 1, &rule(&["data2", "read"]))
            .unwrap();
        assert_eq!(removed, vec![rule(&["data2_admin", "data2", "read"])]);

        let removed = model.remove_filtered_policy("p", 2, &rule(&["write"])).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(model.policy("p"), &[rule(&["alice", "data1", "read"])]);

        assert!(model.remove_filtered_policy("p", 3, &rule(&["x"])).is_err());
        assert!(model.remove_filtered_policy("p", 2, &rule(&["x", "y"])).is_err());
    }

    #[test]
    fn test_filter_empty_values_are_wildcards() {
        assert!(rule_matches_filter(&rule(&["a", "b", "c"]), 0, &rule(&["", "b"])));
        assert!(!rule_matches_filter(&rule(&["a", "b", "c"]), 0, &rule(&["", "x"])));
        assert!(rule_matches_filter(&rule(&["a", "b", "c"]), 1, &[]));
    }

    #[test]
    fn test_values_for_field() {
        let mut model = Model::from_text(RBAC_MODEL).unwrap();
        model.add_policy("p", rule(&["alice", "data1", "read"])).unwrap();
        model.add_policy("p", rule(&["bob", "data2", "write"])).unwrap();
        model.add_policy("p", rule(&["alice", "data2", "read"])).unwrap();

        assert_eq!(model.values_for_field("p", 0), rule(&["alice", "bob"]));
        assert_eq!(model.values_for_field("p", 2), rule(&["read", "write"]));
        assert!(model.values_for_field("p2", 0).is_empty());
    }

    #[test]
    fn test_clear_keeps_definitions() {
        let mut model = Model::from_text(RBAC_MODEL).unwrap();
        model.add_policy("g", rule(&["alice", "admin"])).unwrap();
        model.clear_policy();
        assert_eq!(model.rule_count(), 0);
        assert_eq!(model.arity("g"), Some(2));
    }
}
