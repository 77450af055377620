use super::{Adapter, RuleRows};
use crate::error::Result;
use crate::model::Model;

/// Policy store held in process memory
///
/// Useful for tests and for hosts that build their policy programmatically.
#[derive(Debug, Clone, Default)]
pub struct MemoryAdapter {
    rows: RuleRows,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `(ptype, rule)` rows
    pub fn with_rules<I, P, R, S>(rules: I) -> Self
    where
        I: IntoIterator<Item = (P, R)>,
        P: AsRef<str>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut rows = RuleRows::default();
        for (ptype, rule) in rules {
            let rule: Vec<String> = rule.into_iter().map(Into::into).collect();
            rows.push(ptype.as_ref(), &rule);
        }
        MemoryAdapter { rows }
    }

    /// Stored rows in order
    pub fn rows(&self) -> &[(String, Vec<String>)] {
        self.rows.rows()
    }
}

impl Adapter for MemoryAdapter {
    fn load_policy(&mut self, model: &mut Model) -> Result<()> {
        self.rows.load_into(model)
    }

    fn save_policy(&mut self, model: &Model) -> Result<()> {
        self.rows = RuleRows::from_model(model);
        Ok(())
    }

    fn add_policy(&mut self, ptype: &str, rule: &[String]) -> Result<bool> {
        Ok(self.rows.push(ptype, rule))
    }

    fn add_policies(&mut self, ptype: &str, rules: &[Vec<String>]) -> Result<bool> {
        Ok(self.rows.add_all(ptype, rules))
    }

    fn remove_policy(&mut self, ptype: &str, rule: &[String]) -> Result<bool> {
        Ok(self.rows.remove_all(ptype, &[rule.to_vec()]))
    }

    fn remove_policies(&mut self, ptype: &str, rules: &[Vec<String>]) -> Result<bool> {
        Ok(self.rows.remove_all(ptype, rules))
    }

    fn remove_filtered_policy(
        &mut self,
        ptype: &str,
        field_index: usize,
        values: &[String],
    ) -> Result<bool> {
        Ok(self.rows.remove_filtered(ptype, field_index, values))
    }

    fn clear_policy(&mut self) -> Result<()> {
        self.rows.clear();
        Ok(())
    }
}
