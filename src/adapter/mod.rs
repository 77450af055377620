//! Policy stores
//!
//! An [`Adapter`] persists rules as rows of `(ptype, v0, v1, ...)`. The
//! enforcer writes every mutation through to its adapter before applying it
//! to the in-memory model, so a failed write leaves the enforcer unchanged.
//!
//! Mutation results report whether the store changed. A store that already
//! holds an added row (or lacks a removed one) still satisfies the request and
//! returns `Ok(false)`.

mod file;
mod memory;
mod sqlite;

pub use file::FileAdapter;
pub use memory::MemoryAdapter;
pub use sqlite::SqliteAdapter;

use crate::error::Result;
use crate::model::{rule_matches_filter, Model};
use ahash::AHashSet;
use tracing::debug;

/// Persistence contract for policy rules
pub trait Adapter: Send {
    /// Add every stored row to `model`, in stored order
    ///
    /// Rows with a ptype the model does not define, or with the wrong number
    /// of fields, fail with [`Error::InvalidPolicy`](crate::Error::InvalidPolicy).
    fn load_policy(&mut self, model: &mut Model) -> Result<()>;

    /// Replace the stored rows with every rule in `model`
    fn save_policy(&mut self, model: &Model) -> Result<()>;

    fn add_policy(&mut self, ptype: &str, rule: &[String]) -> Result<bool>;

    /// All rows are written or none are
    fn add_policies(&mut self, ptype: &str, rules: &[Vec<String>]) -> Result<bool>;

    fn remove_policy(&mut self, ptype: &str, rule: &[String]) -> Result<bool>;

    /// All rows are removed or none are
    fn remove_policies(&mut self, ptype: &str, rules: &[Vec<String>]) -> Result<bool>;

    /// Remove every row of `ptype` whose fields from `field_index` on equal
    /// `values`; empty values match anything
    fn remove_filtered_policy(
        &mut self,
        ptype: &str,
        field_index: usize,
        values: &[String],
    ) -> Result<bool>;

    /// Remove every row
    fn clear_policy(&mut self) -> Result<()>;
}

/// Add one stored row to `model`; duplicate rows are skipped
pub(crate) fn load_row(model: &mut Model, ptype: &str, rule: Vec<String>) -> Result<()> {
    if !model.add_policy(ptype, rule)? {
        debug!(ptype = %ptype, "Skipped duplicate stored rule");
    }
    Ok(())
}

/// Ordered, deduplicated rows shared by the in-memory and file stores
///
/// `index` holds exactly the entries of `rows`.
#[derive(Debug, Clone, Default)]
pub(crate) struct RuleRows {
    rows: Vec<(String, Vec<String>)>,
    index: AHashSet<(String, Vec<String>)>,
}

impl PartialEq for RuleRows {
    fn eq(&self, other: &Self) -> bool {
        self.rows == other.rows
    }
}

impl Eq for RuleRows {}

impl RuleRows {
    pub(crate) fn from_model(model: &Model) -> Self {
        let mut rows = RuleRows::default();
        for (ptype, rule) in model.rules() {
            rows.push(ptype, rule);
        }
        rows
    }

    pub(crate) fn rows(&self) -> &[(String, Vec<String>)] {
        &self.rows
    }

    pub(crate) fn contains(&self, ptype: &str, rule: &[String]) -> bool {
        self.index.contains(&(ptype.to_string(), rule.to_vec()))
    }

    pub(crate) fn push(&mut self, ptype: &str, rule: &[String]) -> bool {
        let entry = (ptype.to_string(), rule.to_vec());
        if !self.index.insert(entry.clone()) {
            return false;
        }
        self.rows.push(entry);
        true
    }

    pub(crate) fn add_all(&mut self, ptype: &str, rules: &[Vec<String>]) -> bool {
        let mut changed = false;
        for rule in rules {
            changed |= self.push(ptype, rule);
        }
        changed
    }

    pub(crate) fn remove_all(&mut self, ptype: &str, rules: &[Vec<String>]) -> bool {
        let mut removed = false;
        for rule in rules {
            removed |= self.index.remove(&(ptype.to_string(), rule.clone()));
        }
        if removed {
            let index = &self.index;
            self.rows.retain(|entry| index.contains(entry));
        }
        removed
    }

    pub(crate) fn remove_filtered(&mut self, ptype: &str, field_index: usize, values: &[String]) -> bool {
        let before = self.rows.len();
        let index = &mut self.index;
        self.rows.retain(|entry| {
            let (p, r) = entry;
            let keep = !(p == ptype && rule_matches_filter(r, field_index, values));
            if !keep {
                index.remove(entry);
            }
            keep
        });
        self.rows.len() != before
    }

    pub(crate) fn clear(&mut self) {
        self.rows.clear();
        self.index.clear();
    }

    pub(crate) fn load_into(&self, model: &mut Model) -> Result<()> {
        for (ptype, rule) in &self.rows {
            load_row(model, ptype, rule.clone())?;
        }
        Ok(())
    }
}
