//! Effect aggregation with deny precedence
//!
//! Combines the effects of every matching rule into one decision:
//! - Explicit deny takes precedence over allow, whatever the rule order
//! - A deny finalizes the decision immediately
//! - Under allow-override, the first allow finalizes only when no rule of the
//!   policy type can carry a deny

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Effect of one matching rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    /// Allow the request
    Allow,
    /// Deny the request (takes precedence over Allow)
    Deny,
}

impl Effect {
    /// Effect named by a rule's `eft` field; anything but `deny` allows
    pub fn from_eft(value: &str) -> Self {
        if value == "deny" {
            Effect::Deny
        } else {
            Effect::Allow
        }
    }
}

/// Aggregation mode, parsed from the model's `[policy_effect]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    /// `some(where (p.eft == allow))`: some rule allows and no rule denies
    AllowOverride,
    /// `!some(where (p.eft == deny))`: every matching rule allows
    DenyOverride,
}

impl EffectKind {
    /// Parse an effect expression
    ///
    /// Whitespace is ignored and the policy key may carry a suffix (`p2.eft`).
    /// Unsupported expressions are a model syntax error.
    ///
    /// # Examples
    ///
    /// ```
    /// use tollgate::EffectKind;
    ///
    /// assert_eq!(
    ///     EffectKind::parse("some(where (p.eft == allow))").unwrap(),
    ///     EffectKind::AllowOverride
    /// );
    /// assert!(EffectKind::parse("priority(p.eft) || deny").is_err());
    /// ```
    pub fn parse(expr: &str) -> Result<Self> {
        static POLICY_KEY: OnceLock<Regex> = OnceLock::new();
        let policy_key =
            POLICY_KEY.get_or_init(|| Regex::new(r"\bp[0-9]*\.eft").expect("static regex is valid"));

        let compact: String = expr.chars().filter(|c| !c.is_whitespace()).collect();
        let normalized = policy_key.replace_all(&compact, "p.eft");

        match normalized.as_ref() {
            "some(where(p.eft==allow))" => Ok(EffectKind::AllowOverride),
            "some(where(p.eft==allow))&&!some(where(p.eft==deny))" => {
                Ok(EffectKind::AllowOverride)
            }
            "!some(where(p.eft==deny))" => Ok(EffectKind::DenyOverride),
            _ => Err(Error::ModelSyntax(format!(
                "unsupported policy effect '{}'",
                expr
            ))),
        }
    }

    /// Canonical expression for this mode
    pub fn expression(self) -> &'static str {
        match self {
            EffectKind::AllowOverride => "some(where (p.eft == allow))",
            EffectKind::DenyOverride => "!some(where (p.eft == deny))",
        }
    }
}

/// Streaming reducer over per-rule effects
#[derive(Debug)]
pub struct EffectStream {
    kind: EffectKind,
    may_deny: bool,
    decision: Option<bool>,
    first_allow: Option<usize>,
    decisive: Option<usize>,
}

impl EffectStream {
    /// `may_deny` is false when the policy type has no `eft` field
    pub fn new(kind: EffectKind, may_deny: bool) -> Self {
        EffectStream {
            kind,
            may_deny,
            decision: None,
            first_allow: None,
            decisive: None,
        }
    }

    /// Record the effect of matching rule `index`; returns true once the
    /// decision is final and remaining rules can be skipped
    pub fn push(&mut self, effect: Effect, index: usize) -> bool {
        if self.decision.is_some() {
            return true;
        }

        match effect {
            Effect::Deny => {
                // Explicit deny - finalize immediately
                self.decision = Some(false);
                self.decisive = Some(index);
            }
            Effect::Allow => {
                if self.first_allow.is_none() {
                    self.first_allow = Some(index);
                }
                if self.kind == EffectKind::AllowOverride && !self.may_deny {
                    self.decision = Some(true);
                    self.decisive = Some(index);
                }
            }
        }

        self.decision.is_some()
    }

    /// Final decision plus the index of the rule that decided it, if any
    pub fn finish(self) -> (bool, Option<usize>) {
        match self.decision {
            Some(decision) => (decision, self.decisive),
            None => match self.kind {
                // Allow only if we found at least one Allow and no Deny
                EffectKind::AllowOverride => (self.first_allow.is_some(), self.first_allow),
                EffectKind::DenyOverride => (true, self.first_allow),
            },
        }
    }
}

/// Reduce a complete sequence of effects
pub fn aggregate(kind: EffectKind, effects: impl IntoIterator<Item = Effect>) -> bool {
    let mut stream = EffectStream::new(kind, true);
    for (index, effect) in effects.into_iter().enumerate() {
        if stream.push(effect, index) {
            break;
        }
    }
    stream.finish().0
}
