//! Runtime values produced while evaluating a matcher

use std::borrow::Cow;
use std::fmt;

/// A matcher value (string, number or boolean)
///
/// Strings borrow from the request, the policy rule or the compiled program
/// whenever possible, so evaluating a rule does not allocate.
#[derive(Debug, Clone, PartialEq)]
pub enum Value<'a> {
    Str(Cow<'a, str>),
    Number(f64),
    Bool(bool),
}

impl<'a> Value<'a> {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view; strings holding a number are coerced
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Str(s) => s.trim().parse().ok(),
            Value::Bool(_) => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Number(_) => "number",
            Value::Bool(_) => "bool",
        }
    }

    /// Re-borrow without cloning the string contents
    pub fn borrowed(&self) -> Value<'_> {
        match self {
            Value::Str(s) => Value::Str(Cow::Borrowed(s.as_ref())),
            Value::Number(n) => Value::Number(*n),
            Value::Bool(b) => Value::Bool(*b),
        }
    }

    pub fn into_owned(self) -> Value<'static> {
        match self {
            Value::Str(s) => Value::Str(Cow::Owned(s.into_owned())),
            Value::Number(n) => Value::Number(n),
            Value::Bool(b) => Value::Bool(b),
        }
    }

    /// Loose equality used by `==`, `!=` and `in`
    ///
    /// A string and a number compare numerically when the string parses.
    pub fn loose_eq(&self, other: &Value<'_>) -> bool {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => (a - b).abs() < f64::EPSILON,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(_), Value::Number(b)) => self
                .as_number()
                .map(|a| (a - b).abs() < f64::EPSILON)
                .unwrap_or(false),
            (Value::Number(a), Value::Str(_)) => other
                .as_number()
                .map(|b| (a - b).abs() < f64::EPSILON)
                .unwrap_or(false),
            _ => false,
        }
    }
}

impl fmt::Display for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{}", s),
            Value::Number(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<bool> for Value<'static> {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value<'static> {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<String> for Value<'static> {
    fn from(s: String) -> Self {
        Value::Str(Cow::Owned(s))
    }
}

impl<'a> From<&'a str> for Value<'a> {
    fn from(s: &'a str) -> Self {
        Value::Str(Cow::Borrowed(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loose_eq_coerces_numeric_strings() {
        assert!(Value::from("18").loose_eq(&Value::Number(18.0)));
        assert!(Value::Number(2.5).loose_eq(&Value::from("2.5")));
        assert!(!Value::from("abc").loose_eq(&Value::Number(0.0)));
    }

    #[test]
    fn test_loose_eq_mixed_types() {
        assert!(!Value::Bool(true).loose_eq(&Value::from("true")));
        assert!(Value::from("alice").loose_eq(&Value::from("alice")));
    }
}
