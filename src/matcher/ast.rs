//! Parsed (unbound) matcher expression tree

use super::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// Matcher expression as written in the model, before field and function binding
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value<'static>),
    /// `section.field`, e.g. `r.sub` or `p2.act`
    Field {
        section: String,
        field: String,
    },
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare {
        op: CompareOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    In {
        needle: Box<Expr>,
        haystack: Vec<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Visit this node and every descendant, depth first
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        visit(self);
        match self {
            Expr::Literal(_) | Expr::Field { .. } => {}
            Expr::Not(inner) => inner.walk(visit),
            Expr::And(lhs, rhs) | Expr::Or(lhs, rhs) | Expr::Compare { lhs, rhs, .. } => {
                lhs.walk(visit);
                rhs.walk(visit);
            }
            Expr::In { needle, haystack } => {
                needle.walk(visit);
                for item in haystack {
                    item.walk(visit);
                }
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.walk(visit);
                }
            }
        }
    }

    /// Whether any `section.*` field is referenced
    pub fn references_section(&self, section: &str) -> bool {
        let mut found = false;
        self.walk(&mut |node| {
            if let Expr::Field { section: s, .. } = node {
                if s == section {
                    found = true;
                }
            }
        });
        found
    }
}
