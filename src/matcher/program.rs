//! Compiled matchers
//!
//! A [`Program`] is an [`Expr`] bound to a concrete request/policy pair: field
//! references become positional indices, function names become function
//! handles and role calls are routed to a [`RoleLookup`]. Evaluation never
//! re-parses the expression.

use super::ast::{CompareOp, Expr};
use super::functions::{FunctionMap, MatchFunction};
use super::Value;
use crate::error::{Error, Result};
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Policy field value that matches any request value in comparisons, `in`
/// and role calls
pub const WILDCARD: &str = "*";

/// Role-link queries needed by role function calls (`g(r.sub, p.sub)`)
pub trait RoleLookup {
    fn has_link(&self, ptype: &str, name1: &str, name2: &str, domain: Option<&str>)
        -> Result<bool>;
}

/// Names and fields a matcher may refer to
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub request_key: &'a str,
    pub request_fields: &'a [String],
    pub policy_key: &'a str,
    pub policy_fields: &'a [String],
    /// Role key -> number of fields in its definition
    pub roles: &'a BTreeMap<String, usize>,
}

/// Bindings for a single evaluation
pub struct EvalContext<'a> {
    pub request: &'a [String],
    pub policy: &'a [String],
    pub roles: &'a dyn RoleLookup,
}

enum Node {
    Literal(Value<'static>),
    Request(usize),
    Policy(usize),
    Not(Box<Node>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Compare {
        op: CompareOp,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    In {
        needle: Box<Node>,
        haystack: Vec<Node>,
    },
    Call {
        name: String,
        function: MatchFunction,
        args: Vec<Node>,
    },
    Role {
        ptype: String,
        args: Vec<Node>,
    },
}

/// A matcher compiled against a [`Scope`]
pub struct Program {
    root: Node,
    source: String,
    request_arity: usize,
    uses_policy: bool,
}

impl Program {
    /// Bind `expr` to `scope`, resolving functions from `functions`
    ///
    /// Unknown functions, wrong role-call arity and unknown fields fail with
    /// [`Error::MatcherEval`].
    pub fn compile(
        source: &str,
        expr: &Expr,
        scope: &Scope<'_>,
        functions: &FunctionMap,
    ) -> Result<Self> {
        let root = compile_node(expr, scope, functions)?;
        Ok(Program {
            root,
            source: source.to_string(),
            request_arity: scope.request_fields.len(),
            uses_policy: expr.references_section(scope.policy_key),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn request_arity(&self) -> usize {
        self.request_arity
    }

    /// Whether the expression reads any policy field
    pub fn uses_policy(&self) -> bool {
        self.uses_policy
    }

    /// Evaluate to a boolean; any other result is an error
    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<bool> {
        if ctx.request.len() != self.request_arity {
            return Err(Error::MatcherEval(format!(
                "request has {} values but the request definition has {} fields",
                ctx.request.len(),
                self.request_arity
            )));
        }

        match eval(&self.root, ctx)? {
            Value::Bool(b) => Ok(b),
            other => Err(Error::MatcherEval(format!(
                "matcher '{}' evaluated to a {}, expected bool",
                self.source,
                other.type_name()
            ))),
        }
    }
}

impl std::fmt::Debug for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Program")
            .field("source", &self.source)
            .field("request_arity", &self.request_arity)
            .field("uses_policy", &self.uses_policy)
            .finish()
    }
}

fn compile_node(expr: &Expr, scope: &Scope<'_>, functions: &FunctionMap) -> Result<Node> {
    let compile_all = |exprs: &[Expr]| -> Result<Vec<Node>> {
        exprs
            .iter()
            .map(|e| compile_node(e, scope, functions))
            .collect()
    };

    Ok(match expr {
        Expr::Literal(value) => Node::Literal(value.clone()),
        Expr::Field { section, field } => {
            let (fields, is_request) = if section == scope.request_key {
                (scope.request_fields, true)
            } else if section == scope.policy_key {
                (scope.policy_fields, false)
            } else {
                return Err(Error::MatcherEval(format!(
                    "unbound variable '{}.{}'",
                    section, field
                )));
            };
            let index = fields.iter().position(|f| f == field).ok_or_else(|| {
                Error::MatcherEval(format!("unbound variable '{}.{}'", section, field))
            })?;
            if is_request {
                Node::Request(index)
            } else {
                Node::Policy(index)
            }
        }
        Expr::Not(inner) => Node::Not(Box::new(compile_node(inner, scope, functions)?)),
        Expr::And(lhs, rhs) => Node::And(
            Box::new(compile_node(lhs, scope, functions)?),
            Box::new(compile_node(rhs, scope, functions)?),
        ),
        Expr::Or(lhs, rhs) => Node::Or(
            Box::new(compile_node(lhs, scope, functions)?),
            Box::new(compile_node(rhs, scope, functions)?),
        ),
        Expr::Compare { op, lhs, rhs } => Node::Compare {
            op: *op,
            lhs: Box::new(compile_node(lhs, scope, functions)?),
            rhs: Box::new(compile_node(rhs, scope, functions)?),
        },
        Expr::In { needle, haystack } => Node::In {
            needle: Box::new(compile_node(needle, scope, functions)?),
            haystack: compile_all(haystack)?,
        },
        Expr::Call { name, args } => {
            if let Some(&arity) = scope.roles.get(name) {
                if args.len() != arity {
                    return Err(Error::MatcherEval(format!(
                        "role function {} takes {} arguments, got {}",
                        name,
                        arity,
                        args.len()
                    )));
                }
                Node::Role {
                    ptype: name.clone(),
                    args: compile_all(args)?,
                }
            } else {
                let function = functions.get(name).ok_or_else(|| {
                    Error::MatcherEval(format!("unsupported function '{}'", name))
                })?;
                Node::Call {
                    name: name.clone(),
                    function: function.clone(),
                    args: compile_all(args)?,
                }
            }
        }
    })
}

fn eval<'a>(node: &'a Node, ctx: &EvalContext<'a>) -> Result<Value<'a>> {
    Ok(match node {
        Node::Literal(value) => value.borrowed(),
        Node::Request(i) => Value::Str(Cow::Borrowed(ctx.request[*i].as_str())),
        Node::Policy(i) => Value::Str(Cow::Borrowed(policy_field(ctx, *i)?)),
        Node::Not(inner) => Value::Bool(!expect_bool(eval(inner, ctx)?, "!")?),
        Node::And(lhs, rhs) => {
            Value::Bool(expect_bool(eval(lhs, ctx)?, "&&")? && expect_bool(eval(rhs, ctx)?, "&&")?)
        }
        Node::Or(lhs, rhs) => {
            Value::Bool(expect_bool(eval(lhs, ctx)?, "||")? || expect_bool(eval(rhs, ctx)?, "||")?)
        }
        Node::Compare { op, lhs, rhs } => Value::Bool(compare(*op, lhs, rhs, ctx)?),
        Node::In { needle, haystack } => {
            if is_wildcard(needle, ctx) {
                return Ok(Value::Bool(true));
            }
            let value = eval(needle, ctx)?;
            let mut found = false;
            for item in haystack {
                if is_wildcard(item, ctx) || value.loose_eq(&eval(item, ctx)?) {
                    found = true;
                    break;
                }
            }
            Value::Bool(found)
        }
        Node::Call {
            name,
            function,
            args,
        } => {
            let values = args
                .iter()
                .map(|arg| eval(arg, ctx))
                .collect::<Result<Vec<_>>>()?;
            function(values.as_slice())
                .map_err(|e| Error::MatcherEval(format!("{}: {}", name, e)))?
        }
        Node::Role { ptype, args } => {
            if args.iter().take(2).any(|arg| is_wildcard(arg, ctx)) {
                return Ok(Value::Bool(true));
            }
            let values = args
                .iter()
                .map(|arg| eval(arg, ctx))
                .collect::<Result<Vec<_>>>()?;
            let domain = if values.len() > 2 {
                Some(role_arg(ptype, &values, 2)?)
            } else {
                None
            };
            let name1 = role_arg(ptype, &values, 0)?;
            let name2 = role_arg(ptype, &values, 1)?;
            Value::Bool(ctx.roles.has_link(ptype, name1, name2, domain)?)
        }
    })
}

fn role_arg<'v>(ptype: &str, values: &'v [Value<'_>], index: usize) -> Result<&'v str> {
    values[index].as_str().ok_or_else(|| {
        Error::MatcherEval(format!(
            "role function {} expects string arguments, got {}",
            ptype,
            values[index].type_name()
        ))
    })
}

fn policy_field<'a>(ctx: &EvalContext<'a>, index: usize) -> Result<&'a str> {
    ctx.policy.get(index).map(String::as_str).ok_or_else(|| {
        Error::MatcherEval(format!(
            "policy rule has {} fields, field {} is unbound",
            ctx.policy.len(),
            index
        ))
    })
}

fn is_wildcard(node: &Node, ctx: &EvalContext<'_>) -> bool {
    match node {
        Node::Policy(i) => ctx.policy.get(*i).map(|v| v == WILDCARD).unwrap_or(false),
        _ => false,
    }
}

fn expect_bool(value: Value<'_>, operator: &str) -> Result<bool> {
    value.as_bool().ok_or_else(|| {
        Error::MatcherEval(format!(
            "operand of '{}' must be bool, got {} '{}'",
            operator,
            value.type_name(),
            value
        ))
    })
}

fn compare(op: CompareOp, lhs: &Node, rhs: &Node, ctx: &EvalContext<'_>) -> Result<bool> {
    if matches!(op, CompareOp::Eq | CompareOp::Ne) && (is_wildcard(lhs, ctx) || is_wildcard(rhs, ctx))
    {
        return Ok(op == CompareOp::Eq);
    }

    let a = eval(lhs, ctx)?;
    let b = eval(rhs, ctx)?;

    match op {
        CompareOp::Eq => Ok(a.loose_eq(&b)),
        CompareOp::Ne => Ok(!a.loose_eq(&b)),
        _ => {
            let ordering = match (&a, &b) {
                (Value::Str(x), Value::Str(y)) => match (a.as_number(), b.as_number()) {
                    (Some(x), Some(y)) => x.partial_cmp(&y),
                    _ => Some(x.cmp(y)),
                },
                (Value::Bool(_), _) | (_, Value::Bool(_)) => None,
                _ => match (a.as_number(), b.as_number()) {
                    (Some(x), Some(y)) => x.partial_cmp(&y),
                    _ => None,
                },
            }
            .ok_or_else(|| {
                Error::MatcherEval(format!(
                    "cannot compare {} '{}' {} {} '{}'",
                    a.type_name(),
                    a,
                    op.symbol(),
                    b.type_name(),
                    b
                ))
            })?;

            Ok(match op {
                CompareOp::Lt => ordering.is_lt(),
                CompareOp::Le => ordering.is_le(),
                CompareOp::Gt => ordering.is_gt(),
                CompareOp::Ge => ordering.is_ge(),
                CompareOp::Eq | CompareOp::Ne => unreachable!("handled above"),
            })
        }
    }
}
