//! Matcher expressions
//!
//! Matchers are parsed once when the model is loaded ([`parse`]) and bound to
//! request/policy fields and functions when the enforcer is built
//! ([`Program::compile`]). Supported syntax:
//! - String (`"..."`, `'...'`), number and boolean literals
//! - Field references: `r.sub`, `p.obj`, `r2.act`, ...
//! - `==`, `!=`, `<`, `<=`, `>`, `>=`, `&&`, `||`, `!`, parentheses
//! - `x in (a, b, ...)`
//! - Function calls, including role functions `g(...)`, `g2(...)`
//!
//! A policy field holding `*` equals any value.

pub mod ast;
mod functions;
mod lexer;
mod parser;
mod program;
mod value;

pub use functions::{
    glob_match, ip_match, key_match, key_match2, key_match2_pattern, key_match3,
    key_match3_pattern, match_function, regex_match, FunctionMap, MatchFunction, RegexCache,
};
pub use parser::{parse, MAX_NESTING};
pub use program::{EvalContext, Program, RoleLookup, Scope, WILDCARD};
pub use value::Value;
