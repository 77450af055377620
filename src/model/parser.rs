//! Model text parsing and validation
//!
//! Grammar: `[section]` headers, `key = value` lines, `#` comment lines,
//! blank lines and trailing `\` line continuation.

use super::{MatcherDef, Model, PolicyKind, PolicySet};
use crate::effect::EffectKind;
use crate::error::{Error, Result};
use crate::matcher::ast::Expr;
use crate::matcher::parse;
use std::collections::{BTreeMap, HashSet};

/// Section header -> key letter
const SECTIONS: &[(&str, char)] = &[
    ("request_definition", 'r'),
    ("policy_definition", 'p'),
    ("role_definition", 'g'),
    ("policy_effect", 'e'),
    ("matchers", 'm'),
];

fn syntax(line: usize, msg: impl std::fmt::Display) -> Error {
    Error::ModelSyntax(format!("line {}: {}", line, msg))
}

/// Join continuation lines and strip comments, keeping the starting line number
fn logical_lines(text: &str) -> Result<Vec<(usize, String)>> {
    let mut lines = Vec::new();
    let mut pending: Option<(usize, String)> = None;

    for (i, raw) in text.lines().enumerate() {
        let number = i + 1;
        let trimmed = raw.trim();

        if pending.is_none() && (trimmed.is_empty() || trimmed.starts_with('#')) {
            continue;
        }

        let (content, continues) = match trimmed.strip_suffix('\\') {
            Some(head) => (head.trim_end(), true),
            None => (trimmed, false),
        };

        let (start, mut buffer) = pending.take().unwrap_or((number, String::new()));
        if !buffer.is_empty() && !content.is_empty() {
            buffer.push(' ');
        }
        buffer.push_str(content);

        if continues {
            pending = Some((start, buffer));
        } else {
            lines.push((start, buffer));
        }
    }

    if let Some((start, _)) = pending {
        return Err(syntax(start, "line continuation at end of input"));
    }

    Ok(lines)
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn key_matches_letter(key: &str, letter: char) -> bool {
    key.strip_prefix(letter)
        .map(|suffix| suffix.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

fn field_list(line: usize, key: &str, value: &str) -> Result<Vec<String>> {
    let mut fields = Vec::new();
    let mut seen = HashSet::new();

    for field in value.split(',').map(str::trim) {
        if field.is_empty() {
            return Err(syntax(line, format!("'{}' has an empty field name", key)));
        }
        if !is_identifier(field) {
            return Err(syntax(line, format!("'{}' has invalid field name '{}'", key, field)));
        }
        if !seen.insert(field) {
            return Err(syntax(line, format!("'{}' repeats field '{}'", key, field)));
        }
        fields.push(field.to_string());
    }

    Ok(fields)
}

fn role_arity(line: usize, key: &str, value: &str) -> Result<usize> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    if parts.iter().any(|p| *p != "_") || !(2..=3).contains(&parts.len()) {
        return Err(syntax(
            line,
            format!("role definition '{}' must be '_, _' or '_, _, _'", key),
        ));
    }
    Ok(parts.len())
}

pub(super) fn parse_model(text: &str) -> Result<Model> {
    let mut model = Model::empty();
    let mut section: Option<char> = None;
    let mut seen_keys = HashSet::new();

    for (line, content) in logical_lines(text)? {
        if let Some(header) = content.strip_prefix('[') {
            let name = header
                .strip_suffix(']')
                .ok_or_else(|| syntax(line, format!("malformed section header '{}'", content)))?
                .trim();
            let letter = SECTIONS
                .iter()
                .find(|(s, _)| *s == name)
                .map(|(_, l)| *l)
                .ok_or_else(|| syntax(line, format!("unknown section '[{}]'", name)))?;
            section = Some(letter);
            continue;
        }

        let (key, value) = content
            .split_once('=')
            .map(|(k, v)| (k.trim(), v.trim()))
            .ok_or_else(|| syntax(line, format!("expected 'key = value', found '{}'", content)))?;

        let letter = section.ok_or_else(|| syntax(line, format!("key '{}' outside a section", key)))?;
        if !key_matches_letter(key, letter) {
            return Err(syntax(
                line,
                format!("key '{}' does not belong in this section", key),
            ));
        }
        if !seen_keys.insert(key.to_string()) {
            return Err(syntax(line, format!("duplicate key '{}'", key)));
        }
        if value.is_empty() {
            return Err(syntax(line, format!("key '{}' has an empty value", key)));
        }

        match letter {
            'r' => {
                model.requests.insert(key.to_string(), field_list(line, key, value)?);
            }
            'p' => {
                let fields = field_list(line, key, value)?;
                model
                    .rules
                    .insert(key.to_string(), PolicySet::new(PolicyKind::Policy, fields));
            }
            'g' => {
                let arity = role_arity(line, key, value)?;
                model.roles.insert(key.to_string(), arity);
                model.rules.insert(
                    key.to_string(),
                    PolicySet::new(PolicyKind::Role, vec!["_".to_string(); arity]),
                );
            }
            'e' => {
                let kind = EffectKind::parse(value)?;
                model
                    .effects
                    .insert(key.to_string(), (kind, value.to_string()));
            }
            'm' => {
                let expr = parse(value).map_err(|e| {
                    syntax(line, format!("matcher '{}' is malformed: {}", key, e))
                })?;
                model.matchers.insert(
                    key.to_string(),
                    MatcherDef {
                        source: value.to_string(),
                        expr,
                    },
                );
            }
            _ => unreachable!("section letters come from SECTIONS"),
        }
    }

    validate(&model)?;
    Ok(model)
}

fn validate(model: &Model) -> Result<()> {
    for (key, section) in [
        ("r", "request_definition"),
        ("p", "policy_definition"),
        ("e", "policy_effect"),
        ("m", "matchers"),
    ] {
        let present = match key {
            "r" => model.requests.contains_key(key),
            "p" => model.rules.contains_key(key),
            "e" => model.effects.contains_key(key),
            _ => model.matchers.contains_key(key),
        };
        if !present {
            return Err(Error::ModelSyntax(format!(
                "missing mandatory '{}' in [{}]",
                key, section
            )));
        }
    }

    for (key, matcher) in &model.matchers {
        let pairing = model.pairing(key);
        let request = model
            .request_fields(&pairing.request)
            .unwrap_or_default();
        let policy = model.policy_fields(&pairing.policy).unwrap_or_default();
        check_references(key, &matcher.expr, &pairing.request, request, &pairing.policy, policy, &model.roles)?;
    }

    Ok(())
}

fn check_references(
    matcher_key: &str,
    expr: &Expr,
    request_key: &str,
    request_fields: &[String],
    policy_key: &str,
    policy_fields: &[String],
    roles: &BTreeMap<String, usize>,
) -> Result<()> {
    let mut problem: Option<String> = None;

    expr.walk(&mut |node| {
        if problem.is_some() {
            return;
        }
        match node {
            Expr::Field { section, field } => {
                let fields = if section == request_key {
                    request_fields
                } else if section == policy_key {
                    policy_fields
                } else {
                    problem = Some(format!(
                        "matcher '{}' references undefined section '{}'",
                        matcher_key, section
                    ));
                    return;
                };
                if !fields.iter().any(|f| f == field) {
                    problem = Some(format!(
                        "matcher '{}' references undefined field '{}.{}'",
                        matcher_key, section, field
                    ));
                }
            }
            Expr::Call { name, args } => match roles.get(name) {
                Some(&arity) if args.len() != arity => {
                    problem = Some(format!(
                        "matcher '{}' calls role '{}' with {} arguments, its definition has {}",
                        matcher_key,
                        name,
                        args.len(),
                        arity
                    ));
                }
                None if key_matches_letter(name, 'g') => {
                    problem = Some(format!(
                        "matcher '{}' calls undefined role '{}'",
                        matcher_key, name
                    ));
                }
                _ => {}
            },
            _ => {}
        }
    });

    match problem {
        Some(msg) => Err(Error::ModelSyntax(msg)),
        None => Ok(()),
    }
}
