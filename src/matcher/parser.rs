//! Recursive-descent parser for matcher expressions
//!
//! Precedence, loosest first: `||`, `&&`, comparisons / `in`, unary `!`.

use super::ast::{CompareOp, Expr};
use super::lexer::{tokenize, Token};
use super::Value;

/// Deepest nesting of parentheses, calls and `!` a matcher may use
pub const MAX_NESTING: usize = 128;

/// Parse a matcher expression into an unbound expression tree
///
/// # Examples
///
/// ```
/// use tollgate::matcher::parse;
///
/// let expr = parse("r.sub == p.sub && keyMatch(r.obj, p.obj)").unwrap();
/// assert!(expr.references_section("p"));
/// assert!(parse("r.sub ==").is_err());
/// ```
pub fn parse(input: &str) -> Result<Expr, String> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err("empty matcher expression".to_string());
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse_or()?;
    if let Some(token) = parser.peek() {
        return Err(format!("unexpected trailing token {:?}", token));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    /// Run `parse` one nesting level deeper
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T, String>) -> Result<T, String> {
        if self.depth >= MAX_NESTING {
            return Err(format!("expression nested deeper than {} levels", MAX_NESTING));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        match self.next() {
            Some(ref token) if *token == expected => Ok(()),
            Some(token) => Err(format!("expected {:?}, found {:?}", expected, token)),
            None => Err(format!("expected {:?}, found end of expression", expected)),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_comparison()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let rhs = self.parse_comparison()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Expr, String> {
        let lhs = self.parse_unary()?;

        let op = match self.peek() {
            Some(Token::Eq) => CompareOp::Eq,
            Some(Token::Ne) => CompareOp::Ne,
            Some(Token::Lt) => CompareOp::Lt,
            Some(Token::Le) => CompareOp::Le,
            Some(Token::Gt) => CompareOp::Gt,
            Some(Token::Ge) => CompareOp::Ge,
            Some(Token::In) => {
                self.pos += 1;
                let haystack = self.parse_tuple()?;
                return Ok(Expr::In {
                    needle: Box::new(lhs),
                    haystack,
                });
            }
            _ => return Ok(lhs),
        };
        self.pos += 1;

        let rhs = self.parse_unary()?;
        Ok(Expr::Compare {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            let inner = self.nested(Self::parse_unary)?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::from(s))),
            Some(Token::Number(n)) => Ok(Expr::Literal(Value::Number(n))),
            Some(Token::Bool(b)) => Ok(Expr::Literal(Value::Bool(b))),
            Some(Token::LParen) => {
                let inner = self.nested(Self::parse_or)?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    let args = self.parse_tuple()?;
                    return Ok(Expr::Call { name, args });
                }
                field_reference(&name)
            }
            Some(token) => Err(format!("unexpected token {:?}", token)),
            None => Err("unexpected end of expression".to_string()),
        }
    }

    /// `( expr, expr, ... )`, possibly empty
    fn parse_tuple(&mut self) -> Result<Vec<Expr>, String> {
        self.expect(Token::LParen)?;
        let mut items = Vec::new();

        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(items);
        }

        loop {
            items.push(self.nested(Self::parse_or)?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => break,
                Some(token) => return Err(format!("expected ',' or ')', found {:?}", token)),
                None => return Err("unclosed '('".to_string()),
            }
        }

        Ok(items)
    }
}

fn field_reference(name: &str) -> Result<Expr, String> {
    let (section, field) = name
        .split_once('.')
        .ok_or_else(|| format!("undefined identifier '{}'", name))?;

    if section.is_empty() || field.is_empty() || field.contains('.') {
        return Err(format!("invalid field reference '{}'", name));
    }

    Ok(Expr::Field {
        section: section.to_string(),
        field: field.to_string(),
    })
}
