//! Breakpoint conditions: a small, sandboxed boolean expression language.
//!
//! Grammar (lowest to highest precedence):
//!
//! ```text
//! expr    := or
//! or      := and ("||" and)*
//! and     := unary ("&&" unary)*
//! unary   := "!" unary | compare
//! compare := primary (("==" | "!=" | "<" | "<=" | ">" | ">=") primary)?
//! primary := number | string | true | false | null | path | "(" expr ")"
//! path    := ident ("." ident | "[" number "]" | "[" string "]")*
//! ```
//!
//! Paths are resolved against a JSON context object. The root identifier must
//! be a key of the context; missing nested fields resolve to `null`.

use crate::DebugError;
use serde_json::Value;
use std::cmp::Ordering;

const MAX_DEPTH: usize = 64;

/// A parsed condition, reusable across evaluations.
#[derive(Debug, Clone)]
pub struct Condition {
    source: String,
    expr: Expr,
}

impl Condition {
    pub fn parse(source: &str) -> Result<Self, DebugError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let expr = parser.expr()?;
        if let Some(tok) = parser.peek() {
            return Err(syntax(tok.pos, format!("unexpected {:?}", tok.kind)));
        }
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate to a JSON value.
    pub fn evaluate(&self, ctx: &Value) -> Result<Value, DebugError> {
        eval(&self.expr, ctx)
    }

    /// Evaluate and apply truthiness.
    pub fn is_satisfied(&self, ctx: &Value) -> Result<bool, DebugError> {
        self.evaluate(ctx).map(|v| truthy(&v))
    }
}

/// Parse and evaluate `source` against `ctx` in one step.
pub fn evaluate(source: &str, ctx: &Value) -> Result<bool, DebugError> {
    Condition::parse(source)?.is_satisfied(ctx)
}

/// `null`, `false`, `0` and `""` are falsy; everything else is truthy.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

// ---------------------------------------------------------------------------
// AST
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Expr {
    Literal(Value),
    Path { root: String, segments: Vec<Segment> },
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone)]
enum Segment {
    Field(String),
    Index(usize),
}

#[derive(Debug, Clone, Copy)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Number(f64),
    Str(String),
    Ident(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    Minus,
    Not,
    And,
    Or,
    Cmp(&'static str),
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    pos: usize,
}

fn syntax(position: usize, message: impl Into<String>) -> DebugError {
    DebugError::ConditionSyntax {
        position,
        message: message.into(),
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, DebugError> {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (pos, c) = chars[i];
        let next = chars.get(i + 1).map(|(_, c)| *c);
        let mut push = |kind, width| {
            tokens.push(Token { kind, pos });
            width
        };

        i += match (c, next) {
            (c, _) if c.is_whitespace() => 1,
            ('(', _) => push(TokenKind::LParen, 1),
            (')', _) => push(TokenKind::RParen, 1),
            ('[', _) => push(TokenKind::LBracket, 1),
            (']', _) => push(TokenKind::RBracket, 1),
            ('.', _) => push(TokenKind::Dot, 1),
            ('-', _) => push(TokenKind::Minus, 1),
            ('&', Some('&')) => push(TokenKind::And, 2),
            ('|', Some('|')) => push(TokenKind::Or, 2),
            ('=', Some('=')) => push(TokenKind::Cmp("=="), 2),
            ('!', Some('=')) => push(TokenKind::Cmp("!="), 2),
            ('<', Some('=')) => push(TokenKind::Cmp("<="), 2),
            ('>', Some('=')) => push(TokenKind::Cmp(">="), 2),
            ('<', _) => push(TokenKind::Cmp("<"), 1),
            ('>', _) => push(TokenKind::Cmp(">"), 1),
            ('!', _) => push(TokenKind::Not, 1),
            ('"' | '\'', _) => {
                let (text, width) = lex_string(&chars[i..], pos)?;
                push(TokenKind::Str(text), width)
            }
            (c, _) if c.is_ascii_digit() => {
                let width = chars[i..]
                    .iter()
                    .take_while(|(_, c)| c.is_ascii_digit() || *c == '.')
                    .count();
                let text: String = chars[i..i + width].iter().map(|(_, c)| c).collect();
                let n = text
                    .parse::<f64>()
                    .map_err(|_| syntax(pos, format!("invalid number '{text}'")))?;
                push(TokenKind::Number(n), width)
            }
            (c, _) if c.is_alphabetic() || c == '_' => {
                let width = chars[i..]
                    .iter()
                    .take_while(|(_, c)| c.is_alphanumeric() || *c == '_')
                    .count();
                let text: String = chars[i..i + width].iter().map(|(_, c)| c).collect();
                push(TokenKind::Ident(text), width)
            }
            (c, _) => return Err(syntax(pos, format!("unexpected character '{c}'"))),
        };
    }

    Ok(tokens)
}

/// Lex a quoted string starting at `chars[0]`; returns the text and the
/// number of chars consumed including both quotes.
fn lex_string(chars: &[(usize, char)], pos: usize) -> Result<(String, usize), DebugError> {
    let quote = chars[0].1;
    let mut text = String::new();
    let mut i = 1;
    while i < chars.len() {
        match chars[i].1 {
            c if c == quote => return Ok((text, i + 1)),
            '\\' => {
                let escaped = chars
                    .get(i + 1)
                    .map(|(_, c)| *c)
                    .ok_or_else(|| syntax(pos, "unterminated escape"))?;
                text.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                });
                i += 2;
            }
            c => {
                text.push(c);
                i += 1;
            }
        }
    }
    Err(syntax(pos, "unterminated string"))
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek().map(|t| &t.kind) == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn end_pos(&self) -> usize {
        self.tokens.last().map(|t| t.pos + 1).unwrap_or(0)
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<(), DebugError> {
        if self.eat(&kind) {
            Ok(())
        } else {
            let pos = self.peek().map(|t| t.pos).unwrap_or_else(|| self.end_pos());
            Err(syntax(pos, format!("expected {what}")))
        }
    }

    fn expr(&mut self) -> Result<Expr, DebugError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            let pos = self.peek().map(|t| t.pos).unwrap_or(0);
            return Err(syntax(pos, "expression nested too deeply"));
        }
        let result = self.or();
        self.depth -= 1;
        result
    }

    fn or(&mut self) -> Result<Expr, DebugError> {
        let mut lhs = self.and()?;
        while self.eat(&TokenKind::Or) {
            let rhs = self.and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, DebugError> {
        let mut lhs = self.unary()?;
        while self.eat(&TokenKind::And) {
            let rhs = self.unary()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, DebugError> {
        if self.eat(&TokenKind::Not) {
            self.depth += 1;
            if self.depth > MAX_DEPTH {
                return Err(syntax(self.end_pos(), "expression nested too deeply"));
            }
            let inner = self.unary();
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner?)));
        }
        self.compare()
    }

    fn compare(&mut self) -> Result<Expr, DebugError> {
        let lhs = self.primary()?;
        let op = match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Cmp(op)) => match *op {
                "==" => CmpOp::Eq,
                "!=" => CmpOp::Ne,
                "<" => CmpOp::Lt,
                "<=" => CmpOp::Le,
                ">" => CmpOp::Gt,
                _ => CmpOp::Ge,
            },
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.primary()?;
        Ok(Expr::Compare(op, Box::new(lhs), Box::new(rhs)))
    }

    fn primary(&mut self) -> Result<Expr, DebugError> {
        let end = self.end_pos();
        let tok = self.next().ok_or_else(|| syntax(end, "unexpected end of condition"))?;
        match tok.kind {
            TokenKind::Number(n) => Ok(Expr::Literal(number(n))),
            TokenKind::Minus => match self.next() {
                Some(Token {
                    kind: TokenKind::Number(n),
                    ..
                }) => Ok(Expr::Literal(number(-n))),
                _ => Err(syntax(tok.pos, "expected number after '-'")),
            },
            TokenKind::Str(s) => Ok(Expr::Literal(Value::String(s))),
            TokenKind::LParen => {
                let inner = self.expr()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::Ident(name) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                _ => self.path(name),
            },
            other => Err(syntax(tok.pos, format!("unexpected {other:?}"))),
        }
    }

    fn path(&mut self, root: String) -> Result<Expr, DebugError> {
        let mut segments = Vec::new();
        loop {
            if self.eat(&TokenKind::Dot) {
                let end = self.end_pos();
                match self.next() {
                    Some(Token {
                        kind: TokenKind::Ident(field),
                        ..
                    }) => segments.push(Segment::Field(field)),
                    Some(tok) => return Err(syntax(tok.pos, "expected field name after '.'")),
                    None => return Err(syntax(end, "expected field name after '.'")),
                }
            } else if self.eat(&TokenKind::LBracket) {
                let end = self.end_pos();
                let segment = match self.next() {
                    Some(Token {
                        kind: TokenKind::Number(n),
                        pos,
                    }) => {
                        if n < 0.0 || n.fract() != 0.0 {
                            return Err(syntax(pos, "index must be a non-negative integer"));
                        }
                        Segment::Index(n as usize)
                    }
                    Some(Token {
                        kind: TokenKind::Str(key),
                        ..
                    }) => Segment::Field(key),
                    Some(tok) => return Err(syntax(tok.pos, "expected index or key")),
                    None => return Err(syntax(end, "expected index or key")),
                };
                self.expect(TokenKind::RBracket, "']'")?;
                segments.push(segment);
            } else {
                return Ok(Expr::Path { root, segments });
            }
        }
    }
}

fn number(n: f64) -> Value {
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

fn eval(expr: &Expr, ctx: &Value) -> Result<Value, DebugError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Path { root, segments } => {
            let mut current = ctx
                .get(root)
                .ok_or_else(|| DebugError::ConditionEval(format!("unknown identifier '{root}'")))?;
            for segment in segments {
                let next = match segment {
                    Segment::Field(name) => current.get(name.as_str()),
                    Segment::Index(i) => current.get(*i),
                };
                match next {
                    Some(v) => current = v,
                    None => return Ok(Value::Null),
                }
            }
            Ok(current.clone())
        }
        Expr::Not(inner) => Ok(Value::Bool(!truthy(&eval(inner, ctx)?))),
        Expr::And(lhs, rhs) => {
            if !truthy(&eval(lhs, ctx)?) {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(truthy(&eval(rhs, ctx)?)))
        }
        Expr::Or(lhs, rhs) => {
            if truthy(&eval(lhs, ctx)?) {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(truthy(&eval(rhs, ctx)?)))
        }
        Expr::Compare(op, lhs, rhs) => {
            let l = eval(lhs, ctx)?;
            let r = eval(rhs, ctx)?;
            let result = match op {
                CmpOp::Eq => values_equal(&l, &r),
                CmpOp::Ne => !values_equal(&l, &r),
                CmpOp::Lt => order(&l, &r)? == Ordering::Less,
                CmpOp::Le => order(&l, &r)? != Ordering::Greater,
                CmpOp::Gt => order(&l, &r)? == Ordering::Greater,
                CmpOp::Ge => order(&l, &r)? != Ordering::Less,
            };
            Ok(Value::Bool(result))
        }
    }
}

fn values_equal(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => l == r,
    }
}

fn order(l: &Value, r: &Value) -> Result<Ordering, DebugError> {
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => {
            let (a, b) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
            a.partial_cmp(&b)
                .ok_or_else(|| DebugError::ConditionEval("cannot order NaN".into()))
        }
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => Err(DebugError::ConditionEval(format!(
            "cannot order {} and {}",
            type_name(l),
            type_name(r)
        ))),
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> Value {
        json!({
            "node_id": "llm",
            "step": 4,
            "input": {"prompt": "hi", "tokens": [10, 20]},
            "outputs": {"fetch": {"status": 200, "items": ["a", "b"]}},
            "errors": {},
            "last": null
        })
    }

    #[test]
    fn comparisons_and_paths() {
        let ctx = ctx();
        assert!(evaluate("node_id == 'llm'", &ctx).unwrap());
        assert!(evaluate("step >= 4 && step < 5", &ctx).unwrap());
        assert!(evaluate("outputs.fetch.status == 200", &ctx).unwrap());
        assert!(evaluate("outputs[\"fetch\"].items[1] == \"b\"", &ctx).unwrap());
        assert!(evaluate("input.tokens[0] > -1", &ctx).unwrap());
        assert!(!evaluate("outputs.fetch.status != 200", &ctx).unwrap());
    }

    #[test]
    fn boolean_combinators_and_truthiness() {
        let ctx = ctx();
        assert!(evaluate("!last", &ctx).unwrap());
        assert!(evaluate("last || input.prompt", &ctx).unwrap());
        assert!(!evaluate("errors.fetch", &ctx).unwrap());
        assert!(evaluate("!(step == 1 || step == 2) && true", &ctx).unwrap());
        assert!(!evaluate("0", &ctx).unwrap());
        assert!(evaluate("outputs.missing.deeper == null", &ctx).unwrap());
    }

    #[test]
    fn unknown_root_is_an_error() {
        let err = evaluate("throw", &ctx()).unwrap_err();
        assert!(matches!(err, DebugError::ConditionEval(_)));
    }

    #[test]
    fn ordering_mismatched_types_is_an_error() {
        assert!(evaluate("node_id > 3", &ctx()).is_err());
    }

    #[test]
    fn syntax_errors_report_position() {
        match Condition::parse("step == ") {
            Err(DebugError::ConditionSyntax { position, .. }) => assert_eq!(position, 6),
            other => panic!("expected syntax error, got {other:?}"),
        }
        assert!(Condition::parse("a b").is_err());
        assert!(Condition::parse("'open").is_err());
        assert!(Condition::parse("x = 1").is_err());
        assert!(Condition::parse("items[1.5]").is_err());
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let src = format!("{}true{}", "(".repeat(200), ")".repeat(200));
        assert!(Condition::parse(&src).is_err());
        let bangs = format!("{}true", "!".repeat(200));
        assert!(Condition::parse(&bangs).is_err());
    }
}
