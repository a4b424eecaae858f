//! Recursive descent parser for the rule language
//!
//! Grammar (keywords are case-insensitive):
//!
//! ```text
//! document  = statement*
//! statement = "DEFINE" "[" name "]" "AS" expr
//!           | ("ALLOW" | "DENY") ["IF"] expr
//! expr      = and_expr ("OR" and_expr)*
//! and_expr  = unary ("AND" unary)*
//! unary     = "NOT" unary | primary
//! primary   = "(" expr ")" | "TRUE" | "FALSE"
//!           | "tag" "(" name ")" | "{" name "}"
//!           | "attr" "(" name ")" ("==" | "!=") value
//!           | "[" name "]"
//! value     = "string" | integer | "TRUE" | "FALSE"
//! ```
//!
//! `AND`/`OR` chains are folded into balanced trees. No parse tree is deeper
//! than [`MAX_DEPTH`]; deeper input is a syntax error.

use std::collections::HashSet;

use super::ast::{CmpOp, Expr, PolicyDocument, Statement, MAX_DEPTH};
use super::lexer::{tokenize, Token, TokenKind};
use crate::error::SyntaxError;
use crate::policy::PolicyEffect;
use crate::types::AttrValue;

/// Expression with the depth of its tree; a leaf has depth 1
type Node = (Expr, usize);

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    /// Predicates defined so far; references must point backwards
    defined: HashSet<String>,
    /// Open parentheses at the current position
    nesting: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str, tokens: Vec<Token>) -> Self {
        Self {
            source,
            tokens,
            pos: 0,
            defined: HashSet::new(),
            nesting: 0,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(
            self.peek(),
            Some(Token { kind: TokenKind::Word(w), .. }) if w.eq_ignore_ascii_case(keyword)
        )
    }

    /// Offset used for errors at the current position (end of input when exhausted)
    fn here(&self) -> usize {
        self.peek().map(|t| t.offset).unwrap_or(self.source.len())
    }

    fn error(&self, offset: usize, message: impl Into<String>) -> SyntaxError {
        SyntaxError::at(self.source, offset, message)
    }

    fn too_deep(&self, offset: usize) -> SyntaxError {
        self.error(offset, format!("expression nests deeper than {MAX_DEPTH} levels"))
    }

    fn bounded(&self, node: Node, offset: usize) -> Result<Node, SyntaxError> {
        if node.1 > MAX_DEPTH {
            Err(self.too_deep(offset))
        } else {
            Ok(node)
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), SyntaxError> {
        if self.peek_keyword(keyword) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(self.here(), format!("expected `{keyword}`")))
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<(), SyntaxError> {
        match self.peek() {
            Some(tok) if tok.kind == kind => {
                self.advance();
                Ok(())
            }
            _ => Err(self.error(self.here(), format!("expected {what}"))),
        }
    }

    fn parse_document(&mut self) -> Result<PolicyDocument, SyntaxError> {
        let mut statements = Vec::new();
        while self.peek().is_some() {
            statements.push(self.parse_statement()?);
        }
        Ok(PolicyDocument { statements })
    }

    fn parse_statement(&mut self) -> Result<Statement, SyntaxError> {
        let start = self.here();
        let line = self.source[..start].matches('\n').count() + 1;

        if self.peek_keyword("define") {
            self.advance();
            let name = match self.advance() {
                Some(Token {
                    kind: TokenKind::Bracket(name),
                    ..
                }) => name,
                _ => {
                    return Err(self.error(start, "expected `[name]` after DEFINE"));
                }
            };
            if self.defined.contains(&name) {
                return Err(self.error(start, format!("predicate [{name}] is already defined")));
            }
            self.expect_keyword("as")?;
            let (body, _) = self.parse_expr()?;
            self.defined.insert(name.clone());
            return Ok(Statement::Define { name, body, line });
        }

        let effect = if self.peek_keyword("allow") {
            PolicyEffect::Allow
        } else if self.peek_keyword("deny") {
            PolicyEffect::Deny
        } else {
            return Err(self.error(start, "expected ALLOW, DENY or DEFINE"));
        };
        self.advance();
        if self.peek_keyword("if") {
            self.advance();
        }
        let (condition, _) = self.parse_expr()?;
        Ok(Statement::Rule {
            effect,
            condition,
            line,
        })
    }

    /// expr = and_expr ("OR" and_expr)*
    fn parse_expr(&mut self) -> Result<Node, SyntaxError> {
        let start = self.here();
        let mut operands = vec![self.parse_and()?];
        while self.peek_keyword("or") {
            self.advance();
            operands.push(self.parse_and()?);
        }
        let node = balance(operands, Expr::Or)
            .ok_or_else(|| self.error(start, "expected an expression"))?;
        self.bounded(node, start)
    }

    /// and_expr = unary ("AND" unary)*
    fn parse_and(&mut self) -> Result<Node, SyntaxError> {
        let start = self.here();
        let mut operands = vec![self.parse_unary()?];
        while self.peek_keyword("and") {
            self.advance();
            operands.push(self.parse_unary()?);
        }
        let node = balance(operands, Expr::And)
            .ok_or_else(|| self.error(start, "expected an expression"))?;
        self.bounded(node, start)
    }

    /// unary = "NOT" unary | primary
    fn parse_unary(&mut self) -> Result<Node, SyntaxError> {
        let start = self.here();
        let mut negations = 0;
        while self.peek_keyword("not") {
            self.advance();
            negations += 1;
            if negations >= MAX_DEPTH {
                return Err(self.too_deep(start));
            }
        }

        let (mut expr, mut depth) = self.parse_primary()?;
        for _ in 0..negations {
            expr = Expr::Not(Box::new(expr));
            depth += 1;
        }
        self.bounded((expr, depth), start)
    }

    fn parse_primary(&mut self) -> Result<Node, SyntaxError> {
        let offset = self.here();
        if self.peek().map(|t| &t.kind) == Some(&TokenKind::LParen) {
            if self.nesting >= MAX_DEPTH {
                return Err(self.too_deep(offset));
            }
            self.advance();
            self.nesting += 1;
            let node = self.parse_expr()?;
            self.nesting -= 1;
            self.expect(TokenKind::RParen, "closing parenthesis `)`")?;
            return Ok(node);
        }
        self.parse_leaf().map(|expr| (expr, 1))
    }

    fn parse_leaf(&mut self) -> Result<Expr, SyntaxError> {
        let offset = self.here();
        let Some(tok) = self.advance() else {
            return Err(self.error(offset, "unexpected end of input, expected an expression"));
        };

        match tok.kind {
            TokenKind::Brace(name) => Ok(Expr::Tag(name)),
            TokenKind::Bracket(name) => {
                if self.defined.contains(&name) {
                    Ok(Expr::PredicateRef(name))
                } else {
                    Err(self.error(offset, format!("unknown predicate [{name}]")))
                }
            }
            TokenKind::Word(word) => {
                let lower = word.to_ascii_lowercase();
                match lower.as_str() {
                    "true" => Ok(Expr::Literal(true)),
                    "false" => Ok(Expr::Literal(false)),
                    "tag" if self.peek().map(|t| &t.kind) == Some(&TokenKind::LParen) => {
                        let name = self.parse_call_argument()?;
                        Ok(Expr::Tag(name))
                    }
                    "attr" if self.peek().map(|t| &t.kind) == Some(&TokenKind::LParen) => {
                        let name = self.parse_call_argument()?;
                        let op = match self.advance() {
                            Some(Token {
                                kind: TokenKind::Eq,
                                ..
                            }) => CmpOp::Eq,
                            Some(Token {
                                kind: TokenKind::Ne,
                                ..
                            }) => CmpOp::Ne,
                            _ => {
                                return Err(self.error(
                                    offset,
                                    format!("attr({name}) must be followed by `==` or `!=`"),
                                ));
                            }
                        };
                        let value = self.parse_value()?;
                        Ok(Expr::Attribute { name, op, value })
                    }
                    _ if self.peek().map(|t| &t.kind) == Some(&TokenKind::LParen) => {
                        Err(self.error(offset, format!("unknown predicate `{word}`")))
                    }
                    _ => Err(self.error(offset, format!("unexpected word `{word}`"))),
                }
            }
            other => Err(self.error(offset, format!("unexpected token {}", describe(&other)))),
        }
    }

    /// "(" name ")" where name is a bare word or a quoted string
    fn parse_call_argument(&mut self) -> Result<String, SyntaxError> {
        self.expect(TokenKind::LParen, "`(`")?;
        let offset = self.here();
        let name = match self.advance() {
            Some(Token {
                kind: TokenKind::Word(w) | TokenKind::Str(w),
                ..
            }) if !w.is_empty() => w,
            _ => return Err(self.error(offset, "expected a name")),
        };
        self.expect(TokenKind::RParen, "closing parenthesis `)`")?;
        Ok(name)
    }

    fn parse_value(&mut self) -> Result<AttrValue, SyntaxError> {
        let offset = self.here();
        match self.advance() {
            Some(Token {
                kind: TokenKind::Str(s),
                ..
            }) => Ok(AttrValue::Str(s)),
            Some(Token {
                kind: TokenKind::Word(w),
                ..
            }) => {
                if let Ok(n) = w.parse::<i64>() {
                    Ok(AttrValue::Int(n))
                } else if w.eq_ignore_ascii_case("true") {
                    Ok(AttrValue::Bool(true))
                } else if w.eq_ignore_ascii_case("false") {
                    Ok(AttrValue::Bool(false))
                } else {
                    Err(self.error(
                        offset,
                        format!("expected a string literal, integer or boolean, found `{w}`"),
                    ))
                }
            }
            _ => Err(self.error(offset, "expected a string literal, integer or boolean")),
        }
    }
}

/// Join operands into a balanced tree, keeping their left-to-right order
fn balance(
    mut operands: Vec<Node>,
    join: fn(Box<Expr>, Box<Expr>) -> Expr,
) -> Option<Node> {
    if operands.len() <= 1 {
        return operands.pop();
    }
    let right = operands.split_off(operands.len() / 2);
    let (left, left_depth) = balance(operands, join)?;
    let (right, right_depth) = balance(right, join)?;
    Some((
        join(Box::new(left), Box::new(right)),
        left_depth.max(right_depth) + 1,
    ))
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Word(w) => format!("`{w}`"),
        TokenKind::Str(s) => format!("\"{s}\""),
        TokenKind::Brace(n) => format!("{{{n}}}"),
        TokenKind::Bracket(n) => format!("[{n}]"),
        TokenKind::LParen => "`(`".into(),
        TokenKind::RParen => "`)`".into(),
        TokenKind::Eq => "`==`".into(),
        TokenKind::Ne => "`!=`".into(),
    }
}

/// Parse rule source text into a parse tree.
pub fn parse(source: &str) -> Result<PolicyDocument, SyntaxError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(source, tokens);
    parser.parse_document()
}
