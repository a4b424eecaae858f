//! Parse tree produced by the rule language parser

use crate::policy::PolicyEffect;
use crate::types::AttrValue;
use serde::{Deserialize, Serialize};

/// Deepest expression tree accepted anywhere, counting a leaf as depth 1
pub const MAX_DEPTH: usize = 128;

/// Scalar comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
}

impl CmpOp {
    /// Operator as written in rule source
    pub fn symbol(&self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
        }
    }
}

/// Boolean expression node
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Both operands must hold
    And(Box<Expr>, Box<Expr>),
    /// Either operand must hold
    Or(Box<Expr>, Box<Expr>),
    /// Negation
    Not(Box<Expr>),
    /// Tag membership of the evaluated context
    Tag(String),
    /// Scalar comparison against a target attribute
    Attribute {
        name: String,
        op: CmpOp,
        value: AttrValue,
    },
    /// Constant
    Literal(bool),
    /// Reference to a predicate introduced with `DEFINE`
    PredicateRef(String),
}

/// Top-level declaration
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `DEFINE [name] AS expr`
    Define { name: String, body: Expr, line: usize },
    /// `ALLOW IF expr` / `DENY IF expr`
    Rule {
        effect: PolicyEffect,
        condition: Expr,
        line: usize,
    },
}

/// Whole parsed rule source, statements in declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyDocument {
    pub statements: Vec<Statement>,
}

impl PolicyDocument {
    /// Number of `ALLOW`/`DENY` rules
    pub fn rule_count(&self) -> usize {
        self.statements
            .iter()
            .filter(|s| matches!(s, Statement::Rule { .. }))
            .count()
    }
}
