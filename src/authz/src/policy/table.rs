//! Compiled, evaluable form of a policy
//!
//! Conditions are stored in the cache as a flat postfix list of
//! operations, so decoding never recurses and rejects anything nested deeper
//! than [`MAX_DEPTH`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use super::PolicyEffect;
use crate::rackcode::{CmpOp, MAX_DEPTH};
use crate::types::AttrValue;

/// Evaluable condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "Postfix", try_from = "Postfix")]
pub enum CompiledExpr {
    /// Every member must hold (short-circuits on the first false)
    All(Vec<CompiledExpr>),
    /// At least one member must hold (short-circuits on the first true)
    Any(Vec<CompiledExpr>),
    /// Negation
    Not(Box<CompiledExpr>),
    /// Tag membership
    Tag(String),
    /// Scalar comparison against a target attribute
    Attribute {
        name: String,
        op: CmpOp,
        value: AttrValue,
    },
    /// Constant
    Const(bool),
    /// Entry of the table's predicate list, by position
    Predicate(u32),
}

/// Facts a condition is evaluated against
#[derive(Debug, Clone, Copy)]
pub struct EvalInput<'a> {
    /// Effective tag names of subject, target and operation
    pub tags: &'a HashSet<String>,

    /// Target entity attributes
    pub attributes: &'a BTreeMap<String, AttrValue>,
}

/// One evaluation pass. Predicate results are remembered for the rest of
/// the pass, so every predicate body runs at most once per request.
struct Evaluation<'t, 'a> {
    predicates: &'t [CompiledPredicate],
    input: &'t EvalInput<'a>,
    results: Vec<bool>,
    filling: bool,
}

impl<'t, 'a> Evaluation<'t, 'a> {
    fn new(predicates: &'t [CompiledPredicate], input: &'t EvalInput<'a>) -> Self {
        Self {
            predicates,
            input,
            results: Vec::new(),
            filling: false,
        }
    }

    fn eval(&mut self, expr: &CompiledExpr) -> bool {
        match expr {
            CompiledExpr::All(items) => items.iter().all(|e| self.eval(e)),
            CompiledExpr::Any(items) => items.iter().any(|e| self.eval(e)),
            CompiledExpr::Not(inner) => !self.eval(inner),
            CompiledExpr::Tag(name) => self.input.tags.contains(name),
            CompiledExpr::Attribute { name, op, value } => {
                let actual = self.input.attributes.get(name);
                match op {
                    CmpOp::Eq => actual == Some(value),
                    CmpOp::Ne => actual != Some(value),
                }
            }
            CompiledExpr::Const(b) => *b,
            CompiledExpr::Predicate(index) => self.predicate(*index as usize),
        }
    }

    /// Predicate bodies only refer to earlier predicates, so results are
    /// filled in order up to `index` and no body evaluation nests another.
    fn predicate(&mut self, index: usize) -> bool {
        if let Some(&known) = self.results.get(index) {
            return known;
        }
        if self.filling || index >= self.predicates.len() {
            return false;
        }

        self.filling = true;
        let predicates = self.predicates;
        while self.results.len() <= index {
            let value = self.eval(&predicates[self.results.len()].condition);
            self.results.push(value);
        }
        self.filling = false;
        self.results[index]
    }
}

impl CompiledExpr {
    /// Evaluate against the given facts
    ///
    /// Predicate references cannot be resolved without their table and
    /// evaluate to false; use [`CompiledPolicyTable::first_match`] for
    /// conditions that carry them.
    pub fn evaluate(&self, input: &EvalInput<'_>) -> bool {
        Evaluation::new(&[], input).eval(self)
    }

    /// Tag names referenced directly by the expression
    pub fn referenced_tags(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_tags(&mut out);
        out
    }

    fn collect_tags<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            CompiledExpr::All(items) | CompiledExpr::Any(items) => {
                for item in items {
                    item.collect_tags(out);
                }
            }
            CompiledExpr::Not(inner) => inner.collect_tags(out),
            CompiledExpr::Tag(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            CompiledExpr::Attribute { .. }
            | CompiledExpr::Const(_)
            | CompiledExpr::Predicate(_) => {}
        }
    }

    /// Check that every predicate reference is below `bound`
    fn check_references(&self, bound: usize) -> Result<(), String> {
        match self {
            CompiledExpr::All(items) | CompiledExpr::Any(items) => {
                items.iter().try_for_each(|item| item.check_references(bound))
            }
            CompiledExpr::Not(inner) => inner.check_references(bound),
            CompiledExpr::Predicate(index) if *index as usize >= bound => {
                Err(format!("predicate reference #{index} out of range"))
            }
            _ => Ok(()),
        }
    }

    /// Display with predicate references shown by name
    pub fn named<'a>(&'a self, predicates: &'a [CompiledPredicate]) -> impl fmt::Display + 'a {
        Named {
            expr: self,
            predicates,
        }
    }
}

struct Named<'a> {
    expr: &'a CompiledExpr,
    predicates: &'a [CompiledPredicate],
}

impl fmt::Display for Named<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.expr {
            CompiledExpr::All(items) | CompiledExpr::Any(items) => {
                let joiner = if matches!(self.expr, CompiledExpr::All(_)) {
                    " AND "
                } else {
                    " OR "
                };
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, "{joiner}")?;
                    }
                    write!(f, "{}", item.named(self.predicates))?;
                }
                write!(f, ")")
            }
            CompiledExpr::Not(inner) => write!(f, "NOT {}", inner.named(self.predicates)),
            CompiledExpr::Tag(name) => write!(f, "{{{name}}}"),
            CompiledExpr::Attribute { name, op, value } => {
                write!(f, "attr({name}) {} {value}", op.symbol())
            }
            CompiledExpr::Const(true) => write!(f, "TRUE"),
            CompiledExpr::Const(false) => write!(f, "FALSE"),
            CompiledExpr::Predicate(index) => match self.predicates.get(*index as usize) {
                Some(predicate) => write!(f, "[{}]", predicate.name),
                None => write!(f, "[#{index}]"),
            },
        }
    }
}

impl fmt::Display for CompiledExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.named(&[]))
    }
}

/// Postfix operation of the serialized form
#[derive(Serialize, Deserialize)]
enum Op {
    All(u32),
    Any(u32),
    Not,
    Tag(String),
    Attribute {
        name: String,
        op: CmpOp,
        value: AttrValue,
    },
    Const(bool),
    Predicate(u32),
}

#[derive(Serialize, Deserialize)]
struct Postfix(Vec<Op>);

impl From<CompiledExpr> for Postfix {
    fn from(expr: CompiledExpr) -> Self {
        fn push(expr: CompiledExpr, ops: &mut Vec<Op>) {
            match expr {
                CompiledExpr::All(items) => {
                    let n = u32::try_from(items.len()).unwrap_or(u32::MAX);
                    items.into_iter().for_each(|item| push(item, ops));
                    ops.push(Op::All(n));
                }
                CompiledExpr::Any(items) => {
                    let n = u32::try_from(items.len()).unwrap_or(u32::MAX);
                    items.into_iter().for_each(|item| push(item, ops));
                    ops.push(Op::Any(n));
                }
                CompiledExpr::Not(inner) => {
                    push(*inner, ops);
                    ops.push(Op::Not);
                }
                CompiledExpr::Tag(name) => ops.push(Op::Tag(name)),
                CompiledExpr::Attribute { name, op, value } => {
                    ops.push(Op::Attribute { name, op, value })
                }
                CompiledExpr::Const(b) => ops.push(Op::Const(b)),
                CompiledExpr::Predicate(index) => ops.push(Op::Predicate(index)),
            }
        }

        let mut ops = Vec::new();
        push(expr, &mut ops);
        Postfix(ops)
    }
}

impl TryFrom<Postfix> for CompiledExpr {
    type Error = String;

    fn try_from(postfix: Postfix) -> Result<Self, Self::Error> {
        // (node, depth) pairs; a leaf has depth 1
        let mut stack: Vec<(CompiledExpr, usize)> = Vec::new();

        for op in postfix.0 {
            let node = match op {
                Op::Not => {
                    let (inner, depth) = stack.pop().ok_or("NOT without operand")?;
                    (CompiledExpr::Not(Box::new(inner)), depth + 1)
                }
                Op::All(n) | Op::Any(n) => {
                    let n = n as usize;
                    if n > stack.len() {
                        return Err(format!(
                            "connective over {n} operands, {} available",
                            stack.len()
                        ));
                    }
                    let members = stack.split_off(stack.len() - n);
                    let depth = members.iter().map(|(_, d)| *d).max().unwrap_or(0) + 1;
                    let items = members.into_iter().map(|(e, _)| e).collect();
                    let expr = if matches!(op, Op::All(_)) {
                        CompiledExpr::All(items)
                    } else {
                        CompiledExpr::Any(items)
                    };
                    (expr, depth)
                }
                Op::Tag(name) => (CompiledExpr::Tag(name), 1),
                Op::Attribute { name, op, value } => {
                    (CompiledExpr::Attribute { name, op, value }, 1)
                }
                Op::Const(b) => (CompiledExpr::Const(b), 1),
                Op::Predicate(index) => (CompiledExpr::Predicate(index), 1),
            };
            if node.1 > MAX_DEPTH {
                return Err(format!("expression nests deeper than {MAX_DEPTH} levels"));
            }
            stack.push(node);
        }

        match (stack.pop(), stack.is_empty()) {
            (Some((expr, _)), true) => Ok(expr),
            _ => Err("postfix expression does not reduce to one condition".to_string()),
        }
    }
}

/// Named predicate compiled once and shared by every reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledPredicate {
    /// Name given in `DEFINE [name]`
    pub name: String,

    /// Body; refers only to earlier predicates
    pub condition: CompiledExpr,
}

/// Single compiled rule entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledRule {
    /// Condition under which the rule applies
    pub condition: CompiledExpr,

    /// Effect when the condition holds
    pub decision: PolicyEffect,

    /// 1-based position among the rules of the source
    pub declaration_order: u32,

    /// Source line the rule starts on
    pub line: u32,
}

/// Ordered, immutable predicate table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompiledPolicyTable {
    /// Schema version of the rule source this table was built from
    pub schema_version: String,

    /// Predicates in definition order
    pub predicates: Vec<CompiledPredicate>,

    /// Rules in declaration order
    pub entries: Vec<CompiledRule>,
}

impl CompiledPolicyTable {
    /// Number of rule entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no rules (everything is denied)
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First entry whose condition holds, in declaration order
    pub fn first_match(&self, input: &EvalInput<'_>) -> Option<&CompiledRule> {
        let mut evaluation = Evaluation::new(&self.predicates, input);
        self.entries
            .iter()
            .find(|rule| evaluation.eval(&rule.condition))
    }

    /// Render a condition of this table with predicate names
    pub fn describe(&self, expr: &CompiledExpr) -> String {
        expr.named(&self.predicates).to_string()
    }

    /// Check that predicates only refer backwards and rules only to
    /// existing predicates
    pub fn check_references(&self) -> Result<(), String> {
        for (i, predicate) in self.predicates.iter().enumerate() {
            predicate
                .condition
                .check_references(i)
                .map_err(|e| format!("predicate [{}]: {e}", predicate.name))?;
        }
        for rule in &self.entries {
            rule.condition
                .check_references(self.predicates.len())
                .map_err(|e| format!("rule #{}: {e}", rule.declaration_order))?;
        }
        Ok(())
    }
}
