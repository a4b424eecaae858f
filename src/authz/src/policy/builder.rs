//! Predicate table builder
//!
//! Lowers a [`PolicyDocument`] into a [`CompiledPolicyTable`]:
//!
//! 1. each `DEFINE`d predicate is compiled once, in declaration order, into
//!    the table's predicate list and referenced by position
//! 2. nested `AND`/`OR` chains are flattened into n-ary nodes
//! 3. constants are folded and double negations removed
//!
//! Predicates whose body is a single leaf are copied into the referencing
//! condition instead, which keeps constant folding working across them.
//!
//! The builder never looks at runtime data (tag sets, attributes), which
//! makes the output a deterministic function of the parse tree.

use std::collections::HashMap;

use tracing::debug;

use super::table::{CompiledExpr, CompiledPolicyTable, CompiledPredicate, CompiledRule};
use super::RuleSource;
use crate::error::{AuthzError, Result};
use crate::rackcode::{self, Expr, PolicyDocument, Statement};

/// Compiles parse trees into predicate tables
#[derive(Debug, Default)]
pub struct PredicateTableBuilder {
    /// Position in `predicates` of every name defined so far
    index: HashMap<String, u32>,
    predicates: Vec<CompiledPredicate>,
}

impl PredicateTableBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the table for `document`
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::InternalCompile`] if a predicate reference cannot
    /// be resolved. The parser rejects such input, so this indicates a parse
    /// tree that did not come from the parser.
    pub fn build(
        mut self,
        document: &PolicyDocument,
        schema_version: &str,
    ) -> Result<CompiledPolicyTable> {
        let mut entries = Vec::with_capacity(document.rule_count());

        for statement in &document.statements {
            match statement {
                Statement::Define { name, body, .. } => {
                    if self.index.contains_key(name) {
                        return Err(AuthzError::InternalCompile(format!(
                            "predicate [{name}] defined twice"
                        )));
                    }
                    let condition = self.lower(body)?;
                    let position = u32::try_from(self.predicates.len()).map_err(|_| {
                        AuthzError::InternalCompile("too many predicates".to_string())
                    })?;
                    self.index.insert(name.clone(), position);
                    self.predicates.push(CompiledPredicate {
                        name: name.clone(),
                        condition,
                    });
                }
                Statement::Rule {
                    effect,
                    condition,
                    line,
                } => {
                    let condition = self.lower(condition)?;
                    let declaration_order = u32::try_from(entries.len() + 1).map_err(|_| {
                        AuthzError::InternalCompile("too many rules".to_string())
                    })?;
                    entries.push(CompiledRule {
                        condition,
                        decision: *effect,
                        declaration_order,
                        line: u32::try_from(*line).unwrap_or(u32::MAX),
                    });
                }
            }
        }

        debug!(
            rules = entries.len(),
            predicates = self.predicates.len(),
            "Built predicate table"
        );

        Ok(CompiledPolicyTable {
            schema_version: schema_version.to_string(),
            predicates: self.predicates,
            entries,
        })
    }

    fn lower(&self, expr: &Expr) -> Result<CompiledExpr> {
        Ok(match expr {
            Expr::And(left, right) => all(vec![self.lower(left)?, self.lower(right)?]),
            Expr::Or(left, right) => any(vec![self.lower(left)?, self.lower(right)?]),
            Expr::Not(inner) => negate(self.lower(inner)?),
            Expr::Tag(name) => CompiledExpr::Tag(name.clone()),
            Expr::Attribute { name, op, value } => CompiledExpr::Attribute {
                name: name.clone(),
                op: *op,
                value: value.clone(),
            },
            Expr::Literal(b) => CompiledExpr::Const(*b),
            Expr::PredicateRef(name) => self.reference(name)?,
        })
    }

    fn reference(&self, name: &str) -> Result<CompiledExpr> {
        let position = self.index.get(name).copied().ok_or_else(|| {
            AuthzError::InternalCompile(format!("unresolved predicate reference [{name}]"))
        })?;
        let body = self
            .predicates
            .get(position as usize)
            .map(|p| &p.condition)
            .ok_or_else(|| {
                AuthzError::InternalCompile(format!("predicate [{name}] has no body"))
            })?;

        Ok(match body {
            CompiledExpr::Tag(_)
            | CompiledExpr::Attribute { .. }
            | CompiledExpr::Const(_)
            | CompiledExpr::Predicate(_) => body.clone(),
            _ => CompiledExpr::Predicate(position),
        })
    }
}

fn all(items: Vec<CompiledExpr>) -> CompiledExpr {
    let mut flat = Vec::with_capacity(items.len());
    for item in items {
        match item {
            CompiledExpr::All(inner) => flat.extend(inner),
            CompiledExpr::Const(true) => {}
            CompiledExpr::Const(false) => return CompiledExpr::Const(false),
            other => flat.push(other),
        }
    }
    match flat.len() {
        0 => CompiledExpr::Const(true),
        1 => flat.remove(0),
        _ => CompiledExpr::All(flat),
    }
}

fn any(items: Vec<CompiledExpr>) -> CompiledExpr {
    let mut flat = Vec::with_capacity(items.len());
    for item in items {
        match item {
            CompiledExpr::Any(inner) => flat.extend(inner),
            CompiledExpr::Const(false) => {}
            CompiledExpr::Const(true) => return CompiledExpr::Const(true),
            other => flat.push(other),
        }
    }
    match flat.len() {
        0 => CompiledExpr::Const(false),
        1 => flat.remove(0),
        _ => CompiledExpr::Any(flat),
    }
}

fn negate(expr: CompiledExpr) -> CompiledExpr {
    match expr {
        CompiledExpr::Const(b) => CompiledExpr::Const(!b),
        CompiledExpr::Not(inner) => *inner,
        other => CompiledExpr::Not(Box::new(other)),
    }
}

/// Parse and compile rule source in one step
pub fn compile(source: &RuleSource) -> Result<CompiledPolicyTable> {
    let document = rackcode::parse(&source.text)?;
    PredicateTableBuilder::new().build(&document, &source.schema_version)
}
