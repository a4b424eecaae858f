//! Rule language front end
//!
//! Turns policy source text into a [`PolicyDocument`] parse tree. The parser is
//! a pure function of its input: identical text always yields an identical
//! tree, and any malformed input is reported as a [`SyntaxError`] carrying the
//! line and column of the offending token.
//!
//! ```text
//! # operators may edit racks, nobody may delete them
//! DEFINE [ops] AS tag(operators) OR {$username_admin}
//! DENY IF {$op_del} AND attr(realm) == "rack"
//! ALLOW IF [ops]
//! ```
//!
//! [`SyntaxError`]: crate::error::SyntaxError

pub mod ast;
mod lexer;
mod parser;

pub use ast::{CmpOp, Expr, PolicyDocument, Statement, MAX_DEPTH};
pub use parser::parse;
