//! Front end for the mscript gameplay scripting language.
//!
//! This crate turns source text into tokens and an arena-allocated AST. It
//! performs no symbol resolution or type checking; those live downstream in
//! the `mscript` crate, which annotates the AST produced here.

// Library code must not write to stderr; errors are returned as values.
#![deny(clippy::print_stderr)]

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod pretty;
pub mod span;
pub mod token;

pub use ast::{
    Ast, BinaryOp, Expr, ExprId, ExprKind, FunctionStmt, ImportFunctionStmt, ParsedProgram,
    ParsedType, Stmt, StmtId, StmtKind, UnaryOp,
};
pub use error::{ParseError, ParseResult};
pub use lexer::tokenize;
pub use parser::parse;
pub use pretty::pretty;
pub use span::{SourceMap, Span};
pub use token::{SpannedToken, Tok};
