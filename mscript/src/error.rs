//! Semantic, link and runtime error types.

use mscript_parser::{ParseError, Span};
use thiserror::Error;

/// Error raised while checking, compiling or linking a program.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("undefined type '{name}' at {span}")]
    UndefinedType { name: String, span: Span },

    #[error("undefined function '{name}' at {span}")]
    UndefinedFunction { name: String, span: Span },

    #[error("undefined symbol '{name}' at {span}")]
    UndefinedSymbol { name: String, span: Span },

    #[error("'{name}' is not usable as a value at {span}")]
    InvalidSymbol { name: String, span: Span },

    #[error("redeclaration of '{name}' at {span}")]
    Redeclaration { name: String, span: Span },

    #[error("recursive struct '{name}' at {span}")]
    RecursiveStruct { name: String, span: Span },

    #[error("cannot cast {from} to {to} at {span}")]
    CannotCast {
        from: String,
        to: String,
        span: Span,
    },

    #[error("wrong number of arguments to '{name}': expected {expected}, got {got} at {span}")]
    WrongArgCount {
        name: String,
        expected: usize,
        got: usize,
        span: Span,
    },

    #[error("invalid member '{member}' on type {ty} at {span}")]
    WrongMemberName {
        member: String,
        ty: String,
        span: Span,
    },

    #[error("invalid lvalue at {span}")]
    InvalidLvalue { span: Span },

    #[error("not all paths return from function '{name}' at {span}")]
    NotAllPathsReturn { name: String, span: Span },

    #[error("unreachable statement at {span}")]
    UnreachableStatement { span: Span },

    #[error("initial value of global '{name}' must be constant at {span}")]
    NonConstGlobalInitializer { name: String, span: Span },

    #[error("cannot determine type of NULL at {span}")]
    CannotDetermineNullType { span: Span },

    #[error("cannot determine type of array literal at {span}")]
    CannotDetermineArrayType { span: Span },

    #[error("cannot determine type of object literal at {span}")]
    CannotDetermineObjectType { span: Span },

    #[error("cannot return a value from a void function at {span}")]
    ReturnInVoidFunction { span: Span },

    #[error("must return a value from a non-void function at {span}")]
    MissingReturnValue { span: Span },

    #[error("cannot find import '{name}' at {span}")]
    ImportNotFound { name: String, span: Span },

    #[error("failed to import '{name}' at {span}")]
    ImportFailed { name: String, span: Span },

    #[error("unresolved function '{name}' in link pass")]
    UnresolvedFunction { name: String },
}

impl CompileError {
    pub fn span(&self) -> Option<Span> {
        match self {
            CompileError::UndefinedType { span, .. }
            | CompileError::UndefinedFunction { span, .. }
            | CompileError::UndefinedSymbol { span, .. }
            | CompileError::InvalidSymbol { span, .. }
            | CompileError::Redeclaration { span, .. }
            | CompileError::RecursiveStruct { span, .. }
            | CompileError::CannotCast { span, .. }
            | CompileError::WrongArgCount { span, .. }
            | CompileError::WrongMemberName { span, .. }
            | CompileError::InvalidLvalue { span }
            | CompileError::NotAllPathsReturn { span, .. }
            | CompileError::UnreachableStatement { span }
            | CompileError::NonConstGlobalInitializer { span, .. }
            | CompileError::CannotDetermineNullType { span }
            | CompileError::CannotDetermineArrayType { span }
            | CompileError::CannotDetermineObjectType { span }
            | CompileError::ReturnInVoidFunction { span }
            | CompileError::MissingReturnValue { span }
            | CompileError::ImportNotFound { span, .. }
            | CompileError::ImportFailed { span, .. } => Some(*span),
            CompileError::UnresolvedFunction { .. } => None,
        }
    }
}

/// The first failure of a program's pipeline, parse or compile.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Compile(#[from] CompileError),
}

impl Error {
    pub fn span(&self) -> Option<Span> {
        match self {
            Error::Parse(e) => Some(e.span()),
            Error::Compile(e) => e.span(),
        }
    }
}

/// Runtime trap raised by the VM.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VmError {
    #[error("cannot create a VM from broken program '{name}'")]
    BrokenProgram { name: String },

    #[error("unknown function '{name}'")]
    UnknownFunction { name: String },

    #[error("wrong number of arguments to '{name}': expected {expected}, got {got}")]
    WrongArgCount {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("argument {index} does not match the declared parameter type")]
    InvalidArgument { index: usize },

    #[error("integer division by zero")]
    DivisionByZero,

    #[error("operand stack overflow")]
    StackOverflow,

    #[error("operand stack underflow")]
    StackUnderflow,

    #[error("array access out of bounds")]
    ArrayOutOfBounds,

    #[error("null array handle")]
    NullArrayHandle,

    #[error("access to a deleted array")]
    DeletedArrayAccess,

    #[error("native function '{name}' is not registered")]
    UnregisteredNative { name: String },

    #[error("native function '{name}' returned a value of the wrong size")]
    NativeReturnMismatch { name: String },

    #[error("execution cancelled")]
    Cancelled,

    #[error("instruction limit exceeded")]
    InstructionLimit,
}
