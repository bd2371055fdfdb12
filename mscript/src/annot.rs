//! Checker annotations, stored in side tables keyed by expression id.
//!
//! The checker records each expression's result type, folded constant,
//! l-value descriptor, and implicit cast target here instead of rewriting
//! the tree; the compiler reads the same tables. An expression's effective
//! type is its cast target when one was inserted, otherwise its result type.

use mscript_parser::ExprId;

use crate::types::TypeId;
use crate::value::Val;

/// Where a writable expression lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lvalue {
    #[default]
    Invalid,
    /// Frame-relative byte offset (negative for arguments)
    Local(i32),
    /// Byte offset into the globals section
    Global(i32),
    /// Handle and byte offset are on the stack
    Array,
}

#[derive(Debug, Default)]
pub struct ExprMeta {
    ty: Vec<Option<TypeId>>,
    cast: Vec<Option<TypeId>>,
    constv: Vec<Option<Val>>,
    lvalue: Vec<Lvalue>,
}

impl ExprMeta {
    pub fn new(expr_count: usize) -> Self {
        Self {
            ty: vec![None; expr_count],
            cast: vec![None; expr_count],
            constv: vec![None; expr_count],
            lvalue: vec![Lvalue::Invalid; expr_count],
        }
    }

    /// Result type before any inserted cast. Panics if the checker has not
    /// visited the expression; every surviving expression has a type.
    pub fn ty(&self, e: ExprId) -> TypeId {
        self.ty[e.index()].unwrap_or_else(|| panic!("expression {:?} has no type", e))
    }

    pub fn set_ty(&mut self, e: ExprId, ty: TypeId) {
        self.ty[e.index()] = Some(ty);
    }

    /// The type the rest of the tree observes: the cast target if an
    /// implicit cast was inserted, otherwise the result type.
    pub fn effective_ty(&self, e: ExprId) -> TypeId {
        self.cast[e.index()].unwrap_or_else(|| self.ty(e))
    }

    pub fn cast(&self, e: ExprId) -> Option<TypeId> {
        self.cast[e.index()]
    }

    pub fn set_cast(&mut self, e: ExprId, ty: TypeId) {
        self.cast[e.index()] = Some(ty);
    }

    pub fn constv(&self, e: ExprId) -> Option<&Val> {
        self.constv[e.index()].as_ref()
    }

    pub fn set_const(&mut self, e: ExprId, value: Val) {
        self.constv[e.index()] = Some(value);
    }

    pub fn clear_const(&mut self, e: ExprId) {
        self.constv[e.index()] = None;
    }

    pub fn lvalue(&self, e: ExprId) -> Lvalue {
        self.lvalue[e.index()]
    }

    pub fn set_lvalue(&mut self, e: ExprId, lvalue: Lvalue) {
        self.lvalue[e.index()] = lvalue;
    }
}
