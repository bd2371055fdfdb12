//! Type checker / semantic pass.
//!
//! Runs once per function body with an expected-type context threaded down
//! the tree. Resolves symbols, fills in result types, inserts implicit
//! numeric casts, folds constants, and computes l-value descriptors; all
//! annotations land in [`ExprMeta`] side tables keyed by expression id.
//! Control-flow analysis rejects non-void functions with a path that does
//! not return and statements after a return.

mod expr;

use mscript_parser::{Ast, ExprId, FunctionStmt, Span, StmtId, StmtKind};

use crate::annot::ExprMeta;
use crate::decl::{FnStore, FuncId, GlobalId, GlobalStore, NativeDecl};
use crate::error::CompileError;
use crate::symbol::SymbolTable;
use crate::types::{TypeKind, TypeStore};
use crate::value::Val;

pub(crate) type CheckResult<T> = Result<T, CompileError>;

/// Borrowed view of everything one checking pass needs.
pub(crate) struct FnCtx<'a> {
    pub types: &'a TypeStore,
    pub fns: &'a mut FnStore,
    pub globals: &'a GlobalStore,
    pub natives: &'a [NativeDecl],
    pub syms: &'a mut SymbolTable,
    pub ast: &'a Ast,
    pub meta: &'a mut ExprMeta,
    pub cur_fn: Option<FuncId>,
}

impl<'a> FnCtx<'a> {
    /// Check one function body and record its frame size on the decl.
    pub fn check_function(
        &mut self,
        fid: FuncId,
        stmt: &FunctionStmt,
        span: Span,
    ) -> CheckResult<()> {
        self.syms.push_block();
        self.cur_fn = Some(fid);

        let params = self.fns.get(fid).params.clone();
        for param in &params {
            let size = self.types.size(param.ty);
            self.syms.add_local(&param.name, param.ty, size);
        }

        let result = self.check_function_body(fid, stmt, span);
        if result.is_ok() {
            self.fns.get_mut(fid).block_size = self.syms.frame_peak();
        }

        self.cur_fn = None;
        self.syms.pop_block();
        result
    }

    fn check_function_body(
        &mut self,
        fid: FuncId,
        stmt: &FunctionStmt,
        span: Span,
    ) -> CheckResult<()> {
        let returns = self.check_stmt(stmt.body)?;

        let is_void = match self.fns.get(fid).return_ty {
            Some(ty) => self.types.kind(ty) == TypeKind::Void,
            None => true,
        };
        if !returns && !is_void {
            return Err(CompileError::NotAllPathsReturn {
                name: stmt.name.clone(),
                span,
            });
        }
        Ok(())
    }

    /// Check a global initializer: it must fold to a constant of the
    /// declared type.
    pub fn check_global_init(
        &mut self,
        gid: GlobalId,
        init: ExprId,
        name: &str,
    ) -> CheckResult<Val> {
        let ast = self.ast;
        let span = ast.expr(init).span;

        let ty = match self.globals.get(gid).ty {
            Some(ty) => ty,
            None => {
                return Err(CompileError::UndefinedType {
                    name: name.to_string(),
                    span,
                });
            }
        };

        self.check_expr_cast(init, ty)?;
        match self.meta.constv(init) {
            Some(value) => Ok(value.clone()),
            None => Err(CompileError::NonConstGlobalInitializer {
                name: name.to_string(),
                span,
            }),
        }
    }

    /// Returns whether every path through the statement returns.
    fn check_stmt(&mut self, id: StmtId) -> CheckResult<bool> {
        let ast = self.ast;
        let stmt = ast.stmt(id);
        match &stmt.kind {
            StmtKind::If {
                conds,
                bodies,
                else_body,
            } => self.check_if_stmt(conds, bodies, *else_body),
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => self.check_for_stmt(*init, *cond, *step, *body),
            StmtKind::Return(expr) => self.check_return_stmt(*expr, stmt.span),
            StmtKind::Block(stmts) => self.check_block_stmt(stmts),
            StmtKind::Expr(expr) => {
                self.check_expr(*expr, None)?;
                Ok(false)
            }
            StmtKind::VarDecl { ty, name, assign } => {
                self.check_var_decl_stmt(ty, name, *assign, stmt.span)
            }
            _ => unreachable!("declaration statement inside a function body"),
        }
    }

    fn check_if_stmt(
        &mut self,
        conds: &[ExprId],
        bodies: &[StmtId],
        else_body: Option<StmtId>,
    ) -> CheckResult<bool> {
        let bool_ty = self.types.builtins().bool_;
        let mut all_return = true;

        for (&cond, &body) in conds.iter().zip(bodies) {
            self.check_expr_cast(cond, bool_ty)?;
            if !self.check_stmt(body)? {
                all_return = false;
            }
        }

        match else_body {
            Some(body) => {
                if !self.check_stmt(body)? {
                    all_return = false;
                }
            }
            None => all_return = false,
        }
        Ok(all_return)
    }

    fn check_for_stmt(
        &mut self,
        init: ExprId,
        cond: ExprId,
        step: ExprId,
        body: StmtId,
    ) -> CheckResult<bool> {
        let bool_ty = self.types.builtins().bool_;
        self.check_expr(init, None)?;
        self.check_expr_cast(cond, bool_ty)?;
        self.check_expr(step, None)?;
        self.check_stmt(body)
    }

    fn check_return_stmt(&mut self, expr: Option<ExprId>, span: Span) -> CheckResult<bool> {
        let return_ty = self
            .cur_fn
            .and_then(|fid| self.fns.get(fid).return_ty)
            .unwrap_or(self.types.builtins().void);

        if self.types.kind(return_ty) == TypeKind::Void {
            if expr.is_some() {
                return Err(CompileError::ReturnInVoidFunction { span });
            }
        } else {
            match expr {
                Some(expr) => self.check_expr_cast(expr, return_ty)?,
                None => return Err(CompileError::MissingReturnValue { span }),
            }
        }
        Ok(true)
    }

    fn check_block_stmt(&mut self, stmts: &[StmtId]) -> CheckResult<bool> {
        self.syms.push_block();
        let result = self.check_block_body(stmts);
        self.syms.pop_block();
        result
    }

    fn check_block_body(&mut self, stmts: &[StmtId]) -> CheckResult<bool> {
        let ast = self.ast;
        let mut returns = false;
        for (i, &stmt) in stmts.iter().enumerate() {
            if self.check_stmt(stmt)? {
                returns = true;
                if i + 1 < stmts.len() {
                    return Err(CompileError::UnreachableStatement {
                        span: ast.stmt(stmts[i + 1]).span,
                    });
                }
            }
        }
        Ok(returns)
    }

    fn check_var_decl_stmt(
        &mut self,
        ty: &mscript_parser::ParsedType,
        name: &str,
        assign: Option<ExprId>,
        span: Span,
    ) -> CheckResult<bool> {
        let tid = self
            .syms
            .get_type(&ty.key())
            .ok_or_else(|| CompileError::UndefinedType {
                name: ty.key(),
                span,
            })?;

        if self.syms.get(name).is_some() {
            return Err(CompileError::Redeclaration {
                name: name.to_string(),
                span,
            });
        }

        let size = self.types.size(tid);
        self.syms.add_local(name, tid, size);

        if let Some(assign) = assign {
            self.check_expr(assign, None)?;
        }
        Ok(false)
    }
}
