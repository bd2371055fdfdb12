//! Expression checking: symbol resolution, the binary operator table,
//! implicit casts and constant folding.

use std::collections::HashMap;

use mscript_parser::{BinaryOp, ExprId, ExprKind, Span, UnaryOp};
use once_cell::sync::Lazy;

use crate::annot::Lvalue;
use crate::check::{CheckResult, FnCtx};
use crate::error::CompileError;
use crate::symbol::Symbol;
use crate::types::{TypeId, TypeKind};
use crate::value::Val;

/// Coarse type class used to key the operator table. All enums compare
/// alike; all arrays act alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Tag {
    Void,
    VoidStar,
    Int,
    Float,
    Bool,
    Vec3,
    CharStar,
    Enum,
    Struct,
    Array,
}

/// One entry of the operator table: the result type plus the type each
/// operand is promoted to. An empty name keeps the operand's own type.
struct BinRule {
    result: &'static str,
    left: &'static str,
    right: &'static str,
}

/// Allowed `(op, left, right)` combinations. Scalar-times-vec3 promotes the
/// scalar side to float; the compiler swaps operands so the scalar ends up
/// on top for `V3SCALE`.
static BIN_RULES: Lazy<HashMap<(BinaryOp, Tag, Tag), BinRule>> = Lazy::new(|| {
    use BinaryOp::{Add, Div, Eq, Gt, Gte, Lt, Lte, Mul, Neq, Sub};
    use Tag::{Enum as E, Float as F, Int as I, Vec3 as V3};

    let mut rules = HashMap::new();
    let mut rule = |op, l, r, result, left, right| {
        rules.insert((op, l, r), BinRule { result, left, right });
    };

    for op in [Add, Sub, Mul, Div] {
        rule(op, I, I, "int", "int", "int");
        rule(op, I, F, "float", "float", "float");
        rule(op, F, I, "float", "float", "float");
        rule(op, F, F, "float", "float", "float");
    }
    for op in [Add, Sub] {
        rule(op, V3, V3, "vec3", "vec3", "vec3");
    }
    rule(Mul, I, V3, "vec3", "float", "vec3");
    rule(Mul, F, V3, "vec3", "float", "vec3");
    rule(Mul, V3, I, "vec3", "vec3", "float");
    rule(Mul, V3, F, "vec3", "vec3", "float");
    rule(Div, V3, I, "vec3", "vec3", "float");
    rule(Div, V3, F, "vec3", "vec3", "float");

    for op in [Lte, Lt, Gte, Gt, Eq, Neq] {
        rule(op, I, I, "bool", "int", "int");
        rule(op, I, F, "bool", "float", "float");
        rule(op, F, I, "bool", "float", "float");
        rule(op, F, F, "bool", "float", "float");
    }
    for op in [Eq, Neq] {
        rule(op, E, E, "bool", "", "");
        rule(op, V3, V3, "bool", "vec3", "vec3");
    }

    rules
});

/// Fold a binary op over two constants. Integer arithmetic wraps; an
/// integer division by a folded zero stays unfolded and traps at run time.
fn fold_binary(op: BinaryOp, left: &Val, right: &Val) -> Option<Val> {
    use BinaryOp::{Add, Div, Eq, Gt, Gte, Lt, Lte, Mul, Neq, Sub};
    match (left, right) {
        (Val::Int(a), Val::Int(b)) => {
            let (a, b) = (*a, *b);
            Some(match op {
                Add => Val::Int(a.wrapping_add(b)),
                Sub => Val::Int(a.wrapping_sub(b)),
                Mul => Val::Int(a.wrapping_mul(b)),
                Div => {
                    if b == 0 {
                        return None;
                    }
                    Val::Int(a.wrapping_div(b))
                }
                Lte => Val::Bool(a <= b),
                Lt => Val::Bool(a < b),
                Gte => Val::Bool(a >= b),
                Gt => Val::Bool(a > b),
                Eq => Val::Bool(a == b),
                Neq => Val::Bool(a != b),
            })
        }
        (Val::Float(a), Val::Float(b)) => {
            let (a, b) = (*a, *b);
            Some(match op {
                Add => Val::Float(a + b),
                Sub => Val::Float(a - b),
                Mul => Val::Float(a * b),
                Div => Val::Float(a / b),
                Lte => Val::Bool(a <= b),
                Lt => Val::Bool(a < b),
                Gte => Val::Bool(a >= b),
                Gt => Val::Bool(a > b),
                Eq => Val::Bool(a == b),
                Neq => Val::Bool(a != b),
            })
        }
        _ => None,
    }
}

impl<'a> FnCtx<'a> {
    fn tag(&self, ty: TypeId) -> Tag {
        match self.types.kind(ty) {
            TypeKind::Void => Tag::Void,
            TypeKind::VoidStar => Tag::VoidStar,
            TypeKind::Int => Tag::Int,
            TypeKind::Float => Tag::Float,
            TypeKind::Bool => Tag::Bool,
            TypeKind::Vec3 => Tag::Vec3,
            TypeKind::CharStar => Tag::CharStar,
            TypeKind::Enum => Tag::Enum,
            TypeKind::Struct(_) => Tag::Struct,
            TypeKind::Array(_) => Tag::Array,
        }
    }

    fn type_name(&self, ty: TypeId) -> String {
        self.types.name(ty).to_string()
    }

    fn builtin(&self, name: &str) -> CheckResult<TypeId> {
        self.syms
            .get_type(name)
            .ok_or_else(|| CompileError::UndefinedType {
                name: name.to_string(),
                span: Span::empty(),
            })
    }

    /// Check an expression in an optional expected-type context.
    pub(crate) fn check_expr(&mut self, e: ExprId, expected: Option<TypeId>) -> CheckResult<()> {
        let ast = self.ast;
        let expr = ast.expr(e);
        let span = expr.span;
        match &expr.kind {
            ExprKind::Unary { op, operand } => self.check_unary(e, *op, *operand, span),
            ExprKind::Binary { op, left, right } => {
                self.check_binary(e, *op, *left, *right, expected, span)
            }
            ExprKind::Call { callee, args } => self.check_call(e, *callee, args, span),
            ExprKind::DebugPrint { args } => self.check_debug_print(e, args),
            ExprKind::ArrayIndex { array, index } => {
                self.check_array_index(e, *array, *index, expected, true)
            }
            ExprKind::Member { object, member } => {
                let member = member.clone();
                self.check_member(e, *object, &member, span, true)
            }
            ExprKind::Assign { left, right } => self.check_assign(e, *left, *right),
            ExprKind::IntLit(v) => {
                let v = *v;
                self.meta.set_ty(e, self.types.builtins().int);
                self.meta.set_const(e, Val::Int(v));
                Ok(())
            }
            ExprKind::FloatLit(v) => {
                let v = *v;
                self.meta.set_ty(e, self.types.builtins().float);
                self.meta.set_const(e, Val::Float(v));
                Ok(())
            }
            ExprKind::Symbol(name) => {
                let name = name.clone();
                self.check_symbol(e, &name, span)
            }
            ExprKind::Null => self.check_null(e, expected, span),
            ExprKind::StrLit(_) => {
                self.meta.set_ty(e, self.types.builtins().char_star);
                Ok(())
            }
            ExprKind::ArrayLit(values) => {
                let values = values.clone();
                self.check_array_lit(e, &values, expected, span)
            }
            ExprKind::ObjectLit { names, values } => {
                let names = names.clone();
                let values = values.clone();
                self.check_object_lit(e, &names, &values, expected, span)
            }
            ExprKind::Vec3Lit(args) => {
                let args = *args;
                let float_ty = self.types.builtins().float;
                for arg in args {
                    self.check_expr_cast(arg, float_ty)?;
                }
                self.meta.set_ty(e, self.types.builtins().vec3);
                Ok(())
            }
        }
    }

    /// Check an expression and insert an implicit cast to `want` if needed.
    /// `int <-> float` and `array -> bool` are the only implicit casts.
    pub(crate) fn check_expr_cast(&mut self, e: ExprId, want: TypeId) -> CheckResult<()> {
        self.check_expr(e, Some(want))?;

        let have = self.meta.effective_ty(e);
        if have == want {
            return Ok(());
        }

        match (self.types.kind(want), self.types.kind(have)) {
            (TypeKind::Int, TypeKind::Float) | (TypeKind::Float, TypeKind::Int) => {
                self.record_cast(e, want);
                Ok(())
            }
            (TypeKind::Bool, TypeKind::Array(_)) => {
                self.meta.set_cast(e, want);
                self.meta.clear_const(e);
                Ok(())
            }
            _ => Err(CompileError::CannotCast {
                from: self.type_name(have),
                to: self.type_name(want),
                span: self.ast.expr(e).span,
            }),
        }
    }

    /// Record a numeric cast annotation and convert the folded constant.
    fn record_cast(&mut self, e: ExprId, want: TypeId) {
        if self.meta.effective_ty(e) == want {
            return;
        }
        self.meta.set_cast(e, want);
        let converted = match (self.meta.constv(e), self.types.kind(want)) {
            (Some(Val::Int(v)), TypeKind::Float) => Some(Val::Float(*v as f32)),
            (Some(Val::Float(v)), TypeKind::Int) => Some(Val::Int(*v as i32)),
            (Some(_), _) => None,
            (None, _) => return,
        };
        match converted {
            Some(value) => self.meta.set_const(e, value),
            None => self.meta.clear_const(e),
        }
    }

    /// Check an expression in assignment-target position.
    pub(crate) fn check_lvalue(&mut self, e: ExprId) -> CheckResult<()> {
        let ast = self.ast;
        let expr = ast.expr(e);
        let span = expr.span;
        match &expr.kind {
            ExprKind::ArrayIndex { array, index } => {
                self.check_array_index(e, *array, *index, None, false)
            }
            ExprKind::Member { object, member } => {
                let member = member.clone();
                self.check_member(e, *object, &member, span, false)
            }
            ExprKind::Symbol(_) => {
                self.check_expr(e, None)?;
                if self.meta.lvalue(e) == Lvalue::Invalid {
                    return Err(CompileError::InvalidLvalue { span });
                }
                Ok(())
            }
            _ => Err(CompileError::InvalidLvalue { span }),
        }
    }

    fn check_unary(&mut self, e: ExprId, op: UnaryOp, operand: ExprId, span: Span) -> CheckResult<()> {
        match op {
            UnaryOp::PostInc => {
                self.check_lvalue(operand)?;
                let ty = self.meta.ty(operand);
                match self.types.kind(ty) {
                    TypeKind::Int | TypeKind::Float => self.meta.set_ty(e, ty),
                    _ => {
                        return Err(CompileError::CannotCast {
                            from: self.type_name(ty),
                            to: "int".to_string(),
                            span,
                        });
                    }
                }
            }
            UnaryOp::Not => {
                let bool_ty = self.types.builtins().bool_;
                self.check_expr_cast(operand, bool_ty)?;
                self.meta.set_ty(e, bool_ty);
                if let Some(Val::Bool(v)) = self.meta.constv(operand).cloned() {
                    self.meta.set_const(e, Val::Bool(!v));
                }
            }
        }
        Ok(())
    }

    fn check_binary(
        &mut self,
        e: ExprId,
        op: BinaryOp,
        left: ExprId,
        right: ExprId,
        expected: Option<TypeId>,
        span: Span,
    ) -> CheckResult<()> {
        self.check_expr(left, expected)?;
        self.check_expr(right, expected)?;

        let left_ty = self.meta.effective_ty(left);
        let right_ty = self.meta.effective_ty(right);

        let rule = BIN_RULES
            .get(&(op, self.tag(left_ty), self.tag(right_ty)))
            .ok_or_else(|| CompileError::CannotCast {
                from: self.type_name(left_ty),
                to: self.type_name(right_ty),
                span,
            })?;

        let want_left = if rule.left.is_empty() {
            left_ty
        } else {
            self.builtin(rule.left)?
        };
        let want_right = if rule.right.is_empty() {
            right_ty
        } else {
            self.builtin(rule.right)?
        };
        let result = self.builtin(rule.result)?;

        self.record_cast(left, want_left);
        self.record_cast(right, want_right);
        self.meta.set_ty(e, result);

        if let (Some(lv), Some(rv)) = (
            self.meta.constv(left).cloned(),
            self.meta.constv(right).cloned(),
        ) {
            if let Some(value) = fold_binary(op, &lv, &rv) {
                self.meta.set_const(e, value);
            }
        }
        Ok(())
    }

    fn check_symbol(&mut self, e: ExprId, name: &str, span: Span) -> CheckResult<()> {
        let symbol = match self.syms.get(name) {
            Some(symbol) => symbol.clone(),
            None => {
                return Err(CompileError::UndefinedSymbol {
                    name: name.to_string(),
                    span,
                });
            }
        };

        match symbol {
            Symbol::LocalVar { ty, offset } => {
                self.meta.set_ty(e, ty);
                self.meta.set_lvalue(e, Lvalue::Local(offset));
            }
            Symbol::GlobalVar { global, offset } => {
                let ty = self.globals.get(global).ty.ok_or_else(|| {
                    CompileError::UndefinedType {
                        name: name.to_string(),
                        span,
                    }
                })?;
                self.meta.set_ty(e, ty);
                self.meta.set_lvalue(e, Lvalue::Global(offset));
            }
            Symbol::Const { ty, value } => {
                self.meta.set_ty(e, ty);
                self.meta.set_const(e, value);
            }
            Symbol::Function(_) | Symbol::Native(_) | Symbol::Type(_) => {
                return Err(CompileError::InvalidSymbol {
                    name: name.to_string(),
                    span,
                });
            }
        }
        Ok(())
    }

    fn check_call(
        &mut self,
        e: ExprId,
        callee: ExprId,
        args: &[ExprId],
        span: Span,
    ) -> CheckResult<()> {
        let ast = self.ast;
        let name = match &ast.expr(callee).kind {
            ExprKind::Symbol(name) => name.clone(),
            _ => {
                return Err(CompileError::UndefinedFunction {
                    name: "<expression>".to_string(),
                    span: ast.expr(callee).span,
                });
            }
        };

        if name == "delete_array" {
            return self.check_delete_array(e, args, span);
        }

        let symbol = match self.syms.get(&name) {
            Some(symbol) => symbol.clone(),
            None => {
                return Err(CompileError::UndefinedFunction { name, span });
            }
        };

        let (param_tys, return_ty) = match symbol {
            Symbol::Function(fid) => {
                let decl = self.fns.get(fid);
                (
                    decl.params.iter().map(|p| p.ty).collect::<Vec<_>>(),
                    decl.return_ty,
                )
            }
            Symbol::Native(idx) => {
                let decl = &self.natives[idx];
                (decl.params.clone(), decl.return_ty)
            }
            _ => return Err(CompileError::InvalidSymbol { name, span }),
        };

        if param_tys.len() != args.len() {
            return Err(CompileError::WrongArgCount {
                name,
                expected: param_tys.len(),
                got: args.len(),
                span,
            });
        }
        for (&arg, &ty) in args.iter().zip(&param_tys) {
            self.check_expr_cast(arg, ty)?;
        }

        self.meta
            .set_ty(e, return_ty.unwrap_or(self.types.builtins().void));
        Ok(())
    }

    fn check_delete_array(&mut self, e: ExprId, args: &[ExprId], span: Span) -> CheckResult<()> {
        self.meta.set_ty(e, self.types.builtins().void);

        if args.len() != 1 {
            return Err(CompileError::WrongArgCount {
                name: "delete_array".to_string(),
                expected: 1,
                got: args.len(),
                span,
            });
        }

        self.check_expr(args[0], None)?;
        let ty = self.meta.effective_ty(args[0]);
        if !matches!(self.types.kind(ty), TypeKind::Array(_)) {
            return Err(CompileError::CannotCast {
                from: self.type_name(ty),
                to: "array".to_string(),
                span,
            });
        }
        // the handle is written back as 0, so the argument must be writable
        if self.meta.lvalue(args[0]) == Lvalue::Invalid {
            return Err(CompileError::InvalidLvalue { span });
        }
        Ok(())
    }

    fn check_debug_print(&mut self, e: ExprId, args: &[ExprId]) -> CheckResult<()> {
        for &arg in args {
            self.check_expr(arg, None)?;
        }
        self.meta.set_ty(e, self.types.builtins().void);
        Ok(())
    }

    fn check_member(
        &mut self,
        e: ExprId,
        object: ExprId,
        member: &str,
        span: Span,
        allow_array_length: bool,
    ) -> CheckResult<()> {
        self.check_expr(object, None)?;
        let obj_ty = self.meta.effective_ty(object);

        match self.types.kind(obj_ty) {
            TypeKind::Struct(sid) => {
                let found = self
                    .types
                    .strukt(sid)
                    .member(member)
                    .map(|m| (m.ty, m.offset));
                let (member_ty, member_offset) =
                    found.ok_or_else(|| CompileError::WrongMemberName {
                        member: member.to_string(),
                        ty: self.type_name(obj_ty),
                        span,
                    })?;
                let lvalue = self.shift_lvalue(object, member_offset, span)?;
                self.meta.set_ty(e, member_ty);
                self.meta.set_lvalue(e, lvalue);
            }
            TypeKind::Vec3 => {
                let member_offset = match member {
                    "x" => 0,
                    "y" => 4,
                    "z" => 8,
                    _ => {
                        return Err(CompileError::WrongMemberName {
                            member: member.to_string(),
                            ty: "vec3".to_string(),
                            span,
                        });
                    }
                };
                let lvalue = self.shift_lvalue(object, member_offset, span)?;
                self.meta.set_ty(e, self.types.builtins().float);
                self.meta.set_lvalue(e, lvalue);
            }
            TypeKind::Array(_) if allow_array_length => {
                if member != "length" {
                    return Err(CompileError::WrongMemberName {
                        member: member.to_string(),
                        ty: self.type_name(obj_ty),
                        span,
                    });
                }
                if self.meta.lvalue(object) == Lvalue::Invalid {
                    return Err(CompileError::InvalidLvalue { span });
                }
                self.meta.set_ty(e, self.types.builtins().int);
                self.meta.set_lvalue(e, Lvalue::Array);
            }
            TypeKind::Array(_) => return Err(CompileError::InvalidLvalue { span }),
            _ => {
                return Err(CompileError::WrongMemberName {
                    member: member.to_string(),
                    ty: self.type_name(obj_ty),
                    span,
                });
            }
        }
        Ok(())
    }

    /// The member's l-value: the parent's, shifted by the member offset.
    fn shift_lvalue(&self, object: ExprId, offset: i32, span: Span) -> CheckResult<Lvalue> {
        match self.meta.lvalue(object) {
            Lvalue::Local(base) => Ok(Lvalue::Local(base + offset)),
            Lvalue::Global(base) => Ok(Lvalue::Global(base + offset)),
            Lvalue::Array => Ok(Lvalue::Array),
            Lvalue::Invalid => Err(CompileError::InvalidLvalue { span }),
        }
    }

    fn check_array_index(
        &mut self,
        e: ExprId,
        array: ExprId,
        index: ExprId,
        expected: Option<TypeId>,
        require_array_lvalue: bool,
    ) -> CheckResult<()> {
        let ast = self.ast;
        self.check_expr(array, expected)?;

        let array_ty = self.meta.effective_ty(array);
        let elem_ty = match self.types.kind(array_ty) {
            TypeKind::Array(elem) => elem,
            _ => {
                return Err(CompileError::CannotCast {
                    from: self.type_name(array_ty),
                    to: "array".to_string(),
                    span: ast.expr(array).span,
                });
            }
        };

        // loads fetch the handle through the array expression's own l-value
        if require_array_lvalue && self.meta.lvalue(array) == Lvalue::Invalid {
            return Err(CompileError::InvalidLvalue {
                span: ast.expr(array).span,
            });
        }

        let int_ty = self.types.builtins().int;
        self.check_expr_cast(index, int_ty)?;

        self.meta.set_ty(e, elem_ty);
        self.meta.set_lvalue(e, Lvalue::Array);
        Ok(())
    }

    fn check_assign(&mut self, e: ExprId, left: ExprId, right: ExprId) -> CheckResult<()> {
        self.check_lvalue(left)?;
        let left_ty = self.meta.ty(left);
        self.check_expr_cast(right, left_ty)?;
        self.meta.set_ty(e, left_ty);
        Ok(())
    }

    fn check_null(&mut self, e: ExprId, expected: Option<TypeId>, span: Span) -> CheckResult<()> {
        let expected = expected.ok_or(CompileError::CannotDetermineNullType { span })?;
        if !matches!(self.types.kind(expected), TypeKind::Array(_)) {
            return Err(CompileError::CannotCast {
                from: "NULL".to_string(),
                to: self.type_name(expected),
                span,
            });
        }
        self.meta.set_ty(e, expected);
        self.meta.set_const(e, Val::Int(0));
        Ok(())
    }

    fn check_array_lit(
        &mut self,
        e: ExprId,
        values: &[ExprId],
        expected: Option<TypeId>,
        span: Span,
    ) -> CheckResult<()> {
        let expected = expected.ok_or(CompileError::CannotDetermineArrayType { span })?;
        let elem_ty = match self.types.kind(expected) {
            TypeKind::Array(elem) => elem,
            _ => {
                return Err(CompileError::CannotCast {
                    from: "array literal".to_string(),
                    to: self.type_name(expected),
                    span,
                });
            }
        };

        let mut is_const = true;
        for &value in values {
            self.check_expr_cast(value, elem_ty)?;
            if self.meta.constv(value).is_none() {
                is_const = false;
            }
        }

        if is_const {
            let elems = values
                .iter()
                .filter_map(|&v| self.meta.constv(v).cloned())
                .collect();
            self.meta.set_const(e, Val::Array(elems));
        }
        self.meta.set_ty(e, expected);
        Ok(())
    }

    fn check_object_lit(
        &mut self,
        e: ExprId,
        names: &[String],
        values: &[ExprId],
        expected: Option<TypeId>,
        span: Span,
    ) -> CheckResult<()> {
        let expected = expected.ok_or(CompileError::CannotDetermineObjectType { span })?;
        let sid = match self.types.kind(expected) {
            TypeKind::Struct(sid) => sid,
            _ => {
                return Err(CompileError::CannotCast {
                    from: "object literal".to_string(),
                    to: self.type_name(expected),
                    span,
                });
            }
        };

        let members: Vec<(String, TypeId)> = self
            .types
            .strukt(sid)
            .members
            .iter()
            .map(|m| (m.name.clone(), m.ty))
            .collect();

        if names.len() != members.len() {
            return Err(CompileError::WrongArgCount {
                name: self.type_name(expected),
                expected: members.len(),
                got: names.len(),
                span,
            });
        }

        let mut is_const = true;
        for ((name, &value), (member_name, member_ty)) in
            names.iter().zip(values).zip(&members)
        {
            // members must be written in declaration order
            if name != member_name {
                return Err(CompileError::WrongMemberName {
                    member: name.clone(),
                    ty: self.type_name(expected),
                    span,
                });
            }
            self.check_expr_cast(value, *member_ty)?;
            if self.meta.constv(value).is_none() {
                is_const = false;
            }
        }

        if is_const {
            let elems = values
                .iter()
                .filter_map(|&v| self.meta.constv(v).cloned())
                .collect();
            self.meta.set_const(e, Val::Object(elems));
        }
        self.meta.set_ty(e, expected);
        Ok(())
    }
}
