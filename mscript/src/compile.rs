//! Bytecode compiler: one intermediate opcode stream per function.
//!
//! Emission is infallible; the checker has already annotated every
//! expression with its type, constant and l-value. Labels are integers that
//! only make sense within one function; the link pass resolves them.
//!
//! Calls evaluate their arguments right to left so the first argument ends
//! up at the highest address below the new frame. Binary operands compile
//! left before right, except `float * vec3`, whose operands are swapped so
//! the scalar is on top for `V3SCALE`. An assignment leaves its value on
//! the stack; expression statements pop it.

use mscript_parser::{Ast, BinaryOp, ExprId, ExprKind, StmtId, StmtKind, UnaryOp};

use crate::annot::{ExprMeta, Lvalue};
use crate::decl::{FnStore, FuncId};
use crate::opcode::Opcode;
use crate::symbol::{Symbol, SymbolTable};
use crate::types::{TypeId, TypeKind, TypeStore};
use crate::value::Val;

pub(crate) struct Compiler<'a> {
    types: &'a TypeStore,
    fns: &'a FnStore,
    syms: &'a SymbolTable,
    ast: &'a Ast,
    meta: &'a ExprMeta,
    out: Vec<Opcode>,
    next_label: u32,
}

/// Compile one function body into its intermediate opcode stream.
pub(crate) fn compile_function(
    types: &TypeStore,
    fns: &FnStore,
    syms: &SymbolTable,
    ast: &Ast,
    meta: &ExprMeta,
    fid: FuncId,
    body: StmtId,
) -> Vec<Opcode> {
    let mut compiler = Compiler {
        types,
        fns,
        syms,
        ast,
        meta,
        out: Vec::new(),
        next_label: 0,
    };

    let decl = fns.get(fid);
    compiler.out.push(Opcode::Func(decl.name.clone()));
    compiler.out.push(Opcode::Push(decl.block_size));
    compiler.compile_stmt(body, fid);

    let is_void = match decl.return_ty {
        Some(ty) => types.kind(ty) == TypeKind::Void,
        None => true,
    };
    if is_void {
        compiler.out.push(Opcode::Pop(decl.block_size));
        compiler.out.push(Opcode::Return(0));
    }

    compiler.out
}

impl<'a> Compiler<'a> {
    fn new_label(&mut self) -> u32 {
        let label = self.next_label;
        self.next_label += 1;
        label
    }

    fn size_of(&self, e: ExprId) -> i32 {
        self.types.size(self.meta.effective_ty(e))
    }

    fn compile_stmt(&mut self, id: StmtId, fid: FuncId) {
        let ast = self.ast;
        match &ast.stmt(id).kind {
            StmtKind::If {
                conds,
                bodies,
                else_body,
            } => {
                let final_label = self.new_label();
                for (&cond, &body) in conds.iter().zip(bodies) {
                    self.compile_expr(cond);
                    let next_label = self.new_label();
                    self.out.push(Opcode::JfLabel(next_label));
                    self.compile_stmt(body, fid);
                    self.out.push(Opcode::JmpLabel(final_label));
                    self.out.push(Opcode::Label(next_label));
                }
                if let Some(else_body) = else_body {
                    self.compile_stmt(*else_body, fid);
                }
                self.out.push(Opcode::Label(final_label));
            }
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => {
                let cond_label = self.new_label();
                let end_label = self.new_label();
                self.compile_expr(*init);
                self.out.push(Opcode::Pop(self.size_of(*init)));
                self.out.push(Opcode::Label(cond_label));
                self.compile_expr(*cond);
                self.out.push(Opcode::JfLabel(end_label));
                self.compile_stmt(*body, fid);
                self.compile_expr(*step);
                self.out.push(Opcode::Pop(self.size_of(*step)));
                self.out.push(Opcode::JmpLabel(cond_label));
                self.out.push(Opcode::Label(end_label));
            }
            StmtKind::Return(expr) => {
                let decl = self.fns.get(fid);
                match expr {
                    Some(expr) => {
                        let size = decl
                            .return_ty
                            .map(|ty| self.types.size(ty))
                            .unwrap_or(0);
                        self.compile_expr(*expr);
                        self.out.push(Opcode::Return(size));
                    }
                    None => {
                        self.out.push(Opcode::Pop(decl.block_size));
                        self.out.push(Opcode::Return(0));
                    }
                }
            }
            StmtKind::Block(stmts) => {
                for &stmt in stmts {
                    self.compile_stmt(stmt, fid);
                }
            }
            StmtKind::Expr(expr) => {
                self.compile_expr(*expr);
                self.out.push(Opcode::Pop(self.size_of(*expr)));
            }
            StmtKind::VarDecl { assign, .. } => {
                if let Some(assign) = assign {
                    self.compile_expr(*assign);
                    self.out.push(Opcode::Pop(self.size_of(*assign)));
                }
            }
            _ => unreachable!("declaration statement inside a function body"),
        }
    }

    fn compile_expr(&mut self, e: ExprId) {
        let ast = self.ast;
        match &ast.expr(e).kind {
            ExprKind::Unary { op, operand } => self.compile_unary(*op, *operand, e),
            ExprKind::Binary { op, left, right } => self.compile_binary(*op, *left, *right),
            ExprKind::Call { callee, args } => self.compile_call(*callee, args),
            ExprKind::DebugPrint { args } => {
                for &arg in args {
                    self.compile_expr(arg);
                    self.compile_print(self.meta.effective_ty(arg));
                }
            }
            ExprKind::ArrayIndex { array, index } => self.compile_array_index(e, *array, *index),
            ExprKind::Member { object, member } => {
                let member = member.clone();
                self.compile_member(e, *object, &member);
            }
            ExprKind::Assign { left, right } => {
                self.compile_expr(*right);
                self.compile_lvalue(*left);
                self.emit_store(self.meta.lvalue(*left), self.size_of(*right));
            }
            ExprKind::IntLit(v) => self.out.push(Opcode::Int(*v)),
            ExprKind::FloatLit(v) => self.out.push(Opcode::Float(*v)),
            ExprKind::Symbol(_) => {
                if let Some(value) = self.meta.constv(e) {
                    // the fold already produced the post-cast value
                    let value = value.clone();
                    self.compile_val(&value);
                    return;
                } else {
                    let size = self.types.size(self.meta.ty(e));
                    match self.meta.lvalue(e) {
                        Lvalue::Local(offset) => {
                            self.out.push(Opcode::LocalLoad { offset, size });
                        }
                        Lvalue::Global(offset) => {
                            self.out.push(Opcode::GlobalLoad { offset, size });
                        }
                        Lvalue::Invalid | Lvalue::Array => {
                            unreachable!("symbol without a storage location")
                        }
                    }
                }
            }
            ExprKind::Null => self.out.push(Opcode::Int(0)),
            ExprKind::StrLit(s) => self.out.push(Opcode::StringLiteral(s.clone())),
            ExprKind::ArrayLit(values) => {
                let values = values.clone();
                self.compile_array_lit(e, &values);
            }
            ExprKind::ObjectLit { values, .. } => {
                for &value in values.clone().iter() {
                    self.compile_expr(value);
                }
            }
            ExprKind::Vec3Lit(args) => {
                for arg in *args {
                    self.compile_expr(arg);
                }
            }
        }

        // the implicit cast inserted by the checker applies to the finished value
        if let Some(want) = self.meta.cast(e) {
            self.compile_cast(self.meta.ty(e), want);
        }
    }

    fn compile_cast(&mut self, from: TypeId, to: TypeId) {
        match (self.types.kind(from), self.types.kind(to)) {
            (TypeKind::Int, TypeKind::Float) => self.out.push(Opcode::I2F),
            (TypeKind::Float, TypeKind::Int) => self.out.push(Opcode::F2I),
            // array -> bool reinterprets the handle as a truth value
            (TypeKind::Array(_), TypeKind::Bool) => {}
            _ => unreachable!("checker inserted an impossible cast"),
        }
    }

    /// Push whatever stack state an l-value needs: nothing for locals and
    /// globals (their offsets are static), handle plus byte offset for
    /// array slots.
    fn compile_lvalue(&mut self, e: ExprId) {
        let ast = self.ast;
        match &ast.expr(e).kind {
            ExprKind::Symbol(_) => {}
            ExprKind::ArrayIndex { array, index } => {
                self.compile_expr(*array);
                self.compile_expr(*index);
                let elem_size = self.types.size(self.meta.ty(e));
                self.out.push(Opcode::Int(elem_size));
                self.out.push(Opcode::IMul);
            }
            ExprKind::Member { object, member } => {
                let offset = self.member_offset(*object, member);
                self.compile_lvalue(*object);
                if self.meta.lvalue(*object) == Lvalue::Array && offset != 0 {
                    self.out.push(Opcode::Int(offset));
                    self.out.push(Opcode::IAdd);
                }
            }
            _ => unreachable!("expression is not an l-value"),
        }
    }

    fn member_offset(&self, object: ExprId, member: &str) -> i32 {
        match self.types.kind(self.meta.effective_ty(object)) {
            TypeKind::Struct(sid) => self
                .types
                .strukt(sid)
                .member(member)
                .map(|m| m.offset)
                .unwrap_or(0),
            TypeKind::Vec3 => match member {
                "y" => 4,
                "z" => 8,
                _ => 0,
            },
            _ => 0,
        }
    }

    fn emit_store(&mut self, lvalue: Lvalue, size: i32) {
        match lvalue {
            Lvalue::Local(offset) => self.out.push(Opcode::LocalStore { offset, size }),
            Lvalue::Global(offset) => self.out.push(Opcode::GlobalStore { offset, size }),
            Lvalue::Array => self.out.push(Opcode::ArrayStore(size)),
            Lvalue::Invalid => unreachable!("store to an invalid l-value"),
        }
    }

    fn emit_load(&mut self, lvalue: Lvalue, size: i32) {
        match lvalue {
            Lvalue::Local(offset) => self.out.push(Opcode::LocalLoad { offset, size }),
            Lvalue::Global(offset) => self.out.push(Opcode::GlobalLoad { offset, size }),
            Lvalue::Array => self.out.push(Opcode::ArrayLoad(size)),
            Lvalue::Invalid => unreachable!("load from an invalid l-value"),
        }
    }

    fn compile_unary(&mut self, op: UnaryOp, operand: ExprId, e: ExprId) {
        self.compile_expr(operand);
        match op {
            UnaryOp::PostInc => {
                match self.types.kind(self.meta.ty(operand)) {
                    TypeKind::Int => self.out.push(Opcode::IInc),
                    TypeKind::Float => self.out.push(Opcode::FInc),
                    _ => unreachable!("post-increment on a non-numeric type"),
                }
                let size = self.types.size(self.meta.ty(e));
                self.compile_lvalue(operand);
                self.emit_store(self.meta.lvalue(operand), size);
            }
            UnaryOp::Not => self.out.push(Opcode::Not),
        }
    }

    fn compile_binary(&mut self, op: BinaryOp, left: ExprId, right: ExprId) {
        let lk = self.types.kind(self.meta.effective_ty(left));
        let rk = self.types.kind(self.meta.effective_ty(right));

        // vec3 / scalar scales by the reciprocal
        if op == BinaryOp::Div && lk == TypeKind::Vec3 && rk == TypeKind::Float {
            self.compile_expr(left);
            self.out.push(Opcode::Float(1.0));
            self.compile_expr(right);
            self.out.push(Opcode::FDiv);
            self.out.push(Opcode::V3Scale);
            return;
        }

        let (opcode, swap) = binary_opcode(op, lk, rk);

        if swap {
            self.compile_expr(right);
            self.compile_expr(left);
        } else {
            self.compile_expr(left);
            self.compile_expr(right);
        }
        self.out.push(opcode);
    }

    fn compile_call(&mut self, callee: ExprId, args: &[ExprId]) {
        let ast = self.ast;
        let name = match &ast.expr(callee).kind {
            ExprKind::Symbol(name) => name.clone(),
            _ => unreachable!("call through a non-symbol"),
        };

        if name == "delete_array" {
            let arg = args[0];
            self.compile_expr(arg);
            self.out.push(Opcode::ArrayDelete);
            // clear the caller's handle so stale reads trap as null
            self.out.push(Opcode::Int(0));
            self.compile_lvalue(arg);
            self.emit_store(self.meta.lvalue(arg), 4);
            self.out.push(Opcode::Pop(4));
            return;
        }

        let mut args_size = 0;
        for &arg in args.iter().rev() {
            self.compile_expr(arg);
            args_size += self.size_of(arg);
        }

        match self.syms.get(&name) {
            Some(Symbol::Function(_)) => self.out.push(Opcode::CallByName(name)),
            Some(Symbol::Native(_)) => self.out.push(Opcode::CCall { name, args_size }),
            _ => unreachable!("call target vanished after checking"),
        }
    }

    fn compile_array_index(&mut self, e: ExprId, array: ExprId, index: ExprId) {
        // load the handle through the array expression's l-value
        let handle_size = self.types.size(self.meta.effective_ty(array));
        self.compile_lvalue(array);
        self.emit_load(self.meta.lvalue(array), handle_size);

        self.compile_expr(index);
        let elem_size = self.types.size(self.meta.ty(e));
        self.out.push(Opcode::Int(elem_size));
        self.out.push(Opcode::IMul);
        self.out.push(Opcode::ArrayLoad(elem_size));
    }

    fn compile_member(&mut self, e: ExprId, object: ExprId, member: &str) {
        match self.types.kind(self.meta.effective_ty(object)) {
            TypeKind::Struct(_) | TypeKind::Vec3 => {
                let size = self.types.size(self.meta.ty(e));
                self.compile_lvalue(e);
                self.emit_load(self.meta.lvalue(e), size);
            }
            TypeKind::Array(_) => {
                debug_assert_eq!(member, "length");
                let handle_size = self.types.size(self.meta.effective_ty(object));
                self.compile_lvalue(object);
                self.emit_load(self.meta.lvalue(object), handle_size);
                self.out.push(Opcode::ArrayLength);
            }
            _ => unreachable!("member access on a non-aggregate"),
        }
    }

    /// A folded constant inlined in place of a symbol reference.
    fn compile_val(&mut self, value: &Val) {
        match value {
            Val::Int(v) => self.out.push(Opcode::Int(*v)),
            Val::Float(v) => self.out.push(Opcode::Float(*v)),
            Val::Bool(v) => self.out.push(Opcode::Int(*v as i32)),
            Val::Object(members) => {
                for member in members {
                    self.compile_val(member);
                }
            }
            _ => unreachable!("constant kind never produced by folding"),
        }
    }

    fn compile_array_lit(&mut self, e: ExprId, values: &[ExprId]) {
        let elem_ty = match self.types.kind(self.meta.ty(e)) {
            TypeKind::Array(elem) => elem,
            _ => unreachable!("array literal without an array type"),
        };
        let elem_size = self.types.size(elem_ty);
        let handle_size = self.types.size(self.meta.ty(e));

        self.out.push(Opcode::ArrayCreate { elem_size });

        if !values.is_empty() {
            for &value in values {
                self.compile_expr(value);
            }
            let payload = values.len() as i32 * elem_size;
            // duplicate the handle above the payload, write at offset 0
            self.out.push(Opcode::Copy {
                offset: payload + handle_size,
                size: handle_size,
            });
            self.out.push(Opcode::Int(0));
            self.out.push(Opcode::ArrayStore(payload));
            self.out.push(Opcode::Pop(payload));
        }
    }

    fn compile_print(&mut self, ty: TypeId) {
        match self.types.kind(ty) {
            TypeKind::Void => {
                self.out
                    .push(Opcode::DebugPrintStringConst("<void>".to_string()));
                self.out.push(Opcode::Pop(self.types.size(ty)));
            }
            TypeKind::VoidStar => {
                self.out
                    .push(Opcode::DebugPrintStringConst("<void*>".to_string()));
                self.out.push(Opcode::Pop(self.types.size(ty)));
            }
            TypeKind::Int | TypeKind::Enum => self.out.push(Opcode::DebugPrintInt),
            TypeKind::Float => self.out.push(Opcode::DebugPrintFloat),
            TypeKind::Vec3 => self.out.push(Opcode::DebugPrintVec3),
            TypeKind::Bool => self.out.push(Opcode::DebugPrintBool),
            TypeKind::CharStar => self.out.push(Opcode::DebugPrintString),
            // arrays print as their handle
            TypeKind::Array(_) => self.out.push(Opcode::DebugPrintInt),
            TypeKind::Struct(sid) => {
                let size = self.types.size(ty);
                let members: Vec<(String, TypeId, i32)> = self
                    .types
                    .strukt(sid)
                    .members
                    .iter()
                    .map(|m| (m.name.clone(), m.ty, m.offset))
                    .collect();

                self.out.push(Opcode::DebugPrintStringConst("{".to_string()));
                for (i, (name, member_ty, offset)) in members.iter().enumerate() {
                    self.out.push(Opcode::DebugPrintStringConst(name.clone()));
                    self.out
                        .push(Opcode::DebugPrintStringConst(": ".to_string()));
                    self.out.push(Opcode::Copy {
                        offset: size - offset,
                        size: self.types.size(*member_ty),
                    });
                    self.compile_print(*member_ty);
                    if i != members.len() - 1 {
                        self.out
                            .push(Opcode::DebugPrintStringConst(", ".to_string()));
                    }
                }
                self.out.push(Opcode::DebugPrintStringConst("}".to_string()));
                self.out.push(Opcode::Pop(size));
            }
        }
    }
}

/// Opcode selection for a checked binary expression, plus whether the
/// operands must be swapped (`float * vec3` puts the scalar on top).
fn binary_opcode(op: BinaryOp, left: TypeKind, right: TypeKind) -> (Opcode, bool) {
    use BinaryOp::{Add, Div, Eq, Gt, Gte, Lt, Lte, Mul, Neq, Sub};
    use TypeKind::{Enum, Float, Int, Vec3};

    match (op, left, right) {
        (Add, Int, Int) => (Opcode::IAdd, false),
        (Add, Float, Float) => (Opcode::FAdd, false),
        (Add, Vec3, Vec3) => (Opcode::V3Add, false),
        (Sub, Int, Int) => (Opcode::ISub, false),
        (Sub, Float, Float) => (Opcode::FSub, false),
        (Sub, Vec3, Vec3) => (Opcode::V3Sub, false),
        (Mul, Int, Int) => (Opcode::IMul, false),
        (Mul, Float, Float) => (Opcode::FMul, false),
        (Mul, Float, Vec3) => (Opcode::V3Scale, true),
        (Mul, Vec3, Float) => (Opcode::V3Scale, false),
        (Div, Int, Int) => (Opcode::IDiv, false),
        (Div, Float, Float) => (Opcode::FDiv, false),
        (Lte, Int, Int) => (Opcode::ILte, false),
        (Lte, Float, Float) => (Opcode::FLte, false),
        (Lt, Int, Int) => (Opcode::ILt, false),
        (Lt, Float, Float) => (Opcode::FLt, false),
        (Gte, Int, Int) => (Opcode::IGte, false),
        (Gte, Float, Float) => (Opcode::FGte, false),
        (Gt, Int, Int) => (Opcode::IGt, false),
        (Gt, Float, Float) => (Opcode::FGt, false),
        (Eq, Int, Int) | (Eq, Enum, Enum) => (Opcode::IEq, false),
        (Eq, Float, Float) => (Opcode::FEq, false),
        (Eq, Vec3, Vec3) => (Opcode::V3Eq, false),
        (Neq, Int, Int) | (Neq, Enum, Enum) => (Opcode::INeq, false),
        (Neq, Float, Float) => (Opcode::FNeq, false),
        (Neq, Vec3, Vec3) => (Opcode::V3Neq, false),
        other => unreachable!("binary combination {:?} survived checking", other),
    }
}
