//! Pretty printer producing canonical, re-parseable source text.
//!
//! Printing a parsed program and parsing the output again reaches a fixpoint
//! after one round: `pretty(parse(pretty(parse(src)))) == pretty(parse(src))`.
//! Expressions are printed fully parenthesized so no precedence information
//! is lost.

use std::fmt::Write;

use crate::ast::{Ast, ExprId, ExprKind, ParsedProgram, StmtId, StmtKind, UnaryOp};

/// Render a parsed program as canonical source text.
pub fn pretty(program: &ParsedProgram) -> String {
    let mut out = String::new();
    for &stmt in &program.top {
        write_stmt(&mut out, &program.ast, stmt, 0);
    }
    out
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("    ");
    }
}

fn write_stmt(out: &mut String, ast: &Ast, id: StmtId, depth: usize) {
    match &ast.stmt(id).kind {
        StmtKind::If {
            conds,
            bodies,
            else_body,
        } => {
            indent(out, depth);
            for (i, (&cond, &body)) in conds.iter().zip(bodies).enumerate() {
                if i > 0 {
                    out.push_str("else ");
                }
                out.push_str("if (");
                write_expr(out, ast, cond);
                out.push_str(")\n");
                write_stmt(out, ast, body, depth + 1);
                indent(out, depth);
            }
            if let Some(else_body) = else_body {
                out.push_str("else\n");
                write_stmt(out, ast, *else_body, depth + 1);
            } else {
                // trailing indent before newline is harmless; trim it
                while out.ends_with(' ') {
                    out.pop();
                }
            }
        }
        StmtKind::Return(expr) => {
            indent(out, depth);
            match expr {
                Some(e) => {
                    out.push_str("return ");
                    write_expr(out, ast, *e);
                    out.push_str(";\n");
                }
                None => out.push_str("return;\n"),
            }
        }
        StmtKind::Block(stmts) => {
            indent(out, depth);
            out.push_str("{\n");
            for &s in stmts {
                write_stmt(out, ast, s, depth + 1);
            }
            indent(out, depth);
            out.push_str("}\n");
        }
        StmtKind::Function(f) => {
            indent(out, depth);
            let _ = write!(out, "{} {}(", f.return_type, f.name);
            for (i, (ty, name)) in f.param_types.iter().zip(&f.param_names).enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let _ = write!(out, "{} {}", ty, name);
            }
            out.push_str(")\n");
            write_stmt(out, ast, f.body, depth);
        }
        StmtKind::Global { ty, name, init } => {
            indent(out, depth);
            let _ = write!(out, "{} {} = ", ty, name);
            write_expr(out, ast, *init);
            out.push_str(";\n");
        }
        StmtKind::VarDecl { ty, name, assign } => {
            indent(out, depth);
            let _ = write!(out, "{} {}", ty, name);
            if let Some(assign) = assign {
                if let ExprKind::Assign { right, .. } = &ast.expr(*assign).kind {
                    out.push_str(" = ");
                    write_expr(out, ast, *right);
                }
            }
            out.push_str(";\n");
        }
        StmtKind::Struct {
            name,
            member_types,
            member_names,
        } => {
            indent(out, depth);
            let _ = write!(out, "struct {} {{\n", name);
            for (ty, member) in member_types.iter().zip(member_names) {
                indent(out, depth + 1);
                let _ = write!(out, "{} {};\n", ty, member);
            }
            indent(out, depth);
            out.push_str("}\n");
        }
        StmtKind::Enum { name, values } => {
            indent(out, depth);
            let _ = write!(out, "enum {} {{ {} }}\n", name, values.join(", "));
        }
        StmtKind::Import { path } => {
            indent(out, depth);
            let _ = write!(out, "import \"{}\";\n", escape(path));
        }
        StmtKind::ImportFunction(f) => {
            indent(out, depth);
            let _ = write!(out, "import_function {} {}(", f.return_type, f.name);
            for (i, (ty, name)) in f.param_types.iter().zip(&f.param_names).enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let _ = write!(out, "{} {}", ty, name);
            }
            out.push_str(");\n");
        }
        StmtKind::Expr(expr) => {
            indent(out, depth);
            write_expr(out, ast, *expr);
            out.push_str(";\n");
        }
        StmtKind::For {
            init,
            cond,
            step,
            body,
        } => {
            indent(out, depth);
            out.push_str("for (");
            write_expr(out, ast, *init);
            out.push_str("; ");
            write_expr(out, ast, *cond);
            out.push_str("; ");
            write_expr(out, ast, *step);
            out.push_str(")\n");
            write_stmt(out, ast, *body, depth + 1);
        }
    }
}

fn write_expr(out: &mut String, ast: &Ast, id: ExprId) {
    match &ast.expr(id).kind {
        ExprKind::Unary { op, operand } => match op {
            UnaryOp::Not => {
                out.push_str("!(");
                write_expr(out, ast, *operand);
                out.push(')');
            }
            UnaryOp::PostInc => {
                out.push('(');
                write_expr(out, ast, *operand);
                out.push_str(")++");
            }
        },
        ExprKind::Binary { op, left, right } => {
            out.push('(');
            write_expr(out, ast, *left);
            let _ = write!(out, " {} ", op.symbol());
            write_expr(out, ast, *right);
            out.push(')');
        }
        ExprKind::Call { callee, args } => {
            write_expr(out, ast, *callee);
            write_args(out, ast, args);
        }
        ExprKind::DebugPrint { args } => {
            out.push_str("print");
            write_args(out, ast, args);
        }
        ExprKind::ArrayIndex { array, index } => {
            out.push('(');
            write_expr(out, ast, *array);
            out.push('[');
            write_expr(out, ast, *index);
            out.push_str("])");
        }
        ExprKind::Member { object, member } => {
            out.push('(');
            write_expr(out, ast, *object);
            let _ = write!(out, ".{})", member);
        }
        ExprKind::Assign { left, right } => {
            out.push('(');
            write_expr(out, ast, *left);
            out.push_str(" = ");
            write_expr(out, ast, *right);
            out.push(')');
        }
        ExprKind::IntLit(v) => {
            let _ = write!(out, "{}", v);
        }
        ExprKind::FloatLit(v) => {
            let _ = write!(out, "{:?}", v);
        }
        ExprKind::Symbol(name) => out.push_str(name),
        ExprKind::Null => out.push_str("NULL"),
        ExprKind::StrLit(s) => {
            let _ = write!(out, "\"{}\"", escape(s));
        }
        ExprKind::ArrayLit(values) => {
            out.push('[');
            for (i, &v) in values.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(out, ast, v);
            }
            out.push(']');
        }
        ExprKind::ObjectLit { names, values } => {
            out.push('{');
            for (i, (name, &v)) in names.iter().zip(values).enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let _ = write!(out, "{} = ", name);
                write_expr(out, ast, v);
            }
            out.push('}');
        }
        ExprKind::Vec3Lit([x, y, z]) => {
            out.push_str("vec3(");
            write_expr(out, ast, *x);
            out.push_str(", ");
            write_expr(out, ast, *y);
            out.push_str(", ");
            write_expr(out, ast, *z);
            out.push(')');
        }
    }
}

fn write_args(out: &mut String, ast: &Ast, args: &[ExprId]) {
    out.push('(');
    for (i, &arg) in args.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_expr(out, ast, arg);
    }
    out.push(')');
}

fn escape(s: &str) -> String {
    s.replace('\n', "\\n").replace('\t', "\\t")
}
