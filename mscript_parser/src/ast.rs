//! AST for mscript, allocated in an index-based arena.
//!
//! Nodes are plain syntax; type and l-value information is attached by the
//! downstream checker in its own side tables keyed by [`ExprId`].

use serde::{Deserialize, Serialize};

use crate::span::Span;

/// Index of an expression in the [`Ast`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExprId(u32);

impl ExprId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a statement in the [`Ast`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StmtId(u32);

impl StmtId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A type as written in source: a name plus an optional `[]` suffix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedType {
    pub name: String,
    pub is_array: bool,
}

impl ParsedType {
    pub fn new(name: impl Into<String>, is_array: bool) -> Self {
        Self {
            name: name.into(),
            is_array,
        }
    }

    /// The symbol-table key for this type (`int`, `int[]`, ...).
    pub fn key(&self) -> String {
        if self.is_array {
            format!("{}[]", self.name)
        } else {
            self.name.clone()
        }
    }
}

impl std::fmt::Display for ParsedType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    /// `x++`
    PostInc,
    /// `!x`
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Lte,
    Lt,
    Gte,
    Gt,
    Eq,
    Neq,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Lte => "<=",
            BinaryOp::Lt => "<",
            BinaryOp::Gte => ">=",
            BinaryOp::Gt => ">",
            BinaryOp::Eq => "==",
            BinaryOp::Neq => "!=",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub span: Span,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    Unary {
        op: UnaryOp,
        operand: ExprId,
    },
    Binary {
        op: BinaryOp,
        left: ExprId,
        right: ExprId,
    },
    Call {
        callee: ExprId,
        args: Vec<ExprId>,
    },
    /// `print(...)`, rewritten at parse time
    DebugPrint {
        args: Vec<ExprId>,
    },
    ArrayIndex {
        array: ExprId,
        index: ExprId,
    },
    Member {
        object: ExprId,
        member: String,
    },
    Assign {
        left: ExprId,
        right: ExprId,
    },
    IntLit(i32),
    FloatLit(f32),
    Symbol(String),
    Null,
    StrLit(String),
    ArrayLit(Vec<ExprId>),
    /// `{name = expr, ...}`
    ObjectLit {
        names: Vec<String>,
        values: Vec<ExprId>,
    },
    /// `vec3(x, y, z)`, rewritten at parse time
    Vec3Lit([ExprId; 3]),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    pub span: Span,
    pub kind: StmtKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionStmt {
    pub return_type: ParsedType,
    pub name: String,
    pub param_types: Vec<ParsedType>,
    pub param_names: Vec<String>,
    pub body: StmtId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportFunctionStmt {
    pub return_type: ParsedType,
    pub name: String,
    pub param_types: Vec<ParsedType>,
    pub param_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    /// `if`/`else if` chains: one condition per body, plus an optional `else`
    If {
        conds: Vec<ExprId>,
        bodies: Vec<StmtId>,
        else_body: Option<StmtId>,
    },
    Return(Option<ExprId>),
    Block(Vec<StmtId>),
    Function(FunctionStmt),
    Global {
        ty: ParsedType,
        name: String,
        init: ExprId,
    },
    VarDecl {
        ty: ParsedType,
        name: String,
        /// Desugared `name = expr` assignment, when an initializer is present
        assign: Option<ExprId>,
    },
    Struct {
        name: String,
        member_types: Vec<ParsedType>,
        member_names: Vec<String>,
    },
    Enum {
        name: String,
        values: Vec<String>,
    },
    Import {
        path: String,
    },
    ImportFunction(ImportFunctionStmt),
    Expr(ExprId),
    For {
        init: ExprId,
        cond: ExprId,
        step: ExprId,
        body: StmtId,
    },
}

/// Arena holding every node of one parsed source file. Dropped as a unit
/// with its program.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ast {
    exprs: Vec<Expr>,
    stmts: Vec<Stmt>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_expr(&mut self, span: Span, kind: ExprKind) -> ExprId {
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(Expr { span, kind });
        id
    }

    pub fn alloc_stmt(&mut self, span: Span, kind: StmtKind) -> StmtId {
        let id = StmtId(self.stmts.len() as u32);
        self.stmts.push(Stmt { span, kind });
        id
    }

    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.index()]
    }

    pub fn expr_count(&self) -> usize {
        self.exprs.len()
    }

    pub fn stmt_count(&self) -> usize {
        self.stmts.len()
    }
}

/// One parsed source file: the node arena plus the ordered top-level forms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedProgram {
    pub ast: Ast,
    pub top: Vec<StmtId>,
}
