//! Recursive descent parser for mscript.
//!
//! The parser is pure syntax: no symbol lookups happen here. Two call forms
//! are rewritten while parsing: `print(...)` becomes a debug-print node and
//! `vec3(a,b,c)` becomes a vec3 literal. Compound assignments desugar to
//! plain assignments whose right side re-reads the left side, so `x += y`
//! and `x = x + y` produce the same tree shape. Parsing stops at the first
//! error.

use crate::ast::{
    Ast, BinaryOp, ExprId, ExprKind, FunctionStmt, ImportFunctionStmt, ParsedProgram, ParsedType,
    StmtId, StmtKind, UnaryOp,
};
use crate::error::{ParseError, ParseResult};
use crate::lexer::tokenize;
use crate::span::Span;
use crate::token::{SpannedToken, Tok};

/// Parse a whole source file.
pub fn parse(source: &str) -> ParseResult<ParsedProgram> {
    let tokens = tokenize(source)?;
    Parser::new(tokens).parse_program()
}

struct Parser {
    tokens: Vec<SpannedToken>,
    idx: usize,
    ast: Ast,
}

impl Parser {
    fn new(tokens: Vec<SpannedToken>) -> Self {
        debug_assert!(matches!(tokens.last(), Some(t) if t.tok == Tok::Eof));
        Self {
            tokens,
            idx: 0,
            ast: Ast::new(),
        }
    }

    // ==================== token management ====================

    fn peek(&self) -> &SpannedToken {
        self.peek_n(0)
    }

    fn peek_n(&self, n: usize) -> &SpannedToken {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.idx + n).min(last)]
    }

    fn bump(&mut self) {
        self.idx += 1;
    }

    fn at_eof(&self) -> bool {
        self.peek().tok == Tok::Eof
    }

    fn span(&self) -> Span {
        self.peek().span
    }

    fn match_punct(&mut self, c: char) -> bool {
        if self.peek().tok.is_punct(c) {
            self.bump();
            true
        } else {
            false
        }
    }

    /// Consume two adjacent punctuation tokens, or nothing.
    fn match_punct2(&mut self, a: char, b: char) -> bool {
        if self.peek_n(0).tok.is_punct(a) && self.peek_n(1).tok.is_punct(b) {
            self.bump();
            self.bump();
            true
        } else {
            false
        }
    }

    fn match_symbol(&mut self, name: &str) -> bool {
        if self.peek().tok.is_symbol(name) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn match_symbol2(&mut self, a: &str, b: &str) -> bool {
        if self.peek_n(0).tok.is_symbol(a) && self.peek_n(1).tok.is_symbol(b) {
            self.bump();
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, c: char) -> ParseResult<()> {
        if self.match_punct(c) {
            Ok(())
        } else {
            Err(ParseError::ExpectedChar {
                expected: c,
                found: self.peek().tok.describe(),
                span: self.span(),
            })
        }
    }

    fn expect_symbol(&mut self) -> ParseResult<(String, Span)> {
        let span = self.span();
        if let Tok::Symbol(name) = &self.peek().tok {
            let name = name.clone();
            self.bump();
            Ok((name, span))
        } else {
            Err(ParseError::ExpectedSymbol {
                found: self.peek().tok.describe(),
                span,
            })
        }
    }

    // ==================== types ====================

    /// A type starts with two symbols in a row, one symbol followed by `[]`,
    /// or `void *`.
    fn is_type_ahead(&self) -> bool {
        let t0 = &self.peek_n(0).tok;
        let t1 = &self.peek_n(1).tok;
        let t2 = &self.peek_n(2).tok;
        (matches!(t0, Tok::Symbol(_)) && matches!(t1, Tok::Symbol(_)))
            || (matches!(t0, Tok::Symbol(_)) && t1.is_punct('[') && t2.is_punct(']'))
            || (t0.is_symbol("void") && t1.is_punct('*'))
    }

    fn parse_type(&mut self) -> ParseResult<ParsedType> {
        let name = if self.match_symbol("void") {
            if self.match_punct('*') {
                "void*".to_string()
            } else {
                "void".to_string()
            }
        } else if let Tok::Symbol(name) = &self.peek().tok {
            let name = name.clone();
            self.bump();
            name
        } else {
            return Err(ParseError::ExpectedType {
                found: self.peek().tok.describe(),
                span: self.span(),
            });
        };

        let is_array = self.match_punct2('[', ']');
        Ok(ParsedType::new(name, is_array))
    }

    // ==================== expressions ====================

    fn parse_expr(&mut self) -> ParseResult<ExprId> {
        self.parse_assign()
    }

    fn parse_assign(&mut self) -> ParseResult<ExprId> {
        let span = self.span();
        let mut expr = self.parse_comparison()?;

        loop {
            let compound = if self.match_punct2('+', '=') {
                Some(BinaryOp::Add)
            } else if self.match_punct2('-', '=') {
                Some(BinaryOp::Sub)
            } else if self.match_punct2('*', '=') {
                Some(BinaryOp::Mul)
            } else if self.match_punct2('/', '=') {
                Some(BinaryOp::Div)
            } else {
                None
            };

            if let Some(op) = compound {
                let right = self.parse_assign()?;
                // x op= y  =>  x = x op y, with x shared between both sides
                let sum = self.ast.alloc_expr(
                    span,
                    ExprKind::Binary {
                        op,
                        left: expr,
                        right,
                    },
                );
                expr = self.ast.alloc_expr(
                    span,
                    ExprKind::Assign {
                        left: expr,
                        right: sum,
                    },
                );
            } else if self.match_punct('=') {
                let right = self.parse_assign()?;
                expr = self.ast.alloc_expr(span, ExprKind::Assign { left: expr, right });
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn parse_comparison(&mut self) -> ParseResult<ExprId> {
        let span = self.span();
        let mut expr = self.parse_term()?;

        loop {
            let op = if self.match_punct2('<', '=') {
                BinaryOp::Lte
            } else if self.match_punct('<') {
                BinaryOp::Lt
            } else if self.match_punct2('>', '=') {
                BinaryOp::Gte
            } else if self.match_punct('>') {
                BinaryOp::Gt
            } else if self.match_punct2('=', '=') {
                BinaryOp::Eq
            } else if self.match_punct2('!', '=') {
                BinaryOp::Neq
            } else {
                break;
            };

            let right = self.parse_term()?;
            expr = self.ast.alloc_expr(
                span,
                ExprKind::Binary {
                    op,
                    left: expr,
                    right,
                },
            );
        }

        Ok(expr)
    }

    fn parse_term(&mut self) -> ParseResult<ExprId> {
        let span = self.span();
        let mut expr = self.parse_factor()?;

        loop {
            // A '+' or '-' directly followed by '=' belongs to a compound
            // assignment, not to this level.
            let next_is_eq = self.peek_n(1).tok.is_punct('=');
            let op = if self.peek().tok.is_punct('+') && !next_is_eq {
                BinaryOp::Add
            } else if self.peek().tok.is_punct('-') && !next_is_eq {
                BinaryOp::Sub
            } else {
                break;
            };
            self.bump();

            let right = self.parse_factor()?;
            expr = self.ast.alloc_expr(
                span,
                ExprKind::Binary {
                    op,
                    left: expr,
                    right,
                },
            );
        }

        Ok(expr)
    }

    fn parse_factor(&mut self) -> ParseResult<ExprId> {
        let span = self.span();
        let mut expr = self.parse_unary()?;

        loop {
            let next_is_eq = self.peek_n(1).tok.is_punct('=');
            let op = if self.peek().tok.is_punct('*') && !next_is_eq {
                BinaryOp::Mul
            } else if self.peek().tok.is_punct('/') && !next_is_eq {
                BinaryOp::Div
            } else {
                break;
            };
            self.bump();

            let right = self.parse_unary()?;
            expr = self.ast.alloc_expr(
                span,
                ExprKind::Binary {
                    op,
                    left: expr,
                    right,
                },
            );
        }

        Ok(expr)
    }

    fn parse_unary(&mut self) -> ParseResult<ExprId> {
        let span = self.span();

        if self.match_punct('!') {
            let operand = self.parse_postfix()?;
            return Ok(self.ast.alloc_expr(
                span,
                ExprKind::Unary {
                    op: UnaryOp::Not,
                    operand,
                },
            ));
        }

        let expr = self.parse_postfix()?;
        if self.match_punct2('+', '+') {
            return Ok(self.ast.alloc_expr(
                span,
                ExprKind::Unary {
                    op: UnaryOp::PostInc,
                    operand: expr,
                },
            ));
        }
        Ok(expr)
    }

    fn parse_postfix(&mut self) -> ParseResult<ExprId> {
        let span = self.span();
        let mut expr = self.parse_call()?;

        loop {
            if self.match_punct('.') {
                let (member, _) = self.expect_symbol()?;
                expr = self.ast.alloc_expr(
                    span,
                    ExprKind::Member {
                        object: expr,
                        member,
                    },
                );
            } else if self.match_punct('[') {
                let index = self.parse_expr()?;
                self.expect_punct(']')?;
                expr = self.ast.alloc_expr(
                    span,
                    ExprKind::ArrayIndex {
                        array: expr,
                        index,
                    },
                );
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn parse_call(&mut self) -> ParseResult<ExprId> {
        let span = self.span();
        let expr = self.parse_primary()?;

        if !self.match_punct('(') {
            return Ok(expr);
        }

        let mut args = Vec::new();
        if !self.match_punct(')') {
            loop {
                args.push(self.parse_expr()?);
                if !self.match_punct(',') {
                    self.expect_punct(')')?;
                    break;
                }
            }
        }

        let kind = match &self.ast.expr(expr).kind {
            ExprKind::Symbol(name) if name == "print" => ExprKind::DebugPrint { args },
            ExprKind::Symbol(name) if name == "vec3" => {
                let [x, y, z]: [ExprId; 3] = args
                    .try_into()
                    .map_err(|_| ParseError::Vec3ArgCount { span })?;
                ExprKind::Vec3Lit([x, y, z])
            }
            _ => ExprKind::Call { callee: expr, args },
        };
        Ok(self.ast.alloc_expr(span, kind))
    }

    fn parse_primary(&mut self) -> ParseResult<ExprId> {
        let span = self.span();

        let kind = match &self.peek().tok {
            Tok::Int(v) => {
                let v = *v;
                self.bump();
                ExprKind::IntLit(v)
            }
            Tok::Float(v) => {
                let v = *v;
                self.bump();
                ExprKind::FloatLit(v)
            }
            Tok::Symbol(name) if name == "NULL" => {
                self.bump();
                ExprKind::Null
            }
            Tok::Symbol(name) => {
                let name = name.clone();
                self.bump();
                ExprKind::Symbol(name)
            }
            Tok::Str(s) => {
                let s = s.clone();
                self.bump();
                ExprKind::StrLit(s)
            }
            Tok::Punct('[') => {
                self.bump();
                return self.parse_array_literal(span);
            }
            Tok::Punct('{') => {
                self.bump();
                return self.parse_object_literal(span);
            }
            Tok::Punct('(') => {
                self.bump();
                let expr = self.parse_expr()?;
                self.expect_punct(')')?;
                return Ok(expr);
            }
            other => {
                return Err(ParseError::UnknownToken {
                    found: other.describe(),
                    span,
                });
            }
        };
        Ok(self.ast.alloc_expr(span, kind))
    }

    fn parse_array_literal(&mut self, span: Span) -> ParseResult<ExprId> {
        let mut values = Vec::new();
        if !self.match_punct(']') {
            loop {
                values.push(self.parse_expr()?);
                if !self.match_punct(',') {
                    self.expect_punct(']')?;
                    break;
                }
            }
        }
        Ok(self.ast.alloc_expr(span, ExprKind::ArrayLit(values)))
    }

    fn parse_object_literal(&mut self, span: Span) -> ParseResult<ExprId> {
        let mut names = Vec::new();
        let mut values = Vec::new();
        if !self.match_punct('}') {
            loop {
                let (name, _) = self.expect_symbol()?;
                self.expect_punct('=')?;
                names.push(name);
                values.push(self.parse_expr()?);
                if !self.match_punct(',') {
                    self.expect_punct('}')?;
                    break;
                }
            }
        }
        Ok(self.ast.alloc_expr(span, ExprKind::ObjectLit { names, values }))
    }

    // ==================== statements ====================

    fn parse_stmt(&mut self) -> ParseResult<StmtId> {
        if self.match_symbol("if") {
            self.parse_if_stmt()
        } else if self.match_symbol("for") {
            self.parse_for_stmt()
        } else if self.match_symbol("return") {
            self.parse_return_stmt()
        } else if self.is_type_ahead() {
            self.parse_var_decl_stmt()
        } else if self.peek().tok.is_punct('{') {
            let span = self.span();
            self.bump();
            self.parse_block_stmt(span)
        } else {
            let span = self.span();
            let expr = self.parse_expr()?;
            self.expect_punct(';')?;
            Ok(self.ast.alloc_stmt(span, StmtKind::Expr(expr)))
        }
    }

    fn parse_if_stmt(&mut self) -> ParseResult<StmtId> {
        let span = self.span();
        let mut conds = Vec::new();
        let mut bodies = Vec::new();
        let mut else_body = None;

        self.expect_punct('(')?;
        conds.push(self.parse_expr()?);
        self.expect_punct(')')?;
        bodies.push(self.parse_stmt()?);

        loop {
            if self.match_symbol2("else", "if") {
                self.expect_punct('(')?;
                conds.push(self.parse_expr()?);
                self.expect_punct(')')?;
                bodies.push(self.parse_stmt()?);
            } else if self.match_symbol("else") {
                else_body = Some(self.parse_stmt()?);
                break;
            } else {
                break;
            }
        }

        Ok(self.ast.alloc_stmt(
            span,
            StmtKind::If {
                conds,
                bodies,
                else_body,
            },
        ))
    }

    fn parse_for_stmt(&mut self) -> ParseResult<StmtId> {
        let span = self.span();
        self.expect_punct('(')?;
        let init = self.parse_expr()?;
        self.expect_punct(';')?;
        let cond = self.parse_expr()?;
        self.expect_punct(';')?;
        let step = self.parse_expr()?;
        self.expect_punct(')')?;
        let body = self.parse_stmt()?;
        Ok(self.ast.alloc_stmt(
            span,
            StmtKind::For {
                init,
                cond,
                step,
                body,
            },
        ))
    }

    fn parse_return_stmt(&mut self) -> ParseResult<StmtId> {
        let span = self.span();
        if self.match_punct(';') {
            return Ok(self.ast.alloc_stmt(span, StmtKind::Return(None)));
        }
        let expr = self.parse_expr()?;
        self.expect_punct(';')?;
        Ok(self.ast.alloc_stmt(span, StmtKind::Return(Some(expr))))
    }

    fn parse_block_stmt(&mut self, span: Span) -> ParseResult<StmtId> {
        let mut stmts = Vec::new();
        while !self.match_punct('}') {
            if self.at_eof() {
                return Err(ParseError::ExpectedChar {
                    expected: '}',
                    found: self.peek().tok.describe(),
                    span: self.span(),
                });
            }
            stmts.push(self.parse_stmt()?);
        }
        Ok(self.ast.alloc_stmt(span, StmtKind::Block(stmts)))
    }

    fn parse_var_decl_stmt(&mut self) -> ParseResult<StmtId> {
        let span = self.span();
        let ty = self.parse_type()?;
        let (name, name_span) = self.expect_symbol()?;

        let assign = if self.match_punct('=') {
            let left = self
                .ast
                .alloc_expr(name_span, ExprKind::Symbol(name.clone()));
            let right = self.parse_expr()?;
            Some(self.ast.alloc_expr(span, ExprKind::Assign { left, right }))
        } else {
            None
        };

        self.expect_punct(';')?;
        Ok(self.ast.alloc_stmt(span, StmtKind::VarDecl { ty, name, assign }))
    }

    // ==================== top-level forms ====================

    fn parse_program(mut self) -> ParseResult<ParsedProgram> {
        let mut top = Vec::new();

        while !self.at_eof() {
            let stmt = if self.match_symbol("import") {
                self.parse_import_stmt()?
            } else if self.match_symbol("import_function") {
                self.parse_import_function_stmt()?
            } else if self.match_symbol("struct") {
                self.parse_struct_stmt()?
            } else if self.match_symbol("enum") {
                self.parse_enum_stmt()?
            } else if self.is_type_ahead() {
                let ty = self.parse_type()?;
                if self.peek_n(1).tok.is_punct('(') {
                    self.parse_function_stmt(ty)?
                } else {
                    self.parse_global_stmt(ty)?
                }
            } else {
                return Err(ParseError::UnknownToken {
                    found: self.peek().tok.describe(),
                    span: self.span(),
                });
            };
            top.push(stmt);
        }

        Ok(ParsedProgram {
            ast: self.ast,
            top,
        })
    }

    fn parse_import_stmt(&mut self) -> ParseResult<StmtId> {
        let span = self.span();
        let path = if let Tok::Str(path) = &self.peek().tok {
            let path = path.clone();
            self.bump();
            path
        } else {
            return Err(ParseError::ExpectedString {
                found: self.peek().tok.describe(),
                span,
            });
        };
        self.expect_punct(';')?;
        Ok(self.ast.alloc_stmt(span, StmtKind::Import { path }))
    }

    fn parse_import_function_stmt(&mut self) -> ParseResult<StmtId> {
        let return_type = self.parse_type()?;
        let (name, span) = self.expect_symbol()?;
        let (param_types, param_names) = self.parse_param_list()?;
        self.expect_punct(';')?;
        Ok(self.ast.alloc_stmt(
            span,
            StmtKind::ImportFunction(ImportFunctionStmt {
                return_type,
                name,
                param_types,
                param_names,
            }),
        ))
    }

    fn parse_function_stmt(&mut self, return_type: ParsedType) -> ParseResult<StmtId> {
        let (name, span) = self.expect_symbol()?;
        let (param_types, param_names) = self.parse_param_list()?;
        self.expect_punct('{')?;
        let body = self.parse_block_stmt(span)?;
        Ok(self.ast.alloc_stmt(
            span,
            StmtKind::Function(FunctionStmt {
                return_type,
                name,
                param_types,
                param_names,
                body,
            }),
        ))
    }

    fn parse_param_list(&mut self) -> ParseResult<(Vec<ParsedType>, Vec<String>)> {
        self.expect_punct('(')?;
        let mut types = Vec::new();
        let mut names = Vec::new();
        if !self.match_punct(')') {
            loop {
                types.push(self.parse_type()?);
                let (name, _) = self.expect_symbol()?;
                names.push(name);
                if !self.match_punct(',') {
                    self.expect_punct(')')?;
                    break;
                }
            }
        }
        Ok((types, names))
    }

    fn parse_global_stmt(&mut self, ty: ParsedType) -> ParseResult<StmtId> {
        let (name, span) = self.expect_symbol()?;
        self.expect_punct('=')?;
        let init = self.parse_expr()?;
        self.expect_punct(';')?;
        Ok(self.ast.alloc_stmt(span, StmtKind::Global { ty, name, init }))
    }

    fn parse_struct_stmt(&mut self) -> ParseResult<StmtId> {
        let (name, span) = self.expect_symbol()?;
        self.expect_punct('{')?;

        let mut member_types = Vec::new();
        let mut member_names = Vec::new();
        while !self.match_punct('}') {
            let member_type = self.parse_type()?;
            loop {
                let (member_name, _) = self.expect_symbol()?;
                member_types.push(member_type.clone());
                member_names.push(member_name);
                if !self.match_punct(',') {
                    break;
                }
            }
            self.expect_punct(';')?;
        }

        Ok(self.ast.alloc_stmt(
            span,
            StmtKind::Struct {
                name,
                member_types,
                member_names,
            },
        ))
    }

    fn parse_enum_stmt(&mut self) -> ParseResult<StmtId> {
        let (name, span) = self.expect_symbol()?;
        self.expect_punct('{')?;

        let mut values = Vec::new();
        if !self.match_punct('}') {
            loop {
                let (value, _) = self.expect_symbol()?;
                values.push(value);
                if !self.match_punct(',') {
                    self.expect_punct('}')?;
                    break;
                }
            }
        }

        Ok(self.ast.alloc_stmt(span, StmtKind::Enum { name, values }))
    }
}
