//! Seven-stage loader.
//!
//! A [`Runtime`] loads a set of source files together. Each stage visits
//! every file before the next stage begins, so cross-file imports resolve
//! in the right order; a file whose pipeline already failed is skipped by
//! later stages, and its first error stays on the program.
//!
//! 1. parse and stub every top-level declaration,
//! 2. resolve `import` statements to loaded programs,
//! 3. transitively copy exported symbols and register host natives,
//! 4. complete struct layouts and resolve declaration signatures,
//! 5. lay out the globals section and type-check every function body,
//! 6. compile every function body to intermediate opcodes,
//! 7. run the link pass and bake the VM-facing metadata.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::Path;

use mscript_parser::{parse, ParsedType, Span, StmtId, StmtKind};

use crate::annot::ExprMeta;
use crate::check::FnCtx;
use crate::compile::compile_function;
use crate::decl::{FnStore, FuncId, GlobalId, GlobalStore, NativeDecl, NativeSpec, Param};
use crate::error::CompileError;
use crate::link;
use crate::program::{EntryInfo, GlobalInit, NativeCall, ParamSpec, Program, ValSpec};
use crate::symbol::{Symbol, SymbolTable};
use crate::types::{LayoutState, Member, StructId, TypeId, TypeKind, TypeStore};
use crate::value::Val;

/// All programs loaded from one source directory, indexed by name.
#[derive(Debug)]
pub struct Runtime {
    types: TypeStore,
    fns: FnStore,
    globals: GlobalStore,
    programs: Vec<Program>,
    by_name: HashMap<String, usize>,
    struct_sources: HashMap<StructId, (usize, StmtId)>,
}

impl Runtime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    /// Load every `*.mscript` file in a directory.
    pub fn create(dir: impl AsRef<Path>) -> io::Result<Runtime> {
        Self::builder().load_dir(dir)
    }

    /// Load in-memory `(name, source)` pairs through the same stages.
    pub fn from_sources(sources: &[(&str, &str)]) -> Runtime {
        Self::builder().load_sources(sources)
    }

    /// The program whose name matches, e.g. `"tests.mscript"`.
    pub fn program(&self, name: &str) -> Option<&Program> {
        self.by_name.get(name).map(|&idx| &self.programs[idx])
    }

    pub fn programs(&self) -> impl Iterator<Item = &Program> {
        self.programs.iter()
    }

    pub fn types(&self) -> &TypeStore {
        &self.types
    }
}

#[derive(Debug, Default)]
pub struct RuntimeBuilder {
    natives: Vec<NativeSpec>,
}

impl RuntimeBuilder {
    /// Register a host callable, available to every loaded program.
    pub fn native(mut self, spec: NativeSpec) -> Self {
        self.natives.push(spec);
        self
    }

    pub fn load_dir(self, dir: impl AsRef<Path>) -> io::Result<Runtime> {
        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|entry| entry.path())
            .filter(|path| path.extension().map(|ext| ext == "mscript").unwrap_or(false))
            .collect();
        paths.sort();

        let mut sources = Vec::new();
        for path in paths {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let text = std::fs::read_to_string(&path)?;
            sources.push((name, text));
        }

        let borrowed: Vec<(&str, &str)> = sources
            .iter()
            .map(|(name, text)| (name.as_str(), text.as_str()))
            .collect();
        Ok(self.load_sources(&borrowed))
    }

    pub fn load_sources(self, sources: &[(&str, &str)]) -> Runtime {
        let mut runtime = Runtime {
            types: TypeStore::new(),
            fns: FnStore::new(),
            globals: GlobalStore::new(),
            programs: Vec::new(),
            by_name: HashMap::new(),
            struct_sources: HashMap::new(),
        };

        for (name, source) in sources {
            runtime.stage_parse(name, source);
        }
        let count = runtime.programs.len();
        for idx in 0..count {
            runtime.stage_resolve_imports(idx);
        }
        for idx in 0..count {
            runtime.stage_copy_exports(idx, &self.natives);
        }
        for idx in 0..count {
            runtime.stage_resolve_decls(idx, &self.natives);
        }
        for idx in 0..count {
            runtime.stage_check(idx);
        }
        for idx in 0..count {
            runtime.stage_compile(idx);
        }
        for idx in 0..count {
            runtime.stage_link(idx);
        }
        runtime
    }
}

fn ensure_undeclared(syms: &SymbolTable, name: &str, span: Span) -> Result<(), CompileError> {
    if syms.get(name).is_some() {
        return Err(CompileError::Redeclaration {
            name: name.to_string(),
            span,
        });
    }
    Ok(())
}

impl Runtime {
    // ==================== stage 1: parse and stub ====================

    fn stage_parse(&mut self, name: &str, source: &str) {
        let idx = self.programs.len();
        let mut prog = Program::new(name);

        match parse(source) {
            Err(e) => prog.fail(e),
            Ok(parsed) => {
                prog.meta = ExprMeta::new(parsed.ast.expr_count());
                prog.ast = parsed.ast;
                prog.top = parsed.top;

                self.seed_builtins(&mut prog);
                if let Err(e) = self.add_decl_stubs(idx, &mut prog) {
                    prog.fail(e);
                }
            }
        }

        self.by_name.insert(name.to_string(), idx);
        self.programs.push(prog);
    }

    fn seed_builtins(&self, prog: &mut Program) {
        for ty in self.types.builtin_ids() {
            prog.syms.add_type(self.types.name(ty), ty);
        }
        let b = self.types.builtins();
        prog.syms.add_const("false", b.bool_, Val::Bool(false));
        prog.syms.add_const("true", b.bool_, Val::Bool(true));
        prog.syms.add_const("PI", b.float, Val::Float(3.14159));
    }

    fn add_decl_stubs(&mut self, idx: usize, prog: &mut Program) -> Result<(), CompileError> {
        for i in 0..prog.top.len() {
            let stmt_id = prog.top[i];
            let span = prog.ast.stmt(stmt_id).span;
            match &prog.ast.stmt(stmt_id).kind {
                StmtKind::Import { .. } => {}
                StmtKind::Enum { name, values } => {
                    ensure_undeclared(&prog.syms, name, span)?;
                    let (ty, array_ty) = self.types.alloc_enum(name);
                    for (i, value) in values.iter().enumerate() {
                        ensure_undeclared(&prog.syms, value, span)?;
                        prog.syms.add_const(value, ty, Val::Int(i as i32));
                        prog.exported_consts
                            .push((value.clone(), ty, Val::Int(i as i32)));
                    }
                    prog.syms.add_type(self.types.name(ty), ty);
                    prog.syms.add_type(self.types.name(array_ty), array_ty);
                    prog.exported_types.push(ty);
                    prog.exported_types.push(array_ty);
                }
                StmtKind::Struct { name, .. } => {
                    ensure_undeclared(&prog.syms, name, span)?;
                    let (ty, array_ty, sid) = self.types.alloc_struct(name);
                    self.struct_sources.insert(sid, (idx, stmt_id));
                    prog.syms.add_type(self.types.name(ty), ty);
                    prog.syms.add_type(self.types.name(array_ty), array_ty);
                    prog.exported_types.push(ty);
                    prog.exported_types.push(array_ty);
                }
                StmtKind::Global { name, .. } => {
                    ensure_undeclared(&prog.syms, name, span)?;
                    let gid = self.globals.alloc(name);
                    prog.syms.add_global(name, gid);
                    prog.exported_globals.push(gid);
                }
                StmtKind::Function(f) => {
                    ensure_undeclared(&prog.syms, &f.name, span)?;
                    let fid = self.fns.alloc(&f.name);
                    prog.syms.add_function(&f.name, fid);
                    prog.exported_fns.push(fid);
                }
                StmtKind::ImportFunction(f) => {
                    ensure_undeclared(&prog.syms, &f.name, span)?;
                    let native_idx = prog.natives.len();
                    prog.natives.push(NativeDecl::unresolved(&f.name));
                    prog.syms.add_native(&f.name, native_idx);
                }
                _ => unreachable!("non-declaration at top level"),
            }
        }
        Ok(())
    }

    // ==================== stage 2: resolve imports ====================

    fn stage_resolve_imports(&mut self, idx: usize) {
        if self.programs[idx].error.is_some() {
            return;
        }

        let mut requests: Vec<(String, Span)> = Vec::new();
        {
            let prog = &self.programs[idx];
            for &stmt_id in &prog.top {
                if let StmtKind::Import { path } = &prog.ast.stmt(stmt_id).kind {
                    requests.push((path.clone(), prog.ast.stmt(stmt_id).span));
                }
            }
        }

        let mut imports = Vec::new();
        let mut failure = None;
        for (path, span) in requests {
            match self.by_name.get(&path) {
                None => {
                    failure = Some(CompileError::ImportNotFound { name: path, span });
                    break;
                }
                Some(&import_idx) => {
                    if self.programs[import_idx].error.is_some() {
                        failure = Some(CompileError::ImportFailed { name: path, span });
                        break;
                    }
                    imports.push(import_idx);
                }
            }
        }

        let prog = &mut self.programs[idx];
        prog.imports = imports;
        if let Some(e) = failure {
            prog.fail(e);
        }
    }

    // ==================== stage 3: copy exports, register natives ====================

    fn stage_copy_exports(&mut self, idx: usize, natives: &[NativeSpec]) {
        if self.programs[idx].error.is_some() {
            return;
        }

        // transitive preorder over imports; the visited set breaks cycles
        let mut visited: HashSet<usize> = HashSet::new();
        visited.insert(idx);
        let mut order: Vec<usize> = Vec::new();
        let mut stack: Vec<usize> = self.programs[idx].imports.iter().rev().copied().collect();
        while let Some(import_idx) = stack.pop() {
            if !visited.insert(import_idx) {
                continue;
            }
            order.push(import_idx);
            for &next in self.programs[import_idx].imports.iter().rev() {
                stack.push(next);
            }
        }

        let mut types_in: Vec<TypeId> = Vec::new();
        let mut fns_in: Vec<FuncId> = Vec::new();
        let mut globals_in: Vec<GlobalId> = Vec::new();
        let mut consts_in: Vec<(String, TypeId, Val)> = Vec::new();
        for import_idx in order {
            let import = &self.programs[import_idx];
            types_in.extend(import.exported_types.iter().copied());
            fns_in.extend(import.exported_fns.iter().copied());
            globals_in.extend(import.exported_globals.iter().copied());
            consts_in.extend(import.exported_consts.iter().cloned());
        }

        let result: Result<(), CompileError> = (|| {
            let prog = &mut self.programs[idx];
            for ty in types_in {
                let name = self.types.name(ty).to_string();
                ensure_undeclared(&prog.syms, &name, Span::empty())?;
                prog.syms.add_type(&name, ty);
            }
            for fid in fns_in {
                let name = self.fns.get(fid).name.clone();
                ensure_undeclared(&prog.syms, &name, Span::empty())?;
                prog.syms.add_function(&name, fid);
            }
            for gid in globals_in {
                let name = self.globals.get(gid).name.clone();
                ensure_undeclared(&prog.syms, &name, Span::empty())?;
                prog.syms.add_global(&name, gid);
            }
            for (name, ty, value) in consts_in {
                ensure_undeclared(&prog.syms, &name, Span::empty())?;
                prog.syms.add_const(&name, ty, value);
            }
            Ok(())
        })();
        if let Err(e) = result {
            self.programs[idx].fail(e);
            return;
        }

        self.register_natives(idx, natives);
    }

    /// Install host callables whose signatures resolve in this program.
    /// A script declaration with the same name wins over the registry.
    fn register_natives(&mut self, idx: usize, natives: &[NativeSpec]) {
        let prog = &mut self.programs[idx];
        'specs: for spec in natives {
            if prog.syms.get(&spec.name).is_some() {
                continue;
            }
            let return_ty = match prog.syms.get_type(&spec.return_type) {
                Some(ty) => ty,
                None => continue,
            };
            let mut params = Vec::new();
            for param in &spec.params {
                match prog.syms.get_type(param) {
                    Some(ty) => params.push(ty),
                    None => continue 'specs,
                }
            }

            let native_idx = prog.natives.len();
            prog.natives.push(NativeDecl {
                name: spec.name.clone(),
                return_ty: Some(return_ty),
                params,
                callback: Some(spec.callback.clone()),
            });
            prog.syms.add_native(&spec.name, native_idx);
        }
    }

    // ==================== stage 4: resolve declarations ====================

    fn stage_resolve_decls(&mut self, idx: usize, natives: &[NativeSpec]) {
        if self.programs[idx].error.is_some() {
            return;
        }

        if let Err(e) = self.resolve_structs(idx) {
            self.programs[idx].fail(e);
            return;
        }
        if let Err(e) = self.resolve_global_types(idx) {
            self.programs[idx].fail(e);
            return;
        }
        if let Err(e) = self.resolve_signatures(idx, natives) {
            self.programs[idx].fail(e);
            return;
        }
        if let Err(e) = self.resolve_global_inits(idx) {
            self.programs[idx].fail(e);
        }
    }

    fn resolve_structs(&mut self, idx: usize) -> Result<(), CompileError> {
        let struct_stmts: Vec<(String, Span)> = {
            let prog = &self.programs[idx];
            prog.top
                .iter()
                .filter_map(|&stmt_id| match &prog.ast.stmt(stmt_id).kind {
                    StmtKind::Struct { name, .. } => {
                        Some((name.clone(), prog.ast.stmt(stmt_id).span))
                    }
                    _ => None,
                })
                .collect()
        };

        for (name, span) in struct_stmts {
            let ty = self.programs[idx]
                .syms
                .get_type(&name)
                .ok_or_else(|| CompileError::UndefinedType {
                    name: name.clone(),
                    span,
                })?;
            self.patch_struct_layout(idx, ty, span)?;
        }
        Ok(())
    }

    /// Resolve one struct's members and byte layout, recursing into member
    /// structs. A member found mid-layout is a containment cycle; arrays
    /// and `void*` break cycles because they are handles.
    fn patch_struct_layout(
        &mut self,
        idx: usize,
        ty: TypeId,
        span: Span,
    ) -> Result<(), CompileError> {
        let sid = match self.types.kind(ty) {
            TypeKind::Struct(sid) => sid,
            _ => return Ok(()),
        };
        if self.types.strukt(sid).state != LayoutState::Unresolved {
            return Ok(());
        }

        let (src_idx, stmt_id) = match self.struct_sources.get(&sid) {
            Some(&src) => src,
            None => return Ok(()),
        };
        let (member_types, member_names): (Vec<ParsedType>, Vec<String>) = {
            match &self.programs[src_idx].ast.stmt(stmt_id).kind {
                StmtKind::Struct {
                    member_types,
                    member_names,
                    ..
                } => (member_types.clone(), member_names.clone()),
                _ => unreachable!("struct source points at a non-struct"),
            }
        };

        let mut members = Vec::with_capacity(member_names.len());
        for (parsed, name) in member_types.iter().zip(&member_names) {
            let member_ty = self.programs[idx]
                .syms
                .get_type(&parsed.key())
                .ok_or_else(|| CompileError::UndefinedType {
                    name: parsed.key(),
                    span,
                })?;
            members.push(Member {
                name: name.clone(),
                ty: member_ty,
                offset: 0,
            });
        }

        {
            let decl = self.types.strukt_mut(sid);
            decl.members = members;
            decl.state = LayoutState::InProgress;
        }

        let mut size = 0;
        for i in 0..member_names.len() {
            let member_ty = self.types.strukt(sid).members[i].ty;
            if let TypeKind::Struct(member_sid) = self.types.kind(member_ty) {
                match self.types.strukt(member_sid).state {
                    LayoutState::Unresolved => self.patch_struct_layout(idx, member_ty, span)?,
                    LayoutState::InProgress => {
                        return Err(CompileError::RecursiveStruct {
                            name: self.types.strukt(sid).name.clone(),
                            span,
                        });
                    }
                    LayoutState::Done => {}
                }
            }
            self.types.strukt_mut(sid).members[i].offset = size;
            size += self.types.size(member_ty);
        }

        self.types.set_size(ty, size);
        self.types.strukt_mut(sid).state = LayoutState::Done;
        Ok(())
    }

    fn resolve_global_types(&mut self, idx: usize) -> Result<(), CompileError> {
        let globals: Vec<(String, ParsedType, Span)> = {
            let prog = &self.programs[idx];
            prog.top
                .iter()
                .filter_map(|&stmt_id| match &prog.ast.stmt(stmt_id).kind {
                    StmtKind::Global { ty, name, .. } => {
                        Some((name.clone(), ty.clone(), prog.ast.stmt(stmt_id).span))
                    }
                    _ => None,
                })
                .collect()
        };

        for (name, parsed, span) in globals {
            let gid = match self.programs[idx].syms.get(&name) {
                Some(Symbol::GlobalVar { global, .. }) => *global,
                _ => continue,
            };
            let ty = self.programs[idx]
                .syms
                .get_type(&parsed.key())
                .ok_or_else(|| CompileError::UndefinedType {
                    name: parsed.key(),
                    span,
                })?;
            self.globals.get_mut(gid).ty = Some(ty);
        }
        Ok(())
    }

    fn resolve_signatures(&mut self, idx: usize, natives: &[NativeSpec]) -> Result<(), CompileError> {
        for i in 0..self.programs[idx].top.len() {
            let stmt_id = self.programs[idx].top[i];
            let span = self.programs[idx].ast.stmt(stmt_id).span;

            enum Sig {
                Function(String, Vec<ParsedType>, Vec<String>, ParsedType),
                Native(String, Vec<ParsedType>, ParsedType),
            }
            let sig = match &self.programs[idx].ast.stmt(stmt_id).kind {
                StmtKind::Function(f) => Sig::Function(
                    f.name.clone(),
                    f.param_types.clone(),
                    f.param_names.clone(),
                    f.return_type.clone(),
                ),
                StmtKind::ImportFunction(f) => {
                    Sig::Native(f.name.clone(), f.param_types.clone(), f.return_type.clone())
                }
                _ => continue,
            };

            match sig {
                Sig::Function(name, param_types, param_names, return_type) => {
                    let fid = match self.programs[idx].syms.get_function(&name) {
                        Some(fid) => fid,
                        None => continue,
                    };
                    let return_ty = self.resolve_type(idx, &return_type, span)?;
                    let mut params = Vec::new();
                    let mut args_size = 0;
                    for (parsed, param_name) in param_types.iter().zip(&param_names) {
                        let ty = self.resolve_type(idx, parsed, span)?;
                        args_size += self.types.size(ty);
                        params.push(Param {
                            name: param_name.clone(),
                            ty,
                        });
                    }
                    let decl = self.fns.get_mut(fid);
                    decl.return_ty = Some(return_ty);
                    decl.params = params;
                    decl.args_size = args_size;
                }
                Sig::Native(name, param_types, return_type) => {
                    let return_ty = self.resolve_type(idx, &return_type, span)?;
                    let mut params = Vec::new();
                    for parsed in &param_types {
                        params.push(self.resolve_type(idx, parsed, span)?);
                    }
                    let callback = natives
                        .iter()
                        .find(|spec| spec.name == name)
                        .map(|spec| spec.callback.clone())
                        .ok_or_else(|| CompileError::UndefinedFunction {
                            name: name.clone(),
                            span,
                        })?;

                    let prog = &mut self.programs[idx];
                    if let Some(Symbol::Native(native_idx)) = prog.syms.get(&name) {
                        let decl = &mut prog.natives[*native_idx];
                        decl.return_ty = Some(return_ty);
                        decl.params = params;
                        decl.callback = Some(callback);
                    }
                }
            }
        }
        Ok(())
    }

    fn resolve_type(
        &self,
        idx: usize,
        parsed: &ParsedType,
        span: Span,
    ) -> Result<TypeId, CompileError> {
        self.programs[idx]
            .syms
            .get_type(&parsed.key())
            .ok_or_else(|| CompileError::UndefinedType {
                name: parsed.key(),
                span,
            })
    }

    fn resolve_global_inits(&mut self, idx: usize) -> Result<(), CompileError> {
        let globals: Vec<(String, mscript_parser::ExprId)> = {
            let prog = &self.programs[idx];
            prog.top
                .iter()
                .filter_map(|&stmt_id| match &prog.ast.stmt(stmt_id).kind {
                    StmtKind::Global { name, init, .. } => Some((name.clone(), *init)),
                    _ => None,
                })
                .collect()
        };

        for (name, init) in globals {
            let prog = &mut self.programs[idx];
            let gid = match prog.syms.get(&name) {
                Some(Symbol::GlobalVar { global, .. }) => *global,
                _ => continue,
            };

            let mut ctx = FnCtx {
                types: &self.types,
                fns: &mut self.fns,
                globals: &self.globals,
                natives: &prog.natives,
                syms: &mut prog.syms,
                ast: &prog.ast,
                meta: &mut prog.meta,
                cur_fn: None,
            };
            let value = ctx.check_global_init(gid, init, &name)?;
            self.globals.get_mut(gid).init = Some(value);
        }
        Ok(())
    }

    // ==================== stage 5: globals layout, check bodies ====================

    fn stage_check(&mut self, idx: usize) {
        if self.programs[idx].error.is_some() {
            return;
        }

        // assign every visible global a byte offset in this program's
        // globals section, in name order
        let global_syms: Vec<(String, GlobalId)> = self.programs[idx]
            .syms
            .globals_sorted()
            .into_iter()
            .filter_map(|(name, symbol)| match symbol {
                Symbol::GlobalVar { global, .. } => Some((name.to_string(), *global)),
                _ => None,
            })
            .collect();

        let mut offset = 0;
        for (name, gid) in global_syms {
            let size = self.globals.get(gid).ty.map(|ty| self.types.size(ty)).unwrap_or(0);
            self.programs[idx].syms.set_global_offset(&name, offset);
            offset += size;
        }
        self.programs[idx].globals_size = offset;

        // check every function body
        let fn_stmts: Vec<StmtId> = {
            let prog = &self.programs[idx];
            prog.top
                .iter()
                .filter(|&&stmt_id| {
                    matches!(prog.ast.stmt(stmt_id).kind, StmtKind::Function(_))
                })
                .copied()
                .collect()
        };

        for stmt_id in fn_stmts {
            let prog = &mut self.programs[idx];
            let stmt = prog.ast.stmt(stmt_id);
            let span = stmt.span;
            let f = match &stmt.kind {
                StmtKind::Function(f) => f,
                _ => continue,
            };
            let fid = match prog.syms.get_function(&f.name) {
                Some(fid) => fid,
                None => continue,
            };

            let mut ctx = FnCtx {
                types: &self.types,
                fns: &mut self.fns,
                globals: &self.globals,
                natives: &prog.natives,
                syms: &mut prog.syms,
                ast: &prog.ast,
                meta: &mut prog.meta,
                cur_fn: None,
            };
            if let Err(e) = ctx.check_function(fid, f, span) {
                prog.fail(e);
                return;
            }
        }
    }

    // ==================== stage 6: compile bodies ====================

    fn stage_compile(&mut self, idx: usize) {
        if self.programs[idx].error.is_some() {
            return;
        }

        let targets: Vec<(FuncId, StmtId)> = {
            let prog = &self.programs[idx];
            prog.top
                .iter()
                .filter_map(|&stmt_id| match &prog.ast.stmt(stmt_id).kind {
                    StmtKind::Function(f) => prog
                        .syms
                        .get_function(&f.name)
                        .map(|fid| (fid, f.body)),
                    _ => None,
                })
                .collect()
        };

        for (fid, body) in targets {
            let prog = &self.programs[idx];
            let opcodes = compile_function(
                &self.types,
                &self.fns,
                &prog.syms,
                &prog.ast,
                &prog.meta,
                fid,
                body,
            );
            self.fns.get_mut(fid).opcodes = opcodes;
        }
    }

    // ==================== stage 7: link ====================

    fn stage_link(&mut self, idx: usize) {
        if self.programs[idx].error.is_some() {
            return;
        }

        // every function visible to this program, in name order
        let fn_ids: Vec<FuncId> = self.programs[idx]
            .syms
            .globals_sorted()
            .into_iter()
            .filter_map(|(_, symbol)| match symbol {
                Symbol::Function(fid) => Some(*fid),
                _ => None,
            })
            .collect();

        let linked = link::link(&fn_ids, &self.fns, &self.programs[idx].syms);
        let linked = match linked {
            Ok(linked) => linked,
            Err(e) => {
                self.programs[idx].fail(e);
                return;
            }
        };

        // bake the VM-facing metadata
        let mut entries = HashMap::new();
        let mut native_calls = HashMap::new();
        let mut global_inits = Vec::new();
        {
            let prog = &self.programs[idx];
            for (name, symbol) in prog.syms.globals_sorted() {
                match symbol {
                    Symbol::Function(fid) => {
                        let decl = self.fns.get(*fid);
                        let ip = match linked.func_label_map.get(name) {
                            Some(&ip) => ip,
                            None => continue,
                        };
                        let params = decl
                            .params
                            .iter()
                            .map(|p| param_spec(&self.types, p.ty))
                            .collect();
                        let ret_size = decl
                            .return_ty
                            .map(|ty| self.types.size(ty))
                            .unwrap_or(0);
                        entries.insert(
                            name.to_string(),
                            EntryInfo {
                                ip,
                                params,
                                ret_size,
                            },
                        );
                    }
                    Symbol::GlobalVar { global, offset } => {
                        let decl = self.globals.get(*global);
                        if let (Some(ty), Some(value)) = (decl.ty, decl.init.clone()) {
                            let elem_size = match self.types.kind(ty) {
                                TypeKind::Array(elem) => self.types.size(elem),
                                _ => 0,
                            };
                            global_inits.push(GlobalInit {
                                offset: *offset,
                                value,
                                elem_size,
                            });
                        }
                    }
                    _ => {}
                }
            }

            for decl in &prog.natives {
                if let (Some(return_ty), Some(callback)) = (decl.return_ty, decl.callback.clone())
                {
                    native_calls.insert(
                        decl.name.clone(),
                        NativeCall {
                            params: decl
                                .params
                                .iter()
                                .map(|&ty| param_spec(&self.types, ty))
                                .collect(),
                            ret: param_spec(&self.types, return_ty),
                            callback,
                        },
                    );
                }
            }
        }

        let prog = &mut self.programs[idx];
        prog.opcodes = linked.opcodes;
        prog.strings = linked.strings;
        prog.func_label_map = linked.func_label_map;
        prog.entries = entries;
        prog.native_calls = native_calls;
        prog.global_inits = global_inits;
    }
}

/// Bake a [`TypeId`] into the marshalling shape the VM uses at its edges.
fn param_spec(types: &TypeStore, ty: TypeId) -> ParamSpec {
    let size = types.size(ty);
    let spec = match types.kind(ty) {
        TypeKind::Void | TypeKind::Int | TypeKind::Enum => ValSpec::Int,
        TypeKind::Float => ValSpec::Float,
        TypeKind::Bool => ValSpec::Bool,
        TypeKind::Vec3 => ValSpec::Vec3,
        TypeKind::VoidStar => ValSpec::VoidPtr,
        TypeKind::CharStar => ValSpec::StrOffset,
        TypeKind::Struct(sid) => ValSpec::Struct(
            types
                .strukt(sid)
                .members
                .iter()
                .map(|m| param_spec(types, m.ty))
                .collect(),
        ),
        TypeKind::Array(elem) => ValSpec::Array {
            elem_size: types.size(elem),
        },
    };
    ParamSpec { spec, size }
}
