//! A loaded program: one source file plus its compiled state.
//!
//! Programs are immutable after loading succeeds. A program that failed
//! keeps its first error and cannot back a VM; everything a VM needs at run
//! time (opcodes, string pool, globals layout, entry and native-call
//! metadata) is baked in by the link stage so the VM never consults the
//! loader's stores.

use std::collections::HashMap;

use mscript_parser::{Ast, StmtId};

use crate::annot::ExprMeta;
use crate::decl::{NativeCallback, NativeDecl};
use crate::error::Error;
use crate::opcode::Opcode;
use crate::symbol::SymbolTable;
use crate::types::TypeId;
use crate::value::Val;

/// Shape of a marshalled value, baked from a [`TypeId`] at link time.
#[derive(Debug, Clone, PartialEq)]
pub enum ValSpec {
    Int,
    Float,
    Bool,
    Vec3,
    VoidPtr,
    /// String-pool byte offset, passed to natives as an int
    StrOffset,
    Struct(Vec<ParamSpec>),
    Array { elem_size: i32 },
}

/// A parameter's shape plus its in-stack byte size.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub spec: ValSpec,
    pub size: i32,
}

/// Host-invocable function: entry instruction index plus marshalling
/// metadata.
#[derive(Debug, Clone)]
pub struct EntryInfo {
    pub ip: usize,
    pub params: Vec<ParamSpec>,
    pub ret_size: i32,
}

/// A registered native as the VM sees it.
#[derive(Clone)]
pub struct NativeCall {
    pub params: Vec<ParamSpec>,
    pub ret: ParamSpec,
    pub callback: NativeCallback,
}

impl std::fmt::Debug for NativeCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeCall")
            .field("params", &self.params)
            .field("ret", &self.ret)
            .finish_non_exhaustive()
    }
}

/// One global's initial value and its offset in the globals section.
#[derive(Debug, Clone)]
pub struct GlobalInit {
    pub offset: i32,
    pub value: Val,
    /// Element size when the global is an array handle, 0 otherwise
    pub elem_size: i32,
}

#[derive(Debug, Default)]
pub struct Program {
    pub(crate) name: String,
    pub(crate) ast: Ast,
    pub(crate) top: Vec<StmtId>,
    pub(crate) syms: SymbolTable,
    pub(crate) meta: ExprMeta,

    /// Indices of directly imported programs in the runtime
    pub(crate) imports: Vec<usize>,
    pub(crate) exported_types: Vec<TypeId>,
    pub(crate) exported_fns: Vec<crate::decl::FuncId>,
    pub(crate) exported_globals: Vec<crate::decl::GlobalId>,
    pub(crate) exported_consts: Vec<(String, TypeId, Val)>,
    pub(crate) natives: Vec<NativeDecl>,

    pub(crate) opcodes: Vec<Opcode>,
    /// NUL-separated string literals
    pub(crate) strings: Vec<u8>,
    pub(crate) globals_size: i32,
    pub(crate) global_inits: Vec<GlobalInit>,
    pub(crate) func_label_map: HashMap<String, usize>,
    pub(crate) entries: HashMap<String, EntryInfo>,
    pub(crate) native_calls: HashMap<String, NativeCall>,

    pub(crate) error: Option<Error>,
}

impl Program {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The first failure encountered while loading, if any.
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    pub fn is_broken(&self) -> bool {
        self.error.is_some()
    }

    /// The linked opcode vector.
    pub fn opcodes(&self) -> &[Opcode] {
        &self.opcodes
    }

    /// The string pool: concatenated NUL-terminated literals.
    pub fn strings(&self) -> &[u8] {
        &self.strings
    }

    pub fn globals_size(&self) -> i32 {
        self.globals_size
    }

    /// Absolute instruction index of each function's first opcode.
    pub fn func_label_map(&self) -> &HashMap<String, usize> {
        &self.func_label_map
    }

    /// Record the first failure; later failures are ignored.
    pub(crate) fn fail(&mut self, error: impl Into<Error>) {
        if self.error.is_none() {
            self.error = Some(error.into());
        }
    }
}
