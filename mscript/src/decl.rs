//! Function, global and native-function declarations.
//!
//! Declarations live in runtime-wide stores addressed by index, so an
//! importing program's symbol table can share the exporting program's decl
//! without copying it. Signatures are stubbed first (forward references) and
//! patched by the loader once every type is known.

use std::fmt;
use std::sync::Arc;

use crate::opcode::Opcode;
use crate::types::TypeId;
use crate::value::Val;

/// Index of a function declaration in the [`FnStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(u32);

impl FuncId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a global declaration in the [`GlobalStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalId(u32);

impl GlobalId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: TypeId,
}

/// A script function. `opcodes` holds the intermediate stream until the
/// link pass of each program that can see the function consumes it.
#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub name: String,
    pub return_ty: Option<TypeId>,
    pub params: Vec<Param>,
    /// Total byte size of the arguments below the frame header
    pub args_size: i32,
    /// Peak concurrent local footprint of the body, reserved by `PUSH`
    pub block_size: i32,
    pub opcodes: Vec<Opcode>,
}

#[derive(Debug, Default)]
pub struct FnStore {
    decls: Vec<FunctionDecl>,
}

impl FnStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, name: &str) -> FuncId {
        let id = FuncId(self.decls.len() as u32);
        self.decls.push(FunctionDecl {
            name: name.to_string(),
            return_ty: None,
            params: Vec::new(),
            args_size: 0,
            block_size: 0,
            opcodes: Vec::new(),
        });
        id
    }

    pub fn get(&self, id: FuncId) -> &FunctionDecl {
        &self.decls[id.index()]
    }

    pub fn get_mut(&mut self, id: FuncId) -> &mut FunctionDecl {
        &mut self.decls[id.index()]
    }
}

/// A global variable. The offset into each program's globals section is
/// per-program state kept on the symbol, not here.
#[derive(Debug, Clone)]
pub struct GlobalDecl {
    pub name: String,
    pub ty: Option<TypeId>,
    /// Folded initializer, if the declaration has one
    pub init: Option<Val>,
}

#[derive(Debug, Default)]
pub struct GlobalStore {
    decls: Vec<GlobalDecl>,
}

impl GlobalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, name: &str) -> GlobalId {
        let id = GlobalId(self.decls.len() as u32);
        self.decls.push(GlobalDecl {
            name: name.to_string(),
            ty: None,
            init: None,
        });
        id
    }

    pub fn get(&self, id: GlobalId) -> &GlobalDecl {
        &self.decls[id.index()]
    }

    pub fn get_mut(&mut self, id: GlobalId) -> &mut GlobalDecl {
        &mut self.decls[id.index()]
    }
}

/// Callback invoked by `C_CALL`. Receives the decoded argument values and
/// returns the value the VM writes back to the top of the stack.
pub type NativeCallback = Arc<dyn Fn(&[Val]) -> Val + Send + Sync>;

/// A host-registered callable, declared by name and type-name signature.
#[derive(Clone)]
pub struct NativeSpec {
    pub name: String,
    pub return_type: String,
    pub params: Vec<String>,
    pub callback: NativeCallback,
}

impl NativeSpec {
    pub fn new(
        name: impl Into<String>,
        return_type: impl Into<String>,
        params: &[&str],
        callback: impl Fn(&[Val]) -> Val + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            return_type: return_type.into(),
            params: params.iter().map(|p| p.to_string()).collect(),
            callback: Arc::new(callback),
        }
    }
}

impl fmt::Debug for NativeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeSpec")
            .field("name", &self.name)
            .field("return_type", &self.return_type)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// A native function as seen by one program. `import_function` declarations
/// start unresolved; the loader fills in the signature and looks up the
/// host callback by name.
#[derive(Clone)]
pub struct NativeDecl {
    pub name: String,
    pub return_ty: Option<TypeId>,
    pub params: Vec<TypeId>,
    pub callback: Option<NativeCallback>,
}

impl NativeDecl {
    pub fn unresolved(name: &str) -> Self {
        Self {
            name: name.to_string(),
            return_ty: None,
            params: Vec::new(),
            callback: None,
        }
    }
}

impl fmt::Debug for NativeDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeDecl")
            .field("name", &self.name)
            .field("return_ty", &self.return_ty)
            .field("params", &self.params)
            .field("resolved", &self.callback.is_some())
            .finish()
    }
}
