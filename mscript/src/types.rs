//! The type store: every type and struct layout known to a runtime.
//!
//! Types live in one arena shared by all programs of a runtime, so a type
//! name resolves to the same identity on both sides of an import. Each type
//! carries the fixed byte size the VM uses for stack manipulation; array
//! types are always 4 bytes (the value is a handle).

/// Index of a type in the [`TypeStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(u32);

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a struct layout in the [`TypeStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StructId(u32);

impl StructId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Void,
    VoidStar,
    Int,
    Float,
    Bool,
    Vec3,
    CharStar,
    Enum,
    Struct(StructId),
    Array(TypeId),
}

#[derive(Debug, Clone)]
pub struct Type {
    pub name: String,
    pub kind: TypeKind,
    /// Byte size on the operand stack; -1 until a struct layout completes.
    pub size: i32,
}

#[derive(Debug, Clone)]
pub struct Member {
    pub name: String,
    pub ty: TypeId,
    pub offset: i32,
}

/// Layout progress, used to detect recursive by-value containment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutState {
    Unresolved,
    InProgress,
    Done,
}

#[derive(Debug, Clone)]
pub struct StructDecl {
    pub name: String,
    pub members: Vec<Member>,
    pub state: LayoutState,
}

impl StructDecl {
    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.name == name)
    }
}

/// Built-in type ids, fixed at store construction.
#[derive(Debug, Clone, Copy)]
pub struct Builtins {
    pub void: TypeId,
    pub void_star: TypeId,
    pub void_star_array: TypeId,
    pub int: TypeId,
    pub int_array: TypeId,
    pub float: TypeId,
    pub float_array: TypeId,
    pub vec3: TypeId,
    pub vec3_array: TypeId,
    pub bool_: TypeId,
    pub bool_array: TypeId,
    pub char_star: TypeId,
}

#[derive(Debug)]
pub struct TypeStore {
    types: Vec<Type>,
    structs: Vec<StructDecl>,
    builtins: Builtins,
}

impl TypeStore {
    pub fn new() -> Self {
        let mut types = Vec::new();
        let mut alloc = |name: &str, kind: TypeKind, size: i32| {
            let id = TypeId(types.len() as u32);
            types.push(Type {
                name: name.to_string(),
                kind,
                size,
            });
            id
        };

        let void = alloc("void", TypeKind::Void, 0);
        let void_star = alloc("void*", TypeKind::VoidStar, 4);
        let void_star_array = alloc("void*[]", TypeKind::Array(void_star), 4);
        let int = alloc("int", TypeKind::Int, 4);
        let int_array = alloc("int[]", TypeKind::Array(int), 4);
        let float = alloc("float", TypeKind::Float, 4);
        let float_array = alloc("float[]", TypeKind::Array(float), 4);
        let vec3 = alloc("vec3", TypeKind::Vec3, 12);
        let vec3_array = alloc("vec3[]", TypeKind::Array(vec3), 4);
        let bool_ = alloc("bool", TypeKind::Bool, 4);
        let bool_array = alloc("bool[]", TypeKind::Array(bool_), 4);
        let char_star = alloc("char*", TypeKind::CharStar, 4);

        Self {
            types,
            structs: Vec::new(),
            builtins: Builtins {
                void,
                void_star,
                void_star_array,
                int,
                int_array,
                float,
                float_array,
                vec3,
                vec3_array,
                bool_,
                bool_array,
                char_star,
            },
        }
    }

    pub fn builtins(&self) -> Builtins {
        self.builtins
    }

    /// Builtins in registration order, for seeding a program's symbol table.
    pub fn builtin_ids(&self) -> [TypeId; 12] {
        let b = self.builtins;
        [
            b.void,
            b.void_star,
            b.void_star_array,
            b.int,
            b.int_array,
            b.float,
            b.float_array,
            b.vec3,
            b.vec3_array,
            b.bool_,
            b.bool_array,
            b.char_star,
        ]
    }

    pub fn ty(&self, id: TypeId) -> &Type {
        &self.types[id.index()]
    }

    pub fn name(&self, id: TypeId) -> &str {
        &self.types[id.index()].name
    }

    pub fn kind(&self, id: TypeId) -> TypeKind {
        self.types[id.index()].kind
    }

    pub fn size(&self, id: TypeId) -> i32 {
        self.types[id.index()].size
    }

    pub fn strukt(&self, id: StructId) -> &StructDecl {
        &self.structs[id.index()]
    }

    /// Every struct layout known to the runtime.
    pub fn structs(&self) -> impl Iterator<Item = &StructDecl> {
        self.structs.iter()
    }

    pub(crate) fn strukt_mut(&mut self, id: StructId) -> &mut StructDecl {
        &mut self.structs[id.index()]
    }

    pub(crate) fn set_size(&mut self, id: TypeId, size: i32) {
        self.types[id.index()].size = size;
    }

    /// Register a named struct stub plus its array type. The layout is
    /// completed later by the loader.
    pub(crate) fn alloc_struct(&mut self, name: &str) -> (TypeId, TypeId, StructId) {
        let sid = StructId(self.structs.len() as u32);
        self.structs.push(StructDecl {
            name: name.to_string(),
            members: Vec::new(),
            state: LayoutState::Unresolved,
        });

        let ty = TypeId(self.types.len() as u32);
        self.types.push(Type {
            name: name.to_string(),
            kind: TypeKind::Struct(sid),
            size: -1,
        });

        let array_ty = TypeId(self.types.len() as u32);
        self.types.push(Type {
            name: format!("{}[]", name),
            kind: TypeKind::Array(ty),
            size: 4,
        });

        (ty, array_ty, sid)
    }

    /// Register a named enum type plus its array type.
    pub(crate) fn alloc_enum(&mut self, name: &str) -> (TypeId, TypeId) {
        let ty = TypeId(self.types.len() as u32);
        self.types.push(Type {
            name: name.to_string(),
            kind: TypeKind::Enum,
            size: 4,
        });

        let array_ty = TypeId(self.types.len() as u32);
        self.types.push(Type {
            name: format!("{}[]", name),
            kind: TypeKind::Array(ty),
            size: 4,
        });

        (ty, array_ty)
    }
}

impl Default for TypeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_sizes() {
        let store = TypeStore::new();
        let b = store.builtins();
        assert_eq!(store.size(b.void), 0);
        assert_eq!(store.size(b.int), 4);
        assert_eq!(store.size(b.vec3), 12);
        // array handles are 4 bytes regardless of element type
        assert_eq!(store.size(b.vec3_array), 4);
        assert_eq!(store.size(b.char_star), 4);
    }

    #[test]
    fn test_struct_stub_then_layout() {
        let mut store = TypeStore::new();
        let b = store.builtins();
        let (ty, array_ty, sid) = store.alloc_struct("point");
        assert_eq!(store.size(ty), -1);
        assert_eq!(store.size(array_ty), 4);
        assert_eq!(store.name(array_ty), "point[]");

        let decl = store.strukt_mut(sid);
        decl.members = vec![
            Member {
                name: "x".into(),
                ty: b.float,
                offset: 0,
            },
            Member {
                name: "y".into(),
                ty: b.float,
                offset: 4,
            },
        ];
        decl.state = LayoutState::Done;
        store.set_size(ty, 8);

        assert_eq!(store.size(ty), 8);
        assert_eq!(store.strukt(sid).member("y").map(|m| m.offset), Some(4));
    }
}
