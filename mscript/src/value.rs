//! Tagged values exchanged between the host and the language core.
//!
//! The same representation serves two roles: arguments and global
//! initializers supplied by the host, and constants folded by the checker.

/// A tagged value.
#[derive(Debug, Clone, PartialEq)]
pub enum Val {
    Int(i32),
    Float(f32),
    Bool(bool),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    /// Opaque 32-bit host handle
    VoidPtr(u32),
    /// Struct members in declaration order
    Object(Vec<Val>),
    /// Array elements; becomes a fresh array-table entry when it reaches a VM
    Array(Vec<Val>),
}

impl Val {
    /// Size in bytes of the value's flattened in-stack encoding. Arrays
    /// count as a 4-byte handle.
    pub fn byte_size(&self) -> i32 {
        match self {
            Val::Int(_) | Val::Float(_) | Val::Bool(_) | Val::VoidPtr(_) | Val::Array(_) => 4,
            Val::Vec2(_) => 8,
            Val::Vec3(_) => 12,
            Val::Object(members) => members.iter().map(Val::byte_size).sum(),
        }
    }

    /// Flatten into the VM's little-endian stack encoding. Array values are
    /// not flattenable (they become table entries, not bytes).
    pub(crate) fn write_bytes(&self, out: &mut Vec<u8>) {
        match self {
            Val::Int(v) => out.extend_from_slice(&v.to_le_bytes()),
            Val::Float(v) => out.extend_from_slice(&v.to_le_bytes()),
            Val::Bool(v) => out.extend_from_slice(&(*v as i32).to_le_bytes()),
            Val::VoidPtr(v) => out.extend_from_slice(&v.to_le_bytes()),
            Val::Vec2(v) => {
                for c in v {
                    out.extend_from_slice(&c.to_le_bytes());
                }
            }
            Val::Vec3(v) => {
                for c in v {
                    out.extend_from_slice(&c.to_le_bytes());
                }
            }
            Val::Object(members) => {
                for member in members {
                    member.write_bytes(out);
                }
            }
            Val::Array(_) => debug_assert!(false, "array values have no byte encoding"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_sizes() {
        assert_eq!(Val::Int(1).byte_size(), 4);
        assert_eq!(Val::Vec3([0.0; 3]).byte_size(), 12);
        assert_eq!(
            Val::Object(vec![Val::Int(1), Val::Vec3([0.0; 3])]).byte_size(),
            16
        );
        assert_eq!(Val::Array(vec![Val::Int(1); 8]).byte_size(), 4);
    }

    #[test]
    fn test_object_flattens_contiguously() {
        let val = Val::Object(vec![Val::Int(7), Val::Float(1.5)]);
        let mut bytes = Vec::new();
        val.write_bytes(&mut bytes);
        assert_eq!(&bytes[0..4], &7i32.to_le_bytes());
        assert_eq!(&bytes[4..8], &1.5f32.to_le_bytes());
    }
}
