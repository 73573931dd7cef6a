//! Type descriptors.
//!
//! Types live in the symbol table's type arena and are referred to by
//! [`TypeId`]. Sizes are byte sizes computed bottom-up when a type is
//! defined, so an array or record size never has to be recomputed.

use crate::symbol::NodeId;

/// Handle of a type descriptor in the symbol table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The predefined scalar types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Integer,
    Real,
    Char,
}

/// Form-specific data of a type.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeForm {
    Scalar(ScalarKind),
    /// Ordered constants; the ordinal of the last one is `max`.
    Enumeration { constants: Vec<NodeId>, max: i32 },
    /// Inclusive range of `range`, which is never itself a subrange.
    Subrange { range: TypeId, min: i32, max: i32 },
    Array {
        index: TypeId,
        element: TypeId,
        count: usize,
        min_index: i32,
        max_index: i32,
    },
    /// Fields in declaration order. Each is a `Field` symbol entry.
    Record { fields: Vec<NodeId> },
}

/// How a scalar is laid out when stored inside a heap block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarRepr {
    /// Four-byte signed integer.
    Word,
    /// One byte.
    Byte,
    /// Eight-byte float.
    Float,
}

impl ScalarRepr {
    pub fn size(self) -> usize {
        match self {
            ScalarRepr::Word => 4,
            ScalarRepr::Byte => 1,
            ScalarRepr::Float => 8,
        }
    }
}

/// A Pascal type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescriptor {
    /// Type identifier for named types, `None` for anonymous ones.
    pub name: Option<String>,
    pub form: TypeForm,
    /// Byte size.
    pub size: usize,
}

impl TypeDescriptor {
    /// Arrays and records are stored out of line and handled by address.
    pub fn is_structured(&self) -> bool {
        matches!(self.form, TypeForm::Array { .. } | TypeForm::Record { .. })
    }

    /// Element count of an array type, `None` otherwise.
    pub fn element_count(&self) -> Option<usize> {
        match self.form {
            TypeForm::Array { count, .. } => Some(count),
            _ => None,
        }
    }
}
