//! Scoped symbol table.
//!
//! An arena of entries and types plus a stack of name scopes. Scope 0 holds
//! the predefined types, `false`/`true` and the standard routines; the
//! program's own declarations start at level 1. Names are case-insensitive.

use std::collections::HashMap;

use crate::error::SymbolError;
use crate::symbol::{
    ConstantValue, Definition, NodeId, Routine, StandardRoutine, SymbolEntry,
};
use crate::types::{ScalarKind, ScalarRepr, TypeDescriptor, TypeForm, TypeId};

/// Handles of the predefined types and constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Predefined {
    pub integer: TypeId,
    pub real: TypeId,
    pub char: TypeId,
    pub boolean: TypeId,
    pub false_const: NodeId,
    pub true_const: NodeId,
}

#[derive(Debug, Clone)]
pub struct SymbolTable {
    entries: Vec<SymbolEntry>,
    types: Vec<TypeDescriptor>,
    scopes: Vec<HashMap<String, NodeId>>,
    predefined: Predefined,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    /// Create a table holding only the predefined scope.
    pub fn new() -> Self {
        let placeholder = Predefined {
            integer: TypeId(0),
            real: TypeId(0),
            char: TypeId(0),
            boolean: TypeId(0),
            false_const: NodeId(0),
            true_const: NodeId(0),
        };
        let mut table = Self {
            entries: Vec::new(),
            types: Vec::new(),
            scopes: vec![HashMap::new()],
            predefined: placeholder,
        };

        let integer = table.add_scalar("integer", ScalarKind::Integer, 4);
        let real = table.add_scalar("real", ScalarKind::Real, 8);
        let char = table.add_scalar("char", ScalarKind::Char, 1);
        let boolean = table.add_type(TypeDescriptor {
            name: Some("boolean".into()),
            form: TypeForm::Enumeration {
                constants: Vec::new(),
                max: 1,
            },
            size: 1,
        });
        table.declare_predefined("boolean", Definition::Type, Some(boolean));
        let false_const =
            table.declare_predefined("false", Definition::Constant(ConstantValue::Integer(0)), Some(boolean));
        let true_const =
            table.declare_predefined("true", Definition::Constant(ConstantValue::Integer(1)), Some(boolean));
        if let TypeForm::Enumeration { constants, .. } = &mut table.types[boolean.index()].form {
            constants.extend([false_const, true_const]);
        }

        for routine in StandardRoutine::ALL {
            let (definition, ty) = if routine.is_procedure() {
                (Definition::Procedure(Routine::standard(routine)), None)
            } else {
                (Definition::Function(Routine::standard(routine)), None)
            };
            table.declare_predefined(routine.name(), definition, ty);
        }

        table.predefined = Predefined {
            integer,
            real,
            char,
            boolean,
            false_const,
            true_const,
        };
        table
    }

    fn add_scalar(&mut self, name: &str, kind: ScalarKind, size: usize) -> TypeId {
        let id = self.add_type(TypeDescriptor {
            name: Some(name.into()),
            form: TypeForm::Scalar(kind),
            size,
        });
        self.declare_predefined(name, Definition::Type, Some(id));
        id
    }

    fn declare_predefined(&mut self, name: &str, definition: Definition, ty: Option<TypeId>) -> NodeId {
        let id = self.add(SymbolEntry {
            name: name.into(),
            definition,
            ty,
            level: 0,
        });
        self.scopes[0].insert(name.to_ascii_lowercase(), id);
        id
    }

    pub fn predefined(&self) -> &Predefined {
        &self.predefined
    }

    // ---- Scopes ----

    /// Nesting level of the innermost scope. The predefined scope is 0.
    pub fn level(&self) -> u32 {
        (self.scopes.len() - 1) as u32
    }

    pub fn enter_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn exit_scope(&mut self) -> Result<(), SymbolError> {
        if self.scopes.len() <= 1 {
            return Err(SymbolError::ScopeUnderflow);
        }
        self.scopes.pop();
        Ok(())
    }

    /// Declare a name in the innermost scope.
    pub fn declare(
        &mut self,
        name: &str,
        definition: Definition,
        ty: Option<TypeId>,
    ) -> Result<NodeId, SymbolError> {
        let key = name.to_ascii_lowercase();
        let level = self.level();
        let scope = self.scopes.last().ok_or(SymbolError::ScopeUnderflow)?;
        if scope.contains_key(&key) {
            return Err(SymbolError::Redeclared { name: name.into() });
        }
        let id = self.add(SymbolEntry {
            name: name.into(),
            definition,
            ty,
            level,
        });
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(key, id);
        }
        Ok(id)
    }

    /// Search the scopes innermost first.
    pub fn lookup(&self, name: &str) -> Option<NodeId> {
        let key = name.to_ascii_lowercase();
        self.scopes.iter().rev().find_map(|scope| scope.get(&key).copied())
    }

    // ---- Entries ----

    /// Add an entry that is not reachable by name (record fields, literals).
    pub fn add(&mut self, entry: SymbolEntry) -> NodeId {
        let id = NodeId(self.entries.len() as u32);
        self.entries.push(entry);
        id
    }

    pub fn get(&self, id: NodeId) -> Option<&SymbolEntry> {
        self.entries.get(id.index())
    }

    pub fn entry(&self, id: NodeId) -> &SymbolEntry {
        &self.entries[id.index()]
    }

    pub fn entry_mut(&mut self, id: NodeId) -> &mut SymbolEntry {
        &mut self.entries[id.index()]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // ---- Types ----

    pub fn add_type(&mut self, descriptor: TypeDescriptor) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(descriptor);
        id
    }

    pub fn ty(&self, id: TypeId) -> &TypeDescriptor {
        &self.types[id.index()]
    }

    /// A subrange's base is its range type; every other type is its own base.
    pub fn base_type(&self, id: TypeId) -> TypeId {
        match self.ty(id).form {
            TypeForm::Subrange { range, .. } => range,
            _ => id,
        }
    }

    pub fn is_real(&self, id: TypeId) -> bool {
        self.base_type(id) == self.predefined.real
    }

    /// Inclusive ordinal bounds. Integer and real have none.
    pub fn bounds(&self, id: TypeId) -> Option<(i32, i32)> {
        match &self.ty(id).form {
            TypeForm::Subrange { min, max, .. } => Some((*min, *max)),
            TypeForm::Enumeration { max, .. } => Some((0, *max)),
            TypeForm::Scalar(ScalarKind::Char) => Some((0, 255)),
            _ => None,
        }
    }

    /// Layout of a scalar of this type inside a heap block.
    pub fn repr(&self, id: TypeId) -> ScalarRepr {
        if self.is_real(id) {
            ScalarRepr::Float
        } else if self.ty(id).size == 1 {
            ScalarRepr::Byte
        } else {
            ScalarRepr::Word
        }
    }

    /// Find a field of a record type by name.
    pub fn field(&self, record: TypeId, name: &str) -> Option<NodeId> {
        match &self.ty(record).form {
            TypeForm::Record { fields } => fields
                .iter()
                .copied()
                .find(|&f| self.entry(f).name.eq_ignore_ascii_case(name)),
            _ => None,
        }
    }

    // ---- Type constructors ----

    /// Define `min..max` of `range`. A subrange of a subrange is flattened
    /// onto the outer range type.
    pub fn define_subrange(&mut self, range: TypeId, min: i32, max: i32) -> TypeId {
        let range = self.base_type(range);
        let size = self.ty(range).size;
        self.add_type(TypeDescriptor {
            name: None,
            form: TypeForm::Subrange { range, min, max },
            size,
        })
    }

    /// Define an enumeration and declare its constants in the current scope.
    pub fn define_enumeration(
        &mut self,
        name: Option<&str>,
        constants: &[&str],
    ) -> Result<(TypeId, Vec<NodeId>), SymbolError> {
        let max = constants.len() as i32 - 1;
        let id = self.add_type(TypeDescriptor {
            name: name.map(str::to_string),
            form: TypeForm::Enumeration {
                constants: Vec::new(),
                max,
            },
            size: 4,
        });
        let mut nodes = Vec::with_capacity(constants.len());
        for (ordinal, constant) in constants.iter().enumerate() {
            nodes.push(self.declare(
                constant,
                Definition::Constant(ConstantValue::Integer(ordinal as i32)),
                Some(id),
            )?);
        }
        if let TypeForm::Enumeration { constants, .. } = &mut self.types[id.index()].form {
            constants.extend(nodes.iter().copied());
        }
        Ok((id, nodes))
    }

    /// Define `array[index] of element`. Returns `None` if the index type
    /// has no bounds.
    pub fn define_array(&mut self, index: TypeId, element: TypeId) -> Option<TypeId> {
        let (min_index, max_index) = self.bounds(index)?;
        let count = (i64::from(max_index) - i64::from(min_index) + 1).max(0) as usize;
        let size = count * self.ty(element).size;
        Some(self.add_type(TypeDescriptor {
            name: None,
            form: TypeForm::Array {
                index,
                element,
                count,
                min_index,
                max_index,
            },
            size,
        }))
    }

    /// Define a record, laying its fields out back to back.
    pub fn define_record(&mut self, fields: &[(&str, TypeId)]) -> TypeId {
        let level = self.level();
        let mut offset = 0;
        let mut nodes = Vec::with_capacity(fields.len());
        for (name, ty) in fields {
            nodes.push(self.add(SymbolEntry {
                name: (*name).into(),
                definition: Definition::Field { offset },
                ty: Some(*ty),
                level,
            }));
            offset += self.ty(*ty).size;
        }
        self.add_type(TypeDescriptor {
            name: None,
            form: TypeForm::Record { fields: nodes },
            size: offset,
        })
    }

    /// Add an anonymous string constant typed as `array[1..n] of char`.
    pub fn add_string(&mut self, bytes: &[u8]) -> NodeId {
        let integer = self.predefined.integer;
        let char = self.predefined.char;
        let index = self.define_subrange(integer, 1, bytes.len() as i32);
        let ty = self.define_array(index, char);
        let level = self.level();
        self.add(SymbolEntry {
            name: String::new(),
            definition: Definition::Constant(ConstantValue::String(bytes.to_vec())),
            ty,
            level,
        })
    }
}
