//! Symbol entries.
//!
//! Entries are owned by the symbol table arena and referenced everywhere
//! else, including from inside code segments, by [`NodeId`].

use crate::segment::CodeSegment;
use crate::types::TypeId;

/// Slots at the base of every stack frame: return value, static link,
/// dynamic link, return address. Parameters start right after them.
pub const FRAME_HEADER_SLOTS: usize = 4;

/// Stable handle of a symbol entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Value of a declared constant.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
    /// Integer or enumeration ordinal.
    Integer(i32),
    Real(f64),
    Char(u8),
    /// Fixed-length character data, no terminator.
    String(Vec<u8>),
}

/// Built-in routines, dispatched by the executor through a handler table.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardRoutine {
    Read,
    Readln,
    Write,
    Writeln,
    Eof,
    Eoln,
    Abs,
    Sqr,
    Arctan,
    Cos,
    Exp,
    Ln,
    Sin,
    Sqrt,
    Pred,
    Succ,
    Chr,
    Odd,
    Ord,
    Round,
    Trunc,
}

impl StandardRoutine {
    pub const COUNT: usize = 21;

    /// All standard routines, in discriminant order.
    pub const ALL: [StandardRoutine; StandardRoutine::COUNT] = [
        StandardRoutine::Read,
        StandardRoutine::Readln,
        StandardRoutine::Write,
        StandardRoutine::Writeln,
        StandardRoutine::Eof,
        StandardRoutine::Eoln,
        StandardRoutine::Abs,
        StandardRoutine::Sqr,
        StandardRoutine::Arctan,
        StandardRoutine::Cos,
        StandardRoutine::Exp,
        StandardRoutine::Ln,
        StandardRoutine::Sin,
        StandardRoutine::Sqrt,
        StandardRoutine::Pred,
        StandardRoutine::Succ,
        StandardRoutine::Chr,
        StandardRoutine::Odd,
        StandardRoutine::Ord,
        StandardRoutine::Round,
        StandardRoutine::Trunc,
    ];

    /// Pascal spelling of the routine name.
    pub fn name(self) -> &'static str {
        match self {
            StandardRoutine::Read => "read",
            StandardRoutine::Readln => "readln",
            StandardRoutine::Write => "write",
            StandardRoutine::Writeln => "writeln",
            StandardRoutine::Eof => "eof",
            StandardRoutine::Eoln => "eoln",
            StandardRoutine::Abs => "abs",
            StandardRoutine::Sqr => "sqr",
            StandardRoutine::Arctan => "arctan",
            StandardRoutine::Cos => "cos",
            StandardRoutine::Exp => "exp",
            StandardRoutine::Ln => "ln",
            StandardRoutine::Sin => "sin",
            StandardRoutine::Sqrt => "sqrt",
            StandardRoutine::Pred => "pred",
            StandardRoutine::Succ => "succ",
            StandardRoutine::Chr => "chr",
            StandardRoutine::Odd => "odd",
            StandardRoutine::Ord => "ord",
            StandardRoutine::Round => "round",
            StandardRoutine::Trunc => "trunc",
        }
    }

    /// Procedures produce no value; everything else is a function.
    pub fn is_procedure(self) -> bool {
        matches!(
            self,
            StandardRoutine::Read
                | StandardRoutine::Readln
                | StandardRoutine::Write
                | StandardRoutine::Writeln
        )
    }
}

/// Where a routine's statements come from.
#[derive(Debug, Clone, PartialEq)]
pub enum RoutineBody {
    /// Declared, body not compiled yet.
    Pending,
    /// Compiled from source.
    Declared(CodeSegment),
    /// Implemented by the executor.
    Standard(StandardRoutine),
}

/// Routine payload of a procedure or function entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Routine {
    pub params: Vec<NodeId>,
    pub locals: Vec<NodeId>,
    pub nested: Vec<NodeId>,
    /// Frame slots taken by parameters.
    pub param_slots: usize,
    /// Frame slots taken by local variables.
    pub local_slots: usize,
    /// Nesting level of the routine's own frame. The program runs at 1.
    pub level: u32,
    pub body: RoutineBody,
}

impl Routine {
    pub fn new(level: u32) -> Self {
        Self {
            params: Vec::new(),
            locals: Vec::new(),
            nested: Vec::new(),
            param_slots: 0,
            local_slots: 0,
            level,
            body: RoutineBody::Pending,
        }
    }

    pub fn standard(routine: StandardRoutine) -> Self {
        Self {
            body: RoutineBody::Standard(routine),
            ..Self::new(0)
        }
    }

    /// The compiled segment, if this is a declared routine with a body.
    pub fn segment(&self) -> Option<&CodeSegment> {
        match &self.body {
            RoutineBody::Declared(segment) => Some(segment),
            _ => None,
        }
    }
}

/// Kind-specific payload of a symbol entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Definition {
    Undefined,
    Constant(ConstantValue),
    Type,
    /// `offset` is a frame slot.
    Variable { offset: usize },
    /// `offset` is a byte offset within the record.
    Field { offset: usize },
    ValueParam { offset: usize },
    VarParam { offset: usize },
    Procedure(Routine),
    Function(Routine),
}

/// One declared name.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolEntry {
    pub name: String,
    pub definition: Definition,
    /// Type of the name; for functions, the result type.
    pub ty: Option<TypeId>,
    /// Nesting level of the scope that declared the entry.
    pub level: u32,
}

impl SymbolEntry {
    /// Frame slot of a variable or parameter.
    pub fn frame_offset(&self) -> Option<usize> {
        match self.definition {
            Definition::Variable { offset }
            | Definition::ValueParam { offset }
            | Definition::VarParam { offset } => Some(offset),
            _ => None,
        }
    }

    pub fn routine(&self) -> Option<&Routine> {
        match &self.definition {
            Definition::Procedure(routine) | Definition::Function(routine) => Some(routine),
            _ => None,
        }
    }

    pub fn routine_mut(&mut self) -> Option<&mut Routine> {
        match &mut self.definition {
            Definition::Procedure(routine) | Definition::Function(routine) => Some(routine),
            _ => None,
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self.definition, Definition::Function(_))
    }

    pub fn is_var_param(&self) -> bool {
        matches!(self.definition, Definition::VarParam { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_table_matches_discriminants() {
        for (i, routine) in StandardRoutine::ALL.iter().enumerate() {
            assert_eq!(*routine as usize, i, "{routine:?} out of order");
        }
    }

    #[test]
    fn standard_procedures() {
        assert!(StandardRoutine::Writeln.is_procedure());
        assert!(!StandardRoutine::Sqrt.is_procedure());
        assert_eq!(StandardRoutine::Arctan.name(), "arctan");
    }

    #[test]
    fn frame_offset_only_for_storage() {
        let var = SymbolEntry {
            name: "x".into(),
            definition: Definition::VarParam { offset: 5 },
            ty: None,
            level: 2,
        };
        let field = SymbolEntry {
            name: "f".into(),
            definition: Definition::Field { offset: 8 },
            ty: None,
            level: 2,
        };
        assert_eq!(var.frame_offset(), Some(5));
        assert!(var.is_var_param());
        assert_eq!(field.frame_offset(), None);
    }

    #[test]
    fn routine_accessors() {
        let mut entry = SymbolEntry {
            name: "f".into(),
            definition: Definition::Function(Routine::new(2)),
            ty: None,
            level: 1,
        };
        assert!(entry.is_function());
        assert!(entry.routine().unwrap().segment().is_none());
        entry.routine_mut().unwrap().param_slots = 2;
        assert_eq!(entry.routine().unwrap().param_slots, 2);
    }
}
