//! Declaration-driven program construction.
//!
//! [`ProgramBuilder`] mirrors the order in which a Pascal compiler meets a
//! program: declarations of the open routine, nested routines, then the
//! routine's statement part. Each closed routine owns a finalized code
//! segment in the symbol table.

use log::debug;
use tinypas_common::{
    CodeSegment, ConstantValue, Definition, NodeId, Predefined, Program, Routine, RoutineBody,
    SymbolEntry, SymbolTable, TypeId, FRAME_HEADER_SLOTS,
};

use crate::ast::{Expr, Stmt};
use crate::emitter::Emitter;
use crate::error::BuildError;

pub struct ProgramBuilder {
    symbols: SymbolTable,
    /// Routines whose declarations are open, program first.
    open: Vec<NodeId>,
    /// Line of the last statement emitted in any routine.
    line: u32,
}

impl ProgramBuilder {
    /// Start a program. Its frame holds the global variables at level 1.
    pub fn new(name: &str) -> Self {
        let mut symbols = SymbolTable::new();
        let main = symbols.add(SymbolEntry {
            name: name.into(),
            definition: Definition::Procedure(Routine::new(1)),
            ty: None,
            level: 0,
        });
        symbols.enter_scope();
        Self {
            symbols,
            open: vec![main],
            line: 0,
        }
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn predefined(&self) -> Predefined {
        *self.symbols.predefined()
    }

    pub fn integer(&self) -> TypeId {
        self.symbols.predefined().integer
    }

    pub fn real(&self) -> TypeId {
        self.symbols.predefined().real
    }

    pub fn char(&self) -> TypeId {
        self.symbols.predefined().char
    }

    pub fn boolean(&self) -> TypeId {
        self.symbols.predefined().boolean
    }

    /// Resolve a name in the open scopes, innermost first.
    pub fn lookup(&self, name: &str) -> Option<NodeId> {
        self.symbols.lookup(name)
    }

    // ---- Types and constants ----

    pub fn subrange(&mut self, range: TypeId, min: i32, max: i32) -> TypeId {
        self.symbols.define_subrange(range, min, max)
    }

    pub fn enumeration(
        &mut self,
        name: &str,
        constants: &[&str],
    ) -> Result<(TypeId, Vec<NodeId>), BuildError> {
        let (ty, nodes) = self.symbols.define_enumeration(Some(name), constants)?;
        self.symbols.declare(name, Definition::Type, Some(ty))?;
        Ok((ty, nodes))
    }

    pub fn array(&mut self, index: TypeId, element: TypeId) -> Result<TypeId, BuildError> {
        self.symbols
            .define_array(index, element)
            .ok_or(BuildError::UnboundedIndex)
    }

    pub fn record(&mut self, fields: &[(&str, TypeId)]) -> TypeId {
        self.symbols.define_record(fields)
    }

    /// A field of a record type, for use in [`Selector::Field`](crate::Selector).
    pub fn field(&self, record: TypeId, name: &str) -> Result<NodeId, BuildError> {
        self.symbols
            .field(record, name)
            .ok_or_else(|| BuildError::UnknownField { name: name.into() })
    }

    /// Give a type a name in the current scope.
    pub fn type_name(&mut self, name: &str, ty: TypeId) -> Result<NodeId, BuildError> {
        Ok(self.symbols.declare(name, Definition::Type, Some(ty))?)
    }

    pub fn constant(&mut self, name: &str, value: ConstantValue) -> Result<NodeId, BuildError> {
        let p = *self.symbols.predefined();
        let ty = match &value {
            ConstantValue::Integer(_) => p.integer,
            ConstantValue::Real(_) => p.real,
            ConstantValue::Char(_) => p.char,
            ConstantValue::String(bytes) => {
                if bytes.is_empty() {
                    return Err(BuildError::EmptyString);
                }
                let index = self.symbols.define_subrange(p.integer, 1, bytes.len() as i32);
                self.array(index, p.char)?
            }
        };
        Ok(self.symbols.declare(name, Definition::Constant(value), Some(ty))?)
    }

    // ---- Storage ----

    /// Declare a local variable of the open routine.
    pub fn variable(&mut self, name: &str, ty: TypeId) -> Result<NodeId, BuildError> {
        let owner = self.current()?;
        let offset = {
            let routine = self.routine(owner)?;
            FRAME_HEADER_SLOTS + routine.param_slots + routine.local_slots
        };
        let node = self
            .symbols
            .declare(name, Definition::Variable { offset }, Some(ty))?;
        let routine = self.routine_mut(owner)?;
        routine.locals.push(node);
        routine.local_slots += 1;
        Ok(node)
    }

    pub fn value_param(&mut self, name: &str, ty: TypeId) -> Result<NodeId, BuildError> {
        self.parameter(name, ty, false)
    }

    pub fn var_param(&mut self, name: &str, ty: TypeId) -> Result<NodeId, BuildError> {
        self.parameter(name, ty, true)
    }

    fn parameter(&mut self, name: &str, ty: TypeId, by_reference: bool) -> Result<NodeId, BuildError> {
        if self.open.len() == 1 {
            return Err(BuildError::ProgramParameter);
        }
        let owner = self.current()?;
        let offset = {
            let routine = self.routine(owner)?;
            if !routine.locals.is_empty() {
                return Err(BuildError::ParameterAfterLocal { name: name.into() });
            }
            FRAME_HEADER_SLOTS + routine.param_slots
        };
        let definition = if by_reference {
            Definition::VarParam { offset }
        } else {
            Definition::ValueParam { offset }
        };
        let node = self.symbols.declare(name, definition, Some(ty))?;
        let routine = self.routine_mut(owner)?;
        routine.params.push(node);
        routine.param_slots += 1;
        Ok(node)
    }

    // ---- Routines ----

    /// Open a procedure nested in the current routine. Subsequent
    /// declarations belong to it until [`end_routine`](Self::end_routine).
    pub fn begin_procedure(&mut self, name: &str) -> Result<NodeId, BuildError> {
        let level = self.symbols.level() + 1;
        let node = self
            .symbols
            .declare(name, Definition::Procedure(Routine::new(level)), None)?;
        self.open_routine(node)?;
        Ok(node)
    }

    pub fn begin_function(&mut self, name: &str, result: TypeId) -> Result<NodeId, BuildError> {
        let level = self.symbols.level() + 1;
        let node = self
            .symbols
            .declare(name, Definition::Function(Routine::new(level)), Some(result))?;
        self.open_routine(node)?;
        Ok(node)
    }

    fn open_routine(&mut self, node: NodeId) -> Result<(), BuildError> {
        let parent = self.current()?;
        self.routine_mut(parent)?.nested.push(node);
        self.open.push(node);
        self.symbols.enter_scope();
        Ok(())
    }

    /// Compile the statement part of the open routine.
    pub fn body(&mut self, statements: Vec<Stmt>) -> Result<(), BuildError> {
        let owner = self.current()?;
        if !matches!(self.routine(owner)?.body, RoutineBody::Pending) {
            return Err(BuildError::BodyRedefined {
                name: self.symbols.entry(owner).name.clone(),
            });
        }

        let mut emitter = Emitter::new(&mut self.symbols, self.line);
        emitter.statement(&Stmt::Compound(statements))?;
        let line = emitter.line();
        let segment = emitter.finalize()?;
        self.line = line;

        let routine = self.routine(owner)?;
        debug!(
            "compiled '{}': {} bytes, {} param slot(s), {} local slot(s)",
            self.symbols.entry(owner).name,
            segment.len(),
            routine.param_slots,
            routine.local_slots,
        );
        self.routine_mut(owner)?.body = RoutineBody::Declared(segment);
        Ok(())
    }

    /// Close the open routine and return to its parent's declarations.
    pub fn end_routine(&mut self) -> Result<NodeId, BuildError> {
        if self.open.len() < 2 {
            return Err(BuildError::NoOpenRoutine);
        }
        let node = self.current()?;
        self.require_body(node)?;
        self.symbols.exit_scope()?;
        self.open.pop();
        Ok(node)
    }

    /// Compile a standalone expression against the open scopes. The segment
    /// can be evaluated by the executor in the program frame.
    pub fn expression(&mut self, expr: &Expr) -> Result<CodeSegment, BuildError> {
        let mut emitter = Emitter::new(&mut self.symbols, self.line);
        emitter.expression(expr)?;
        emitter.finalize()
    }

    /// Close the program and hand it over for execution.
    pub fn finish(mut self) -> Result<Program, BuildError> {
        let main = self.current()?;
        if self.open.len() > 1 {
            return Err(BuildError::UnclosedRoutine {
                name: self.symbols.entry(main).name.clone(),
            });
        }
        self.require_body(main)?;
        self.symbols.exit_scope()?;
        Ok(Program::new(self.symbols, main))
    }

    fn require_body(&self, node: NodeId) -> Result<(), BuildError> {
        match self.routine(node)?.body {
            RoutineBody::Declared(_) => Ok(()),
            _ => Err(BuildError::MissingBody {
                name: self.symbols.entry(node).name.clone(),
            }),
        }
    }

    fn current(&self) -> Result<NodeId, BuildError> {
        self.open.last().copied().ok_or(BuildError::NoOpenRoutine)
    }

    fn routine(&self, node: NodeId) -> Result<&Routine, BuildError> {
        self.symbols
            .entry(node)
            .routine()
            .ok_or(BuildError::NoOpenRoutine)
    }

    fn routine_mut(&mut self, node: NodeId) -> Result<&mut Routine, BuildError> {
        self.symbols
            .entry_mut(node)
            .routine_mut()
            .ok_or(BuildError::NoOpenRoutine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Arg;

    #[test]
    fn globals_follow_the_frame_header() {
        let mut b = ProgramBuilder::new("p");
        let int = b.integer();
        let x = b.variable("x", int).unwrap();
        let y = b.variable("y", int).unwrap();
        assert_eq!(b.symbols().entry(x).frame_offset(), Some(4));
        assert_eq!(b.symbols().entry(y).frame_offset(), Some(5));
        assert_eq!(b.symbols().entry(x).level, 1);
    }

    #[test]
    fn parameters_precede_locals() {
        let mut b = ProgramBuilder::new("p");
        let int = b.integer();
        let f = b.begin_function("f", int).unwrap();
        let a = b.value_param("a", int).unwrap();
        let v = b.var_param("v", int).unwrap();
        let l = b.variable("l", int).unwrap();
        assert_eq!(b.symbols().entry(a).frame_offset(), Some(4));
        assert_eq!(b.symbols().entry(v).frame_offset(), Some(5));
        assert_eq!(b.symbols().entry(l).frame_offset(), Some(6));
        assert_eq!(
            b.value_param("late", int),
            Err(BuildError::ParameterAfterLocal { name: "late".into() })
        );
        b.body(vec![Stmt::assign(f, Expr::name(a))]).unwrap();
        b.end_routine().unwrap();
        let routine = b.symbols().entry(f).routine().unwrap();
        assert_eq!(routine.level, 2);
        assert_eq!((routine.param_slots, routine.local_slots), (2, 1));
    }

    #[test]
    fn program_takes_no_parameters() {
        let mut b = ProgramBuilder::new("p");
        let int = b.integer();
        assert_eq!(b.value_param("x", int), Err(BuildError::ProgramParameter));
    }

    #[test]
    fn nested_routine_scopes_close() {
        let mut b = ProgramBuilder::new("p");
        let int = b.integer();
        b.begin_procedure("outer").unwrap();
        b.variable("hidden", int).unwrap();
        b.body(vec![]).unwrap();
        b.end_routine().unwrap();
        assert!(b.lookup("outer").is_some());
        assert!(b.lookup("hidden").is_none());
    }

    #[test]
    fn routine_without_body_cannot_close() {
        let mut b = ProgramBuilder::new("p");
        b.begin_procedure("q").unwrap();
        assert_eq!(b.end_routine(), Err(BuildError::MissingBody { name: "q".into() }));
    }

    #[test]
    fn body_is_compiled_once() {
        let mut b = ProgramBuilder::new("p");
        b.body(vec![]).unwrap();
        assert_eq!(b.body(vec![]), Err(BuildError::BodyRedefined { name: "p".into() }));
    }

    #[test]
    fn finish_requires_closed_routines() {
        let mut b = ProgramBuilder::new("p");
        b.body(vec![]).unwrap();
        b.begin_procedure("q").unwrap();
        assert!(matches!(b.finish(), Err(BuildError::UnclosedRoutine { .. })));
    }

    #[test]
    fn var_argument_must_be_a_variable() {
        let mut b = ProgramBuilder::new("p");
        let int = b.integer();
        let inc = b.begin_procedure("inc").unwrap();
        b.var_param("n", int).unwrap();
        b.body(vec![]).unwrap();
        b.end_routine().unwrap();
        assert_eq!(
            b.body(vec![Stmt::call(inc, vec![Arg::from(Expr::Integer(1))])]),
            Err(BuildError::ArgumentNotVariable { routine: "inc".into() })
        );
    }

    #[test]
    fn string_constant_is_typed_as_char_array() {
        let mut b = ProgramBuilder::new("p");
        let c = b.constant("greeting", ConstantValue::String(b"hello".to_vec())).unwrap();
        let ty = b.symbols().entry(c).ty.unwrap();
        assert_eq!(b.symbols().ty(ty).element_count(), Some(5));
    }
}
