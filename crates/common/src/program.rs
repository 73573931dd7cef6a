//! A compiled program: the symbol table that owns every routine's code
//! segment, plus the handle of the program routine itself.

use crate::segment::CodeSegment;
use crate::symbol::{NodeId, Routine};
use crate::symtab::SymbolTable;

#[derive(Debug, Clone)]
pub struct Program {
    pub symbols: SymbolTable,
    /// The program routine. Its frame holds the global variables.
    pub main: NodeId,
}

impl Program {
    pub fn new(symbols: SymbolTable, main: NodeId) -> Self {
        Self { symbols, main }
    }

    pub fn name(&self) -> &str {
        &self.symbols.entry(self.main).name
    }

    /// The routine payload of `node`, if it is a procedure or function.
    pub fn routine(&self, node: NodeId) -> Option<&Routine> {
        self.symbols.get(node).and_then(|entry| entry.routine())
    }

    /// The code segment of a declared routine.
    pub fn segment(&self, node: NodeId) -> Option<&CodeSegment> {
        self.routine(node).and_then(Routine::segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::CodeBuffer;
    use crate::opcode::Opcode;
    use crate::symbol::{Definition, RoutineBody};

    #[test]
    fn segment_lookup() {
        let mut symbols = SymbolTable::new();
        let mut routine = Routine::new(1);
        let mut buffer = CodeBuffer::new();
        buffer.emit_opcode(Opcode::Begin);
        buffer.emit_opcode(Opcode::End);
        routine.body = RoutineBody::Declared(buffer.finalize().unwrap());
        let main = symbols
            .declare("demo", Definition::Procedure(routine), None)
            .unwrap();
        let program = Program::new(symbols, main);

        assert_eq!(program.name(), "demo");
        assert_eq!(program.segment(main).map(|s| s.len()), Some(3));
        let writeln = program.symbols.lookup("writeln").unwrap();
        assert!(program.routine(writeln).is_some());
        assert!(program.segment(writeln).is_none());
    }
}
