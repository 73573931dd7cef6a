//! Executor state: value stack, frames, decoder cursor and I/O.

use std::io::{BufRead, Write};
use std::sync::OnceLock;

use log::{debug, warn};
use tinypas_common::{
    Address, CodeSegment, Cursor, DecodeError, NodeId, Opcode, Program, Routine, StackItem,
    SymbolEntry, SymbolTable, TypeDescriptor, TypeId,
};

use crate::config::ExecutorConfig;
use crate::error::RuntimeError;
use crate::input::Input;
use crate::memory::Heap;
use crate::trace::Tracer;

// Frame header slots, relative to the frame base.
pub(crate) const RETURN_VALUE: usize = 0;
pub(crate) const STATIC_LINK: usize = 1;
pub(crate) const DYNAMIC_LINK: usize = 2;
pub(crate) const RETURN_ADDRESS: usize = 3;

/// Segment the cursor rests on before anything runs.
fn idle_segment() -> &'static CodeSegment {
    static IDLE: OnceLock<CodeSegment> = OnceLock::new();
    IDLE.get_or_init(|| CodeSegment::from_bytes(vec![Opcode::EndOfSegment as u8]))
}

/// The tinypas executor.
pub struct Executor<'a> {
    pub(crate) program: &'a Program,
    pub(crate) config: ExecutorConfig,
    pub(crate) stack: Vec<StackItem>,
    /// Storage of array and record values.
    pub(crate) heap: Heap,
    /// Stack slot of the current frame's header.
    pub(crate) frame_base: usize,
    /// Nesting level of the current frame.
    pub(crate) level: u32,
    /// Routine whose code the cursor is walking.
    pub(crate) routine: NodeId,
    pub(crate) cursor: Cursor<'a>,
    pub(crate) call_depth: usize,
    /// Line of the statement being executed.
    pub(crate) line: u32,
    pub(crate) input: Input<'a>,
    pub(crate) output: Box<dyn Write + 'a>,
    pub(crate) tracer: Option<Box<dyn Tracer + 'a>>,
    /// Whether the program frame holding the globals is on the stack.
    in_program: bool,
}

impl<'a> Executor<'a> {
    pub fn new(program: &'a Program, input: impl BufRead + 'a, output: impl Write + 'a) -> Self {
        Self::with_config(program, ExecutorConfig::default(), input, output)
    }

    pub fn with_config(
        program: &'a Program,
        config: ExecutorConfig,
        input: impl BufRead + 'a,
        output: impl Write + 'a,
    ) -> Self {
        Self {
            program,
            config,
            stack: Vec::new(),
            heap: Heap::default(),
            frame_base: 0,
            level: 0,
            routine: program.main,
            cursor: Cursor::new(idle_segment()),
            call_depth: 0,
            line: 0,
            input: Input::new(Box::new(input)),
            output: Box::new(output),
            tracer: None,
            in_program: false,
        }
    }

    pub fn set_tracer(&mut self, tracer: Box<dyn Tracer + 'a>) {
        self.tracer = Some(tracer);
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Current number of value stack slots in use.
    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// Line of the statement executed last.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Run the program's compound statement once.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        let program = self.program;
        let name = program.name();
        debug!("running program '{name}'");
        let result = self.run_program();
        if result.is_err() {
            self.reset();
        }
        let flushed = self.output.flush();
        match &result {
            Ok(()) => debug!("program '{name}' finished at line {}", self.line),
            Err(e) => warn!("program '{name}' aborted: {e}"),
        }
        result?;
        flushed.map_err(|e| self.io_error(e))
    }

    fn run_program(&mut self) -> Result<(), RuntimeError> {
        let main = self.program.main;
        let segment = self.segment_of(main)?;
        self.enter_program()?;
        self.cursor = Cursor::new(segment);
        self.routine = main;
        self.advance()?;
        self.statement()?;
        self.leave_program()
    }

    /// Evaluate a standalone expression segment in the program frame and
    /// return its value. Array and record results come back as addresses.
    pub fn evaluate(&mut self, segment: &'a CodeSegment) -> Result<StackItem, RuntimeError> {
        self.enter_program()?;
        let saved = std::mem::replace(&mut self.cursor, Cursor::new(segment));
        let result = self.evaluate_current();
        self.cursor = saved;
        if result.is_err() {
            self.reset();
        }
        result
    }

    /// Drop the frames and blocks a failed run left behind, so the next
    /// `run` or `evaluate` builds a fresh program frame.
    fn reset(&mut self) {
        self.stack.clear();
        self.heap = Heap::default();
        self.frame_base = 0;
        self.level = 0;
        self.routine = self.program.main;
        self.call_depth = 0;
        self.in_program = false;
    }

    fn evaluate_current(&mut self) -> Result<StackItem, RuntimeError> {
        self.advance()?;
        self.expression()?;
        match self.cursor.current() {
            Opcode::EndOfSegment => self.pop(),
            _ => Err(self.unexpected()),
        }
    }

    /// Push the program frame: header plus globals, at stack slot 0.
    fn enter_program(&mut self) -> Result<(), RuntimeError> {
        if self.in_program {
            return Ok(());
        }
        let main = self.program.main;
        self.stack.clear();
        self.frame_base = 0;
        self.level = self.routine_of(main)?.level;
        self.routine = main;
        for item in [
            StackItem::Integer(0),
            StackItem::Address(Address::Nil),
            StackItem::Address(Address::Nil),
            StackItem::Address(Address::Nil),
        ] {
            self.push(item)?;
        }
        self.allocate_locals(main)?;
        self.in_program = true;
        Ok(())
    }

    fn leave_program(&mut self) -> Result<(), RuntimeError> {
        self.release_frame(self.program.main, 0)?;
        let live = self.heap.live_blocks();
        if live > 0 {
            warn!("{live} heap block(s) still allocated after the program frame");
        }
        self.stack.clear();
        self.in_program = false;
        Ok(())
    }

    // ---- Value stack ----

    /// Push a value, checking for overflow.
    pub(crate) fn push(&mut self, item: StackItem) -> Result<(), RuntimeError> {
        if self.stack.len() >= self.config.max_stack_depth {
            return Err(RuntimeError::StackOverflow { line: self.line });
        }
        self.stack.push(item);
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> Result<StackItem, RuntimeError> {
        self.stack
            .pop()
            .ok_or(RuntimeError::StackUnderflow { line: self.line })
    }

    pub(crate) fn pop_ordinal(&mut self) -> Result<i32, RuntimeError> {
        let item = self.pop()?;
        item.ordinal().ok_or_else(|| self.mismatch())
    }

    pub(crate) fn pop_boolean(&mut self) -> Result<bool, RuntimeError> {
        let item = self.pop()?;
        item.as_byte().map(|b| b != 0).ok_or_else(|| self.mismatch())
    }

    pub(crate) fn pop_address(&mut self) -> Result<Address, RuntimeError> {
        let item = self.pop()?;
        item.as_address().ok_or_else(|| self.mismatch())
    }

    pub(crate) fn slot(&self, index: usize) -> Result<StackItem, RuntimeError> {
        self.stack
            .get(index)
            .copied()
            .ok_or(RuntimeError::InvalidAddress { line: self.line })
    }

    pub(crate) fn set_slot(&mut self, index: usize, item: StackItem) -> Result<(), RuntimeError> {
        match self.stack.get_mut(index) {
            Some(slot) => {
                *slot = item;
                Ok(())
            }
            None => Err(RuntimeError::InvalidAddress { line: self.line }),
        }
    }

    // ---- Frames ----

    /// Base of the most recent activation at nesting `level`: the current
    /// frame, the program frame, or the frame reached by following static
    /// links outward.
    pub(crate) fn frame_base_for(&self, level: u32) -> Result<usize, RuntimeError> {
        if level == self.level {
            return Ok(self.frame_base);
        }
        if level <= 1 {
            return Ok(0);
        }
        let mut base = self.frame_base;
        for _ in 0..self.level.saturating_sub(level) {
            base = match self.slot(base + STATIC_LINK)? {
                StackItem::Address(Address::Stack(outer)) => outer,
                _ => return Err(self.mismatch()),
            };
        }
        Ok(base)
    }

    // ---- Symbols ----

    pub(crate) fn symbols(&self) -> &'a SymbolTable {
        &self.program.symbols
    }

    pub(crate) fn entry(&self, node: NodeId) -> Result<&'a SymbolEntry, RuntimeError> {
        let symbols = self.symbols();
        symbols
            .get(node)
            .ok_or_else(|| self.decode(DecodeError::DanglingNode(node.0)))
    }

    pub(crate) fn ty(&self, id: TypeId) -> &'a TypeDescriptor {
        self.symbols().ty(id)
    }

    /// Declared type of an entry. Entries reached from code always have one.
    pub(crate) fn type_of(&self, entry: &SymbolEntry) -> Result<TypeId, RuntimeError> {
        entry.ty.ok_or_else(|| self.mismatch())
    }

    pub(crate) fn routine_of(&self, node: NodeId) -> Result<&'a Routine, RuntimeError> {
        self.entry(node)?
            .routine()
            .ok_or_else(|| self.decode(DecodeError::DanglingNode(node.0)))
    }

    pub(crate) fn segment_of(&self, node: NodeId) -> Result<&'a CodeSegment, RuntimeError> {
        self.routine_of(node)?
            .segment()
            .ok_or_else(|| self.decode(DecodeError::DanglingNode(node.0)))
    }

    // ---- Cursor ----

    pub(crate) fn current(&self) -> Opcode {
        self.cursor.current()
    }

    pub(crate) fn advance(&mut self) -> Result<Opcode, RuntimeError> {
        let line = self.line;
        self.cursor
            .advance()
            .map_err(|source| RuntimeError::Decode { source, line })
    }

    /// Check the current opcode and move past it.
    pub(crate) fn expect(&mut self, opcode: Opcode) -> Result<(), RuntimeError> {
        if self.current() != opcode {
            return Err(self.unexpected());
        }
        self.advance()?;
        Ok(())
    }

    /// Jump to `offset` and load the opcode found there.
    pub(crate) fn jump(&mut self, offset: usize) -> Result<(), RuntimeError> {
        let line = self.line;
        self.cursor
            .seek(offset)
            .map_err(|source| RuntimeError::Decode { source, line })?;
        self.advance()?;
        Ok(())
    }

    /// Read the marker that is the current token and move past it.
    pub(crate) fn location(&mut self) -> Result<usize, RuntimeError> {
        if self.current() != Opcode::Marker {
            return Err(self.unexpected());
        }
        let line = self.line;
        let target = self
            .cursor
            .read_location()
            .map_err(|source| RuntimeError::Decode { source, line })?;
        self.advance()?;
        Ok(target)
    }

    pub(crate) fn read_node(&mut self) -> Result<NodeId, RuntimeError> {
        let line = self.line;
        self.cursor
            .read_node()
            .map_err(|source| RuntimeError::Decode { source, line })
    }

    pub(crate) fn read_integer(&mut self) -> Result<i32, RuntimeError> {
        let line = self.line;
        self.cursor
            .read_integer()
            .map_err(|source| RuntimeError::Decode { source, line })
    }

    pub(crate) fn read_real(&mut self) -> Result<f64, RuntimeError> {
        let line = self.line;
        self.cursor
            .read_real()
            .map_err(|source| RuntimeError::Decode { source, line })
    }

    pub(crate) fn read_byte(&mut self) -> Result<u8, RuntimeError> {
        let line = self.line;
        self.cursor
            .read_byte()
            .map_err(|source| RuntimeError::Decode { source, line })
    }

    pub(crate) fn read_line(&mut self) -> Result<u32, RuntimeError> {
        let line = self.line;
        self.cursor
            .read_line()
            .map_err(|source| RuntimeError::Decode { source, line })
    }

    // ---- Errors ----

    pub(crate) fn mismatch(&self) -> RuntimeError {
        RuntimeError::TypeMismatch { line: self.line }
    }

    pub(crate) fn unexpected(&self) -> RuntimeError {
        RuntimeError::UnexpectedOpcode {
            opcode: self.current(),
            line: self.line,
        }
    }

    pub(crate) fn decode(&self, source: DecodeError) -> RuntimeError {
        RuntimeError::Decode {
            source,
            line: self.line,
        }
    }

    pub(crate) fn io_error(&self, error: std::io::Error) -> RuntimeError {
        RuntimeError::Io {
            message: error.to_string(),
            line: self.line,
        }
    }

    /// Range check of an ordinal value.
    pub(crate) fn check_range(&self, value: i64, min: i32, max: i32) -> Result<(), RuntimeError> {
        if value < i64::from(min) || value > i64::from(max) {
            return Err(RuntimeError::ValueOutOfRange {
                value,
                min: i64::from(min),
                max: i64::from(max),
                line: self.line,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tinypas_common::{Definition, RoutineBody};

    fn empty_program() -> Program {
        let mut symbols = SymbolTable::new();
        let mut routine = Routine::new(1);
        routine.body =
            RoutineBody::Declared(CodeSegment::from_bytes(vec![Opcode::EndOfSegment as u8]));
        let main = symbols.add(SymbolEntry {
            name: "empty".into(),
            definition: Definition::Procedure(routine),
            ty: None,
            level: 0,
        });
        Program::new(symbols, main)
    }

    #[test]
    fn push_respects_the_configured_limit() {
        let program = empty_program();
        let config = ExecutorConfig {
            max_stack_depth: 2,
            ..ExecutorConfig::default()
        };
        let mut vm = Executor::with_config(&program, config, &b""[..], Vec::new());
        vm.push(StackItem::Integer(1)).unwrap();
        vm.push(StackItem::Integer(2)).unwrap();
        assert_eq!(
            vm.push(StackItem::Integer(3)),
            Err(RuntimeError::StackOverflow { line: 0 })
        );
        assert_eq!(vm.stack_depth(), 2);
    }

    #[test]
    fn pop_on_empty_stack_underflows() {
        let program = empty_program();
        let mut vm = Executor::new(&program, &b""[..], Vec::new());
        assert_eq!(vm.pop(), Err(RuntimeError::StackUnderflow { line: 0 }));
    }

    #[test]
    fn tagged_pops_check_the_tag() {
        let program = empty_program();
        let mut vm = Executor::new(&program, &b""[..], Vec::new());
        vm.push(StackItem::Real(1.5)).unwrap();
        assert_eq!(vm.pop_ordinal(), Err(RuntimeError::TypeMismatch { line: 0 }));
        vm.push(StackItem::Byte(b'A')).unwrap();
        assert_eq!(vm.pop_ordinal(), Ok(65));
    }

    #[test]
    fn program_frame_is_the_global_frame() {
        let program = empty_program();
        let mut vm = Executor::new(&program, &b""[..], Vec::new());
        vm.enter_program().unwrap();
        assert_eq!(vm.stack_depth(), 4);
        assert_eq!(vm.level, 1);
        assert_eq!(vm.frame_base_for(1), Ok(0));
        assert_eq!(vm.slot(STATIC_LINK), Ok(StackItem::Address(Address::Nil)));
    }

    #[test]
    fn range_check_is_inclusive() {
        let program = empty_program();
        let vm = Executor::new(&program, &b""[..], Vec::new());
        assert!(vm.check_range(1, 1, 10).is_ok());
        assert!(vm.check_range(10, 1, 10).is_ok());
        assert!(vm.check_range(11, 1, 10).is_err());
    }
}
