//! Routine calls.
//!
//! A declared routine gets a fresh frame on the value stack and the cursor
//! moves into its segment until its compound statement finishes. Standard
//! routines run directly against the caller's stream and stack, dispatched
//! through a table indexed by [`StandardRoutine`].

use log::debug;
use tinypas_common::{
    Address, Cursor, NodeId, Opcode, RoutineBody, StackItem, StandardRoutine, TypeId,
};

use crate::error::RuntimeError;
use crate::expression::Use;
use crate::machine::{Executor, DYNAMIC_LINK, RETURN_ADDRESS};
use crate::standard;

type StandardHandler = for<'x> fn(&mut Executor<'x>) -> Result<Option<TypeId>, RuntimeError>;

/// Handlers in [`StandardRoutine`] discriminant order.
static STANDARD_HANDLERS: [StandardHandler; StandardRoutine::COUNT] = [
    standard::read,
    standard::readln,
    standard::write,
    standard::writeln,
    standard::eof,
    standard::eoln,
    standard::abs,
    standard::sqr,
    standard::arctan,
    standard::cos,
    standard::exp,
    standard::ln,
    standard::sin,
    standard::sqrt,
    standard::pred,
    standard::succ,
    standard::chr,
    standard::odd,
    standard::ord,
    standard::round,
    standard::trunc,
];

impl<'a> Executor<'a> {
    pub(crate) fn call_procedure(&mut self, node: NodeId) -> Result<(), RuntimeError> {
        self.call(node)?;
        Ok(())
    }

    /// Call a function and leave its result on the stack.
    pub(crate) fn call_function(&mut self, node: NodeId) -> Result<TypeId, RuntimeError> {
        self.call(node)?.ok_or_else(|| self.mismatch())
    }

    fn call(&mut self, node: NodeId) -> Result<Option<TypeId>, RuntimeError> {
        match self.routine_of(node)?.body {
            RoutineBody::Standard(routine) => STANDARD_HANDLERS[routine as usize](self),
            _ => self.call_declared(node),
        }
    }

    fn call_declared(&mut self, node: NodeId) -> Result<Option<TypeId>, RuntimeError> {
        let entry = self.entry(node)?;
        let routine = self.routine_of(node)?;
        let segment = self.segment_of(node)?;
        let result_ty = if entry.is_function() {
            Some(self.type_of(entry)?)
        } else {
            None
        };

        if self.call_depth >= self.config.max_call_depth {
            return Err(RuntimeError::StackOverflow { line: self.line });
        }

        // Frame header. The static link is the latest activation of the
        // scope that declared the callee.
        let base = self.stack.len();
        let static_link = self.frame_base_for(routine.level.saturating_sub(1))?;
        self.push(result_ty.map_or(StackItem::Integer(0), |ty| self.zero(ty)))?;
        self.push(StackItem::Address(Address::Stack(static_link)))?;
        self.push(StackItem::Address(Address::Stack(self.frame_base)))?;
        self.push(StackItem::Address(Address::Nil))?;

        if !routine.params.is_empty() {
            self.expect(Opcode::LParen)?;
            for (i, &param) in routine.params.iter().enumerate() {
                if i > 0 {
                    self.expect(Opcode::Comma)?;
                }
                self.argument(param)?;
            }
            self.expect(Opcode::RParen)?;
        }

        let resume = self.cursor.token_start();
        self.set_slot(
            base + RETURN_ADDRESS,
            StackItem::Address(Address::Code {
                routine: self.routine,
                offset: resume,
            }),
        )?;

        let caller_segment = self.cursor.segment();
        let caller_level = self.level;
        let caller_routine = self.routine;
        let caller_line = self.line;

        self.frame_base = base;
        self.level = routine.level;
        self.routine = node;
        self.call_depth += 1;
        self.cursor = Cursor::new(segment);
        debug!(
            "call {} at level {}, frame base {}",
            entry.name, routine.level, base
        );

        self.advance()?;
        self.allocate_locals(node)?;
        self.statement()?;
        if self.current() != Opcode::EndOfSegment {
            return Err(self.unexpected());
        }

        // Return.
        self.release_frame(node, base)?;
        let Address::Stack(caller_base) = self.link(base + DYNAMIC_LINK)? else {
            return Err(self.mismatch());
        };
        let Address::Code { offset, .. } = self.link(base + RETURN_ADDRESS)? else {
            return Err(self.mismatch());
        };
        self.frame_base = caller_base;
        self.level = caller_level;
        self.routine = caller_routine;
        self.line = caller_line;
        self.call_depth -= 1;
        self.cursor = Cursor::new(caller_segment);
        self.jump(offset)?;

        self.stack
            .truncate(if result_ty.is_some() { base + 1 } else { base });
        debug!("return from {} to level {}", entry.name, caller_level);
        Ok(result_ty)
    }

    /// Address held in a frame header slot.
    fn link(&self, slot: usize) -> Result<Address, RuntimeError> {
        self.slot(slot)?.as_address().ok_or_else(|| self.mismatch())
    }

    /// Evaluate one actual parameter and push it into the callee's frame.
    fn argument(&mut self, param: NodeId) -> Result<(), RuntimeError> {
        let formal = self.entry(param)?;
        let ty = self.type_of(formal)?;
        if formal.is_var_param() {
            if self.current() != Opcode::Identifier {
                return Err(self.unexpected());
            }
            let actual = self.read_node()?;
            self.advance()?;
            self.variable(actual, Use::Address)?;
            return Ok(());
        }

        self.expression()?;
        let value = self.pop()?;
        let descriptor = self.ty(ty);
        let value = if descriptor.is_structured() {
            let source = value.as_address().ok_or_else(|| self.mismatch())?;
            StackItem::Address(self.clone_block(source, descriptor.size)?)
        } else {
            self.coerce(ty, value)?
        };
        self.push(value)
    }
}

#[cfg(test)]
mod tests {
    use tinypas_builder::{Access, Arg, Expr, ProgramBuilder, Stmt};

    use crate::machine::Executor;

    #[test]
    fn returning_releases_parameter_and_local_blocks() {
        let mut b = ProgramBuilder::new("blocks");
        let int = b.integer();
        let index = b.subrange(int, 1, 4);
        let row = b.array(index, int).unwrap();
        let a = b.variable("a", row).unwrap();

        let copy = b.begin_procedure("copy").unwrap();
        let v = b.value_param("v", row).unwrap();
        let scratch = b.variable("scratch", row).unwrap();
        b.body(vec![
            Stmt::assign(scratch, Expr::name(v)),
            Stmt::assign(Access::new(scratch).index(vec![Expr::Integer(1)]), Expr::Integer(3)),
        ])
        .unwrap();
        b.end_routine().unwrap();

        let writeln = b.lookup("writeln").unwrap();
        b.body(vec![
            Stmt::call(copy, vec![Arg::from(Expr::name(a))]),
            Stmt::call(copy, vec![Arg::from(Expr::name(a))]),
            Stmt::call(writeln, vec![Arg::from(Expr::from(Access::new(a).index(vec![Expr::Integer(1)])))]),
        ])
        .unwrap();
        let program = b.finish().unwrap();

        let mut output = Vec::new();
        let mut vm = Executor::new(&program, &b""[..], &mut output);
        vm.run().unwrap();
        assert_eq!(vm.heap.live_blocks(), 0);
        drop(vm);
        assert_eq!(output, b"0\n");
    }
}
