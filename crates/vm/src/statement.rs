//! Statement interpretation.
//!
//! Each handler starts with the statement's first token current and leaves
//! the token that follows the statement current. Loops and branches move
//! through the segment with the location markers the builder fixed up.

use log::trace;
use tinypas_common::{Address, Definition, NodeId, Opcode, StackItem, TypeId};

use crate::error::RuntimeError;
use crate::expression::Use;
use crate::machine::{Executor, RETURN_VALUE};

impl<'a> Executor<'a> {
    pub(crate) fn statement(&mut self) -> Result<(), RuntimeError> {
        if self.current() == Opcode::Line {
            self.line = self.read_line()?;
            self.advance()?;
            trace!("line {}", self.line);
            if let Some(tracer) = self.tracer.as_mut() {
                tracer.statement(self.line);
            }
        }

        match self.current() {
            Opcode::Identifier => {
                let node = self.read_node()?;
                self.advance()?;
                if matches!(self.entry(node)?.definition, Definition::Procedure(_)) {
                    self.call_procedure(node)
                } else {
                    self.assignment(node)
                }
            }
            Opcode::Begin => self.compound(),
            Opcode::If => self.if_statement(),
            Opcode::While => self.while_statement(),
            Opcode::Repeat => self.repeat_statement(),
            Opcode::For => self.for_statement(),
            Opcode::Case => self.case_statement(),
            // Empty statement.
            _ => Ok(()),
        }
    }

    fn assignment(&mut self, node: NodeId) -> Result<(), RuntimeError> {
        let entry = self.entry(node)?;
        let ty = if let Definition::Function(routine) = &entry.definition {
            let slot = self.frame_base_for(routine.level)? + RETURN_VALUE;
            self.push(StackItem::Address(Address::Stack(slot)))?;
            self.type_of(entry)?
        } else {
            self.variable(node, Use::Address)?
        };
        self.expect(Opcode::ColonEqual)?;
        self.expression()?;
        let value = self.pop()?;
        let target = self.pop_address()?;

        let descriptor = self.ty(ty);
        if descriptor.is_structured() {
            let source = value.as_address().ok_or_else(|| self.mismatch())?;
            return self.copy_block(source, target, descriptor.size);
        }
        let value = self.coerce(ty, value)?;
        self.store(target, ty, value)?;
        if let Some(tracer) = self.tracer.as_mut() {
            tracer.store(node, &value);
        }
        Ok(())
    }

    fn compound(&mut self) -> Result<(), RuntimeError> {
        self.advance()?;
        self.statement()?;
        while self.current() == Opcode::Semicolon {
            self.advance()?;
            self.statement()?;
        }
        self.expect(Opcode::End)
    }

    // IF @false expr THEN stmt [ELSE @end stmt]
    fn if_statement(&mut self) -> Result<(), RuntimeError> {
        self.advance()?;
        let false_branch = self.location()?;
        self.expression()?;
        let condition = self.pop_boolean()?;
        self.expect(Opcode::Then)?;

        if condition {
            self.statement()?;
            if self.current() == Opcode::Else {
                self.advance()?;
                let end = self.location()?;
                self.jump(end)?;
            }
        } else {
            self.jump(false_branch)?;
            if self.current() == Opcode::Else {
                self.advance()?;
                self.location()?;
                self.statement()?;
            }
        }
        Ok(())
    }

    // WHILE @follow expr DO stmt
    fn while_statement(&mut self) -> Result<(), RuntimeError> {
        self.advance()?;
        let follow = self.location()?;
        let test = self.cursor.token_start();
        loop {
            self.expression()?;
            let condition = self.pop_boolean()?;
            if !condition {
                return self.jump(follow);
            }
            self.expect(Opcode::Do)?;
            self.statement()?;
            self.jump(test)?;
        }
    }

    // REPEAT stmt {; stmt} UNTIL expr
    fn repeat_statement(&mut self) -> Result<(), RuntimeError> {
        self.advance()?;
        let body = self.cursor.token_start();
        loop {
            self.statement()?;
            while self.current() == Opcode::Semicolon {
                self.advance()?;
                self.statement()?;
            }
            self.expect(Opcode::Until)?;
            self.expression()?;
            if self.pop_boolean()? {
                return Ok(());
            }
            self.jump(body)?;
        }
    }

    // FOR @follow IDENT := expr (TO|DOWNTO) expr DO stmt
    //
    // The initial value is stored before the limit is evaluated, so a loop
    // that never runs still leaves it in the control variable. Otherwise
    // the variable keeps the last value the loop gave it.
    fn for_statement(&mut self) -> Result<(), RuntimeError> {
        self.advance()?;
        let follow = self.location()?;
        if self.current() != Opcode::Identifier {
            return Err(self.unexpected());
        }
        let control = self.read_node()?;
        self.advance()?;
        let ty = self.variable(control, Use::Address)?;
        let target = self.pop_address()?;

        self.expect(Opcode::ColonEqual)?;
        self.expression()?;
        let initial = self.pop_ordinal()?;
        self.store_control(control, target, ty, i64::from(initial))?;
        let step: i64 = match self.current() {
            Opcode::To => 1,
            Opcode::Downto => -1,
            _ => return Err(self.unexpected()),
        };
        self.advance()?;
        self.expression()?;
        let limit = i64::from(self.pop_ordinal()?);
        self.expect(Opcode::Do)?;
        let body = self.cursor.token_start();

        let in_range = |value: i64| if step > 0 { value <= limit } else { value >= limit };
        let mut value = i64::from(initial);
        while in_range(value) {
            self.jump(body)?;
            self.statement()?;
            value += step;
            if in_range(value) {
                self.store_control(control, target, ty, value)?;
            }
        }
        self.jump(follow)
    }

    fn store_control(
        &mut self,
        control: NodeId,
        target: Address,
        ty: TypeId,
        value: i64,
    ) -> Result<(), RuntimeError> {
        let item = self.coerce(ty, StackItem::Integer(value as i32))?;
        self.store(target, ty, item)?;
        if let Some(tracer) = self.tracer.as_mut() {
            tracer.store(control, &item);
        }
        Ok(())
    }

    // CASE @table expr OF {stmt @end} END table
    fn case_statement(&mut self) -> Result<(), RuntimeError> {
        self.advance()?;
        let table = self.location()?;
        self.expression()?;
        let selector = self.pop_ordinal()?;

        self.cursor
            .seek(table)
            .map_err(|source| self.decode(source))?;
        let count = self.read_integer()?;
        let mut branch = None;
        for _ in 0..count {
            let label = self.read_integer()?;
            let location = self.cursor.read_location().map_err(|source| self.decode(source))?;
            if label == selector {
                branch = Some(location);
                break;
            }
        }
        let Some(branch) = branch else {
            return Err(RuntimeError::InvalidCaseValue {
                value: selector,
                line: self.line,
            });
        };

        self.jump(branch)?;
        self.statement()?;
        let end = self.location()?;
        self.jump(end)
    }
}
