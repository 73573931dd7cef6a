//! Expression evaluation.
//!
//! The token stream holds expressions in infix order. They are rebuilt by
//! recursive descent over the usual Pascal precedence levels:
//!
//! ```text
//! expression := simple [relop simple]
//! simple     := [+|-] term {(+|-|OR) term}
//! term       := factor {(*|/|DIV|MOD|AND) factor}
//! factor     := IDENT {selector} | literal | NOT factor | ( expression )
//! ```
//!
//! Every function leaves exactly one item on the value stack and returns the
//! type of that item. Array and record values are left as addresses.

use std::cmp::Ordering;

use tinypas_common::{
    Address, ConstantValue, Definition, NodeId, Opcode, StackItem, TypeForm, TypeId,
};

use crate::error::RuntimeError;
use crate::machine::Executor;

/// What a variable reference is evaluated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Use {
    /// Push the value. Arrays and records still push their address.
    Load,
    /// Push the address: assignment targets, VAR arguments, read targets.
    Address,
}

impl<'a> Executor<'a> {
    pub(crate) fn expression(&mut self) -> Result<TypeId, RuntimeError> {
        let left_ty = self.simple_expression()?;
        let op = self.current();
        if !op.is_relational() {
            return Ok(left_ty);
        }
        self.advance()?;
        let right_ty = self.simple_expression()?;
        let right = self.pop()?;
        let left = self.pop()?;

        let ordering = if self.ty(left_ty).is_structured() && self.ty(right_ty).is_structured() {
            let len = self.ty(left_ty).size;
            let left = left.as_address().ok_or_else(|| self.mismatch())?;
            let right = right.as_address().ok_or_else(|| self.mismatch())?;
            Some(self.read_bytes(left, len)?.cmp(&self.read_bytes(right, len)?))
        } else if matches!(left, StackItem::Real(_)) || matches!(right, StackItem::Real(_)) {
            let (l, r) = self.numeric_pair(left, right)?;
            l.partial_cmp(&r)
        } else {
            let l = left.ordinal().ok_or_else(|| self.mismatch())?;
            let r = right.ordinal().ok_or_else(|| self.mismatch())?;
            Some(l.cmp(&r))
        };

        let result = match ordering {
            // NaN compares unequal to everything.
            None => op == Opcode::NotEqual,
            Some(ordering) => match op {
                Opcode::Equal => ordering == Ordering::Equal,
                Opcode::NotEqual => ordering != Ordering::Equal,
                Opcode::Less => ordering == Ordering::Less,
                Opcode::LessEqual => ordering != Ordering::Greater,
                Opcode::Greater => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            },
        };
        self.push(StackItem::boolean(result))?;
        Ok(self.symbols().predefined().boolean)
    }

    fn simple_expression(&mut self) -> Result<TypeId, RuntimeError> {
        let sign = self.current();
        let signed = matches!(sign, Opcode::Plus | Opcode::Minus);
        if signed {
            self.advance()?;
        }
        let mut ty = self.term()?;
        if sign == Opcode::Minus {
            let negated = match self.pop()? {
                StackItem::Integer(v) => StackItem::Integer(v.wrapping_neg()),
                StackItem::Real(v) => StackItem::Real(-v),
                _ => return Err(self.mismatch()),
            };
            self.push(negated)?;
        }
        while self.current().is_additive() {
            let op = self.current();
            self.advance()?;
            self.term()?;
            ty = self.arithmetic(op)?;
        }
        Ok(ty)
    }

    fn term(&mut self) -> Result<TypeId, RuntimeError> {
        let mut ty = self.factor()?;
        while self.current().is_multiplicative() {
            let op = self.current();
            self.advance()?;
            self.factor()?;
            ty = self.arithmetic(op)?;
        }
        Ok(ty)
    }

    /// Apply an additive or multiplicative operator to the top two items.
    fn arithmetic(&mut self, op: Opcode) -> Result<TypeId, RuntimeError> {
        let right = self.pop()?;
        let left = self.pop()?;
        let predefined = *self.symbols().predefined();

        let (item, ty) = match op {
            Opcode::And | Opcode::Or => {
                let l = left.as_byte().ok_or_else(|| self.mismatch())? != 0;
                let r = right.as_byte().ok_or_else(|| self.mismatch())? != 0;
                let value = if op == Opcode::And { l && r } else { l || r };
                (StackItem::boolean(value), predefined.boolean)
            }
            Opcode::Div | Opcode::Mod => {
                let l = left.as_integer().ok_or_else(|| self.mismatch())?;
                let r = right.as_integer().ok_or_else(|| self.mismatch())?;
                if r == 0 {
                    return Err(RuntimeError::DivisionByZero { line: self.line });
                }
                let value = if op == Opcode::Div { l.wrapping_div(r) } else { l.wrapping_rem(r) };
                (StackItem::Integer(value), predefined.integer)
            }
            Opcode::Slash => {
                let (l, r) = self.numeric_pair(left, right)?;
                if r == 0.0 {
                    return Err(RuntimeError::DivisionByZero { line: self.line });
                }
                (StackItem::Real(l / r), predefined.real)
            }
            _ => match (left, right) {
                (StackItem::Integer(l), StackItem::Integer(r)) => {
                    let value = match op {
                        Opcode::Plus => l.wrapping_add(r),
                        Opcode::Minus => l.wrapping_sub(r),
                        _ => l.wrapping_mul(r),
                    };
                    (StackItem::Integer(value), predefined.integer)
                }
                _ => {
                    let (l, r) = self.numeric_pair(left, right)?;
                    let value = match op {
                        Opcode::Plus => l + r,
                        Opcode::Minus => l - r,
                        _ => l * r,
                    };
                    (StackItem::Real(value), predefined.real)
                }
            },
        };
        self.push(item)?;
        Ok(ty)
    }

    fn numeric_pair(&self, left: StackItem, right: StackItem) -> Result<(f64, f64), RuntimeError> {
        match (left.numeric(), right.numeric()) {
            (Some(l), Some(r)) => Ok((l, r)),
            _ => Err(self.mismatch()),
        }
    }

    fn factor(&mut self) -> Result<TypeId, RuntimeError> {
        let predefined = *self.symbols().predefined();
        match self.current() {
            Opcode::Identifier => {
                let node = self.read_node()?;
                self.advance()?;
                self.identifier_factor(node)
            }
            Opcode::Integer => {
                let value = self.read_integer()?;
                self.advance()?;
                self.push(StackItem::Integer(value))?;
                Ok(predefined.integer)
            }
            Opcode::Real => {
                let value = self.read_real()?;
                self.advance()?;
                self.push(StackItem::Real(value))?;
                Ok(predefined.real)
            }
            Opcode::Char => {
                let value = self.read_byte()?;
                self.advance()?;
                self.push(StackItem::Byte(value))?;
                Ok(predefined.char)
            }
            Opcode::String => {
                let node = self.read_node()?;
                self.advance()?;
                let ty = self.type_of(self.entry(node)?)?;
                self.push(StackItem::Address(Address::Literal { node, offset: 0 }))?;
                Ok(ty)
            }
            Opcode::Not => {
                self.advance()?;
                self.factor()?;
                let value = self.pop_boolean()?;
                self.push(StackItem::boolean(!value))?;
                Ok(predefined.boolean)
            }
            Opcode::LParen => {
                self.advance()?;
                let ty = self.expression()?;
                self.expect(Opcode::RParen)?;
                Ok(ty)
            }
            _ => Err(self.unexpected()),
        }
    }

    fn identifier_factor(&mut self, node: NodeId) -> Result<TypeId, RuntimeError> {
        let entry = self.entry(node)?;
        match &entry.definition {
            Definition::Constant(value) => {
                let ty = self.type_of(entry)?;
                let item = match value {
                    ConstantValue::Integer(v) if self.ty(ty).size == 1 => StackItem::Byte(*v as u8),
                    ConstantValue::Integer(v) => StackItem::Integer(*v),
                    ConstantValue::Real(v) => StackItem::Real(*v),
                    ConstantValue::Char(c) => StackItem::Byte(*c),
                    ConstantValue::String(_) => StackItem::Address(Address::Literal { node, offset: 0 }),
                };
                self.push(item)?;
                Ok(ty)
            }
            Definition::Function(_) => self.call_function(node),
            _ => self.variable(node, Use::Load),
        }
    }

    /// Resolve a variable or parameter reference and its selectors.
    pub(crate) fn variable(&mut self, node: NodeId, usage: Use) -> Result<TypeId, RuntimeError> {
        let entry = self.entry(node)?;
        let offset = entry.frame_offset().ok_or_else(|| self.mismatch())?;
        let mut ty = self.type_of(entry)?;
        let slot = self.frame_base_for(entry.level)? + offset;

        // VAR parameters and array/record variables hold an address.
        let mut address = if entry.is_var_param() || self.ty(ty).is_structured() {
            self.slot(slot)?.as_address().ok_or_else(|| self.mismatch())?
        } else {
            Address::Stack(slot)
        };

        loop {
            match self.current() {
                Opcode::LBracket => {
                    self.advance()?;
                    loop {
                        (address, ty) = self.subscript(address, ty)?;
                        if self.current() != Opcode::Comma {
                            break;
                        }
                        self.advance()?;
                    }
                    self.expect(Opcode::RBracket)?;
                }
                Opcode::Period => {
                    self.advance()?;
                    if self.current() != Opcode::Identifier {
                        return Err(self.unexpected());
                    }
                    let field = self.read_node()?;
                    let field = self.entry(field)?;
                    self.advance()?;
                    let Definition::Field { offset } = field.definition else {
                        return Err(self.mismatch());
                    };
                    address = address.offset_by(offset).ok_or_else(|| self.mismatch())?;
                    ty = self.type_of(field)?;
                }
                _ => break,
            }
        }

        if usage == Use::Load && !self.ty(ty).is_structured() {
            let value = self.load(address, ty)?;
            self.push(value)?;
            if let Some(tracer) = self.tracer.as_mut() {
                tracer.fetch(node, &value);
            }
        } else {
            self.push(StackItem::Address(address))?;
        }
        Ok(ty)
    }

    /// Apply one index expression to an array address.
    fn subscript(&mut self, address: Address, ty: TypeId) -> Result<(Address, TypeId), RuntimeError> {
        let TypeForm::Array { element, min_index, max_index, .. } = self.ty(ty).form else {
            return Err(self.mismatch());
        };
        self.expression()?;
        let index = self.pop_ordinal()?;
        self.check_range(i64::from(index), min_index, max_index)?;
        let delta = (i64::from(index) - i64::from(min_index)) as usize * self.ty(element).size;
        let address = address.offset_by(delta).ok_or_else(|| self.mismatch())?;
        Ok((address, element))
    }
}

#[cfg(test)]
mod tests {
    use tinypas_common::{CodeBuffer, CodeSegment, Program, Routine, RoutineBody, SymbolEntry, SymbolTable};

    use super::*;

    fn program() -> Program {
        let mut symbols = SymbolTable::new();
        let mut routine = Routine::new(1);
        routine.body =
            RoutineBody::Declared(CodeSegment::from_bytes(vec![Opcode::EndOfSegment as u8]));
        let main = symbols.add(SymbolEntry {
            name: "expr".into(),
            definition: Definition::Procedure(routine),
            ty: None,
            level: 0,
        });
        Program::new(symbols, main)
    }

    fn segment(emit: impl FnOnce(&mut CodeBuffer)) -> CodeSegment {
        let mut buffer = CodeBuffer::new();
        emit(&mut buffer);
        buffer.finalize().unwrap()
    }

    fn int(buffer: &mut CodeBuffer, v: i32) {
        buffer.emit_opcode(Opcode::Integer);
        buffer.emit_integer(v);
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let program = program();
        let code = segment(|b| {
            int(b, 2);
            b.emit_opcode(Opcode::Plus);
            int(b, 3);
            b.emit_opcode(Opcode::Star);
            int(b, 4);
        });
        let mut vm = Executor::new(&program, &b""[..], Vec::new());
        assert_eq!(vm.evaluate(&code), Ok(StackItem::Integer(14)));
    }

    #[test]
    fn leading_minus_applies_to_first_term() {
        let program = program();
        let code = segment(|b| {
            b.emit_opcode(Opcode::Minus);
            int(b, 2);
            b.emit_opcode(Opcode::Star);
            int(b, 3);
            b.emit_opcode(Opcode::Plus);
            int(b, 10);
        });
        let mut vm = Executor::new(&program, &b""[..], Vec::new());
        assert_eq!(vm.evaluate(&code), Ok(StackItem::Integer(4)));
    }

    #[test]
    fn mixed_operands_promote_to_real() {
        let program = program();
        let code = segment(|b| {
            int(b, 1);
            b.emit_opcode(Opcode::Plus);
            b.emit_opcode(Opcode::Real);
            b.emit_real(0.5);
        });
        let mut vm = Executor::new(&program, &b""[..], Vec::new());
        assert_eq!(vm.evaluate(&code), Ok(StackItem::Real(1.5)));
    }

    #[test]
    fn slash_always_yields_real() {
        let program = program();
        let code = segment(|b| {
            int(b, 7);
            b.emit_opcode(Opcode::Slash);
            int(b, 2);
        });
        let mut vm = Executor::new(&program, &b""[..], Vec::new());
        assert_eq!(vm.evaluate(&code), Ok(StackItem::Real(3.5)));
    }

    #[test]
    fn mod_by_zero_is_fatal() {
        let program = program();
        let code = segment(|b| {
            int(b, 7);
            b.emit_opcode(Opcode::Mod);
            int(b, 0);
        });
        let mut vm = Executor::new(&program, &b""[..], Vec::new());
        assert_eq!(vm.evaluate(&code), Err(RuntimeError::DivisionByZero { line: 0 }));
    }

    #[test]
    fn relational_result_is_boolean() {
        let program = program();
        let code = segment(|b| {
            b.emit_opcode(Opcode::Char);
            b.emit_byte(b'a');
            b.emit_opcode(Opcode::Less);
            b.emit_opcode(Opcode::Char);
            b.emit_byte(b'b');
        });
        let mut vm = Executor::new(&program, &b""[..], Vec::new());
        assert_eq!(vm.evaluate(&code), Ok(StackItem::boolean(true)));
    }

    #[test]
    fn not_negates_a_parenthesized_comparison() {
        let program = program();
        let code = segment(|b| {
            b.emit_opcode(Opcode::Not);
            b.emit_opcode(Opcode::LParen);
            int(b, 1);
            b.emit_opcode(Opcode::Equal);
            int(b, 1);
            b.emit_opcode(Opcode::RParen);
        });
        let mut vm = Executor::new(&program, &b""[..], Vec::new());
        assert_eq!(vm.evaluate(&code), Ok(StackItem::boolean(false)));
    }

    #[test]
    fn boolean_constants_are_bytes() {
        let program = program();
        let true_const = program.symbols.predefined().true_const;
        let code = segment(|b| {
            b.emit_opcode(Opcode::Identifier);
            b.emit_node(true_const);
        });
        let mut vm = Executor::new(&program, &b""[..], Vec::new());
        assert_eq!(vm.evaluate(&code), Ok(StackItem::Byte(1)));
    }
}
