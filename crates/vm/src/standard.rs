//! Standard procedures and functions.
//!
//! Each handler is entered with the token after the routine's name current,
//! consumes its own argument list and, for functions, pushes one result and
//! returns its type. Procedures return `None`.

use std::io::Write as _;

use tinypas_common::{Address, NodeId, Opcode, StackItem, TypeId};

use crate::error::RuntimeError;
use crate::expression::Use;
use crate::machine::Executor;

type Outcome = Result<Option<TypeId>, RuntimeError>;

/// `( expr )`, returning the value and its type.
fn single_argument(vm: &mut Executor<'_>) -> Result<(StackItem, TypeId), RuntimeError> {
    vm.expect(Opcode::LParen)?;
    let ty = vm.expression()?;
    vm.expect(Opcode::RParen)?;
    Ok((vm.pop()?, ty))
}

// ---- Input ----

pub(crate) fn read(vm: &mut Executor<'_>) -> Outcome {
    read_targets(vm)?;
    Ok(None)
}

pub(crate) fn readln(vm: &mut Executor<'_>) -> Outcome {
    read_targets(vm)?;
    vm.input.skip_line().map_err(|e| vm.io_error(e))?;
    Ok(None)
}

fn read_targets(vm: &mut Executor<'_>) -> Result<(), RuntimeError> {
    if vm.current() != Opcode::LParen {
        return Ok(());
    }
    vm.advance()?;
    loop {
        if vm.current() != Opcode::Identifier {
            return Err(vm.unexpected());
        }
        let node = vm.read_node()?;
        vm.advance()?;
        let ty = vm.variable(node, Use::Address)?;
        let target = vm.pop_address()?;
        read_into(vm, node, target, ty)?;
        if vm.current() != Opcode::Comma {
            break;
        }
        vm.advance()?;
    }
    vm.expect(Opcode::RParen)
}

fn read_into(vm: &mut Executor<'_>, node: NodeId, target: Address, ty: TypeId) -> Result<(), RuntimeError> {
    let symbols = vm.symbols();
    let base = symbols.base_type(ty);
    let predefined = symbols.predefined();

    let value = if base == predefined.char {
        // End of line reads as a blank, and so does end of file.
        let byte = vm.input.next_byte().map_err(|e| vm.io_error(e))?;
        StackItem::Byte(match byte {
            None | Some(b'\n') => b' ',
            Some(b) => b,
        })
    } else {
        let real = base == predefined.real;
        let text = vm.input.scan_number(real).map_err(|e| vm.io_error(e))?;
        let invalid = RuntimeError::InvalidInput { line: vm.line };
        if real {
            StackItem::Real(text.parse().map_err(|_| invalid)?)
        } else {
            StackItem::Integer(text.parse().map_err(|_| invalid)?)
        }
    };

    let value = vm.coerce(ty, value)?;
    vm.store(target, ty, value)?;
    if let Some(tracer) = vm.tracer.as_mut() {
        tracer.store(node, &value);
    }
    Ok(())
}

pub(crate) fn eof(vm: &mut Executor<'_>) -> Outcome {
    let at_end = vm.input.at_eof().map_err(|e| vm.io_error(e))?;
    vm.push(StackItem::boolean(at_end))?;
    Ok(Some(vm.symbols().predefined().boolean))
}

pub(crate) fn eoln(vm: &mut Executor<'_>) -> Outcome {
    let at_end = vm.input.at_eoln().map_err(|e| vm.io_error(e))?;
    vm.push(StackItem::boolean(at_end))?;
    Ok(Some(vm.symbols().predefined().boolean))
}

// ---- Output ----

pub(crate) fn write(vm: &mut Executor<'_>) -> Outcome {
    write_arguments(vm)?;
    Ok(None)
}

pub(crate) fn writeln(vm: &mut Executor<'_>) -> Outcome {
    write_arguments(vm)?;
    vm.output.write_all(b"\n").map_err(|e| vm.io_error(e))?;
    Ok(None)
}

fn write_arguments(vm: &mut Executor<'_>) -> Result<(), RuntimeError> {
    if vm.current() != Opcode::LParen {
        return Ok(());
    }
    vm.advance()?;
    loop {
        let ty = vm.expression()?;
        let value = vm.pop()?;
        let mut width = None;
        let mut precision = None;
        if vm.current() == Opcode::Colon {
            vm.advance()?;
            vm.expression()?;
            width = Some(vm.pop_ordinal()?);
            if vm.current() == Opcode::Colon {
                vm.advance()?;
                vm.expression()?;
                precision = Some(vm.pop_ordinal()?);
            }
        }
        write_value(vm, value, ty, width, precision)?;
        if vm.current() != Opcode::Comma {
            break;
        }
        vm.advance()?;
    }
    vm.expect(Opcode::RParen)
}

fn write_value(
    vm: &mut Executor<'_>,
    value: StackItem,
    ty: TypeId,
    width: Option<i32>,
    precision: Option<i32>,
) -> Result<(), RuntimeError> {
    let boolean = vm.symbols().base_type(ty) == vm.symbols().predefined().boolean;
    let text = match value {
        StackItem::Byte(b) if boolean => String::from(if b != 0 { "TRUE" } else { "FALSE" }),
        StackItem::Byte(b) => char::from(b).to_string(),
        StackItem::Integer(v) => v.to_string(),
        StackItem::Real(v) => match precision {
            Some(p) => format!("{v:.prec$}", prec = p.max(0) as usize),
            None => v.to_string(),
        },
        StackItem::Address(address) => {
            let bytes = vm.read_bytes(address, vm.ty(ty).size)?;
            String::from_utf8_lossy(&bytes).into_owned()
        }
    };
    let width = width.unwrap_or(0).max(0) as usize;
    write!(vm.output, "{text:>width$}").map_err(|e| vm.io_error(e))
}

// ---- Arithmetic ----

pub(crate) fn abs(vm: &mut Executor<'_>) -> Outcome {
    let (value, ty) = single_argument(vm)?;
    let result = match value {
        StackItem::Integer(v) => StackItem::Integer(v.wrapping_abs()),
        StackItem::Real(v) => StackItem::Real(v.abs()),
        _ => return Err(vm.mismatch()),
    };
    vm.push(result)?;
    Ok(Some(vm.symbols().base_type(ty)))
}

pub(crate) fn sqr(vm: &mut Executor<'_>) -> Outcome {
    let (value, ty) = single_argument(vm)?;
    let result = match value {
        StackItem::Integer(v) => StackItem::Integer(v.wrapping_mul(v)),
        StackItem::Real(v) => StackItem::Real(v * v),
        _ => return Err(vm.mismatch()),
    };
    vm.push(result)?;
    Ok(Some(vm.symbols().base_type(ty)))
}

/// A real-valued function of one numeric argument.
fn math(
    vm: &mut Executor<'_>,
    function: &'static str,
    valid: impl Fn(f64) -> bool,
    f: impl Fn(f64) -> f64,
) -> Outcome {
    let (value, _) = single_argument(vm)?;
    let x = value.numeric().ok_or_else(|| vm.mismatch())?;
    if !valid(x) {
        return Err(RuntimeError::InvalidFunctionArgument {
            function,
            line: vm.line,
        });
    }
    vm.push(StackItem::Real(f(x)))?;
    Ok(Some(vm.symbols().predefined().real))
}

pub(crate) fn arctan(vm: &mut Executor<'_>) -> Outcome {
    math(vm, "arctan", |_| true, f64::atan)
}

pub(crate) fn cos(vm: &mut Executor<'_>) -> Outcome {
    math(vm, "cos", |_| true, f64::cos)
}

pub(crate) fn exp(vm: &mut Executor<'_>) -> Outcome {
    math(vm, "exp", |_| true, f64::exp)
}

pub(crate) fn ln(vm: &mut Executor<'_>) -> Outcome {
    math(vm, "ln", |x| x > 0.0, f64::ln)
}

pub(crate) fn sin(vm: &mut Executor<'_>) -> Outcome {
    math(vm, "sin", |_| true, f64::sin)
}

pub(crate) fn sqrt(vm: &mut Executor<'_>) -> Outcome {
    math(vm, "sqrt", |x| x >= 0.0, f64::sqrt)
}

// ---- Ordinals ----

fn step(vm: &mut Executor<'_>, delta: i64) -> Outcome {
    let (value, ty) = single_argument(vm)?;
    let ordinal = value.ordinal().ok_or_else(|| vm.mismatch())?;
    let base = vm.symbols().base_type(ty);
    let (min, max) = vm.symbols().bounds(base).unwrap_or((i32::MIN, i32::MAX));
    let result = i64::from(ordinal) + delta;
    vm.check_range(result, min, max)?;
    let result = match value {
        StackItem::Byte(_) => StackItem::Byte(result as u8),
        _ => StackItem::Integer(result as i32),
    };
    vm.push(result)?;
    Ok(Some(base))
}

pub(crate) fn pred(vm: &mut Executor<'_>) -> Outcome {
    step(vm, -1)
}

pub(crate) fn succ(vm: &mut Executor<'_>) -> Outcome {
    step(vm, 1)
}

pub(crate) fn chr(vm: &mut Executor<'_>) -> Outcome {
    let (value, _) = single_argument(vm)?;
    let code = value.ordinal().ok_or_else(|| vm.mismatch())?;
    vm.push(StackItem::Byte(code as u8))?;
    Ok(Some(vm.symbols().predefined().char))
}

pub(crate) fn odd(vm: &mut Executor<'_>) -> Outcome {
    let (value, _) = single_argument(vm)?;
    let v = value.ordinal().ok_or_else(|| vm.mismatch())?;
    vm.push(StackItem::boolean(v & 1 != 0))?;
    Ok(Some(vm.symbols().predefined().boolean))
}

pub(crate) fn ord(vm: &mut Executor<'_>) -> Outcome {
    let (value, _) = single_argument(vm)?;
    let v = value.ordinal().ok_or_else(|| vm.mismatch())?;
    vm.push(StackItem::Integer(v))?;
    Ok(Some(vm.symbols().predefined().integer))
}

fn to_integer(vm: &mut Executor<'_>, convert: fn(f64) -> f64) -> Outcome {
    let (value, _) = single_argument(vm)?;
    let x = convert(value.numeric().ok_or_else(|| vm.mismatch())?);
    // Saturating cast; anything outside i32 fails the range check.
    vm.check_range(x as i64, i32::MIN, i32::MAX)?;
    vm.push(StackItem::Integer(x as i32))?;
    Ok(Some(vm.symbols().predefined().integer))
}

/// Half away from zero, computed as `floor(x + 0.5)` or `ceil(x - 0.5)`.
pub(crate) fn round_half_away(x: f64) -> f64 {
    if x > 0.0 {
        (x + 0.5).floor()
    } else {
        (x - 0.5).ceil()
    }
}

pub(crate) fn round(vm: &mut Executor<'_>) -> Outcome {
    to_integer(vm, round_half_away)
}

pub(crate) fn trunc(vm: &mut Executor<'_>) -> Outcome {
    to_integer(vm, f64::trunc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halves_round_away_from_zero() {
        assert_eq!(round_half_away(2.5), 3.0);
        assert_eq!(round_half_away(-2.5), -3.0);
        assert_eq!(round_half_away(2.4), 2.0);
        assert_eq!(round_half_away(-2.4), -2.0);
        assert_eq!(round_half_away(0.0), 0.0);
    }

    #[test]
    fn largest_double_below_a_half_rounds_up() {
        // 0.49999999999999994 + 0.5 is exactly 1.0 in binary64.
        assert_eq!(round_half_away(0.49999999999999994), 1.0);
        assert_eq!(round_half_away(-0.49999999999999994), -1.0);
    }
}
