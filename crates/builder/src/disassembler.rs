//! Disassembler: code segments → listing text.
//!
//! One token per line: byte offset, mnemonic, and the decoded inline
//! operand. CASE branch tables are recognized through the table marker
//! that follows the CASE token and are listed entry by entry.

use std::collections::BTreeSet;

use tinypas_common::{
    CodeSegment, ConstantValue, Cursor, DecodeError, Definition, NodeId, Opcode, Operand, Program,
    SymbolTable,
};

/// List every compiled routine of `program`, program routine first, nested
/// routines in declaration order.
pub fn disassemble(program: &Program) -> Result<String, DecodeError> {
    let mut out = String::new();
    let mut pending = vec![program.main];
    while let Some(node) = pending.pop() {
        let entry = program
            .symbols
            .get(node)
            .ok_or(DecodeError::DanglingNode(node.0))?;
        let Some(routine) = entry.routine() else {
            continue;
        };
        let Some(segment) = routine.segment() else {
            continue;
        };
        let kind = match (&entry.definition, node == program.main) {
            (_, true) => "PROGRAM",
            (Definition::Function(_), _) => "FUNCTION",
            _ => "PROCEDURE",
        };
        out.push_str(&format!("{kind} {} (level {})\n", entry.name, routine.level));
        out.push_str(&disassemble_segment(segment, &program.symbols)?);
        pending.extend(routine.nested.iter().rev().copied());
    }
    Ok(out)
}

/// List one segment.
pub fn disassemble_segment(segment: &CodeSegment, symbols: &SymbolTable) -> Result<String, DecodeError> {
    let mut cursor = Cursor::new(segment);
    let mut tables = BTreeSet::new();
    let mut previous = Opcode::EndOfSegment;
    let mut lines = Vec::new();

    loop {
        let at = cursor.position();
        if tables.remove(&at) {
            let count = cursor.read_integer()?;
            lines.push(format!("{at:04}  TABLE {count}"));
            for _ in 0..count.max(0) {
                let label = cursor.read_integer()?;
                let location = cursor.read_location()?;
                lines.push(format!("        {label} -> {location:04}"));
            }
            continue;
        }

        let opcode = cursor.advance()?;
        let operand = match opcode.operand() {
            Operand::None => None,
            Operand::Line => Some(cursor.read_line()?.to_string()),
            Operand::Location => {
                let location = cursor.read_location()?;
                if previous == Opcode::Case {
                    tables.insert(location);
                }
                Some(format!("@{location:04}"))
            }
            Operand::Node => Some(node_text(symbols, cursor.read_node()?)),
            Operand::Integer => Some(cursor.read_integer()?.to_string()),
            Operand::Real => Some(format!("{:?}", cursor.read_real()?)),
            Operand::Byte => Some(format!("'{}'", char::from(cursor.read_byte()?))),
        };

        lines.push(match operand {
            Some(operand) => format!("{at:04}  {} {operand}", opcode.mnemonic()),
            None => format!("{at:04}  {}", opcode.mnemonic()),
        });

        if opcode == Opcode::EndOfSegment {
            break;
        }
        previous = opcode;
    }

    let mut result = lines.join("\n");
    result.push('\n');
    Ok(result)
}

fn node_text(symbols: &SymbolTable, node: NodeId) -> String {
    match symbols.get(node) {
        Some(entry) => match &entry.definition {
            Definition::Constant(ConstantValue::String(bytes)) if entry.name.is_empty() => {
                format!("'{}'", String::from_utf8_lossy(bytes))
            }
            _ => entry.name.clone(),
        },
        None => format!("#{}", node.0),
    }
}
