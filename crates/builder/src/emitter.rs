//! Lowering of statement and expression trees into crunched intermediate
//! code.
//!
//! Expressions are written back in infix order; parentheses appear only
//! where the tree shape differs from what the executor's precedence
//! grammar would rebuild. Control statements carry forward location
//! markers that are fixed up once their target is emitted.

use log::trace;
use tinypas_common::{
    CodeBuffer, CodeSegment, Definition, NodeId, Opcode, RoutineBody, StandardRoutine, SymbolEntry,
    SymbolTable,
};

use crate::ast::{Access, Arg, CaseBranch, Direction, Expr, Selector, Stmt, UnaryOp};
use crate::error::BuildError;

pub(crate) struct Emitter<'s> {
    symbols: &'s mut SymbolTable,
    buffer: CodeBuffer,
    /// Line of the last statement emitted.
    line: u32,
}

impl<'s> Emitter<'s> {
    pub(crate) fn new(symbols: &'s mut SymbolTable, line: u32) -> Self {
        Self {
            symbols,
            buffer: CodeBuffer::new(),
            line,
        }
    }

    pub(crate) fn line(&self) -> u32 {
        self.line
    }

    pub(crate) fn finalize(mut self) -> Result<CodeSegment, BuildError> {
        Ok(self.buffer.finalize()?)
    }

    /// Entry behind a handle supplied by the caller, which may belong to
    /// another table.
    fn entry(&self, node: NodeId) -> Result<&SymbolEntry, BuildError> {
        self.symbols
            .get(node)
            .ok_or(BuildError::UnknownSymbol { handle: node.0 })
    }

    // ---- Statements ----

    pub(crate) fn statement(&mut self, stmt: &Stmt) -> Result<(), BuildError> {
        self.located(stmt, None)
    }

    fn located(&mut self, stmt: &Stmt, pinned: Option<u32>) -> Result<(), BuildError> {
        match stmt {
            Stmt::Line(line, inner) => return self.located(inner, Some(*line)),
            Stmt::Empty => return Ok(()),
            _ => {}
        }

        let line = pinned.unwrap_or(self.line + 1);
        self.line = line;
        self.buffer.emit_line(line);

        match stmt {
            Stmt::Assign(target, value) => self.assignment(target, value),
            Stmt::Call(procedure, args) => self.procedure_call(*procedure, args),
            Stmt::Compound(body) => self.compound(body),
            Stmt::If(cond, then, otherwise) => self.if_statement(cond, then, otherwise.as_deref()),
            Stmt::While(cond, body) => self.while_statement(cond, body),
            Stmt::Repeat(body, cond) => self.repeat_statement(body, cond),
            Stmt::For {
                control,
                initial,
                direction,
                limit,
                body,
            } => self.for_statement(*control, initial, *direction, limit, body),
            Stmt::Case(selector, branches) => self.case_statement(selector, branches),
            Stmt::Empty | Stmt::Line(..) => Ok(()),
        }
    }

    fn assignment(&mut self, target: &Access, value: &Expr) -> Result<(), BuildError> {
        let entry = self.entry(target.node)?;
        let assignable = match entry.definition {
            Definition::Variable { .. }
            | Definition::ValueParam { .. }
            | Definition::VarParam { .. } => true,
            Definition::Function(ref routine) => {
                target.selectors.is_empty() && !matches!(routine.body, RoutineBody::Standard(_))
            }
            _ => false,
        };
        if !assignable {
            return Err(BuildError::NotAssignable {
                name: entry.name.clone(),
            });
        }
        self.access(target)?;
        self.buffer.emit_opcode(Opcode::ColonEqual);
        self.expression(value)
    }

    fn procedure_call(&mut self, procedure: NodeId, args: &[Arg]) -> Result<(), BuildError> {
        let entry = self.entry(procedure)?;
        if !matches!(entry.definition, Definition::Procedure(_)) {
            return Err(BuildError::NotCallable {
                name: entry.name.clone(),
                expected: "procedure",
            });
        }
        self.check_arguments(procedure, args)?;
        self.buffer.emit_opcode(Opcode::Identifier);
        self.buffer.emit_node(procedure);
        self.arguments(args)
    }

    fn compound(&mut self, body: &[Stmt]) -> Result<(), BuildError> {
        self.buffer.emit_opcode(Opcode::Begin);
        self.sequence(body)?;
        self.buffer.emit_opcode(Opcode::End);
        Ok(())
    }

    fn sequence(&mut self, body: &[Stmt]) -> Result<(), BuildError> {
        for (i, stmt) in body.iter().enumerate() {
            if i > 0 {
                self.buffer.emit_opcode(Opcode::Semicolon);
            }
            self.statement(stmt)?;
        }
        Ok(())
    }

    // IF @false expr THEN stmt [ELSE @end stmt]
    fn if_statement(
        &mut self,
        cond: &Expr,
        then: &Stmt,
        otherwise: Option<&Stmt>,
    ) -> Result<(), BuildError> {
        self.buffer.emit_opcode(Opcode::If);
        let false_branch = self.buffer.emit_marker();
        self.expression(cond)?;
        self.buffer.emit_opcode(Opcode::Then);

        // A bare THEN statement in front of ELSE is bracketed so the ELSE
        // can never be read as part of it.
        let bracket = otherwise.is_some() && !is_compound(then);
        if bracket {
            self.buffer.emit_opcode(Opcode::Begin);
        }
        self.statement(then)?;
        if bracket {
            self.buffer.emit_opcode(Opcode::End);
        }
        self.buffer.fixup_marker(false_branch)?;

        if let Some(otherwise) = otherwise {
            self.buffer.emit_opcode(Opcode::Else);
            let end = self.buffer.emit_marker();
            self.statement(otherwise)?;
            self.buffer.fixup_marker(end)?;
        }
        Ok(())
    }

    // WHILE @follow expr DO stmt
    fn while_statement(&mut self, cond: &Expr, body: &Stmt) -> Result<(), BuildError> {
        self.buffer.emit_opcode(Opcode::While);
        let follow = self.buffer.emit_marker();
        self.expression(cond)?;
        self.buffer.emit_opcode(Opcode::Do);
        self.statement(body)?;
        self.buffer.fixup_marker(follow)?;
        Ok(())
    }

    fn repeat_statement(&mut self, body: &[Stmt], cond: &Expr) -> Result<(), BuildError> {
        self.buffer.emit_opcode(Opcode::Repeat);
        self.sequence(body)?;
        self.buffer.emit_opcode(Opcode::Until);
        self.expression(cond)
    }

    // FOR @follow IDENT := expr TO|DOWNTO expr DO stmt
    fn for_statement(
        &mut self,
        control: NodeId,
        initial: &Expr,
        direction: Direction,
        limit: &Expr,
        body: &Stmt,
    ) -> Result<(), BuildError> {
        let entry = self.entry(control)?;
        let ordinal = match (entry.frame_offset(), entry.ty) {
            (Some(_), Some(ty)) => {
                !self.symbols.is_real(ty) && !self.symbols.ty(ty).is_structured()
            }
            _ => false,
        };
        if !ordinal {
            return Err(BuildError::InvalidControl {
                name: entry.name.clone(),
            });
        }

        self.buffer.emit_opcode(Opcode::For);
        let follow = self.buffer.emit_marker();
        self.buffer.emit_opcode(Opcode::Identifier);
        self.buffer.emit_node(control);
        self.buffer.emit_opcode(Opcode::ColonEqual);
        self.expression(initial)?;
        self.buffer.emit_opcode(match direction {
            Direction::To => Opcode::To,
            Direction::Downto => Opcode::Downto,
        });
        self.expression(limit)?;
        self.buffer.emit_opcode(Opcode::Do);
        self.statement(body)?;
        self.buffer.fixup_marker(follow)?;
        Ok(())
    }

    // CASE @table expr OF {stmt @end} END table
    //
    // table := count:i32 {label:i32 location:u32}; every @end points past
    // the table.
    fn case_statement(&mut self, selector: &Expr, branches: &[CaseBranch]) -> Result<(), BuildError> {
        self.buffer.emit_opcode(Opcode::Case);
        let table = self.buffer.emit_marker();
        self.expression(selector)?;
        self.buffer.emit_opcode(Opcode::Of);

        let mut entries: Vec<(i32, usize)> = Vec::new();
        let mut ends = Vec::with_capacity(branches.len());
        for branch in branches {
            let location = self.buffer.position();
            for &label in &branch.labels {
                if entries.iter().any(|&(l, _)| l == label) {
                    return Err(BuildError::DuplicateCaseLabel { label });
                }
                entries.push((label, location));
            }
            self.statement(&branch.body)?;
            ends.push(self.buffer.emit_marker());
        }
        self.buffer.emit_opcode(Opcode::End);

        self.buffer.fixup_marker(table)?;
        self.buffer.emit_integer(entries.len() as i32);
        for (label, location) in entries {
            self.buffer.emit_integer(label);
            self.buffer.emit_location(location)?;
        }
        self.buffer.fixup_all(ends)?;
        trace!("case table with {} branch(es) closed at line {}", branches.len(), self.line);
        Ok(())
    }

    // ---- Calls ----

    fn check_arguments(&self, routine: NodeId, args: &[Arg]) -> Result<(), BuildError> {
        let entry = self.entry(routine)?;
        let name = entry.name.clone();
        let Some(payload) = entry.routine() else {
            return Err(BuildError::NotCallable {
                name,
                expected: "routine",
            });
        };

        let formatted = args
            .iter()
            .any(|a| a.width.is_some() || a.precision.is_some());
        let count = |expected: usize| {
            if args.len() == expected {
                Ok(())
            } else {
                Err(BuildError::ArgumentCount {
                    routine: name.clone(),
                    expected,
                    found: args.len(),
                })
            }
        };

        match payload.body {
            RoutineBody::Standard(StandardRoutine::Write | StandardRoutine::Writeln) => Ok(()),
            _ if formatted => Err(BuildError::FormatNotAllowed {
                routine: name.clone(),
            }),
            RoutineBody::Standard(StandardRoutine::Read | StandardRoutine::Readln) => {
                if args.iter().all(|a| matches!(a.expr, Expr::Access(_))) {
                    Ok(())
                } else {
                    Err(BuildError::ArgumentNotVariable { routine: name.clone() })
                }
            }
            RoutineBody::Standard(StandardRoutine::Eof | StandardRoutine::Eoln) => count(0),
            RoutineBody::Standard(_) => count(1),
            RoutineBody::Declared(_) | RoutineBody::Pending => {
                count(payload.params.len())?;
                for (formal, actual) in payload.params.iter().zip(args) {
                    if self.entry(*formal)?.is_var_param()
                        && !matches!(actual.expr, Expr::Access(_))
                    {
                        return Err(BuildError::ArgumentNotVariable { routine: name.clone() });
                    }
                }
                Ok(())
            }
        }
    }

    fn arguments(&mut self, args: &[Arg]) -> Result<(), BuildError> {
        if args.is_empty() {
            return Ok(());
        }
        self.buffer.emit_opcode(Opcode::LParen);
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                self.buffer.emit_opcode(Opcode::Comma);
            }
            self.expression(&arg.expr)?;
            if let Some(width) = &arg.width {
                self.buffer.emit_opcode(Opcode::Colon);
                self.expression(width)?;
                if let Some(precision) = &arg.precision {
                    self.buffer.emit_opcode(Opcode::Colon);
                    self.expression(precision)?;
                }
            }
        }
        self.buffer.emit_opcode(Opcode::RParen);
        Ok(())
    }

    // ---- Expressions ----

    pub(crate) fn expression(&mut self, expr: &Expr) -> Result<(), BuildError> {
        match expr {
            Expr::Integer(v) => {
                self.buffer.emit_opcode(Opcode::Integer);
                self.buffer.emit_integer(*v);
            }
            Expr::Real(v) => {
                self.buffer.emit_opcode(Opcode::Real);
                self.buffer.emit_real(*v);
            }
            Expr::Char(c) => {
                self.buffer.emit_opcode(Opcode::Char);
                self.buffer.emit_byte(*c);
            }
            Expr::Str(s) => match s.as_bytes() {
                [] => return Err(BuildError::EmptyString),
                [c] => {
                    self.buffer.emit_opcode(Opcode::Char);
                    self.buffer.emit_byte(*c);
                }
                bytes => {
                    let node = self.symbols.add_string(bytes);
                    self.buffer.emit_opcode(Opcode::String);
                    self.buffer.emit_node(node);
                }
            },
            Expr::Access(access) => self.access(access)?,
            Expr::Call(function, args) => self.function_call(*function, args)?,
            Expr::Unary(op, operand) => {
                let (opcode, required) = match op {
                    UnaryOp::Neg => (Opcode::Minus, 3),
                    UnaryOp::Pos => (Opcode::Plus, 3),
                    UnaryOp::Not => (Opcode::Not, 4),
                };
                self.buffer.emit_opcode(opcode);
                self.operand(operand, required)?;
            }
            Expr::Binary(op, left, right) => {
                let level = op.precedence();
                // Relational operators do not chain.
                let (left_min, right_min) = if level == 1 { (2, 2) } else { (level, level + 1) };
                self.operand(left, left_min)?;
                self.buffer.emit_opcode(op.opcode());
                self.operand(right, right_min)?;
            }
        }
        Ok(())
    }

    fn operand(&mut self, expr: &Expr, required: u8) -> Result<(), BuildError> {
        if expr.precedence() < required {
            self.buffer.emit_opcode(Opcode::LParen);
            self.expression(expr)?;
            self.buffer.emit_opcode(Opcode::RParen);
            Ok(())
        } else {
            self.expression(expr)
        }
    }

    fn function_call(&mut self, function: NodeId, args: &[Expr]) -> Result<(), BuildError> {
        let entry = self.entry(function)?;
        if !entry.is_function() {
            return Err(BuildError::NotCallable {
                name: entry.name.clone(),
                expected: "function",
            });
        }
        let args: Vec<Arg> = args.iter().cloned().map(Arg::from).collect();
        self.check_arguments(function, &args)?;
        self.buffer.emit_opcode(Opcode::Identifier);
        self.buffer.emit_node(function);
        self.arguments(&args)
    }

    fn access(&mut self, access: &Access) -> Result<(), BuildError> {
        self.entry(access.node)?;
        self.buffer.emit_opcode(Opcode::Identifier);
        self.buffer.emit_node(access.node);
        for selector in &access.selectors {
            match selector {
                Selector::Index(subscripts) => {
                    self.buffer.emit_opcode(Opcode::LBracket);
                    for (i, subscript) in subscripts.iter().enumerate() {
                        if i > 0 {
                            self.buffer.emit_opcode(Opcode::Comma);
                        }
                        self.expression(subscript)?;
                    }
                    self.buffer.emit_opcode(Opcode::RBracket);
                }
                Selector::Field(field) => {
                    self.entry(*field)?;
                    self.buffer.emit_opcode(Opcode::Period);
                    self.buffer.emit_opcode(Opcode::Identifier);
                    self.buffer.emit_node(*field);
                }
            }
        }
        Ok(())
    }
}

fn is_compound(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Compound(_) => true,
        Stmt::Line(_, inner) => is_compound(inner),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinaryOp;
    use tinypas_common::Cursor;

    fn opcodes(segment: &CodeSegment) -> Vec<Opcode> {
        let mut cursor = Cursor::new(segment);
        let mut out = Vec::new();
        loop {
            let op = cursor.advance().unwrap();
            let skip = op.operand().width();
            cursor.seek(cursor.position() + skip).unwrap();
            out.push(op);
            if op == Opcode::EndOfSegment {
                return out;
            }
        }
    }

    fn lower(expr: &Expr) -> Vec<Opcode> {
        let mut symbols = SymbolTable::new();
        let mut emitter = Emitter::new(&mut symbols, 0);
        emitter.expression(expr).unwrap();
        let segment = emitter.finalize().unwrap();
        opcodes(&segment)
    }

    #[test]
    fn left_nested_sum_needs_no_parentheses() {
        let e = Expr::binary(
            BinaryOp::Sub,
            Expr::binary(BinaryOp::Sub, Expr::Integer(1), Expr::Integer(2)),
            Expr::Integer(3),
        );
        assert!(!lower(&e).contains(&Opcode::LParen));
    }

    #[test]
    fn right_nested_difference_is_parenthesized() {
        let e = Expr::binary(
            BinaryOp::Sub,
            Expr::Integer(1),
            Expr::binary(BinaryOp::Sub, Expr::Integer(2), Expr::Integer(3)),
        );
        assert_eq!(
            lower(&e),
            vec![
                Opcode::Integer,
                Opcode::Minus,
                Opcode::LParen,
                Opcode::Integer,
                Opcode::Minus,
                Opcode::Integer,
                Opcode::RParen,
                Opcode::EndOfSegment,
            ]
        );
    }

    #[test]
    fn not_binds_to_a_single_factor() {
        let e = Expr::not(Expr::binary(BinaryOp::Lt, Expr::Integer(1), Expr::Integer(2)));
        assert_eq!(lower(&e)[..2], [Opcode::Not, Opcode::LParen]);
    }

    #[test]
    fn single_char_string_is_a_char() {
        assert_eq!(lower(&Expr::string("x")), vec![Opcode::Char, Opcode::EndOfSegment]);
        assert_eq!(lower(&Expr::string("xy")), vec![Opcode::String, Opcode::EndOfSegment]);
    }

    #[test]
    fn empty_string_is_rejected() {
        let mut symbols = SymbolTable::new();
        let mut emitter = Emitter::new(&mut symbols, 0);
        assert_eq!(emitter.expression(&Expr::string("")), Err(BuildError::EmptyString));
    }

    #[test]
    fn statements_number_lines_consecutively() {
        let mut symbols = SymbolTable::new();
        let mut emitter = Emitter::new(&mut symbols, 10);
        emitter
            .statement(&Stmt::Compound(vec![Stmt::Compound(vec![]), Stmt::at(40, Stmt::Compound(vec![]))]))
            .unwrap();
        assert_eq!(emitter.line(), 40);
        let segment = emitter.finalize().unwrap();
        let mut cursor = Cursor::new(&segment);
        cursor.advance().unwrap();
        assert_eq!(cursor.read_line().unwrap(), 11);
        cursor.advance().unwrap();
        cursor.advance().unwrap();
        assert_eq!(cursor.read_line().unwrap(), 12);
    }

    #[test]
    fn foreign_handles_are_rejected() {
        let mut symbols = SymbolTable::new();
        let stray = NodeId(symbols.len() as u32 + 100);
        let mut emitter = Emitter::new(&mut symbols, 0);
        let unknown = Err(BuildError::UnknownSymbol { handle: stray.0 });
        assert_eq!(emitter.expression(&Expr::name(stray)), unknown);
        assert_eq!(emitter.expression(&Expr::call(stray, vec![])), unknown);
        assert_eq!(emitter.statement(&Stmt::assign(stray, Expr::Integer(1))), unknown);
        assert_eq!(emitter.statement(&Stmt::call(stray, vec![])), unknown);
        assert_eq!(
            emitter.statement(&Stmt::for_loop(
                stray,
                Expr::Integer(1),
                Direction::To,
                Expr::Integer(2),
                Stmt::Empty,
            )),
            unknown
        );
    }

    #[test]
    fn empty_statement_emits_nothing() {
        let mut symbols = SymbolTable::new();
        let mut emitter = Emitter::new(&mut symbols, 0);
        emitter.statement(&Stmt::Empty).unwrap();
        assert_eq!(emitter.line(), 0);
        assert_eq!(opcodes(&emitter.finalize().unwrap()), vec![Opcode::EndOfSegment]);
    }
}
