//! Statement and expression trees handed to the builder.
//!
//! Names are already resolved: every identifier is a [`NodeId`] obtained
//! from the [`ProgramBuilder`](crate::ProgramBuilder) declaration calls.

use tinypas_common::{NodeId, Opcode};

/// A component selector following a variable name.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// `[e1, e2, ...]`
    Index(Vec<Expr>),
    /// `.field`
    Field(NodeId),
}

/// A variable reference: a name followed by zero or more selectors.
#[derive(Debug, Clone, PartialEq)]
pub struct Access {
    pub node: NodeId,
    pub selectors: Vec<Selector>,
}

impl Access {
    pub fn new(node: NodeId) -> Self {
        Self {
            node,
            selectors: Vec::new(),
        }
    }

    pub fn index(mut self, subscripts: Vec<Expr>) -> Self {
        self.selectors.push(Selector::Index(subscripts));
        self
    }

    pub fn field(mut self, field: NodeId) -> Self {
        self.selectors.push(Selector::Field(field));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Or,
    Mul,
    /// Real division, `/`.
    Divide,
    /// Integer division, `div`.
    Div,
    Mod,
    And,
}

impl BinaryOp {
    pub fn opcode(self) -> Opcode {
        match self {
            BinaryOp::Eq => Opcode::Equal,
            BinaryOp::Ne => Opcode::NotEqual,
            BinaryOp::Lt => Opcode::Less,
            BinaryOp::Le => Opcode::LessEqual,
            BinaryOp::Gt => Opcode::Greater,
            BinaryOp::Ge => Opcode::GreaterEqual,
            BinaryOp::Add => Opcode::Plus,
            BinaryOp::Sub => Opcode::Minus,
            BinaryOp::Or => Opcode::Or,
            BinaryOp::Mul => Opcode::Star,
            BinaryOp::Divide => Opcode::Slash,
            BinaryOp::Div => Opcode::Div,
            BinaryOp::Mod => Opcode::Mod,
            BinaryOp::And => Opcode::And,
        }
    }

    /// Binding strength: relational 1, additive 2, multiplicative 3.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => 1,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Or => 2,
            BinaryOp::Mul | BinaryOp::Divide | BinaryOp::Div | BinaryOp::Mod | BinaryOp::And => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Integer(i32),
    Real(f64),
    Char(u8),
    /// A string literal. One-character strings are emitted as characters.
    Str(String),
    Access(Access),
    /// Function call; `args` is empty for parameterless functions.
    Call(NodeId, Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    /// A plain variable or constant name.
    pub fn name(node: NodeId) -> Self {
        Expr::Access(Access::new(node))
    }

    pub fn string(s: &str) -> Self {
        Expr::Str(s.to_string())
    }

    pub fn call(function: NodeId, args: Vec<Expr>) -> Self {
        Expr::Call(function, args)
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary(op, Box::new(operand))
    }

    pub fn neg(operand: Expr) -> Self {
        Self::unary(UnaryOp::Neg, operand)
    }

    pub fn not(operand: Expr) -> Self {
        Self::unary(UnaryOp::Not, operand)
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary(op, Box::new(left), Box::new(right))
    }

    /// Binding strength as an operand: operators per [`BinaryOp::precedence`],
    /// sign prefixes bind like additive operators, everything else is a
    /// factor (4).
    pub fn precedence(&self) -> u8 {
        match self {
            Expr::Binary(op, ..) => op.precedence(),
            Expr::Unary(UnaryOp::Neg | UnaryOp::Pos, _) => 2,
            _ => 4,
        }
    }
}

impl From<Access> for Expr {
    fn from(access: Access) -> Self {
        Expr::Access(access)
    }
}

/// An actual parameter of a procedure call, with the optional `:width` and
/// `:precision` accepted by `write` and `writeln`.
#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    pub expr: Expr,
    pub width: Option<Expr>,
    pub precision: Option<Expr>,
}

impl Arg {
    pub fn formatted(expr: Expr, width: Expr, precision: Option<Expr>) -> Self {
        Self {
            expr,
            width: Some(width),
            precision,
        }
    }
}

impl From<Expr> for Arg {
    fn from(expr: Expr) -> Self {
        Self {
            expr,
            width: None,
            precision: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    To,
    Downto,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseBranch {
    pub labels: Vec<i32>,
    pub body: Stmt,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// Assignment to a variable or, inside a function, to its result.
    Assign(Access, Expr),
    /// Procedure call.
    Call(NodeId, Vec<Arg>),
    Compound(Vec<Stmt>),
    If(Expr, Box<Stmt>, Option<Box<Stmt>>),
    While(Expr, Box<Stmt>),
    Repeat(Vec<Stmt>, Expr),
    For {
        control: NodeId,
        initial: Expr,
        direction: Direction,
        limit: Expr,
        body: Box<Stmt>,
    },
    Case(Expr, Vec<CaseBranch>),
    Empty,
    /// Pins the source line of the wrapped statement. Unwrapped statements
    /// take the line after the previous one.
    Line(u32, Box<Stmt>),
}

impl Stmt {
    pub fn assign(target: impl Into<Access>, value: Expr) -> Self {
        Stmt::Assign(target.into(), value)
    }

    pub fn call(procedure: NodeId, args: Vec<Arg>) -> Self {
        Stmt::Call(procedure, args)
    }

    pub fn if_then(cond: Expr, then: Stmt) -> Self {
        Stmt::If(cond, Box::new(then), None)
    }

    pub fn if_else(cond: Expr, then: Stmt, otherwise: Stmt) -> Self {
        Stmt::If(cond, Box::new(then), Some(Box::new(otherwise)))
    }

    pub fn while_do(cond: Expr, body: Stmt) -> Self {
        Stmt::While(cond, Box::new(body))
    }

    pub fn for_loop(
        control: NodeId,
        initial: Expr,
        direction: Direction,
        limit: Expr,
        body: Stmt,
    ) -> Self {
        Stmt::For {
            control,
            initial,
            direction,
            limit,
            body: Box::new(body),
        }
    }

    pub fn at(line: u32, stmt: Stmt) -> Self {
        Stmt::Line(line, Box::new(stmt))
    }
}

impl From<NodeId> for Access {
    fn from(node: NodeId) -> Self {
        Access::new(node)
    }
}
