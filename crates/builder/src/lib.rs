//! tinypas builder: declarations and statements → intermediate code.
//!
//! The builder stands in for a Pascal front end. Names are declared through
//! [`ProgramBuilder`], statement parts are handed over as [`Stmt`] trees,
//! and every closed routine is lowered into a crunched token segment the
//! executor can run.
//!
//! # Usage
//!
//! ```
//! use tinypas_builder::{Arg, Expr, ProgramBuilder, Stmt};
//!
//! let mut b = ProgramBuilder::new("hello");
//! let writeln = b.lookup("writeln").unwrap();
//! b.body(vec![Stmt::call(writeln, vec![Arg::from(Expr::string("hi"))])]).unwrap();
//! let program = b.finish().unwrap();
//! let listing = tinypas_builder::disassemble(&program).unwrap();
//! assert!(listing.starts_with("PROGRAM hello (level 1)\n"));
//! ```

pub mod ast;
pub mod error;

mod disassembler;
mod emitter;
mod program;

pub use ast::{Access, Arg, BinaryOp, CaseBranch, Direction, Expr, Selector, Stmt, UnaryOp};
pub use disassembler::{disassemble, disassemble_segment};
pub use error::BuildError;
pub use program::ProgramBuilder;
