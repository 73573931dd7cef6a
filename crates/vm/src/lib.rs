//! tinypas executor: interprets the intermediate code of a compiled
//! [`Program`] directly.
//!
//! The executor has:
//! - A value stack of tagged [`StackItem`](tinypas_common::StackItem)s,
//!   holding frames and expression temporaries
//! - A heap of byte blocks for array and record storage
//! - A cursor over the code segment of the routine being run
//!
//! Pascal recursion maps onto native recursion of the statement and
//! expression handlers, bounded by [`ExecutorConfig`].
//!
//! # Usage
//!
//! ```
//! use tinypas_builder::{Arg, Expr, ProgramBuilder, Stmt};
//!
//! let mut builder = ProgramBuilder::new("hello");
//! let writeln = builder.lookup("writeln").unwrap();
//! builder
//!     .body(vec![Stmt::call(writeln, vec![Arg::from(Expr::string("hi"))])])
//!     .unwrap();
//! let program = builder.finish().unwrap();
//!
//! let mut output = Vec::new();
//! tinypas_vm::run(&program, &b""[..], &mut output).unwrap();
//! assert_eq!(output, b"hi\n");
//! ```

pub mod config;
pub mod error;
mod expression;
mod input;
pub mod machine;
mod memory;
mod routine;
mod standard;
mod statement;
pub mod trace;

pub use config::ExecutorConfig;
pub use error::RuntimeError;
pub use machine::Executor;
pub use trace::Tracer;

use std::io::{BufRead, Write};

use tinypas_common::Program;

/// Run a program to completion with the default limits.
///
/// # Errors
///
/// Returns [`RuntimeError`] when execution hits a fatal error (division by
/// zero, range violation, invalid CASE value, stack overflow, ...). Output
/// written before the error stays written.
pub fn run(program: &Program, input: impl BufRead, output: impl Write) -> Result<(), RuntimeError> {
    run_with_config(program, ExecutorConfig::default(), input, output)
}

pub fn run_with_config(
    program: &Program,
    config: ExecutorConfig,
    input: impl BufRead,
    output: impl Write,
) -> Result<(), RuntimeError> {
    Executor::with_config(program, config, input, output).run()
}
