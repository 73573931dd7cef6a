//! Observer hook for debuggers and tracing tools.
//!
//! A [`Tracer`] sees every statement start and every scalar variable fetch
//! and store. It cannot alter control flow or values.

use tinypas_common::{NodeId, StackItem};

pub trait Tracer {
    /// Called before the statement starting at `line` runs.
    fn statement(&mut self, _line: u32) {}

    /// Called after a scalar variable's value is loaded.
    fn fetch(&mut self, _node: NodeId, _value: &StackItem) {}

    /// Called after a scalar value is stored into a variable.
    fn store(&mut self, _node: NodeId, _value: &StackItem) {}
}
