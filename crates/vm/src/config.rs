//! Executor limits.

/// Value stack slot limit.
pub const MAX_STACK_DEPTH: usize = 4096;

/// Nested declared-routine activations. Pascal recursion runs on native
/// recursion, so this also bounds host stack use.
pub const MAX_CALL_DEPTH: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorConfig {
    pub max_stack_depth: usize,
    pub max_call_depth: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_stack_depth: MAX_STACK_DEPTH,
            max_call_depth: MAX_CALL_DEPTH,
        }
    }
}
