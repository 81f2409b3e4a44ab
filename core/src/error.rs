use thiserror::Error;

use crate::value::Value;

/// Errors reported by stack operations.
///
/// `Overflow` is the recoverable resource-exhaustion case; callers surface it
/// as a catchable VM error. The remaining variants describe requests the stack
/// cannot honor in its current state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StackError {
    #[error("stack overflow: requested {requested} slots, {available} available")]
    Overflow { requested: usize, available: usize },
    #[error("failed to reserve {slots} stack slots")]
    ReserveFailed { slots: usize },
    #[error("invalid stack configuration: {0}")]
    InvalidConfig(String),
    #[error("no code is running on this context")]
    NotRunning,
    #[error("{0} is not a function")]
    NotAFunction(Value),
    #[error("eval frame requires an enclosing script frame")]
    NoEnclosingFrame,
    #[error("generator is already running")]
    GeneratorRunning,
    #[error("generator is closed")]
    GeneratorClosed,
}

pub type StackResult<T> = Result<T, StackError>;
