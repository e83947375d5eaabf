use crate::value::{ClassId, ObjRef, ThreadId};
use thiserror::Error;

/// Error raised while reading, mutating or serializing modeled state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("dangling reference {0}: no such object in the heap")]
    DanglingReference(ObjRef),

    #[error("unknown class '{0}'")]
    UnknownClass(String),

    #[error("class id {0} is not registered")]
    UnknownClassId(ClassId),

    #[error("class '{class}' has no field '{field}'")]
    UnknownField { class: String, field: String },

    #[error("class '{0}' has not been initialized")]
    UninitializedClass(String),

    #[error("object {0} is an array, not an instance")]
    NotAnInstance(ObjRef),

    #[error("no thread {0}")]
    NoSuchThread(ThreadId),

    #[error("thread {0} has no stack frame")]
    EmptyStack(ThreadId),

    #[error("index {index} out of bounds for length {length}")]
    IndexOutOfBounds { index: usize, length: usize },

    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("snapshot was captured from a different program")]
    ForeignSnapshot,

    #[error("determinism probe ended without a matching begin")]
    ProbeNotStarted,
}

pub type StateResult<T> = Result<T, StateError>;
