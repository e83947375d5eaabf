use crate::signature::Signature;
use pathwise_choice::{ChoiceError, ChoiceInterrupt};
use pathwise_state::{DeterminismMismatch, StateError};
use std::fmt;
use thiserror::Error;

/// An exception raised into the modeled program by a peer handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeledException {
    pub class: String,
    pub message: String,
}

impl ModeledException {
    pub fn new(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            message: message.into(),
        }
    }

    pub fn illegal_argument(message: impl Into<String>) -> Self {
        Self::new("IllegalArgumentException", message)
    }
}

impl fmt::Display for ModeledException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.class, self.message)
    }
}

/// What a handler may fail with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeerFault {
    #[error("{0}")]
    Exception(ModeledException),

    #[error(transparent)]
    Interrupt(#[from] ChoiceInterrupt),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("stale or foreign handle {0}")]
    StaleHandle(i64),
}

/// Error returned by [`Dispatcher::dispatch`](crate::Dispatcher::dispatch)
/// and registry construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// No handler for a signature. A configuration error, never recovered.
    #[error("no native peer bound to {0}")]
    UnboundSignature(Signature),

    #[error("native peer {0} registered twice")]
    DuplicateBinding(Signature),

    #[error("malformed peer signature '{0}'")]
    MalformedSignature(String),

    /// The handler raised a modeled exception; the interpreter delivers it
    /// to the program.
    #[error("native peer {signature} raised {exception}")]
    HandlerFault {
        signature: Signature,
        exception: ModeledException,
    },

    /// Two runs of the handler from the same state diverged.
    #[error("native peer {signature} is not deterministic: {detail}")]
    Nondeterministic { signature: Signature, detail: String },

    /// The handler asked for a choice that is not yet available.
    #[error("native peer suspended at a new choice point")]
    Suspended,

    #[error(transparent)]
    Choice(#[from] ChoiceError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("native peer {signature} used stale handle {handle}")]
    StaleHandle { signature: Signature, handle: i64 },
}

impl DispatchError {
    pub(crate) fn from_fault(signature: &Signature, fault: PeerFault) -> Self {
        match fault {
            PeerFault::Exception(exception) => DispatchError::HandlerFault {
                signature: signature.clone(),
                exception,
            },
            PeerFault::Interrupt(ChoiceInterrupt::Suspended) => DispatchError::Suspended,
            PeerFault::Interrupt(ChoiceInterrupt::Rejected(e)) => DispatchError::Choice(e),
            PeerFault::State(e) => DispatchError::State(e),
            PeerFault::StaleHandle(handle) => DispatchError::StaleHandle {
                signature: signature.clone(),
                handle,
            },
        }
    }

    pub(crate) fn diverged(signature: &Signature, mismatch: &DeterminismMismatch) -> Self {
        DispatchError::Nondeterministic {
            signature: signature.clone(),
            detail: mismatch.to_string(),
        }
    }

    /// Errors that mean the engine or its configuration is broken, as opposed
    /// to behavior of the program under test.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DispatchError::UnboundSignature(_)
                | DispatchError::DuplicateBinding(_)
                | DispatchError::MalformedSignature(_)
                | DispatchError::Nondeterministic { .. }
                | DispatchError::StaleHandle { .. }
        )
    }
}

pub type DispatchResult<T> = Result<T, DispatchError>;
pub type PeerResult<T> = Result<T, PeerFault>;
