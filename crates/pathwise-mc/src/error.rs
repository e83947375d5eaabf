use pathwise_choice::ChoiceError;
use pathwise_peer::DispatchError;
use pathwise_state::StateError;
use thiserror::Error;

/// Errors that abort a search. Property violations of the program under
/// test are not errors; they are reported in the
/// [`SearchOutcome`](crate::SearchOutcome).
#[derive(Debug, Error)]
pub enum SearchError {
    /// The engine was set up wrongly: unbound native peers, empty choice
    /// sets, invalid generator parameters.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The engine or the interpreter broke one of the search invariants,
    /// e.g. re-execution diverged from the recorded path.
    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),

    #[error("failed to restore state at depth {depth}: {source}")]
    RestoreFailed {
        depth: usize,
        #[source]
        source: StateError,
    },

    #[error("choice trace does not fit the program at entry {index}: {detail}")]
    TraceMismatch { index: usize, detail: String },

    #[error("malformed choice trace at line {line}: {message}")]
    TraceParse { line: usize, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("trace JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SearchError {
    pub(crate) fn from_choice(err: ChoiceError) -> Self {
        match err {
            ChoiceError::EmptyChoiceSet { .. }
            | ChoiceError::ZeroDelta { .. }
            | ChoiceError::RangeTooLarge { .. }
            | ChoiceError::InvalidBitFlip { .. } => SearchError::Configuration(err.to_string()),
            ChoiceError::NoActiveChoice { .. }
            | ChoiceError::IndexOutOfRange { .. }
            | ChoiceError::ReplayMismatch { .. } => SearchError::InvariantViolation(err.to_string()),
        }
    }

    /// For dispatch errors that [`DispatchError::is_fatal`] says cannot be
    /// blamed on the program under test.
    pub(crate) fn from_dispatch(err: DispatchError) -> Self {
        match err {
            DispatchError::UnboundSignature(_)
            | DispatchError::DuplicateBinding(_)
            | DispatchError::MalformedSignature(_) => SearchError::Configuration(err.to_string()),
            DispatchError::Choice(e) => SearchError::from_choice(e),
            other => SearchError::InvariantViolation(other.to_string()),
        }
    }

    pub(crate) fn from_state(err: StateError) -> Self {
        SearchError::InvariantViolation(format!("inconsistent program state: {err}"))
    }
}

pub type SearchResult<T> = Result<T, SearchError>;
