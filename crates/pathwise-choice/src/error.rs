use thiserror::Error;

/// Error raised by choice generator construction or misuse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChoiceError {
    /// A decision point with nothing to choose from. Always a configuration
    /// error: silently skipping it would hide an unreachable branch.
    #[error("choice generator '{name}' has an empty choice set")]
    EmptyChoiceSet { name: String },

    #[error("choice generator '{name}' has no active choice (advance not called)")]
    NoActiveChoice { name: String },

    #[error("choice index {index} out of range for '{name}' with {len} choices")]
    IndexOutOfRange {
        name: String,
        index: usize,
        len: usize,
    },

    #[error("integer range '{name}' has zero delta")]
    ZeroDelta { name: String },

    #[error("integer range '{name}' from {min} to {max} by {delta} has too many elements")]
    RangeTooLarge {
        name: String,
        min: i64,
        max: i64,
        delta: i64,
    },

    #[error("cannot flip {nbits} of {width} bits")]
    InvalidBitFlip { width: u32, nbits: u32 },

    /// Re-execution asked for a different decision than the one recorded at
    /// this path position.
    #[error("replay mismatch: expected choice '{expected}', program requested '{actual}'")]
    ReplayMismatch { expected: String, actual: String },
}

pub type ChoiceResult<T> = Result<T, ChoiceError>;

/// Why a choice request did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChoiceInterrupt {
    /// A new decision point was registered. The interpreter must unwind to
    /// the driver without side effects; the instruction is re-executed once
    /// a choice is available.
    #[error("transition suspended at a new choice point")]
    Suspended,

    #[error(transparent)]
    Rejected(#[from] ChoiceError),
}
