use pathwise_state::StateError;
use thiserror::Error;

/// A script that cannot be loaded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("malformed native signature '{0}'")]
    MalformedSignature(String),

    #[error("thread '{thread}' jumps to {target}, past its {len} ops")]
    BadJump {
        thread: String,
        target: usize,
        len: usize,
    },

    #[error(transparent)]
    State(#[from] StateError),
}
