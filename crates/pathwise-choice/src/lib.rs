//! Choice generators: the model of every nondeterministic decision point.
//!
//! A [`ChoiceGenerator`] enumerates a fixed, ordered set of [`ChoiceValue`]s
//! and can be rewound and replayed. Interpreters never build generators
//! themselves; they describe the decision with a [`ChoiceRequest`] and ask
//! the engine through [`ChoiceContext`].

pub mod choices;
pub mod context;
pub mod error;
pub mod generator;
pub mod request;
pub mod value;

pub use choices::{binomial, Choices};
pub use context::ChoiceContext;
pub use error::{ChoiceError, ChoiceInterrupt, ChoiceResult};
pub use generator::{CgId, ChoiceGenerator};
pub use request::{ChoiceRequest, ChoiceSpec};
pub use value::{ChoiceKind, ChoiceValue};
