//! Native peer dispatch.
//!
//! Some modeled methods are implemented on the host: explicit choices,
//! digests, pattern matching, raw I/O. A [`PeerRegistry`] binds their
//! [`Signature`]s to handlers once, at engine start; the [`Dispatcher`]
//! routes calls to them and keeps two promises: handlers have no hidden
//! mutable host state (cross-call values go through [`HandleTable`]), and
//! the same modeled inputs always give the same modeled outputs.

pub mod dispatch;
pub mod env;
pub mod error;
pub mod handles;
pub mod registry;
pub mod signature;
pub mod verify;

pub use dispatch::Dispatcher;
pub use env::{bool_arg, int_arg, ref_arg, str_arg, PeerEnv};
pub use error::{DispatchError, DispatchResult, ModeledException, PeerFault, PeerResult};
pub use handles::{Handle, HandleTable};
pub use registry::{PeerHandler, PeerRegistry, PeerRegistryBuilder};
pub use signature::Signature;
pub use verify::{register_verify, VERIFY};
