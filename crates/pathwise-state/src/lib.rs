//! Modeled execution state for the pathwise search engine.
//!
//! The interpreter that drives a program under test keeps all of its mutable
//! state in a [`ProgramState`]: the object heap, the thread stacks and the
//! static areas. The search driver captures it as a [`StateSnapshot`] at
//! every transition boundary and reduces it to a [`Fingerprint`] through the
//! [`CanonicalSerializer`] for state matching.

pub mod canonical;
pub mod class;
pub mod determinism;
pub mod error;
pub mod fingerprint;
pub mod heap;
pub mod program;
pub mod thread;
pub mod value;

pub use canonical::{CanonicalSerializer, FieldFilter, SerializerConfig};
pub use class::{ClassInfo, ClassRegistry, FieldInfo};
pub use determinism::{cross_check, DeterminismMismatch, DeterminismProbe, DeterminismReport};
pub use error::{StateError, StateResult};
pub use fingerprint::{CanonicalForm, Fingerprint};
pub use heap::{Heap, HeapObject, ObjectKind};
pub use program::{ProgramState, StateSnapshot};
pub use thread::{Frame, ThreadState, ThreadStatus};
pub use value::{ClassId, ObjRef, ThreadId, Value};
