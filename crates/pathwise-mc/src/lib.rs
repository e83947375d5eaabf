//! The search driver: explores every path through a nondeterministic
//! program by running it transition by transition, registering choice
//! generators at decision points, and backtracking to saved snapshots.
//!
//! The interpreter plugs in through [`Program`]; decision points reach the
//! driver through [`StepContext`]. With state matching on, the
//! [`VisitedIndex`] prunes transitions that end in a state already seen.

pub mod bloom;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod fpset;
pub mod inject;
pub mod path;
pub mod program;
pub mod search;
pub mod trace;
pub mod visited;

pub use bloom::BloomFilter;
pub use config::{SearchConfig, Strategy, VisitedPolicy};
pub use context::StepContext;
pub use error::{SearchError, SearchResult};
pub use event::{EventLog, SearchEvent, SearchListener};
pub use fpset::FingerprintSet;
pub use inject::{BitFlipInjector, ChoiceInjector};
pub use path::{advance_group, SearchPath};
pub use program::{Interrupt, Program, StepOutcome};
pub use search::{ReplayOutcome, Search, SearchOutcome, SearchStats, Violation, ViolationKind};
pub use trace::{ChoiceTrace, TraceEntry};
pub use visited::VisitedIndex;
