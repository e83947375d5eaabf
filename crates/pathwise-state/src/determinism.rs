//! Determinism cross-checking.
//!
//! Instead of pruning, the canonical serializer can be used to assert that an
//! operation is a pure function of its inputs: the same pre-state must always
//! lead to the same post-state. A [`DeterminismProbe`] remembers the first
//! post-state observed for every pre-state and reports a mismatch when a later
//! run from an equal pre-state ends somewhere else.
//!
//! The post-state covers only the classes that were initialized in the
//! pre-state, so lazily initialized classes do not count as a difference.

use crate::canonical::{CanonicalSerializer, Scope, SerializerConfig};
use crate::error::{StateError, StateResult};
use crate::fingerprint::{CanonicalForm, Fingerprint};
use crate::program::ProgramState;
use crate::value::ClassId;
use ahash::AHashMap;
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

/// A post-state that differs from the one recorded for the same pre-state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismMismatch {
    pub pre: Fingerprint,
    pub expected: Fingerprint,
    pub actual: Fingerprint,
    /// Index of the first differing word of the two post encodings.
    pub first_difference: usize,
}

impl fmt::Display for DeterminismMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "non-deterministic operation: pre-state {} led to {} and {} (first difference at word {})",
            self.pre, self.expected, self.actual, self.first_difference
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeterminismReport {
    /// First observation for this pre-state.
    Recorded { pre: Fingerprint, post: Fingerprint },
    /// Same post-state as previously recorded.
    Consistent { pre: Fingerprint, post: Fingerprint },
    Mismatch(DeterminismMismatch),
}

impl DeterminismReport {
    pub fn is_mismatch(&self) -> bool {
        matches!(self, DeterminismReport::Mismatch(_))
    }

    pub fn mismatch(&self) -> Option<&DeterminismMismatch> {
        match self {
            DeterminismReport::Mismatch(m) => Some(m),
            _ => None,
        }
    }
}

struct Pending {
    pre: Fingerprint,
    classes: BTreeSet<ClassId>,
}

pub struct DeterminismProbe {
    serializer: CanonicalSerializer,
    ignored_methods: Vec<String>,
    pending: Option<Pending>,
    observed: AHashMap<Fingerprint, CanonicalForm>,
}

impl DeterminismProbe {
    pub fn new(config: SerializerConfig) -> Self {
        Self {
            serializer: CanonicalSerializer::new(config),
            ignored_methods: Vec::new(),
            pending: None,
            observed: AHashMap::new(),
        }
    }

    /// Skip frames of `method` in both pre- and post-states.
    pub fn ignore_method(mut self, method: &str) -> Self {
        self.ignored_methods.push(method.to_string());
        self
    }

    /// Record the pre-state of one run.
    pub fn begin(&mut self, state: &ProgramState) -> StateResult<Fingerprint> {
        let classes: BTreeSet<ClassId> = state.initialized_classes().collect();
        let form = self.serializer.encode(
            state,
            Scope {
                classes: None,
                ignored_methods: &self.ignored_methods,
            },
        )?;
        let pre = form.fingerprint();
        self.pending = Some(Pending { pre, classes });
        Ok(pre)
    }

    /// Serialize the post-state of the run started by [`begin`](Self::begin)
    /// and compare it against earlier runs from the same pre-state.
    pub fn end(&mut self, state: &ProgramState) -> StateResult<DeterminismReport> {
        let Pending { pre, classes } = self.pending.take().ok_or(StateError::ProbeNotStarted)?;
        let post = self.serializer.encode(
            state,
            Scope {
                classes: Some(&classes),
                ignored_methods: &self.ignored_methods,
            },
        )?;
        let report = match self.observed.get(&pre) {
            None => {
                let fp = post.fingerprint();
                self.observed.insert(pre, post);
                DeterminismReport::Recorded { pre, post: fp }
            }
            Some(expected) => match expected.first_difference(&post) {
                None => DeterminismReport::Consistent {
                    pre,
                    post: post.fingerprint(),
                },
                Some(first_difference) => {
                    let m = DeterminismMismatch {
                        pre,
                        expected: expected.fingerprint(),
                        actual: post.fingerprint(),
                        first_difference,
                    };
                    debug!(pre = %pre, at = first_difference, "determinism mismatch");
                    DeterminismReport::Mismatch(m)
                }
            },
        };
        Ok(report)
    }

    /// Number of distinct pre-states observed.
    pub fn observed(&self) -> usize {
        self.observed.len()
    }
}

/// Run `op` twice, each time from an identical copy of `state`, and compare
/// the resulting post-states. `state` itself is left untouched.
///
/// Returns [`DeterminismReport::Consistent`] when both runs agree.
pub fn cross_check<E, F>(
    state: &ProgramState,
    config: SerializerConfig,
    mut op: F,
) -> Result<DeterminismReport, E>
where
    F: FnMut(&mut ProgramState) -> Result<(), E>,
    E: From<StateError>,
{
    let mut probe = DeterminismProbe::new(config);

    let mut first = state.clone();
    probe.begin(&first)?;
    op(&mut first)?;
    probe.end(&first)?;

    let mut second = state.clone();
    probe.begin(&second)?;
    op(&mut second)?;
    Ok(probe.end(&second)?)
}
