//! Signature to handler bindings.
//!
//! Bindings are collected in a [`PeerRegistryBuilder`] at engine start and
//! frozen into a [`PeerRegistry`]; there is no way to add or replace a
//! binding afterwards.

use crate::env::PeerEnv;
use crate::error::{DispatchError, DispatchResult, PeerResult};
use crate::signature::Signature;
use ahash::AHashMap;
use pathwise_state::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// A host implementation of a modeled method.
///
/// Handlers are `Fn`: they cannot carry mutable state between calls. State
/// that must survive a call lives in the modeled program or in the
/// dispatcher's [`HandleTable`](crate::HandleTable).
pub type PeerHandler = Arc<dyn Fn(&mut PeerEnv<'_>, &[Value]) -> PeerResult<Value> + Send + Sync>;

#[derive(Default)]
pub struct PeerRegistryBuilder {
    bindings: BTreeMap<Signature, PeerHandler>,
}

impl PeerRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a handler to `"Owner.method(descriptor)"`.
    pub fn register<F>(&mut self, signature: &str, handler: F) -> DispatchResult<&mut Self>
    where
        F: Fn(&mut PeerEnv<'_>, &[Value]) -> PeerResult<Value> + Send + Sync + 'static,
    {
        let sig = Signature::parse(signature)
            .ok_or_else(|| DispatchError::MalformedSignature(signature.to_string()))?;
        self.bind(sig, Arc::new(handler))
    }

    pub fn bind(&mut self, signature: Signature, handler: PeerHandler) -> DispatchResult<&mut Self> {
        if self.bindings.contains_key(&signature) {
            return Err(DispatchError::DuplicateBinding(signature));
        }
        debug!(signature = %signature, "registered native peer");
        self.bindings.insert(signature, handler);
        Ok(self)
    }

    pub fn build(self) -> PeerRegistry {
        PeerRegistry {
            bindings: self.bindings.into_iter().collect(),
        }
    }
}

/// Immutable set of peer bindings, shared by every dispatcher of a session.
#[derive(Default, Clone)]
pub struct PeerRegistry {
    bindings: AHashMap<Signature, PeerHandler>,
}

impl PeerRegistry {
    pub fn builder() -> PeerRegistryBuilder {
        PeerRegistryBuilder::new()
    }

    #[inline]
    pub fn lookup(&self, signature: &Signature) -> Option<&PeerHandler> {
        self.bindings.get(signature)
    }

    pub fn contains(&self, signature: &Signature) -> bool {
        self.bindings.contains_key(signature)
    }

    /// Fail on the first signature without a binding. Programs declare their
    /// native methods up front so that a missing peer is reported before any
    /// exploration.
    pub fn check_required<'a, I>(&self, required: I) -> DispatchResult<()>
    where
        I: IntoIterator<Item = &'a Signature>,
    {
        for sig in required {
            if !self.contains(sig) {
                return Err(DispatchError::UnboundSignature(sig.clone()));
            }
        }
        Ok(())
    }

    /// Bound signatures in sorted order.
    pub fn signatures(&self) -> Vec<&Signature> {
        let mut v: Vec<_> = self.bindings.keys().collect();
        v.sort();
        v
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl std::fmt::Debug for PeerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerRegistry")
            .field("signatures", &self.signatures())
            .finish()
    }
}
