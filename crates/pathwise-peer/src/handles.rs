//! Host-side tables for values that peers keep across calls.
//!
//! A handler may not hold mutable host state that a snapshot does not
//! capture. Anything it needs across calls (a compiled pattern, a digest
//! configuration) is interned here and referred to from modeled state by an
//! integer [`Handle`]. Entries are content addressed and immutable: the same
//! key yields the same handle on every path, and backtracking never has to
//! undo anything in the table.

use crate::error::{PeerFault, PeerResult};
use ahash::AHashMap;
use std::any::Any;
use std::sync::Arc;
use tracing::debug;

/// Index into a [`HandleTable`], stored in modeled state as an int.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(pub u32);

impl Handle {
    pub fn from_int(n: i64) -> PeerResult<Self> {
        u32::try_from(n)
            .map(Handle)
            .map_err(|_| PeerFault::StaleHandle(n))
    }

    pub fn as_int(self) -> i64 {
        self.0 as i64
    }
}

struct Entry {
    kind: &'static str,
    value: Arc<dyn Any + Send + Sync>,
}

#[derive(Default)]
pub struct HandleTable {
    entries: Vec<Entry>,
    index: AHashMap<(&'static str, String), Handle>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `(kind, key)`, building the value with `make` on first use.
    pub fn intern<T, F>(&mut self, kind: &'static str, key: &str, make: F) -> PeerResult<Handle>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> PeerResult<T>,
    {
        if let Some(&h) = self.index.get(&(kind, key.to_string())) {
            return Ok(h);
        }
        let value = make()?;
        let h = Handle(self.entries.len() as u32);
        self.entries.push(Entry {
            kind,
            value: Arc::new(value),
        });
        self.index.insert((kind, key.to_string()), h);
        debug!(kind, key, handle = h.0, "interned host value");
        Ok(h)
    }

    /// Resolve a handle of the given kind.
    pub fn get<T: Any + Send + Sync>(&self, kind: &'static str, handle: Handle) -> PeerResult<Arc<T>> {
        let entry = self
            .entries
            .get(handle.0 as usize)
            .filter(|e| e.kind == kind)
            .ok_or(PeerFault::StaleHandle(handle.as_int()))?;
        Arc::clone(&entry.value)
            .downcast::<T>()
            .map_err(|_| PeerFault::StaleHandle(handle.as_int()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for HandleTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleTable")
            .field("entries", &self.entries.len())
            .finish()
    }
}
