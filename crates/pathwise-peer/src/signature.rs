use std::fmt;
use std::sync::Arc;

/// A modeled method signature, `Owner.method(descriptor)`.
///
/// The descriptor (everything from the opening parenthesis) is part of the
/// identity, so overloads bind to different handlers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature {
    owner: Arc<str>,
    method: Arc<str>,
    descriptor: Arc<str>,
}

impl Signature {
    pub fn new(owner: &str, method: &str, descriptor: &str) -> Self {
        Self {
            owner: Arc::from(owner),
            method: Arc::from(method),
            descriptor: Arc::from(descriptor),
        }
    }

    /// Parse `"Owner.method(desc)ret"`; the descriptor may be omitted.
    pub fn parse(s: &str) -> Option<Self> {
        let (head, descriptor) = match s.find('(') {
            Some(i) => s.split_at(i),
            None => (s, ""),
        };
        let (owner, method) = head.rsplit_once('.')?;
        if owner.is_empty() || method.is_empty() {
            return None;
        }
        Some(Self::new(owner, method, descriptor))
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.owner, self.method, self.descriptor)
    }
}
