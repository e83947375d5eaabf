//! The visited-state index used for state matching.

use crate::bloom::BloomFilter;
use crate::config::VisitedPolicy;
use crate::fpset::FingerprintSet;
use ahash::{AHashMap, AHashSet};
use pathwise_state::{CanonicalForm, Fingerprint};
use std::collections::VecDeque;
use tracing::{error, warn};

enum Backend {
    Exact(FingerprintSet),
    Bounded {
        members: AHashSet<Fingerprint>,
        order: VecDeque<Fingerprint>,
        max_entries: usize,
    },
    Bloom(BloomFilter),
}

/// Answers "has this state been seen?" at transition boundaries.
///
/// Two modes on top of the storage [`VisitedPolicy`]:
/// - depth matching: a fingerprint remembers the shallowest depth it was
///   reached at, and reaching it again strictly shallower counts as new
/// - full tracking: canonical forms are kept so that two different states
///   sharing a fingerprint are detected and counted as collisions
pub struct VisitedIndex {
    backend: Backend,
    depths: Option<AHashMap<Fingerprint, usize>>,
    forms: Option<AHashMap<Fingerprint, CanonicalForm>>,
    collisions: usize,
    evictions: usize,
}

impl VisitedIndex {
    pub fn new(policy: VisitedPolicy, match_depth: bool, full_tracking: bool) -> Self {
        let backend = match policy {
            VisitedPolicy::Unbounded => Backend::Exact(FingerprintSet::new(1 << 12)),
            VisitedPolicy::Bounded { max_entries } => Backend::Bounded {
                members: AHashSet::new(),
                order: VecDeque::new(),
                max_entries: max_entries.max(1),
            },
            VisitedPolicy::Bloom { log2_bits, hashes } => {
                Backend::Bloom(BloomFilter::from_log2_bits(log2_bits, hashes))
            }
        };
        let depths = if match_depth && matches!(backend, Backend::Bloom(_)) {
            warn!("depth matching needs exact storage; ignored with a bloom filter");
            None
        } else if match_depth {
            Some(AHashMap::new())
        } else {
            None
        };
        // Forms are dropped together with their fingerprint, which a bloom
        // filter never does.
        let forms = if full_tracking && matches!(backend, Backend::Bloom(_)) {
            warn!("full state tracking needs exact storage; ignored with a bloom filter");
            None
        } else {
            full_tracking.then(AHashMap::new)
        };
        Self {
            backend,
            depths,
            forms,
            collisions: 0,
            evictions: 0,
        }
    }

    /// Records `form` reached at `depth`. Returns true if the search should
    /// explore it.
    pub fn visit(&mut self, form: &CanonicalForm, depth: usize) -> bool {
        let fp = form.fingerprint();
        if let Some(forms) = &mut self.forms {
            match forms.get(&fp) {
                Some(existing) if existing != form => {
                    self.collisions += 1;
                    error!(
                        fingerprint = %fp,
                        first_difference = ?existing.first_difference(form),
                        "hash collision detected: two different states share a fingerprint"
                    );
                }
                Some(_) => {}
                None => {
                    forms.insert(fp, form.clone());
                }
            }
        }

        let is_new = self.insert(fp);
        match &mut self.depths {
            Some(depths) => match depths.get_mut(&fp) {
                Some(seen_at) if !is_new && depth >= *seen_at => false,
                Some(seen_at) => {
                    *seen_at = depth.min(*seen_at);
                    true
                }
                None => {
                    depths.insert(fp, depth);
                    true
                }
            },
            None => is_new,
        }
    }

    fn insert(&mut self, fp: Fingerprint) -> bool {
        match &mut self.backend {
            Backend::Exact(set) => set.insert(fp),
            Backend::Bloom(bloom) => bloom.insert(fp),
            Backend::Bounded {
                members,
                order,
                max_entries,
            } => {
                if !members.insert(fp) {
                    return false;
                }
                order.push_back(fp);
                while order.len() > *max_entries {
                    if let Some(old) = order.pop_front() {
                        members.remove(&old);
                        if let Some(depths) = &mut self.depths {
                            depths.remove(&old);
                        }
                        if let Some(forms) = &mut self.forms {
                            forms.remove(&old);
                        }
                        self.evictions += 1;
                    }
                }
                true
            }
        }
    }

    pub fn contains(&self, fp: Fingerprint) -> bool {
        match &self.backend {
            Backend::Exact(set) => set.contains(fp),
            Backend::Bounded { members, .. } => members.contains(&fp),
            Backend::Bloom(bloom) => bloom.contains(fp),
        }
    }

    /// Number of stored fingerprints.
    pub fn len(&self) -> usize {
        match &self.backend {
            Backend::Exact(set) => set.len(),
            Backend::Bounded { members, .. } => members.len(),
            Backend::Bloom(bloom) => bloom.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Different states found sharing a fingerprint. Always 0 without full
    /// tracking.
    pub fn collisions(&self) -> usize {
        self.collisions
    }

    pub fn evictions(&self) -> usize {
        self.evictions
    }

    /// Canonical forms retained for collision checks.
    pub fn tracked_forms(&self) -> usize {
        self.forms.as_ref().map_or(0, |forms| forms.len())
    }

    pub fn clear(&mut self) {
        match &mut self.backend {
            Backend::Exact(set) => set.clear(),
            Backend::Bounded { members, order, .. } => {
                members.clear();
                order.clear();
            }
            Backend::Bloom(bloom) => bloom.clear(),
        }
        if let Some(depths) = &mut self.depths {
            depths.clear();
        }
        if let Some(forms) = &mut self.forms {
            forms.clear();
        }
        self.collisions = 0;
        self.evictions = 0;
    }
}

impl Default for VisitedIndex {
    fn default() -> Self {
        Self::new(VisitedPolicy::Unbounded, false, false)
    }
}

impl std::fmt::Debug for VisitedIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisitedIndex")
            .field("len", &self.len())
            .field("match_depth", &self.depths.is_some())
            .field("full_tracking", &self.forms.is_some())
            .field("collisions", &self.collisions)
            .finish()
    }
}
