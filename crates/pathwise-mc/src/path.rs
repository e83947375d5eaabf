//! The current search path: every live choice generator, grouped by the
//! transition boundary that created it.
//!
//! A group is the generators registered at one boundary: zero or more
//! cascaded generators added by [`ChoiceInjector`](crate::ChoiceInjector)s,
//! then the one the program asked for. A group enumerates the cross product
//! of its members like an odometer, the last member turning fastest. Every
//! combination starts from the state snapshot taken at the boundary.

use crate::trace::ChoiceTrace;
use pathwise_choice::{CgId, ChoiceGenerator, ChoiceKind};
use pathwise_state::{Fingerprint, StateSnapshot};
use std::ops::Range;
use std::sync::Arc;

#[derive(Debug)]
struct Group {
    start: usize,
    snapshot: Arc<StateSnapshot>,
    depth: usize,
    fingerprint: Option<Fingerprint>,
}

#[derive(Debug, Default)]
pub struct SearchPath {
    cgs: Vec<ChoiceGenerator>,
    groups: Vec<Group>,
}

impl SearchPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a group. Parents are linked along the path: each generator's
    /// parent is the one before it.
    pub fn push_group(
        &mut self,
        snapshot: Arc<StateSnapshot>,
        cgs: Vec<ChoiceGenerator>,
        depth: usize,
        fingerprint: Option<Fingerprint>,
    ) -> Range<usize> {
        let start = self.cgs.len();
        for mut cg in cgs {
            let parent = self.cgs.len().checked_sub(1).map(|i| CgId(i as u32));
            cg.set_parent(parent);
            self.cgs.push(cg);
        }
        self.groups.push(Group {
            start,
            snapshot,
            depth,
            fingerprint,
        });
        start..self.cgs.len()
    }

    /// Drops the deepest group and its snapshot.
    pub fn pop_group(&mut self) -> Option<Vec<ChoiceGenerator>> {
        let group = self.groups.pop()?;
        Some(self.cgs.split_off(group.start))
    }

    /// Number of groups.
    pub fn depth(&self) -> usize {
        self.groups.len()
    }

    /// Number of generators.
    pub fn len(&self) -> usize {
        self.cgs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cgs.is_empty()
    }

    pub fn get(&self, id: CgId) -> Option<&ChoiceGenerator> {
        self.cgs.get(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChoiceGenerator> {
        self.cgs.iter()
    }

    pub fn top_group(&self) -> &[ChoiceGenerator] {
        match self.groups.last() {
            Some(g) => &self.cgs[g.start..],
            None => &[],
        }
    }

    pub fn top_snapshot(&self) -> Option<Arc<StateSnapshot>> {
        self.groups.last().map(|g| Arc::clone(&g.snapshot))
    }

    /// Transition count at the deepest boundary.
    pub fn top_depth(&self) -> usize {
        self.groups.last().map_or(0, |g| g.depth)
    }

    pub fn top_fingerprint(&self) -> Option<Fingerprint> {
        self.groups.last().and_then(|g| g.fingerprint)
    }

    /// Moves the deepest group to its next combination. Returns the
    /// position within the group of the first generator that changed, or
    /// `None` when the group is exhausted.
    pub fn advance_top(&mut self) -> Option<usize> {
        let start = self.groups.last()?.start;
        advance_group(&mut self.cgs[start..])
    }

    /// Current choice index of every started generator, root first.
    pub fn trace(&self) -> ChoiceTrace {
        let mut trace = ChoiceTrace::new();
        for cg in &self.cgs {
            if let Some(idx) = cg.current_index() {
                trace.push(cg.name(), idx);
            }
        }
        trace
    }

    /// All generators of `kind`, root first.
    pub fn all_of_kind(&self, kind: ChoiceKind) -> Vec<CgId> {
        self.cgs
            .iter()
            .enumerate()
            .filter(|(_, cg)| cg.kind() == kind)
            .map(|(i, _)| CgId(i as u32))
            .collect()
    }

    /// The closest ancestor of `id` with the given kind.
    pub fn previous_of_kind(&self, id: CgId, kind: ChoiceKind) -> Option<CgId> {
        let mut cur = self.get(id)?.parent();
        while let Some(p) = cur {
            let cg = self.get(p)?;
            if cg.kind() == kind {
                return Some(p);
            }
            cur = cg.parent();
        }
        None
    }

    /// The group `id` belongs to: the generators registered at the same
    /// boundary.
    pub fn cascade_of(&self, id: CgId) -> &[ChoiceGenerator] {
        let idx = id.index();
        if idx >= self.cgs.len() {
            return &[];
        }
        let g = self.groups.partition_point(|g| g.start <= idx) - 1;
        let end = self.groups.get(g + 1).map_or(self.cgs.len(), |n| n.start);
        &self.cgs[self.groups[g].start..end]
    }
}

/// Steps `group` to its next combination in odometer order. A group that
/// was never advanced moves every member to its first choice. Returns the
/// index of the first member that changed.
pub fn advance_group(group: &mut [ChoiceGenerator]) -> Option<usize> {
    if group.is_empty() {
        return None;
    }
    if group.iter().all(|cg| cg.current_index().is_none()) {
        for cg in group.iter_mut() {
            if !cg.advance() {
                return None;
            }
        }
        return Some(0);
    }
    let j = group.iter().rposition(ChoiceGenerator::has_more_choices)?;
    group[j].advance();
    for cg in &mut group[j + 1..] {
        cg.reset();
        cg.advance();
    }
    Some(j)
}
