//! The search driver.
//!
//! Runs the program transition by transition, registers a generator group
//! at every new decision point, and backtracks by restoring the snapshot
//! taken when the group was created. A transition ending in a state seen
//! before is pruned.

use crate::config::{SearchConfig, Strategy};
use crate::context::{Delivery, StepContext};
use crate::error::{SearchError, SearchResult};
use crate::event::{SearchEvent, SearchListener};
use crate::inject::ChoiceInjector;
use crate::path::{advance_group, SearchPath};
use crate::program::{Interrupt, Program, StepOutcome};
use crate::trace::ChoiceTrace;
use crate::visited::VisitedIndex;
use memory_stats::memory_stats;
use pathwise_choice::{ChoiceGenerator, ChoiceRequest, ChoiceValue};
use pathwise_peer::{Dispatcher, PeerRegistry};
use pathwise_state::{CanonicalSerializer, Fingerprint, ProgramState, StateSnapshot};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Transitions between resident memory probes.
const MEMORY_CHECK_INTERVAL: usize = 1000;

/// Get current process memory usage in MB.
fn current_memory_mb() -> Option<usize> {
    memory_stats().map(|stats| stats.physical_mem / (1024 * 1024))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// The program reported a failed property.
    Property,
    /// An exception escaped the program.
    UncaughtException,
}

/// A property violation with the path that leads to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub kind: ViolationKind,
    pub description: String,
    pub trace: ChoiceTrace,
    /// Transitions from the initial state.
    pub depth: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchStats {
    /// Transition boundaries reaching a state not seen before.
    pub new_states: usize,
    /// Transition boundaries pruned by state matching.
    pub visited_states: usize,
    pub transitions: usize,
    pub end_states: usize,
    /// Completed paths of any kind.
    pub paths: usize,
    pub backtracks: usize,
    pub restores: usize,
    pub choice_generators: usize,
    pub max_depth: usize,
    pub constraint_hits: usize,
    pub ignored_paths: usize,
    pub collisions: usize,
}

/// Result of a search.
#[derive(Debug, Clone)]
pub enum SearchOutcome {
    /// Every path was explored. Holds the violations found when
    /// `multiple_errors` is on.
    Exhausted {
        stats: SearchStats,
        violations: Vec<Violation>,
    },
    /// The search stopped at its first violation.
    PropertyViolated {
        violation: Violation,
        stats: SearchStats,
    },
    StateLimitReached {
        stats: SearchStats,
        violations: Vec<Violation>,
    },
    MemoryLimitReached {
        stats: SearchStats,
        violations: Vec<Violation>,
        memory_mb: usize,
    },
    TimeLimitReached {
        stats: SearchStats,
        violations: Vec<Violation>,
    },
    /// The stop flag was raised.
    Stopped {
        stats: SearchStats,
        violations: Vec<Violation>,
    },
}

impl SearchOutcome {
    pub fn stats(&self) -> &SearchStats {
        match self {
            SearchOutcome::Exhausted { stats, .. }
            | SearchOutcome::PropertyViolated { stats, .. }
            | SearchOutcome::StateLimitReached { stats, .. }
            | SearchOutcome::MemoryLimitReached { stats, .. }
            | SearchOutcome::TimeLimitReached { stats, .. }
            | SearchOutcome::Stopped { stats, .. } => stats,
        }
    }

    pub fn violations(&self) -> Vec<&Violation> {
        match self {
            SearchOutcome::PropertyViolated { violation, .. } => vec![violation],
            SearchOutcome::Exhausted { violations, .. }
            | SearchOutcome::StateLimitReached { violations, .. }
            | SearchOutcome::MemoryLimitReached { violations, .. }
            | SearchOutcome::TimeLimitReached { violations, .. }
            | SearchOutcome::Stopped { violations, .. } => violations.iter().collect(),
        }
    }

    /// Whether every path was explored.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, SearchOutcome::Exhausted { .. })
    }
}

/// Result of re-running one path from a [`ChoiceTrace`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayOutcome {
    /// Fingerprint at every transition boundary, in order.
    pub fingerprints: Vec<Fingerprint>,
    pub violation: Option<Violation>,
    /// Whether the program terminated, as opposed to the trace running out.
    pub terminated: bool,
    /// Trace entries used.
    pub choices: usize,
}

/// How a run of transitions ended.
enum Leaf {
    Branch(Branch),
    Matched,
    DepthLimit,
    Terminated,
    Ignored,
    Violated {
        kind: ViolationKind,
        description: String,
    },
    /// A limit or the stop flag ended the search between two transitions.
    Aborted(SearchOutcome),
}

/// A new decision point and the state it was reached in.
struct Branch {
    snapshot: Arc<StateSnapshot>,
    group: Vec<ChoiceGenerator>,
    fingerprint: Option<Fingerprint>,
}

enum Settled {
    Continue,
    Expand(Branch),
    Halt,
    Abort(SearchOutcome),
}

/// A breadth-first work item.
struct Frontier {
    snapshot: Arc<StateSnapshot>,
    group: Vec<ChoiceGenerator>,
    depth: usize,
    prefix: ChoiceTrace,
}

pub struct Search {
    config: SearchConfig,
    dispatcher: Dispatcher,
    serializer: CanonicalSerializer,
    visited: VisitedIndex,
    injectors: Vec<Box<dyn ChoiceInjector>>,
    listeners: Vec<Box<dyn SearchListener>>,
    stats: SearchStats,
    violations: Vec<Violation>,
    rng: Option<StdRng>,
    next_ordinal: u64,
    application: Option<String>,
    /// Fingerprints of the path being replayed; `Some` only during replay.
    replayed: Option<Vec<Fingerprint>>,
    stop_flag: Option<Arc<AtomicBool>>,
    deadline: Option<Instant>,
    next_memory_check: usize,
}

impl Search {
    pub fn new(config: SearchConfig, peers: Arc<PeerRegistry>) -> Self {
        let mut dispatcher = Dispatcher::new(peers);
        if config.verify_peer_determinism {
            dispatcher = dispatcher.with_verification(config.serializer.clone());
        }
        Self {
            serializer: CanonicalSerializer::new(config.serializer.clone()),
            visited: VisitedIndex::new(config.visited, config.match_depth, config.full_tracking),
            dispatcher,
            injectors: Vec::new(),
            listeners: Vec::new(),
            stats: SearchStats::default(),
            violations: Vec::new(),
            rng: None,
            next_ordinal: 0,
            application: None,
            replayed: None,
            stop_flag: None,
            deadline: None,
            next_memory_check: 0,
            config,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn stats(&self) -> &SearchStats {
        &self.stats
    }

    pub fn visited(&self) -> &VisitedIndex {
        &self.visited
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn add_listener<L: SearchListener + 'static>(&mut self, listener: L) {
        self.listeners.push(Box::new(listener));
    }

    pub fn add_injector<I: ChoiceInjector + 'static>(&mut self, injector: I) {
        self.injectors.push(Box::new(injector));
    }

    /// Set an external stop flag. The search checks it between transitions.
    pub fn set_stop_flag(&mut self, flag: Arc<AtomicBool>) {
        self.stop_flag = Some(flag);
    }

    fn past_deadline(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Explore every path of `program` from its current state.
    pub fn run<P: Program>(&mut self, program: &mut P) -> SearchResult<SearchOutcome> {
        self.begin(program)?;
        info!(
            strategy = ?self.config.strategy,
            state_matching = self.config.state_matching,
            visited = ?self.config.visited,
            "starting search"
        );
        let outcome = match self.config.strategy {
            Strategy::DepthFirst => self.search_depth_first(program)?,
            Strategy::BreadthFirst => self.search_breadth_first(program)?,
        };

        let stats = outcome.stats();
        if stats.collisions > 0 {
            error!(
                collisions = stats.collisions,
                "hash collisions detected during search; results may be incomplete"
            );
        }
        info!(
            new_states = stats.new_states,
            visited_states = stats.visited_states,
            transitions = stats.transitions,
            paths = stats.paths,
            max_depth = stats.max_depth,
            violations = outcome.violations().len(),
            "search finished"
        );
        Ok(outcome)
    }

    /// Re-run the single path `trace` describes from the program's current
    /// state. State matching and the depth limit do not apply.
    pub fn replay<P: Program>(&mut self, program: &mut P, trace: &ChoiceTrace) -> SearchResult<ReplayOutcome> {
        self.begin(program)?;
        debug!(choices = trace.len(), "replaying trace");
        self.replayed = Some(Vec::new());
        let result = self.replay_path(program, trace);
        let fingerprints = self.replayed.take().unwrap_or_default();
        let (terminated, choices) = result?;
        Ok(ReplayOutcome {
            fingerprints,
            violation: self.violations.pop(),
            terminated,
            choices,
        })
    }

    fn begin<P: Program>(&mut self, program: &P) -> SearchResult<()> {
        let required = program.required_peers();
        self.dispatcher
            .registry()
            .check_required(required.iter())
            .map_err(SearchError::from_dispatch)?;

        self.visited.clear();
        self.stats = SearchStats::default();
        self.violations.clear();
        self.next_ordinal = 0;
        self.next_memory_check = 0;
        self.replayed = None;
        self.application = program.name().map(str::to_string);
        if let Some(seed) = self.config.choice_seed {
            info!(seed, "randomizing choice order");
        }
        self.rng = self.config.choice_seed.map(StdRng::seed_from_u64);
        self.deadline = (self.config.max_time_secs > 0)
            .then(|| Instant::now() + Duration::from_secs(self.config.max_time_secs));
        self.emit(SearchEvent::SearchStarted);
        Ok(())
    }

    fn search_depth_first<P: Program>(&mut self, program: &mut P) -> SearchResult<SearchOutcome> {
        let mut path = SearchPath::new();
        let (leaf, depth) = self.run_transitions(program, None, 0)?;
        match self.conclude(leaf, depth, ChoiceTrace::new) {
            Settled::Expand(b) => {
                path.push_group(b.snapshot, b.group, depth, b.fingerprint);
            }
            Settled::Continue => {}
            Settled::Halt => return Ok(self.violated()),
            Settled::Abort(outcome) => return Ok(outcome),
        }

        loop {
            if let Some(outcome) = self.check_limits() {
                return Ok(outcome);
            }
            let Some(first) = path.advance_top() else {
                if path.pop_group().is_none() {
                    break;
                }
                self.stats.backtracks += 1;
                debug!(depth = path.top_depth(), "backtrack");
                self.emit(SearchEvent::Backtracked {
                    depth: path.top_depth(),
                });
                continue;
            };
            let Some(snapshot) = path.top_snapshot() else {
                break;
            };
            let depth = path.top_depth();
            let delivery = self.enter_combination(program, &snapshot, path.top_group(), first, depth)?;
            let (leaf, end_depth) = self.run_transitions(program, Some(delivery), depth)?;
            match self.conclude(leaf, end_depth, || path.trace()) {
                Settled::Expand(b) => {
                    path.push_group(b.snapshot, b.group, end_depth, b.fingerprint);
                }
                Settled::Continue => {}
                Settled::Halt => return Ok(self.violated()),
                Settled::Abort(outcome) => return Ok(outcome),
            }
        }

        self.emit(SearchEvent::SearchExhausted);
        Ok(SearchOutcome::Exhausted {
            stats: self.final_stats(),
            violations: std::mem::take(&mut self.violations),
        })
    }

    fn search_breadth_first<P: Program>(&mut self, program: &mut P) -> SearchResult<SearchOutcome> {
        let mut queue = VecDeque::new();
        let (leaf, depth) = self.run_transitions(program, None, 0)?;
        match self.conclude(leaf, depth, ChoiceTrace::new) {
            Settled::Expand(b) => queue.push_back(Frontier {
                snapshot: b.snapshot,
                group: b.group,
                depth,
                prefix: ChoiceTrace::new(),
            }),
            Settled::Continue => {}
            Settled::Halt => return Ok(self.violated()),
            Settled::Abort(outcome) => return Ok(outcome),
        }

        while let Some(mut node) = queue.pop_front() {
            while let Some(first) = advance_group(&mut node.group) {
                if let Some(outcome) = self.check_limits() {
                    return Ok(outcome);
                }
                let delivery = self.enter_combination(program, &node.snapshot, &node.group, first, node.depth)?;
                let mut prefix = node.prefix.clone();
                for cg in &node.group {
                    if let Some(idx) = cg.current_index() {
                        prefix.push(cg.name(), idx);
                    }
                }
                let (leaf, depth) = self.run_transitions(program, Some(delivery), node.depth)?;
                match self.conclude(leaf, depth, || prefix.clone()) {
                    Settled::Expand(b) => queue.push_back(Frontier {
                        snapshot: b.snapshot,
                        group: b.group,
                        depth,
                        prefix,
                    }),
                    Settled::Continue => {}
                    Settled::Halt => return Ok(self.violated()),
                    Settled::Abort(outcome) => return Ok(outcome),
                }
            }
        }

        self.emit(SearchEvent::SearchExhausted);
        Ok(SearchOutcome::Exhausted {
            stats: self.final_stats(),
            violations: std::mem::take(&mut self.violations),
        })
    }

    /// Returns whether the program terminated and how many trace entries
    /// were used.
    fn replay_path<P: Program>(&mut self, program: &mut P, trace: &ChoiceTrace) -> SearchResult<(bool, usize)> {
        let mut entries = trace.entries.iter().enumerate().peekable();
        let mut taken = ChoiceTrace::new();
        let (mut leaf, mut depth) = self.run_transitions(program, None, 0)?;
        while let Leaf::Branch(mut branch) = leaf {
            if entries.peek().is_none() {
                return Ok((false, taken.len()));
            }
            for cg in &mut branch.group {
                let Some((i, entry)) = entries.next() else {
                    return Err(SearchError::TraceMismatch {
                        index: trace.len(),
                        detail: format!("trace ends before choice '{}'", cg.name()),
                    });
                };
                if entry.name != cg.name() {
                    return Err(SearchError::TraceMismatch {
                        index: i,
                        detail: format!("expected choice '{}', program registered '{}'", entry.name, cg.name()),
                    });
                }
                cg.select(entry.index).map_err(|e| SearchError::TraceMismatch {
                    index: i,
                    detail: e.to_string(),
                })?;
                taken.push(cg.name(), entry.index);
            }
            let delivery = self.enter_combination(program, &branch.snapshot, &branch.group, 0, depth)?;
            (leaf, depth) = self.run_transitions(program, Some(delivery), depth)?;
        }

        if matches!(leaf, Leaf::Aborted(_)) {
            return Ok((false, taken.len()));
        }
        if let Some((i, _)) = entries.next() {
            return Err(SearchError::TraceMismatch {
                index: i,
                detail: "path ended before the trace did".into(),
            });
        }
        let terminated = matches!(leaf, Leaf::Terminated);
        let used = taken.len();
        self.conclude(leaf, depth, || taken);
        Ok((terminated, used))
    }

    /// Runs steps from the current state until a path ends or a new
    /// decision point is registered. Returns the leaf and the depth it was
    /// reached at.
    fn run_transitions<P: Program>(
        &mut self,
        program: &mut P,
        mut delivery: Option<Delivery>,
        mut depth: usize,
    ) -> SearchResult<(Leaf, usize)> {
        loop {
            let mut cx = StepContext::new(&mut self.dispatcher, delivery.take());
            let result = program.step(&mut cx);
            let report = cx.finish();

            if let Some(description) = report.violations.into_iter().next() {
                let leaf = Leaf::Violated {
                    kind: ViolationKind::Property,
                    description,
                };
                return Ok((leaf, depth));
            }
            if report.ignored {
                return Ok((Leaf::Ignored, depth));
            }
            let request = match result {
                Ok(outcome) => {
                    if let Some(d) = report.unconsumed {
                        return Err(SearchError::InvariantViolation(format!(
                            "choice {}@{} was not requested again on re-execution",
                            d.name, d.location
                        )));
                    }
                    match outcome {
                        StepOutcome::Terminated => return Ok((Leaf::Terminated, depth)),
                        StepOutcome::TransitionEnd => None,
                    }
                }
                Err(Interrupt::Suspended) => match report.pending {
                    Some(request) => Some(request),
                    None => {
                        return Err(SearchError::InvariantViolation(
                            "step suspended without registering a decision point".into(),
                        ))
                    }
                },
                Err(Interrupt::Uncaught(exception)) => {
                    let leaf = Leaf::Violated {
                        kind: ViolationKind::UncaughtException,
                        description: format!("uncaught exception {exception}"),
                    };
                    return Ok((leaf, depth));
                }
                Err(Interrupt::Choice(e)) => return Err(SearchError::from_choice(e)),
                Err(Interrupt::Peer(e)) => return Err(SearchError::from_dispatch(e)),
                Err(Interrupt::State(e)) => return Err(SearchError::from_state(e)),
            };

            depth += 1;
            if let Some(leaf) = self.end_transition(program, request, depth)? {
                return Ok((leaf, depth));
            }
            if let Some(outcome) = self.check_limits() {
                return Ok((Leaf::Aborted(outcome), depth));
            }
        }
    }

    /// State matching and limits at a transition boundary. `None` means the
    /// boundary had no decision point and execution continues.
    fn end_transition<P: Program>(
        &mut self,
        program: &P,
        request: Option<ChoiceRequest>,
        depth: usize,
    ) -> SearchResult<Option<Leaf>> {
        self.stats.transitions += 1;
        let state = program.state();
        let (fingerprint, new_state) = if let Some(fps) = &mut self.replayed {
            let fp = self.serializer.fingerprint(state).map_err(SearchError::from_state)?;
            fps.push(fp);
            (Some(fp), true)
        } else if self.config.state_matching {
            let form = self.serializer.canonical_form(state).map_err(SearchError::from_state)?;
            let new_state = self.visited.visit(&form, depth);
            (Some(form.fingerprint()), new_state)
        } else {
            (None, true)
        };
        self.emit(SearchEvent::TransitionEnded {
            depth,
            fingerprint,
            new_state,
        });

        if !new_state {
            self.stats.visited_states += 1;
            if let Some(fingerprint) = fingerprint {
                debug!(depth, fp = %fingerprint, "state matched");
                self.emit(SearchEvent::StateMatched { depth, fingerprint });
            }
            return Ok(Some(Leaf::Matched));
        }
        self.stats.new_states += 1;
        self.stats.max_depth = self.stats.max_depth.max(depth);
        if self.replayed.is_none() && self.config.max_depth > 0 && depth >= self.config.max_depth {
            return Ok(Some(Leaf::DepthLimit));
        }

        let Some(request) = request else {
            return Ok(None);
        };
        let group = self.create_group(state, &request)?;
        Ok(Some(Leaf::Branch(Branch {
            snapshot: Arc::new(state.snapshot()),
            group,
            fingerprint,
        })))
    }

    fn create_group(&mut self, state: &ProgramState, request: &ChoiceRequest) -> SearchResult<Vec<ChoiceGenerator>> {
        let mut group = Vec::new();
        for injector in &mut self.injectors {
            for mut cg in injector.inject(request, state)? {
                cg.set_cascaded(true);
                group.push(cg);
            }
        }
        group.push(ChoiceGenerator::from_request(request).map_err(SearchError::from_choice)?);

        let group: Vec<ChoiceGenerator> = group
            .into_iter()
            .map(|cg| {
                let cg = match &mut self.rng {
                    Some(rng) => cg.randomized(rng),
                    None => cg,
                };
                self.next_ordinal += 1;
                cg.with_ordinal(self.next_ordinal)
            })
            .collect();
        self.stats.choice_generators += group.len();
        for cg in &group {
            self.emit(SearchEvent::ChoiceCreated {
                name: cg.name().to_string(),
                location: cg.location().to_string(),
                total: cg.total(),
                cascaded: cg.is_cascaded(),
            });
        }
        Ok(group)
    }

    /// Restores the group's snapshot, applies its cascaded choices and
    /// returns the value for the requested one. `first` is the first member
    /// whose choice changed.
    fn enter_combination<P: Program>(
        &mut self,
        program: &mut P,
        snapshot: &StateSnapshot,
        group: &[ChoiceGenerator],
        first: usize,
        depth: usize,
    ) -> SearchResult<Delivery> {
        for cg in group.iter().skip(first) {
            if let (Some(index), Ok(value)) = (cg.current_index(), cg.next_choice()) {
                self.emit(SearchEvent::ChoiceAdvanced {
                    name: cg.name().to_string(),
                    index,
                    value,
                });
            }
        }
        program
            .restore(snapshot)
            .map_err(|source| SearchError::RestoreFailed { depth, source })?;
        self.stats.restores += 1;

        let mut delivery = None;
        for cg in group {
            let value = cg.next_choice().map_err(SearchError::from_choice)?;
            if cg.is_cascaded() {
                self.apply_injected(cg, &value, program.state_mut())?;
            } else {
                delivery = Some(Delivery {
                    name: cg.name().to_string(),
                    location: cg.location().to_string(),
                    value,
                });
            }
        }
        delivery.ok_or_else(|| SearchError::InvariantViolation("generator group without a requested choice".into()))
    }

    fn apply_injected(&mut self, cg: &ChoiceGenerator, value: &ChoiceValue, state: &mut ProgramState) -> SearchResult<()> {
        for injector in &mut self.injectors {
            if injector.apply(cg, value, state).map_err(SearchError::from_state)? {
                return Ok(());
            }
        }
        Err(SearchError::InvariantViolation(format!(
            "no injector owns cascaded choice '{}'",
            cg.name()
        )))
    }

    /// Book-keeping for a finished run of transitions.
    fn conclude(&mut self, leaf: Leaf, depth: usize, trace: impl FnOnce() -> ChoiceTrace) -> Settled {
        match leaf {
            Leaf::Branch(branch) => return Settled::Expand(branch),
            Leaf::Aborted(outcome) => return Settled::Abort(outcome),
            Leaf::Matched => {}
            Leaf::DepthLimit => {
                self.stats.constraint_hits += 1;
                self.emit(SearchEvent::ConstraintHit { depth });
            }
            Leaf::Terminated => {
                self.stats.end_states += 1;
                self.emit(SearchEvent::EndState { depth });
            }
            Leaf::Ignored => {
                self.stats.ignored_paths += 1;
                self.emit(SearchEvent::PathIgnored { depth });
            }
            Leaf::Violated { kind, description } => {
                self.stats.paths += 1;
                info!(depth, %description, "property violated");
                self.emit(SearchEvent::PropertyViolated {
                    description: description.clone(),
                });
                let mut trace = trace();
                trace.application = self.application.clone();
                self.violations.push(Violation {
                    kind,
                    description,
                    trace,
                    depth,
                });
                return if self.config.multiple_errors || self.replayed.is_some() {
                    Settled::Continue
                } else {
                    Settled::Halt
                };
            }
        }
        self.stats.paths += 1;
        Settled::Continue
    }

    fn check_limits(&mut self) -> Option<SearchOutcome> {
        if self.stop_flag.as_ref().is_some_and(|f| f.load(Ordering::Relaxed)) {
            info!("search stopped by request");
            return Some(SearchOutcome::Stopped {
                stats: self.final_stats(),
                violations: std::mem::take(&mut self.violations),
            });
        }
        if self.config.max_states > 0 && self.stats.new_states >= self.config.max_states {
            info!(max_states = self.config.max_states, "state limit reached");
            return Some(SearchOutcome::StateLimitReached {
                stats: self.final_stats(),
                violations: std::mem::take(&mut self.violations),
            });
        }
        if self.config.memory_limit_mb > 0 && self.stats.transitions >= self.next_memory_check {
            self.next_memory_check = self.stats.transitions + MEMORY_CHECK_INTERVAL;
            if let Some(mb) = current_memory_mb() {
                if mb > self.config.memory_limit_mb {
                    info!(memory_mb = mb, limit_mb = self.config.memory_limit_mb, "memory limit reached");
                    return Some(SearchOutcome::MemoryLimitReached {
                        stats: self.final_stats(),
                        violations: std::mem::take(&mut self.violations),
                        memory_mb: mb,
                    });
                }
            }
        }
        if self.past_deadline() {
            info!(max_time_secs = self.config.max_time_secs, "time limit reached");
            return Some(SearchOutcome::TimeLimitReached {
                stats: self.final_stats(),
                violations: std::mem::take(&mut self.violations),
            });
        }
        None
    }

    fn violated(&mut self) -> SearchOutcome {
        let stats = self.final_stats();
        match self.violations.pop() {
            Some(violation) => SearchOutcome::PropertyViolated { violation, stats },
            None => SearchOutcome::Exhausted {
                stats,
                violations: Vec::new(),
            },
        }
    }

    fn final_stats(&self) -> SearchStats {
        SearchStats {
            collisions: self.visited.collisions(),
            ..self.stats.clone()
        }
    }

    fn emit(&mut self, event: SearchEvent) {
        for listener in &mut self.listeners {
            listener.on_event(&event);
        }
    }
}

impl std::fmt::Debug for Search {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Search")
            .field("config", &self.config)
            .field("visited", &self.visited)
            .field("injectors", &self.injectors.len())
            .field("listeners", &self.listeners.len())
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventLog;
    use crate::inject::BitFlipInjector;
    use pathwise_choice::{ChoiceContext, ChoiceSpec};
    use pathwise_state::{ClassRegistry, Value};

    /// Flips `n` coins, one decision point each, then checks `sum != bad`.
    struct Coins {
        state: ProgramState,
        n: i64,
        bad: Option<i64>,
    }

    impl Coins {
        fn new(n: i64) -> Self {
            let mut reg = ClassRegistry::new();
            reg.define("Coins", &[], &["pc", "sum"]);
            let mut state = ProgramState::new(Arc::new(reg));
            state.init_class("Coins").unwrap();
            state.set_static("Coins", "pc", Value::Int(0)).unwrap();
            state.set_static("Coins", "sum", Value::Int(0)).unwrap();
            Self { state, n, bad: None }
        }

        fn failing_at(mut self, sum: i64) -> Self {
            self.bad = Some(sum);
            self
        }

        fn int(&self, field: &str) -> i64 {
            self.state.get_static("Coins", field).unwrap().as_int().unwrap()
        }
    }

    impl Program for Coins {
        fn state(&self) -> &ProgramState {
            &self.state
        }

        fn state_mut(&mut self) -> &mut ProgramState {
            &mut self.state
        }

        fn step(&mut self, cx: &mut StepContext<'_>) -> Result<StepOutcome, Interrupt> {
            while self.int("pc") < self.n {
                let pc = self.int("pc");
                let heads = cx.choose_bool("flip", &format!("Coins:{pc}"))?;
                let sum = self.int("sum") + heads as i64;
                self.state.set_static("Coins", "sum", Value::Int(sum))?;
                self.state.set_static("Coins", "pc", Value::Int(pc + 1))?;
            }
            if Some(self.int("sum")) == self.bad {
                cx.report_violation(format!("sum reached {}", self.int("sum")));
            }
            Ok(StepOutcome::Terminated)
        }

        fn name(&self) -> Option<&str> {
            Some("Coins")
        }
    }

    fn search(config: SearchConfig) -> Search {
        Search::new(config, Arc::new(PeerRegistry::default()))
    }

    fn no_matching() -> SearchConfig {
        SearchConfig {
            state_matching: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_two_booleans_explore_four_paths() {
        let log = EventLog::new();
        let mut s = search(no_matching());
        s.add_listener(log.clone());
        let outcome = s.run(&mut Coins::new(2)).unwrap();
        assert!(outcome.is_exhausted());
        assert_eq!(outcome.stats().end_states, 4);
        assert_eq!(outcome.stats().paths, 4);
        assert_eq!(outcome.stats().choice_generators, 3);
        let events = log.events();
        assert_eq!(events.first(), Some(&SearchEvent::SearchStarted));
        assert_eq!(events.last(), Some(&SearchEvent::SearchExhausted));
        let advanced: Vec<bool> = events
            .iter()
            .filter_map(|e| match e {
                SearchEvent::ChoiceAdvanced { value, .. } => value.as_bool(),
                _ => None,
            })
            .collect();
        assert_eq!(advanced, vec![false, false, true, true, false, true]);
    }

    #[test]
    fn test_state_matching_prunes_equal_sums() {
        let outcome = search(SearchConfig::default()).run(&mut Coins::new(3)).unwrap();
        let stats = outcome.stats();
        assert_eq!(stats.end_states, 6);
        assert_eq!(stats.visited_states, 1);
        assert_eq!(stats.new_states, 6);

        let unpruned = search(no_matching()).run(&mut Coins::new(3)).unwrap();
        assert_eq!(unpruned.stats().end_states, 8);
    }

    #[test]
    fn test_violation_trace_replays() {
        let mut s = search(no_matching());
        let outcome = s.run(&mut Coins::new(2).failing_at(2)).unwrap();
        let SearchOutcome::PropertyViolated { violation, .. } = outcome else {
            panic!("expected a violation");
        };
        assert_eq!(violation.kind, ViolationKind::Property);
        assert_eq!(violation.description, "sum reached 2");
        assert_eq!(violation.trace.application.as_deref(), Some("Coins"));
        let indices: Vec<usize> = violation.trace.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![1, 1]);

        let replay = s.replay(&mut Coins::new(2).failing_at(2), &violation.trace).unwrap();
        assert_eq!(replay.violation.map(|v| v.description), Some("sum reached 2".to_string()));
        assert_eq!(replay.choices, 2);
        assert_eq!(replay.fingerprints.len(), 2);
    }

    #[test]
    fn test_multiple_errors_collects_all() {
        let config = SearchConfig {
            multiple_errors: true,
            ..no_matching()
        };
        let outcome = search(config).run(&mut Coins::new(2).failing_at(1)).unwrap();
        assert!(outcome.is_exhausted());
        assert_eq!(outcome.violations().len(), 2);
        assert_eq!(outcome.stats().paths, 4);
    }

    #[test]
    fn test_breadth_first_same_end_states() {
        let config = SearchConfig {
            strategy: Strategy::BreadthFirst,
            ..no_matching()
        };
        let outcome = search(config).run(&mut Coins::new(3)).unwrap();
        assert!(outcome.is_exhausted());
        assert_eq!(outcome.stats().end_states, 8);
    }

    #[test]
    fn test_depth_limit() {
        let config = SearchConfig {
            max_depth: 2,
            ..no_matching()
        };
        let outcome = search(config).run(&mut Coins::new(4)).unwrap();
        // boundaries at depth 1 and 2; the two generators at depth 2 are cut
        assert_eq!(outcome.stats().constraint_hits, 2);
        assert_eq!(outcome.stats().end_states, 0);
        assert_eq!(outcome.stats().max_depth, 2);
    }

    #[test]
    fn test_seeded_order_is_reproducible() {
        let traces = |seed| {
            let log = EventLog::new();
            let mut s = search(SearchConfig {
                choice_seed: Some(seed),
                ..no_matching()
            });
            s.add_listener(log.clone());
            let outcome = s.run(&mut Coins::new(3)).unwrap();
            assert_eq!(outcome.stats().end_states, 8);
            log.filtered(|e| matches!(e, SearchEvent::ChoiceAdvanced { .. }))
        };
        assert_eq!(traces(7), traces(7));
    }

    #[test]
    fn test_state_limit_and_stop_flag() {
        let config = SearchConfig {
            max_states: 2,
            ..no_matching()
        };
        let outcome = search(config).run(&mut Coins::new(3)).unwrap();
        assert!(matches!(outcome, SearchOutcome::StateLimitReached { .. }));

        let mut s = search(no_matching());
        s.set_stop_flag(Arc::new(AtomicBool::new(true)));
        let outcome = s.run(&mut Coins::new(3)).unwrap();
        assert!(matches!(outcome, SearchOutcome::Stopped { .. }));
    }

    #[test]
    fn test_end_state_is_not_a_boundary() {
        let log = EventLog::new();
        let mut s = search(SearchConfig::default());
        s.add_listener(log.clone());
        let outcome = s.run(&mut Coins::new(1)).unwrap();
        // only the boundary at the flip is fingerprinted
        assert_eq!(outcome.stats().transitions, 1);
        assert_eq!(outcome.stats().new_states, 1);
        assert_eq!(log.filtered(|e| matches!(e, SearchEvent::TransitionEnded { .. })).len(), 1);
        assert_eq!(
            log.filtered(|e| matches!(e, SearchEvent::EndState { .. })),
            vec![SearchEvent::EndState { depth: 1 }, SearchEvent::EndState { depth: 1 }]
        );
    }

    /// Counts up forever without ever asking for a choice.
    struct Ticker {
        state: ProgramState,
    }

    impl Ticker {
        fn new() -> Self {
            let mut reg = ClassRegistry::new();
            reg.define("Ticker", &[], &["n"]);
            let mut state = ProgramState::new(Arc::new(reg));
            state.init_class("Ticker").unwrap();
            state.set_static("Ticker", "n", Value::Int(0)).unwrap();
            Self { state }
        }
    }

    impl Program for Ticker {
        fn state(&self) -> &ProgramState {
            &self.state
        }

        fn state_mut(&mut self) -> &mut ProgramState {
            &mut self.state
        }

        fn step(&mut self, _cx: &mut StepContext<'_>) -> Result<StepOutcome, Interrupt> {
            let n = self.state.get_static("Ticker", "n")?.as_int().unwrap_or(0);
            self.state.set_static("Ticker", "n", Value::Int(n + 1))?;
            Ok(StepOutcome::TransitionEnd)
        }
    }

    #[test]
    fn test_limits_apply_between_choice_free_transitions() {
        let config = SearchConfig {
            max_states: 10,
            ..SearchConfig::default()
        };
        let outcome = search(config).run(&mut Ticker::new()).unwrap();
        assert!(matches!(outcome, SearchOutcome::StateLimitReached { .. }));
        assert_eq!(outcome.stats().new_states, 10);
        assert_eq!(outcome.stats().choice_generators, 0);

        for strategy in [Strategy::DepthFirst, Strategy::BreadthFirst] {
            let mut s = search(SearchConfig {
                strategy,
                ..SearchConfig::default()
            });
            s.set_stop_flag(Arc::new(AtomicBool::new(true)));
            let outcome = s.run(&mut Ticker::new()).unwrap();
            assert!(matches!(outcome, SearchOutcome::Stopped { .. }));
            assert_eq!(outcome.stats().transitions, 1);
        }
    }

    #[test]
    fn test_replay_of_choice_free_loop_stops() {
        let mut s = search(SearchConfig::default());
        s.set_stop_flag(Arc::new(AtomicBool::new(true)));
        let replay = s.replay(&mut Ticker::new(), &ChoiceTrace::new()).unwrap();
        assert!(!replay.terminated);
        assert_eq!(replay.fingerprints.len(), 1);
    }

    #[test]
    fn test_injected_group_is_cross_product() {
        let mut s = search(no_matching());
        s.add_injector(BitFlipInjector::new("Coins", "sum", 2, 1).at("Coins:0"));
        let outcome = s.run(&mut Coins::new(1)).unwrap();
        // 3 values of sum times 2 flips
        assert_eq!(outcome.stats().end_states, 6);
        assert_eq!(outcome.stats().choice_generators, 2);
    }

    /// Asks for a different decision point when re-executed.
    struct Forgetful {
        state: ProgramState,
        calls: usize,
    }

    impl Program for Forgetful {
        fn state(&self) -> &ProgramState {
            &self.state
        }

        fn state_mut(&mut self) -> &mut ProgramState {
            &mut self.state
        }

        fn step(&mut self, cx: &mut StepContext<'_>) -> Result<StepOutcome, Interrupt> {
            self.calls += 1;
            cx.choose_bool("flag", &format!("Forgetful:{}", self.calls))?;
            Ok(StepOutcome::Terminated)
        }
    }

    #[test]
    fn test_replay_mismatch_is_invariant_violation() {
        let mut p = Forgetful {
            state: ProgramState::new(Arc::new(ClassRegistry::new())),
            calls: 0,
        };
        let err = search(no_matching()).run(&mut p).unwrap_err();
        assert!(matches!(err, SearchError::InvariantViolation(_)), "{err}");
    }

    /// Requests an empty choice list.
    struct Empty(ProgramState);

    impl Program for Empty {
        fn state(&self) -> &ProgramState {
            &self.0
        }

        fn state_mut(&mut self) -> &mut ProgramState {
            &mut self.0
        }

        fn step(&mut self, cx: &mut StepContext<'_>) -> Result<StepOutcome, Interrupt> {
            cx.choose_int("pick", "Empty:0", ChoiceSpec::IntList(vec![]))?;
            Ok(StepOutcome::Terminated)
        }
    }

    #[test]
    fn test_empty_choice_set_is_configuration_error() {
        let mut p = Empty(ProgramState::new(Arc::new(ClassRegistry::new())));
        let err = search(SearchConfig::default()).run(&mut p).unwrap_err();
        assert!(matches!(err, SearchError::Configuration(_)), "{err}");
    }

    #[test]
    fn test_replay_rejects_foreign_trace() {
        let mut trace = ChoiceTrace::new();
        trace.push("schedule", 0);
        let err = search(no_matching()).replay(&mut Coins::new(2), &trace).unwrap_err();
        assert!(matches!(err, SearchError::TraceMismatch { index: 0, .. }), "{err}");

        let mut long = ChoiceTrace::new();
        long.push("flip", 0);
        long.push("flip", 0);
        long.push("flip", 0);
        let err = search(no_matching()).replay(&mut Coins::new(2), &long).unwrap_err();
        assert!(matches!(err, SearchError::TraceMismatch { index: 2, .. }), "{err}");
    }
}
