//! A single nondeterministic decision point.

use crate::choices::Choices;
use crate::error::{ChoiceError, ChoiceResult};
use crate::request::ChoiceRequest;
use crate::value::{ChoiceKind, ChoiceValue};
use pathwise_state::{ThreadId, Value};
use rand::seq::SliceRandom;
use rand::Rng;
use std::cmp::Ordering;
use std::fmt;
use tracing::trace;

/// Position of a generator on the search path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CgId(pub u32);

impl CgId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Produces a finite, restartable sequence of choice values.
///
/// The cursor starts before the first choice; every successful
/// [`advance`](Self::advance) moves it forward by exactly one. The choice set
/// is fixed at construction and duplicates are kept as distinct positions.
#[derive(Debug, Clone)]
pub struct ChoiceGenerator {
    name: String,
    location: String,
    ordinal: u64,
    kind: ChoiceKind,
    choices: Choices,
    /// Index of the current choice, -1 before the first advance.
    cursor: isize,
    done: bool,
    cascaded: bool,
    parent: Option<CgId>,
}

impl ChoiceGenerator {
    pub fn new(name: impl Into<String>, kind: ChoiceKind, choices: Choices) -> ChoiceResult<Self> {
        let name = name.into();
        if choices.is_empty() {
            return Err(ChoiceError::EmptyChoiceSet { name });
        }
        Ok(Self {
            name,
            location: String::new(),
            ordinal: 0,
            kind,
            choices,
            cursor: -1,
            done: false,
            cascaded: false,
            parent: None,
        })
    }

    pub fn from_request(request: &ChoiceRequest) -> ChoiceResult<Self> {
        let choices = request.spec.build(&request.name)?;
        let mut cg = Self::new(request.name.clone(), request.kind(), choices)?;
        cg.location = request.location.clone();
        Ok(cg)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: String::new(),
            ordinal: 0,
            kind: ChoiceKind::Boolean,
            choices: Choices::Bool { false_first: true },
            cursor: -1,
            done: false,
            cascaded: false,
            parent: None,
        }
    }

    pub fn int_list(name: impl Into<String>, values: &[i64]) -> ChoiceResult<Self> {
        let choices = Choices::list(values.iter().copied().map(ChoiceValue::Int).collect());
        Self::new(name, ChoiceKind::IntList, choices)
    }

    pub fn int_range(name: impl Into<String>, min: i64, max: i64, delta: i64) -> ChoiceResult<Self> {
        let name = name.into();
        let choices = Choices::range(&name, min, max, delta)?;
        Self::new(name, ChoiceKind::IntRange, choices)
    }

    pub fn threads(name: impl Into<String>, runnable: &[ThreadId]) -> ChoiceResult<Self> {
        let choices = Choices::list(runnable.iter().copied().map(ChoiceValue::Thread).collect());
        Self::new(name, ChoiceKind::Thread, choices)
    }

    pub fn double_list(name: impl Into<String>, values: &[f64]) -> ChoiceResult<Self> {
        let choices = Choices::list(values.iter().copied().map(ChoiceValue::Double).collect());
        Self::new(name, ChoiceKind::Double, choices)
    }

    pub fn object_list(name: impl Into<String>, values: Vec<Value>) -> ChoiceResult<Self> {
        let choices = Choices::list(values.into_iter().map(ChoiceValue::Object).collect());
        Self::new(name, ChoiceKind::Object, choices)
    }

    pub fn bit_flip(name: impl Into<String>, value: i64, width: u32, nbits: u32) -> ChoiceResult<Self> {
        Self::new(name, ChoiceKind::BitFlip, Choices::bit_flip(value, width, nbits)?)
    }

    // ----- identity -----

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Creation number within the run.
    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }

    pub fn with_ordinal(mut self, ordinal: u64) -> Self {
        self.ordinal = ordinal;
        self
    }

    pub fn kind(&self) -> ChoiceKind {
        self.kind
    }

    pub fn choices(&self) -> &Choices {
        &self.choices
    }

    pub fn is_cascaded(&self) -> bool {
        self.cascaded
    }

    pub fn set_cascaded(&mut self, cascaded: bool) {
        self.cascaded = cascaded;
    }

    pub fn parent(&self) -> Option<CgId> {
        self.parent
    }

    pub fn set_parent(&mut self, parent: Option<CgId>) {
        self.parent = parent;
    }

    /// Whether `request` describes this decision point.
    pub fn matches(&self, request: &ChoiceRequest) -> bool {
        self.name == request.name && self.location == request.location
    }

    // ----- enumeration -----

    #[inline]
    pub fn has_more_choices(&self) -> bool {
        !self.done && ((self.cursor + 1) as usize) < self.choices.len()
    }

    /// Move to the next choice. Returns false, without changing anything, if
    /// there is none.
    pub fn advance(&mut self) -> bool {
        if !self.has_more_choices() {
            return false;
        }
        self.cursor += 1;
        trace!(cg = %self.name, idx = self.cursor, "advance");
        true
    }

    pub fn next_choice(&self) -> ChoiceResult<ChoiceValue> {
        self.current_index()
            .and_then(|i| self.choices.get(i))
            .ok_or_else(|| ChoiceError::NoActiveChoice {
                name: self.name.clone(),
            })
    }

    pub fn current_index(&self) -> Option<usize> {
        usize::try_from(self.cursor).ok()
    }

    /// Rewind to before the first choice.
    pub fn reset(&mut self) {
        self.cursor = -1;
        self.done = false;
    }

    /// Make `idx` the current choice and stop enumeration there.
    pub fn select(&mut self, idx: usize) -> ChoiceResult<()> {
        let len = self.choices.len();
        if idx >= len {
            return Err(ChoiceError::IndexOutOfRange {
                name: self.name.clone(),
                index: idx,
                len,
            });
        }
        self.reset();
        self.cursor = idx as isize;
        self.done = true;
        Ok(())
    }

    /// Cut enumeration off after the current choice.
    pub fn set_done(&mut self) {
        self.done = true;
    }

    pub fn is_done(&self) -> bool {
        self.done || !self.has_more_choices()
    }

    /// Number of choices produced so far, including the current one.
    pub fn processed_count(&self) -> usize {
        (self.cursor + 1) as usize
    }

    pub fn total(&self) -> usize {
        self.choices.len()
    }

    pub fn choice_at(&self, idx: usize) -> Option<ChoiceValue> {
        self.choices.get(idx)
    }

    pub fn all_choices(&self) -> Vec<ChoiceValue> {
        self.choices.to_vec()
    }

    // ----- derived generators -----

    /// Enumerate in the opposite order. Rewinds the cursor.
    pub fn reverse(&mut self) {
        self.choices = self.choices.reversed();
        self.reset();
    }

    /// A list generator with the same choices sorted by `cmp`.
    pub fn reorder<F>(&self, mut cmp: F) -> Self
    where
        F: FnMut(&ChoiceValue, &ChoiceValue) -> Ordering,
    {
        let mut values = self.all_choices();
        values.sort_by(|a, b| cmp(a, b));
        self.with_choices(Choices::list(values))
    }

    /// A list generator with the same choices in shuffled order.
    pub fn randomized<R: Rng + ?Sized>(&self, rng: &mut R) -> Self {
        let mut values = self.all_choices();
        values.shuffle(rng);
        self.with_choices(Choices::list(values))
    }

    fn with_choices(&self, choices: Choices) -> Self {
        Self {
            choices,
            cursor: -1,
            done: false,
            ..self.clone()
        }
    }
}

impl fmt::Display for ChoiceGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", self.name)?;
        let cur = self.current_index();
        for (i, v) in self.choices.to_vec().iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            if Some(i) == cur {
                write!(f, ">{}", v)?;
            } else {
                write!(f, "{}", v)?;
            }
        }
        write!(f, "]")
    }
}
