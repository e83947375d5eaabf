use crate::choices::Choices;
use crate::error::{ChoiceError, ChoiceResult};
use crate::value::{ChoiceKind, ChoiceValue};
use pathwise_state::{ThreadId, Value};
use std::fmt;

/// The static parameters of a decision point.
#[derive(Debug, Clone, PartialEq)]
pub enum ChoiceSpec {
    Bool { false_first: bool },
    IntList(Vec<i64>),
    IntRange { min: i64, max: i64, delta: i64 },
    Threads(Vec<ThreadId>),
    Doubles(Vec<f64>),
    Objects(Vec<Value>),
    BitFlip { value: i64, width: u32, nbits: u32 },
}

impl ChoiceSpec {
    pub fn kind(&self) -> ChoiceKind {
        match self {
            ChoiceSpec::Bool { .. } => ChoiceKind::Boolean,
            ChoiceSpec::IntList(_) => ChoiceKind::IntList,
            ChoiceSpec::IntRange { .. } => ChoiceKind::IntRange,
            ChoiceSpec::Threads(_) => ChoiceKind::Thread,
            ChoiceSpec::Doubles(_) => ChoiceKind::Double,
            ChoiceSpec::Objects(_) => ChoiceKind::Object,
            ChoiceSpec::BitFlip { .. } => ChoiceKind::BitFlip,
        }
    }

    pub(crate) fn build(&self, name: &str) -> ChoiceResult<Choices> {
        let choices = match self {
            ChoiceSpec::Bool { false_first } => Choices::Bool {
                false_first: *false_first,
            },
            ChoiceSpec::IntList(v) => {
                Choices::list(v.iter().copied().map(ChoiceValue::Int).collect())
            }
            ChoiceSpec::IntRange { min, max, delta } => Choices::range(name, *min, *max, *delta)?,
            ChoiceSpec::Threads(v) => {
                Choices::list(v.iter().copied().map(ChoiceValue::Thread).collect())
            }
            ChoiceSpec::Doubles(v) => {
                Choices::list(v.iter().copied().map(ChoiceValue::Double).collect())
            }
            ChoiceSpec::Objects(v) => {
                Choices::list(v.iter().cloned().map(ChoiceValue::Object).collect())
            }
            ChoiceSpec::BitFlip {
                value,
                width,
                nbits,
            } => Choices::bit_flip(*value, *width, *nbits)?,
        };
        if choices.is_empty() {
            return Err(ChoiceError::EmptyChoiceSet {
                name: name.to_string(),
            });
        }
        Ok(choices)
    }
}

/// What the interpreter asks for at a decision point.
///
/// `name` identifies the kind of decision (e.g. `"verifyGetInt"`), and
/// `location` the program point requesting it. Together they must be
/// identical when the same path position is re-executed.
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceRequest {
    pub name: String,
    pub location: String,
    pub spec: ChoiceSpec,
}

impl ChoiceRequest {
    pub fn new(name: impl Into<String>, location: impl Into<String>, spec: ChoiceSpec) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
            spec,
        }
    }

    pub fn boolean(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self::new(name, location, ChoiceSpec::Bool { false_first: true })
    }

    pub fn int_list(name: impl Into<String>, location: impl Into<String>, values: &[i64]) -> Self {
        Self::new(name, location, ChoiceSpec::IntList(values.to_vec()))
    }

    pub fn int_range(name: impl Into<String>, location: impl Into<String>, min: i64, max: i64) -> Self {
        Self::new(name, location, ChoiceSpec::IntRange { min, max, delta: 1 })
    }

    pub fn threads(name: impl Into<String>, location: impl Into<String>, threads: Vec<ThreadId>) -> Self {
        Self::new(name, location, ChoiceSpec::Threads(threads))
    }

    pub fn kind(&self) -> ChoiceKind {
        self.spec.kind()
    }

    /// Whether `other` is the same decision point.
    pub fn same_point(&self, other: &ChoiceRequest) -> bool {
        self.name == other.name && self.location == other.location
    }
}

impl fmt::Display for ChoiceRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.location)
    }
}
