use pathwise_state::{ThreadId, Value};
use std::fmt;

/// Declared type of the values a generator produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChoiceKind {
    Boolean,
    IntList,
    IntRange,
    Thread,
    Double,
    Object,
    BitFlip,
}

impl fmt::Display for ChoiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChoiceKind::Boolean => "boolean",
            ChoiceKind::IntList => "int-list",
            ChoiceKind::IntRange => "int-range",
            ChoiceKind::Thread => "thread",
            ChoiceKind::Double => "double",
            ChoiceKind::Object => "object",
            ChoiceKind::BitFlip => "bit-flip",
        };
        f.write_str(s)
    }
}

/// One produced choice.
#[derive(Debug, Clone, PartialEq)]
pub enum ChoiceValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    Thread(ThreadId),
    Object(Value),
}

impl ChoiceValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ChoiceValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ChoiceValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            ChoiceValue::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_thread(&self) -> Option<ThreadId> {
        match self {
            ChoiceValue::Thread(t) => Some(*t),
            _ => None,
        }
    }

    /// The modeled value handed to the program. Threads become their id.
    pub fn to_value(&self) -> Value {
        match self {
            ChoiceValue::Bool(b) => Value::Bool(*b),
            ChoiceValue::Int(n) => Value::Int(*n),
            ChoiceValue::Double(d) => Value::Double(*d),
            ChoiceValue::Thread(t) => Value::Int(t.0 as i64),
            ChoiceValue::Object(v) => v.clone(),
        }
    }
}

impl fmt::Display for ChoiceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChoiceValue::Bool(b) => write!(f, "{}", b),
            ChoiceValue::Int(n) => write!(f, "{}", n),
            ChoiceValue::Double(d) => write!(f, "{}", d),
            ChoiceValue::Thread(t) => write!(f, "{}", t),
            ChoiceValue::Object(v) => write!(f, "{}", v),
        }
    }
}
