//! A tiny threaded language for writing programs under test.
//!
//! Every thread runs a flat list of [`Op`]s. Globals are static fields of
//! the `Globals` class, locals live in the thread's single frame, locks are
//! static fields of `Locks` holding the owner's id plus one.

use pathwise_choice::ChoiceSpec;
use pathwise_state::Value;

pub const GLOBALS: &str = "Globals";
pub const LOCKS: &str = "Locks";

#[derive(Debug, Clone, PartialEq)]
pub enum Var {
    Local(usize),
    Global(String),
}

impl Var {
    pub fn global(name: &str) -> Self {
        Var::Global(name.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Null,
    Int(i64),
    Bool(bool),
    Str(String),
    Load(Var),
    Field(Box<Expr>, String),
    Plus(Box<Expr>, Box<Expr>),
    Eq(Box<Expr>, Box<Expr>),
    Lt(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    pub fn local(idx: usize) -> Self {
        Expr::Load(Var::Local(idx))
    }

    pub fn global(name: &str) -> Self {
        Expr::Load(Var::global(name))
    }

    pub fn plus(self, other: Expr) -> Self {
        Expr::Plus(Box::new(self), Box::new(other))
    }

    pub fn equals(self, other: Expr) -> Self {
        Expr::Eq(Box::new(self), Box::new(other))
    }

    pub fn less_than(self, other: Expr) -> Self {
        Expr::Lt(Box::new(self), Box::new(other))
    }

    pub fn negate(self) -> Self {
        Expr::Not(Box::new(self))
    }

    pub fn field(self, name: &str) -> Self {
        Expr::Field(Box::new(self), name.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Ask the engine for a value.
    Choose { target: Var, name: String, spec: ChoiceSpec },
    Set(Var, Expr),
    /// Report a violation if the condition is false.
    Assert(Expr, String),
    /// Abandon the path if the condition is false.
    Assume(Expr),
    /// Give up the processor and let the scheduler pick a thread.
    Yield,
    Lock(String),
    Unlock(String),
    New { target: Var, class: String },
    SetField { object: Expr, field: String, value: Expr },
    /// Call a native peer.
    Native {
        target: Option<Var>,
        signature: String,
        args: Vec<Expr>,
    },
    Throw { class: String, message: String },
    Jump(usize),
    JumpIf(Expr, usize),
}

impl Op {
    pub fn choose_bool(target: Var) -> Self {
        Op::Choose {
            target,
            name: "choose".into(),
            spec: ChoiceSpec::Bool { false_first: true },
        }
    }

    pub fn choose_int(target: Var, values: &[i64]) -> Self {
        Op::Choose {
            target,
            name: "choose".into(),
            spec: ChoiceSpec::IntList(values.to_vec()),
        }
    }

    pub fn native(target: Option<Var>, signature: &str, args: Vec<Expr>) -> Self {
        Op::Native {
            target,
            signature: signature.to_string(),
            args,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThreadScript {
    pub name: String,
    pub locals: usize,
    pub ops: Vec<Op>,
}

/// A whole program: globals, locks, heap classes and threads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Script {
    pub name: String,
    pub globals: Vec<(String, Value)>,
    pub locks: Vec<String>,
    pub classes: Vec<(String, Vec<String>)>,
    pub threads: Vec<ThreadScript>,
}

impl Script {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn global(mut self, name: &str, init: Value) -> Self {
        self.globals.push((name.to_string(), init));
        self
    }

    pub fn lock(mut self, name: &str) -> Self {
        self.locks.push(name.to_string());
        self
    }

    pub fn class(mut self, name: &str, fields: &[&str]) -> Self {
        self.classes
            .push((name.to_string(), fields.iter().map(|f| f.to_string()).collect()));
        self
    }

    pub fn thread(mut self, name: &str, locals: usize, ops: Vec<Op>) -> Self {
        self.threads.push(ThreadScript {
            name: name.to_string(),
            locals,
            ops,
        });
        self
    }

    /// Every native signature referenced by an op, in first-use order.
    pub fn native_signatures(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for op in self.threads.iter().flat_map(|t| &t.ops) {
            if let Op::Native { signature, .. } = op {
                if !out.contains(&signature.as_str()) {
                    out.push(signature);
                }
            }
        }
        out
    }
}
