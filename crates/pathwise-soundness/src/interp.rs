use crate::error::ScriptError;
use crate::script::{Expr, Op, Script, Var, GLOBALS, LOCKS};
use pathwise_choice::{ChoiceContext, ChoiceRequest};
use pathwise_mc::{Interrupt, Program, StepContext, StepOutcome};
use pathwise_peer::{DispatchError, ModeledException, Signature};
use pathwise_state::{
    ClassRegistry, Frame, ProgramState, StateError, ThreadId, ThreadStatus, Value,
};
use std::sync::Arc;
use tracing::trace;

/// Location of every scheduling decision.
const SCHEDULER: &str = "scheduler";

/// Runs a [`Script`] on a [`ProgramState`].
///
/// The current thread keeps running until it yields, blocks, releases a
/// lock or finishes. Only then is the next thread picked, which is a
/// decision point when more than one thread could run.
#[derive(Debug, Clone)]
pub struct Interpreter {
    script: Arc<Script>,
    state: ProgramState,
    natives: Vec<Signature>,
}

impl Interpreter {
    pub fn new(script: Script) -> Result<Self, ScriptError> {
        for t in &script.threads {
            for op in &t.ops {
                if let Op::Jump(target) | Op::JumpIf(_, target) = op {
                    if *target > t.ops.len() {
                        return Err(ScriptError::BadJump {
                            thread: t.name.clone(),
                            target: *target,
                            len: t.ops.len(),
                        });
                    }
                }
            }
        }
        let natives = script
            .native_signatures()
            .into_iter()
            .map(|s| Signature::parse(s).ok_or_else(|| ScriptError::MalformedSignature(s.to_string())))
            .collect::<Result<Vec<_>, _>>()?;

        let mut reg = ClassRegistry::new();
        let globals: Vec<&str> = script.globals.iter().map(|(n, _)| n.as_str()).collect();
        reg.define(GLOBALS, &[], &globals);
        let locks: Vec<&str> = script.locks.iter().map(String::as_str).collect();
        reg.define(LOCKS, &[], &locks);
        for (name, fields) in &script.classes {
            let fields: Vec<&str> = fields.iter().map(String::as_str).collect();
            reg.define(name, &fields, &[]);
        }

        let mut state = ProgramState::new(Arc::new(reg));
        state.init_class(GLOBALS)?;
        for (name, init) in &script.globals {
            state.set_static(GLOBALS, name, init.clone())?;
        }
        state.init_class(LOCKS)?;
        for lock in &script.locks {
            state.set_static(LOCKS, lock, Value::Int(0))?;
        }
        for t in &script.threads {
            let id = state.spawn_thread(&t.name);
            state.thread_mut(id)?.push_frame(Frame::new(&t.name, t.locals));
        }

        Ok(Self {
            script: Arc::new(script),
            state,
            natives,
        })
    }

    pub fn script(&self) -> &Script {
        &self.script
    }

    pub fn global(&self, name: &str) -> Result<&Value, StateError> {
        self.state.get_static(GLOBALS, name)
    }

    /// The thread to run next, or `None` if no thread can run.
    fn schedule(&mut self, cx: &mut StepContext<'_>) -> Result<Option<ThreadId>, Interrupt> {
        if let Some(t) = self.state.current_thread() {
            if self.state.thread(t)?.is_runnable() {
                return Ok(Some(t));
            }
        }
        let runnable = self.state.runnable_threads();
        let next = match runnable.as_slice() {
            [] => {
                let blocked = self.state.live_threads().count();
                if blocked > 0 {
                    cx.report_violation(format!("deadlock: {blocked} threads blocked"));
                }
                return Ok(None);
            }
            [only] => *only,
            _ => cx.choose_thread("schedule", SCHEDULER, runnable)?,
        };
        trace!(thread = %next, "scheduled");
        self.state.set_current_thread(Some(next));
        Ok(Some(next))
    }

    fn frame(&self, tid: ThreadId) -> Result<&Frame, StateError> {
        self.state
            .thread(tid)?
            .top_frame()
            .ok_or(StateError::EmptyStack(tid))
    }

    fn frame_mut(&mut self, tid: ThreadId) -> Result<&mut Frame, StateError> {
        self.state
            .thread_mut(tid)?
            .top_frame_mut()
            .ok_or(StateError::EmptyStack(tid))
    }

    fn jump(&mut self, tid: ThreadId, pc: usize) -> Result<(), StateError> {
        self.frame_mut(tid)?.pc = pc as u32;
        Ok(())
    }

    fn advance(&mut self, tid: ThreadId) -> Result<(), StateError> {
        self.frame_mut(tid)?.pc += 1;
        Ok(())
    }

    fn set_status(&mut self, tid: ThreadId, status: ThreadStatus) -> Result<(), StateError> {
        self.state.thread_mut(tid)?.status = status;
        Ok(())
    }

    fn load(&self, tid: ThreadId, var: &Var) -> Result<Value, StateError> {
        match var {
            Var::Local(i) => {
                let slots = &self.frame(tid)?.slots;
                slots.get(*i).cloned().ok_or(StateError::IndexOutOfBounds {
                    index: *i,
                    length: slots.len(),
                })
            }
            Var::Global(name) => self.state.get_static(GLOBALS, name).cloned(),
        }
    }

    fn store(&mut self, tid: ThreadId, var: &Var, value: Value) -> Result<(), StateError> {
        match var {
            Var::Local(i) => {
                let slots = &mut self.frame_mut(tid)?.slots;
                let length = slots.len();
                let slot = slots
                    .get_mut(*i)
                    .ok_or(StateError::IndexOutOfBounds { index: *i, length })?;
                *slot = value;
                Ok(())
            }
            Var::Global(name) => self.state.set_static(GLOBALS, name, value),
        }
    }

    fn eval(&self, tid: ThreadId, expr: &Expr) -> Result<Value, Interrupt> {
        let v = match expr {
            Expr::Null => Value::Null,
            Expr::Int(i) => Value::Int(*i),
            Expr::Bool(b) => Value::Bool(*b),
            Expr::Str(s) => Value::str(s),
            Expr::Load(var) => self.load(tid, var)?,
            Expr::Field(object, field) => {
                let r = self.eval_ref(tid, object)?;
                self.state.get_field(r, field)?.clone()
            }
            Expr::Plus(a, b) => Value::Int(self.eval_int(tid, a)?.wrapping_add(self.eval_int(tid, b)?)),
            Expr::Eq(a, b) => Value::Bool(self.eval(tid, a)? == self.eval(tid, b)?),
            Expr::Lt(a, b) => Value::Bool(self.eval_int(tid, a)? < self.eval_int(tid, b)?),
            Expr::Not(a) => Value::Bool(!self.eval_bool(tid, a)?),
        };
        Ok(v)
    }

    fn eval_int(&self, tid: ThreadId, expr: &Expr) -> Result<i64, Interrupt> {
        let v = self.eval(tid, expr)?;
        v.as_int().ok_or_else(|| class_cast("int", &v))
    }

    fn eval_bool(&self, tid: ThreadId, expr: &Expr) -> Result<bool, Interrupt> {
        let v = self.eval(tid, expr)?;
        v.as_bool().ok_or_else(|| class_cast("boolean", &v))
    }

    fn eval_ref(&self, tid: ThreadId, expr: &Expr) -> Result<pathwise_state::ObjRef, Interrupt> {
        match self.eval(tid, expr)? {
            Value::Ref(r) => Ok(r),
            Value::Null => Err(Interrupt::Uncaught(ModeledException::new(
                "NullPointerException",
                "dereferenced null",
            ))),
            other => Err(class_cast("reference", &other)),
        }
    }

    fn release_waiters(&mut self) -> Result<(), StateError> {
        let blocked: Vec<ThreadId> = self
            .state
            .threads()
            .iter()
            .filter(|t| t.status == ThreadStatus::Blocked)
            .map(|t| t.id)
            .collect();
        for t in blocked {
            self.set_status(t, ThreadStatus::Runnable)?;
        }
        Ok(())
    }
}

fn class_cast(expected: &str, actual: &Value) -> Interrupt {
    Interrupt::Uncaught(ModeledException::new(
        "ClassCastException",
        format!("expected {expected}, got {}", actual.type_name()),
    ))
}

impl Program for Interpreter {
    fn state(&self) -> &ProgramState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ProgramState {
        &mut self.state
    }

    fn required_peers(&self) -> Vec<Signature> {
        self.natives.clone()
    }

    fn name(&self) -> Option<&str> {
        Some(&self.script.name)
    }

    fn step(&mut self, cx: &mut StepContext<'_>) -> Result<StepOutcome, Interrupt> {
        let script = Arc::clone(&self.script);
        loop {
            let Some(tid) = self.schedule(cx)? else {
                return Ok(StepOutcome::Terminated);
            };
            let thread = &script.threads[tid.0 as usize];
            let pc = self.frame(tid)?.pc as usize;
            let Some(op) = thread.ops.get(pc) else {
                self.set_status(tid, ThreadStatus::Terminated)?;
                self.state.set_current_thread(None);
                continue;
            };
            let location = format!("{}:{pc}", thread.name);

            match op {
                Op::Choose { target, name, spec } => {
                    let request = ChoiceRequest::new(name.clone(), location, spec.clone());
                    let v = cx.request_choice(request)?;
                    self.store(tid, target, v.to_value())?;
                    self.advance(tid)?;
                }
                Op::Set(var, expr) => {
                    let v = self.eval(tid, expr)?;
                    self.store(tid, var, v)?;
                    self.advance(tid)?;
                }
                Op::Assert(cond, message) => {
                    if !self.eval_bool(tid, cond)? {
                        cx.report_violation(message.clone());
                        return Ok(StepOutcome::TransitionEnd);
                    }
                    self.advance(tid)?;
                }
                Op::Assume(cond) => {
                    if !self.eval_bool(tid, cond)? {
                        cx.ignore_path();
                        return Ok(StepOutcome::TransitionEnd);
                    }
                    self.advance(tid)?;
                }
                Op::Yield => {
                    self.advance(tid)?;
                    self.state.set_current_thread(None);
                }
                Op::Lock(lock) => {
                    let owner = self.state.get_static(LOCKS, lock)?.as_int().unwrap_or(0);
                    if owner == 0 {
                        self.state
                            .set_static(LOCKS, lock, Value::Int(tid.0 as i64 + 1))?;
                        self.advance(tid)?;
                    } else {
                        self.set_status(tid, ThreadStatus::Blocked)?;
                        self.state.set_current_thread(None);
                    }
                }
                Op::Unlock(lock) => {
                    self.state.set_static(LOCKS, lock, Value::Int(0))?;
                    self.release_waiters()?;
                    self.advance(tid)?;
                    self.state.set_current_thread(None);
                }
                Op::New { target, class } => {
                    let r = self.state.new_object(class)?;
                    self.store(tid, target, Value::Ref(r))?;
                    self.advance(tid)?;
                }
                Op::SetField {
                    object,
                    field,
                    value,
                } => {
                    let r = self.eval_ref(tid, object)?;
                    let v = self.eval(tid, value)?;
                    self.state.set_field(r, field, v)?;
                    self.advance(tid)?;
                }
                Op::Native {
                    target,
                    signature,
                    args,
                } => {
                    let sig = Signature::parse(signature)
                        .ok_or_else(|| DispatchError::MalformedSignature(signature.clone()))?;
                    let args = args
                        .iter()
                        .map(|a| self.eval(tid, a))
                        .collect::<Result<Vec<_>, _>>()?;
                    let ret = cx.invoke_native(&sig, &args, &location, &mut self.state)?;
                    if let Some(target) = target {
                        self.store(tid, target, ret)?;
                    }
                    self.advance(tid)?;
                }
                Op::Throw { class, message } => {
                    return Err(Interrupt::Uncaught(ModeledException::new(class, message)));
                }
                Op::Jump(target) => self.jump(tid, *target)?,
                Op::JumpIf(cond, target) => {
                    if self.eval_bool(tid, cond)? {
                        self.jump(tid, *target)?;
                    } else {
                        self.advance(tid)?;
                    }
                }
            }
        }
    }
}
