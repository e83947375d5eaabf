//! The complete mutable state of a program under test.

use crate::class::ClassRegistry;
use crate::error::{StateError, StateResult};
use crate::heap::{Heap, HeapObject};
use crate::thread::{ThreadState, ThreadStatus};
use crate::value::{ClassId, ObjRef, ThreadId, Value};
use std::sync::Arc;

/// Heap, thread stacks and static areas of one program.
///
/// The class registry is shared and immutable; everything else is owned and
/// restored wholesale on backtrack.
#[derive(Debug, Clone)]
pub struct ProgramState {
    classes: Arc<ClassRegistry>,
    heap: Heap,
    /// Static field values, `None` until the class is initialized.
    statics: Vec<Option<Vec<Value>>>,
    /// Ordered by id; ids are handed out sequentially.
    threads: Vec<ThreadState>,
    current_thread: Option<ThreadId>,
}

impl ProgramState {
    pub fn new(classes: Arc<ClassRegistry>) -> Self {
        Self::with_heap(classes, Heap::new())
    }

    pub fn with_heap(classes: Arc<ClassRegistry>, heap: Heap) -> Self {
        let statics = vec![None; classes.len()];
        Self {
            classes,
            heap,
            statics,
            threads: Vec::new(),
            current_thread: None,
        }
    }

    pub fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    // ----- statics -----

    /// Initialize a class' static area with nulls. No-op if already done.
    pub fn init_class(&mut self, name: &str) -> StateResult<ClassId> {
        let id = self.classes.require(name)?;
        let slot = &mut self.statics[id.index()];
        if slot.is_none() {
            let n = self.classes.info(id)?.static_fields.len();
            *slot = Some(vec![Value::Null; n]);
        }
        Ok(id)
    }

    #[inline]
    pub fn is_initialized(&self, id: ClassId) -> bool {
        matches!(self.statics.get(id.index()), Some(Some(_)))
    }

    pub fn statics_of(&self, id: ClassId) -> Option<&[Value]> {
        self.statics.get(id.index()).and_then(|s| s.as_deref())
    }

    /// Ids of all initialized classes, ascending.
    pub fn initialized_classes(&self) -> impl Iterator<Item = ClassId> + '_ {
        self.statics
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_some())
            .map(|(i, _)| ClassId(i as u32))
    }

    pub fn get_static(&self, class: &str, field: &str) -> StateResult<&Value> {
        let id = self.classes.require(class)?;
        let idx = self.classes.info(id)?.require_static_field(field)?;
        let area = self
            .statics_of(id)
            .ok_or_else(|| StateError::UninitializedClass(class.to_string()))?;
        Ok(&area[idx])
    }

    pub fn set_static(&mut self, class: &str, field: &str, value: Value) -> StateResult<()> {
        let id = self.classes.require(class)?;
        let idx = self.classes.info(id)?.require_static_field(field)?;
        match self.statics.get_mut(id.index()) {
            Some(Some(area)) => {
                area[idx] = value;
                Ok(())
            }
            _ => Err(StateError::UninitializedClass(class.to_string())),
        }
    }

    // ----- heap -----

    pub fn new_object(&mut self, class: &str) -> StateResult<ObjRef> {
        let id = self.classes.require(class)?;
        let n = self.classes.info(id)?.instance_fields.len();
        Ok(self.heap.alloc(HeapObject::instance(id, n)))
    }

    pub fn new_array(&mut self, class: &str, elements: Vec<Value>) -> StateResult<ObjRef> {
        let id = self.classes.require(class)?;
        Ok(self.heap.alloc(HeapObject::array(id, elements)))
    }

    fn field_slot(&self, obj: ObjRef, field: &str) -> StateResult<usize> {
        let o = self.heap.object(obj)?;
        if o.kind != crate::heap::ObjectKind::Instance {
            return Err(StateError::NotAnInstance(obj));
        }
        self.classes.info(o.class)?.require_field(field)
    }

    pub fn get_field(&self, obj: ObjRef, field: &str) -> StateResult<&Value> {
        let idx = self.field_slot(obj, field)?;
        self.heap.object(obj)?.slot(idx)
    }

    pub fn set_field(&mut self, obj: ObjRef, field: &str, value: Value) -> StateResult<()> {
        let idx = self.field_slot(obj, field)?;
        self.heap.object_mut(obj)?.set_slot(idx, value)
    }

    // ----- threads -----

    pub fn spawn_thread(&mut self, name: &str) -> ThreadId {
        let id = ThreadId(self.threads.len() as u32);
        self.threads.push(ThreadState::new(id, name));
        id
    }

    pub fn threads(&self) -> &[ThreadState] {
        &self.threads
    }

    pub fn thread(&self, id: ThreadId) -> StateResult<&ThreadState> {
        self.threads
            .get(id.0 as usize)
            .ok_or(StateError::NoSuchThread(id))
    }

    pub fn thread_mut(&mut self, id: ThreadId) -> StateResult<&mut ThreadState> {
        self.threads
            .get_mut(id.0 as usize)
            .ok_or(StateError::NoSuchThread(id))
    }

    /// Threads that could be scheduled next, ascending by id.
    pub fn runnable_threads(&self) -> Vec<ThreadId> {
        self.threads
            .iter()
            .filter(|t| t.status == ThreadStatus::Runnable)
            .map(|t| t.id)
            .collect()
    }

    pub fn live_threads(&self) -> impl Iterator<Item = &ThreadState> {
        self.threads.iter().filter(|t| t.is_alive())
    }

    #[inline]
    pub fn current_thread(&self) -> Option<ThreadId> {
        self.current_thread
    }

    pub fn set_current_thread(&mut self, id: Option<ThreadId>) {
        self.current_thread = id;
    }

    // ----- integrity -----

    /// Check that every root and every heap slot resolves.
    pub fn validate(&self) -> StateResult<()> {
        let roots = self
            .statics
            .iter()
            .flatten()
            .flatten()
            .chain(
                self.threads
                    .iter()
                    .flat_map(|t| t.frames.iter().flat_map(|f| f.slots.iter())),
            )
            .filter_map(Value::as_ref)
            .chain(self.threads.iter().filter_map(|t| t.object));
        for r in roots {
            if !self.heap.contains(r) {
                return Err(StateError::DanglingReference(r));
            }
        }
        if let Some(r) = self.heap.find_dangling() {
            return Err(StateError::DanglingReference(r));
        }
        if let Some(id) = self.current_thread {
            self.thread(id)?;
        }
        Ok(())
    }

    #[inline]
    pub(crate) fn shares_classes(&self, other: &ProgramState) -> bool {
        Arc::ptr_eq(&self.classes, &other.classes)
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot::capture(self)
    }
}

/// A restorable capture of a [`ProgramState`], taken at a transition
/// boundary. Heap objects are shared with the live state until written.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    state: ProgramState,
}

impl StateSnapshot {
    pub fn capture(state: &ProgramState) -> Self {
        Self {
            state: state.clone(),
        }
    }

    /// The captured state, for serialization.
    pub fn state(&self) -> &ProgramState {
        &self.state
    }

    /// Overwrite `target` with the captured state. Fails if `target` belongs
    /// to a different program or the capture is internally inconsistent.
    pub fn restore_into(&self, target: &mut ProgramState) -> StateResult<()> {
        if !self.state.shares_classes(target) {
            return Err(StateError::ForeignSnapshot);
        }
        self.state.validate()?;
        target.clone_from(&self.state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Arc<ClassRegistry> {
        let mut reg = ClassRegistry::new();
        reg.define("Node", &["value", "next"], &[]);
        reg.define("Main", &[], &["counter"]);
        Arc::new(reg)
    }

    #[test]
    fn test_fields_and_statics() {
        let mut state = ProgramState::new(registry());
        let n = state.new_object("Node").unwrap();
        state.set_field(n, "value", Value::Int(3)).unwrap();
        assert_eq!(state.get_field(n, "value").unwrap(), &Value::Int(3));
        assert_eq!(state.get_field(n, "next").unwrap(), &Value::Null);

        assert!(matches!(
            state.set_static("Main", "counter", Value::Int(1)),
            Err(StateError::UninitializedClass(_))
        ));
        state.init_class("Main").unwrap();
        state.set_static("Main", "counter", Value::Int(1)).unwrap();
        assert_eq!(state.get_static("Main", "counter").unwrap(), &Value::Int(1));
    }

    #[test]
    fn test_snapshot_restore() {
        let mut state = ProgramState::new(registry());
        let n = state.new_object("Node").unwrap();
        let snap = state.snapshot();

        state.set_field(n, "value", Value::Int(9)).unwrap();
        state.spawn_thread("main");
        snap.restore_into(&mut state).unwrap();

        assert_eq!(state.get_field(n, "value").unwrap(), &Value::Null);
        assert!(state.threads().is_empty());
    }

    #[test]
    fn test_restore_foreign_snapshot_fails() {
        let a = ProgramState::new(registry());
        let mut b = ProgramState::new(registry());
        assert_eq!(
            a.snapshot().restore_into(&mut b),
            Err(StateError::ForeignSnapshot)
        );
    }

    #[test]
    fn test_validate_dangling_root() {
        let mut state = ProgramState::new(registry());
        state.init_class("Main").unwrap();
        state
            .set_static("Main", "counter", Value::Ref(ObjRef(42)))
            .unwrap();
        assert_eq!(
            state.validate(),
            Err(StateError::DanglingReference(ObjRef(42)))
        );
    }

    #[test]
    fn test_runnable_threads() {
        let mut state = ProgramState::new(registry());
        let t0 = state.spawn_thread("main");
        let t1 = state.spawn_thread("worker");
        state.thread_mut(t0).unwrap().status = ThreadStatus::Blocked;
        assert_eq!(state.runnable_threads(), vec![t1]);
    }
}
