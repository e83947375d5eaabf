//! Modeled threads and their call stacks.

use crate::value::{ObjRef, ThreadId, Value};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadStatus {
    Runnable,
    /// Waiting to acquire a lock.
    Blocked,
    /// Waiting for a notification.
    Waiting,
    Terminated,
}

impl ThreadStatus {
    pub(crate) fn ordinal(self) -> u64 {
        match self {
            ThreadStatus::Runnable => 0,
            ThreadStatus::Blocked => 1,
            ThreadStatus::Waiting => 2,
            ThreadStatus::Terminated => 3,
        }
    }
}

/// One activation record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub method: Arc<str>,
    /// Index of the next instruction to execute.
    pub pc: u32,
    /// Locals followed by the operand stack.
    pub slots: Vec<Value>,
}

impl Frame {
    pub fn new(method: &str, num_slots: usize) -> Self {
        Self {
            method: Arc::from(method),
            pc: 0,
            slots: vec![Value::Null; num_slots],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadState {
    pub id: ThreadId,
    pub name: String,
    pub status: ThreadStatus,
    /// Bottom frame first.
    pub frames: Vec<Frame>,
    /// The modeled thread object, treated as a heap root.
    pub object: Option<ObjRef>,
}

impl ThreadState {
    pub fn new(id: ThreadId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            status: ThreadStatus::Runnable,
            frames: Vec::new(),
            object: None,
        }
    }

    #[inline]
    pub fn is_runnable(&self) -> bool {
        self.status == ThreadStatus::Runnable
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.status != ThreadStatus::Terminated
    }

    pub fn top_frame(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub fn top_frame_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    pub fn push_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn pop_frame(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    pub fn stack_depth(&self) -> usize {
        self.frames.len()
    }
}
