//! Object heap with copy-on-write objects.
//!
//! Objects live behind `Arc` so that capturing a snapshot is a shallow copy
//! of the object table; a mutation after a snapshot clones only the object
//! being written.

use crate::error::{StateError, StateResult};
use crate::value::{ClassId, ObjRef, Value};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// Slots follow the class' declared instance fields.
    Instance,
    /// Slots are array elements; never filtered.
    Array,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapObject {
    pub class: ClassId,
    pub kind: ObjectKind,
    pub slots: SmallVec<[Value; 4]>,
}

impl HeapObject {
    pub fn instance(class: ClassId, num_fields: usize) -> Self {
        Self {
            class,
            kind: ObjectKind::Instance,
            slots: SmallVec::from_elem(Value::Null, num_fields),
        }
    }

    pub fn array(class: ClassId, elements: Vec<Value>) -> Self {
        Self {
            class,
            kind: ObjectKind::Array,
            slots: SmallVec::from_vec(elements),
        }
    }

    pub fn slot(&self, idx: usize) -> StateResult<&Value> {
        self.slots.get(idx).ok_or(StateError::IndexOutOfBounds {
            index: idx,
            length: self.slots.len(),
        })
    }

    pub fn set_slot(&mut self, idx: usize, value: Value) -> StateResult<()> {
        let length = self.slots.len();
        match self.slots.get_mut(idx) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(StateError::IndexOutOfBounds { index: idx, length }),
        }
    }
}

/// The object table. Raw references are handed out sequentially from
/// `next_ref`, so two runs that allocate in a different order end up with
/// different raw ids for the same logical object.
#[derive(Debug, Clone, Default)]
pub struct Heap {
    objects: BTreeMap<ObjRef, Arc<HeapObject>>,
    next_ref: u32,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start handing out references at `base` instead of 0.
    pub fn with_base(base: u32) -> Self {
        Self {
            objects: BTreeMap::new(),
            next_ref: base,
        }
    }

    pub fn alloc(&mut self, object: HeapObject) -> ObjRef {
        let r = ObjRef(self.next_ref);
        self.next_ref += 1;
        self.objects.insert(r, Arc::new(object));
        r
    }

    #[inline]
    pub fn get(&self, r: ObjRef) -> Option<&HeapObject> {
        self.objects.get(&r).map(|o| o.as_ref())
    }

    pub fn object(&self, r: ObjRef) -> StateResult<&HeapObject> {
        self.get(r).ok_or(StateError::DanglingReference(r))
    }

    /// Mutable access; clones the object if a snapshot still shares it.
    pub fn object_mut(&mut self, r: ObjRef) -> StateResult<&mut HeapObject> {
        self.objects
            .get_mut(&r)
            .map(Arc::make_mut)
            .ok_or(StateError::DanglingReference(r))
    }

    pub fn free(&mut self, r: ObjRef) -> bool {
        self.objects.remove(&r).is_some()
    }

    #[inline]
    pub fn contains(&self, r: ObjRef) -> bool {
        self.objects.contains_key(&r)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjRef, &HeapObject)> {
        self.objects.iter().map(|(r, o)| (*r, o.as_ref()))
    }

    /// Find the first reference held by any object that does not resolve.
    pub fn find_dangling(&self) -> Option<ObjRef> {
        self.objects
            .values()
            .flat_map(|o| o.slots.iter())
            .filter_map(Value::as_ref)
            .find(|r| !self.contains(*r))
    }
}
