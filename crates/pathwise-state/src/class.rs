//! Static program representation needed to interpret heap slots.
//!
//! Loading classes is the interpreter's business; the engine only needs the
//! field layout of each class so that the serializer can visit fields in a
//! fixed order and skip the ones marked irrelevant to state identity.

use crate::error::{StateError, StateResult};
use crate::value::ClassId;
use ahash::AHashMap;

/// A declared field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub name: String,
    /// Excluded from fingerprints (e.g. caches, instance counters).
    pub filtered: bool,
}

impl FieldInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filtered: false,
        }
    }
}

/// Field layout of one class. Slot `i` of an instance holds `instance_fields[i]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    pub id: ClassId,
    pub name: String,
    pub instance_fields: Vec<FieldInfo>,
    pub static_fields: Vec<FieldInfo>,
}

impl ClassInfo {
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.instance_fields.iter().position(|f| f.name == name)
    }

    pub fn static_field_index(&self, name: &str) -> Option<usize> {
        self.static_fields.iter().position(|f| f.name == name)
    }

    pub(crate) fn require_field(&self, name: &str) -> StateResult<usize> {
        self.field_index(name).ok_or_else(|| StateError::UnknownField {
            class: self.name.clone(),
            field: name.to_string(),
        })
    }

    pub(crate) fn require_static_field(&self, name: &str) -> StateResult<usize> {
        self.static_field_index(name)
            .ok_or_else(|| StateError::UnknownField {
                class: self.name.clone(),
                field: name.to_string(),
            })
    }
}

/// All classes known to the program, indexed by [`ClassId`].
#[derive(Debug, Clone, Default)]
pub struct ClassRegistry {
    classes: Vec<ClassInfo>,
    by_name: AHashMap<String, ClassId>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class. Re-defining an existing name returns the existing id.
    pub fn define(&mut self, name: &str, instance_fields: &[&str], static_fields: &[&str]) -> ClassId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = ClassId(self.classes.len() as u32);
        self.classes.push(ClassInfo {
            id,
            name: name.to_string(),
            instance_fields: instance_fields.iter().map(|f| FieldInfo::new(*f)).collect(),
            static_fields: static_fields.iter().map(|f| FieldInfo::new(*f)).collect(),
        });
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Mark an instance or static field as irrelevant to state identity.
    pub fn mark_filtered(&mut self, class: &str, field: &str) -> StateResult<()> {
        let id = self.require(class)?;
        let info = &mut self.classes[id.index()];
        let mut found = false;
        for f in info
            .instance_fields
            .iter_mut()
            .chain(info.static_fields.iter_mut())
        {
            if f.name == field {
                f.filtered = true;
                found = true;
            }
        }
        if found {
            Ok(())
        } else {
            Err(StateError::UnknownField {
                class: class.to_string(),
                field: field.to_string(),
            })
        }
    }

    #[inline]
    pub fn get(&self, id: ClassId) -> Option<&ClassInfo> {
        self.classes.get(id.index())
    }

    pub fn info(&self, id: ClassId) -> StateResult<&ClassInfo> {
        self.get(id).ok_or(StateError::UnknownClassId(id))
    }

    pub fn lookup(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    pub fn require(&self, name: &str) -> StateResult<ClassId> {
        self.lookup(name)
            .ok_or_else(|| StateError::UnknownClass(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClassInfo> {
        self.classes.iter()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
