//! Canonical state serialization.
//!
//! The serializer walks the state from its roots (statics of initialized
//! classes, then thread stacks) and visits the reachable heap breadth first.
//! Each object gets a canonical index on first discovery, so the encoding
//! depends only on the shape of the reachable graph and its field values,
//! never on raw heap ids or allocation order. An object is numbered before it
//! is queued, which terminates cycles. Unreachable objects are not encoded.
//!
//! Fields excluded by the [`FieldFilter`] (or marked filtered in the class
//! registry) are skipped entirely; objects reachable only through them drop
//! out of the encoding too.

use crate::class::{ClassInfo, FieldInfo};
use crate::error::{StateError, StateResult};
use crate::fingerprint::{CanonicalForm, Fingerprint};
use crate::heap::ObjectKind;
use crate::program::ProgramState;
use crate::value::{ClassId, ObjRef, Value};
use ahash::AHashMap;
use std::collections::{BTreeSet, VecDeque};
use tracing::trace;

const TAG_NULL: u64 = 0;
const TAG_INT: u64 = 1;
const TAG_BOOL: u64 = 2;
const TAG_DOUBLE: u64 = 3;
const TAG_REF: u64 = 4;
const TAG_STR: u64 = 5;

/// Section separators, so that e.g. an empty static area cannot be confused
/// with an empty thread list.
const SECTION_STATICS: u64 = 0x5354_4154;
const SECTION_THREADS: u64 = 0x5448_5244;
const SECTION_HEAP: u64 = 0x4845_4150;

const CANONICAL_NAN: u64 = 0x7ff8_0000_0000_0000;

/// Which fields are irrelevant to state identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldFilter {
    /// `(class, field)` pairs; `None` matches the field in any class.
    excluded: Vec<(Option<String>, String)>,
    /// Lowercased substrings; a field whose lowercased name contains one is
    /// excluded.
    substrings: Vec<String>,
}

impl FieldFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclude `"Class.field"` or a bare `"field"` in every class.
    pub fn exclude(mut self, spec: &str) -> Self {
        let entry = match spec.rsplit_once('.') {
            Some((class, field)) => (Some(class.to_string()), field.to_string()),
            None => (None, spec.to_string()),
        };
        self.excluded.push(entry);
        self
    }

    /// Exclude every field whose name contains `needle`, ignoring case.
    pub fn exclude_containing(mut self, needle: &str) -> Self {
        self.substrings.push(needle.to_lowercase());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.excluded.is_empty() && self.substrings.is_empty()
    }

    pub fn is_filtered(&self, class: &ClassInfo, field: &FieldInfo) -> bool {
        if field.filtered {
            return true;
        }
        let by_name = self.excluded.iter().any(|(c, f)| {
            *f == field.name && c.as_deref().is_none_or(|c| c == class.name)
        });
        if by_name {
            return true;
        }
        if self.substrings.is_empty() {
            return false;
        }
        let lower = field.name.to_lowercase();
        self.substrings.iter().any(|s| lower.contains(s.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializerConfig {
    pub filter: FieldFilter,
    pub include_stacks: bool,
    pub include_statics: bool,
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self {
            filter: FieldFilter::default(),
            include_stacks: true,
            include_statics: true,
        }
    }
}

/// Restricts what a serialization pass covers.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Scope<'a> {
    /// Only these classes' statics, if set.
    pub classes: Option<&'a BTreeSet<ClassId>>,
    /// Frames running these methods are skipped.
    pub ignored_methods: &'a [String],
}

/// Turns a [`ProgramState`] into its [`CanonicalForm`].
///
/// Per-class unfiltered slot indices are cached; the registry is immutable
/// for the lifetime of a program, so the cache never goes stale as long as
/// the serializer is used with one program.
#[derive(Debug, Default)]
pub struct CanonicalSerializer {
    config: SerializerConfig,
    /// Unfiltered (instance, static) slot indices per class.
    layouts: Vec<Option<(Vec<usize>, Vec<usize>)>>,
}

impl CanonicalSerializer {
    pub fn new(config: SerializerConfig) -> Self {
        Self {
            config,
            layouts: Vec::new(),
        }
    }

    pub fn config(&self) -> &SerializerConfig {
        &self.config
    }

    pub fn fingerprint(&mut self, state: &ProgramState) -> StateResult<Fingerprint> {
        Ok(self.canonical_form(state)?.fingerprint())
    }

    pub fn canonical_form(&mut self, state: &ProgramState) -> StateResult<CanonicalForm> {
        self.encode(state, Scope::default())
    }

    pub(crate) fn encode(&mut self, state: &ProgramState, scope: Scope<'_>) -> StateResult<CanonicalForm> {
        let mut enc = Encoder {
            words: Vec::with_capacity(64),
            canon: AHashMap::new(),
            queue: VecDeque::new(),
            state,
        };

        if self.config.include_statics {
            enc.words.push(SECTION_STATICS);
            for id in state.initialized_classes() {
                if scope.classes.is_some_and(|set| !set.contains(&id)) {
                    continue;
                }
                let Some(area) = state.statics_of(id) else {
                    continue;
                };
                let layout = self.static_layout(state, id)?;
                enc.words.push(id.0 as u64);
                enc.words.push(layout.len() as u64);
                for &i in layout {
                    enc.value(&area[i])?;
                }
            }
        }

        if self.config.include_stacks {
            enc.words.push(SECTION_THREADS);
            enc.words.push(state.threads().len() as u64);
            for thread in state.threads() {
                enc.words.push(thread.id.0 as u64);
                enc.words.push(thread.status.ordinal());
                match thread.object {
                    Some(r) => enc.value(&Value::Ref(r))?,
                    None => enc.words.push(TAG_NULL),
                }
                let frames: Vec<_> = thread
                    .frames
                    .iter()
                    .filter(|f| !scope.ignored_methods.iter().any(|m| m.as_str() == &*f.method))
                    .collect();
                enc.words.push(frames.len() as u64);
                for frame in frames {
                    enc.string(&frame.method);
                    enc.words.push(frame.pc as u64);
                    enc.words.push(frame.slots.len() as u64);
                    for v in &frame.slots {
                        enc.value(v)?;
                    }
                }
            }
            enc.words
                .push(state.current_thread().map_or(0, |t| t.0 as u64 + 1));
        }

        enc.words.push(SECTION_HEAP);
        while let Some(r) = enc.queue.pop_front() {
            let obj = state.heap().object(r)?;
            enc.words.push(obj.class.0 as u64);
            match obj.kind {
                ObjectKind::Array => {
                    enc.words.push(1);
                    enc.words.push(obj.slots.len() as u64);
                    for v in obj.slots.iter() {
                        enc.value(v)?;
                    }
                }
                ObjectKind::Instance => {
                    enc.words.push(0);
                    let layout = self.instance_layout(state, obj.class)?;
                    enc.words.push(layout.len() as u64);
                    for &i in layout {
                        enc.value(obj.slot(i)?)?;
                    }
                }
            }
        }

        trace!(
            words = enc.words.len(),
            objects = enc.canon.len(),
            "serialized state"
        );
        Ok(CanonicalForm::new(enc.words))
    }

    fn layout(&mut self, state: &ProgramState, id: ClassId) -> StateResult<&(Vec<usize>, Vec<usize>)> {
        let idx = id.index();
        if self.layouts.len() <= idx {
            self.layouts.resize(idx + 1, None);
        }
        if self.layouts[idx].is_none() {
            let info = state.classes().info(id)?;
            let keep = |fields: &[FieldInfo]| -> Vec<usize> {
                fields
                    .iter()
                    .enumerate()
                    .filter(|(_, f)| !self.config.filter.is_filtered(info, f))
                    .map(|(i, _)| i)
                    .collect()
            };
            let inst = keep(&info.instance_fields);
            let stat = keep(&info.static_fields);
            self.layouts[idx] = Some((inst, stat));
        }
        self.layouts[idx]
            .as_ref()
            .ok_or(StateError::UnknownClassId(id))
    }

    fn instance_layout(&mut self, state: &ProgramState, id: ClassId) -> StateResult<&[usize]> {
        Ok(&self.layout(state, id)?.0)
    }

    fn static_layout(&mut self, state: &ProgramState, id: ClassId) -> StateResult<&[usize]> {
        Ok(&self.layout(state, id)?.1)
    }
}

struct Encoder<'s> {
    words: Vec<u64>,
    /// Raw reference -> canonical index (1-based).
    canon: AHashMap<ObjRef, u64>,
    queue: VecDeque<ObjRef>,
    state: &'s ProgramState,
}

impl Encoder<'_> {
    fn value(&mut self, v: &Value) -> StateResult<()> {
        match v {
            Value::Null => self.words.push(TAG_NULL),
            Value::Int(n) => {
                self.words.push(TAG_INT);
                self.words.push(*n as u64);
            }
            Value::Bool(b) => {
                self.words.push(TAG_BOOL);
                self.words.push(*b as u64);
            }
            Value::Double(d) => {
                self.words.push(TAG_DOUBLE);
                self.words
                    .push(if d.is_nan() { CANONICAL_NAN } else { d.to_bits() });
            }
            Value::Ref(r) => {
                let idx = self.discover(*r)?;
                self.words.push(TAG_REF);
                self.words.push(idx);
            }
            Value::Str(s) => {
                self.words.push(TAG_STR);
                self.string(s);
            }
        }
        Ok(())
    }

    /// Length followed by the bytes packed little-endian into words.
    fn string(&mut self, s: &str) {
        let bytes = s.as_bytes();
        self.words.push(bytes.len() as u64);
        for chunk in bytes.chunks(8) {
            let mut buf = [0u8; 8];
            buf[..chunk.len()].copy_from_slice(chunk);
            self.words.push(u64::from_le_bytes(buf));
        }
    }

    /// Number an object on first sight and queue it for its fields.
    fn discover(&mut self, r: ObjRef) -> StateResult<u64> {
        if let Some(&idx) = self.canon.get(&r) {
            return Ok(idx);
        }
        if !self.state.heap().contains(r) {
            return Err(StateError::DanglingReference(r));
        }
        let idx = self.canon.len() as u64 + 1;
        self.canon.insert(r, idx);
        self.queue.push_back(r);
        Ok(idx)
    }
}
