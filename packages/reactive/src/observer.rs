//! Observed objects and arrays.
//!
//! Every observed value carries hidden metadata: its reactive path and a weak
//! handle to the [`Reactor`] it publishes to. Reads of tracked properties
//! record `<path>.<key>` (objects) or `<path>[<id>]` (array elements, keyed
//! by a per-element id that survives reordering). Writes publish to the same
//! paths.

use crate::error::ReactiveResult;
use crate::record::{Change, Reactor, ReactorHandle, Tag};
use crate::value::Value;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::rc::Rc;
use tracing::warn;

/// Keys starting with this prefix are never tracked
pub const PRIVATE_PREFIX: char = '$';

pub fn is_private(key: &str) -> bool {
    key.starts_with(PRIVATE_PREFIX)
}

pub fn child_path(parent: &str, key: &str) -> String {
    format!("{}.{}", parent, key)
}

pub fn element_path(parent: &str, id: u64) -> String {
    format!("{}[{}]", parent, id)
}

#[derive(Clone)]
struct Meta {
    path: String,
    reactor: ReactorHandle,
}

impl Meta {
    fn live(&self) -> Option<(Rc<Reactor>, &str)> {
        self.reactor.upgrade().map(|r| (r, self.path.as_str()))
    }
}

/// Computed property, evaluated on every read
pub type Getter = Rc<dyn Fn(&ObjectRef) -> Value>;

#[derive(Default)]
struct ObjectData {
    props: IndexMap<String, Value>,
    getters: IndexMap<String, Getter>,
    frozen: HashSet<String>,
    meta: Option<Meta>,
}

/// Shared, optionally observed object
#[derive(Clone, Default)]
pub struct ObjectRef(Rc<RefCell<ObjectData>>);

impl ObjectRef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Reactive path, once observed
    pub fn path(&self) -> Option<String> {
        self.0.borrow().meta.as_ref().map(|m| m.path.clone())
    }

    pub fn is_observed(&self) -> bool {
        self.0
            .borrow()
            .meta
            .as_ref()
            .is_some_and(|m| m.reactor.strong_count() > 0)
    }

    /// Tracked read. Missing keys are recorded too, so a later definition re-renders.
    pub fn get(&self, key: &str) -> Value {
        let (value, getter, meta) = {
            let data = self.0.borrow();
            let value = data.props.get(key).cloned().unwrap_or_default();
            let tracked = !is_private(key)
                && !data.frozen.contains(key)
                && !matches!(value, Value::Function(_));
            let meta = if tracked { data.meta.clone() } else { None };
            (value, data.getters.get(key).cloned(), meta)
        };

        if let Some((reactor, path)) = meta.as_ref().and_then(Meta::live) {
            if reactor.is_recording() {
                reactor.record(&child_path(path, key));
            }
        }

        match getter {
            Some(getter) => getter(self),
            None => value,
        }
    }

    /// Untracked read
    pub fn peek(&self, key: &str) -> Value {
        self.0.borrow().props.get(key).cloned().unwrap_or_default()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        let data = self.0.borrow();
        data.props.contains_key(key) || data.getters.contains_key(key)
    }

    /// Own keys in insertion order; records the object's own path
    pub fn keys(&self) -> Vec<String> {
        self.track_self();
        self.0.borrow().props.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Untracked copy of all entries
    pub fn snapshot(&self) -> Vec<(String, Value)> {
        self.0
            .borrow()
            .props
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn track_self(&self) {
        let meta = self.0.borrow().meta.clone();
        if let Some((reactor, path)) = meta.as_ref().and_then(Meta::live) {
            if reactor.is_recording() {
                reactor.record(path);
            }
        }
    }

    /// Define a computed property
    pub fn define_getter(&self, key: &str, getter: impl Fn(&ObjectRef) -> Value + 'static) {
        self.0
            .borrow_mut()
            .getters
            .insert(key.to_string(), Rc::new(getter));
    }

    /// Make a key non-configurable: reads are untracked and writes are ignored
    pub fn freeze(&self, key: &str) {
        self.0.borrow_mut().frozen.insert(key.to_string());
    }

    pub fn set(&self, key: &str, value: Value) -> ReactiveResult<()> {
        self.set_tagged(key, value, None)
    }

    /// Write and publish. Replacing an object or array re-publishes every
    /// subscribed descendant path still reachable in the new value.
    pub fn set_tagged(&self, key: &str, value: Value, tag: Option<Tag>) -> ReactiveResult<()> {
        let (old, existed, meta) = {
            let mut data = self.0.borrow_mut();
            if data.frozen.contains(key) {
                warn!(key, "write to a frozen property ignored");
                return Ok(());
            }
            let existed = data.props.contains_key(key);
            let old = data.props.get(key).cloned().unwrap_or_default();
            if existed && old.same_value(&value) {
                return Ok(());
            }
            data.props.insert(key.to_string(), value.clone());
            (old, existed, data.meta.clone())
        };

        if is_private(key) || matches!(value, Value::Function(_)) {
            return Ok(());
        }
        let Some((reactor, path)) = meta.as_ref().and_then(Meta::live) else {
            return Ok(());
        };

        let key_path = child_path(path, key);
        observe(&value, &key_path, &reactor);

        let mut changes = vec![Change::new(key_path.clone(), value.clone(), old.clone(), tag)];
        if is_container(&old) || is_container(&value) {
            for sub in reactor.subscribed_paths_under(&key_path) {
                let relative = &sub[key_path.len()..];
                let Some(new_leaf) = resolve_relative(&value, relative) else {
                    continue;
                };
                let old_leaf = resolve_relative(&old, relative).unwrap_or_default();
                if !new_leaf.same_value(&old_leaf) {
                    changes.push(Change::new(sub, new_leaf, old_leaf, tag));
                }
            }
        }
        if !existed {
            let own = Value::Object(self.clone());
            changes.push(Change::new(path, own.clone(), own, tag));
        }

        reactor.notify(changes)
    }

    /// Remove a key and publish its path and the object's own path
    pub fn delete(&self, key: &str) -> ReactiveResult<Option<Value>> {
        let (removed, meta) = {
            let mut data = self.0.borrow_mut();
            if data.frozen.contains(key) {
                warn!(key, "delete of a frozen property ignored");
                return Ok(None);
            }
            (data.props.shift_remove(key), data.meta.clone())
        };

        let Some(old) = removed else {
            return Ok(None);
        };
        if let Some((reactor, path)) = meta.as_ref().and_then(Meta::live) {
            if !is_private(key) {
                let own = Value::Object(self.clone());
                reactor.notify(vec![
                    Change::new(child_path(path, key), Value::Undefined, old.clone(), None),
                    Change::new(path, own.clone(), own, None),
                ])?;
            }
        }
        Ok(Some(old))
    }

    fn attach(&self, path: &str, reactor: &ReactorHandle, seen: &mut HashSet<usize>) {
        let children: Vec<(String, Value)> = {
            let mut data = self.0.borrow_mut();
            data.meta = Some(Meta {
                path: path.to_string(),
                reactor: reactor.clone(),
            });
            data.props
                .iter()
                .filter(|(k, v)| {
                    !is_private(k) && !data.frozen.contains(*k) && !matches!(v, Value::Function(_))
                })
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        };

        for (key, value) in children {
            attach_value(&value, &child_path(path, &key), reactor, seen);
        }
    }

    fn address(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl FromIterator<(String, Value)> for ObjectRef {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(entries: I) -> Self {
        let obj = Self::new();
        obj.0.borrow_mut().props.extend(entries);
        obj
    }
}

#[derive(Default)]
struct ArrayData {
    items: Vec<Value>,
    /// Parallel to `items`
    ids: Vec<u64>,
    /// Last id handed out while the array is not observed
    local_id: u64,
    meta: Option<Meta>,
}

impl ArrayData {
    /// Ids come from the reactor once observed, from a per-array counter before
    fn fresh_ids(&mut self, count: usize) -> Vec<u64> {
        let reactor = self.meta.as_ref().and_then(|m| m.reactor.upgrade());
        match reactor {
            Some(reactor) => (0..count).map(|_| reactor.next_element_id()).collect(),
            None => {
                // stay clear of ids handed out by a reactor that is gone
                let highest = self.ids.iter().copied().max().unwrap_or(0);
                self.local_id = self.local_id.max(highest);
                (0..count)
                    .map(|_| {
                        self.local_id += 1;
                        self.local_id
                    })
                    .collect()
            }
        }
    }
}

/// Shared, optionally observed array with stable per-element ids
#[derive(Clone, Default)]
pub struct ArrayRef(Rc<RefCell<ArrayData>>);

impl ArrayRef {
    pub fn new(items: Vec<Value>) -> Self {
        let mut data = ArrayData::default();
        data.ids = data.fresh_ids(items.len());
        data.items = items;
        Self(Rc::new(RefCell::new(data)))
    }

    pub fn ptr_eq(&self, other: &ArrayRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn path(&self) -> Option<String> {
        self.0.borrow().meta.as_ref().map(|m| m.path.clone())
    }

    /// Reactive path of the element with `id`
    pub fn element_path(&self, id: u64) -> Option<String> {
        self.path().map(|p| element_path(&p, id))
    }

    /// Tracked length (records the array's own path)
    pub fn len(&self) -> usize {
        self.track_self();
        self.0.borrow().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tracked element read (records the element path)
    pub fn get(&self, index: usize) -> Value {
        let (value, id, meta) = {
            let data = self.0.borrow();
            match data.items.get(index) {
                Some(value) => (value.clone(), data.ids[index], data.meta.clone()),
                None => return Value::Undefined,
            }
        };
        if let Some((reactor, path)) = meta.as_ref().and_then(Meta::live) {
            if reactor.is_recording() {
                reactor.record(&element_path(path, id));
            }
        }
        value
    }

    /// Tracked `(id, value)` pairs in order (records the array's own path)
    pub fn entries(&self) -> Vec<(u64, Value)> {
        self.track_self();
        let data = self.0.borrow();
        data.ids
            .iter()
            .copied()
            .zip(data.items.iter().cloned())
            .collect()
    }

    /// Untracked copy of the elements
    pub fn snapshot(&self) -> Vec<Value> {
        self.0.borrow().items.clone()
    }

    /// Untracked copy of the element ids
    pub fn ids(&self) -> Vec<u64> {
        self.0.borrow().ids.clone()
    }

    pub fn index_of_id(&self, id: u64) -> Option<usize> {
        self.0.borrow().ids.iter().position(|i| *i == id)
    }

    fn track_self(&self) {
        let meta = self.0.borrow().meta.clone();
        if let Some((reactor, path)) = meta.as_ref().and_then(Meta::live) {
            if reactor.is_recording() {
                reactor.record(path);
            }
        }
    }

    pub fn push(&self, items: Vec<Value>) -> ReactiveResult<usize> {
        let len = self.0.borrow().items.len();
        self.splice(len as i64, 0, items)?;
        Ok(self.0.borrow().items.len())
    }

    pub fn pop(&self) -> ReactiveResult<Value> {
        let len = self.0.borrow().items.len();
        if len == 0 {
            return Ok(Value::Undefined);
        }
        Ok(self
            .splice(len as i64 - 1, 1, Vec::new())?
            .pop()
            .unwrap_or_default())
    }

    pub fn shift(&self) -> ReactiveResult<Value> {
        if self.0.borrow().items.is_empty() {
            return Ok(Value::Undefined);
        }
        Ok(self
            .splice(0, 1, Vec::new())?
            .into_iter()
            .next()
            .unwrap_or_default())
    }

    pub fn unshift(&self, items: Vec<Value>) -> ReactiveResult<usize> {
        self.splice(0, 0, items)?;
        Ok(self.0.borrow().items.len())
    }

    /// Remove `delete_count` elements at `start` (negative counts from the end)
    /// and insert `items` there; inserted elements get fresh ids
    pub fn splice(&self, start: i64, delete_count: usize, items: Vec<Value>) -> ReactiveResult<Vec<Value>> {
        let (removed, inserted, meta) = {
            let mut data = self.0.borrow_mut();
            let len = data.items.len() as i64;
            let start = if start < 0 {
                (len + start).max(0)
            } else {
                start.min(len)
            } as usize;
            let end = (start + delete_count).min(data.items.len());

            let new_ids = data.fresh_ids(items.len());
            let inserted: Vec<(u64, Value)> = new_ids.iter().copied().zip(items.iter().cloned()).collect();
            let removed: Vec<Value> = data.items.splice(start..end, items).collect();
            let _ = data.ids.splice(start..end, new_ids);
            (removed, inserted, data.meta.clone())
        };

        if let Some((reactor, path)) = meta.as_ref().and_then(Meta::live) {
            for (id, value) in &inserted {
                observe(value, &element_path(path, *id), &reactor);
            }
            if !removed.is_empty() || !inserted.is_empty() {
                self.publish_self(&reactor, path)?;
            }
        }
        Ok(removed)
    }

    /// Sort by string form, undefined last
    pub fn sort(&self) -> ReactiveResult<()> {
        self.sort_by(|a, b| match (a, b) {
            (Value::Undefined, Value::Undefined) => Ordering::Equal,
            (Value::Undefined, _) => Ordering::Greater,
            (_, Value::Undefined) => Ordering::Less,
            _ => a.to_string().cmp(&b.to_string()),
        })
    }

    /// Stable sort; element ids move with their elements
    pub fn sort_by(&self, mut compare: impl FnMut(&Value, &Value) -> Ordering) -> ReactiveResult<()> {
        self.permute(|pairs| pairs.sort_by(|(_, a), (_, b)| compare(a, b)))
    }

    pub fn reverse(&self) -> ReactiveResult<()> {
        self.permute(|pairs| pairs.reverse())
    }

    fn permute(&self, f: impl FnOnce(&mut Vec<(u64, Value)>)) -> ReactiveResult<()> {
        let (changed, meta) = {
            let mut data = self.0.borrow_mut();
            let before = data.ids.clone();
            let mut pairs: Vec<(u64, Value)> = data
                .ids
                .iter()
                .copied()
                .zip(data.items.iter().cloned())
                .collect();
            f(&mut pairs);
            let (ids, items): (Vec<u64>, Vec<Value>) = pairs.into_iter().unzip();
            data.ids = ids;
            data.items = items;
            (data.ids != before, data.meta.clone())
        };

        match meta.as_ref().and_then(Meta::live) {
            Some((reactor, path)) if changed => self.publish_self(&reactor, path),
            _ => Ok(()),
        }
    }

    /// Reactive index assignment; the element keeps its id
    pub fn set_index(&self, index: usize, value: Value) -> ReactiveResult<()> {
        self.set_index_tagged(index, value, None)
    }

    /// [`ArrayRef::set_index`] carrying a write tag on the element change
    pub fn set_index_tagged(&self, index: usize, value: Value, tag: Option<Tag>) -> ReactiveResult<()> {
        let len = self.0.borrow().items.len();
        if index >= len {
            let mut fill = vec![Value::Undefined; index - len];
            fill.push(value);
            return self.push(fill).map(|_| ());
        }

        let (id, old, meta) = {
            let mut data = self.0.borrow_mut();
            let old = std::mem::replace(&mut data.items[index], value.clone());
            if old.same_value(&value) {
                return Ok(());
            }
            (data.ids[index], old, data.meta.clone())
        };

        let Some((reactor, path)) = meta.as_ref().and_then(Meta::live) else {
            return Ok(());
        };
        let elem_path = element_path(path, id);
        observe(&value, &elem_path, &reactor);
        let own = Value::Array(self.clone());
        reactor.notify(vec![
            Change::new(elem_path, value, old, tag),
            Change::new(path, own.clone(), own, tag),
        ])
    }

    fn publish_self(&self, reactor: &Rc<Reactor>, path: &str) -> ReactiveResult<()> {
        let own = Value::Array(self.clone());
        reactor.notify(vec![Change::new(path, own.clone(), own, None)])
    }

    fn attach(&self, path: &str, reactor: &ReactorHandle, seen: &mut HashSet<usize>) {
        let children: Vec<(u64, Value)> = {
            let mut data = self.0.borrow_mut();
            data.meta = Some(Meta {
                path: path.to_string(),
                reactor: reactor.clone(),
            });
            // local ids may repeat across arrays; paths under one reactor must not
            let count = data.items.len();
            data.ids = data.fresh_ids(count);
            data.ids
                .iter()
                .copied()
                .zip(data.items.iter().cloned())
                .collect()
        };

        for (id, value) in children {
            attach_value(&value, &element_path(path, id), reactor, seen);
        }
    }

    fn address(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

/// Make `value` reactive under `path`.
///
/// Values that are already observed keep their path; primitives are returned
/// unchanged with a warning.
pub fn observe(value: &Value, path: &str, reactor: &Rc<Reactor>) -> Value {
    match value {
        Value::Object(_) | Value::Array(_) => {
            attach_value(value, path, &Rc::downgrade(reactor), &mut HashSet::new());
        }
        _ => {
            tracing::debug!(path, kind = value.type_of(), "observe skipped a non-object value");
        }
    }
    value.clone()
}

/// Like [`observe`] but warns when handed a primitive
pub fn observe_root(value: &Value, root_id: &str, reactor: &Rc<Reactor>) -> Value {
    if !is_container(value) {
        warn!(root_id, kind = value.type_of(), "cannot observe a non-object value");
        return value.clone();
    }
    observe(value, root_id, reactor)
}

fn attach_value(value: &Value, path: &str, reactor: &ReactorHandle, seen: &mut HashSet<usize>) {
    match value {
        Value::Object(obj) => {
            if obj.is_observed() || !seen.insert(obj.address()) {
                return;
            }
            obj.attach(path, reactor, seen);
        }
        Value::Array(arr) => {
            let observed = arr
                .0
                .borrow()
                .meta
                .as_ref()
                .is_some_and(|m| m.reactor.strong_count() > 0);
            if observed || !seen.insert(arr.address()) {
                return;
            }
            arr.attach(path, reactor, seen);
        }
        _ => {}
    }
}

/// Walk `.key` / `[id]` segments below a value without tracking
fn resolve_relative(value: &Value, relative: &str) -> Option<Value> {
    let mut current = value.clone();
    let mut rest = relative;

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('.') {
            let end = after.find(&['.', '['][..]).unwrap_or(after.len());
            let key = &after[..end];
            current = match &current {
                Value::Object(obj) if obj.contains_key(key) => obj.peek(key),
                _ => return None,
            };
            rest = &after[end..];
        } else if let Some(after) = rest.strip_prefix('[') {
            let end = after.find(']')?;
            let id: u64 = after[..end].parse().ok()?;
            current = match &current {
                Value::Array(arr) => {
                    let index = arr.index_of_id(id)?;
                    arr.snapshot().into_iter().nth(index)?
                }
                _ => return None,
            };
            rest = &after[end + 1..];
        } else {
            return None;
        }
    }

    Some(current)
}
