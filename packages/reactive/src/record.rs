//! Dependency tracking and change notification.
//!
//! A [`Reactor`] owns the notification bus (reactive path → subscribed
//! handlers) and the recording slot. While a watcher evaluates, every reactive
//! read calls [`Reactor::record`], which subscribes the active handler to the
//! read path and remembers the subscription in the owning node's [`Bucket`].
//!
//! Subscriptions are rebuilt on every run: paths read in the previous run but
//! not in the current one are dropped when the recording is reset, paths read
//! in both keep their position on the bus.

use crate::error::{ReactiveError, ReactiveResult};
use crate::observer::observe;
use crate::value::Value;
use indexmap::IndexMap;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};
use tracing::{debug, trace};

/// Maximum nesting of writes triggered from inside watchers
pub const MAX_BROADCAST_DEPTH: usize = 64;

pub type HandlerId = u64;

/// Marker attached to a write so its originator can ignore the echo
pub type Tag = u64;

/// A published write
#[derive(Debug, Clone)]
pub struct Change {
    pub path: String,
    pub new: Value,
    pub old: Value,
    pub tag: Option<Tag>,
}

impl Change {
    pub fn new(path: impl Into<String>, new: Value, old: Value, tag: Option<Tag>) -> Self {
        Self {
            path: path.into(),
            new,
            old,
            tag,
        }
    }
}

pub type Callback = Rc<dyn Fn(Option<&Change>)>;

struct HandlerEntry {
    callback: Callback,
    running: Cell<bool>,
}

#[derive(Default)]
struct BucketData {
    subscriptions: Vec<(String, HandlerId)>,
    handlers: Vec<HandlerId>,
}

/// Unsubscribe list of one node for one directive or attribute
#[derive(Clone, Default)]
pub struct Bucket(Rc<RefCell<BucketData>>);

impl Bucket {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(path, handler)` pairs currently subscribed through this bucket
    pub fn subscriptions(&self) -> Vec<(String, HandlerId)> {
        self.0.borrow().subscriptions.clone()
    }

    pub fn is_empty(&self) -> bool {
        let data = self.0.borrow();
        data.subscriptions.is_empty() && data.handlers.is_empty()
    }
}

/// The active recording: which handler is listening, and what it read so far
struct Record {
    bucket: Bucket,
    events: HashSet<String>,
    handler: HandlerId,
}

pub struct Reactor {
    bus: RefCell<IndexMap<String, Vec<HandlerId>>>,
    handlers: RefCell<HashMap<HandlerId, Rc<HandlerEntry>>>,
    /// Top of the stack is the armed slot; `None` marks an untracked section
    records: RefCell<Vec<Option<Record>>>,
    next_handler: Cell<HandlerId>,
    next_root: Cell<u64>,
    next_element: Cell<u64>,
    depth: Cell<usize>,
    /// First error raised by a write nested inside a broadcast
    failure: RefCell<Option<ReactiveError>>,
}

impl Reactor {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            bus: RefCell::new(IndexMap::new()),
            handlers: RefCell::new(HashMap::new()),
            records: RefCell::new(Vec::new()),
            next_handler: Cell::new(1),
            next_root: Cell::new(1),
            next_element: Cell::new(1),
            depth: Cell::new(0),
            failure: RefCell::new(None),
        })
    }

    /// Observe `value` under `path`; see [`observe`]
    pub fn observe(self: &Rc<Self>, value: &Value, path: &str) -> Value {
        observe(value, path, self)
    }

    /// Fresh root id for a scope or view (`<prefix><n>`)
    pub fn unique_root(&self, prefix: &str) -> String {
        let n = self.next_root.get();
        self.next_root.set(n + 1);
        format!("{}{}", prefix, n)
    }

    /// Fresh id for an element of an array observed by this reactor
    pub fn next_element_id(&self) -> u64 {
        let id = self.next_element.get();
        self.next_element.set(id + 1);
        id
    }

    // Recording

    /// Arm the slot; a recording already in progress is suspended until [`Reactor::reset`]
    pub fn start(&self, bucket: &Bucket, handler: HandlerId) {
        self.records.borrow_mut().push(Some(Record {
            bucket: bucket.clone(),
            events: HashSet::new(),
            handler,
        }));
    }

    /// Disarm the slot, dropping subscriptions the handler no longer reads
    pub fn reset(&self) {
        let Some(Some(record)) = self.records.borrow_mut().pop() else {
            return;
        };

        let mut stale = Vec::new();
        record.bucket.0.borrow_mut().subscriptions.retain(|(path, id)| {
            if *id != record.handler || record.events.contains(path) {
                return true;
            }
            stale.push(path.clone());
            false
        });

        if !stale.is_empty() {
            let mut bus = self.bus.borrow_mut();
            for path in stale {
                trace!(path = %path, handler = record.handler, "dropping stale subscription");
                unsubscribe_path(&mut bus, &path, record.handler);
            }
        }
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.records.borrow().last(), Some(Some(_)))
    }

    /// Subscribe the armed handler to `path`
    pub fn record(&self, path: &str) {
        let mut records = self.records.borrow_mut();
        let Some(Some(record)) = records.last_mut() else {
            return;
        };
        if !record.events.insert(path.to_string()) {
            return;
        }

        let handler = record.handler;
        let mut bucket = record.bucket.0.borrow_mut();
        let already = bucket
            .subscriptions
            .iter()
            .any(|(p, id)| *id == handler && p == path);
        if !already {
            bucket.subscriptions.push((path.to_string(), handler));
            self.bus
                .borrow_mut()
                .entry(path.to_string())
                .or_default()
                .push(handler);
        }
    }

    /// Run `f` with recording suspended
    pub fn untracked<T>(&self, f: impl FnOnce() -> T) -> T {
        self.records.borrow_mut().push(None);
        let result = f();
        self.records.borrow_mut().pop();
        result
    }

    // Handlers

    fn allocate_handler(&self) -> HandlerId {
        let id = self.next_handler.get();
        self.next_handler.set(id + 1);
        id
    }

    fn install(&self, id: HandlerId, callback: Callback) {
        self.handlers.borrow_mut().insert(
            id,
            Rc::new(HandlerEntry {
                callback,
                running: Cell::new(false),
            }),
        );
    }

    /// Install a watcher and run it once.
    ///
    /// `compute` runs with recording armed; `render` receives its result (and
    /// the triggering change, `None` on the first run) with recording suspended.
    pub fn watch<T: 'static>(
        self: &Rc<Self>,
        bucket: &Bucket,
        compute: impl Fn() -> T + 'static,
        render: impl Fn(T, Option<&Change>) + 'static,
    ) -> HandlerId {
        let id = self.allocate_handler();
        let reactor = Rc::downgrade(self);
        let own_bucket = bucket.clone();

        let callback: Callback = Rc::new(move |change| {
            let Some(reactor) = reactor.upgrade() else {
                return;
            };
            reactor.start(&own_bucket, id);
            let value = compute();
            reactor.reset();
            reactor.untracked(|| render(value, change));
        });

        bucket.0.borrow_mut().handlers.push(id);
        self.install(id, callback);
        if let Err(err) = self.invoke(id, None) {
            debug!(handler = id, error = %err, "initial watcher run failed");
        }
        id
    }

    /// Subscribe a callback directly to one path, outside any recording
    pub fn subscribe(&self, path: &str, callback: impl Fn(&Change) + 'static) -> HandlerId {
        let id = self.allocate_handler();
        self.install(
            id,
            Rc::new(move |change: Option<&Change>| {
                if let Some(change) = change {
                    callback(change);
                }
            }),
        );
        self.bus
            .borrow_mut()
            .entry(path.to_string())
            .or_default()
            .push(id);
        id
    }

    /// Remove a handler from every path and forget it
    pub fn unsubscribe(&self, id: HandlerId) {
        self.handlers.borrow_mut().remove(&id);
        let mut bus = self.bus.borrow_mut();
        bus.retain(|_, ids| {
            ids.retain(|h| *h != id);
            !ids.is_empty()
        });
    }

    /// Unsubscribe and forget everything installed through `bucket`
    pub fn dispose_bucket(&self, bucket: &Bucket) {
        let data = std::mem::take(&mut *bucket.0.borrow_mut());
        {
            let mut bus = self.bus.borrow_mut();
            for (path, id) in &data.subscriptions {
                unsubscribe_path(&mut bus, path, *id);
            }
        }
        let mut handlers = self.handlers.borrow_mut();
        for id in data.handlers {
            handlers.remove(&id);
        }
    }

    /// Run an installed handler outside of any write
    pub fn rerun(&self, id: HandlerId) -> ReactiveResult<()> {
        self.invoke(id, None)
    }

    fn invoke(&self, id: HandlerId, change: Option<&Change>) -> ReactiveResult<()> {
        let Some(entry) = self.handlers.borrow().get(&id).cloned() else {
            // disposed earlier in this broadcast
            return Ok(());
        };
        if entry.running.get() {
            let path = change.map(|c| c.path.clone()).unwrap_or_default();
            return Err(ReactiveError::reentrant(path));
        }

        entry.running.set(true);
        (entry.callback)(change);
        entry.running.set(false);
        Ok(())
    }

    // Broadcasting

    /// Publish changes in order; a handler reached through several of them runs once.
    ///
    /// Every subscriber runs even when another one fails. The first error,
    /// including one raised by a write made from inside a watcher, is returned
    /// to the outermost writer.
    pub fn notify(&self, changes: Vec<Change>) -> ReactiveResult<()> {
        let Some(first) = changes.first() else {
            return Ok(());
        };

        let depth = self.depth.get() + 1;
        let result = if depth > MAX_BROADCAST_DEPTH {
            Err(ReactiveError::depth_exceeded(
                first.path.clone(),
                MAX_BROADCAST_DEPTH,
            ))
        } else {
            self.depth.set(depth);
            let result = self.dispatch(&changes);
            self.depth.set(depth - 1);
            result
        };

        if depth > 1 {
            if let Err(err) = &result {
                self.failure.borrow_mut().get_or_insert_with(|| err.clone());
            }
            return result;
        }
        let nested = self.failure.borrow_mut().take();
        result.and(nested.map_or(Ok(()), Err))
    }

    fn dispatch(&self, changes: &[Change]) -> ReactiveResult<()> {
        let mut fired = HashSet::new();
        let mut first_error = None;

        for change in changes {
            let subscribers = self
                .bus
                .borrow()
                .get(&change.path)
                .cloned()
                .unwrap_or_default();
            trace!(path = %change.path, subscribers = subscribers.len(), "broadcast");

            for id in subscribers {
                if !fired.insert(id) {
                    continue;
                }
                if let Err(err) = self.invoke(id, Some(change)) {
                    debug!(handler = id, error = %err, "handler skipped");
                    first_error.get_or_insert(err);
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Subscribed paths strictly below `path` (`path.key…` or `path[id]…`)
    pub fn subscribed_paths_under(&self, path: &str) -> Vec<String> {
        self.bus
            .borrow()
            .iter()
            .filter(|(candidate, ids)| !ids.is_empty() && is_descendant(candidate, path))
            .map(|(candidate, _)| candidate.clone())
            .collect()
    }

    pub fn subscriber_count(&self, path: &str) -> usize {
        self.bus.borrow().get(path).map(Vec::len).unwrap_or(0)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.borrow().len()
    }
}

fn unsubscribe_path(bus: &mut IndexMap<String, Vec<HandlerId>>, path: &str, id: HandlerId) {
    if let Some(ids) = bus.get_mut(path) {
        ids.retain(|h| *h != id);
        if ids.is_empty() {
            bus.shift_remove(path);
        }
    }
}

fn is_descendant(candidate: &str, path: &str) -> bool {
    candidate.len() > path.len()
        && candidate.starts_with(path)
        && matches!(candidate.as_bytes()[path.len()], b'.' | b'[')
}

/// Weak handle used by observed values to reach their reactor
pub(crate) type ReactorHandle = Weak<Reactor>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_subscribes_once_per_path() {
        let reactor = Reactor::new();
        let bucket = Bucket::new();

        reactor.start(&bucket, 7);
        reactor.record("root.a");
        reactor.record("root.a");
        reactor.record("root.b");
        reactor.reset();

        assert_eq!(reactor.subscriber_count("root.a"), 1);
        assert_eq!(bucket.subscriptions().len(), 2);
        assert!(!reactor.is_recording());
    }

    #[test]
    fn test_nested_start_suspends_outer() {
        let reactor = Reactor::new();
        let outer = Bucket::new();
        let inner = Bucket::new();

        reactor.start(&outer, 1);
        reactor.record("root.outer");
        reactor.start(&inner, 2);
        reactor.record("root.inner");
        reactor.reset();
        reactor.record("root.after");
        reactor.reset();

        let outer_paths: Vec<_> = outer.subscriptions().into_iter().map(|(p, _)| p).collect();
        assert_eq!(outer_paths, vec!["root.outer", "root.after"]);
        assert_eq!(inner.subscriptions(), vec![("root.inner".to_string(), 2)]);
    }

    #[test]
    fn test_untracked_reads_are_ignored() {
        let reactor = Reactor::new();
        let bucket = Bucket::new();

        reactor.start(&bucket, 1);
        reactor.untracked(|| reactor.record("root.hidden"));
        reactor.reset();

        assert_eq!(reactor.subscriber_count("root.hidden"), 0);
    }

    #[test]
    fn test_stale_paths_dropped_on_rerun() {
        let reactor = Reactor::new();
        let bucket = Bucket::new();

        reactor.start(&bucket, 1);
        reactor.record("root.flag");
        reactor.record("root.a");
        reactor.reset();

        reactor.start(&bucket, 1);
        reactor.record("root.flag");
        reactor.record("root.b");
        reactor.reset();

        assert_eq!(reactor.subscriber_count("root.a"), 0);
        assert_eq!(reactor.subscriber_count("root.flag"), 1);
        assert_eq!(reactor.subscriber_count("root.b"), 1);
    }

    #[test]
    fn test_dispose_bucket_forgets_handlers() {
        let reactor = Reactor::new();
        let bucket = Bucket::new();
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();

        reactor.watch(
            &bucket,
            || (),
            move |_, _| counter.set(counter.get() + 1),
        );
        assert_eq!(runs.get(), 1);
        assert_eq!(reactor.handler_count(), 1);

        reactor.dispose_bucket(&bucket);
        assert_eq!(reactor.handler_count(), 0);
        assert!(bucket.is_empty());
    }

    #[test]
    fn test_descendant_matching() {
        assert!(is_descendant("root.x.y", "root.x"));
        assert!(is_descendant("root.x[3]", "root.x"));
        assert!(!is_descendant("root.xy", "root.x"));
        assert!(!is_descendant("root.x", "root.x"));
    }
}
