//! Per-node compile state kept beside the DOM.

use crate::dom::{Document, NodeId};
use indexmap::IndexMap;
use sprig_reactive::{Bucket, Reactor, Scope};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::trace;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeOptions {
    /// Leave the rest of the node and its subtree alone
    pub skip: bool,
    /// Render once without installing watchers
    pub once: bool,
    /// Do not compile the children
    pub pre: bool,
    /// The node was taken out of the tree by a structural directive
    pub removed: bool,
}

/// Wrapper attached to every node the traverser touched
pub struct NodeWrap {
    id: u64,
    node: NodeId,
    options: Cell<NodeOptions>,
    scope: RefCell<Scope>,
    buckets: RefCell<IndexMap<String, Bucket>>,
    prevent_all: Cell<bool>,
    stop_all: Cell<bool>,
    /// Run once when the wrapper is disposed
    cleanups: RefCell<Vec<Box<dyn FnOnce()>>>,
}

impl NodeWrap {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn options(&self) -> NodeOptions {
        self.options.get()
    }

    pub fn update(&self, f: impl FnOnce(&mut NodeOptions)) {
        let mut options = self.options.get();
        f(&mut options);
        self.options.set(options);
    }

    /// Whether compilation of this node has to stop here
    pub fn halted(&self) -> bool {
        let options = self.options.get();
        options.skip || options.removed
    }

    pub fn scope(&self) -> Scope {
        self.scope.borrow().clone()
    }

    pub fn set_scope(&self, scope: Scope) {
        *self.scope.borrow_mut() = scope;
    }

    /// Subscription bucket for one directive or attribute, created on demand
    pub fn bucket(&self, name: &str) -> Bucket {
        self.buckets
            .borrow_mut()
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    pub fn bucket_names(&self) -> Vec<String> {
        self.buckets.borrow().keys().cloned().collect()
    }

    pub fn prevents_all(&self) -> bool {
        self.prevent_all.get()
    }

    pub fn set_prevent_all(&self) {
        self.prevent_all.set(true);
    }

    pub fn stops_all(&self) -> bool {
        self.stop_all.get()
    }

    pub fn set_stop_all(&self) {
        self.stop_all.set(true);
    }

    /// Release something owned by this node (a template, a scroll handler)
    /// when the node is discarded
    pub fn on_dispose(&self, cleanup: impl FnOnce() + 'static) {
        self.cleanups.borrow_mut().push(Box::new(cleanup));
    }

    fn dispose(&self, reactor: &Reactor) {
        let buckets: Vec<Bucket> = self.buckets.borrow_mut().drain(..).map(|(_, b)| b).collect();
        for bucket in buckets {
            reactor.dispose_bucket(&bucket);
        }
        let cleanups = std::mem::take(&mut *self.cleanups.borrow_mut());
        for cleanup in cleanups {
            cleanup();
        }
    }
}

/// Side table from DOM node to its wrapper
#[derive(Default)]
pub struct Wraps {
    table: RefCell<HashMap<NodeId, Rc<NodeWrap>>>,
    next_id: Cell<u64>,
}

impl Wraps {
    /// The node's wrapper, created with `scope` on first use
    pub fn wrap(&self, node: NodeId, scope: &Scope) -> Rc<NodeWrap> {
        if let Some(existing) = self.get(node) {
            return existing;
        }
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        let wrap = Rc::new(NodeWrap {
            id,
            node,
            options: Cell::new(NodeOptions::default()),
            scope: RefCell::new(scope.clone()),
            buckets: RefCell::new(IndexMap::new()),
            prevent_all: Cell::new(false),
            stop_all: Cell::new(false),
            cleanups: RefCell::new(Vec::new()),
        });
        self.table.borrow_mut().insert(node, wrap.clone());
        wrap
    }

    pub fn get(&self, node: NodeId) -> Option<Rc<NodeWrap>> {
        self.table.borrow().get(&node).cloned()
    }

    pub fn len(&self) -> usize {
        self.table.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unsubscribe every watcher of `node` and its descendants and forget their wrappers
    pub fn dispose_subtree(&self, document: &Document, reactor: &Reactor, node: NodeId) {
        for id in document.descendants(node) {
            let removed = self.table.borrow_mut().remove(&id);
            if let Some(wrap) = removed {
                trace!(node = id.0, wrap = wrap.id, "dispose wrap");
                wrap.dispose(reactor);
            }
        }
    }

    pub fn dispose_all(&self, reactor: &Reactor) {
        let table = std::mem::take(&mut *self.table.borrow_mut());
        for wrap in table.into_values() {
            wrap.dispose(reactor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprig_reactive::{ObjectRef, Value};

    #[test]
    fn test_wrap_once_per_node() {
        let reactor = Reactor::new();
        let scope = Scope::root(&reactor, ObjectRef::new(), "root");
        let doc = Document::new();
        let node = doc.create_element("div");

        let wraps = Wraps::default();
        let a = wraps.wrap(node, &scope);
        let b = wraps.wrap(node, &scope);
        assert_eq!(a.id(), b.id());
        assert_eq!(wraps.len(), 1);
    }

    #[test]
    fn test_dispose_subtree_unsubscribes() {
        let reactor = Reactor::new();
        let data: ObjectRef = [("n".to_string(), Value::from(1.0))].into_iter().collect();
        let scope = Scope::root(&reactor, data, "root");
        let doc = Document::new();
        let parent = doc.create_element("div");
        let child = doc.create_element("span");
        doc.append_child(parent, child);

        let wraps = Wraps::default();
        let wrap = wraps.wrap(child, &scope);
        let reader = scope.clone();
        reactor.watch(&wrap.bucket("text"), move || reader.resolve("n"), |_, _| {});
        assert_eq!(reactor.subscriber_count("root.n"), 1);

        wraps.dispose_subtree(&doc, &reactor, parent);
        assert_eq!(reactor.subscriber_count("root.n"), 0);
        assert!(wraps.is_empty());
    }

    #[test]
    fn test_cleanups_run_once_on_dispose() {
        let reactor = Reactor::new();
        let scope = Scope::root(&reactor, ObjectRef::new(), "root");
        let doc = Document::new();
        let node = doc.create_element("div");
        let runs = Rc::new(Cell::new(0));

        let wraps = Wraps::default();
        let counter = runs.clone();
        wraps
            .wrap(node, &scope)
            .on_dispose(move || counter.set(counter.get() + 1));

        wraps.dispose_subtree(&doc, &reactor, node);
        wraps.dispose_all(&reactor);
        assert_eq!(runs.get(), 1);
    }
}
