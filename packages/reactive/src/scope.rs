use crate::error::ReactiveResult;
use crate::observer::{observe, observe_root, ObjectRef};
use crate::record::{Reactor, Tag};
use crate::value::Value;
use std::rc::{Rc, Weak};

struct ScopeInner {
    vars: ObjectRef,
    parent: Option<Scope>,
    reactor: Weak<Reactor>,
}

/// Variables visible to expressions in a subtree.
///
/// Child scopes hold their own observed variables and fall through to the
/// parent for everything else.
#[derive(Clone)]
pub struct Scope(Rc<ScopeInner>);

impl Scope {
    /// Observe `data` under `root_id` and wrap it as a root scope
    pub fn root(reactor: &Rc<Reactor>, data: ObjectRef, root_id: &str) -> Self {
        observe_root(&Value::Object(data.clone()), root_id, reactor);
        Self(Rc::new(ScopeInner {
            vars: data,
            parent: None,
            reactor: Rc::downgrade(reactor),
        }))
    }

    /// Child scope with its own observed variables
    pub fn child(&self, vars: impl IntoIterator<Item = (String, Value)>) -> Self {
        let obj: ObjectRef = vars.into_iter().collect();
        if let Some(reactor) = self.0.reactor.upgrade() {
            let id = reactor.unique_root("$scope");
            observe(&Value::Object(obj.clone()), &id, &reactor);
        }
        Self(Rc::new(ScopeInner {
            vars: obj,
            parent: Some(self.clone()),
            reactor: self.0.reactor.clone(),
        }))
    }

    pub fn vars(&self) -> &ObjectRef {
        &self.0.vars
    }

    pub fn parent(&self) -> Option<&Scope> {
        self.0.parent.as_ref()
    }

    pub fn reactor(&self) -> Option<Rc<Reactor>> {
        self.0.reactor.upgrade()
    }

    pub fn root_scope(&self) -> Scope {
        let mut current = self.clone();
        while let Some(parent) = current.parent().cloned() {
            current = parent;
        }
        current
    }

    /// Nearest scope (self included) that declares `name`
    pub fn owner(&self, name: &str) -> Option<Scope> {
        let mut current = Some(self.clone());
        while let Some(scope) = current {
            if scope.0.vars.contains_key(name) {
                return Some(scope);
            }
            current = scope.parent().cloned();
        }
        None
    }

    pub fn has(&self, name: &str) -> bool {
        self.owner(name).is_some()
    }

    /// Tracked lookup through the parent chain. An unknown name is recorded
    /// on the root scope so that defining it later re-renders the reader.
    pub fn resolve(&self, name: &str) -> Value {
        match self.owner(name) {
            Some(scope) => scope.0.vars.get(name),
            None => self.root_scope().0.vars.get(name),
        }
    }

    /// Assign to the declaring scope, or define on the root scope
    pub fn assign(&self, name: &str, value: Value) -> ReactiveResult<()> {
        self.assign_tagged(name, value, None)
    }

    pub fn assign_tagged(&self, name: &str, value: Value, tag: Option<Tag>) -> ReactiveResult<()> {
        let target = self.owner(name).unwrap_or_else(|| self.root_scope());
        target.0.vars.set_tagged(name, value, tag)
    }

    /// Set a variable on this scope, shadowing any parent declaration
    pub fn define(&self, name: &str, value: Value) -> ReactiveResult<()> {
        self.0.vars.set(name, value)
    }
}
