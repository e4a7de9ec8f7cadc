//! Shared state of one compiled tree.

use crate::compiler::Compiler;
use crate::dom::{Document, NodeId};
use crate::expression::CompiledExpression;
use crate::scheduler::Scheduler;
use crate::wrap::{NodeWrap, Wraps};
use futures::future::LocalBoxFuture;
use futures::FutureExt;
use indexmap::IndexMap;
use regex::Regex;
use sprig_common::{
    MemoryHistory, MemoryLoader, MemoryPackages, Navigator, PackageLoader, ResourceLoader,
    RuleCall, RuleRegistry, ServiceResult, StaticViewport, Viewport,
};
use sprig_reactive::{Change, ObjectRef, Reactor, Scope, Tag, Value};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};
use tracing::{debug, warn};

/// Default delay of `:model` writes and `:lazy` checks, in milliseconds
pub const DEFAULT_DEBOUNCE_MS: f64 = 50.0;

/// Collaborators the engine talks to
#[derive(Clone)]
pub struct Services {
    pub loader: Rc<dyn ResourceLoader>,
    pub packages: Rc<dyn PackageLoader>,
    pub navigator: Rc<dyn Navigator>,
    pub viewport: Rc<dyn Viewport>,
    pub rules: Rc<RuleRegistry>,
}

impl Services {
    /// In-memory services starting at `/` with an 800px viewport
    pub fn memory() -> Self {
        Self {
            loader: Rc::new(MemoryLoader::new()),
            packages: Rc::new(MemoryPackages::new()),
            navigator: Rc::new(MemoryHistory::new("/")),
            viewport: Rc::new(StaticViewport::new(800.0)),
            rules: Rc::new(RuleRegistry::new()),
        }
    }

    pub fn with_loader(mut self, loader: Rc<dyn ResourceLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_packages(mut self, packages: Rc<dyn PackageLoader>) -> Self {
        self.packages = packages;
        self
    }

    pub fn with_navigator(mut self, navigator: Rc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    pub fn with_viewport(mut self, viewport: Rc<dyn Viewport>) -> Self {
        self.viewport = viewport;
        self
    }

    pub fn with_rules(mut self, rules: RuleRegistry) -> Self {
        self.rules = Rc::new(rules);
        self
    }
}

impl Default for Services {
    fn default() -> Self {
        Self::memory()
    }
}

/// A `:validate` field
#[derive(Clone)]
pub(crate) struct Validator {
    pub node: NodeId,
    pub calls: Rc<Vec<RuleCall>>,
}

pub type Resource = LocalBoxFuture<'static, ServiceResult<()>>;

/// Everything directives need while compiling and afterwards, from watchers
pub struct Context {
    pub document: Document,
    pub compiler: Rc<Compiler>,
    pub reactor: Rc<Reactor>,
    pub scheduler: Rc<Scheduler>,
    pub services: Services,
    pub wraps: Wraps,
    location: ObjectRef,
    elements: RefCell<IndexMap<String, NodeId>>,
    validators: RefCell<Vec<Validator>>,
    resources: RefCell<Vec<Resource>>,
    /// Set once the view is ready; later resources are polled from frames
    live: Cell<bool>,
    pump_queued: Cell<bool>,
    routes: RefCell<HashMap<String, Option<Regex>>>,
    next_tag: Cell<Tag>,
    debounce_ms: Cell<f64>,
    this: Weak<Context>,
}

impl Context {
    pub fn new(compiler: Rc<Compiler>, services: Services) -> Rc<Self> {
        let reactor = Reactor::new();
        let location: ObjectRef = [(
            "href".to_string(),
            Value::String(services.navigator.location()),
        )]
        .into_iter()
        .collect();
        let root = reactor.unique_root("location");
        reactor.observe(&Value::Object(location.clone()), &root);

        Rc::new_cyclic(|this| Self {
            document: Document::new(),
            compiler,
            reactor,
            scheduler: Scheduler::new(),
            services,
            wraps: Wraps::default(),
            location,
            elements: RefCell::new(IndexMap::new()),
            validators: RefCell::new(Vec::new()),
            resources: RefCell::new(Vec::new()),
            live: Cell::new(false),
            pump_queued: Cell::new(false),
            routes: RefCell::new(HashMap::new()),
            next_tag: Cell::new(0),
            debounce_ms: Cell::new(DEFAULT_DEBOUNCE_MS),
            this: this.clone(),
        })
    }

    /// Handle for closures stored in the DOM or the reactor
    pub fn weak(&self) -> Weak<Context> {
        self.this.clone()
    }

    /// Fresh write tag for two-way bindings
    pub fn next_tag(&self) -> Tag {
        let tag = self.next_tag.get() + 1;
        self.next_tag.set(tag);
        tag
    }

    pub fn debounce_ms(&self) -> f64 {
        self.debounce_ms.get()
    }

    pub fn set_debounce_ms(&self, ms: f64) {
        self.debounce_ms.set(ms.max(0.0));
    }

    // Location

    /// Current location, recorded as a dependency of the running watcher
    pub fn location(&self) -> String {
        self.location.get("href").to_string()
    }

    pub fn peek_location(&self) -> String {
        self.location.peek("href").to_string()
    }

    pub fn set_location(&self, href: &str) {
        if let Err(err) = self.location.set("href", Value::from(href)) {
            warn!(href, error = %err, "location update failed");
        }
    }

    /// Cached compiled route regex; `None` for an invalid pattern
    pub(crate) fn route_regex(&self, pattern: &str) -> Option<Regex> {
        if let Some(cached) = self.routes.borrow().get(pattern) {
            return cached.clone();
        }
        let compiled = match Regex::new(pattern) {
            Ok(re) => Some(re),
            Err(err) => {
                warn!(pattern, error = %err, "invalid route pattern");
                None
            }
        };
        self.routes
            .borrow_mut()
            .insert(pattern.to_string(), compiled.clone());
        compiled
    }

    // Registries filled during compilation

    pub fn register_element(&self, name: &str, node: NodeId) {
        self.elements.borrow_mut().insert(name.to_string(), node);
    }

    pub fn element(&self, name: &str) -> Option<NodeId> {
        self.elements.borrow().get(name).copied()
    }

    pub fn element_names(&self) -> Vec<String> {
        self.elements.borrow().keys().cloned().collect()
    }

    pub(crate) fn add_validator(&self, validator: Validator) {
        self.validators.borrow_mut().push(validator);
    }

    pub fn validator_count(&self) -> usize {
        self.validators.borrow().len()
    }

    /// Validators of attached fields inside `root`
    pub(crate) fn validators_within(&self, root: NodeId) -> Vec<Validator> {
        self.validators
            .borrow()
            .iter()
            .filter(|v| self.document.contains(root, v.node))
            .cloned()
            .collect()
    }

    /// Queue a future the view waits on before it is ready. Once the view
    /// is ready the queue is polled on every animation frame instead.
    pub fn add_resource(&self, resource: Resource) {
        self.resources.borrow_mut().push(resource);
        if self.live.get() {
            self.schedule_pump();
        }
    }

    pub(crate) fn set_live(&self, live: bool) {
        self.live.set(live);
        if live && self.pending_resources() > 0 {
            self.schedule_pump();
        }
    }

    fn schedule_pump(&self) {
        if self.pump_queued.replace(true) {
            return;
        }
        let this = self.weak();
        self.scheduler.request_frame(move || {
            if let Some(ctx) = this.upgrade() {
                ctx.pump_resources();
            }
        });
    }

    /// Poll every queued resource once; unfinished ones wait for the next
    /// frame. Failures are logged since no load is waiting on them.
    pub fn pump_resources(&self) {
        self.pump_queued.set(false);
        let mut pending = self.take_resources();
        pending.retain_mut(|resource| match resource.as_mut().now_or_never() {
            Some(Ok(())) => false,
            Some(Err(err)) => {
                warn!(error = %err, "resource failed after the view was ready");
                false
            }
            None => true,
        });
        if !pending.is_empty() {
            debug!(count = pending.len(), "resources still pending");
        }
        {
            let mut queue = self.resources.borrow_mut();
            let added = std::mem::replace(&mut *queue, pending);
            queue.extend(added);
        }
        if self.live.get() && self.pending_resources() > 0 {
            self.schedule_pump();
        }
    }

    pub fn take_resources(&self) -> Vec<Resource> {
        std::mem::take(&mut *self.resources.borrow_mut())
    }

    pub fn pending_resources(&self) -> usize {
        self.resources.borrow().len()
    }

    // Watchers

    /// Install a watcher in the wrap's `key` bucket, or render once when the
    /// node is compiled `once`
    pub fn watch<T: 'static>(
        &self,
        wrap: &NodeWrap,
        key: &str,
        compute: impl Fn() -> T + 'static,
        render: impl Fn(T, Option<&Change>) + 'static,
    ) {
        if wrap.options().once {
            let value = self.reactor.untracked(&compute);
            render(value, None);
        } else {
            self.reactor.watch(&wrap.bucket(key), compute, render);
        }
    }

    /// Watch an expression's value
    pub fn watch_expression(
        &self,
        wrap: &NodeWrap,
        key: &str,
        compiled: Rc<CompiledExpression>,
        render: impl Fn(Value, Option<&Change>) + 'static,
    ) {
        let this = self.weak();
        let scope = wrap.scope();
        self.watch(
            wrap,
            key,
            move || match this.upgrade() {
                Some(ctx) => ctx.compiler.evaluate(&compiled, &scope),
                None => Value::Undefined,
            },
            render,
        );
    }

    /// Unsubscribe `node`'s subtree, forget its registrations and free its
    /// nodes. The ids must not be used afterwards.
    pub fn discard(&self, node: NodeId) {
        let dead: HashSet<NodeId> = self.document.descendants(node).into_iter().collect();
        self.wraps
            .dispose_subtree(&self.document, &self.reactor, node);
        self.validators
            .borrow_mut()
            .retain(|v| !dead.contains(&v.node));
        self.elements.borrow_mut().retain(|_, id| !dead.contains(id));
        self.document.release(node);
    }

    /// Evaluate an expression once, untracked
    pub fn peek(&self, compiled: &CompiledExpression, scope: &Scope) -> Value {
        self.reactor
            .untracked(|| self.compiler.evaluate(compiled, scope))
    }

    pub fn dispose(&self) {
        self.live.set(false);
        self.wraps.dispose_all(&self.reactor);
        self.validators.borrow_mut().clear();
        self.resources.borrow_mut().clear();
    }
}
