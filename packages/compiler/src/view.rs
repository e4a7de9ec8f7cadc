//! # View
//!
//! Top-level controller for one template. A view owns a [`Context`], the
//! root scope and the compiled fragment, and walks through its lifecycle in
//! [`View::load`]:
//!
//! ```text
//! Constructed → LoadingTemplate → LoadingDependencies → ScopeObserved → Compiled → Ready
//!                                                                              ↘ Failed
//! ```
//!
//! The template fetch, filter packages and model readiness are awaited
//! together. The view only reports `Ready` once every resource registered
//! while compiling (`:mount`, `:data`) has resolved, including resources
//! registered by subtrees those resources compiled in turn.
//!
//! Resources registered after that, by a branch an `:if` brings in or a new
//! `:for` item, are polled on each [`View::frame`]; [`View::settle`] awaits
//! them instead.
//!
//! Model reloads are sequenced per model: when a second reload starts before
//! the first one finished, the first one's result is dropped.

use crate::compiler::Compiler;
use crate::context::{Context, Services};
use crate::dom::{Document, NodeId};
use crate::error::{ViewError, ViewResult};
use crate::traverse;
use futures::future::{self, FutureExt, TryFutureExt};
use indexmap::IndexMap;
use sprig_common::{CacheOptions, FilterFn, Model, MountOptions, ServiceError, ServiceFuture};
use sprig_reactive::{ObjectRef, Scope, Value};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::{debug, error, info, instrument, warn};

/// Where the template markup comes from
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateSource {
    Inline(String),
    /// Fetched through the [`sprig_common::ResourceLoader`]
    Url(String),
}

#[derive(Clone)]
pub enum FilterSource {
    Inline(FilterFn),
    /// A package whose `filter()` is registered under the declared name
    Package(String),
}

/// Everything a view is constructed from
#[derive(Clone)]
pub struct ViewOptions {
    pub template: TemplateSource,
    /// Root scope data; must be an object
    pub data: Value,
    pub filters: Vec<(String, FilterSource)>,
    pub models: Vec<Rc<dyn Model>>,
}

impl ViewOptions {
    pub fn inline(template: impl Into<String>) -> Self {
        Self::new(TemplateSource::Inline(template.into()))
    }

    pub fn url(url: impl Into<String>) -> Self {
        Self::new(TemplateSource::Url(url.into()))
    }

    fn new(template: TemplateSource) -> Self {
        Self {
            template,
            data: Value::Object(ObjectRef::new()),
            filters: Vec::new(),
            models: Vec::new(),
        }
    }

    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.data = data.into();
        self
    }

    pub fn with_filter(mut self, name: &str, filter: impl Fn(&Value, &[Value]) -> Value + 'static) -> Self {
        self.filters
            .push((name.to_string(), FilterSource::Inline(Rc::new(filter))));
        self
    }

    pub fn with_filter_package(mut self, name: &str, url: impl Into<String>) -> Self {
        self.filters
            .push((name.to_string(), FilterSource::Package(url.into())));
        self
    }

    pub fn with_model(mut self, model: Rc<dyn Model>) -> Self {
        self.models.push(model);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    Constructed,
    LoadingTemplate,
    LoadingDependencies,
    ScopeObserved,
    Compiled,
    Ready,
    Failed,
}

struct ModelSlot {
    model: Rc<dyn Model>,
    sequence: Rc<Cell<u64>>,
}

pub struct View {
    context: Rc<Context>,
    options: RefCell<Option<ViewOptions>>,
    state: Cell<ViewState>,
    scope: RefCell<Option<Scope>>,
    root: Cell<Option<NodeId>>,
    models: RefCell<IndexMap<String, ModelSlot>>,
}

impl View {
    pub fn new(compiler: Rc<Compiler>, services: Services, options: ViewOptions) -> Self {
        Self {
            context: Context::new(compiler, services),
            options: RefCell::new(Some(options)),
            state: Cell::new(ViewState::Constructed),
            scope: RefCell::new(None),
            root: Cell::new(None),
            models: RefCell::new(IndexMap::new()),
        }
    }

    pub fn state(&self) -> ViewState {
        self.state.get()
    }

    fn set_state(&self, state: ViewState) {
        debug!(?state, "view state");
        self.state.set(state);
    }

    pub fn context(&self) -> &Rc<Context> {
        &self.context
    }

    pub fn document(&self) -> &Document {
        &self.context.document
    }

    /// Compiled fragment, once the template is parsed
    pub fn root(&self) -> Option<NodeId> {
        self.root.get()
    }

    pub fn scope(&self) -> Option<Scope> {
        self.scope.borrow().clone()
    }

    /// Run the whole lifecycle; on error the view is left `Failed` with
    /// whatever was compiled so far still in place
    #[instrument(skip(self))]
    pub async fn load(&self) -> ViewResult<()> {
        match self.run_load().await {
            Ok(()) => {
                self.set_state(ViewState::Ready);
                self.context.set_live(true);
                info!(elements = self.context.element_names().len(), "view ready");
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "view failed to load");
                self.set_state(ViewState::Failed);
                Err(err)
            }
        }
    }

    async fn run_load(&self) -> ViewResult<()> {
        let Some(options) = self.options.borrow_mut().take() else {
            warn!("view already loaded");
            return Ok(());
        };
        let ctx = &self.context;
        let ViewOptions {
            template,
            data,
            filters,
            models,
        } = options;

        self.set_state(ViewState::LoadingTemplate);
        let text: ServiceFuture<String> = match template {
            TemplateSource::Inline(text) => future::ready(Ok(text)).boxed_local(),
            TemplateSource::Url(url) => ctx.services.loader.fetch_text(&url, CacheOptions::default()),
        };

        self.set_state(ViewState::LoadingDependencies);
        let filters = future::try_join_all(filters.into_iter().map(|(name, source)| self.load_filter(name, source)));
        let ready = future::try_join_all(models.iter().map(|model| model.ready())).map_ok(|_| ());
        let (text, filters, ()) = future::try_join3(text, filters, ready).await?;

        for (name, filter) in filters {
            ctx.compiler.register_filter(&name, filter);
        }

        let data = match data {
            Value::Object(data) => data,
            other => {
                return Err(ViewError::InvalidScope {
                    kind: other.type_of(),
                })
            }
        };
        let scope = Scope::root(&ctx.reactor, data, &ctx.reactor.unique_root("view"));
        *self.scope.borrow_mut() = Some(scope.clone());
        self.set_state(ViewState::ScopeObserved);

        self.bind_models(&scope, models)?;
        let this = ctx.weak();
        ctx.services.navigator.subscribe(Rc::new(move |href: &str| {
            if let Some(ctx) = this.upgrade() {
                ctx.set_location(href);
            }
        }));

        let root = ctx.document.parse_fragment(&text)?;
        self.root.set(Some(root));
        traverse::compile(ctx, root, &scope)?;
        self.set_state(ViewState::Compiled);

        self.settle().await
    }

    /// Wait for every queued resource, including ones the resolved resources
    /// queue in turn. Returns the first failure.
    pub async fn settle(&self) -> ViewResult<()> {
        loop {
            let pending = self.context.take_resources();
            if pending.is_empty() {
                return Ok(());
            }
            debug!(count = pending.len(), "waiting on resources");
            future::try_join_all(pending).await?;
        }
    }

    fn load_filter(&self, name: String, source: FilterSource) -> ServiceFuture<(String, FilterFn)> {
        match source {
            FilterSource::Inline(filter) => future::ready(Ok((name, filter))).boxed_local(),
            FilterSource::Package(url) => {
                let mounting = self
                    .context
                    .services
                    .packages
                    .mount(&name, &url, MountOptions::default());
                async move {
                    let package = mounting.await?;
                    package.ready().await?;
                    let filter = package
                        .filter()
                        .ok_or_else(|| ServiceError::package(&name, "package exports no filter"))?;
                    Ok((name, filter))
                }
                .boxed_local()
            }
        }
    }

    /// Expose each model's data under its name and keep it current
    fn bind_models(&self, scope: &Scope, models: Vec<Rc<dyn Model>>) -> ViewResult<()> {
        for model in models {
            let name = model.name().to_string();
            scope.define(&name, model.data())?;

            let target = scope.clone();
            let key = name.clone();
            model.on_refresh(Rc::new(move |data: &Value| {
                if let Err(err) = target.define(&key, data.clone()) {
                    warn!(model = %key, error = %err, "model refresh failed");
                }
            }));

            self.models.borrow_mut().insert(
                name,
                ModelSlot {
                    model,
                    sequence: Rc::new(Cell::new(0)),
                },
            );
        }
        Ok(())
    }

    /// Reload a model and copy its data into the scope. Returns `false` when
    /// a later reload of the same model superseded this one.
    #[instrument(skip(self))]
    pub async fn reload_model(&self, name: &str) -> ViewResult<bool> {
        let (model, sequence, ticket) = {
            let models = self.models.borrow();
            let slot = models.get(name).ok_or_else(|| ViewError::UnknownModel {
                name: name.to_string(),
            })?;
            let ticket = slot.sequence.get() + 1;
            slot.sequence.set(ticket);
            (slot.model.clone(), slot.sequence.clone(), ticket)
        };

        let data = model.reload().await?;
        if sequence.get() != ticket {
            debug!(model = name, ticket, latest = sequence.get(), "dropping superseded reload");
            return Ok(false);
        }
        let scope = self.scope().ok_or(ViewError::NotLoaded)?;
        scope.define(name, data)?;
        Ok(true)
    }

    // Scope access

    pub fn set(&self, name: &str, value: impl Into<Value>) -> ViewResult<()> {
        let scope = self.scope().ok_or(ViewError::NotLoaded)?;
        scope.vars().set(name, value.into())?;
        Ok(())
    }

    /// Current value of a root variable, read without tracking
    pub fn get(&self, name: &str) -> Value {
        self.scope()
            .map(|scope| scope.vars().peek(name))
            .unwrap_or_default()
    }

    // Host interaction

    /// Element registered with `:els`
    pub fn element(&self, name: &str) -> Option<NodeId> {
        self.context.element(name)
    }

    /// Serialized markup of the compiled fragment
    pub fn html(&self) -> String {
        match self.root.get() {
            Some(root) => self.context.document.inner_html(root),
            None => String::new(),
        }
    }

    /// Push a history entry and route to it
    pub fn navigate(&self, url: &str) {
        self.context
            .services
            .navigator
            .push_state(Value::Null, "", url);
        self.context.set_location(url);
    }

    pub fn scroll(&self, top: f64) {
        self.context.services.viewport.scroll_to(top);
    }

    /// Run one animation frame, polling resources queued since the last one
    pub fn frame(&self) {
        self.context.scheduler.frame();
    }

    /// Move the virtual clock forward, firing due timers
    pub fn advance(&self, ms: f64) {
        self.context.scheduler.advance(ms);
    }

    /// Drop every watcher and detach the compiled fragment's children
    pub fn dispose(&self) {
        self.context.dispose();
        if let Some(root) = self.root.get() {
            for child in self.context.document.children(root) {
                self.context.document.remove(child);
            }
        }
        self.models.borrow_mut().clear();
    }
}
