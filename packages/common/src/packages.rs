use crate::error::ServiceError;
use crate::gate::Gate;
use crate::result::ServiceFuture;
use futures::future::{self, FutureExt};
use sprig_reactive::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::debug;

/// Filter function: `(input, arguments) -> output`
pub type FilterFn = Rc<dyn Fn(&Value, &[Value]) -> Value>;

/// Package event listener
pub type EventHandler = Rc<dyn Fn(&Value)>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MountOptions {
    /// Attributes of the mounting element, minus directives
    pub attributes: Vec<(String, String)>,
}

/// A mounted component package
pub trait Package {
    fn name(&self) -> &str;

    /// Resolves when the package finished loading
    fn ready(&self) -> ServiceFuture<()>;

    fn on(&self, event: &str, handler: EventHandler);

    fn data(&self) -> Option<Value> {
        None
    }

    fn filter(&self) -> Option<FilterFn> {
        None
    }

    /// Markup the package renders into its mount point
    fn template(&self) -> Option<String> {
        None
    }
}

pub trait PackageLoader {
    fn mount(&self, name: &str, url: &str, options: MountOptions) -> ServiceFuture<Rc<dyn Package>>;
}

/// Package defined in memory
pub struct StaticPackage {
    name: String,
    gate: Gate,
    data: Option<Value>,
    filter: Option<FilterFn>,
    template: Option<String>,
    listeners: RefCell<HashMap<String, Vec<EventHandler>>>,
}

impl StaticPackage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            gate: Gate::open(),
            data: None,
            filter: None,
            template: None,
            listeners: RefCell::new(HashMap::new()),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn with_filter(mut self, filter: impl Fn(&Value, &[Value]) -> Value + 'static) -> Self {
        self.filter = Some(Rc::new(filter));
        self
    }

    /// Readiness is controlled through the returned gate
    pub fn with_gate(mut self, gate: Gate) -> Self {
        self.gate = gate;
        self
    }

    pub fn emit(&self, event: &str, payload: &Value) {
        let handlers = self
            .listeners
            .borrow()
            .get(event)
            .cloned()
            .unwrap_or_default();
        for handler in handlers {
            handler(payload);
        }
    }
}

impl Package for StaticPackage {
    fn name(&self) -> &str {
        &self.name
    }

    fn ready(&self) -> ServiceFuture<()> {
        self.gate.wait()
    }

    fn on(&self, event: &str, handler: EventHandler) {
        self.listeners
            .borrow_mut()
            .entry(event.to_string())
            .or_default()
            .push(handler);
    }

    fn data(&self) -> Option<Value> {
        self.data.clone()
    }

    fn filter(&self) -> Option<FilterFn> {
        self.filter.clone()
    }

    fn template(&self) -> Option<String> {
        self.template.clone()
    }
}

/// Loader serving registered packages by URL
#[derive(Default)]
pub struct MemoryPackages {
    packages: RefCell<HashMap<String, Rc<dyn Package>>>,
    mounts: RefCell<Vec<(String, String)>>,
}

impl MemoryPackages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, url: impl Into<String>, package: impl Package + 'static) {
        self.packages
            .borrow_mut()
            .insert(url.into(), Rc::new(package));
    }

    /// `(name, url)` of every mount request so far
    pub fn mounts(&self) -> Vec<(String, String)> {
        self.mounts.borrow().clone()
    }
}

impl PackageLoader for MemoryPackages {
    fn mount(&self, name: &str, url: &str, _options: MountOptions) -> ServiceFuture<Rc<dyn Package>> {
        debug!(name, url, "mounting package");
        self.mounts
            .borrow_mut()
            .push((name.to_string(), url.to_string()));
        let result = self
            .packages
            .borrow()
            .get(url)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(url));
        future::ready(result).boxed_local()
    }
}

/// Package name from its URL: the last path segment without extension
pub fn package_name_from_url(url: &str) -> String {
    let path = url.split(&['?', '#'][..]).next().unwrap_or(url);
    let segment = path.trim_end_matches('/').rsplit('/').next().unwrap_or(path);
    segment
        .split('.')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(segment)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use std::cell::Cell;

    #[test]
    fn test_package_name_from_url() {
        assert_eq!(package_name_from_url("/pkgs/user-card.js"), "user-card");
        assert_eq!(package_name_from_url("widgets/chart/"), "chart");
        assert_eq!(package_name_from_url("/a/b.min.js?v=2"), "b");
    }

    #[test]
    fn test_mount_unknown_url_fails() {
        let loader = MemoryPackages::new();
        let result = block_on(loader.mount("x", "/x.js", MountOptions::default()));
        assert!(matches!(result, Err(ServiceError::NotFound { .. })));
        assert_eq!(loader.mounts(), vec![("x".to_string(), "/x.js".to_string())]);
    }

    #[test]
    fn test_static_package_events() {
        let package = StaticPackage::new("card");
        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        package.on("select", Rc::new(move |_| counter.set(counter.get() + 1)));

        package.emit("select", &Value::Null);
        package.emit("other", &Value::Null);
        assert_eq!(hits.get(), 1);
    }
}
