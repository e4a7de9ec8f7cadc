use sprig_reactive::Value;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::trace;

/// Called with the new location after a history move
pub type LocationHandler = Rc<dyn Fn(&str)>;

/// Browser-history abstraction used by `:router` and `:model` links
pub trait Navigator {
    fn location(&self) -> String;

    fn push_state(&self, state: Value, title: &str, url: &str);

    /// Notified on back/forward moves, not on `push_state`
    fn subscribe(&self, handler: LocationHandler);
}

#[derive(Debug, Clone)]
struct Entry {
    url: String,
    state: Value,
}

/// History kept in memory
pub struct MemoryHistory {
    entries: RefCell<Vec<Entry>>,
    index: RefCell<usize>,
    handlers: RefCell<Vec<LocationHandler>>,
}

impl MemoryHistory {
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            entries: RefCell::new(vec![Entry {
                url: initial.into(),
                state: Value::Null,
            }]),
            index: RefCell::new(0),
            handlers: RefCell::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn state(&self) -> Value {
        let index = *self.index.borrow();
        self.entries
            .borrow()
            .get(index)
            .map(|e| e.state.clone())
            .unwrap_or_default()
    }

    pub fn back(&self) -> bool {
        self.go(-1)
    }

    pub fn forward(&self) -> bool {
        self.go(1)
    }

    /// Move `delta` entries; returns false when that leaves the history
    pub fn go(&self, delta: i64) -> bool {
        let target = *self.index.borrow() as i64 + delta;
        if target < 0 || target >= self.len() as i64 {
            return false;
        }
        *self.index.borrow_mut() = target as usize;

        let location = self.location();
        trace!(%location, "history move");
        let handlers = self.handlers.borrow().clone();
        for handler in handlers {
            handler(&location);
        }
        true
    }
}

impl Navigator for MemoryHistory {
    fn location(&self) -> String {
        let index = *self.index.borrow();
        self.entries
            .borrow()
            .get(index)
            .map(|e| e.url.clone())
            .unwrap_or_default()
    }

    fn push_state(&self, state: Value, _title: &str, url: &str) {
        let mut entries = self.entries.borrow_mut();
        let mut index = self.index.borrow_mut();
        entries.truncate(*index + 1);
        entries.push(Entry {
            url: url.to_string(),
            state,
        });
        *index = entries.len() - 1;
    }

    fn subscribe(&self, handler: LocationHandler) {
        self.handlers.borrow_mut().push(handler);
    }
}

impl<T: Navigator + ?Sized> Navigator for Rc<T> {
    fn location(&self) -> String {
        (**self).location()
    }

    fn push_state(&self, state: Value, title: &str, url: &str) {
        (**self).push_state(state, title, url)
    }

    fn subscribe(&self, handler: LocationHandler) {
        (**self).subscribe(handler)
    }
}
