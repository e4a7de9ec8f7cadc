use crate::error::ServiceError;
use crate::gate::Gate;
use crate::result::{ServiceFuture, ServiceResult};
use futures::channel::oneshot;
use futures::future::{self, FutureExt};
use sprig_reactive::Value;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

pub type RefreshHandler = Rc<dyn Fn(&Value)>;

/// A named data source bound into a view's scope
pub trait Model {
    fn name(&self) -> &str;

    /// Current data
    fn data(&self) -> Value;

    fn ready(&self) -> ServiceFuture<()>;

    /// Called whenever the model refreshes its data on its own
    fn on_refresh(&self, handler: RefreshHandler);

    /// Fetch fresh data
    fn reload(&self) -> ServiceFuture<Value>;
}

/// In-memory model; reloads either return the current data or are answered
/// later through [`MemoryModel::defer_reload`]
pub struct MemoryModel {
    name: String,
    data: RefCell<Value>,
    gate: Gate,
    handlers: RefCell<Vec<RefreshHandler>>,
    deferred: RefCell<VecDeque<oneshot::Receiver<ServiceResult<Value>>>>,
}

impl MemoryModel {
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data: RefCell::new(data),
            gate: Gate::open(),
            handlers: RefCell::new(Vec::new()),
            deferred: RefCell::new(VecDeque::new()),
        }
    }

    pub fn with_gate(mut self, gate: Gate) -> Self {
        self.gate = gate;
        self
    }

    /// Replace the data and notify refresh listeners
    pub fn refresh(&self, data: Value) {
        *self.data.borrow_mut() = data.clone();
        let handlers = self.handlers.borrow().clone();
        for handler in handlers {
            handler(&data);
        }
    }

    /// The next `reload` call resolves when the returned sender is used
    pub fn defer_reload(&self) -> oneshot::Sender<ServiceResult<Value>> {
        let (sender, receiver) = oneshot::channel();
        self.deferred.borrow_mut().push_back(receiver);
        sender
    }
}

impl Model for MemoryModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn data(&self) -> Value {
        self.data.borrow().clone()
    }

    fn ready(&self) -> ServiceFuture<()> {
        self.gate.wait()
    }

    fn on_refresh(&self, handler: RefreshHandler) {
        self.handlers.borrow_mut().push(handler);
    }

    fn reload(&self) -> ServiceFuture<Value> {
        match self.deferred.borrow_mut().pop_front() {
            Some(receiver) => {
                let name = self.name.clone();
                receiver
                    .map(move |result| {
                        result.unwrap_or_else(|_| Err(ServiceError::model(name, "reload cancelled")))
                    })
                    .boxed_local()
            }
            None => future::ready(Ok(self.data())).boxed_local(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use std::cell::Cell;

    #[test]
    fn test_refresh_notifies_listeners() {
        let model = MemoryModel::new("user", Value::from("a"));
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        model.on_refresh(Rc::new(move |_| counter.set(counter.get() + 1)));

        model.refresh(Value::from("b"));
        assert_eq!(calls.get(), 1);
        assert_eq!(model.data(), Value::from("b"));
    }

    #[test]
    fn test_deferred_reloads_resolve_in_order_of_sending() {
        let model = MemoryModel::new("feed", Value::Null);
        let first = model.defer_reload();
        let second = model.defer_reload();

        let a = model.reload();
        let b = model.reload();
        second.send(Ok(Value::Number(2.0))).unwrap();
        first.send(Ok(Value::Number(1.0))).unwrap();

        assert_eq!(block_on(b), Ok(Value::Number(2.0)));
        assert_eq!(block_on(a), Ok(Value::Number(1.0)));
        assert_eq!(block_on(model.reload()), Ok(Value::Null));
    }
}
