use crate::error::ServiceError;
use crate::result::{ServiceFuture, ServiceResult};
use futures::channel::oneshot;
use futures::future::{self, FutureExt, LocalBoxFuture, Shared};
use std::cell::RefCell;
use std::rc::Rc;

/// One-shot readiness signal that any number of waiters can await
#[derive(Clone)]
pub struct Gate {
    sender: Rc<RefCell<Option<oneshot::Sender<ServiceResult<()>>>>>,
    shared: Shared<LocalBoxFuture<'static, ServiceResult<()>>>,
}

impl Gate {
    /// A gate resolved later through [`Gate::resolve`]
    pub fn pending() -> Self {
        let (sender, receiver) = oneshot::channel();
        let shared = receiver
            .map(|result| result.unwrap_or(Err(ServiceError::Cancelled)))
            .boxed_local()
            .shared();
        Self {
            sender: Rc::new(RefCell::new(Some(sender))),
            shared,
        }
    }

    /// A gate that is already open
    pub fn open() -> Self {
        let gate = Self::pending();
        gate.resolve(Ok(()));
        gate
    }

    /// Resolve every current and future waiter; later calls are ignored
    pub fn resolve(&self, result: ServiceResult<()>) {
        if let Some(sender) = self.sender.borrow_mut().take() {
            let _ = sender.send(result);
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.sender.borrow().is_none()
    }

    pub fn wait(&self) -> ServiceFuture<()> {
        self.shared.clone().boxed_local()
    }

    /// Wait for several gates, failing with the first error
    pub fn all(gates: Vec<Gate>) -> ServiceFuture<()> {
        future::try_join_all(gates.iter().map(Gate::wait).collect::<Vec<_>>())
            .map(|r| r.map(|_| ()))
            .boxed_local()
    }
}
