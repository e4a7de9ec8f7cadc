//! Virtual clock for timers and animation frames.
//!
//! Nothing runs on its own: the host advances time with [`Scheduler::advance`]
//! and paints frames with [`Scheduler::frame`].

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::trace;

pub type TimerId = u64;

pub type Task = Rc<dyn Fn()>;

struct Timer {
    id: TimerId,
    due: f64,
    task: Task,
}

#[derive(Default)]
pub struct Scheduler {
    now: Cell<f64>,
    next_id: Cell<TimerId>,
    timers: RefCell<Vec<Timer>>,
    frames: RefCell<Vec<Task>>,
}

impl Scheduler {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Milliseconds since the scheduler was created
    pub fn now(&self) -> f64 {
        self.now.get()
    }

    pub fn set_timeout(&self, delay_ms: f64, task: impl Fn() + 'static) -> TimerId {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        self.timers.borrow_mut().push(Timer {
            id,
            due: self.now.get() + delay_ms.max(0.0),
            task: Rc::new(task),
        });
        id
    }

    pub fn clear_timeout(&self, id: TimerId) {
        self.timers.borrow_mut().retain(|t| t.id != id);
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.borrow().len()
    }

    /// Queue `task` for the next [`Scheduler::frame`]
    pub fn request_frame(&self, task: impl Fn() + 'static) {
        self.frames.borrow_mut().push(Rc::new(task));
    }

    /// Move the clock forward, running due timers in due order.
    /// Timers scheduled by a running timer fire too if they fall due in the window.
    pub fn advance(&self, ms: f64) {
        let target = self.now.get() + ms.max(0.0);
        loop {
            let next = {
                let mut timers = self.timers.borrow_mut();
                let index = timers
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.due <= target)
                    .min_by(|(_, a), (_, b)| a.due.total_cmp(&b.due).then(a.id.cmp(&b.id)))
                    .map(|(i, _)| i);
                index.map(|i| timers.remove(i))
            };
            let Some(timer) = next else {
                break;
            };
            self.now.set(timer.due.max(self.now.get()));
            trace!(timer = timer.id, at = timer.due, "timer fired");
            (timer.task)();
        }
        self.now.set(target);
    }

    /// Run the frame callbacks queued so far; callbacks they queue wait for the next frame
    pub fn frame(&self) {
        let tasks = std::mem::take(&mut *self.frames.borrow_mut());
        for task in tasks {
            task();
        }
    }
}

/// Trailing-edge debounce on a [`Scheduler`]
pub struct Debounce {
    scheduler: Rc<Scheduler>,
    delay_ms: f64,
    pending: Cell<Option<TimerId>>,
}

impl Debounce {
    pub fn new(scheduler: Rc<Scheduler>, delay_ms: f64) -> Rc<Self> {
        Rc::new(Self {
            scheduler,
            delay_ms,
            pending: Cell::new(None),
        })
    }

    /// Restart the delay; only the last call's task runs
    pub fn call(self: &Rc<Self>, task: impl Fn() + 'static) {
        if let Some(id) = self.pending.take() {
            self.scheduler.clear_timeout(id);
        }
        let this = Rc::downgrade(self);
        let id = self.scheduler.set_timeout(self.delay_ms, move || {
            if let Some(this) = this.upgrade() {
                this.pending.set(None);
            }
            task();
        });
        self.pending.set(Some(id));
    }

    pub fn cancel(&self) {
        if let Some(id) = self.pending.take() {
            self.scheduler.clear_timeout(id);
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timers_fire_in_due_order() {
        let scheduler = Scheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        for (delay, name) in [(30.0, "b"), (10.0, "a"), (60.0, "c")] {
            let log = log.clone();
            scheduler.set_timeout(delay, move || log.borrow_mut().push(name));
        }

        scheduler.advance(50.0);
        assert_eq!(*log.borrow(), vec!["a", "b"]);
        assert_eq!(scheduler.now(), 50.0);
        scheduler.advance(10.0);
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_debounce_keeps_last_call() {
        let scheduler = Scheduler::new();
        let debounce = Debounce::new(scheduler.clone(), 50.0);
        let seen = Rc::new(Cell::new(0));

        for n in 1..=3 {
            let seen = seen.clone();
            debounce.call(move || seen.set(n));
            scheduler.advance(20.0);
        }
        assert_eq!(seen.get(), 0);
        assert!(debounce.is_pending());

        scheduler.advance(30.0);
        assert_eq!(seen.get(), 3);
        assert!(!debounce.is_pending());
    }

    #[test]
    fn test_frames_requeued_wait_for_next_frame() {
        let scheduler = Scheduler::new();
        let count = Rc::new(Cell::new(0));

        fn tick(scheduler: &Rc<Scheduler>, count: Rc<Cell<u32>>) {
            let again = scheduler.clone();
            scheduler.request_frame(move || {
                count.set(count.get() + 1);
                tick(&again, count.clone());
            });
        }
        tick(&scheduler, count.clone());

        scheduler.frame();
        scheduler.frame();
        assert_eq!(count.get(), 2);
    }
}
