use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Vertical extent of an element in document coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub top: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(top: f64, height: f64) -> Self {
        Self { top, height }
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }
}

pub type ScrollHandler = Rc<dyn Fn()>;

/// Registration returned by [`Viewport::on_scroll`]
pub type ScrollId = u64;

/// Scroll window used by `:lazy`
pub trait Viewport {
    fn scroll_top(&self) -> f64;

    fn height(&self) -> f64;

    fn on_scroll(&self, handler: ScrollHandler) -> ScrollId;

    /// Drop a handler; unknown ids are ignored
    fn off_scroll(&self, id: ScrollId);

    /// Scroll and fire scroll listeners
    fn scroll_to(&self, top: f64);

    /// Whether `rect`, grown by `margin` on both sides, overlaps the visible window
    fn intersects(&self, rect: Rect, margin: f64) -> bool {
        let top = self.scroll_top();
        let bottom = top + self.height();
        rect.bottom() + margin >= top && rect.top - margin <= bottom
    }
}

/// Viewport driven by hand
pub struct StaticViewport {
    scroll_top: Cell<f64>,
    height: Cell<f64>,
    handlers: RefCell<Vec<(ScrollId, ScrollHandler)>>,
    next_id: Cell<ScrollId>,
}

impl StaticViewport {
    pub fn new(height: f64) -> Self {
        Self {
            scroll_top: Cell::new(0.0),
            height: Cell::new(height),
            handlers: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }

    pub fn resize(&self, height: f64) {
        self.height.set(height);
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.borrow().len()
    }
}

impl Viewport for StaticViewport {
    fn scroll_top(&self) -> f64 {
        self.scroll_top.get()
    }

    fn height(&self) -> f64 {
        self.height.get()
    }

    fn on_scroll(&self, handler: ScrollHandler) -> ScrollId {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        self.handlers.borrow_mut().push((id, handler));
        id
    }

    fn off_scroll(&self, id: ScrollId) {
        self.handlers.borrow_mut().retain(|(own, _)| *own != id);
    }

    fn scroll_to(&self, top: f64) {
        self.scroll_top.set(top);
        let handlers: Vec<ScrollHandler> = self
            .handlers
            .borrow()
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();
        for handler in handlers {
            handler();
        }
    }
}

impl<T: Viewport + ?Sized> Viewport for Rc<T> {
    fn scroll_top(&self) -> f64 {
        (**self).scroll_top()
    }

    fn height(&self) -> f64 {
        (**self).height()
    }

    fn on_scroll(&self, handler: ScrollHandler) -> ScrollId {
        (**self).on_scroll(handler)
    }

    fn off_scroll(&self, id: ScrollId) {
        (**self).off_scroll(id)
    }

    fn scroll_to(&self, top: f64) {
        (**self).scroll_to(top)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersects_with_margin() {
        let viewport = StaticViewport::new(500.0);
        let below = Rect::new(900.0, 100.0);

        assert!(!viewport.intersects(below, 0.0));
        assert!(viewport.intersects(below, 400.0));

        viewport.scroll_to(450.0);
        assert!(viewport.intersects(below, 0.0));
    }

    #[test]
    fn test_scroll_fires_handlers() {
        let viewport = StaticViewport::new(100.0);
        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        viewport.on_scroll(Rc::new(move || counter.set(counter.get() + 1)));

        viewport.scroll_to(10.0);
        viewport.scroll_to(20.0);
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn test_off_scroll_unregisters() {
        let viewport = StaticViewport::new(100.0);
        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        let id = viewport.on_scroll(Rc::new(move || counter.set(counter.get() + 1)));
        let other = viewport.on_scroll(Rc::new(|| {}));

        viewport.off_scroll(id);
        viewport.scroll_to(10.0);
        assert_eq!(hits.get(), 0);
        assert_eq!(viewport.handler_count(), 1);

        viewport.off_scroll(other);
        viewport.off_scroll(other);
        assert_eq!(viewport.handler_count(), 0);
    }
}
