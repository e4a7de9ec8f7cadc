use super::{required_value, Directive};
use crate::context::Context;
use crate::dom::{Event, NodeId};
use crate::error::CompileResult;
use crate::scheduler::Debounce;
use crate::traverse::compile_node;
use crate::wrap::NodeWrap;
use std::cell::Cell;
use std::rc::{Rc, Weak};
use tracing::{debug, warn};

fn visible(ctx: &Context, node: NodeId) -> bool {
    match ctx.document.rect(node) {
        Some(rect) => ctx.services.viewport.intersects(rect, 0.0),
        // nothing laid out yet counts as on screen
        None => true,
    }
}

/// `:lazy`: compile the rest of the node once it scrolls into view
pub(super) fn compile_lazy(ctx: &Rc<Context>, node: NodeId, wrap: &Rc<NodeWrap>) -> CompileResult<()> {
    if visible(ctx, node) {
        return Ok(());
    }
    wrap.update(|o| o.skip = true);
    debug!(node = node.0, "deferring off-screen subtree");

    let done = Rc::new(Cell::new(false));
    let registration = Rc::new(Cell::new(None));
    let debounce = Debounce::new(ctx.scheduler.clone(), ctx.debounce_ms());
    let this = ctx.weak();
    let pending = Rc::downgrade(wrap);
    let handler_registration = registration.clone();

    let id = ctx.services.viewport.on_scroll(Rc::new(move || {
        if done.get() {
            return;
        }
        let (this, pending, done) = (this.clone(), pending.clone(), done.clone());
        let registration = handler_registration.clone();
        debounce.call(move || {
            let (Some(ctx), Some(wrap)) = (this.upgrade(), pending.upgrade()) else {
                return;
            };
            if done.get() || !visible(&ctx, node) {
                return;
            }
            done.set(true);
            if let Some(id) = registration.take() {
                ctx.services.viewport.off_scroll(id);
            }
            wrap.update(|o| o.skip = false);
            let once = wrap.options().once;
            if let Err(err) = compile_node(&ctx, node, &wrap.scope(), once, Some(Directive::Lazy)) {
                warn!(error = %err, "lazy subtree failed to compile");
            }
        });
    }));
    registration.set(Some(id));

    let viewport = ctx.services.viewport.clone();
    wrap.on_dispose(move || {
        if let Some(id) = registration.take() {
            viewport.off_scroll(id);
        }
    });
    Ok(())
}

fn event_names(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// `:prevent` / `:prevent="submit, click"`
pub(super) fn compile_prevent(ctx: &Rc<Context>, node: NodeId, wrap: &Rc<NodeWrap>, value: &str) -> CompileResult<()> {
    let names = event_names(value);
    if names.is_empty() {
        wrap.set_prevent_all();
    }
    for name in names {
        ctx.document
            .add_event_listener(node, &name, |event: &mut Event| event.prevent_default());
    }
    Ok(())
}

/// `:stop` / `:stop="click"`
pub(super) fn compile_stop(ctx: &Rc<Context>, node: NodeId, wrap: &Rc<NodeWrap>, value: &str) -> CompileResult<()> {
    let names = event_names(value);
    if names.is_empty() {
        wrap.set_stop_all();
    }
    for name in names {
        ctx.document
            .add_event_listener(node, &name, |event: &mut Event| event.stop_propagation());
    }
    Ok(())
}

/// `:els="name"`
pub(super) fn compile_els(ctx: &Rc<Context>, node: NodeId, value: &str) -> CompileResult<()> {
    let name = required_value(ctx, node, Directive::Els, value)?;
    ctx.register_element(name.trim(), node);
    Ok(())
}

/// `:fixed`: class `fixed` while the viewport is scrolled past the node's top
pub(super) fn compile_fixed(ctx: &Rc<Context>, node: NodeId, wrap: &Rc<NodeWrap>) -> CompileResult<()> {
    let top = ctx.document.rect(node).map_or(0.0, |rect| rect.top);
    update_fixed(ctx, node, top);
    poll_fixed(ctx, ctx.weak(), Rc::downgrade(wrap), node, top);
    Ok(())
}

fn update_fixed(ctx: &Context, node: NodeId, top: f64) {
    let fixed = ctx.services.viewport.scroll_top() > top;
    ctx.document.toggle_class(node, "fixed", fixed);
}

fn poll_fixed(ctx: &Context, this: Weak<Context>, alive: Weak<NodeWrap>, node: NodeId, top: f64) {
    ctx.scheduler.request_frame(move || {
        let Some(ctx) = this.upgrade() else {
            return;
        };
        if alive.upgrade().is_none() {
            return;
        }
        update_fixed(&ctx, node, top);
        poll_fixed(&ctx, this.clone(), alive.clone(), node, top);
    });
}
