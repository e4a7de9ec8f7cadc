//! # Template traverser
//!
//! Walks a DOM subtree depth-first in pre-order and wraps every element and
//! every interpolated text node exactly once.
//!
//! For an element the traverser:
//!
//! 1. looks up the compile plan (cached by the node's structural sign),
//! 2. runs every directive's `bind`, then every directive's `compile`, in
//!    priority order, stopping as soon as one of them marks the node `skip`
//!    or `removed`,
//! 3. binds `@event`, `$attr`, `!style`, `.class` and `{{ }}` attributes,
//! 4. strips the prefixed attributes,
//! 5. descends into the children unless the node is `skip`, `pre` or
//!    `removed`.
//!
//! Text inside `<style>` uses `{% %}` so CSS blocks are left alone.

use crate::bindings;
use crate::context::Context;
use crate::directives::{self, route_function, Directive};
use crate::dom::{NodeId, NodeKind};
use crate::error::CompileResult;
use sprig_parser::{has_interpolation, Delimiters};
use sprig_reactive::Scope;
use std::rc::Rc;
use tracing::{instrument, trace, warn};

/// Compile `root` (an element, text node or fragment) against `scope`
#[instrument(skip(ctx, scope), fields(root = root.0))]
pub fn compile(ctx: &Rc<Context>, root: NodeId, scope: &Scope) -> CompileResult<()> {
    install_globals(ctx, scope);
    compile_node(ctx, root, scope, false, None)
}

fn install_globals(ctx: &Rc<Context>, scope: &Scope) {
    let root = scope.root_scope();
    if !root.vars().contains_key("$route") {
        if let Err(err) = root.define("$route", route_function(ctx)) {
            warn!(error = %err, "could not install $route");
        }
    }
}

/// Compile one node; `resume_after` skips directives a structural directive
/// already handled on the node this one was cloned from
pub(crate) fn compile_node(
    ctx: &Rc<Context>,
    node: NodeId,
    scope: &Scope,
    once: bool,
    resume_after: Option<Directive>,
) -> CompileResult<()> {
    match ctx.document.kind(node) {
        NodeKind::Element { .. } => compile_element(ctx, node, scope, once, resume_after),
        NodeKind::Text { .. } => {
            compile_text(ctx, node, scope, once, Delimiters::MUSTACHE);
            Ok(())
        }
        NodeKind::Fragment => compile_children(ctx, node, scope, once, false),
        NodeKind::Comment { .. } => Ok(()),
    }
}

fn compile_element(
    ctx: &Rc<Context>,
    node: NodeId,
    scope: &Scope,
    once: bool,
    resume_after: Option<Directive>,
) -> CompileResult<()> {
    let document = &ctx.document;
    let wrap = ctx.wraps.wrap(node, scope);
    if once {
        wrap.update(|o| o.once = true);
    }

    let plan = ctx.compiler.plan(document, node);
    let pending = plan.directives_after(resume_after);

    for used in pending {
        directives::bind(ctx, node, used.directive, &used.value);
    }
    for used in pending {
        trace!(node = node.0, directive = %used.name, "compile directive");
        directives::compile(ctx, node, &wrap, used.directive, &used.value)?;
        if wrap.halted() {
            return Ok(());
        }
    }

    bindings::bind_events(ctx, node, &wrap, &plan.events);
    bindings::bind_attributes(ctx, node, &wrap, &plan.attributes);
    bindings::bind_styles(ctx, node, &wrap, &plan.styles);
    bindings::bind_classes(ctx, node, &wrap, &plan.classes);
    bindings::bind_templates(ctx, node, &wrap, &plan.templates);

    for name in &plan.prefixed {
        document.remove_attribute(node, name);
    }
    document.set_sign(node, None);

    let options = wrap.options();
    if options.skip || options.pre || options.removed {
        return Ok(());
    }
    let raw_style = document.tag(node).as_deref() == Some("style");
    compile_children(ctx, node, &wrap.scope(), options.once, raw_style)
}

pub(crate) fn compile_children(
    ctx: &Rc<Context>,
    node: NodeId,
    scope: &Scope,
    once: bool,
    raw_style: bool,
) -> CompileResult<()> {
    for child in ctx.document.children(node) {
        if raw_style && ctx.document.is_text(child) {
            compile_text(ctx, child, scope, once, Delimiters::STYLE);
        } else {
            compile_node(ctx, child, scope, once, None)?;
        }
    }
    Ok(())
}

fn compile_text(ctx: &Rc<Context>, node: NodeId, scope: &Scope, once: bool, delimiters: Delimiters) {
    let Some(text) = ctx.document.data(node) else {
        return;
    };
    if !has_interpolation(&text, delimiters) {
        return;
    }

    let wrap = ctx.wraps.wrap(node, scope);
    if once {
        wrap.update(|o| o.once = true);
    }
    let compiled = if delimiters == Delimiters::STYLE {
        ctx.compiler.style_expression(&text)
    } else {
        ctx.compiler.expression(&text)
    };
    bindings::bind_text(ctx, node, &wrap, compiled);
}
