use super::Directive;
use crate::context::Context;
use crate::dom::NodeId;
use crate::error::{CompileError, CompileResult};
use crate::traverse::compile_node;
use crate::wrap::NodeWrap;
use std::cell::Cell;
use std::rc::Rc;
use tracing::warn;

/// Element siblings that may continue an if/else chain, skipping blank text and comments
fn next_element_sibling(ctx: &Context, node: NodeId) -> Option<NodeId> {
    let document = &ctx.document;
    let mut cursor = document.next_sibling(node);
    while let Some(sibling) = cursor {
        if document.is_element(sibling) {
            return Some(sibling);
        }
        let blank = document.is_comment(sibling)
            || document
                .data(sibling)
                .is_some_and(|text| text.trim().is_empty());
        if !blank {
            return None;
        }
        cursor = document.next_sibling(sibling);
    }
    None
}

fn negate_all(conditions: &[String]) -> String {
    conditions
        .iter()
        .map(|c| format!("!({})", c))
        .collect::<Vec<_>>()
        .join(" && ")
}

/// Rewrite the `else_if` / `else_name` siblings following `node` into
/// guarded `:if`s. `conditions` starts with the leading branch's condition.
pub(super) fn rewrite_chain(ctx: &Context, node: NodeId, mut conditions: Vec<String>, else_if: &str, else_name: &str, wrap_condition: impl Fn(&str) -> String) {
    let document = &ctx.document;
    let mut current = node;

    while let Some(sibling) = next_element_sibling(ctx, current) {
        if let Some(value) = document.attribute(sibling, else_if) {
            let own = wrap_condition(&value);
            let guarded = format!("{} && ({})", negate_all(&conditions), own);
            document.remove_attribute(sibling, else_if);
            document.set_attribute(sibling, ":if", &guarded);
            document.set_sign(sibling, None);
            conditions.push(own);
            current = sibling;
        } else if document.has_attribute(sibling, else_name) {
            document.remove_attribute(sibling, else_name);
            document.set_attribute(sibling, ":if", &negate_all(&conditions));
            document.set_sign(sibling, None);
            break;
        } else {
            break;
        }
    }
}

pub(super) fn bind_if(ctx: &Rc<Context>, node: NodeId, value: &str) {
    rewrite_chain(ctx, node, vec![value.to_string()], ":elseif", ":else", |v| v.to_string());
}

pub(super) fn compile_if(ctx: &Rc<Context>, node: NodeId, wrap: &Rc<NodeWrap>, value: &str) -> CompileResult<()> {
    if value.trim().is_empty() {
        let tag = ctx.document.tag(node).unwrap_or_default();
        return Err(CompileError::missing_value("if", tag));
    }
    conditional(ctx, node, wrap, value, Directive::If)
}

/// Render `node` only while `condition` is truthy.
///
/// A permanent comment anchor marks the position; the watcher lives on the
/// anchor so it survives the node being swapped out. Each time the condition
/// turns truthy again a fresh clone of the pristine node is compiled,
/// resuming after `directive`.
pub(super) fn conditional(
    ctx: &Rc<Context>,
    node: NodeId,
    wrap: &Rc<NodeWrap>,
    condition: &str,
    directive: Directive,
) -> CompileResult<()> {
    let document = &ctx.document;
    let compiled = ctx.compiler.interpolation(condition);
    if let Some(error) = compiled.error() {
        return Err(CompileError::malformed(directive.name(), condition, error.clone()));
    }

    if document.attribute(node, "if-remove").as_deref() == Some("false") {
        let document = document.clone();
        ctx.watch_expression(wrap, directive.name(), compiled, move |value, _| {
            if value.is_truthy() {
                document.remove_style(node, "display");
            } else {
                document.set_style(node, "display", "none");
            }
        });
        return Ok(());
    }

    let Some(parent) = document.parent(node) else {
        warn!(directive = directive.name(), "conditional node has no parent");
        return Ok(());
    };
    let anchor = document.create_comment(directive.name());
    document.insert_before(parent, anchor, Some(node));
    let template = document.clone_node(node, true);

    let scope = wrap.scope();
    let once = wrap.options().once;
    let anchor_wrap = ctx.wraps.wrap(anchor, &scope);
    if once {
        anchor_wrap.update(|o| o.once = true);
    }
    let pristine = document.clone();
    anchor_wrap.on_dispose(move || pristine.release(template));

    let current = Rc::new(Cell::new(Some(node)));
    let first_wrap = Rc::downgrade(wrap);
    let this = ctx.weak();

    ctx.watch_expression(&anchor_wrap, directive.name(), compiled, move |value, change| {
        let Some(ctx) = this.upgrade() else {
            return;
        };
        let truthy = value.is_truthy();

        if change.is_none() {
            // first run: the original node either keeps compiling or leaves
            if !truthy {
                if let Some(first) = first_wrap.upgrade() {
                    first.update(|o| o.removed = true);
                }
                ctx.discard(node);
                current.set(None);
            }
            return;
        }

        match (truthy, current.get()) {
            (true, None) => {
                let Some(parent) = ctx.document.parent(anchor) else {
                    return;
                };
                let clone = ctx.document.clone_node(template, true);
                let after = ctx.document.next_sibling(anchor);
                ctx.document.insert_before(parent, clone, after);
                current.set(Some(clone));
                if let Err(err) = compile_node(&ctx, clone, &scope, once, Some(directive)) {
                    warn!(directive = directive.name(), error = %err, "conditional branch failed to compile");
                }
            }
            (false, Some(rendered)) => {
                ctx.discard(rendered);
                current.set(None);
            }
            _ => {}
        }
    });

    Ok(())
}
