use super::{required_expression, required_value, Directive};
use crate::context::Context;
use crate::dom::NodeId;
use crate::error::{CompileError, CompileResult};
use crate::expression::{evaluate, Env};
use crate::filters::text_of;
use crate::wrap::NodeWrap;
use sprig_parser::parse_var_bindings;
use sprig_reactive::Value;
use std::rc::Rc;
use tracing::warn;

/// `:var="a = e; b = f"`
pub(super) fn compile_var(ctx: &Rc<Context>, node: NodeId, wrap: &Rc<NodeWrap>, value: &str) -> CompileResult<()> {
    let source = required_value(ctx, node, Directive::Var, value)?;
    let bindings = parse_var_bindings(source)
        .map_err(|error| CompileError::malformed("var", source, error))?;

    let scope = wrap
        .scope()
        .child(bindings.iter().map(|b| (b.name.clone(), Value::Undefined)));
    wrap.set_scope(scope.clone());

    for binding in bindings {
        let this = ctx.weak();
        let reader = scope.clone();
        let writer = scope.clone();
        let name = binding.name.clone();
        let expression = binding.value;

        ctx.watch(
            wrap,
            &format!("var:{}", binding.name),
            move || {
                let Some(ctx) = this.upgrade() else {
                    return Value::Undefined;
                };
                let filters = ctx.compiler.filters();
                evaluate(&expression, &Env::new(&reader, &filters)).unwrap_or_else(|err| {
                    warn!(variable = %name, error = %err, "variable failed");
                    Value::Null
                })
            },
            {
                let name = binding.name;
                move |value, _| {
                    if let Err(err) = writer.define(&name, value) {
                        warn!(variable = %name, error = %err, "variable update failed");
                    }
                }
            },
        );
    }
    Ok(())
}

/// `:show="e"`
pub(super) fn compile_show(ctx: &Rc<Context>, node: NodeId, wrap: &Rc<NodeWrap>, value: &str) -> CompileResult<()> {
    let compiled = required_expression(ctx, node, Directive::Show, value)?;
    let document = ctx.document.clone();
    ctx.watch_expression(wrap, "show", compiled, move |value, _| {
        if value.is_truthy() {
            document.remove_style(node, "display");
        } else {
            document.set_style(node, "display", "none");
        }
    });
    Ok(())
}

/// `:html="e"`: children become the parsed markup and are not compiled
pub(super) fn compile_html(ctx: &Rc<Context>, node: NodeId, wrap: &Rc<NodeWrap>, value: &str) -> CompileResult<()> {
    let compiled = required_expression(ctx, node, Directive::Html, value)?;
    wrap.update(|o| o.pre = true);
    let document = ctx.document.clone();
    ctx.watch_expression(wrap, "html", compiled, move |value, _| {
        let html = text_of(&value);
        // never compiled, so nothing but the nodes themselves to free
        for child in document.children(node) {
            document.release(child);
        }
        if let Err(err) = document.set_inner_html(node, &html) {
            warn!(error = %err, "invalid :html markup, rendering as text");
            document.set_text_content(node, &html);
        }
    });
    Ok(())
}

/// `:text="e"`
pub(super) fn compile_text(ctx: &Rc<Context>, node: NodeId, wrap: &Rc<NodeWrap>, value: &str) -> CompileResult<()> {
    let compiled = required_expression(ctx, node, Directive::Text, value)?;
    wrap.update(|o| o.pre = true);
    let document = ctx.document.clone();
    ctx.watch_expression(wrap, "text", compiled, move |value, _| {
        document.set_text_content(node, &text_of(&value))
    });
    Ok(())
}

/// `:checked="e"`
pub(super) fn compile_checked(ctx: &Rc<Context>, node: NodeId, wrap: &Rc<NodeWrap>, value: &str) -> CompileResult<()> {
    let compiled = required_expression(ctx, node, Directive::Checked, value)?;
    let document = ctx.document.clone();
    ctx.watch_expression(wrap, "checked", compiled, move |value, _| {
        document.set_checked(node, value.is_truthy())
    });
    Ok(())
}

/// `:exec="statements"`: re-run whenever what they read changes
pub(super) fn compile_exec(ctx: &Rc<Context>, node: NodeId, wrap: &Rc<NodeWrap>, value: &str) -> CompileResult<()> {
    let source = required_value(ctx, node, Directive::Exec, value)?;
    let compiled = ctx.compiler.statements(source);
    if let Some(error) = compiled.error() {
        return Err(CompileError::malformed("exec", source, error.clone()));
    }
    let this = ctx.weak();
    let scope = wrap.scope();
    ctx.watch(
        wrap,
        "exec",
        move || {
            if let Some(ctx) = this.upgrade() {
                ctx.compiler.evaluate(&compiled, &scope);
            }
        },
        |_, _| {},
    );
    Ok(())
}
