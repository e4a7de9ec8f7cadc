//! Prefixed attribute bindings and interpolated text.

use crate::context::Context;
use crate::dom::{Document, Event, NodeId};
use crate::expression::{CompiledExpression, CompiledTemplate};
use crate::filters::text_of;
use crate::plan::Binding;
use crate::wrap::NodeWrap;
use sprig_reactive::{Function, ObjectRef, Scope, Value};
use std::cell::Cell;
use std::rc::Rc;

/// `@event="statements"`
pub(crate) fn bind_events(ctx: &Rc<Context>, node: NodeId, wrap: &Rc<NodeWrap>, events: &[Binding]) {
    for binding in events {
        let compiled = ctx.compiler.statements(&binding.source);
        let this = ctx.weak();
        let scope = wrap.scope();
        let (prevent, stop) = (wrap.prevents_all(), wrap.stops_all());

        ctx.document
            .add_event_listener(node, &binding.name, move |event: &mut Event| {
                let Some(ctx) = this.upgrade() else {
                    return;
                };
                run_handler(&ctx, &compiled, &scope, event);
                if prevent {
                    event.prevent_default();
                }
                if stop {
                    event.stop_propagation();
                }
            });
    }
}

/// Run handler statements in a child scope exposing `$event`
pub(crate) fn run_handler(ctx: &Context, compiled: &CompiledExpression, scope: &Scope, event: &mut Event) {
    let prevented = Rc::new(Cell::new(false));
    let stopped = Rc::new(Cell::new(false));
    let object = event_object(&ctx.document, event, prevented.clone(), stopped.clone());
    let handler_scope = scope.child([("$event".to_string(), Value::Object(object))]);

    ctx.reactor
        .untracked(|| ctx.compiler.evaluate(compiled, &handler_scope));

    if prevented.get() {
        event.prevent_default();
    }
    if stopped.get() {
        event.stop_propagation();
    }
}

fn event_object(
    document: &Document,
    event: &Event,
    prevented: Rc<Cell<bool>>,
    stopped: Rc<Cell<bool>>,
) -> ObjectRef {
    let target = event.target;
    [
        ("type".to_string(), Value::from(event.kind.as_str())),
        ("value".to_string(), Value::from(document.value(target))),
        ("checked".to_string(), Value::Bool(document.checked(target))),
        ("detail".to_string(), event.detail.clone()),
        (
            "preventDefault".to_string(),
            Value::Function(Function::new(move |_| {
                prevented.set(true);
                Value::Undefined
            })),
        ),
        (
            "stopPropagation".to_string(),
            Value::Function(Function::new(move |_| {
                stopped.set(true);
                Value::Undefined
            })),
        ),
    ]
    .into_iter()
    .collect()
}

/// `$attr="expr"`: `false` and nullish remove the attribute, `true` sets it empty
pub(crate) fn bind_attributes(ctx: &Rc<Context>, node: NodeId, wrap: &Rc<NodeWrap>, bindings: &[Binding]) {
    for binding in bindings {
        let compiled = ctx.compiler.interpolation(&binding.source);
        let document = ctx.document.clone();
        let name = binding.name.clone();
        ctx.watch_expression(wrap, &format!("${}", binding.name), compiled, move |value, _| {
            apply_attribute(&document, node, &name, &value)
        });
    }
}

pub(crate) fn apply_attribute(document: &Document, node: NodeId, name: &str, value: &Value) {
    match value {
        Value::Bool(false) | Value::Undefined | Value::Null => document.remove_attribute(node, name),
        Value::Bool(true) => document.set_attribute(node, name, ""),
        other => document.set_attribute(node, name, &other.to_string()),
    }
    match name {
        "value" => document.set_value(node, &text_of(value)),
        "checked" => document.set_checked(node, value.is_truthy()),
        _ => {}
    }
}

/// `!property="expr"`
pub(crate) fn bind_styles(ctx: &Rc<Context>, node: NodeId, wrap: &Rc<NodeWrap>, bindings: &[Binding]) {
    for binding in bindings {
        let compiled = ctx.compiler.interpolation(&binding.source);
        let document = ctx.document.clone();
        let property = binding.name.clone();
        ctx.watch_expression(wrap, &format!("!{}", binding.name), compiled, move |value, _| {
            let text = text_of(&value);
            if text.is_empty() || value == Value::Bool(false) {
                document.remove_style(node, &property);
            } else {
                document.set_style(node, &property, &text);
            }
        });
    }
}

/// `.class="expr"`
pub(crate) fn bind_classes(ctx: &Rc<Context>, node: NodeId, wrap: &Rc<NodeWrap>, bindings: &[Binding]) {
    for binding in bindings {
        let compiled = ctx.compiler.interpolation(&binding.source);
        let document = ctx.document.clone();
        let class = binding.name.clone();
        ctx.watch_expression(wrap, &format!(".{}", binding.name), compiled, move |value, _| {
            document.toggle_class(node, &class, value.is_truthy())
        });
    }
}

/// Plain attributes with `{{ }}` segments
pub(crate) fn bind_templates(ctx: &Rc<Context>, node: NodeId, wrap: &Rc<NodeWrap>, bindings: &[Binding]) {
    for binding in bindings {
        let compiled = ctx.compiler.expression(&binding.source);
        let document = ctx.document.clone();
        let name = binding.name.clone();
        watch_template(ctx, wrap, &binding.name, compiled, move |text| {
            document.set_attribute(node, &name, &text);
            if name == "value" {
                document.set_value(node, &text);
            }
        });
    }
}

/// Interpolated text node
pub(crate) fn bind_text(ctx: &Rc<Context>, node: NodeId, wrap: &Rc<NodeWrap>, compiled: Rc<CompiledTemplate>) {
    let document = ctx.document.clone();
    watch_template(ctx, wrap, "text", compiled, move |text| {
        document.set_data(node, &text)
    });
}

fn watch_template(
    ctx: &Rc<Context>,
    wrap: &NodeWrap,
    key: &str,
    compiled: Rc<CompiledTemplate>,
    apply: impl Fn(String) + 'static,
) {
    let this = ctx.weak();
    let scope = wrap.scope();
    ctx.watch(
        wrap,
        key,
        move || match this.upgrade() {
            Some(ctx) => ctx.compiler.render(&compiled, &scope),
            None => Value::Null,
        },
        move |value, _| apply(text_of(&value)),
    );
}
