use super::{required_expression, Directive};
use crate::context::Context;
use crate::dom::{Document, NodeId};
use crate::error::CompileResult;
use crate::filters::text_of;
use crate::scheduler::Debounce;
use crate::wrap::NodeWrap;
use sprig_reactive::Value;
use std::rc::Rc;
use tracing::{trace, warn};

/// How a form control exposes its value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Checkbox,
    Radio,
    Number,
    Text,
}

impl Control {
    fn of(document: &Document, node: NodeId) -> Self {
        if document.tag(node).as_deref() != Some("input") {
            return Control::Text;
        }
        let kind = document.attribute(node, "type").unwrap_or_default().to_ascii_lowercase();
        match kind.as_str() {
            "checkbox" => Control::Checkbox,
            "radio" => Control::Radio,
            "number" | "range" => Control::Number,
            _ => Control::Text,
        }
    }

    /// Value to write back; `None` when the event carries nothing to write
    fn read(self, document: &Document, node: NodeId) -> Option<Value> {
        match self {
            Control::Checkbox => Some(Value::Bool(document.checked(node))),
            Control::Radio => document
                .checked(node)
                .then(|| Value::from(document.value(node))),
            Control::Number => {
                let text = document.value(node);
                let trimmed = text.trim();
                Some(if trimmed.is_empty() {
                    Value::Null
                } else {
                    Value::Number(trimmed.parse().unwrap_or(f64::NAN))
                })
            }
            Control::Text => Some(Value::from(document.value(node))),
        }
    }

    fn write(self, document: &Document, node: NodeId, value: &Value) {
        match self {
            Control::Checkbox => document.set_checked(node, value.is_truthy()),
            Control::Radio => document.set_checked(node, text_of(value) == document.value(node)),
            Control::Number | Control::Text => document.set_value(node, &text_of(value)),
        }
    }
}

/// `:model="path"`: path → control on every change, control → path on
/// `input`/`change`, debounced, tagged so the echo is not rendered back
pub(super) fn compile_model(ctx: &Rc<Context>, node: NodeId, wrap: &Rc<NodeWrap>, value: &str) -> CompileResult<()> {
    let compiled = required_expression(ctx, node, Directive::Model, value)?;
    let document = &ctx.document;
    let control = Control::of(document, node);
    let tag = ctx.next_tag();

    let delay = match document.attribute(node, "model-debounce") {
        Some(text) => text.trim().parse::<f64>().unwrap_or_else(|_| {
            warn!(value = %text, "invalid model-debounce, using default");
            ctx.debounce_ms()
        }),
        None => ctx.debounce_ms(),
    };
    document.remove_attribute(node, "model-debounce");

    let target = document.clone();
    ctx.watch_expression(wrap, "model", compiled.clone(), move |value, change| {
        if change.is_some_and(|c| c.tag == Some(tag)) {
            trace!(tag, "skipping own model write");
            return;
        }
        control.write(&target, node, &value);
    });

    let debounce = Debounce::new(ctx.scheduler.clone(), delay);
    let scope = wrap.scope();
    for event in ["input", "change"] {
        let this = ctx.weak();
        let debounce = debounce.clone();
        let compiled = compiled.clone();
        let scope = scope.clone();
        document.add_event_listener(node, event, move |_| {
            let Some(ctx) = this.upgrade() else {
                return;
            };
            let Some(value) = control.read(&ctx.document, node) else {
                return;
            };
            let (this, compiled, scope) = (ctx.weak(), compiled.clone(), scope.clone());
            debounce.call(move || {
                let Some(ctx) = this.upgrade() else {
                    return;
                };
                if let Err(err) = ctx.compiler.assign(&compiled, value.clone(), &scope, Some(tag)) {
                    warn!(source = compiled.source(), error = %err, "model write failed");
                }
            });
        });
    }
    Ok(())
}
