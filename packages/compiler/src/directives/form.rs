use super::{required_value, Directive};
use crate::bindings::run_handler;
use crate::context::{Context, Validator};
use crate::dom::{Event, NodeId};
use crate::error::{CompileError, CompileResult};
use crate::wrap::NodeWrap;
use sprig_common::parse_rules;
use std::rc::Rc;
use tracing::{debug, warn};

/// `:validate="rule rule:arg"`
pub(super) fn compile_validate(ctx: &Rc<Context>, node: NodeId, value: &str) -> CompileResult<()> {
    let source = required_value(ctx, node, Directive::Validate, value)?;
    let calls = parse_rules(source);
    if let Some(unknown) = calls.iter().find(|c| !ctx.services.rules.contains(&c.name)) {
        return Err(CompileError::UnknownRule {
            rule: unknown.name.clone(),
        });
    }

    let validator = Validator {
        node,
        calls: Rc::new(calls),
    };
    for event in ["input", "change"] {
        let this = ctx.weak();
        let validator = validator.clone();
        ctx.document.add_event_listener(node, event, move |_| {
            if let Some(ctx) = this.upgrade() {
                validate_field(&ctx, &validator);
            }
        });
    }
    ctx.add_validator(validator);
    Ok(())
}

/// Check one field and reflect the outcome on the element
pub(crate) fn validate_field(ctx: &Context, validator: &Validator) -> bool {
    let document = &ctx.document;
    let value = if document.attribute(validator.node, "type").as_deref() == Some("checkbox") {
        if document.checked(validator.node) {
            document.value(validator.node)
        } else {
            String::new()
        }
    } else {
        document.value(validator.node)
    };

    let failing = ctx
        .services
        .rules
        .validate(&validator.calls, &value)
        .unwrap_or_else(|err| {
            warn!(error = %err, "validation failed to run");
            validator.calls.iter().map(|c| c.name.clone()).collect()
        });
    let valid = failing.is_empty();
    if !valid {
        debug!(node = validator.node.0, rules = ?failing, "field invalid");
    }
    document.toggle_class(validator.node, "invalid", !valid);
    document.set_attribute(validator.node, "aria-invalid", if valid { "false" } else { "true" });
    valid
}

/// `:submit="handler"`: validate every field of the form, then run the handler
pub(super) fn compile_submit(ctx: &Rc<Context>, node: NodeId, wrap: &Rc<NodeWrap>, value: &str) -> CompileResult<()> {
    let source = required_value(ctx, node, Directive::Submit, value)?;
    let compiled = ctx.compiler.statements(source);
    if let Some(error) = compiled.error() {
        return Err(CompileError::malformed("submit", source, error.clone()));
    }

    let this = ctx.weak();
    let scope = wrap.scope();
    ctx.document
        .add_event_listener(node, "submit", move |event: &mut Event| {
            event.prevent_default();
            let Some(ctx) = this.upgrade() else {
                return;
            };
            let fields = ctx.validators_within(node);
            let valid = fields
                .iter()
                .fold(true, |all, field| validate_field(&ctx, field) && all);
            if valid {
                run_handler(&ctx, &compiled, &scope, event);
            } else {
                debug!(fields = fields.len(), "submit blocked by validation");
            }
        });
    Ok(())
}
