use super::conditional::{conditional, rewrite_chain};
use super::{required_expression, Directive};
use crate::context::Context;
use crate::dom::NodeId;
use crate::error::{CompileError, CompileResult};
use crate::filters::text_of;
use crate::wrap::NodeWrap;
use sprig_reactive::{Function, Value};
use std::rc::Rc;
use tracing::debug;

/// Pathname and search of an href; scheme, host and hash are dropped
pub fn route_path(href: &str) -> &str {
    let without_hash = href.split('#').next().unwrap_or_default();
    match without_hash.find("://") {
        Some(scheme_end) => {
            let rest = &without_hash[scheme_end + 3..];
            match rest.find('/') {
                Some(path_start) => &rest[path_start..],
                None => "/",
            }
        }
        None => without_hash,
    }
}

/// `/regex/`, `[substring]` or an exact path
pub(crate) fn matches_rule(ctx: &Context, path: &str, rule: &str) -> bool {
    let rule = rule.trim();
    let inner = || &rule[1..rule.len() - 1];
    if rule.len() >= 2 && rule.starts_with('/') && rule.ends_with('/') {
        ctx.route_regex(inner()).is_some_and(|re| re.is_match(path))
    } else if rule.len() >= 2 && rule.starts_with('[') && rule.ends_with(']') {
        path.contains(inner())
    } else {
        path == rule
    }
}

/// `$route(rule)`: whether the current location matches; the location read
/// subscribes the calling watcher, so routes re-evaluate on navigation
pub(crate) fn route_function(ctx: &Rc<Context>) -> Value {
    let this = ctx.weak();
    Value::Function(Function::new(move |args| {
        let Some(ctx) = this.upgrade() else {
            return Value::Bool(false);
        };
        let rule = args.first().map(text_of).unwrap_or_default();
        let href = ctx.location();
        Value::Bool(matches_rule(&ctx, route_path(&href), &rule))
    }))
}

fn route_condition(rule: &str) -> String {
    let quoted = serde_json::Value::String(rule.to_string()).to_string();
    format!("$route({})", quoted)
}

pub(super) fn bind_router(ctx: &Rc<Context>, node: NodeId, value: &str) {
    rewrite_chain(
        ctx,
        node,
        vec![route_condition(value)],
        ":elserouter",
        ":routerelse",
        route_condition,
    );
}

pub(super) fn compile_router(ctx: &Rc<Context>, node: NodeId, wrap: &Rc<NodeWrap>, value: &str) -> CompileResult<()> {
    if value.trim().is_empty() {
        let tag = ctx.document.tag(node).unwrap_or_default();
        return Err(CompileError::missing_value("router", tag));
    }
    conditional(ctx, node, wrap, &route_condition(value), Directive::Router)
}

/// `:state="url"`: push a history entry whenever the value changes
pub(super) fn compile_state(ctx: &Rc<Context>, node: NodeId, wrap: &Rc<NodeWrap>, value: &str) -> CompileResult<()> {
    let compiled = required_expression(ctx, node, Directive::State, value)?;
    let this = ctx.weak();
    ctx.watch_expression(wrap, "state", compiled, move |value, _| {
        let Some(ctx) = this.upgrade() else {
            return;
        };
        let url = text_of(&value);
        if url.is_empty() || url == ctx.services.navigator.location() {
            return;
        }
        debug!(url = %url, "push state");
        ctx.services.navigator.push_state(Value::Null, "", &url);
        ctx.set_location(&url);
    });
    Ok(())
}
