//! # Directives
//!
//! A directive is a `:name="value"` attribute. Every directive has a fixed
//! priority; on one node they run lowest priority first, all `bind` phases
//! before any `compile` phase.
//!
//! `bind` performs static rewrites that have to happen before siblings are
//! visited (`:elseif`/`:else` become guarded `:if`s). `compile` renders the
//! initial state and installs the watchers that keep it current.
//!
//! Structural directives (`:if`, `:router`, `:for`) take the node out of the
//! tree and leave comment anchors in its place; the clones they render later
//! are compiled again, resuming after the directive that produced them.

mod behavior;
mod conditional;
mod content;
mod form;
mod model;
mod mount;
mod repeat;
mod router;

pub(crate) use router::route_function;
pub use router::route_path;

use crate::context::Context;
use crate::dom::NodeId;
use crate::error::{CompileError, CompileResult};
use crate::expression::CompiledExpression;
use crate::wrap::NodeWrap;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Directive {
    Skip,
    Router,
    Once,
    For,
    Var,
    Lazy,
    If,
    Data,
    Show,
    Mount,
    Prevent,
    Stop,
    Model,
    Pre,
    Html,
    Text,
    Els,
    Fixed,
    Validate,
    Submit,
    Checked,
    State,
    Exec,
}

impl Directive {
    pub const ALL: [Directive; 23] = [
        Directive::Skip,
        Directive::Router,
        Directive::Once,
        Directive::For,
        Directive::Var,
        Directive::Lazy,
        Directive::If,
        Directive::Data,
        Directive::Show,
        Directive::Mount,
        Directive::Prevent,
        Directive::Stop,
        Directive::Model,
        Directive::Pre,
        Directive::Html,
        Directive::Text,
        Directive::Els,
        Directive::Fixed,
        Directive::Validate,
        Directive::Submit,
        Directive::Checked,
        Directive::State,
        Directive::Exec,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Directive::Skip => "skip",
            Directive::Router => "router",
            Directive::Once => "once",
            Directive::For => "for",
            Directive::Var => "var",
            Directive::Lazy => "lazy",
            Directive::If => "if",
            Directive::Data => "data",
            Directive::Show => "show",
            Directive::Mount => "mount",
            Directive::Prevent => "prevent",
            Directive::Stop => "stop",
            Directive::Model => "model",
            Directive::Pre => "pre",
            Directive::Html => "html",
            Directive::Text => "text",
            Directive::Els => "els",
            Directive::Fixed => "fixed",
            Directive::Validate => "validate",
            Directive::Submit => "submit",
            Directive::Checked => "checked",
            Directive::State => "state",
            Directive::Exec => "exec",
        }
    }

    /// Lower runs first
    pub fn priority(self) -> u32 {
        match self {
            Directive::Skip => 0,
            Directive::Router => 1,
            Directive::Once => 2,
            Directive::For => 3,
            Directive::Var => 4,
            Directive::Lazy => 5,
            Directive::If => 6,
            Directive::Data => 10,
            Directive::Show => 11,
            Directive::Mount => 20,
            Directive::Prevent => 21,
            Directive::Stop => 22,
            Directive::Model => 23,
            Directive::Pre => 24,
            Directive::Html => 30,
            Directive::Text => 31,
            Directive::Els => 40,
            Directive::Fixed => 41,
            Directive::Validate => 42,
            Directive::Submit => 43,
            Directive::Checked => 44,
            Directive::State => 45,
            Directive::Exec => 46,
        }
    }
}

/// Name → directive lookup used when planning nodes
#[derive(Debug, Clone)]
pub struct DirectiveRegistry {
    by_name: HashMap<String, Directive>,
}

impl Default for DirectiveRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectiveRegistry {
    /// Registry with the full catalog
    pub fn new() -> Self {
        let by_name = Directive::ALL
            .iter()
            .map(|d| (d.name().to_string(), *d))
            .collect();
        Self { by_name }
    }

    pub fn lookup(&self, name: &str) -> Option<Directive> {
        self.by_name.get(name).copied()
    }

    /// Stop recognizing `name`; its attributes are then skipped as unknown
    pub fn disable(&mut self, name: &str) {
        self.by_name.remove(name);
    }

    /// Make `alias` behave as `directive`
    pub fn alias(&mut self, alias: &str, directive: Directive) {
        self.by_name.insert(alias.to_string(), directive);
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<(u32, String)> = self
            .by_name
            .iter()
            .map(|(name, d)| (d.priority(), name.clone()))
            .collect();
        names.sort();
        names.into_iter().map(|(_, name)| name).collect()
    }
}

/// The trimmed value, or `MissingValue` naming the node's tag
pub(super) fn required_value<'a>(
    ctx: &Context,
    node: NodeId,
    directive: Directive,
    value: &'a str,
) -> CompileResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        let tag = ctx.document.tag(node).unwrap_or_default();
        return Err(CompileError::missing_value(directive.name(), tag));
    }
    Ok(trimmed)
}

/// Compile a directive value as a single expression
pub(super) fn required_expression(
    ctx: &Rc<Context>,
    node: NodeId,
    directive: Directive,
    value: &str,
) -> CompileResult<Rc<CompiledExpression>> {
    let source = required_value(ctx, node, directive, value)?;
    let compiled = ctx.compiler.interpolation(source);
    match compiled.error() {
        Some(error) => Err(CompileError::malformed(directive.name(), source, error.clone())),
        None => Ok(compiled),
    }
}

/// Static rewrite phase
pub(crate) fn bind(ctx: &Rc<Context>, node: NodeId, directive: Directive, value: &str) {
    match directive {
        Directive::If => conditional::bind_if(ctx, node, value),
        Directive::Router => router::bind_router(ctx, node, value),
        _ => {}
    }
}

/// Render and install watchers
pub(crate) fn compile(
    ctx: &Rc<Context>,
    node: NodeId,
    wrap: &Rc<NodeWrap>,
    directive: Directive,
    value: &str,
) -> CompileResult<()> {
    match directive {
        Directive::Skip => {
            wrap.update(|o| o.skip = true);
            Ok(())
        }
        Directive::Once => {
            wrap.update(|o| o.once = true);
            Ok(())
        }
        Directive::Pre => {
            wrap.update(|o| o.pre = true);
            Ok(())
        }
        Directive::Router => router::compile_router(ctx, node, wrap, value),
        Directive::For => repeat::compile_for(ctx, node, wrap, value),
        Directive::Var => content::compile_var(ctx, node, wrap, value),
        Directive::Lazy => behavior::compile_lazy(ctx, node, wrap),
        Directive::If => conditional::compile_if(ctx, node, wrap, value),
        Directive::Data => mount::compile_data(ctx, node, wrap, value),
        Directive::Show => content::compile_show(ctx, node, wrap, value),
        Directive::Mount => mount::compile_mount(ctx, node, wrap, value),
        Directive::Prevent => behavior::compile_prevent(ctx, node, wrap, value),
        Directive::Stop => behavior::compile_stop(ctx, node, wrap, value),
        Directive::Model => model::compile_model(ctx, node, wrap, value),
        Directive::Html => content::compile_html(ctx, node, wrap, value),
        Directive::Text => content::compile_text(ctx, node, wrap, value),
        Directive::Els => behavior::compile_els(ctx, node, value),
        Directive::Fixed => behavior::compile_fixed(ctx, node, wrap),
        Directive::Validate => form::compile_validate(ctx, node, value),
        Directive::Submit => form::compile_submit(ctx, node, wrap, value),
        Directive::Checked => content::compile_checked(ctx, node, wrap, value),
        Directive::State => router::compile_state(ctx, node, wrap, value),
        Directive::Exec => content::compile_exec(ctx, node, wrap, value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priorities_follow_catalog_order() {
        let priorities: Vec<u32> = Directive::ALL.iter().map(|d| d.priority()).collect();
        let mut sorted = priorities.clone();
        sorted.sort();
        assert_eq!(priorities, sorted);
        assert!(Directive::If < Directive::Data);
    }

    #[test]
    fn test_registry_disable_and_alias() {
        let mut registry = DirectiveRegistry::new();
        assert_eq!(registry.lookup("for"), Some(Directive::For));

        registry.disable("html");
        assert_eq!(registry.lookup("html"), None);

        registry.alias("repeat", Directive::For);
        assert_eq!(registry.lookup("repeat"), Some(Directive::For));
        assert_eq!(registry.names().first().map(String::as_str), Some("skip"));
    }
}
