//! Template compiler and runtime: live DOM, expressions, directives and views.

mod bindings;
pub mod compiler;
pub mod context;
pub mod directives;
pub mod dom;
pub mod error;
pub mod expression;
pub mod filters;
pub mod plan;
pub mod scheduler;
pub mod traverse;
pub mod view;
pub mod wrap;

pub use compiler::{create_compiler, Compiler};
pub use context::{Context, Services, DEFAULT_DEBOUNCE_MS};
pub use directives::{route_path, Directive, DirectiveRegistry};
pub use dom::{Document, DomSnapshot, Event, NodeId, NodeKind};
pub use error::{CompileError, CompileResult, ViewError, ViewResult};
pub use expression::{CompiledExpression, CompiledTemplate, Env, EvalError, EvalResult};
pub use filters::{text_of, FilterRegistry};
pub use plan::Plan;
pub use scheduler::{Debounce, Scheduler};
pub use traverse::compile;
pub use view::{FilterSource, TemplateSource, View, ViewOptions, ViewState};
pub use wrap::{NodeOptions, NodeWrap, Wraps};
