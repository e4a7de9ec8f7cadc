use crate::directives::DirectiveRegistry;
use crate::dom::{Document, NodeId};
use crate::expression::{CompiledExpression, CompiledTemplate, Env, EvalResult};
use crate::filters::FilterRegistry;
use crate::plan::{sign, Plan};
use sprig_common::FilterFn;
use sprig_parser::Delimiters;
use sprig_reactive::{Scope, Tag, Value};
use std::cell::{Ref, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::trace;

type Cache<T> = RefCell<HashMap<String, Rc<T>>>;

/// Directive catalog, filters and every cache derived from template text
pub struct Compiler {
    directives: DirectiveRegistry,
    filters: RefCell<FilterRegistry>,
    expressions: Cache<CompiledTemplate>,
    styles: Cache<CompiledTemplate>,
    interpolations: Cache<CompiledExpression>,
    statements: Cache<CompiledExpression>,
    /// Plans by sign; entries sharing a sign are told apart by their source
    plans: RefCell<HashMap<u32, Vec<Rc<Plan>>>>,
}

pub fn create_compiler(directives: DirectiveRegistry, filters: FilterRegistry) -> Rc<Compiler> {
    Rc::new(Compiler::new(directives, filters))
}

fn cached<T>(cache: &Cache<T>, source: &str, build: impl FnOnce() -> T) -> Rc<T> {
    if let Some(hit) = cache.borrow().get(source) {
        return hit.clone();
    }
    let compiled = Rc::new(build());
    cache
        .borrow_mut()
        .insert(source.to_string(), compiled.clone());
    compiled
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(DirectiveRegistry::new(), FilterRegistry::new())
    }
}

impl Compiler {
    pub fn new(directives: DirectiveRegistry, filters: FilterRegistry) -> Self {
        Self {
            directives,
            filters: RefCell::new(filters),
            expressions: Default::default(),
            styles: Default::default(),
            interpolations: Default::default(),
            statements: Default::default(),
            plans: Default::default(),
        }
    }

    pub fn directives(&self) -> &DirectiveRegistry {
        &self.directives
    }

    pub fn filters(&self) -> Ref<'_, FilterRegistry> {
        self.filters.borrow()
    }

    pub fn register_filter(&self, name: &str, filter: FilterFn) {
        self.filters.borrow_mut().insert(name, filter);
    }

    /// Interpolation template: literal runs and `{{ }}` segments
    pub fn expression(&self, source: &str) -> Rc<CompiledTemplate> {
        cached(&self.expressions, source, || {
            CompiledTemplate::template(source, Delimiters::MUSTACHE)
        })
    }

    /// Style sheet template with `{% %}` segments
    pub fn style_expression(&self, source: &str) -> Rc<CompiledTemplate> {
        cached(&self.styles, source, || {
            CompiledTemplate::template(source, Delimiters::STYLE)
        })
    }

    /// Single bare expression, as used in directive values
    pub fn interpolation(&self, source: &str) -> Rc<CompiledExpression> {
        cached(&self.interpolations, source, || {
            CompiledExpression::expression(source)
        })
    }

    /// `;`-separated statements for event handlers and `:exec`
    pub fn statements(&self, source: &str) -> Rc<CompiledExpression> {
        cached(&self.statements, source, || {
            CompiledExpression::statements(source)
        })
    }

    pub fn evaluate(&self, compiled: &CompiledExpression, scope: &Scope) -> Value {
        compiled.evaluate(&Env::new(scope, &self.filters()))
    }

    /// Evaluate with every write carrying `tag`
    pub fn evaluate_tagged(&self, compiled: &CompiledExpression, scope: &Scope, tag: Option<Tag>) -> Value {
        compiled.evaluate(&Env::new(scope, &self.filters()).with_tag(tag))
    }

    pub fn render(&self, compiled: &CompiledTemplate, scope: &Scope) -> Value {
        compiled.evaluate(&Env::new(scope, &self.filters()))
    }

    pub fn assign(
        &self,
        compiled: &CompiledExpression,
        value: Value,
        scope: &Scope,
        tag: Option<Tag>,
    ) -> EvalResult<()> {
        compiled.assign(value, &Env::new(scope, &self.filters()).with_tag(tag))
    }

    /// Compile plan of an element, cached by its structural sign
    pub fn plan(&self, document: &Document, node: NodeId) -> Rc<Plan> {
        let tag = document.tag(node).unwrap_or_default();
        let attributes = document.attributes(node);
        let key = match document.sign(node) {
            Some(key) => key,
            None => {
                let key = sign(&tag, &attributes);
                document.set_sign(node, Some(key));
                key
            }
        };

        let hit = self.plans.borrow().get(&key).and_then(|plans| {
            plans
                .iter()
                .find(|plan| plan.built_from(&tag, &attributes))
                .cloned()
        });
        if let Some(plan) = hit {
            trace!(sign = key, "plan cache hit");
            return plan;
        }
        let plan = Rc::new(Plan::build(&self.directives, &tag, &attributes));
        self.plans
            .borrow_mut()
            .entry(key)
            .or_default()
            .push(plan.clone());
        plan
    }

    pub fn cached_plans(&self) -> usize {
        self.plans.borrow().values().map(Vec::len).sum()
    }

    pub fn cached_expressions(&self) -> usize {
        self.expressions.borrow().len() + self.interpolations.borrow().len()
    }
}
