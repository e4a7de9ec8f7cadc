//! Expression interpreter.
//!
//! Parsed expressions are evaluated against a [`Scope`] chain. Every read of
//! an observed value goes through the reactive layer, so evaluating inside a
//! watcher subscribes it to exactly what the expression touched.

use crate::filters::{text_of, to_fixed, FilterRegistry};
use sprig_parser::{
    parse_expression, parse_statements, parse_template, BinaryOp, Delimiters, Expression,
    ParseError, Span, Template, TemplatePart, UnaryOp,
};
use sprig_reactive::{ArrayRef, ObjectRef, ReactiveError, Scope, Tag, Value};
use std::cmp::Ordering;
use thiserror::Error;
use tracing::warn;

pub type EvalResult<T> = Result<T, EvalError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("Cannot read property '{property}' of {kind} at {span:?}")]
    NullAccess {
        property: String,
        kind: &'static str,
        span: Span,
    },

    #[error("'{name}' is not a function at {span:?}")]
    NotCallable { name: String, span: Span },

    #[error("'{method}' is not a method of {kind} at {span:?}")]
    UnknownMethod {
        method: String,
        kind: &'static str,
        span: Span,
    },

    #[error("Unknown filter '{name}' at {span:?}")]
    UnknownFilter { name: String, span: Span },

    #[error("Cannot assign to this target at {span:?}")]
    InvalidTarget { span: Span },

    #[error("Syntax error: {0}")]
    Syntax(ParseError),

    #[error(transparent)]
    Reactive(#[from] ReactiveError),
}

/// What an expression sees while it runs
#[derive(Clone, Copy)]
pub struct Env<'a> {
    pub scope: &'a Scope,
    pub filters: &'a FilterRegistry,
    /// Attached to every write the expression performs
    pub tag: Option<Tag>,
}

impl<'a> Env<'a> {
    pub fn new(scope: &'a Scope, filters: &'a FilterRegistry) -> Self {
        Self {
            scope,
            filters,
            tag: None,
        }
    }

    pub fn with_tag(mut self, tag: Option<Tag>) -> Self {
        self.tag = tag;
        self
    }
}

/// Source text together with its parse result; failures are kept so a
/// broken binding warns on each evaluation instead of on compile
#[derive(Debug, Clone)]
pub struct Compiled<T> {
    source: String,
    parsed: Result<T, ParseError>,
}

impl<T> Compiled<T> {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn error(&self) -> Option<&ParseError> {
        self.parsed.as_ref().err()
    }

    pub fn is_ok(&self) -> bool {
        self.parsed.is_ok()
    }
}

/// A bare expression or `;`-separated statements
pub type CompiledExpression = Compiled<Expression>;

/// Literal runs and interpolated segments
pub type CompiledTemplate = Compiled<Template>;

impl Compiled<Expression> {
    pub fn expression(source: &str) -> Self {
        Self {
            source: source.to_string(),
            parsed: parse_expression(source),
        }
    }

    pub fn statements(source: &str) -> Self {
        Self {
            source: source.to_string(),
            parsed: parse_statements(source),
        }
    }

    pub fn ast(&self) -> Option<&Expression> {
        self.parsed.as_ref().ok()
    }

    pub fn try_evaluate(&self, env: &Env) -> EvalResult<Value> {
        match &self.parsed {
            Ok(expr) => evaluate(expr, env),
            Err(err) => Err(EvalError::Syntax(err.clone())),
        }
    }

    /// Evaluate; failures are logged and yield `null`
    pub fn evaluate(&self, env: &Env) -> Value {
        self.try_evaluate(env).unwrap_or_else(|err| {
            warn!(source = %self.source, error = %err, "expression failed");
            Value::Null
        })
    }

    /// Write `value` to the location the expression names
    pub fn assign(&self, value: Value, env: &Env) -> EvalResult<()> {
        match &self.parsed {
            Ok(expr) => assign(expr, value, env),
            Err(err) => Err(EvalError::Syntax(err.clone())),
        }
    }
}

impl Compiled<Template> {
    pub fn template(source: &str, delimiters: Delimiters) -> Self {
        Self {
            source: source.to_string(),
            parsed: parse_template(source, delimiters),
        }
    }

    pub fn try_evaluate(&self, env: &Env) -> EvalResult<Value> {
        let template = self.parsed.as_ref().map_err(|e| EvalError::Syntax(e.clone()))?;
        let mut out = String::new();
        for part in &template.parts {
            match part {
                TemplatePart::Literal(text) => out.push_str(text),
                TemplatePart::Expression(expr) => out.push_str(&text_of(&evaluate(expr, env)?)),
            }
        }
        Ok(Value::String(out))
    }

    /// Concatenated text; failures are logged and yield `null`
    pub fn evaluate(&self, env: &Env) -> Value {
        self.try_evaluate(env).unwrap_or_else(|err| {
            warn!(source = %self.source, error = %err, "template failed");
            Value::Null
        })
    }
}

/// Evaluate an expression tree
pub fn evaluate(expr: &Expression, env: &Env) -> EvalResult<Value> {
    match expr {
        Expression::Literal { value, .. } => Ok(Value::String(value.clone())),
        Expression::Number { value, .. } => Ok(Value::Number(*value)),
        Expression::Boolean { value, .. } => Ok(Value::Bool(*value)),
        Expression::Null { .. } => Ok(Value::Null),
        Expression::Undefined { .. } => Ok(Value::Undefined),

        Expression::Variable { name, .. } => Ok(env.scope.resolve(name)),

        Expression::Member {
            object,
            property,
            span,
        } => {
            let target = evaluate(object, env)?;
            read_property(&target, property, *span)
        }

        Expression::Index {
            object,
            index,
            span,
        } => {
            let target = evaluate(object, env)?;
            let key = evaluate(index, env)?;
            read_index(&target, &key, *span)
        }

        Expression::Call {
            callee,
            arguments,
            span,
        } => {
            let args = arguments
                .iter()
                .map(|a| evaluate(a, env))
                .collect::<EvalResult<Vec<_>>>()?;
            call(callee, args, env, *span)
        }

        Expression::Unary {
            operator, operand, ..
        } => {
            let value = evaluate(operand, env)?;
            Ok(match operator {
                UnaryOp::Not => Value::Bool(!value.is_truthy()),
                UnaryOp::Negate => Value::Number(-value.to_number()),
                UnaryOp::Plus => Value::Number(value.to_number()),
            })
        }

        Expression::Binary {
            left,
            operator,
            right,
            ..
        } => match operator {
            BinaryOp::And => {
                let l = evaluate(left, env)?;
                if l.is_truthy() {
                    evaluate(right, env)
                } else {
                    Ok(l)
                }
            }
            BinaryOp::Or => {
                let l = evaluate(left, env)?;
                if l.is_truthy() {
                    Ok(l)
                } else {
                    evaluate(right, env)
                }
            }
            op => {
                let l = evaluate(left, env)?;
                let r = evaluate(right, env)?;
                Ok(binary(*op, &l, &r))
            }
        },

        Expression::Conditional {
            test,
            consequent,
            alternate,
            ..
        } => {
            if evaluate(test, env)?.is_truthy() {
                evaluate(consequent, env)
            } else {
                evaluate(alternate, env)
            }
        }

        Expression::Array { items, .. } => {
            let values = items
                .iter()
                .map(|i| evaluate(i, env))
                .collect::<EvalResult<Vec<_>>>()?;
            Ok(Value::Array(ArrayRef::new(values)))
        }

        Expression::Object { entries, .. } => {
            let mut values = Vec::with_capacity(entries.len());
            for (key, value) in entries {
                values.push((key.clone(), evaluate(value, env)?));
            }
            Ok(Value::Object(values.into_iter().collect::<ObjectRef>()))
        }

        Expression::Assign { target, value, .. } => {
            let value = evaluate(value, env)?;
            assign(target, value.clone(), env)?;
            Ok(value)
        }

        Expression::Filter {
            input,
            name,
            arguments,
            span,
        } => {
            let input = evaluate(input, env)?;
            let args = arguments
                .iter()
                .map(|a| evaluate(a, env))
                .collect::<EvalResult<Vec<_>>>()?;
            let filter = env.filters.get(name).ok_or_else(|| EvalError::UnknownFilter {
                name: name.clone(),
                span: *span,
            })?;
            Ok(filter(&input, &args))
        }

        Expression::Sequence { items, .. } => {
            let mut last = Value::Undefined;
            for item in items {
                last = evaluate(item, env)?;
            }
            Ok(last)
        }
    }
}

/// Write to a variable, member or index target
pub fn assign(target: &Expression, value: Value, env: &Env) -> EvalResult<()> {
    match target {
        Expression::Variable { name, .. } => {
            env.scope.assign_tagged(name, value, env.tag)?;
        }
        Expression::Member {
            object,
            property,
            span,
        } => match evaluate(object, env)? {
            Value::Object(obj) => obj.set_tagged(property, value, env.tag)?,
            other => {
                return Err(EvalError::NullAccess {
                    property: property.clone(),
                    kind: other.type_of(),
                    span: *span,
                })
            }
        },
        Expression::Index {
            object,
            index,
            span,
        } => {
            let key = evaluate(index, env)?;
            match evaluate(object, env)? {
                Value::Array(arr) => match array_index(&key) {
                    Some(i) => arr.set_index_tagged(i, value, env.tag)?,
                    None => return Err(EvalError::InvalidTarget { span: *span }),
                },
                Value::Object(obj) => obj.set_tagged(&text_of(&key), value, env.tag)?,
                _ => return Err(EvalError::InvalidTarget { span: *span }),
            }
        }
        other => return Err(EvalError::InvalidTarget { span: other.span() }),
    }
    Ok(())
}

fn array_index(key: &Value) -> Option<usize> {
    let n = key.to_number();
    (n.is_finite() && n >= 0.0 && n.fract() == 0.0).then_some(n as usize)
}

fn read_property(target: &Value, property: &str, span: Span) -> EvalResult<Value> {
    match target {
        Value::Undefined | Value::Null => Err(EvalError::NullAccess {
            property: property.to_string(),
            kind: target.type_of(),
            span,
        }),
        Value::Object(obj) => Ok(obj.get(property)),
        Value::Array(arr) if property == "length" => Ok(Value::from(arr.len())),
        Value::String(s) if property == "length" => Ok(Value::from(s.chars().count())),
        _ => Ok(Value::Undefined),
    }
}

fn read_index(target: &Value, key: &Value, span: Span) -> EvalResult<Value> {
    match target {
        Value::Array(arr) => Ok(match array_index(key) {
            Some(i) => arr.get(i),
            None => read_property(target, &text_of(key), span)?,
        }),
        Value::String(s) => Ok(match array_index(key) {
            Some(i) => s
                .chars()
                .nth(i)
                .map(|c| Value::String(c.to_string()))
                .unwrap_or_default(),
            None => read_property(target, &text_of(key), span)?,
        }),
        _ => read_property(target, &text_of(key), span),
    }
}

fn call(callee: &Expression, args: Vec<Value>, env: &Env, span: Span) -> EvalResult<Value> {
    if let Expression::Member {
        object, property, ..
    } = callee
    {
        let receiver = evaluate(object, env)?;
        if let Value::Object(obj) = &receiver {
            if let Value::Function(f) = obj.get(property) {
                return Ok(f.call(&args));
            }
        }
        return call_method(&receiver, property, &args, span);
    }

    match evaluate(callee, env)? {
        Value::Function(f) => Ok(f.call(&args)),
        _ => Err(EvalError::NotCallable {
            name: callee_name(callee),
            span,
        }),
    }
}

fn callee_name(callee: &Expression) -> String {
    match callee {
        Expression::Variable { name, .. } => name.clone(),
        Expression::Member { property, .. } => property.clone(),
        _ => "expression".to_string(),
    }
}

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or_default()
}

/// Resolve a possibly negative, possibly missing slice bound against `len`
fn bound(value: Option<&Value>, len: usize, default: usize) -> usize {
    match value {
        None | Some(Value::Undefined) => default,
        Some(v) => {
            let n = v.to_number();
            if n.is_nan() {
                0
            } else if n < 0.0 {
                (len as f64 + n).max(0.0) as usize
            } else {
                (n as usize).min(len)
            }
        }
    }
}

fn call_method(receiver: &Value, method: &str, args: &[Value], span: Span) -> EvalResult<Value> {
    let unknown = || EvalError::UnknownMethod {
        method: method.to_string(),
        kind: receiver.type_of(),
        span,
    };

    match receiver {
        Value::Undefined | Value::Null => Err(EvalError::NullAccess {
            property: method.to_string(),
            kind: receiver.type_of(),
            span,
        }),

        Value::String(s) => Ok(match method {
            "toUpperCase" => Value::String(s.to_uppercase()),
            "toLowerCase" => Value::String(s.to_lowercase()),
            "trim" => Value::String(s.trim().to_string()),
            "toString" => Value::String(s.clone()),
            "includes" => Value::Bool(s.contains(&text_of(&arg(args, 0)))),
            "startsWith" => Value::Bool(s.starts_with(&text_of(&arg(args, 0)))),
            "endsWith" => Value::Bool(s.ends_with(&text_of(&arg(args, 0)))),
            "indexOf" => {
                let needle = text_of(&arg(args, 0));
                match s.find(&needle) {
                    Some(byte) => Value::from(s[..byte].chars().count()),
                    None => Value::Number(-1.0),
                }
            }
            "slice" => {
                let chars: Vec<char> = s.chars().collect();
                let start = bound(args.first(), chars.len(), 0);
                let end = bound(args.get(1), chars.len(), chars.len());
                Value::String(chars[start..end.max(start)].iter().collect())
            }
            "split" => {
                let parts: Vec<Value> = match args.first() {
                    None | Some(Value::Undefined) => vec![Value::String(s.clone())],
                    Some(sep) => {
                        let sep = text_of(sep);
                        if sep.is_empty() {
                            s.chars().map(|c| Value::String(c.to_string())).collect()
                        } else {
                            s.split(sep.as_str()).map(Value::from).collect()
                        }
                    }
                };
                Value::Array(ArrayRef::new(parts))
            }
            _ => return Err(unknown()),
        }),

        Value::Number(n) => Ok(match method {
            "toFixed" => {
                let digits = arg(args, 0).to_number();
                let digits = if digits.is_finite() { digits.clamp(0.0, 100.0) } else { 0.0 };
                Value::String(to_fixed(*n, digits as usize))
            }
            "toString" => Value::String(receiver.to_string()),
            _ => return Err(unknown()),
        }),

        Value::Array(arr) => array_method(arr, method, args).ok_or_else(unknown)?,

        Value::Object(obj) => match method {
            "keys" => Ok(Value::Array(ArrayRef::new(
                obj.keys().into_iter().map(Value::String).collect(),
            ))),
            "hasOwnProperty" => Ok(Value::Bool(obj.contains_key(&text_of(&arg(args, 0))))),
            _ => Err(EvalError::NotCallable {
                name: method.to_string(),
                span,
            }),
        },

        Value::Bool(_) | Value::Function(_) => match method {
            "toString" => Ok(Value::String(receiver.to_string())),
            _ => Err(unknown()),
        },
    }
}

/// Built-in array methods; `None` for an unknown name
fn array_method(arr: &ArrayRef, method: &str, args: &[Value]) -> Option<EvalResult<Value>> {
    let result: EvalResult<Value> = match method {
        "join" => {
            let sep = match args.first() {
                None | Some(Value::Undefined) => ",".to_string(),
                Some(v) => text_of(v),
            };
            Ok(Value::String(
                arr.entries()
                    .iter()
                    .map(|(_, v)| text_of(v))
                    .collect::<Vec<_>>()
                    .join(&sep),
            ))
        }
        "indexOf" => {
            let needle = arg(args, 0);
            Ok(arr
                .entries()
                .iter()
                .position(|(_, v)| v.strict_eq(&needle))
                .map(Value::from)
                .unwrap_or(Value::Number(-1.0)))
        }
        "includes" => {
            let needle = arg(args, 0);
            Ok(Value::Bool(
                arr.entries().iter().any(|(_, v)| v.same_value(&needle)),
            ))
        }
        "slice" => {
            let items: Vec<Value> = arr.entries().into_iter().map(|(_, v)| v).collect();
            let start = bound(args.first(), items.len(), 0);
            let end = bound(args.get(1), items.len(), items.len());
            Ok(Value::Array(ArrayRef::new(
                items[start..end.max(start)].to_vec(),
            )))
        }
        "push" => arr
            .push(args.to_vec())
            .map(Value::from)
            .map_err(EvalError::from),
        "pop" => arr.pop().map_err(EvalError::from),
        "shift" => arr.shift().map_err(EvalError::from),
        "unshift" => arr
            .unshift(args.to_vec())
            .map(Value::from)
            .map_err(EvalError::from),
        "splice" => {
            let start = arg(args, 0).to_number();
            let start = if start.is_finite() { start as i64 } else { 0 };
            let delete = match args.get(1) {
                None => arr.len(),
                Some(v) => v.to_number().max(0.0) as usize,
            };
            let items = args.iter().skip(2).cloned().collect();
            arr.splice(start, delete, items)
                .map(|removed| Value::Array(ArrayRef::new(removed)))
                .map_err(EvalError::from)
        }
        "sort" => match args.first() {
            Some(Value::Function(compare)) => {
                let compare = compare.clone();
                arr.sort_by(|a, b| {
                    let n = compare.call(&[a.clone(), b.clone()]).to_number();
                    n.partial_cmp(&0.0).unwrap_or(Ordering::Equal)
                })
                .map(|_| Value::Array(arr.clone()))
                .map_err(EvalError::from)
            }
            _ => arr
                .sort()
                .map(|_| Value::Array(arr.clone()))
                .map_err(EvalError::from),
        },
        "reverse" => arr
            .reverse()
            .map(|_| Value::Array(arr.clone()))
            .map_err(EvalError::from),
        "$set" => match array_index(&arg(args, 0)) {
            Some(i) => arr
                .set_index(i, arg(args, 1))
                .map(|_| arg(args, 1))
                .map_err(EvalError::from),
            None => Ok(Value::Undefined),
        },
        _ => return None,
    };
    Some(result)
}

fn binary(op: BinaryOp, l: &Value, r: &Value) -> Value {
    match op {
        BinaryOp::Add => {
            let textual = |v: &Value| {
                matches!(v, Value::String(_) | Value::Array(_) | Value::Object(_) | Value::Function(_))
            };
            if textual(l) || textual(r) {
                Value::String(format!("{}{}", l, r))
            } else {
                Value::Number(l.to_number() + r.to_number())
            }
        }
        BinaryOp::Subtract => Value::Number(l.to_number() - r.to_number()),
        BinaryOp::Multiply => Value::Number(l.to_number() * r.to_number()),
        BinaryOp::Divide => Value::Number(l.to_number() / r.to_number()),
        BinaryOp::Remainder => Value::Number(l.to_number() % r.to_number()),
        BinaryOp::Equals => Value::Bool(l.loose_eq(r)),
        BinaryOp::NotEquals => Value::Bool(!l.loose_eq(r)),
        BinaryOp::StrictEquals => Value::Bool(l.strict_eq(r)),
        BinaryOp::StrictNotEquals => Value::Bool(!l.strict_eq(r)),
        BinaryOp::LessThan => compare(l, r, |o| o == Ordering::Less),
        BinaryOp::LessThanOrEqual => compare(l, r, |o| o != Ordering::Greater),
        BinaryOp::GreaterThan => compare(l, r, |o| o == Ordering::Greater),
        BinaryOp::GreaterThanOrEqual => compare(l, r, |o| o != Ordering::Less),
        // short-circuit forms are handled by the caller
        BinaryOp::And => Value::Bool(l.is_truthy() && r.is_truthy()),
        BinaryOp::Or => Value::Bool(l.is_truthy() || r.is_truthy()),
    }
}

fn compare(l: &Value, r: &Value, accept: impl Fn(Ordering) -> bool) -> Value {
    let ordering = match (l, r) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => l.to_number().partial_cmp(&r.to_number()),
    };
    Value::Bool(ordering.is_some_and(accept))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sprig_reactive::{Bucket, Reactor};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn scope(reactor: &Rc<Reactor>, data: serde_json::Value) -> Scope {
        let Value::Object(obj) = Value::from_json(&data) else {
            panic!("Expected object data");
        };
        Scope::root(reactor, obj, "root")
    }

    fn eval(scope: &Scope, source: &str) -> Value {
        let filters = FilterRegistry::new();
        Compiled::statements(source).evaluate(&Env::new(scope, &filters))
    }

    #[test]
    fn test_arithmetic_and_coercion() {
        let reactor = Reactor::new();
        let s = scope(&reactor, json!({"n": 4, "name": "ada"}));

        assert_eq!(eval(&s, "1 + 2 * 3"), Value::Number(7.0));
        assert_eq!(eval(&s, "'n=' + n"), Value::from("n=4"));
        assert_eq!(eval(&s, "n % 3 === 1"), Value::Bool(true));
        assert_eq!(eval(&s, "'2' == 2"), Value::Bool(true));
        assert_eq!(eval(&s, "'2' === 2"), Value::Bool(false));
        assert_eq!(eval(&s, "missing || 'fallback'"), Value::from("fallback"));
        assert_eq!(eval(&s, "n > 3 ? name.toUpperCase() : ''"), Value::from("ADA"));
        assert_eq!(eval(&s, "1 / 0"), Value::Number(f64::INFINITY));
    }

    #[test]
    fn test_template_renders_nullish_as_empty() {
        let reactor = Reactor::new();
        let s = scope(&reactor, json!({"user": {"name": "ada"}}));
        let filters = FilterRegistry::new();
        let env = Env::new(&s, &filters);

        let t = Compiled::template("Hi {{ user.name#upper }}{{ user.age }}!", Delimiters::MUSTACHE);
        assert_eq!(t.evaluate(&env), Value::from("Hi ADA!"));
        assert_eq!(
            Compiled::template("{{1+1}}", Delimiters::MUSTACHE).evaluate(&env),
            Value::from("2")
        );
    }

    #[test]
    fn test_errors_yield_null() {
        let reactor = Reactor::new();
        let s = scope(&reactor, json!({}));

        assert_eq!(eval(&s, "nothing.here"), Value::Null);
        assert_eq!(eval(&s, "x#nosuchfilter"), Value::Null);
        assert_eq!(eval(&s, "1 +"), Value::Null);
        assert_eq!(eval(&s, "notAFunction()"), Value::Null);
    }

    #[test]
    fn test_assignments_and_array_methods() {
        let reactor = Reactor::new();
        let s = scope(&reactor, json!({"count": 1, "list": [3, 1, 2], "user": {}}));

        eval(&s, "count = count + 1; user.name = 'ada'; list.push(4); list[0] = 9");
        assert_eq!(s.resolve("count"), Value::Number(2.0));
        assert_eq!(eval(&s, "user.name"), Value::from("ada"));
        assert_eq!(eval(&s, "list.join('-')"), Value::from("9-1-2-4"));
        assert_eq!(eval(&s, "list.slice(-2).length"), Value::Number(2.0));
        assert_eq!(eval(&s, "list.indexOf(2)"), Value::Number(2.0));
        assert_eq!(eval(&s, "'a,b'.split(',').length"), Value::Number(2.0));
        assert_eq!(eval(&s, "(2.345).toFixed(1)"), Value::from("2.3"));
    }

    #[test]
    fn test_reads_subscribe_the_running_watcher() {
        let reactor = Reactor::new();
        let s = scope(&reactor, json!({"flag": true, "a": "A", "b": "B"}));
        let filters = Rc::new(FilterRegistry::new());
        let seen = Rc::new(RefCell::new(Vec::new()));

        let compiled = Rc::new(Compiled::expression("flag ? a : b"));
        let (scope2, filters2, sink) = (s.clone(), filters.clone(), seen.clone());
        reactor.watch(
            &Bucket::new(),
            move || compiled.evaluate(&Env::new(&scope2, &filters2)),
            move |value, _| sink.borrow_mut().push(value.to_string()),
        );

        s.assign("b", Value::from("B2")).unwrap();
        s.assign("a", Value::from("A2")).unwrap();
        s.assign("flag", Value::Bool(false)).unwrap();
        assert_eq!(*seen.borrow(), vec!["A", "A2", "B2"]);
    }
}
