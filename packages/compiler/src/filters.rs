use sprig_common::FilterFn;
use sprig_reactive::{format_number, Value};
use std::collections::HashMap;
use std::rc::Rc;

/// Named filters reachable through `expr#name:args`
#[derive(Clone, Default)]
pub struct FilterRegistry {
    filters: HashMap<String, FilterFn>,
}

impl FilterRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the built-in filters
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register("upper", |input, _| Value::String(text_of(input).to_uppercase()));
        registry.register("lower", |input, _| Value::String(text_of(input).to_lowercase()));
        registry.register("trim", |input, _| Value::String(text_of(input).trim().to_string()));
        registry.register("json", json);
        registry.register("default", default);
        registry.register("currency", currency);
        registry.register("truncate", truncate);
        registry.register("join", join);
        registry
    }

    pub fn register(&mut self, name: &str, filter: impl Fn(&Value, &[Value]) -> Value + 'static) {
        self.filters.insert(name.to_string(), Rc::new(filter));
    }

    pub fn insert(&mut self, name: &str, filter: FilterFn) {
        self.filters.insert(name.to_string(), filter);
    }

    pub fn get(&self, name: &str) -> Option<FilterFn> {
        self.filters.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.filters.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Display text of a value; null and undefined render empty
pub fn text_of(value: &Value) -> String {
    if value.is_nullish() {
        String::new()
    } else {
        value.to_string()
    }
}

fn json(input: &Value, args: &[Value]) -> Value {
    let json = input.to_json();
    let pretty = args.first().is_some_and(Value::is_truthy);
    let text = if pretty {
        serde_json::to_string_pretty(&json)
    } else {
        serde_json::to_string(&json)
    };
    text.map(Value::String).unwrap_or(Value::Null)
}

fn default(input: &Value, args: &[Value]) -> Value {
    let empty = input.is_nullish() || input.as_str() == Some("");
    if empty {
        args.first().cloned().unwrap_or_default()
    } else {
        input.clone()
    }
}

/// `currency:symbol,digits`, defaults `$` and 2; thousands are comma separated
fn currency(input: &Value, args: &[Value]) -> Value {
    let amount = input.to_number();
    if !amount.is_finite() {
        return Value::String(String::new());
    }
    let symbol = args.first().map(text_of).unwrap_or_else(|| "$".to_string());
    let digits = args
        .get(1)
        .map(Value::to_number)
        .filter(|d| d.is_finite() && *d >= 0.0)
        .unwrap_or(2.0) as usize;

    let fixed = format!("{:.*}", digits, amount.abs());
    let (whole, fraction) = match fixed.split_once('.') {
        Some((w, f)) => (w.to_string(), Some(f.to_string())),
        None => (fixed, None),
    };
    let mut grouped = String::new();
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if amount < 0.0 { "-" } else { "" };
    Value::String(match fraction {
        Some(f) => format!("{}{}{}.{}", sign, symbol, grouped, f),
        None => format!("{}{}{}", sign, symbol, grouped),
    })
}

/// `truncate:n` keeps at most `n` characters and marks the cut with `...`
fn truncate(input: &Value, args: &[Value]) -> Value {
    let text = text_of(input);
    let Some(limit) = args.first().map(Value::to_number).filter(|n| n.is_finite()) else {
        return Value::String(text);
    };
    let limit = limit.max(0.0) as usize;
    if text.chars().count() <= limit {
        return Value::String(text);
    }
    let mut cut: String = text.chars().take(limit).collect();
    cut.push_str("...");
    Value::String(cut)
}

fn join(input: &Value, args: &[Value]) -> Value {
    let separator = args.first().map(text_of).unwrap_or_else(|| ",".to_string());
    match input {
        Value::Array(items) => Value::String(
            items
                .snapshot()
                .iter()
                .map(text_of)
                .collect::<Vec<_>>()
                .join(&separator),
        ),
        other => Value::String(text_of(other)),
    }
}

/// Number formatting used by `toFixed`
pub fn to_fixed(n: f64, digits: usize) -> String {
    if !n.is_finite() {
        return format_number(n);
    }
    format!("{:.*}", digits, n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprig_reactive::ArrayRef;

    fn apply(name: &str, input: Value, args: &[Value]) -> Value {
        let registry = FilterRegistry::new();
        let filter = registry.get(name).unwrap();
        filter(&input, args)
    }

    #[test]
    fn test_text_filters() {
        assert_eq!(apply("upper", "abc".into(), &[]), Value::from("ABC"));
        assert_eq!(apply("lower", "AbC".into(), &[]), Value::from("abc"));
        assert_eq!(apply("trim", "  x ".into(), &[]), Value::from("x"));
        assert_eq!(apply("upper", Value::Null, &[]), Value::from(""));
    }

    #[test]
    fn test_currency() {
        assert_eq!(apply("currency", 1234567.891.into(), &[]), Value::from("$1,234,567.89"));
        assert_eq!(
            apply("currency", (-5.0).into(), &["€".into(), 0.0.into()]),
            Value::from("-€5")
        );
    }

    #[test]
    fn test_default_truncate_join() {
        assert_eq!(apply("default", Value::Undefined, &["n/a".into()]), Value::from("n/a"));
        assert_eq!(apply("default", 0.0.into(), &["n/a".into()]), Value::Number(0.0));
        assert_eq!(apply("truncate", "abcdef".into(), &[3.0.into()]), Value::from("abc..."));
        assert_eq!(apply("truncate", "abc".into(), &[3.0.into()]), Value::from("abc"));

        let list = Value::Array(ArrayRef::new(vec![1.0.into(), "b".into(), Value::Null]));
        assert_eq!(apply("join", list, &[" | ".into()]), Value::from("1 | b | "));
    }

    #[test]
    fn test_json() {
        let list = Value::Array(ArrayRef::new(vec![1.0.into(), "b".into()]));
        assert_eq!(apply("json", list, &[]), Value::from(r#"[1,"b"]"#));
    }
}
