use crate::error::ServiceError;
use crate::result::ServiceResult;
use regex::Regex;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::OnceLock;

/// Validation predicate: `(value, argument) -> valid`
pub type Rule = Rc<dyn Fn(&str, Option<&str>) -> bool>;

/// One `name[:argument]` entry of a `:validate` attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleCall {
    pub name: String,
    pub argument: Option<String>,
}

/// Parse `"required minlength:3 pattern:^[a-z]+$"` into rule calls
pub fn parse_rules(spec: &str) -> Vec<RuleCall> {
    spec.split_whitespace()
        .map(|entry| match entry.split_once(':') {
            Some((name, argument)) => RuleCall {
                name: name.to_string(),
                argument: Some(argument.to_string()),
            },
            None => RuleCall {
                name: entry.to_string(),
                argument: None,
            },
        })
        .collect()
}

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)+$").expect("email pattern")
    })
}

fn url_regex() -> &'static Regex {
    static URL: OnceLock<Regex> = OnceLock::new();
    URL.get_or_init(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.\-]*://[^\s/?#]+[^\s]*$").expect("url pattern"))
}

/// Named validation predicates. Every rule except `required` accepts an empty value.
#[derive(Clone)]
pub struct RuleRegistry {
    rules: HashMap<String, Rule>,
}

impl RuleRegistry {
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// Registry with the built-in rules
    pub fn new() -> Self {
        let mut registry = Self::empty();

        registry.register("required", |value, _| !value.trim().is_empty());
        registry.register("email", |value, _| value.is_empty() || email_regex().is_match(value));
        registry.register("url", |value, _| value.is_empty() || url_regex().is_match(value));
        registry.register("number", |value, _| {
            value.is_empty() || value.trim().parse::<f64>().is_ok_and(f64::is_finite)
        });
        registry.register("integer", |value, _| {
            value.is_empty() || value.trim().parse::<i64>().is_ok()
        });
        registry.register("pattern", |value, arg| {
            value.is_empty()
                || arg
                    .and_then(|p| Regex::new(&format!("^(?:{})$", p)).ok())
                    .is_some_and(|re| re.is_match(value))
        });
        registry.register("min", |value, arg| {
            value.is_empty() || compare_number(value, arg, |v, limit| v >= limit)
        });
        registry.register("max", |value, arg| {
            value.is_empty() || compare_number(value, arg, |v, limit| v <= limit)
        });
        registry.register("minlength", |value, arg| {
            value.is_empty() || compare_length(value, arg, |len, limit| len >= limit)
        });
        registry.register("maxlength", |value, arg| {
            compare_length(value, arg, |len, limit| len <= limit)
        });

        registry
    }

    pub fn register(&mut self, name: &str, rule: impl Fn(&str, Option<&str>) -> bool + 'static) {
        self.rules.insert(name.to_string(), Rc::new(rule));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    pub fn check(&self, call: &RuleCall, value: &str) -> ServiceResult<bool> {
        let rule = self
            .rules
            .get(&call.name)
            .ok_or_else(|| ServiceError::UnknownRule(call.name.clone()))?;
        Ok(rule(value, call.argument.as_deref()))
    }

    /// Names of the rules `value` fails
    pub fn validate(&self, calls: &[RuleCall], value: &str) -> ServiceResult<Vec<String>> {
        let mut failures = Vec::new();
        for call in calls {
            if !self.check(call, value)? {
                failures.push(call.name.clone());
            }
        }
        Ok(failures)
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn compare_number(value: &str, arg: Option<&str>, cmp: impl Fn(f64, f64) -> bool) -> bool {
    let Some(limit) = arg.and_then(|a| a.trim().parse::<f64>().ok()) else {
        return false;
    };
    value
        .trim()
        .parse::<f64>()
        .is_ok_and(|v| cmp(v, limit))
}

fn compare_length(value: &str, arg: Option<&str>, cmp: impl Fn(usize, usize) -> bool) -> bool {
    arg.and_then(|a| a.trim().parse::<usize>().ok())
        .is_some_and(|limit| cmp(value.chars().count(), limit))
}
