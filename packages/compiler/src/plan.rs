//! Compile plans: what a node's attributes ask the traverser to do.
//!
//! Building a plan means classifying every attribute by prefix. Loop and
//! conditional clones share their template's attributes, so plans are cached
//! under a structural sign stored on the node itself.

use crate::directives::{Directive, DirectiveRegistry};
use sprig_parser::{has_interpolation, Delimiters};
use tracing::warn;

/// One `:name="value"` attribute resolved to a directive
#[derive(Debug, Clone, PartialEq)]
pub struct DirectiveUse {
    pub directive: Directive,
    pub name: String,
    pub value: String,
}

/// A prefixed attribute with its expression source
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: String,
    pub source: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    /// Sorted by priority, source order among equals
    pub directives: Vec<DirectiveUse>,
    /// `@event="statements"`
    pub events: Vec<Binding>,
    /// `$attr="expr"`
    pub attributes: Vec<Binding>,
    /// `!property="expr"`
    pub styles: Vec<Binding>,
    /// `.class="expr"`
    pub classes: Vec<Binding>,
    /// Plain attributes containing `{{ }}`
    pub templates: Vec<Binding>,
    /// Attribute names removed from the node once compiled
    pub prefixed: Vec<String>,
    /// Tag and attributes the plan was built from
    source: (String, Vec<(String, String)>),
}

impl Plan {
    pub fn build(registry: &DirectiveRegistry, tag: &str, attributes: &[(String, String)]) -> Self {
        let mut plan = Plan {
            source: (tag.to_string(), attributes.to_vec()),
            ..Plan::default()
        };

        for (name, value) in attributes {
            let binding = |name: &str| Binding {
                name: name.to_string(),
                source: value.clone(),
            };

            let Some(first) = name.chars().next() else {
                continue;
            };
            let rest = &name[first.len_utf8()..];

            match first {
                ':' => {
                    plan.prefixed.push(name.clone());
                    match registry.lookup(rest) {
                        Some(directive) => plan.directives.push(DirectiveUse {
                            directive,
                            name: rest.to_string(),
                            value: value.clone(),
                        }),
                        None => warn!(directive = rest, tag, "unknown directive skipped"),
                    }
                }
                '@' => {
                    plan.prefixed.push(name.clone());
                    plan.events.push(binding(rest));
                }
                '$' => {
                    plan.prefixed.push(name.clone());
                    plan.attributes.push(binding(rest));
                }
                '!' => {
                    plan.prefixed.push(name.clone());
                    plan.styles.push(binding(rest));
                }
                '.' => {
                    plan.prefixed.push(name.clone());
                    plan.classes.push(binding(rest));
                }
                _ if has_interpolation(value, Delimiters::MUSTACHE) => {
                    plan.templates.push(binding(name));
                }
                _ => {}
            }
        }

        plan.directives.sort_by_key(|d| d.directive.priority());
        plan
    }

    /// Whether this plan was built for exactly this element shape
    pub fn built_from(&self, tag: &str, attributes: &[(String, String)]) -> bool {
        self.source.0 == tag && self.source.1 == attributes
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
            && self.events.is_empty()
            && self.attributes.is_empty()
            && self.styles.is_empty()
            && self.classes.is_empty()
            && self.templates.is_empty()
    }

    /// Directives that still have to run after `resume_after` already did
    pub fn directives_after(&self, resume_after: Option<Directive>) -> &[DirectiveUse] {
        let Some(done) = resume_after else {
            return &self.directives;
        };
        match self.directives.iter().position(|d| d.directive == done) {
            Some(index) => &self.directives[index + 1..],
            None => &self.directives,
        }
    }
}

/// Whether the traverser consumes an attribute of this name
pub fn is_prefixed(name: &str) -> bool {
    matches!(name.chars().next(), Some(':' | '@' | '$' | '!' | '.'))
}

/// Structural sign of an element: tag plus every attribute, in order
pub fn sign(tag: &str, attributes: &[(String, String)]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(tag.as_bytes());
    for (name, value) in attributes {
        hasher.update(&[0]);
        hasher.update(name.as_bytes());
        hasher.update(&[1]);
        hasher.update(value.as_bytes());
    }
    hasher.finalize()
}
