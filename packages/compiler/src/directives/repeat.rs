//! `:for` loops.
//!
//! The template node is replaced by a pair of comment anchors. Every run of
//! the loop watcher produces the keyed entry list, which is reconciled
//! against the rendered items: vanished keys are disposed, kept keys are
//! updated in place and only moved when they fall outside the longest
//! increasing run of old positions, new keys are cloned and compiled.

use super::{required_value, Directive};
use crate::context::Context;
use crate::dom::NodeId;
use crate::error::{CompileError, CompileResult};
use crate::expression::{evaluate, Env};
use crate::traverse::compile_node;
use crate::wrap::NodeWrap;
use sprig_parser::{parse_for_clause, Expression, ForClause, ForMode, ForSource};
use sprig_reactive::{child_path, format_number, Scope, Value};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use tracing::{debug, warn};

/// Identity of a rendered item
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ItemKey {
    /// Array element id
    Id(u64),
    /// Object key path or range value
    Key(String),
    /// Position, for `in` over arrays
    Index(usize),
}

struct Entry {
    key: ItemKey,
    vars: Vec<(String, Value)>,
}

struct Item {
    key: ItemKey,
    /// First node of the item's range; the range runs up to the next item
    first: NodeId,
    scope: Scope,
}

struct Loop {
    template: NodeId,
    end: NodeId,
    scope: Scope,
    once: bool,
    items: RefCell<Vec<Item>>,
}

pub(super) fn compile_for(ctx: &Rc<Context>, node: NodeId, wrap: &Rc<NodeWrap>, value: &str) -> CompileResult<()> {
    let source = required_value(ctx, node, Directive::For, value)?;
    let clause = parse_for_clause(source).map_err(|error| CompileError::malformed("for", source, error))?;

    let document = &ctx.document;
    let Some(parent) = document.parent(node) else {
        warn!("`:for` node has no parent");
        wrap.update(|o| o.removed = true);
        return Ok(());
    };

    let template = document.clone_node(node, true);
    let start = document.create_comment("for");
    let end = document.create_comment("/for");
    document.insert_before(parent, start, Some(node));
    document.insert_before(parent, end, Some(node));
    wrap.update(|o| o.removed = true);
    ctx.discard(node);

    let scope = wrap.scope();
    let once = wrap.options().once;
    let anchor_wrap = ctx.wraps.wrap(start, &scope);
    if once {
        anchor_wrap.update(|o| o.once = true);
    }
    let pristine = document.clone();
    anchor_wrap.on_dispose(move || pristine.release(template));

    let state = Rc::new(Loop {
        template,
        end,
        scope: scope.clone(),
        once,
        items: RefCell::new(Vec::new()),
    });
    let clause = Rc::new(clause);
    let (reader, writer) = (ctx.weak(), ctx.weak());

    ctx.watch(
        &anchor_wrap,
        "for",
        move || match reader.upgrade() {
            Some(ctx) => collect_entries(&ctx, &clause, &scope),
            None => Vec::new(),
        },
        move |entries, _| {
            if let Some(ctx) = writer.upgrade() {
                reconcile(&ctx, &state, entries);
            }
        },
    );
    Ok(())
}

fn named(names: &[String], values: Vec<Value>) -> Vec<(String, Value)> {
    names.iter().cloned().zip(values).collect()
}

/// Keyed item variables; every read is tracked by the loop watcher
fn collect_entries(ctx: &Context, clause: &ForClause, scope: &Scope) -> Vec<Entry> {
    let filters = ctx.compiler.filters();
    let env = Env::new(scope, &filters);
    let eval = |expr: &Expression| {
        evaluate(expr, &env).unwrap_or_else(|err| {
            warn!(error = %err, "`:for` source failed");
            Value::Null
        })
    };
    let names = &clause.names;

    let source = match &clause.source {
        ForSource::Range { start, end } => {
            let (from, to) = (eval(start).to_number(), eval(end).to_number());
            if !from.is_finite() || !to.is_finite() {
                warn!(from, to, "`:for` range bounds are not numbers");
                return Vec::new();
            }
            let mut entries = Vec::new();
            let mut n = from;
            while n <= to {
                let index = entries.len();
                entries.push(Entry {
                    key: ItemKey::Key(format_number(n)),
                    vars: named(names, vec![Value::Number(n), Value::from(index)]),
                });
                n += 1.0;
            }
            return entries;
        }
        ForSource::Expression(expr) => eval(expr),
    };

    match (clause.mode, source) {
        (_, value) if value.is_nullish() => Vec::new(),
        (ForMode::Of, Value::Array(items)) => items
            .entries()
            .into_iter()
            .enumerate()
            .map(|(index, (id, value))| Entry {
                key: ItemKey::Id(id),
                vars: named(names, vec![value, Value::from(index)]),
            })
            .collect(),
        (ForMode::In, Value::Object(object)) => object
            .keys()
            .into_iter()
            .enumerate()
            .map(|(index, key)| {
                let value = object.get(&key);
                let identity = match object.path() {
                    Some(path) => child_path(&path, &key),
                    None => key.clone(),
                };
                Entry {
                    key: ItemKey::Key(identity),
                    vars: named(names, vec![Value::from(key), value, Value::from(index)]),
                }
            })
            .collect(),
        (ForMode::In, Value::Array(items)) => items
            .entries()
            .into_iter()
            .enumerate()
            .map(|(index, (_, value))| Entry {
                key: ItemKey::Index(index),
                vars: named(names, vec![Value::from(index), value, Value::from(index)]),
            })
            .collect(),
        (mode, other) => {
            warn!(kind = other.type_of(), ?mode, "`:for` source is not iterable");
            Vec::new()
        }
    }
}

fn reconcile(ctx: &Rc<Context>, state: &Loop, entries: Vec<Entry>) {
    let document = &ctx.document;
    let Some(parent) = document.parent(state.end) else {
        return;
    };
    let old = std::mem::take(&mut *state.items.borrow_mut());

    let ranges: Vec<Vec<NodeId>> = old
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let stop = old.get(i + 1).map_or(state.end, |next| next.first);
            let mut nodes = Vec::new();
            let mut cursor = Some(item.first);
            while let Some(node) = cursor.filter(|n| *n != stop) {
                nodes.push(node);
                cursor = document.next_sibling(node);
            }
            nodes
        })
        .collect();

    let kept: HashSet<&ItemKey> = entries.iter().map(|e| &e.key).collect();
    let mut removed = 0;
    for (item, range) in old.iter().zip(&ranges) {
        if !kept.contains(&item.key) {
            for node in range {
                ctx.discard(*node);
            }
            removed += 1;
        }
    }

    let old_index: HashMap<&ItemKey, usize> = old.iter().enumerate().map(|(i, item)| (&item.key, i)).collect();
    let sources: Vec<Option<usize>> = entries.iter().map(|e| old_index.get(&e.key).copied()).collect();
    drop(old_index);
    drop(kept);
    let stable = longest_increasing_subsequence(&sources);

    let mut slots: Vec<Option<Item>> = old.into_iter().map(Some).collect();
    let mut rendered: Vec<Option<Item>> = std::iter::repeat_with(|| None).take(entries.len()).collect();
    let mut next_ref = state.end;
    let (mut created, mut moved) = (0, 0);

    for (position, entry) in entries.into_iter().enumerate().rev() {
        let reused = sources[position].and_then(|i| slots[i].take().map(|item| (i, item)));
        let item = match reused {
            Some((old_position, item)) => {
                for (name, value) in entry.vars {
                    if let Err(err) = item.scope.define(&name, value) {
                        warn!(variable = %name, error = %err, "loop variable update failed");
                    }
                }
                if !stable.contains(&position) {
                    for node in &ranges[old_position] {
                        document.insert_before(parent, *node, Some(next_ref));
                    }
                    moved += 1;
                }
                item
            }
            None => {
                created += 1;
                create_item(ctx, state, parent, next_ref, entry)
            }
        };
        next_ref = item.first;
        rendered[position] = Some(item);
    }

    debug!(created, moved, removed, "loop reconciled");
    *state.items.borrow_mut() = rendered.into_iter().flatten().collect();
}

fn create_item(ctx: &Rc<Context>, state: &Loop, parent: NodeId, next_ref: NodeId, entry: Entry) -> Item {
    let document = &ctx.document;
    let before = document.previous_sibling(next_ref);
    let clone = document.clone_node(state.template, true);
    document.insert_before(parent, clone, Some(next_ref));

    let scope = state.scope.child(entry.vars);
    if let Err(err) = compile_node(ctx, clone, &scope, state.once, Some(Directive::For)) {
        warn!(error = %err, "loop item failed to compile");
    }

    let mut first = match before {
        Some(node) => document.next_sibling(node),
        None => document.first_child(parent),
    }
    .unwrap_or(clone);
    if first == next_ref {
        // the item rendered nothing; keep a marker so its range stays addressable
        first = document.create_comment("item");
        document.insert_before(parent, first, Some(next_ref));
    }

    Item {
        key: entry.key,
        first,
        scope,
    }
}

/// Positions whose old indices form a longest strictly increasing run
fn longest_increasing_subsequence(sources: &[Option<usize>]) -> HashSet<usize> {
    let mut tails: Vec<usize> = Vec::new();
    let mut previous: Vec<Option<usize>> = vec![None; sources.len()];

    for (position, source) in sources.iter().enumerate() {
        let Some(value) = *source else {
            continue;
        };
        let slot = tails.partition_point(|&t| sources[t].is_some_and(|v| v < value));
        if slot > 0 {
            previous[position] = Some(tails[slot - 1]);
        }
        if slot == tails.len() {
            tails.push(position);
        } else {
            tails[slot] = position;
        }
    }

    let mut stable = HashSet::new();
    let mut cursor = tails.last().copied();
    while let Some(position) = cursor {
        stable.insert(position);
        cursor = previous[position];
    }
    stable
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lis_keeps_longest_ordered_run() {
        let stable = longest_increasing_subsequence(&[Some(2), Some(0), Some(1), None, Some(3)]);
        let mut positions: Vec<_> = stable.into_iter().collect();
        positions.sort();
        assert_eq!(positions, vec![1, 2, 4]);
    }

    #[test]
    fn test_lis_of_reversed_list_keeps_one() {
        let stable = longest_increasing_subsequence(&[Some(3), Some(2), Some(1), Some(0)]);
        assert_eq!(stable.len(), 1);
    }
}
