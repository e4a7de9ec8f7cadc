//! `:for` reconciliation: content follows the data, surviving items keep their nodes

use futures::executor::block_on;
use proptest::prelude::*;
use serde_json::json;
use sprig_compiler::{create_compiler, DirectiveRegistry, FilterRegistry, NodeId, Services, View, ViewOptions};
use sprig_reactive::{ArrayRef, Value};
use std::collections::HashMap;

fn load(template: &str, data: serde_json::Value) -> View {
    let compiler = create_compiler(DirectiveRegistry::new(), FilterRegistry::new());
    let view = View::new(compiler, Services::memory(), ViewOptions::inline(template).with_data(data));
    block_on(view.load()).unwrap();
    view
}

fn items(view: &View, tag: &str) -> Vec<NodeId> {
    view.document().elements_by_tag(view.root().unwrap(), tag)
}

fn texts(view: &View, tag: &str) -> Vec<String> {
    items(view, tag)
        .into_iter()
        .map(|node| view.document().text_content(node))
        .collect()
}

fn array(view: &View, name: &str) -> ArrayRef {
    view.get(name).as_array().unwrap().clone()
}

#[derive(Debug, Clone)]
enum Op {
    Push(i64),
    Pop,
    Shift,
    Unshift(i64),
    Splice(i64, usize, Vec<i64>),
    Sort,
    Reverse,
    Set(usize, i64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        any::<i8>().prop_map(|n| Op::Push(n as i64)),
        Just(Op::Pop),
        Just(Op::Shift),
        any::<i8>().prop_map(|n| Op::Unshift(n as i64)),
        (-4i64..4, 0usize..3, prop::collection::vec(any::<i8>().prop_map(|n| n as i64), 0..3))
            .prop_map(|(s, d, items)| Op::Splice(s, d, items)),
        Just(Op::Sort),
        Just(Op::Reverse),
        (0usize..6, any::<i8>()).prop_map(|(i, n)| Op::Set(i, n as i64)),
    ]
}

fn apply(array: &ArrayRef, op: &Op) {
    let num = |n: &i64| Value::Number(*n as f64);
    match op {
        Op::Push(n) => {
            array.push(vec![num(n)]).unwrap();
        }
        Op::Pop => {
            array.pop().unwrap();
        }
        Op::Shift => {
            array.shift().unwrap();
        }
        Op::Unshift(n) => {
            array.unshift(vec![num(n)]).unwrap();
        }
        Op::Splice(start, delete, items) => {
            array
                .splice(*start, *delete, items.iter().map(num).collect())
                .unwrap();
        }
        Op::Sort => array.sort().unwrap(),
        Op::Reverse => array.reverse().unwrap(),
        // holes would render as empty items; keep writes in bounds
        Op::Set(i, n) => {
            let len = array.snapshot().len();
            if len > 0 {
                array.set_index(i % len, num(n)).unwrap();
            }
        }
    }
}

fn rendered_model(array: &ArrayRef) -> Vec<String> {
    array
        .snapshot()
        .iter()
        .map(|v| format!("{}", v.to_number() as i64))
        .collect()
}

proptest! {
    #[test]
    fn prop_loop_dom_tracks_array(
        initial in prop::collection::vec(any::<i8>().prop_map(|n| n as i64), 0..5),
        ops in prop::collection::vec(op_strategy(), 0..16),
    ) {
        let view = load(r#"<ul><li :for="x of list">{{x}}</li></ul>"#, json!({ "list": initial }));
        let list = array(&view, "list");
        prop_assert_eq!(texts(&view, "li"), rendered_model(&list));

        for op in &ops {
            let before: HashMap<u64, NodeId> = list.ids().into_iter().zip(items(&view, "li")).collect();

            apply(&list, op);

            prop_assert_eq!(texts(&view, "li"), rendered_model(&list));
            for (id, node) in list.ids().into_iter().zip(items(&view, "li")) {
                if let Some(old) = before.get(&id) {
                    prop_assert_eq!(*old, node, "item {} was re-created by {:?}", id, op);
                }
            }
        }
    }
}

#[test]
fn test_reverse_moves_nodes_without_recreating() {
    let view = load(r#"<ol><li :for="x of list">{{x}}</li></ol>"#, json!({ "list": ["a", "b", "c"] }));
    let before = items(&view, "li");

    array(&view, "list").reverse().unwrap();

    assert_eq!(texts(&view, "li"), ["c", "b", "a"]);
    let after = items(&view, "li");
    assert_eq!(after, before.into_iter().rev().collect::<Vec<_>>());
}

#[test]
fn test_removed_item_watchers_are_disposed() {
    let view = load(r#"<p :for="x of list">{{ x }}{{ suffix }}</p>"#, json!({ "list": [1, 2], "suffix": "!" }));
    let handlers = view.context().reactor.handler_count();

    array(&view, "list").pop().unwrap();
    assert!(view.context().reactor.handler_count() < handlers);

    view.set("suffix", "?").unwrap();
    assert_eq!(texts(&view, "p"), ["1?"]);
}

#[test]
fn test_index_and_object_loops() {
    let view = load(
        r#"<i :for="x, n of list">{{ n }}={{ x }}</i><b :for="key, value in map">{{ key }}:{{ value }}</b><u :for="n of 1...3">{{ n }}</u>"#,
        json!({ "list": ["a", "b"], "map": { "one": 1, "two": 2 } }),
    );
    assert_eq!(texts(&view, "i"), ["0=a", "1=b"]);
    assert_eq!(texts(&view, "b"), ["one:1", "two:2"]);
    assert_eq!(texts(&view, "u"), ["1", "2", "3"]);

    let map = view.get("map");
    map.as_object().unwrap().set("three", Value::Number(3.0)).unwrap();
    assert_eq!(texts(&view, "b"), ["one:1", "two:2", "three:3"]);
}

#[test]
fn test_non_iterable_source_renders_nothing() {
    let view = load(r#"<p :for="x of count">{{ x }}</p>"#, json!({ "count": 5 }));
    assert!(texts(&view, "p").is_empty());

    view.set("count", json!([7])).unwrap();
    assert_eq!(texts(&view, "p"), ["7"]);
}

#[test]
fn test_nested_loops_share_outer_names() {
    let view = load(
        r#"<div :for="row of rows"><span :for="cell of row.cells">{{ row.name }}{{ cell }}</span></div>"#,
        json!({ "rows": [{ "name": "a", "cells": [1, 2] }, { "name": "b", "cells": [3] }] }),
    );
    assert_eq!(texts(&view, "span"), ["a1", "a2", "b3"]);

    let rows = array(&view, "rows");
    rows.shift().unwrap();
    assert_eq!(texts(&view, "span"), ["b3"]);
}
