use proptest::prelude::*;
use serde_json::json;
use sprig_reactive::{ArrayRef, Bucket, Reactor, Scope, Value};
use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

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
        (-6i64..6, 0usize..4, prop::collection::vec(any::<i8>().prop_map(|n| n as i64), 0..3))
            .prop_map(|(s, d, items)| Op::Splice(s, d, items)),
        Just(Op::Sort),
        Just(Op::Reverse),
        (0usize..8, any::<i8>()).prop_map(|(i, n)| Op::Set(i, n as i64)),
    ]
}

/// Plain Vec model of the same operations
fn apply_model(model: &mut Vec<i64>, op: &Op) {
    match op {
        Op::Push(n) => model.push(*n),
        Op::Pop => {
            model.pop();
        }
        Op::Shift => {
            if !model.is_empty() {
                model.remove(0);
            }
        }
        Op::Unshift(n) => model.insert(0, *n),
        Op::Splice(start, delete, items) => {
            let len = model.len() as i64;
            let start = if *start < 0 { (len + start).max(0) } else { (*start).min(len) } as usize;
            let end = (start + delete).min(model.len());
            model.splice(start..end, items.iter().copied());
        }
        Op::Sort => model.sort_by_key(|n| n.to_string()),
        Op::Reverse => model.reverse(),
        Op::Set(i, n) => {
            if *i < model.len() {
                model[*i] = *n;
            } else {
                // the hole is filled with undefined, modelled as i64::MIN
                model.resize(*i, i64::MIN);
                model.push(*n);
            }
        }
    }
}

fn apply_array(array: &ArrayRef, op: &Op) {
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
        Op::Set(i, n) => array.set_index(*i, num(n)).unwrap(),
    }
}

fn as_model(array: &ArrayRef) -> Vec<i64> {
    array
        .snapshot()
        .iter()
        .map(|v| match v {
            Value::Undefined => i64::MIN,
            other => other.to_number() as i64,
        })
        .collect()
}

proptest! {
    #[test]
    fn prop_array_ops_match_vec_model(
        initial in prop::collection::vec(any::<i8>().prop_map(|n| n as i64), 0..6),
        ops in prop::collection::vec(op_strategy(), 0..24),
    ) {
        // sort is skipped when holes exist: undefined sorts last, unlike the model
        let reactor = Reactor::new();
        let data = json!({ "list": initial.clone() });
        let Value::Object(root) = Value::from_json(&data) else { unreachable!() };
        let scope = Scope::root(&reactor, root, "root");
        let list = scope.vars().peek("list");
        let array = list.as_array().unwrap().clone();

        let mut model = initial;
        for op in &ops {
            if matches!(op, Op::Sort) && model.contains(&i64::MIN) {
                continue;
            }
            let ids_before: HashMap<u64, Value> = array
                .ids()
                .into_iter()
                .zip(array.snapshot())
                .collect();

            apply_model(&mut model, op);
            apply_array(&array, op);

            prop_assert_eq!(as_model(&array), model.clone());

            let ids = array.ids();
            prop_assert_eq!(ids.len(), array.snapshot().len());
            let mut unique = ids.clone();
            unique.sort_unstable();
            unique.dedup();
            prop_assert_eq!(unique.len(), ids.len());

            // a surviving id still carries its value, except the slot `$set` rewrote
            if !matches!(op, Op::Set(..)) {
                for (id, value) in ids.iter().zip(array.snapshot()) {
                    if let Some(before) = ids_before.get(id) {
                        prop_assert!(before.same_value(&value));
                    }
                }
            }
        }
    }
}

#[test]
fn test_every_mutator_publishes_the_array_path() {
    let reactor = Reactor::new();
    let Value::Object(root) = Value::from_json(&json!({"list": [3, 1, 2]})) else {
        unreachable!()
    };
    let scope = Scope::root(&reactor, root, "root");
    let runs = Rc::new(Cell::new(0));
    let counter = runs.clone();
    let reader = scope.clone();
    let bucket = Bucket::new();
    reactor.watch(
        &bucket,
        move || reader.resolve("list").as_array().map(|a| a.len()).unwrap_or(0),
        move |_, _| counter.set(counter.get() + 1),
    );

    let list = scope.vars().peek("list");
    let array = list.as_array().unwrap();
    array.push(vec![Value::Number(4.0)]).unwrap();
    array.pop().unwrap();
    array.shift().unwrap();
    array.unshift(vec![Value::Number(0.0)]).unwrap();
    array.splice(1, 1, vec![]).unwrap();
    array.reverse().unwrap();
    array.sort().unwrap();
    array.set_index(0, Value::Number(7.0)).unwrap();

    assert_eq!(runs.get(), 9);
}

#[test]
fn test_set_index_publishes_element_path() {
    let reactor = Reactor::new();
    let Value::Object(root) = Value::from_json(&json!({"list": ["a", "b"]})) else {
        unreachable!()
    };
    let scope = Scope::root(&reactor, root, "root");
    let list = scope.vars().peek("list");
    let array = list.as_array().unwrap().clone();
    let id = array.ids()[1];

    let seen = Rc::new(Cell::new(0));
    let counter = seen.clone();
    reactor.subscribe(&format!("root.list[{}]", id), move |change| {
        assert_eq!(change.new, Value::from("z"));
        counter.set(counter.get() + 1);
    });

    array.set_index(1, Value::from("z")).unwrap();
    assert_eq!(seen.get(), 1);
    assert_eq!(array.ids()[1], id);
}

#[test]
fn test_set_index_tagged_marks_element_and_array_changes() {
    let reactor = Reactor::new();
    let Value::Object(root) = Value::from_json(&json!({"list": ["a"]})) else {
        unreachable!()
    };
    let scope = Scope::root(&reactor, root, "root");
    let list = scope.vars().peek("list");
    let array = list.as_array().unwrap().clone();
    let id = array.ids()[0];

    let tags = Rc::new(std::cell::RefCell::new(Vec::new()));
    for path in [format!("root.list[{}]", id), "root.list".to_string()] {
        let log = tags.clone();
        reactor.subscribe(&path, move |change| log.borrow_mut().push(change.tag));
    }

    array.set_index_tagged(0, Value::from("b"), Some(7)).unwrap();
    assert_eq!(*tags.borrow(), vec![Some(7), Some(7)]);
}
