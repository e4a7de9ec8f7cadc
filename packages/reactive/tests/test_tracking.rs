use serde_json::json;
use sprig_reactive::{Bucket, Change, ObjectRef, Reactor, ReactiveError, Scope, Value};
use std::cell::RefCell;
use std::rc::Rc;

fn observed_root(reactor: &Rc<Reactor>, data: serde_json::Value) -> Scope {
    let Value::Object(obj) = Value::from_json(&data) else {
        panic!("Expected object data");
    };
    Scope::root(reactor, obj, "root")
}

fn object(value: Value) -> ObjectRef {
    value.as_object().cloned().expect("object")
}

/// Watcher that re-reads `read` on every run and logs how often it ran
fn counting_watcher(
    reactor: &Rc<Reactor>,
    read: impl Fn() -> Value + 'static,
) -> (Bucket, Rc<RefCell<Vec<Value>>>) {
    let bucket = Bucket::new();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = seen.clone();
    reactor.watch(&bucket, read, move |value, _| log.borrow_mut().push(value));
    (bucket, seen)
}

#[test]
fn test_paths_stable_under_sibling_mutation() {
    let reactor = Reactor::new();
    let scope = observed_root(&reactor, json!({"list": [{"n": 1}, {"n": 2}, {"n": 3}]}));
    let list = scope.vars().peek("list");
    let list = list.as_array().unwrap();

    let second = object(list.snapshot()[1].clone());
    let path_before = second.path();

    list.shift().unwrap();
    list.unshift(vec![Value::from_json(&json!({"n": 0}))]).unwrap();
    list.push(vec![Value::from_json(&json!({"n": 9}))]).unwrap();

    assert_eq!(second.path(), path_before);

    let paths: Vec<_> = list
        .snapshot()
        .into_iter()
        .map(|v| object(v).path().unwrap())
        .collect();
    let mut unique = paths.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), paths.len());
}

#[test]
fn test_watcher_resubscribes_to_taken_branch() {
    let reactor = Reactor::new();
    let scope = observed_root(&reactor, json!({"flag": true, "a": "A", "b": "B"}));
    let reader = scope.clone();
    let (_bucket, seen) = counting_watcher(&reactor, move || {
        if reader.resolve("flag").is_truthy() {
            reader.resolve("a")
        } else {
            reader.resolve("b")
        }
    });

    assert_eq!(reactor.subscriber_count("root.a"), 1);
    assert_eq!(reactor.subscriber_count("root.b"), 0);

    scope.assign("flag", Value::Bool(false)).unwrap();
    assert_eq!(reactor.subscriber_count("root.a"), 0);
    assert_eq!(reactor.subscriber_count("root.b"), 1);

    // the abandoned branch no longer triggers a run
    scope.assign("a", Value::from("A2")).unwrap();
    assert_eq!(seen.borrow().len(), 2);

    scope.assign("b", Value::from("B2")).unwrap();
    assert_eq!(seen.borrow().last(), Some(&Value::from("B2")));
}

#[test]
fn test_write_runs_each_watcher_once_and_no_others() {
    let reactor = Reactor::new();
    let scope = observed_root(&reactor, json!({"x": 1, "y": 1}));

    let twice = scope.clone();
    let (_b1, x_runs) = counting_watcher(&reactor, move || {
        let a = twice.resolve("x");
        let b = twice.resolve("x");
        Value::Number(a.to_number() + b.to_number())
    });
    let other = scope.clone();
    let (_b2, y_runs) = counting_watcher(&reactor, move || other.resolve("y"));

    scope.assign("x", Value::Number(2.0)).unwrap();

    assert_eq!(x_runs.borrow().len(), 2);
    assert_eq!(x_runs.borrow()[1], Value::Number(4.0));
    assert_eq!(y_runs.borrow().len(), 1);
}

#[test]
fn test_unchanged_write_is_silent() {
    let reactor = Reactor::new();
    let scope = observed_root(&reactor, json!({"x": "same"}));
    let reader = scope.clone();
    let (_bucket, runs) = counting_watcher(&reactor, move || reader.resolve("x"));

    scope.assign("x", Value::from("same")).unwrap();
    assert_eq!(runs.borrow().len(), 1);
}

#[test]
fn test_replacing_parent_republishes_descendant_once() {
    let reactor = Reactor::new();
    let scope = observed_root(&reactor, json!({"x": {"y": 1}}));
    let calls: Rc<RefCell<Vec<Change>>> = Rc::default();
    let log = calls.clone();
    reactor.subscribe("root.x.y", move |change| log.borrow_mut().push(change.clone()));

    scope
        .assign("x", Value::from_json(&json!({"y": 2})))
        .unwrap();

    let calls = calls.borrow();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].new, Value::Number(2.0));
    assert_eq!(calls[0].old, Value::Number(1.0));
    assert_eq!(calls[0].path, "root.x.y");
}

#[test]
fn test_template_style_reader_of_nested_path_runs_once_on_replace() {
    let reactor = Reactor::new();
    let scope = observed_root(&reactor, json!({"x": {"y": 1}}));
    let reader = scope.clone();
    let (_bucket, runs) = counting_watcher(&reactor, move || {
        object(reader.resolve("x")).get("y")
    });

    scope
        .assign("x", Value::from_json(&json!({"y": 5})))
        .unwrap();
    assert_eq!(*runs.borrow(), vec![Value::Number(1.0), Value::Number(5.0)]);

    // the new object is tracked at the same path
    object(scope.vars().peek("x"))
        .set("y", Value::Number(6.0))
        .unwrap();
    assert_eq!(runs.borrow().last(), Some(&Value::Number(6.0)));
}

#[test]
fn test_defining_unknown_name_rerenders_reader() {
    let reactor = Reactor::new();
    let scope = observed_root(&reactor, json!({}));
    let reader = scope.clone();
    let (_bucket, runs) = counting_watcher(&reactor, move || reader.resolve("later"));

    scope.assign("later", Value::from("here")).unwrap();
    assert_eq!(runs.borrow().last(), Some(&Value::from("here")));
}

#[test]
fn test_tag_travels_with_the_change() {
    let reactor = Reactor::new();
    let scope = observed_root(&reactor, json!({"name": ""}));
    let tags = Rc::new(RefCell::new(Vec::new()));
    let log = tags.clone();
    reactor.subscribe("root.name", move |change| log.borrow_mut().push(change.tag));

    scope.assign_tagged("name", Value::from("typed"), Some(42)).unwrap();
    scope.assign("name", Value::from("code")).unwrap();

    assert_eq!(*tags.borrow(), vec![Some(42), None]);
}

#[test]
fn test_self_triggering_watcher_is_rejected() {
    let reactor = Reactor::new();
    let scope = observed_root(&reactor, json!({"n": 0}));
    let errors = Rc::new(RefCell::new(Vec::new()));
    let log = errors.clone();
    let writer = scope.clone();
    let bucket = Bucket::new();

    reactor.watch(
        &bucket,
        {
            let writer = writer.clone();
            move || writer.resolve("n")
        },
        move |n, change| {
            if change.is_some() {
                // writing what we read while our own handler runs
                let next = Value::Number(n.to_number() + 1.0);
                if let Err(err) = writer.assign("n", next) {
                    log.borrow_mut().push(err);
                }
            }
        },
    );

    // the render step is untracked, but the write reaches the running handler
    let result = scope.assign("n", Value::Number(1.0));
    assert!(matches!(result, Err(ReactiveError::Reentrant { .. })));
    assert!(matches!(
        errors.borrow().first(),
        Some(ReactiveError::Reentrant { .. })
    ));
}

#[test]
fn test_rejected_handler_does_not_starve_siblings() {
    let reactor = Reactor::new();
    let scope = observed_root(&reactor, json!({"q": 0, "p": 0}));

    // W reads q and p, and writes p when q changes
    let writer_bucket = Bucket::new();
    let reader = scope.clone();
    let writer = scope.clone();
    reactor.watch(
        &writer_bucket,
        move || (reader.resolve("q"), reader.resolve("p")),
        move |_, change| {
            if change.is_some_and(|c| c.path == "root.q") {
                let _ = writer.assign("p", Value::Number(10.0));
            }
        },
    );

    // X only reads p
    let reader = scope.clone();
    let (_bucket, seen) = counting_watcher(&reactor, move || reader.resolve("p"));

    let result = scope.assign("q", Value::Number(1.0));

    assert_eq!(
        result,
        Err(ReactiveError::Reentrant {
            path: "root.p".to_string()
        })
    );
    assert_eq!(scope.resolve("p"), Value::Number(10.0));
    assert_eq!(
        *seen.borrow(),
        vec![Value::Number(0.0), Value::Number(10.0)]
    );
}

#[test]
fn test_failure_does_not_leak_into_next_write() {
    let reactor = Reactor::new();
    let scope = observed_root(&reactor, json!({"n": 0, "other": 0}));
    let writer = scope.clone();
    let reader = scope.clone();
    reactor.watch(
        &Bucket::new(),
        move || reader.resolve("n"),
        move |n, change| {
            if change.is_some() {
                let _ = writer.assign("n", Value::Number(n.to_number() + 1.0));
            }
        },
    );

    assert!(scope.assign("n", Value::Number(1.0)).is_err());
    assert!(scope.assign("other", Value::Number(1.0)).is_ok());
}

#[test]
fn test_disposed_bucket_stops_updates() {
    let reactor = Reactor::new();
    let scope = observed_root(&reactor, json!({"v": 1}));
    let reader = scope.clone();
    let (bucket, runs) = counting_watcher(&reactor, move || reader.resolve("v"));

    reactor.dispose_bucket(&bucket);
    scope.assign("v", Value::Number(2.0)).unwrap();

    assert_eq!(runs.borrow().len(), 1);
    assert_eq!(reactor.subscriber_count("root.v"), 0);
}
