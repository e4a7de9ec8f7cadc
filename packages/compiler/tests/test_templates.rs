//! Rendering and re-rendering of whole templates

use futures::executor::block_on;
use serde_json::json;
use sprig_compiler::{create_compiler, DirectiveRegistry, FilterRegistry, Services, View, ViewOptions};
use sprig_reactive::Value;

fn load(template: &str, data: serde_json::Value) -> View {
    let compiler = create_compiler(DirectiveRegistry::new(), FilterRegistry::new());
    let view = View::new(compiler, Services::memory(), ViewOptions::inline(template).with_data(data));
    block_on(view.load()).unwrap();
    view
}

fn texts(view: &View, tag: &str) -> Vec<String> {
    let document = view.document();
    document
        .elements_by_tag(view.root().unwrap(), tag)
        .into_iter()
        .map(|node| document.text_content(node))
        .collect()
}

#[test]
fn test_expression_over_empty_scope() {
    let view = load("<p>{{1+1}}</p>", json!({}));
    assert_eq!(texts(&view, "p"), ["2"]);
}

#[test]
fn test_loop_push_appends_one_item() {
    let view = load(r#"<div><span :for="x of list">{{x}}</span></div>"#, json!({ "list": [1, 2, 3] }));
    assert_eq!(texts(&view, "span"), ["1", "2", "3"]);
    let before = view.document().elements_by_tag(view.root().unwrap(), "span");

    let list = view.get("list");
    list.as_array().unwrap().push(vec![Value::Number(4.0)]).unwrap();

    assert_eq!(texts(&view, "span"), ["1", "2", "3", "4"]);
    let after = view.document().elements_by_tag(view.root().unwrap(), "span");
    assert_eq!(&after[..3], &before[..]);
}

#[test]
fn test_if_else_swap_leaves_nothing_behind() {
    let view = load(r#"<div><p :if="show">yes</p><p :else>no</p></div>"#, json!({ "show": true }));
    assert_eq!(texts(&view, "p"), ["yes"]);

    view.set("show", false).unwrap();
    assert_eq!(texts(&view, "p"), ["no"]);

    view.set("show", true).unwrap();
    assert_eq!(texts(&view, "p"), ["yes"]);
    assert!(!view.html().contains(":if"));
}

#[test]
fn test_if_chain_is_mutually_exclusive() {
    let view = load(
        r#"<div><i :if="n == 1">a</i><i :elseif="n == 2">b</i><i :else>c</i></div>"#,
        json!({ "n": 1 }),
    );
    for (n, expected) in [(1, "a"), (2, "b"), (3, "c"), (1, "a"), (3, "c"), (2, "b")] {
        view.set("n", Value::Number(n as f64)).unwrap();
        assert_eq!(texts(&view, "i"), [expected], "n = {}", n);
    }
}

#[test]
fn test_nested_property_rerenders_on_parent_replace() {
    let view = load("<b>{{ x.y }}</b>", json!({ "x": { "y": 1 } }));
    assert_eq!(texts(&view, "b"), ["1"]);

    view.set("x", json!({ "y": 2 })).unwrap();
    assert_eq!(texts(&view, "b"), ["2"]);
}

#[test]
fn test_attribute_style_and_class_bindings() {
    let view = load(
        r#"<a $href="url" !color="tone" .active="on" title="to {{ url }}">go</a>"#,
        json!({ "url": "/home", "tone": "red", "on": false }),
    );
    assert_eq!(view.html(), r#"<a title="to /home" href="/home" style="color: red">go</a>"#);

    view.set("on", true).unwrap();
    view.set("url", "/away").unwrap();
    let a = view.document().elements_by_tag(view.root().unwrap(), "a")[0];
    assert!(view.document().has_class(a, "active"));
    assert_eq!(view.document().attribute(a, "href").as_deref(), Some("/away"));
    assert_eq!(view.document().attribute(a, "title").as_deref(), Some("to /away"));
}

#[test]
fn test_event_handler_writes_scope() {
    let view = load(r#"<button @click="count = count + 1">{{ count }}</button>"#, json!({ "count": 0 }));
    let button = view.document().elements_by_tag(view.root().unwrap(), "button")[0];

    view.document().fire(button, "click");
    view.document().fire(button, "click");
    assert_eq!(texts(&view, "button"), ["2"]);
}

#[test]
fn test_handler_sees_event_object() {
    let view = load(
        r#"<form><input value="typed" @input="last = $event.type + ':' + $event.value"></form>"#,
        json!({ "last": "" }),
    );
    let input = view.document().elements_by_tag(view.root().unwrap(), "input")[0];
    view.document().fire(input, "input");
    assert_eq!(view.get("last"), Value::from("input:typed"));
}

#[test]
fn test_filters_in_text() {
    let compiler = create_compiler(DirectiveRegistry::new(), FilterRegistry::new());
    let options = ViewOptions::inline("<p>{{ name#shout:'!' }}</p>")
        .with_data(json!({ "name": "hey" }))
        .with_filter("shout", |input, args| {
            let suffix = args.first().map(|a| a.to_string()).unwrap_or_default();
            Value::from(format!("{}{}", input.to_string().to_uppercase(), suffix))
        });
    let view = View::new(compiler, Services::memory(), options);
    block_on(view.load()).unwrap();
    assert_eq!(texts(&view, "p"), ["HEY!"]);
}

#[test]
fn test_style_sheet_uses_percent_delimiters() {
    let view = load("<style>p { color: {% tone %}; }</style>", json!({ "tone": "blue" }));
    assert_eq!(view.html(), "<style>p { color: blue; }</style>");
}

#[test]
fn test_once_renders_without_watching() {
    let view = load(r#"<p :once>{{ n }}</p>"#, json!({ "n": 1 }));
    view.set("n", Value::Number(2.0)).unwrap();
    assert_eq!(texts(&view, "p"), ["1"]);
}

#[test]
fn test_skip_and_pre_leave_children_raw() {
    let view = load(r#"<div :skip>{{ a }}</div><pre :pre>{{ a }}</pre>"#, json!({ "a": 1 }));
    assert_eq!(texts(&view, "div"), ["{{ a }}"]);
    assert_eq!(texts(&view, "pre"), ["{{ a }}"]);
}

#[test]
fn test_var_defines_local_names() {
    let view = load(r#"<p :var="full = first + ' ' + last">{{ full }}</p>"#, json!({ "first": "Ada", "last": "L" }));
    assert_eq!(texts(&view, "p"), ["Ada L"]);

    view.set("last", "Lovelace").unwrap();
    assert_eq!(texts(&view, "p"), ["Ada Lovelace"]);
}
