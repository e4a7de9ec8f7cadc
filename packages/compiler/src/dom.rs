//! Live, arena-backed DOM.
//!
//! Nodes are addressed by [`NodeId`] and mutated in place; a node keeps its
//! id, attached or not, until it is handed back with [`Document::release`].
//! Released slots are reused by later allocations.

use indexmap::IndexMap;
use serde::Serialize;
use sprig_common::Rect;
use sprig_parser::{is_void_element, parse_markup, MarkupNode, ParseResult};
use sprig_reactive::Value;
use std::cell::RefCell;
use std::fmt::Write as _;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

pub type ListenerId = u64;

pub type ListenerFn = Rc<dyn Fn(&mut Event)>;

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Element {
        tag: String,
        attributes: IndexMap<String, String>,
        styles: IndexMap<String, String>,
    },
    Text {
        content: String,
    },
    Comment {
        content: String,
    },
    Fragment,
}

struct Listener {
    id: ListenerId,
    event: String,
    callback: ListenerFn,
}

struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    listeners: Vec<Listener>,
    /// Form `value` property, falls back to the attribute
    value: Option<String>,
    /// Form `checked` property, falls back to the attribute
    checked: Option<bool>,
    /// Compile-plan sign, copied by `clone_node`
    sign: Option<u32>,
    rect: Option<Rect>,
    released: bool,
}

impl NodeData {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            listeners: Vec::new(),
            value: None,
            checked: None,
            sign: None,
            rect: None,
            released: false,
        }
    }
}

#[derive(Default)]
struct Arena {
    nodes: Vec<NodeData>,
    free: Vec<NodeId>,
    next_listener: ListenerId,
}

impl Arena {
    fn node(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.index()]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id.index()]
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        if let Some(id) = self.free.pop() {
            self.nodes[id.index()] = data;
            return id;
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(data);
        id
    }

    fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.node_mut(id).parent.take() {
            self.node_mut(parent).children.retain(|c| *c != id);
        }
    }
}

/// A dispatched DOM event
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: String,
    pub target: NodeId,
    pub current_target: NodeId,
    pub detail: Value,
    default_prevented: bool,
    propagation_stopped: bool,
}

impl Event {
    pub fn new(kind: impl Into<String>, target: NodeId) -> Self {
        Self {
            kind: kind.into(),
            target,
            current_target: target,
            detail: Value::Undefined,
            default_prevented: false,
            propagation_stopped: false,
        }
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }

    pub fn propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }
}

/// Serializable view of a subtree
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum DomSnapshot {
    Element {
        tag: String,
        attributes: IndexMap<String, String>,
        #[serde(skip_serializing_if = "IndexMap::is_empty")]
        styles: IndexMap<String, String>,
        children: Vec<DomSnapshot>,
    },
    Text {
        content: String,
    },
    Comment {
        content: String,
    },
    Fragment {
        children: Vec<DomSnapshot>,
    },
}

/// Shared handle to one document arena
#[derive(Clone, Default)]
pub struct Document(Rc<RefCell<Arena>>);

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live nodes, attached or not
    pub fn len(&self) -> usize {
        let arena = self.0.borrow();
        arena.nodes.len() - arena.free.len()
    }

    /// Allocated slots, including released ones awaiting reuse
    pub fn capacity(&self) -> usize {
        self.0.borrow().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Construction

    pub fn create_element(&self, tag: &str) -> NodeId {
        self.0.borrow_mut().push(NodeData::new(NodeKind::Element {
            tag: tag.to_ascii_lowercase(),
            attributes: IndexMap::new(),
            styles: IndexMap::new(),
        }))
    }

    pub fn create_text(&self, content: &str) -> NodeId {
        self.0.borrow_mut().push(NodeData::new(NodeKind::Text {
            content: content.to_string(),
        }))
    }

    pub fn create_comment(&self, content: &str) -> NodeId {
        self.0.borrow_mut().push(NodeData::new(NodeKind::Comment {
            content: content.to_string(),
        }))
    }

    pub fn create_fragment(&self) -> NodeId {
        self.0.borrow_mut().push(NodeData::new(NodeKind::Fragment))
    }

    /// Parse `html` into a new fragment
    pub fn parse_fragment(&self, html: &str) -> ParseResult<NodeId> {
        let markup = parse_markup(html)?;
        let fragment = self.create_fragment();
        self.append_markup(fragment, &markup);
        Ok(fragment)
    }

    pub fn append_markup(&self, parent: NodeId, markup: &[MarkupNode]) {
        for node in markup {
            let id = match node {
                MarkupNode::Element {
                    tag,
                    attributes,
                    children,
                } => {
                    let id = self.create_element(tag);
                    for (name, value) in attributes {
                        self.set_attribute(id, name, value);
                    }
                    self.append_markup(id, children);
                    id
                }
                MarkupNode::Text { content } => self.create_text(content),
                MarkupNode::Comment { content } => self.create_comment(content),
            };
            self.append_child(parent, id);
        }
    }

    // Node kind

    pub fn kind(&self, node: NodeId) -> NodeKind {
        self.0.borrow().node(node).kind.clone()
    }

    pub fn tag(&self, node: NodeId) -> Option<String> {
        match &self.0.borrow().node(node).kind {
            NodeKind::Element { tag, .. } => Some(tag.clone()),
            _ => None,
        }
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        matches!(self.0.borrow().node(node).kind, NodeKind::Element { .. })
    }

    pub fn is_text(&self, node: NodeId) -> bool {
        matches!(self.0.borrow().node(node).kind, NodeKind::Text { .. })
    }

    pub fn is_comment(&self, node: NodeId) -> bool {
        matches!(self.0.borrow().node(node).kind, NodeKind::Comment { .. })
    }

    /// Character data of a text or comment node
    pub fn data(&self, node: NodeId) -> Option<String> {
        match &self.0.borrow().node(node).kind {
            NodeKind::Text { content } | NodeKind::Comment { content } => Some(content.clone()),
            _ => None,
        }
    }

    pub fn set_data(&self, node: NodeId, data: &str) {
        if let NodeKind::Text { content } | NodeKind::Comment { content } =
            &mut self.0.borrow_mut().node_mut(node).kind
        {
            if content != data {
                *content = data.to_string();
            }
        }
    }

    // Attributes

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        if name == "style" {
            return self.style_text(node);
        }
        match &self.0.borrow().node(node).kind {
            NodeKind::Element { attributes, .. } => attributes.get(name).cloned(),
            _ => None,
        }
    }

    pub fn has_attribute(&self, node: NodeId, name: &str) -> bool {
        self.attribute(node, name).is_some()
    }

    /// Attributes in source order, `style` last when inline styles are set
    pub fn attributes(&self, node: NodeId) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = match &self.0.borrow().node(node).kind {
            NodeKind::Element { attributes, .. } => attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            _ => Vec::new(),
        };
        if let Some(style) = self.style_text(node) {
            out.push(("style".to_string(), style));
        }
        out
    }

    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
        if name == "style" {
            let parsed = parse_style(value);
            if let NodeKind::Element { styles, .. } = &mut self.0.borrow_mut().node_mut(node).kind {
                *styles = parsed;
            }
            return;
        }
        if let NodeKind::Element { attributes, .. } = &mut self.0.borrow_mut().node_mut(node).kind {
            attributes.insert(name.to_string(), value.to_string());
        }
    }

    pub fn remove_attribute(&self, node: NodeId, name: &str) {
        if let NodeKind::Element {
            attributes, styles, ..
        } = &mut self.0.borrow_mut().node_mut(node).kind
        {
            if name == "style" {
                styles.clear();
            } else {
                attributes.shift_remove(name);
            }
        }
    }

    // Inline styles

    pub fn style(&self, node: NodeId, property: &str) -> Option<String> {
        match &self.0.borrow().node(node).kind {
            NodeKind::Element { styles, .. } => styles.get(property).cloned(),
            _ => None,
        }
    }

    pub fn set_style(&self, node: NodeId, property: &str, value: &str) {
        if let NodeKind::Element { styles, .. } = &mut self.0.borrow_mut().node_mut(node).kind {
            styles.insert(property.to_string(), value.to_string());
        }
    }

    pub fn remove_style(&self, node: NodeId, property: &str) {
        if let NodeKind::Element { styles, .. } = &mut self.0.borrow_mut().node_mut(node).kind {
            styles.shift_remove(property);
        }
    }

    fn style_text(&self, node: NodeId) -> Option<String> {
        match &self.0.borrow().node(node).kind {
            NodeKind::Element { styles, .. } if !styles.is_empty() => Some(
                styles
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v))
                    .collect::<Vec<_>>()
                    .join("; "),
            ),
            _ => None,
        }
    }

    // Class list

    pub fn classes(&self, node: NodeId) -> Vec<String> {
        self.attribute(node, "class")
            .map(|c| c.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.classes(node).iter().any(|c| c == class)
    }

    pub fn toggle_class(&self, node: NodeId, class: &str, on: bool) {
        let mut classes = self.classes(node);
        let present = classes.iter().any(|c| c == class);
        match (on, present) {
            (true, false) => classes.push(class.to_string()),
            (false, true) => classes.retain(|c| c != class),
            _ => return,
        }
        if classes.is_empty() {
            self.remove_attribute(node, "class");
        } else {
            self.set_attribute(node, "class", &classes.join(" "));
        }
    }

    // Form properties

    pub fn value(&self, node: NodeId) -> String {
        if let Some(value) = self.0.borrow().node(node).value.clone() {
            return value;
        }
        if self.tag(node).as_deref() == Some("textarea") {
            return self.text_content(node);
        }
        self.attribute(node, "value").unwrap_or_default()
    }

    pub fn set_value(&self, node: NodeId, value: &str) {
        self.0.borrow_mut().node_mut(node).value = Some(value.to_string());
    }

    pub fn checked(&self, node: NodeId) -> bool {
        let checked = self.0.borrow().node(node).checked;
        checked.unwrap_or_else(|| self.has_attribute(node, "checked"))
    }

    pub fn set_checked(&self, node: NodeId, checked: bool) {
        self.0.borrow_mut().node_mut(node).checked = Some(checked);
    }

    // Layout and compile metadata

    pub fn rect(&self, node: NodeId) -> Option<Rect> {
        self.0.borrow().node(node).rect
    }

    pub fn set_rect(&self, node: NodeId, rect: Rect) {
        self.0.borrow_mut().node_mut(node).rect = Some(rect);
    }

    pub fn sign(&self, node: NodeId) -> Option<u32> {
        self.0.borrow().node(node).sign
    }

    pub fn set_sign(&self, node: NodeId, sign: Option<u32>) {
        self.0.borrow_mut().node_mut(node).sign = sign;
    }

    // Tree

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.0.borrow().node(node).parent
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.0.borrow().node(node).children.clone()
    }

    pub fn first_child(&self, node: NodeId) -> Option<NodeId> {
        self.0.borrow().node(node).children.first().copied()
    }

    fn sibling(&self, node: NodeId, offset: isize) -> Option<NodeId> {
        let arena = self.0.borrow();
        let parent = arena.node(node).parent?;
        let siblings = &arena.node(parent).children;
        let index = siblings.iter().position(|c| *c == node)? as isize + offset;
        if index < 0 {
            return None;
        }
        siblings.get(index as usize).copied()
    }

    pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.sibling(node, 1)
    }

    pub fn previous_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.sibling(node, -1)
    }

    pub fn append_child(&self, parent: NodeId, child: NodeId) {
        self.insert_before(parent, child, None);
    }

    /// Insert `child` before `reference` (or last). An attached child is moved;
    /// a fragment moves its children instead of itself.
    pub fn insert_before(&self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        if reference == Some(child) {
            return;
        }
        if matches!(self.0.borrow().node(child).kind, NodeKind::Fragment) {
            for grandchild in self.children(child) {
                self.insert_before(parent, grandchild, reference);
            }
            return;
        }

        let mut arena = self.0.borrow_mut();
        arena.detach(child);
        let siblings = &mut arena.node_mut(parent).children;
        let index = reference
            .and_then(|r| siblings.iter().position(|c| *c == r))
            .unwrap_or(siblings.len());
        siblings.insert(index, child);
        arena.node_mut(child).parent = Some(parent);
    }

    /// Detach `node` from its parent; the node stays usable
    pub fn remove(&self, node: NodeId) {
        self.0.borrow_mut().detach(node);
    }

    /// Detach `node` and free it with its whole subtree, dropping their
    /// listeners. The ids become invalid and are reused by later allocations.
    pub fn release(&self, node: NodeId) {
        let dead = self.descendants(node);
        let mut arena = self.0.borrow_mut();
        if arena.node(node).released {
            return;
        }
        arena.detach(node);
        for id in dead {
            let slot = arena.node_mut(id);
            if slot.released {
                continue;
            }
            *slot = NodeData::new(NodeKind::Fragment);
            slot.released = true;
            arena.free.push(id);
        }
    }

    /// Put `new` where `old` is and detach `old`
    pub fn replace(&self, old: NodeId, new: NodeId) {
        if let Some(parent) = self.parent(old) {
            self.insert_before(parent, new, Some(old));
            self.remove(old);
        }
    }

    /// Whether `node` is `ancestor` or lies below it
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let arena = self.0.borrow();
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = arena.node(id).parent;
        }
        false
    }

    /// Copy a node (and its subtree when `deep`). Listeners and form
    /// properties stay behind, the compile sign and layout rect are copied.
    pub fn clone_node(&self, node: NodeId, deep: bool) -> NodeId {
        let (kind, sign, rect, children) = {
            let arena = self.0.borrow();
            let data = arena.node(node);
            (data.kind.clone(), data.sign, data.rect, data.children.clone())
        };
        let copy = {
            let mut data = NodeData::new(kind);
            data.sign = sign;
            data.rect = rect;
            self.0.borrow_mut().push(data)
        };
        if deep {
            for child in children {
                let child_copy = self.clone_node(child, true);
                self.append_child(copy, child_copy);
            }
        }
        copy
    }

    /// `node` followed by all of its descendants, pre-order
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let arena = self.0.borrow();
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(arena.node(id).children.iter().rev().copied());
        }
        out
    }

    /// Descendant elements with the given tag, document order
    pub fn elements_by_tag(&self, root: NodeId, tag: &str) -> Vec<NodeId> {
        self.descendants(root)
            .into_iter()
            .filter(|id| self.tag(*id).as_deref() == Some(tag))
            .collect()
    }

    // Text content

    pub fn text_content(&self, node: NodeId) -> String {
        let arena = self.0.borrow();
        let mut out = String::new();
        collect_text(&arena, node, &mut out);
        out
    }

    /// Replace the children of `node` with a single text node
    pub fn set_text_content(&self, node: NodeId, text: &str) {
        let children = self.children(node);
        if let [only] = children.as_slice() {
            if self.is_text(*only) {
                self.set_data(*only, text);
                return;
            }
        }
        for child in children {
            self.remove(child);
        }
        if !text.is_empty() {
            let text_node = self.create_text(text);
            self.append_child(node, text_node);
        }
    }

    /// Replace the children of `node` with parsed markup
    pub fn set_inner_html(&self, node: NodeId, html: &str) -> ParseResult<()> {
        let fragment = self.parse_fragment(html)?;
        for child in self.children(node) {
            self.remove(child);
        }
        self.append_child(node, fragment);
        Ok(())
    }

    // Events

    pub fn add_event_listener(
        &self,
        node: NodeId,
        event: &str,
        callback: impl Fn(&mut Event) + 'static,
    ) -> ListenerId {
        let mut arena = self.0.borrow_mut();
        arena.next_listener += 1;
        let id = arena.next_listener;
        arena.node_mut(node).listeners.push(Listener {
            id,
            event: event.to_string(),
            callback: Rc::new(callback),
        });
        id
    }

    pub fn remove_event_listener(&self, node: NodeId, id: ListenerId) {
        self.0
            .borrow_mut()
            .node_mut(node)
            .listeners
            .retain(|l| l.id != id);
    }

    pub fn listener_count(&self, node: NodeId) -> usize {
        self.0.borrow().node(node).listeners.len()
    }

    /// Dispatch `event` at its target and bubble it to the root.
    /// Returns false when a listener prevented the default action.
    pub fn dispatch(&self, event: &mut Event) -> bool {
        let mut current = Some(event.target);
        while let Some(node) = current {
            event.current_target = node;
            let callbacks: Vec<ListenerFn> = self
                .0
                .borrow()
                .node(node)
                .listeners
                .iter()
                .filter(|l| l.event == event.kind)
                .map(|l| l.callback.clone())
                .collect();
            for callback in callbacks {
                callback(event);
            }
            if event.propagation_stopped {
                break;
            }
            current = self.parent(node);
        }
        !event.default_prevented
    }

    /// Convenience: dispatch a fresh event of `kind` at `target`
    pub fn fire(&self, target: NodeId, kind: &str) -> bool {
        self.dispatch(&mut Event::new(kind, target))
    }

    // Serialization

    pub fn outer_html(&self, node: NodeId) -> String {
        let arena = self.0.borrow();
        let mut out = String::new();
        write_html(&arena, node, &mut out);
        out
    }

    pub fn inner_html(&self, node: NodeId) -> String {
        let arena = self.0.borrow();
        let mut out = String::new();
        for child in &arena.node(node).children {
            write_html(&arena, *child, &mut out);
        }
        out
    }

    pub fn snapshot(&self, node: NodeId) -> DomSnapshot {
        let arena = self.0.borrow();
        snapshot_node(&arena, node)
    }
}

fn parse_style(text: &str) -> IndexMap<String, String> {
    text.split(';')
        .filter_map(|decl| {
            let (prop, value) = decl.split_once(':')?;
            let prop = prop.trim();
            (!prop.is_empty()).then(|| (prop.to_string(), value.trim().to_string()))
        })
        .collect()
}

fn collect_text(arena: &Arena, node: NodeId, out: &mut String) {
    let data = arena.node(node);
    match &data.kind {
        NodeKind::Text { content } => out.push_str(content),
        NodeKind::Comment { .. } => {}
        NodeKind::Element { .. } | NodeKind::Fragment => {
            for child in &data.children {
                collect_text(arena, *child, out);
            }
        }
    }
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attribute(text: &str) -> String {
    text.replace('&', "&amp;").replace('"', "&quot;")
}

fn is_raw_text(tag: &str) -> bool {
    matches!(tag, "script" | "style")
}

fn write_html(arena: &Arena, node: NodeId, out: &mut String) {
    let data = arena.node(node);
    match &data.kind {
        NodeKind::Element {
            tag,
            attributes,
            styles,
        } => {
            let _ = write!(out, "<{}", tag);
            for (name, value) in attributes {
                if value.is_empty() {
                    let _ = write!(out, " {}", name);
                } else {
                    let _ = write!(out, " {}=\"{}\"", name, escape_attribute(value));
                }
            }
            if !styles.is_empty() {
                let style = styles
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v))
                    .collect::<Vec<_>>()
                    .join("; ");
                let _ = write!(out, " style=\"{}\"", escape_attribute(&style));
            }
            out.push('>');
            if is_void_element(tag) {
                return;
            }
            for child in &data.children {
                if is_raw_text(tag) {
                    collect_text(arena, *child, out);
                } else {
                    write_html(arena, *child, out);
                }
            }
            let _ = write!(out, "</{}>", tag);
        }
        NodeKind::Text { content } => out.push_str(&escape_text(content)),
        NodeKind::Comment { content } => {
            let _ = write!(out, "<!--{}-->", content);
        }
        NodeKind::Fragment => {
            for child in &data.children {
                write_html(arena, *child, out);
            }
        }
    }
}

fn snapshot_node(arena: &Arena, node: NodeId) -> DomSnapshot {
    let data = arena.node(node);
    let children = || -> Vec<DomSnapshot> {
        data.children
            .iter()
            .map(|c| snapshot_node(arena, *c))
            .collect()
    };
    match &data.kind {
        NodeKind::Element {
            tag,
            attributes,
            styles,
        } => DomSnapshot::Element {
            tag: tag.clone(),
            attributes: attributes.clone(),
            styles: styles.clone(),
            children: children(),
        },
        NodeKind::Text { content } => DomSnapshot::Text {
            content: content.clone(),
        },
        NodeKind::Comment { content } => DomSnapshot::Comment {
            content: content.clone(),
        },
        NodeKind::Fragment => DomSnapshot::Fragment {
            children: children(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_parse_and_serialize() {
        let doc = Document::new();
        let root = doc
            .parse_fragment(r#"<ul class="list"><li>a &amp; b</li><li style="color: red">c</li></ul><br>"#)
            .unwrap();

        assert_eq!(
            doc.inner_html(root),
            r#"<ul class="list"><li>a &amp; b</li><li style="color: red">c</li></ul><br>"#
        );
        let lis = doc.elements_by_tag(root, "li");
        assert_eq!(doc.style(lis[1], "color").as_deref(), Some("red"));
        assert_eq!(doc.text_content(root), "a & bc");
    }

    #[test]
    fn test_release_frees_subtree_for_reuse() {
        let doc = Document::new();
        let root = doc.parse_fragment("<div><input><b>x</b></div>").unwrap();
        let div = doc.first_child(root).unwrap();
        let input = doc.first_child(div).unwrap();
        doc.add_event_listener(input, "input", |_| {});
        let live = doc.len();

        doc.release(div);
        doc.release(div);
        assert!(doc.children(root).is_empty());
        assert_eq!(doc.len(), live - 4);
        assert_eq!(doc.listener_count(input), 0);

        let slots = doc.capacity();
        for _ in 0..4 {
            doc.create_element("p");
        }
        assert_eq!(doc.capacity(), slots);
        assert_eq!(doc.len(), live);
    }

    #[test]
    fn test_insert_moves_and_keeps_identity() {
        let doc = Document::new();
        let parent = doc.create_element("div");
        let a = doc.create_text("a");
        let b = doc.create_text("b");
        let c = doc.create_text("c");
        for n in [a, b, c] {
            doc.append_child(parent, n);
        }

        doc.insert_before(parent, c, Some(a));
        assert_eq!(doc.children(parent), vec![c, a, b]);
        assert_eq!(doc.next_sibling(c), Some(a));
        assert_eq!(doc.previous_sibling(a), Some(c));

        doc.remove(a);
        assert_eq!(doc.parent(a), None);
        assert_eq!(doc.text_content(parent), "cb");
    }

    #[test]
    fn test_fragment_insert_moves_children() {
        let doc = Document::new();
        let host = doc.create_element("div");
        let fragment = doc.parse_fragment("<i>1</i><b>2</b>").unwrap();
        doc.append_child(host, fragment);

        assert_eq!(doc.inner_html(host), "<i>1</i><b>2</b>");
        assert!(doc.children(fragment).is_empty());
    }

    #[test]
    fn test_clone_copies_sign_but_not_listeners() {
        let doc = Document::new();
        let root = doc.parse_fragment(r#"<p id="x"><span>t</span></p>"#).unwrap();
        let p = doc.first_child(root).unwrap();
        doc.set_sign(p, Some(7));
        doc.add_event_listener(p, "click", |_| {});

        let copy = doc.clone_node(p, true);
        assert_ne!(copy, p);
        assert_eq!(doc.sign(copy), Some(7));
        assert_eq!(doc.listener_count(copy), 0);
        assert_eq!(doc.outer_html(copy), doc.outer_html(p));
    }

    #[test]
    fn test_events_bubble_until_stopped() {
        let doc = Document::new();
        let root = doc.parse_fragment("<div><p><a>x</a></p></div>").unwrap();
        let div = doc.first_child(root).unwrap();
        let a = doc.elements_by_tag(root, "a")[0];
        let p = doc.parent(a).unwrap();

        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        doc.add_event_listener(div, "click", move |_| counter.set(counter.get() + 1));
        doc.fire(a, "click");
        assert_eq!(hits.get(), 1);

        doc.add_event_listener(p, "click", |event| {
            event.stop_propagation();
            event.prevent_default();
        });
        assert!(!doc.fire(a, "click"));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_class_and_form_properties() {
        let doc = Document::new();
        let root = doc.parse_fragment(r#"<input class="a" value="v" checked>"#).unwrap();
        let input = doc.first_child(root).unwrap();

        doc.toggle_class(input, "b", true);
        doc.toggle_class(input, "a", false);
        assert_eq!(doc.attribute(input, "class").as_deref(), Some("b"));

        assert_eq!(doc.value(input), "v");
        doc.set_value(input, "typed");
        assert_eq!(doc.value(input), "typed");
        assert!(doc.checked(input));
        doc.set_checked(input, false);
        assert!(!doc.checked(input));
    }
}
