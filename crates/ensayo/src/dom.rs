//! Owned DOM model the resolver and assertions work on.
//!
//! A [`Document`] is an arena of element and text nodes. Drivers hand the
//! engine a fresh `Document` on every snapshot; the engine never keeps one
//! across a suspension point. Each element carries an [`ElementRef`], the
//! driver-level identity used to dispatch actions back to the live page.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Tags that render with intrinsic size even without text content
const REPLACED_TAGS: &[&str] = &[
    "input", "img", "button", "select", "textarea", "canvas", "video", "iframe", "svg",
];

/// Input types that cannot be filled
const NON_TEXT_INPUT_TYPES: &[&str] = &[
    "button", "checkbox", "radio", "submit", "reset", "image", "file", "hidden", "range",
    "color",
];

/// Index of a node inside one [`Document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Arena index
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Stable driver-level element identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementRef(pub u64);

impl std::fmt::Display for ElementRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ref#{}", self.0)
    }
}

/// Rendered box of an element
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// X position
    pub x: f32,
    /// Y position
    pub y: f32,
    /// Width
    pub width: f32,
    /// Height
    pub height: f32,
}

impl BoundingBox {
    /// Create a new bounding box
    #[must_use]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether the box covers any area
    #[must_use]
    pub fn has_area(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

/// The subset of computed style that decides visibility
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Style {
    /// `display: none`
    #[serde(default)]
    pub display_none: bool,
    /// `visibility: hidden`
    #[serde(default)]
    pub visibility_hidden: bool,
    /// `opacity: 0`
    #[serde(default)]
    pub transparent: bool,
}

/// Element payload
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Lower-case tag name
    pub tag: String,
    /// Attributes, including `id` and `class`
    pub attributes: BTreeMap<String, String>,
    /// Current form value, if the element has one
    pub value: Option<String>,
    /// Disabled form control
    pub disabled: bool,
    /// Visibility-relevant style
    pub style: Style,
    /// Rendered box; `None` means auto layout
    pub bounding_box: Option<BoundingBox>,
    /// Hit point is covered by another element
    pub obscured: bool,
    /// Driver-level identity
    pub handle: ElementRef,
}

impl Element {
    fn new(tag: &str, handle: ElementRef) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attributes: BTreeMap::new(),
            value: None,
            disabled: false,
            style: Style::default(),
            bounding_box: None,
            obscured: false,
            handle,
        }
    }

    /// Attribute value
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// `id` attribute
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.attr("id")
    }

    /// Iterate class names
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or("").split_whitespace()
    }

    /// Class membership
    #[must_use]
    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }

    /// Whether `fill` can target this element
    #[must_use]
    pub fn is_editable(&self) -> bool {
        if self.disabled || self.attributes.contains_key("readonly") {
            return false;
        }
        match self.tag.as_str() {
            "textarea" => true,
            "input" => {
                let kind = self.attr("type").unwrap_or("text").to_ascii_lowercase();
                !NON_TEXT_INPUT_TYPES.contains(&kind.as_str())
            }
            _ => self
                .attr("contenteditable")
                .is_some_and(|v| v.is_empty() || v == "true"),
        }
    }
}

/// Node payload
#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    /// Document root
    Root,
    /// Element node
    Element(Element),
    /// Text node
    Text(String),
}

/// One arena slot
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    data: NodeData,
}

impl Node {
    /// Payload
    #[must_use]
    pub const fn data(&self) -> &NodeData {
        &self.data
    }

    /// Parent, if attached to one
    #[must_use]
    pub const fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in order
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// Collapse whitespace runs to single spaces and trim
#[must_use]
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Arena-backed document
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    nodes: Vec<Node>,
    body: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document with a `<body>`
    #[must_use]
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                data: NodeData::Root,
            }],
            body: NodeId(0),
        };
        let body = doc.create_element("body");
        doc.attach(doc.root(), body);
        doc.body = body;
        doc
    }

    /// Document root
    #[must_use]
    pub const fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// The `<body>` element
    #[must_use]
    pub const fn body(&self) -> NodeId {
        self.body
    }

    /// Number of arena slots (attached or not)
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether only the root exists
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Node by id
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    /// Element payload by id
    #[must_use]
    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match self.nodes.get(id.0).map(|n| &n.data) {
            Some(NodeData::Element(el)) => Some(el),
            _ => None,
        }
    }

    /// Mutable element payload by id
    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match self.nodes.get_mut(id.0).map(|n| &mut n.data) {
            Some(NodeData::Element(el)) => Some(el),
            _ => None,
        }
    }

    /// Create a detached element whose handle mirrors its arena slot
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.create_element_with_ref(tag, ElementRef(id.0 as u64))
    }

    /// Create a detached element with an explicit driver handle
    pub fn create_element_with_ref(&mut self, tag: &str, handle: ElementRef) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: None,
            children: Vec::new(),
            data: NodeData::Element(Element::new(tag, handle)),
        });
        id
    }

    /// Create a detached text node
    pub fn create_text(&mut self, text: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: None,
            children: Vec::new(),
            data: NodeData::Text(text.to_string()),
        });
        id
    }

    /// Append `child` as the last child of `parent`, detaching it first
    pub fn attach(&mut self, parent: NodeId, child: NodeId) {
        if parent == child || self.is_inclusive_ancestor(child, parent) {
            return;
        }
        self.remove(child);
        if let Some(node) = self.nodes.get_mut(child.0) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.nodes.get_mut(parent.0) {
            node.children.push(child);
        }
    }

    /// Build an element tree and append it under `parent`
    pub fn append(&mut self, parent: NodeId, builder: ElementBuilder) -> NodeId {
        let id = builder.build_into(self);
        self.attach(parent, id);
        id
    }

    /// Detach a node from its parent; the slot stays valid but unattached
    pub fn remove(&mut self, id: NodeId) {
        let Some(parent) = self.nodes.get(id.0).and_then(|n| n.parent) else {
            return;
        };
        if let Some(p) = self.nodes.get_mut(parent.0) {
            p.children.retain(|c| *c != id);
        }
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.parent = None;
        }
    }

    /// Replace all children of `id` with a single text node
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        let children = self
            .nodes
            .get(id.0)
            .map(|n| n.children.clone())
            .unwrap_or_default();
        for child in children {
            self.remove(child);
        }
        let text_node = self.create_text(text);
        self.attach(id, text_node);
    }

    /// Set an attribute
    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) {
        if let Some(el) = self.element_mut(id) {
            el.attributes.insert(name.to_string(), value.to_string());
        }
    }

    /// Add a class if missing
    pub fn add_class(&mut self, id: NodeId, class: &str) {
        if let Some(el) = self.element_mut(id) {
            if el.has_class(class) {
                return;
            }
            let mut classes: Vec<&str> = el.classes().collect();
            classes.push(class);
            let joined = classes.join(" ");
            el.attributes.insert("class".to_string(), joined);
        }
    }

    /// Remove a class if present
    pub fn remove_class(&mut self, id: NodeId, class: &str) {
        if let Some(el) = self.element_mut(id) {
            let joined = el
                .classes()
                .filter(|c| *c != class)
                .collect::<Vec<_>>()
                .join(" ");
            el.attributes.insert("class".to_string(), joined);
        }
    }

    /// Toggle `display: none`
    pub fn set_displayed(&mut self, id: NodeId, displayed: bool) {
        if let Some(el) = self.element_mut(id) {
            el.style.display_none = !displayed;
        }
    }

    /// Set the form value
    pub fn set_value(&mut self, id: NodeId, value: &str) {
        if let Some(el) = self.element_mut(id) {
            el.value = Some(value.to_string());
        }
    }

    /// Current form value
    #[must_use]
    pub fn value(&self, id: NodeId) -> Option<&str> {
        self.element(id).and_then(|el| el.value.as_deref())
    }

    /// Parent of a node
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|n| n.parent)
    }

    /// Whether `ancestor` is `node` or one of its ancestors
    #[must_use]
    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Whether the node is reachable from the root
    #[must_use]
    pub fn is_attached(&self, id: NodeId) -> bool {
        self.is_inclusive_ancestor(self.root(), id)
    }

    /// Element ancestors from the parent upwards
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |n| self.parent(*n))
            .filter(move |n| self.element(*n).is_some())
    }

    /// Pre-order descendants, excluding `id` itself
    #[must_use]
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self
            .nodes
            .get(id.0)
            .map(|n| n.children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(next) = stack.pop() {
            out.push(next);
            if let Some(node) = self.nodes.get(next.0) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    /// Element children of a node
    pub fn element_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .get(id.0)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
            .iter()
            .copied()
            .filter(move |c| self.element(*c).is_some())
    }

    /// First attached element with the given `id` attribute
    #[must_use]
    pub fn find_by_id(&self, html_id: &str) -> Option<NodeId> {
        self.descendants(self.root())
            .into_iter()
            .find(|n| self.element(*n).and_then(Element::id) == Some(html_id))
    }

    /// Locate the element carrying a driver handle
    #[must_use]
    pub fn find_by_ref(&self, handle: ElementRef) -> Option<NodeId> {
        self.nodes.iter().enumerate().find_map(|(i, n)| match &n.data {
            NodeData::Element(el) if el.handle == handle => Some(NodeId(i)),
            _ => None,
        })
    }

    /// Concatenated text of the subtree (`textContent`)
    #[must_use]
    pub fn text_content(&self, id: NodeId) -> String {
        self.text_content_excluding(id, None)
    }

    /// Concatenated text of the subtree, leaving out the subtree of `exclude`
    ///
    /// Asking for the text of a node inside `exclude` still returns that
    /// node's own text; only ancestors lose it.
    #[must_use]
    pub fn text_content_excluding(&self, id: NodeId, exclude: Option<NodeId>) -> String {
        let mut out = String::new();
        if let Some(NodeData::Text(t)) = self.nodes.get(id.0).map(|n| &n.data) {
            out.push_str(t);
            return out;
        }
        let skip = exclude.filter(|ex| !self.is_inclusive_ancestor(*ex, id));
        for node in self.descendants(id) {
            if skip.is_some_and(|ex| self.is_inclusive_ancestor(ex, node)) {
                continue;
            }
            if let Some(NodeData::Text(t)) = self.nodes.get(node.0).map(|n| &n.data) {
                out.push_str(t);
            }
        }
        out
    }

    /// Whitespace-normalised text of the subtree
    #[must_use]
    pub fn normalized_text(&self, id: NodeId) -> String {
        self.normalized_text_excluding(id, None)
    }

    /// Whitespace-normalised text of the subtree without the subtree of `exclude`
    #[must_use]
    pub fn normalized_text_excluding(&self, id: NodeId, exclude: Option<NodeId>) -> String {
        normalize_whitespace(&self.text_content_excluding(id, exclude))
    }

    /// Attached, rendered, and with non-zero extent
    #[must_use]
    pub fn is_visible(&self, id: NodeId) -> bool {
        let Some(el) = self.element(id) else {
            return false;
        };
        if !self.is_attached(id) {
            return false;
        }
        let hidden_above = std::iter::once(id)
            .chain(self.ancestors(id))
            .filter_map(|n| self.element(n))
            .any(|e| e.style.display_none || e.style.visibility_hidden);
        if hidden_above || el.style.transparent {
            return false;
        }
        self.has_extent(id)
    }

    fn has_extent(&self, id: NodeId) -> bool {
        let Some(el) = self.element(id) else {
            return false;
        };
        if el.style.display_none {
            return false;
        }
        if let Some(bbox) = el.bounding_box {
            return bbox.has_area();
        }
        if REPLACED_TAGS.contains(&el.tag.as_str()) {
            return true;
        }
        self.nodes[id.0].children.iter().any(|child| {
            match &self.nodes[child.0].data {
                NodeData::Text(t) => !t.trim().is_empty(),
                NodeData::Element(_) => self.has_extent(*child),
                NodeData::Root => false,
            }
        })
    }

    /// Not a disabled form control
    #[must_use]
    pub fn is_enabled(&self, id: NodeId) -> bool {
        self.element(id).is_some_and(|el| !el.disabled)
    }

    /// Build a document from a driver snapshot rooted at `<body>`
    #[must_use]
    pub fn from_snapshot(body: &SnapshotNode) -> Self {
        let mut doc = Self {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                data: NodeData::Root,
            }],
            body: NodeId(0),
        };
        let body_id = doc.insert_snapshot(body);
        let root = doc.root();
        doc.attach(root, body_id);
        doc.body = body_id;
        doc
    }

    fn insert_snapshot(&mut self, snap: &SnapshotNode) -> NodeId {
        let id = match (&snap.tag, &snap.text) {
            (Some(tag), _) => {
                let handle = ElementRef(snap.handle.unwrap_or(self.nodes.len() as u64));
                let id = self.create_element_with_ref(tag, handle);
                if let Some(el) = self.element_mut(id) {
                    el.attributes = snap.attributes.clone();
                    el.value = snap.value.clone();
                    el.disabled = snap.disabled;
                    el.style = snap.style;
                    el.bounding_box = snap.rect;
                    el.obscured = snap.obscured;
                }
                id
            }
            (None, Some(text)) => self.create_text(text),
            (None, None) => self.create_text(""),
        };
        for child in &snap.children {
            let child_id = self.insert_snapshot(child);
            self.attach(id, child_id);
        }
        id
    }
}

/// Serialised node as produced by a browser-side snapshot script
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotNode {
    /// Element tag (absent for text nodes)
    #[serde(default)]
    pub tag: Option<String>,
    /// Text payload (text nodes only)
    #[serde(default)]
    pub text: Option<String>,
    /// Stable `data-ensayo-ref` value
    #[serde(default, rename = "ref")]
    pub handle: Option<u64>,
    /// Attributes
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Form value
    #[serde(default)]
    pub value: Option<String>,
    /// Disabled form control
    #[serde(default)]
    pub disabled: bool,
    /// Computed style summary
    #[serde(default)]
    pub style: Style,
    /// Bounding client rect
    #[serde(default)]
    pub rect: Option<BoundingBox>,
    /// Hit test at the centre lands elsewhere
    #[serde(default)]
    pub obscured: bool,
    /// Child nodes
    #[serde(default)]
    pub children: Vec<SnapshotNode>,
}

#[derive(Debug, Clone)]
enum Child {
    Element(ElementBuilder),
    Text(String),
}

/// Fluent element tree builder
///
/// ```
/// use ensayo::{el, Document};
///
/// let mut doc = Document::new();
/// let body = doc.body();
/// let card = doc.append(
///     body,
///     el("div").class("product").child(el("h4").class("product-name").text("Carrot - 1 Kg")),
/// );
/// assert_eq!(doc.normalized_text(card), "Carrot - 1 Kg");
/// ```
#[derive(Debug, Clone)]
pub struct ElementBuilder {
    tag: String,
    attributes: BTreeMap<String, String>,
    value: Option<String>,
    disabled: bool,
    style: Style,
    bounding_box: Option<BoundingBox>,
    obscured: bool,
    children: Vec<Child>,
}

/// Start building an element
#[must_use]
pub fn el(tag: &str) -> ElementBuilder {
    ElementBuilder {
        tag: tag.to_string(),
        attributes: BTreeMap::new(),
        value: None,
        disabled: false,
        style: Style::default(),
        bounding_box: None,
        obscured: false,
        children: Vec::new(),
    }
}

impl ElementBuilder {
    /// Set `id`
    #[must_use]
    pub fn id(self, id: &str) -> Self {
        self.attr("id", id)
    }

    /// Add a class
    #[must_use]
    pub fn class(mut self, class: &str) -> Self {
        let entry = self.attributes.entry("class".to_string()).or_default();
        if !entry.is_empty() {
            entry.push(' ');
        }
        entry.push_str(class);
        self
    }

    /// Set an attribute
    #[must_use]
    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    /// Append a text child
    #[must_use]
    pub fn text(mut self, text: &str) -> Self {
        self.children.push(Child::Text(text.to_string()));
        self
    }

    /// Append an element child
    #[must_use]
    pub fn child(mut self, child: ElementBuilder) -> Self {
        self.children.push(Child::Element(child));
        self
    }

    /// Append several element children
    #[must_use]
    pub fn children(mut self, children: impl IntoIterator<Item = ElementBuilder>) -> Self {
        self.children
            .extend(children.into_iter().map(Child::Element));
        self
    }

    /// Set the form value
    #[must_use]
    pub fn value(mut self, value: &str) -> Self {
        self.value = Some(value.to_string());
        self
    }

    /// Mark as disabled
    #[must_use]
    pub const fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// `display: none`
    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.style.display_none = true;
        self
    }

    /// Explicit rendered size
    #[must_use]
    pub const fn size(mut self, width: f32, height: f32) -> Self {
        self.bounding_box = Some(BoundingBox::new(0.0, 0.0, width, height));
        self
    }

    /// Mark the hit point as covered by another element
    #[must_use]
    pub const fn obscured(mut self, obscured: bool) -> Self {
        self.obscured = obscured;
        self
    }

    fn build_into(self, doc: &mut Document) -> NodeId {
        let id = doc.create_element(&self.tag);
        if let Some(el) = doc.element_mut(id) {
            el.attributes = self.attributes;
            el.value = self.value;
            el.disabled = self.disabled;
            el.style = self.style;
            el.bounding_box = self.bounding_box;
            el.obscured = self.obscured;
        }
        for child in self.children {
            let child_id = match child {
                Child::Element(builder) => builder.build_into(doc),
                Child::Text(text) => doc.create_text(&text),
            };
            doc.attach(id, child_id);
        }
        id
    }
}
