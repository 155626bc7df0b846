use super::handler::{Event, EventHandler};
use crate::component::Component;
use crate::context::Context;
use smartstring::{LazyCompact, SmartString};
use std::collections::BTreeMap;
use std::fmt;

pub type Tag = SmartString<LazyCompact>;

/// Elements that never carry children and are encoded without a closing tag.
const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// A described UI tree, as produced by [`Component::render`].
///
/// Described nodes are plain values: they own their children and carry no
/// native state. Mounting turns them into slots of the [`Tree`](crate::Tree).
pub enum Node {
    Text(Text),
    Element(Element),
    Component(ComponentNode),
    Raw(RawMarkup),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Text,
    Element,
    Component,
    Raw,
}

impl Node {
    pub fn text(value: impl Into<String>) -> Self {
        Node::Text(Text::new(value))
    }

    pub fn raw(source: impl AsRef<str>) -> Self {
        Node::Raw(RawMarkup::new(source))
    }

    pub fn component<C: Component>(component: C) -> Self {
        Node::Component(ComponentNode::Instance(Box::new(component)))
    }

    /// A component referenced by its registered name.
    pub fn named(name: &str) -> Self {
        Node::Component(ComponentNode::Named(Tag::from(name)))
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Text(_) => NodeKind::Text,
            Node::Element(_) => NodeKind::Element,
            Node::Component(_) => NodeKind::Component,
            Node::Raw(_) => NodeKind::Raw,
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Text(text) => f.debug_tuple("Text").field(&text.value).finish(),
            Node::Element(el) => f
                .debug_struct("Element")
                .field("tag", &el.tag)
                .field("attributes", &el.attributes)
                .field("events", &el.handlers.keys().collect::<Vec<_>>())
                .field("children", &el.children)
                .finish(),
            Node::Component(ComponentNode::Instance(c)) => {
                f.debug_tuple("Component").field(&c.name()).finish()
            }
            Node::Component(ComponentNode::Named(name)) => {
                f.debug_tuple("Named").field(name).finish()
            }
            Node::Raw(raw) => f.debug_tuple("Raw").field(&raw.source).finish(),
        }
    }
}

impl From<Text> for Node {
    fn from(text: Text) -> Self {
        Node::Text(text)
    }
}

impl From<Element> for Node {
    fn from(el: Element) -> Self {
        Node::Element(el)
    }
}

impl From<RawMarkup> for Node {
    fn from(raw: RawMarkup) -> Self {
        Node::Raw(raw)
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Node::text(value)
    }
}

impl From<String> for Node {
    fn from(value: String) -> Self {
        Node::text(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Text {
    pub value: String,
}

impl Text {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

pub struct Element {
    pub(crate) tag: Tag,
    pub(crate) namespace: Tag,
    pub(crate) self_closing: bool,
    pub(crate) attributes: BTreeMap<Tag, String>,
    pub(crate) handlers: BTreeMap<Tag, EventHandler>,
    pub(crate) children: Vec<Node>,
}

impl Element {
    /// Creates an element; void tags such as `img` or `br` are self-closing.
    pub fn new(tag: &str) -> Self {
        Self {
            tag: Tag::from(tag),
            namespace: Tag::new(),
            self_closing: VOID_TAGS.contains(&tag),
            attributes: BTreeMap::new(),
            handlers: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn namespace(mut self, namespace: &str) -> Self {
        self.namespace = Tag::from(namespace);
        self
    }

    pub fn attr(mut self, name: &str, value: impl ToString) -> Self {
        self.attributes.insert(Tag::from(name), value.to_string());
        self
    }

    /// Sets a boolean attribute; `false` leaves it out entirely.
    pub fn flag(self, name: &str, enabled: bool) -> Self {
        if enabled { self.attr(name, "true") } else { self }
    }

    pub fn id(self, id: &str) -> Self {
        self.attr("id", id)
    }

    pub fn class(self, class: &str) -> Self {
        self.attr("class", class)
    }

    /// Registers a handler for `event`, replacing any previous one.
    pub fn on<F>(self, event: &str, callback: F) -> Self
    where
        F: Fn(&mut Context<'_>, &Event) + 'static,
    {
        self.handler(EventHandler::new(event, callback))
    }

    pub fn handler(mut self, handler: EventHandler) -> Self {
        self.handlers.insert(handler.event.clone(), handler);
        self
    }

    pub fn child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children<I>(mut self, children: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Node>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn is_self_closing(&self) -> bool {
        self.self_closing
    }
}

/// A component inside a described tree: either a live value or a name to be
/// looked up in the [`Registry`](crate::Registry) when mounted.
pub enum ComponentNode {
    Instance(Box<dyn Component>),
    Named(Tag),
}

/// Opaque pre-rendered markup. Only its root tag takes part in reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMarkup {
    pub(crate) source: String,
    pub(crate) root_tag: Tag,
}

impl RawMarkup {
    pub fn new(source: impl AsRef<str>) -> Self {
        let source = source.as_ref().trim();
        match sniff_root_tag(source) {
            Some(tag) => Self {
                root_tag: Tag::from(tag),
                source: source.to_string(),
            },
            None => Self {
                source: "<div></div>".to_string(),
                root_tag: Tag::from("div"),
            },
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root_tag(&self) -> &str {
        &self.root_tag
    }
}

/// Name of the first tag in `markup`, if it opens with an element.
pub(crate) fn sniff_root_tag(markup: &str) -> Option<&str> {
    let rest = markup.trim_start().strip_prefix('<')?;
    if rest.starts_with('/') {
        return None;
    }
    let end = rest
        .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
        .unwrap_or(rest.len());
    let tag = &rest[..end];
    (!tag.is_empty()).then_some(tag)
}
