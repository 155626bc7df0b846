use super::arena::{Mounted, NodeArena, NodeId};
use super::types::{ComponentNode, Node};
use std::collections::BTreeMap;

/// Structure of a tree, independent of native handles.
///
/// Both described and mounted trees can be turned into a `Shape`, which makes
/// it easy to check that a mounted tree matches what a component rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    Text(String),
    Element {
        tag: String,
        namespace: String,
        attributes: BTreeMap<String, String>,
        events: Vec<String>,
        children: Vec<Shape>,
    },
    Component {
        name: String,
        root: Option<Box<Shape>>,
    },
    /// A component referenced by registry name, not yet resolved.
    Named(String),
    Raw {
        tag: String,
    },
}

impl Node {
    pub fn shape(&self) -> Shape {
        match self {
            Node::Text(text) => Shape::Text(text.value.clone()),
            Node::Element(el) => Shape::Element {
                tag: el.tag.to_string(),
                namespace: el.namespace.to_string(),
                attributes: el
                    .attributes
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
                events: el.handlers.keys().map(|k| k.to_string()).collect(),
                children: el.children.iter().map(Node::shape).collect(),
            },
            Node::Component(ComponentNode::Instance(component)) => Shape::Component {
                name: component.name().to_string(),
                root: component.render().map(|root| Box::new(root.shape())),
            },
            Node::Component(ComponentNode::Named(name)) => Shape::Named(name.to_string()),
            Node::Raw(raw) => Shape::Raw {
                tag: raw.root_tag.to_string(),
            },
        }
    }
}

pub(crate) fn mounted_shape(arena: &NodeArena, id: NodeId) -> Option<Shape> {
    let slot = arena.get(id)?;
    let shape = match &slot.node {
        Mounted::Text(value) => Shape::Text(value.clone()),
        Mounted::Element(el) => Shape::Element {
            tag: el.tag.to_string(),
            namespace: el.namespace.to_string(),
            attributes: el
                .attributes
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            events: el.handlers.keys().map(|k| k.to_string()).collect(),
            children: el
                .children
                .iter()
                .filter_map(|child| mounted_shape(arena, *child))
                .collect(),
        },
        Mounted::Component(component) => Shape::Component {
            name: component.name.to_string(),
            root: mounted_shape(arena, component.root).map(Box::new),
        },
        Mounted::Raw(raw) => Shape::Raw {
            tag: raw.root_tag.to_string(),
        },
    };
    Some(shape)
}
