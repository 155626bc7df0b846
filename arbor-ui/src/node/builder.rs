//! Shorthand constructors for common elements.

use super::types::{Element, Node};

pub fn el(tag: &str) -> Element {
    Element::new(tag)
}

pub fn text(value: impl Into<String>) -> Node {
    Node::text(value)
}

pub fn raw(markup: &str) -> Node {
    Node::raw(markup)
}

pub fn div() -> Element {
    Element::new("div")
}

pub fn span() -> Element {
    Element::new("span")
}

pub fn p() -> Element {
    Element::new("p")
}

pub fn h1() -> Element {
    Element::new("h1")
}

pub fn h2() -> Element {
    Element::new("h2")
}

pub fn a() -> Element {
    Element::new("a")
}

pub fn button() -> Element {
    Element::new("button")
}

pub fn input() -> Element {
    Element::new("input")
}

pub fn img() -> Element {
    Element::new("img")
}

pub fn ul() -> Element {
    Element::new("ul")
}

pub fn li() -> Element {
    Element::new("li")
}

pub fn svg() -> Element {
    Element::new("svg").namespace("http://www.w3.org/2000/svg")
}
