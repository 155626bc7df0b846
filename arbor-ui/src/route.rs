use crate::component::{Component, Constructor};
use crate::node::builder::{div, h1, p};
use crate::node::Node;
use std::collections::HashMap;

/// Maps a path to the component shown for it.
pub trait Routes {
    fn resolve(&self, path: &str) -> Option<Box<dyn Component>>;
}

/// Exact-path route lookup.
#[derive(Default)]
pub struct RouteTable {
    routes: HashMap<String, Constructor>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, path: &str, constructor: Constructor) -> Self {
        self.add(path, constructor);
        self
    }

    pub fn add(&mut self, path: &str, constructor: Constructor) {
        self.routes.insert(normalize(path).to_string(), constructor);
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl Routes for RouteTable {
    fn resolve(&self, path: &str) -> Option<Box<dyn Component>> {
        self.routes.get(normalize(path)).map(|constructor| constructor())
    }
}

fn normalize(path: &str) -> &str {
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}

/// Shown when no route matches.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NotFound {
    pub path: String,
}

impl Component for NotFound {
    fn render(&self) -> Option<Node> {
        Some(
            div()
                .class("arbor-not-found")
                .child(h1().child("Not found"))
                .child(p().child(self.path.as_str()))
                .into(),
        )
    }

    fn update_fields(&mut self, next: &dyn std::any::Any) -> bool {
        let Some(next) = next.downcast_ref::<Self>() else {
            return false;
        };
        crate::component::sync(&mut self.path, &next.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Home;

    impl Component for Home {
        fn render(&self) -> Option<Node> {
            Some(Node::text("home"))
        }
    }

    #[test]
    fn test_exact_lookup() {
        let routes = RouteTable::new()
            .route("/", || Box::new(Home))
            .route("/about/", || Box::new(NotFound::default()));

        assert_eq!(routes.len(), 2);
        assert!((*routes.resolve("/").unwrap()).as_any().is::<Home>());
        assert!((*routes.resolve("/about").unwrap()).as_any().is::<NotFound>());
        assert!(routes.resolve("/about/team").is_none());
        assert!(routes.resolve("/missing").is_none());
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("/a/b/"), "/a/b");
    }
}
