use crate::context::Context;
use crate::node::{NodeId, Tag};
use serde::{Deserialize, Serialize};
use std::any::TypeId;
use std::collections::HashMap;
use std::rc::Rc;

/// A named message posted to every handler registered for that name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl Action {
    pub fn new(name: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            value,
            tags: HashMap::new(),
        }
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

#[derive(Clone)]
pub struct ActionHandler {
    identity: TypeId,
    callback: Rc<dyn Fn(&mut Context<'_>, &Action)>,
}

impl ActionHandler {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&mut Context<'_>, &Action) + 'static,
    {
        Self {
            identity: TypeId::of::<F>(),
            callback: Rc::new(callback),
        }
    }

    pub(crate) fn call(&self, ctx: &mut Context<'_>, action: &Action) {
        (self.callback)(ctx, action)
    }
}

/// Action handlers keyed by action name, each owned by a mounted node.
#[derive(Default)]
pub(crate) struct ActionBus {
    handlers: HashMap<Tag, Vec<(NodeId, ActionHandler)>>,
}

impl ActionBus {
    /// Registering the same closure twice for one node keeps a single entry.
    pub fn handle(&mut self, action: &str, owner: NodeId, handler: ActionHandler) {
        let entries = self.handlers.entry(Tag::from(action)).or_default();
        match entries
            .iter_mut()
            .find(|(node, existing)| *node == owner && existing.identity == handler.identity)
        {
            Some((_, existing)) => *existing = handler,
            None => entries.push((owner, handler)),
        }
    }

    pub fn handlers(&self, action: &str) -> Vec<(NodeId, ActionHandler)> {
        self.handlers.get(action).cloned().unwrap_or_default()
    }

    /// Drops everything `owner` registered.
    pub fn remove_owner(&mut self, owner: NodeId) {
        self.handlers.retain(|_, entries| {
            entries.retain(|(node, _)| *node != owner);
            !entries.is_empty()
        });
    }

    pub fn len(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeArena;

    fn ids(n: usize) -> Vec<NodeId> {
        let mut arena = NodeArena::new();
        (0..n).map(|_| arena.reserve()).collect()
    }

    fn noop() -> ActionHandler {
        ActionHandler::new(|_ctx, _action| {})
    }

    #[test]
    fn test_handlers_fan_out_per_owner() {
        let owners = ids(2);
        let mut bus = ActionBus::default();
        bus.handle("save", owners[0], noop());
        bus.handle("save", owners[1], noop());
        bus.handle("load", owners[0], noop());

        assert_eq!(bus.handlers("save").len(), 2);
        assert_eq!(bus.handlers("load").len(), 1);
        assert!(bus.handlers("other").is_empty());
    }

    #[test]
    fn test_same_closure_registered_once() {
        let owners = ids(1);
        let mut bus = ActionBus::default();
        bus.handle("save", owners[0], noop());
        bus.handle("save", owners[0], noop());
        assert_eq!(bus.len(), 1);
    }

    #[test]
    fn test_remove_owner() {
        let owners = ids(2);
        let mut bus = ActionBus::default();
        bus.handle("save", owners[0], noop());
        bus.handle("save", owners[1], noop());

        bus.remove_owner(owners[0]);
        let left = bus.handlers("save");
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].0, owners[1]);
    }

    #[test]
    fn test_action_serializes() {
        let action = Action::new("save", serde_json::json!({ "id": 3 })).tag("source", "toolbar");
        let encoded = serde_json::to_string(&action).unwrap();
        let decoded: Action = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, action);
    }
}
