use super::types::Tag;
use crate::context::Context;
use serde::{Deserialize, Serialize};
use std::any::TypeId;
use std::fmt;
use std::rc::Rc;

pub type EventCallback = Rc<dyn Fn(&mut Context<'_>, &Event)>;

/// Identifies one native listener registered with the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListenerId(pub u64);

/// A native event delivered by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Event {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: serde_json::Value::Null,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Looks up `key` in the event payload, e.g. `value` for input events.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }
}

/// Describes an event subscription on an element.
///
/// Two handlers are considered the same when event name, scope and the
/// callback's type match. A closure literal has a single type no matter how
/// many times it is rebuilt, so re-rendering the same code keeps the native
/// listener and only swaps the stored callback.
#[derive(Clone)]
pub struct EventHandler {
    pub(crate) event: Tag,
    pub(crate) scope: String,
    pub(crate) passive: bool,
    pub(crate) identity: TypeId,
    pub(crate) callback: EventCallback,
}

impl EventHandler {
    pub fn new<F>(event: &str, callback: F) -> Self
    where
        F: Fn(&mut Context<'_>, &Event) + 'static,
    {
        Self {
            event: Tag::from(event),
            scope: String::new(),
            passive: false,
            identity: TypeId::of::<F>(),
            callback: Rc::new(callback),
        }
    }

    /// Distinguishes handlers built from the same closure, e.g. per list item.
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn passive(mut self) -> Self {
        self.passive = true;
        self
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn same_as(&self, other: &EventHandler) -> bool {
        self.event == other.event && self.scope == other.scope && self.identity == other.identity
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandler")
            .field("event", &self.event)
            .field("scope", &self.scope)
            .field("passive", &self.passive)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(scope: &str) -> EventHandler {
        EventHandler::new("click", |_ctx, _event| {}).scope(scope)
    }

    #[test]
    fn test_same_closure_is_same_handler() {
        assert!(build("a").same_as(&build("a")));
        assert!(!build("a").same_as(&build("b")));
    }

    #[test]
    fn test_different_closures_differ() {
        let a = EventHandler::new("click", |_ctx, _event| {});
        let b = EventHandler::new("click", |_ctx, _event| {});
        assert!(!a.same_as(&b));

        let c = EventHandler::new("input", |_ctx, _event| {});
        assert!(!a.same_as(&c));
    }

    #[test]
    fn test_event_payload() {
        let event = Event::new("input").with_data(serde_json::json!({ "value": "abc" }));
        assert_eq!(event.get("value").and_then(|v| v.as_str()), Some("abc"));
        assert!(event.get("missing").is_none());
    }
}
