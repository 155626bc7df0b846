use crate::context::Context;
use crate::node::{NodeId, Tag};
use serde_json::Value;
use std::any::TypeId;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Clone)]
pub(crate) struct Observer {
    owner: NodeId,
    identity: TypeId,
    callback: Rc<dyn Fn(&mut Context<'_>, &Value)>,
}

impl Observer {
    pub fn new<F>(owner: NodeId, callback: F) -> Self
    where
        F: Fn(&mut Context<'_>, &Value) + 'static,
    {
        Self {
            owner,
            identity: TypeId::of::<F>(),
            callback: Rc::new(callback),
        }
    }

    pub fn owner(&self) -> NodeId {
        self.owner
    }

    pub fn call(&self, ctx: &mut Context<'_>, value: &Value) {
        (self.callback)(ctx, value)
    }
}

/// Application-wide key/value state with per-key observers.
///
/// The store itself never calls observers; the engine delivers changes
/// through the dispatch queue.
#[derive(Default)]
pub(crate) struct StateStore {
    values: HashMap<Tag, Value>,
    observers: HashMap<Tag, Vec<Observer>>,
}

impl StateStore {
    /// Stores `value`; returns whether it differs from the previous one.
    pub fn set(&mut self, key: &str, value: Value) -> bool {
        if self.values.get(key) == Some(&value) {
            return false;
        }
        self.values.insert(Tag::from(key), value);
        true
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn delete(&mut self, key: &str) -> Option<Value> {
        self.observers.remove(key);
        self.values.remove(key)
    }

    pub fn observe(&mut self, key: &str, observer: Observer) {
        let observers = self.observers.entry(Tag::from(key)).or_default();
        match observers
            .iter_mut()
            .find(|o| o.owner == observer.owner && o.identity == observer.identity)
        {
            Some(existing) => *existing = observer,
            None => observers.push(observer),
        }
    }

    pub fn observers(&self, key: &str) -> Vec<Observer> {
        self.observers.get(key).cloned().unwrap_or_default()
    }

    pub fn has_observers(&self, key: &str) -> bool {
        self.observers.get(key).is_some_and(|o| !o.is_empty())
    }

    pub fn remove_owner(&mut self, owner: NodeId) {
        self.observers.retain(|_, observers| {
            observers.retain(|o| o.owner != owner);
            !observers.is_empty()
        });
    }
}
