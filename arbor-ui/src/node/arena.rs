use super::handler::{EventHandler, ListenerId};
use super::types::{RawMarkup, Tag};
use crate::component::Component;
use crate::host::HostHandle;
use smallvec::SmallVec;
use std::collections::BTreeMap;

/// Generational index of a mounted node.
///
/// A stale id keeps its old generation, so it never resolves to whatever
/// node later reuses the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub fn index(&self) -> u32 {
        self.index
    }
}

pub(crate) type Children = SmallVec<[NodeId; 4]>;

pub(crate) struct Slot {
    pub(crate) node: Mounted,
    pub(crate) parent: Option<NodeId>,
    pub(crate) depth: u32,
    pub(crate) handle: HostHandle,
}

pub(crate) enum Mounted {
    Text(String),
    Element(MountedElement),
    Component(MountedComponent),
    Raw(RawMarkup),
}

pub(crate) struct MountedElement {
    pub(crate) tag: Tag,
    pub(crate) namespace: Tag,
    pub(crate) self_closing: bool,
    pub(crate) attributes: BTreeMap<Tag, String>,
    pub(crate) handlers: BTreeMap<Tag, MountedHandler>,
    pub(crate) children: Children,
}

pub(crate) struct MountedHandler {
    pub(crate) handler: EventHandler,
    pub(crate) listener: ListenerId,
}

pub(crate) struct MountedComponent {
    pub(crate) name: &'static str,
    pub(crate) instance: Box<dyn Component>,
    pub(crate) root: NodeId,
}

impl Mounted {
    /// Direct children in tree order; a component's only child is its root.
    pub(crate) fn children(&self) -> Children {
        match self {
            Mounted::Element(el) => el.children.clone(),
            Mounted::Component(c) => SmallVec::from_elem(c.root, 1),
            Mounted::Text(_) | Mounted::Raw(_) => SmallVec::new(),
        }
    }
}

struct Entry {
    generation: u32,
    slot: Option<Slot>,
}

/// Storage for mounted nodes, addressed by [`NodeId`].
pub(crate) struct NodeArena {
    entries: Vec<Entry>,
    free_list: Vec<u32>,
    live: usize,
}

impl NodeArena {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            free_list: Vec::new(),
            live: 0,
        }
    }

    /// Hands out an id whose slot is filled later by [`NodeArena::fill`].
    ///
    /// Components need their own id before their root is mounted, so the
    /// root can record its parent.
    pub fn reserve(&mut self) -> NodeId {
        let index = match self.free_list.pop() {
            Some(index) => index,
            None => {
                self.entries.push(Entry {
                    generation: 0,
                    slot: None,
                });
                (self.entries.len() - 1) as u32
            }
        };
        NodeId {
            index,
            generation: self.entries[index as usize].generation,
        }
    }

    pub fn fill(&mut self, id: NodeId, slot: Slot) {
        if let Some(entry) = self.entry_mut(id) {
            if entry.slot.is_none() {
                entry.slot = Some(slot);
                self.live += 1;
            }
        }
    }

    /// Returns a reserved id that was never filled.
    pub fn unreserve(&mut self, id: NodeId) {
        if let Some(entry) = self.entry_mut(id) {
            if entry.slot.is_none() {
                entry.generation = entry.generation.wrapping_add(1);
                self.free_list.push(id.index);
            }
        }
    }

    pub fn insert(&mut self, slot: Slot) -> NodeId {
        let id = self.reserve();
        self.fill(id, slot);
        id
    }

    pub fn remove(&mut self, id: NodeId) -> Option<Slot> {
        let entry = self.entry_mut(id)?;
        let slot = entry.slot.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.free_list.push(id.index);
        self.live -= 1;
        Some(slot)
    }

    pub fn get(&self, id: NodeId) -> Option<&Slot> {
        let entry = self.entries.get(id.index as usize)?;
        if entry.generation != id.generation {
            return None;
        }
        entry.slot.as_ref()
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Slot> {
        self.entry_mut(id)?.slot.as_mut()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id)?.parent
    }

    pub fn handle(&self, id: NodeId) -> Option<HostHandle> {
        self.get(id).map(|slot| slot.handle)
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut MountedElement> {
        match &mut self.get_mut(id)?.node {
            Mounted::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn component(&self, id: NodeId) -> Option<&MountedComponent> {
        match &self.get(id)?.node {
            Mounted::Component(c) => Some(c),
            _ => None,
        }
    }

    pub fn component_mut(&mut self, id: NodeId) -> Option<&mut MountedComponent> {
        match &mut self.get_mut(id)?.node {
            Mounted::Component(c) => Some(c),
            _ => None,
        }
    }

    /// Nearest component at or above `id`.
    pub fn enclosing_component(&self, id: NodeId) -> Option<NodeId> {
        let mut current = Some(id);
        while let Some(node) = current {
            let slot = self.get(node)?;
            if matches!(slot.node, Mounted::Component(_)) {
                return Some(node);
            }
            current = slot.parent;
        }
        None
    }

    /// Number of live slots.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    fn entry_mut(&mut self, id: NodeId) -> Option<&mut Entry> {
        let entry = self.entries.get_mut(id.index as usize)?;
        (entry.generation == id.generation).then_some(entry)
    }
}

impl Default for NodeArena {
    fn default() -> Self {
        Self::new()
    }
}
