use super::traits::{Host, HostHandle, StorageScope};
use crate::error::HostError;
use crate::node::ListenerId;
use std::collections::{BTreeMap, HashMap, HashSet};
use url::Url;

/// One native mutation, as seen by [`MemoryHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostOp {
    CreateElement {
        node: HostHandle,
        tag: String,
    },
    CreateText {
        node: HostHandle,
        value: String,
    },
    CreateRaw {
        node: HostHandle,
        markup: String,
    },
    SetText {
        node: HostHandle,
        value: String,
    },
    SetAttribute {
        node: HostHandle,
        name: String,
        value: String,
    },
    RemoveAttribute {
        node: HostHandle,
        name: String,
    },
    AddListener {
        node: HostHandle,
        event: String,
        listener: ListenerId,
    },
    RemoveListener {
        node: HostHandle,
        event: String,
        listener: ListenerId,
    },
    AppendChild {
        parent: HostHandle,
        child: HostHandle,
    },
    ReplaceChild {
        parent: HostHandle,
        new: HostHandle,
        old: HostHandle,
    },
    RemoveChild {
        parent: HostHandle,
        child: HostHandle,
    },
    Release {
        node: HostHandle,
    },
}

impl HostOp {
    pub fn is_create(&self) -> bool {
        matches!(
            self,
            HostOp::CreateElement { .. } | HostOp::CreateText { .. } | HostOp::CreateRaw { .. }
        )
    }
}

#[derive(Debug, Clone)]
enum MemoryNode {
    Element {
        tag: String,
        namespace: String,
        attributes: BTreeMap<String, String>,
        listeners: Vec<(String, ListenerId)>,
        children: Vec<HostHandle>,
    },
    Text(String),
    Raw(String),
}

/// In-memory host that records every operation.
///
/// Used by tests to assert on the exact mutations the reconciler performs, and
/// for rendering without a live document.
pub struct MemoryHost {
    nodes: HashMap<HostHandle, MemoryNode>,
    ops: Vec<HostOp>,
    next_handle: u64,
    root: HostHandle,
    title: String,
    meta: BTreeMap<String, String>,
    local: HashMap<String, String>,
    session: HashMap<String, String>,
    viewport: (u32, u32),
    pointer: (i32, i32),
    opened: Vec<Url>,
    failing_tags: HashSet<String>,
}

impl MemoryHost {
    pub fn new() -> Self {
        let root = HostHandle(0);
        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            MemoryNode::Element {
                tag: "body".to_string(),
                namespace: String::new(),
                attributes: BTreeMap::new(),
                listeners: Vec::new(),
                children: Vec::new(),
            },
        );

        Self {
            nodes,
            ops: Vec::new(),
            next_handle: 1,
            root,
            title: String::new(),
            meta: BTreeMap::new(),
            local: HashMap::new(),
            session: HashMap::new(),
            viewport: (1280, 720),
            pointer: (0, 0),
            opened: Vec::new(),
            failing_tags: HashSet::new(),
        }
    }

    pub fn ops(&self) -> &[HostOp] {
        &self.ops
    }

    pub fn take_ops(&mut self) -> Vec<HostOp> {
        std::mem::take(&mut self.ops)
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    pub fn count(&self, pred: impl Fn(&HostOp) -> bool) -> usize {
        self.ops.iter().filter(|op| pred(op)).count()
    }

    /// Makes every later `create_element` for `tag` fail.
    pub fn fail_tag(&mut self, tag: &str) {
        self.failing_tags.insert(tag.to_string());
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
    }

    pub fn set_pointer(&mut self, x: i32, y: i32) {
        self.pointer = (x, y);
    }

    pub fn opened_urls(&self) -> &[Url] {
        &self.opened
    }

    pub fn is_live(&self, node: HostHandle) -> bool {
        self.nodes.contains_key(&node)
    }

    /// Native nodes currently alive, excluding the root.
    pub fn live_nodes(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn live_listeners(&self) -> usize {
        self.nodes
            .values()
            .map(|node| match node {
                MemoryNode::Element { listeners, .. } => listeners.len(),
                _ => 0,
            })
            .sum()
    }

    pub fn find_listener(&self, node: HostHandle, event: &str) -> Option<ListenerId> {
        match self.nodes.get(&node)? {
            MemoryNode::Element { listeners, .. } => listeners
                .iter()
                .find(|(name, _)| name == event)
                .map(|(_, id)| *id),
            _ => None,
        }
    }

    pub fn children(&self, node: HostHandle) -> &[HostHandle] {
        match self.nodes.get(&node) {
            Some(MemoryNode::Element { children, .. }) => children.as_slice(),
            _ => &[],
        }
    }

    pub fn tag(&self, node: HostHandle) -> Option<&str> {
        match self.nodes.get(&node)? {
            MemoryNode::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn namespace(&self, node: HostHandle) -> Option<&str> {
        match self.nodes.get(&node)? {
            MemoryNode::Element { namespace, .. } => Some(namespace),
            _ => None,
        }
    }

    pub fn text(&self, node: HostHandle) -> Option<&str> {
        match self.nodes.get(&node)? {
            MemoryNode::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn attribute(&self, node: HostHandle, name: &str) -> Option<&str> {
        match self.nodes.get(&node)? {
            MemoryNode::Element { attributes, .. } => attributes.get(name).map(String::as_str),
            _ => None,
        }
    }

    /// Compact markup of everything below `node`, for assertions.
    pub fn inner_html(&self, node: HostHandle) -> String {
        let mut out = String::new();
        for child in self.children(node) {
            self.write_html(*child, &mut out);
        }
        out
    }

    fn write_html(&self, node: HostHandle, out: &mut String) {
        match self.nodes.get(&node) {
            Some(MemoryNode::Element {
                tag,
                attributes,
                children,
                ..
            }) => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attributes {
                    out.push_str(&format!(" {name}=\"{value}\""));
                }
                out.push('>');
                for child in children {
                    self.write_html(*child, out);
                }
                out.push_str(&format!("</{tag}>"));
            }
            Some(MemoryNode::Text(value)) => out.push_str(value),
            Some(MemoryNode::Raw(markup)) => out.push_str(markup),
            None => {}
        }
    }

    fn allocate(&mut self, node: MemoryNode) -> HostHandle {
        let handle = HostHandle(self.next_handle);
        self.next_handle += 1;
        self.nodes.insert(handle, node);
        handle
    }

    fn children_mut(&mut self, node: HostHandle) -> Option<&mut Vec<HostHandle>> {
        match self.nodes.get_mut(&node)? {
            MemoryNode::Element { children, .. } => Some(children),
            _ => None,
        }
    }

    fn store(&mut self, scope: StorageScope) -> &mut HashMap<String, String> {
        match scope {
            StorageScope::Local => &mut self.local,
            StorageScope::Session => &mut self.session,
        }
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for MemoryHost {
    fn root(&self) -> HostHandle {
        self.root
    }

    fn create_element(&mut self, tag: &str, namespace: &str) -> Result<HostHandle, HostError> {
        let invalid = tag.is_empty()
            || tag.contains(|c: char| c.is_whitespace() || c == '<' || c == '>')
            || self.failing_tags.contains(tag);
        if invalid {
            return Err(HostError::InvalidTag {
                tag: tag.to_string(),
            });
        }

        let node = self.allocate(MemoryNode::Element {
            tag: tag.to_string(),
            namespace: namespace.to_string(),
            attributes: BTreeMap::new(),
            listeners: Vec::new(),
            children: Vec::new(),
        });
        self.ops.push(HostOp::CreateElement {
            node,
            tag: tag.to_string(),
        });
        Ok(node)
    }

    fn create_text(&mut self, value: &str) -> HostHandle {
        let node = self.allocate(MemoryNode::Text(value.to_string()));
        self.ops.push(HostOp::CreateText {
            node,
            value: value.to_string(),
        });
        node
    }

    fn create_raw(&mut self, markup: &str) -> Result<HostHandle, HostError> {
        if markup.trim().is_empty() {
            return Err(HostError::EmptyMarkup);
        }
        let node = self.allocate(MemoryNode::Raw(markup.to_string()));
        self.ops.push(HostOp::CreateRaw {
            node,
            markup: markup.to_string(),
        });
        Ok(node)
    }

    fn set_text(&mut self, node: HostHandle, value: &str) {
        if let Some(MemoryNode::Text(current)) = self.nodes.get_mut(&node) {
            *current = value.to_string();
        }
        self.ops.push(HostOp::SetText {
            node,
            value: value.to_string(),
        });
    }

    fn set_attribute(&mut self, node: HostHandle, name: &str, value: &str) {
        if let Some(MemoryNode::Element { attributes, .. }) = self.nodes.get_mut(&node) {
            attributes.insert(name.to_string(), value.to_string());
        }
        self.ops.push(HostOp::SetAttribute {
            node,
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    fn remove_attribute(&mut self, node: HostHandle, name: &str) {
        if let Some(MemoryNode::Element { attributes, .. }) = self.nodes.get_mut(&node) {
            attributes.remove(name);
        }
        self.ops.push(HostOp::RemoveAttribute {
            node,
            name: name.to_string(),
        });
    }

    fn add_listener(&mut self, node: HostHandle, event: &str, listener: ListenerId, _passive: bool) {
        if let Some(MemoryNode::Element { listeners, .. }) = self.nodes.get_mut(&node) {
            listeners.push((event.to_string(), listener));
        }
        self.ops.push(HostOp::AddListener {
            node,
            event: event.to_string(),
            listener,
        });
    }

    fn remove_listener(&mut self, node: HostHandle, event: &str, listener: ListenerId) {
        if let Some(MemoryNode::Element { listeners, .. }) = self.nodes.get_mut(&node) {
            listeners.retain(|(_, id)| *id != listener);
        }
        self.ops.push(HostOp::RemoveListener {
            node,
            event: event.to_string(),
            listener,
        });
    }

    fn append_child(&mut self, parent: HostHandle, child: HostHandle) {
        if let Some(children) = self.children_mut(parent) {
            children.push(child);
        }
        self.ops.push(HostOp::AppendChild { parent, child });
    }

    fn replace_child(&mut self, parent: HostHandle, new: HostHandle, old: HostHandle) {
        if let Some(children) = self.children_mut(parent) {
            if let Some(index) = children.iter().position(|c| *c == old) {
                children[index] = new;
            }
        }
        self.ops.push(HostOp::ReplaceChild { parent, new, old });
    }

    fn remove_child(&mut self, parent: HostHandle, child: HostHandle) {
        if let Some(children) = self.children_mut(parent) {
            children.retain(|c| *c != child);
        }
        self.ops.push(HostOp::RemoveChild { parent, child });
    }

    fn release(&mut self, node: HostHandle) {
        if node != self.root {
            self.nodes.remove(&node);
        }
        self.ops.push(HostOp::Release { node });
    }

    fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    fn pointer(&self) -> (i32, i32) {
        self.pointer
    }

    fn title(&self) -> String {
        self.title.clone()
    }

    fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
    }

    fn meta(&self, name: &str) -> Option<String> {
        self.meta.get(name).cloned()
    }

    fn set_meta(&mut self, name: &str, content: &str) {
        self.meta.insert(name.to_string(), content.to_string());
    }

    fn storage_get(&self, scope: StorageScope, key: &str) -> Option<String> {
        let store = match scope {
            StorageScope::Local => &self.local,
            StorageScope::Session => &self.session,
        };
        store.get(key).cloned()
    }

    fn storage_set(
        &mut self,
        scope: StorageScope,
        key: &str,
        value: &str,
    ) -> Result<(), HostError> {
        self.store(scope).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn storage_delete(&mut self, scope: StorageScope, key: &str) {
        self.store(scope).remove(key);
    }

    fn open_url(&mut self, url: &Url) {
        self.opened.push(url.clone());
    }
}
