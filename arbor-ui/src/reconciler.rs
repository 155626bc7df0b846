use crate::component::{Component, Registry};
use crate::context::{Context, Services};
use crate::error::{MountError, UpdateError};
use crate::host::{Host, HostHandle};
use crate::node::{
    Children, ComponentNode, Element, EventCallback, EventHandler, ListenerId, Mounted,
    MountedComponent, MountedElement, MountedHandler, Node, NodeArena, NodeId, NodeKind, Shape,
    Slot, encode, mounted_shape,
};
use crate::scheduler::{Dispatch, DispatchMode, Hook, Job};
use crate::update::UpdateManager;
use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error};

/// The mounted component tree and the host it is mirrored into.
///
/// `Tree` turns described nodes into mounted ones and keeps them in sync:
/// [`Tree::update`] compares a mounted node with a new description and
/// performs the smallest set of host mutations that makes them match.
pub struct Tree<H: Host> {
    pub(crate) arena: NodeArena,
    pub(crate) host: H,
    pub(crate) updates: UpdateManager,
    pub(crate) registry: Registry,
    pub(crate) services: Services,
    listeners: HashMap<ListenerId, NodeId>,
    next_listener: u64,
}

impl<H: Host> Tree<H> {
    pub(crate) fn new(host: H, registry: Registry, services: Services) -> Self {
        Self {
            arena: NodeArena::new(),
            host,
            updates: UpdateManager::new(),
            registry,
            services,
            listeners: HashMap::new(),
            next_listener: 1,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn updates(&self) -> &UpdateManager {
        &self.updates
    }

    pub fn is_mounted(&self, id: NodeId) -> bool {
        self.arena.contains(id)
    }

    /// Number of mounted nodes.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn handle(&self, id: NodeId) -> Option<HostHandle> {
        self.arena.handle(id)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.arena.parent(id)
    }

    pub fn depth(&self, id: NodeId) -> Option<u32> {
        self.arena.get(id).map(|slot| slot.depth)
    }

    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.arena.get(id).map(|slot| match slot.node {
            Mounted::Text(_) => NodeKind::Text,
            Mounted::Element(_) => NodeKind::Element,
            Mounted::Component(_) => NodeKind::Component,
            Mounted::Raw(_) => NodeKind::Raw,
        })
    }

    /// Children of an element, or the root of a component.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.arena
            .get(id)
            .map(|slot| slot.node.children().into_vec())
            .unwrap_or_default()
    }

    pub fn component<T: Component>(&self, id: NodeId) -> Option<&T> {
        (*self.arena.component(id)?.instance)
            .as_any()
            .downcast_ref::<T>()
    }

    pub fn component_mut<T: Component>(&mut self, id: NodeId) -> Option<&mut T> {
        (*self.arena.component_mut(id)?.instance)
            .as_any_mut()
            .downcast_mut::<T>()
    }

    pub fn shape(&self, id: NodeId) -> Option<Shape> {
        mounted_shape(&self.arena, id)
    }

    /// Indented HTML for the subtree at `id`.
    pub fn html(&self, id: NodeId) -> String {
        let mut out = String::new();
        encode(&self.arena, id, &mut out);
        out
    }

    /// Mounts `node` below `parent`, without attaching it to the parent's
    /// native node.
    ///
    /// On failure everything created by this call is dismounted again.
    pub fn mount(
        &mut self,
        node: Node,
        parent: Option<NodeId>,
        depth: u32,
    ) -> Result<NodeId, MountError> {
        self.mount_node(node, parent, depth).map(|(id, _)| id)
    }

    fn mount_node(
        &mut self,
        node: Node,
        parent: Option<NodeId>,
        depth: u32,
    ) -> Result<(NodeId, HostHandle), MountError> {
        match node {
            Node::Text(text) => {
                let handle = self.host.create_text(&text.value);
                let id = self.arena.insert(Slot {
                    node: Mounted::Text(text.value),
                    parent,
                    depth,
                    handle,
                });
                Ok((id, handle))
            }
            Node::Raw(raw) => {
                let handle = self.host.create_raw(&raw.source)?;
                let id = self.arena.insert(Slot {
                    node: Mounted::Raw(raw),
                    parent,
                    depth,
                    handle,
                });
                Ok((id, handle))
            }
            Node::Element(el) => self.mount_element(el, parent, depth),
            Node::Component(component) => self.mount_component(component, parent, depth),
        }
    }

    fn mount_element(
        &mut self,
        el: Element,
        parent: Option<NodeId>,
        depth: u32,
    ) -> Result<(NodeId, HostHandle), MountError> {
        let Element {
            tag,
            namespace,
            self_closing,
            attributes,
            handlers,
            children,
        } = el;

        if self_closing && !children.is_empty() {
            return Err(MountError::SelfClosingChildren {
                tag: tag.to_string(),
            });
        }

        let handle = self.host.create_element(&tag, &namespace)?;
        for (name, value) in &attributes {
            self.host.set_attribute(handle, name, value);
        }

        let id = self.arena.insert(Slot {
            node: Mounted::Element(MountedElement {
                tag: tag.clone(),
                namespace,
                self_closing,
                attributes,
                handlers: BTreeMap::new(),
                children: Children::new(),
            }),
            parent,
            depth,
            handle,
        });

        let mut mounted_handlers = BTreeMap::new();
        for (event, handler) in handlers {
            let mounted = self.attach(id, handle, handler);
            mounted_handlers.insert(event, mounted);
        }

        let mut mounted_children = Children::new();
        let mut failure = None;
        for (index, child) in children.into_iter().enumerate() {
            match self.mount_node(child, Some(id), depth + 1) {
                Ok((child_id, child_handle)) => {
                    self.host.append_child(handle, child_handle);
                    mounted_children.push(child_id);
                }
                Err(err) => {
                    failure = Some((index, err));
                    break;
                }
            }
        }

        if let Some(el) = self.arena.element_mut(id) {
            el.handlers = mounted_handlers;
            el.children = mounted_children;
        }

        match failure {
            None => Ok((id, handle)),
            Some((index, err)) => {
                self.dismount(id);
                Err(MountError::ChildFailed {
                    tag: tag.to_string(),
                    index,
                    source: Box::new(err),
                })
            }
        }
    }

    fn mount_component(
        &mut self,
        component: ComponentNode,
        parent: Option<NodeId>,
        depth: u32,
    ) -> Result<(NodeId, HostHandle), MountError> {
        let instance = self.resolve(component)?;
        let name = instance.name();
        let root = instance
            .render()
            .ok_or(MountError::EmptyRender { component: name })?;

        let id = self.arena.reserve();
        let (root_id, handle) = match self.mount_node(root, Some(id), depth + 1) {
            Ok(mounted) => mounted,
            Err(err) => {
                self.arena.unreserve(id);
                return Err(MountError::RootFailed {
                    component: name,
                    source: Box::new(err),
                });
            }
        };

        self.arena.fill(
            id,
            Slot {
                node: Mounted::Component(MountedComponent {
                    name,
                    instance,
                    root: root_id,
                }),
                parent,
                depth,
                handle,
            },
        );
        self.services.dispatcher.submit(Dispatch::new(
            DispatchMode::Update,
            Some(id),
            Job::Hook(Hook::Mount),
        ));
        debug!(component = name, depth, "mounted component");
        Ok((id, handle))
    }

    fn resolve(&self, component: ComponentNode) -> Result<Box<dyn Component>, MountError> {
        match component {
            ComponentNode::Instance(instance) => Ok(instance),
            ComponentNode::Named(name) => {
                self.registry
                    .create(&name)
                    .ok_or_else(|| MountError::Unregistered {
                        name: name.to_string(),
                    })
            }
        }
    }

    /// Tears down `id` and everything below it, children first.
    ///
    /// The native node is released but not detached from its parent; callers
    /// that keep the parent alive remove or replace the child themselves.
    /// Dismounting a node that is not mounted does nothing.
    pub fn dismount(&mut self, id: NodeId) {
        let Some(slot) = self.arena.get(id) else {
            return;
        };
        for child in slot.node.children() {
            self.dismount(child);
        }

        let Some(slot) = self.arena.remove(id) else {
            return;
        };
        self.services.release_owner(id);

        match slot.node {
            Mounted::Element(el) => {
                for mounted in el.handlers.values() {
                    self.detach(slot.handle, mounted);
                }
                self.host.release(slot.handle);
            }
            Mounted::Component(mut component) => {
                self.updates.done(id);
                let Tree { host, services, .. } = &mut *self;
                let mut ctx = Context::new(id, Some(id), None, host, services);
                let hook = panic::catch_unwind(AssertUnwindSafe(|| {
                    component.instance.on_dismount(&mut ctx)
                }));
                if hook.is_err() {
                    error!(component = component.name, "dismount hook panicked");
                }
                debug!(component = component.name, "dismounted component");
            }
            Mounted::Text(_) | Mounted::Raw(_) => self.host.release(slot.handle),
        }
    }

    /// Brings the mounted node `id` in line with `next`.
    ///
    /// Returns [`UpdateError::Replace`] carrying `next` back when the node
    /// cannot be patched in place: different node kinds, elements with a
    /// different tag or namespace, raw markup with a different root tag or
    /// components of a different type.
    pub fn update(&mut self, id: NodeId, next: Node) -> Result<(), UpdateError> {
        let next = match next {
            Node::Component(component @ ComponentNode::Named(_)) => {
                Node::Component(ComponentNode::Instance(self.resolve(component)?))
            }
            next => next,
        };

        let Some(slot) = self.arena.get(id) else {
            return Err(UpdateError::NotMounted(id));
        };
        let patchable = match (&slot.node, &next) {
            (Mounted::Text(_), Node::Text(_)) => true,
            (Mounted::Element(el), Node::Element(next)) => {
                el.tag == next.tag && el.namespace == next.namespace
            }
            (Mounted::Component(current), Node::Component(ComponentNode::Instance(next))) => {
                (*current.instance).as_any().type_id() == (**next).as_any().type_id()
            }
            (Mounted::Raw(current), Node::Raw(next)) => current.root_tag == next.root_tag,
            _ => false,
        };
        if !patchable {
            return Err(UpdateError::Replace(Box::new(next)));
        }

        match next {
            Node::Text(text) => {
                self.update_text(id, text.value);
                Ok(())
            }
            Node::Element(el) => self.update_element(id, el),
            Node::Component(ComponentNode::Instance(next)) => self.update_component(id, next),
            Node::Component(ComponentNode::Named(name)) => Err(MountError::Unregistered {
                name: name.to_string(),
            }
            .into()),
            Node::Raw(_) => Ok(()),
        }
    }

    fn update_text(&mut self, id: NodeId, value: String) {
        let Some(slot) = self.arena.get_mut(id) else {
            return;
        };
        if let Mounted::Text(current) = &mut slot.node {
            if *current != value {
                self.host.set_text(slot.handle, &value);
                *current = value;
            }
        }
    }

    fn update_element(&mut self, id: NodeId, next: Element) -> Result<(), UpdateError> {
        let Element {
            attributes: next_attributes,
            handlers: next_handlers,
            children: next_children,
            ..
        } = next;

        let Some(slot) = self.arena.get_mut(id) else {
            return Err(UpdateError::NotMounted(id));
        };
        let (handle, depth) = (slot.handle, slot.depth);
        let Mounted::Element(el) = &mut slot.node else {
            return Err(UpdateError::NotMounted(id));
        };
        if el.self_closing && !next_children.is_empty() {
            return Err(MountError::SelfClosingChildren {
                tag: el.tag.to_string(),
            }
            .into());
        }
        let mut attributes = std::mem::take(&mut el.attributes);
        let mut handlers = std::mem::take(&mut el.handlers);
        let old_children = std::mem::take(&mut el.children);

        let host = &mut self.host;
        attributes.retain(|name, _| {
            let keep = next_attributes.contains_key(name);
            if !keep {
                host.remove_attribute(handle, name);
            }
            keep
        });
        for (name, value) in next_attributes {
            if attributes.get(&name) != Some(&value) {
                self.host.set_attribute(handle, &name, &value);
                attributes.insert(name, value);
            }
        }

        let stale: Vec<_> = handlers
            .keys()
            .filter(|event| !next_handlers.contains_key(*event))
            .cloned()
            .collect();
        for event in stale {
            if let Some(mounted) = handlers.remove(&event) {
                self.detach(handle, &mounted);
            }
        }
        for (event, handler) in next_handlers {
            let mounted = match handlers.remove(&event) {
                Some(mut current) if current.handler.same_as(&handler) => {
                    current.handler = handler;
                    current
                }
                Some(current) => {
                    self.detach(handle, &current);
                    self.attach(id, handle, handler)
                }
                None => self.attach(id, handle, handler),
            };
            handlers.insert(event, mounted);
        }

        let mut children = Children::new();
        let mut outcome = Ok(());
        let mut next_iter = next_children.into_iter();
        let mut old_iter = old_children.into_iter();
        while let Some(child) = old_iter.next() {
            let Some(next_child) = next_iter.next() else {
                self.remove_child(handle, child);
                continue;
            };
            let result = match self.update(child, next_child) {
                Err(UpdateError::Replace(node)) => self.replace_child(id, handle, depth + 1, child, *node),
                Err(err) => Err(err),
                Ok(()) => Ok(child),
            };
            match result {
                Ok(child) => children.push(child),
                Err(err) => {
                    children.push(child);
                    outcome = Err(err);
                    break;
                }
            }
        }
        if outcome.is_ok() {
            for next_child in next_iter {
                match self.mount_node(next_child, Some(id), depth + 1) {
                    Ok((child, child_handle)) => {
                        self.host.append_child(handle, child_handle);
                        children.push(child);
                    }
                    Err(err) => {
                        outcome = Err(err.into());
                        break;
                    }
                }
            }
        }
        children.extend(old_iter);

        if let Some(el) = self.arena.element_mut(id) {
            el.attributes = attributes;
            el.handlers = handlers;
            el.children = children;
        }
        outcome
    }

    fn update_component(&mut self, id: NodeId, next: Box<dyn Component>) -> Result<(), UpdateError> {
        let Tree {
            arena,
            host,
            services,
            ..
        } = &mut *self;
        let Some(component) = arena.component_mut(id) else {
            return Err(UpdateError::NotMounted(id));
        };
        if !component.instance.update_fields((*next).as_any()) {
            debug!(
                component = component.name,
                "fields unchanged, keeping mounted component"
            );
            return Ok(());
        }
        let mut ctx = Context::new(id, Some(id), None, host, services);
        component.instance.on_update(&mut ctx);

        self.render_component(id)
    }

    /// Re-renders the component `id` and reconciles its root with the result.
    pub(crate) fn render_component(&mut self, id: NodeId) -> Result<(), UpdateError> {
        self.updates.done(id);

        let Some(slot) = self.arena.get(id) else {
            return Err(UpdateError::NotMounted(id));
        };
        let Mounted::Component(component) = &slot.node else {
            return Ok(());
        };
        let (name, root, depth) = (component.name, component.root, slot.depth);
        let candidate = component
            .instance
            .render()
            .ok_or(MountError::EmptyRender { component: name })?;

        match self.update(root, candidate) {
            Err(UpdateError::Replace(next)) => self.replace_root(id, root, depth, *next),
            other => other,
        }
    }

    fn replace_root(
        &mut self,
        id: NodeId,
        old_root: NodeId,
        depth: u32,
        next: Node,
    ) -> Result<(), UpdateError> {
        let (new_root, new_handle) = self.mount_node(next, Some(id), depth + 1)?;
        if let Some(old_handle) = self.arena.handle(old_root) {
            let parent = self.native_parent(id);
            self.host.replace_child(parent, new_handle, old_handle);
        }
        if let Some(component) = self.arena.component_mut(id) {
            component.root = new_root;
        }
        self.share_handle(id, new_handle);
        self.dismount(old_root);
        Ok(())
    }

    fn replace_child(
        &mut self,
        parent: NodeId,
        parent_handle: HostHandle,
        depth: u32,
        old: NodeId,
        next: Node,
    ) -> Result<NodeId, UpdateError> {
        let (new_id, new_handle) = self.mount_node(next, Some(parent), depth)?;
        if let Some(old_handle) = self.arena.handle(old) {
            self.host.replace_child(parent_handle, new_handle, old_handle);
        }
        self.dismount(old);
        Ok(new_id)
    }

    fn remove_child(&mut self, parent_handle: HostHandle, child: NodeId) {
        if let Some(handle) = self.arena.handle(child) {
            self.host.remove_child(parent_handle, handle);
        }
        self.dismount(child);
    }

    /// Native node that holds the native node of `id`: the nearest element
    /// above it, or the host root.
    fn native_parent(&self, id: NodeId) -> HostHandle {
        let mut current = self.arena.parent(id);
        while let Some(node) = current {
            let Some(slot) = self.arena.get(node) else {
                break;
            };
            if matches!(slot.node, Mounted::Element(_)) {
                return slot.handle;
            }
            current = slot.parent;
        }
        self.host.root()
    }

    /// A component's native node is its root's; components nested directly
    /// inside each other all share it.
    fn share_handle(&mut self, id: NodeId, handle: HostHandle) {
        let mut current = Some(id);
        while let Some(node) = current {
            let Some(slot) = self.arena.get_mut(node) else {
                break;
            };
            if !matches!(slot.node, Mounted::Component(_)) {
                break;
            }
            slot.handle = handle;
            current = slot.parent;
        }
    }

    fn attach(&mut self, owner: NodeId, handle: HostHandle, handler: EventHandler) -> MountedHandler {
        let listener = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.host
            .add_listener(handle, &handler.event, listener, handler.passive);
        self.listeners.insert(listener, owner);
        MountedHandler { handler, listener }
    }

    fn detach(&mut self, handle: HostHandle, mounted: &MountedHandler) {
        self.host
            .remove_listener(handle, &mounted.handler.event, mounted.listener);
        self.listeners.remove(&mounted.listener);
    }

    /// Element and callback currently registered as `listener`.
    pub(crate) fn listener(&self, listener: ListenerId) -> Option<(NodeId, EventCallback)> {
        let node = *self.listeners.get(&listener)?;
        let Mounted::Element(el) = &self.arena.get(node)?.node else {
            return None;
        };
        el.handlers
            .values()
            .find(|mounted| mounted.listener == listener)
            .map(|mounted| (node, mounted.handler.callback.clone()))
    }

    /// Marks the component enclosing `source` for re-rendering.
    pub fn mark_dirty(&mut self, source: NodeId) -> bool {
        let Some(owner) = self.arena.enclosing_component(source) else {
            return false;
        };
        let Some(depth) = self.depth(owner) else {
            return false;
        };
        self.updates.add(owner, depth)
    }

    /// Runs `f` with a context for `source`. Also returns whether `f` asked
    /// to skip the re-render.
    pub(crate) fn with_context<R>(
        &mut self,
        source: NodeId,
        f: impl FnOnce(&mut Context<'_>) -> R,
    ) -> (R, bool) {
        let owner = self.arena.enclosing_component(source);
        let Tree {
            arena,
            host,
            services,
            ..
        } = &mut *self;
        let component = match owner {
            Some(owner) => arena.component_mut(owner).map(|c| &mut *c.instance),
            None => None,
        };
        let mut ctx = Context::new(source, owner, component, host, services);
        let result = f(&mut ctx);
        let prevented = ctx.update_prevented();
        (result, prevented)
    }

    /// Invokes a lifecycle hook on the component `id`. Returns `false` when
    /// the component is gone or the hook prevented its re-render.
    pub(crate) fn run_hook(&mut self, id: NodeId, hook: &Hook) -> bool {
        let Tree {
            arena,
            host,
            services,
            ..
        } = &mut *self;
        let Some(component) = arena.component_mut(id) else {
            return false;
        };
        let mut ctx = Context::new(id, Some(id), None, host, services);
        let instance = &mut component.instance;
        match hook {
            Hook::Mount => instance.on_mount(&mut ctx),
            Hook::Nav(url) => instance.on_nav(&mut ctx, url),
            Hook::Resize => instance.on_resize(&mut ctx),
            Hook::AppUpdate => instance.on_app_update(&mut ctx),
        }
        !ctx.update_prevented()
    }

    /// Components below and including `root`, parents before children.
    pub fn components(&self, root: NodeId) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(slot) = self.arena.get(id) else {
                continue;
            };
            if matches!(slot.node, Mounted::Component(_)) {
                found.push(id);
            }
            stack.extend(slot.node.children().into_iter().rev());
        }
        found
    }
}
