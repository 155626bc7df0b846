use crate::component::{Component, Registry};
use crate::config::EngineConfig;
use crate::context::{Cipher, Page, Services};
use crate::error::{EngineError, Result, UpdateError};
use crate::host::Host;
use crate::node::{ComponentNode, Node, NodeId};
use crate::reconciler::Tree;
use crate::route::{NotFound, RouteTable, Routes};
use crate::scheduler::{Backoff, CancelToken, Dispatch, DispatchMode, Dispatcher, Hook, Job};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};
use url::Url;

/// Drives a component tree: owns the dispatch queue, runs frame passes and
/// handles navigation.
///
/// Everything happens on the thread that owns the engine. Other threads talk
/// to it through [`Engine::dispatcher`].
pub struct Engine<H: Host> {
    tree: Tree<H>,
    queue: Receiver<Dispatch>,
    defers: Vec<Dispatch>,
    backoff: Backoff,
    config: EngineConfig,
    routes: Box<dyn Routes>,
    root: Option<NodeId>,
    stopped: bool,
}

impl<H: Host> Engine<H> {
    pub fn new(host: H, registry: Registry, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let origin = config.origin_url()?;
        let (dispatcher, queue) = Dispatcher::channel();
        let services = Services::new(dispatcher, Page::new(origin, &config.root_prefix));
        let backoff = Backoff::new(config.base_tick(), config.max_tick);

        Ok(Self {
            tree: Tree::new(host, registry, services),
            queue,
            defers: Vec::new(),
            backoff,
            config,
            routes: Box::new(RouteTable::new()),
            root: None,
            stopped: false,
        })
    }

    pub fn with_routes(mut self, routes: impl Routes + 'static) -> Self {
        self.routes = Box::new(routes);
        self
    }

    pub fn with_cipher(mut self, cipher: impl Cipher + 'static) -> Self {
        self.tree.services.cipher = Some(Box::new(cipher));
        self
    }

    pub fn dispatcher(&self) -> Dispatcher {
        self.tree.services.dispatcher.clone()
    }

    pub fn host(&self) -> &H {
        self.tree.host()
    }

    pub fn host_mut(&mut self) -> &mut H {
        self.tree.host_mut()
    }

    pub fn tree(&self) -> &Tree<H> {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut Tree<H> {
        &mut self.tree
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The loaded root component.
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn page(&self) -> &Page {
        &self.tree.services.page
    }

    /// Interval the run loop currently waits between passes.
    pub fn tick_interval(&self) -> Duration {
        self.backoff.current()
    }

    /// Number of dispatches waiting in the queue.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Makes `component` the root of the application.
    ///
    /// The first call mounts it under the host root. Later calls reconcile
    /// the current root against it, replacing the root if the types differ.
    pub fn load<C: Component>(&mut self, component: C) -> Result<NodeId> {
        self.load_node(Node::component(component))
    }

    pub fn load_boxed(&mut self, component: Box<dyn Component>) -> Result<NodeId> {
        self.load_node(Node::Component(ComponentNode::Instance(component)))
    }

    fn load_node(&mut self, node: Node) -> Result<NodeId> {
        let current = self.root.filter(|root| self.tree.is_mounted(*root));
        let Some(root) = current else {
            let id = self.tree.mount(node, None, 0)?;
            let handle = self.tree.handle(id).ok_or(EngineError::NotLoaded)?;
            let body = self.tree.host.root();
            self.tree.host.append_child(body, handle);
            self.adopt_root(id);
            return Ok(id);
        };

        match self.tree.update(root, node) {
            Ok(()) => Ok(root),
            Err(UpdateError::Replace(next)) => {
                let id = self.tree.mount(*next, None, 0)?;
                let body = self.tree.host.root();
                if let (Some(new), Some(old)) = (self.tree.handle(id), self.tree.handle(root)) {
                    self.tree.host.replace_child(body, new, old);
                }
                self.tree.dismount(root);
                self.adopt_root(id);
                Ok(id)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Application-wide action handlers live on the root component.
    fn adopt_root(&mut self, id: NodeId) {
        let Tree {
            registry, services, ..
        } = &mut self.tree;
        for (action, handler) in registry.action_handlers() {
            services.actions.handle(action, id, handler.clone());
        }
        self.root = Some(id);
    }

    /// Loads the component routed at the current page URL.
    ///
    /// Unlike interactive navigation, a failure here is returned to the
    /// caller.
    pub fn start(&mut self) -> Result<NodeId> {
        let url = self.page().url().clone();
        let path = self.page().route_path().to_string();
        let component = self.resolve_route(&path);
        let id = self.load_boxed(component)?;
        self.notify(Hook::Nav(url));
        Ok(id)
    }

    /// Navigates to `target`, resolved against the current page URL.
    pub fn navigate(&mut self, target: &str) -> Result<()> {
        let url = self.page().url().join(target)?;
        self.navigate_url(url)
    }

    pub fn navigate_url(&mut self, url: Url) -> Result<()> {
        let current = self.page().url().clone();
        if url.scheme() == "mailto" || !same_origin(&url, &current) {
            debug!(%url, "opening external url");
            self.tree.host.open_url(&url);
            return Ok(());
        }

        let loaded = self.root.is_some();
        if loaded && url == current {
            return Ok(());
        }
        let fragment_only =
            loaded && url.path() == current.path() && url.query() == current.query();

        self.tree.services.page.set_url(url.clone());
        if !fragment_only {
            let path = self.page().route_path().to_string();
            let component = self.resolve_route(&path);
            if let Err(err) = self.load_boxed(component) {
                error!(%path, error = %err, "loading route failed, showing not found page");
                self.load(NotFound { path })?;
            }
        }

        debug!(%url, fragment_only, "navigated");
        self.notify(Hook::Nav(url));
        Ok(())
    }

    fn resolve_route(&self, path: &str) -> Box<dyn Component> {
        self.routes.resolve(path).unwrap_or_else(|| {
            debug!(path, "no route matched");
            Box::new(NotFound {
                path: path.to_string(),
            })
        })
    }

    /// Tells every mounted component the viewport changed.
    pub fn resize(&mut self) {
        self.notify(Hook::Resize);
    }

    /// Tells every mounted component a new application version is available.
    pub fn app_update(&mut self) {
        self.notify(Hook::AppUpdate);
    }

    /// Queues `hook` for every mounted component, parents first.
    fn notify(&mut self, hook: Hook) {
        let Some(root) = self.root else {
            return;
        };
        for component in self.tree.components(root) {
            self.tree.services.dispatcher.submit(Dispatch::new(
                DispatchMode::Update,
                Some(component),
                Job::Hook(hook.clone()),
            ));
        }
    }

    fn execute(&mut self, dispatch: Dispatch) {
        if dispatch.mode == DispatchMode::Defer {
            self.defers.push(dispatch);
            return;
        }
        self.run_item(dispatch);
    }

    fn run_item(&mut self, dispatch: Dispatch) {
        let Dispatch { mode, source, job } = dispatch;
        if let Some(source) = source
            && !self.tree.is_mounted(source)
        {
            debug!(?job, "source dismounted, dropping dispatch");
            return;
        }

        match job {
            Job::Call(f) => {
                let Some(source) = source else {
                    warn!("dispatch without a source node, dropping it");
                    return;
                };
                let ((), prevented) = self.tree.with_context(source, f);
                self.settle_item(mode, source, prevented);
            }
            Job::Event { listener, event } => {
                let Some((node, callback)) = self.tree.listener(listener) else {
                    debug!(?listener, event = %event.name, "listener gone, dropping event");
                    return;
                };
                let ((), prevented) = self.tree.with_context(node, |ctx| callback(ctx, &event));
                self.settle_item(mode, node, prevented);
            }
            Job::Hook(hook) => {
                let Some(component) = source else {
                    return;
                };
                if self.tree.run_hook(component, &hook) && mode == DispatchMode::Update {
                    self.tree.mark_dirty(component);
                }
            }
            Job::Action(action) => {
                for (owner, handler) in self.tree.services.actions.handlers(&action.name) {
                    if !self.tree.is_mounted(owner) {
                        continue;
                    }
                    let ((), prevented) = self
                        .tree
                        .with_context(owner, |ctx| handler.call(ctx, &action));
                    self.settle_item(DispatchMode::Update, owner, prevented);
                }
            }
            Job::State(key) => {
                let Some(value) = self.tree.services.states.get(&key).cloned() else {
                    return;
                };
                for observer in self.tree.services.states.observers(&key) {
                    let owner = observer.owner();
                    if !self.tree.is_mounted(owner) {
                        continue;
                    }
                    let ((), prevented) = self
                        .tree
                        .with_context(owner, |ctx| observer.call(ctx, &value));
                    self.settle_item(DispatchMode::Update, owner, prevented);
                }
            }
            Job::Navigate(url) => {
                if let Err(err) = self.navigate_url(url) {
                    error!(error = %err, "navigation failed");
                }
            }
        }
    }

    fn settle_item(&mut self, mode: DispatchMode, source: NodeId, prevented: bool) {
        if mode == DispatchMode::Update && !prevented {
            self.tree.mark_dirty(source);
        }
    }

    /// Runs expired component timers as `Update` work.
    fn fire_timers(&mut self) -> bool {
        let ready = self.tree.services.timers.pop_ready(Instant::now());
        let fired = !ready.is_empty();
        for (owner, job) in ready {
            if !self.tree.is_mounted(owner) {
                continue;
            }
            let ((), prevented) = self.tree.with_context(owner, job);
            self.settle_item(DispatchMode::Update, owner, prevented);
        }
        fired
    }

    /// Re-renders dirty components, shallowest first.
    fn reconcile(&mut self) -> bool {
        let mut rendered = false;
        while let Some(id) = self.tree.updates.pop() {
            if !self.tree.is_mounted(id) {
                continue;
            }
            rendered = true;
            if let Err(err) = self.tree.render_component(id) {
                error!(?id, error = %err, "re-rendering component failed");
            }
        }
        rendered
    }

    fn run_defers(&mut self) -> bool {
        let defers = std::mem::take(&mut self.defers);
        let ran = !defers.is_empty();
        for dispatch in defers {
            self.run_item(dispatch);
        }
        ran
    }

    /// Runs one frame pass. Returns whether it found any work.
    pub fn frame(&mut self) -> bool {
        // 1. Timers that are due
        let mut worked = self.fire_timers();

        // 2. Work queued before this pass started; anything queued while it
        // runs waits for the next one
        let pending = self.queue.len();
        let batch: Vec<_> = self.queue.try_iter().take(pending).collect();
        worked |= !batch.is_empty();
        for dispatch in batch {
            self.execute(dispatch);
        }

        // 3. Dirty components
        worked |= self.reconcile();

        // 4. Deferred work
        worked |= self.run_defers();

        worked
    }

    /// Runs a frame pass and adjusts the tick interval: idle passes back off,
    /// a pass with work or an immediate request resets it.
    pub fn tick(&mut self) -> Duration {
        let woken = self.tree.services.dispatcher.take_wake();
        let worked = self.frame();
        self.backoff.record(worked || woken)
    }

    /// Runs the engine until `token` is cancelled or the engine is shut down.
    pub fn run(&mut self, token: &CancelToken) {
        debug!(base = ?self.backoff.base(), "engine loop started");
        while !token.is_cancelled() && !self.stopped {
            let mut wait = self.backoff.current();
            if let Some(deadline) = self.tree.services.timers.next_wake_time() {
                wait = wait.min(deadline.saturating_duration_since(Instant::now()));
            }

            match self.queue.recv_timeout(wait) {
                Ok(dispatch) => self.execute(dispatch),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            self.tick();
        }
        debug!("engine loop stopped");
    }

    /// Waits for background work, executes the next queued dispatch if there
    /// is one, then reconciles.
    pub fn consume_next(&mut self) {
        self.wait();
        if let Ok(dispatch) = self.queue.try_recv() {
            self.execute(dispatch);
        }
        self.reconcile();
        self.run_defers();
    }

    /// Executes everything queued, reconciles and waits for background work
    /// until the queue stays empty.
    pub fn consume_all(&mut self) {
        loop {
            if let Ok(dispatch) = self.queue.try_recv() {
                self.execute(dispatch);
                continue;
            }
            self.fire_timers();
            self.reconcile();
            self.run_defers();
            self.wait();
            if self.queue.is_empty() && self.defers.is_empty() && self.tree.updates.is_empty() {
                return;
            }
        }
    }

    /// Blocks until every task started with
    /// [`Context::spawn`](crate::Context::spawn) has finished.
    pub fn wait(&self) {
        self.tree.services.wait.wait();
    }

    /// Settles outstanding work, then dismounts the root and releases
    /// everything the engine holds.
    pub fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.consume_all();
        self.teardown();
    }

    fn teardown(&mut self) {
        self.stopped = true;
        if let Some(root) = self.root.take() {
            if let Some(handle) = self.tree.handle(root) {
                let body = self.tree.host.root();
                self.tree.host.remove_child(body, handle);
            }
            self.tree.dismount(root);
        }
        self.tree.services.timers.clear();
        self.tree.updates.clear();
        self.defers.clear();
        let dropped = self.queue.try_iter().count();
        debug!(dropped, "engine stopped");
    }

    /// Indented HTML of the loaded tree.
    pub fn render_html(&self) -> Result<String> {
        let root = self.root.ok_or(EngineError::NotLoaded)?;
        Ok(self.tree.html(root))
    }
}

impl<H: Host> Drop for Engine<H> {
    fn drop(&mut self) {
        if !self.stopped {
            self.teardown();
        }
    }
}

fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
}
