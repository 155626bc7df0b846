use crate::action::{Action, ActionBus, ActionHandler};
use crate::component::Component;
use crate::error::StorageError;
use crate::host::{Host, StorageScope};
use crate::node::NodeId;
use crate::scheduler::{Dispatch, DispatchMode, Dispatcher, Job, TimerId, Timers, WaitGroup};
use crate::state::{Observer, StateStore};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::thread;
use std::time::Duration;
use url::Url;
use uuid::Uuid;

const DEVICE_ID_KEY: &str = "arbor.device_id";

/// Symmetric encryption used by [`Context::encrypt`] and
/// [`Context::decrypt`].
pub trait Cipher {
    fn encrypt(&self, plain: &[u8]) -> Result<Vec<u8>, StorageError>;
    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, StorageError>;
}

/// Where the application currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    url: Url,
    root_prefix: String,
}

impl Page {
    pub(crate) fn new(url: Url, root_prefix: &str) -> Self {
        Self {
            url,
            root_prefix: root_prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub(crate) fn set_url(&mut self, url: Url) {
        self.url = url;
    }

    /// Path of the current URL with the application's root prefix removed.
    pub fn route_path(&self) -> &str {
        strip_root_prefix(self.url.path(), &self.root_prefix)
    }
}

pub(crate) fn strip_root_prefix<'p>(path: &'p str, prefix: &str) -> &'p str {
    if prefix.is_empty() {
        return path;
    }
    match path.strip_prefix(prefix) {
        Some("") => "/",
        Some(rest) if rest.starts_with('/') => rest,
        _ => path,
    }
}

/// Everything the engine shares with running components.
pub(crate) struct Services {
    pub dispatcher: Dispatcher,
    pub page: Page,
    pub actions: ActionBus,
    pub states: StateStore,
    pub timers: Timers,
    pub wait: WaitGroup,
    pub cipher: Option<Box<dyn Cipher>>,
}

impl Services {
    pub fn new(dispatcher: Dispatcher, page: Page) -> Self {
        Self {
            dispatcher,
            page,
            actions: ActionBus::default(),
            states: StateStore::default(),
            timers: Timers::new(),
            wait: WaitGroup::new(),
            cipher: None,
        }
    }

    /// Drops everything registered by `node`.
    pub fn release_owner(&mut self, node: NodeId) {
        self.timers.cancel_owner(node);
        self.actions.remove_owner(node);
        self.states.remove_owner(node);
    }
}

/// Handed to event handlers, hooks and dispatched work.
///
/// A context belongs to a source node: the element whose handler fired, or
/// the component whose hook runs. Work scheduled through it is dropped if the
/// source is dismounted before it runs.
pub struct Context<'a> {
    source: NodeId,
    owner: Option<NodeId>,
    component: Option<&'a mut (dyn Component + 'static)>,
    host: &'a mut (dyn Host + 'static),
    services: &'a mut Services,
    prevent_update: bool,
}

impl<'a> Context<'a> {
    pub(crate) fn new(
        source: NodeId,
        owner: Option<NodeId>,
        component: Option<&'a mut (dyn Component + 'static)>,
        host: &'a mut (dyn Host + 'static),
        services: &'a mut Services,
    ) -> Self {
        Self {
            source,
            owner,
            component,
            host,
            services,
            prevent_update: false,
        }
    }

    pub fn source(&self) -> NodeId {
        self.source
    }

    /// Nearest component at or above the source node.
    pub fn owner(&self) -> Option<NodeId> {
        self.owner
    }

    /// The enclosing component, if it is a `T`.
    ///
    /// Not available inside the component's own hooks, which already receive
    /// it as `self`.
    pub fn component<T: Component>(&self) -> Option<&T> {
        self.component.as_deref()?.as_any().downcast_ref::<T>()
    }

    pub fn component_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.component.as_deref_mut()?.as_any_mut().downcast_mut::<T>()
    }

    pub fn dispatcher(&self) -> Dispatcher {
        self.services.dispatcher.clone()
    }

    /// Queues `f`, then re-renders the enclosing component.
    pub fn dispatch<F>(&self, f: F)
    where
        F: FnOnce(&mut Context<'_>) + Send + 'static,
    {
        self.services.dispatcher.dispatch(self.source, f);
    }

    /// Queues `f` to run after the next reconciliation pass.
    pub fn defer<F>(&self, f: F)
    where
        F: FnOnce(&mut Context<'_>) + Send + 'static,
    {
        self.services.dispatcher.defer(self.source, f);
    }

    /// Re-renders the enclosing component on the next pass.
    pub fn update(&self) {
        self.dispatch(|_ctx| {});
    }

    /// Keeps the current handler from re-rendering its component.
    pub fn prevent_update(&mut self) {
        self.prevent_update = true;
    }

    pub(crate) fn update_prevented(&self) -> bool {
        self.prevent_update
    }

    /// Runs `f` on a background thread.
    ///
    /// The engine waits for it before shutting down. Results come back
    /// through the dispatcher passed to `f`.
    pub fn spawn<F>(&self, f: F)
    where
        F: FnOnce(Dispatcher) + Send + 'static,
    {
        let guard = self.services.wait.guard();
        let dispatcher = self.services.dispatcher.clone();
        thread::spawn(move || {
            let _guard = guard;
            f(dispatcher);
        });
    }

    /// Runs `f` after `delay`, then re-renders the enclosing component.
    /// Cancelled if the owner is dismounted first.
    pub fn after<F>(&mut self, delay: Duration, f: F) -> TimerId
    where
        F: FnOnce(&mut Context<'_>) + 'static,
    {
        let owner = self.owner.unwrap_or(self.source);
        self.services.timers.schedule(owner, delay, Box::new(f))
    }

    pub fn cancel_timer(&mut self, id: TimerId) -> bool {
        self.services.timers.cancel(id)
    }

    /// Navigates to `target`, resolved against the current page URL.
    pub fn navigate(&self, target: &str) -> Result<(), url::ParseError> {
        let url = self.services.page.url().join(target)?;
        self.services.dispatcher.navigate(url);
        Ok(())
    }

    pub fn page(&self) -> &Page {
        &self.services.page
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.host.viewport()
    }

    pub fn pointer(&self) -> (i32, i32) {
        self.host.pointer()
    }

    pub fn title(&self) -> String {
        self.host.title()
    }

    pub fn set_title(&mut self, title: &str) {
        self.host.set_title(title);
    }

    pub fn meta(&self, name: &str) -> Option<String> {
        self.host.meta(name)
    }

    pub fn set_meta(&mut self, name: &str, content: &str) {
        self.host.set_meta(name, content);
    }

    pub fn local_storage(&mut self) -> Storage<'_> {
        Storage {
            host: &mut *self.host,
            scope: StorageScope::Local,
        }
    }

    pub fn session_storage(&mut self) -> Storage<'_> {
        Storage {
            host: &mut *self.host,
            scope: StorageScope::Session,
        }
    }

    /// Identifier of this device, created and persisted on first use.
    pub fn device_id(&mut self) -> Result<String, StorageError> {
        let mut storage = self.local_storage();
        if let Some(id) = storage.get::<String>(DEVICE_ID_KEY)? {
            return Ok(id);
        }
        let id = Uuid::new_v4().simple().to_string();
        storage.set(DEVICE_ID_KEY, &id)?;
        Ok(id)
    }

    /// Calls `handler` for every action named `action` until the source
    /// node is dismounted.
    pub fn handle_action<F>(&mut self, action: &str, handler: F)
    where
        F: Fn(&mut Context<'_>, &Action) + 'static,
    {
        self.services
            .actions
            .handle(action, self.source, ActionHandler::new(handler));
    }

    pub fn post_action(&self, action: Action) {
        self.services.dispatcher.post(action);
    }

    /// Stores `value` under `key` and notifies observers on a later pass.
    pub fn set_state<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), StorageError> {
        let value = serde_json::to_value(value).map_err(|source| StorageError::Encode {
            key: key.to_string(),
            source,
        })?;
        let changed = self.services.states.set(key, value);
        if changed && self.services.states.has_observers(key) {
            self.services.dispatcher.submit(Dispatch::new(
                DispatchMode::Next,
                None,
                Job::State(key.to_string()),
            ));
        }
        Ok(())
    }

    pub fn get_state<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        let Some(value) = self.services.states.get(key) else {
            return Ok(None);
        };
        T::deserialize(value)
            .map(Some)
            .map_err(|source| StorageError::Decode {
                key: key.to_string(),
                source,
            })
    }

    /// Calls `observer` with the new value whenever `key` changes, until the
    /// source node is dismounted.
    pub fn observe_state<F>(&mut self, key: &str, observer: F)
    where
        F: Fn(&mut Context<'_>, &serde_json::Value) + 'static,
    {
        self.services
            .states
            .observe(key, Observer::new(self.source, observer));
    }

    pub fn delete_state(&mut self, key: &str) {
        self.services.states.delete(key);
    }

    pub fn encrypt<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, StorageError> {
        let cipher = self.services.cipher.as_ref().ok_or(StorageError::NoCipher)?;
        let plain = serde_json::to_vec(value).map_err(|source| StorageError::Encode {
            key: String::new(),
            source,
        })?;
        cipher.encrypt(&plain)
    }

    pub fn decrypt<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, StorageError> {
        let cipher = self.services.cipher.as_ref().ok_or(StorageError::NoCipher)?;
        let plain = cipher.decrypt(data)?;
        serde_json::from_slice(&plain).map_err(|source| StorageError::Decode {
            key: String::new(),
            source,
        })
    }
}

/// Typed JSON access to one of the host's key/value stores.
pub struct Storage<'c> {
    host: &'c mut (dyn Host + 'static),
    scope: StorageScope,
}

impl Storage<'_> {
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        let Some(raw) = self.host.storage_get(self.scope, key) else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StorageError::Decode {
                key: key.to_string(),
                source,
            })
    }

    pub fn set<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value).map_err(|source| StorageError::Encode {
            key: key.to_string(),
            source,
        })?;
        self.host.storage_set(self.scope, key, &raw)?;
        Ok(())
    }

    pub fn delete(&mut self, key: &str) {
        self.host.storage_delete(self.scope, key);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.host.storage_get(self.scope, key).is_some()
    }
}
