use crate::error::HostError;
use crate::node::ListenerId;
use serde::{Deserialize, Serialize};
use url::Url;

/// Opaque reference to a node owned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HostHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageScope {
    /// Survives restarts.
    Local,
    /// Cleared when the page session ends.
    Session,
}

/// The native side of the UI.
///
/// Every mutation the reconciler performs goes through this trait, so an
/// implementation sees exactly the minimal set of changes needed to keep its
/// tree in sync with the components.
pub trait Host: 'static {
    /// Node that the application root is attached to.
    fn root(&self) -> HostHandle;

    fn create_element(&mut self, tag: &str, namespace: &str) -> Result<HostHandle, HostError>;
    fn create_text(&mut self, value: &str) -> HostHandle;

    /// Builds a native subtree from pre-rendered markup.
    fn create_raw(&mut self, markup: &str) -> Result<HostHandle, HostError>;

    fn set_text(&mut self, node: HostHandle, value: &str);
    fn set_attribute(&mut self, node: HostHandle, name: &str, value: &str);
    fn remove_attribute(&mut self, node: HostHandle, name: &str);

    fn add_listener(&mut self, node: HostHandle, event: &str, listener: ListenerId, passive: bool);
    fn remove_listener(&mut self, node: HostHandle, event: &str, listener: ListenerId);

    fn append_child(&mut self, parent: HostHandle, child: HostHandle);
    fn replace_child(&mut self, parent: HostHandle, new: HostHandle, old: HostHandle);
    fn remove_child(&mut self, parent: HostHandle, child: HostHandle);

    /// Drops a native node once nothing refers to it any more.
    fn release(&mut self, node: HostHandle);

    fn viewport(&self) -> (u32, u32);
    fn pointer(&self) -> (i32, i32);

    fn title(&self) -> String;
    fn set_title(&mut self, title: &str);
    fn meta(&self, name: &str) -> Option<String>;
    fn set_meta(&mut self, name: &str, content: &str);

    fn storage_get(&self, scope: StorageScope, key: &str) -> Option<String>;
    fn storage_set(&mut self, scope: StorageScope, key: &str, value: &str)
    -> Result<(), HostError>;
    fn storage_delete(&mut self, scope: StorageScope, key: &str);

    /// Leaves the application, e.g. for an external link.
    fn open_url(&mut self, url: &Url);
}
