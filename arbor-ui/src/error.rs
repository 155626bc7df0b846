use crate::host::HostHandle;
use crate::node::{Node, NodeId};
use thiserror::Error;

/// Failures reported by a [`Host`](crate::host::Host) implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("invalid element tag {tag:?}")]
    InvalidTag { tag: String },

    #[error("raw markup has no root element")]
    EmptyMarkup,

    #[error("unknown native handle {0:?}")]
    UnknownHandle(HostHandle),

    #[error("storage quota exceeded for key {key:?}")]
    StorageFull { key: String },
}

#[derive(Error, Debug)]
pub enum MountError {
    #[error("component {name:?} is not registered")]
    Unregistered { name: String },

    #[error("component {component} rendered nothing")]
    EmptyRender { component: &'static str },

    #[error("self-closing element <{tag}> cannot have children")]
    SelfClosingChildren { tag: String },

    #[error("host refused to create node: {0}")]
    Host(#[from] HostError),

    #[error("mounting child {index} of <{tag}> failed")]
    ChildFailed {
        tag: String,
        index: usize,
        #[source]
        source: Box<MountError>,
    },

    #[error("mounting root of component {component} failed")]
    RootFailed {
        component: &'static str,
        #[source]
        source: Box<MountError>,
    },
}

/// Outcome of reconciling a mounted node against a new description.
///
/// `Replace` is a control value rather than a failure: the node cannot be
/// patched in place and the caller has to mount the carried description at the
/// same native position.
#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("node has to be replaced")]
    Replace(Box<Node>),

    #[error(transparent)]
    Mount(#[from] MountError),

    #[error("node {0:?} is not mounted")]
    NotMounted(NodeId),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("component {0:?} is already registered")]
    ComponentConflict(String),

    #[error("action handler {0:?} is already registered")]
    ActionConflict(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("value for key {key:?} could not be serialized: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("value for key {key:?} could not be deserialized: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("no cipher installed")]
    NoCipher,

    #[error("cipher failure: {0}")]
    Cipher(String),

    #[error(transparent)]
    Host(#[from] HostError),
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("no component loaded")]
    NotLoaded,

    #[error("loading component failed: {0}")]
    Load(#[from] MountError),

    #[error("invalid navigation target: {0}")]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

impl From<UpdateError> for EngineError {
    fn from(err: UpdateError) -> Self {
        match err {
            UpdateError::Mount(err) => EngineError::Load(err),
            UpdateError::NotMounted(_) | UpdateError::Replace(_) => EngineError::NotLoaded,
        }
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
