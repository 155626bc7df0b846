pub mod action;
pub mod component;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod host;
pub mod node;
pub mod reconciler;
pub mod route;
pub mod scheduler;
mod state;
pub mod update;

// Re-export key types
pub use action::{Action, ActionHandler};
pub use component::{AsAny, Component, Constructor, Registry, sync};
pub use config::{ConfigError, EngineConfig, init_logging};
pub use context::{Cipher, Context, Page, Storage};
pub use engine::Engine;
pub use error::{EngineError, HostError, MountError, RegistryError, StorageError, UpdateError};
pub use host::{Host, HostHandle, HostOp, MemoryHost, StorageScope};
pub use node::{Element, Event, EventHandler, ListenerId, Node, NodeId, NodeKind, RawMarkup, Shape};
pub use reconciler::Tree;
pub use route::{NotFound, RouteTable, Routes};
pub use scheduler::{CancelToken, Dispatcher, DispatchMode, Hook, TimerId};
