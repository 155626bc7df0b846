mod arena;
pub mod builder;
mod encode;
mod handler;
mod shape;
mod types;

pub(crate) use arena::{Children, Mounted, MountedComponent, MountedElement, MountedHandler, NodeArena, Slot};
pub use arena::NodeId;
pub(crate) use encode::encode;
pub use handler::{Event, EventCallback, EventHandler, ListenerId};
pub(crate) use shape::mounted_shape;
pub use shape::Shape;
pub use types::{ComponentNode, Element, Node, NodeKind, RawMarkup, Tag, Text};
