mod memory;
mod traits;

pub use memory::{HostOp, MemoryHost};
pub use traits::{Host, HostHandle, StorageScope};
